use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Nominal clock of the shared two-wire bus.
pub const BUS_CLOCK_HZ: u32 = 100_000;

/// Direction bit carried in bit 0 of the address byte.
pub const WRITE: u8 = 0;
pub const READ: u8 = 1;

/// Status byte a unit reports to a completion poll when nothing has
/// completed since the last read.
pub const STATUS_IDLE: u8 = 0x00;

/// 7-bit unit address on the shared two-wire bus.
///
/// Addresses are fixed for the life of the program and unique across all
/// units; both the master's dispatch table and each unit's own slave
/// initialization know them at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemAddress(u8);

impl SubsystemAddress {
    pub const fn new(raw: u8) -> Self {
        assert!(raw < 0x80, "bus addresses are 7-bit");
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Address byte as it appears on the wire: address in bits 7..1,
    /// direction in bit 0.
    pub const fn header(self, direction: u8) -> u8 {
        (self.0 << 1) | (direction & 1)
    }

    /// Split a received address byte back into address and direction.
    pub const fn from_header(header: u8) -> (Self, u8) {
        (Self(header >> 1), header & 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitId {
    Extraction,
    Traction,
    Mixing,
}

impl UnitId {
    pub fn name(self) -> &'static str {
        match self {
            UnitId::Extraction => "extraction",
            UnitId::Traction => "traction",
            UnitId::Mixing => "mixing",
        }
    }
}

/// One command a unit accepts. Opcodes are meaningful only within the
/// owning unit's table; the same value may mean something else to another
/// unit.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CommandSpec {
    pub opcode: u8,
    pub label: &'static str,
}

/// Immutable per-unit configuration record, injected at initialization.
/// New subsystems are added by data, not by dispatcher code changes.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UnitConfig {
    pub id: UnitId,
    pub address: SubsystemAddress,
    pub commands: &'static [CommandSpec],
}

impl UnitConfig {
    pub fn lookup(&self, opcode: u8) -> Option<&CommandSpec> {
        self.commands.iter().find(|spec| spec.opcode == opcode)
    }
}

// The control unit is the bus master and carries no slave address.
pub const EXTRACTION_ADDRESS: SubsystemAddress = SubsystemAddress::new(0x51);
pub const TRACTION_ADDRESS: SubsystemAddress = SubsystemAddress::new(0x52);
pub const MIXING_ADDRESS: SubsystemAddress = SubsystemAddress::new(0x53);

const_assert!(EXTRACTION_ADDRESS.raw() < 0x80);
const_assert!(TRACTION_ADDRESS.raw() < 0x80);
const_assert!(MIXING_ADDRESS.raw() < 0x80);

pub const BEGIN_EXTRACTION_CYCLE: u8 = 0x01;

pub const EXTRACTION_COMMANDS: &[CommandSpec] = &[CommandSpec {
    opcode: BEGIN_EXTRACTION_CYCLE,
    label: "begin extraction cycle",
}];

// Traction and mixing carry bus addresses only; their command semantics are
// not yet defined, so every opcode sent to them is a counted no-op.
pub const TRACTION_COMMANDS: &[CommandSpec] = &[];
pub const MIXING_COMMANDS: &[CommandSpec] = &[];

pub const fn extraction_unit() -> UnitConfig {
    UnitConfig {
        id: UnitId::Extraction,
        address: EXTRACTION_ADDRESS,
        commands: EXTRACTION_COMMANDS,
    }
}

pub const fn traction_unit() -> UnitConfig {
    UnitConfig {
        id: UnitId::Traction,
        address: TRACTION_ADDRESS,
        commands: TRACTION_COMMANDS,
    }
}

pub const fn mixing_unit() -> UnitConfig {
    UnitConfig {
        id: UnitId::Mixing,
        address: MIXING_ADDRESS,
        commands: MIXING_COMMANDS,
    }
}

/// All slave units on the bus, in address order.
pub fn bus_map() -> [UnitConfig; 3] {
    [extraction_unit(), traction_unit(), mixing_unit()]
}
