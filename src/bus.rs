use crate::config::{SubsystemAddress, UnitId};
use crate::slave::SlaveDiagnostics;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;

/// Bound on the busy-flag poll loop. The legacy wait spun forever on a
/// wedged peripheral; exceeding this bound reports a recoverable fault
/// instead.
pub const IDLE_SPIN_LIMIT: u32 = 10_000;

const_assert!(IDLE_SPIN_LIMIT > 0);

// Cycles a start/stop/byte operation keeps the busy flags asserted.
const BUSY_CYCLES_PER_OP: u32 = 4;

const MAX_UNITS: usize = 8;
const TRACE_CAPACITY: usize = 256;

/// The single bit a receiver drives after each byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ack {
    Ack,
    Nack,
}

impl Ack {
    pub fn is_ack(self) -> bool {
        matches!(self, Ack::Ack)
    }
}

/// What a slave peripheral reports per byte interrupt: the D/~A status
/// decode, with the buffer already drained into the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteEvent {
    /// Address byte, direction bit still encoded in bit 0.
    Address { header: u8 },
    /// Data byte following the address phase.
    Data { value: u8 },
}

/// Observable bus activity, captured per transaction so tests and tools can
/// assert exact framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WireEvent {
    Start,
    Byte { value: u8, ack: Ack },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    /// The peripheral never reported idle within the spin bound.
    #[error("bus stayed busy after {spins} idle polls")]
    Timeout { spins: u32 },
}

/// A slave peripheral attached to the wire. Methods are invoked
/// synchronously from within master transport operations, modeling the
/// interrupt that preempts the unit's idle loop; implementations must be
/// short and non-blocking.
pub trait BusSlave {
    fn unit(&self) -> UnitId;
    fn address(&self) -> SubsystemAddress;
    /// Byte-received interrupt. Returns the acknowledge bit the unit drives.
    fn on_interrupt(&mut self, event: ByteEvent) -> Ack;
    /// Stop condition observed; the transaction is over.
    fn on_stop(&mut self);
    /// Drive the next byte of a master read.
    fn next_read_byte(&mut self) -> u8;
    fn diagnostics(&self) -> SlaveDiagnostics;
}

struct BusDrop {
    device: Box<dyn BusSlave>,
    online: bool,
}

/// The shared two-wire medium plus the master-side transport primitives.
///
/// Single-master discipline: writes happen only inside a start/stop
/// bracket, and the address byte selects which unit's interrupt fires. No
/// state persists on the wire between transactions except the event trace.
pub struct Wire {
    drops: Vec<BusDrop, MAX_UNITS>,
    busy_cycles: u32,
    wedged: bool,
    transaction_open: bool,
    selected: Option<usize>,
    trace: Vec<WireEvent, TRACE_CAPACITY>,
}

impl Wire {
    pub fn new() -> Self {
        Self {
            drops: Vec::new(),
            busy_cycles: 0,
            wedged: false,
            transaction_open: false,
            selected: None,
            trace: Vec::new(),
        }
    }

    /// Attach a slave unit. Fails on a duplicate address or a fully
    /// populated bus.
    pub fn attach(&mut self, device: Box<dyn BusSlave>) -> Result<(), &'static str> {
        if self
            .drops
            .iter()
            .any(|d| d.device.address() == device.address())
        {
            return Err("address already attached");
        }
        self.drops
            .push(BusDrop {
                device,
                online: true,
            })
            .map_err(|_| "bus is fully populated")
    }

    /// Power a unit on or off. An offline unit never acknowledges.
    pub fn set_online(&mut self, address: SubsystemAddress, online: bool) {
        if let Some(d) = self
            .drops
            .iter_mut()
            .find(|d| d.device.address() == address)
        {
            d.online = online;
        }
    }

    /// Simulate a stuck peripheral flag: the bus never reports idle until
    /// [`Wire::release`] is called.
    pub fn wedge(&mut self) {
        self.wedged = true;
    }

    pub fn release(&mut self) {
        self.wedged = false;
        self.busy_cycles = 0;
    }

    pub fn is_wedged(&self) -> bool {
        self.wedged
    }

    /// Poll the busy flags until the peripheral reports no transaction,
    /// restart, receive, or acknowledge operation in progress.
    pub fn wait_idle(&mut self) -> Result<(), BusError> {
        let mut spins = 0;
        while spins < IDLE_SPIN_LIMIT {
            if !self.wedged {
                if self.busy_cycles == 0 {
                    return Ok(());
                }
                self.busy_cycles -= 1;
            }
            spins += 1;
        }
        Err(BusError::Timeout { spins })
    }

    /// Assert a start condition. A start while a transaction is still open
    /// is a restart; the previous bracket is abandoned at the wire level.
    pub fn start(&mut self) -> Result<(), BusError> {
        self.wait_idle()?;
        if let Some(index) = self.selected.take() {
            self.drops[index].device.on_stop();
        }
        self.transaction_open = true;
        self.push_trace(WireEvent::Start);
        self.busy_cycles = BUSY_CYCLES_PER_OP;
        Ok(())
    }

    /// Assert a stop condition. Always terminates the open transaction,
    /// regardless of how many bytes were exchanged.
    pub fn stop(&mut self) -> Result<(), BusError> {
        self.wait_idle()?;
        if let Some(index) = self.selected.take() {
            self.drops[index].device.on_stop();
        }
        self.transaction_open = false;
        self.push_trace(WireEvent::Stop);
        self.busy_cycles = BUSY_CYCLES_PER_OP;
        Ok(())
    }

    /// Place a byte on the bus and return the observed acknowledge. The
    /// first byte after a start is the address byte: the peripheral
    /// address-match logic decides which unit's interrupt fires, so an
    /// absent or offline target simply never acknowledges.
    pub fn write_byte(&mut self, value: u8) -> Result<Ack, BusError> {
        self.wait_idle()?;
        debug_assert!(
            self.transaction_open,
            "write outside a start/stop bracket"
        );
        let ack = match self.selected {
            Some(index) => self.drops[index]
                .device
                .on_interrupt(ByteEvent::Data { value }),
            None => {
                let (address, _) = SubsystemAddress::from_header(value);
                match self.position_of(address) {
                    Some(index) => {
                        self.selected = Some(index);
                        self.drops[index]
                            .device
                            .on_interrupt(ByteEvent::Address { header: value })
                    }
                    None => Ack::Nack,
                }
            }
        };
        self.push_trace(WireEvent::Byte { value, ack });
        self.busy_cycles = BUSY_CYCLES_PER_OP;
        Ok(ack)
    }

    /// Request a byte from the addressed unit, then drive an acknowledge
    /// (`true`) or not-acknowledge (`false`) and wait for it to complete.
    pub fn read_byte(&mut self, send_ack: bool) -> Result<u8, BusError> {
        self.wait_idle()?;
        debug_assert!(self.transaction_open, "read outside a start/stop bracket");
        let value = match self.selected {
            Some(index) => self.drops[index].device.next_read_byte(),
            // Nothing is driving the line; an absent transmitter reads as
            // all ones.
            None => 0xFF,
        };
        let ack = if send_ack { Ack::Ack } else { Ack::Nack };
        self.push_trace(WireEvent::Byte { value, ack });
        self.busy_cycles = BUSY_CYCLES_PER_OP;
        self.wait_idle()?;
        Ok(value)
    }

    /// Per-unit view for telemetry: id, address, diagnostics snapshot.
    pub fn units(
        &self,
    ) -> impl Iterator<Item = (UnitId, SubsystemAddress, SlaveDiagnostics)> + '_ {
        self.drops
            .iter()
            .map(|d| (d.device.unit(), d.device.address(), d.device.diagnostics()))
    }

    pub fn trace(&self) -> &[WireEvent] {
        &self.trace
    }

    /// Drain the captured trace, leaving it empty for the next transaction.
    pub fn take_trace(&mut self) -> Vec<WireEvent, TRACE_CAPACITY> {
        core::mem::take(&mut self.trace)
    }

    fn position_of(&self, address: SubsystemAddress) -> Option<usize> {
        self.drops
            .iter()
            .position(|d| d.online && d.device.address() == address)
    }

    fn push_trace(&mut self, event: WireEvent) {
        if self.trace.is_full() {
            self.trace.remove(0);
        }
        let _ = self.trace.push(event);
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new()
    }
}
