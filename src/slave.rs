use crate::actuator::Actuator;
use crate::bus::{Ack, BusSlave, ByteEvent};
use crate::config::{SubsystemAddress, UnitConfig, UnitId, STATUS_IDLE, WRITE};
use core::sync::atomic::{AtomicU8, Ordering};
use serde::{Deserialize, Serialize};

/// Where the handler is within the current transaction. Tracked as an
/// explicit state instead of leaning on peripheral flags, so desyncs are
/// visible and recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Phase {
    AddressPhase = 0,
    DataPhase = 1,
}

impl Phase {
    fn from_raw(raw: u8) -> Self {
        if raw == Phase::DataPhase as u8 {
            Phase::DataPhase
        } else {
            Phase::AddressPhase
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SlaveDiagnostics {
    pub transactions: u32,
    pub commands_applied: u32,
    pub unknown_commands: u32,
    pub phase_resyncs: u32,
    pub status_reads: u32,
}

/// Per-unit interrupt-driven command decoder.
///
/// Reconstructs each transaction incrementally across interrupt
/// invocations: the address phase drains the header byte, the data phase
/// validates the command byte against the unit's table and invokes the
/// actuator on a match. No transaction object survives past the stop
/// condition.
pub struct SlaveCommandHandler<A: Actuator> {
    config: UnitConfig,
    // Written only from interrupt context; the main context only loads it.
    phase: AtomicU8,
    // Completion hand-off to the master's status poll.
    status: AtomicU8,
    actuator: A,
    diagnostics: SlaveDiagnostics,
}

impl<A: Actuator> SlaveCommandHandler<A> {
    pub fn new(config: UnitConfig, actuator: A) -> Self {
        Self {
            config,
            phase: AtomicU8::new(Phase::AddressPhase as u8),
            status: AtomicU8::new(STATUS_IDLE),
            actuator,
            diagnostics: SlaveDiagnostics::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_raw(self.phase.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &UnitConfig {
        &self.config
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

impl<A: Actuator> BusSlave for SlaveCommandHandler<A> {
    fn unit(&self) -> UnitId {
        self.config.id
    }

    fn address(&self) -> SubsystemAddress {
        self.config.address
    }

    fn on_interrupt(&mut self, event: ByteEvent) -> Ack {
        match event {
            ByteEvent::Address { header } => {
                if self.phase() == Phase::DataPhase {
                    // The previous transaction never reached its stop; fall
                    // back in step at this fresh address phase.
                    self.diagnostics.phase_resyncs += 1;
                }
                self.diagnostics.transactions += 1;
                // The peripheral's own address-match logic gated this
                // interrupt; only the direction bit matters here.
                let (_, direction) = SubsystemAddress::from_header(header);
                if direction == WRITE {
                    self.set_phase(Phase::DataPhase);
                } else {
                    // Read transaction: the status byte goes out through
                    // next_read_byte, no data phase follows.
                    self.set_phase(Phase::AddressPhase);
                }
                Ack::Ack
            }
            ByteEvent::Data { value } => {
                if self.phase() == Phase::AddressPhase {
                    // Missed the address interrupt. Drain the byte so the
                    // buffer clears, but do not interpret it.
                    self.diagnostics.phase_resyncs += 1;
                    return Ack::Ack;
                }
                match self.config.lookup(value) {
                    Some(spec) => {
                        self.actuator.apply_actuation(spec.opcode);
                        self.diagnostics.commands_applied += 1;
                        self.status.store(spec.opcode, Ordering::Release);
                    }
                    None => {
                        // Not in this unit's table: drained, counted,
                        // otherwise ignored. Receipt is still acknowledged.
                        self.diagnostics.unknown_commands += 1;
                    }
                }
                Ack::Ack
            }
        }
    }

    fn on_stop(&mut self) {
        self.set_phase(Phase::AddressPhase);
    }

    fn next_read_byte(&mut self) -> u8 {
        self.diagnostics.status_reads += 1;
        // Reading the status consumes it, so the master sees a completion
        // exactly once.
        self.status.swap(STATUS_IDLE, Ordering::AcqRel)
    }

    fn diagnostics(&self) -> SlaveDiagnostics {
        self.diagnostics
    }
}
