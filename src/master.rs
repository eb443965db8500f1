use crate::bus::{BusError, Wire};
use crate::config::{SubsystemAddress, READ, STATUS_IDLE, WRITE};
use crate::fault::{FaultKind, FaultLog};
use heapless::Vec;
use serde::Serialize;

pub const MAX_SCHEDULE_ENTRIES: usize = 16;

/// One (target, command) pair the master issues on its tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchEntry {
    pub target: SubsystemAddress,
    pub command: u8,
}

/// Ordered, cyclic selection of dispatch entries, one per tick. Owned
/// exclusively by the dispatcher; in the minimal machine it holds a single
/// fixed entry issued every tick.
#[derive(Debug)]
pub struct DispatchSchedule {
    entries: Vec<DispatchEntry, MAX_SCHEDULE_ENTRIES>,
    cursor: usize,
}

impl DispatchSchedule {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
        }
    }

    pub fn push(&mut self, entry: DispatchEntry) -> Result<(), &'static str> {
        self.entries.push(entry).map_err(|_| "schedule full")
    }

    pub fn entries(&self) -> &[DispatchEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn advance(&mut self) -> Option<DispatchEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let entry = self.entries[self.cursor % self.entries.len()];
        self.cursor = (self.cursor + 1) % self.entries.len();
        Some(entry)
    }
}

impl Default for DispatchSchedule {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct DispatchStats {
    pub ticks: u32,
    pub delivered: u32,
    pub address_nacks: u32,
    pub command_nacks: u32,
    pub bus_timeouts: u32,
    pub completion_polls: u32,
}

/// Result of one dispatch tick. Every variant is recoverable: the
/// dispatcher skips the tick and retries on the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchOutcome {
    Delivered {
        target: SubsystemAddress,
        command: u8,
    },
    /// The target never acknowledged its address; the command byte was not
    /// attempted.
    AddressNotAcknowledged { target: SubsystemAddress },
    /// The target acknowledged its address but not the command byte.
    CommandNotAcknowledged {
        target: SubsystemAddress,
        command: u8,
    },
    /// A busy flag never cleared; the transaction was abandoned.
    BusStuck,
    /// Empty schedule, nothing to issue this tick.
    Idle,
}

/// The control unit's side of the bus: sole master, periodic command
/// dispatch, central fault log.
pub struct MasterDispatcher {
    schedule: DispatchSchedule,
    stats: DispatchStats,
    faults: FaultLog,
}

impl MasterDispatcher {
    pub fn new(schedule: DispatchSchedule) -> Self {
        Self {
            schedule,
            stats: DispatchStats::default(),
            faults: FaultLog::new(),
        }
    }

    pub fn schedule(&self) -> &DispatchSchedule {
        &self.schedule
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn fault_log(&self) -> &FaultLog {
        &self.faults
    }

    pub fn fault_log_mut(&mut self) -> &mut FaultLog {
        &mut self.faults
    }

    /// Perform exactly one full transaction for the next scheduled entry:
    /// start, address+write, command byte, stop. Synchronous end-to-end;
    /// transactions are never interleaved. Acknowledge status is checked
    /// after each write, and a missing acknowledge on the address byte
    /// aborts the transaction before the command byte goes out.
    pub fn dispatch_once(&mut self, wire: &mut Wire, now_ms: u64) -> DispatchOutcome {
        let entry = match self.schedule.advance() {
            Some(entry) => entry,
            None => return DispatchOutcome::Idle,
        };
        self.stats.ticks += 1;

        let outcome = match self.run_transaction(wire, entry) {
            Ok(outcome) => outcome,
            Err(BusError::Timeout { .. }) => {
                // Abandon the bracket; the next start recovers the wire.
                self.stats.bus_timeouts += 1;
                self.faults
                    .record(FaultKind::BusTimeout, Some(entry.target), now_ms);
                return DispatchOutcome::BusStuck;
            }
        };

        match outcome {
            DispatchOutcome::Delivered { .. } => self.stats.delivered += 1,
            DispatchOutcome::AddressNotAcknowledged { target } => {
                self.stats.address_nacks += 1;
                self.faults
                    .record(FaultKind::NoAcknowledge, Some(target), now_ms);
            }
            DispatchOutcome::CommandNotAcknowledged { target, .. } => {
                self.stats.command_nacks += 1;
                self.faults
                    .record(FaultKind::NoAcknowledge, Some(target), now_ms);
            }
            DispatchOutcome::BusStuck | DispatchOutcome::Idle => {}
        }
        outcome
    }

    fn run_transaction(
        &mut self,
        wire: &mut Wire,
        entry: DispatchEntry,
    ) -> Result<DispatchOutcome, BusError> {
        wire.start()?;
        let ack = wire.write_byte(entry.target.header(WRITE))?;
        if !ack.is_ack() {
            wire.stop()?;
            return Ok(DispatchOutcome::AddressNotAcknowledged {
                target: entry.target,
            });
        }
        let ack = wire.write_byte(entry.command)?;
        wire.stop()?;
        if ack.is_ack() {
            Ok(DispatchOutcome::Delivered {
                target: entry.target,
                command: entry.command,
            })
        } else {
            Ok(DispatchOutcome::CommandNotAcknowledged {
                target: entry.target,
                command: entry.command,
            })
        }
    }

    /// Optional second transaction: read one status byte back from a unit.
    /// Returns `None` while the unit has nothing to report. The final byte
    /// is not-acknowledged, which tells the unit the read is over.
    pub fn poll_completion(
        &mut self,
        wire: &mut Wire,
        target: SubsystemAddress,
        now_ms: u64,
    ) -> Result<Option<u8>, BusError> {
        wire.start()?;
        let ack = wire.write_byte(target.header(READ))?;
        if !ack.is_ack() {
            wire.stop()?;
            self.faults
                .record(FaultKind::NoAcknowledge, Some(target), now_ms);
            return Ok(None);
        }
        let status = wire.read_byte(false)?;
        wire.stop()?;
        self.stats.completion_polls += 1;
        Ok(if status == STATUS_IDLE {
            None
        } else {
            Some(status)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EXTRACTION_ADDRESS, MIXING_ADDRESS, TRACTION_ADDRESS};

    fn entry(target: SubsystemAddress, command: u8) -> DispatchEntry {
        DispatchEntry { target, command }
    }

    #[test]
    fn test_empty_schedule_is_idle() {
        let mut schedule = DispatchSchedule::new();
        assert!(schedule.is_empty());
        assert_eq!(schedule.advance(), None);
    }

    #[test]
    fn test_schedule_cycles_in_order() {
        let mut schedule = DispatchSchedule::new();
        schedule.push(entry(EXTRACTION_ADDRESS, 0x01)).unwrap();
        schedule.push(entry(TRACTION_ADDRESS, 0x02)).unwrap();
        schedule.push(entry(MIXING_ADDRESS, 0x03)).unwrap();

        let picks: std::vec::Vec<u8> = (0..6)
            .filter_map(|_| schedule.advance())
            .map(|e| e.command)
            .collect();
        assert_eq!(picks, vec![0x01, 0x02, 0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_schedule_capacity_bound() {
        let mut schedule = DispatchSchedule::new();
        for i in 0..MAX_SCHEDULE_ENTRIES {
            schedule
                .push(entry(EXTRACTION_ADDRESS, i as u8))
                .unwrap();
        }
        assert!(schedule.push(entry(EXTRACTION_ADDRESS, 0xFF)).is_err());
    }
}
