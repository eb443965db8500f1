use crate::config::SubsystemAddress;
use heapless::Vec;
use serde::{Deserialize, Serialize};

const MAX_FAULT_HISTORY: usize = 64;

/// Everything that can go wrong on the bus. None of these is fatal; the
/// machine keeps attempting subsequent scheduled dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// A peripheral busy flag never cleared within the spin bound.
    BusTimeout,
    /// A transmitted byte was not acknowledged by any receiver.
    NoAcknowledge,
    /// A unit received a command byte not present in its table.
    UnknownCommand,
    /// A unit's phase tracking desynchronized from the actual bus state
    /// and was resynchronized at the next address or stop boundary.
    PartialTransaction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaultRecord {
    pub id: u32,
    pub kind: FaultKind,
    pub address: Option<SubsystemAddress>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct FaultCounters {
    pub bus_timeouts: u32,
    pub no_acknowledges: u32,
    pub unknown_commands: u32,
    pub partial_transactions: u32,
}

#[derive(Debug)]
pub struct FaultLog {
    history: Vec<FaultRecord, MAX_FAULT_HISTORY>,
    counters: FaultCounters,
    next_fault_id: u32,
}

impl FaultLog {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            counters: FaultCounters::default(),
            next_fault_id: 1,
        }
    }

    pub fn record(
        &mut self,
        kind: FaultKind,
        address: Option<SubsystemAddress>,
        timestamp: u64,
    ) -> u32 {
        let fault_id = self.next_fault_id;
        self.next_fault_id = self.next_fault_id.wrapping_add(1);

        match kind {
            FaultKind::BusTimeout => self.counters.bus_timeouts += 1,
            FaultKind::NoAcknowledge => self.counters.no_acknowledges += 1,
            FaultKind::UnknownCommand => self.counters.unknown_commands += 1,
            FaultKind::PartialTransaction => self.counters.partial_transactions += 1,
        }

        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(FaultRecord {
            id: fault_id,
            kind,
            address,
            timestamp,
        });

        fault_id
    }

    pub fn history(&self) -> &[FaultRecord] {
        &self.history
    }

    pub fn counters(&self) -> FaultCounters {
        self.counters
    }
}

impl Default for FaultLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EXTRACTION_ADDRESS;

    #[test]
    fn test_record_and_count() {
        let mut log = FaultLog::new();

        let first = log.record(FaultKind::NoAcknowledge, Some(EXTRACTION_ADDRESS), 1000);
        let second = log.record(FaultKind::BusTimeout, None, 2000);

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(log.history().len(), 2);
        assert_eq!(log.counters().no_acknowledges, 1);
        assert_eq!(log.counters().bus_timeouts, 1);
        assert_eq!(log.counters().unknown_commands, 0);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut log = FaultLog::new();

        for i in 0..(MAX_FAULT_HISTORY as u64 + 4) {
            log.record(FaultKind::UnknownCommand, None, i);
        }

        assert_eq!(log.history().len(), MAX_FAULT_HISTORY);
        // Oldest records were evicted; counters keep the full tally.
        assert_eq!(log.history()[0].timestamp, 4);
        assert_eq!(log.counters().unknown_commands, MAX_FAULT_HISTORY as u32 + 4);
    }
}
