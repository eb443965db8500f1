use crate::actuator::{CountingActuator, ExtractionActuator};
use crate::bus::{BusError, Wire};
use crate::config::{
    extraction_unit, mixing_unit, traction_unit, SubsystemAddress, UnitId, BEGIN_EXTRACTION_CYCLE,
    EXTRACTION_ADDRESS,
};
use crate::fault::{FaultCounters, FaultKind, FaultRecord};
use crate::master::{
    DispatchEntry, DispatchOutcome, DispatchSchedule, DispatchStats, MasterDispatcher,
};
use crate::slave::{SlaveCommandHandler, SlaveDiagnostics};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UnitReport {
    pub unit: UnitId,
    pub address: u8,
    pub diagnostics: SlaveDiagnostics,
}

/// Snapshot emitted after every tick: what the master just did, what each
/// unit has seen so far, and the running fault tallies.
#[derive(Debug, Clone, Serialize)]
pub struct BusTelemetry {
    pub timestamp: u64,
    pub tick: u32,
    pub outcome: DispatchOutcome,
    pub completion: Option<u8>,
    pub dispatch: DispatchStats,
    pub fault_counters: FaultCounters,
    pub units: Vec<UnitReport>,
}

/// Orchestrator for the whole machine: the wire with the three subsystem
/// units attached, and the control unit's dispatcher. One `tick()` is one
/// period of the external timing source.
pub struct HarvesterAgent {
    wire: Wire,
    dispatcher: MasterDispatcher,
    start_time: Instant,
    tick_count: u32,
    // Last folded per-unit diagnostics, keyed by raw address.
    folded: Vec<(u8, SlaveDiagnostics)>,
}

impl HarvesterAgent {
    pub fn new() -> Self {
        let mut wire = Wire::new();
        // Attaching to a freshly built wire cannot collide or overflow.
        let _ = wire.attach(Box::new(SlaveCommandHandler::new(
            extraction_unit(),
            ExtractionActuator::default(),
        )));
        let _ = wire.attach(Box::new(SlaveCommandHandler::new(
            traction_unit(),
            CountingActuator::default(),
        )));
        let _ = wire.attach(Box::new(SlaveCommandHandler::new(
            mixing_unit(),
            CountingActuator::default(),
        )));

        let mut schedule = DispatchSchedule::new();
        let _ = schedule.push(DispatchEntry {
            target: EXTRACTION_ADDRESS,
            command: BEGIN_EXTRACTION_CYCLE,
        });

        Self {
            wire,
            dispatcher: MasterDispatcher::new(schedule),
            start_time: Instant::now(),
            tick_count: 0,
            folded: Vec::new(),
        }
    }

    pub fn wire(&self) -> &Wire {
        &self.wire
    }

    /// Mutable wire access, used to stage faults (offline units, wedged
    /// peripheral) before a tick.
    pub fn wire_mut(&mut self) -> &mut Wire {
        &mut self.wire
    }

    pub fn dispatcher(&self) -> &MasterDispatcher {
        &self.dispatcher
    }

    pub fn recent_faults(&self) -> &[FaultRecord] {
        self.dispatcher.fault_log().history()
    }

    /// One period of the machine: issue the next scheduled command, poll
    /// the target for completion if it was delivered, fold slave-side
    /// diagnostics into the central fault log, and snapshot telemetry.
    pub fn tick(&mut self) -> BusTelemetry {
        let now_ms = self.start_time.elapsed().as_millis() as u64;
        self.tick_count = self.tick_count.wrapping_add(1);

        let outcome = self.dispatcher.dispatch_once(&mut self.wire, now_ms);

        let completion = match outcome {
            DispatchOutcome::Delivered { target, .. } => {
                match self.dispatcher.poll_completion(&mut self.wire, target, now_ms) {
                    Ok(status) => status,
                    Err(BusError::Timeout { .. }) => {
                        self.dispatcher.fault_log_mut().record(
                            FaultKind::BusTimeout,
                            Some(target),
                            now_ms,
                        );
                        None
                    }
                }
            }
            _ => None,
        };

        self.fold_slave_faults(now_ms);

        BusTelemetry {
            timestamp: now_ms,
            tick: self.tick_count,
            outcome,
            completion,
            dispatch: self.dispatcher.stats(),
            fault_counters: self.dispatcher.fault_log().counters(),
            units: self
                .wire
                .units()
                .map(|(unit, address, diagnostics)| UnitReport {
                    unit,
                    address: address.raw(),
                    diagnostics,
                })
                .collect(),
        }
    }

    // Slave handlers count unknown commands and phase resyncs locally, in
    // interrupt context; here the deltas since the last tick become proper
    // fault records in the master's log.
    fn fold_slave_faults(&mut self, now_ms: u64) {
        let snapshots: Vec<(SubsystemAddress, SlaveDiagnostics)> = self
            .wire
            .units()
            .map(|(_, address, diagnostics)| (address, diagnostics))
            .collect();

        for (address, diagnostics) in snapshots {
            let previous = self
                .folded
                .iter()
                .find(|(raw, _)| *raw == address.raw())
                .map(|(_, d)| *d)
                .unwrap_or_default();

            for _ in previous.unknown_commands..diagnostics.unknown_commands {
                self.dispatcher.fault_log_mut().record(
                    FaultKind::UnknownCommand,
                    Some(address),
                    now_ms,
                );
            }
            for _ in previous.phase_resyncs..diagnostics.phase_resyncs {
                self.dispatcher.fault_log_mut().record(
                    FaultKind::PartialTransaction,
                    Some(address),
                    now_ms,
                );
            }

            match self
                .folded
                .iter_mut()
                .find(|(raw, _)| *raw == address.raw())
            {
                Some(slot) => slot.1 = diagnostics,
                None => self.folded.push((address.raw(), diagnostics)),
            }
        }
    }
}

impl Default for HarvesterAgent {
    fn default() -> Self {
        Self::new()
    }
}
