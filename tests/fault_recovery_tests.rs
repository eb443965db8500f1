use harvbus::actuator::RecordingActuator;
use harvbus::bus::{Ack, Wire, WireEvent};
use harvbus::config::{
    extraction_unit, BEGIN_EXTRACTION_CYCLE, EXTRACTION_ADDRESS, TRACTION_ADDRESS,
};
use harvbus::fault::FaultKind;
use harvbus::master::{DispatchEntry, DispatchOutcome, DispatchSchedule, MasterDispatcher};
use harvbus::slave::SlaveCommandHandler;

fn dispatcher_for(target: harvbus::config::SubsystemAddress, command: u8) -> MasterDispatcher {
    let mut schedule = DispatchSchedule::new();
    schedule.push(DispatchEntry { target, command }).unwrap();
    MasterDispatcher::new(schedule)
}

#[test]
fn test_absent_unit_aborts_before_data_byte() {
    // Scenario C: nothing answers at the traction address. The fault is
    // recorded and the command byte is never attempted.
    let mut wire = Wire::new();
    let mut dispatcher = dispatcher_for(TRACTION_ADDRESS, 0x01);

    let outcome = dispatcher.dispatch_once(&mut wire, 0);
    assert_eq!(
        outcome,
        DispatchOutcome::AddressNotAcknowledged {
            target: TRACTION_ADDRESS,
        }
    );

    let trace = wire.take_trace();
    assert_eq!(
        trace.as_slice(),
        &[
            WireEvent::Start,
            WireEvent::Byte {
                value: 0xA4,
                ack: Ack::Nack
            },
            WireEvent::Stop,
        ]
    );

    let faults = dispatcher.fault_log();
    assert_eq!(faults.counters().no_acknowledges, 1);
    assert_eq!(faults.history()[0].kind, FaultKind::NoAcknowledge);
    assert_eq!(faults.history()[0].address, Some(TRACTION_ADDRESS));
}

#[test]
fn test_offline_unit_recovers_when_repowered() {
    let mut wire = Wire::new();
    wire.attach(Box::new(SlaveCommandHandler::new(
        extraction_unit(),
        RecordingActuator::default(),
    )))
    .unwrap();
    let mut dispatcher = dispatcher_for(EXTRACTION_ADDRESS, BEGIN_EXTRACTION_CYCLE);

    wire.set_online(EXTRACTION_ADDRESS, false);
    let outcome = dispatcher.dispatch_once(&mut wire, 0);
    assert!(matches!(
        outcome,
        DispatchOutcome::AddressNotAcknowledged { .. }
    ));

    // The dispatcher keeps trying; the next tick after power-up succeeds.
    wire.set_online(EXTRACTION_ADDRESS, true);
    let outcome = dispatcher.dispatch_once(&mut wire, 1000);
    assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));

    let stats = dispatcher.stats();
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.address_nacks, 1);
    assert_eq!(stats.delivered, 1);
}

#[test]
fn test_wedged_bus_times_out_and_recovers() {
    let mut wire = Wire::new();
    wire.attach(Box::new(SlaveCommandHandler::new(
        extraction_unit(),
        RecordingActuator::default(),
    )))
    .unwrap();
    let mut dispatcher = dispatcher_for(EXTRACTION_ADDRESS, BEGIN_EXTRACTION_CYCLE);

    wire.wedge();
    let outcome = dispatcher.dispatch_once(&mut wire, 0);
    assert_eq!(outcome, DispatchOutcome::BusStuck);
    assert_eq!(dispatcher.stats().bus_timeouts, 1);
    assert_eq!(
        dispatcher.fault_log().history()[0].kind,
        FaultKind::BusTimeout
    );

    // Nothing was framed while the bus was stuck.
    assert!(wire.trace().is_empty());

    wire.release();
    let outcome = dispatcher.dispatch_once(&mut wire, 1000);
    assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));
    assert_eq!(wire.trace().len(), 4);
}

#[test]
fn test_poll_completion_of_absent_unit_records_fault() {
    let mut wire = Wire::new();
    let mut dispatcher = dispatcher_for(TRACTION_ADDRESS, 0x01);

    let status = dispatcher
        .poll_completion(&mut wire, TRACTION_ADDRESS, 0)
        .unwrap();
    assert_eq!(status, None);
    assert_eq!(dispatcher.fault_log().counters().no_acknowledges, 1);
    assert_eq!(dispatcher.stats().completion_polls, 0);
}
