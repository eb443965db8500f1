use harvbus::actuator::RecordingActuator;
use harvbus::bus::{Ack, Wire, WireEvent};
use harvbus::config::{
    extraction_unit, traction_unit, BEGIN_EXTRACTION_CYCLE, EXTRACTION_ADDRESS, TRACTION_ADDRESS,
};
use harvbus::master::{DispatchEntry, DispatchOutcome, DispatchSchedule, MasterDispatcher};
use harvbus::slave::SlaveCommandHandler;

fn extraction_wire() -> (Wire, RecordingActuator) {
    let recorder = RecordingActuator::default();
    let mut wire = Wire::new();
    wire.attach(Box::new(SlaveCommandHandler::new(
        extraction_unit(),
        recorder.clone(),
    )))
    .unwrap();
    (wire, recorder)
}

fn dispatcher_for(target: harvbus::config::SubsystemAddress, command: u8) -> MasterDispatcher {
    let mut schedule = DispatchSchedule::new();
    schedule.push(DispatchEntry { target, command }).unwrap();
    MasterDispatcher::new(schedule)
}

#[test]
fn test_dispatch_frames_exactly_address_and_command() {
    let (mut wire, recorder) = extraction_wire();
    let mut dispatcher = dispatcher_for(EXTRACTION_ADDRESS, BEGIN_EXTRACTION_CYCLE);

    let outcome = dispatcher.dispatch_once(&mut wire, 0);
    assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));

    // One start, address+write, command byte, one stop - nothing else.
    let trace = wire.take_trace();
    assert_eq!(
        trace.as_slice(),
        &[
            WireEvent::Start,
            WireEvent::Byte {
                value: 0xA2,
                ack: Ack::Ack
            },
            WireEvent::Byte {
                value: 0x01,
                ack: Ack::Ack
            },
            WireEvent::Stop,
        ]
    );
    assert_eq!(recorder.calls(), vec![0x01]);
}

#[test]
fn test_back_to_back_dispatches_stay_separately_framed() {
    let (mut wire, _recorder) = extraction_wire();
    let mut dispatcher = dispatcher_for(EXTRACTION_ADDRESS, BEGIN_EXTRACTION_CYCLE);

    dispatcher.dispatch_once(&mut wire, 0);
    dispatcher.dispatch_once(&mut wire, 1000);

    let trace = wire.take_trace();
    assert_eq!(trace.len(), 8);

    // No residual state carries between ticks: two byte-identical,
    // independently framed transactions, never merged into one.
    let (first, second) = trace.split_at(4);
    assert_eq!(first, second);
    assert_eq!(first[0], WireEvent::Start);
    assert_eq!(first[3], WireEvent::Stop);
}

#[test]
fn test_delivered_outcome_updates_stats() {
    let (mut wire, _recorder) = extraction_wire();
    let mut dispatcher = dispatcher_for(EXTRACTION_ADDRESS, BEGIN_EXTRACTION_CYCLE);

    let outcome = dispatcher.dispatch_once(&mut wire, 0);
    assert_eq!(
        outcome,
        DispatchOutcome::Delivered {
            target: EXTRACTION_ADDRESS,
            command: BEGIN_EXTRACTION_CYCLE,
        }
    );

    let stats = dispatcher.stats();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.address_nacks, 0);
    assert_eq!(stats.bus_timeouts, 0);
}

#[test]
fn test_unknown_command_is_delivered_but_not_applied() {
    // Scenario B: traction has no entry for 0x01. The unit drains both
    // bytes and acknowledges receipt, so no bus error is raised, but the
    // actuator never runs.
    let recorder = RecordingActuator::default();
    let mut wire = Wire::new();
    wire.attach(Box::new(SlaveCommandHandler::new(
        traction_unit(),
        recorder.clone(),
    )))
    .unwrap();
    let mut dispatcher = dispatcher_for(TRACTION_ADDRESS, 0x01);

    let outcome = dispatcher.dispatch_once(&mut wire, 0);
    assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));
    assert!(recorder.calls().is_empty());

    let (_, _, diagnostics) = wire.units().next().unwrap();
    assert_eq!(diagnostics.unknown_commands, 1);
    assert_eq!(diagnostics.commands_applied, 0);
}

#[test]
fn test_schedule_rotates_across_targets() {
    let mut wire = Wire::new();
    wire.attach(Box::new(SlaveCommandHandler::new(
        extraction_unit(),
        RecordingActuator::default(),
    )))
    .unwrap();
    wire.attach(Box::new(SlaveCommandHandler::new(
        traction_unit(),
        RecordingActuator::default(),
    )))
    .unwrap();

    let mut schedule = DispatchSchedule::new();
    schedule
        .push(DispatchEntry {
            target: EXTRACTION_ADDRESS,
            command: BEGIN_EXTRACTION_CYCLE,
        })
        .unwrap();
    schedule
        .push(DispatchEntry {
            target: TRACTION_ADDRESS,
            command: 0x01,
        })
        .unwrap();
    let mut dispatcher = MasterDispatcher::new(schedule);

    let first = dispatcher.dispatch_once(&mut wire, 0);
    let second = dispatcher.dispatch_once(&mut wire, 1000);
    let third = dispatcher.dispatch_once(&mut wire, 2000);

    assert!(matches!(
        first,
        DispatchOutcome::Delivered { target, .. } if target == EXTRACTION_ADDRESS
    ));
    assert!(matches!(
        second,
        DispatchOutcome::Delivered { target, .. } if target == TRACTION_ADDRESS
    ));
    assert!(matches!(
        third,
        DispatchOutcome::Delivered { target, .. } if target == EXTRACTION_ADDRESS
    ));
}

#[test]
fn test_completion_poll_consumes_status() {
    let (mut wire, _recorder) = extraction_wire();
    let mut dispatcher = dispatcher_for(EXTRACTION_ADDRESS, BEGIN_EXTRACTION_CYCLE);

    dispatcher.dispatch_once(&mut wire, 0);

    let first = dispatcher
        .poll_completion(&mut wire, EXTRACTION_ADDRESS, 100)
        .unwrap();
    assert_eq!(first, Some(BEGIN_EXTRACTION_CYCLE));

    // The status byte was consumed by the first read.
    let second = dispatcher
        .poll_completion(&mut wire, EXTRACTION_ADDRESS, 200)
        .unwrap();
    assert_eq!(second, None);
}
