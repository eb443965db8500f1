use crate::config::BEGIN_EXTRACTION_CYCLE;
use std::cell::RefCell;
use std::rc::Rc;

/// Boundary contract for a unit's effector code.
///
/// Invoked synchronously from the slave's interrupt context with an opcode
/// already validated against the unit's command table. Implementations must
/// complete quickly: a slow actuator delays every further bus interrupt on
/// that unit and can stall the master mid-transaction.
pub trait Actuator {
    fn apply_actuation(&mut self, opcode: u8);
}

/// Extraction effector stub. The electromechanical sequence itself lives
/// outside this crate; this only tracks what was requested.
#[derive(Debug, Default)]
pub struct ExtractionActuator {
    pub cycles_started: u32,
    pub cycle_active: bool,
}

impl Actuator for ExtractionActuator {
    fn apply_actuation(&mut self, opcode: u8) {
        if opcode == BEGIN_EXTRACTION_CYCLE {
            self.cycle_active = true;
            self.cycles_started += 1;
        }
    }
}

/// Effector stub for units whose command semantics are not yet defined
/// (traction, mixing). Counts invocations and nothing else; unreachable
/// until someone populates those command tables.
#[derive(Debug, Default)]
pub struct CountingActuator {
    pub invocations: u32,
}

impl Actuator for CountingActuator {
    fn apply_actuation(&mut self, _opcode: u8) {
        self.invocations += 1;
    }
}

/// Test double that records every opcode it receives. Clones share the
/// same log, so a handle kept outside the handler observes calls made
/// inside interrupt context.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    calls: Rc<RefCell<Vec<u8>>>,
}

impl RecordingActuator {
    pub fn calls(&self) -> Vec<u8> {
        self.calls.borrow().clone()
    }
}

impl Actuator for RecordingActuator {
    fn apply_actuation(&mut self, opcode: u8) {
        self.calls.borrow_mut().push(opcode);
    }
}
