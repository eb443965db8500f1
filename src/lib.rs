//! # Harvester Command Bus
//!
//! An embedded-style simulation of the command bus that links the subsystem
//! units of a harvesting machine: the control unit acts as the single bus
//! master and periodically dispatches one-byte actuation commands over a
//! shared two-wire serial bus; the extraction, traction and mixing units act
//! as slaves that decode commands in interrupt context and drive their local
//! effectors.
//!
//! ## Features
//!
//! - **Wire-accurate framing**: start / address+direction / data / stop
//!   brackets with per-byte acknowledge, captured in an inspectable trace
//! - **Bounded waits**: every busy poll carries a spin bound and surfaces a
//!   stuck bus as a recoverable fault instead of hanging
//! - **Explicit slave state machine**: address/data phase tracking in an
//!   atomic cell, with desync detection and resynchronization
//! - **Fault accounting**: timeouts, missing acknowledges, unknown commands
//!   and partial transactions are counted and logged, never fatal
//! - **Completion polling**: optional slave-to-master status read after a
//!   delivered command
//!
//! ## Quick Start
//!
//! ```rust
//! use harvbus::HarvesterAgent;
//!
//! // Build the machine: wire, three subsystem units, control dispatcher.
//! let mut agent = HarvesterAgent::new();
//!
//! // One period of the external timing source.
//! let telemetry = agent.tick();
//! assert_eq!(telemetry.dispatch.delivered, 1);
//! ```
//!
//! ## Architecture
//!
//! - [`bus`] - the simulated two-wire medium and transport primitives
//! - [`config`] - fixed per-unit address and command tables
//! - [`master`] - periodic command dispatch and completion polling
//! - [`slave`] - interrupt-driven address/command decoding
//! - [`actuator`] - the boundary contract for subsystem effectors
//! - [`fault`] - fault taxonomy, counters and bounded history
//! - [`agent`] - whole-machine orchestration and telemetry

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod actuator;
pub mod agent;
pub mod bus;
pub mod config;
pub mod fault;
pub mod master;
pub mod slave;

// Re-export main public types for convenience
pub use agent::{BusTelemetry, HarvesterAgent};
pub use bus::{Ack, BusError, BusSlave, ByteEvent, Wire, WireEvent};
pub use config::{SubsystemAddress, UnitConfig, UnitId};
pub use master::{DispatchEntry, DispatchOutcome, DispatchSchedule, MasterDispatcher};
pub use slave::{Phase, SlaveCommandHandler, SlaveDiagnostics};
