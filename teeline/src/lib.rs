//! # teeline: reservation lifecycle engine
//!
//! Automates booking a recurring tee time the moment the club's window
//! opens. The engine owns the pending-reservation backlog: which request
//! to process next, the time-bounded claim lock that keeps concurrent
//! runners off the same entity, the bounded-retry policy with failure
//! classification, and the evidence trail (screenshots, attempt logs) that
//! makes every attempt auditable.
//!
//! The pieces an operator wires together:
//!
//! - a [`store::ReservationStore`], the single source of truth; all
//!   cross-runner coordination goes through its revision-guarded writes
//!   ([`store::memory::MemoryStore`] for tests,
//!   [`store::postgres::PostgresStore`] in production)
//! - an [`agent::AutomationAgent`], the external browser-automation
//!   driver that performs the actual booking and reports a tagged outcome
//! - an [`artifact::ArtifactStore`], where attempt evidence lands
//! - a [`runner::Runner`], the externally triggered run-once entry point
//!
//! Reservation state lives in the typestate parameter of
//! [`reservation::Reservation`]; transitions consume the old state and
//! persist the new one, so a terminal entity cannot be claimed again by
//! construction.

pub mod activation;
pub mod agent;
pub mod artifact;
pub mod error;
pub mod policy;
pub mod reservation;
pub mod runner;
pub mod store;
pub mod timing;

pub use error::{Error, Result};
pub use reservation::{
    AnyReservation, Course, Reservation, ReservationKey, ReservationRecord, SlotRequest, Status,
};
pub use runner::{RunReport, Runner, RunnerConfig};
