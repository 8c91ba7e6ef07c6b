//! Keeper module - Band-keeping control loop
//!
//! `pass` sequences one read-decide-act cycle; `scheduler` repeats it on an
//! interval with at most one pass in flight.

pub mod pass;
pub mod scheduler;

pub use pass::{
    Collaborators, ControlLoop, PassFailure, PassInputs, PassOutcome, PassReport, PassState,
};
pub use scheduler::{Scheduler, SchedulerStats};
