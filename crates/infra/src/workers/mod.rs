//! Background workers.

pub mod trial_sweeper;

pub use trial_sweeper::{TrialSweeper, WorkerHandle};
