pub mod colored_topo;
pub mod controller;
pub mod error;
pub mod graph;
pub mod remote;
pub mod tags;
pub mod volume;

pub use controller::JobController;
pub use error::{Result, RunnerError};
