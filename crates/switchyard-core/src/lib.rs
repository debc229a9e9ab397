pub mod backend;
pub mod cancel;
pub mod config;
pub mod error;
pub mod import;
pub mod io;
pub mod notify;
pub mod orchestrator;
pub mod paths;
pub mod proxy_switch;
pub mod reconcile;
pub mod sequencer;
pub mod service;
pub mod steps;
pub mod store;
pub mod transition;
pub mod types;

#[cfg(test)]
mod fakes;

pub use error::{Result, SwitchError};
pub use orchestrator::{ActivateOptions, ActivationReport, Orchestrator};
