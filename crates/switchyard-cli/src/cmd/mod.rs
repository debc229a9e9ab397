pub mod activate;
pub mod config;
pub mod import;
pub mod reactivate;
pub mod reconcile;
pub mod select;
pub mod service;
pub mod status;
