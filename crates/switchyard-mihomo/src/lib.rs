//! `switchyard-mihomo`: drives a running mihomo core through its external
//! controller (RESTful) API.
//!
//! ```text
//! MihomoClient   ← typed calls: /configs, /proxies, /connections
//!     │
//!     ▼
//! MihomoBackend  ← switchyard_core::backend::ProxyBackend
//!                  resolves profile uids to config files under <root>/profiles
//!
//! HttpImporter   ← switchyard_core::import::ProfileImporter
//!                  downloads subscriptions, optionally through the core
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod importer;
pub mod types;

pub use backend::MihomoBackend;
pub use client::MihomoClient;
pub use error::{MihomoError, Result};
pub use importer::HttpImporter;
