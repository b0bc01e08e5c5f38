//! # Signal Scope Core Library
//!
//! Streamed JSON signal samples come in over a single TCP connection and are retained per
//! channel until a downstream consumer withdraws them, oldest first, a bounded number at
//! a time.
//!
//! ## Crate Structure
//!
//! - **`store`**: the per-channel sample store (`SignalStore`, `ChannelBuffer`) and the
//!   `StoreFacade` trait callers depend on.
//! - **`record`**: `StructuredRecord` and the `RecordDecoder` enforcing the `"Time"` +
//!   channel field contract.
//! - **`network`**: the single-client `IngestionListener`, its streaming JSON framing, and
//!   the `SignalSender` producer.
//! - **`config`**: figment-based configuration (TOML file + `SIGNAL_SCOPE_` environment).
//! - **`error`**: error enums for records, the store, and the listener.
//! - **`telemetry`**: `tracing-subscriber` initialisation.
//!
//! ## Example
//! ```no_run
//! use signal_scope::config::ListenerConfig;
//! use signal_scope::network::{IngestionListener, ShutdownHandle};
//! use signal_scope::store::{SignalStore, StoreFacade};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SignalStore::new());
//! let shutdown = ShutdownHandle::new();
//! let summary = IngestionListener::start(ListenerConfig::default(), store.clone(), shutdown.signal())?;
//! println!("ingested {} records", summary.records_ingested);
//! println!("{:?}", store.egress_records("Signal_0", 10));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod record;
pub mod store;
pub mod telemetry;

pub use error::{AppResult, ScopeError};
pub use record::{RecordDecoder, StructuredRecord};
pub use store::{ChannelId, Sample, SignalStore, StoreFacade};
