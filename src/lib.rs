//! # Multiwan
//!
//! Fault-tolerant multi-WAN policy routing with automatic failover.
//!
//! Multiwan keeps outbound traffic balanced across several independent
//! uplinks (interface + gateway pairs), each with its own kernel routing
//! table and policy-rule priorities. When an uplink's gateway stops
//! answering or its address changes, the default route is recomputed and
//! reinstalled; when every eligible uplink looks dead, a fail-safe keeps
//! them all routing rather than leaving the host with no route at all.
//!
//! ## Architecture
//!
//! ┌────────────────────────────────────────────────────────┐
//! │                    Monitor (cycle loop)                │
//! ├──────────────┬─────────────────────────┬───────────────┤
//! │  LinkProbe   │   UplinkSet / Uplink    │  CommandSink  │
//! │ (observed    │  (pure decision layer:  │ (executes the │
//! │  addresses,  │   state transitions →   │  emitted `ip` │
//! │  ping tests) │   ordered command list) │  commands)    │
//! └──────────────┴─────────────────────────┴───────────────┘
//!
//! The decision layer in [`routing`] performs no I/O: it consumes freshly
//! observed link facts and produces shell-level routing commands plus
//! human-readable status messages. Everything around it is glue.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)] // ASCII diagram in crate docs
#![allow(clippy::struct_excessive_bools)] // uplink flags are the data model
#![allow(clippy::cast_possible_truncation)]

pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
pub mod probe;
pub mod routing;
pub mod sink;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use routing::{Uplink, UplinkSet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, MonitorConfig, RoutingConfig, UplinkConfig};
    pub use crate::error::{Error, Result};
    pub use crate::monitor::Monitor;
    pub use crate::probe::LinkProbe;
    pub use crate::routing::{ChangeReport, HealthReport, Uplink, UplinkSet};
    pub use crate::sink::{CommandSink, PrintSink, ShellSink};
    pub use crate::types::{Fwmark, LinkAddress, RulePriority, TableId};
}
