//! The policy-routing decision layer.
//!
//! This module is the heart of Multiwan: a pure, synchronous state machine
//! that turns observed link facts into an ordered list of `ip`/`sysctl`
//! command strings. It performs no I/O of its own — executing the commands
//! is the [`crate::sink`]'s job, gathering the facts is the
//! [`crate::probe`]'s.
//!
//! [`Uplink`] owns the routing state of one link; [`UplinkSet`] owns the
//! fixed, ordered collection of them and all set-wide decisions (priority
//! layout, default-route computation, the all-down fail-safe).

pub mod command;
mod set;
mod uplink;

pub use set::{ChangeReport, HealthReport, UplinkSet};
pub use uplink::Uplink;
