//! Core types used throughout Multiwan.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Kernel routing table identifier.
///
/// Each uplink owns one table, derived from its id at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl TableId {
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    /// The table immediately above this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Policy-rule priority. Lower values are evaluated first by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RulePriority(pub u32);

impl RulePriority {
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    /// The priority immediately below this one (numerically above).
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RulePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Firewall mark matched by an uplink's second policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fwmark(pub u32);

impl fmt::Display for Fwmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Freshly observed address facts for one uplink, supplied once per
/// monitoring cycle by an external probe.
///
/// Both fields absent is the first-class "link down" representation for
/// dial-up style interfaces; it is never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkAddress {
    /// Current interface address, if any.
    pub ip: Option<IpAddr>,
    /// Current gateway address, if any.
    pub gateway: Option<IpAddr>,
}

impl LinkAddress {
    pub fn new(ip: Option<IpAddr>, gateway: Option<IpAddr>) -> Self {
        Self { ip, gateway }
    }

    /// Whether the link has a usable address pair.
    pub fn is_usable(&self) -> bool {
        self.ip.is_some() && self.gateway.is_some()
    }
}

/// Format an optional address for status messages.
pub(crate) fn fmt_opt_addr(addr: Option<IpAddr>) -> String {
    addr.map_or_else(|| "none".to_string(), |a| a.to_string())
}
