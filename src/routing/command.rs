//! Shell-level routing command formatting.
//!
//! Every function returns one line to be run against the host's routing
//! subsystem. Keeping the formatting in one place means the decision layer
//! reads as state transitions, and the tests have a single source of truth
//! for the expected command shapes.

use std::net::IpAddr;

use crate::types::{Fwmark, RulePriority, TableId};

/// Marker appended to commands that are expected to fail when the object
/// they delete does not exist. The sink treats failures of such commands
/// as noise.
pub const SUPPRESS_FAILURE: &str = "&> /dev/null";

/// Enable IPv4 forwarding.
pub fn enable_forwarding() -> String {
    "echo 1 > /proc/sys/net/ipv4/ip_forward".to_string()
}

/// Set the reverse-path-filter mode for one interface scope
/// (`all` or an interface name).
///
/// Mode 2 (loose) is required on uplink interfaces: under multipath
/// routing, return traffic for a connection may legitimately arrive on a
/// different interface than the one its packets left from.
pub fn rp_filter(scope: &str, mode: u8) -> String {
    format!("echo {mode} > /proc/sys/net/ipv4/conf/{scope}/rp_filter")
}

/// Delete the policy rule at a priority, tolerating its absence.
pub fn rule_del(priority: RulePriority) -> String {
    format!("ip rule del priority {priority} {SUPPRESS_FAILURE}")
}

/// Flush a routing table, tolerating its absence.
pub fn table_del(table: TableId) -> String {
    format!("ip route del table {table} {SUPPRESS_FAILURE}")
}

/// Rule sending traffic from a source address to an uplink's table.
pub fn rule_add_from(priority: RulePriority, ip: IpAddr, table: TableId) -> String {
    format!("ip rule add priority {priority} from {ip} lookup {table}")
}

/// Rule sending firewall-marked traffic to an uplink's table.
pub fn rule_add_fwmark(priority: RulePriority, fwmark: Fwmark, table: TableId) -> String {
    format!("ip rule add priority {priority} fwmark {fwmark} lookup {table}")
}

/// Catch-all rule: first packets of new outbound connections are looked up
/// in the shared default-route table.
pub fn rule_add_catch_all(priority: RulePriority, table: TableId) -> String {
    format!("ip rule add priority {priority} from all lookup {table}")
}

/// Install an uplink's own default route in its table, with the source
/// address pinned so locally originated traffic leaves with the right IP.
pub fn route_replace_via(table: TableId, gateway: IpAddr, src: IpAddr) -> String {
    format!("ip route replace table {table} default via {gateway} src {src}")
}

/// Replace the shared default route. `nexthops` is either `via <gw>`,
/// one or more `nexthop via <gw>[ weight <w>]` clauses, or empty when no
/// uplink is currently routable.
pub fn route_replace_default(table: TableId, nexthops: &str) -> String {
    if nexthops.is_empty() {
        format!("ip route replace table {table} default")
    } else {
        format!("ip route replace table {table} default {nexthops}")
    }
}

/// Flush the kernel route cache so changes take effect immediately.
pub fn flush_cache() -> String {
    "ip route flush cache".to_string()
}

/// Whether a command line is a defensive delete whose failure the sink
/// should swallow.
pub fn failure_suppressed(command: &str) -> bool {
    command.ends_with(SUPPRESS_FAILURE)
}
