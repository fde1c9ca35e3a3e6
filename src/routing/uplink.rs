//! Per-uplink routing state machine.

use std::net::IpAddr;

use crate::config::{RoutingConfig, UplinkConfig};
use crate::types::{fmt_opt_addr, Fwmark, LinkAddress, RulePriority, TableId};

use super::command;

/// One independently routable network path: an interface with its own
/// gateway, routing table and policy-rule priorities.
///
/// An `Uplink` is owned exclusively by an [`super::UplinkSet`] at a fixed
/// index equal to its id. Failover never adds or removes uplinks; it only
/// flips the `up`/`routing` flags.
#[derive(Debug, Clone)]
pub struct Uplink {
    /// Stable id, equal to the uplink's position in the set.
    id: usize,
    /// Interface name, immutable after construction.
    interface: String,
    /// Human-readable name used in status messages.
    description: String,
    /// Current address; absent while the link has no usable address.
    ip: Option<IpAddr>,
    /// Current gateway; absent while the link has no usable address.
    gateway: Option<IpAddr>,
    /// This uplink's own routing table.
    table: TableId,
    /// Priority of the source-address rule.
    priority1: RulePriority,
    /// Priority of the fwmark rule; assigned by the set so the values are
    /// unique across all uplinks.
    priority2: RulePriority,
    /// Firewall mark matched by the second rule.
    fwmark: Fwmark,
    /// Multipath weight; `None` means equal-weight nexthop.
    weight: Option<u32>,
    /// Whether this uplink may participate in the default route at all.
    default_route: bool,
    /// Whether this uplink is currently part of the default route.
    routing: bool,
    /// Last known link-health state.
    up: bool,
}

impl Uplink {
    /// Build an uplink from its configuration entry. `id` is the entry's
    /// position; `table`, `fwmark` and (absent an explicit setting)
    /// `priority1` are derived from it. `priority2` is assigned afterwards
    /// by the owning set, once the total uplink count is known.
    pub(crate) fn new(id: usize, cfg: &UplinkConfig, layout: &RoutingConfig) -> Self {
        let priority1 = cfg
            .priority
            .map_or_else(|| RulePriority(layout.base_priority + id as u32), RulePriority);
        Self {
            id,
            interface: cfg.interface.clone(),
            description: cfg
                .description
                .clone()
                .unwrap_or_else(|| cfg.interface.clone()),
            ip: cfg.ip,
            gateway: cfg.gateway,
            table: TableId(layout.base_table + id as u32),
            priority1,
            priority2: priority1, // placeholder until the set assigns it
            fwmark: Fwmark(layout.base_fwmark + id as u32),
            weight: cfg.weight,
            default_route: cfg.default_route,
            routing: cfg.routing.unwrap_or(cfg.default_route),
            up: false,
        }
    }

    pub(crate) fn set_priority2(&mut self, priority: RulePriority) {
        self.priority2 = priority;
    }

    /// Commands installing this uplink's own routes and rules.
    ///
    /// With no usable address there is nothing to install; the uplink is
    /// simply excluded from routing until it regains one.
    pub fn route_add_commands(&self) -> Vec<String> {
        let (Some(ip), Some(gateway)) = (self.ip, self.gateway) else {
            return Vec::new();
        };
        vec![
            command::route_replace_via(self.table, gateway, ip),
            command::rule_add_from(self.priority1, ip, self.table),
            command::rule_add_fwmark(self.priority2, self.fwmark, self.table),
        ]
    }

    /// Evaluate a freshly observed link-health signal.
    ///
    /// Returns `(up_changed, routing_changed, message)`. `routing` is
    /// recomputed as `default_route && up` only on an actual up-state
    /// transition, so a fail-safe override from a previous cycle survives
    /// cycles where nothing changed. No commands are produced here:
    /// default-route emission is centralized in the set so simultaneous
    /// transitions yield one route replacement, not one per uplink.
    pub(crate) fn test_routing(&mut self, observed_up: bool) -> (bool, bool, Option<String>) {
        if observed_up == self.up {
            return (false, false, None);
        }
        self.up = observed_up;
        let message = if observed_up {
            format!("uplink {} came back up", self.description)
        } else {
            format!("uplink {} went down", self.description)
        };
        let routing = self.default_route && self.up;
        let routing_changed = routing != self.routing;
        self.routing = routing;
        (true, routing_changed, Some(message))
    }

    /// Evaluate freshly observed addresses.
    ///
    /// On any change the stored addresses are updated and this uplink's own
    /// routing commands are re-issued. A gateway change on an uplink that
    /// currently participates in the default route additionally requests a
    /// shared default-route recomputation from the caller.
    pub(crate) fn detect_ip_changes(
        &mut self,
        observed: LinkAddress,
    ) -> (Vec<String>, bool, Option<String>) {
        let ip_changed = observed.ip != self.ip;
        let gateway_changed = observed.gateway != self.gateway;
        if !ip_changed && !gateway_changed {
            return (Vec::new(), false, None);
        }
        let message = format!(
            "uplink {}: address change detected: IP {} -> {}, gateway {} -> {}",
            self.description,
            fmt_opt_addr(self.ip),
            fmt_opt_addr(observed.ip),
            fmt_opt_addr(self.gateway),
            fmt_opt_addr(observed.gateway),
        );
        self.ip = observed.ip;
        self.gateway = observed.gateway;
        let need_default_route_update = gateway_changed && self.routing;
        (
            self.route_add_commands(),
            need_default_route_update,
            Some(message),
        )
    }

    /// Force this uplink back into the default route regardless of health.
    /// Returns whether the flag actually flipped.
    pub(crate) fn force_routing(&mut self) -> bool {
        let changed = !self.routing;
        self.routing = true;
        changed
    }

    /// Whether this uplink currently belongs in the default route: flagged
    /// routable and holding a usable address pair.
    pub(crate) fn is_routing_candidate(&self) -> bool {
        self.routing && self.ip.is_some() && self.gateway.is_some()
    }

    // Accessors

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn gateway(&self) -> Option<IpAddr> {
        self.gateway
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn priority1(&self) -> RulePriority {
        self.priority1
    }

    pub fn priority2(&self) -> RulePriority {
        self.priority2
    }

    pub fn fwmark(&self) -> Fwmark {
        self.fwmark
    }

    pub fn weight(&self) -> Option<u32> {
        self.weight
    }

    pub fn default_route(&self) -> bool {
        self.default_route
    }

    pub fn routing(&self) -> bool {
        self.routing
    }

    pub fn up(&self) -> bool {
        self.up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UplinkConfig;

    fn uplink(id: usize, ip: Option<&str>, gateway: Option<&str>) -> Uplink {
        let cfg = UplinkConfig {
            interface: format!("eth{id}"),
            ip: ip.map(|s| s.parse().unwrap()),
            gateway: gateway.map(|s| s.parse().unwrap()),
            ..UplinkConfig::for_interface(format!("eth{id}"))
        };
        let mut uplink = Uplink::new(id, &cfg, &RoutingConfig::default());
        uplink.set_priority2(RulePriority(40_100 + id as u32));
        uplink
    }

    #[test]
    fn route_add_commands_with_address() {
        let uplink = uplink(0, Some("198.51.100.2"), Some("198.51.100.1"));
        let commands = uplink.route_add_commands();
        assert_eq!(
            commands,
            vec![
                "ip route replace table 1 default via 198.51.100.1 src 198.51.100.2",
                "ip rule add priority 40000 from 198.51.100.2 lookup 1",
                "ip rule add priority 40100 fwmark 1 lookup 1",
            ]
        );
    }

    #[test]
    fn route_add_commands_without_address() {
        assert!(uplink(0, None, None).route_add_commands().is_empty());
        assert!(uplink(0, Some("198.51.100.2"), None)
            .route_add_commands()
            .is_empty());
    }

    #[test]
    fn up_transition_flips_routing_and_reports() {
        let mut uplink = uplink(0, Some("198.51.100.2"), Some("198.51.100.1"));
        assert!(!uplink.up());
        assert!(uplink.routing());

        // first observation: link is up, no transition on routing
        let (up_changed, routing_changed, message) = uplink.test_routing(true);
        assert!(up_changed);
        assert!(!routing_changed);
        assert_eq!(message.as_deref(), Some("uplink eth0 came back up"));

        // link dies: routing follows
        let (up_changed, routing_changed, message) = uplink.test_routing(false);
        assert!(up_changed);
        assert!(routing_changed);
        assert_eq!(message.as_deref(), Some("uplink eth0 went down"));
        assert!(!uplink.routing());

        // steady state: nothing to report
        let (up_changed, routing_changed, message) = uplink.test_routing(false);
        assert!(!up_changed);
        assert!(!routing_changed);
        assert!(message.is_none());
    }

    #[test]
    fn forced_routing_survives_steady_cycles() {
        let mut uplink = uplink(0, Some("198.51.100.2"), Some("198.51.100.1"));
        uplink.test_routing(true);
        uplink.test_routing(false);
        assert!(!uplink.routing());

        assert!(uplink.force_routing());
        assert!(!uplink.force_routing()); // already forced

        // link still down, no transition: the override must stick
        let (up_changed, routing_changed, _) = uplink.test_routing(false);
        assert!(!up_changed);
        assert!(!routing_changed);
        assert!(uplink.routing());
    }

    #[test]
    fn non_eligible_uplink_never_routes() {
        let cfg = UplinkConfig {
            default_route: false,
            ip: Some("10.1.0.2".parse().unwrap()),
            gateway: Some("10.1.0.1".parse().unwrap()),
            ..UplinkConfig::for_interface("eth9")
        };
        let mut uplink = Uplink::new(0, &cfg, &RoutingConfig::default());
        assert!(!uplink.routing());
        let (_, routing_changed, _) = uplink.test_routing(true);
        assert!(!routing_changed);
        assert!(!uplink.routing());
    }

    #[test]
    fn gateway_change_requests_default_route_update() {
        let mut uplink = uplink(0, Some("198.51.100.2"), Some("198.51.100.1"));
        uplink.test_routing(true);

        let observed = LinkAddress::new(
            Some("198.51.100.2".parse().unwrap()),
            Some("198.51.100.254".parse().unwrap()),
        );
        let (commands, need_update, message) = uplink.detect_ip_changes(observed);
        assert_eq!(commands.len(), 3);
        assert!(need_update);
        let message = message.unwrap();
        assert!(message.contains("198.51.100.1 -> 198.51.100.254"));
    }

    #[test]
    fn ip_only_change_does_not_request_default_route_update() {
        let mut uplink = uplink(0, Some("198.51.100.2"), Some("198.51.100.1"));
        uplink.test_routing(true);

        let observed = LinkAddress::new(
            Some("198.51.100.99".parse().unwrap()),
            Some("198.51.100.1".parse().unwrap()),
        );
        let (commands, need_update, message) = uplink.detect_ip_changes(observed);
        assert_eq!(commands.len(), 3);
        assert!(!need_update);
        assert!(message.is_some());
    }

    #[test]
    fn gateway_change_on_non_routing_uplink_is_local() {
        let mut uplink = uplink(0, Some("198.51.100.2"), Some("198.51.100.1"));
        uplink.test_routing(true);
        uplink.test_routing(false); // routing now false

        let observed = LinkAddress::new(
            Some("198.51.100.2".parse().unwrap()),
            Some("198.51.100.254".parse().unwrap()),
        );
        let (commands, need_update, _) = uplink.detect_ip_changes(observed);
        assert!(!commands.is_empty());
        assert!(!need_update);
    }

    #[test]
    fn address_loss_produces_no_commands() {
        let mut uplink = uplink(0, Some("198.51.100.2"), Some("198.51.100.1"));
        let (commands, _, message) = uplink.detect_ip_changes(LinkAddress::default());
        assert!(commands.is_empty());
        assert!(message.unwrap().contains("198.51.100.2 -> none"));
        assert!(uplink.ip().is_none());
    }

    #[test]
    fn unchanged_addresses_are_silent() {
        let mut uplink = uplink(0, Some("198.51.100.2"), Some("198.51.100.1"));
        let observed = LinkAddress::new(uplink.ip(), uplink.gateway());
        let (commands, need_update, message) = uplink.detect_ip_changes(observed);
        assert!(commands.is_empty());
        assert!(!need_update);
        assert!(message.is_none());
    }
}
