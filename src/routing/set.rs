//! The uplink collection controller.

use tracing::debug;

use crate::config::{RoutingConfig, UplinkConfig};
use crate::error::{Error, Result};
use crate::types::{LinkAddress, RulePriority, TableId};

use super::command;
use super::uplink::Uplink;

/// Outcome of a set-wide address-change evaluation.
#[derive(Debug, Default, Clone)]
pub struct ChangeReport {
    /// Routing commands to apply, in order.
    pub commands: Vec<String>,
    /// Human-readable change descriptions, in uplink order.
    pub messages: Vec<String>,
}

/// Outcome of a set-wide health test.
#[derive(Debug, Default, Clone)]
pub struct HealthReport {
    /// Routing commands to apply, in order.
    pub commands: Vec<String>,
    /// Human-readable transition descriptions, in uplink order. Empty
    /// unless at least one uplink's up-state changed this cycle.
    pub messages: Vec<String>,
    /// Whether the all-down fail-safe fired.
    pub fail_safe_fired: bool,
}

/// An ordered, fixed-size collection of [`Uplink`]s.
///
/// The set is assembled once from configuration and never grows or
/// shrinks; failover is expressed purely through the per-uplink
/// `up`/`routing` flags. All side effects are expressed as returned
/// command strings plus advisory messages — the set is a value-producing
/// decision layer and assumes single-writer access (callers serialize
/// monitoring cycles).
#[derive(Debug, Clone)]
pub struct UplinkSet {
    uplinks: Vec<Uplink>,
}

impl UplinkSet {
    /// Assemble the set. Entry order is canonical: it defines ids, table
    /// derivation and every iteration below.
    ///
    /// Fails fast on configuration errors, identifying the offending entry
    /// by index, rather than producing partially-initialized state.
    pub fn new(configs: &[UplinkConfig], layout: &RoutingConfig) -> Result<Self> {
        if configs.is_empty() {
            return Err(Error::Config("no uplinks configured".into()));
        }

        let count = configs.len() as u32;
        let mut uplinks = Vec::with_capacity(configs.len());
        for (id, cfg) in configs.iter().enumerate() {
            if cfg.interface.is_empty() {
                return Err(Error::invalid_uplink(id, "interface name is empty"));
            }
            if configs[..id].iter().any(|c| c.interface == cfg.interface) {
                return Err(Error::invalid_uplink(
                    id,
                    format!("duplicate interface {}", cfg.interface),
                ));
            }
            if cfg.weight == Some(0) {
                return Err(Error::invalid_uplink(id, "weight must be positive"));
            }
            uplinks.push(Uplink::new(id, cfg, layout));
        }

        // priority2 values live in their own band above every priority1,
        // unique by construction
        for (id, uplink) in uplinks.iter_mut().enumerate() {
            uplink.set_priority2(RulePriority(layout.base_priority + count + id as u32));
        }

        for (id, uplink) in uplinks.iter().enumerate() {
            let p1 = uplink.priority1();
            if uplinks[..id].iter().any(|u| u.priority1() == p1) {
                return Err(Error::invalid_uplink(
                    id,
                    format!("priority {p1} already in use"),
                ));
            }
            let band = layout.base_priority + count..layout.base_priority + 2 * count;
            if band.contains(&p1.0) {
                return Err(Error::invalid_uplink(
                    id,
                    format!("priority {p1} collides with the derived priority range"),
                ));
            }
        }

        if !uplinks.iter().any(Uplink::default_route) {
            return Err(Error::Config(
                "no uplink is eligible for the default route".into(),
            ));
        }

        Ok(Self { uplinks })
    }

    /// The uplinks, in id order.
    pub fn uplinks(&self) -> &[Uplink] {
        &self.uplinks
    }

    pub fn len(&self) -> usize {
        self.uplinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uplinks.is_empty()
    }

    /// The shared table holding the default route for first packets of new
    /// outbound connections: one above the highest per-uplink table.
    pub fn shared_table(&self) -> TableId {
        self.tables_span().1.next()
    }

    /// Priority of the catch-all rule pointing at [`Self::shared_table`]:
    /// one above the highest priority in use.
    pub fn catch_all_priority(&self) -> RulePriority {
        self.priority_span().1.next()
    }

    /// Span over every priority in use, explicit `priority1` values
    /// included: an explicit priority may sit above the derived band, and
    /// both the catch-all rule and the defensive deletes must cover it.
    fn priority_span(&self) -> (RulePriority, RulePriority) {
        let min = self
            .uplinks
            .iter()
            .flat_map(|u| [u.priority1(), u.priority2()])
            .min()
            .unwrap_or(RulePriority(0));
        let max = self
            .uplinks
            .iter()
            .flat_map(|u| [u.priority1(), u.priority2()])
            .max()
            .unwrap_or(RulePriority(0));
        (min, max)
    }

    fn tables_span(&self) -> (TableId, TableId) {
        let min = self
            .uplinks
            .iter()
            .map(Uplink::table)
            .min()
            .unwrap_or(TableId(0));
        let max = self
            .uplinks
            .iter()
            .map(Uplink::table)
            .max()
            .unwrap_or(TableId(0));
        (min, max)
    }

    /// The complete, idempotent command sequence establishing routing from
    /// scratch.
    pub fn initialize_routing_commands(&self) -> Vec<String> {
        let (priority_min, priority_max) = self.priority_span();
        let (table_min, table_max) = self.tables_span();

        let mut commands = vec![command::enable_forwarding()];

        // Flush stale rules and tables over double the span in use: a
        // previous run may have laid out more uplinks than this one. The
        // deletes fail harmlessly where nothing exists.
        for i in 0..(priority_max.0 - priority_min.0 + 2) * 2 {
            commands.push(command::rule_del(RulePriority(priority_min.0 + i)));
        }
        for i in 0..(table_max.0 - table_min.0 + 2) * 2 {
            commands.push(command::table_del(TableId(table_min.0 + i)));
        }

        // Loose reverse-path filtering on the uplink interfaces: multipath
        // return traffic may arrive on a different interface than it left.
        commands.push(command::rp_filter("all", 0));
        for uplink in &self.uplinks {
            commands.push(command::rp_filter(uplink.interface(), 2));
        }

        for uplink in &self.uplinks {
            commands.extend(uplink.route_add_commands());
        }

        // First packet of a new outbound connection resolves through the
        // shared table; conntrack then pins the flow to whichever uplink
        // that packet was routed through.
        commands.push(command::rule_add_catch_all(
            self.catch_all_priority(),
            self.shared_table(),
        ));

        commands.extend(self.set_default_route_commands());
        commands.push(command::flush_cache());
        commands
    }

    /// Commands replacing the shared default route from the current
    /// routing state.
    pub fn set_default_route_commands(&self) -> Vec<String> {
        let candidates: Vec<_> = self
            .uplinks
            .iter()
            .filter(|u| u.is_routing_candidate())
            .filter_map(|u| u.gateway().map(|gateway| (gateway, u.weight())))
            .collect();

        // a single routing uplink gets a plain route, keeping the kernel
        // off multipath code paths when balancing is pointless
        let nexthops = match candidates.as_slice() {
            [(gateway, _)] => format!("via {gateway}"),
            several => several
                .iter()
                .map(|(gateway, weight)| match weight {
                    Some(weight) => format!("nexthop via {gateway} weight {weight}"),
                    None => format!("nexthop via {gateway}"),
                })
                .collect::<Vec<_>>()
                .join(" "),
        };

        vec![command::route_replace_default(
            self.shared_table(),
            &nexthops,
        )]
    }

    /// Evaluate freshly observed addresses for every uplink.
    ///
    /// Commands accumulate in uplink order. However many gateways changed,
    /// the shared default route is recomputed at most once, and a cache
    /// flush is appended only when something was produced at all.
    pub fn detect_ip_changes(&mut self, observed: &[LinkAddress]) -> ChangeReport {
        debug_assert_eq!(observed.len(), self.uplinks.len());

        let mut report = ChangeReport::default();
        let mut need_default_route_update = false;

        for (uplink, &facts) in self.uplinks.iter_mut().zip(observed) {
            let (commands, need_update, message) = uplink.detect_ip_changes(facts);
            report.commands.extend(commands);
            need_default_route_update |= need_update;
            if let Some(message) = message {
                debug!("{message}");
                report.messages.push(message);
            }
        }

        if need_default_route_update {
            debug!("updating default route: gateways of routing uplinks changed");
            report.commands.extend(self.set_default_route_commands());
        }

        if !report.commands.is_empty() {
            report.commands.push(command::flush_cache());
        }

        report
    }

    /// Evaluate freshly observed link-health signals for every uplink,
    /// with the all-down fail-safe.
    ///
    /// If every default-route-eligible uplink is believed down, all of them
    /// are forced back into routing: an uplink believed down may still pass
    /// some traffic, while an empty default route guarantees total outage.
    ///
    /// Messages are suppressed entirely unless some uplink's up-state
    /// changed this cycle; routing-only flips (the fail-safe alone
    /// toggling `routing`) still produce commands but report nothing.
    pub fn test_routing(&mut self, observed_up: &[bool]) -> HealthReport {
        debug_assert_eq!(observed_up.len(), self.uplinks.len());

        let mut report = HealthReport::default();
        let mut any_up_changed = false;
        let mut any_routing_changed = false;

        for (uplink, &up) in self.uplinks.iter_mut().zip(observed_up) {
            let (up_changed, routing_changed, message) = uplink.test_routing(up);
            any_up_changed |= up_changed;
            any_routing_changed |= routing_changed;
            if let Some(message) = message {
                debug!("{message}");
                report.messages.push(message);
            }
        }

        let all_eligible_down = self
            .uplinks
            .iter()
            .filter(|u| u.default_route())
            .all(|u| !u.up());
        if all_eligible_down {
            for uplink in self.uplinks.iter_mut().filter(|u| u.default_route()) {
                any_routing_changed |= uplink.force_routing();
            }
            let message = "no default route uplink seems to be up: enabling them all".to_string();
            debug!("{message}");
            report.messages.push(message);
            report.fail_safe_fired = true;
        }

        if any_routing_changed {
            report.commands = self.set_default_route_commands();
            report.commands.push(command::flush_cache());
        }

        if !any_up_changed {
            report.messages.clear();
        }

        report
    }
}
