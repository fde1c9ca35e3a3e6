//! Idempotency of routing initialization.
//!
//! The property is about the *installed configuration*, not the command
//! text: running the initialization sequence twice must leave the host's
//! rule/table/sysctl state identical to running it once. A small
//! interpreter re-derives that state from the emitted commands.

use std::collections::BTreeMap;

use multiwan::config::{RoutingConfig, UplinkConfig};
use multiwan::routing::UplinkSet;

/// Model of the host routing state the commands manipulate.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct HostState {
    /// sysctl path -> value written
    sysctls: BTreeMap<String, String>,
    /// rule priority -> rule body
    rules: BTreeMap<u32, String>,
    /// table id -> default route body ("" for a bare default)
    routes: BTreeMap<u32, String>,
}

impl HostState {
    fn apply_all(&mut self, commands: &[String]) {
        for command in commands {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: &str) {
        let command = command
            .trim_end_matches("&> /dev/null")
            .trim_end()
            .to_string();
        let tokens: Vec<&str> = command.split_whitespace().collect();
        match tokens.as_slice() {
            ["echo", value, ">", path] => {
                self.sysctls.insert((*path).to_string(), (*value).to_string());
            }
            ["ip", "rule", "add", "priority", priority, body @ ..] => {
                self.rules
                    .insert(priority.parse().unwrap(), body.join(" "));
            }
            ["ip", "rule", "del", "priority", priority] => {
                self.rules.remove(&priority.parse().unwrap());
            }
            ["ip", "route", "replace", "table", table, "default", body @ ..] => {
                self.routes
                    .insert(table.parse().unwrap(), body.join(" "));
            }
            ["ip", "route", "del", "table", table] => {
                self.routes.remove(&table.parse().unwrap());
            }
            ["ip", "route", "flush", "cache"] => {}
            other => panic!("interpreter cannot parse command: {other:?}"),
        }
    }
}

fn uplink(iface: &str, ip: &str, gateway: &str) -> UplinkConfig {
    UplinkConfig {
        ip: Some(ip.parse().unwrap()),
        gateway: Some(gateway.parse().unwrap()),
        ..UplinkConfig::for_interface(iface)
    }
}

fn three_uplinks() -> Vec<UplinkConfig> {
    vec![
        uplink("eth0", "203.0.113.2", "203.0.113.1"),
        uplink("eth1", "198.51.100.2", "198.51.100.1"),
        uplink("eth2", "192.0.2.2", "192.0.2.1"),
    ]
}

#[test]
fn initialization_twice_equals_once() {
    let set = UplinkSet::new(&three_uplinks(), &RoutingConfig::default()).unwrap();
    let commands = set.initialize_routing_commands();

    let mut once = HostState::default();
    once.apply_all(&commands);

    let mut twice = HostState::default();
    twice.apply_all(&commands);
    twice.apply_all(&commands);

    assert_eq!(once, twice);
}

#[test]
fn initialization_installs_expected_state() {
    let set = UplinkSet::new(&three_uplinks(), &RoutingConfig::default()).unwrap();
    let mut state = HostState::default();
    state.apply_all(&set.initialize_routing_commands());

    assert_eq!(
        state.sysctls.get("/proc/sys/net/ipv4/ip_forward"),
        Some(&"1".to_string())
    );
    assert_eq!(
        state.sysctls.get("/proc/sys/net/ipv4/conf/all/rp_filter"),
        Some(&"0".to_string())
    );
    assert_eq!(
        state.sysctls.get("/proc/sys/net/ipv4/conf/eth1/rp_filter"),
        Some(&"2".to_string())
    );

    // two rules per uplink plus the catch-all
    assert_eq!(state.rules.len(), 7);
    assert_eq!(
        state.rules.get(&40_006),
        Some(&"from all lookup 4".to_string())
    );

    // one table per uplink plus the shared default-route table
    assert_eq!(state.routes.len(), 4);
    assert_eq!(
        state.routes.get(&1),
        Some(&"via 203.0.113.1 src 203.0.113.2".to_string())
    );
    assert_eq!(
        state.routes.get(&4),
        Some(
            &"nexthop via 203.0.113.1 nexthop via 198.51.100.1 nexthop via 192.0.2.1".to_string()
        )
    );
}

#[test]
fn reinitializing_with_fewer_uplinks_leaves_no_stale_state() {
    let mut state = HostState::default();

    // a previous run laid out three uplinks
    let old = UplinkSet::new(&three_uplinks(), &RoutingConfig::default()).unwrap();
    state.apply_all(&old.initialize_routing_commands());

    // this run only has two; the defensive double-width flush must sweep
    // away the third uplink's rules and table and the old shared table
    let new = UplinkSet::new(&three_uplinks()[..2], &RoutingConfig::default()).unwrap();
    state.apply_all(&new.initialize_routing_commands());

    let mut expected = HostState::default();
    expected.apply_all(&new.initialize_routing_commands());
    // rp_filter for eth2 was written by the old run and is never unset;
    // everything the kernel routes by must match a fresh install
    expected.sysctls.insert(
        "/proc/sys/net/ipv4/conf/eth2/rp_filter".to_string(),
        "2".to_string(),
    );
    assert_eq!(state, expected);
}
