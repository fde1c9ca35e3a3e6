//! Link fact gathering.
//!
//! The routing core never touches the network; every cycle it is handed
//! freshly observed facts instead. [`LinkProbe`] produces them: current
//! addresses read from `ip addr`/`ip route` output, and an up/down verdict
//! from pinging well-known addresses out of each uplink interface.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::process::Command;
use tracing::{debug, trace};

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::types::LinkAddress;

/// Gathers per-uplink observed facts for the monitoring cycle.
pub struct LinkProbe {
    config: MonitorConfig,
    /// Rotates the test-address order between cycles so a single dead
    /// test host does not bias every verdict the same way.
    rotation: AtomicUsize,
}

impl LinkProbe {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            rotation: AtomicUsize::new(0),
        }
    }

    /// Observe the current addresses of one interface.
    ///
    /// The address comes from `ip -4 addr show`; a PPP peer address is
    /// taken as the gateway when present. Otherwise the configured gateway
    /// wins, falling back to the interface's default route. An interface
    /// with no address yields an empty [`LinkAddress`] — the first-class
    /// "link down" representation, never an error.
    pub async fn observe_address(
        &self,
        interface: &str,
        configured_gateway: Option<IpAddr>,
    ) -> Result<LinkAddress> {
        let output = Command::new("ip")
            .args(["-4", "addr", "show", "dev", interface])
            .output()
            .await?;
        if !output.status.success() {
            // interface gone (unplugged USB modem, torn-down ppp): down
            return Ok(LinkAddress::default());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (ip, peer) = parse_addr_output(&stdout);

        let gateway = match (peer, configured_gateway) {
            (Some(peer), _) => Some(peer),
            (None, Some(configured)) => Some(configured),
            (None, None) => self.default_gateway(interface).await?,
        };

        trace!(interface, ?ip, ?gateway, "observed addresses");
        Ok(LinkAddress::new(ip, gateway))
    }

    async fn default_gateway(&self, interface: &str) -> Result<Option<IpAddr>> {
        let output = Command::new("ip")
            .args(["-4", "route", "show", "default", "dev", interface])
            .output()
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_default_route(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Judge one uplink's health by pinging the configured test addresses
    /// out of its interface.
    ///
    /// Addresses are tried in rotated order. The loop exits early once
    /// enough pings succeeded, or once the remaining addresses cannot
    /// reach the required count anymore.
    pub async fn test_link(&self, interface: &str) -> Result<bool> {
        let required = self.config.required_successful_tests as usize;
        let test_ips = &self.config.test_ips;
        if test_ips.is_empty() {
            return Err(Error::Probe {
                interface: interface.to_string(),
                reason: "no test IPs configured".into(),
            });
        }

        let start = self.rotation.fetch_add(1, Ordering::Relaxed) % test_ips.len();
        let timeout_secs = self.config.ping_timeout.as_secs().max(1).to_string();

        let mut successful = 0usize;
        for (tried, index) in (0..test_ips.len()).enumerate() {
            let target = test_ips[(start + index) % test_ips.len()];
            let output = Command::new("ping")
                .args([
                    "-n",
                    "-c",
                    "1",
                    "-W",
                    &timeout_secs,
                    "-I",
                    interface,
                    &target.to_string(),
                ])
                .output()
                .await?;
            if output.status.success() {
                successful += 1;
            }
            debug!(
                interface,
                %target,
                success = output.status.success(),
                successful,
                "ping test"
            );

            if successful >= required {
                return Ok(true);
            }
            let remaining = test_ips.len() - tried - 1;
            if successful + remaining < required {
                return Ok(false);
            }
        }
        Ok(successful >= required)
    }
}

/// Parse `ip -4 addr show dev <iface>` output into (address, peer).
fn parse_addr_output(output: &str) -> (Option<IpAddr>, Option<IpAddr>) {
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("inet") {
            continue;
        }
        let ip = tokens
            .next()
            .and_then(|t| t.split('/').next())
            .and_then(|t| t.parse().ok());
        let peer = match tokens.next() {
            Some("peer") => tokens
                .next()
                .and_then(|t| t.split('/').next())
                .and_then(|t| t.parse().ok()),
            _ => None,
        };
        return (ip, peer);
    }
    (None, None)
}

/// Parse `ip -4 route show default dev <iface>` output into a gateway.
fn parse_default_route(output: &str) -> Option<IpAddr> {
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if let ["default", "via", gateway, ..] = tokens.as_slice() {
            if let Ok(gateway) = gateway.parse() {
                return Some(gateway);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_interface_address() {
        let output = "\
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP group default qlen 1000
    inet 192.168.1.10/24 brd 192.168.1.255 scope global dynamic eth0
       valid_lft 86117sec preferred_lft 86117sec
";
        let (ip, peer) = parse_addr_output(output);
        assert_eq!(ip, Some("192.168.1.10".parse().unwrap()));
        assert_eq!(peer, None);
    }

    #[test]
    fn parses_ppp_peer_as_gateway() {
        let output = "\
5: ppp0: <POINTOPOINT,MULTICAST,NOARP,UP,LOWER_UP> mtu 1492 qdisc fq_codel state UNKNOWN
    inet 100.64.1.2 peer 100.64.1.1/32 scope global ppp0
";
        let (ip, peer) = parse_addr_output(output);
        assert_eq!(ip, Some("100.64.1.2".parse().unwrap()));
        assert_eq!(peer, Some("100.64.1.1".parse().unwrap()));
    }

    #[test]
    fn missing_address_parses_to_none() {
        let output = "\
2: eth0: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN group default qlen 1000
";
        assert_eq!(parse_addr_output(output), (None, None));
    }

    #[test]
    fn parses_default_route_gateway() {
        let output = "default via 192.168.1.1 proto dhcp src 192.168.1.10 metric 100\n";
        assert_eq!(
            parse_default_route(output),
            Some("192.168.1.1".parse().unwrap())
        );
        assert_eq!(parse_default_route(""), None);
        assert_eq!(parse_default_route("default dev tun0 scope link\n"), None);
    }
}
