//! The periodic monitoring cycle.
//!
//! One `Monitor` owns the [`UplinkSet`] for the lifetime of the process
//! and is its single writer: cycles run strictly one after another, each
//! feeding freshly observed facts through the decision layer and handing
//! the resulting commands to the sink.

use std::net::IpAddr;
use std::time::Duration;

use tokio::time;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::probe::LinkProbe;
use crate::routing::UplinkSet;
use crate::sink::CommandSink;

/// Drives the observe → decide → apply loop.
pub struct Monitor<S: CommandSink> {
    set: UplinkSet,
    probe: LinkProbe,
    sink: S,
    interval: Duration,
    /// Statically configured gateways, by uplink id. These stay fixed even
    /// as the set's own view of the gateway moves with observed facts.
    configured_gateways: Vec<Option<IpAddr>>,
}

impl<S: CommandSink> Monitor<S> {
    /// Build a monitor from configuration and a sink.
    pub fn from_config(config: &Config, sink: S) -> Result<Self> {
        let set = UplinkSet::new(&config.uplinks, &config.routing)?;
        let configured_gateways = config.uplinks.iter().map(|u| u.gateway).collect();
        Ok(Self {
            set,
            probe: LinkProbe::new(config.monitor.clone()),
            sink,
            interval: config.monitor.interval,
            configured_gateways,
        })
    }

    /// The uplink set being monitored.
    pub fn uplinks(&self) -> &UplinkSet {
        &self.set
    }

    /// (Re)establish routing from scratch.
    pub async fn initialize(&mut self) -> Result<()> {
        let commands = self.set.initialize_routing_commands();
        info!(
            uplinks = self.set.len(),
            commands = commands.len(),
            "initializing routing"
        );
        self.sink.apply(&commands).await
    }

    /// Initialize, then cycle forever at the configured interval. Errors
    /// inside a cycle (an unplugged interface, a missing `ping` binary)
    /// are logged and the loop carries on; routing state is only ever
    /// advanced by complete cycles.
    pub async fn run(mut self) -> Result<()> {
        self.initialize().await?;

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.cycle().await {
                error!(error = %e, "monitoring cycle failed");
            }
        }
    }

    /// One monitoring cycle: address changes first, then health.
    pub async fn cycle(&mut self) -> Result<()> {
        let mut observed = Vec::with_capacity(self.set.len());
        for uplink in self.set.uplinks() {
            let facts = self
                .probe
                .observe_address(uplink.interface(), self.configured_gateways[uplink.id()])
                .await?;
            observed.push(facts);
        }

        let changes = self.set.detect_ip_changes(&observed);
        for message in &changes.messages {
            info!("{message}");
        }
        if !changes.commands.is_empty() {
            self.sink.apply(&changes.commands).await?;
        }

        let mut ups = Vec::with_capacity(self.set.len());
        for uplink in self.set.uplinks() {
            ups.push(self.probe.test_link(uplink.interface()).await?);
        }

        let health = self.set.test_routing(&ups);
        for message in &health.messages {
            info!("{message}");
        }
        if health.fail_safe_fired {
            warn!("all default route uplinks down: fail-safe keeps them routing");
        }
        if !health.commands.is_empty() {
            self.sink.apply(&health.commands).await?;
        }

        Ok(())
    }
}
