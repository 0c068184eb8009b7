//! Periodic reachability probe that triggers failover logins.
//!
//! Each tick probes the configured URLs in order and stops at the first that
//! answers with a status in `[200, 500)`.  If none does, a notice is
//! published and the trigger is awaited once per bound WAN interface before
//! the next tick is scheduled.  Shutdown interrupts a tick between (and
//! during) probes and triggers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::entities::BindingStore;
use crate::hub::LogHub;

/// Per-URL probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Zero disables probing.
    pub interval: Duration,
    pub probe_urls: Vec<String>,
}

impl MonitorConfig {
    pub fn enabled(&self) -> bool {
        !self.interval.is_zero() && !self.probe_urls.is_empty()
    }
}

/// Checks whether one URL is reachable.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn reachable(&self, url: &str) -> bool;
}

/// Work to do for one WAN interface when connectivity is lost.
#[async_trait]
pub trait Trigger: Send + Sync {
    async fn fire(&self, wan_iface: &str);
}

/// HTTP GET probe with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn reachable(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) => {
                let code = resp.status().as_u16();
                debug!(%url, code, "probe answered");
                (200..500).contains(&code)
            }
            Err(e) => {
                debug!(%url, error = %e, "probe failed");
                false
            }
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Disabled,
    Healthy,
    /// Connectivity was lost; the trigger ran for this many interfaces.
    Triggered(usize),
    /// Connectivity was lost but the bindings could not be read.
    BindingsUnavailable,
    /// Shutdown was requested while the tick was running.
    Stopped,
}

pub struct FailoverMonitor<B> {
    config: MonitorConfig,
    probe: Arc<dyn Probe>,
    bindings: Arc<B>,
    trigger: Arc<dyn Trigger>,
    hub: LogHub,
}

impl<B: BindingStore> FailoverMonitor<B> {
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn Probe>,
        bindings: Arc<B>,
        trigger: Arc<dyn Trigger>,
        hub: LogHub,
    ) -> Self {
        Self { config, probe, bindings, trigger, hub }
    }

    /// Tick immediately, then every `interval`, until `shutdown` flips to `true`.
    ///
    /// Shutdown is also watched inside a tick: a failover in progress is
    /// abandoned at the next reachability check or trigger.  A remote command the channel
    /// has already dequeued still runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled() {
            info!("failover monitor disabled");
            stopped(&mut shutdown).await;
            return;
        }
        info!(
            interval_secs = self.config.interval.as_secs(),
            urls = self.config.probe_urls.len(),
            "failover monitor started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let stop = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => true,
                _ = ticker.tick() => false,
            };
            if stop || self.tick(&mut shutdown).await == TickOutcome::Stopped {
                break;
            }
        }
        info!("failover monitor stopped");
    }

    /// Probe once and fail over if nothing answers.
    ///
    /// Returns [`TickOutcome::Stopped`] as soon as `shutdown` flips to `true`,
    /// dropping the check or trigger that was running.
    pub async fn tick(&self, shutdown: &mut watch::Receiver<bool>) -> TickOutcome {
        if !self.config.enabled() {
            return TickOutcome::Disabled;
        }

        for url in &self.config.probe_urls {
            let up = tokio::select! {
                biased;
                _ = stopped(shutdown) => return TickOutcome::Stopped,
                up = self.probe.reachable(url) => up,
            };
            if up {
                return TickOutcome::Healthy;
            }
        }

        warn!("all connectivity probes failed");
        self.hub.publish("network unreachable; starting failover");
        let bindings = match self.bindings.all_bindings().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to read interface bindings");
                self.hub.publish(format!("reading interface bindings failed: {e}"));
                return TickOutcome::BindingsUnavailable;
            }
        };

        for (done, wan_iface) in bindings.keys().enumerate() {
            tokio::select! {
                biased;
                _ = stopped(shutdown) => {
                    info!(remaining = bindings.len() - done, "failover interrupted by shutdown");
                    return TickOutcome::Stopped;
                }
                _ = self.trigger.fire(wan_iface) => {}
            }
        }
        TickOutcome::Triggered(bindings.len())
    }
}

/// Resolves once `shutdown` is `true` or its sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // The returned `Ref` holds a read lock; drop it before yielding.
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        debug!("shutdown sender dropped");
    }
}
