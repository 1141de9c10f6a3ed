use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Configuration for the connectivity monitor.
#[derive(Debug, Clone)]
pub struct ConnectivityConfig {
    /// Same-origin resource probed for liveness (a lightweight endpoint on
    /// the upload server, e.g. its health route).
    pub probe_url: String,
    /// Probe interval. The platform signal alone reports false positives,
    /// so the probe runs continuously while the monitor is active.
    pub probe_interval: Duration,
    /// Per-probe request timeout.
    pub probe_timeout: Duration,
}

impl ConnectivityConfig {
    pub fn new(probe_url: String) -> Self {
        Self {
            probe_url,
            probe_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

struct MonitorInner {
    config: ConnectivityConfig,
    client: reqwest::Client,
    /// Platform connectivity hint. Defaults to online; headless hosts have
    /// no native signal and rely on the probe alone.
    native_online: AtomicBool,
    probe_online: AtomicBool,
    running: AtomicBool,
    tx: watch::Sender<bool>,
}

/// Tracks online/offline state by combining a platform hint with an active
/// liveness probe.
///
/// The decision is conservative: the monitor only reports online when the
/// hint allows it AND the most recent probe reached the origin. A probe
/// failure while the hint says online resolves to offline, so the queue is
/// never drained against an unreachable origin.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    pub fn new(config: ConnectivityConfig) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(MonitorInner {
                config,
                client: reqwest::Client::new(),
                native_online: AtomicBool::new(true),
                probe_online: AtomicBool::new(false),
                running: AtomicBool::new(false),
                tx,
            }),
        }
    }

    /// Current combined online state.
    pub fn is_online(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Subscribe to online/offline transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }

    /// Feed the platform's connectivity signal. An offline hint takes
    /// effect immediately; an online hint still waits for probe
    /// confirmation.
    pub fn set_native_hint(&self, online: bool) {
        self.inner.native_online.store(online, Ordering::SeqCst);
        self.publish();
    }

    /// One liveness probe against the configured origin, bypassing caches.
    pub async fn probe_once(&self) -> bool {
        let result = self
            .inner
            .client
            .head(&self.inner.config.probe_url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .timeout(self.inner.config.probe_timeout)
            .send()
            .await;

        match result {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                log::debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }

    /// Run the probe loop until `stop` is called. Publishes transitions on
    /// the watch channel.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            log::warn!("Connectivity monitor already running");
            return tokio::spawn(async {});
        }

        let monitor = self.clone();
        tokio::spawn(async move {
            log::info!(
                "Connectivity monitor probing {} every {:?}",
                monitor.inner.config.probe_url,
                monitor.inner.config.probe_interval
            );

            while monitor.inner.running.load(Ordering::SeqCst) {
                let reachable = monitor.probe_once().await;
                monitor.inner.probe_online.store(reachable, Ordering::SeqCst);
                monitor.publish();
                tokio::time::sleep(monitor.inner.config.probe_interval).await;
            }

            log::info!("Connectivity monitor stopped");
        })
    }

    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    fn publish(&self) {
        let online = self.inner.native_online.load(Ordering::SeqCst)
            && self.inner.probe_online.load(Ordering::SeqCst);

        self.inner.tx.send_if_modified(|state| {
            if *state != online {
                log::info!("Connectivity: {}", if online { "online" } else { "offline" });
                *state = online;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_monitor() -> ConnectivityMonitor {
        ConnectivityMonitor::new(ConnectivityConfig::new(
            "http://127.0.0.1:9/health".to_string(),
        ))
    }

    #[test]
    fn starts_offline_until_probe_confirms() {
        let monitor = test_monitor();
        assert!(!monitor.is_online());
    }

    #[test]
    fn probe_failure_overrides_optimistic_hint() {
        let monitor = test_monitor();
        monitor.set_native_hint(true);
        // No successful probe yet: the optimistic hint must not win.
        assert!(!monitor.is_online());
    }

    #[test]
    fn offline_hint_takes_effect_immediately() {
        let monitor = test_monitor();
        monitor.inner.probe_online.store(true, Ordering::SeqCst);
        monitor.publish();
        assert!(monitor.is_online());

        monitor.set_native_hint(false);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn probe_against_unreachable_origin_reports_offline() {
        // Port 9 (discard) is not listening; the probe must fail cleanly.
        let monitor = test_monitor();
        assert!(!monitor.probe_once().await);
    }
}
