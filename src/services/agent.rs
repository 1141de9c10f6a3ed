use std::time::Duration;

use photo_queue::{ConnectivityMonitor, Dispatcher, DrainOutcome, UploadQueue};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Fallback drain interval. Online transitions and foreground triggers
/// are the primary signals; the timer only catches what they miss.
const DRAIN_INTERVAL_SECONDS: u64 = 30;

/// Handle for foreground-driven drains (the equivalent of "the app came
/// back into view"). Cheap to clone, safe to fire from anywhere.
#[derive(Clone)]
pub struct DrainTrigger {
    tx: mpsc::Sender<()>,
}

impl DrainTrigger {
    pub fn request_drain(&self) {
        // A full channel means a drain request is already waiting.
        let _ = self.tx.try_send(());
    }
}

/// Background delivery agent.
///
/// Owns the drain triggers described by the pipeline: (a) the transition
/// to online, (b) an explicit foreground trigger, (c) a periodic fallback
/// timer. The dispatcher's single-flight guard deduplicates whatever
/// arrives close together; triggers never preempt a running drain.
pub struct SyncAgent {
    queue: UploadQueue,
    dispatcher: Dispatcher,
    monitor: ConnectivityMonitor,
    drain_interval: Duration,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: mpsc::Receiver<()>,
}

impl SyncAgent {
    pub fn new(queue: UploadQueue, dispatcher: Dispatcher, monitor: ConnectivityMonitor) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        Self {
            queue,
            dispatcher,
            monitor,
            drain_interval: Duration::from_secs(DRAIN_INTERVAL_SECONDS),
            trigger_tx,
            trigger_rx,
        }
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    pub fn trigger_handle(&self) -> DrainTrigger {
        DrainTrigger {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Run the trigger loop. Probes connectivity, reacts to transitions
    /// and keeps the fallback timer going; intended to live as long as
    /// the process (select against a shutdown signal to end it).
    pub async fn run(mut self) {
        // Subscribe before the first probe can publish, or the initial
        // offline -> online transition would be missed.
        let mut online_rx = self.monitor.subscribe();
        let probe_task = self.monitor.spawn();

        let mut ticker = tokio::time::interval(self.drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it, startup decides on
        // its own whether to drain.
        ticker.tick().await;

        match self.queue.count_pending() {
            Ok(0) => {}
            Ok(n) => log::info!("{} uploads waiting from a previous run", n),
            Err(e) => log::error!("Cannot inspect queue: {}", e),
        }

        loop {
            tokio::select! {
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *online_rx.borrow_and_update() {
                        self.drain("reconnect").await;
                    }
                }
                _ = ticker.tick() => {
                    if self.monitor.is_online() && self.has_pending() {
                        self.drain("interval").await;
                    }
                }
                received = self.trigger_rx.recv() => {
                    match received {
                        Some(()) => self.drain("foreground").await,
                        None => break,
                    }
                }
            }
        }

        self.monitor.stop();
        probe_task.abort();
        log::info!("Sync agent stopped");
    }

    fn has_pending(&self) -> bool {
        match self.queue.count_pending() {
            Ok(count) => count > 0,
            Err(e) => {
                log::error!("Cannot inspect queue: {}", e);
                false
            }
        }
    }

    async fn drain(&self, reason: &str) {
        match self.dispatcher.drain().await {
            Ok(DrainOutcome::Completed(stats)) => {
                if stats.attempted > 0 {
                    log::info!(
                        "Drain ({}): {} delivered, {} failed",
                        reason,
                        stats.delivered,
                        stats.failed
                    );
                }
            }
            Ok(DrainOutcome::AlreadyRunning) => {
                log::debug!("Drain ({}) skipped, already running", reason);
            }
            Err(e) => log::error!("Drain ({}) failed: {}", reason, e),
        }
    }
}
