// Auto-draft scheduler: wakes at the earliest pick-clock expiry across open
// drafts, auto-picks expired clocks, and sleeps again.

use std::sync::Arc;
use std::time::Duration;

use ftt_core::config::SchedulerConfig;
use ftt_core::League;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Handle to a spawned background worker. Dropping it leaves the worker
/// running; call [`SchedulerHandle::shutdown`] to stop it.
pub struct SchedulerHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub(crate) fn new(name: &'static str, shutdown: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { name, shutdown, task }
    }

    /// Signal the worker and wait for it to finish its current cycle.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(worker = self.name, "worker task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Waits for the shutdown flag, or returns once `delay` has passed.
/// Returns `true` when the worker should stop.
pub(crate) async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        result = shutdown.changed() => {
            match result {
                Ok(_) => *shutdown.borrow(),
                Err(_) => true,
            }
        }
        _ = tokio::time::sleep(delay) => false,
    }
}

pub struct AutoDraftScheduler {
    league: Arc<League>,
    config: SchedulerConfig,
}

impl AutoDraftScheduler {
    pub fn new(league: Arc<League>, config: SchedulerConfig) -> Self {
        Self { league, config }
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle::new("auto-draft", tx, task)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("auto-draft scheduler started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let delay = self.tick();
            debug!(delay_secs = delay.as_secs_f64(), "scheduler sleeping");
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }
        info!("auto-draft scheduler stopped");
    }

    /// Run one cycle and return how long to sleep before the next.
    pub fn tick(&self) -> Duration {
        let backoff = Duration::from_secs(self.config.error_backoff_secs);

        match self.league.process_expired_picks() {
            Ok(outcomes) if !outcomes.is_empty() => {
                let cascaded: usize = outcomes.iter().map(|o| o.cascaded.len()).sum();
                info!(expired = outcomes.len(), cascaded, "auto-picked expired clocks");
            }
            Ok(_) => {}
            Err(e) => {
                error!("processing expired picks failed: {}", e);
                return backoff;
            }
        }

        match self.league.next_expiry() {
            Ok(Some(at)) => {
                let min = Duration::from_secs(self.config.min_delay_secs);
                let until = (at - self.league.now()).to_std().unwrap_or(Duration::ZERO);
                until.max(min)
            }
            Ok(None) => Duration::from_secs(self.config.idle_interval_secs),
            Err(e) => {
                error!("computing next pick expiry failed: {}", e);
                backoff
            }
        }
    }
}
