// Notification dispatcher: drains the outbox through a delivery sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ftt_core::notify::PendingNotification;
use ftt_core::League;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::scheduler::{sleep_or_shutdown, SchedulerHandle};

/// Where notifications end up (web push, email, chat...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &PendingNotification) -> anyhow::Result<()>;
}

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, n: &PendingNotification) -> anyhow::Result<()> {
        info!(
            user = %n.username,
            level = n.level.as_str(),
            redirect = n.redirect_to.as_deref().unwrap_or(""),
            "{}",
            n.message
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    league: Arc<League>,
    sink: Arc<dyn NotificationSink>,
    batch: u32,
    interval: Duration,
}

impl Dispatcher {
    pub fn new(league: Arc<League>, sink: Arc<dyn NotificationSink>, batch: u32, interval: Duration) -> Self {
        Self {
            league,
            sink,
            batch,
            interval,
        }
    }

    /// Deliver one batch. Failed rows stay pending with a bumped attempt
    /// count and go behind untried rows; once they reach
    /// `dispatch_max_attempts` they are no longer picked up.
    pub async fn drain_once(&self) -> ftt_core::Result<DispatchStats> {
        let mut stats = DispatchStats::default();
        for note in self.league.pending_notifications(self.batch)? {
            match self.sink.deliver(&note).await {
                Ok(()) => {
                    self.league.mark_delivered(note.id)?;
                    stats.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        notification_id = note.id,
                        attempts = note.attempts + 1,
                        "notification delivery failed: {:#}",
                        e
                    );
                    self.league.record_failure(note.id)?;
                    stats.failed += 1;
                    let max = self.league.config().scheduler.dispatch_max_attempts;
                    if note.attempts + 1 >= max {
                        error!(
                            notification_id = note.id,
                            "giving up on notification after {} attempts", max
                        );
                    }
                }
            }
        }
        Ok(stats)
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle::new("dispatcher", tx, task)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("notification dispatcher started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.drain_once().await {
                Ok(stats) if stats.delivered + stats.failed > 0 => {
                    debug!(delivered = stats.delivered, failed = stats.failed, "outbox drained");
                }
                Ok(_) => {}
                Err(e) => error!("draining notification outbox failed: {}", e),
            }
            if sleep_or_shutdown(self.interval, &mut shutdown).await {
                break;
            }
        }
        // Final flush.
        if let Err(e) = self.drain_once().await {
            error!("final outbox drain failed: {}", e);
        }
        info!("notification dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ftt_core::config::config_from_str;
    use ftt_core::db::Database;
    use ftt_core::notify::{self, Level, Notification};
    use ftt_core::roster;
    use ftt_core::time::FixedClock;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
        fail: bool,
        reject_prefix: Option<&'static str>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, n: &PendingNotification) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("sink offline");
            }
            if self.reject_prefix.is_some_and(|p| n.message.starts_with(p)) {
                anyhow::bail!("recipient rejected");
            }
            self.messages.lock().unwrap().push(n.message.clone());
            Ok(())
        }
    }

    fn league_with_outbox(count: usize) -> Arc<League> {
        league_with_messages((0..count).map(|i| format!("message {i}")).collect())
    }

    fn league_with_messages(messages: Vec<String>) -> Arc<League> {
        let config = config_from_str(
            "[league]\nname = \"L\"\nsalary_cap = 1.0\nmax_players = 1\nmin_players = 0\n",
        )
        .unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let league = League::new(Database::open_in_memory().unwrap(), config, clock).unwrap();
        league
            .db()
            .transaction(|tx| {
                let user = roster::insert_user(tx, "owner", false, false)?;
                for message in &messages {
                    notify::enqueue(
                        tx,
                        &Notification::new(user.id, message.clone(), Level::Info),
                        Utc::now(),
                    )?;
                }
                Ok(())
            })
            .unwrap();
        Arc::new(league)
    }

    #[tokio::test]
    async fn delivers_pending_in_order() {
        let league = league_with_outbox(3);
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(league.clone(), sink.clone(), 10, Duration::from_secs(1));

        let stats = dispatcher.drain_once().await.unwrap();
        assert_eq!(stats, DispatchStats { delivered: 3, failed: 0 });
        assert_eq!(
            *sink.messages.lock().unwrap(),
            vec!["message 0", "message 1", "message 2"]
        );
        assert!(league.pending_notifications(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_stay_pending_with_attempts() {
        let league = league_with_outbox(2);
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let dispatcher = Dispatcher::new(league.clone(), sink, 10, Duration::from_secs(1));

        let stats = dispatcher.drain_once().await.unwrap();
        assert_eq!(stats.failed, 2);
        let pending = league.pending_notifications(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|n| n.attempts == 1));
    }

    #[tokio::test]
    async fn failing_batch_does_not_block_later_rows() {
        let league = league_with_messages(vec![
            "stuck 0".into(),
            "stuck 1".into(),
            "stuck 2".into(),
            "fresh".into(),
        ]);
        let sink = Arc::new(RecordingSink {
            reject_prefix: Some("stuck"),
            ..RecordingSink::default()
        });
        let dispatcher = Dispatcher::new(league.clone(), sink.clone(), 2, Duration::from_secs(1));

        assert_eq!(dispatcher.drain_once().await.unwrap().failed, 2);
        let second = dispatcher.drain_once().await.unwrap();
        assert_eq!(second, DispatchStats { delivered: 1, failed: 1 });
        assert_eq!(*sink.messages.lock().unwrap(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn rows_past_the_attempt_cap_are_dropped_from_the_outbox() {
        let league = league_with_outbox(1);
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let dispatcher = Dispatcher::new(league.clone(), sink, 10, Duration::from_secs(1));
        let cap = league.config().scheduler.dispatch_max_attempts;
        for _ in 0..cap {
            assert_eq!(dispatcher.drain_once().await.unwrap().failed, 1);
        }
        assert_eq!(dispatcher.drain_once().await.unwrap(), DispatchStats::default());
        assert!(league.pending_notifications(10).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_limit_spreads_delivery_over_passes() {
        let league = league_with_outbox(5);
        let sink = Arc::new(RecordingSink::default());
        let handle =
            Dispatcher::new(league.clone(), sink.clone(), 2, Duration::from_secs(5)).spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.messages.lock().unwrap().len(), 2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.messages.lock().unwrap().len(), 4);

        handle.shutdown().await;
        assert_eq!(sink.messages.lock().unwrap().len(), 5);
    }
}
