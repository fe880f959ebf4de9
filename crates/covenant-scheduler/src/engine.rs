use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use covenant_chat::ChatClient;
use covenant_core::Config;
use covenant_llm::LlmProvider;
use covenant_store::Store;
use tokio::sync::watch;
use tracing::{error, info};

use crate::{coverage::run_coverage_scan, digest::run_weekly_digest, gc::run_thread_gc, reminders::run_reminder_pass, schedule};

const DIGEST_WEEKDAY: u32 = 4; // Friday
const DIGEST_HOUR: u32 = 17;
const COVERAGE_WEEKDAY: u32 = 1; // Tuesday
const COVERAGE_HOUR: u32 = 10;
const GC_HOUR: u32 = 3;

/// Drives the four periodic tasks on their own cadences: the reminder
/// ladder every `reminder_check_hours`, the weekly digest, the coverage
/// scan, and the active-thread GC sweep. One worker, tasks run
/// sequentially — nothing here needs concurrent scheduling.
pub struct SchedulerEngine {
    store: Arc<dyn Store>,
    chat: Arc<dyn ChatClient>,
    llm_cheap: Arc<dyn LlmProvider>,
    llm_heavy: Arc<dyn LlmProvider>,
    config: Arc<Config>,

    next_reminder_check: DateTime<Utc>,
    next_digest: DateTime<Utc>,
    next_coverage: DateTime<Utc>,
    next_gc: DateTime<Utc>,
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<dyn Store>,
        chat: Arc<dyn ChatClient>,
        llm_cheap: Arc<dyn LlmProvider>,
        llm_heavy: Arc<dyn LlmProvider>,
        config: Arc<Config>,
    ) -> Self {
        let now = Utc::now();
        Self {
            next_reminder_check: now,
            next_digest: schedule::next_weekly_utc(DIGEST_WEEKDAY, DIGEST_HOUR, 0, now),
            next_coverage: schedule::next_weekly_utc(COVERAGE_WEEKDAY, COVERAGE_HOUR, 0, now),
            next_gc: schedule::next_daily_utc(GC_HOUR, 0, now),
            store,
            chat,
            llm_cheap,
            llm_heavy,
            config,
        }
    }

    /// Polls every 60 seconds until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            reminder_check_hours = self.config.reminder_check_hours,
            "scheduler engine started"
        );

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&mut self) {
        let now = Utc::now();

        if now >= self.next_reminder_check {
            if let Err(e) = run_reminder_pass(self.store.as_ref(), self.chat.as_ref(), self.llm_cheap.as_ref(), &self.config).await {
                error!("reminder pass failed: {e}");
            }
            self.next_reminder_check = now + Duration::hours(self.config.reminder_check_hours);
        }

        if now >= self.next_digest {
            if let Err(e) = run_weekly_digest(self.store.as_ref(), self.chat.as_ref(), self.llm_heavy.as_ref(), &self.config).await {
                error!("weekly digest failed: {e}");
            }
            self.next_digest = schedule::next_weekly_utc(DIGEST_WEEKDAY, DIGEST_HOUR, 0, now);
        }

        if now >= self.next_coverage {
            if let Err(e) = run_coverage_scan(self.store.as_ref(), self.chat.as_ref(), &self.config).await {
                error!("coverage scan failed: {e}");
            }
            self.next_coverage = schedule::next_weekly_utc(COVERAGE_WEEKDAY, COVERAGE_HOUR, 0, now);
        }

        if now >= self.next_gc {
            if let Err(e) = run_thread_gc(self.store.as_ref(), &self.config) {
                error!("thread GC failed: {e}");
            }
            self.next_gc = schedule::next_daily_utc(GC_HOUR, 0, now);
        }
    }
}
