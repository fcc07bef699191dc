//! Background scheduler for notifications and retention.
//!
//! Every tick the scheduler:
//! - publishes one broker message per event whose notification second
//!   passed since the previous successful tick
//! - deletes events that began longer ago than the retention period
//!
//! A failure on one event is logged and counted; the rest of the batch
//! still runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use calendar_broker::{Broker, PublishConfig};
use calendar_core::{Event, NotificationMessage, retention_cutoff, truncate_to_second};
use calendar_protocol::encode_notification;

use crate::app::Calendar;
use crate::error::ServerResult;
use crate::signals::{ShutdownHandle, ShutdownSignal};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Events that began more than this many months ago are purged.
    pub retention_months: u32,
    /// How far back the first tick looks for notifications.
    pub catch_up: Duration,
    /// Where notification messages are published.
    pub publish: PublishConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            retention_months: 12,
            catch_up: Duration::from_secs(60),
            publish: PublishConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Creates a new scheduler config with the given tick interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Builder: set the retention period.
    pub fn with_retention_months(mut self, months: u32) -> Self {
        self.retention_months = months;
        self
    }

    /// Builder: set the first-tick lookback.
    pub fn with_catch_up(mut self, catch_up: Duration) -> Self {
        self.catch_up = catch_up;
        self
    }

    /// Builder: set the publish target.
    pub fn with_publish(mut self, publish: PublishConfig) -> Self {
        self.publish = publish;
        self
    }
}

/// Cumulative scheduler counters.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub ticks: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub purged: u64,
    pub purge_failures: u64,
    /// Instant (truncated) of the last completed tick.
    pub last_tick: Option<DateTime<Utc>>,
    /// Notifications up to and including this second have been handled.
    pub notified_through: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SchedulerState {
    /// Creates a new scheduler state.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, now: DateTime<Utc>, report: &TickReport, through: Option<DateTime<Utc>>) {
        self.ticks += 1;
        self.published += report.published as u64;
        self.publish_failures += report.publish_failures as u64;
        self.purged += report.purged as u64;
        self.purge_failures += report.purge_failures as u64;
        self.last_tick = Some(now);
        if through.is_some() {
            self.notified_through = through;
        }
        if report.last_error.is_some() {
            self.last_error = report.last_error.clone();
        }
    }
}

/// Shared scheduler state.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Creates a new shared scheduler state.
pub fn new_scheduler_state() -> SharedSchedulerState {
    Arc::new(RwLock::new(SchedulerState::new()))
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Events whose notification second fell in the tick's window.
    pub due: usize,
    pub published: usize,
    pub publish_failures: usize,
    /// Events older than the retention period.
    pub expired: usize,
    pub purged: usize,
    pub purge_failures: usize,
    pub last_error: Option<String>,
}

/// Publishes due notifications and purges expired events on a timer.
pub struct Scheduler {
    config: SchedulerConfig,
    calendar: Arc<Calendar>,
    broker: Arc<dyn Broker>,
    state: SharedSchedulerState,
    stop: ShutdownHandle,
}

impl Scheduler {
    /// Creates a new scheduler with the given configuration.
    pub fn new(config: SchedulerConfig, calendar: Arc<Calendar>, broker: Arc<dyn Broker>) -> Self {
        Self {
            config,
            calendar,
            broker,
            state: new_scheduler_state(),
            stop: ShutdownHandle::new(),
        }
    }

    /// Returns a handle for stopping the scheduler and reading its state.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            stop: self.stop.clone(),
            state: self.state.clone(),
        }
    }

    /// Returns the shared state.
    pub fn state(&self) -> SharedSchedulerState {
        self.state.clone()
    }

    /// Runs the tick loop until `shutdown` fires or the handle is stopped.
    ///
    /// The first tick happens one interval after start. Either way of
    /// stopping is a clean exit.
    pub async fn run(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            retention_months = self.config.retention_months,
            "Scheduler started"
        );

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = shutdown.wait();
        let stop = self.stop.wait().wait();
        tokio::pin!(shutdown, stop);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Scheduler stopping: shutdown requested");
                    break;
                }
                _ = &mut stop => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
        Ok(())
    }

    /// Runs one tick as if the clock read `now`.
    ///
    /// Publishes events whose notification second lies after the previous
    /// successful tick and at or before `now`. The first tick looks back
    /// `catch_up`. A failed select leaves the watermark in place, so the next
    /// tick covers the missed seconds.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let now = truncate_to_second(now);
        let mut report = TickReport::default();

        let after = match self.state.read().await.notified_through {
            Some(through) => through,
            None => self.first_window_start(now),
        };
        let mut through = None;
        if after < now {
            match self.calendar.select_events_notified_between(after, now).await {
                Ok(due) => {
                    through = Some(now);
                    report.due = due.len();
                    for event in &due {
                        match self.publish(event).await {
                            Ok(()) => report.published += 1,
                            Err(e) => {
                                warn!(event_id = %event.id, error = %e, "Failed to publish notification");
                                report.publish_failures += 1;
                                report.last_error = Some(e.to_string());
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, since = %after, "Failed to select due events");
                    report.last_error = Some(e.to_string());
                }
            }
        }

        let cutoff = retention_cutoff(now, self.config.retention_months);
        match self.calendar.select_events_before(cutoff).await {
            Ok(expired) => {
                report.expired = expired.len();
                for event in &expired {
                    match self.calendar.delete_event(&event.id).await {
                        Ok(()) => report.purged += 1,
                        Err(e) => {
                            warn!(event_id = %event.id, error = %e, "Failed to purge expired event");
                            report.purge_failures += 1;
                            report.last_error = Some(e.to_string());
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to select expired events");
                report.last_error = Some(e.to_string());
            }
        }

        if report.due > 0 || report.expired > 0 {
            debug!(
                %now,
                due = report.due,
                published = report.published,
                purged = report.purged,
                "Tick completed"
            );
        }
        self.state.write().await.record(now, &report, through);
        report
    }

    /// Exclusive lower bound of the first tick: `now - catch_up`, one second
    /// earlier so that second itself is included.
    fn first_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let lookback = chrono::Duration::from_std(self.config.catch_up)
            .unwrap_or(chrono::Duration::MAX)
            .checked_add(&chrono::Duration::seconds(1))
            .unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    async fn publish(&self, event: &Event) -> ServerResult<()> {
        let body = encode_notification(&NotificationMessage::from(event))?;
        self.broker.publish(&self.config.publish, body).await?;
        Ok(())
    }
}

/// Handle for stopping a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    stop: ShutdownHandle,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    /// Stops the scheduler. Safe to call any number of times, before or
    /// after the loop has exited.
    pub fn stop(&self) {
        self.stop.trigger();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_shutdown()
    }

    /// Returns the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar_broker::{
        BrokerError, BrokerResult, BoxFuture, ConsumeConfig, Consumer, MemoryBroker, QueueConfig,
    };
    use calendar_core::{NewEvent, NewUser};
    use calendar_protocol::decode_notification;
    use calendar_core::{TimeWindow, User};
    use calendar_storage::{MemoryStorage, Storage, StorageError, StorageResult};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    const QUEUE: &str = "test.notifications";

    /// Records publishes; fails those whose body mentions "fail".
    #[derive(Default)]
    struct RecordingBroker {
        published: Mutex<Vec<Vec<u8>>>,
    }

    impl Broker for RecordingBroker {
        fn name(&self) -> &str {
            "recording"
        }
        fn start(&self) -> BoxFuture<'_, BrokerResult<()>> {
            Box::pin(async { Ok(()) })
        }
        fn stop(&self) -> BoxFuture<'_, BrokerResult<()>> {
            Box::pin(async { Ok(()) })
        }
        fn queue_declare<'a>(&'a self, _: &'a QueueConfig) -> BoxFuture<'a, BrokerResult<()>> {
            Box::pin(async { Ok(()) })
        }
        fn consume<'a>(&'a self, _: &'a ConsumeConfig) -> BoxFuture<'a, BrokerResult<Consumer>> {
            Box::pin(async { Err(BrokerError::NotConnected) })
        }
        fn publish<'a>(
            &'a self,
            _: &'a PublishConfig,
            body: Vec<u8>,
        ) -> BoxFuture<'a, BrokerResult<()>> {
            Box::pin(async move {
                if String::from_utf8_lossy(&body).contains("fail") {
                    return Err(BrokerError::Closed("refused".into()));
                }
                self.published.lock().unwrap().push(body);
                Ok(())
            })
        }
    }

    /// Memory storage whose notification queries fail while `down` is set.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        down: AtomicBool,
    }

    impl Storage for FlakyStorage {
        fn name(&self) -> &str {
            "flaky"
        }
        fn create_user(&self, user: NewUser) -> calendar_storage::BoxFuture<'_, StorageResult<String>> {
            self.inner.create_user(user)
        }
        fn select_users(&self) -> calendar_storage::BoxFuture<'_, StorageResult<Vec<User>>> {
            self.inner.select_users()
        }
        fn delete_user<'a>(&'a self, id: &'a str) -> calendar_storage::BoxFuture<'a, StorageResult<()>> {
            self.inner.delete_user(id)
        }
        fn create_event(&self, event: NewEvent) -> calendar_storage::BoxFuture<'_, StorageResult<String>> {
            self.inner.create_event(event)
        }
        fn select_events(&self) -> calendar_storage::BoxFuture<'_, StorageResult<Vec<Event>>> {
            self.inner.select_events()
        }
        fn update_event(&self, event: Event) -> calendar_storage::BoxFuture<'_, StorageResult<()>> {
            self.inner.update_event(event)
        }
        fn delete_event<'a>(&'a self, id: &'a str) -> calendar_storage::BoxFuture<'a, StorageResult<()>> {
            self.inner.delete_event(id)
        }
        fn select_events_in(
            &self,
            window: TimeWindow,
        ) -> calendar_storage::BoxFuture<'_, StorageResult<Vec<Event>>> {
            self.inner.select_events_in(window)
        }
        fn select_events_by_time(
            &self,
            at: DateTime<Utc>,
        ) -> calendar_storage::BoxFuture<'_, StorageResult<Vec<Event>>> {
            self.inner.select_events_by_time(at)
        }
        fn select_events_notified_between(
            &self,
            after: DateTime<Utc>,
            until: DateTime<Utc>,
        ) -> calendar_storage::BoxFuture<'_, StorageResult<Vec<Event>>> {
            if self.down.load(Ordering::SeqCst) {
                return Box::pin(async { Err(StorageError::transport("database unreachable")) });
            }
            self.inner.select_events_notified_between(after, until)
        }
        fn select_events_before(
            &self,
            cutoff: DateTime<Utc>,
        ) -> calendar_storage::BoxFuture<'_, StorageResult<Vec<Event>>> {
            self.inner.select_events_before(cutoff)
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn event(title: &str, beginning: DateTime<Utc>, notification: DateTime<Utc>) -> NewEvent {
        NewEvent {
            title: title.to_string(),
            description: format!("{title} description"),
            beginning,
            finish: beginning + ChronoDuration::hours(1),
            notification,
            user_id: "u-1".to_string(),
        }
    }

    fn scheduler_with(broker: Arc<dyn Broker>) -> (Scheduler, Arc<Calendar>) {
        let calendar = Arc::new(Calendar::new(Arc::new(MemoryStorage::new())));
        let config = SchedulerConfig::new(Duration::from_millis(50))
            .with_publish(PublishConfig::new(QUEUE));
        (Scheduler::new(config, calendar.clone(), broker), calendar)
    }

    #[test]
    fn config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.retention_months, 12);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.catch_up, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn tick_publishes_each_due_event_once() {
        let broker = Arc::new(RecordingBroker::default());
        let (scheduler, calendar) = scheduler_with(broker.clone());
        let now = utc(2025, 2, 5, 9, 0, 0);

        let due_id = calendar
            .create_event(event("Standup", now + ChronoDuration::minutes(15), now))
            .await
            .unwrap();
        calendar
            .create_event(event(
                "Later",
                now + ChronoDuration::hours(2),
                now + ChronoDuration::hours(1),
            ))
            .await
            .unwrap();

        let report = scheduler.tick(now + ChronoDuration::milliseconds(650)).await;
        assert_eq!(report.due, 1);
        assert_eq!(report.published, 1);

        let published = broker.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        let message = decode_notification(&published[0]).unwrap();
        assert_eq!(message.id, due_id);
        assert_eq!(message.title, "Standup");
        assert_eq!(message.description, "Standup description");
        assert_eq!(message.notification, now);
    }

    #[tokio::test]
    async fn publish_failure_does_not_abort_batch() {
        let broker = Arc::new(RecordingBroker::default());
        let (scheduler, calendar) = scheduler_with(broker.clone());
        let now = utc(2025, 2, 5, 9, 0, 0);
        let later = now + ChronoDuration::hours(1);

        calendar.create_event(event("a", later, now)).await.unwrap();
        calendar.create_event(event("fail", later, now)).await.unwrap();
        calendar.create_event(event("c", later, now)).await.unwrap();

        let report = scheduler.tick(now).await;
        assert_eq!(report.due, 3);
        assert_eq!(report.published, 2);
        assert_eq!(report.publish_failures, 1);
        assert!(report.last_error.is_some());

        let state = scheduler.handle().state().await;
        assert_eq!(state.ticks, 1);
        assert_eq!(state.publish_failures, 1);
    }

    #[tokio::test]
    async fn same_second_is_published_once() {
        let broker = Arc::new(RecordingBroker::default());
        let (scheduler, calendar) = scheduler_with(broker.clone());
        let now = utc(2025, 2, 5, 9, 0, 0);
        calendar
            .create_event(event("Standup", now + ChronoDuration::minutes(15), now))
            .await
            .unwrap();

        assert_eq!(scheduler.tick(now).await.published, 1);
        let again = scheduler.tick(now + ChronoDuration::milliseconds(500)).await;
        assert_eq!(again.due, 0);
        assert_eq!(broker.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skipped_seconds_are_published_on_the_next_tick() {
        let broker = Arc::new(RecordingBroker::default());
        let (scheduler, calendar) = scheduler_with(broker.clone());
        let now = utc(2025, 2, 5, 9, 0, 0);
        let later = now + ChronoDuration::hours(1);
        calendar
            .create_event(event("a", later, now + ChronoDuration::seconds(5)))
            .await
            .unwrap();
        calendar
            .create_event(event("b", later, now + ChronoDuration::seconds(10)))
            .await
            .unwrap();

        assert_eq!(scheduler.tick(now).await.due, 0);
        let report = scheduler.tick(now + ChronoDuration::seconds(7)).await;
        assert_eq!(report.published, 1);
        let report = scheduler.tick(now + ChronoDuration::minutes(2)).await;
        assert_eq!(report.published, 1);
        assert_eq!(scheduler.tick(now + ChronoDuration::minutes(3)).await.due, 0);

        assert_eq!(broker.published.lock().unwrap().len(), 2);
        let state = scheduler.handle().state().await;
        assert_eq!(state.notified_through, Some(now + ChronoDuration::minutes(3)));
    }

    #[tokio::test]
    async fn first_tick_only_looks_back_catch_up() {
        let broker = Arc::new(RecordingBroker::default());
        let calendar = Arc::new(Calendar::new(Arc::new(MemoryStorage::new())));
        let config = SchedulerConfig::new(Duration::from_secs(1))
            .with_catch_up(Duration::ZERO)
            .with_publish(PublishConfig::new(QUEUE));
        let scheduler = Scheduler::new(config, calendar.clone(), broker.clone());
        let now = utc(2025, 2, 5, 9, 0, 0);
        let later = now + ChronoDuration::hours(1);
        calendar
            .create_event(event("stale", later, now - ChronoDuration::seconds(1)))
            .await
            .unwrap();
        calendar.create_event(event("current", later, now)).await.unwrap();

        let report = scheduler.tick(now).await;
        assert_eq!(report.due, 1);
        let published = broker.published.lock().unwrap().clone();
        assert_eq!(decode_notification(&published[0]).unwrap().title, "current");
    }

    #[tokio::test]
    async fn failed_select_keeps_watermark() {
        let broker = Arc::new(RecordingBroker::default());
        let storage = Arc::new(FlakyStorage::default());
        let calendar = Arc::new(Calendar::new(storage.clone()));
        let config = SchedulerConfig::new(Duration::from_secs(1)).with_publish(PublishConfig::new(QUEUE));
        let scheduler = Scheduler::new(config, calendar.clone(), broker.clone());
        let now = utc(2025, 2, 5, 9, 0, 0);
        calendar
            .create_event(event(
                "Standup",
                now + ChronoDuration::hours(1),
                now + ChronoDuration::seconds(1),
            ))
            .await
            .unwrap();

        scheduler.tick(now).await;
        storage.down.store(true, Ordering::SeqCst);
        let report = scheduler.tick(now + ChronoDuration::seconds(1)).await;
        assert_eq!(report.due, 0);
        assert!(report.last_error.is_some());

        storage.down.store(false, Ordering::SeqCst);
        let report = scheduler.tick(now + ChronoDuration::seconds(2)).await;
        assert_eq!(report.published, 1);

        let state = scheduler.handle().state().await;
        assert_eq!(state.ticks, 3);
        assert_eq!(state.published, 1);
        assert_eq!(state.notified_through, Some(now + ChronoDuration::seconds(2)));
    }

    #[tokio::test]
    async fn tick_purges_events_older_than_retention() {
        let broker = Arc::new(RecordingBroker::default());
        let (scheduler, calendar) = scheduler_with(broker);
        let now = utc(2025, 3, 15, 12, 0, 0);

        let old = utc(2024, 3, 15, 11, 59, 59);
        let edge = utc(2024, 3, 15, 12, 0, 0);
        let recent = utc(2024, 9, 1, 0, 0, 0);
        calendar.create_event(event("old", old, old)).await.unwrap();
        calendar.create_event(event("edge", edge, edge)).await.unwrap();
        calendar.create_event(event("recent", recent, recent)).await.unwrap();

        let report = scheduler.tick(now).await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.purged, 1);

        let titles: Vec<_> = calendar
            .select_events()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["edge", "recent"]);
    }

    #[tokio::test]
    async fn event_due_in_five_seconds_is_published_by_a_tick_after_six() {
        let broker = MemoryBroker::new();
        broker.start().await.unwrap();
        broker.queue_declare(&QueueConfig::new(QUEUE)).await.unwrap();
        let (scheduler, calendar) = scheduler_with(Arc::new(broker.clone()));

        let user = calendar
            .create_user(NewUser {
                first_name: "Grace".to_string(),
                last_name: "Hopper".to_string(),
                email: "grace@example.com".to_string(),
                age: 85,
            })
            .await
            .unwrap();
        let now = utc(2025, 6, 1, 8, 0, 0) + ChronoDuration::milliseconds(123);
        let notify_at = now + ChronoDuration::seconds(5);
        let mut new_event = event("Launch", now + ChronoDuration::hours(1), notify_at);
        new_event.user_id = user;
        let id = calendar.create_event(new_event).await.unwrap();

        let due = calendar
            .select_events_by_time(truncate_to_second(notify_at))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);

        let report = scheduler.tick(now + ChronoDuration::seconds(6)).await;
        assert_eq!(report.published, 1);
        assert_eq!(broker.ready_count(QUEUE).unwrap(), 1);
        assert_eq!(scheduler.tick(now + ChronoDuration::seconds(7)).await.due, 0);
        assert_eq!(broker.ready_count(QUEUE).unwrap(), 1);

        let mut consumer = broker.consume(&ConsumeConfig::new(QUEUE)).await.unwrap();
        let delivery = consumer.recv().await.unwrap();
        assert_eq!(decode_notification(&delivery.body).unwrap().id, id);
    }

    #[tokio::test]
    async fn double_stop_does_not_panic_or_block() {
        let broker = Arc::new(RecordingBroker::default());
        let (scheduler, _) = scheduler_with(broker);
        let handle = scheduler.handle();
        let root = ShutdownHandle::new();

        let task = tokio::spawn(scheduler.run(root.wait()));
        handle.stop();
        handle.stop();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        handle.stop();
        assert!(handle.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_shutdown() {
        let broker = Arc::new(RecordingBroker::default());
        let (scheduler, _) = scheduler_with(broker);
        let handle = scheduler.handle();
        let root = ShutdownHandle::new();

        let task = tokio::spawn(scheduler.run(root.wait()));
        tokio::time::sleep(Duration::from_millis(175)).await;
        root.trigger();
        task.await.unwrap().unwrap();

        assert_eq!(handle.state().await.ticks, 3);
    }
}
