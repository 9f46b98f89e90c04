//! Batch review progress monitor
//!
//! Tracks whether a server-side batch review is running and polls its
//! progress table while it is. The monitor is `Idle` or `Active`; at most
//! one polling timer is alive, and only while `Active`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::QbankClient;
use crate::error::Result;
use crate::types::{page_count, BatchProgress, BatchStartRequest};

/// Default interval between progress polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);
/// Default rows per progress page
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Server side of a batch review
#[async_trait]
pub trait ProgressSource: Send + Sync + 'static {
    async fn start_batch(&self, request: &BatchStartRequest) -> Result<Option<String>>;

    async fn stop_batch(&self) -> Result<()>;

    async fn fetch_progress(&self, page: u32, page_size: u32) -> Result<BatchProgress>;
}

#[async_trait]
impl ProgressSource for QbankClient {
    async fn start_batch(&self, request: &BatchStartRequest) -> Result<Option<String>> {
        self.batch_start(request).await
    }

    async fn stop_batch(&self) -> Result<()> {
        self.batch_stop().await
    }

    async fn fetch_progress(&self, page: u32, page_size: u32) -> Result<BatchProgress> {
        self.batch_progress(page, page_size).await
    }
}

/// Whether a batch task is believed to be running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MonitorState {
    #[default]
    Idle,
    Active,
}

/// Polling configuration
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub page_size: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// What the monitor last saw, published after every applied poll
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub state: MonitorState,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub progress: BatchProgress,
}

impl Snapshot {
    pub fn page_count(&self) -> u32 {
        page_count(self.total, self.page_size)
    }
}

struct Shared {
    state: MonitorState,
    page: u32,
    total: u64,
    timer: Option<JoinHandle<()>>,
}

struct Inner<S> {
    source: S,
    config: PollConfig,
    shared: Mutex<Shared>,
    snapshots: watch::Sender<Snapshot>,
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.get_mut().timer.take() {
            timer.abort();
        }
    }
}

/// Poller for the batch progress table.
///
/// Cloning shares the same monitor. The timer task only holds a weak
/// reference, so dropping the last clone stops polling.
pub struct BatchMonitor<S: ProgressSource> {
    inner: Arc<Inner<S>>,
}

impl<S: ProgressSource> Clone for BatchMonitor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ProgressSource> BatchMonitor<S> {
    pub fn new(source: S, config: PollConfig) -> Self {
        let config = PollConfig {
            page_size: config.page_size.max(1),
            ..config
        };
        let (snapshots, _) = watch::channel(Snapshot {
            page: 1,
            page_size: config.page_size,
            ..Default::default()
        });

        Self {
            inner: Arc::new(Inner {
                source,
                config,
                shared: Mutex::new(Shared {
                    state: MonitorState::Idle,
                    page: 1,
                    total: 0,
                    timer: None,
                }),
                snapshots,
            }),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.inner.shared.lock().state
    }

    pub fn page(&self) -> u32 {
        self.inner.shared.lock().page
    }

    /// Whether a polling timer is currently scheduled
    pub fn has_live_timer(&self) -> bool {
        self.inner
            .shared
            .lock()
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Receive a snapshot after every applied poll
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Initial load: a running task found on the server activates polling
    pub async fn load(&self) {
        self.poll_once().await;
    }

    /// Start a batch review; on success polling starts from page 1
    pub async fn start(&self, request: &BatchStartRequest) -> Result<Option<String>> {
        match self.inner.source.start_batch(request).await {
            Ok(message) => {
                info!(
                    "Batch review started for questions {}..={}",
                    request.start_id, request.end_id
                );
                {
                    let mut shared = self.inner.shared.lock();
                    shared.page = 1;
                    shared.state = MonitorState::Active;
                }
                self.start_timer();
                self.poll_once().await;
                Ok(message)
            }
            Err(e) => {
                self.inner.shared.lock().state = MonitorState::Idle;
                self.stop_timer();
                Err(e)
            }
        }
    }

    /// Stop the batch review; the monitor only goes idle once the server confirmed
    pub async fn stop(&self) -> Result<()> {
        self.inner.source.stop_batch().await?;
        self.stop_timer();
        self.inner.shared.lock().state = MonitorState::Idle;
        info!("Batch review stopped");
        self.publish(None);
        Ok(())
    }

    /// Fetch the current page once and apply it
    pub async fn poll_once(&self) {
        poll(&self.inner).await;
    }

    /// Move to the next page if there is one; fetches exactly once when moved
    pub async fn next_page(&self) -> bool {
        let moved = {
            let mut shared = self.inner.shared.lock();
            let last = page_count(shared.total, self.inner.config.page_size);
            if shared.page < last {
                shared.page += 1;
                true
            } else {
                false
            }
        };
        if moved {
            self.poll_once().await;
        }
        moved
    }

    /// Move to the previous page if there is one; fetches exactly once when moved
    pub async fn prev_page(&self) -> bool {
        let moved = {
            let mut shared = self.inner.shared.lock();
            if shared.page > 1 {
                shared.page -= 1;
                true
            } else {
                false
            }
        };
        if moved {
            self.poll_once().await;
        }
        moved
    }

    fn start_timer(&self) {
        start_timer(&self.inner);
    }

    fn stop_timer(&self) {
        stop_timer(&self.inner);
    }

    fn publish(&self, progress: Option<BatchProgress>) {
        publish(&self.inner, progress);
    }
}

async fn poll<S: ProgressSource>(inner: &Arc<Inner<S>>) {
    let page = inner.shared.lock().page;

    let progress = match inner.source.fetch_progress(page, inner.config.page_size).await {
        Ok(progress) => progress,
        Err(e) => {
            warn!("Progress poll failed: {}", e);
            return;
        }
    };

    // Zero rows means no task, whether or not one ever ran
    if progress.total > 0 {
        let activated = {
            let mut shared = inner.shared.lock();
            shared.total = progress.total;
            let was_idle = shared.state == MonitorState::Idle;
            shared.state = MonitorState::Active;
            was_idle || shared.timer.is_none()
        };
        if activated {
            debug!("Batch task detected ({} questions), polling", progress.total);
            start_timer(inner);
        }
        publish(inner, Some(progress));
    } else {
        {
            let mut shared = inner.shared.lock();
            shared.total = 0;
            shared.state = MonitorState::Idle;
        }
        stop_timer(inner);
        publish(inner, Some(BatchProgress::default()));
    }
}

/// Cancel any live timer, then schedule a new one
fn start_timer<S: ProgressSource>(inner: &Arc<Inner<S>>) {
    let weak = Arc::downgrade(inner);
    let interval = inner.config.interval;

    let mut shared = inner.shared.lock();
    if let Some(previous) = shared.timer.take() {
        previous.abort();
    }
    shared.timer = Some(tokio::spawn(tick(weak, interval)));
}

/// Cancel the timer; a no-op when none is live
fn stop_timer<S: ProgressSource>(inner: &Inner<S>) {
    if let Some(timer) = inner.shared.lock().timer.take() {
        debug!("Polling stopped");
        timer.abort();
    }
}

async fn tick<S: ProgressSource>(weak: Weak<Inner<S>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        poll(&inner).await;
    }
}

fn publish<S>(inner: &Inner<S>, progress: Option<BatchProgress>) {
    let (state, page, total) = {
        let shared = inner.shared.lock();
        (shared.state, shared.page, shared.total)
    };
    let page_size = inner.config.page_size;
    inner.snapshots.send_modify(|snapshot| {
        snapshot.state = state;
        snapshot.page = page;
        snapshot.page_size = page_size;
        snapshot.total = total;
        if let Some(progress) = progress {
            snapshot.progress = progress;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QbankClientError;
    use crate::types::Reviewer;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockSource {
        total: AtomicU64,
        fail_polls: AtomicBool,
        fail_start: AtomicBool,
        fetches: AtomicUsize,
        pages: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl ProgressSource for Arc<MockSource> {
        async fn start_batch(&self, _request: &BatchStartRequest) -> Result<Option<String>> {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(QbankClientError::Api("already running".into()));
            }
            self.total.store(45, Ordering::SeqCst);
            Ok(Some("started".into()))
        }

        async fn stop_batch(&self) -> Result<()> {
            self.total.store(0, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_progress(&self, page: u32, _page_size: u32) -> Result<BatchProgress> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.pages.lock().push(page);
            if self.fail_polls.load(Ordering::SeqCst) {
                return Err(QbankClientError::server_error(500, "db locked"));
            }
            Ok(BatchProgress {
                status: "success".into(),
                total: self.total.load(Ordering::SeqCst),
                ..Default::default()
            })
        }
    }

    fn monitor() -> (BatchMonitor<Arc<MockSource>>, Arc<MockSource>) {
        let source = Arc::new(MockSource::default());
        (BatchMonitor::new(Arc::clone(&source), PollConfig::default()), source)
    }

    fn request() -> BatchStartRequest {
        BatchStartRequest {
            start_id: 1,
            end_id: 45,
            ai_list: vec![Reviewer::Qwen, Reviewer::Kimi],
        }
    }

    fn fetches(source: &MockSource) -> usize {
        source.fetches.load(Ordering::SeqCst)
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_polls_on_interval() {
        let (monitor, source) = monitor();
        monitor.start(&request()).await.unwrap();

        assert_eq!(monitor.state(), MonitorState::Active);
        assert!(monitor.has_live_timer());
        assert_eq!(fetches(&source), 1);

        wait(1600).await;
        assert_eq!(fetches(&source), 2);
        wait(1500).await;
        assert_eq!(fetches(&source), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_keeps_one_timer() {
        let (monitor, source) = monitor();
        monitor.start(&request()).await.unwrap();
        monitor.start(&request()).await.unwrap();
        assert_eq!(fetches(&source), 2);

        wait(1600).await;
        assert_eq!(fetches(&source), 3);
        assert!(monitor.has_live_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let (monitor, source) = monitor();
        monitor.start(&request()).await.unwrap();
        monitor.stop().await.unwrap();

        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(!monitor.has_live_timer());

        let before = fetches(&source);
        wait(5000).await;
        assert_eq!(fetches(&source), before);

        // Cancelling again is harmless
        monitor.stop().await.unwrap();
        assert!(!monitor.has_live_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_progress_goes_idle() {
        let (monitor, source) = monitor();
        monitor.start(&request()).await.unwrap();

        source.total.store(0, Ordering::SeqCst);
        wait(1600).await;

        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(!monitor.has_live_timer());
        let before = fetches(&source);
        wait(5000).await;
        assert_eq!(fetches(&source), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_detects_running_task() {
        let (monitor, source) = monitor();
        source.total.store(3, Ordering::SeqCst);

        monitor.load().await;
        assert_eq!(monitor.state(), MonitorState::Active);
        assert!(monitor.has_live_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_without_task_stays_idle() {
        let (monitor, _source) = monitor();
        monitor.load().await;
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(!monitor.has_live_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_keeps_state_and_timer() {
        let (monitor, source) = monitor();
        monitor.start(&request()).await.unwrap();

        source.fail_polls.store(true, Ordering::SeqCst);
        wait(3100).await;

        assert_eq!(monitor.state(), MonitorState::Active);
        assert!(monitor.has_live_timer());
        assert_eq!(fetches(&source), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_stays_idle() {
        let (monitor, source) = monitor();
        source.fail_start.store(true, Ordering::SeqCst);

        assert!(monitor.start(&request()).await.is_err());
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(!monitor.has_live_timer());
        assert_eq!(fetches(&source), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paging_is_bounded() {
        let (monitor, source) = monitor();
        monitor.start(&request()).await.unwrap();
        monitor.stop_timer();

        assert!(!monitor.prev_page().await);
        assert!(monitor.next_page().await);
        assert!(monitor.next_page().await);
        assert!(!monitor.next_page().await);
        assert_eq!(monitor.page(), 3);
        assert!(monitor.prev_page().await);

        assert_eq!(*source.pages.lock(), vec![1, 2, 3, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_published() {
        let (monitor, _source) = monitor();
        let mut snapshots = monitor.subscribe();

        monitor.start(&request()).await.unwrap();
        assert!(snapshots.has_changed().unwrap());

        let snapshot = snapshots.borrow_and_update().clone();
        assert_eq!(snapshot.state, MonitorState::Active);
        assert_eq!(snapshot.total, 45);
        assert_eq!(snapshot.page_count(), 3);

        monitor.stop().await.unwrap();
        assert_eq!(snapshots.borrow().state, MonitorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_monitor_stops_polling() {
        let (monitor, source) = monitor();
        monitor.start(&request()).await.unwrap();
        drop(monitor);

        let before = fetches(&source);
        wait(5000).await;
        assert_eq!(fetches(&source), before);
    }
}
