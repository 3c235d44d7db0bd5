use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

use eddy_db::Database;

/// Read side of the sequence store, as seen by a poller.
pub trait SequenceFeed {
    /// Highest published message id in the conversation, 0 when empty.
    fn max_published_id(&self, conversation_id: Uuid) -> anyhow::Result<i64>;

    /// Published ids in `(after, upto]` belonging to the conversation,
    /// ascending. Ids of other conversations inside the range are absent;
    /// gaps are expected.
    fn published_ids_between(
        &self,
        conversation_id: Uuid,
        after: i64,
        upto: i64,
    ) -> anyhow::Result<Vec<i64>>;
}

impl SequenceFeed for Arc<Database> {
    fn max_published_id(&self, conversation_id: Uuid) -> anyhow::Result<i64> {
        self.as_ref().max_published_id(&conversation_id.to_string())
    }

    fn published_ids_between(
        &self,
        conversation_id: Uuid,
        after: i64,
        upto: i64,
    ) -> anyhow::Result<Vec<i64>> {
        self.as_ref().published_ids_between(&conversation_id.to_string(), after, upto)
    }
}

/// Receives delta batches. Delivery is at-most-once per id: the poller
/// advances its position before dispatching, so a failing sink is logged
/// and skipped, never retried.
pub trait NotificationSink {
    fn deliver(&self, conversation_id: Uuid, message_ids: Vec<i64>) -> anyhow::Result<()>;
}

struct Shared {
    suspended: AtomicBool,
    busy: AtomicBool,
    last_seen: AtomicI64,
    resume_kick: Notify,
}

/// Cloneable control surface for a running poller: pause/resume and the
/// observable state, usable from other tasks while the worker owns the
/// poller itself.
#[derive(Clone)]
pub struct PollerHandle {
    shared: Arc<Shared>,
}

impl PollerHandle {
    /// Stops future ticks from querying the feed. An in-flight tick
    /// finishes dispatching its already-computed delta.
    pub fn suspend(&self) {
        self.shared.suspended.store(true, Ordering::Release);
    }

    /// Clears suspension and forces the very next tick to run immediately,
    /// regardless of the worker's poll interval.
    pub fn resume(&self) {
        self.shared.suspended.store(false, Ordering::Release);
        self.shared.resume_kick.notify_one();
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    pub fn last_seen_id(&self) -> i64 {
        self.shared.last_seen.load(Ordering::Acquire)
    }

    /// Resolves when `resume` is called; consumed by the worker loop.
    pub(crate) async fn kicked(&self) {
        self.shared.resume_kick.notified().await;
    }
}

/// Incremental delivery loop state for one (watcher, conversation) pair.
///
/// Each tick diffs the feed's highest published id against the last seen
/// position and dispatches the ids in between, in ascending order. The
/// position starts at the feed's current maximum, so history is never
/// re-delivered to a fresh poller.
pub struct DeliveryPoller<F, S> {
    feed: F,
    sink: S,
    conversation_id: Uuid,
    last_seen_id: i64,
    shared: Arc<Shared>,
}

impl<F: SequenceFeed, S: NotificationSink> DeliveryPoller<F, S> {
    pub fn new(feed: F, sink: S, conversation_id: Uuid) -> anyhow::Result<Self> {
        let last_seen_id = feed.max_published_id(conversation_id)?;
        Ok(Self {
            feed,
            sink,
            conversation_id,
            last_seen_id,
            shared: Arc::new(Shared {
                suspended: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                last_seen: AtomicI64::new(last_seen_id),
                resume_kick: Notify::new(),
            }),
        })
    }

    pub fn handle(&self) -> PollerHandle {
        PollerHandle { shared: self.shared.clone() }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn last_seen_id(&self) -> i64 {
        self.last_seen_id
    }

    /// One poll step. Returns the number of ids dispatched (0 while
    /// suspended or when nothing new is visible).
    pub fn tick(&mut self) -> anyhow::Result<usize> {
        if self.shared.suspended.load(Ordering::Acquire) {
            return Ok(0);
        }

        self.shared.busy.store(true, Ordering::Release);
        let result = self.poll_once();
        self.shared.busy.store(false, Ordering::Release);
        result
    }

    fn poll_once(&mut self) -> anyhow::Result<usize> {
        let current_max = self.feed.max_published_id(self.conversation_id)?;
        if current_max <= self.last_seen_id {
            return Ok(0);
        }

        let delta = self.feed.published_ids_between(
            self.conversation_id,
            self.last_seen_id,
            current_max,
        )?;

        // Advance before dispatching: a failing sink must not cause the
        // same range to be re-delivered forever.
        self.last_seen_id = current_max;
        self.shared.last_seen.store(current_max, Ordering::Release);

        if delta.is_empty() {
            return Ok(0);
        }

        let count = delta.len();
        if let Err(e) = self.sink.deliver(self.conversation_id, delta) {
            warn!(
                conversation_id = %self.conversation_id,
                error = %e,
                "notification sink rejected a delta"
            );
        }
        Ok(count)
    }
}
