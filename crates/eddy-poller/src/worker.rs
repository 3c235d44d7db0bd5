use std::time::Duration;

use tracing::{debug, warn};

use crate::poller::{DeliveryPoller, NotificationSink, SequenceFeed};

/// Background task that drives a poller on a fixed interval.
///
/// Runs forever; the owner aborts the task to stop a watch. A `resume`
/// on the poller's handle wakes the loop immediately instead of waiting
/// out the interval.
pub struct PollWorker<F, S> {
    poller: DeliveryPoller<F, S>,
    interval: Duration,
}

impl<F: SequenceFeed, S: NotificationSink> PollWorker<F, S> {
    pub fn new(poller: DeliveryPoller<F, S>, interval: Duration) -> Self {
        Self { poller, interval }
    }

    pub async fn run(mut self) {
        let handle = self.poller.handle();
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = handle.kicked() => {}
            }

            match self.poller.tick() {
                Ok(0) => {}
                Ok(count) => {
                    debug!(
                        conversation_id = %self.poller.conversation_id(),
                        count,
                        "dispatched new message ids"
                    );
                }
                Err(e) => {
                    warn!(
                        conversation_id = %self.poller.conversation_id(),
                        error = %e,
                        "poll tick failed"
                    );
                }
            }
        }
    }
}
