pub mod poller;
pub mod worker;

pub use poller::{DeliveryPoller, NotificationSink, PollerHandle, SequenceFeed};
pub use worker::PollWorker;
