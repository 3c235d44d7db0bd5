pub mod access;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod moderation;
pub mod subscriptions;

pub use access::{AccessControl, FsAccessControl, NullAccessControl};
pub use conversations::Conversations;
pub use error::{CoreError, Result};
pub use messages::Messages;
pub use moderation::Moderation;
pub use subscriptions::Subscriptions;
