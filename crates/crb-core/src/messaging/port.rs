use async_trait::async_trait;

use crate::{
    domain::{ChatTarget, MessageRef},
    messaging::types::Content,
    Result,
};

/// Outbound side of the relay.
///
/// Telegram is the only implementation; tests plug in fakes.
#[async_trait]
pub trait RelayPort: Send + Sync {
    /// Post `content` to `to` and return a reference to the new message.
    ///
    /// Implementations reject `Content::Unsupported`.
    async fn send(&self, to: &ChatTarget, content: &Content) -> Result<MessageRef>;
}
