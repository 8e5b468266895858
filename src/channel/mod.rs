pub mod discord;

use std::sync::Arc;

use crate::error::StoreError;
use crate::message::{Credential, RemoteMessage};

/// Remote message history of a chat service. The engine only ever lists
/// pages and deletes single messages; calls are issued one at a time.
pub trait MessageStore: Send + Sync {
    /// Up to `limit` messages older than `before` (or the newest ones when
    /// `before` is None), newest first. An empty page means the channel is
    /// exhausted.
    fn list_messages(
        &self,
        credential: &Credential,
        channel_id: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, StoreError>;

    /// Remove one message.
    fn delete_message(
        &self,
        credential: &Credential,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), StoreError>;
}

impl<S: MessageStore + ?Sized> MessageStore for Arc<S> {
    fn list_messages(
        &self,
        credential: &Credential,
        channel_id: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, StoreError> {
        (**self).list_messages(credential, channel_id, before, limit)
    }

    fn delete_message(
        &self,
        credential: &Credential,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), StoreError> {
        (**self).delete_message(credential, channel_id, message_id)
    }
}
