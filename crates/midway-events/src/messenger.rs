//! Outbound messaging seam.
//!
//! The lifecycle never talks to a chat platform directly; it goes
//! through [`Messenger`], which models the few operations events need:
//! announce in a channel, edit an announcement, and run a discussion
//! thread. The service ships with [`NullMessenger`] for offline runs;
//! a real transport implements the trait out of tree.
//!
//! The lifecycle is generic over the messenger (enum-free static
//! dispatch); the trait is not meant to be boxed.

use std::sync::atomic::{AtomicU64, Ordering};

use midway_types::{ChannelId, MessageHandle, ThreadHandle};
use tracing::info;

/// Errors a messenger implementation can report.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    /// Sending or editing a channel message failed.
    #[error("message delivery failed: {reason}")]
    Send {
        /// Transport-specific failure description.
        reason: String,
    },

    /// A thread operation failed.
    #[error("thread operation failed: {reason}")]
    Thread {
        /// Transport-specific failure description.
        reason: String,
    },
}

/// The messaging operations the event lifecycle depends on.
#[allow(async_fn_in_trait)]
pub trait Messenger {
    /// Post `content` in a channel, returning a handle for later edits.
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::Send`] when delivery fails.
    async fn send(&self, channel: &ChannelId, content: &str)
    -> Result<MessageHandle, MessengerError>;

    /// Replace the content of a previously sent message.
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::Send`] when the edit fails.
    async fn edit(&self, message: &MessageHandle, content: &str) -> Result<(), MessengerError>;

    /// Open a discussion thread attached to a message.
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::Thread`] when the thread cannot be
    /// created.
    async fn open_thread(
        &self,
        message: &MessageHandle,
        title: &str,
    ) -> Result<ThreadHandle, MessengerError>;

    /// Post `content` inside a thread.
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::Thread`] when delivery fails.
    async fn send_in_thread(
        &self,
        thread: &ThreadHandle,
        content: &str,
    ) -> Result<(), MessengerError>;

    /// Close a thread to further discussion.
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::Thread`] when archival fails.
    async fn archive_thread(&self, thread: &ThreadHandle) -> Result<(), MessengerError>;
}

/// A messenger that delivers nowhere.
///
/// Every operation succeeds, logs at info level, and mints a
/// deterministic handle, so an offline run exercises the full lifecycle
/// with the log as the only audience.
#[derive(Debug, Default)]
pub struct NullMessenger {
    counter: AtomicU64,
}

impl NullMessenger {
    /// Create a null messenger with a fresh handle counter.
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Messenger for NullMessenger {
    async fn send(
        &self,
        channel: &ChannelId,
        content: &str,
    ) -> Result<MessageHandle, MessengerError> {
        let handle = MessageHandle::from(format!("null-msg-{}", self.next()));
        info!(channel = %channel, %handle, content, "Message (null transport)");
        Ok(handle)
    }

    async fn edit(&self, message: &MessageHandle, content: &str) -> Result<(), MessengerError> {
        info!(message = %message, content, "Edit (null transport)");
        Ok(())
    }

    async fn open_thread(
        &self,
        message: &MessageHandle,
        title: &str,
    ) -> Result<ThreadHandle, MessengerError> {
        let handle = ThreadHandle::from(format!("null-thread-{}", self.next()));
        info!(message = %message, %handle, title, "Thread opened (null transport)");
        Ok(handle)
    }

    async fn send_in_thread(
        &self,
        thread: &ThreadHandle,
        content: &str,
    ) -> Result<(), MessengerError> {
        info!(thread = %thread, content, "Thread message (null transport)");
        Ok(())
    }

    async fn archive_thread(&self, thread: &ThreadHandle) -> Result<(), MessengerError> {
        info!(thread = %thread, "Thread archived (null transport)");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_messenger_mints_distinct_handles() {
        let messenger = NullMessenger::new();
        let channel = ChannelId::from("events");

        let first = messenger.send(&channel, "one").await.unwrap();
        let second = messenger.send(&channel, "two").await.unwrap();
        assert_ne!(first, second);

        let thread = messenger.open_thread(&first, "talk").await.unwrap();
        assert!(thread.as_str().starts_with("null-thread-"));
        messenger.send_in_thread(&thread, "hello").await.unwrap();
        messenger.archive_thread(&thread).await.unwrap();
    }
}
