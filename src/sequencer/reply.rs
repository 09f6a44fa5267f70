//! Single-slot reply buffer between request completions and the tick loop
//!
//! Completions never touch sequencer state: they push their outcome into a
//! capacity-1 channel that only the tick reads. Each outcome is tagged with
//! the session that issued the request, so results of requests issued before a
//! run or stop are dropped instead of being consumed by the new session.

use stepwise_shared::LinkError;
use tokio::sync::mpsc;
use tracing::debug;

type Reply = Result<String, LinkError>;

#[derive(Debug)]
struct TaggedReply {
    session: u64,
    reply: Reply,
}

/// Receiving end, owned by the sequencer core
#[derive(Debug)]
pub(crate) struct ReplySlot {
    tx: mpsc::Sender<TaggedReply>,
    rx: mpsc::Receiver<TaggedReply>,
}

/// Completion handle for one request
#[derive(Debug)]
pub(crate) struct ReplySender {
    tx: mpsc::Sender<TaggedReply>,
    session: u64,
}

impl ReplySlot {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx }
    }

    /// Handle for a request issued in `session`
    pub(crate) fn sender(&self, session: u64) -> ReplySender {
        ReplySender {
            tx: self.tx.clone(),
            session,
        }
    }

    /// Take the reply for `session`, discarding stale replies
    pub(crate) fn take(&mut self, session: u64) -> Option<Reply> {
        while let Ok(tagged) = self.rx.try_recv() {
            if tagged.session == session {
                return Some(tagged.reply);
            }
            debug!("[SEQ] Dropping stale reply from session {}", tagged.session);
        }
        None
    }

    /// Discard whatever is buffered
    pub(crate) fn clear(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

impl ReplySender {
    /// Store the outcome; waits while a stale reply still occupies the slot
    pub(crate) async fn deliver(self, reply: Reply) {
        let tagged = TaggedReply {
            session: self.session,
            reply,
        };
        if self.tx.send(tagged).await.is_err() {
            debug!("[SEQ] Reply slot closed, dropping reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_consumed_once() {
        let mut slot = ReplySlot::new();
        assert!(slot.take(1).is_none());

        slot.sender(1).deliver(Ok("ok".into())).await;
        assert_eq!(slot.take(1), Some(Ok("ok".into())));
        assert!(slot.take(1).is_none());
    }

    #[tokio::test]
    async fn test_stale_session_dropped() {
        let mut slot = ReplySlot::new();
        slot.sender(1).deliver(Ok("old".into())).await;
        assert!(slot.take(2).is_none());

        slot.sender(2).deliver(Err(LinkError::Dropped)).await;
        assert_eq!(slot.take(2), Some(Err(LinkError::Dropped)));
    }

    #[tokio::test]
    async fn test_clear() {
        let mut slot = ReplySlot::new();
        slot.sender(3).deliver(Ok("ok".into())).await;
        slot.clear();
        assert!(slot.take(3).is_none());
    }

    #[tokio::test]
    async fn test_delivery_waits_for_free_slot() {
        let mut slot = ReplySlot::new();
        slot.sender(1).deliver(Ok("stale".into())).await;

        let sender = slot.sender(2);
        let pending = tokio::spawn(async move { sender.deliver(Ok("fresh".into())).await });
        tokio::task::yield_now().await;

        // First take drains the stale reply; the fresh one lands afterwards
        assert!(slot.take(2).is_none());
        pending.await.unwrap();
        assert_eq!(slot.take(2), Some(Ok("fresh".into())));
    }
}
