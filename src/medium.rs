//! Shared broadcast link between the allocator and its peers.
//!
//! Every participant owns one [`Inbox`] and is the only one reading it. The
//! [`Medium`] keeps just the sending halves, so it can enqueue into any inbox
//! but never dequeue. A broadcast lands in every inbox, the sender's own
//! included, and recipients filter on `to`.
//!
//! # Ordering
//!
//! Each inbox is an unbounded `mpsc` channel. A single caller awaiting
//! [`Medium::broadcast`] therefore sees its messages arrive FIFO at each
//! recipient. No order is promised across recipients or across callers.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, trace};

use crate::message::{Message, ParticipantId};

/// Receiving half owned by one participant.
#[derive(Debug)]
pub struct Inbox {
    owner: ParticipantId,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl Inbox {
    pub fn owner(&self) -> ParticipantId {
        self.owner
    }

    /// Waits up to `timeout` for the next message.
    ///
    /// Returns `None` when nothing arrived in time. That is the normal idle
    /// case, not an error.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

/// Broadcast medium with one inbox per participant.
#[derive(Debug)]
pub struct Medium {
    inboxes: Vec<mpsc::UnboundedSender<Message>>,
    delivery_delay: Duration,
}

impl Medium {
    /// Creates a medium for `participants` inboxes, indexed by participant id.
    ///
    /// Inbox `0` belongs to the allocator.
    pub fn new(participants: usize, delivery_delay: Duration) -> (Self, Vec<Inbox>) {
        let mut senders = Vec::with_capacity(participants);
        let mut inboxes = Vec::with_capacity(participants);

        for index in 0..participants {
            let (sender, receiver) = mpsc::unbounded_channel();
            senders.push(sender);
            inboxes.push(Inbox {
                owner: ParticipantId::new(index as u32),
                receiver,
            });
        }

        (
            Self {
                inboxes: senders,
                delivery_delay,
            },
            inboxes,
        )
    }

    pub fn participants(&self) -> usize {
        self.inboxes.len()
    }

    pub fn delivery_delay(&self) -> Duration {
        self.delivery_delay
    }

    /// Delivers `message` to every inbox.
    ///
    /// Each delivery waits the configured delay first. An inbox whose owner
    /// has finished is skipped.
    pub async fn broadcast(&self, message: Message) {
        info!("broadcasting: {}", message);

        for (index, inbox) in self.inboxes.iter().enumerate() {
            if !self.delivery_delay.is_zero() {
                tokio::time::sleep(self.delivery_delay).await;
            }
            if inbox.send(message.clone()).is_err() {
                trace!("inbox {} closed, skipping delivery", index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_inboxes_indexed_by_participant() {
        let (medium, inboxes) = Medium::new(3, Duration::ZERO);
        assert_eq!(medium.participants(), 3);
        for (index, inbox) in inboxes.iter().enumerate() {
            assert_eq!(inbox.owner().index(), index);
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_inbox_including_sender() {
        let (medium, mut inboxes) = Medium::new(3, Duration::ZERO);
        let message = Message::discover(ParticipantId::new(1));

        medium.broadcast(message.clone()).await;

        for inbox in inboxes.iter_mut() {
            assert_eq!(inbox.recv_timeout(WAIT).await, Some(message.clone()));
        }
    }

    #[tokio::test]
    async fn test_fifo_per_recipient() {
        let (medium, mut inboxes) = Medium::new(2, Duration::ZERO);
        let peer = ParticipantId::new(1);
        let first = Message::discover(peer);
        let second = Message::request(peer, Ipv4Addr::new(10, 0, 0, 1));
        let third = Message::discover(peer);

        medium.broadcast(first.clone()).await;
        medium.broadcast(second.clone()).await;
        medium.broadcast(third.clone()).await;

        for inbox in inboxes.iter_mut() {
            assert_eq!(inbox.try_recv(), Some(first.clone()));
            assert_eq!(inbox.try_recv(), Some(second.clone()));
            assert_eq!(inbox.try_recv(), Some(third.clone()));
            assert_eq!(inbox.try_recv(), None);
        }
    }

    #[tokio::test]
    async fn test_recv_timeout_on_empty_inbox() {
        let (_medium, mut inboxes) = Medium::new(1, Duration::ZERO);
        assert_eq!(inboxes[0].recv_timeout(Duration::from_millis(5)).await, None);
    }

    #[tokio::test]
    async fn test_closed_inbox_is_skipped() {
        let (medium, inboxes) = Medium::new(3, Duration::ZERO);
        let mut inboxes = inboxes.into_iter();
        let mut allocator = inboxes.next().unwrap();
        drop(inboxes.next());
        let mut last = inboxes.next().unwrap();

        let message = Message::discover(ParticipantId::new(2));
        medium.broadcast(message.clone()).await;

        assert_eq!(allocator.try_recv(), Some(message.clone()));
        assert_eq!(last.try_recv(), Some(message));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_delay_applies_per_recipient() {
        let delay = Duration::from_millis(100);
        let (medium, _inboxes) = Medium::new(3, delay);
        let started = tokio::time::Instant::now();

        medium.broadcast(Message::discover(ParticipantId::new(1))).await;

        assert!(started.elapsed() >= delay * 3);
    }

    #[tokio::test]
    async fn test_concurrent_broadcasts_all_delivered() {
        let (medium, mut inboxes) = Medium::new(2, Duration::ZERO);
        let medium = std::sync::Arc::new(medium);

        let mut handles = vec![];
        for id in 1..=8 {
            let medium = std::sync::Arc::clone(&medium);
            handles.push(tokio::spawn(async move {
                medium.broadcast(Message::discover(ParticipantId::new(id))).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for inbox in inboxes.iter_mut() {
            let mut senders = vec![];
            while let Some(message) = inbox.try_recv() {
                senders.push(message.from.get());
            }
            senders.sort_unstable();
            assert_eq!(senders, (1..=8).collect::<Vec<_>>());
        }
    }
}
