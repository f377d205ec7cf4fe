use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::Timing;
use crate::error::Result;
use crate::lease::{LeaseSnapshot, Leases};
use crate::medium::{Inbox, Medium};
use crate::message::{Message, MessageKind, ParticipantId};

/// The single address allocator (role "server").
///
/// Owns the [`Leases`] table outright. Only the processing loop started by
/// [`Allocator::start`] mutates it; observers read snapshots through the
/// returned [`AllocatorHandle`].
pub struct Allocator {
    leases: Leases,
    inbox: Inbox,
    medium: Arc<Medium>,
    timing: Timing,
    snapshots: watch::Sender<LeaseSnapshot>,
}

impl Allocator {
    /// Creates an allocator over `pool`. `inbox` should be the allocator's
    /// own inbox (participant `0`).
    pub fn new(
        pool: impl IntoIterator<Item = Ipv4Addr>,
        inbox: Inbox,
        medium: Arc<Medium>,
        timing: Timing,
    ) -> Self {
        let leases = Leases::new(pool);
        let (snapshots, _) = watch::channel(leases.snapshot());

        Self {
            leases,
            inbox,
            medium,
            timing,
            snapshots,
        }
    }

    pub fn leases(&self) -> &Leases {
        &self.leases
    }

    /// Spawns the processing loop.
    ///
    /// The loop never stops on its own. It ends when
    /// [`AllocatorHandle::shutdown`] is called or the handle is dropped.
    pub fn start(self) -> AllocatorHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let snapshots = self.snapshots.subscribe();
        let task = tokio::spawn(self.run(shutdown_rx));

        AllocatorHandle {
            task,
            shutdown,
            snapshots,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Allocator ready with {} address(es)",
            self.leases.free_count()
        );

        loop {
            if !self.timing.poll_interval.is_zero() {
                tokio::time::sleep(self.timing.poll_interval).await;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Allocator shutting down");
                        break;
                    }
                }
                received = self.inbox.recv_timeout(self.timing.recv_timeout) => {
                    let Some(message) = received else {
                        continue;
                    };
                    if let Some(reply) = self.handle_message(&message) {
                        self.medium.broadcast(reply).await;
                    }
                }
            }
        }
    }

    /// Applies one inbound message to the lease table and returns the reply
    /// to broadcast, if any.
    ///
    /// Never fails: protocol inconsistencies are logged and dropped so one
    /// bad message cannot stop the allocator serving other peers.
    pub fn handle_message(&mut self, message: &Message) -> Option<Message> {
        if message.to != ParticipantId::ALLOCATOR {
            trace!("Discarding message for {}", message.to);
            return None;
        }

        match message.kind {
            MessageKind::Discover => Some(self.handle_discover(message.from)),
            MessageKind::Request => self.handle_request(message.from, message.payload),
            kind => {
                debug!("Ignoring {} from {}", kind, message.from);
                None
            }
        }
    }

    fn handle_discover(&mut self, peer: ParticipantId) -> Message {
        match self.leases.reserve(peer) {
            Ok(address) => {
                self.publish();
                info!("OFFER {} to {}", address, peer);
                Message::offer(peer, Some(address))
            }
            Err(error) => {
                warn!("{}, sending empty OFFER to {}", error, peer);
                Message::offer(peer, None)
            }
        }
    }

    fn handle_request(
        &mut self,
        peer: ParticipantId,
        requested: Option<Ipv4Addr>,
    ) -> Option<Message> {
        match self.leases.commit(peer, requested) {
            Ok(lease) => {
                self.publish();
                info!("ACKNOWLEDGE {} to {}", lease.address, peer);
                Some(Message::acknowledge(peer, lease.address))
            }
            Err(error) => {
                warn!("Discarding REQUEST from {}: {}", peer, error);
                None
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.leases.snapshot());
    }
}

/// Handle to a running allocator.
pub struct AllocatorHandle {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    snapshots: watch::Receiver<LeaseSnapshot>,
}

impl AllocatorHandle {
    /// Latest published state of the lease table.
    pub fn snapshot(&self) -> LeaseSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every reservation and allocation.
    pub fn subscribe(&self) -> watch::Receiver<LeaseSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop and returns the final lease table.
    pub async fn shutdown(self) -> Result<LeaseSnapshot> {
        let _ = self.shutdown.send(true);
        self.task.await?;
        Ok(self.snapshots.borrow().clone())
    }
}
