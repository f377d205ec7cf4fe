//! Client side of the lease handshake.
//!
//! A [`Peer`] drives itself from INIT to END:
//!
//! ```text
//! INIT --OFFER(addr)--> OFFER --REQUEST sent--> REQUESTING
//!   ^                                               |
//!   +--OFFER(empty): DISCOVER again       ACKNOWLEDGE(addr)
//!                                                   v
//!                              END <--next cycle-- ACKNOWLEDGED
//! ```
//!
//! Messages that do not fit the current state are stale and dropped, so the
//! state only ever moves forward.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::config::Timing;
use crate::error::{Error, Result};
use crate::lease::Lease;
use crate::medium::{Inbox, Medium};
use crate::message::{Message, MessageKind, ParticipantId};

/// Where a peer is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerState {
    /// Waiting for an OFFER.
    Init,
    /// Accepted an OFFER, about to REQUEST it.
    Offer,
    /// REQUEST sent, waiting for ACKNOWLEDGE.
    Requesting,
    /// Address bound; finishes on the next loop cycle.
    Acknowledged,
    /// Terminal.
    End,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Offer => write!(f, "OFFER"),
            Self::Requesting => write!(f, "REQUESTING"),
            Self::Acknowledged => write!(f, "ACKNOWLEDGED"),
            Self::End => write!(f, "END"),
        }
    }
}

/// Result of a peer that reached END.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerOutcome {
    pub lease: Lease,
    pub discover_attempts: u32,
    /// Every state entered, starting with INIT.
    pub history: Vec<PeerState>,
}

enum Reaction {
    Ignore,
    Rediscover,
    Request(Message),
}

/// A participant seeking exactly one address (role "client").
pub struct Peer {
    id: ParticipantId,
    medium: Arc<Medium>,
    inbox: Inbox,
    timing: Timing,
    address: Option<Ipv4Addr>,
    state: PeerState,
    discover_attempts: u32,
    history: Vec<PeerState>,
    states: watch::Sender<PeerState>,
}

impl Peer {
    pub fn new(id: ParticipantId, medium: Arc<Medium>, inbox: Inbox, timing: Timing) -> Self {
        let (states, _) = watch::channel(PeerState::Init);

        Self {
            id,
            medium,
            inbox,
            timing,
            address: None,
            state: PeerState::Init,
            discover_attempts: 0,
            history: vec![PeerState::Init],
            states,
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    pub fn discover_attempts(&self) -> u32 {
        self.discover_attempts
    }

    /// Spawns the processing loop, which sends the first DISCOVER and runs
    /// until the peer reaches END.
    pub fn start(self) -> PeerHandle {
        let id = self.id;
        let states = self.states.subscribe();
        let task = tokio::spawn(self.run());

        PeerHandle { id, task, states }
    }

    /// Broadcasts a DISCOVER to the allocator after a random jitter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoverLimit`] once the configured attempt bound is
    /// reached. Without a bound this never fails.
    pub async fn discover(&mut self) -> Result<()> {
        if let Some(limit) = self.timing.max_discover_attempts
            && self.discover_attempts >= limit
        {
            return Err(Error::DiscoverLimit {
                peer: self.id,
                attempts: self.discover_attempts,
            });
        }

        let delay = self.discover_jitter();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.discover_attempts += 1;
        self.medium.broadcast(Message::discover(self.id)).await;
        Ok(())
    }

    fn discover_jitter(&self) -> Duration {
        let (min, max) = self.timing.discover_delay;
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    async fn run(mut self) -> Result<PeerOutcome> {
        self.discover().await?;

        loop {
            if !self.timing.poll_interval.is_zero() {
                tokio::time::sleep(self.timing.poll_interval).await;
            }

            if let Some(outcome) = self.try_finish()? {
                return Ok(outcome);
            }

            let Some(message) = self.inbox.recv_timeout(self.timing.recv_timeout).await else {
                continue;
            };

            self.process(&message).await?;
        }
    }

    /// Applies one inbound message, broadcasting any REQUEST or retry it
    /// triggers.
    pub async fn process(&mut self, message: &Message) -> Result<()> {
        match self.react(message) {
            Reaction::Ignore => Ok(()),
            Reaction::Rediscover => self.discover().await,
            Reaction::Request(request) => {
                self.medium.broadcast(request).await;
                self.transition(PeerState::Requesting);
                Ok(())
            }
        }
    }

    fn react(&mut self, message: &Message) -> Reaction {
        if message.from != ParticipantId::ALLOCATOR || message.to != self.id {
            return Reaction::Ignore;
        }

        match (message.kind, self.state, message.payload) {
            (MessageKind::Offer, PeerState::Init, None) => {
                debug!("{} got an empty OFFER, pool exhausted; retrying", self.id);
                Reaction::Rediscover
            }
            (MessageKind::Offer, PeerState::Init, Some(address)) => {
                self.transition(PeerState::Offer);
                Reaction::Request(Message::request(self.id, address))
            }
            (MessageKind::Acknowledge, PeerState::Requesting, Some(address)) => {
                self.address = Some(address);
                self.transition(PeerState::Acknowledged);
                Reaction::Ignore
            }
            (kind, state, _) => {
                trace!("{} dropping stale {} in state {}", self.id, kind, state);
                Reaction::Ignore
            }
        }
    }

    /// Moves ACKNOWLEDGED to END and reports the lease.
    fn try_finish(&mut self) -> Result<Option<PeerOutcome>> {
        if self.state != PeerState::Acknowledged {
            return Ok(None);
        }

        self.transition(PeerState::End);
        let address = self.address.ok_or(Error::MissingAddress(self.id))?;
        info!("Assigned address: {} {}", self.id, address);

        Ok(Some(PeerOutcome {
            lease: Lease {
                peer: self.id,
                address,
            },
            discover_attempts: self.discover_attempts,
            history: self.history.clone(),
        }))
    }

    fn transition(&mut self, next: PeerState) {
        debug!("{}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.history.push(next);
        self.states.send_replace(next);
    }
}

/// Handle to a running peer.
pub struct PeerHandle {
    id: ParticipantId,
    task: JoinHandle<Result<PeerOutcome>>,
    states: watch::Receiver<PeerState>,
}

impl PeerHandle {
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Latest state published by the peer.
    pub fn state(&self) -> PeerState {
        *self.states.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PeerState> {
        self.states.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the loop. A peer starved by an exhausted pool never stops on
    /// its own.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the peer to reach END.
    pub async fn join(self) -> Result<PeerOutcome> {
        self.task.await?
    }
}
