use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::allocator::{Allocator, AllocatorHandle};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lease::LeaseSnapshot;
use crate::medium::Medium;
use crate::message::ParticipantId;
use crate::peer::{Peer, PeerHandle, PeerOutcome};

/// Outcome of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// One entry per peer, ordered by peer id.
    pub peers: Vec<PeerOutcome>,
    /// Allocator state after every peer finished.
    pub allocator: LeaseSnapshot,
}

/// Starts one allocator and `peer_count` peers on a shared medium.
pub struct Simulation {
    config: Config,
}

/// Participants of a started simulation.
pub struct Running {
    pub allocator: AllocatorHandle,
    pub peers: Vec<PeerHandle>,
}

impl Simulation {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wires the medium and spawns every participant without waiting.
    pub fn start(&self) -> Result<Running> {
        let timing = self.config.timing();
        let (medium, inboxes) = Medium::new(self.config.peer_count + 1, timing.delivery_delay);
        let medium = Arc::new(medium);
        let mut inboxes = inboxes.into_iter();

        let own = inboxes
            .next()
            .ok_or(Error::UnknownParticipant(ParticipantId::ALLOCATOR))?;
        let allocator = Allocator::new(
            self.config.addresses.iter().copied(),
            own,
            Arc::clone(&medium),
            timing,
        )
        .start();

        info!(
            "Simulation starting: {} peer(s), {} address(es)",
            self.config.peer_count,
            self.config.pool_size()
        );

        let peers = inboxes
            .map(|inbox| {
                Peer::new(inbox.owner(), Arc::clone(&medium), inbox, timing).start()
            })
            .collect();

        Ok(Running { allocator, peers })
    }

    /// Runs until every peer reaches END, then stops the allocator.
    ///
    /// # Errors
    ///
    /// Returns the first peer failure. The allocator is still shut down.
    pub async fn run(&self) -> Result<Report> {
        let Running { allocator, peers } = self.start()?;

        let mut outcomes = Vec::with_capacity(peers.len());
        let mut failure = None;
        for peer in peers {
            let id = peer.id();
            match peer.join().await {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    error!("{} failed: {}", id, error);
                    failure.get_or_insert(error);
                }
            }
        }

        let snapshot = allocator.shutdown().await?;

        match failure {
            Some(error) => Err(error),
            None => Ok(Report {
                peers: outcomes,
                allocator: snapshot,
            }),
        }
    }
}
