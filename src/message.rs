//! Protocol messages exchanged over the broadcast medium.
//!
//! A [`Message`] is one protocol event: who sent it, who it is for, which
//! step of the handshake it is, and an optional address payload. Messages
//! are plain values; every recipient gets its own copy.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Identifies a participant on the medium.
///
/// Id `0` belongs to the allocator; peers are numbered from `1`.
/// The id doubles as the index of the participant's inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(u32);

impl ParticipantId {
    /// The single allocator.
    pub const ALLOCATOR: Self = Self(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_allocator(self) -> bool {
        self.0 == Self::ALLOCATOR.0
    }

    /// Inbox index on the medium.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_allocator() {
            write!(f, "SERVER")
        } else {
            write!(f, "CLIENT-{}", self.0)
        }
    }
}

/// The four steps of the lease handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Peer broadcast to locate the allocator.
    Discover,
    /// Allocator response to DISCOVER. An empty payload means the pool is exhausted.
    Offer,
    /// Peer confirmation of the offered address.
    Request,
    /// Allocator confirmation that the lease is bound.
    Acknowledge,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Acknowledge => write!(f, "ACKNOWLEDGE"),
        }
    }
}

/// One protocol event on the medium.
///
/// No validation happens on construction; the set of producers is the
/// allocator and peers in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub kind: MessageKind,
    pub payload: Option<Ipv4Addr>,
}

impl Message {
    pub fn new(
        from: ParticipantId,
        to: ParticipantId,
        kind: MessageKind,
        payload: Option<Ipv4Addr>,
    ) -> Self {
        Self {
            from,
            to,
            kind,
            payload,
        }
    }

    /// DISCOVER from `peer` to the allocator.
    pub fn discover(peer: ParticipantId) -> Self {
        Self::new(peer, ParticipantId::ALLOCATOR, MessageKind::Discover, None)
    }

    /// OFFER from the allocator; `None` signals pool exhaustion.
    pub fn offer(peer: ParticipantId, address: Option<Ipv4Addr>) -> Self {
        Self::new(ParticipantId::ALLOCATOR, peer, MessageKind::Offer, address)
    }

    /// REQUEST from `peer` for the offered `address`.
    pub fn request(peer: ParticipantId, address: Ipv4Addr) -> Self {
        Self::new(
            peer,
            ParticipantId::ALLOCATOR,
            MessageKind::Request,
            Some(address),
        )
    }

    /// ACKNOWLEDGE from the allocator binding `address` to `peer`.
    pub fn acknowledge(peer: ParticipantId, address: Ipv4Addr) -> Self {
        Self::new(
            ParticipantId::ALLOCATOR,
            peer,
            MessageKind::Acknowledge,
            Some(address),
        )
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "from: {}, to: {}, type: {}, info: ",
            self.from, self.to, self.kind
        )?;
        match self.payload {
            Some(address) => write!(f, "{}", address),
            None => write!(f, "-"),
        }
    }
}
