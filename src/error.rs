//! Error types for the lease handshake simulation.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

use std::net::Ipv4Addr;

use crate::message::ParticipantId;

/// Errors that can occur while configuring or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system I/O error (config file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config file).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid simulation configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate) when the
    /// configuration contains invalid values (e.g., duplicate pool addresses).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every address in the pool is reserved or allocated.
    ///
    /// The allocator answers with an empty OFFER; peers retry.
    #[error("No available addresses in pool")]
    PoolExhausted,

    /// A REQUEST arrived from a peer that holds no reservation.
    ///
    /// Stale or duplicate requests end up here. The allocator logs and
    /// discards them.
    #[error("No reservation held for {0}")]
    NoReservation(ParticipantId),

    /// A REQUEST named a different address than the one reserved.
    #[error("{peer} requested {requested} but holds a reservation for {reserved}")]
    AddressMismatch {
        peer: ParticipantId,
        requested: Ipv4Addr,
        reserved: Ipv4Addr,
    },

    /// A peer reached END without an assigned address.
    ///
    /// This breaks the causal chain DISCOVER → OFFER → REQUEST → ACKNOWLEDGE
    /// and should never happen.
    #[error("{0} reached END without an assigned address")]
    MissingAddress(ParticipantId),

    /// A peer gave up after its configured number of DISCOVER attempts.
    #[error("{peer} gave up after {attempts} DISCOVER attempt(s)")]
    DiscoverLimit { peer: ParticipantId, attempts: u32 },

    /// No inbox exists for this participant id.
    #[error("No inbox for {0}")]
    UnknownParticipant(ParticipantId),

    /// A participant task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A specialized Result type for simulation operations.
pub type Result<T> = std::result::Result<T, Error>;
