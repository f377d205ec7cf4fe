//! # dhcpsim
//!
//! A simulation of the DHCP lease handshake (DISCOVER, OFFER, REQUEST,
//! ACKNOWLEDGE) between one allocator and any number of peers sharing an
//! in-process broadcast medium.
//!
//! ## Features
//!
//! - Allocator with reservation and allocation tracking over a static pool
//! - Peers driving their own INIT → END state machine
//! - Empty OFFER on pool exhaustion, with peer-side DISCOVER retry
//! - Configurable delivery latency, polling, and jitter (all may be zero)
//! - Async/await with Tokio, one task per participant
//!
//! ## Quick Start
//!
//! ```no_run
//! use dhcpsim::{Config, Simulation};
//!
//! #[tokio::main]
//! async fn main() -> dhcpsim::Result<()> {
//!     let config = Config::load_or_create("config.json").await?;
//!     let report = Simulation::new(config)?.run().await?;
//!     for peer in report.peers {
//!         println!("{}", peer.lease);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Message`] - One protocol event (from, to, kind, optional address)
//! - [`Medium`] - Broadcast link; one [`Inbox`] per participant
//! - [`Allocator`] - Owns the pool and [`Leases`]; answers DISCOVER and REQUEST
//! - [`Peer`] - Seeks one address; answers OFFER and ACKNOWLEDGE
//! - [`Simulation`] - Starts everything and collects a [`Report`]

pub mod allocator;
pub mod config;
pub mod error;
pub mod lease;
pub mod medium;
pub mod message;
pub mod peer;
pub mod simulation;

pub use allocator::{Allocator, AllocatorHandle};
pub use config::{Config, Timing};
pub use error::{Error, Result};
pub use lease::{Lease, LeaseSnapshot, Leases};
pub use medium::{Inbox, Medium};
pub use message::{Message, MessageKind, ParticipantId};
pub use peer::{Peer, PeerHandle, PeerOutcome, PeerState};
pub use simulation::{Report, Running, Simulation};
