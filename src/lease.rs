//! Allocator-side lease bookkeeping.
//!
//! This module tracks which pool addresses are free, which are reserved for
//! a peer after an OFFER, and which are bound to a peer after ACKNOWLEDGE:
//!
//! - Reservation on DISCOVER (lowest free address first)
//! - Promotion of a reservation to an allocation on REQUEST
//! - Read-only snapshots for observers
//!
//! # Ownership
//!
//! [`Leases`] has no interior locking. It is owned by the allocator's
//! processing loop, which is the only writer; everyone else sees a
//! [`LeaseSnapshot`].
//!
//! # Invariants
//!
//! - Every pool address is in exactly one of free, reserved, allocated.
//! - An allocation, once made, is never changed or removed.
//! - An address is only allocated to a peer that held a reservation for it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::ParticipantId;

/// A confirmed binding of an address to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub peer: ParticipantId,
    pub address: Ipv4Addr,
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.peer, self.address)
    }
}

/// Point-in-time copy of the allocator's three address sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSnapshot {
    pub available: BTreeSet<Ipv4Addr>,
    pub reserved: BTreeMap<ParticipantId, Ipv4Addr>,
    pub allocated: BTreeMap<ParticipantId, Ipv4Addr>,
}

impl LeaseSnapshot {
    /// Returns true if free, reserved and allocated addresses together are
    /// exactly `pool`, with no address counted twice.
    pub fn conserves(&self, pool: &BTreeSet<Ipv4Addr>) -> bool {
        let mut seen = self.available.clone();
        for address in self.reserved.values().chain(self.allocated.values()) {
            if !seen.insert(*address) {
                return false;
            }
        }
        seen == *pool
    }

    pub fn leases(&self) -> Vec<Lease> {
        self.allocated
            .iter()
            .map(|(&peer, &address)| Lease { peer, address })
            .collect()
    }
}

/// Address pool with reservation and allocation maps.
///
/// # Example
///
/// ```
/// use std::net::Ipv4Addr;
/// use dhcpsim::{Leases, ParticipantId};
///
/// let mut leases = Leases::new([Ipv4Addr::new(10, 0, 0, 1)]);
/// let peer = ParticipantId::new(1);
///
/// let offered = leases.reserve(peer)?;
/// let lease = leases.commit(peer, Some(offered))?;
/// assert_eq!(lease.address, offered);
/// # Ok::<(), dhcpsim::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Leases {
    available: BTreeSet<Ipv4Addr>,
    reserved: BTreeMap<ParticipantId, Ipv4Addr>,
    allocated: BTreeMap<ParticipantId, Ipv4Addr>,
}

impl Leases {
    pub fn new(pool: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self {
            available: pool.into_iter().collect(),
            reserved: BTreeMap::new(),
            allocated: BTreeMap::new(),
        }
    }

    /// Picks an address to OFFER to `peer` (DISCOVER handling).
    ///
    /// # Allocation Priority
    ///
    /// 1. The address already allocated to this peer
    /// 2. The address already reserved for this peer
    /// 3. The lowest free address, which becomes reserved
    ///
    /// Repeated DISCOVERs from the same peer never drain the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if no address is free.
    pub fn reserve(&mut self, peer: ParticipantId) -> Result<Ipv4Addr> {
        if let Some(&address) = self.allocated.get(&peer) {
            return Ok(address);
        }

        if let Some(&address) = self.reserved.get(&peer) {
            return Ok(address);
        }

        let address = self.available.pop_first().ok_or(Error::PoolExhausted)?;
        self.reserved.insert(peer, address);
        Ok(address)
    }

    /// Promotes the reservation held by `peer` to an allocation (REQUEST handling).
    ///
    /// `requested` is the address named in the REQUEST; `None` accepts
    /// whatever is reserved.
    ///
    /// # Errors
    ///
    /// - [`Error::NoReservation`] if `peer` holds no reservation
    /// - [`Error::AddressMismatch`] if `requested` differs from the
    ///   reservation, which is left in place
    pub fn commit(&mut self, peer: ParticipantId, requested: Option<Ipv4Addr>) -> Result<Lease> {
        let reserved = *self
            .reserved
            .get(&peer)
            .ok_or(Error::NoReservation(peer))?;

        if let Some(requested) = requested
            && requested != reserved
        {
            return Err(Error::AddressMismatch {
                peer,
                requested,
                reserved,
            });
        }

        self.reserved.remove(&peer);
        self.allocated.insert(peer, reserved);

        Ok(Lease {
            peer,
            address: reserved,
        })
    }

    pub fn get_lease(&self, peer: ParticipantId) -> Option<Lease> {
        self.allocated
            .get(&peer)
            .map(|&address| Lease { peer, address })
    }

    pub fn reservation(&self, peer: ParticipantId) -> Option<Ipv4Addr> {
        self.reserved.get(&peer).copied()
    }

    pub fn free_count(&self) -> usize {
        self.available.len()
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn snapshot(&self) -> LeaseSnapshot {
        LeaseSnapshot {
            available: self.available.clone(),
            reserved: self.reserved.clone(),
            allocated: self.allocated.clone(),
        }
    }
}
