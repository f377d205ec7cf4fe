use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub addresses: Vec<Ipv4Addr>,
    pub peer_count: usize,
    pub delivery_delay_millis: u64,
    pub poll_interval_millis: u64,
    pub recv_timeout_millis: u64,
    pub discover_delay_min_millis: u64,
    pub discover_delay_max_millis: u64,
    #[serde(default)]
    pub max_discover_attempts: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addresses: vec![
                Ipv4Addr::new(1, 1, 1, 1),
                Ipv4Addr::new(2, 2, 2, 2),
                Ipv4Addr::new(3, 3, 3, 3),
                Ipv4Addr::new(4, 4, 4, 4),
            ],
            peer_count: 1,
            delivery_delay_millis: 200,
            poll_interval_millis: 500,
            recv_timeout_millis: 300,
            discover_delay_min_millis: 100,
            discover_delay_max_millis: 300,
            max_discover_attempts: None,
        }
    }
}

/// Pacing and retry knobs handed to each participant.
///
/// None of these are needed for correctness; [`Timing::immediate`] runs the
/// handshake as fast as the scheduler allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Delay before each per-inbox delivery on the medium.
    pub delivery_delay: Duration,
    /// Pause at the top of every processing-loop cycle.
    pub poll_interval: Duration,
    /// Bounded wait on an inbox read.
    pub recv_timeout: Duration,
    /// Random jitter range applied before each DISCOVER.
    pub discover_delay: (Duration, Duration),
    /// Give up after this many DISCOVERs. `None` retries forever.
    pub max_discover_attempts: Option<u32>,
}

impl Timing {
    pub fn immediate() -> Self {
        Self {
            delivery_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            recv_timeout: Duration::from_millis(10),
            discover_delay: (Duration::ZERO, Duration::ZERO),
            max_discover_attempts: None,
        }
    }

    pub fn with_max_discover_attempts(mut self, attempts: u32) -> Self {
        self.max_discover_attempts = Some(attempts);
        self
    }
}

impl Default for Timing {
    fn default() -> Self {
        Config::default().timing()
    }
}

impl Config {
    pub async fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path).await?;
            Ok(config)
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for address in &self.addresses {
            if !seen.insert(*address) {
                return Err(Error::InvalidConfig(format!(
                    "address {} appears more than once in the pool",
                    address
                )));
            }
        }

        if self.peer_count == 0 {
            return Err(Error::InvalidConfig(
                "peer_count must be greater than 0".to_string(),
            ));
        }

        if u32::try_from(self.peer_count).is_err() {
            return Err(Error::InvalidConfig(format!(
                "peer_count {} exceeds the participant id space",
                self.peer_count
            )));
        }

        if self.recv_timeout_millis == 0 {
            return Err(Error::InvalidConfig(
                "recv_timeout_millis must be greater than 0".to_string(),
            ));
        }

        if self.discover_delay_min_millis > self.discover_delay_max_millis {
            return Err(Error::InvalidConfig(
                "discover_delay_min_millis must be less than or equal to discover_delay_max_millis"
                    .to_string(),
            ));
        }

        if self.max_discover_attempts == Some(0) {
            return Err(Error::InvalidConfig(
                "max_discover_attempts must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.addresses.len()
    }

    pub fn timing(&self) -> Timing {
        Timing {
            delivery_delay: Duration::from_millis(self.delivery_delay_millis),
            poll_interval: Duration::from_millis(self.poll_interval_millis),
            recv_timeout: Duration::from_millis(self.recv_timeout_millis),
            discover_delay: (
                Duration::from_millis(self.discover_delay_min_millis),
                Duration::from_millis(self.discover_delay_max_millis),
            ),
            max_discover_attempts: self.max_discover_attempts,
        }
    }
}
