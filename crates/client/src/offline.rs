//! Connectivity tracking.
//!
//! Realtime delivery is best-effort, so anything published while the client
//! was offline is lost; the transition back to online is the signal to
//! resynchronize.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// Online and connected to the API.
    Online,
    /// Offline (network unreachable or API unavailable).
    Offline,
}

#[derive(Debug)]
pub struct Connectivity {
    offline: AtomicBool,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity {
    pub fn new() -> Self {
        Self {
            offline: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        if self.is_offline() {
            ConnectivityState::Offline
        } else {
            ConnectivityState::Online
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Acquire)
    }

    /// Returns `true` if this call moved the client offline.
    pub fn set_offline(&self) -> bool {
        !self.offline.swap(true, Ordering::AcqRel)
    }

    /// Returns `true` if this call brought the client back online.
    pub fn set_online(&self) -> bool {
        self.offline.swap(false, Ordering::AcqRel)
    }
}
