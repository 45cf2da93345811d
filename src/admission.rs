//! Per-address cap on concurrent streaming sessions.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Counts active sessions per source address.
///
/// Entries are removed when their count returns to zero, so memory stays
/// bounded by the number of addresses with live sessions.
#[derive(Debug)]
pub struct AdmissionController {
    cap: usize,
    active: Mutex<HashMap<IpAddr, usize>>,
}

impl AdmissionController {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, usize>> {
        // Counters stay consistent even if a holder panicked mid-update
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count a new session for `address`. Returns false, with no change, if
    /// the address is already at its cap.
    pub fn try_acquire(&self, address: IpAddr) -> bool {
        let mut active = self.lock();
        let count = active.entry(address).or_insert(0);
        *count += 1;
        if *count > self.cap {
            *count -= 1;
            if *count == 0 {
                active.remove(&address);
            }
            return false;
        }
        true
    }

    /// Release one session for `address`.
    pub fn release(&self, address: IpAddr) {
        let mut active = self.lock();
        if let Some(count) = active.get_mut(&address) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active.remove(&address);
            }
        }
    }

    /// Active sessions for `address`.
    pub fn active(&self, address: IpAddr) -> usize {
        self.lock().get(&address).copied().unwrap_or(0)
    }

    /// Number of addresses with at least one active session.
    pub fn tracked_addresses(&self) -> usize {
        self.lock().len()
    }

    /// Acquire a slot released automatically when the returned guard drops.
    pub fn admit(self: &Arc<Self>, address: IpAddr) -> Option<AdmissionPermit> {
        self.try_acquire(address).then(|| AdmissionPermit {
            controller: Arc::clone(self),
            address,
        })
    }
}

/// Holds one admission slot; releases it on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
    address: IpAddr,
}

impl AdmissionPermit {
    pub fn address(&self) -> IpAddr {
        self.address
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.controller.release(self.address);
    }
}
