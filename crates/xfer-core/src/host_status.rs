//! Per-host outgoing transfer counters.

use crate::list::XferList;
use crate::xfer::XferState;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Active and pending send counts for one remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostStatus {
    /// Remote host
    pub host: SocketAddr,
    /// Sends with packets in flight
    pub num_active: usize,
    /// Sends queued for a slot
    pub num_pending: usize,
}

impl HostStatus {
    fn new(host: SocketAddr) -> Self {
        Self {
            host,
            num_active: 0,
            num_pending: 0,
        }
    }
}

/// Host counters, rebuilt from the send list each tick and adjusted in between.
#[derive(Debug, Default)]
pub struct HostStatusTable {
    hosts: BTreeMap<SocketAddr, HostStatus>,
}

impl HostStatusTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recount from the send list.
    pub fn rebuild(&mut self, send_list: &XferList) {
        self.hosts.clear();
        for xfer in send_list.iter() {
            let Some(host) = xfer.remote_host() else {
                continue;
            };
            let status = self
                .hosts
                .entry(host)
                .or_insert_with(|| HostStatus::new(host));
            match xfer.state() {
                XferState::Pending => status.num_pending += 1,
                XferState::InProgress => status.num_active += 1,
                _ => {}
            }
        }
    }

    /// Counters for `host`.
    #[must_use]
    pub fn get(&self, host: &SocketAddr) -> Option<&HostStatus> {
        self.hosts.get(host)
    }

    /// Active sends to `host`.
    #[must_use]
    pub fn num_active(&self, host: &SocketAddr) -> usize {
        self.hosts.get(host).map_or(0, |s| s.num_active)
    }

    /// Pending sends to `host`.
    #[must_use]
    pub fn num_pending(&self, host: &SocketAddr) -> usize {
        self.hosts.get(host).map_or(0, |s| s.num_pending)
    }

    /// Adjust the active count, creating the entry if needed.
    pub fn change_active(&mut self, host: SocketAddr, delta: isize) {
        let status = self
            .hosts
            .entry(host)
            .or_insert_with(|| HostStatus::new(host));
        status.num_active = status.num_active.saturating_add_signed(delta);
    }

    /// Adjust the pending count, creating the entry if needed.
    pub fn change_pending(&mut self, host: SocketAddr, delta: isize) {
        let status = self
            .hosts
            .entry(host)
            .or_insert_with(|| HostStatus::new(host));
        status.num_pending = status.num_pending.saturating_add_signed(delta);
    }

    /// All hosts, in address order.
    pub fn iter(&self) -> impl Iterator<Item = &HostStatus> {
        self.hosts.values()
    }

    /// Number of hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether no host has counters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
