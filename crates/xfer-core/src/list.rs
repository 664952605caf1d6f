//! Owning transfer queues.

use crate::ids::TransferId;
use crate::xfer::{Xfer, XferState};
use std::collections::VecDeque;

/// Ordered collection that owns its transfers.
///
/// Removing a transfer hands it back by value; once dropped nothing else
/// refers to it. Plain inserts go to the front, priority inserts to the back,
/// and the manager serves pending work back to front.
#[derive(Debug, Default)]
pub struct XferList {
    items: VecDeque<Xfer>,
}

impl XferList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front (served last).
    pub fn push_front(&mut self, xfer: Xfer) {
        self.items.push_front(xfer);
    }

    /// Insert at the back (served first).
    pub fn push_back(&mut self, xfer: Xfer) {
        self.items.push_back(xfer);
    }

    /// Insert by priority.
    pub fn add(&mut self, xfer: Xfer, is_priority: bool) {
        if is_priority {
            self.push_back(xfer);
        } else {
            self.push_front(xfer);
        }
    }

    /// First transfer with `id`.
    #[must_use]
    pub fn find(&self, id: TransferId) -> Option<&Xfer> {
        self.items.iter().find(|x| x.id() == id)
    }

    /// First transfer with `id`, mutably.
    pub fn find_mut(&mut self, id: TransferId) -> Option<&mut Xfer> {
        self.items.iter_mut().find(|x| x.id() == id)
    }

    /// Index of the first transfer with `id`.
    #[must_use]
    pub fn position(&self, id: TransferId) -> Option<usize> {
        self.items.iter().position(|x| x.id() == id)
    }

    /// Remove and return the first transfer with `id`.
    pub fn remove(&mut self, id: TransferId) -> Option<Xfer> {
        let index = self.position(id)?;
        self.items.remove(index)
    }

    /// Transfer at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Xfer> {
        self.items.get(index)
    }

    /// Transfer at `index`, mutably.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Xfer> {
        self.items.get_mut(index)
    }

    /// Remove and return the transfer at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<Xfer> {
        self.items.remove(index)
    }

    /// Number of transfers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transfers front to back.
    pub fn iter(&self) -> impl Iterator<Item = &Xfer> {
        self.items.iter()
    }

    /// Number of transfers in `state`.
    #[must_use]
    pub fn count_in_state(&self, state: XferState) -> usize {
        self.items.iter().filter(|x| x.state() == state).count()
    }
}
