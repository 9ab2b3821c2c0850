use std::collections::BTreeMap;

use crate::request::{LoadPhase, Request};

/// Table of in-flight loads keyed by owner.
///
/// A load is issued before the fetch starts and completed when the result
/// arrives. Cancelling an owner drops all of its requests, so a result that
/// arrives afterwards finds no pending entry and must be discarded.
#[derive(Debug)]
pub struct LoadTracker<K> {
    next: u64,
    pending: BTreeMap<Request, (K, LoadPhase)>,
}

impl<K> Default for LoadTracker<K> {
    fn default() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> LoadTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn issue(&mut self, owner: K, phase: LoadPhase) -> Request {
        let req = Request(self.next);
        self.next = self.next.wrapping_add(1);
        self.pending.insert(req, (owner, phase));
        req
    }

    pub fn is_pending(&self, req: Request) -> bool {
        self.pending.contains_key(&req)
    }

    /// Retires a request whose result arrived. `None` means it was cancelled.
    pub fn complete(&mut self, req: Request) -> Option<(K, LoadPhase)> {
        self.pending.remove(&req)
    }

    /// Cancel a single request.
    ///
    /// Returns `true` if the request was still pending and was cancelled.
    pub fn cancel(&mut self, req: Request) -> bool {
        self.pending.remove(&req).is_some()
    }

    /// Cancels every pending request of `owner`, in issue order.
    pub fn cancel_owner(&mut self, owner: &K) -> Vec<Request> {
        let reqs: Vec<Request> = self
            .pending
            .iter()
            .filter(|(_, (k, _))| k == owner)
            .map(|(r, _)| *r)
            .collect();
        for r in &reqs {
            self.pending.remove(r);
        }
        reqs
    }

    pub fn pending_for(&self, owner: &K) -> Vec<(Request, LoadPhase)> {
        self.pending
            .iter()
            .filter(|(_, (k, _))| k == owner)
            .map(|(r, (_, phase))| (*r, *phase))
            .collect()
    }
}
