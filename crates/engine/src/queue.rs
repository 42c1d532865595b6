// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bounded request queue (§3 `RequestQueue`, §4.3). In the original
//! this is a named-semaphore-guarded ring buffer in shared memory; here
//! it's a `parking_lot::Mutex`-guarded `VecDeque` bounded at construction,
//! which preserves the "producer never overwrites unread entries, full
//! queue fails the caller" contract without needing cross-process IPC.

use parking_lot::Mutex;
use poolguard_core::Request;
use std::collections::VecDeque;
use thiserror::Error;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("request queue is full")]
pub struct QueueFull;

pub struct RequestQueue {
    capacity: usize,
    entries: Mutex<VecDeque<Request>>,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// `enqueue()`: rejects if the queue is already at capacity.
    pub fn enqueue(&self, request: Request) -> Result<(), QueueFull> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            return Err(QueueFull);
        }
        entries.push_back(request);
        Ok(())
    }

    pub fn dequeue(&self) -> Option<Request> {
        self.entries.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolguard_core::{BackendId, RequestFlags, RequestKind};

    fn req(id: usize) -> Request {
        Request::new(RequestKind::NodeDown, vec![BackendId(id)], RequestFlags::empty())
    }

    #[test]
    fn full_queue_rejects_then_accepts_after_dequeue() {
        let q = RequestQueue::new(2);
        assert!(q.enqueue(req(0)).is_ok());
        assert!(q.enqueue(req(1)).is_ok());
        assert_eq!(q.enqueue(req(2)), Err(QueueFull));
        assert!(q.dequeue().is_some());
        assert!(q.enqueue(req(2)).is_ok());
    }

    #[test]
    fn dequeue_is_fifo() {
        let q = RequestQueue::new(4);
        q.enqueue(req(0)).unwrap();
        q.enqueue(req(1)).unwrap();
        assert_eq!(q.dequeue().unwrap().node_ids[0], BackendId(0));
        assert_eq!(q.dequeue().unwrap().node_ids[0], BackendId(1));
        assert!(q.dequeue().is_none());
    }
}
