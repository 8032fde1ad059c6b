// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The metadata priority queue: one per kind, shared between every extractor (which push) and
//! the injector (which pops).
//!
//! Ordering is `pts` ascending, with `input_id` ascending and then `order` ascending as tiebreaks,
//! so that among records due at the same instant the smaller input id and smaller order pop
//! first (the empty-padding/CC-reset sentinels use `i32::MIN`/`i32::MAX` precisely to exploit
//! this to sort first or last within one input's own records).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use crate::clock::ClockTS;
use crate::metadata::{InputId, Kind, Metadata, MetadataKind, ScteKind, SeiKind};

struct HeapEntry<K: Kind>(Metadata<K>);

impl<K: Kind> PartialEq for HeapEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.0.pts == other.0.pts && self.0.input_id == other.0.input_id && self.0.order == other.0.order
    }
}

impl<K: Kind> Eq for HeapEntry<K> {}

impl<K: Kind> PartialOrd for HeapEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Kind> Ord for HeapEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap and pops the greatest element first; every field is reversed so
        // the smallest pts, then smallest input_id, then smallest order compares greatest (pops
        // first).
        other.0.pts.cmp(&self.0.pts).then(other.0.input_id.cmp(&self.0.input_id)).then(other.0.order.cmp(&self.0.order))
    }
}

/// A single kind's queue: pushed to by every extractor, drained by the injector.
pub struct MetadataQueue<K: Kind> {
    records: Mutex<BinaryHeap<HeapEntry<K>>>,
}

impl<K: Kind> MetadataQueue<K> {
    pub fn new() -> Self {
        Self { records: Mutex::new(BinaryHeap::new()) }
    }

    pub fn push(&self, record: Metadata<K>) {
        self.records.lock().unwrap().push(HeapEntry(record));
    }

    /// Returns the earliest record with `pts` in `[since, until)` belonging to `id`, or `None` if
    /// the window holds nothing for `id` (either it is empty, or the next record's `pts >=
    /// until`). Along the way, records with `pts < since` are discarded regardless of id (they
    /// are too old to ever be queried again), and once a matching record is found, any other
    /// records from a *different* input sharing its exact `pts` are discarded too (the collision
    /// rule): the injector must never see two different sources contributing at the same instant.
    /// Further records from the *same* input at that `pts` (distinguished by `order`) are left in
    /// place for a later `pop` to return.
    pub fn pop(&self, id: InputId, since: ClockTS, until: ClockTS) -> Option<Metadata<K>> {
        let mut heap = self.records.lock().unwrap();

        loop {
            let top_pts = heap.peek()?.0.pts;
            if top_pts >= until {
                return None;
            }
            if top_pts < since {
                heap.pop();
                continue;
            }

            if heap.peek()?.0.input_id == id {
                let found = heap.pop().unwrap().0;
                while heap.peek().is_some_and(|top| top.0.pts == found.pts && top.0.input_id != found.input_id) {
                    heap.pop();
                }
                return Some(found);
            }

            heap.pop();
        }
    }

    /// Repeated `pop(id, since, until)` until it returns `None`.
    pub fn pop_all(&self, id: InputId, since: ClockTS, until: ClockTS) -> Vec<Metadata<K>> {
        let mut out = Vec::new();
        while let Some(record) = self.pop(id, since, until) {
            out.push(record);
        }
        out
    }

    /// Removes every record belonging to `id`, returning how many were removed: used when an
    /// extractor exits, so the next selection of that input does not see leftovers from a
    /// previous run.
    pub fn drop_id(&self, id: InputId) -> usize {
        let mut heap = self.records.lock().unwrap();
        let before = heap.len();
        let remaining: Vec<HeapEntry<K>> = heap.drain().filter(|e| e.0.input_id != id).collect();
        let removed = before - remaining.len();
        *heap = remaining.into_iter().collect();
        removed
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Kind> Default for MetadataQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every per-kind queue, bundled so callers that need "the queue for this kind" (extractors,
/// the control surface's `/stats` handler) do not need to be generic over [`Kind`] themselves.
pub struct QueueGroup {
    pub sei: MetadataQueue<SeiKind>,
    pub scte: MetadataQueue<ScteKind>,
}

impl QueueGroup {
    pub fn new() -> Self {
        Self { sei: MetadataQueue::new(), scte: MetadataQueue::new() }
    }

    pub fn size(&self, kind: MetadataKind) -> usize {
        match kind {
            MetadataKind::Sei => self.sei.len(),
            MetadataKind::Scte => self.scte.len(),
        }
    }

    pub fn drop_id(&self, id: InputId) {
        self.sei.drop_id(id);
        self.scte.drop_id(id);
    }
}

impl Default for QueueGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h264::sei::{OwnedSeiPayload, SeiType};
    use std::sync::Arc;

    fn rec(input_id: InputId, pts: i64, order: i32) -> Metadata<SeiKind> {
        let payload = Arc::new(OwnedSeiPayload::new(SeiType::UserDataRegistered, vec![]));
        Metadata::new(input_id, ClockTS(pts), ClockTS(pts), order, payload)
    }

    #[test]
    fn pop_returns_earliest_matching_record_and_evicts_same_pts_collision() {
        // Scenario 3: nth(1,input=0), nth(1,input=1), nth(2,input=0).
        let q = MetadataQueue::new();
        q.push(rec(0, 10, 0));
        q.push(rec(1, 10, 0));
        q.push(rec(0, 20, 0));

        let found = q.pop(0, ClockTS(5), ClockTS(15)).unwrap();
        assert_eq!((found.input_id, found.pts), (0, ClockTS(10)));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(0, ClockTS(0), ClockTS(1000)).unwrap().pts, ClockTS(20));
    }

    #[test]
    fn pop_all_drops_stale_other_input_records() {
        // Scenario 4.
        let q = MetadataQueue::new();
        q.push(rec(0, 0, 0));
        q.push(rec(1, 0, 0));
        q.push(rec(0, 1, 0));
        q.push(rec(2, 1, 0));
        q.push(rec(0, 2, 0));
        q.push(rec(1, 2, 0));
        q.push(rec(0, 3, 0));
        q.push(rec(2, 3, 0));
        q.push(rec(0, 4, 0));
        q.push(rec(2, 4, 0));

        let out = q.pop_all(0, ClockTS(1), ClockTS(4));
        let pts: Vec<i64> = out.iter().map(|m| m.pts.0).collect();
        assert_eq!(pts, vec![1, 2, 3]);
        assert!(out.iter().all(|m| m.input_id == 0));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn pop_returns_none_when_window_empty() {
        let q: MetadataQueue<SeiKind> = MetadataQueue::new();
        assert!(q.pop(0, ClockTS(0), ClockTS(100)).is_none());
    }

    #[test]
    fn pop_all_returns_same_instant_records_in_ascending_order() {
        let q = MetadataQueue::new();
        q.push(rec(0, 10, 2));
        q.push(rec(0, 10, 0));
        q.push(rec(0, 10, 1));

        let out = q.pop_all(0, ClockTS(0), ClockTS(1000));
        let orders: Vec<i32> = out.iter().map(|m| m.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn drop_id_removes_only_matching_records_and_returns_count() {
        let q = MetadataQueue::new();
        q.push(rec(1, 10, 0));
        q.push(rec(2, 10, 0));
        q.push(rec(1, 20, 0));
        assert_eq!(q.drop_id(1), 2);
        assert_eq!(q.len(), 1);
    }
}
