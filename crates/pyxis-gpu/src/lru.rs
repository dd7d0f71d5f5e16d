// Copyright 2026 the pyxis authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Slab-backed LRU map with explicit eviction.
//!
//! Eviction returns the victim to the caller instead of dropping it, which
//! the pipeline cache needs: a victim pipeline must be routed through the
//! deferred destruction queue, never destroyed in place.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
struct Slot<K, V> {
    entry: Option<(K, V)>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// An LRU-ordered map. Recency order is a doubly linked list threaded
/// through a slot slab; the head is most recent, the tail is the eviction
/// candidate.
#[derive(Debug)]
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Eq + Hash + Copy, V> LruCache<K, V> {
    /// An empty cache.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up `key`, promoting it to most recently used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.detach(idx);
        self.push_front(idx);
        self.slots[idx].entry.as_ref().map(|(_, v)| v)
    }

    /// Inserts or replaces `key`, making it most recently used. Returns
    /// the displaced value when the key was already present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&idx) = self.map.get(&key) {
            self.detach(idx);
            self.push_front(idx);
            let old = self.slots[idx].entry.replace((key, value));
            return old.map(|(_, v)| v);
        }
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx].entry = Some((key, value));
                idx
            }
            None => {
                self.slots.push(Slot {
                    entry: Some((key, value)),
                    prev: None,
                    next: None,
                });
                self.slots.len() - 1
            }
        };
        self.push_front(idx);
        self.map.insert(key, idx);
        None
    }

    /// Removes and returns the least recently used entry.
    pub fn evict(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.detach(idx);
        self.free.push(idx);
        let (key, value) = self.slots[idx].entry.take()?;
        self.map.remove(&key);
        Some((key, value))
    }

    /// Drains every entry in eviction (least recent first) order.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.len());
        while let Some(entry) = self.evict() {
            entries.push(entry);
        }
        entries
    }

    fn detach(&mut self, idx: usize) {
        let prev = self.slots[idx].prev;
        let next = self.slots[idx].next;
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;
        if let Some(h) = self.head {
            self.slots[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

impl<K: Eq + Hash + Copy, V> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
