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

//! Deferred destruction queue.
//!
//! Destroying a resource the GPU may still read is the classic
//! use-after-free of this domain. Instead of destroying eagerly, owners
//! enqueue a destruction action tagged with the fence value that must
//! complete first. The queue is FIFO and fence values are enqueued in
//! non-decreasing order, so draining only ever looks at the head.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::fence::FenceValue;

type ReleaseAction = Box<dyn FnOnce()>;

/// FIFO of (fence value, destruction action) pairs.
///
/// Shared behind `Rc` by every resource wrapper; interior mutability keeps
/// `schedule` callable from `Drop` impls holding only a shared reference.
#[derive(Default)]
pub struct ReleaseQueue {
    queue: RefCell<VecDeque<(FenceValue, ReleaseAction)>>,
}

impl ReleaseQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actions still waiting.
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Enqueues `action` to run once `fence` has completed.
    ///
    /// Fence values must arrive in non-decreasing order; the head-only
    /// drain in [`perform`](Self::perform) depends on it.
    pub fn schedule(&self, fence: FenceValue, action: impl FnOnce() + 'static) {
        let mut queue = self.queue.borrow_mut();
        if let Some((last, _)) = queue.back() {
            debug_assert!(*last <= fence, "release fence values must not decrease");
        }
        queue.push_back((fence, Box::new(action)));
    }

    /// Runs every action whose fence value is at or below `last_completed`.
    ///
    /// Each action is popped before it runs, so the queue is never borrowed
    /// while an action executes.
    pub fn perform(&self, last_completed: FenceValue) {
        loop {
            let action = {
                let mut queue = self.queue.borrow_mut();
                match queue.front() {
                    Some((fence, _)) if *fence <= last_completed => {
                        queue.pop_front().map(|(_, action)| action)
                    }
                    _ => None,
                }
            };
            match action {
                Some(action) => action(),
                None => break,
            }
        }
    }

    /// Runs everything unconditionally. Only valid once the device is
    /// provably idle (no submissions in flight).
    pub fn drain_all(&self) {
        loop {
            let action = self.queue.borrow_mut().pop_front();
            match action {
                Some((_, action)) => action(),
                None => break,
            }
        }
    }
}

impl std::fmt::Debug for ReleaseQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseQueue")
            .field("pending", &self.len())
            .finish()
    }
}
