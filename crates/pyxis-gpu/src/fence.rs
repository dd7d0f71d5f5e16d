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

//! Monotonic fence timeline and the submission ring built on top of it.
//!
//! CPU progress is a counter of submissions handed out at flush time; GPU
//! progress is the highest fence value whose binary fence has been observed
//! signaled. Every safety question in this crate reduces to comparing a
//! recorded fence value against the published completion point.

use std::cell::Cell;
use std::collections::VecDeque;

use pyxis_core::driver::DeviceDriver;
use pyxis_core::handle::{CommandBufferHandle, FenceHandle};

/// A point on the submission timeline.
///
/// Values start at 1; zero is the "already complete" sentinel every
/// freshly created resource carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(pub u64);

impl FenceValue {
    /// Completes before anything is ever submitted.
    pub const ZERO: Self = Self(0);
    /// The value the first submission will receive.
    pub const INITIAL: Self = Self(1);
}

/// Shared CPU/GPU progress counters.
///
/// Invariant: `last_completed < next` at all times. `next` moves only when
/// a submission is handed its value; `last_completed` moves only when a
/// fence is observed signaled, in submission order.
#[derive(Debug)]
pub struct FenceTimeline {
    next: Cell<FenceValue>,
    last_completed: Cell<FenceValue>,
}

impl FenceTimeline {
    /// A fresh timeline: next = 1, nothing completed.
    pub fn new() -> Self {
        Self {
            next: Cell::new(FenceValue::INITIAL),
            last_completed: Cell::new(FenceValue::ZERO),
        }
    }

    /// The value the next submission will be tagged with. Also the value
    /// deferred work scheduled right now must wait for.
    #[inline]
    pub fn next_value(&self) -> FenceValue {
        self.next.get()
    }

    /// Highest fence value known to have completed.
    #[inline]
    pub fn last_completed(&self) -> FenceValue {
        self.last_completed.get()
    }

    /// Completion check against the cached completion point only; never
    /// polls the driver.
    #[inline]
    pub fn is_known_completed(&self, value: FenceValue) -> bool {
        value <= self.last_completed.get()
    }

    /// Assigns the current `next` to a submission and advances it.
    pub(crate) fn advance_next(&self) -> FenceValue {
        let value = self.next.get();
        self.next.set(FenceValue(value.0 + 1));
        value
    }

    /// Publishes a newly observed completion point.
    pub(crate) fn publish_completed(&self, value: FenceValue) {
        debug_assert!(
            value >= self.last_completed.get(),
            "completion point moved backwards"
        );
        debug_assert!(value < self.next.get(), "completed a value never submitted");
        self.last_completed.set(value);
    }
}

impl Default for FenceTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// One in-flight submission.
#[derive(Debug, Clone, Copy)]
struct Submission {
    command_buffer: CommandBufferHandle,
    fence: FenceHandle,
    value: FenceValue,
}

/// FIFO of in-flight submissions plus recycled fences and command buffers.
///
/// Submissions complete in order, so polling only ever inspects the head.
#[derive(Debug, Default)]
pub struct SubmissionRing {
    in_flight: VecDeque<Submission>,
    free_command_buffers: Vec<CommandBufferHandle>,
    free_fences: Vec<FenceHandle>,
}

impl SubmissionRing {
    /// An empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of submissions not yet observed complete.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Drains completed submissions from the head, recycling their fence
    /// and command buffer and publishing the new completion point.
    pub fn poll(&mut self, driver: &dyn DeviceDriver, timeline: &FenceTimeline) {
        while let Some(head) = self.in_flight.front() {
            if !driver.fence_status(head.fence) {
                break;
            }
            let done = self.in_flight.pop_front();
            if let Some(done) = done {
                timeline.publish_completed(done.value);
                self.free_fences.push(done.fence);
                self.free_command_buffers.push(done.command_buffer);
            }
        }
    }

    /// A command buffer ready for recording, recycled when possible.
    pub fn acquire_command_buffer(
        &mut self,
        driver: &dyn DeviceDriver,
        timeline: &FenceTimeline,
    ) -> CommandBufferHandle {
        self.poll(driver, timeline);
        let cb = self
            .free_command_buffers
            .pop()
            .unwrap_or_else(|| driver.create_command_buffer());
        driver.begin_command_buffer(cb);
        cb
    }

    /// Submits a finished command buffer and returns the fence value it
    /// was tagged with.
    pub fn submit(
        &mut self,
        driver: &dyn DeviceDriver,
        timeline: &FenceTimeline,
        command_buffer: CommandBufferHandle,
    ) -> FenceValue {
        self.poll(driver, timeline);
        let fence = match self.free_fences.pop() {
            Some(fence) => {
                driver.reset_fence(fence);
                fence
            }
            None => driver.create_fence(),
        };
        driver.submit(command_buffer, fence);
        let value = timeline.advance_next();
        self.in_flight.push_back(Submission {
            command_buffer,
            fence,
            value,
        });
        log::trace!("submitted command buffer under fence value {}", value.0);
        value
    }

    /// Destroys pooled fences. Called once at shutdown, after the ring has
    /// fully drained.
    pub fn destroy_pooled(&mut self, driver: &dyn DeviceDriver) {
        debug_assert!(self.in_flight.is_empty(), "shutdown with work in flight");
        for fence in self.free_fences.drain(..) {
            driver.destroy_fence(fence);
        }
        self.free_command_buffers.clear();
    }
}
