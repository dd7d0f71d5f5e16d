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

//! Shared collaborator bundle passed into resource manager operations.

use std::cell::RefCell;
use std::rc::Rc;

use pyxis_core::driver::DeviceDriver;

use crate::fence::FenceTimeline;
use crate::memory::DeviceAllocator;
use crate::scheduler::ReleaseQueue;

/// Borrowed view of the context's shared services.
///
/// Operations that may defer destruction take this instead of individual
/// parameters, since a deferred action has to capture its own `Rc` clones
/// of the driver and allocator to run later.
pub struct DeviceScope<'a> {
    /// The native backend.
    pub driver: &'a Rc<dyn DeviceDriver>,
    /// The device memory suballocator.
    pub allocator: &'a Rc<RefCell<DeviceAllocator>>,
    /// The deferred destruction queue.
    pub scheduler: &'a Rc<ReleaseQueue>,
    /// CPU/GPU progress counters.
    pub timeline: &'a Rc<FenceTimeline>,
}

/// Owned clone of the context's shared services.
///
/// Every resource wrapper keeps one so its `Drop` impl can route
/// destruction through the scheduler without reaching back into the
/// context.
#[derive(Clone)]
pub struct SharedServices {
    /// The native backend.
    pub driver: Rc<dyn DeviceDriver>,
    /// The device memory suballocator.
    pub allocator: Rc<RefCell<DeviceAllocator>>,
    /// The deferred destruction queue.
    pub scheduler: Rc<ReleaseQueue>,
    /// CPU/GPU progress counters.
    pub timeline: Rc<FenceTimeline>,
}

impl SharedServices {
    /// Borrows the bundle for one operation.
    pub fn scope(&self) -> DeviceScope<'_> {
        DeviceScope {
            driver: &self.driver,
            allocator: &self.allocator,
            scheduler: &self.scheduler,
            timeline: &self.timeline,
        }
    }
}

impl std::fmt::Debug for SharedServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedServices").finish_non_exhaustive()
    }
}
