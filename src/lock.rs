// Copyright 2024 Saptak Santra
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

//! Structural lock: single writer, many readers
//!
//! Every query iteration holds the lock for reading across its whole run;
//! every structural mutation (spawn, despawn, component add/remove, archetype
//! creation) takes it for writing. Rust's borrow rules already prevent
//! callbacks from reaching back into the world, so the write side uses
//! `try_write` purely as a runtime backstop: contention means an iteration
//! guard is still alive somewhere, and the mutation is rejected instead of
//! racing it.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{EcsError, Result};

/// Reader/writer lock guarding the archetype graph and entity directory
#[derive(Default)]
pub struct StructuralLock {
    inner: RwLock<()>,
}

impl StructuralLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire for reading; blocks while a writer is active
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.read()
    }

    /// Acquire for writing; fails instead of blocking when readers are active
    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.inner
            .try_write()
            .ok_or(EcsError::StructuralMutationDuringIteration)
    }
}

/// Scoped read guard handed out by [`World::lock`](crate::World::lock)
///
/// While held, no structural mutation can begin, so component references
/// resolved from the world remain valid.
pub struct WorldLock<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

impl<'a> WorldLock<'a> {
    pub(crate) fn new(lock: &'a StructuralLock) -> Self {
        Self {
            _guard: lock.read(),
        }
    }
}
