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

//! Entity identifiers and location metadata.

use slotmap::{new_key_type, Key};

new_key_type! {
    /// Unique entity identifier backed by slotmap's generational keys.
    ///
    /// The 64-bit key splits into a 32-bit slot index and a 32-bit generation.
    /// Freed indices are recycled in LIFO order with the generation bumped, so
    /// a stale handle never resolves to the slot's next occupant.
    pub struct EntityId;
}

impl EntityId {
    /// Slot index within the entity directory
    pub fn index(self) -> u32 {
        (self.data().as_ffi() & 0xffff_ffff) as u32
    }

    /// Generation of this handle's slot occupancy
    pub fn generation(self) -> u32 {
        (self.data().as_ffi() >> 32) as u32
    }
}

/// Entity location in archetype (archetype_id, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: usize,
    pub archetype_row: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_key_splits_cleanly() {
        let id = EntityId::null();
        assert_eq!(id.index(), u32::MAX);
    }
}
