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

//! relation_ecs - Archetype Entity Component System
//!
//! Columnar ECS where a component column is keyed by `(type, target)`: plain
//! data, a relation to another entity, or a link to an external object.
//! Queries match archetypes structurally and cross-join wildcard-matched
//! columns, sequentially or across the rayon pool.

pub mod archetype;
pub mod component;
pub mod entity;
pub mod error;
pub mod expr;
pub mod lock;
pub mod query;
pub mod storage;
pub mod world;

// Re-exports for convenience
pub use archetype::Archetype;
pub use component::{Bundle, Component};
pub use entity::{EntityId, EntityLocation};
pub use error::{EcsError, Result};
pub use expr::{Match, ObjectId, Signature, Target, TypeExpression};
pub use lock::WorldLock;
pub use query::{Query, QueryMask, StreamSet};
pub use storage::{Column, TypedColumn};
pub use world::World;
