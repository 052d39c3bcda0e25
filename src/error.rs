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

//! Error types

use std::fmt;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Operation on a despawned or never-spawned entity
    EntityNotAlive,

    /// No column on the entity's archetype matches the requested type and target
    ComponentNotFound,

    /// A bulk write targeted an archetype without the exact column
    ColumnMissing,

    /// Type-erased storage called with a value of the wrong runtime type
    TypeMismatch {
        /// Element type the column actually stores
        expected: &'static str,
    },

    /// Wildcard match passed to an operation that requires a specific target
    InvalidMatch,

    /// Structural mutation attempted while an iteration holds the read lock
    StructuralMutationDuringIteration,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotAlive => write!(f, "Entity is not alive"),
            EcsError::ComponentNotFound => write!(f, "Component not found"),
            EcsError::ColumnMissing => write!(f, "Archetype is missing the targeted column"),
            EcsError::TypeMismatch { expected } => {
                write!(f, "Type mismatch: column stores {expected}")
            }
            EcsError::InvalidMatch => write!(
                f,
                "Wildcard match is not valid here; a specific target is required"
            ),
            EcsError::StructuralMutationDuringIteration => {
                write!(f, "Structural mutation attempted during iteration")
            }
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
