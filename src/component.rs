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

//! Component and Bundle traits
//!
//! Components are data attached to entities.
//! Bundles group plain components for spawning.

use smallvec::{smallvec, SmallVec};

use crate::archetype::Archetype;
use crate::expr::{Target, TypeExpression};

/// Maximum number of components supported by Bundle implementations
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data). `Clone` powers bulk column
/// writes; `Send + Sync` powers parallel iteration.
pub trait Component: 'static + Send + Sync + Clone {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync + Clone> Component for T {}

/// Bundle of plain-target components
///
/// Allows spawning entities with multiple components at once. The component
/// types in a bundle must be distinct; a duplicated type would write twice
/// into the same column.
pub trait Bundle: 'static {
    /// Column keys of all components in the bundle
    fn type_exprs() -> SmallVec<[TypeExpression; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Ensure component columns exist in an archetype
    fn register_columns(archetype: &mut Archetype)
    where
        Self: Sized;

    /// Append one value to each of the bundle's columns
    fn push_components(self, archetype: &mut Archetype);
}

// Macro for tuple Bundle implementations
macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn type_exprs() -> SmallVec<[TypeExpression; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeExpression::plain::<$T>()),*]
            }

            fn register_columns(archetype: &mut Archetype) {
                $(archetype.register_column::<$T>(Target::Plain);)*
            }

            #[allow(non_snake_case)]
            fn push_components(self, archetype: &mut Archetype) {
                let ($($T,)*) = self;
                $(
                    archetype
                        .column_mut_typed::<$T>(Target::Plain)
                        .expect("bundle column was registered at archetype creation")
                        .push($T);
                )*
            }
        }
    };
}

// Implement for tuples of 1-8 components
impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::TypeId;

    #[test]
    fn bundle_exprs_are_plain() {
        #[derive(Debug, Clone, Copy)]
        struct Position {
            #[allow(dead_code)]
            x: f32,
        }

        #[derive(Debug, Clone, Copy)]
        struct Velocity {
            #[allow(dead_code)]
            x: f32,
        }

        let exprs = <(Position, Velocity)>::type_exprs();
        assert_eq!(exprs.len(), 2);
        assert_eq!(exprs[0], TypeExpression::plain::<Position>());
        assert_eq!(exprs[1].type_id, TypeId::of::<Velocity>());
        assert_eq!(exprs[1].target, Target::Plain);
    }
}
