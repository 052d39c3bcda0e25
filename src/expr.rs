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

//! Column keys: a component type paired with a target.
//!
//! A column is identified by more than its Rust type. The same component type
//! can appear once as plain data, once per related entity, and once per linked
//! object; each combination is a separate column and induces a separate
//! archetype.

use std::any::TypeId;

use smallvec::SmallVec;

use crate::component::Component;
use crate::entity::EntityId;

/// Expressions stored inline before a signature spills to the heap
pub const MAX_SIGNATURE_SIZE: usize = 8;

/// Opaque identity of an externally owned object a component can link to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Wrap a raw object identity
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identity value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// The second dimension of a component: what the data is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    /// Ordinary component data, not keyed to anything
    Plain,
    /// Relation: the component is keyed to another entity
    Entity(EntityId),
    /// Link: the component is keyed to an external object identity
    Object(ObjectId),
}

/// Predicate over column targets
///
/// Specific variants name one column; the wildcard variants match a family
/// and make a single query stream fan out over several columns of the same
/// component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Match {
    /// Only the plain column
    Plain,
    /// Only the relation column keyed to this entity
    Entity(EntityId),
    /// Only the link column keyed to this object
    Object(ObjectId),
    /// Any relation column, regardless of target entity
    AnyEntity,
    /// Any link column, regardless of object identity
    AnyObject,
    /// Any column of the component type
    Any,
}

impl Match {
    /// Does this predicate accept the given column target?
    pub fn accepts(&self, target: &Target) -> bool {
        match (self, target) {
            (Match::Plain, Target::Plain) => true,
            (Match::Entity(want), Target::Entity(have)) => want == have,
            (Match::Object(want), Target::Object(have)) => want == have,
            (Match::AnyEntity, Target::Entity(_)) => true,
            (Match::AnyObject, Target::Object(_)) => true,
            (Match::Any, _) => true,
            _ => false,
        }
    }

    /// The single target this predicate names, or `None` for wildcards
    pub fn to_target(&self) -> Option<Target> {
        match *self {
            Match::Plain => Some(Target::Plain),
            Match::Entity(e) => Some(Target::Entity(e)),
            Match::Object(o) => Some(Target::Object(o)),
            Match::AnyEntity | Match::AnyObject | Match::Any => None,
        }
    }

    /// True for the family-matching variants
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Match::AnyEntity | Match::AnyObject | Match::Any)
    }
}

/// Full key of a column: component type plus target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeExpression {
    pub type_id: TypeId,
    pub target: Target,
}

impl TypeExpression {
    /// Key for a component type with an explicit target
    pub fn of<T: Component>(target: Target) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            target,
        }
    }

    /// Key for the plain column of a component type
    pub fn plain<T: Component>() -> Self {
        Self::of::<T>(Target::Plain)
    }

    /// Key from a pre-resolved type id
    pub fn from_raw(type_id: TypeId, target: Target) -> Self {
        Self { type_id, target }
    }

    /// Does this column key satisfy `(type_id, matcher)`?
    pub fn matches(&self, type_id: TypeId, matcher: &Match) -> bool {
        self.type_id == type_id && matcher.accepts(&self.target)
    }
}

/// Sorted, de-duplicated set of column keys; the identity of an archetype
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature(SmallVec<[TypeExpression; MAX_SIGNATURE_SIZE]>);

impl Signature {
    /// The empty signature
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Build a signature from arbitrary expressions, sorting and de-duplicating
    pub fn from_exprs(exprs: impl IntoIterator<Item = TypeExpression>) -> Self {
        let mut inner: SmallVec<[TypeExpression; MAX_SIGNATURE_SIZE]> =
            exprs.into_iter().collect();
        inner.sort_unstable();
        inner.dedup();
        Self(inner)
    }

    /// Number of column keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no column keys are present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exact membership test
    pub fn contains(&self, expr: &TypeExpression) -> bool {
        self.0.binary_search(expr).is_ok()
    }

    /// Is at least one column key accepted by `(type_id, matcher)`?
    pub fn matches(&self, type_id: TypeId, matcher: &Match) -> bool {
        self.0.iter().any(|expr| expr.matches(type_id, matcher))
    }

    /// Copy of this signature with `expr` inserted (no-op when present)
    pub fn with(&self, expr: TypeExpression) -> Self {
        match self.0.binary_search(&expr) {
            Ok(_) => self.clone(),
            Err(pos) => {
                let mut inner = self.0.clone();
                inner.insert(pos, expr);
                Self(inner)
            }
        }
    }

    /// Copy of this signature with `expr` removed (no-op when absent)
    pub fn without(&self, expr: &TypeExpression) -> Self {
        match self.0.binary_search(expr) {
            Ok(pos) => {
                let mut inner = self.0.clone();
                inner.remove(pos);
                Self(inner)
            }
            Err(_) => self.clone(),
        }
    }

    /// Iterate column keys in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &TypeExpression> {
        self.0.iter()
    }
}
