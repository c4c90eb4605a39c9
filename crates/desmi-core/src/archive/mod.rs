// Copyright 2025 eraflo
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

//! Opaque archive contracts.
//!
//! The runtime treats a loaded archive as a black box: bytes go into an
//! assembly lane, an [`Archive`] comes out, and typed objects are extracted
//! from it by logical path. What an archive physically contains, and what the
//! extracted objects are, is entirely the concern of the assembly lane that
//! built it.

use std::any::Any;
use std::sync::Arc;

/// A loaded, immutable archive of serialized objects.
///
/// Implementations are provided by assembly lanes; the loading engine only
/// ever stores and queries them through this contract. The supertraits make
/// archives shareable across handles and across the cooperative tasks that
/// load them.
pub trait Archive: Send + Sync {
    /// The stable archive name this object was assembled under.
    fn name(&self) -> &str;

    /// Whether the archive carries an entry for the given logical path.
    fn contains(&self, path: &str) -> bool;

    /// Extracts the typed object stored under the given logical path.
    ///
    /// Returns `None` when the archive has no such entry; callers treat that
    /// as a failed load, not a hard error.
    fn extract(&self, path: &str) -> Option<AssetObject>;
}

/// Shared ownership of a loaded archive.
pub type ArchiveRef = Arc<dyn Archive>;

/// A type-erased, shareable object extracted from an archive.
///
/// Consumers recover the concrete type with [`downcast_asset`].
pub type AssetObject = Arc<dyn Any + Send + Sync>;

/// Recovers a concrete asset type from a type-erased [`AssetObject`].
///
/// Returns `None` when the object is not a `T`; the caller decides whether a
/// type mismatch is a bug or an expected miss.
pub fn downcast_asset<T: Send + Sync + 'static>(object: &AssetObject) -> Option<&T> {
    object.downcast_ref::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_recovers_the_concrete_type() {
        let object: AssetObject = Arc::new(vec![1u8, 2, 3]);
        let bytes = downcast_asset::<Vec<u8>>(&object).expect("downcast failed");
        assert_eq!(bytes, &vec![1u8, 2, 3]);
    }

    #[test]
    fn downcast_rejects_the_wrong_type() {
        let object: AssetObject = Arc::new("not bytes".to_string());
        assert!(downcast_asset::<Vec<u8>>(&object).is_none());
    }
}
