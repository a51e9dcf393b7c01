//! Payload merge policy
//!
//! Merges are flat and last-writer-wins: sources are applied in the order
//! given, and a key present in a later source replaces the earlier value.
//! Nested objects are replaced, not merged.

use crate::plugin::Payload;

/// Apply `source` onto `target`, overwriting colliding keys
pub fn merge_into(target: &mut Payload, source: &Payload) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}

/// Owned variant of [`merge_into`] that avoids cloning values
pub fn merge_owned_into(target: &mut Payload, source: Payload) {
    for (key, value) in source {
        target.insert(key, value);
    }
}

/// Merge sources in order into a fresh payload
pub fn merge_ordered<'a, I>(sources: I) -> Payload
where
    I: IntoIterator<Item = &'a Payload>,
{
    let mut merged = Payload::new();
    for source in sources {
        merge_into(&mut merged, source);
    }
    merged
}
