//! Insertion-ordered map deserialization.
//!
//! Schema maps (`types`, `enums`, `instances`, switch `cases`) are
//! compiled in the order they are written, so they are loaded into
//! `Vec<(String, T)>` rather than a hash map.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

struct OrderedVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
    type Value = Vec<(String, T)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, T>()? {
            entries.push((key, value));
        }
        Ok(entries)
    }
}

/// `deserialize_with` target for ordered maps.
///
/// # Errors
///
/// Whatever the underlying deserializer reports.
pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}
