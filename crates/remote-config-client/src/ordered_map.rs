// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Insertion-ordered map used for conditional parameter values.
//!
//! Conditional values fall back to the oldest entry when a parameter has no
//! explicit default, so the order in which the service lists them is part of
//! the data. [`OrderedMap`] keeps that order as a first-class property: entries
//! live in a vector of pairs, and a side index gives constant-time lookups.
//! The serde implementations read and write a JSON object in the same order.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use serde::de::{self, DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Map preserving insertion order. The first inserted entry is the "oldest".
#[derive(Clone)]
pub struct OrderedMap<K, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K, usize>,
}

impl<K, V> OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Creates an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts a value, returning the previous value for `key` if any.
    ///
    /// Re-inserting an existing key replaces its value in place; the entry
    /// keeps its original position.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&position) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[position].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index
            .get(key)
            .map(|&position| &self.entries[position].1)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.index.get(key) {
            Some(&position) => Some(&mut self.entries[position].1),
            None => None,
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Returns the first inserted entry.
    pub fn oldest(&self) -> Option<(&K, &V)> {
        self.entries.first().map(|(key, value)| (key, value))
    }
}

impl<K, V> OrderedMap<K, V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }
}

impl<K, V> OrderedMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + DeserializeOwned,
    V: DeserializeOwned,
{
    /// Parses a JSON object, rejecting anything after the closing brace.
    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        let mut deserializer = serde_json::Deserializer::from_str(input);
        let map = Self::deserialize(&mut deserializer)?;
        deserializer.end()?;
        Ok(map)
    }
}

impl<K, V> Default for OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for OrderedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, value)| (key, value)))
            .finish()
    }
}

/// Equality is order-sensitive: two maps with the same entries in a different
/// order resolve to different fallbacks and are therefore not equal.
impl<K: PartialEq, V: PartialEq> PartialEq for OrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Eq, V: Eq> Eq for OrderedMap<K, V> {}

impl<K, V> FromIterator<(K, V)> for OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<K, V> IntoIterator for OrderedMap<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Serialize, V: Serialize> Serialize for OrderedMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<K, V> {
    marker: PhantomData<fn() -> OrderedMap<K, V>>,
}

impl<'de, K, V> Visitor<'de> for OrderedMapVisitor<K, V>
where
    K: Deserialize<'de> + Eq + Hash + Clone + fmt::Debug,
    V: Deserialize<'de>,
{
    type Value = OrderedMap<K, V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<K, V>()? {
            if map.contains_key(&key) {
                return Err(de::Error::custom(format_args!("duplicate key {key:?}")));
            }
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de, K, V> Deserialize<'de> for OrderedMap<K, V>
where
    K: Deserialize<'de> + Eq + Hash + Clone + fmt::Debug,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor {
            marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> OrderedMap<String, u32> {
        [("c", 3), ("a", 1), ("b", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn oldest_is_first_inserted() {
        let map = sample();
        assert_eq!(map.oldest(), Some((&"c".to_string(), &3)));
        assert_eq!(map.keys().collect::<Vec<_>>(), ["c", "a", "b"]);
        assert_eq!(map.get("a"), Some(&1));
        assert_eq!(map.get("missing"), None);
    }

    #[test]
    fn reinsert_keeps_position() {
        let mut map = sample();
        assert_eq!(map.insert("c".to_string(), 30), Some(3));
        assert_eq!(map.len(), 3);
        assert_eq!(map.oldest(), Some((&"c".to_string(), &30)));
        *map.get_mut("b").expect("b present") += 10;
        assert_eq!(map.values().copied().collect::<Vec<_>>(), [30, 1, 12]);
    }

    #[test]
    fn empty_map_has_no_oldest() {
        let map: OrderedMap<String, u32> = OrderedMap::new();
        assert!(map.is_empty());
        assert!(map.oldest().is_none());
    }

    #[test]
    fn serializes_in_insertion_order() {
        let json = serde_json::to_string(&sample()).expect("serialize");
        assert_eq!(json, r#"{"c":3,"a":1,"b":2}"#);
    }

    #[test]
    fn deserializes_in_document_order() {
        let map: OrderedMap<String, u32> =
            OrderedMap::from_json_str(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#).expect("parse");
        assert_eq!(map.keys().collect::<Vec<_>>(), ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn rejects_malformed_envelopes() {
        assert!(OrderedMap::<String, u32>::from_json_str("[1, 2]").is_err());
        assert!(OrderedMap::<String, u32>::from_json_str(r#""text""#).is_err());
        assert!(OrderedMap::<String, u32>::from_json_str(r#"{"a": 1} {"b": 2}"#).is_err());
        assert!(OrderedMap::<String, u32>::from_json_str(r#"{"a": 1"#).is_err());
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = OrderedMap::<String, u32>::from_json_str(r#"{"a": 1, "a": 2}"#)
            .expect_err("duplicate keys should fail");
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn equality_is_order_sensitive() {
        let reordered: OrderedMap<String, u32> = [("a", 1), ("b", 2), ("c", 3)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_ne!(sample(), reordered);
        assert_eq!(sample(), sample());
    }

    proptest! {
        #[test]
        fn json_round_trip_preserves_order(keys in proptest::collection::vec("[a-z]{1,8}", 0..16)) {
            let map: OrderedMap<String, usize> = keys
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, k)| (k, i))
                .collect();
            let json = serde_json::to_string(&map).expect("serialize");
            let parsed: OrderedMap<String, usize> = OrderedMap::from_json_str(&json).expect("parse");
            prop_assert_eq!(parsed, map);
        }
    }
}
