//! Ordered `key:value,key:value` dictionaries.
//!
//! Every configuration fragment that crosses a process boundary (image maps,
//! bind lists, scheduler attributes) travels in this encoding. Keys are
//! unique on write, lookups are first-match in encoded order, and a bare key
//! (`key` with no `:`) is a present entry whose value is empty.
//!
//! Values are split from keys at the first `:` only, so a value may itself
//! contain `:` (`docker://centos:7`). Neither keys nor values may contain `,`.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::DomainError;

const PAIR_SEPARATOR: char = ',';
const KEY_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    value: Option<String>,
}

impl Entry {
    fn value(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// Result of a dictionary lookup that keeps "present but empty" distinct
/// from "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Absent,
    Empty,
    Value(&'a str),
}

impl<'a> Lookup<'a> {
    #[must_use]
    pub fn is_present(&self) -> bool {
        !matches!(self, Lookup::Absent)
    }

    /// The matched value, with present-but-empty mapped to `""`.
    #[must_use]
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Lookup::Absent => None,
            Lookup::Empty => Some(""),
            Lookup::Value(value) => Some(*value),
        }
    }

    /// The matched value only when it is non-empty.
    #[must_use]
    pub fn non_empty(&self) -> Option<&'a str> {
        match self {
            Lookup::Value(value) => Some(*value),
            _ => None,
        }
    }
}

/// Whether a write created a new entry or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Which projection of the first entry [`Dictionary::first`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Item,
    Key,
    Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: Vec<Entry>,
}

impl Dictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the wire encoding. Empty segments (`a:1,,b:2`) are skipped;
    /// whitespace is preserved verbatim.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(PAIR_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.split_once(KEY_SEPARATOR) {
                Some((key, value)) => Entry {
                    key: key.to_string(),
                    value: Some(value.to_string()),
                },
                None => Entry {
                    key: segment.to_string(),
                    value: None,
                },
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value of the first entry, in encoded order, whose key is
    /// one of `keys`.
    ///
    /// A present key with an empty value yields `Ok("")`; use [`lookup`] when
    /// the caller needs to tell that apart from a real value.
    ///
    /// [`lookup`]: Dictionary::lookup
    pub fn get(&self, keys: &[&str]) -> Result<&str, DomainError> {
        self.lookup(keys)
            .as_str()
            .ok_or_else(|| DomainError::NotFound {
                keys: keys.iter().map(|key| (*key).to_string()).collect(),
            })
    }

    #[must_use]
    pub fn lookup(&self, keys: &[&str]) -> Lookup<'_> {
        match self
            .entries
            .iter()
            .find(|entry| keys.contains(&entry.key.as_str()))
        {
            None => Lookup::Absent,
            Some(entry) if entry.value().is_empty() => Lookup::Empty,
            Some(entry) => Lookup::Value(entry.value()),
        }
    }

    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// Returns a new dictionary with every prior occurrence of `key` removed
    /// and `key:value` appended at the end.
    pub fn with_entry(
        &self,
        key: &str,
        value: Option<&str>,
    ) -> Result<(Dictionary, Upsert), DomainError> {
        let mut next = self.clone();
        let upsert = next.insert(key, value)?;
        Ok((next, upsert))
    }

    /// In-place form of [`with_entry`](Dictionary::with_entry).
    pub fn insert(&mut self, key: &str, value: Option<&str>) -> Result<Upsert, DomainError> {
        validate_key(key)?;
        if let Some(value) = value {
            if value.contains(PAIR_SEPARATOR) {
                return Err(DomainError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        let before = self.entries.len();
        self.entries.retain(|entry| entry.key != key);
        let upsert = if self.entries.len() == before {
            Upsert::Inserted
        } else {
            Upsert::Replaced
        };
        self.entries.push(Entry {
            key: key.to_string(),
            value: value.map(str::to_string),
        });
        Ok(upsert)
    }

    /// Keys in encoded order; duplicates in parsed input are kept.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }

    /// Projection of the first entry, or an empty string for an empty
    /// dictionary.
    #[must_use]
    pub fn first(&self, what: Projection) -> String {
        let Some(entry) = self.entries.first() else {
            return String::new();
        };
        match what {
            Projection::Item => encode_entry(entry),
            Projection::Key => entry.key.clone(),
            Projection::Value => entry.value().to_string(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|entry| (entry.key.as_str(), entry.value()))
    }

    pub fn for_each_pair<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &str),
    {
        for (key, value) in self.iter() {
            visit(key, value);
        }
    }

    pub fn for_each_key<F>(&self, mut visit: F)
    where
        F: FnMut(&str),
    {
        for entry in &self.entries {
            visit(&entry.key);
        }
    }
}

fn validate_key(key: &str) -> Result<(), DomainError> {
    if key.is_empty() || key.contains(PAIR_SEPARATOR) || key.contains(KEY_SEPARATOR) {
        return Err(DomainError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn encode_entry(entry: &Entry) -> String {
    match &entry.value {
        Some(value) => format!("{}{KEY_SEPARATOR}{value}", entry.key),
        None => entry.key.clone(),
    }
}

impl fmt::Display for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, entry) in self.entries.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            f.write_str(&encode_entry(entry))?;
        }
        Ok(())
    }
}

impl FromStr for Dictionary {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for Dictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dictionary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DictionaryVisitor)
    }
}

/// Accepts either the wire string or a key/value table (TOML site files).
struct DictionaryVisitor;

impl<'de> Visitor<'de> for DictionaryVisitor {
    type Value = Dictionary;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a `key:value,...` string or a table of strings")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Dictionary::parse(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut dict = Dictionary::new();
        while let Some((key, value)) = map.next_entry::<String, String>()? {
            let value = (!value.is_empty()).then_some(value.as_str());
            dict.insert(&key, value).map_err(de::Error::custom)?;
        }
        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_value() {
        let dict = Dictionary::parse("a:1,b:2");
        let (next, upsert) = dict.with_entry("c", Some("3")).unwrap();
        assert_eq!(upsert, Upsert::Inserted);
        assert_eq!(next.get(&["c"]).unwrap(), "3");
        assert_eq!(next.to_string(), "a:1,b:2,c:3");
        assert_eq!(dict.to_string(), "a:1,b:2", "original is untouched");
    }

    #[test]
    fn overwrite_moves_key_to_end_once() {
        let dict = Dictionary::parse("a:1,b:2,c:3");
        let (next, upsert) = dict.with_entry("a", Some("9")).unwrap();
        assert_eq!(upsert, Upsert::Replaced);
        assert_eq!(next.keys(), vec!["b", "c", "a"]);
        let (again, _) = next.with_entry("a", Some("10")).unwrap();
        assert_eq!(again.keys().iter().filter(|k| **k == "a").count(), 1);
        assert_eq!(again.get(&["a"]).unwrap(), "10");
    }

    #[test]
    fn get_follows_encoded_order_not_argument_order() {
        let dict = Dictionary::parse("x:0,b:2,a:1");
        assert_eq!(dict.get(&["a", "b"]).unwrap(), "2");
        assert_eq!(dict.get(&["b", "a"]).unwrap(), "2");
        assert!(matches!(
            dict.get(&["missing"]),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn empty_value_is_present_but_distinct() {
        let dict = Dictionary::parse("bare,empty:,full:v");
        assert!(dict.has_key("bare"));
        assert!(dict.has_key("empty"));
        assert_eq!(dict.get(&["bare"]).unwrap(), "");
        assert_eq!(dict.lookup(&["empty"]), Lookup::Empty);
        assert_eq!(dict.lookup(&["full"]), Lookup::Value("v"));
        assert_eq!(dict.lookup(&["nope"]), Lookup::Absent);
        assert_eq!(dict.to_string(), "bare,empty:,full:v");
    }

    #[test]
    fn values_keep_inner_colons_and_spaces() {
        let dict = Dictionary::parse("el7:docker://centos:7,my key:a value");
        assert_eq!(dict.get(&["el7"]).unwrap(), "docker://centos:7");
        let mut seen = Vec::new();
        dict.for_each_pair(|k, v| seen.push(format!("{k}={v}")));
        assert_eq!(seen, vec!["el7=docker://centos:7", "my key=a value"]);
    }

    #[test]
    fn first_projections() {
        let dict = Dictionary::parse("rhel7:/img/a,default:/img/b");
        assert_eq!(dict.first(Projection::Item), "rhel7:/img/a");
        assert_eq!(dict.first(Projection::Key), "rhel7");
        assert_eq!(dict.first(Projection::Value), "/img/a");
        assert_eq!(Dictionary::new().first(Projection::Key), "");
    }

    #[test]
    fn rejects_reserved_characters() {
        let mut dict = Dictionary::new();
        assert!(matches!(
            dict.insert("a:b", Some("x")),
            Err(DomainError::InvalidKey { .. })
        ));
        assert!(matches!(
            dict.insert("a", Some("x,y")),
            Err(DomainError::InvalidValue { .. })
        ));
        assert!(dict.is_empty());
    }

    #[test]
    fn keys_keep_duplicates_from_input() {
        let dict = Dictionary::parse("a:1,a:2");
        assert_eq!(dict.keys(), vec!["a", "a"]);
        assert_eq!(dict.get(&["a"]).unwrap(), "1");
        let mut keys = Vec::new();
        dict.for_each_key(|k| keys.push(k.to_string()));
        assert_eq!(keys.len(), 2);
    }
}
