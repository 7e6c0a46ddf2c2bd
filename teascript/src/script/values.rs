//! Per-invocation value store.
//!
//! Keys are full scoped names (`$sender`, `?who`, `!count`).  Reads never
//! fail: [`ValueMap::get_or_default`] materializes an empty [`Value`] for an
//! unknown key and stores it, so a second read observes the same entry.
//!
//! A value counts as *set* when it is present with non-empty text.  Wildcard
//! enumeration only yields set values, so entries materialized by reads do
//! not leak into list records or hurl payloads.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::name::ValueName;
use super::value::Value;

/// Name → [`Value`] map with get-or-insert-default reads.
#[derive(Debug, Default, Clone)]
pub struct ValueMap {
    values: BTreeMap<String, Value>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `key`, inserting and returning the empty value when absent.
    pub fn get_or_default(&mut self, key: &str) -> &Value {
        self.values.entry(key.to_owned()).or_default()
    }

    /// Read without materializing.
    pub fn peek(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Remove `key`.  Returns `true` if it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// `true` if `key` holds a non-empty value.
    pub fn is_set(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|v| !v.is_empty())
    }

    /// Every set value whose key starts with `prefix`, as `(suffix, value)`
    /// pairs in key order.
    pub fn matching<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.values
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .filter(|(_, v)| !v.is_empty())
            .map(move |(k, v)| (&k[prefix.len()..], v))
    }

    /// Remove every key starting with `prefix`; returns how many went.
    pub fn remove_matching(&mut self, prefix: &str) -> usize {
        let doomed: Vec<String> = self
            .values
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &doomed {
            self.values.remove(k);
        }
        doomed.len()
    }

    /// `true` if `name` is set, or for a wildcard, if any member is set.
    pub fn has(&self, name: &ValueName) -> bool {
        if name.is_wildcard() {
            self.matching(name.key()).next().is_some()
        } else {
            self.is_set(name.key())
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_read_materializes_default() {
        let mut m = ValueMap::new();
        assert_eq!(m.get_or_default("!missing"), &Value::empty());
        assert_eq!(m.len(), 1);
        assert_eq!(m.get_or_default("!missing").number(), 0);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn peek_does_not_insert() {
        let m = ValueMap::new();
        assert!(m.peek("!x").is_none());
        assert!(m.is_empty());
    }

    #[test]
    fn materialized_value_is_not_set() {
        let mut m = ValueMap::new();
        m.get_or_default("!x");
        assert!(!m.is_set("!x"));
        m.set("!x", "1");
        assert!(m.is_set("!x"));
    }

    #[test]
    fn matching_yields_suffixes_of_set_values() {
        let mut m = ValueMap::new();
        m.set("!data.id", "1");
        m.set("!data.name", "Bob");
        m.get_or_default("!data.ghost");
        m.set("!database", "nope");
        let got: Vec<(&str, &str)> = m.matching("!data.").map(|(k, v)| (k, v.text())).collect();
        assert_eq!(got, vec![("id", "1"), ("name", "Bob")]);
    }

    #[test]
    fn remove_matching_drops_prefix_only() {
        let mut m = ValueMap::new();
        m.set("!a.x", "1");
        m.set("!a.y", "2");
        m.set("!b", "3");
        assert_eq!(m.remove_matching("!a."), 2);
        assert!(m.is_set("!b"));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn has_plain_and_wildcard() {
        let mut m = ValueMap::new();
        m.set("!user.name", "amy");
        assert!(m.has(&ValueName::parse("!user.*").unwrap()));
        assert!(m.has(&ValueName::parse("!user.name").unwrap()));
        assert!(!m.has(&ValueName::parse("!other.*").unwrap()));
    }
}
