//! Insertion-ordered repository map.
//!
//! Scheduling breaks ties by the order repositories were first recorded, so
//! the map keeps document order through load/save instead of sorting keys.
use super::types::RepoState;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoMap {
    entries: Vec<(String, RepoState)>,
    index: HashMap<String, usize>,
}

impl RepoMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&RepoState> {
        self.index.get(name).map(|&idx| &self.entries[idx].1)
    }

    /// Insert or replace a record. Replacing keeps the original position.
    pub fn insert(&mut self, name: &str, repo: RepoState) -> Option<RepoState> {
        if let Some(&idx) = self.index.get(name) {
            return Some(std::mem::replace(&mut self.entries[idx].1, repo));
        }
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push((name.to_string(), repo));
        None
    }

    pub fn get_or_insert_default(&mut self, name: &str) -> &mut RepoState {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.insert(name, RepoState::default());
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RepoState)> {
        self.entries
            .iter()
            .map(|(name, repo)| (name.as_str(), repo))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut RepoState)> {
        self.entries
            .iter_mut()
            .map(|(name, repo)| (name.as_str(), repo))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for RepoMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, repo) in &self.entries {
            map.serialize_entry(name, repo)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RepoMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RepoMapVisitor)
    }
}

struct RepoMapVisitor;

impl<'de> Visitor<'de> for RepoMapVisitor {
    type Value = RepoMap;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of repository name to repository state")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut repos = RepoMap::default();
        while let Some((name, repo)) = access.next_entry::<String, RepoState>()? {
            repos.insert(&name, repo);
        }
        Ok(repos)
    }
}
