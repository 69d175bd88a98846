//! Bounded cache of encoder outputs.
//!
//! Moving a slider back and forth requests the same parameters again and
//! again. Entries are keyed by the source identity (path, size, mtime) and the
//! serialized parameters, and evicted least-recently-used first once the
//! capacity is reached. The cache keeps its own link to each artifact file, so
//! the results handed out stay independently owned.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use crate::core::{Artifact, EncoderParameters};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `fingerprint` is the source's (size, mtime).
    pub fn new(source: &Path, fingerprint: (u64, u128), params: &EncoderParameters) -> Option<Self> {
        let params = serde_json::to_string(params).ok()?;
        Some(Self(format!(
            "{}|{}|{}|{}",
            source.display(),
            fingerprint.0,
            fingerprint.1,
            params
        )))
    }
}

#[derive(Debug)]
pub struct ArtifactCache {
    capacity: usize,
    entries: HashMap<CacheKey, Artifact>,
    /// Front is least recently used
    order: VecDeque<CacheKey>,
}

impl ArtifactCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Artifact> {
        let artifact = self.entries.get(key)?.clone();
        self.touch(key);
        Some(artifact)
    }

    /// Stores `artifact`, returning the entries pushed out (including a
    /// replaced entry for the same key). Their files belong to the caller.
    pub fn insert(&mut self, key: CacheKey, artifact: Artifact) -> Vec<Artifact> {
        if !self.is_enabled() {
            return vec![artifact];
        }

        let mut evicted = Vec::new();
        if let Some(old) = self.entries.insert(key.clone(), artifact) {
            evicted.push(old);
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);

        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            if let Some(old) = self.entries.remove(&oldest) {
                evicted.push(old);
            }
        }
        evicted
    }

    /// Drops an entry whose file turned out to be unusable.
    pub fn remove(&mut self, key: &CacheKey) -> Option<Artifact> {
        self.order.retain(|k| k != key);
        self.entries.remove(key)
    }

    pub fn drain(&mut self) -> Vec<Artifact> {
        self.order.clear();
        self.entries.drain().map(|(_, a)| a).collect()
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}
