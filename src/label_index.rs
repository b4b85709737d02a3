// Copyright 2016 PingCAP, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::hashing::LabelHasher;

/// The logical kind of a series, shared by the label index, the typed
/// containers and the event handler's dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
    Histogram,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Summary => "summary",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Everything the index remembers about one live series.
#[derive(Debug, Clone)]
pub struct LabelValues {
    pub labels: HashMap<String, String>,
    pub kind: MetricKind,
    pub ttl: Duration,
    pub last_registered_at: Instant,
}

/// `name -> hash -> descriptor`, the authority for both TTL eviction and
/// same-name/different-kind conflict detection. Owned exclusively by the
/// event handler's worker -- see the concurrency design notes -- so every
/// method here takes `&mut self` without needing a lock.
#[derive(Debug, Default)]
pub struct LabelIndex {
    by_name: HashMap<String, HashMap<u64, LabelValues>>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` if `name` is unused. Otherwise inspects any one descriptor
    /// under `name` and returns whether its kind differs from `kind` --
    /// every descriptor sharing a name is guaranteed to share a kind, so
    /// one sample is enough to decide.
    pub fn metric_conflicts(&self, name: &str, kind: MetricKind) -> bool {
        match self.by_name.get(name).and_then(|by_hash| by_hash.values().next()) {
            None => false,
            Some(existing) => existing.kind != kind,
        }
    }

    /// Whether the exact series identity `(name, hash)` already has a live
    /// descriptor. Used by the event handler to tell a brand-new series
    /// from a re-observation of one it already knows, so the active-series
    /// gauge counts distinct identities rather than every observation.
    pub fn contains(&self, name: &str, hash: u64) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|by_hash| by_hash.contains_key(&hash))
    }

    /// Whether `name` has any live descriptor at all, regardless of kind.
    /// Used by the summary/histogram containers to guard the auxiliary
    /// `_sum`/`_count`/`_bucket` names the exposition format will
    /// synthesize from a logical name they do not otherwise occupy.
    pub fn name_exists(&self, name: &str) -> bool {
        self.by_name.get(name).is_some_and(|by_hash| !by_hash.is_empty())
    }

    /// Insert-or-update: last write wins on `ttl`, `last_registered_at`
    /// only ever moves forward.
    pub fn save_label_values(
        &mut self,
        hasher: &mut LabelHasher,
        name: &str,
        kind: MetricKind,
        sorted_label_names: &[String],
        labels: &HashMap<String, String>,
        ttl: Duration,
        now: Instant,
    ) {
        let hash = hasher.hash(name, sorted_label_names, labels);
        let entry = self.by_name.entry(name.to_owned()).or_default();
        entry.insert(
            hash,
            LabelValues {
                labels: labels.clone(),
                kind,
                ttl,
                last_registered_at: now,
            },
        );
    }

    /// Removes every descriptor whose TTL has lapsed as of `now`, calling
    /// `on_expired(name, hash, kind, labels)` for each so the caller (the
    /// sweeper) can cascade the delete into the typed containers.
    pub fn sweep(&mut self, now: Instant, mut on_expired: impl FnMut(&str, u64, MetricKind, &HashMap<String, String>)) {
        self.by_name.retain(|name, by_hash| {
            by_hash.retain(|hash, descriptor| {
                if descriptor.ttl.is_zero() {
                    return true;
                }
                if descriptor.last_registered_at + descriptor.ttl < now {
                    on_expired(name, *hash, descriptor.kind, &descriptor.labels);
                    false
                } else {
                    true
                }
            });
            !by_hash.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn absent_name_never_conflicts() {
        let idx = LabelIndex::new();
        assert!(!idx.metric_conflicts("foo", MetricKind::Counter));
    }

    #[test]
    fn same_kind_does_not_conflict() {
        let mut idx = LabelIndex::new();
        let mut hasher = LabelHasher::new();
        idx.save_label_values(
            &mut hasher,
            "foo",
            MetricKind::Counter,
            &[],
            &HashMap::new(),
            Duration::ZERO,
            Instant::now(),
        );
        assert!(!idx.metric_conflicts("foo", MetricKind::Counter));
    }

    #[test]
    fn different_kind_conflicts() {
        let mut idx = LabelIndex::new();
        let mut hasher = LabelHasher::new();
        idx.save_label_values(
            &mut hasher,
            "foo",
            MetricKind::Counter,
            &[],
            &HashMap::new(),
            Duration::ZERO,
            Instant::now(),
        );
        assert!(idx.metric_conflicts("foo", MetricKind::Gauge));
    }

    #[test]
    fn zero_ttl_never_expires() {
        let mut idx = LabelIndex::new();
        let mut hasher = LabelHasher::new();
        let now = Instant::now();
        idx.save_label_values(&mut hasher, "foo", MetricKind::Counter, &[], &HashMap::new(), Duration::ZERO, now);
        let mut expired = Vec::new();
        idx.sweep(now + Duration::from_secs(1000), |n, _, _, _| expired.push(n.to_owned()));
        assert!(expired.is_empty());
        assert!(idx.name_exists("foo"));
    }

    #[test]
    fn lapsed_ttl_is_swept_and_can_be_recreated() {
        let mut idx = LabelIndex::new();
        let mut hasher = LabelHasher::new();
        let start = Instant::now();
        idx.save_label_values(
            &mut hasher,
            "foo",
            MetricKind::Counter,
            &[],
            &labels(&[]),
            Duration::from_secs(2),
            start,
        );

        let mut expired = Vec::new();
        idx.sweep(start + Duration::from_secs(3), |n, _, k, _| {
            expired.push((n.to_owned(), k))
        });
        assert_eq!(expired, vec![("foo".to_owned(), MetricKind::Counter)]);
        assert!(!idx.name_exists("foo"));

        // re-observing recreates the identity -- no permanent poisoning.
        idx.save_label_values(
            &mut hasher,
            "foo",
            MetricKind::Counter,
            &[],
            &labels(&[]),
            Duration::from_secs(2),
            start + Duration::from_secs(3),
        );
        assert!(idx.name_exists("foo"));
    }
}
