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
use std::time::Duration;

use crate::config::{Defaults, Quantile, TimerRendering};
use crate::event::StatsdType;

/// What the event handler should do with a mapped sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Emit,
    Drop,
}

/// The per-(name, statsd-type) result of a mapper lookup. Every field
/// other than `name` is optional and filled from [`Defaults`] by the
/// event handler, not by the mapper itself -- the mapper only needs to
/// report what it actually matched.
#[derive(Debug, Clone)]
pub struct MappingResult {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub action: Action,
    pub help: Option<String>,
    pub ttl: Option<Duration>,
    pub timer_type: Option<TimerRendering>,
    pub quantiles: Option<Vec<Quantile>>,
    pub buckets: Option<Vec<f64>>,
}

impl MappingResult {
    /// The identity mapping: keep the event's own name, no extra labels,
    /// emit unconditionally, defer every parameter to [`Defaults`]. This
    /// is what the event handler substitutes when the mapper has no rule
    /// for a name (counted as "unmapped", not an error).
    pub fn unmapped(name: &str) -> Self {
        MappingResult {
            name: name.to_owned(),
            labels: HashMap::new(),
            action: Action::Emit,
            help: None,
            ttl: None,
            timer_type: None,
            quantiles: None,
            buckets: None,
        }
    }
}

/// The contract this crate expects from an external mapping-rule engine
/// (out of scope for this crate, per the purpose & scope section). It is
/// queried once per event by the event handler.
pub trait Mapper: Send + Sync {
    /// Looks up a rule for `(name, statsd_type)`. `None` means no rule
    /// matched; the event handler falls back to [`MappingResult::unmapped`].
    fn get_mapping(&self, name: &str, statsd_type: StatsdType) -> Option<MappingResult>;

    /// The mapper's global default block.
    fn defaults(&self) -> &Defaults;
}

/// A [`Mapper`] with no rules at all -- every event is unmapped. Useful
/// for embedding this crate without a rule engine, and for tests.
#[derive(Debug, Default)]
pub struct NullMapper {
    defaults: Defaults,
}

impl Mapper for NullMapper {
    fn get_mapping(&self, _name: &str, _statsd_type: StatsdType) -> Option<MappingResult> {
        None
    }

    fn defaults(&self) -> &Defaults {
        &self.defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_mapper_never_matches() {
        let m = NullMapper::default();
        assert!(m.get_mapping("anything", StatsdType::Counter).is_none());
    }
}
