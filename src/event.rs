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

/// The wire-level StatsD sample type, as carried in the `|TYPE` component
/// of a line. Kept distinct from [`MetricKind`](crate::label_index::MetricKind)
/// because `ms`/`h`/`d` all map to the same [`Event::Timer`] variant and
/// are only disambiguated later by the mapper's timer-rendering choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsdType {
    Counter,
    Gauge,
    Timer,
}

/// One observation produced by the line parser. A closed, three-variant
/// sum type -- the event handler's dispatch over it is meant to be
/// exhaustive, not open to extension.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Counter {
        name: String,
        delta: f64,
        labels: HashMap<String, String>,
    },
    Gauge {
        name: String,
        value: f64,
        relative: bool,
        labels: HashMap<String, String>,
    },
    Timer {
        name: String,
        value_ms: f64,
        labels: HashMap<String, String>,
    },
}

impl Event {
    pub fn name(&self) -> &str {
        match self {
            Event::Counter { name, .. } => name,
            Event::Gauge { name, .. } => name,
            Event::Timer { name, .. } => name,
        }
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        match self {
            Event::Counter { labels, .. } => labels,
            Event::Gauge { labels, .. } => labels,
            Event::Timer { labels, .. } => labels,
        }
    }

    pub fn statsd_type(&self) -> StatsdType {
        match self {
            Event::Counter { .. } => StatsdType::Counter,
            Event::Gauge { .. } => StatsdType::Gauge,
            Event::Timer { .. } => StatsdType::Timer,
        }
    }
}
