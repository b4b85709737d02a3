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

/*!
A translation bridge between the push-based StatsD/DogStatsD wire protocols
and a pull-based, typed and labeled metrics registry.

The crate owns the live registry of typed timeseries derived from an
unbounded stream of loosely-typed text lines: parsing ([`parser`]), a
mapping-driven event handler ([`handler`]) that applies a caller-supplied
[`mapping::Mapper`] to route observations into one of four typed containers
([`containers`]), a label-set index that detects same-name type conflicts
and drives TTL eviction ([`label_index`]), and an async worker
([`core::run_core`]) that multiplexes the event channel with the expiry
sweeper's tick.

Listeners (UDP/TCP/Unix-datagram), the mapping-rule engine itself, and the
HTTP exposition endpoint are deliberately external collaborators -- this
crate is driven by them, not a container for them.
*/

pub mod config;
pub mod containers;
pub mod core;
pub mod error;
pub mod escape;
pub mod event;
pub mod handler;
pub mod hashing;
pub mod label_index;
pub mod mapping;
pub mod parser;
pub mod registry;
pub mod self_metrics;

pub use self::config::{Defaults, Quantile, TimerRendering};
pub use self::core::run_core;
pub use self::error::{Error, ErrorReason, Result};
pub use self::event::{Event, StatsdType};
pub use self::handler::EventHandler;
pub use self::label_index::{LabelIndex, LabelValues, MetricKind};
pub use self::mapping::{Action, Mapper, MappingResult, NullMapper};
pub use self::parser::LineParser;
pub use self::registry::DEFAULT_REGISTRY;
pub use self::self_metrics::SelfMetrics;
