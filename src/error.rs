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

use std::result;

/// Errors that can surface from constructing or registering a typed
/// container. Per-sample parsing/mapping problems are never represented
/// here -- they are silent-to-the-producer and only visible through the
/// counters in [`crate::self_metrics::SelfMetrics`] (see `ErrorReason`
/// below).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A vector metric already exists under this name with a different
    /// set of label names, or the same name is already owned by a
    /// different kind of series.
    #[error("{0} is already registered as a different series")]
    AlreadyRegistered(String),

    /// The underlying `prometheus` registry rejected the registration.
    #[error("registering {name}: {source}")]
    Registration {
        name: String,
        #[source]
        source: prometheus::Error,
    },
}

pub type Result<T> = result::Result<T, Error>;

/// The taxonomy of silent, per-sample drop reasons from the design's
/// error handling table, minus the two rows (`conflicting`, `tag_error`)
/// that are tracked exclusively through their own dedicated counters
/// (`conflicting_events_total{kind}`, `tag_parse_errors_total`) rather than
/// this one -- a sample either fails to parse for one of these reasons, or
/// it conflicts/has a bad tag, never both, so there is no shared call site
/// that would need a single `ErrorReason` value for all ten rows. Used both
/// as a counter label value and as a `tracing` field, so the two can never
/// drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    MalformedLine,
    MalformedComponent,
    MalformedValue,
    IllegalSampleFactor,
    InvalidSampleFactor,
    IllegalEvent,
    IllegalNegativeCounter,
    EmptyMetricName,
}

impl ErrorReason {
    /// Stable snake_case label, matching the taxonomy column in the design.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorReason::MalformedLine => "malformed_line",
            ErrorReason::MalformedComponent => "malformed_component",
            ErrorReason::MalformedValue => "malformed_value",
            ErrorReason::IllegalSampleFactor => "illegal_sample_factor",
            ErrorReason::InvalidSampleFactor => "invalid_sample_factor",
            ErrorReason::IllegalEvent => "illegal_event",
            ErrorReason::IllegalNegativeCounter => "illegal_negative_counter",
            ErrorReason::EmptyMetricName => "empty_metric_name",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
