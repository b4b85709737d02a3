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

use prometheus::{IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::error::{ErrorReason, Result};

/// The bridge's own observability surface (see the external interfaces
/// section): everything here is an ordinary metric registered once with
/// the caller's registry, not a side channel. Every silent drop/conflict
/// the event handler and parser make is visible here.
#[derive(Debug, Clone)]
pub struct SelfMetrics {
    pub lines_total: IntCounter,
    pub samples_total: IntCounter,
    pub sample_errors_total: IntCounterVec,
    pub tag_parse_errors_total: IntCounter,
    pub events_total: IntCounterVec,
    pub events_dropped_total: IntCounterVec,
    pub conflicting_events_total: IntCounterVec,
    pub unmapped_events_total: IntCounter,
    pub active_metrics_total: IntGaugeVec,
}

impl SelfMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let lines_total = register_counter(
            registry,
            "statsd_bridge_lines_total",
            "Total StatsD lines received.",
        )?;
        let samples_total = register_counter(
            registry,
            "statsd_bridge_samples_total",
            "Total StatsD samples parsed out of received lines.",
        )?;
        let sample_errors_total = register_counter_vec(
            registry,
            "statsd_bridge_sample_errors_total",
            "Samples dropped while parsing, by reason.",
            &["reason"],
        )?;
        let tag_parse_errors_total = register_counter(
            registry,
            "statsd_bridge_tag_parse_errors_total",
            "Individual DogStatsD tags dropped while parsing.",
        )?;
        let events_total = register_counter_vec(
            registry,
            "statsd_bridge_events_total",
            "Events successfully applied to a series, by kind.",
            &["kind"],
        )?;
        let events_dropped_total = register_counter_vec(
            registry,
            "statsd_bridge_events_dropped_total",
            "Events dropped by the event handler, by action.",
            &["action"],
        )?;
        let conflicting_events_total = register_counter_vec(
            registry,
            "statsd_bridge_conflicting_events_total",
            "Events dropped because the name is already a different kind, by kind.",
            &["kind"],
        )?;
        let unmapped_events_total = register_counter(
            registry,
            "statsd_bridge_unmapped_events_total",
            "Events for which the mapper had no rule.",
        )?;
        let active_metrics_total = register_gauge_vec(
            registry,
            "statsd_bridge_active_metrics_total",
            "Live series currently held by the registry, by kind.",
            &["kind"],
        )?;

        Ok(SelfMetrics {
            lines_total,
            samples_total,
            sample_errors_total,
            tag_parse_errors_total,
            events_total,
            events_dropped_total,
            conflicting_events_total,
            unmapped_events_total,
            active_metrics_total,
        })
    }

    /// Convenience used throughout the parser and event handler so the
    /// counter label and any accompanying `tracing` event share one
    /// source of truth for the reason string.
    pub fn record_sample_error(&self, reason: ErrorReason) {
        self.sample_errors_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help).map_err(|source| crate::error::Error::Registration {
        name: name.to_owned(),
        source,
    })?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|source| crate::error::Error::Registration {
            name: name.to_owned(),
            source,
        })?;
    Ok(counter)
}

fn register_counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let opts = Opts::new(name, help);
    let vec = IntCounterVec::new(opts, labels).map_err(|source| crate::error::Error::Registration {
        name: name.to_owned(),
        source,
    })?;
    registry
        .register(Box::new(vec.clone()))
        .map_err(|source| crate::error::Error::Registration {
            name: name.to_owned(),
            source,
        })?;
    Ok(vec)
}

fn register_gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntGaugeVec> {
    let opts = Opts::new(name, help);
    let vec = IntGaugeVec::new(opts, labels).map_err(|source| crate::error::Error::Registration {
        name: name.to_owned(),
        source,
    })?;
    registry
        .register(Box::new(vec.clone()))
        .map_err(|source| crate::error::Error::Registration {
            name: name.to_owned(),
            source,
        })?;
    Ok(vec)
}
