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

use std::time::Instant;

use prometheus::Registry;
use tracing::debug;

use crate::config::TimerRendering;
use crate::containers::{CounterContainer, GaugeContainer, HistogramContainer, SummaryContainer};
use crate::error::ErrorReason;
use crate::escape::escape_metric_name;
use crate::event::Event;
use crate::hashing::LabelHasher;
use crate::label_index::{LabelIndex, MetricKind};
use crate::mapping::{Action, Mapper, MappingResult};
use crate::self_metrics::SelfMetrics;

/// Owns every piece of mutable registry state and applies events to it.
/// Single-writer by construction -- see [`crate::core::run_core`], the
/// only caller that ever holds a `&mut EventHandler`.
pub struct EventHandler {
    mapper: Box<dyn Mapper>,
    counters: CounterContainer,
    gauges: GaugeContainer,
    histograms: HistogramContainer,
    summaries: SummaryContainer,
    index: LabelIndex,
    hasher: LabelHasher,
    metrics: SelfMetrics,
}

impl EventHandler {
    pub fn new(registry: &Registry, mapper: Box<dyn Mapper>, metrics: SelfMetrics) -> Self {
        // active_metrics_total is already registered by SelfMetrics; every
        // container shares that one handle rather than registering its own.
        EventHandler {
            mapper,
            counters: CounterContainer::new(registry, metrics.active_metrics_total.clone()),
            gauges: GaugeContainer::new(registry, metrics.active_metrics_total.clone()),
            histograms: HistogramContainer::new(registry, metrics.active_metrics_total.clone()),
            summaries: SummaryContainer::new(registry, metrics.active_metrics_total.clone()),
            index: LabelIndex::new(),
            hasher: LabelHasher::new(),
            metrics,
        }
    }

    pub fn handle_all(&mut self, events: &[Event], now: Instant) {
        for event in events {
            self.handle_one(event, now);
        }
    }

    fn handle_one(&mut self, event: &Event, now: Instant) {
        // 1. map lookup
        let mapping = self
            .mapper
            .get_mapping(event.name(), event.statsd_type())
            .unwrap_or_else(|| {
                self.metrics.unmapped_events_total.inc();
                MappingResult::unmapped(event.name())
            });

        // 2. drop
        if mapping.action == Action::Drop {
            self.metrics
                .events_dropped_total
                .with_label_values(&["drop"])
                .inc();
            return;
        }

        // 3. name resolution + label merge
        let name = escape_metric_name(&mapping.name);
        if name.is_empty() {
            self.metrics.record_sample_error(ErrorReason::EmptyMetricName);
            return;
        }
        let mut labels = event.labels().clone();
        for (k, v) in &mapping.labels {
            labels.insert(k.clone(), v.clone());
        }

        // 4. sort label names
        let mut sorted_label_names: Vec<String> = labels.keys().cloned().collect();
        sorted_label_names.sort();

        let defaults = self.mapper.defaults();
        let help = defaults.resolve_help(mapping.help.as_deref());
        let ttl = defaults.resolve_ttl(mapping.ttl);

        // A series identity is "new" iff this exact (name, hash) has no
        // live descriptor yet -- the active-metrics gauge below counts
        // distinct identities, not observations, so it must be decided
        // before dispatch mutates anything.
        let hash = self.hasher.hash(&name, &sorted_label_names, &labels);
        let is_new = !self.index.contains(&name, hash);

        // 5. dispatch
        let kind = match event {
            Event::Counter { delta, .. } => {
                if *delta < 0.0 {
                    self.metrics.record_sample_error(ErrorReason::IllegalNegativeCounter);
                    return;
                }
                match self.counters.get(&name, &sorted_label_names, &labels, &self.index, &help) {
                    Ok(child) => {
                        child.inc_by(*delta);
                        self.metrics.events_total.with_label_values(&["counter"]).inc();
                        MetricKind::Counter
                    }
                    Err(_) => {
                        self.metrics.conflicting_events_total.with_label_values(&["counter"]).inc();
                        return;
                    }
                }
            }
            Event::Gauge { value, relative, .. } => {
                match self.gauges.get(&name, &sorted_label_names, &labels, &self.index, &help) {
                    Ok(child) => {
                        if *relative {
                            child.add(*value);
                        } else {
                            child.set(*value);
                        }
                        self.metrics.events_total.with_label_values(&["gauge"]).inc();
                        MetricKind::Gauge
                    }
                    Err(_) => {
                        self.metrics.conflicting_events_total.with_label_values(&["gauge"]).inc();
                        return;
                    }
                }
            }
            Event::Timer { value_ms, .. } => {
                let seconds = value_ms / 1000.0;
                let timer_type = defaults.resolve_timer_type(mapping.timer_type);
                match timer_type {
                    TimerRendering::Summary => {
                        let quantiles = defaults.resolve_quantiles(mapping.quantiles.as_deref());
                        match self.summaries.observe(
                            &name,
                            &sorted_label_names,
                            &labels,
                            &self.index,
                            &help,
                            &quantiles,
                            seconds,
                        ) {
                            Ok(()) => {
                                self.metrics.events_total.with_label_values(&["summary"]).inc();
                                MetricKind::Summary
                            }
                            Err(_) => {
                                self.metrics
                                    .conflicting_events_total
                                    .with_label_values(&["summary"])
                                    .inc();
                                return;
                            }
                        }
                    }
                    TimerRendering::Histogram => {
                        let buckets = defaults.resolve_buckets(mapping.buckets.as_deref());
                        match self.histograms.get(&name, &sorted_label_names, &labels, &self.index, &help, &buckets) {
                            Ok(child) => {
                                child.observe(seconds);
                                self.metrics.events_total.with_label_values(&["histogram"]).inc();
                                MetricKind::Histogram
                            }
                            Err(_) => {
                                self.metrics
                                    .conflicting_events_total
                                    .with_label_values(&["histogram"])
                                    .inc();
                                return;
                            }
                        }
                    }
                }
            }
        };

        // 6. post-observation bookkeeping
        if is_new {
            self.metrics
                .active_metrics_total
                .with_label_values(&[kind.as_str()])
                .inc();
        }
        self.index.save_label_values(
            &mut self.hasher,
            &name,
            kind,
            &sorted_label_names,
            &labels,
            ttl,
            now,
        );
        debug!(%name, kind = kind.as_str(), "observation applied");
    }

    /// Drops every series whose TTL has lapsed as of `now`, cascading into
    /// all four containers per the sweeper design (only one container ever
    /// owns the row; deleting from the rest is a no-op).
    pub fn sweep(&mut self, now: Instant) {
        let mut expired = Vec::new();
        self.index.sweep(now, |name, _hash, kind, labels| {
            expired.push((name.to_owned(), kind, labels.clone()));
        });

        for (name, kind, labels) in expired {
            let mut sorted_label_names: Vec<String> = labels.keys().cloned().collect();
            sorted_label_names.sort();
            self.counters.delete(&name, &sorted_label_names, &labels);
            self.gauges.delete(&name, &sorted_label_names, &labels);
            self.histograms.delete(&name, &sorted_label_names, &labels);
            self.summaries.delete(&name, &sorted_label_names, &labels);
            debug!(%name, kind = kind.as_str(), "series expired");
        }
    }
}
