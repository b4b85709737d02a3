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

use prometheus::core::Collector;
use prometheus::{
    Counter, CounterVec, Desc, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge,
    IntGaugeVec, MetricFamily, Opts, Registry,
};

use crate::config::Quantile;
use crate::error::{Error, Result};
use crate::label_index::{LabelIndex, MetricKind};

fn container_key(name: &str, sorted_label_names: &[String]) -> String {
    let mut key = String::with_capacity(name.len() + 1 + sorted_label_names.iter().map(|s| s.len() + 1).sum::<usize>());
    key.push_str(name);
    key.push(',');
    key.push_str(&sorted_label_names.join(","));
    key
}

/// Registers an inner [`Collector`] behind a `desc()` that reports nothing.
/// The real registry rejects a second vector sharing a name with
/// inconsistent label dimensions; this crate's containers need exactly
/// that (multiple vectors per logical name, one per label-name-set), so
/// each vector is registered wrapped in this type instead of directly.
struct UncheckedCollector<T>(T);

impl<T: Collector> Collector for UncheckedCollector<T> {
    fn desc(&self) -> Vec<&Desc> {
        Vec::new()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.0.collect()
    }
}

fn register_unchecked<T: Collector + Clone + 'static>(
    registry: &Registry,
    name: &str,
    collector: T,
) -> Result<()> {
    registry
        .register(Box::new(UncheckedCollector(collector)))
        .map_err(|source| Error::Registration {
            name: name.to_owned(),
            source,
        })
}

/// Shared plumbing for the four typed containers: a map from container key
/// to vector handle, plus the one active-series gauge every kind exposes.
struct ContainerCore<V> {
    registry: Registry,
    children: HashMap<String, V>,
    active: IntGaugeVec,
    kind: MetricKind,
}

impl<V> ContainerCore<V> {
    fn new(registry: &Registry, active: IntGaugeVec, kind: MetricKind) -> Self {
        ContainerCore {
            registry: registry.clone(),
            children: HashMap::new(),
            active,
            kind,
        }
    }

    fn active_gauge(&self) -> IntGauge {
        self.active.with_label_values(&[self.kind.as_str()])
    }
}

pub struct CounterContainer {
    core: ContainerCore<CounterVec>,
}

impl CounterContainer {
    pub fn new(registry: &Registry, active: IntGaugeVec) -> Self {
        CounterContainer {
            core: ContainerCore::new(registry, active, MetricKind::Counter),
        }
    }

    pub fn get(
        &mut self,
        name: &str,
        sorted_label_names: &[String],
        labels: &HashMap<String, String>,
        index: &LabelIndex,
        help: &str,
    ) -> Result<Counter> {
        let key = container_key(name, sorted_label_names);
        if !self.core.children.contains_key(&key) {
            if index.metric_conflicts(name, MetricKind::Counter) {
                return Err(Error::AlreadyRegistered(name.to_owned()));
            }
            let label_refs: Vec<&str> = sorted_label_names.iter().map(String::as_str).collect();
            let vec = CounterVec::new(Opts::new(name, help), &label_refs).map_err(|source| {
                Error::Registration {
                    name: name.to_owned(),
                    source,
                }
            })?;
            register_unchecked(&self.core.registry, name, vec.clone())?;
            self.core.children.insert(key.clone(), vec);
        }
        let vec = self.core.children.get(&key).expect("just inserted");
        let values: Vec<&str> = sorted_label_names
            .iter()
            .map(|n| labels.get(n).map(String::as_str).unwrap_or(""))
            .collect();
        let child = vec.with_label_values(&values);
        Ok(child)
    }

    pub fn delete(&mut self, name: &str, sorted_label_names: &[String], labels: &HashMap<String, String>) {
        let key = container_key(name, sorted_label_names);
        if let Some(vec) = self.core.children.get(&key) {
            let values: Vec<&str> = sorted_label_names
                .iter()
                .map(|n| labels.get(n).map(String::as_str).unwrap_or(""))
                .collect();
            if vec.remove_label_values(&values).is_ok() {
                self.core.active_gauge().dec();
            }
        }
    }
}

pub struct GaugeContainer {
    core: ContainerCore<GaugeVec>,
}

impl GaugeContainer {
    pub fn new(registry: &Registry, active: IntGaugeVec) -> Self {
        GaugeContainer {
            core: ContainerCore::new(registry, active, MetricKind::Gauge),
        }
    }

    pub fn get(
        &mut self,
        name: &str,
        sorted_label_names: &[String],
        labels: &HashMap<String, String>,
        index: &LabelIndex,
        help: &str,
    ) -> Result<prometheus::Gauge> {
        let key = container_key(name, sorted_label_names);
        if !self.core.children.contains_key(&key) {
            if index.metric_conflicts(name, MetricKind::Gauge) {
                return Err(Error::AlreadyRegistered(name.to_owned()));
            }
            let label_refs: Vec<&str> = sorted_label_names.iter().map(String::as_str).collect();
            let vec = GaugeVec::new(Opts::new(name, help), &label_refs).map_err(|source| {
                Error::Registration {
                    name: name.to_owned(),
                    source,
                }
            })?;
            register_unchecked(&self.core.registry, name, vec.clone())?;
            self.core.children.insert(key.clone(), vec);
        }
        let vec = self.core.children.get(&key).expect("just inserted");
        let values: Vec<&str> = sorted_label_names
            .iter()
            .map(|n| labels.get(n).map(String::as_str).unwrap_or(""))
            .collect();
        let child = vec.with_label_values(&values);
        Ok(child)
    }

    pub fn delete(&mut self, name: &str, sorted_label_names: &[String], labels: &HashMap<String, String>) {
        let key = container_key(name, sorted_label_names);
        if let Some(vec) = self.core.children.get(&key) {
            let values: Vec<&str> = sorted_label_names
                .iter()
                .map(|n| labels.get(n).map(String::as_str).unwrap_or(""))
                .collect();
            if vec.remove_label_values(&values).is_ok() {
                self.core.active_gauge().dec();
            }
        }
    }
}

pub struct HistogramContainer {
    core: ContainerCore<HistogramVec>,
}

impl HistogramContainer {
    pub fn new(registry: &Registry, active: IntGaugeVec) -> Self {
        HistogramContainer {
            core: ContainerCore::new(registry, active, MetricKind::Histogram),
        }
    }

    pub fn get(
        &mut self,
        name: &str,
        sorted_label_names: &[String],
        labels: &HashMap<String, String>,
        index: &LabelIndex,
        help: &str,
        buckets: &[f64],
    ) -> Result<prometheus::Histogram> {
        let key = container_key(name, sorted_label_names);
        if !self.core.children.contains_key(&key) {
            if index.metric_conflicts(name, MetricKind::Histogram)
                || index.name_exists(&format!("{}_bucket", name))
            {
                return Err(Error::AlreadyRegistered(name.to_owned()));
            }
            let label_refs: Vec<&str> = sorted_label_names.iter().map(String::as_str).collect();
            let opts = HistogramOpts::new(name, help).buckets(buckets.to_vec());
            let vec = HistogramVec::new(opts, &label_refs).map_err(|source| Error::Registration {
                name: name.to_owned(),
                source,
            })?;
            register_unchecked(&self.core.registry, name, vec.clone())?;
            self.core.children.insert(key.clone(), vec);
        }
        let vec = self.core.children.get(&key).expect("just inserted");
        let values: Vec<&str> = sorted_label_names
            .iter()
            .map(|n| labels.get(n).map(String::as_str).unwrap_or(""))
            .collect();
        let child = vec.with_label_values(&values);
        Ok(child)
    }

    pub fn delete(&mut self, name: &str, sorted_label_names: &[String], labels: &HashMap<String, String>) {
        let key = container_key(name, sorted_label_names);
        if let Some(vec) = self.core.children.get(&key) {
            let values: Vec<&str> = sorted_label_names
                .iter()
                .map(|n| labels.get(n).map(String::as_str).unwrap_or(""))
                .collect();
            if vec.remove_label_values(&values).is_ok() {
                self.core.active_gauge().dec();
            }
        }
    }
}

/// A fixed-capacity reservoir of the most recent observations for one
/// summary child, used to compute quantiles on demand. `prometheus`'s
/// upstream crate has no native Summary collector (only Histogram), so a
/// summary is rendered as three correlated vectors: this reservoir backs
/// the quantile-labeled gauge, while `_sum`/`_count` are plain counters.
struct Reservoir {
    samples: Vec<f64>,
    capacity: usize,
    next: usize,
}

impl Reservoir {
    fn new(capacity: usize) -> Self {
        Reservoir {
            samples: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            self.samples[self.next] = value;
            self.next = (self.next + 1) % self.capacity;
        }
    }

    /// Nearest-rank quantile over the current sample set.
    fn quantile(&self, q: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let rank = ((q * sorted.len() as f64).ceil() as usize)
            .saturating_sub(1)
            .min(sorted.len() - 1);
        sorted[rank]
    }
}

/// A summary is kept as one `GaugeVec` (labeled additionally by
/// `quantile`), one `CounterVec` for `<name>_sum`, and one `IntCounterVec`
/// for `<name>_count` -- plus, per child, a bounded [`Reservoir`] the
/// quantile gauge is recomputed from on every observation.
pub struct SummaryContainer {
    registry: Registry,
    active: IntGaugeVec,
    gauges: HashMap<String, GaugeVec>,
    sums: HashMap<String, CounterVec>,
    counts: HashMap<String, IntCounterVec>,
    reservoirs: HashMap<String, Reservoir>,
}

const RESERVOIR_CAPACITY: usize = 1024;

impl SummaryContainer {
    pub fn new(registry: &Registry, active: IntGaugeVec) -> Self {
        SummaryContainer {
            registry: registry.clone(),
            active,
            gauges: HashMap::new(),
            sums: HashMap::new(),
            counts: HashMap::new(),
            reservoirs: HashMap::new(),
        }
    }

    fn active_gauge(&self) -> IntGauge {
        self.active.with_label_values(&[MetricKind::Summary.as_str()])
    }

    /// Registers (on first use) and observes `value` for the
    /// `(name, sorted_label_names, labels)` child. `quantiles` is only
    /// consulted on first registration -- a series' quantile objectives
    /// are fixed for its lifetime, like its label dimensions.
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &mut self,
        name: &str,
        sorted_label_names: &[String],
        labels: &HashMap<String, String>,
        index: &LabelIndex,
        help: &str,
        quantiles: &[Quantile],
        value: f64,
    ) -> Result<()> {
        let key = container_key(name, sorted_label_names);
        if !self.gauges.contains_key(&key) {
            if index.metric_conflicts(name, MetricKind::Summary)
                || index.name_exists(&format!("{}_sum", name))
                || index.name_exists(&format!("{}_count", name))
            {
                return Err(Error::AlreadyRegistered(name.to_owned()));
            }

            let mut quantile_label_names: Vec<&str> =
                sorted_label_names.iter().map(String::as_str).collect();
            quantile_label_names.push("quantile");

            let gauge_vec = GaugeVec::new(Opts::new(name, help), &quantile_label_names).map_err(|source| {
                Error::Registration {
                    name: name.to_owned(),
                    source,
                }
            })?;
            let plain_label_names: Vec<&str> = sorted_label_names.iter().map(String::as_str).collect();
            let sum_vec = CounterVec::new(
                Opts::new(format!("{}_sum", name), format!("{} (sum)", help)),
                &plain_label_names,
            )
            .map_err(|source| Error::Registration {
                name: format!("{}_sum", name),
                source,
            })?;
            let count_vec = IntCounterVec::new(
                Opts::new(format!("{}_count", name), format!("{} (count)", help)),
                &plain_label_names,
            )
            .map_err(|source| Error::Registration {
                name: format!("{}_count", name),
                source,
            })?;

            register_unchecked(&self.registry, name, gauge_vec.clone())?;
            register_unchecked(&self.registry, &format!("{}_sum", name), sum_vec.clone())?;
            register_unchecked(&self.registry, &format!("{}_count", name), count_vec.clone())?;

            self.gauges.insert(key.clone(), gauge_vec);
            self.sums.insert(key.clone(), sum_vec);
            self.counts.insert(key.clone(), count_vec);
            self.reservoirs.insert(key.clone(), Reservoir::new(RESERVOIR_CAPACITY));
        }

        let plain_values: Vec<&str> = sorted_label_names
            .iter()
            .map(|n| labels.get(n).map(String::as_str).unwrap_or(""))
            .collect();
        self.sums.get(&key).expect("just inserted").with_label_values(&plain_values).inc_by(value);
        self.counts.get(&key).expect("just inserted").with_label_values(&plain_values).inc();

        let reservoir = self.reservoirs.get_mut(&key).expect("just inserted");
        reservoir.observe(value);

        let gauge_vec = self.gauges.get(&key).expect("just inserted");
        for q in quantiles {
            let mut quantile_values = plain_values.clone();
            let formatted = format!("{}", q.quantile);
            quantile_values.push(&formatted);
            gauge_vec
                .with_label_values(&quantile_values)
                .set(reservoir.quantile(q.quantile));
        }

        Ok(())
    }

    pub fn delete(&mut self, name: &str, sorted_label_names: &[String], labels: &HashMap<String, String>) {
        let key = container_key(name, sorted_label_names);
        let plain_values: Vec<&str> = sorted_label_names
            .iter()
            .map(|n| labels.get(n).map(String::as_str).unwrap_or(""))
            .collect();
        let mut removed = false;
        if let Some(vec) = self.sums.get(&key) {
            removed |= vec.remove_label_values(&plain_values).is_ok();
        }
        if let Some(vec) = self.counts.get(&key) {
            removed |= vec.remove_label_values(&plain_values).is_ok();
        }
        self.reservoirs.remove(&key);
        if removed {
            self.active_gauge().dec();
        }
    }

    /// Reads back `(sum, count, quantile_value)` for a child without
    /// observing anything, for assertions only.
    #[cfg(test)]
    pub fn sum_count_and_quantile(
        &self,
        name: &str,
        sorted_label_names: &[String],
        labels: &HashMap<String, String>,
        quantile: f64,
    ) -> (f64, u64, f64) {
        let key = container_key(name, sorted_label_names);
        let plain_values: Vec<&str> = sorted_label_names
            .iter()
            .map(|n| labels.get(n).map(String::as_str).unwrap_or(""))
            .collect();
        let sum = self.sums[&key].with_label_values(&plain_values).get();
        let count = self.counts[&key].with_label_values(&plain_values).get();
        let mut quantile_values = plain_values.clone();
        let formatted = format!("{}", quantile);
        quantile_values.push(&formatted);
        let q = self.gauges[&key].with_label_values(&quantile_values).get();
        (sum, count as u64, q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_gauge() -> IntGaugeVec {
        IntGaugeVec::new(Opts::new("active_metrics_total", "help"), &["kind"]).unwrap()
    }

    #[test]
    fn counter_container_registers_once_per_label_set() {
        let registry = Registry::new();
        let mut container = CounterContainer::new(&registry, active_gauge());
        let index = LabelIndex::new();
        let names = vec!["env".to_string()];
        let mut labels = HashMap::new();
        labels.insert("env".to_string(), "prod".to_string());

        let c = container.get("reqs", &names, &labels, &index, "help").unwrap();
        c.inc();
        assert_eq!(c.get(), 1.0);

        let c2 = container.get("reqs", &names, &labels, &index, "help").unwrap();
        c2.inc();
        assert_eq!(c2.get(), 2.0);
    }

    #[test]
    fn summary_reservoir_computes_nearest_rank_quantile() {
        let mut r = Reservoir::new(16);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            r.observe(v);
        }
        assert_eq!(r.quantile(0.5), 3.0);
        assert_eq!(r.quantile(1.0), 5.0);
    }

    #[test]
    fn histogram_container_observes_into_the_registered_child() {
        let registry = Registry::new();
        let mut container = HistogramContainer::new(&registry, active_gauge());
        let index = LabelIndex::new();
        let names: Vec<String> = Vec::new();
        let labels = HashMap::new();

        let h = container
            .get("lat", &names, &labels, &index, "help", &[0.1, 0.5, 1.0])
            .unwrap();
        h.observe(0.32);
        assert_eq!(h.get_sample_count(), 1);
        assert!((h.get_sample_sum() - 0.32).abs() < 1e-9);
    }

    #[test]
    fn summary_container_observe_updates_sum_count_and_quantile() {
        let registry = Registry::new();
        let mut container = SummaryContainer::new(&registry, active_gauge());
        let index = LabelIndex::new();
        let names: Vec<String> = Vec::new();
        let labels = HashMap::new();
        let quantiles = [Quantile { quantile: 0.5, error: 0.05 }];

        container
            .observe("lat", &names, &labels, &index, "help", &quantiles, 0.32)
            .unwrap();
        container
            .observe("lat", &names, &labels, &index, "help", &quantiles, 0.10)
            .unwrap();

        let (sum, count, q) = container.sum_count_and_quantile("lat", &names, &labels, 0.5);
        assert!((sum - 0.42).abs() < 1e-9);
        assert_eq!(count, 2);
        assert!((q - 0.10).abs() < 1e-9);
    }
}
