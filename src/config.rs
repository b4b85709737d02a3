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

use std::time::Duration;

use serde::Deserialize;

/// Which underlying vector kind a `ms`/`h`/`d` sample is rendered as when
/// the mapping doesn't say otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerRendering {
    Summary,
    Histogram,
}

/// The mapper's global `Defaults` block (see the mapper contract). Every
/// field is optional in the source document; a mapping rule's own,
/// more-specific setting always wins, and these only fill gaps left by
/// both the rule and [`Defaults::default`]'s hard-coded fallback.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub ttl: Option<Duration>,
    pub timer_type: Option<TimerRendering>,
    pub quantiles: Option<Vec<Quantile>>,
    pub buckets: Option<Vec<f64>>,
    pub help: Option<String>,
}

/// A single `{quantile -> allowed_error}` entry for a summary.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Quantile {
    pub quantile: f64,
    pub error: f64,
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults {
            ttl: None,
            timer_type: None,
            quantiles: None,
            buckets: None,
            help: None,
        }
    }
}

impl Defaults {
    /// Resolves the timer rendering for a sample given an optional,
    /// mapping-level override. Final fallback is `Summary`, per the event
    /// handler's dispatch rule.
    pub fn resolve_timer_type(&self, mapping_override: Option<TimerRendering>) -> TimerRendering {
        mapping_override
            .or(self.timer_type)
            .unwrap_or(TimerRendering::Summary)
    }

    pub fn resolve_ttl(&self, mapping_override: Option<Duration>) -> Duration {
        mapping_override.or(self.ttl).unwrap_or(Duration::ZERO)
    }

    pub fn resolve_help(&self, mapping_override: Option<&str>) -> String {
        mapping_override
            .map(str::to_owned)
            .or_else(|| self.help.clone())
            .unwrap_or_else(|| "Metric autogenerated by the statsd bridge.".to_owned())
    }

    /// Summary quantile objectives, honoring the precedence in the
    /// summary container design: mapping's explicit list, then these
    /// global defaults, then the hard-coded fallback -- which only
    /// applies when *no* mapper defaults exist either.
    pub fn resolve_quantiles(&self, mapping_override: Option<&[Quantile]>) -> Vec<Quantile> {
        if let Some(q) = mapping_override {
            return q.to_vec();
        }
        if let Some(q) = &self.quantiles {
            return q.clone();
        }
        DEFAULT_QUANTILES.to_vec()
    }

    pub fn resolve_buckets(&self, mapping_override: Option<&[f64]>) -> Vec<f64> {
        if let Some(b) = mapping_override {
            return b.to_vec();
        }
        if let Some(b) = &self.buckets {
            return b.clone();
        }
        DEFAULT_BUCKETS.to_vec()
    }
}

/// Hard-coded fallback objectives, used only when neither the mapping nor
/// the mapper's own defaults specify any.
pub const DEFAULT_QUANTILES: &[Quantile] = &[
    Quantile {
        quantile: 0.5,
        error: 0.05,
    },
    Quantile {
        quantile: 0.9,
        error: 0.01,
    },
    Quantile {
        quantile: 0.99,
        error: 0.001,
    },
];

/// Mirrors `prometheus::DEFAULT_BUCKETS` (the teacher library's own
/// default histogram ladder) so a histogram left unconfigured by both the
/// mapping and the mapper's defaults still gets sane boundaries.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_hard_coded_quantiles() {
        let d = Defaults::default();
        assert_eq!(d.resolve_quantiles(None), DEFAULT_QUANTILES.to_vec());
    }

    #[test]
    fn mapper_defaults_beat_hard_coded_fallback() {
        let mut d = Defaults::default();
        d.quantiles = Some(vec![Quantile {
            quantile: 0.75,
            error: 0.02,
        }]);
        assert_eq!(
            d.resolve_quantiles(None),
            vec![Quantile {
                quantile: 0.75,
                error: 0.02
            }]
        );
    }

    #[test]
    fn mapping_override_beats_everything() {
        let mut d = Defaults::default();
        d.quantiles = Some(vec![Quantile {
            quantile: 0.75,
            error: 0.02,
        }]);
        let mapping_q = [Quantile {
            quantile: 0.99,
            error: 0.001,
        }];
        assert_eq!(d.resolve_quantiles(Some(&mapping_q)), mapping_q.to_vec());
    }

    #[test]
    fn timer_type_final_fallback_is_summary() {
        let d = Defaults::default();
        assert_eq!(d.resolve_timer_type(None), TimerRendering::Summary);
    }
}
