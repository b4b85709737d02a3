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

use tracing::trace;

use crate::error::ErrorReason;
use crate::escape::escape_metric_name;
use crate::event::Event;
use crate::self_metrics::SelfMetrics;

/// Turns raw, newline-delimited StatsD/DogStatsD datagrams into typed
/// [`Event`]s. Malformed input is never raised as an error -- it is
/// counted on `metrics` and dropped, per the design's "fire and forget"
/// error handling stance.
#[derive(Debug, Default)]
pub struct LineParser;

impl LineParser {
    pub fn new() -> Self {
        LineParser
    }

    /// Parses one line (without its terminator). `line` is raw bytes
    /// because invalid UTF-8 is itself a `malformed_line` condition, not
    /// a panic or an `Err`.
    pub fn parse(&self, line: &[u8], metrics: &SelfMetrics) -> Vec<Event> {
        metrics.lines_total.inc();

        let line = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => {
                metrics.record_sample_error(ErrorReason::MalformedLine);
                return Vec::new();
            }
        };

        let colon = match memchr::memchr(b':', line.as_bytes()) {
            Some(i) => i,
            None => {
                metrics.record_sample_error(ErrorReason::MalformedLine);
                return Vec::new();
            }
        };

        let name = &line[..colon];
        let body = &line[colon + 1..];
        if name.is_empty() {
            metrics.record_sample_error(ErrorReason::MalformedLine);
            return Vec::new();
        }
        let name = escape_metric_name(name);

        // DogStatsD tag values may themselves contain ':' -- once `|#`
        // shows up anywhere in the body, the whole body is one sample and
        // multi-sample splitting on ':' is disabled. See the open question
        // in the design notes: this is about preserving *that* observable
        // behavior, regardless of how any prior implementation expressed it.
        let samples: Vec<&str> = if memchr::memmem::find(body.as_bytes(), b"|#").is_some() {
            vec![body]
        } else {
            body.split(':').collect()
        };

        let mut events = Vec::new();
        for sample in samples {
            self.parse_sample(&name, sample, metrics, &mut events);
        }
        events
    }

    fn parse_sample(
        &self,
        name: &str,
        sample: &str,
        metrics: &SelfMetrics,
        out: &mut Vec<Event>,
    ) {
        metrics.samples_total.inc();

        let parts: Vec<&str> = sample.split('|').collect();
        if parts.len() < 2 || parts.len() > 4 {
            metrics.record_sample_error(ErrorReason::MalformedComponent);
            return;
        }

        let value_str = parts[0];
        let type_str = parts[1];

        let mut sampling_component = None;
        let mut tags_component = None;
        for component in &parts[2..] {
            if component.is_empty() {
                metrics.record_sample_error(ErrorReason::MalformedComponent);
                return;
            } else if component.starts_with('@') {
                if sampling_component.is_some() {
                    metrics.record_sample_error(ErrorReason::MalformedComponent);
                    return;
                }
                sampling_component = Some(*component);
            } else if component.starts_with('#') {
                if tags_component.is_some() {
                    metrics.record_sample_error(ErrorReason::MalformedComponent);
                    return;
                }
                tags_component = Some(*component);
            } else {
                metrics.record_sample_error(ErrorReason::MalformedComponent);
                return;
            }
        }

        let relative = matches!(value_str.as_bytes().first(), Some(b'+') | Some(b'-'));
        let value: f64 = match value_str.parse() {
            Ok(v) if v.is_finite() => v,
            _ => {
                metrics.record_sample_error(ErrorReason::MalformedValue);
                return;
            }
        };

        if type_str == "s" {
            trace!(%name, "sets are unsupported, dropping sample");
            metrics.record_sample_error(ErrorReason::IllegalEvent);
            return;
        }
        if !matches!(type_str, "c" | "g" | "ms" | "h" | "d") {
            metrics.record_sample_error(ErrorReason::IllegalEvent);
            return;
        }

        let sampling = match sampling_component {
            None => 1.0,
            Some(raw) => match raw[1..].parse::<f64>() {
                Ok(f) => {
                    if f == 0.0 {
                        1.0
                    } else {
                        f
                    }
                }
                Err(_) => {
                    metrics.record_sample_error(ErrorReason::InvalidSampleFactor);
                    1.0
                }
            },
        };

        let labels = match tags_component {
            None => HashMap::new(),
            Some(raw) => self.parse_tags(raw, metrics),
        };

        match type_str {
            "c" => {
                if sampling != 1.0 {
                    out.push(Event::Counter {
                        name: name.to_owned(),
                        delta: value / sampling,
                        labels,
                    });
                } else {
                    out.push(Event::Counter {
                        name: name.to_owned(),
                        delta: value,
                        labels,
                    });
                }
            }
            "g" => {
                if sampling != 1.0 {
                    metrics.record_sample_error(ErrorReason::IllegalSampleFactor);
                }
                out.push(Event::Gauge {
                    name: name.to_owned(),
                    value,
                    relative,
                    labels,
                });
            }
            "ms" => {
                let copies = if sampling != 1.0 {
                    (1.0 / sampling).round().max(1.0) as usize
                } else {
                    1
                };
                for _ in 0..copies {
                    out.push(Event::Timer {
                        name: name.to_owned(),
                        value_ms: value,
                        labels: labels.clone(),
                    });
                }
            }
            "h" | "d" => {
                if sampling != 1.0 {
                    metrics.record_sample_error(ErrorReason::IllegalSampleFactor);
                }
                out.push(Event::Timer {
                    name: name.to_owned(),
                    value_ms: value,
                    labels,
                });
            }
            _ => unreachable!("type_str was validated above"),
        }
    }

    fn parse_tags(&self, raw: &str, metrics: &SelfMetrics) -> HashMap<String, String> {
        // A leading '#' is only ever tolerated on the whole component
        // (`raw` here), already implied by the caller having matched on
        // `starts_with('#')`; individual entries never carry it.
        let body = &raw[1..];
        let mut labels = HashMap::new();
        for chunk in body.split(',') {
            if chunk.is_empty() {
                metrics.tag_parse_errors_total.inc();
                continue;
            }
            match chunk.find(':') {
                None => {
                    metrics.tag_parse_errors_total.inc();
                }
                Some(idx) => {
                    let (key, value) = (&chunk[..idx], &chunk[idx + 1..]);
                    if key.is_empty() || value.is_empty() {
                        metrics.tag_parse_errors_total.inc();
                        continue;
                    }
                    labels.insert(escape_metric_name(key), value.to_owned());
                }
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    fn metrics() -> SelfMetrics {
        SelfMetrics::new(&Registry::new()).unwrap()
    }

    #[test]
    fn simple_counter() {
        let m = metrics();
        let events = LineParser::new().parse(b"foo:1|c", &m);
        assert_eq!(
            events,
            vec![Event::Counter {
                name: "foo".into(),
                delta: 1.0,
                labels: HashMap::new()
            }]
        );
    }

    #[test]
    fn sampled_counter_scales_up() {
        let m = metrics();
        let events = LineParser::new().parse(b"foo:1|c|@0.1", &m);
        assert_eq!(
            events,
            vec![Event::Counter {
                name: "foo".into(),
                delta: 10.0,
                labels: HashMap::new()
            }]
        );
    }

    #[test]
    fn zero_sampling_rate_treated_as_one() {
        let m = metrics();
        let events = LineParser::new().parse(b"foo:2|c|@0", &m);
        assert_eq!(events[0], Event::Counter {
            name: "foo".into(),
            delta: 2.0,
            labels: HashMap::new(),
        });
    }

    #[test]
    fn timer_sampling_duplicates_events() {
        let m = metrics();
        let events = LineParser::new().parse(b"glork:320|ms|@0.1", &m);
        assert_eq!(events.len(), 10);
        assert!(events
            .iter()
            .all(|e| *e == Event::Timer { name: "glork".into(), value_ms: 320.0, labels: HashMap::new() }));
    }

    #[test]
    fn tagged_counter_sorts_nothing_but_parses_all_tags() {
        let m = metrics();
        let events = LineParser::new().parse(b"req:1|c|#env:prod,az:eu", &m);
        let mut expected = HashMap::new();
        expected.insert("env".to_string(), "prod".to_string());
        expected.insert("az".to_string(), "eu".to_string());
        assert_eq!(
            events,
            vec![Event::Counter {
                name: "req".into(),
                delta: 1.0,
                labels: expected
            }]
        );
    }

    #[test]
    fn gauge_relative_and_absolute() {
        let m = metrics();
        let events = LineParser::new().parse(b"gg:+4|g", &m);
        assert_eq!(
            events,
            vec![Event::Gauge {
                name: "gg".into(),
                value: 4.0,
                relative: true,
                labels: HashMap::new()
            }]
        );

        let events = LineParser::new().parse(b"gg:7|g", &m);
        assert_eq!(
            events,
            vec![Event::Gauge {
                name: "gg".into(),
                value: 7.0,
                relative: false,
                labels: HashMap::new()
            }]
        );
    }

    #[test]
    fn escapes_illegal_metric_names() {
        let m = metrics();
        let events = LineParser::new().parse(b"1bad-name:1|c", &m);
        assert_eq!(events[0].name(), "_1bad_name");
    }

    #[test]
    fn sets_are_dropped() {
        let m = metrics();
        let events = LineParser::new().parse(b"s1:1|s", &m);
        assert!(events.is_empty());
        assert_eq!(
            m.sample_errors_total
                .with_label_values(&["illegal_event"])
                .get(),
            1
        );
    }

    #[test]
    fn multi_sample_line_without_tags_splits_on_colon() {
        let m = metrics();
        let events = LineParser::new().parse(b"m:1|c:2|c:3|c", &m);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn dogstatsd_tags_disable_multi_sample_splitting() {
        let m = metrics();
        let events = LineParser::new().parse(b"m:1|c|#t:v", &m);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn malformed_component_counts_are_dropped() {
        let m = metrics();
        let events = LineParser::new().parse(b"foo:1", &m);
        assert!(events.is_empty());
        let events = LineParser::new().parse(b"foo:1|c|@0.5|#a:b|extra", &m);
        assert!(events.is_empty());
    }

    #[test]
    fn empty_trailing_component_is_malformed() {
        let m = metrics();
        let events = LineParser::new().parse(b"foo:1|c|", &m);
        assert!(events.is_empty());
        assert_eq!(
            m.sample_errors_total
                .with_label_values(&["malformed_component"])
                .get(),
            1
        );
    }

    #[test]
    fn non_finite_value_is_malformed() {
        let m = metrics();
        let events = LineParser::new().parse(b"foo:notanumber|c", &m);
        assert!(events.is_empty());
    }

    #[test]
    fn empty_and_colonless_tags_are_individually_dropped() {
        let m = metrics();
        let events = LineParser::new().parse(b"foo:1|c|#,a:b,novalue:,:empty", &m);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].labels().len(), 1);
        assert!(m.tag_parse_errors_total.get() >= 3);
    }
}
