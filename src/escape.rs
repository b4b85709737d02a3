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

/// Rewrites `s` so it is a legal Prometheus metric/label name:
/// `[A-Za-z0-9_]` passes through unchanged, everything else becomes `_`,
/// and a leading digit gets a `_` prepended. Applied to both metric names
/// and tag keys. Idempotent: escaping an already-escaped string is a no-op.
pub fn escape_metric_name(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(s.len() + 1);
    let mut chars = s.chars();
    let first = chars.next().expect("checked non-empty above");

    if first.is_ascii_digit() {
        out.push('_');
    }
    out.push(escape_char(first));
    for c in chars {
        out.push(escape_char(c));
    }
    out
}

fn escape_char(c: char) -> char {
    if c.is_ascii_alphanumeric() || c == '_' {
        c
    } else {
        '_'
    }
}

#[cfg(test)]
mod tests {
    use super::escape_metric_name;

    #[test]
    fn passes_through_legal_names() {
        assert_eq!(escape_metric_name("foo_bar"), "foo_bar");
        assert_eq!(escape_metric_name("Foo123"), "Foo123");
    }

    #[test]
    fn replaces_illegal_runes() {
        assert_eq!(escape_metric_name("foo.bar-baz"), "foo_bar_baz");
        assert_eq!(escape_metric_name("az:eu"), "az_eu");
    }

    #[test]
    fn prepends_underscore_to_leading_digit() {
        assert_eq!(escape_metric_name("1bad-name"), "_1bad_name");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(escape_metric_name(""), "");
    }

    #[test]
    fn is_idempotent() {
        for input in ["1bad-name", "foo.bar", "plain_name", "", "__42"] {
            let once = escape_metric_name(input);
            let twice = escape_metric_name(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn result_matches_expected_shape() {
        for input in ["1bad-name", "foo.bar", "", "$$$", "a"] {
            let escaped = escape_metric_name(input);
            if escaped.is_empty() {
                continue;
            }
            let mut chars = escaped.chars();
            let first = chars.next().unwrap();
            assert!(first.is_ascii_alphabetic() || first == '_');
            assert!(chars.all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }
}
