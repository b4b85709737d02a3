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
use std::hash::Hasher;

use fnv::FnvHasher;

/// Separates fields in the canonical byte sequence hashed for a series'
/// identity. Chosen, like the rest of this crate's metric plumbing, to
/// never collide with a legal metric/label-name byte.
pub const SEPARATOR_BYTE: u8 = 0xFF;

/// Computes the FNV-1a/64 hash of a (name, sorted label names, label
/// values) triple, reusing one scratch buffer across calls. The core's
/// event handler owns exactly one `LabelHasher` -- it is single-writer
/// state (see the concurrency design notes), not a process-wide global,
/// so reuse here never requires synchronization.
#[derive(Debug, Default)]
pub struct LabelHasher {
    scratch: Vec<u8>,
}

impl LabelHasher {
    pub fn new() -> Self {
        Self {
            scratch: Vec::with_capacity(256),
        }
    }

    /// `sorted_label_names` must already be sorted; this function does not
    /// sort them itself so callers can reuse a sort done once for the
    /// container lookup key.
    pub fn hash(
        &mut self,
        name: &str,
        sorted_label_names: &[String],
        labels: &HashMap<String, String>,
    ) -> u64 {
        self.scratch.clear();
        self.scratch.extend_from_slice(name.as_bytes());
        self.scratch.push(SEPARATOR_BYTE);

        for label_name in sorted_label_names {
            self.scratch.extend_from_slice(label_name.as_bytes());
            self.scratch.push(SEPARATOR_BYTE);
            if let Some(value) = labels.get(label_name) {
                self.scratch.extend_from_slice(value.as_bytes());
            }
            self.scratch.push(SEPARATOR_BYTE);
        }

        let mut hasher = FnvHasher::default();
        hasher.write(&self.scratch);
        hasher.finish()
    }
}
