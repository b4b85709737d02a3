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

use lazy_static::lazy_static;
use prometheus::Registry;

lazy_static! {
    /// A process-wide `Registry` for tests and simple single-binary
    /// embedders that would rather not thread a `Registry` through their
    /// own wiring. Mirrors the teacher library's own default-registry
    /// convenience functions; real deployments are still expected to
    /// construct and inject their own `Registry` (see [`crate::handler::EventHandler::new`]).
    pub static ref DEFAULT_REGISTRY: Registry = Registry::new();
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_REGISTRY;

    #[test]
    fn default_registry_starts_empty() {
        assert!(DEFAULT_REGISTRY.gather().is_empty());
    }
}
