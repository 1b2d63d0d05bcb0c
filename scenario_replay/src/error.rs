// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Invalid [`Config`](crate::Config) value, reported before any pass runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Theory test case limit of zero would never let a theory run.
    #[error("theory test case limit must be positive")]
    ZeroTheoryLimit,
    /// Zero pass timeout would fail every pass immediately.
    #[error("pass timeout must be positive")]
    ZeroTimeout,
    /// Target filter must name a sub-test.
    #[error("target filter must not be empty")]
    EmptyTargetFilter,
}

/// Signal returned by [`Interceptor`](crate::Interceptor) operations when the rest of
/// the scenario procedure should not run in the current pass.
///
/// Propagate it with `?`: the interceptor has already recorded everything the
/// result consumer needs to know, so returning it from the procedure is not
/// treated as an additional failure.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Interrupt {
    /// The same sub-test (or the same theory argument) was declared twice in one pass.
    #[error("sub-test {identity:?} was declared more than once in the same pass")]
    DuplicateName {
        /// Display identity of the repeated declaration.
        identity: String,
    },
    /// The targeted sub-test failed.
    #[error("sub-test {identity:?} failed")]
    TargetFailed {
        /// Display identity of the failed sub-test.
        identity: String,
    },
    /// A shared prerequisite failed, so nothing after it can be trusted.
    #[error("shared sub-test {name:?} failed, pass aborted")]
    SharedFailed {
        /// Name of the failed shared sub-test.
        name: String,
    },
    /// The target has concluded and [`ExecutionPolicy::EndAfterConclusion`](crate::ExecutionPolicy::EndAfterConclusion)
    /// asks for the pass to end.
    #[error("target concluded, pass ended early")]
    Concluded,
}

/// Result consumer no longer accepts events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("result sink is closed")]
pub struct SinkClosed;
