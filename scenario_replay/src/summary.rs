// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt::{self, Display};

use crate::{EventKind, ResultEvent};

/// The single counted contribution of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The target passed.
    Passed,
    /// The target or the pass as a whole failed.
    Failed,
    /// The target was skipped.
    Skipped,
}

impl Outcome {
    /// Outcome of a finalized pass transcript (first outcome event wins).
    #[must_use]
    pub fn of(events: &[ResultEvent]) -> Option<Self> {
        events.iter().find_map(|e| match e.kind {
            EventKind::Passed => Some(Self::Passed),
            EventKind::Failed(_) => Some(Self::Failed),
            EventKind::Skipped(_) => Some(Self::Skipped),
            EventKind::Starting | EventKind::Finished => None,
        })
    }
}

/// Counts of pass outcomes for one scenario-target cycle, or for several merged cycles.
#[must_use]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    total: usize,
    failed: usize,
    skipped: usize,
}

impl RunSummary {
    /// Count one more pass outcome.
    pub fn absorb(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Passed => {}
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }

    /// Add the counts of another summary.
    pub fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// Number of counted outcomes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of passed outcomes.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.total - self.failed - self.skipped
    }

    /// Number of failed outcomes.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Number of skipped outcomes.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Whether nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} passed, {} failed, {} skipped",
            self.total,
            self.passed(),
            self.failed,
            self.skipped
        )
    }
}
