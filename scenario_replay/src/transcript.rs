// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::{cmp::Reverse, time::Duration};

use crate::{Arg, Failure};

pub(crate) const NO_APPLICABLE_TESTS: &str = "No applicable tests were able to run";

/// What happened to a sub-test, as seen by the result consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The sub-test started.
    Starting,
    /// The sub-test passed.
    Passed,
    /// The sub-test failed.
    Failed(Failure),
    /// The sub-test was skipped, with a reason.
    Skipped(String),
    /// The sub-test finished; always the last event for an identity in a pass.
    Finished,
}

impl EventKind {
    /// Whether this is a `Passed`, `Failed` or `Skipped` event.
    #[must_use]
    pub fn is_outcome(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed(_) | Self::Skipped(_))
    }
}

/// One result event forwarded to a [`ResultSink`](crate::ResultSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEvent {
    /// `"<name>"`, or `"<name> (<argument>)"` for a theory variant.
    pub identity: String,
    /// What happened.
    pub kind: EventKind,
    /// Wall-clock time of the pass that produced the event.
    pub duration: Duration,
    /// Output captured for the sub-test (attached to the outcome event only).
    pub output: String,
}

pub(crate) fn identity(name: &str, argument: Option<&Arg>) -> String {
    match argument {
        Some(arg) => format!("{name} ({arg})"),
        None => name.to_owned(),
    }
}

// Provisional identity of a raw event, before the pass knows what it has produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Origin {
    Target,
    Pass,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawEvent {
    pub origin: Origin,
    pub kind: EventKind,
    pub output: String,
}

#[derive(Debug, Default)]
pub(crate) struct Transcript {
    events: Vec<RawEvent>,
}

impl Transcript {
    pub(crate) fn push(&mut self, origin: Origin, kind: EventKind, output: String) {
        self.events.push(RawEvent {
            origin,
            kind,
            output,
        });
    }

    pub(crate) fn into_events(self) -> Vec<RawEvent> {
        self.events
    }
}

#[derive(Debug)]
pub(crate) struct FinalizeContext<'a> {
    pub target: &'a str,
    pub argument: Option<&'a Arg>,
    pub skipped_reason: Option<&'a str>,
    pub elapsed: Duration,
}

// Rank of an outcome in the precedence order: skip beats failure beats success.
fn precedence(kind: &EventKind) -> Option<u8> {
    match kind {
        EventKind::Skipped(_) => Some(2),
        EventKind::Failed(_) => Some(1),
        EventKind::Passed => Some(0),
        EventKind::Starting | EventKind::Finished => None,
    }
}

/// Turn the raw events of one pass into what the result consumer sees:
/// one `Starting`, one outcome and one `Finished` event for the target identity,
/// in that order.
pub(crate) fn finalize(raw: Vec<RawEvent>, ctx: &FinalizeContext<'_>) -> Vec<ResultEvent> {
    // Other sub-tests are reported by their own cycles.
    let mut events: Vec<RawEvent> = raw
        .into_iter()
        .filter(|e| !matches!(e.origin, Origin::Other(_)))
        .collect();

    if !events.iter().any(|e| e.kind.is_outcome()) {
        let reason = ctx.skipped_reason.unwrap_or(NO_APPLICABLE_TESTS);
        events.push(RawEvent {
            origin: Origin::Pass,
            kind: EventKind::Skipped(reason.to_owned()),
            output: String::new(),
        });
    }

    // Of the outcomes with the highest precedence, the first one wins.
    let winner = events
        .iter()
        .enumerate()
        .filter_map(|(ix, e)| precedence(&e.kind).map(|p| (p, Reverse(ix))))
        .max()
        .map(|(_, Reverse(ix))| ix);
    let first_starting = events.iter().position(|e| e.kind == EventKind::Starting);
    let last_finished = events.iter().rposition(|e| e.kind == EventKind::Finished);

    // Output of suppressed outcomes is kept, in the order it was written.
    let mut output = String::new();
    let mut outcome = None;
    for (ix, e) in events.into_iter().enumerate() {
        let ix = Some(ix);
        if e.kind.is_outcome() || ix == first_starting || ix == last_finished {
            output.push_str(&e.output);
        }
        if ix == winner {
            outcome = Some(e.kind);
        }
    }
    let outcome = outcome.unwrap_or_else(|| EventKind::Skipped(NO_APPLICABLE_TESTS.to_owned()));

    let identity = identity(ctx.target, ctx.argument);
    [
        (EventKind::Starting, String::new()),
        (outcome, output),
        (EventKind::Finished, String::new()),
    ]
    .into_iter()
    .map(|(kind, output)| ResultEvent {
        identity: identity.clone(),
        kind,
        duration: ctx.elapsed,
        output,
    })
    .collect()
}
