// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::{debug, error, info, trace};
use tokio::sync::mpsc::UnboundedSender;

use crate::{EventKind, Failure, ResultEvent, SinkClosed};

/// Consumer of finalized result events.
pub trait ResultSink {
    /// Accept one event.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] when the consumer no longer accepts events; the run
    /// stops as soon as this happens.
    fn forward(&mut self, event: ResultEvent) -> Result<(), SinkClosed>;
}

impl ResultSink for Vec<ResultEvent> {
    fn forward(&mut self, event: ResultEvent) -> Result<(), SinkClosed> {
        self.push(event);
        Ok(())
    }
}

impl ResultSink for UnboundedSender<ResultEvent> {
    fn forward(&mut self, event: ResultEvent) -> Result<(), SinkClosed> {
        self.send(event).map_err(|_| SinkClosed)
    }
}

/// Sink that writes every event to the `log` facade and keeps the failures.
#[derive(Debug, Default)]
pub struct LogSink {
    failures: Vec<(String, Failure)>,
}

impl LogSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities and failures of every failed outcome seen so far.
    #[must_use]
    pub fn failures(&self) -> &[(String, Failure)] {
        &self.failures
    }
}

impl ResultSink for LogSink {
    fn forward(&mut self, event: ResultEvent) -> Result<(), SinkClosed> {
        let ResultEvent {
            identity,
            kind,
            duration,
            output,
        } = event;
        match kind {
            EventKind::Starting => trace!("{identity}: starting"),
            EventKind::Finished => trace!("{identity}: finished"),
            EventKind::Passed => info!("{identity}: passed in {duration:?}"),
            EventKind::Skipped(reason) => info!("{identity}: skipped ({reason})"),
            EventKind::Failed(failure) => {
                error!("{identity}: failed in {duration:?}: {failure}");
                self.failures.push((identity.clone(), failure));
            }
        }
        if !output.is_empty() {
            debug!("{identity}: output:\n{}", output.trim_end());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use tokio::sync::mpsc;

    use super::{LogSink, ResultSink as _};
    use crate::{EventKind, Failure, ResultEvent, SinkClosed};

    fn event(identity: &str, kind: EventKind) -> ResultEvent {
        ResultEvent {
            identity: identity.to_owned(),
            kind,
            duration: Duration::ZERO,
            output: String::new(),
        }
    }

    #[test]
    fn channel_sink_rejects_after_receiver_drop() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(tx.forward(event("a", EventKind::Passed)), Ok(()));
        assert_eq!(rx.try_recv().map(|e| e.identity), Ok("a".to_owned()));
        drop(rx);
        assert_eq!(tx.forward(event("b", EventKind::Passed)), Err(SinkClosed));
    }

    #[test]
    fn log_sink_keeps_failures_only() {
        let mut sink = LogSink::new();
        for e in [
            event("a", EventKind::Starting),
            event("a", EventKind::Passed),
            event("b (2)", EventKind::Failed(Failure::new("2 is even"))),
            event("c", EventKind::Skipped("later".to_owned())),
        ] {
            assert_eq!(sink.forward(e), Ok(()));
        }
        assert_eq!(
            sink.failures(),
            [("b (2)".to_owned(), Failure::new("2 is even"))]
        );
    }
}
