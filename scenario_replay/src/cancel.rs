// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::future::pending;

use tokio::sync::watch;

/// Create a connected cancellation handle and token.
///
/// Give the [`Cancellation`] token to [`Runner::with_cancellation`](crate::Runner::with_cancellation)
/// and keep the [`CancelHandle`] to stop the run from elsewhere.
#[must_use]
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

/// Requests cancellation of a run.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the run. The pass in progress is interrupted and reported as skipped.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes cancellation requested through a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    // Never resolves when the handle is dropped without cancelling.
    pub(crate) async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            pending::<()>().await;
        }
    }
}
