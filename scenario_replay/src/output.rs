// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use alloc::sync::Arc;
use core::fmt::{Display, Write as _};

use parking_lot::Mutex;

/// Output captured while a scenario pass runs.
///
/// Obtain one with [`Interceptor::output`](crate::Interceptor::output) and move clones
/// of it into sub-test bodies. Lines written while a sub-test runs are attached to
/// that sub-test's outcome.
#[derive(Debug, Clone, Default)]
pub struct TestOutput {
    buf: Arc<Mutex<String>>,
}

impl TestOutput {
    /// Append one line of output.
    pub fn line(&self, line: impl Display) {
        let mut buf = self.buf.lock();
        // Writing into a `String` can not fail.
        let _ = writeln!(buf, "{line}");
    }

    /// Everything written during the pass so far.
    #[must_use]
    pub fn contents(&self) -> String {
        self.buf.lock().clone()
    }

    pub(crate) fn mark(&self) -> usize {
        self.buf.lock().len()
    }

    pub(crate) fn since(&self, mark: usize) -> String {
        self.buf.lock().get(mark..).unwrap_or_default().to_owned()
    }
}
