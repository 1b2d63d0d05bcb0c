// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt::{self, Display};

use crate::unwind::PanicInfo;

/// Description of a failed sub-test or pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Top-level failure message.
    pub message: String,
    /// Underlying causes, outermost first (empty for panics).
    pub chain: Vec<String>,
    /// `file:line:column` of the panic, when the failure was a panic.
    pub location: Option<String>,
}

impl Failure {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            chain: Vec::new(),
            location: None,
        }
    }

    pub(crate) fn from_panic(info: PanicInfo) -> Self {
        let location = info.location();
        Self {
            message: info.message,
            chain: Vec::new(),
            location,
        }
    }

    pub(crate) fn from_error(err: &anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            chain: err.chain().skip(1).map(ToString::to_string).collect(),
            location: None,
        }
    }

    pub(crate) fn context(self, message: &str) -> Self {
        Self {
            message: format!("{message}: {}", self.message),
            ..self
        }
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (at {location})")?;
        }
        for cause in &self.chain {
            write!(f, "\n  caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Value a sub-test (or a whole scenario procedure) finishes with.
///
/// Panics are failures too; this trait only covers the values returned normally.
pub trait Conclusion {
    /// Convert into `Ok(())` for success or the error describing the failure.
    ///
    /// # Errors
    ///
    /// Returns the failure carried by the value.
    fn into_result(self) -> anyhow::Result<()>;
}

impl Conclusion for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E: Into<anyhow::Error>> Conclusion for Result<(), E> {
    fn into_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}
