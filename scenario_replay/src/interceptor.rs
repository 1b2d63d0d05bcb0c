// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::{fmt::Debug, hash::Hash};

use indexmap::{IndexMap, IndexSet, map::Entry};
use log::trace;

use crate::{
    Arg, ArgumentLedger, Conclusion, EventKind, ExecutionPolicy, Failure, Interrupt,
    ScenarioConfig, TestOutput,
    transcript::{Origin, RawEvent, Transcript, identity},
    unwind::catch_silent,
};

/// Kind of a sub-test occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubTest {
    /// Plain sub-test.
    Fact,
    /// Parameterized sub-test variant, identified by its name and argument.
    Theory(Arg),
    /// Prerequisite that runs in every pass that reaches it.
    Shared,
}

impl SubTest {
    /// Theory variant with the given argument.
    pub fn theory<T: Debug + Eq + Hash + Send + Sync + 'static>(argument: T) -> Self {
        Self::Theory(Arg::new(argument))
    }

    /// Theory argument, if any.
    #[must_use]
    pub fn argument(&self) -> Option<&Arg> {
        match self {
            Self::Theory(arg) => Some(arg),
            Self::Fact | Self::Shared => None,
        }
    }

    /// Whether this is a shared prerequisite.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared)
    }
}

#[derive(Debug, Default)]
pub(crate) struct PassState {
    pub skip_additional: bool,
    pub target_recorded: bool,
    pub captured_argument: Option<Arg>,
    pub pending_restart: bool,
    pub conclusive: bool,
    pub halted: Option<Interrupt>,
}

#[derive(Debug)]
enum Declared {
    Plain,
    Shared,
    Theory(IndexSet<Arg>),
}

/// Everything a finished pass leaves behind.
#[derive(Debug)]
pub(crate) struct PassReport {
    pub ledger: ArgumentLedger,
    pub state: PassState,
    pub events: Vec<RawEvent>,
    // Targets for later cycles; shared prerequisites are left out.
    pub declared: Vec<String>,
    pub skipped_reason: Option<String>,
}

/// Handle through which a scenario procedure declares its sub-tests.
///
/// A fresh interceptor is passed to every pass. Each declaration either runs the
/// sub-test (it is the target of the pass, or shared, or isolation is disabled)
/// or elides it, leaving it for a later pass.
///
/// Declaration methods return `Err(Interrupt)` when the rest of the procedure should
/// not run; propagate it with `?`.
#[derive(Debug)]
pub struct Interceptor {
    target: Option<String>,
    config: ScenarioConfig,
    ledger: ArgumentLedger,
    state: PassState,
    transcript: Transcript,
    declared: IndexMap<String, Declared>,
    output: TestOutput,
    output_mark: usize,
    skipped_reason: Option<String>,
}

impl Interceptor {
    pub(crate) fn new(
        target: Option<&str>,
        config: ScenarioConfig,
        ledger: ArgumentLedger,
    ) -> Self {
        Self {
            target: target.map(str::to_owned),
            config,
            ledger,
            state: PassState::default(),
            transcript: Transcript::default(),
            declared: IndexMap::new(),
            output: TestOutput::default(),
            output_mark: 0,
            skipped_reason: None,
        }
    }

    /// Name of the sub-test this pass is run for, if any.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Settings of the cycle this pass belongs to.
    #[must_use]
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Theory arguments of the target tested so far, this pass included.
    #[must_use]
    pub fn tested_arguments(&self) -> &ArgumentLedger {
        &self.ledger
    }

    /// Whether the target has already run in this pass.
    #[must_use]
    pub fn is_conclusive(&self) -> bool {
        self.state.conclusive
    }

    /// Handle for writing output that is attached to the running sub-test's outcome.
    #[must_use]
    pub fn output(&self) -> TestOutput {
        self.output.clone()
    }

    /// Reason reported when the pass ends without running its target.
    #[must_use]
    pub fn skipped_reason(&self) -> Option<&str> {
        self.skipped_reason.as_deref()
    }

    /// Set the reason reported when the pass ends without running its target.
    pub fn set_skipped_reason(&mut self, reason: impl Into<String>) {
        self.skipped_reason = Some(reason.into());
    }

    /// Declare a plain sub-test. See [`Interceptor::declare`].
    ///
    /// # Errors
    ///
    /// See [`Interceptor::declare`].
    pub async fn fact<R: Conclusion>(
        &mut self,
        name: &str,
        invocation: impl Future<Output = R>,
    ) -> Result<(), Interrupt> {
        self.declare(name, SubTest::Fact, invocation).await
    }

    /// Declare one variant of a theory. See [`Interceptor::declare`].
    ///
    /// # Errors
    ///
    /// See [`Interceptor::declare`].
    pub async fn theory<T, R>(
        &mut self,
        name: &str,
        argument: T,
        invocation: impl Future<Output = R>,
    ) -> Result<(), Interrupt>
    where
        T: Debug + Eq + Hash + Send + Sync + 'static,
        R: Conclusion,
    {
        self.declare(name, SubTest::theory(argument), invocation).await
    }

    /// Declare a shared prerequisite. See [`Interceptor::declare`].
    ///
    /// # Errors
    ///
    /// See [`Interceptor::declare`].
    pub async fn shared<R: Conclusion>(
        &mut self,
        name: &str,
        invocation: impl Future<Output = R>,
    ) -> Result<(), Interrupt> {
        self.declare(name, SubTest::Shared, invocation).await
    }

    /// Declare a sub-test occurrence and run it if this pass should.
    ///
    /// The invocation runs when the occurrence is the target of the pass (and, for a
    /// theory, its argument has not been tested yet), when it is shared, or when
    /// isolation is disabled. Otherwise it is dropped without being polled.
    ///
    /// # Errors
    ///
    /// - [`Interrupt::DuplicateName`] when `name` (or `name` with the same theory
    ///   argument) was already declared in this pass,
    /// - [`Interrupt::TargetFailed`] when the target ran and failed,
    /// - [`Interrupt::SharedFailed`] when a shared prerequisite failed,
    /// - [`Interrupt::Concluded`] when [`ExecutionPolicy::EndAfterConclusion`] ends the pass,
    /// - the same interrupt again for every declaration after the pass was halted.
    pub async fn declare<R: Conclusion>(
        &mut self,
        name: &str,
        kind: SubTest,
        invocation: impl Future<Output = R>,
    ) -> Result<(), Interrupt> {
        if let Some(halted) = &self.state.halted {
            return Err(halted.clone());
        }
        self.register(name, &kind)?;
        if self.target.as_deref() == Some(name) {
            self.intercept_target(name, kind, invocation).await
        } else {
            self.intercept_other(name, &kind, invocation).await
        }
    }

    /// End the procedure if the target has already run and the policy is
    /// [`ExecutionPolicy::EndAfterConclusion`].
    ///
    /// Under [`ExecutionPolicy::ContinueAfterConclusion`] this does nothing, so that
    /// the rest of the procedure keeps discovering theory variants.
    ///
    /// # Errors
    ///
    /// [`Interrupt::Concluded`], or the interrupt that already halted the pass.
    pub fn end_if_conclusive(&mut self) -> Result<(), Interrupt> {
        if let Some(halted) = &self.state.halted {
            return Err(halted.clone());
        }
        if self.state.conclusive && self.config.policy() == ExecutionPolicy::EndAfterConclusion {
            return Err(self.halt(Interrupt::Concluded));
        }
        Ok(())
    }

    fn register(&mut self, name: &str, kind: &SubTest) -> Result<(), Interrupt> {
        let fresh = match (self.declared.entry(name.to_owned()), kind.argument()) {
            (Entry::Vacant(e), None) => {
                let declared = if kind.is_shared() {
                    Declared::Shared
                } else {
                    Declared::Plain
                };
                e.insert(declared);
                true
            }
            (Entry::Vacant(e), Some(arg)) => {
                e.insert(Declared::Theory(IndexSet::from([arg.clone()])));
                true
            }
            (Entry::Occupied(mut e), Some(arg)) => match e.get_mut() {
                Declared::Theory(args) => args.insert(arg.clone()),
                Declared::Plain | Declared::Shared => false,
            },
            (Entry::Occupied(_), None) => false,
        };
        if fresh {
            return Ok(());
        }

        let interrupt = Interrupt::DuplicateName {
            identity: identity(name, kind.argument()),
        };
        self.record_pass(EventKind::Failed(Failure::new(interrupt.to_string())));
        self.state.pending_restart = false;
        Err(self.halt(interrupt))
    }

    async fn intercept_target<R: Conclusion>(
        &mut self,
        name: &str,
        kind: SubTest,
        invocation: impl Future<Output = R>,
    ) -> Result<(), Interrupt> {
        self.state.target_recorded = true;
        let argument = kind.argument();
        let identity = identity(name, argument);

        if self.state.skip_additional {
            if argument.is_some_and(|arg| self.ledger.contains(arg)) {
                trace!("{identity}: already tested");
                return Ok(());
            }
            trace!("{identity}: deferred to the next pass");
            self.state.pending_restart = true;
            if self.config.policy() == ExecutionPolicy::EndAfterConclusion {
                return Err(self.halt(Interrupt::Concluded));
            }
            return Ok(());
        }

        if let Some(arg) = argument {
            if !self.ledger.insert(arg.clone()) {
                trace!("{identity}: already tested");
                return Ok(());
            }
            self.state.captured_argument = Some(arg.clone());
        }

        trace!("{identity}: running as target");
        self.transcript.push(Origin::Target, EventKind::Starting, String::new());
        let (result, output) = self.invoke(invocation).await;
        self.state.skip_additional = true;
        self.state.conclusive = true;

        let result = match result {
            Ok(()) => {
                self.transcript.push(Origin::Target, EventKind::Passed, output);
                Ok(())
            }
            Err(failure) => {
                // Later variants may not have been reached yet.
                if argument.is_some() {
                    self.state.pending_restart = true;
                }
                self.transcript.push(Origin::Target, EventKind::Failed(failure), output);
                Err(Interrupt::TargetFailed { identity })
            }
        };
        self.transcript.push(Origin::Target, EventKind::Finished, String::new());
        result
    }

    async fn intercept_other<R: Conclusion>(
        &mut self,
        name: &str,
        kind: &SubTest,
        invocation: impl Future<Output = R>,
    ) -> Result<(), Interrupt> {
        let identity = identity(name, kind.argument());
        let shared = kind.is_shared();
        if self.config.isolation() && !shared {
            trace!("{identity}: elided");
            return Ok(());
        }

        trace!("{identity}: running outside the target");
        let origin = Origin::Other(identity);
        self.transcript.push(origin.clone(), EventKind::Starting, String::new());
        let (result, output) = self.invoke(invocation).await;
        let result = match result {
            Ok(()) => {
                self.transcript.push(origin.clone(), EventKind::Passed, output);
                Ok(())
            }
            Err(failure) if shared => {
                let context = format!("shared sub-test {name:?} failed");
                let failed = EventKind::Failed(failure.clone());
                self.transcript.push(origin.clone(), failed, output);
                self.record_pass(EventKind::Failed(failure.context(&context)));
                self.state.pending_restart = false;
                Err(self.halt(Interrupt::SharedFailed {
                    name: name.to_owned(),
                }))
            }
            Err(failure) => {
                self.transcript.push(origin.clone(), EventKind::Failed(failure), output);
                Ok(())
            }
        };
        self.transcript.push(origin, EventKind::Finished, String::new());
        result
    }

    async fn invoke<R: Conclusion>(
        &mut self,
        invocation: impl Future<Output = R>,
    ) -> (Result<(), Failure>, String) {
        let mark = self.output.mark();
        let result = match catch_silent(invocation).await {
            Ok(r) => r.into_result().map_err(|err| Failure::from_error(&err)),
            Err(panic) => Err(Failure::from_panic(panic)),
        };
        let output = self.output.since(mark);
        self.output_mark = self.output.mark();
        (result, output)
    }

    fn halt(&mut self, interrupt: Interrupt) -> Interrupt {
        self.state.halted = Some(interrupt.clone());
        interrupt
    }

    /// Record an event of the pass as a whole, with the output written outside sub-tests.
    pub(crate) fn record_pass(&mut self, kind: EventKind) {
        let output = self.output.since(self.output_mark);
        self.output_mark = self.output.mark();
        self.transcript.push(Origin::Pass, kind, output);
    }

    /// Record a failure of the procedure itself (outside any sub-test).
    pub(crate) fn fail_pass(&mut self, failure: Failure) {
        // Variants after the failure point were never reached.
        if self.state.captured_argument.is_some() && self.state.halted.is_none() {
            self.state.pending_restart = true;
        }
        self.record_pass(EventKind::Failed(failure));
    }

    pub(crate) fn into_report(self) -> PassReport {
        PassReport {
            ledger: self.ledger,
            state: self.state,
            events: self.transcript.into_events(),
            declared: self
                .declared
                .into_iter()
                .filter(|(_, declared)| !matches!(declared, Declared::Shared))
                .map(|(name, _)| name)
                .collect(),
            skipped_reason: self.skipped_reason,
        }
    }
}
