// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::time::Duration;

use indexmap::IndexSet;
use log::{debug, error, info, warn};
use tokio::{runtime::Handle, time::Instant};

use crate::{
    ArgumentLedger, Cancellation, Conclusion, Config, EventKind, Failure, Interceptor, Interrupt,
    LogSink, Outcome, ResultEvent, ResultSink, RunSummary, ScenarioConfig, SinkClosed,
    interceptor::PassReport,
    transcript::{FinalizeContext, Origin, RawEvent, finalize},
    unwind::{PanicInfo, catch_silent},
};

const CANCELLED: &str = "Run was cancelled before the pass completed";
const NO_RUNTIME: &str =
    "pass timeout needs a Tokio runtime, run the scenario inside one or disable the timeout";

/// Runs scenario procedures, one pass per targeted sub-test.
///
/// A scenario procedure is an async closure taking `&mut Interceptor`. It is invoked
/// again for every pass, so it must not carry state from one invocation to the next
/// (other than state it deliberately shares, such as counters in tests).
#[derive(Debug, Clone)]
pub struct Runner {
    config: ScenarioConfig,
    only: Option<String>,
    cancellation: Option<Cancellation>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

enum PassEnd<R> {
    Completed(R),
    Panicked(PanicInfo),
    TimedOut(Duration),
    NoRuntime(Duration),
    Cancelled,
}

#[derive(Debug, Default)]
struct Cycle {
    summary: RunSummary,
    declared: IndexSet<String>,
    stopped: bool,
}

fn forward_all<S: ResultSink + ?Sized>(
    sink: &mut S,
    events: Vec<ResultEvent>,
) -> Result<(), SinkClosed> {
    events.into_iter().try_for_each(|e| sink.forward(e))
}

fn is_interrupt(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<Interrupt>())
}

impl Runner {
    /// Create a new runner with default settings.
    ///
    /// See [`Config::runner`] for a list of environment variables that affect
    /// the created runner.
    #[must_use]
    pub fn new() -> Self {
        Self::custom().resolve(true)
    }

    /// Create a config for runner customization.
    pub fn custom() -> Config {
        Config::default()
    }

    pub(crate) fn with_parts(config: ScenarioConfig, only: Option<String>) -> Self {
        Self {
            config,
            only,
            cancellation: None,
        }
    }

    /// Stop running passes once `cancellation` is triggered.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Settings every cycle of this runner uses.
    #[must_use]
    pub fn config(&self) -> ScenarioConfig {
        self.config
    }

    /// Name of the only sub-test [`Runner::run_scenario`] runs, if restricted.
    #[must_use]
    pub fn only(&self) -> Option<&str> {
        self.only.as_deref()
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(Cancellation::is_cancelled)
    }

    /// Run every sub-test of the scenario, each in its own cycle of passes, and
    /// forward the results to `sink`.
    ///
    /// Sub-tests are discovered by running the procedure once without a target, and
    /// then by every pass of every cycle. A scenario that declares nothing is reported
    /// as a single skipped (or failed) row named `name`.
    pub async fn run_scenario<F, R, S>(&self, name: &str, procedure: F, sink: &mut S) -> RunSummary
    where
        F: AsyncFn(&mut Interceptor) -> R,
        R: Conclusion,
        S: ResultSink + ?Sized,
    {
        if let Some(only) = &self.only {
            debug!("{name}: running only {only:?}");
            return self.run_cycle(only, &procedure, sink).await.summary;
        }

        if self.is_cancelled() {
            return RunSummary::default();
        }
        debug!("{name}: discovery pass");
        let ledger = ArgumentLedger::new(self.config.theory_limit());
        let (report, _, cancelled) = self.run_pass(None, &procedure, ledger).await;
        if cancelled {
            debug!("{name}: cancelled during discovery");
            return RunSummary::default();
        }
        let mut queue: IndexSet<String> = report.declared.into_iter().collect();
        if queue.is_empty() {
            return self.run_cycle(name, &procedure, sink).await.summary;
        }

        let mut summary = RunSummary::default();
        let mut ix = 0;
        while let Some(target) = queue.get_index(ix).cloned() {
            let cycle = self.run_cycle(&target, &procedure, sink).await;
            summary.merge(cycle.summary);
            if cycle.stopped {
                break;
            }
            queue.extend(cycle.declared);
            ix += 1;
        }
        debug!("{name}: {summary}");
        summary
    }

    /// Run the scenario cycle for a single target: invoke the procedure again and again
    /// until the target (all of its theory variants, up to the configured limit) has run.
    pub async fn run_target<F, R, S>(&self, target: &str, procedure: F, sink: &mut S) -> RunSummary
    where
        F: AsyncFn(&mut Interceptor) -> R,
        R: Conclusion,
        S: ResultSink + ?Sized,
    {
        self.run_cycle(target, &procedure, sink).await.summary
    }

    /// Run the scenario, log every result and panic if anything failed.
    ///
    /// Intended to be called from `#[tokio::test]` functions.
    ///
    /// # Panics
    ///
    /// `check` panics listing the failed sub-tests when any of them failed.
    pub async fn check<F, R>(&self, name: &str, procedure: F)
    where
        F: AsyncFn(&mut Interceptor) -> R,
        R: Conclusion,
    {
        let mut sink = LogSink::new();
        let summary = self.run_scenario(name, procedure, &mut sink).await;
        if summary.is_success() {
            info!("{name}: {summary}");
            return;
        }
        error!("{name}: {summary}");
        let failures: Vec<String> = sink
            .failures()
            .iter()
            .map(|(identity, failure)| format!("  {identity}: {failure}"))
            .collect();
        panic!(
            "scenario {name:?} failed ({summary}):\n{}",
            failures.join("\n")
        );
    }

    async fn run_cycle<F, R, S>(&self, target: &str, procedure: &F, sink: &mut S) -> Cycle
    where
        F: AsyncFn(&mut Interceptor) -> R,
        R: Conclusion,
        S: ResultSink + ?Sized,
    {
        let mut cycle = Cycle::default();
        let mut ledger = ArgumentLedger::new(self.config.theory_limit());
        for pass in 1_usize.. {
            if self.is_cancelled() {
                debug!("{target}: cancelled before pass {pass}");
                cycle.stopped = true;
                break;
            }
            if ledger.is_full() {
                debug!("{target}: theory limit of {} reached", ledger.limit());
                let capped = RawEvent {
                    origin: Origin::Pass,
                    kind: EventKind::Skipped(format!(
                        "Theory test case limit of {} reached, further arguments were not run",
                        ledger.limit()
                    )),
                    output: String::new(),
                };
                let events = finalize(
                    vec![capped],
                    &FinalizeContext {
                        target,
                        argument: None,
                        skipped_reason: None,
                        elapsed: Duration::ZERO,
                    },
                );
                cycle.summary.absorb(Outcome::Skipped);
                if forward_all(sink, events).is_err() {
                    warn!("{target}: result sink closed, stopping");
                    cycle.stopped = true;
                }
                break;
            }

            let (report, elapsed, cancelled) = self.run_pass(Some(target), procedure, ledger).await;
            let PassReport {
                ledger: returned,
                state,
                events,
                declared,
                skipped_reason,
            } = report;
            ledger = returned;
            cycle.declared.extend(declared);
            debug!(
                "{target}: pass {pass} finished in {elapsed:?} (restart: {})",
                state.pending_restart
            );

            // A pass that only met already tested variants is restart bookkeeping,
            // even when the procedure failed after them.
            if state.target_recorded && state.captured_argument.is_none() && !ledger.is_empty() {
                debug!("{target}: no untested variants left");
                break;
            }

            let events = finalize(
                events,
                &FinalizeContext {
                    target,
                    argument: state.captured_argument.as_ref(),
                    skipped_reason: skipped_reason.as_deref(),
                    elapsed,
                },
            );
            if cancelled {
                debug!("{target}: cancelled during pass {pass}");
                if forward_all(sink, events).is_err() {
                    debug!("{target}: result sink closed");
                }
                cycle.stopped = true;
                break;
            }
            if let Some(outcome) = Outcome::of(&events) {
                cycle.summary.absorb(outcome);
            }
            if forward_all(sink, events).is_err() {
                warn!("{target}: result sink closed, stopping");
                cycle.stopped = true;
                break;
            }
            if !state.pending_restart {
                break;
            }
        }
        cycle
    }

    async fn run_pass<F, R>(
        &self,
        target: Option<&str>,
        procedure: &F,
        ledger: ArgumentLedger,
    ) -> (PassReport, Duration, bool)
    where
        F: AsyncFn(&mut Interceptor) -> R,
        R: Conclusion,
    {
        let mut interceptor = Interceptor::new(target, self.config, ledger);
        let start = Instant::now();
        let end = self.drive(procedure(&mut interceptor)).await;
        let elapsed = start.elapsed();

        let cancelled = matches!(end, PassEnd::Cancelled);
        match end {
            PassEnd::Completed(r) => {
                if let Err(err) = r.into_result()
                    && !is_interrupt(&err)
                {
                    interceptor.fail_pass(Failure::from_error(&err));
                }
            }
            PassEnd::Panicked(panic) => interceptor.fail_pass(Failure::from_panic(panic)),
            PassEnd::TimedOut(limit) => {
                interceptor.fail_pass(Failure::new(format!("pass timed out after {limit:?}")));
            }
            PassEnd::NoRuntime(limit) => {
                interceptor.fail_pass(Failure::new(format!("{NO_RUNTIME} ({limit:?})")));
            }
            PassEnd::Cancelled => interceptor.record_pass(EventKind::Skipped(CANCELLED.to_owned())),
        }
        (interceptor.into_report(), elapsed, cancelled)
    }

    async fn drive<R>(&self, pass: impl Future<Output = R>) -> PassEnd<R> {
        let timeout = self.config.timeout();
        let guarded = async move {
            let caught = match timeout {
                Some(limit) if Handle::try_current().is_err() => return PassEnd::NoRuntime(limit),
                Some(limit) => match tokio::time::timeout(limit, catch_silent(pass)).await {
                    Ok(caught) => caught,
                    Err(_) => return PassEnd::TimedOut(limit),
                },
                None => catch_silent(pass).await,
            };
            match caught {
                Ok(r) => PassEnd::Completed(r),
                Err(panic) => PassEnd::Panicked(panic),
            }
        };
        match &self.cancellation {
            Some(cancellation) => {
                tokio::select! {
                    biased;
                    () = cancellation.cancelled() => PassEnd::Cancelled,
                    end = guarded => end,
                }
            }
            None => guarded.await,
        }
    }
}
