// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::{cell::Cell, slice, time::Duration};

use anyhow::Context as _;
use chaos_theory::{check, make};
use futures::executor::block_on;
use tokio::sync::mpsc;

use crate::{
    Config, EventKind, ExecutionPolicy, Interceptor, Interrupt, Outcome, ResultEvent, Runner,
    cancellation, check_scenario, transcript::NO_APPLICABLE_TESTS,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn runner(config: Config) -> Runner {
    init_logger();
    config.runner(false).unwrap()
}

fn rows(events: &[ResultEvent]) -> Vec<(&str, Outcome)> {
    events
        .iter()
        .filter_map(|e| Some((e.identity.as_str(), Outcome::of(slice::from_ref(e))?)))
        .collect()
}

fn refused() -> anyhow::Result<()> {
    Err(anyhow::anyhow!("connection refused"))
}

fn outcome_event<'e>(events: &'e [ResultEvent], identity: &str) -> &'e ResultEvent {
    events
        .iter()
        .find(|e| e.identity == identity && e.kind.is_outcome())
        .unwrap()
}

#[test]
fn facts_do_not_see_each_other() {
    let r = runner(Runner::custom());
    let mut events = Vec::new();
    let summary = block_on(r.run_scenario(
        "isolated",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            let mut log = Vec::new();
            for name in ["a", "b", "c"] {
                s.fact(name, async {
                    assert!(log.is_empty(), "{name} saw {log:?}");
                    log.push(name);
                })
                .await?;
            }
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(summary.total(), 3);
    assert_eq!(summary.passed(), 3);
    assert_eq!(
        rows(&events),
        [
            ("a", Outcome::Passed),
            ("b", Outcome::Passed),
            ("c", Outcome::Passed),
        ]
    );
    for chunk in events.chunks(3) {
        assert_eq!(chunk[0].kind, EventKind::Starting);
        assert_eq!(chunk[2].kind, EventKind::Finished);
    }
}

#[test]
fn shared_state_without_isolation() {
    let scenario = async |s: &mut Interceptor| -> Result<(), Interrupt> {
        let mut flag = false;
        s.fact("T1", async {
            assert!(!flag);
            flag = true;
        })
        .await?;
        s.fact("T2", async { assert!(flag) }).await?;
        Ok(())
    };

    let r = runner(Runner::custom().with_isolation(false));
    let mut events = Vec::new();
    let summary = block_on(r.run_scenario("flags", &scenario, &mut events));
    assert_eq!(summary.passed(), 2);
    assert_eq!(
        rows(&events),
        [("T1", Outcome::Passed), ("T2", Outcome::Passed)]
    );

    let r = runner(Runner::custom().with_isolation(true));
    let mut events = Vec::new();
    let summary = block_on(r.run_scenario("flags", &scenario, &mut events));
    assert_eq!(summary.failed(), 1);
    assert_eq!(
        rows(&events),
        [("T1", Outcome::Passed), ("T2", Outcome::Failed)]
    );
}

#[test]
fn theory_arguments_are_discovered_across_passes() {
    let passes = Cell::new(0);
    let tested = Cell::new(0);
    let mut events = Vec::new();
    let summary = block_on(runner(Runner::custom().with_theory_limit(5)).run_target(
        "t",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            passes.set(passes.get() + 1);
            for n in [1, 2, 3] {
                s.theory("t", n, async move { assert!(n > 0) }).await?;
            }
            tested.set(s.tested_arguments().len());
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(summary.passed(), 3);
    assert_eq!(passes.get(), 3);
    assert_eq!(tested.get(), 3);
    assert_eq!(
        rows(&events),
        [
            ("t (1)", Outcome::Passed),
            ("t (2)", Outcome::Passed),
            ("t (3)", Outcome::Passed),
        ]
    );
}

#[test]
fn failing_argument_does_not_stop_discovery() {
    for (bad, passes_want) in [(2, 3), (3, 4)] {
        let passes = Cell::new(0);
        let mut events = Vec::new();
        let summary = block_on(runner(Runner::custom()).run_target(
            "t",
            async |s: &mut Interceptor| -> Result<(), Interrupt> {
                passes.set(passes.get() + 1);
                for n in [1, 2, 3] {
                    s.theory("t", n, async move { assert_ne!(n, bad) }).await?;
                }
                Ok(())
            },
            &mut events,
        ));
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.failed(), 1);
        // A failed last variant costs one extra pass that reports nothing.
        assert_eq!(passes.get(), passes_want);
        let failed = format!("t ({bad})");
        for (identity, outcome) in rows(&events) {
            let want = if identity == failed {
                Outcome::Failed
            } else {
                Outcome::Passed
            };
            assert_eq!(outcome, want, "{identity}");
        }
    }
}

#[test]
fn theory_limit_caps_reported_outcomes() {
    check(|src| {
        let limit = src.any_of("limit", make::int_in_range(1_usize..6));
        let count = src.any_of("count", make::int_in_range(1_usize..10));
        let mut events = Vec::new();
        let summary = block_on(runner(Runner::custom().with_theory_limit(limit)).run_target(
            "t",
            async |s: &mut Interceptor| -> Result<(), Interrupt> {
                for n in 0..count {
                    s.theory("t", n, async {}).await?;
                }
                Ok(())
            },
            &mut events,
        ));
        if count <= limit {
            assert_eq!(summary.total(), count);
            assert_eq!(summary.skipped(), 0);
        } else {
            assert_eq!(summary.total(), limit + 1);
            assert_eq!(summary.skipped(), 1);
            let last = outcome_event(&events, "t");
            assert!(
                matches!(&last.kind, EventKind::Skipped(reason) if reason.contains("limit")),
                "{last:?}"
            );
        }
        assert_eq!(events.len(), summary.total() * 3);
    });
}

#[test]
fn empty_scenario_is_one_skip() {
    let r = runner(Runner::custom());

    let mut events = Vec::new();
    let summary = block_on(r.run_scenario(
        "empty",
        async |_: &mut Interceptor| -> Result<(), Interrupt> { Ok(()) },
        &mut events,
    ));
    assert_eq!(summary.total(), 1);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(events.len(), 3);
    assert_eq!(
        outcome_event(&events, "empty").kind,
        EventKind::Skipped(NO_APPLICABLE_TESTS.to_owned())
    );

    let mut events = Vec::new();
    let _ = block_on(r.run_scenario(
        "docker",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            s.set_skipped_reason("docker is not available");
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(
        outcome_event(&events, "docker").kind,
        EventKind::Skipped("docker is not available".to_owned())
    );
}

#[test]
fn shared_failure_fails_the_pass_without_restart() {
    let passes = Cell::new(0);
    let mut events = Vec::new();
    let summary = block_on(runner(Runner::custom()).run_target(
        "t",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            passes.set(passes.get() + 1);
            s.shared("db", async { refused() }).await?;
            for n in [1, 2] {
                s.theory("t", n, async {}).await?;
            }
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(passes.get(), 1);
    assert_eq!(summary.total(), 1);
    assert_eq!(summary.failed(), 1);
    let EventKind::Failed(failure) = &outcome_event(&events, "t").kind else {
        panic!("pass did not fail: {events:?}");
    };
    assert_eq!(
        failure.message,
        "shared sub-test \"db\" failed: connection refused"
    );
}

#[test]
fn duplicate_name_fails_the_pass() {
    let mut events = Vec::new();
    let summary = block_on(runner(Runner::custom()).run_target(
        "a",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            s.fact("a", async {}).await?;
            s.fact("a", async {}).await?;
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(summary.failed(), 1);
    assert_eq!(rows(&events), [("a", Outcome::Failed)]);
    let EventKind::Failed(failure) = &outcome_event(&events, "a").kind else {
        panic!("pass did not fail: {events:?}");
    };
    assert!(
        failure.message.contains("declared more than once"),
        "{failure}"
    );
}

#[test]
fn failures_outside_sub_tests_fail_the_pass() {
    let mut events = Vec::new();
    let summary = block_on(runner(Runner::custom()).run_target(
        "a",
        async |s: &mut Interceptor| -> anyhow::Result<()> {
            s.fact("a", async {}).await?;
            let config: Result<u16, _> = "port".parse();
            config.context("reading config")?;
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(summary.failed(), 1);
    let EventKind::Failed(failure) = &outcome_event(&events, "a").kind else {
        panic!("pass did not fail: {events:?}");
    };
    assert_eq!(failure.message, "reading config");
    assert_eq!(failure.chain.len(), 1);

    let mut events = Vec::new();
    let summary = block_on(runner(Runner::custom()).run_target(
        "a",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            s.fact("a", async {}).await?;
            let teardown: Option<u8> = None;
            assert!(teardown.is_some(), "teardown went missing");
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(summary.failed(), 1);
    let EventKind::Failed(failure) = &outcome_event(&events, "a").kind else {
        panic!("pass did not fail: {events:?}");
    };
    assert_eq!(failure.message, "teardown went missing");
    assert!(failure.location.is_some());
}

#[test]
fn failure_after_the_theory_loop_adds_no_extra_row() {
    let passes = Cell::new(0);
    let mut events = Vec::new();
    let summary = block_on(runner(Runner::custom()).run_target(
        "t",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            passes.set(passes.get() + 1);
            for n in [1, 2] {
                s.theory("t", n, async {}).await?;
            }
            let teardown: Option<u8> = None;
            assert!(teardown.is_some(), "teardown broke");
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(passes.get(), 3);
    assert_eq!(summary.total(), 2);
    assert_eq!(summary.failed(), 2);
    assert_eq!(
        rows(&events),
        [("t (1)", Outcome::Failed), ("t (2)", Outcome::Failed)]
    );
    let EventKind::Failed(failure) = &outcome_event(&events, "t (2)").kind else {
        panic!("pass did not fail: {events:?}");
    };
    assert_eq!(failure.message, "teardown broke");
}

#[test]
fn shared_steps_are_only_reported_when_targeted() {
    let scenario = async |s: &mut Interceptor| -> Result<(), Interrupt> {
        s.shared("setup", async {}).await?;
        s.fact("a", async {}).await?;
        Ok(())
    };
    let r = runner(Runner::custom());

    let mut events = Vec::new();
    let summary = block_on(r.run_scenario("with setup", &scenario, &mut events));
    assert_eq!(summary.total(), 1);
    assert_eq!(rows(&events), [("a", Outcome::Passed)]);

    let mut events = Vec::new();
    let summary = block_on(r.run_target("setup", &scenario, &mut events));
    assert_eq!(summary.total(), 1);
    assert_eq!(rows(&events), [("setup", Outcome::Passed)]);
}

#[test]
fn timeout_outside_a_runtime_fails_the_pass() {
    let r = runner(Runner::custom().with_timeout(Duration::from_secs(5)));
    let ran = Cell::new(false);
    let mut events = Vec::new();
    let summary = block_on(r.run_target(
        "a",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            s.fact("a", async { ran.set(true) }).await?;
            Ok(())
        },
        &mut events,
    ));
    assert!(!ran.get());
    assert_eq!(summary.failed(), 1);
    let EventKind::Failed(failure) = &outcome_event(&events, "a").kind else {
        panic!("pass did not fail: {events:?}");
    };
    assert!(failure.message.contains("Tokio runtime"), "{failure}");
}

#[test]
fn interrupts_are_not_counted_twice() {
    let mut events = Vec::new();
    let summary = block_on(runner(Runner::custom()).run_target(
        "a",
        async |s: &mut Interceptor| -> anyhow::Result<()> {
            s.fact("a", async { Err::<(), _>(anyhow::anyhow!("nope")) })
                .await
                .context("running a")?;
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(summary.total(), 1);
    let EventKind::Failed(failure) = &outcome_event(&events, "a").kind else {
        panic!("sub-test did not fail: {events:?}");
    };
    assert_eq!(failure.message, "nope");
}

#[tokio::test(start_paused = true)]
async fn timeout_applies_to_each_pass() {
    let r = runner(Runner::custom().with_timeout(Duration::from_secs(1)));
    let mut events = Vec::new();
    let summary = r
        .run_target(
            "slow",
            async |s: &mut Interceptor| -> Result<(), Interrupt> {
                for (n, millis) in [(1, 600), (2, 600), (3, 1500)] {
                    s.theory("slow", n, async move {
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                    })
                    .await?;
                }
                Ok(())
            },
            &mut events,
        )
        .await;
    assert_eq!(summary.total(), 3);
    assert_eq!(summary.failed(), 1);
    assert_eq!(
        rows(&events),
        [
            ("slow (1)", Outcome::Passed),
            ("slow (2)", Outcome::Passed),
            ("slow (3)", Outcome::Failed),
        ]
    );
    let EventKind::Failed(failure) = &outcome_event(&events, "slow (3)").kind else {
        panic!("pass did not time out: {events:?}");
    };
    assert_eq!(failure.message, "pass timed out after 1s");
}

#[tokio::test]
async fn closed_sink_stops_the_run() {
    let r = runner(Runner::custom());
    let (mut tx, rx) = mpsc::unbounded_channel::<ResultEvent>();
    drop(rx);
    let later = Cell::new(0);
    let summary = r
        .run_scenario(
            "closed",
            async |s: &mut Interceptor| -> Result<(), Interrupt> {
                s.fact("a", async {}).await?;
                s.fact("b", async { later.set(later.get() + 1) }).await?;
                Ok(())
            },
            &mut tx,
        )
        .await;
    assert_eq!(summary.total(), 1);
    assert_eq!(later.get(), 0);
}

#[tokio::test]
async fn cancellation_stops_after_flushing_the_pass() {
    let (handle, token) = cancellation();
    let r = runner(Runner::custom()).with_cancellation(token);
    let later = Cell::new(0);
    let mut events = Vec::new();
    let summary = r
        .run_scenario(
            "cancelled",
            async |s: &mut Interceptor| -> Result<(), Interrupt> {
                s.fact("a", async {}).await?;
                s.fact("b", async {
                    handle.cancel();
                    tokio::task::yield_now().await;
                })
                .await?;
                s.fact("c", async { later.set(later.get() + 1) }).await?;
                Ok(())
            },
            &mut events,
        )
        .await;
    assert_eq!(summary.total(), 1);
    assert_eq!(summary.passed(), 1);
    assert_eq!(later.get(), 0);
    assert_eq!(
        rows(&events),
        [("a", Outcome::Passed), ("b", Outcome::Skipped)]
    );
}

#[test]
fn end_after_conclusion_stops_each_pass_early() {
    for (policy, tails_want) in [
        (ExecutionPolicy::ContinueAfterConclusion, 3),
        (ExecutionPolicy::EndAfterConclusion, 1),
    ] {
        let tails = Cell::new(0);
        let mut events = Vec::new();
        let summary = block_on(runner(Runner::custom().with_policy(policy)).run_target(
            "t",
            async |s: &mut Interceptor| -> Result<(), Interrupt> {
                for n in ["x", "y", "z"] {
                    s.theory("t", n, async {}).await?;
                }
                tails.set(tails.get() + 1);
                Ok(())
            },
            &mut events,
        ));
        assert_eq!(summary.passed(), 3, "{policy:?}");
        assert_eq!(rows(&events)[0], ("t (x)", Outcome::Passed), "{policy:?}");
        assert_eq!(tails.get(), tails_want, "{policy:?}");
    }
}

#[test]
fn output_is_attached_to_the_outcome() {
    let mut events = Vec::new();
    let _ = block_on(runner(Runner::custom()).run_scenario(
        "output",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            let out = s.output();
            s.fact("a", async { out.line("from a") }).await?;
            s.fact("b", async { out.line(format_args!("from {}", "b")) })
                .await?;
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(outcome_event(&events, "a").output, "from a\n");
    assert_eq!(outcome_event(&events, "b").output, "from b\n");
    assert!(
        events
            .iter()
            .filter(|e| !e.kind.is_outcome())
            .all(|e| e.output.is_empty())
    );
}

#[test]
fn only_filter_runs_one_target() {
    let ran = Cell::new(0);
    let mut events = Vec::new();
    let summary = block_on(runner(Runner::custom().with_only("b")).run_scenario(
        "only",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            ran.set(ran.get() + 1);
            s.fact("a", async {}).await?;
            s.fact("b", async {}).await?;
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(ran.get(), 1);
    assert_eq!(summary.total(), 1);
    assert_eq!(rows(&events), [("b", Outcome::Passed)]);
}

#[test]
fn declarations_reached_only_after_a_target_are_still_reported() {
    let mut events = Vec::new();
    let summary = block_on(runner(Runner::custom()).run_scenario(
        "late",
        async |s: &mut Interceptor| -> Result<(), Interrupt> {
            s.fact("first", async {}).await?;
            // Only reached once "first" has run.
            if s.is_conclusive() {
                s.fact("second", async {}).await?;
            }
            Ok(())
        },
        &mut events,
    ));
    assert_eq!(summary.total(), 2);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(
        rows(&events),
        [("first", Outcome::Passed), ("second", Outcome::Skipped)]
    );
}

#[tokio::test]
async fn check_scenario_passes_quietly() {
    init_logger();
    check_scenario("quiet", async |s: &mut Interceptor| -> Result<(), Interrupt> {
        s.fact("a", async {}).await?;
        Ok(())
    })
    .await;
}

#[tokio::test]
#[should_panic(expected = "scenario \"loud\" failed")]
async fn check_panics_listing_failures() {
    runner(Runner::custom())
        .check("loud", async |s: &mut Interceptor| -> Result<(), Interrupt> {
            s.fact("a", async { assert_eq!(1 + 1, 3) }).await?;
            Ok(())
        })
        .await;
}
