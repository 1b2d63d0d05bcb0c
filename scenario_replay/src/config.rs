// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::{
    fmt::{Debug, Display},
    str::FromStr,
    time::Duration,
};
use std::sync::{Once, OnceLock};

use log::warn;

use crate::{ConfigError, Runner};

const VAR_PREFIX: &str = "SCENARIO_REPLAY_";

const ISOLATION_VAR: &str = "SCENARIO_REPLAY_ISOLATION";
const THEORY_LIMIT_VAR: &str = "SCENARIO_REPLAY_THEORY_LIMIT";
const POLICY_VAR: &str = "SCENARIO_REPLAY_POLICY";
const TIMEOUT_VAR: &str = "SCENARIO_REPLAY_TIMEOUT";
const ONLY_VAR: &str = "SCENARIO_REPLAY_ONLY";

const KNOWN_CONFIG_VARS: &[&str] = &[
    ISOLATION_VAR,
    THEORY_LIMIT_VAR,
    POLICY_VAR,
    TIMEOUT_VAR,
    ONLY_VAR,
];

const ISOLATION_DEFAULT: bool = true;
const THEORY_LIMIT_DEFAULT: usize = 100;
const POLICY_DEFAULT: ExecutionPolicy = ExecutionPolicy::ContinueAfterConclusion;
const TIMEOUT_DEFAULT: Option<Duration> = None;

/// What a pass does once its target has concluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExecutionPolicy {
    /// Keep running the scenario procedure, so that further theory variants are discovered
    /// in the same pass.
    #[default]
    ContinueAfterConclusion,
    /// End the procedure as soon as the target has concluded and the pass knows it has
    /// to restart (or when [`Interceptor::end_if_conclusive`](crate::Interceptor::end_if_conclusive) is called).
    EndAfterConclusion,
}

impl FromStr for ExecutionPolicy {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" | "continue-after-conclusion" => Ok(Self::ContinueAfterConclusion),
            "end" | "end-after-conclusion" => Ok(Self::EndAfterConclusion),
            _ => Err("expected \"continue\" or \"end\""),
        }
    }
}

/// Settings of one scenario-target cycle. Fixed for the lifetime of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioConfig {
    isolation: bool,
    theory_limit: usize,
    policy: ExecutionPolicy,
    timeout: Option<Duration>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            isolation: ISOLATION_DEFAULT,
            theory_limit: THEORY_LIMIT_DEFAULT,
            policy: POLICY_DEFAULT,
            timeout: TIMEOUT_DEFAULT,
        }
    }
}

impl ScenarioConfig {
    /// Whether sub-tests other than the target (and shared ones) are elided.
    #[must_use]
    pub fn isolation(&self) -> bool {
        self.isolation
    }

    /// Maximum number of distinct theory arguments tested per target.
    #[must_use]
    pub fn theory_limit(&self) -> usize {
        self.theory_limit
    }

    /// Early termination policy.
    #[must_use]
    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Wall-clock limit of a single pass.
    ///
    /// Enforcing it needs a Tokio runtime with time enabled. A pass started outside
    /// one fails instead of running.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

// Debug bound on T should really be a Display one.
fn param_fallback<T: Debug, E: Display>(
    name: &'static str,
    default_: T,
    use_ev: Option<&OnceLock<String>>,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> T {
    let s = if let Some(ev) = use_ev {
        ev.get_or_init(|| std::env::var(name).unwrap_or_default())
    } else {
        ""
    };
    if s.is_empty() {
        return default_;
    }
    parse(s).unwrap_or_else(|e| {
        warn!("failed to parse {name} value {s:?}, using default {default_:?} ({e})");
        default_
    })
}

fn parse_bool(s: &str) -> Result<bool, &'static str> {
    match s {
        "true" | "on" | "yes" | "y" | "1" => Ok(true),
        "false" | "off" | "no" | "n" | "0" => Ok(false),
        _ => Err("invalid boolean value"),
    }
}

fn parse_theory_limit(s: &str) -> Result<usize, &'static str> {
    let mut s = s.to_owned();
    s.retain(|c| c != '_');
    match s.parse() {
        Ok(0) => Err("limit must be positive"),
        Ok(limit) => Ok(limit),
        Err(_) => Err("invalid number"),
    }
}

fn parse_timeout(s: &str) -> Result<Option<Duration>, &'static str> {
    if matches!(s, "off" | "none") {
        return Ok(None);
    }
    let secs: u64 = s
        .strip_suffix("s")
        .unwrap_or(s)
        .parse()
        .map_err(|_| "expected seconds or \"off\"")?;
    if secs == 0 {
        return Err("timeout must be positive");
    }
    Ok(Some(Duration::from_secs(secs)))
}

fn isolation_fallback(use_ev: bool) -> bool {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(
        ISOLATION_VAR,
        ISOLATION_DEFAULT,
        use_ev.then_some(&ENV),
        parse_bool,
    )
}

fn theory_limit_fallback(use_ev: bool) -> usize {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(
        THEORY_LIMIT_VAR,
        THEORY_LIMIT_DEFAULT,
        use_ev.then_some(&ENV),
        parse_theory_limit,
    )
}

fn policy_fallback(use_ev: bool) -> ExecutionPolicy {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(
        POLICY_VAR,
        POLICY_DEFAULT,
        use_ev.then_some(&ENV),
        str::parse,
    )
}

fn timeout_fallback(use_ev: bool) -> Option<Duration> {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(
        TIMEOUT_VAR,
        TIMEOUT_DEFAULT,
        use_ev.then_some(&ENV),
        parse_timeout,
    )
}

fn only_fallback(use_ev: bool) -> Option<String> {
    static ENV: OnceLock<String> = OnceLock::new();
    param_fallback(ONLY_VAR, None, use_ev.then_some(&ENV), |s| {
        Ok::<_, &'static str>(Some(s.to_owned()))
    })
}

/// Custom configuration for [`Runner`].
///
/// Create new config instance with [`Runner::custom`].
#[must_use]
#[derive(Debug, Default)]
pub struct Config {
    isolation: Option<bool>,
    theory_limit: Option<usize>,
    policy: Option<ExecutionPolicy>,
    timeout: Option<Option<Duration>>,
    only: Option<String>,
}

impl Config {
    /// Override isolation: when disabled, every sub-test reached by a pass runs,
    /// not only the target and shared ones.
    pub fn with_isolation(mut self, enabled: bool) -> Self {
        self.isolation = Some(enabled);
        self
    }

    /// Override the maximum number of distinct theory arguments tested per target.
    pub fn with_theory_limit(mut self, limit: usize) -> Self {
        self.theory_limit = Some(limit);
        self
    }

    /// Override the early termination policy.
    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Limit the wall-clock time of each pass.
    ///
    /// The scenario must then be run inside a Tokio runtime with time enabled;
    /// otherwise every pass fails without running.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(Some(timeout));
        self
    }

    /// Do not limit the wall-clock time of passes.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = Some(None);
        self
    }

    /// Run only the sub-test with this name when running whole scenarios.
    pub fn with_only(mut self, target: impl Into<String>) -> Self {
        self.only = Some(target.into());
        self
    }

    /// Construct a [`Runner`] with this config.
    ///
    /// To determine the `Runner` parameters:
    /// - any values specified explicitly by `Config` method calls are used as-is,
    /// - otherwise, if `use_env_vars` is true, values from the following environment variables are used:
    ///   - `SCENARIO_REPLAY_ISOLATION`,
    ///   - `SCENARIO_REPLAY_THEORY_LIMIT`,
    ///   - `SCENARIO_REPLAY_POLICY` (`continue` or `end`),
    ///   - `SCENARIO_REPLAY_TIMEOUT` (seconds, or `off`),
    ///   - `SCENARIO_REPLAY_ONLY`,
    /// - otherwise, default parameter values are used.
    ///
    /// Environment values that can not be parsed are logged and replaced by defaults.
    ///
    /// # Errors
    ///
    /// `runner` fails when an explicitly specified value is invalid.
    pub fn runner(self, use_env_vars: bool) -> Result<Runner, ConfigError> {
        if self.theory_limit == Some(0) {
            return Err(ConfigError::ZeroTheoryLimit);
        }
        if self.timeout == Some(Some(Duration::ZERO)) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.only.as_deref() == Some("") {
            return Err(ConfigError::EmptyTargetFilter);
        }
        Ok(self.resolve(use_env_vars))
    }

    pub(crate) fn resolve(self, use_env_vars: bool) -> Runner {
        static CHECK_ENV_ONCE: Once = Once::new();
        if use_env_vars {
            CHECK_ENV_ONCE.call_once(|| {
                for (var, _) in std::env::vars_os() {
                    if let Some(var) = var.to_str()
                        && var.starts_with(VAR_PREFIX)
                        && !KNOWN_CONFIG_VARS.contains(&var)
                    {
                        warn!("unknown environment variable {var}, ignoring");
                    }
                }
            });
        }

        let config = ScenarioConfig {
            isolation: self
                .isolation
                .unwrap_or_else(|| isolation_fallback(use_env_vars)),
            theory_limit: self
                .theory_limit
                .unwrap_or_else(|| theory_limit_fallback(use_env_vars)),
            policy: self.policy.unwrap_or_else(|| policy_fallback(use_env_vars)),
            timeout: self
                .timeout
                .unwrap_or_else(|| timeout_fallback(use_env_vars)),
        };
        let only = self.only.or_else(|| only_fallback(use_env_vars));

        Runner::with_parts(config, only)
    }
}
