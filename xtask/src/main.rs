// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Makefile replacement, using `cargo xtask` pattern.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use xshell::{Shell, cmd};

#[derive(Parser)]
/// `scenario_replay` task runner
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run default CI checks
    Ci {
        #[arg(long, conflicts_with = "package")]
        all: bool,

        #[arg(short, long)]
        package: Option<String>,
    },
    /// Run linter
    Lint {
        #[arg(long, conflicts_with = "package")]
        all: bool,

        #[arg(short, long)]
        package: Option<String>,
    },
    /// Run tests
    Test {
        #[arg(long, conflicts_with = "package")]
        all: bool,

        #[arg(short, long)]
        package: Option<String>,

        /// Run only the scenario sub-test with this name
        #[arg(long)]
        only: Option<String>,

        filter: Option<String>,
    },
}

#[test]
fn verify_cli() {
    use clap::CommandFactory as _;
    Cli::command().debug_assert();
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let sh = Shell::new()?;
    let _guard = sh.push_dir(std::env::var("CARGO_WORKSPACE_DIR")?);
    match cli.command {
        Commands::Ci { all, package } => run_ci(&sh, all, &package.unwrap_or_default()),
        Commands::Lint { all, package } => run_lint(&sh, all, &package.unwrap_or_default()),
        Commands::Test {
            all,
            package,
            only,
            filter,
        } => run_test(
            &sh,
            all,
            &package.unwrap_or_default(),
            only.as_deref(),
            &filter.unwrap_or_default(),
        ),
    }
}

fn root_dirs(all: bool) -> &'static [&'static str] {
    if all {
        &[
            "scenario_replay_example",
            "", // last to be the last in the terminal output
        ]
    } else {
        &[""]
    }
}

fn run_ci(sh: &Shell, all: bool, package: &str) -> Result<()> {
    run_lint(sh, all, package)?;
    run_test(sh, all, package, None, "")?;

    Ok(())
}

fn run_lint(sh: &Shell, all: bool, package: &str) -> Result<()> {
    let package_args = if package.is_empty() {
        &[][..]
    } else {
        &["--package", package][..]
    };
    for &dir in root_dirs(all) {
        info!("linting {:?}", if dir.is_empty() { "." } else { dir });
        let _guard = sh.push_dir(dir);
        cmd!(sh, "cargo fmt --check {package_args...}").run()?;
        cmd!(
            sh,
            "cargo clippy --all-targets --quiet {package_args...} -- -D warnings"
        )
        .run()?;
    }
    Ok(())
}

fn run_test(
    sh: &Shell,
    all: bool,
    package: &str,
    only: Option<&str>,
    filter: &str,
) -> Result<()> {
    let package_args = if package.is_empty() {
        &[][..]
    } else {
        &["--package", package][..]
    };
    let filter_args = if filter.is_empty() {
        &[][..]
    } else {
        &["--", filter][..]
    };
    if let Some(only) = only {
        // Picked up by `scenario_replay::Runner::new`.
        sh.set_var("SCENARIO_REPLAY_ONLY", only);
    }
    for &dir in root_dirs(all) {
        info!("testing {:?}", if dir.is_empty() { "." } else { dir });
        let _guard = sh.push_dir(dir);
        cmd!(sh, "cargo test --quiet {package_args...} {filter_args...}").run()?;
    }
    Ok(())
}
