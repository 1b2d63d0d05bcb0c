// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
`scenario_replay` runs sub-tests declared imperatively inside a single async procedure,
making each of them look, to the result consumer, as if it had run in isolation.

The procedure is invoked again for every targeted sub-test. Only the target (and any
shared prerequisites) runs in a pass; every other declaration is recorded and becomes
the target of a later pass. Theory variants are discovered one pass at a time.

```
use futures::executor::block_on;
use scenario_replay::{Interceptor, Interrupt, Runner};

let runner = Runner::custom().runner(false).unwrap();
let mut events = Vec::new();
let summary = block_on(runner.run_scenario(
    "counter",
    async |s: &mut Interceptor| -> Result<(), Interrupt> {
        let mut counter = 0;
        s.fact("starts at zero", async { assert_eq!(counter, 0) }).await?;
        s.fact("increments", async {
            counter += 1;
            assert_eq!(counter, 1);
        })
        .await?;
        for n in [2, 4, 6] {
            s.theory("even", n, async move { assert_eq!(n % 2, 0) }).await?;
        }
        Ok(())
    },
    &mut events,
));
assert_eq!(summary.total(), 5);
assert!(summary.is_success());
```
*/

extern crate alloc;

mod cancel;
mod config;
mod error;
mod failure;
mod interceptor;
mod ledger;
mod output;
mod runner;
mod sink;
mod summary;
#[cfg(test)]
mod tests;
mod transcript;
mod unwind;

pub use cancel::*;
pub use config::*;
pub use error::*;
pub use failure::*;
pub use interceptor::{Interceptor, SubTest};
pub use ledger::*;
pub use output::*;
pub use runner::*;
pub use sink::*;
pub use summary::*;
pub use transcript::{EventKind, ResultEvent};

/// Run a scenario with a default [`Runner`], log every result and panic if anything failed.
///
/// See [`Runner::check`].
///
/// # Panics
///
/// `check_scenario` panics listing the failed sub-tests when any of them failed.
pub async fn check_scenario<F, R>(name: &str, procedure: F)
where
    F: AsyncFn(&mut Interceptor) -> R,
    R: Conclusion,
{
    Runner::new().check(name, procedure).await;
}
