// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::{
    any::Any, cell::Cell, fmt::Display, future::poll_fn, panic::AssertUnwindSafe, pin::pin,
};
use std::{panic, sync::Once, thread_local};

use futures::FutureExt as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PanicInfo {
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl PanicInfo {
    pub(crate) fn location(&self) -> Option<String> {
        (!self.file.is_empty()).then(|| format!("{}:{}:{}", self.file, self.line, self.column))
    }
}

/// Drive `fut` to completion, turning a panic in any of its polls into [`PanicInfo`]
/// without letting the panic hook print anything.
pub(crate) async fn catch_silent<F: Future>(fut: F) -> Result<F::Output, PanicInfo> {
    let mut fut = pin!(AssertUnwindSafe(fut).catch_unwind());
    // The guard must cover every poll, not just the first one: the panic can happen
    // after any number of suspensions.
    let r = poll_fn(|cx| {
        let _guard = SilentPanicGuard::new();
        fut.as_mut().poll(cx)
    })
    .await;
    r.map_err(|e| {
        let message = panic_message(e);
        let (file, line, column) = SilentPanicGuard::take_location();
        PanicInfo {
            message,
            file,
            line,
            column,
        }
    })
}

pub(crate) fn panic_message(e: Box<dyn Any + Send>) -> String {
    let mut s = match e.downcast::<String>() {
        Ok(s) => *s,
        Err(e) => match e.downcast::<&str>() {
            Ok(s) => (*s).into(),
            Err(e) => {
                if let Ok(d) = e.downcast::<&dyn Display>() {
                    (*d).to_string()
                } else {
                    "<panic with unexpected payload>".into()
                }
            }
        },
    };
    if s.trim().is_empty() {
        s = "<panic with empty payload>".into();
    }
    s
}

type PanicHook = Box<dyn Fn(&panic::PanicHookInfo<'_>) + Send + Sync>;

struct SilentPanicGuard {
    _private: (),
}

impl SilentPanicGuard {
    thread_local! {
        static SILENCE_PANICS: Cell<u32> = const { Cell::new(0) };
        static PANIC_LOCATION: Cell<(String, u32, u32)> =
            const { Cell::new((String::new(), 0, 0)) };
    }

    fn new() -> Self {
        static PANIC_HOOK_ONCE: Once = Once::new();
        PANIC_HOOK_ONCE.call_once(|| {
            let prev_hook = panic::take_hook();
            // We have taken the previous hook, but not installed ours yet.
            // Can race with other (but not ours, thanks to Once) hook users,
            // unless `update_hook` is stabilized in https://github.com/rust-lang/rust/issues/92649.
            panic::set_hook(Box::new(move |info| {
                Self::hook(&prev_hook, info);
            }));
        });

        Self::SILENCE_PANICS.with(|c| c.update(|v| v + 1));

        Self { _private: () }
    }

    fn hook(prev_hook: &PanicHook, info: &panic::PanicHookInfo) {
        if Self::SILENCE_PANICS.get() > 0 {
            // Remember panic location, without calling the hook chain.
            if let Some(loc) = info.location() {
                Self::PANIC_LOCATION.set((loc.file().into(), loc.line(), loc.column()));
            }
        } else {
            prev_hook(info);
        }
    }

    fn take_location() -> (String, u32, u32) {
        Self::PANIC_LOCATION.take()
    }
}

impl Drop for SilentPanicGuard {
    fn drop(&mut self) {
        Self::SILENCE_PANICS.with(|c| c.update(|v| v - 1));

        // We do not try to uninstall the hook, since there is
        // no guarantee that our hook is currently installed.
    }
}
