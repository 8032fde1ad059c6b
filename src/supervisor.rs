// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Wraps a thread body so that a normal return or a propagated error both trigger a restart
//! (when configured), instead of letting either silently end the thread.

use crate::context::AppContext;

/// Runs `f` in a loop. A normal return and a returned error are both logged and, unless
/// `--no-restart` was set or the application is shutting down, cause `f` to be invoked again.
pub fn supervised<F>(thread_name: &str, context: &AppContext, f: F)
where
    F: Fn() -> anyhow::Result<()>,
{
    loop {
        match f() {
            Ok(()) => {
                if context.config.no_restart || !context.is_running() {
                    return;
                }
                log::info!("{thread_name}: restarting (normal exit)...");
            }
            Err(e) => {
                log::error!("{thread_name}: {e:#}");
                if context.config.no_restart || !context.is_running() {
                    return;
                }
                log::info!("{thread_name}: restarting (caused by fatal error)...");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::input::{AbstractInput, CLEAR_INPUT_ID};
    use crate::queue::QueueGroup;
    use crate::{clock::Clock, input::InputManager};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn context(no_restart: bool) -> AppContext {
        let inputs = InputManager::new(vec![AbstractInput::Clear { id: CLEAR_INPUT_ID }]);
        let config = Config { no_restart, ..Config::default() };
        AppContext::new(Arc::new(QueueGroup::new()), Arc::new(Clock::new()), inputs, config)
    }

    #[test]
    fn supervised_returns_immediately_when_no_restart() {
        let ctx = context(true);
        let calls = AtomicUsize::new(0);
        supervised("test", &ctx, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn supervised_restarts_on_error_until_context_stops() {
        let ctx = context(false);
        let calls = AtomicUsize::new(0);
        supervised("test", &ctx, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= 3 {
                ctx.exit();
            }
            Err(anyhow::anyhow!("boom"))
        });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
