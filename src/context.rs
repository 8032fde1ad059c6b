// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The shared application context: every piece of state that outlives a single thread and is
//! handed out as an `Arc<AppContext>` to the extractor, injector, and control threads.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, ClockTS};
use crate::config::Config;
use crate::input::InputManager;
use crate::queue::QueueGroup;

/// Shared state: the clock, the metadata queues, the input registry, the parsed configuration,
/// a live-mutable ts-adjustment, and a running flag with an exit broadcast.
///
/// Cloning an `Arc<AppContext>` is how every thread gets its handle; nothing here is ever
/// swapped out after construction except `ts_adjustment` and `running`.
pub struct AppContext {
    pub queues: Arc<QueueGroup>,
    pub clock: Arc<Clock>,
    pub inputs: InputManager,
    pub config: Config,
    running: AtomicBool,
    ts_adjustment: AtomicI64,
    on_exit: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl AppContext {
    pub fn new(queues: Arc<QueueGroup>, clock: Arc<Clock>, inputs: InputManager, config: Config) -> Self {
        let ts_adjustment = config.output.ts_adjustment;
        Self {
            queues,
            clock,
            inputs,
            config,
            running: AtomicBool::new(true),
            ts_adjustment: AtomicI64::new(ts_adjustment),
            on_exit: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Registers a callback to run once, from whichever thread calls [`Self::exit`] — typically
    /// something that cancels a blocked `accept()`/`read()` on the control surface's listener.
    pub fn on_exit(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_exit.lock().unwrap().push(Box::new(callback));
    }

    /// Flips the running flag and fires every registered exit callback. Idempotent: calling this
    /// more than once only re-runs the callbacks, which must themselves tolerate that.
    pub fn exit(&self) {
        self.running.store(false, Ordering::Release);
        for callback in self.on_exit.lock().unwrap().iter() {
            callback();
        }
    }

    pub fn ts_adjustment(&self) -> ClockTS {
        ClockTS(self.ts_adjustment.load(Ordering::Acquire))
    }

    pub fn set_ts_adjustment(&self, value: ClockTS) {
        self.ts_adjustment.store(value.0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::input::{AbstractInput, CLEAR_INPUT_ID};
    use std::sync::atomic::AtomicUsize;

    fn context() -> AppContext {
        let inputs = InputManager::new(vec![AbstractInput::Clear { id: CLEAR_INPUT_ID }]);
        AppContext::new(Arc::new(QueueGroup::new()), Arc::new(Clock::new()), inputs, Config::default())
    }

    #[test]
    fn exit_flips_running_and_fires_callbacks() {
        let ctx = context();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        ctx.on_exit(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(ctx.is_running());
        ctx.exit();
        assert!(!ctx.is_running());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ts_adjustment_defaults_from_config_and_is_mutable() {
        let ctx = context();
        assert_eq!(ctx.ts_adjustment(), ClockTS(0));
        ctx.set_ts_adjustment(ClockTS(42));
        assert_eq!(ctx.ts_adjustment(), ClockTS(42));
    }
}
