// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Process-wide logging setup: a leveled, thread-named `log`/`env_logger` backend.
//!
//! Each long-lived thread calls [`set_thread_name`] once at startup so log lines can be
//! attributed to the extractor/injector/controller that emitted them, and so an operator can
//! restrict output to one thread via `--log-thread`.

use std::cell::RefCell;
use std::io::Write;

use env_logger::Builder;
use log::{LevelFilter, Log, Metadata, Record};

thread_local! {
    static THREAD_NAME: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Registers `name` as the current thread's log identity.
pub fn set_thread_name(name: impl Into<String>) {
    THREAD_NAME.with(|cell| *cell.borrow_mut() = Some(name.into()));
}

fn current_thread_name() -> Option<String> {
    THREAD_NAME.with(|cell| cell.borrow().clone())
}

/// Maps a configured level name to a `log::LevelFilter`. `"warning"`/`"fatal"` are accepted as
/// aliases for `Warn`/`Error` since `log` itself has no corresponding severities.
fn level_from_str(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warning" | "warn" => LevelFilter::Warn,
        "error" | "fatal" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

struct ThreadFilteredLogger {
    inner: env_logger::Logger,
    thread_filter: Option<String>,
}

impl Log for ThreadFilteredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if let Some(filter) = &self.thread_filter {
            if current_thread_name().as_deref() != Some(filter.as_str()) {
                return;
            }
        }
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initializes the global logger from the merged config/CLI `log` level and optional
/// `log_thread` filter. Must be called exactly once, before any other thread is spawned.
pub fn init(level: &str, thread_filter: Option<&str>) {
    let level_filter = level_from_str(level);

    let mut builder = Builder::new();
    builder.filter_level(level_filter);
    builder.format(|buf, record| {
        let thread_name = current_thread_name().unwrap_or_else(|| "-".to_string());
        writeln!(buf, "[{}] [{thread_name:>18}] [{:<5}] {}", buf.timestamp(), record.level(), record.args())
    });

    let inner = builder.build();
    let max_level = inner.filter();
    let logger = ThreadFilteredLogger { inner, thread_filter: thread_filter.map(str::to_string) };

    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_str_accepts_warning_and_fatal_aliases() {
        assert_eq!(level_from_str("warning"), LevelFilter::Warn);
        assert_eq!(level_from_str("fatal"), LevelFilter::Error);
        assert_eq!(level_from_str("TRACE"), LevelFilter::Trace);
        assert_eq!(level_from_str("nonsense"), LevelFilter::Info);
    }

    #[test]
    fn thread_name_round_trips_through_thread_local() {
        set_thread_name("worker-1");
        assert_eq!(current_thread_name().as_deref(), Some("worker-1"));
    }
}
