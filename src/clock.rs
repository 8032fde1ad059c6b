// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The shared monotonic clock and the per-stream timestamp machinery built on top of it.
//!
//! `StreamTS` is a timestamp in a source's own rational time base; `ClockTS` is a timestamp in
//! the global clock's fixed 90 kHz time base. [`TSTicker`] advances the clock from a sequence of
//! stream PTS values; [`TSRescaler`] maps a stream's PTS values onto the clock's time base.

use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use num_rational::Rational32;

/// The clock's fixed tick rate, in Hz.
pub const SYS_CLOCK_RATE: i32 = 90_000;

pub type TimeBase = Rational32;

/// Strongly-typed wrapper so a stream timestamp and a clock timestamp can never be confused at
/// a type level, even though both are backed by `i64`.
macro_rules! strong_ts {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn new(val: i64) -> Self {
                Self(val)
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }
    };
}

strong_ts!(StreamTS);
strong_ts!(ClockTS);

/// One clock tick, for `ClockTS + 1_clock`-style expressions.
pub const ONE_CLOCK_TICK: ClockTS = ClockTS(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTimeBase(pub TimeBase);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockTimeBase(pub TimeBase);

impl ClockTimeBase {
    pub fn system() -> Self {
        Self(TimeBase::new(1, SYS_CLOCK_RATE))
    }
}

/// Rescales `ts`, expressed in `from`, into `to`'s time base, rounding to nearest with ties
/// broken away from zero, matching `av_rescale_q`'s default `AV_ROUND_NEAR_INF` rounding mode.
pub fn rescale(ts: i64, from: TimeBase, to: TimeBase) -> i64 {
    if ts == 0 {
        return 0;
    }
    // ts * from / to, computed as a single rational to keep full precision before rounding.
    let factor = (from * Rational32::new(1, 1)) / to;
    let num = (ts as i128) * (*factor.numer() as i128);
    let den = *factor.denom() as i128;
    let q = num / den;
    let r = num % den;
    // round to nearest, ties away from zero
    if r * 2 >= den.abs() {
        (q + 1) as i64
    } else if r * 2 <= -den.abs() {
        (q - 1) as i64
    } else {
        q as i64
    }
}

/// A single shared monotonically non-decreasing timestamp. `increment` is the only mutator and
/// silently ignores negative deltas: the clock never goes backward.
#[derive(Debug)]
pub struct Clock {
    now: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Self { now: AtomicI64::new(0) }
    }

    pub fn now(&self) -> ClockTS {
        ClockTS(self.now.load(Ordering::Acquire))
    }

    pub fn increment(&self, delta: ClockTS) {
        if delta.0 < 0 {
            return;
        }
        self.now.fetch_add(delta.0, Ordering::AcqRel);
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Advances a [`Clock`] from a monotonically-intended sequence of stream PTS values, tolerant of
/// individual non-monotonic samples (they simply contribute zero).
pub struct TSTicker {
    clock: Arc<Clock>,
    last_pts: Option<ClockTS>,
}

impl TSTicker {
    pub fn new(clock: Arc<Clock>) -> Self {
        Self { clock, last_pts: None }
    }

    /// Advances the clock by `max(0, pts - last_pts)`; the very first call advances by `pts`
    /// itself (as if `last_pts` were zero).
    pub fn tick(&mut self, pts: ClockTS) {
        let last = self.last_pts.unwrap_or(ClockTS(0));
        let delta = pts - last;
        self.clock.increment(delta);
        self.last_pts = Some(pts);
    }
}

/// Maps a stream's own PTS values onto the shared clock's time base, anchoring the first
/// observed sample to the clock's value at construction time.
pub struct TSRescaler {
    clock: Arc<Clock>,
    stream_tb: TimeBase,
    clock_tb: TimeBase,
    base: ClockTS,
    ts_zero: Option<StreamTS>,
}

impl TSRescaler {
    /// Anchors the rescaler to the clock's *current* value; every subsequent rescale is relative
    /// to both that base and the first stream PTS seen.
    pub fn clock_relative(clock: Arc<Clock>, stream_tb: StreamTimeBase) -> Self {
        let base = clock.now();
        Self { clock, stream_tb: stream_tb.0, clock_tb: ClockTimeBase::system().0, base, ts_zero: None }
    }

    pub fn rescale_to_clock(&mut self, ts: StreamTS) -> ClockTS {
        let ts_zero = *self.ts_zero.get_or_insert(ts);
        let delta = ts.0 - ts_zero.0;
        ClockTS(self.base.0 + rescale(delta, self.stream_tb, self.clock_tb))
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }
}
