// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A live video-metadata multiplexer.
//!
//! Each configured input is demuxed on its own thread: H.264 SEI closed-caption payloads and
//! SCTE-35 splice-info sections are pulled out of its packets and pushed onto queues shared with
//! every other input ([`queue`]), while the input's own stream is remuxed unchanged into its
//! mirror sink ([`pipeline::extractor`]). A separate output thread rewrites one selected input's
//! metadata into the primary program stream ([`pipeline::injector`]), choosing which input to
//! read from at runtime via the [`input`] registry. A JSON HTTP API ([`control`]) exposes stats
//! and lets operators change the current input or restart one without restarting the process.
//!
//! The [codec] module contains the H.264 NALU/SEI and SCTE-35 parsers this all runs on top of;
//! [clock] provides the shared timebase every input's timestamps are rescaled onto.

pub mod bitio;
pub mod clock;
pub mod codec;
pub mod config;
pub mod container;
pub mod context;
pub mod control;
pub mod error;
pub mod input;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod queue;
pub mod supervisor;
