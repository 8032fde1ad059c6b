// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The closed set of metadata kinds the multiplexer understands, and the record type that
//! carries one instance of a kind through the queue.
//!
//! The reference design this system is grounded on models "kind" as a template-metaprogrammed
//! type pack (one C++ template instantiated per kind, with a compile-time `for_each` over the
//! pack). Per the redesign notes, this becomes a plain enum (`MetadataKind`) for runtime
//! dispatch plus a small `Kind` trait for compile-time dispatch (picking the payload type and the
//! human-readable names), which is enough to replace every use of the original type pack.

use std::fmt;
use std::sync::Arc;

use crate::clock::ClockTS;
use crate::codec::h264::sei::OwnedSeiPayload;
use crate::codec::scte35::types::SpliceInfoSection;

pub type InputId = u32;

/// Runtime tag for a metadata kind, used where a fixed enum (match tables, JSON keys, log lines)
/// is more natural than a generic type parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Sei,
    Scte,
}

impl MetadataKind {
    pub const ALL: [MetadataKind; 2] = [MetadataKind::Sei, MetadataKind::Scte];

    pub fn name(self) -> &'static str {
        match self {
            MetadataKind::Sei => SeiKind::NAME,
            MetadataKind::Scte => ScteKind::NAME,
        }
    }

    pub fn api_name(self) -> &'static str {
        match self {
            MetadataKind::Sei => SeiKind::API_NAME,
            MetadataKind::Scte => ScteKind::API_NAME,
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Compile-time counterpart of [`MetadataKind`]: a zero-sized marker type per kind, picking out
/// the payload type it carries and the names used in logs / the control surface.
pub trait Kind: Copy + Clone + fmt::Debug + 'static {
    type Value: fmt::Debug;
    const TAG: MetadataKind;
    const NAME: &'static str;
    const API_NAME: &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct SeiKind;

impl Kind for SeiKind {
    type Value = OwnedSeiPayload;
    const TAG: MetadataKind = MetadataKind::Sei;
    const NAME: &'static str = "SEICC";
    const API_NAME: &'static str = "closedCaption";
}

#[derive(Debug, Clone, Copy)]
pub struct ScteKind;

impl Kind for ScteKind {
    type Value = SpliceInfoSection;
    const TAG: MetadataKind = MetadataKind::Scte;
    const NAME: &'static str = "SCTE35";
    const API_NAME: &'static str = "adMarker";
}

/// A single metadata record: which input produced it, when it applies, and its payload.
///
/// `val` is an `Arc` because the same record is sometimes re-read by multiple queries (e.g. the
/// `clear` input's synthesised records are shared across every query of the same kind) without
/// needing to clone the payload itself.
#[derive(Debug, Clone)]
pub struct Metadata<K: Kind> {
    pub input_id: InputId,
    pub pts: ClockTS,
    pub dts: ClockTS,
    pub order: i32,
    pub val: Arc<K::Value>,
}

impl<K: Kind> Metadata<K> {
    pub fn new(input_id: InputId, pts: ClockTS, dts: ClockTS, order: i32, val: Arc<K::Value>) -> Self {
        Self { input_id, pts, dts, order, val }
    }
}
