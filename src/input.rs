// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The input registry: every configured source, the always-present virtual `clear` source, and
//! the per-kind "currently selected" pointer an extractor/injector consults each frame.
//!
//! The reference design this is grounded on models inputs as a small class hierarchy
//! (`AbstractInput` base, `ClearInput`/`UserDefinedInput` subclasses) dispatched through virtual
//! calls and a `dynamic_cast`-based lookup. Per the redesign notes this becomes a closed enum
//! (`AbstractInput`) matched directly, and the per-kind virtual dispatch becomes the `KindQueue`
//! trait below, implemented once per kind and picked at compile time by the caller's type
//! parameter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::{ClockTS, ONE_CLOCK_TICK};
use crate::codec::h264::stdseis;
use crate::codec::scte35::types::SpliceInfoSection;
use crate::error::ValidationError;
use crate::metadata::{InputId, Kind, Metadata, MetadataKind, ScteKind, SeiKind};
use crate::queue::{MetadataQueue, QueueGroup};

pub const CLEAR_INPUT_ID: InputId = 0;
pub const CLEAR_INPUT_NAME: &str = "clear";

/// A configured source: its id, display name, container URLs, and whether it is the built-in
/// virtual `clear` source (id 0, never backed by a real extractor thread).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub id: InputId,
    pub name: String,
    pub source: String,
    pub sink: String,
    pub source_format: Option<String>,
    pub sink_format: Option<String>,
    pub is_virtual: bool,
}

impl InputSpec {
    pub fn clear() -> Self {
        Self {
            id: CLEAR_INPUT_ID,
            name: CLEAR_INPUT_NAME.to_string(),
            source: String::new(),
            sink: String::new(),
            source_format: None,
            sink_format: None,
            is_virtual: true,
        }
    }
}

/// Per-kind "does this input ever supply this kind" flags, set the first time a real input
/// pushes a record of that kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputCapabilities {
    pub sei: bool,
    pub scte: bool,
}

impl InputCapabilities {
    pub fn has(&self, kind: MetadataKind) -> bool {
        match kind {
            MetadataKind::Sei => self.sei,
            MetadataKind::Scte => self.scte,
        }
    }

    pub fn set(&mut self, kind: MetadataKind) {
        match kind {
            MetadataKind::Sei => self.sei = true,
            MetadataKind::Scte => self.scte = true,
        }
    }
}

/// Compile-time counterpart of [`InputCapabilities::has`]: for a given kind, which queue to push
/// to / pop from, and what to synthesise when the real queue has nothing.
pub trait KindQueue: Kind {
    fn queue(group: &QueueGroup) -> &MetadataQueue<Self>;
    /// A "nothing to report" record, substituted so every output frame still carries a
    /// well-formed payload.
    fn empty(input_id: InputId, ts: ClockTS) -> Metadata<Self>;
    /// The record the `clear` input and a selection change emit: for SEI, erases prior captions;
    /// for SCTE there is no separate notion of "reset" so this is the same as [`Self::empty`].
    fn reset(input_id: InputId, ts: ClockTS) -> Metadata<Self>;
}

impl KindQueue for SeiKind {
    fn queue(group: &QueueGroup) -> &MetadataQueue<Self> {
        &group.sei
    }

    fn empty(input_id: InputId, ts: ClockTS) -> Metadata<Self> {
        stdseis::build_empty_metadata(input_id, ts)
    }

    fn reset(input_id: InputId, ts: ClockTS) -> Metadata<Self> {
        stdseis::build_cc_reset_metadata(input_id, ts)
    }
}

fn splice_null_metadata(input_id: InputId, ts: ClockTS) -> Metadata<ScteKind> {
    Metadata::new(input_id, ts, ts, 0, Arc::new(SpliceInfoSection::splice_null(0x0FFF)))
}

impl KindQueue for ScteKind {
    fn queue(group: &QueueGroup) -> &MetadataQueue<Self> {
        &group.scte
    }

    fn empty(input_id: InputId, ts: ClockTS) -> Metadata<Self> {
        splice_null_metadata(input_id, ts)
    }

    fn reset(input_id: InputId, ts: ClockTS) -> Metadata<Self> {
        splice_null_metadata(input_id, ts)
    }
}

/// A real, configured source backed by an extractor thread.
pub struct UserDefinedInput {
    pub spec: InputSpec,
    queues: Arc<QueueGroup>,
    caps: Mutex<InputCapabilities>,
    restart_scheduled: AtomicBool,
}

impl UserDefinedInput {
    pub fn new(spec: InputSpec, queues: Arc<QueueGroup>) -> Self {
        Self { spec, queues, caps: Mutex::new(InputCapabilities::default()), restart_scheduled: AtomicBool::new(false) }
    }

    /// Records the capability flag for `K` and forwards `record` into the shared queue; called by
    /// this input's extractor thread.
    pub fn push<K: KindQueue>(&self, record: Metadata<K>) {
        self.caps.lock().unwrap().set(K::TAG);
        K::queue(&self.queues).push(record);
    }

    pub fn schedule_restart(&self) {
        self.restart_scheduled.store(true, Ordering::Release);
    }

    pub fn is_restart_scheduled(&self) -> bool {
        self.restart_scheduled.load(Ordering::Acquire)
    }

    pub fn reset_restart(&self) {
        self.restart_scheduled.store(false, Ordering::Release);
    }

    pub fn caps(&self) -> InputCapabilities {
        *self.caps.lock().unwrap()
    }

    fn query<K: KindQueue>(&self, since: ClockTS, until: ClockTS) -> Vec<Metadata<K>> {
        K::queue(&self.queues).pop_all(self.spec.id, since, until)
    }
}

/// Every input this system can select metadata from: the always-present virtual `clear` source,
/// or a real, configured source.
pub enum AbstractInput {
    Clear { id: InputId },
    UserDefined(UserDefinedInput),
}

impl AbstractInput {
    pub fn id(&self) -> InputId {
        match self {
            AbstractInput::Clear { id } => *id,
            AbstractInput::UserDefined(u) => u.spec.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AbstractInput::Clear { .. } => CLEAR_INPUT_NAME,
            AbstractInput::UserDefined(u) => &u.spec.name,
        }
    }

    pub fn spec(&self) -> InputSpec {
        match self {
            AbstractInput::Clear { id } => InputSpec { id: *id, ..InputSpec::clear() },
            AbstractInput::UserDefined(u) => u.spec.clone(),
        }
    }

    pub fn caps(&self) -> InputCapabilities {
        match self {
            AbstractInput::Clear { .. } => InputCapabilities { sei: true, scte: true },
            AbstractInput::UserDefined(u) => u.caps(),
        }
    }

    pub fn schedule_restart(&self) {
        if let AbstractInput::UserDefined(u) = self {
            u.schedule_restart();
        }
    }

    pub fn is_restart_scheduled(&self) -> bool {
        match self {
            AbstractInput::UserDefined(u) => u.is_restart_scheduled(),
            AbstractInput::Clear { .. } => false,
        }
    }

    pub fn reset_restart(&self) {
        if let AbstractInput::UserDefined(u) = self {
            u.reset_restart();
        }
    }

    /// Every metadata record this input supplies in `[since, until)`. A real input with no
    /// matching records, and the `clear` input always, fall back to a single synthesised record
    /// at `until - 1` tick so every output frame still carries a well-formed payload.
    pub fn query<K: KindQueue>(&self, since: ClockTS, until: ClockTS) -> Vec<Metadata<K>> {
        match self {
            AbstractInput::Clear { id } => vec![K::reset(*id, until - ONE_CLOCK_TICK)],
            AbstractInput::UserDefined(u) => {
                let found = u.query::<K>(since, until);
                if found.is_empty() {
                    vec![K::empty(u.spec.id, until - ONE_CLOCK_TICK)]
                } else {
                    found
                }
            }
        }
    }
}

struct CurrentInputIds {
    sei: AtomicU32,
    scte: AtomicU32,
}

/// The stable map from input id/name to input object, plus the per-kind "currently selected"
/// pointer. Built once at startup; inputs are never added or removed afterward.
pub struct InputManager {
    inputs: HashMap<InputId, AbstractInput>,
    names: HashMap<String, InputId>,
    current: CurrentInputIds,
}

impl InputManager {
    pub fn new(inputs: Vec<AbstractInput>) -> Self {
        let mut map = HashMap::with_capacity(inputs.len());
        let mut names = HashMap::with_capacity(inputs.len());
        for input in inputs {
            names.insert(input.name().to_string(), input.id());
            map.insert(input.id(), input);
        }
        Self {
            inputs: map,
            names,
            current: CurrentInputIds { sei: AtomicU32::new(CLEAR_INPUT_ID), scte: AtomicU32::new(CLEAR_INPUT_ID) },
        }
    }

    pub fn get_by_id(&self, id: InputId) -> Option<&AbstractInput> {
        self.inputs.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&AbstractInput> {
        self.names.get(name).and_then(|id| self.inputs.get(id))
    }

    pub fn is_valid_id(&self, id: InputId) -> bool {
        self.inputs.contains_key(&id)
    }

    pub fn current_id(&self, kind: MetadataKind) -> InputId {
        match kind {
            MetadataKind::Sei => self.current.sei.load(Ordering::Acquire),
            MetadataKind::Scte => self.current.scte.load(Ordering::Acquire),
        }
    }

    pub fn current_input(&self, kind: MetadataKind) -> &AbstractInput {
        self.inputs.get(&self.current_id(kind)).expect("current input id always refers to a registered input")
    }

    /// Selects `id` as the active input for `kind`. Fails if `id` is not registered; merely logs
    /// a warning (does not fail) if the target has not declared capability for `kind`.
    pub fn set_current(&self, kind: MetadataKind, id: InputId) -> Result<(), ValidationError> {
        let input = self.inputs.get(&id).ok_or(ValidationError::UnknownInputId(id))?;
        if !input.caps().has(kind) {
            log::warn!("input #{id} ({}) has not declared {kind} capability; selecting anyway", input.name());
        }
        match kind {
            MetadataKind::Sei => self.current.sei.store(id, Ordering::Release),
            MetadataKind::Scte => self.current.scte.store(id, Ordering::Release),
        }
        log::info!("{kind} now sourced from input #{id} ({})", input.name());
        Ok(())
    }

    pub fn set_current_by_name(&self, kind: MetadataKind, name: &str) -> Result<(), ValidationError> {
        let id = *self.names.get(name).ok_or_else(|| ValidationError::UnknownInputName(name.to_string()))?;
        self.set_current(kind, id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbstractInput> {
        self.inputs.values()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_one_input() -> InputManager {
        let queues = Arc::new(QueueGroup::new());
        let spec = InputSpec { id: 1, name: "cam1".to_string(), ..InputSpec::clear() };
        let input = AbstractInput::UserDefined(UserDefinedInput::new(spec, queues));
        InputManager::new(vec![AbstractInput::Clear { id: CLEAR_INPUT_ID }, input])
    }

    #[test]
    fn set_current_rejects_unknown_id() {
        let mgr = manager_with_one_input();
        assert!(mgr.set_current(MetadataKind::Sei, 99).is_err());
    }

    #[test]
    fn set_current_by_name_resolves_and_updates_atomics() {
        let mgr = manager_with_one_input();
        mgr.set_current_by_name(MetadataKind::Sei, "cam1").unwrap();
        assert_eq!(mgr.current_id(MetadataKind::Sei), 1);
        assert_eq!(mgr.current_id(MetadataKind::Scte), CLEAR_INPUT_ID);
    }

    #[test]
    fn clear_input_query_synthesises_reset_at_until_minus_one() {
        let clear = AbstractInput::Clear { id: CLEAR_INPUT_ID };
        let found: Vec<Metadata<SeiKind>> = clear.query(ClockTS(0), ClockTS(100));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pts, ClockTS(99));
        assert_eq!(found[0].order, i32::MIN);
    }

    #[test]
    fn user_defined_query_falls_back_to_empty_when_queue_has_nothing() {
        let queues = Arc::new(QueueGroup::new());
        let spec = InputSpec { id: 1, name: "cam1".to_string(), ..InputSpec::clear() };
        let input = UserDefinedInput::new(spec, queues);
        let found: Vec<Metadata<SeiKind>> = AbstractInput::UserDefined(input).query(ClockTS(0), ClockTS(50));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order, i32::MAX);
    }

    #[test]
    fn user_defined_push_sets_capability_and_is_visible_to_query() {
        let queues = Arc::new(QueueGroup::new());
        let spec = InputSpec { id: 1, name: "cam1".to_string(), ..InputSpec::clear() };
        let input = UserDefinedInput::new(spec, queues);

        let payload = Arc::new(crate::codec::h264::sei::OwnedSeiPayload::new(
            crate::codec::h264::sei::SeiType::UserDataRegistered,
            vec![1, 2, 3],
        ));
        input.push(Metadata::<SeiKind>::new(1, ClockTS(10), ClockTS(10), 0, payload));
        assert!(input.caps().sei);

        let found: Vec<Metadata<SeiKind>> = AbstractInput::UserDefined(input).query(ClockTS(0), ClockTS(20));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pts, ClockTS(10));
    }
}
