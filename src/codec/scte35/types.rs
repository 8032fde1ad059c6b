// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The SCTE-35 `SpliceInfoSection` type model: the splice-command union and the descriptor
//! union it can carry.

/// Identifier required by every SCTE-35 descriptor: ASCII "CUEI".
pub const CUEI: u32 = 0x4355_4549;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceTime {
    pub pts_time: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakDuration {
    pub auto_return: bool,
    pub duration: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpliceNull;

pub mod splice_schedule {
    use super::BreakDuration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProgramSpliceOn {
        pub utc_splice_time: u32,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Component {
        pub component_tag: u8,
        pub utc_splice_time: u32,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ProgramSpliceOff {
        pub components: Vec<Component>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ProgramSplice {
        On(ProgramSpliceOn),
        Off(ProgramSpliceOff),
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CancelOff {
        pub out_of_network: bool,
        pub splice: ProgramSplice,
        pub break_duration: Option<BreakDuration>,
        pub unique_program_id: u16,
        pub avail_num: u8,
        pub avails_expected: u8,
    }

    impl CancelOff {
        pub fn program_splice_flag(&self) -> bool {
            matches!(self.splice, ProgramSplice::On(_))
        }

        pub fn duration_flag(&self) -> bool {
            self.break_duration.is_some()
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Event {
        pub id: u32,
        pub more: Option<CancelOff>,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpliceSchedule {
    pub events: Vec<splice_schedule::Event>,
}

pub mod splice_insert {
    use super::{BreakDuration, SpliceTime};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Component {
        pub component_tag: u8,
        pub splice_time: Option<SpliceTime>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CancelOff {
        pub out_of_network: bool,
        pub program_splice: bool,
        pub splice_immediate: bool,
        pub splice_time: Option<SpliceTime>,
        pub components: Option<Vec<Component>>,
        pub break_duration: Option<BreakDuration>,
        pub unique_program_id: u16,
        pub avail_num: u8,
        pub avails_expected: u8,
    }

    impl CancelOff {
        pub fn duration_flag(&self) -> bool {
            self.break_duration.is_some()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceInsert {
    pub id: u32,
    pub more: Option<splice_insert::CancelOff>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignal {
    pub splice_time: SpliceTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BandwidthReservation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateCommand {
    pub identifier: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceCommand {
    Null(SpliceNull),
    Schedule(SpliceSchedule),
    Insert(SpliceInsert),
    TimeSignal(TimeSignal),
    BandwidthReservation(BandwidthReservation),
    Private(PrivateCommand),
}

impl SpliceCommand {
    pub fn splice_command_type(&self) -> u8 {
        match self {
            SpliceCommand::Null(_) => 0x00,
            SpliceCommand::Schedule(_) => 0x04,
            SpliceCommand::Insert(_) => 0x05,
            SpliceCommand::TimeSignal(_) => 0x06,
            SpliceCommand::BandwidthReservation(_) => 0x07,
            SpliceCommand::Private(_) => 0xFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailDescriptor {
    pub identifier: u32,
    pub provider_avail_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtmfDescriptor {
    pub identifier: u32,
    pub preroll: u8,
    pub dtmf_chars: Vec<u8>,
}

/// The segmentation descriptor's inner fields (event id, UPID, segmentation type code, etc.) are
/// carried opaquely after the CUEI identifier: decoding them is out of scope here, the same as
/// in the implementation this design is grounded on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationDescriptor {
    pub identifier: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeDescriptor {
    pub identifier: u32,
    pub tai_seconds: u64,
    pub tai_nanoseconds: u32,
    pub utc_offset: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceDescriptor {
    Avail(AvailDescriptor),
    Dtmf(DtmfDescriptor),
    Segmentation(SegmentationDescriptor),
    Time(TimeDescriptor),
}

impl SpliceDescriptor {
    pub fn tag(&self) -> u8 {
        match self {
            SpliceDescriptor::Avail(_) => 0x00,
            SpliceDescriptor::Dtmf(_) => 0x01,
            SpliceDescriptor::Segmentation(_) => 0x02,
            SpliceDescriptor::Time(_) => 0x03,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceInfoSection {
    pub encrypted_packet: bool,
    pub encryption_algorithm: u8,
    pub pts_adjustment: u64,
    pub cw_index: u8,
    pub tier: u16,
    pub command: SpliceCommand,
    pub descriptors: Vec<SpliceDescriptor>,
}

impl SpliceInfoSection {
    pub const TABLE_ID: u8 = 0xFC;
    pub const SECTION_SYNTAX_INDICATOR: bool = false;
    pub const PRIVATE_INDICATOR: bool = false;
    pub const PROTOCOL_VERSION: u8 = 0;

    /// A minimal, canonical `SpliceNull` section with no descriptors: used by the virtual
    /// `clear` input to synthesise an ad-marker record when no real source is selected.
    pub fn splice_null(tier: u16) -> Self {
        Self {
            encrypted_packet: false,
            encryption_algorithm: 0,
            pts_adjustment: 0,
            cw_index: 0,
            tier,
            command: SpliceCommand::Null(SpliceNull),
            descriptors: Vec::new(),
        }
    }
}
