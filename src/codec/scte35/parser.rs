// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `SpliceInfoSection` parsing (SCTE-35).
//!
//! Section layout, after the 3-byte `table_id`/`section_syntax_indicator`/`section_length`
//! prefix: `protocol_version`(8) `encrypted_packet`(1) `encryption_algorithm`(6)
//! `pts_adjustment`(33) `cw_index`(8) `tier`(12) `splice_command_length`(12)
//! `splice_command_type`(8) `splice_command`(variable) `descriptor_loop_length`(16)
//! `descriptors`(variable) `CRC_32`(32). `section_length` counts everything from immediately
//! after itself to the end of section, so the minimum valid value is 17 (every fixed field
//! above except the command/descriptor bodies, which are their sizes' own business).
use crate::bitio::{read_12_high, read_12_low, read_16, read_32, read_48, read_8, read_flag, scan_8, scan_flag};
use crate::error::BinaryParseError;

use super::crc32::crc32_mpeg2;
use super::types::{
    splice_insert, splice_schedule, AvailDescriptor, BandwidthReservation, BreakDuration, DtmfDescriptor,
    PrivateCommand, SegmentationDescriptor, SpliceCommand, SpliceDescriptor, SpliceInfoSection, SpliceInsert,
    SpliceNull, SpliceSchedule, SpliceTime, TimeDescriptor, TimeSignal,
};

/// Every fixed-width field in a section besides the command and descriptor bodies.
const FIXED_SECTION_OVERHEAD: u16 = 17;

fn read_splice_time(data: &[u8], pos: &mut usize) -> Result<SpliceTime, BinaryParseError> {
    let time_specified = read_flag(data, pos, 0x80)?;
    if time_specified {
        *pos -= 1;
        let pts_time = crate::bitio::read_33(data, pos)?;
        Ok(SpliceTime { pts_time: Some(pts_time) })
    } else {
        Ok(SpliceTime { pts_time: None })
    }
}

fn read_break_duration(data: &[u8], pos: &mut usize) -> Result<BreakDuration, BinaryParseError> {
    let auto_return = read_flag(data, pos, 0x80)?;
    *pos -= 1;
    let duration = crate::bitio::read_33(data, pos)? & 0x1_FFFF_FFFF;
    Ok(BreakDuration { auto_return, duration })
}

fn read_splice_null() -> SpliceNull {
    SpliceNull
}

fn read_splice_schedule(data: &[u8], pos: &mut usize) -> Result<SpliceSchedule, BinaryParseError> {
    let splice_count = read_8(data, pos, 0xFF)?;
    let mut events = Vec::with_capacity(splice_count as usize);

    for _ in 0..splice_count {
        let id = read_32(data, pos)?;
        let cancel = read_flag(data, pos, 0x80)?;

        let more = if cancel {
            None
        } else {
            let out_of_network = read_flag(data, pos, 0x80)?;
            let program_splice_flag = scan_8(data, *pos, 0x40)? != 0;
            let duration_flag = scan_8(data, *pos, 0x20)? != 0;
            *pos += 1;

            let splice = if program_splice_flag {
                let utc_splice_time = read_32(data, pos)?;
                splice_schedule::ProgramSplice::On(splice_schedule::ProgramSpliceOn { utc_splice_time })
            } else {
                let component_count = read_8(data, pos, 0xFF)?;
                let mut components = Vec::with_capacity(component_count as usize);
                for _ in 0..component_count {
                    let component_tag = read_8(data, pos, 0xFF)?;
                    let utc_splice_time = read_32(data, pos)?;
                    components.push(splice_schedule::Component { component_tag, utc_splice_time });
                }
                splice_schedule::ProgramSplice::Off(splice_schedule::ProgramSpliceOff { components })
            };

            let break_duration = if duration_flag { Some(read_break_duration(data, pos)?) } else { None };
            let unique_program_id = read_16(data, pos)?;
            let avail_num = read_8(data, pos, 0xFF)?;
            let avails_expected = read_8(data, pos, 0xFF)?;

            Some(splice_schedule::CancelOff {
                out_of_network,
                splice,
                break_duration,
                unique_program_id,
                avail_num,
                avails_expected,
            })
        };

        events.push(splice_schedule::Event { id, more });
    }

    Ok(SpliceSchedule { events })
}

fn read_splice_insert(data: &[u8], pos: &mut usize) -> Result<SpliceInsert, BinaryParseError> {
    let id = read_32(data, pos)?;
    let cancel = read_flag(data, pos, 0x80)?;

    let more = if cancel {
        None
    } else {
        let out_of_network = read_flag(data, pos, 0x80)?;
        let program_splice = scan_8(data, *pos, 0x40)? != 0;
        let duration_flag = scan_8(data, *pos, 0x20)? != 0;
        let splice_immediate = scan_8(data, *pos, 0x10)? != 0;
        *pos += 1;

        let splice_time = if program_splice && !splice_immediate { Some(read_splice_time(data, pos)?) } else { None };

        let components = if !program_splice {
            let component_count = read_8(data, pos, 0xFF)?;
            let mut components = Vec::with_capacity(component_count as usize);
            for _ in 0..component_count {
                let component_tag = read_8(data, pos, 0xFF)?;
                let splice_time = if !splice_immediate { Some(read_splice_time(data, pos)?) } else { None };
                components.push(splice_insert::Component { component_tag, splice_time });
            }
            Some(components)
        } else {
            None
        };

        let break_duration = if duration_flag { Some(read_break_duration(data, pos)?) } else { None };
        let unique_program_id = read_16(data, pos)?;
        let avail_num = read_8(data, pos, 0xFF)?;
        let avails_expected = read_8(data, pos, 0xFF)?;

        Some(splice_insert::CancelOff {
            out_of_network,
            program_splice,
            splice_immediate,
            splice_time,
            components,
            break_duration,
            unique_program_id,
            avail_num,
            avails_expected,
        })
    };

    Ok(SpliceInsert { id, more })
}

fn read_time_signal(data: &[u8], pos: &mut usize) -> Result<TimeSignal, BinaryParseError> {
    Ok(TimeSignal { splice_time: read_splice_time(data, pos)? })
}

fn read_private_command(data: &[u8], pos: &mut usize, command_length: usize) -> Result<PrivateCommand, BinaryParseError> {
    let identifier = read_32(data, pos)?;
    let remaining = command_length.checked_sub(4).ok_or_else(|| {
        BinaryParseError::new("private command shorter than its identifier", *pos, data.len() - *pos)
    })?;
    if data.len() < *pos + remaining {
        return Err(BinaryParseError::new("truncated private command", *pos, data.len() - *pos));
    }
    let bytes = data[*pos..*pos + remaining].to_vec();
    *pos += remaining;
    Ok(PrivateCommand { identifier, bytes })
}

fn read_splice_command(
    data: &[u8],
    pos: &mut usize,
    command_type: u8,
    command_length: usize,
) -> Result<SpliceCommand, BinaryParseError> {
    let start = *pos;
    let command = match command_type {
        0x00 => SpliceCommand::Null(read_splice_null()),
        0x04 => SpliceCommand::Schedule(read_splice_schedule(data, pos)?),
        0x05 => SpliceCommand::Insert(read_splice_insert(data, pos)?),
        0x06 => SpliceCommand::TimeSignal(read_time_signal(data, pos)?),
        0x07 => SpliceCommand::BandwidthReservation(BandwidthReservation),
        0xFF => SpliceCommand::Private(read_private_command(data, pos, command_length)?),
        other => return Err(BinaryParseError::new(format!("unknown splice_command_type {other:#x}"), *pos, data.len() - *pos)),
    };

    // `splice_command_length` is authoritative: resynchronise to it rather than trust how many
    // bytes our own field-by-field parse consumed, the same way the descriptor loop does.
    let consumed = *pos - start;
    if consumed > command_length {
        return Err(BinaryParseError::new("splice_command overran its declared length", *pos, data.len() - *pos));
    }
    *pos = start + command_length;

    Ok(command)
}

fn read_descriptor(data: &[u8], pos: &mut usize) -> Result<Option<SpliceDescriptor>, BinaryParseError> {
    let tag = read_8(data, pos, 0xFF)?;
    let length = read_8(data, pos, 0xFF)? as usize;
    let start = *pos;

    if data.len() < start + length {
        return Err(BinaryParseError::new("truncated splice_descriptor", *pos, data.len() - *pos));
    }

    let descriptor = match tag {
        0x00 => {
            let identifier = read_32(data, pos)?;
            let provider_avail_id = read_32(data, pos)?;
            Some(SpliceDescriptor::Avail(AvailDescriptor { identifier, provider_avail_id }))
        }
        0x01 => {
            let identifier = read_32(data, pos)?;
            let preroll = read_8(data, pos, 0xFF)?;
            let dtmf_count = (read_8(data, pos, 0xFF)? >> 5) as usize;
            if data.len() < *pos + dtmf_count {
                return Err(BinaryParseError::new("truncated dtmf_descriptor", *pos, data.len() - *pos));
            }
            let dtmf_chars = data[*pos..*pos + dtmf_count].to_vec();
            *pos += dtmf_count;
            Some(SpliceDescriptor::Dtmf(DtmfDescriptor { identifier, preroll, dtmf_chars }))
        }
        0x02 => {
            let identifier = read_32(data, pos)?;
            let remaining = start + length - *pos;
            let payload = data[*pos..*pos + remaining].to_vec();
            *pos += remaining;
            Some(SpliceDescriptor::Segmentation(SegmentationDescriptor { identifier, data: payload }))
        }
        0x03 => {
            let identifier = read_32(data, pos)?;
            let tai_seconds = read_48(data, pos)?;
            let tai_nanoseconds = read_32(data, pos)?;
            let utc_offset = read_16(data, pos)?;
            Some(SpliceDescriptor::Time(TimeDescriptor { identifier, tai_seconds, tai_nanoseconds, utc_offset }))
        }
        _ => None,
    };

    // Resynchronise to the declared length regardless of tag, same rationale as the command loop.
    *pos = start + length;
    Ok(descriptor)
}

/// Parses a full `SpliceInfoSection` from `data`, validating its trailing CRC-32 (MPEG-2
/// convention) and `section_length` bounds. `data` may be longer than the section; only the
/// section's own declared length is consumed.
pub fn parse_splice_info_section(data: &[u8]) -> Result<SpliceInfoSection, BinaryParseError> {
    let mut pos = 0;

    let table_id = read_8(data, &mut pos, 0xFF)?;
    if table_id != SpliceInfoSection::TABLE_ID {
        return Err(BinaryParseError::new(format!("unexpected table_id {table_id:#x}"), pos, data.len() - pos));
    }

    let section_syntax_indicator = scan_flag(data, pos, 0x80)?;
    if section_syntax_indicator != SpliceInfoSection::SECTION_SYNTAX_INDICATOR {
        return Err(BinaryParseError::new("unexpected section_syntax_indicator", pos, data.len() - pos));
    }
    let private_indicator = scan_flag(data, pos, 0x40)?;
    if private_indicator != SpliceInfoSection::PRIVATE_INDICATOR {
        return Err(BinaryParseError::new("unexpected private_indicator", pos, data.len() - pos));
    }

    let section_length = read_12_high(data, &mut pos)?;
    if section_length < FIXED_SECTION_OVERHEAD {
        return Err(BinaryParseError::new("section_length below minimum", pos, data.len().saturating_sub(pos)));
    }

    let total_len = pos + section_length as usize;
    if data.len() < total_len {
        return Err(BinaryParseError::new("truncated splice_info_section", pos, data.len().saturating_sub(pos)));
    }
    let section = &data[..total_len];

    let crc = crc32_mpeg2(section);
    if crc != 0 {
        return Err(BinaryParseError::new("splice_info_section CRC-32 mismatch", total_len, 0));
    }

    let _protocol_version = read_8(section, &mut pos, 0xFF)?;

    let pts_prefix = scan_8(section, pos, 0xFF)?;
    let encrypted_packet = pts_prefix & 0x80 != 0;
    let encryption_algorithm = (pts_prefix >> 1) & 0x3F;
    let pts_adjustment = crate::bitio::read_33(section, &mut pos)?;

    let cw_index = read_8(section, &mut pos, 0xFF)?;
    let (tier, splice_command_length) = read_12_low(section, &mut pos)?;
    let splice_command_type = read_8(section, &mut pos, 0xFF)?;
    let command = read_splice_command(section, &mut pos, splice_command_type, splice_command_length as usize)?;

    let descriptor_loop_length = read_16(section, &mut pos)? as usize;
    let descriptor_end = pos + descriptor_loop_length;
    if section.len() < descriptor_end {
        return Err(BinaryParseError::new("truncated descriptor loop", pos, section.len() - pos));
    }

    let mut descriptors = Vec::new();
    while pos < descriptor_end {
        if let Some(descriptor) = read_descriptor(section, &mut pos)? {
            descriptors.push(descriptor);
        }
    }
    pos = descriptor_end;

    // Remaining bytes before the trailing CRC are alignment_stuffing (and an E_CRC_32 field when
    // `encrypted_packet` is set); neither is modeled here since encrypted sections are otherwise
    // unsupported (flagged, but not decrypted).
    let _ = pos;

    Ok(SpliceInfoSection {
        encrypted_packet,
        encryption_algorithm,
        pts_adjustment,
        cw_index,
        tier,
        command,
        descriptors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::scte35::emitter::emit_splice_info_section;

    #[test]
    fn splice_null_roundtrips_through_emit_and_parse() {
        let section = SpliceInfoSection::splice_null(0x0FFF);
        let mut out = Vec::new();
        emit_splice_info_section(&section, &mut out);

        let parsed = parse_splice_info_section(&out).unwrap();
        assert_eq!(parsed, section);
    }

    #[test]
    fn rejects_wrong_table_id() {
        let mut out = Vec::new();
        emit_splice_info_section(&SpliceInfoSection::splice_null(0), &mut out);
        out[0] = 0x00;
        assert!(parse_splice_info_section(&out).is_err());
    }

    #[test]
    fn rejects_nonzero_section_syntax_indicator() {
        let mut out = Vec::new();
        emit_splice_info_section(&SpliceInfoSection::splice_null(0), &mut out);
        out[1] |= 0x80;
        assert!(parse_splice_info_section(&out).is_err());
    }

    #[test]
    fn rejects_nonzero_private_indicator() {
        let mut out = Vec::new();
        emit_splice_info_section(&SpliceInfoSection::splice_null(0), &mut out);
        out[1] |= 0x40;
        assert!(parse_splice_info_section(&out).is_err());
    }

    #[test]
    fn rejects_corrupted_crc() {
        let mut out = Vec::new();
        emit_splice_info_section(&SpliceInfoSection::splice_null(0), &mut out);
        let last = out.len() - 1;
        out[last] ^= 0xFF;
        assert!(parse_splice_info_section(&out).is_err());
    }

    #[test]
    fn time_signal_with_avail_descriptor_roundtrips() {
        let section = SpliceInfoSection {
            encrypted_packet: false,
            encryption_algorithm: 0,
            pts_adjustment: 0,
            cw_index: 0,
            tier: 0xFFF,
            command: SpliceCommand::TimeSignal(TimeSignal { splice_time: SpliceTime { pts_time: Some(900_000) } }),
            descriptors: vec![SpliceDescriptor::Avail(AvailDescriptor {
                identifier: super::super::types::CUEI,
                provider_avail_id: 42,
            })],
        };
        let mut out = Vec::new();
        emit_splice_info_section(&section, &mut out);
        let parsed = parse_splice_info_section(&out).unwrap();
        assert_eq!(parsed, section);
    }
}
