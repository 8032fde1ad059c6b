// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `SpliceInfoSection` emission (SCTE-35).
//!
//! Every type that appears inside a section has an `emit_size_hint` so the section length and
//! loop lengths can be computed before any bytes are written. The command and descriptor loop
//! are each built into a scratch buffer first (so their own lengths are known), then the whole
//! section is streamed through a [`Crc32Writer`] so the trailing CRC-32 falls out of the same
//! pass instead of a second rescan.

use crate::bitio::{write_12_pair, write_12_prefix, write_16, write_32, write_33_prefix, write_48, write_8};

use super::crc32::make_crc32_writer;
use super::types::{
    splice_schedule, BreakDuration, SpliceCommand, SpliceDescriptor, SpliceInfoSection, SpliceTime,
};

fn splice_time_size_hint(time: &Option<SpliceTime>) -> usize {
    match time {
        Some(SpliceTime { pts_time: Some(_) }) => 5,
        _ => 1,
    }
}

fn emit_splice_time(time: &SpliceTime, out: &mut Vec<u8>) {
    match time.pts_time {
        Some(pts) => write_33_prefix(0x80, pts, out),
        None => out.push(0x7F),
    }
}

const BREAK_DURATION_SIZE: usize = 5;

fn emit_break_duration(duration: &BreakDuration, out: &mut Vec<u8>) {
    let prefix = if duration.auto_return { 0x80 } else { 0x00 };
    write_33_prefix(prefix, duration.duration, out);
}

fn splice_schedule_size_hint(schedule: &splice_schedule::ProgramSplice) -> usize {
    match schedule {
        splice_schedule::ProgramSplice::On(_) => 4,
        splice_schedule::ProgramSplice::Off(off) => 1 + off.components.len() * 5,
    }
}

fn command_size_hint(command: &SpliceCommand) -> usize {
    match command {
        SpliceCommand::Null(_) => 0,
        SpliceCommand::Schedule(schedule) => {
            1 + schedule
                .events
                .iter()
                .map(|event| {
                    4 + 1
                        + event
                            .more
                            .as_ref()
                            .map(|more| {
                                1 + splice_schedule_size_hint(&more.splice)
                                    + more.break_duration.as_ref().map(|_| BREAK_DURATION_SIZE).unwrap_or(0)
                                    + 4
                            })
                            .unwrap_or(0)
                })
                .sum::<usize>()
        }
        SpliceCommand::Insert(insert) => {
            4 + 1
                + insert
                    .more
                    .as_ref()
                    .map(|more| {
                        1 + if more.program_splice && !more.splice_immediate {
                            splice_time_size_hint(&more.splice_time)
                        } else {
                            0
                        } + if !more.program_splice {
                            1 + more
                                .components
                                .as_ref()
                                .map(|cs| {
                                    cs.iter()
                                        .map(|c| {
                                            1 + if !more.splice_immediate {
                                                splice_time_size_hint(&c.splice_time)
                                            } else {
                                                0
                                            }
                                        })
                                        .sum::<usize>()
                                })
                                .unwrap_or(0)
                        } else {
                            0
                        } + more.break_duration.as_ref().map(|_| BREAK_DURATION_SIZE).unwrap_or(0)
                            + 4
                    })
                    .unwrap_or(0)
        }
        SpliceCommand::TimeSignal(signal) => splice_time_size_hint(&Some(signal.splice_time)),
        SpliceCommand::BandwidthReservation(_) => 0,
        SpliceCommand::Private(private) => 4 + private.bytes.len(),
    }
}

fn emit_command(command: &SpliceCommand, out: &mut Vec<u8>) {
    match command {
        SpliceCommand::Null(_) => {}
        SpliceCommand::Schedule(schedule) => {
            write_8(schedule.events.len() as u8, out);
            for event in &schedule.events {
                write_32(event.id, out);
                let cancel = event.more.is_none();
                write_8(if cancel { 0x80 } else { 0x00 }, out);
                if let Some(more) = &event.more {
                    let program_splice_flag = matches!(more.splice, splice_schedule::ProgramSplice::On(_));
                    let duration_flag = more.break_duration.is_some();
                    let flags = (if more.out_of_network { 0x80 } else { 0 })
                        | (if program_splice_flag { 0x40 } else { 0 })
                        | (if duration_flag { 0x20 } else { 0 });
                    write_8(flags, out);

                    match &more.splice {
                        splice_schedule::ProgramSplice::On(on) => write_32(on.utc_splice_time, out),
                        splice_schedule::ProgramSplice::Off(off) => {
                            write_8(off.components.len() as u8, out);
                            for c in &off.components {
                                write_8(c.component_tag, out);
                                write_32(c.utc_splice_time, out);
                            }
                        }
                    }

                    if let Some(duration) = &more.break_duration {
                        emit_break_duration(duration, out);
                    }
                    write_16(more.unique_program_id, out);
                    write_8(more.avail_num, out);
                    write_8(more.avails_expected, out);
                }
            }
        }
        SpliceCommand::Insert(insert) => {
            write_32(insert.id, out);
            let cancel = insert.more.is_none();
            write_8(if cancel { 0x80 } else { 0x00 }, out);
            if let Some(more) = &insert.more {
                let duration_flag = more.break_duration.is_some();
                let flags = (if more.out_of_network { 0x80 } else { 0 })
                    | (if more.program_splice { 0x40 } else { 0 })
                    | (if duration_flag { 0x20 } else { 0 })
                    | (if more.splice_immediate { 0x10 } else { 0 });
                write_8(flags, out);

                if more.program_splice && !more.splice_immediate {
                    if let Some(time) = &more.splice_time {
                        emit_splice_time(time, out);
                    }
                }

                if !more.program_splice {
                    let components = more.components.as_deref().unwrap_or(&[]);
                    write_8(components.len() as u8, out);
                    for c in components {
                        write_8(c.component_tag, out);
                        if !more.splice_immediate {
                            if let Some(time) = &c.splice_time {
                                emit_splice_time(time, out);
                            }
                        }
                    }
                }

                if let Some(duration) = &more.break_duration {
                    emit_break_duration(duration, out);
                }
                write_16(more.unique_program_id, out);
                write_8(more.avail_num, out);
                write_8(more.avails_expected, out);
            }
        }
        SpliceCommand::TimeSignal(signal) => emit_splice_time(&signal.splice_time, out),
        SpliceCommand::BandwidthReservation(_) => {}
        SpliceCommand::Private(private) => {
            write_32(private.identifier, out);
            out.extend_from_slice(&private.bytes);
        }
    }
}

fn descriptor_body_size_hint(descriptor: &SpliceDescriptor) -> usize {
    match descriptor {
        SpliceDescriptor::Avail(_) => 4 + 4,
        SpliceDescriptor::Dtmf(d) => 4 + 1 + 1 + d.dtmf_chars.len(),
        SpliceDescriptor::Segmentation(d) => 4 + d.data.len(),
        SpliceDescriptor::Time(_) => 4 + 6 + 4 + 2,
    }
}

fn descriptors_size_hint(descriptors: &[SpliceDescriptor]) -> usize {
    descriptors.iter().map(|d| 2 + descriptor_body_size_hint(d)).sum()
}

fn emit_descriptor(descriptor: &SpliceDescriptor, out: &mut Vec<u8>) {
    write_8(descriptor.tag(), out);
    write_8(descriptor_body_size_hint(descriptor) as u8, out);

    match descriptor {
        SpliceDescriptor::Avail(d) => {
            write_32(d.identifier, out);
            write_32(d.provider_avail_id, out);
        }
        SpliceDescriptor::Dtmf(d) => {
            write_32(d.identifier, out);
            write_8(d.preroll, out);
            write_8((d.dtmf_chars.len() as u8) << 5, out);
            out.extend_from_slice(&d.dtmf_chars);
        }
        SpliceDescriptor::Segmentation(d) => {
            write_32(d.identifier, out);
            out.extend_from_slice(&d.data);
        }
        SpliceDescriptor::Time(d) => {
            write_32(d.identifier, out);
            write_48(d.tai_seconds, out);
            write_32(d.tai_nanoseconds, out);
            write_16(d.utc_offset, out);
        }
    }
}

/// Computes `17 + emit_size_hint(command) + emit_size_hint(descriptors)`, i.e. the
/// `section_length` field value for `section`.
pub fn section_length_hint(section: &SpliceInfoSection) -> u16 {
    (17 + command_size_hint(&section.command) + descriptors_size_hint(&section.descriptors)) as u16
}

/// Emits a complete `SpliceInfoSection`, including its trailing CRC-32, to `out`.
pub fn emit_splice_info_section(section: &SpliceInfoSection, out: &mut Vec<u8>) {
    let mut command_field = Vec::new();
    emit_command(&section.command, &mut command_field);

    let mut descriptor_loop = Vec::new();
    for d in &section.descriptors {
        emit_descriptor(d, &mut descriptor_loop);
    }

    let section_length = (17 + command_field.len() + descriptor_loop.len()) as u16;

    let mut w = make_crc32_writer(out);

    w.push(SpliceInfoSection::TABLE_ID);

    let mut length_field = Vec::new();
    let flags = (if SpliceInfoSection::SECTION_SYNTAX_INDICATOR { 0x80 } else { 0 })
        | (if SpliceInfoSection::PRIVATE_INDICATOR { 0x40 } else { 0 })
        | 0x30;
    write_12_prefix(flags, section_length, &mut length_field);
    w.extend(&length_field);

    w.push(SpliceInfoSection::PROTOCOL_VERSION);

    let pts_prefix = (if section.encrypted_packet { 0x80 } else { 0 }) | ((section.encryption_algorithm & 0x3F) << 1);
    let mut pts_field = Vec::new();
    write_33_prefix(pts_prefix, section.pts_adjustment, &mut pts_field);
    w.extend(&pts_field);

    w.push(section.cw_index);

    let mut tier_field = Vec::new();
    write_12_pair(section.tier, command_field.len() as u16, &mut tier_field);
    w.extend(&tier_field);

    w.push(section.command.splice_command_type());
    w.extend(&command_field);

    let mut loop_len_field = Vec::new();
    write_16(descriptor_loop.len() as u16, &mut loop_len_field);
    w.extend(&loop_len_field);
    w.extend(&descriptor_loop);

    let crc = w.crc();
    write_32(crc, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::scte35::types::{SpliceCommand, SpliceInfoSection, SpliceNull};

    #[test]
    fn splice_null_section_length_is_minimum() {
        let section = SpliceInfoSection::splice_null(0);
        assert_eq!(section_length_hint(&section), 17);
        let mut out = Vec::new();
        emit_splice_info_section(&section, &mut out);
        assert_eq!(out.len(), 3 + 17);
    }

    #[test]
    fn splice_null_emission_sets_table_id_and_command_type() {
        let mut out = Vec::new();
        emit_splice_info_section(&SpliceInfoSection::splice_null(0), &mut out);
        assert_eq!(out[0], SpliceInfoSection::TABLE_ID);
        assert!(matches!(SpliceCommand::Null(SpliceNull), SpliceCommand::Null(_)));
    }
}
