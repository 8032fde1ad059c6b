// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! SEI (Supplemental Enhancement Information) payload parsing and emission.
//!
//! A SEI NALU's SODB body is a sequence of payloads, each prefixed by two variadic-length
//! integers (payload type, then payload size): a run of `0xFF` bytes each contributing 255,
//! terminated by a final byte contributing its own value.

use std::fmt;

use super::nalu::{emit_avcc_nalu, NaluType};
use super::rbsp::{count_emulation_prevention_bytes, sodb_to_ebsp};
use crate::error::BinaryParseError;

/// SEI message types (H.264 Annex D). `Undefined` stands in for any payload type this system
/// never needs to special-case, since only `UserDataRegistered` carries closed captions here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeiType {
    BufferingPeriod,
    PicTiming,
    FillerPayload,
    UserDataRegistered,
    UserDataUnregistered,
    RecoveryPoint,
    FramePacking,
    DisplayOrientation,
    GreenMetadata,
    AlternativeTransfer,
    Undefined(u32),
}

impl SeiType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => SeiType::BufferingPeriod,
            1 => SeiType::PicTiming,
            3 => SeiType::FillerPayload,
            4 => SeiType::UserDataRegistered,
            5 => SeiType::UserDataUnregistered,
            6 => SeiType::RecoveryPoint,
            45 => SeiType::FramePacking,
            47 => SeiType::DisplayOrientation,
            56 => SeiType::GreenMetadata,
            147 => SeiType::AlternativeTransfer,
            other => SeiType::Undefined(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            SeiType::BufferingPeriod => 0,
            SeiType::PicTiming => 1,
            SeiType::FillerPayload => 3,
            SeiType::UserDataRegistered => 4,
            SeiType::UserDataUnregistered => 5,
            SeiType::RecoveryPoint => 6,
            SeiType::FramePacking => 45,
            SeiType::DisplayOrientation => 47,
            SeiType::GreenMetadata => 56,
            SeiType::AlternativeTransfer => 147,
            SeiType::Undefined(v) => v,
        }
    }
}

impl fmt::Display for SeiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeiType::BufferingPeriod => "BUFFERING_PERIOD",
            SeiType::PicTiming => "PIC_TIMING",
            SeiType::FillerPayload => "FILLER_PAYLOAD",
            SeiType::UserDataRegistered => "USER_DATA_REGISTERED",
            SeiType::UserDataUnregistered => "USER_DATA_UNREGISTERED",
            SeiType::RecoveryPoint => "RECOVERY_POINT",
            SeiType::FramePacking => "FRAME_PACKING",
            SeiType::DisplayOrientation => "DISPLAY_ORIENTATION",
            SeiType::GreenMetadata => "GREEN_METADATA",
            SeiType::AlternativeTransfer => "ALTERNATIVE_TRANSFER",
            SeiType::Undefined(_) => "UNDEFINED",
        };
        write!(f, "{name}")
    }
}

/// A single SEI payload, owning its SODB-form bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedSeiPayload {
    payload_type: SeiType,
    data: Vec<u8>,
}

impl OwnedSeiPayload {
    pub fn new(payload_type: SeiType, data: Vec<u8>) -> Self {
        Self { payload_type, data }
    }

    pub fn payload_type(&self) -> SeiType {
        self.payload_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

fn parse_variadic_length_int(data: &[u8], pos: &mut usize) -> Result<u32, BinaryParseError> {
    let mut x: u32 = 0;
    loop {
        if *pos >= data.len() {
            return Err(BinaryParseError::new("malformed SEI", *pos, 0));
        }
        let byte = data[*pos];
        *pos += 1;
        if byte == 0xFF {
            x += 255;
            continue;
        }
        x += byte as u32;
        return Ok(x);
    }
}

fn variadic_length_int_size(value: u32) -> usize {
    (value / 255) as usize + 1
}

fn emit_variadic_length_int(mut value: u32, out: &mut Vec<u8>) {
    while value >= 255 {
        out.push(0xFF);
        value -= 255;
    }
    out.push(value as u8);
}

/// Parses every SEI payload out of a SEI NALU's SODB body (i.e. after the NALU header byte has
/// already been stripped and emulation-prevention/stop-bit removed).
pub fn parse_sei_payloads(sodb: &[u8]) -> Result<Vec<OwnedSeiPayload>, BinaryParseError> {
    let mut payloads = Vec::new();
    let mut pos = 0;

    while pos < sodb.len() {
        let payload_type = parse_variadic_length_int(sodb, &mut pos)?;
        let payload_size = parse_variadic_length_int(sodb, &mut pos)? as usize;

        if payload_size > sodb.len() - pos {
            return Err(BinaryParseError::new("malformed SEI", pos, sodb.len() - pos));
        }

        let data = sodb[pos..pos + payload_size].to_vec();
        pos += payload_size;

        payloads.push(OwnedSeiPayload::new(SeiType::from_u32(payload_type), data));
    }

    Ok(payloads)
}

fn sei_payload_size_hint(payload: &OwnedSeiPayload) -> usize {
    variadic_length_int_size(payload.payload_type().as_u32())
        + variadic_length_int_size(payload.data().len() as u32)
        + payload.data().len()
}

fn emit_sei_payload(payload: &OwnedSeiPayload, out: &mut Vec<u8>) {
    emit_variadic_length_int(payload.payload_type().as_u32(), out);
    emit_variadic_length_int(payload.data().len() as u32, out);
    out.extend_from_slice(payload.data());
}

/// Emits `payloads` as a single AVCC-framed SEI NALU (4-byte length prefix, NALU header byte
/// 0x06, then each payload's variadic type/size and SODB body re-encoded to EBSP).
pub fn emit_sei_payloads_to_avcc_nalu(payloads: &[OwnedSeiPayload], out: &mut Vec<u8>) {
    let sodb_hint: usize = payloads.iter().map(sei_payload_size_hint).sum();
    let mut sodb = Vec::with_capacity(sodb_hint + 1);
    sodb.push(NaluType::Sei as u8);
    for payload in payloads {
        emit_sei_payload(payload, &mut sodb);
    }

    let ebsp_hint = sodb.len() + count_emulation_prevention_bytes(&sodb) + 1;
    let mut ebsp = Vec::with_capacity(ebsp_hint);
    ebsp.extend_from_slice(&sodb_to_ebsp(&sodb));

    emit_avcc_nalu(&super::nalu::Nalu::new(&ebsp), out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variadic_size_example() {
        let sodb = [0xFF, 0xFF, 0x01, 0x02, 0xAA, 0xBB];
        let payloads = parse_sei_payloads(&sodb).unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].payload_type().as_u32(), 511);
        assert_eq!(payloads[0].data(), &[0xAA, 0xBB]);
    }

    #[test]
    fn variadic_roundtrip_large_value() {
        let mut out = Vec::new();
        emit_variadic_length_int(600, &mut out);
        let mut pos = 0;
        assert_eq!(parse_variadic_length_int(&out, &mut pos).unwrap(), 600);
    }

    #[test]
    fn parse_truncated_payload_fails() {
        let sodb = [0x04, 0xFF];
        assert!(parse_sei_payloads(&sodb).is_err());
    }

    #[test]
    fn emit_then_parse_nalu_roundtrips_payload_bytes() {
        let payload = OwnedSeiPayload::new(SeiType::UserDataRegistered, vec![1, 2, 3, 0, 0, 3]);
        let mut avcc = Vec::new();
        emit_sei_payloads_to_avcc_nalu(std::slice::from_ref(&payload), &mut avcc);

        let mut pos = 0;
        let length = crate::bitio::read_32(&avcc, &mut pos).unwrap() as usize;
        let nalu_bytes = &avcc[pos..pos + length];
        assert_eq!(nalu_bytes[0] & 0b0001_1111, NaluType::Sei as u8);

        let sodb = super::super::rbsp::ebsp_to_sodb(&nalu_bytes[1..]).unwrap();
        let parsed = parse_sei_payloads(&sodb).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].payload_type(), SeiType::UserDataRegistered);
        assert_eq!(parsed[0].data(), payload.data());
    }
}
