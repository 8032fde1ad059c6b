// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! H.264 NAL unit types and AVCC framing (4-byte big-endian length prefix per NALU).

use std::fmt;
use std::str::FromStr;

use crate::bitio;
use crate::error::BinaryParseError;

/// Table 7-1 of T-REC-H.264: NAL unit type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    Unspecified = 0,
    Slice = 1,
    Dpa = 2,
    Dpb = 3,
    Dpc = 4,
    IdrSlice = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    Aud = 9,
    EndSequence = 10,
    EndStream = 11,
    FillerData = 12,
    SpsExt = 13,
    Prefix = 14,
    SubSps = 15,
    Dps = 16,
    Reserved17 = 17,
    Reserved18 = 18,
    AuxiliarySlice = 19,
    ExtenSlice = 20,
    DepthExtenSlice = 21,
    Reserved22 = 22,
    Reserved23 = 23,
    Unspecified24 = 24,
    Unspecified25 = 25,
    Unspecified26 = 26,
    Unspecified27 = 27,
    Unspecified28 = 28,
    Unspecified29 = 29,
    Unspecified30 = 30,
    Unspecified31 = 31,
}

const NALU_TYPE_STR: [&str; 32] = [
    "UNSPECIFIED",
    "SLICE",
    "DPA",
    "DPB",
    "DPC",
    "IDR_SLICE",
    "SEI",
    "SPS",
    "PPS",
    "AUD",
    "END_SEQUENCE",
    "END_STREAM",
    "FILLER_DATA",
    "SPS_EXT",
    "PREFIX",
    "SUB_SPS",
    "DPS",
    "RESERVED17",
    "RESERVED18",
    "AUXILIARY_SLICE",
    "EXTEN_SLICE",
    "DEPTH_EXTEN_SLICE",
    "RESERVED22",
    "RESERVED23",
    "UNSPECIFIED24",
    "UNSPECIFIED25",
    "UNSPECIFIED26",
    "UNSPECIFIED27",
    "UNSPECIFIED28",
    "UNSPECIFIED29",
    "UNSPECIFIED30",
    "UNSPECIFIED31",
];

impl NaluType {
    pub fn from_u8(value: u8) -> Self {
        // SAFETY-free: value is always masked to 5 bits by callers, and every value in 0..32
        // has a matching enum variant, so this table lookup always succeeds.
        match value & 0b0001_1111 {
            0 => NaluType::Unspecified,
            1 => NaluType::Slice,
            2 => NaluType::Dpa,
            3 => NaluType::Dpb,
            4 => NaluType::Dpc,
            5 => NaluType::IdrSlice,
            6 => NaluType::Sei,
            7 => NaluType::Sps,
            8 => NaluType::Pps,
            9 => NaluType::Aud,
            10 => NaluType::EndSequence,
            11 => NaluType::EndStream,
            12 => NaluType::FillerData,
            13 => NaluType::SpsExt,
            14 => NaluType::Prefix,
            15 => NaluType::SubSps,
            16 => NaluType::Dps,
            17 => NaluType::Reserved17,
            18 => NaluType::Reserved18,
            19 => NaluType::AuxiliarySlice,
            20 => NaluType::ExtenSlice,
            21 => NaluType::DepthExtenSlice,
            22 => NaluType::Reserved22,
            23 => NaluType::Reserved23,
            24 => NaluType::Unspecified24,
            25 => NaluType::Unspecified25,
            26 => NaluType::Unspecified26,
            27 => NaluType::Unspecified27,
            28 => NaluType::Unspecified28,
            29 => NaluType::Unspecified29,
            30 => NaluType::Unspecified30,
            _ => NaluType::Unspecified31,
        }
    }
}

impl fmt::Display for NaluType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", NALU_TYPE_STR[*self as usize])
    }
}

impl FromStr for NaluType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        NALU_TYPE_STR
            .iter()
            .position(|&candidate| candidate == upper)
            .map(|idx| NaluType::from_u8(idx as u8))
            .ok_or(())
    }
}

/// A cap on a single NALU's length, guarding against a corrupt length prefix forcing a huge
/// allocation downstream.
pub const MAX_NALU_LENGTH: usize = 8 * 1024 * 1024;

/// A borrowed H.264 NAL unit: a byte slice whose first byte carries the forbidden-zero-bit and
/// the 5-bit type tag.
#[derive(Debug, Clone, Copy)]
pub struct Nalu<'a> {
    data: &'a [u8],
}

impl<'a> Nalu<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && (self.data[0] & 0b1000_0000) == 0
    }

    pub fn nalu_type(&self) -> NaluType {
        NaluType::from_u8(self.data[0])
    }
}

/// Splits an AVCC-framed frame (a sequence of 4-byte big-endian length prefixes each followed by
/// that many bytes of NALU) into individual [`Nalu`] views, without allocating.
pub struct AvccNaluIterator<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AvccNaluIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for AvccNaluIterator<'a> {
    type Item = Result<Nalu<'a>, BinaryParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }

        let length = match bitio::read_32(self.data, &mut self.pos) {
            Ok(l) => l as usize,
            Err(e) => {
                self.pos = self.data.len();
                return Some(Err(e));
            }
        };

        if length == 0 {
            self.pos = self.data.len();
            return Some(Err(BinaryParseError::new("zero-length NALU", self.pos, 0)));
        }

        if length > MAX_NALU_LENGTH {
            self.pos = self.data.len();
            return Some(Err(BinaryParseError::new(
                format!("NALU length {length} exceeds {MAX_NALU_LENGTH}"),
                self.pos,
                0,
            )));
        }

        if length > self.data.len() - self.pos {
            let left = self.data.len() - self.pos;
            self.pos = self.data.len();
            return Some(Err(BinaryParseError::new(
                format!("NALU length {length} exceeds remaining {left} bytes"),
                self.pos,
                left,
            )));
        }

        let nalu = Nalu::new(&self.data[self.pos..self.pos + length]);
        self.pos += length;
        Some(Ok(nalu))
    }
}

/// Emits `nalu` in AVCC form: a 4-byte big-endian length prefix followed by its bytes.
pub fn emit_avcc_nalu(nalu: &Nalu<'_>, out: &mut Vec<u8>) {
    bitio::write_32(nalu.data().len() as u32, out);
    out.extend_from_slice(nalu.data());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nalu_validity_and_type() {
        let nalu = Nalu::new(&[0x68, 0xCA, 0xE1, 0xBC, 0xB0]);
        assert!(nalu.is_valid());
        assert_eq!(nalu.nalu_type(), NaluType::Pps);

        let invalid = Nalu::new(&[0xE3]);
        assert!(!invalid.is_valid());
    }

    #[test]
    fn avcc_split_and_emit_roundtrip() {
        let mut framed = Vec::new();
        emit_avcc_nalu(&Nalu::new(&[0x68, 0xCA]), &mut framed);
        emit_avcc_nalu(&Nalu::new(&[0x06, 0x01, 0x02]), &mut framed);

        let nalus: Vec<_> = AvccNaluIterator::new(&framed).collect::<Result<_, _>>().unwrap();
        assert_eq!(nalus.len(), 2);
        assert_eq!(nalus[0].data(), &[0x68, 0xCA]);
        assert_eq!(nalus[1].data(), &[0x06, 0x01, 0x02]);
    }

    #[test]
    fn avcc_rejects_truncated_length() {
        let framed = [0x00, 0x00, 0x00, 0x10, 0x01, 0x02];
        let mut it = AvccNaluIterator::new(&framed);
        assert!(it.next().unwrap().is_err());
    }

    #[test]
    fn nalu_type_from_str_is_case_insensitive() {
        assert_eq!("sei".parse::<NaluType>().unwrap(), NaluType::Sei);
        assert_eq!("PPS".parse::<NaluType>().unwrap(), NaluType::Pps);
        assert!("nonsense".parse::<NaluType>().is_err());
    }
}
