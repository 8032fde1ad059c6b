// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Conversions between H.264's three progressively-stripped payload encodings: EBSP (contains
//! emulation-prevention bytes), RBSP (emulation-prevention removed), and SODB (RBSP with the
//! trailing stop bit also removed).

use crate::error::BinaryParseError;

fn copy_from_ebsp(data: &[u8], drop_stop_bit: bool) -> Result<Vec<u8>, BinaryParseError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut last = data.len();

    if drop_stop_bit {
        while last > 0 && data[last - 1] == 0 {
            last -= 1;
        }

        if last == 0 || data[last - 1] != 0x80 {
            return Err(BinaryParseError::new("malformed RBSP payload, missing stop bit", data.len(), 0));
        }

        last -= 1;
    }

    let src = &data[..last];

    if src.len() <= 2 {
        return Ok(src.to_vec());
    }

    let mut out = Vec::with_capacity(src.len());
    out.extend_from_slice(&src[..2]);

    let mut i = 2;
    while i < src.len() {
        if src[i - 2] == 0 && src[i - 1] == 0 && src[i] == 3 {
            i += 1;
        } else {
            out.push(src[i]);
            i += 1;
        }
    }

    Ok(out)
}

fn copy_to_ebsp(data: &[u8], add_stop_bit: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 3 + 1);

    if data.is_empty() {
        if add_stop_bit {
            out.push(0x80);
        }
        return out;
    }

    if data.len() <= 2 {
        out.extend_from_slice(data);
    } else {
        out.extend_from_slice(&data[..2]);

        let mut i = 2;
        while i < data.len() {
            if out[out.len() - 2] == 0 && out[out.len() - 1] == 0 && data[i] <= 3 {
                out.push(0x03);
            }
            out.push(data[i]);
            i += 1;
        }
    }

    if add_stop_bit {
        out.push(0x80);
    }

    out
}

/// Counts how many emulation-prevention bytes would be inserted when encoding `data` to EBSP;
/// useful for sizing an output buffer ahead of time.
pub fn count_emulation_prevention_bytes(data: &[u8]) -> usize {
    if data.len() <= 2 {
        return 0;
    }

    let mut count = 0;
    for i in 2..data.len() {
        if data[i - 2] == 0 && data[i - 1] == 0 && data[i] == 3 {
            count += 1;
        }
    }
    count
}

pub fn ebsp_to_rbsp(data: &[u8]) -> Result<Vec<u8>, BinaryParseError> {
    copy_from_ebsp(data, false)
}

pub fn ebsp_to_sodb(data: &[u8]) -> Result<Vec<u8>, BinaryParseError> {
    copy_from_ebsp(data, true)
}

pub fn rbsp_to_ebsp(data: &[u8]) -> Vec<u8> {
    copy_to_ebsp(data, false)
}

pub fn sodb_to_ebsp(data: &[u8]) -> Vec<u8> {
    copy_to_ebsp(data, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sodb_ebsp_roundtrip_is_identity() {
        let sodb = [0x01, 0x00, 0x00, 0x00, 0x02, 0xAB];
        let ebsp = sodb_to_ebsp(&sodb);
        let back = ebsp_to_sodb(&ebsp).unwrap();
        assert_eq!(back, sodb);
    }

    #[test]
    fn emulation_prevention_inserted_and_removed() {
        let rbsp = [0x00, 0x00, 0x00, 0x00, 0x01];
        let ebsp = rbsp_to_ebsp(&rbsp);
        // every run of 00 00 <00..=03> gets a 0x03 inserted before it
        assert!(ebsp.windows(3).any(|w| w == [0x00, 0x00, 0x03]));
        let back = ebsp_to_rbsp(&ebsp).unwrap();
        assert_eq!(back, rbsp);
    }

    #[test]
    fn ebsp_to_sodb_requires_stop_bit() {
        let no_stop_bit = [0x01, 0x02, 0x03];
        assert!(ebsp_to_sodb(&no_stop_bit).is_err());
    }

    #[test]
    fn ebsp_to_rbsp_identity_without_forbidden_pattern() {
        let data = [0x11, 0x22, 0x33, 0x44, 0x55];
        assert_eq!(ebsp_to_rbsp(&data).unwrap(), data);
    }
}
