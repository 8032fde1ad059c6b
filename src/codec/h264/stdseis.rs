// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pre-built `USER_DATA_REGISTERED` SEI payloads used by the virtual `clear` input and by the
//! injector whenever a source switch or extractor exit must not let stale captions bleed
//! through: an "empty" ATSC A/53 DTVCC padding payload, and a "CC reset" payload that erases both
//! CEA-608 fields/channels and resets both CEA-708 services.
//!
//! The exact byte layouts are part of the wire contract with downstream decoders (they must be
//! valid `GA94`/DTVCC `user_data_type_structure` payloads), not an implementation detail, so they
//! are reproduced verbatim rather than derived.

use std::sync::Arc;

use super::sei::{OwnedSeiPayload, SeiType};
use crate::clock::ClockTS;
use crate::metadata::{InputId, Metadata, SeiKind};

#[rustfmt::skip]
const EMPTY_SEI_BYTES: &[u8] = &[
    // == H.264/H.265 SEI prefix ==
    181,                                              // itu_t_t35_country_code -> USA
    0, 49,                                            // itu_t_t35_provider_code -> ATSC_user_data
    b'G', b'A', b'9', b'4',                            // ATSC_user_identifier
    3,                                                  // ATSC1_data_user_data_type_code -> DTVCC

    // == user_data_type_structure ==
    0b010_00000 | 4,                                   // flags = [process_em_data, process_cc_data, additional_data] | cc_count
    0x00,                                               // em_data, 0 because process_em_data == 0

    // == cc_data_pkt's, mind parity bits for 608 data! ==
    0b11111_1_00, 0x80, 0x80,                           // NTSC_CC_FIELD_1: XDS NULL PADDING
    0b11111_1_01, 0x01, 0x85,                           // NTSC_CC_FIELD_2: XDS CLASS + TYPE

    0b11111_0_10, 0x00, 0x00,                           // First invalid DTVCC_PACKET_DATA marks end of packet.
    0b11111_0_10, 0x00, 0x00,                           // Rest is interpreted as padding.

    0xFF,                                                // marker_bits
];

#[rustfmt::skip]
const RESET_SEI_BYTES: &[u8] = &[
    // == H.264/H.265 SEI prefix ==
    181,
    0, 49,
    b'G', b'A', b'9', b'4',
    3,

    // == user_data_type_structure ==
    0b010_00000 | 18,

    0x00,

    // 608 reset
    0b11111_1_00, 0x94, 0x2C,  // NTSC_CC_FIELD_1: Data Channel 1, Erase Displayed Memory
    0b11111_1_00, 0x94, 0xAE,  // NTSC_CC_FIELD_1: Data Channel 1, Erase Non-Displayed Memory
    0b11111_1_00, 0x94, 0x2F,  // NTSC_CC_FIELD_1: Data Channel 1, End of Caption

    0b11111_1_00, 0x1C, 0x2C,  // NTSC_CC_FIELD_1: Data Channel 2, Erase Displayed Memory
    0b11111_1_00, 0x1C, 0xAE,  // NTSC_CC_FIELD_1: Data Channel 2, Erase Non-Displayed Memory
    0b11111_1_00, 0x1C, 0x2F,  // NTSC_CC_FIELD_1: Data Channel 2, End of Caption

    0b11111_1_01, 0x94, 0x2C,  // NTSC_CC_FIELD_2: Data Channel 1, Erase Displayed Memory
    0b11111_1_01, 0x94, 0xAE,  // NTSC_CC_FIELD_2: Data Channel 1, Erase Non-Displayed Memory
    0b11111_1_01, 0x94, 0x2F,  // NTSC_CC_FIELD_2: Data Channel 1, End of Caption

    0b11111_1_01, 0x1C, 0x2C,  // NTSC_CC_FIELD_2: Data Channel 2, Erase Displayed Memory
    0b11111_1_01, 0x1C, 0xAE,  // NTSC_CC_FIELD_2: Data Channel 2, Erase Non-Displayed Memory
    0b11111_1_01, 0x1C, 0x2F,  // NTSC_CC_FIELD_2: Data Channel 2, End of Caption

    // 708 reset
    0b11111_1_11, 0x02, 0x21,  // DTVCC_PACKET_START: Headers
    0b11111_1_10, 0x8F, 0x00,  // DTVCC_PACKET_DATA: Reset Primary Language Service
    0b11111_1_11, 0x02, 0x41,  // DTVCC_PACKET_START: Headers
    0b11111_1_10, 0x8F, 0x00,  // DTVCC_PACKET_DATA: Reset Secondary Language Service

    0b11111_0_10, 0x00, 0x00,  // End of DTVCC packet.
    0b11111_0_10, 0x00, 0x00,

    0xFF,
];

/// A synthesised "nothing to say" closed-caption payload, substituted whenever the selected
/// input has no real caption data for the current frame so every output frame still carries a
/// well-formed SEI. Sorts last within a frame (`order = i32::MAX`).
pub fn build_empty_metadata(input_id: InputId, ts: ClockTS) -> Metadata<SeiKind> {
    let payload = Arc::new(OwnedSeiPayload::new(SeiType::UserDataRegistered, EMPTY_SEI_BYTES.to_vec()));
    Metadata::new(input_id, ts, ts, i32::MAX, payload)
}

/// A synthesised "erase everything" closed-caption payload, emitted once whenever the selected
/// source changes or an extractor exits, so stale captions never bleed into the next source.
/// Sorts first within a frame (`order = i32::MIN`).
pub fn build_cc_reset_metadata(input_id: InputId, ts: ClockTS) -> Metadata<SeiKind> {
    let payload = Arc::new(OwnedSeiPayload::new(SeiType::UserDataRegistered, RESET_SEI_BYTES.to_vec()));
    Metadata::new(input_id, ts, ts, i32::MIN, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metadata_sorts_last_and_carries_user_data_registered() {
        let m = build_empty_metadata(3, ClockTS(100));
        assert_eq!(m.order, i32::MAX);
        assert_eq!(m.val.payload_type(), SeiType::UserDataRegistered);
        assert_eq!(m.val.data().len(), EMPTY_SEI_BYTES.len());
    }

    #[test]
    fn reset_metadata_sorts_first() {
        let m = build_cc_reset_metadata(3, ClockTS(100));
        assert_eq!(m.order, i32::MIN);
        assert_eq!(m.val.data().len(), RESET_SEI_BYTES.len());
    }
}
