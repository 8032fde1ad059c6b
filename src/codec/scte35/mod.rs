// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! SCTE-35 ad-insertion signalling: `SpliceInfoSection` parsing, emission, and the CRC-32
//! variant its trailing checksum uses.

pub mod crc32;
pub mod emitter;
pub mod parser;
pub mod types;

pub use emitter::emit_splice_info_section;
pub use parser::parse_splice_info_section;
pub use types::SpliceInfoSection;
