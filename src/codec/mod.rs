// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Binary codecs for the two metadata formats this system understands: H.264 SEI payloads
//! (closed captions) and SCTE-35 splice-information sections (ad markers).

pub mod h264;
pub mod scte35;
