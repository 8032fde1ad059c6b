// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! H.264 AVCC/NALU/SEI handling.

pub mod nalu;
pub mod rbsp;
pub mod sei;
pub mod stdseis;
