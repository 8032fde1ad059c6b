// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The media container contract: everything the extractor/injector pipelines need from a real
//! demuxer/muxer library (libavformat, gstreamer, ...), modeled as a trait rather than a concrete
//! binding.
//!
//! This crate ships no real container backend; [`InMemoryContainer`] is a test double over a
//! fixed packet list, letting the pipeline loops in `pipeline/` be exercised without a media
//! library dependency.

use num_rational::Rational32;

use crate::clock::TimeBase;
use crate::error::ContainerError;

/// Codec identifiers the pipeline cares about; a real backend carries many more but only these
/// participate in stream classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    H264,
    Scte35,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Video,
    Audio,
    Data,
    Subtitle,
    Other,
}

/// One stream's static properties, as exposed by the container on open.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub codec_id: CodecId,
    pub stream_type: StreamType,
    pub time_base: TimeBase,
}

/// One packet read from or to be written to a container: the stream it belongs to, its
/// timestamps (in that stream's time base), and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream_index: usize,
    pub pts: i64,
    pub dts: i64,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(stream_index: usize, pts: i64, dts: i64, data: Vec<u8>) -> Self {
        Self { stream_index, pts, dts, data }
    }

    /// Grows or shrinks `self.data` to exactly `new_len`, used by the injector after it resizes a
    /// packet's SEI NALU in place (mirrors `ff::grow_packet`/`ff::shrink_packet`).
    pub fn resize(&mut self, new_len: usize) {
        self.data.resize(new_len, 0);
    }
}

/// A source or sink container handle, opened on a URL with an optional named format hint.
///
/// Implementors own the underlying I/O resource; `read_packet`/`write_packet` are retried by
/// callers up to a fixed bound (see `pipeline::retry`), not by the trait itself.
pub trait Container {
    /// Every stream the container exposes, in index order.
    fn streams(&self) -> &[StreamDescriptor];

    /// Reads the next packet, or `Err(ContainerError::Eof)` once the source is exhausted.
    fn read_packet(&mut self) -> Result<Packet, ContainerError>;

    /// Writes `packet`, interleaving as the container format requires and rescaling its
    /// timestamps from `from_time_base` into the destination stream's own time base.
    fn write_packet(&mut self, packet: &Packet, from_time_base: TimeBase) -> Result<(), ContainerError>;
}

/// An in-memory [`Container`] test double: reads back a fixed list of packets, and records every
/// packet written to it (rescaled into the matching output stream's time base) for assertions.
pub struct InMemoryContainer {
    streams: Vec<StreamDescriptor>,
    to_read: std::collections::VecDeque<Packet>,
    written: Vec<Packet>,
}

impl InMemoryContainer {
    pub fn new(streams: Vec<StreamDescriptor>, packets: Vec<Packet>) -> Self {
        Self { streams, to_read: packets.into(), written: Vec::new() }
    }

    pub fn written(&self) -> &[Packet] {
        &self.written
    }
}

impl Container for InMemoryContainer {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Packet, ContainerError> {
        self.to_read.pop_front().ok_or(ContainerError::Eof)
    }

    fn write_packet(&mut self, packet: &Packet, from_time_base: TimeBase) -> Result<(), ContainerError> {
        let stream = self
            .streams
            .get(packet.stream_index)
            .ok_or_else(|| ContainerError::Write(anyhow::anyhow!("unknown stream index {}", packet.stream_index)))?;

        let mut rescaled = packet.clone();
        if from_time_base != stream.time_base {
            rescaled.pts = crate::clock::rescale(packet.pts, from_time_base, stream.time_base);
            rescaled.dts = crate::clock::rescale(packet.dts, from_time_base, stream.time_base);
        }
        self.written.push(rescaled);
        Ok(())
    }
}

pub fn video_time_base() -> TimeBase {
    Rational32::new(1, 90_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h264_stream() -> StreamDescriptor {
        StreamDescriptor { index: 0, codec_id: CodecId::H264, stream_type: StreamType::Video, time_base: video_time_base() }
    }

    #[test]
    fn read_packet_returns_eof_once_exhausted() {
        let mut c = InMemoryContainer::new(vec![h264_stream()], vec![Packet::new(0, 0, 0, vec![1])]);
        assert!(c.read_packet().is_ok());
        assert!(matches!(c.read_packet(), Err(ContainerError::Eof)));
    }

    #[test]
    fn write_packet_rescales_into_destination_time_base() {
        let mut c = InMemoryContainer::new(vec![h264_stream()], vec![]);
        let pkt = Packet::new(0, 9000, 9000, vec![]);
        c.write_packet(&pkt, Rational32::new(1, 9000)).unwrap();
        assert_eq!(c.written()[0].pts, 90_000);
    }

    #[test]
    fn write_packet_rejects_unknown_stream_index() {
        let mut c = InMemoryContainer::new(vec![h264_stream()], vec![]);
        let pkt = Packet::new(5, 0, 0, vec![]);
        assert!(c.write_packet(&pkt, video_time_base()).is_err());
    }

    #[test]
    fn packet_resize_grows_and_shrinks() {
        let mut pkt = Packet::new(0, 0, 0, vec![1, 2, 3]);
        pkt.resize(5);
        assert_eq!(pkt.data.len(), 5);
        pkt.resize(1);
        assert_eq!(pkt.data, vec![1]);
    }
}
