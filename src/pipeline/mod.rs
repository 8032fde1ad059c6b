// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The generic remux loop shared by the extractor and injector threads: read-retry, per-stream
//! DTS/PTS sanity checks, per-kind processor dispatch, write-retry.

pub mod extractor;
pub mod injector;

use std::collections::HashMap;

use crate::clock::TimeBase;
use crate::container::{Container, Packet, StreamDescriptor, StreamType};
use crate::error::{StreamRestart, ValidationError};

const MAX_RETRY: u32 = 10;

/// Which stream index (if any) carries each recognized role, derived once from a source's
/// [`StreamDescriptor`]s at startup. The time source is always the first H.264 video stream (it
/// doubles as the SEI stream); SCTE-35 is the first data stream carrying splice sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamClassification {
    pub time_source: Option<usize>,
    pub sei: Option<usize>,
    pub scte: Option<usize>,
}

impl StreamClassification {
    pub fn require_time_source(&self) -> Result<usize, ValidationError> {
        self.time_source.ok_or_else(|| ValidationError::msg("required stream kind has not been found: time source"))
    }
}

pub fn classify_streams(streams: &[StreamDescriptor]) -> StreamClassification {
    use crate::container::CodecId;

    let mut sc = StreamClassification::default();
    for stream in streams {
        match stream.codec_id {
            CodecId::H264 if sc.time_source.is_none() => {
                sc.time_source = Some(stream.index);
                sc.sei = Some(stream.index);
            }
            CodecId::Scte35 if sc.scte.is_none() => {
                sc.scte = Some(stream.index);
            }
            _ => {}
        }
    }
    sc
}

/// One stream-indexed stage of the remux loop: inspects (and, for the injector, rewrites) every
/// packet belonging to the stream it was built for. Returning `Ok(true)` requests the loop stop,
/// letting the supervisor decide whether to restart the thread.
pub trait PacketProcessor {
    fn process(&mut self, packet: &mut Packet) -> anyhow::Result<bool>;
}

fn read_with_retry(source: &mut dyn Container) -> anyhow::Result<Option<Packet>> {
    let mut trial = 0;
    loop {
        match source.read_packet() {
            Ok(packet) => return Ok(Some(packet)),
            Err(crate::error::ContainerError::Eof) => return Ok(None),
            Err(e) => {
                if trial >= MAX_RETRY {
                    return Err(e.into());
                }
                trial += 1;
                log::error!("{e}");
            }
        }
    }
}

fn write_with_retry(sink: &mut dyn Container, packet: &Packet, from_time_base: TimeBase) -> anyhow::Result<()> {
    let mut trial = 0;
    loop {
        match sink.write_packet(packet, from_time_base) {
            Ok(()) => return Ok(()),
            Err(e) => {
                if trial >= MAX_RETRY {
                    return Err(e.into());
                }
                trial += 1;
                log::error!("{e}");
            }
        }
    }
}

/// Runs `source` to exhaustion (or until a processor or a validation failure stops it), dispatching
/// each packet to every processor registered for its stream index and remuxing it into `sink`.
///
/// A non-monotonic DTS (strict for non-subtitle/data streams) or a `pts < dts` sample is treated
/// as a restart signal rather than silently accepted, matching how a live source misbehaving mid-
/// stream (a reconnect, a discontinuity) should be handled: stop cleanly and let the supervisor
/// restart this thread against a fresh source.
pub fn remux_loop<'p>(
    source: &mut dyn Container,
    sink: &mut dyn Container,
    source_time_base: TimeBase,
    mut processors: Vec<(usize, Box<dyn PacketProcessor + 'p>)>,
) -> anyhow::Result<()> {
    let stream_types: HashMap<usize, StreamType> = source.streams().iter().map(|s| (s.index, s.stream_type)).collect();
    let mut last_dts: HashMap<usize, i64> = HashMap::new();

    loop {
        let mut packet = match read_with_retry(source)? {
            Some(p) => p,
            None => {
                log::warn!("EOF");
                return Ok(());
            }
        };

        if let Some(&prev_dts) = last_dts.get(&packet.stream_index) {
            let strict = !matches!(stream_types.get(&packet.stream_index), Some(StreamType::Subtitle) | Some(StreamType::Data));
            let non_monotonic = if strict { prev_dts >= packet.dts } else { prev_dts > packet.dts };
            if non_monotonic {
                return Err(StreamRestart::NonMonotonicDts { prev_dts, next_dts: packet.dts }.into());
            }
        }
        if packet.pts < packet.dts {
            return Err(StreamRestart::NonMonotonicDts { prev_dts: packet.dts, next_dts: packet.pts }.into());
        }

        let mut should_break = false;
        for (index, processor) in processors.iter_mut() {
            if *index == packet.stream_index {
                if processor.process(&mut packet)? {
                    should_break = true;
                }
            }
        }

        last_dts.insert(packet.stream_index, packet.dts);
        write_with_retry(sink, &packet, source_time_base)?;

        if should_break {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TimeBase as Tb;
    use crate::container::{CodecId, InMemoryContainer};

    fn streams() -> Vec<StreamDescriptor> {
        vec![
            StreamDescriptor { index: 0, codec_id: CodecId::H264, stream_type: StreamType::Video, time_base: Tb::new(1, 90_000) },
            StreamDescriptor { index: 1, codec_id: CodecId::Scte35, stream_type: StreamType::Data, time_base: Tb::new(1, 90_000) },
        ]
    }

    #[test]
    fn classify_streams_picks_first_h264_as_time_source_and_sei() {
        let sc = classify_streams(&streams());
        assert_eq!(sc.time_source, Some(0));
        assert_eq!(sc.sei, Some(0));
        assert_eq!(sc.scte, Some(1));
    }

    #[test]
    fn require_time_source_fails_without_h264() {
        let sc = StreamClassification::default();
        assert!(sc.require_time_source().is_err());
    }

    #[test]
    fn remux_loop_rejects_non_monotonic_dts() {
        let mut source = InMemoryContainer::new(streams(), vec![Packet::new(0, 10, 10, vec![]), Packet::new(0, 5, 5, vec![])]);
        let mut sink = InMemoryContainer::new(streams(), vec![]);
        let err = remux_loop(&mut source, &mut sink, Tb::new(1, 90_000), vec![]).unwrap_err();
        assert!(err.to_string().contains("non monotonic") || err.to_string().contains("monotonic"));
    }

    #[test]
    fn remux_loop_stops_on_eof_without_error() {
        let mut source = InMemoryContainer::new(streams(), vec![Packet::new(0, 1, 1, vec![])]);
        let mut sink = InMemoryContainer::new(streams(), vec![]);
        remux_loop(&mut source, &mut sink, Tb::new(1, 90_000), vec![]).unwrap();
        assert_eq!(sink.written().len(), 1);
    }

    #[test]
    fn remux_loop_stops_when_a_processor_requests_break() {
        struct AlwaysBreak;
        impl PacketProcessor for AlwaysBreak {
            fn process(&mut self, _packet: &mut Packet) -> anyhow::Result<bool> {
                Ok(true)
            }
        }

        let mut source = InMemoryContainer::new(streams(), vec![Packet::new(0, 1, 1, vec![]), Packet::new(0, 2, 2, vec![])]);
        let mut sink = InMemoryContainer::new(streams(), vec![]);
        let processors: Vec<(usize, Box<dyn PacketProcessor>)> = vec![(0, Box::new(AlwaysBreak))];
        remux_loop(&mut source, &mut sink, Tb::new(1, 90_000), processors).unwrap();
        assert_eq!(sink.written().len(), 1);
    }
}
