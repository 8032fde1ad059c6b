// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The single output thread body: ticks the shared clock from the time-source stream, and rewrites
//! every frame's SEI NALU to carry whichever input is currently selected for closed captions
//! instead of whatever the output's own source stream happened to carry.

use crate::clock::{ClockTS, StreamTimeBase, StreamTS, TSRescaler, TSTicker, ONE_CLOCK_TICK};
use crate::codec::h264::nalu::{emit_avcc_nalu, AvccNaluIterator, Nalu, NaluType};
use crate::codec::h264::rbsp::ebsp_to_sodb;
use crate::codec::h264::sei::{emit_sei_payloads_to_avcc_nalu, parse_sei_payloads, OwnedSeiPayload, SeiType};
use crate::codec::h264::stdseis::build_cc_reset_metadata;
use crate::container::{Container, Packet};
use crate::context::AppContext;
use crate::metadata::{Metadata, MetadataKind, SeiKind};

use super::{classify_streams, remux_loop, PacketProcessor};

struct ClockTicker {
    ticker: TSTicker,
    pts_rescaler: TSRescaler,
}

impl PacketProcessor for ClockTicker {
    fn process(&mut self, packet: &mut Packet) -> anyhow::Result<bool> {
        let rescaled_pts = self.pts_rescaler.rescale_to_clock(StreamTS(packet.pts));
        self.ticker.tick(rescaled_pts);
        Ok(false)
    }
}

struct SeiInjector<'a> {
    ctx: &'a AppContext,
    pts_rescaler: TSRescaler,
    prev_pts: ClockTS,
    prev_input_id: Option<u32>,
}

impl SeiInjector<'_> {
    /// Parses `nalu` (the frame's first SEI NALU) and returns every payload except
    /// `USER_DATA_REGISTERED`: those are the closed captions this output itself carried, which
    /// must never pass through unmodified alongside the ones this injector appends.
    fn strip_cc(nalu: &Nalu<'_>) -> Vec<OwnedSeiPayload> {
        let mut non_cc = Vec::new();

        let sodb = match ebsp_to_sodb(&nalu.data()[1..]) {
            Ok(s) => s,
            Err(e) => {
                log::error!("error stripping CC SEI: {e}");
                return non_cc;
            }
        };
        let payloads = match parse_sei_payloads(&sodb) {
            Ok(p) => p,
            Err(e) => {
                log::error!("error stripping CC SEI: {e}");
                return non_cc;
            }
        };

        for payload in payloads {
            if payload.payload_type() == SeiType::UserDataRegistered {
                log::trace!("dropping CC SEI from source");
            } else {
                non_cc.push(payload);
            }
        }

        non_cc
    }
}

impl PacketProcessor for SeiInjector<'_> {
    fn process(&mut self, packet: &mut Packet) -> anyhow::Result<bool> {
        let rescaled_pts = self.pts_rescaler.rescale_to_clock(StreamTS(packet.pts)) - self.ctx.ts_adjustment();

        let input = self.ctx.inputs.current_input(MetadataKind::Sei);
        let input_id = input.id();

        let mut found: Vec<Metadata<SeiKind>> = Vec::new();
        if Some(input_id) != self.prev_input_id {
            found.push(build_cc_reset_metadata(input_id, rescaled_pts));
        }
        self.prev_input_id = Some(input_id);

        found.extend(input.query::<SeiKind>(self.prev_pts, rescaled_pts + ONE_CLOCK_TICK));
        self.prev_pts = rescaled_pts + ONE_CLOCK_TICK;

        let mut nalus = Vec::new();
        for nalu in AvccNaluIterator::new(&packet.data) {
            match nalu {
                Ok(n) if n.is_valid() => nalus.push(n),
                Ok(_) => log::warn!("invalid NALU spotted"),
                Err(e) => {
                    log::error!("parse error: {e}");
                    return Ok(false);
                }
            }
        }

        let mut buf = Vec::with_capacity(packet.data.len());
        let mut idx = 0;

        while idx < nalus.len() && matches!(nalus[idx].nalu_type(), NaluType::Aud | NaluType::Sps | NaluType::Pps) {
            emit_avcc_nalu(&nalus[idx], &mut buf);
            idx += 1;
        }

        let mut seis: Vec<OwnedSeiPayload> = if idx < nalus.len() && nalus[idx].nalu_type() == NaluType::Sei {
            let stripped = Self::strip_cc(&nalus[idx]);
            idx += 1;
            stripped
        } else {
            Vec::new()
        };

        for meta in &found {
            seis.push((*meta.val).clone());
        }

        emit_sei_payloads_to_avcc_nalu(&seis, &mut buf);

        for nalu in &nalus[idx..] {
            emit_avcc_nalu(nalu, &mut buf);
        }

        packet.resize(buf.len());
        packet.data.copy_from_slice(&buf);

        Ok(false)
    }
}

/// Placeholder SCTE-35 stage: the injector does not yet rewrite ad-marker packets, it only keeps
/// the per-kind dispatch uniform so adding real splice-info rewriting later is a one-file change.
struct NullScteProcessor;

impl PacketProcessor for NullScteProcessor {
    fn process(&mut self, _packet: &mut Packet) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Runs the single output's remux loop: ticks the clock from the time-source stream, and rewrites
/// the SEI NALU of every frame on that same stream to reflect the currently-selected CC input.
pub fn run(ctx: &AppContext, source: &mut dyn Container, sink: &mut dyn Container) -> anyhow::Result<()> {
    crate::logging::set_thread_name("output");

    let classification = classify_streams(source.streams());
    let time_source_index = classification.require_time_source()?;
    let stream_tb = source.streams()[time_source_index].time_base;

    let mut processors: Vec<(usize, Box<dyn PacketProcessor + '_>)> = vec![(
        time_source_index,
        Box::new(ClockTicker {
            ticker: TSTicker::new(ctx.clock.clone()),
            pts_rescaler: TSRescaler::clock_relative(ctx.clock.clone(), StreamTimeBase(stream_tb)),
        }),
    )];

    if let Some(sei_index) = classification.sei {
        processors.push((
            sei_index,
            Box::new(SeiInjector {
                ctx,
                pts_rescaler: TSRescaler::clock_relative(ctx.clock.clone(), StreamTimeBase(stream_tb)),
                prev_pts: ClockTS(i64::MIN),
                prev_input_id: None,
            }),
        ));
    }
    if let Some(scte_index) = classification.scte {
        processors.push((scte_index, Box::new(NullScteProcessor)));
    }

    remux_loop(source, sink, stream_tb, processors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, TimeBase};
    use crate::config::Config;
    use crate::container::{CodecId, InMemoryContainer, StreamDescriptor, StreamType};
    use crate::input::{AbstractInput, CLEAR_INPUT_ID, InputManager, InputSpec, UserDefinedInput};
    use crate::queue::QueueGroup;
    use std::sync::Arc;

    fn video_stream() -> StreamDescriptor {
        StreamDescriptor { index: 0, codec_id: CodecId::H264, stream_type: StreamType::Video, time_base: TimeBase::new(1, 90_000) }
    }

    fn bare_frame_packet(pts: i64) -> Packet {
        let mut framed = Vec::new();
        emit_avcc_nalu(&Nalu::new(&[NaluType::IdrSlice as u8, 0xAA]), &mut framed);
        Packet::new(0, pts, pts, framed)
    }

    fn context_with_selected_input() -> AppContext {
        let queues = Arc::new(QueueGroup::new());
        let spec = InputSpec { id: 1, name: "cam1".to_string(), ..InputSpec::clear() };
        let input = UserDefinedInput::new(spec, queues.clone());
        input.push(Metadata::<SeiKind>::new(
            1,
            ClockTS(0),
            ClockTS(0),
            0,
            Arc::new(OwnedSeiPayload::new(SeiType::UserDataRegistered, vec![9, 9, 9])),
        ));
        let inputs =
            InputManager::new(vec![AbstractInput::Clear { id: CLEAR_INPUT_ID }, AbstractInput::UserDefined(input)]);
        inputs.set_current_by_name(MetadataKind::Sei, "cam1").unwrap();
        AppContext::new(queues, Arc::new(Clock::new()), inputs, Config::default())
    }

    #[test]
    fn injector_appends_a_sei_nalu_carrying_the_current_inputs_metadata() {
        let ctx = context_with_selected_input();
        let mut source = InMemoryContainer::new(vec![video_stream()], vec![bare_frame_packet(90_000)]);
        let mut sink = InMemoryContainer::new(vec![video_stream()], vec![]);

        run(&ctx, &mut source, &mut sink).unwrap();

        let written = sink.written();
        assert_eq!(written.len(), 1);

        let nalus: Vec<_> = AvccNaluIterator::new(&written[0].data).collect::<Result<_, _>>().unwrap();
        assert!(nalus.iter().any(|n| n.nalu_type() == NaluType::Sei));
    }

    #[test]
    fn injector_ticks_the_clock_from_the_time_source_stream() {
        // The rescaler anchors its first sample to the clock's value at construction (here 0),
        // so the clock only advances once a second sample establishes a delta.
        let ctx = context_with_selected_input();
        let mut source =
            InMemoryContainer::new(vec![video_stream()], vec![bare_frame_packet(90_000), bare_frame_packet(180_000)]);
        let mut sink = InMemoryContainer::new(vec![video_stream()], vec![]);

        run(&ctx, &mut source, &mut sink).unwrap();

        assert_eq!(ctx.clock.now(), ClockTS(90_000));
    }

    fn extracted_payloads(packet: &Packet) -> Vec<OwnedSeiPayload> {
        let nalus: Vec<_> = AvccNaluIterator::new(&packet.data).collect::<Result<_, _>>().unwrap();
        let sei = nalus.iter().find(|n| n.nalu_type() == NaluType::Sei).expect("no SEI NALU in output packet");
        parse_sei_payloads(&ebsp_to_sodb(&sei.data()[1..]).unwrap()).unwrap()
    }

    #[test]
    fn selection_change_between_frames_resets_and_swaps_captions() {
        let queues = Arc::new(QueueGroup::new());

        let cam1 = UserDefinedInput::new(InputSpec { id: 1, name: "cam1".to_string(), ..InputSpec::clear() }, queues.clone());
        cam1.push(Metadata::<SeiKind>::new(
            1,
            ClockTS(0),
            ClockTS(0),
            0,
            Arc::new(OwnedSeiPayload::new(SeiType::UserDataRegistered, vec![9, 9, 9])),
        ));

        let cam2 = UserDefinedInput::new(InputSpec { id: 2, name: "cam2".to_string(), ..InputSpec::clear() }, queues.clone());
        cam2.push(Metadata::<SeiKind>::new(
            2,
            ClockTS(90_000),
            ClockTS(90_000),
            0,
            Arc::new(OwnedSeiPayload::new(SeiType::UserDataRegistered, vec![7, 7, 7])),
        ));

        let inputs = InputManager::new(vec![
            AbstractInput::Clear { id: CLEAR_INPUT_ID },
            AbstractInput::UserDefined(cam1),
            AbstractInput::UserDefined(cam2),
        ]);
        inputs.set_current_by_name(MetadataKind::Sei, "cam1").unwrap();
        let ctx = AppContext::new(queues, Arc::new(Clock::new()), inputs, Config::default());

        let mut injector = SeiInjector {
            ctx: &ctx,
            pts_rescaler: TSRescaler::clock_relative(ctx.clock.clone(), StreamTimeBase(TimeBase::new(1, 90_000))),
            prev_pts: ClockTS(i64::MIN),
            prev_input_id: None,
        };

        let mut frame1 = bare_frame_packet(90_000);
        injector.process(&mut frame1).unwrap();
        let payloads1 = extracted_payloads(&frame1);
        assert!(payloads1.iter().any(|p| p.data() == [9, 9, 9]), "cam1's caption must appear in frame 1");

        ctx.inputs.set_current_by_name(MetadataKind::Sei, "cam2").unwrap();

        let mut frame2 = bare_frame_packet(180_000);
        injector.process(&mut frame2).unwrap();
        let payloads2 = extracted_payloads(&frame2);
        assert!(!payloads2.iter().any(|p| p.data() == [9, 9, 9]), "stale cam1 caption must not bleed through");
        assert!(payloads2.iter().any(|p| p.data() == [7, 7, 7]), "cam2's caption must appear once selected");
    }
}
