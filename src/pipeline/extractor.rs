// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The per-input extractor thread body: pulls CC SEI and SCTE-35 metadata out of one configured
//! source's packets and pushes it onto the shared queues, while remuxing the source unchanged
//! into its mirror sink.

use std::sync::Arc;

use crate::clock::{StreamTimeBase, StreamTS, TSRescaler};
use crate::codec::h264::nalu::{AvccNaluIterator, NaluType};
use crate::codec::h264::rbsp::ebsp_to_sodb;
use crate::codec::h264::sei::{parse_sei_payloads, SeiType};
use crate::codec::h264::stdseis::build_cc_reset_metadata;
use crate::codec::scte35::parse_splice_info_section;
use crate::container::{Container, Packet};
use crate::context::AppContext;
use crate::error::ValidationError;
use crate::input::{AbstractInput, UserDefinedInput};
use crate::metadata::{Metadata, ScteKind, SeiKind};

use super::{classify_streams, remux_loop, PacketProcessor};

struct MaintenanceProcessor<'a> {
    input: &'a UserDefinedInput,
}

impl PacketProcessor for MaintenanceProcessor<'_> {
    fn process(&mut self, _packet: &mut Packet) -> anyhow::Result<bool> {
        Ok(self.input.is_restart_scheduled())
    }
}

struct SeiExtractor<'a> {
    input: &'a UserDefinedInput,
    pts_rescaler: TSRescaler,
    dts_rescaler: TSRescaler,
}

impl PacketProcessor for SeiExtractor<'_> {
    fn process(&mut self, packet: &mut Packet) -> anyhow::Result<bool> {
        let mut order = 0i32;

        for nalu in AvccNaluIterator::new(&packet.data) {
            let nalu = match nalu {
                Ok(n) => n,
                Err(e) => {
                    log::error!("parse error: {e}");
                    continue;
                }
            };

            if !nalu.is_valid() {
                log::error!("invalid NALU, skipping processing");
                continue;
            }
            if nalu.nalu_type() != NaluType::Sei {
                continue;
            }

            let sodb = match ebsp_to_sodb(&nalu.data()[1..]) {
                Ok(s) => s,
                Err(e) => {
                    log::error!("parse error: {e}");
                    continue;
                }
            };
            let payloads = match parse_sei_payloads(&sodb) {
                Ok(p) => p,
                Err(e) => {
                    log::error!("parse error: {e}");
                    continue;
                }
            };

            for payload in payloads {
                if payload.payload_type() != SeiType::UserDataRegistered {
                    continue;
                }

                let rescaled_pts = self.pts_rescaler.rescale_to_clock(StreamTS(packet.pts));
                let rescaled_dts = self.dts_rescaler.rescale_to_clock(StreamTS(packet.dts));
                log::trace!("found CC SEI at pts {}, rescaled {:?}", packet.pts, rescaled_pts);

                self.input.push(Metadata::<SeiKind>::new(self.input.spec.id, rescaled_pts, rescaled_dts, order, Arc::new(payload)));
                order += 1;
            }
        }

        Ok(false)
    }
}

struct ScteExtractor<'a> {
    input: &'a UserDefinedInput,
    pts_rescaler: TSRescaler,
    dts_rescaler: TSRescaler,
}

impl PacketProcessor for ScteExtractor<'_> {
    fn process(&mut self, packet: &mut Packet) -> anyhow::Result<bool> {
        match parse_splice_info_section(&packet.data) {
            Ok(section) => {
                let rescaled_pts = self.pts_rescaler.rescale_to_clock(StreamTS(packet.pts));
                let rescaled_dts = self.dts_rescaler.rescale_to_clock(StreamTS(packet.dts));
                log::trace!("found SCTE-35 section at dts {}, pts {}, rescaled {:?}", packet.dts, packet.pts, rescaled_pts);

                self.input.push(Metadata::<ScteKind>::new(self.input.spec.id, rescaled_pts, rescaled_dts, 0, Arc::new(section)));
            }
            Err(e) => log::error!("parse error: {e}"),
        }

        Ok(false)
    }
}

fn post_exit(input: &UserDefinedInput, ctx: &AppContext) {
    let dropped = ctx.queues.sei.drop_id(input.spec.id) + ctx.queues.scte.drop_id(input.spec.id);
    if dropped > 0 {
        log::debug!("dropped {dropped} left-over metadata entries from queue");
    } else {
        log::debug!("no left-over metadata on queue");
    }

    let reset = build_cc_reset_metadata(input.spec.id, ctx.clock.now() + crate::clock::ONE_CLOCK_TICK);
    log::debug!("pushed CC reset at {:?}", reset.pts);
    ctx.queues.sei.push(reset);
}

fn run_loop(input: &UserDefinedInput, ctx: &AppContext, source: &mut dyn Container, sink: &mut dyn Container) -> anyhow::Result<()> {
    input.reset_restart();

    let classification = classify_streams(source.streams());
    let time_source_index = classification.require_time_source()?;
    let stream_tb = source.streams()[time_source_index].time_base;

    let mut processors: Vec<(usize, Box<dyn PacketProcessor + '_>)> =
        vec![(time_source_index, Box::new(MaintenanceProcessor { input }))];

    if let Some(sei_index) = classification.sei {
        processors.push((
            sei_index,
            Box::new(SeiExtractor {
                input,
                pts_rescaler: TSRescaler::clock_relative(ctx.clock.clone(), StreamTimeBase(stream_tb)),
                dts_rescaler: TSRescaler::clock_relative(ctx.clock.clone(), StreamTimeBase(stream_tb)),
            }),
        ));
    }
    if let Some(scte_index) = classification.scte {
        processors.push((
            scte_index,
            Box::new(ScteExtractor {
                input,
                pts_rescaler: TSRescaler::clock_relative(ctx.clock.clone(), StreamTimeBase(stream_tb)),
                dts_rescaler: TSRescaler::clock_relative(ctx.clock.clone(), StreamTimeBase(stream_tb)),
            }),
        ));
    }

    remux_loop(source, sink, stream_tb, processors)
}

/// Runs one configured input's extractor to exhaustion (or until a restart is scheduled or
/// requested). On the way out — however it ends — drops any metadata this input still had queued
/// and pushes a CC-reset record so the next selection of this input (or of another one) never
/// sees stale captions bleed through.
pub fn run(input_name: &str, ctx: &AppContext, source: &mut dyn Container, sink: &mut dyn Container) -> anyhow::Result<()> {
    crate::logging::set_thread_name(format!("input:{input_name}"));

    let input = match ctx.inputs.get_by_name(input_name) {
        Some(AbstractInput::UserDefined(u)) => u,
        Some(AbstractInput::Clear { .. }) => anyhow::bail!("cannot run an extractor for the virtual clear input"),
        None => return Err(ValidationError::UnknownInputName(input_name.to_string()).into()),
    };

    let result = run_loop(input, ctx, source, sink);
    post_exit(input, ctx);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, TimeBase};
    use crate::codec::h264::sei::OwnedSeiPayload;
    use crate::config::Config;
    use crate::container::{CodecId, InMemoryContainer, StreamDescriptor, StreamType};
    use crate::input::{InputManager, InputSpec};
    use crate::queue::QueueGroup;

    fn video_stream() -> StreamDescriptor {
        StreamDescriptor { index: 0, codec_id: CodecId::H264, stream_type: StreamType::Video, time_base: TimeBase::new(1, 90_000) }
    }

    fn sei_packet_with_cc() -> Packet {
        let mut framed = Vec::new();
        crate::codec::h264::sei::emit_sei_payloads_to_avcc_nalu(
            &[OwnedSeiPayload::new(SeiType::UserDataRegistered, vec![1, 2, 3])],
            &mut framed,
        );
        Packet::new(0, 100, 100, framed)
    }

    fn context_with_one_input() -> (AppContext, String) {
        let queues = Arc::new(QueueGroup::new());
        let spec = InputSpec { id: 1, name: "cam1".to_string(), ..InputSpec::clear() };
        let input = crate::input::AbstractInput::UserDefined(UserDefinedInput::new(spec, queues.clone()));
        let inputs = InputManager::new(vec![crate::input::AbstractInput::Clear { id: crate::input::CLEAR_INPUT_ID }, input]);
        (AppContext::new(queues, Arc::new(Clock::new()), inputs, Config::default()), "cam1".to_string())
    }

    #[test]
    fn extracts_user_data_registered_sei_into_the_shared_queue() {
        let (ctx, name) = context_with_one_input();
        let mut source = InMemoryContainer::new(vec![video_stream()], vec![sei_packet_with_cc()]);
        let mut sink = InMemoryContainer::new(vec![video_stream()], vec![]);

        run(&name, &ctx, &mut source, &mut sink).unwrap();

        assert_eq!(sink.written().len(), 1);
        assert_eq!(ctx.queues.sei.len(), 2); // the extracted record, plus post_exit's CC reset
    }

    #[test]
    fn post_exit_drops_queue_entries_and_pushes_a_reset() {
        let (ctx, name) = context_with_one_input();
        let mut source = InMemoryContainer::new(vec![video_stream()], vec![]);
        let mut sink = InMemoryContainer::new(vec![video_stream()], vec![]);

        run(&name, &ctx, &mut source, &mut sink).unwrap();

        assert_eq!(ctx.queues.sei.len(), 1);
    }

    #[test]
    fn refuses_to_run_for_the_virtual_clear_input() {
        let (ctx, _) = context_with_one_input();
        let mut source = InMemoryContainer::new(vec![video_stream()], vec![]);
        let mut sink = InMemoryContainer::new(vec![video_stream()], vec![]);
        assert!(run("clear", &ctx, &mut source, &mut sink).is_err());
    }
}
