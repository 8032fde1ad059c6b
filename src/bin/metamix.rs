// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Process entry point: parses configuration, wires up the shared context, and spawns one
//! extractor thread per configured input, one injector thread, and one controller thread.

use std::sync::Arc;
use std::thread;

use metamix::clock::Clock;
use metamix::config::{CliArgs, Config};
use metamix::container::Container;
use metamix::context::AppContext;
use metamix::input::{AbstractInput, InputManager, UserDefinedInput, CLEAR_INPUT_ID};
use metamix::metadata::MetadataKind;
use metamix::queue::QueueGroup;
use metamix::{control, logging, pipeline, supervisor};

/// Opens a container by URL with an optional named format hint.
///
/// This binary ships no real demuxer/muxer backend (see the `Container` trait in
/// `metamix::container`): wiring an actual one in is left to whoever deploys this against a real
/// media pipeline.
fn open_container(url: &str, format: Option<&str>) -> anyhow::Result<Box<dyn Container>> {
    Err(anyhow::anyhow!(
        "no container backend is compiled into this binary (wanted {url:?}, format {format:?}); \
         link one that implements `metamix::container::Container`"
    ))
}

fn run() -> anyhow::Result<()> {
    let args: CliArgs = argh::from_env();
    let config = Config::load(&args)?;
    config.validate()?;

    logging::init(&config.log_level, config.log_thread.as_deref());
    logging::set_thread_name("main");

    let queues = Arc::new(QueueGroup::new());
    let clock = Arc::new(Clock::new());

    let mut inputs = vec![AbstractInput::Clear { id: CLEAR_INPUT_ID }];
    for spec in &config.inputs {
        inputs.push(AbstractInput::UserDefined(UserDefinedInput::new(spec.clone(), queues.clone())));
    }
    let input_manager = InputManager::new(inputs);

    if let Some(name) = &config.starting_input {
        for kind in MetadataKind::ALL {
            input_manager.set_current_by_name(kind, name)?;
        }
    }

    let ctx = Arc::new(AppContext::new(queues, clock, input_manager, config));

    let controller_ctx = ctx.clone();
    let controller_thread = thread::spawn(move || {
        supervisor::supervised("controller", &controller_ctx, || control::run(&controller_ctx));
    });

    let mut primary_threads = Vec::new();

    for spec in ctx.config.inputs.clone() {
        let input_ctx = ctx.clone();
        primary_threads.push(thread::spawn(move || {
            supervisor::supervised(&format!("input:{}", spec.name), &input_ctx, || {
                let mut source = open_container(&spec.source, spec.source_format.as_deref())?;
                let mut sink = open_container(&spec.sink, spec.sink_format.as_deref())?;
                pipeline::extractor::run(&spec.name, &input_ctx, source.as_mut(), sink.as_mut())
            });
        }));
    }

    let output_ctx = ctx.clone();
    primary_threads.push(thread::spawn(move || {
        supervisor::supervised("output", &output_ctx, || {
            let output = &output_ctx.config.output;
            let mut source = open_container(&output.source, output.source_format.as_deref())?;
            let mut sink = open_container(&output.sink, output.sink_format.as_deref())?;
            pipeline::injector::run(&output_ctx, source.as_mut(), sink.as_mut())
        });
    }));

    for thread in primary_threads {
        let _ = thread.join();
    }

    log::debug!("Exiting...");
    ctx.exit();

    let _ = controller_thread.join();

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
