// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Configuration: a `key=value` file merged with CLI flags (CLI wins), validated once before
//! wiring up the application.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use argh::FromArgs;

use crate::error::ValidationError;
use crate::input::InputSpec;

/// metamix: multiplex closed-caption and ad-marker metadata across video streams.
#[derive(FromArgs, Debug)]
pub struct CliArgs {
    /// path to a key=value config file
    #[argh(option, short = 'c')]
    pub config_file: Option<String>,

    /// address the control surface listens on
    #[argh(option)]
    pub http_address: Option<String>,

    /// port the control surface listens on
    #[argh(option)]
    pub http_port: Option<u16>,

    /// name of the input to select for every kind at startup
    #[argh(option)]
    pub starting_input: Option<String>,

    /// log level: trace, debug, info, warning, error, fatal
    #[argh(option)]
    pub log: Option<String>,

    /// only log records from this thread name
    #[argh(option)]
    pub log_thread: Option<String>,

    /// never restart a crashed thread
    #[argh(switch)]
    pub no_restart: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub source: String,
    pub sink: String,
    pub source_format: Option<String>,
    pub sink_format: Option<String>,
    pub ts_adjustment: i64,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self { source: String::new(), sink: String::new(), source_format: None, sink_format: None, ts_adjustment: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub http_address: String,
    pub http_port: u16,
    pub starting_input: Option<String>,
    pub log_level: String,
    pub log_thread: Option<String>,
    pub no_restart: bool,
    pub inputs: Vec<InputSpec>,
    pub output: OutputSpec,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0".to_string(),
            http_port: 3445,
            starting_input: None,
            log_level: "info".to_string(),
            log_thread: None,
            no_restart: false,
            inputs: Vec::new(),
            output: OutputSpec::default(),
        }
    }
}

fn parse_key_value_file(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let contents = fs::read_to_string(path)?;
    let mut map = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(map)
}

/// A per-`input.<name>.*`/`output.*` key being assembled while the config map is walked.
#[derive(Default)]
struct InputBuilder {
    source: Option<String>,
    sink: Option<String>,
    source_format: Option<String>,
    sink_format: Option<String>,
}

fn inputs_from_map(map: &BTreeMap<String, String>) -> Vec<InputSpec> {
    let mut builders: BTreeMap<String, InputBuilder> = BTreeMap::new();

    for (key, value) in map {
        let Some(rest) = key.strip_prefix("input.") else { continue };
        let Some((name, field)) = rest.split_once('.') else { continue };
        let builder = builders.entry(name.to_string()).or_default();
        match field {
            "source" => builder.source = Some(value.clone()),
            "sink" => builder.sink = Some(value.clone()),
            "sourceformat" => builder.source_format = Some(value.clone()),
            "sinkformat" => builder.sink_format = Some(value.clone()),
            _ => {}
        }
    }

    builders
        .into_iter()
        .enumerate()
        .map(|(index, (name, builder))| InputSpec {
            // Input id 0 is reserved for `clear`; real inputs start at 1. Final ids are
            // reassigned once more when the application wires inputs up (see `Config::validate`'s
            // caller), this just needs a stable, non-zero placeholder per distinct name.
            id: (index + 1) as u32,
            name,
            source: builder.source.unwrap_or_default(),
            sink: builder.sink.unwrap_or_default(),
            source_format: builder.source_format,
            sink_format: builder.sink_format,
            is_virtual: false,
        })
        .collect()
}

fn output_from_map(map: &BTreeMap<String, String>) -> OutputSpec {
    OutputSpec {
        source: map.get("output.source").cloned().unwrap_or_default(),
        sink: map.get("output.sink").cloned().unwrap_or_default(),
        source_format: map.get("output.sourceformat").cloned(),
        sink_format: map.get("output.sinkformat").cloned(),
        ts_adjustment: map.get("output.ts_adjustment").and_then(|v| v.parse().ok()).unwrap_or(0),
    }
}

impl Config {
    /// Parses `args.config_file` (if any) into a `Config`, then applies every CLI flag on top,
    /// overriding the config-file value for the same setting.
    pub fn load(args: &CliArgs) -> anyhow::Result<Config> {
        let map = match &args.config_file {
            Some(path) => parse_key_value_file(Path::new(path))?,
            None => BTreeMap::new(),
        };

        let mut config = Config {
            http_address: map.get("http-address").cloned().unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: map.get("http-port").and_then(|v| v.parse().ok()).unwrap_or(3445),
            starting_input: map.get("starting-input").cloned(),
            log_level: map.get("log").cloned().unwrap_or_else(|| "info".to_string()),
            log_thread: map.get("log-thread").cloned(),
            no_restart: map.get("no-restart").map(|v| v == "true").unwrap_or(false),
            inputs: inputs_from_map(&map),
            output: output_from_map(&map),
        };

        if let Some(v) = &args.http_address {
            config.http_address = v.clone();
        }
        if let Some(v) = args.http_port {
            config.http_port = v;
        }
        if args.starting_input.is_some() {
            config.starting_input = args.starting_input.clone();
        }
        if let Some(v) = &args.log {
            config.log_level = v.clone();
        }
        if args.log_thread.is_some() {
            config.log_thread = args.log_thread.clone();
        }
        if args.no_restart {
            config.no_restart = true;
        }

        Ok(config)
    }

    /// Enforces: at least one non-reserved input; every input has a non-empty name/source/sink;
    /// no input is named `clear`; the output has a non-empty source and sink.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.inputs.is_empty() {
            return Err(ValidationError::msg("at least one input must be configured"));
        }

        for input in &self.inputs {
            if input.name.is_empty() {
                return Err(ValidationError::msg("an input has an empty name"));
            }
            if input.name == crate::input::CLEAR_INPUT_NAME {
                return Err(ValidationError::msg("the input name \"clear\" is reserved"));
            }
            if input.source.is_empty() || input.sink.is_empty() {
                return Err(ValidationError::msg(format!("input {:?} must have both a source and a sink", input.name)));
            }
        }

        if self.output.source.is_empty() || self.output.sink.is_empty() {
            return Err(ValidationError::msg("the output must have both a source and a sink"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            inputs: vec![InputSpec {
                id: 1,
                name: "cam1".to_string(),
                source: "udp://in".to_string(),
                sink: "udp://mirror".to_string(),
                source_format: None,
                sink_format: None,
                is_virtual: false,
            }],
            output: OutputSpec { source: "udp://out-src".to_string(), sink: "udp://out-sink".to_string(), ..OutputSpec::default() },
            ..Config::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_zero_inputs() {
        let mut config = valid_config();
        config.inputs.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_reserved_clear_name() {
        let mut config = valid_config();
        config.inputs[0].name = "clear".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_input_source() {
        let mut config = valid_config();
        config.inputs[0].source.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_missing_output_sink() {
        let mut config = valid_config();
        config.output.sink.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn key_value_file_parses_inputs_and_output() {
        let mut map = BTreeMap::new();
        map.insert("input.cam1.source".to_string(), "udp://a".to_string());
        map.insert("input.cam1.sink".to_string(), "udp://b".to_string());
        map.insert("output.source".to_string(), "udp://c".to_string());
        map.insert("output.sink".to_string(), "udp://d".to_string());
        map.insert("output.ts_adjustment".to_string(), "42".to_string());

        let inputs = inputs_from_map(&map);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].name, "cam1");
        assert_eq!(inputs[0].source, "udp://a");

        let output = output_from_map(&map);
        assert_eq!(output.ts_adjustment, 42);
    }
}
