// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The HTTP control surface: a thread-per-connection JSON API for stats, input selection, input
//! restart, and runtime config, served over `tiny_http` and shut down by the shared context's
//! exit broadcast.

use std::sync::Arc;

use serde_json::{json, Value};
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::context::AppContext;
use crate::input::AbstractInput;
use crate::metadata::{InputId, MetadataKind};

const SERVER_STRING: &str = concat!("metamix/", env!("CARGO_PKG_VERSION"));

fn server_header() -> Header {
    Header::from_bytes(&b"Server"[..], SERVER_STRING.as_bytes()).expect("static header is valid")
}

fn content_type_json() -> Header {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).expect("static header is valid")
}

struct ApiError {
    status: u16,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: 400, message: message.into() }
    }

    fn not_found() -> Self {
        Self { status: 404, message: "Resource does not exist.".to_string() }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<crate::error::ValidationError> for ApiError {
    fn from(e: crate::error::ValidationError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

fn parse_input_ref(args: &Value) -> Result<(Option<InputId>, Option<&str>), ApiError> {
    if let Some(id) = args.get("id") {
        let id = id.as_u64().ok_or_else(|| ApiError::bad_request("\"id\" must be a number"))? as InputId;
        Ok((Some(id), None))
    } else if let Some(name) = args.get("name") {
        let name = name.as_str().ok_or_else(|| ApiError::bad_request("\"name\" must be a string"))?;
        Ok((None, Some(name)))
    } else {
        Err(ApiError::bad_request("expected \"name\" or \"id\""))
    }
}

fn get_input_by_ref<'a>(ctx: &'a AppContext, args: &Value) -> Result<&'a AbstractInput, ApiError> {
    let (id, name) = parse_input_ref(args)?;
    let input = match (id, name) {
        (Some(id), _) => ctx.inputs.get_by_id(id),
        (_, Some(name)) => ctx.inputs.get_by_name(name),
        _ => None,
    };
    input.ok_or_else(|| ApiError::bad_request("unknown input"))
}

fn input_info(input: &AbstractInput) -> Value {
    let spec = input.spec();
    let caps = input.caps();
    json!({
        "id": spec.id,
        "name": spec.name,
        "source": spec.source,
        "sink": spec.sink,
        "sourceFormat": spec.source_format.unwrap_or_default(),
        "sinkFormat": spec.sink_format.unwrap_or_default(),
        "isVirtual": spec.is_virtual,
        "caps": {
            "closedCaption": caps.has(MetadataKind::Sei),
            "adMarker": caps.has(MetadataKind::Scte),
        },
    })
}

fn get_stats(ctx: &AppContext) -> Value {
    json!({
        "queueSize": {
            "closedCaption": ctx.queues.size(MetadataKind::Sei),
            "adMarker": ctx.queues.size(MetadataKind::Scte),
        },
        "clockNow": ctx.clock.now().0,
    })
}

fn get_all_inputs(ctx: &AppContext) -> Value {
    Value::Array(ctx.inputs.iter().map(input_info).collect())
}

fn get_current_input(ctx: &AppContext) -> Result<Value, ApiError> {
    let mut result = serde_json::Map::new();
    for kind in MetadataKind::ALL {
        let input = ctx.inputs.current_input(kind);
        result.insert(kind.api_name().to_string(), input_info(input));
    }
    Ok(Value::Object(result))
}

fn set_current_input(ctx: &AppContext, args: Value) -> Result<Value, ApiError> {
    if args.get("id").is_some() || args.get("name").is_some() {
        let input = get_input_by_ref(ctx, &args)?;
        for kind in MetadataKind::ALL {
            ctx.inputs.set_current(kind, input.id())?;
        }
    } else {
        for kind in MetadataKind::ALL {
            if let Some(kind_args) = args.get(kind.api_name()) {
                let input = get_input_by_ref(ctx, kind_args)?;
                ctx.inputs.set_current(kind, input.id())?;
            }
        }
    }
    Ok(json!({ "ok": true }))
}

fn restart_input(ctx: &AppContext, args: Value) -> Result<Value, ApiError> {
    let input = get_input_by_ref(ctx, &args)?;
    input.schedule_restart();
    Ok(json!({ "ok": true }))
}

fn get_config(ctx: &AppContext) -> Value {
    json!({ "tsAdjustment": ctx.ts_adjustment().0 })
}

fn set_config(ctx: &AppContext, args: Value) -> Result<Value, ApiError> {
    if let Some(v) = args.get("tsAdjustment") {
        let v = v.as_i64().ok_or_else(|| ApiError::bad_request("\"tsAdjustment\" must be a number"))?;
        ctx.set_ts_adjustment(crate::clock::ClockTS(v));
    }
    Ok(json!({ "ok": true }))
}

fn parse_body(body: &str) -> Result<Value, ApiError> {
    Ok(serde_json::from_str(body)?)
}

fn route(ctx: &AppContext, method: &Method, path: &str, body: &str) -> Result<Value, ApiError> {
    match (method, path) {
        (Method::Get, "/stats") => Ok(get_stats(ctx)),
        (Method::Get, "/input") => Ok(get_all_inputs(ctx)),
        (Method::Get, "/input/current") => get_current_input(ctx),
        (Method::Post, "/input/current") => set_current_input(ctx, parse_body(body)?),
        (Method::Post, "/input/restart") => restart_input(ctx, parse_body(body)?),
        (Method::Get, "/config") => Ok(get_config(ctx)),
        (Method::Post, "/config") => set_config(ctx, parse_body(body)?),
        _ => Err(ApiError::not_found()),
    }
}

fn handle_request(ctx: &AppContext, mut request: tiny_http::Request) {
    let url = request.url().to_string();
    if !url.starts_with('/') || url.contains("..") {
        respond(request, 400, &json!({ "error": "Illegal request-target." }));
        return;
    }

    log::info!("{:?} {}", request.method(), url);

    let mut body = String::new();
    if let Err(e) = std::io::Read::read_to_string(request.as_reader(), &mut body) {
        log::error!("failed reading request body: {e}");
        respond(request, 500, &json!({ "error": e.to_string() }));
        return;
    }

    let method = request.method().clone();
    match route(ctx, &method, &url, &body) {
        Ok(value) => respond(request, 200, &value),
        Err(e) => respond(request, e.status, &json!({ "error": e.message })),
    }
}

fn respond(request: tiny_http::Request, status: u16, body: &Value) {
    let body_string = body.to_string();
    let response = Response::from_string(body_string)
        .with_status_code(StatusCode(status))
        .with_header(server_header())
        .with_header(content_type_json());
    if let Err(e) = request.respond(response) {
        log::error!("failed writing response: {e}");
    }
}

/// Runs the control surface to completion: accepts connections on `ctx.config.http_address:port`
/// until [`AppContext::exit`] unblocks the listener.
pub fn run(ctx: &AppContext) -> anyhow::Result<()> {
    crate::logging::set_thread_name("controller");

    let address = format!("{}:{}", ctx.config.http_address, ctx.config.http_port);
    let server = Arc::new(Server::http(&address).map_err(|e| anyhow::anyhow!("failed to bind {address}: {e}"))?);

    let for_exit = server.clone();
    ctx.on_exit(move || {
        log::debug!("stopping REST server...");
        for_exit.unblock();
    });

    for request in server.incoming_requests() {
        handle_request(ctx, request);
    }

    log::debug!("REST server stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::Config;
    use crate::input::{CLEAR_INPUT_ID, InputManager, InputSpec, UserDefinedInput};
    use crate::queue::QueueGroup;
    use std::sync::Arc;

    fn context() -> AppContext {
        let queues = Arc::new(QueueGroup::new());
        let spec = InputSpec { id: 1, name: "cam1".to_string(), ..InputSpec::clear() };
        let input = AbstractInput::UserDefined(UserDefinedInput::new(spec, queues.clone()));
        let inputs = InputManager::new(vec![AbstractInput::Clear { id: CLEAR_INPUT_ID }, input]);
        AppContext::new(queues, Arc::new(Clock::new()), inputs, Config::default())
    }

    #[test]
    fn stats_reports_queue_sizes_and_clock() {
        let ctx = context();
        let body = get_stats(&ctx);
        assert_eq!(body["clockNow"], 0);
        assert_eq!(body["queueSize"]["closedCaption"], 0);
    }

    #[test]
    fn set_current_input_by_single_ref_selects_both_kinds() {
        let ctx = context();
        set_current_input(&ctx, json!({ "name": "cam1" })).unwrap();
        assert_eq!(ctx.inputs.current_id(MetadataKind::Sei), 1);
        assert_eq!(ctx.inputs.current_id(MetadataKind::Scte), 1);
    }

    #[test]
    fn set_current_input_by_per_kind_ref_selects_only_that_kind() {
        let ctx = context();
        set_current_input(&ctx, json!({ "closedCaption": { "name": "cam1" } })).unwrap();
        assert_eq!(ctx.inputs.current_id(MetadataKind::Sei), 1);
        assert_eq!(ctx.inputs.current_id(MetadataKind::Scte), CLEAR_INPUT_ID);
    }

    #[test]
    fn set_current_input_rejects_unknown_name() {
        let ctx = context();
        assert!(set_current_input(&ctx, json!({ "name": "nope" })).is_err());
    }

    #[test]
    fn restart_input_schedules_restart_on_named_input() {
        let ctx = context();
        restart_input(&ctx, json!({ "name": "cam1" })).unwrap();
        match ctx.inputs.get_by_name("cam1").unwrap() {
            AbstractInput::UserDefined(u) => assert!(u.is_restart_scheduled()),
            _ => panic!("expected user-defined input"),
        }
    }

    #[test]
    fn config_round_trips_ts_adjustment() {
        let ctx = context();
        set_config(&ctx, json!({ "tsAdjustment": 42 })).unwrap();
        assert_eq!(get_config(&ctx)["tsAdjustment"], 42);
    }

    #[test]
    fn route_rejects_unknown_path_with_not_found() {
        let ctx = context();
        let err = route(&ctx, &Method::Get, "/nonexistent", "").unwrap_err();
        assert_eq!(err.status, 404);
    }

    #[test]
    fn route_rejects_malformed_json_body_with_bad_request() {
        let ctx = context();
        let err = route(&ctx, &Method::Post, "/config", "{not json").unwrap_err();
        assert_eq!(err.status, 400);
    }
}
