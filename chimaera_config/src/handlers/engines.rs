//! Output engine settings.

use chimaera_common::osc::OscArg;

use super::{Call, HandlerRegistry, Response, float_setting, int_setting, toggle};
use crate::context::{Context, Engines};
use crate::error::ConfigError;
use crate::registry::{AddAction, Config, INSTRUMENT_LENGTH, bounded_string};
use crate::reply::Outbox;

pub fn register(registry: &mut HandlerRegistry) {
    registry.register("engine.enabled", engine_enabled);
    registry.register("output.reset", output_reset);
    registry.register("tuio.version", tuio_version);
    registry.register("tuio.long_header", tuio_long_header);
    registry.register("scsynth.instrument", scsynth_instrument);
    registry.register("scsynth.offset", scsynth_offset);
    registry.register("scsynth.modulo", scsynth_modulo);
    registry.register("scsynth.prealloc", scsynth_prealloc);
    registry.register("scsynth.addaction", scsynth_addaction);
    registry.register("oscmidi.offset", oscmidi_offset);
    registry.register("oscmidi.range", oscmidi_range);
    registry.register("oscmidi.effect", oscmidi_effect);
}

fn engine_flag<'c>(config: &'c mut Config, engine: &str) -> Option<&'c mut bool> {
    match engine {
        "tuio" => Some(&mut config.tuio.enabled),
        "dump" => Some(&mut config.dump.enabled),
        "scsynth" => Some(&mut config.scsynth.enabled),
        "oscmidi" => Some(&mut config.oscmidi.enabled),
        "custom" => Some(&mut config.custom.enabled),
        "dummy" => Some(&mut config.dummy.enabled),
        _ => None,
    }
}

/// `/chimaera/{engine}/enabled`
fn engine_enabled(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let engine = call.parent().unwrap_or_default();
    let flag = engine_flag(&mut ctx.config, engine)
        .ok_or_else(|| ConfigError::Invalid(format!("no engine at {}", call.path)))?;
    let response = toggle(call, flag)?;
    ctx.engines = Engines::from_config(&ctx.config);
    Ok(response)
}

/// Disable every output engine.
fn output_reset(ctx: &mut Context, _: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    for engine in ["tuio", "dump", "scsynth", "oscmidi", "custom", "dummy"] {
        if let Some(flag) = engine_flag(&mut ctx.config, engine) {
            *flag = false;
        }
    }
    ctx.engines = Engines::empty();
    Ok(Response::Ack)
}

// ─── TUIO ───────────────────────────────────────────────────────────

fn tuio_version(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(ctx.config.tuio.version))));
    }
    ctx.config.tuio.version = int_setting(call, 1, 2)? as u8;
    Ok(Response::Ack)
}

fn tuio_long_header(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    toggle(call, &mut ctx.config.tuio.long_header)
}

// ─── SuperCollider ──────────────────────────────────────────────────

fn scsynth_instrument(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::string(ctx.config.scsynth.instrument.as_str())));
    }
    ctx.config.scsynth.instrument = bounded_string::<INSTRUMENT_LENGTH>(call.string(0)?)?;
    Ok(Response::Ack)
}

fn scsynth_offset(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(ctx.config.scsynth.offset))));
    }
    ctx.config.scsynth.offset = int_setting(call, 0, i32::from(u16::MAX))? as u16;
    Ok(Response::Ack)
}

fn scsynth_modulo(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(ctx.config.scsynth.modulo))));
    }
    ctx.config.scsynth.modulo = int_setting(call, 1, i32::from(u16::MAX))? as u16;
    Ok(Response::Ack)
}

fn scsynth_prealloc(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    toggle(call, &mut ctx.config.scsynth.prealloc)
}

fn scsynth_addaction(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        let action = ctx.config.scsynth.addaction.as_str();
        return Ok(Response::value(OscArg::string(action)));
    }
    let value = call.string(0)?;
    ctx.config.scsynth.addaction = AddAction::ALL
        .into_iter()
        .find(|action| action.as_str() == value)
        .ok_or_else(|| ConfigError::NotAllowed {
            value: value.to_string(),
            allowed: AddAction::ALL.map(AddAction::as_str).join(", "),
        })?;
    Ok(Response::Ack)
}

// ─── OSC-MIDI ───────────────────────────────────────────────────────

fn oscmidi_offset(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Float(ctx.config.oscmidi.offset)));
    }
    ctx.config.oscmidi.offset = float_setting(call, 0.0, 127.0)?;
    Ok(Response::Ack)
}

fn oscmidi_range(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Float(ctx.config.oscmidi.range)));
    }
    ctx.config.oscmidi.range = float_setting(call, 0.0, 127.0)?;
    ctx.config.oscmidi.update_mul();
    Ok(Response::Ack)
}

fn oscmidi_effect(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(ctx.config.oscmidi.effect))));
    }
    ctx.config.oscmidi.effect = int_setting(call, 0, 127)? as u8;
    Ok(Response::Ack)
}
