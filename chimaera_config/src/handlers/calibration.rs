//! Calibration handlers.
//!
//! Each phase reports the values it produced as one message per sensor on
//! the config socket, ahead of the call's own reply:
//!
//! ```text
//! zero  /range/qui    i mean mean-0x7ff
//! min   /range/thresh i south north
//! mid   /range/coeff  i a_s b_s c_s a_n b_n c_n   then /range/bmin f
//! ```

use chimaera_common::consts::{ADC_HALF_BITDEPTH, CALIBRATION_SLOTS};
use chimaera_common::osc::{OscArg, OscMessage};

use super::{Call, HandlerRegistry, Response, float_setting, int_setting};
use crate::calibration::{Calibration, Pole, clamp_slot};
use crate::context::Context;
use crate::error::ConfigError;
use crate::reply::Outbox;

pub fn register(registry: &mut HandlerRegistry) {
    registry.register("calibration.start", start);
    registry.register("calibration.zero", zero);
    registry.register("calibration.min", min);
    registry.register("calibration.mid", mid);
    registry.register("calibration.save", save);
    registry.register("calibration.load", load);
    registry.register("calibration.print", print);
    registry.register("calibration.slot", slot);
}

fn quiescent_messages(cal: &Calibration, out: &mut Outbox) {
    for (i, range) in cal.ranges().iter().enumerate() {
        let mean = i32::from(range.mean);
        out.push(OscMessage::new(
            "/range/qui",
            vec![
                OscArg::Int(i as i32),
                OscArg::Int(mean),
                OscArg::Int(mean - i32::from(ADC_HALF_BITDEPTH)),
            ],
        ));
    }
}

fn thresh_messages(cal: &Calibration, out: &mut Outbox) {
    for (i, range) in cal.ranges().iter().enumerate() {
        out.push(OscMessage::new(
            "/range/thresh",
            vec![
                OscArg::Int(i as i32),
                OscArg::Int(i32::from(range.thresh[Pole::South.index()])),
                OscArg::Int(i32::from(range.thresh[Pole::North.index()])),
            ],
        ));
    }
}

fn coeff_messages(cal: &Calibration, out: &mut Outbox) {
    for (i, range) in cal.ranges().iter().enumerate() {
        let mut args = vec![OscArg::Int(i as i32)];
        for pole in Pole::ALL {
            let p = pole.index();
            args.extend([
                OscArg::Float(range.a[p]),
                OscArg::Float(range.b[p]),
                OscArg::Float(range.c[p]),
            ]);
        }
        out.push(OscMessage::new("/range/coeff", args));
    }
}

fn start(ctx: &mut Context, _: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    ctx.calibration.start();
    Ok(Response::Ack)
}

fn zero(ctx: &mut Context, _: &Call<'_>, out: &mut Outbox) -> Result<Response, ConfigError> {
    ctx.calibration.zero();
    quiescent_messages(&ctx.calibration, out);
    Ok(Response::Ack)
}

fn min(ctx: &mut Context, _: &Call<'_>, out: &mut Outbox) -> Result<Response, ConfigError> {
    ctx.calibration.min();
    thresh_messages(&ctx.calibration, out);
    Ok(Response::Ack)
}

/// `y1`: normalized value of the recorded midpoint excursion.
fn mid(ctx: &mut Context, call: &Call<'_>, out: &mut Outbox) -> Result<Response, ConfigError> {
    let y1 = float_setting(call, 0.0, 1.0)?;
    ctx.calibration.mid(y1);
    coeff_messages(&ctx.calibration, out);
    out.push(OscMessage::new(
        "/range/bmin",
        vec![OscArg::Float(ctx.calibration.bmin())],
    ));
    Ok(Response::Ack)
}

/// Slot argument, or the configured default slot.
fn slot_arg(ctx: &Context, call: &Call<'_>) -> Result<u8, ConfigError> {
    Ok(call
        .opt_int(0)?
        .map(clamp_slot)
        .unwrap_or(ctx.config.calibration))
}

fn save(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let slot = slot_arg(ctx, call)?;
    ctx.calibration.save(ctx.eeprom.as_mut(), slot)?;
    Ok(Response::Ack)
}

fn load(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let slot = slot_arg(ctx, call)?;
    ctx.calibration.load(ctx.eeprom.as_mut(), slot)?;
    Ok(Response::Ack)
}

/// Report the table in RAM without changing it.
fn print(ctx: &mut Context, _: &Call<'_>, out: &mut Outbox) -> Result<Response, ConfigError> {
    quiescent_messages(&ctx.calibration, out);
    thresh_messages(&ctx.calibration, out);
    coeff_messages(&ctx.calibration, out);
    Ok(Response::Ack)
}

/// Default slot used at boot and by slot-less save/load.
fn slot(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(ctx.config.calibration))));
    }
    let max = i32::from(CALIBRATION_SLOTS) - 1;
    ctx.config.calibration = int_setting(call, 0, max)? as u8;
    Ok(Response::Ack)
}
