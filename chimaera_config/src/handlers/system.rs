//! Sampling, output timing and reset handlers.

use chimaera_common::osc::{OscArg, timestamp_to_seconds};
use std::time::Duration;
use tracing::info;

use super::{Call, HandlerRegistry, Response, int_setting, toggle};
use crate::context::{Context, ResetMode, ResetRequest};
use crate::error::ConfigError;
use crate::reply::Outbox;

/// Moving average windows and their bit shifts.
const WINDOWS: [(i32, u8); 4] = [(2, 1), (4, 2), (8, 3), (16, 4)];

pub fn register(registry: &mut HandlerRegistry) {
    registry.register("reset.soft", reset);
    registry.register("reset.hard", reset);
    registry.register("reset.bootloader", reset);
    registry.register("output.offset", output_offset);
    registry.register("rate", rate);
    registry.register("movingaverage.enabled", movingaverage_enabled);
    registry.register("movingaverage.samples", movingaverage_samples);
    registry.register("interpolation.order", interpolation_order);
    registry.register("curve", curve);
}

/// `/chimaera/reset/{soft,hard,bootloader} [delay]`
///
/// Stores the mode for the next boot and leaves the restart to the runner,
/// which performs it after the reply is flushed.
fn reset(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let mode = match call.leaf() {
        "soft" => ResetMode::Soft,
        "hard" => ResetMode::Hard,
        "bootloader" => ResetMode::Bootloader,
        other => return Err(ConfigError::Invalid(format!("unknown reset mode {other}"))),
    };
    let delay = call.opt_int(0)?.unwrap_or(1).max(1) as u64;

    ctx.system.write_reset_mode(mode);
    ctx.reset = Some(ResetRequest {
        mode,
        delay: Duration::from_secs(delay),
    });
    info!("{} reset in {} s", mode.as_str(), delay);
    Ok(Response::Ack)
}

/// Output timestamp offset in seconds; set as `t`, `f` or `d`.
fn output_offset(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Double(ctx.config.output_offset)));
    }
    ctx.config.output_offset = match call.arg(0)? {
        OscArg::Timestamp(t) => timestamp_to_seconds(*t),
        OscArg::Float(f) => f64::from(*f),
        OscArg::Double(d) => *d,
        other => {
            return Err(ConfigError::Argument {
                index: 0,
                reason: format!("expects one of 'tfd' but got '{}'", other.tag()),
            });
        }
    };
    Ok(Response::Ack)
}

/// Sample rate in Hz; 0 runs unthrottled and is queried as infinitum.
fn rate(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(match ctx.config.rate {
            0 => OscArg::Infinitum,
            rate => OscArg::Int(i32::from(rate)),
        }));
    }
    ctx.config.rate = int_setting(call, 0, i32::from(u16::MAX))? as u16;
    Ok(Response::Ack)
}

fn movingaverage_enabled(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    toggle(call, &mut ctx.config.movingaverage.enabled)
}

fn movingaverage_samples(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        let samples = ctx.config.movingaverage.samples() as i32;
        return Ok(Response::value(OscArg::Int(samples)));
    }
    let samples = call.int(0)?;
    let (_, shift) = WINDOWS
        .into_iter()
        .find(|(window, _)| *window == samples)
        .ok_or_else(|| ConfigError::NotAllowed {
            value: samples.to_string(),
            allowed: "2, 4, 8, 16".into(),
        })?;
    ctx.config.movingaverage.bitshift = shift;
    Ok(Response::Ack)
}

fn interpolation_order(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(ctx.config.interpolation_order))));
    }
    ctx.config.interpolation_order = int_setting(call, 0, 3)? as u8;
    Ok(Response::Ack)
}

/// Default response curve `a b c`.
fn curve(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let coeffs = &mut ctx.config.curve;
    if call.is_query() {
        return Ok(Response::Values(vec![
            OscArg::Float(coeffs.a),
            OscArg::Float(coeffs.b),
            OscArg::Float(coeffs.c),
        ]));
    }
    let (a, b, c) = (call.float(0)?, call.float(1)?, call.float(2)?);
    coeffs.a = a;
    coeffs.b = b;
    coeffs.c = c;
    Ok(Response::Ack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::sim_context;
    use chimaera_common::osc::seconds_to_timestamp;

    fn call<'a>(path: &'a str, args: &'a [OscArg]) -> Call<'a> {
        Call::new(1, path, args)
    }

    #[test]
    fn reset_stores_mode_and_clamps_delay() {
        let (mut ctx, ports) = sim_context();
        let args = [OscArg::Int(-3)];
        reset(&mut ctx, &call("/chimaera/reset/hard", &args), &mut Outbox::new()).unwrap();
        assert_eq!(ports.system.stored_mode(), Some(ResetMode::Hard));
        assert_eq!(
            ctx.reset,
            Some(ResetRequest {
                mode: ResetMode::Hard,
                delay: Duration::from_secs(1)
            })
        );

        let args = [OscArg::Int(5)];
        reset(&mut ctx, &call("/chimaera/reset/bootloader", &args), &mut Outbox::new()).unwrap();
        assert_eq!(ctx.reset.map(|r| r.delay), Some(Duration::from_secs(5)));
        assert_eq!(ports.system.stored_mode(), Some(ResetMode::Bootloader));
    }

    #[test]
    fn offset_accepts_three_encodings() {
        let (mut ctx, _) = sim_context();
        let t = [OscArg::Timestamp(seconds_to_timestamp(0.25))];
        output_offset(&mut ctx, &call("/x", &t), &mut Outbox::new()).unwrap();
        assert!((ctx.config.output_offset - 0.25).abs() < 1e-6);

        let f = [OscArg::Float(0.5)];
        output_offset(&mut ctx, &call("/x", &f), &mut Outbox::new()).unwrap();
        assert_eq!(ctx.config.output_offset, 0.5);

        let d = [OscArg::Double(0.125)];
        output_offset(&mut ctx, &call("/x", &d), &mut Outbox::new()).unwrap();
        assert_eq!(
            output_offset(&mut ctx, &call("/x", &[]), &mut Outbox::new()).unwrap(),
            Response::value(OscArg::Double(0.125))
        );
    }

    #[test]
    fn zero_rate_reads_as_infinitum() {
        let (mut ctx, _) = sim_context();
        let args = [OscArg::Int(0)];
        rate(&mut ctx, &call("/chimaera/rate", &args), &mut Outbox::new()).unwrap();
        assert_eq!(
            rate(&mut ctx, &call("/chimaera/rate", &[]), &mut Outbox::new()).unwrap(),
            Response::value(OscArg::Infinitum)
        );
    }

    #[test]
    fn sample_windows_are_powers_of_two() {
        let (mut ctx, _) = sim_context();
        let args = [OscArg::Int(16)];
        movingaverage_samples(&mut ctx, &call("/x", &args), &mut Outbox::new()).unwrap();
        assert_eq!(ctx.config.movingaverage.bitshift, 4);

        let args = [OscArg::Int(5)];
        assert_eq!(
            movingaverage_samples(&mut ctx, &call("/x", &args), &mut Outbox::new())
                .unwrap_err()
                .to_string(),
            "value 5 is not one of [2, 4, 8, 16]"
        );
        assert_eq!(ctx.config.movingaverage.samples(), 16);
    }

    #[test]
    fn curve_sets_all_three_coefficients() {
        let (mut ctx, _) = sim_context();
        let args = [OscArg::Float(0.1), OscArg::Float(0.2), OscArg::Float(0.3)];
        curve(&mut ctx, &call("/chimaera/curve", &args), &mut Outbox::new()).unwrap();
        assert_eq!(
            curve(&mut ctx, &call("/chimaera/curve", &[]), &mut Outbox::new()).unwrap(),
            Response::Values(vec![OscArg::Float(0.1), OscArg::Float(0.2), OscArg::Float(0.3)])
        );
    }

    #[test]
    fn partial_curve_leaves_registry_untouched() {
        let (mut ctx, _) = sim_context();
        let before = ctx.config.curve;
        let args = [OscArg::Float(0.1), OscArg::Float(0.2)];
        assert!(curve(&mut ctx, &call("/chimaera/curve", &args), &mut Outbox::new()).is_err());
        assert_eq!(ctx.config.curve, before);
    }
}
