//! Custom expression item handlers.

use chimaera_common::consts::{CUSTOM_EXPR_LEN, CUSTOM_MAX_EXPR, CUSTOM_PATH_LEN};
use chimaera_common::osc::OscArg;
use tracing::debug;

use super::{Call, HandlerRegistry, Response, int_setting};
use crate::context::Context;
use crate::custom::{CustomItem, Destination, compile};
use crate::error::ConfigError;
use crate::registry::bounded_string;
use crate::reply::Outbox;

pub fn register(registry: &mut HandlerRegistry) {
    registry.register("custom.reset", reset);
    registry.register("custom.append", append);
    registry.register("custom.remove", remove);
    registry.register("custom.item", item);
}

/// Free every slot.
fn reset(ctx: &mut Context, _: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    ctx.config.custom.items.iter_mut().for_each(CustomItem::clear);
    Ok(Response::Ack)
}

/// `dest path expression`, stored in the first free slot.
fn append(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let dest = call.string(0)?;
    let destination = Destination::from_name(dest).ok_or_else(|| ConfigError::NotAllowed {
        value: dest.to_string(),
        allowed: Destination::ALL.map(Destination::as_str).join(", "),
    })?;
    let path = call.string(1)?;
    if !path.starts_with('/') {
        return Err(ConfigError::Invalid(format!("invalid output path '{path}'")));
    }
    let expression = call.string(2)?;

    let item = CustomItem {
        destination: Some(destination),
        path: bounded_string::<CUSTOM_PATH_LEN>(path)?,
        expression: bounded_string::<CUSTOM_EXPR_LEN>(expression)?,
        program: compile(expression)?,
    };
    let (slot, free) = ctx
        .config
        .custom
        .items
        .iter_mut()
        .enumerate()
        .find(|(_, item)| item.is_free())
        .ok_or_else(|| ConfigError::Invalid("no free custom slot".into()))?;
    *free = item;
    debug!("Custom item {} bound to {} on {}", slot, path, dest);
    Ok(Response::Ack)
}

fn remove(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let slot = int_setting(call, 0, CUSTOM_MAX_EXPR as i32 - 1)? as usize;
    ctx.config.custom.items[slot].clear();
    Ok(Response::Ack)
}

/// `/chimaera/custom/item/{i}`: destination, path and expression of one
/// slot. A free slot reports destination `none`.
fn item(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let slot = call
        .index
        .and_then(|i| ctx.config.custom.items.get(i))
        .ok_or_else(|| ConfigError::Invalid(format!("no custom item at {}", call.path)))?;
    let destination = slot.destination.map_or("none", Destination::as_str);
    Ok(Response::Values(vec![
        OscArg::string(destination),
        OscArg::string(slot.path.as_str()),
        OscArg::string(slot.expression.as_str()),
    ]))
}
