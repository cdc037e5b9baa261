//! Device identity and interface handlers.

use chimaera_common::consts::FIRMWARE_VERSION;
use chimaera_common::net::{
    cidr_to_mask, format_cidr, format_mac, mask_to_cidr, network, parse_cidr, parse_ipv4, parse_mac,
};
use chimaera_common::osc::OscArg;
use tracing::info;

use super::{Call, HandlerRegistry, Response, toggle};
use crate::context::Context;
use crate::error::ConfigError;
use crate::registry::Comm;
use crate::reply::Outbox;

pub fn register(registry: &mut HandlerRegistry) {
    registry.register("version", version);
    registry.register("uid", uid);
    registry.register("name", name);
    registry.register("config.load", config_load);
    registry.register("config.save", config_save);
    registry.register("comm.mac", comm_mac);
    registry.register("comm.ip", comm_ip);
    registry.register("comm.gateway", comm_gateway);
    registry.register("comm.subnet", comm_subnet);
    registry.register("comm.locally", comm_locally);
    registry.register("comm.subnet_check", comm_subnet_check);
}

fn version(_: &mut Context, _: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let (major, minor, patch) = FIRMWARE_VERSION;
    Ok(Response::value(OscArg::string(format!("{major}.{minor}.{patch}"))))
}

fn uid(ctx: &mut Context, _: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    Ok(Response::value(OscArg::string(ctx.uid())))
}

fn name(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::string(ctx.config.name.as_str())));
    }
    ctx.config.set_name(call.string(0)?)?;
    Ok(Response::Ack)
}

fn config_load(ctx: &mut Context, _: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let outcome = ctx.load_config()?;
    info!("Configuration reloaded ({:?})", outcome);
    Ok(Response::Ack)
}

fn config_save(ctx: &mut Context, _: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    ctx.save_config()?;
    info!("Configuration saved");
    Ok(Response::Ack)
}

fn comm_mac(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::string(format_mac(&ctx.config.comm.mac))));
    }
    let mac = parse_mac(call.string(0)?)?;
    if mac[0] & 0x01 != 0 {
        return Err(ConfigError::Invalid("multicast MAC address not allowed".into()));
    }
    ctx.set_comm(Comm { mac, ..ctx.config.comm })?;
    Ok(Response::Ack)
}

/// `a.b.c.d/n [gateway]`. The gateway defaults to the network address.
fn comm_ip(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let comm = ctx.config.comm;
    if call.is_query() {
        let prefix = mask_to_cidr(comm.subnet)?;
        return Ok(Response::value(OscArg::string(format_cidr(comm.ip, prefix))));
    }

    let gateway = match call.args.get(1) {
        Some(_) => Some(parse_ipv4(call.string(1)?)?),
        None => None,
    };
    let (ip, prefix) = parse_cidr(call.string(0)?)?;
    let subnet = cidr_to_mask(prefix);
    let gateway = gateway.unwrap_or_else(|| network(ip, subnet));

    ctx.set_identity(ip, subnet, gateway)?;
    Ok(Response::Ack)
}

fn comm_gateway(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::string(ctx.config.comm.gateway.to_string())));
    }
    let gateway = parse_ipv4(call.string(0)?)?;
    ctx.set_comm(Comm { gateway, ..ctx.config.comm })?;
    Ok(Response::Ack)
}

fn comm_subnet(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let comm = ctx.config.comm;
    if call.is_query() {
        return Ok(Response::value(OscArg::string(comm.subnet.to_string())));
    }
    let subnet = parse_ipv4(call.string(0)?)?;
    mask_to_cidr(subnet)?;
    ctx.set_identity(comm.ip, subnet, comm.gateway)?;
    Ok(Response::Ack)
}

fn comm_locally(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    toggle(call, &mut ctx.config.comm.locally)
}

fn comm_subnet_check(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    toggle(call, &mut ctx.config.comm.subnet_check)
}
