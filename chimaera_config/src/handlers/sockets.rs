//! Socket and address handlers.
//!
//! The socket handlers are shared by every kind; the kind is taken from
//! the parent path segment (`/chimaera/{kind}/address`).
//!
//! Address sets with a literal IPv4 address apply synchronously. A
//! `.local` name is queried through the resolver and the call is parked
//! in the pending table; [`complete`] answers it once the resolver
//! reports back:
//!
//! ```text
//! /chimaera/output/address "synth.local:57110"
//!   ├─ pending["synth.local"] = {id, path, Socket(Output), 57110}
//!   └─ resolver.query("synth.local")          (no reply yet)
//! ...
//! poll() -> synth.local = 10.0.0.7
//!   └─ /success id path "10.0.0.7:57110"
//! ```

use chimaera_common::framing::Framing;
use chimaera_common::net::{HostSpec, format_socket_addr};
use chimaera_common::osc::OscArg;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

use super::{Call, HandlerRegistry, Response, int_setting};
use crate::context::Context;
use crate::error::ConfigError;
use crate::registry::SocketKind;
use crate::reply::Outbox;
use crate::resolver::{Continuation, Resolution, Target};

pub fn register(registry: &mut HandlerRegistry) {
    registry.register("socket.enabled", socket_enabled);
    registry.register("socket.address", socket_address);
    registry.register("socket.mode", socket_mode);
    registry.register("host.address", host_address);
    registry.register("resolve", resolve);
    registry.register("ipv4ll.enabled", ipv4ll_enabled);
    registry.register("sntp.tau", sntp_tau);
    registry.register("config.rate", config_rate);
}

/// Socket kind addressed by `call`.
fn socket_kind(call: &Call<'_>) -> Result<SocketKind, ConfigError> {
    let parent = call.parent().unwrap_or_default();
    SocketKind::ALL
        .into_iter()
        .find(|kind| kind.as_str() == parent)
        .ok_or_else(|| ConfigError::Invalid(format!("no socket at {}", call.path)))
}

fn socket_enabled(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let kind = socket_kind(call)?;
    if call.is_query() {
        let enabled = ctx.config.socket(kind).enabled;
        return Ok(Response::value(OscArg::Int(i32::from(enabled))));
    }
    ctx.set_socket_enabled(kind, call.bool(0)?)?;
    Ok(Response::Ack)
}

fn socket_address(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let kind = socket_kind(call)?;
    if call.is_query() {
        let socket = ctx.config.socket(kind);
        let addr = format_socket_addr(socket.ip, socket.remote_port());
        return Ok(Response::value(OscArg::string(addr)));
    }

    match HostSpec::parse(call.string(0)?, true)? {
        HostSpec::Literal { ip, port } => {
            ctx.set_remote(kind, ip, port)?;
            Ok(Response::Ack)
        }
        HostSpec::Mdns { name, port } => request_resolution(ctx, call, &name, Target::Socket(kind), port),
    }
}

fn socket_mode(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    let kind = socket_kind(call)?;
    if call.is_query() {
        let framing = ctx.config.socket(kind).framing;
        return Ok(Response::value(OscArg::string(framing.as_str())));
    }

    let value = call.string(0)?;
    let framing = value.parse::<Framing>().map_err(|_| ConfigError::NotAllowed {
        value: value.to_string(),
        allowed: Framing::ALL.map(Framing::as_str).join(", "),
    })?;
    ctx.update_socket(kind, |socket| socket.framing = framing)?;
    Ok(Response::Ack)
}

/// Re-point every service socket at one host.
fn host_address(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    match HostSpec::parse(call.string(0)?, false)? {
        HostSpec::Literal { ip, port } => {
            set_host(ctx, ip, port)?;
            Ok(Response::Ack)
        }
        HostSpec::Mdns { name, port } => request_resolution(ctx, call, &name, Target::Host, port),
    }
}

fn set_host(ctx: &mut Context, ip: Ipv4Addr, port: Option<u16>) -> Result<(), ConfigError> {
    let previous = SocketKind::SERVICES.map(|kind| *ctx.config.socket(kind));
    for kind in SocketKind::SERVICES {
        if let Err(e) = ctx.set_remote(kind, ip, port) {
            for (kind, socket) in SocketKind::SERVICES.into_iter().zip(previous) {
                if let Err(e) = ctx.update_socket(kind, |s| *s = socket) {
                    warn!("Socket {} not restored: {}", kind, e);
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Resolve a name without applying it.
fn resolve(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    match HostSpec::parse(call.string(0)?, false)? {
        HostSpec::Literal { ip, .. } => Ok(Response::value(OscArg::string(ip.to_string()))),
        HostSpec::Mdns { name, .. } => request_resolution(ctx, call, &name, Target::Lookup, None),
    }
}

fn ipv4ll_enabled(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(ctx.config.ipv4ll))));
    }
    let enabled = call.bool(0)?;
    if enabled {
        ctx.claim_link_local()?;
    }
    ctx.config.ipv4ll = enabled;
    Ok(Response::Ack)
}

fn sntp_tau(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(ctx.config.sntp_tau))));
    }
    ctx.config.sntp_tau = int_setting(call, 1, 10)? as u8;
    Ok(Response::Ack)
}

fn config_rate(ctx: &mut Context, call: &Call<'_>, _: &mut Outbox) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(ctx.config.config_rate))));
    }
    ctx.config.config_rate = int_setting(call, 1, 10)? as u8;
    Ok(Response::Ack)
}

// ─── Resolution ─────────────────────────────────────────────────────

/// Park `call` until `hostname` resolves.
///
/// # Errors
/// `ConfigError::ResolutionInProgress` when the name is already pending or
/// the table is full, or the resolver's refusal. Neither leaves an entry
/// behind.
fn request_resolution(
    ctx: &mut Context,
    call: &Call<'_>,
    hostname: &str,
    target: Target,
    port: Option<u16>,
) -> Result<Response, ConfigError> {
    let continuation = Continuation {
        id: call.id,
        path: call.path.to_string(),
        target,
        port,
    };
    ctx.pending.insert(hostname, continuation)?;
    if let Err(e) = ctx.resolver.query(hostname) {
        ctx.pending.take(hostname);
        return Err(e.into());
    }
    info!("Resolving {} for {}", hostname, call.path);
    Ok(Response::Deferred)
}

/// Answer the call waiting on `resolution`.
pub fn complete(ctx: &mut Context, resolution: Resolution, out: &mut Outbox) {
    let Some(cont) = ctx.pending.take(&resolution.hostname) else {
        debug!("Unsolicited resolution of {}", resolution.hostname);
        return;
    };
    let Some(ip) = resolution.address else {
        warn!("Resolution of {} failed", resolution.hostname);
        out.fail(cont.id, &cont.path, ConfigError::ResolutionFailed(resolution.hostname));
        return;
    };

    let applied = match cont.target {
        Target::Socket(kind) => ctx.set_remote(kind, ip, cont.port),
        Target::Host => set_host(ctx, ip, cont.port),
        Target::Lookup => Ok(()),
    };
    match applied {
        Ok(()) => {
            info!("Resolved {} to {}", resolution.hostname, ip);
            let value = match cont.port {
                Some(port) => format_socket_addr(ip, port),
                None => ip.to_string(),
            };
            out.success(cont.id, &cont.path, vec![OscArg::string(value)]);
        }
        Err(e) => out.fail(cont.id, &cont.path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IPV4LL_MAX_PROBES;
    use crate::sim::sim_context;
    use chimaera_common::consts::FAIL_PATH;

    fn call<'a>(path: &'a str, args: &'a [OscArg]) -> Call<'a> {
        Call::new(7, path, args)
    }

    #[test]
    fn kind_from_parent_segment() {
        assert_eq!(
            socket_kind(&call("/chimaera/sntp/address", &[])).unwrap(),
            SocketKind::Sntp
        );
        assert!(socket_kind(&call("/chimaera/rate", &[])).is_err());
    }

    #[test]
    fn literal_address_applies_synchronously() {
        let (mut ctx, ports) = sim_context();
        let args = [OscArg::string("10.0.0.9:57110")];
        let resp = socket_address(&mut ctx, &call("/chimaera/output/address", &args), &mut Outbox::new());
        assert_eq!(resp.unwrap(), Response::Ack);

        let socket = ctx.config.socket(SocketKind::Output);
        assert_eq!(socket.ip, Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(socket.ports, [3333, 57110]);
        assert_eq!(ports.net.opened_with(SocketKind::Output), Some(*socket));
        assert!(ports.resolver.queries().is_empty());

        let resp = socket_address(&mut ctx, &call("/chimaera/output/address", &[]), &mut Outbox::new());
        assert_eq!(resp.unwrap(), Response::value(OscArg::string("10.0.0.9:57110")));
    }

    #[test]
    fn failed_reopen_leaves_descriptor() {
        let (mut ctx, ports) = sim_context();
        ports.net.fail_open(SocketKind::Output);

        let args = [OscArg::string("slip")];
        let resp = socket_mode(&mut ctx, &call("/chimaera/output/mode", &args), &mut Outbox::new());
        assert!(resp.is_err());
        let args = [OscArg::string("10.9.9.9:9000")];
        let resp = socket_address(&mut ctx, &call("/chimaera/output/address", &args), &mut Outbox::new());
        assert!(resp.is_err());

        let socket = ctx.config.socket(SocketKind::Output);
        assert_eq!(socket.ip, Ipv4Addr::new(192, 168, 1, 255));
        assert_eq!(socket.ports, [3333, 3333]);
        assert_eq!(socket.framing, Framing::Udp);
    }

    #[test]
    fn failed_host_set_restores_every_service() {
        let (mut ctx, ports) = sim_context();
        let before = ctx.config.clone();
        ports.net.fail_open(SocketKind::Sntp);

        assert!(set_host(&mut ctx, Ipv4Addr::new(10, 0, 0, 2), Some(9000)).is_err());
        assert_eq!(ctx.config, before);
        assert_eq!(
            ports.net.opened_with(SocketKind::Output),
            Some(*before.socket(SocketKind::Output))
        );
    }

    #[test]
    fn address_requires_port_and_supported_host() {
        let (mut ctx, _) = sim_context();
        let before = ctx.config.clone();
        for bad in ["10.0.0.9", "synth.example.com:1", "host:port"] {
            let args = [OscArg::string(bad)];
            assert!(socket_address(&mut ctx, &call("/chimaera/config/address", &args), &mut Outbox::new()).is_err());
        }
        let args = [OscArg::string("synth.example.com:1")];
        assert_eq!(
            socket_address(&mut ctx, &call("/chimaera/config/address", &args), &mut Outbox::new())
                .unwrap_err()
                .to_string(),
            "can only resolve raw IP and mDNS addresses"
        );
        assert_eq!(ctx.config, before);
    }

    #[test]
    fn mdns_address_is_deferred_until_completion() {
        let (mut ctx, ports) = sim_context();
        let args = [OscArg::string("synth.local:57110")];
        let mut out = Outbox::new();
        let resp = socket_address(&mut ctx, &call("/chimaera/output/address", &args), &mut out);
        assert_eq!(resp.unwrap(), Response::Deferred);
        assert!(out.is_empty());
        assert_eq!(ports.resolver.queries(), vec!["synth.local"]);
        assert!(ctx.pending.is_pending("synth.local"));

        complete(
            &mut ctx,
            Resolution {
                hostname: "synth.local".into(),
                address: Some(Ipv4Addr::new(10, 0, 0, 7)),
            },
            &mut out,
        );
        assert!(ctx.pending.is_empty());
        assert_eq!(ctx.config.socket(SocketKind::Output).ip, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(
            out.messages(),
            &[crate::reply::success(
                7,
                "/chimaera/output/address",
                vec![OscArg::string("10.0.0.7:57110")]
            )]
        );
    }

    #[test]
    fn second_resolution_rejected_without_touching_first() {
        let (mut ctx, ports) = sim_context();
        let first = [OscArg::string("a.local:1")];
        let second = [OscArg::string("b.local:2")];
        socket_address(&mut ctx, &call("/chimaera/output/address", &first), &mut Outbox::new()).unwrap();

        let err = socket_address(&mut ctx, &call("/chimaera/debug/address", &second), &mut Outbox::new())
            .unwrap_err();
        assert_eq!(err, ConfigError::ResolutionInProgress);
        assert_eq!(err.to_string(), "resolution already in progress");
        assert!(ctx.pending.is_pending("a.local"));
        assert_eq!(ports.resolver.queries(), vec!["a.local"]);
    }

    #[test]
    fn failed_resolution_replies_fail() {
        let (mut ctx, _) = sim_context();
        let args = [OscArg::string("gone.local:1")];
        socket_address(&mut ctx, &call("/chimaera/sntp/address", &args), &mut Outbox::new()).unwrap();
        let before = *ctx.config.socket(SocketKind::Sntp);

        let mut out = Outbox::new();
        complete(
            &mut ctx,
            Resolution {
                hostname: "GONE.local".into(),
                address: None,
            },
            &mut out,
        );
        let msg = &out.messages()[0];
        assert_eq!(msg.path, FAIL_PATH);
        assert_eq!(msg.args[2], OscArg::string("resolution of GONE.local failed or timed out"));
        assert_eq!(*ctx.config.socket(SocketKind::Sntp), before);
        assert!(ctx.pending.is_empty());
    }

    #[test]
    fn refused_query_leaves_no_entry() {
        let (mut ctx, ports) = sim_context();
        ports.resolver.refuse();
        let args = [OscArg::string("a.local:1")];
        assert!(matches!(
            socket_address(&mut ctx, &call("/chimaera/output/address", &args), &mut Outbox::new()),
            Err(ConfigError::Resolve(_))
        ));
        assert!(ctx.pending.is_empty());
    }

    #[test]
    fn unsolicited_completion_is_ignored() {
        let (mut ctx, _) = sim_context();
        let mut out = Outbox::new();
        complete(
            &mut ctx,
            Resolution {
                hostname: "stray.local".into(),
                address: Some(Ipv4Addr::LOCALHOST),
            },
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn host_address_repoints_services() {
        let (mut ctx, _) = sim_context();
        let args = [OscArg::string("10.1.2.3")];
        host_address(&mut ctx, &call("/chimaera/host/address", &args), &mut Outbox::new()).unwrap();
        for kind in SocketKind::SERVICES {
            assert_eq!(ctx.config.socket(kind).ip, Ipv4Addr::new(10, 1, 2, 3));
        }
        assert_ne!(ctx.config.socket(SocketKind::Mdns).ip, Ipv4Addr::new(10, 1, 2, 3));
    }

    #[test]
    fn resolve_lookup_replies_bare_address() {
        let (mut ctx, _) = sim_context();
        let literal = [OscArg::string("10.0.0.1")];
        assert_eq!(
            resolve(&mut ctx, &call("/chimaera/resolve", &literal), &mut Outbox::new()).unwrap(),
            Response::value(OscArg::string("10.0.0.1"))
        );

        let name = [OscArg::string("box.local")];
        let mut out = Outbox::new();
        assert_eq!(
            resolve(&mut ctx, &call("/chimaera/resolve", &name), &mut out).unwrap(),
            Response::Deferred
        );
        let before = ctx.config.clone();
        complete(
            &mut ctx,
            Resolution {
                hostname: "box.local".into(),
                address: Some(Ipv4Addr::new(10, 0, 0, 3)),
            },
            &mut out,
        );
        assert_eq!(out.messages()[0].args[2], OscArg::string("10.0.0.3"));
        assert_eq!(ctx.config, before);
    }

    #[test]
    fn mode_rejects_unknown_framing() {
        let (mut ctx, _) = sim_context();
        let args = [OscArg::string("raw")];
        assert_eq!(
            socket_mode(&mut ctx, &call("/chimaera/config/mode", &args), &mut Outbox::new())
                .unwrap_err()
                .to_string(),
            "value raw is not one of [udp, tcp, slip]"
        );
        let args = [OscArg::string("slip")];
        socket_mode(&mut ctx, &call("/chimaera/config/mode", &args), &mut Outbox::new()).unwrap();
        assert_eq!(ctx.config.socket(SocketKind::Config).framing, Framing::Slip);
    }

    #[test]
    fn ipv4ll_flag_only_set_on_claim() {
        let (mut ctx, ports) = sim_context();
        ports.net.set_arp_taken(IPV4LL_MAX_PROBES);
        let on = [OscArg::True];
        assert!(ipv4ll_enabled(&mut ctx, &call("/chimaera/ipv4ll/enabled", &on), &mut Outbox::new()).is_err());
        assert!(!ctx.config.ipv4ll);

        ipv4ll_enabled(&mut ctx, &call("/chimaera/ipv4ll/enabled", &on), &mut Outbox::new()).unwrap();
        assert!(ctx.config.ipv4ll);
        assert_eq!(ctx.config.comm.ip.octets()[..2], [169, 254]);
    }

    #[test]
    fn socket_enable_toggles() {
        let (mut ctx, ports) = sim_context();
        let off = [OscArg::Int(0)];
        socket_enabled(&mut ctx, &call("/chimaera/debug/enabled", &off), &mut Outbox::new()).unwrap();
        assert!(!ports.net.is_open(SocketKind::Debug));
        assert_eq!(
            socket_enabled(&mut ctx, &call("/chimaera/debug/enabled", &[]), &mut Outbox::new()).unwrap(),
            Response::value(OscArg::Int(0))
        );
    }

    #[test]
    fn tau_is_range_checked() {
        let (mut ctx, _) = sim_context();
        let args = [OscArg::Int(11)];
        assert_eq!(
            sntp_tau(&mut ctx, &call("/chimaera/sntp/tau", &args), &mut Outbox::new()).unwrap_err(),
            ConfigError::out_of_range(11, 1, 10)
        );
        assert_eq!(ctx.config.sntp_tau, 4);
    }
}
