//! Shared fixtures for the integration suites.

mod calibration;
mod dispatch;
mod persistence;
mod resolution;

use chimaera_common::osc::{OscArg, OscMessage};
use chimaera_config::context::Context;
use chimaera_config::dispatch::Dispatcher;
use chimaera_config::registry::SocketKind;
use chimaera_config::reply::Outbox;
use chimaera_config::sim::{SimPorts, sim_context};

// ── Device fixture ──────────────────────────────────────────────────

/// Simulated device answering calls on its config socket.
pub struct Device {
    pub ctx: Context,
    pub ports: SimPorts,
    pub dispatcher: Dispatcher,
    next_id: i32,
}

impl Device {
    pub fn new() -> Self {
        let (ctx, ports) = sim_context();
        Self::with_context(ctx, ports)
    }

    /// Device around an already wired context.
    pub fn with_context(ctx: Context, ports: SimPorts) -> Self {
        Self {
            ctx,
            ports,
            dispatcher: Dispatcher::with_defaults(),
            next_id: 1,
        }
    }

    /// Id the next [`Device::call`] will use.
    pub fn next_id(&self) -> i32 {
        self.next_id
    }

    /// Send one call and return every datagram it produced on the config
    /// socket, decoded.
    pub fn call(&mut self, path: &str, args: Vec<OscArg>) -> Vec<OscMessage> {
        let id = self.next_id;
        self.next_id += 1;

        let mut full = vec![OscArg::Int(id)];
        full.extend(args);
        let packet = OscMessage::new(path, full).to_bytes().expect("encodable call");
        self.send_raw(&packet)
    }

    /// Dispatch a raw packet and flush the replies.
    pub fn send_raw(&mut self, packet: &[u8]) -> Vec<OscMessage> {
        self.ports.net.clear_sent();
        let mut out = Outbox::new();
        self.dispatcher.dispatch_packet(&mut self.ctx, packet, &mut out);
        self.ctx.flush(&mut out);
        self.ports.net.messages(SocketKind::Config)
    }

    /// Deliver completed resolutions and flush their replies.
    pub fn poll(&mut self) -> Vec<OscMessage> {
        self.ports.net.clear_sent();
        let mut out = Outbox::new();
        self.dispatcher.poll(&mut self.ctx, &mut out);
        self.ctx.flush(&mut out);
        self.ports.net.messages(SocketKind::Config)
    }

    /// Values of a successful query, after the id and path.
    pub fn query(&mut self, path: &str) -> Vec<OscArg> {
        let replies = self.call(path, Vec::new());
        let reply = replies.last().expect("one reply");
        assert_eq!(reply.path, "/success", "query of {path} failed: {reply}");
        reply.args[2..].to_vec()
    }
}

/// Reason text of a `/fail id path reason` reply.
pub fn fail_reason(reply: &OscMessage) -> &str {
    assert_eq!(reply.path, "/fail", "expected failure, got {reply}");
    reply.args.last().and_then(OscArg::as_str).expect("reason string")
}
