//! Integration test: `.local` address resolution.
//!
//! Validates: literal addresses reply at once, mDNS names defer the reply
//! until the resolver completes, a second request is rejected without
//! disturbing the first, and timeouts surface as failures.

use chimaera_common::osc::OscArg;
use chimaera_config::registry::SocketKind;
use std::net::Ipv4Addr;

use super::{Device, fail_reason};

#[test]
fn literal_address_replies_immediately() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/output/address", vec![OscArg::string("10.0.0.9:9000")]);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].path, "/success");
    assert!(dev.ports.resolver.queries().is_empty());
    assert_eq!(
        dev.query("/chimaera/output/address"),
        vec![OscArg::string("10.0.0.9:9000")]
    );
}

#[test]
fn mdns_address_replies_on_completion() {
    let mut dev = Device::new();
    let id = dev.next_id();
    let replies = dev.call("/chimaera/output/address", vec![OscArg::string("synth.local:57110")]);
    assert!(replies.is_empty());
    assert_eq!(dev.ports.resolver.queries(), vec!["synth.local".to_string()]);

    dev.ports.resolver.complete("synth.local", Some(Ipv4Addr::new(10, 0, 0, 7)));
    let replies = dev.poll();
    assert_eq!(replies.len(), 1);
    assert_eq!(
        replies[0].args,
        vec![
            OscArg::Int(id),
            OscArg::string("/chimaera/output/address"),
            OscArg::string("10.0.0.7:57110"),
        ]
    );

    let output = dev.ctx.config.socket(SocketKind::Output);
    assert_eq!(output.ip, Ipv4Addr::new(10, 0, 0, 7));
    assert_eq!(output.remote_port(), 57110);
}

#[test]
fn second_request_leaves_first_pending() {
    let mut dev = Device::new();
    let first = dev.next_id();
    dev.call("/chimaera/output/address", vec![OscArg::string("synth.local:57110")]);

    let replies = dev.call("/chimaera/debug/address", vec![OscArg::string("logger.local:6666")]);
    assert_eq!(fail_reason(&replies[0]), "resolution already in progress");
    assert_eq!(dev.ports.resolver.queries().len(), 1);

    dev.ports.resolver.complete("synth.local", Some(Ipv4Addr::new(10, 0, 0, 7)));
    let replies = dev.poll();
    assert_eq!(replies[0].args[0], OscArg::Int(first));
    assert_eq!(replies[0].path, "/success");
}

#[test]
fn timeout_fails_and_frees_the_table() {
    let mut dev = Device::new();
    dev.call("/chimaera/host/address", vec![OscArg::string("studio.local")]);
    dev.ports.resolver.complete("studio.local", None);

    let replies = dev.poll();
    assert_eq!(
        fail_reason(&replies[0]),
        "resolution of studio.local failed or timed out"
    );
    assert!(dev.ctx.pending.is_empty());

    let replies = dev.call("/chimaera/resolve", vec![OscArg::string("studio.local")]);
    assert!(replies.is_empty());
    assert!(dev.ctx.pending.is_pending("studio.local"));
}

#[test]
fn host_resolution_repoints_service_sockets() {
    let mut dev = Device::new();
    dev.call("/chimaera/host/address", vec![OscArg::string("studio.local:7000")]);
    dev.ports.resolver.complete("studio.local", Some(Ipv4Addr::new(192, 168, 1, 20)));
    dev.poll();

    for kind in SocketKind::SERVICES {
        let socket = dev.ctx.config.socket(kind);
        assert_eq!(socket.ip, Ipv4Addr::new(192, 168, 1, 20), "{kind}");
        assert_eq!(socket.remote_port(), 7000, "{kind}");
    }
}

#[test]
fn unsupported_host_is_rejected() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/output/address", vec![OscArg::string("example.com:80")]);
    assert_eq!(fail_reason(&replies[0]), "can only resolve raw IP and mDNS addresses");
    assert!(dev.ctx.pending.is_empty());
}
