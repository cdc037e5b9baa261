//! Integration test: remote calls end to end.
//!
//! Validates: reply shapes, range checking with bound naming, address
//! arithmetic of the interface handlers, introspection of every method,
//! array addressing and framing changes taking effect on the next reply.

use chimaera_common::osc::OscArg;
use chimaera_config::query::{QueryTree, ROOT};
use chimaera_config::registry::SocketKind;

use super::{Device, fail_reason};

// ── Reply shapes ────────────────────────────────────────────────────

#[test]
fn set_then_query_round_trips() {
    let mut dev = Device::new();
    let id = dev.next_id();
    let replies = dev.call("/chimaera/sntp/tau", vec![OscArg::Int(7)]);
    assert_eq!(replies.len(), 1);
    assert_eq!(
        replies[0].args,
        vec![OscArg::Int(id), OscArg::string("/chimaera/sntp/tau")]
    );
    assert_eq!(dev.query("/chimaera/sntp/tau"), vec![OscArg::Int(7)]);
}

#[test]
fn out_of_range_names_bounds_and_keeps_value() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/sntp/tau", vec![OscArg::Int(11)]);
    assert_eq!(
        fail_reason(&replies[0]),
        "callback, format or range invalid: value 11 is out of range [1, 10]"
    );
    assert_eq!(dev.query("/chimaera/sntp/tau"), vec![OscArg::Int(4)]);
}

#[test]
fn wrong_type_is_rejected() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/rate", vec![OscArg::Float(100.0)]);
    assert_eq!(
        fail_reason(&replies[0]),
        "callback, format or range invalid: argument 0 expects one of 'i' but got 'f'"
    );
}

#[test]
fn call_without_id_fails_without_path() {
    let mut dev = Device::new();
    let packet = chimaera_common::osc::OscMessage::new("/chimaera/rate", vec![])
        .to_bytes()
        .unwrap();
    let replies = dev.send_raw(&packet);
    assert_eq!(replies.len(), 1);
    assert_eq!(
        replies[0].args,
        vec![OscArg::string("format error: missing or invalid call identifier")]
    );
}

#[test]
fn write_only_method_has_no_query_form() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/custom/append", vec![]);
    assert_eq!(
        fail_reason(&replies[0]),
        "callback, format or range invalid: query form not supported"
    );
}

// ── Interface addressing ────────────────────────────────────────────

#[test]
fn cidr_sets_mask_and_gateway() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/comm/ip", vec![OscArg::string("192.168.1.50/24")]);
    assert_eq!(replies[0].path, "/success");

    assert_eq!(dev.query("/chimaera/comm/ip"), vec![OscArg::string("192.168.1.50/24")]);
    assert_eq!(dev.query("/chimaera/comm/gateway"), vec![OscArg::string("192.168.1.0")]);
    assert_eq!(dev.query("/chimaera/comm/subnet"), vec![OscArg::string("255.255.255.0")]);
}

#[test]
fn explicit_gateway_wins() {
    let mut dev = Device::new();
    dev.call(
        "/chimaera/comm/ip",
        vec![OscArg::string("10.1.2.3/8"), OscArg::string("10.0.0.1")],
    );
    assert_eq!(dev.query("/chimaera/comm/gateway"), vec![OscArg::string("10.0.0.1")]);
    assert_eq!(
        dev.query("/chimaera/output/address"),
        vec![OscArg::string("10.255.255.255:3333")]
    );
}

#[test]
fn non_contiguous_subnet_is_rejected() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/comm/subnet", vec![OscArg::string("255.0.255.0")]);
    assert_eq!(replies[0].path, "/fail");
    assert_eq!(dev.query("/chimaera/comm/subnet"), vec![OscArg::string("255.255.255.0")]);
}

// ── Introspection ───────────────────────────────────────────────────

#[test]
fn every_method_describes_its_arguments() {
    let tree = QueryTree::build(&ROOT);
    let mut dev = Device::new();

    for (path, _, args) in tree.methods() {
        let replies = dev.call(&format!("{path}!"), vec![]);
        assert_eq!(replies[0].path, "/success", "introspection of {path}");
        assert_eq!(replies[0].args[1], OscArg::string(path));

        let json: serde_json::Value =
            serde_json::from_str(replies[0].args[2].as_str().unwrap()).unwrap();
        assert_eq!(json["type"], "method", "{path}");
        assert_eq!(json["arguments"].as_array().unwrap().len(), args.len(), "{path}");
    }
}

#[test]
fn nodes_and_arrays_describe_children() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/comm!", vec![]);
    let json: serde_json::Value = serde_json::from_str(replies[0].args[2].as_str().unwrap()).unwrap();
    assert_eq!(json["type"], "node");
    assert!(json["items"].as_array().unwrap().contains(&serde_json::json!("ip")));

    let replies = dev.call("/chimaera/custom/item!", vec![]);
    let json: serde_json::Value = serde_json::from_str(replies[0].args[2].as_str().unwrap()).unwrap();
    assert_eq!(json["type"], "array");
    assert_eq!(json["size"], 8);

    let replies = dev.call("/chimaera/custom/item", vec![]);
    assert_eq!(fail_reason(&replies[0]), "unknown method for path or format");
}

// ── Arrays ──────────────────────────────────────────────────────────

#[test]
fn custom_items_are_addressed_by_index() {
    let mut dev = Device::new();
    dev.call(
        "/chimaera/custom/append",
        vec![OscArg::string("on"), OscArg::string("/note"), OscArg::string("$x 48 *")],
    );
    assert_eq!(
        dev.query("/chimaera/custom/item/0"),
        vec![OscArg::string("on"), OscArg::string("/note"), OscArg::string("$x 48 *")]
    );
    assert_eq!(dev.query("/chimaera/custom/item/1")[0], OscArg::string("none"));

    let replies = dev.call(
        "/chimaera/custom/append",
        vec![OscArg::string("on"), OscArg::string("/bad"), OscArg::string("$q")],
    );
    assert!(fail_reason(&replies[0]).starts_with("parse error"));
}

// ── Framing ─────────────────────────────────────────────────────────

#[test]
fn tcp_framing_applies_to_following_replies() {
    let mut dev = Device::new();
    dev.call("/chimaera/config/mode", vec![OscArg::string("tcp")]);

    dev.ports.net.clear_sent();
    let mut out = chimaera_config::reply::Outbox::new();
    let packet = chimaera_common::osc::OscMessage::new("/chimaera/version", vec![OscArg::Int(9)])
        .to_bytes()
        .unwrap();
    dev.dispatcher.dispatch_packet(&mut dev.ctx, &packet, &mut out);
    dev.ctx.flush(&mut out);

    let sent = dev.ports.net.sent(SocketKind::Config);
    assert_eq!(sent.len(), 1);
    let size = u32::from_be_bytes([sent[0][0], sent[0][1], sent[0][2], sent[0][3]]) as usize;
    assert_eq!(size, sent[0].len() - 4);
}

#[test]
fn unknown_framing_lists_choices() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/debug/mode", vec![OscArg::string("serial")]);
    assert_eq!(
        fail_reason(&replies[0]),
        "callback, format or range invalid: value serial is not one of [udp, tcp, slip]"
    );
}
