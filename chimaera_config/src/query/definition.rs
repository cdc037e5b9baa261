//! The `/chimaera` namespace.
//!
//! Static definition of every node, array and method the device answers.
//! Handler ids are resolved by the [`HandlerRegistry`] when the dispatcher
//! is built; a method naming an unregistered id fails at startup.
//!
//! [`HandlerRegistry`]: crate::handlers::HandlerRegistry

use chimaera_common::consts::{CALIBRATION_SLOTS, CUSTOM_EXPR_LEN, CUSTOM_MAX_EXPR, CUSTOM_PATH_LEN, NAME_LENGTH};

use super::item::{ArgType, Mode, QueryArgument, QueryItem, QueryValue};
use crate::registry::INSTRUMENT_LENGTH;

use ArgType::{Bool, Float, Int32, String as Text, Timestamp};

// ─── Enumerations ───────────────────────────────────────────────────

const FRAMINGS: &[QueryValue] = &[QueryValue::Str("udp"), QueryValue::Str("tcp"), QueryValue::Str("slip")];

const ADD_ACTIONS: &[QueryValue] = &[
    QueryValue::Str("head"),
    QueryValue::Str("tail"),
    QueryValue::Str("before"),
    QueryValue::Str("after"),
    QueryValue::Str("replace"),
];

const DESTINATIONS: &[QueryValue] = &[
    QueryValue::Str("frame"),
    QueryValue::Str("on"),
    QueryValue::Str("off"),
    QueryValue::Str("set"),
    QueryValue::Str("end"),
    QueryValue::Str("idle"),
];

const TUIO_VERSIONS: &[QueryValue] = &[QueryValue::Int(1), QueryValue::Int(2)];

const WINDOWS: &[QueryValue] = &[QueryValue::Int(2), QueryValue::Int(4), QueryValue::Int(8), QueryValue::Int(16)];

// ─── Argument Lists ─────────────────────────────────────────────────

const NONE: &[QueryArgument] = &[];

const ENABLED: &[QueryArgument] = &[QueryArgument::new(Bool, Mode::RW, "enabled")];

const TEXT_R: &[QueryArgument] = &[QueryArgument::new(Text, Mode::R, "value")];

const NAME: &[QueryArgument] = &[QueryArgument::new(Text, Mode::RW, "device name").range(
    0.0,
    (NAME_LENGTH - 1) as f64,
    1.0,
)];

const SOCKET_ADDRESS: &[QueryArgument] = &[QueryArgument::new(Text, Mode::RW, "a.b.c.d:port or name.local:port")];

const SOCKET_MODE: &[QueryArgument] = &[QueryArgument::new(Text, Mode::RW, "framing").values(FRAMINGS)];

const POLL_RATE: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "poll rate in Hz").range(1.0, 10.0, 1.0)];

const COMM_MAC: &[QueryArgument] = &[QueryArgument::new(Text, Mode::RW, "xx:xx:xx:xx:xx:xx")];

const COMM_IP: &[QueryArgument] = &[
    QueryArgument::new(Text, Mode::RW, "a.b.c.d/n"),
    QueryArgument::new(Text, Mode::W, "gateway a.b.c.d").optional(),
];

const COMM_GATEWAY: &[QueryArgument] = &[QueryArgument::new(Text, Mode::RW, "a.b.c.d")];

const COMM_SUBNET: &[QueryArgument] = &[QueryArgument::new(Text, Mode::RW, "contiguous mask a.b.c.d")];

const HOST: &[QueryArgument] = &[QueryArgument::new(Text, Mode::W, "a.b.c.d[:port] or name.local[:port]")];

const RESOLVE: &[QueryArgument] = &[QueryArgument::new(Text, Mode::W, "name.local")];

const OUTPUT_OFFSET: &[QueryArgument] = &[QueryArgument::new(Timestamp, Mode::RW, "seconds")];

const SNTP_TAU: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "seconds between requests").range(1.0, 10.0, 1.0)];

const TUIO_VERSION: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "protocol version").values(TUIO_VERSIONS)];

const TUIO_LONG_HEADER: &[QueryArgument] = &[QueryArgument::new(Bool, Mode::RW, "long header")];

const INSTRUMENT: &[QueryArgument] = &[QueryArgument::new(Text, Mode::RW, "synth definition").range(
    0.0,
    (INSTRUMENT_LENGTH - 1) as f64,
    1.0,
)];

const NODE_OFFSET: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "first node id").range(0.0, 65535.0, 1.0)];

const NODE_MODULO: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "node id wrap").range(1.0, 65535.0, 1.0)];

const PREALLOC: &[QueryArgument] = &[QueryArgument::new(Bool, Mode::RW, "preallocate synths")];

const ADD_ACTION: &[QueryArgument] = &[QueryArgument::new(Text, Mode::RW, "node add action").values(ADD_ACTIONS)];

const NOTE_OFFSET: &[QueryArgument] = &[QueryArgument::new(Float, Mode::RW, "lowest note").range(0.0, 127.0, 0.1)];

const NOTE_RANGE: &[QueryArgument] = &[QueryArgument::new(Float, Mode::RW, "notes over sensor length").range(0.0, 127.0, 0.1)];

const EFFECT: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "pressure controller").range(0.0, 127.0, 1.0)];

const CUSTOM_APPEND: &[QueryArgument] = &[
    QueryArgument::new(Text, Mode::W, "destination").values(DESTINATIONS),
    QueryArgument::new(Text, Mode::W, "output path").range(0.0, (CUSTOM_PATH_LEN - 1) as f64, 1.0),
    QueryArgument::new(Text, Mode::W, "expression").range(0.0, (CUSTOM_EXPR_LEN - 1) as f64, 1.0),
];

const CUSTOM_REMOVE: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::W, "slot").range(
    0.0,
    (CUSTOM_MAX_EXPR - 1) as f64,
    1.0,
)];

const CUSTOM_ITEM_ARGS: &[QueryArgument] = &[
    QueryArgument::new(Text, Mode::R, "destination"),
    QueryArgument::new(Text, Mode::R, "output path"),
    QueryArgument::new(Text, Mode::R, "expression"),
];

const RATE: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "sample rate in Hz, 0 unthrottled").range(
    0.0,
    65535.0,
    1.0,
)];

const SAMPLES: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "window length").values(WINDOWS)];

const ORDER: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "interpolation order").range(0.0, 3.0, 1.0)];

const CURVE: &[QueryArgument] = &[
    QueryArgument::new(Float, Mode::RW, "a"),
    QueryArgument::new(Float, Mode::RW, "b"),
    QueryArgument::new(Float, Mode::RW, "c"),
];

const MID: &[QueryArgument] = &[QueryArgument::new(Float, Mode::W, "normalized midpoint value").range(0.0, 1.0, 0.01)];

const SLOT_OPTIONAL: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::W, "slot").optional()];

const SLOT: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::RW, "default slot").range(
    0.0,
    (CALIBRATION_SLOTS - 1) as f64,
    1.0,
)];

const DELAY: &[QueryArgument] = &[QueryArgument::new(Int32, Mode::W, "delay in seconds").optional()];

// ─── Sockets ────────────────────────────────────────────────────────

const CONFIG_ITEMS: &[QueryItem] = &[
    QueryItem::method("enabled", "Open or close the socket", "socket.enabled", ENABLED),
    QueryItem::method("address", "Remote endpoint", "socket.address", SOCKET_ADDRESS),
    QueryItem::method("mode", "Reply framing", "socket.mode", SOCKET_MODE),
    QueryItem::method("rate", "Poll rate", "config.rate", POLL_RATE),
    QueryItem::method("load", "Reload the stored configuration", "config.load", NONE),
    QueryItem::method("save", "Persist the configuration", "config.save", NONE),
];

const OUTPUT_ITEMS: &[QueryItem] = &[
    QueryItem::method("enabled", "Open or close the socket", "socket.enabled", ENABLED),
    QueryItem::method("address", "Remote endpoint", "socket.address", SOCKET_ADDRESS),
    QueryItem::method("mode", "Output framing", "socket.mode", SOCKET_MODE),
    QueryItem::method("offset", "Output timestamp offset", "output.offset", OUTPUT_OFFSET),
    QueryItem::method("reset", "Disable every output engine", "output.reset", NONE),
];

const SNTP_ITEMS: &[QueryItem] = &[
    QueryItem::method("enabled", "Open or close the socket", "socket.enabled", ENABLED),
    QueryItem::method("address", "Time server", "socket.address", SOCKET_ADDRESS),
    QueryItem::method("tau", "Request interval", "sntp.tau", SNTP_TAU),
];

const DEBUG_ITEMS: &[QueryItem] = &[
    QueryItem::method("enabled", "Open or close the socket", "socket.enabled", ENABLED),
    QueryItem::method("address", "Remote endpoint", "socket.address", SOCKET_ADDRESS),
    QueryItem::method("mode", "Debug framing", "socket.mode", SOCKET_MODE),
];

const MDNS_ITEMS: &[QueryItem] = &[QueryItem::method(
    "enabled",
    "Multicast DNS responder",
    "socket.enabled",
    ENABLED,
)];

const DHCPC_ITEMS: &[QueryItem] = &[QueryItem::method("enabled", "DHCP client", "socket.enabled", ENABLED)];

const HOST_ITEMS: &[QueryItem] = &[QueryItem::method(
    "address",
    "Point every service socket at one host",
    "host.address",
    HOST,
)];

const IPV4LL_ITEMS: &[QueryItem] = &[QueryItem::method(
    "enabled",
    "Claim an IPv4 link-local address",
    "ipv4ll.enabled",
    ENABLED,
)];

const COMM_ITEMS: &[QueryItem] = &[
    QueryItem::method("mac", "Hardware address", "comm.mac", COMM_MAC),
    QueryItem::method("ip", "Interface address and prefix", "comm.ip", COMM_IP),
    QueryItem::method("gateway", "Default gateway", "comm.gateway", COMM_GATEWAY),
    QueryItem::method("subnet", "Subnet mask", "comm.subnet", COMM_SUBNET),
    QueryItem::method("locally", "Locally administered MAC", "comm.locally", ENABLED),
    QueryItem::method("subnet_check", "Drop off-subnet packets", "comm.subnet_check", ENABLED),
];

// ─── Engines ────────────────────────────────────────────────────────

const TUIO_ITEMS: &[QueryItem] = &[
    QueryItem::method("enabled", "TUIO output", "engine.enabled", ENABLED),
    QueryItem::method("version", "TUIO protocol version", "tuio.version", TUIO_VERSION),
    QueryItem::method("long_header", "Long frame header", "tuio.long_header", TUIO_LONG_HEADER),
];

const DUMP_ITEMS: &[QueryItem] = &[QueryItem::method("enabled", "Raw sensor dump", "engine.enabled", ENABLED)];

const SCSYNTH_ITEMS: &[QueryItem] = &[
    QueryItem::method("enabled", "SuperCollider output", "engine.enabled", ENABLED),
    QueryItem::method("instrument", "Synth definition name", "scsynth.instrument", INSTRUMENT),
    QueryItem::method("offset", "First node id", "scsynth.offset", NODE_OFFSET),
    QueryItem::method("modulo", "Node id wrap-around", "scsynth.modulo", NODE_MODULO),
    QueryItem::method("prealloc", "Preallocate synth nodes", "scsynth.prealloc", PREALLOC),
    QueryItem::method("addaction", "Node add action", "scsynth.addaction", ADD_ACTION),
];

const OSCMIDI_ITEMS: &[QueryItem] = &[
    QueryItem::method("enabled", "OSC-MIDI output", "engine.enabled", ENABLED),
    QueryItem::method("offset", "Lowest note", "oscmidi.offset", NOTE_OFFSET),
    QueryItem::method("range", "Note range", "oscmidi.range", NOTE_RANGE),
    QueryItem::method("effect", "Pressure controller number", "oscmidi.effect", EFFECT),
];

const DUMMY_ITEMS: &[QueryItem] = &[QueryItem::method("enabled", "Plain contact output", "engine.enabled", ENABLED)];

static CUSTOM_ITEM: QueryItem = QueryItem::method("item", "Custom output item", "custom.item", CUSTOM_ITEM_ARGS);

const CUSTOM_ITEMS: &[QueryItem] = &[
    QueryItem::method("enabled", "Custom expression output", "engine.enabled", ENABLED),
    QueryItem::method("reset", "Free every item", "custom.reset", NONE),
    QueryItem::method("append", "Store an item in the first free slot", "custom.append", CUSTOM_APPEND),
    QueryItem::method("remove", "Free one slot", "custom.remove", CUSTOM_REMOVE),
    QueryItem::array("item", "Custom output items", CUSTOM_MAX_EXPR, &CUSTOM_ITEM),
];

// ─── Sampling & Calibration ─────────────────────────────────────────

const MOVINGAVERAGE_ITEMS: &[QueryItem] = &[
    QueryItem::method("enabled", "Smooth sensor values", "movingaverage.enabled", ENABLED),
    QueryItem::method("samples", "Window length", "movingaverage.samples", SAMPLES),
];

const INTERPOLATION_ITEMS: &[QueryItem] = &[QueryItem::method(
    "order",
    "Peak interpolation order",
    "interpolation.order",
    ORDER,
)];

const CALIBRATION_ITEMS: &[QueryItem] = &[
    QueryItem::method("start", "Start calibrating", "calibration.start", NONE),
    QueryItem::method("zero", "Fix the quiescent baselines", "calibration.zero", NONE),
    QueryItem::method("min", "Fix the contact thresholds", "calibration.min", NONE),
    QueryItem::method("mid", "Fit the response curves", "calibration.mid", MID),
    QueryItem::method("save", "Persist the range table", "calibration.save", SLOT_OPTIONAL),
    QueryItem::method("load", "Load a range table", "calibration.load", SLOT_OPTIONAL),
    QueryItem::method("print", "Report the range table", "calibration.print", NONE),
    QueryItem::method("slot", "Default slot", "calibration.slot", SLOT),
];

const RESET_ITEMS: &[QueryItem] = &[
    QueryItem::method("soft", "Restart", "reset.soft", DELAY),
    QueryItem::method("hard", "Restart with factory defaults", "reset.hard", DELAY),
    QueryItem::method("bootloader", "Restart into the bootloader", "reset.bootloader", DELAY),
];

// ─── Root ───────────────────────────────────────────────────────────

const ROOT_ITEMS: &[QueryItem] = &[
    QueryItem::method("version", "Firmware version", "version", TEXT_R),
    QueryItem::method("uid", "Unique device id", "uid", TEXT_R),
    QueryItem::method("name", "Device name", "name", NAME),
    QueryItem::node("comm", "Network interface", COMM_ITEMS),
    QueryItem::node("config", "Configuration socket", CONFIG_ITEMS),
    QueryItem::node("output", "Output socket", OUTPUT_ITEMS),
    QueryItem::node("sntp", "Time synchronization socket", SNTP_ITEMS),
    QueryItem::node("debug", "Debug socket", DEBUG_ITEMS),
    QueryItem::node("mdns", "Multicast DNS socket", MDNS_ITEMS),
    QueryItem::node("dhcpc", "DHCP client socket", DHCPC_ITEMS),
    QueryItem::node("host", "Service host", HOST_ITEMS),
    QueryItem::method("resolve", "Resolve a name without applying it", "resolve", RESOLVE),
    QueryItem::node("ipv4ll", "IPv4 link-local addressing", IPV4LL_ITEMS),
    QueryItem::node("tuio", "TUIO engine", TUIO_ITEMS),
    QueryItem::node("dump", "Dump engine", DUMP_ITEMS),
    QueryItem::node("scsynth", "SuperCollider engine", SCSYNTH_ITEMS),
    QueryItem::node("oscmidi", "OSC-MIDI engine", OSCMIDI_ITEMS),
    QueryItem::node("dummy", "Dummy engine", DUMMY_ITEMS),
    QueryItem::node("custom", "Custom expression engine", CUSTOM_ITEMS),
    QueryItem::method("rate", "Sample rate", "rate", RATE),
    QueryItem::node("movingaverage", "Moving average filter", MOVINGAVERAGE_ITEMS),
    QueryItem::node("interpolation", "Peak interpolation", INTERPOLATION_ITEMS),
    QueryItem::method("curve", "Default response curve", "curve", CURVE),
    QueryItem::node("calibration", "Sensor calibration", CALIBRATION_ITEMS),
    QueryItem::node("reset", "Restart the device", RESET_ITEMS),
];

/// Root of the namespace, mounted at `/chimaera`.
pub static ROOT: QueryItem = QueryItem::node("chimaera", "Chimaera multi-touch sensor", ROOT_ITEMS);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerRegistry;
    use crate::query::tree::QueryTree;
    use chimaera_common::consts::ROOT_PATH;

    #[test]
    fn every_method_has_a_handler() {
        let tree = QueryTree::build(&ROOT);
        let registry = HandlerRegistry::with_defaults();
        for (path, handler, _) in tree.methods() {
            assert!(registry.get(handler).is_some(), "{path} names unknown handler {handler}");
        }
    }

    #[test]
    fn every_handler_is_reachable() {
        let tree = QueryTree::build(&ROOT);
        let used: std::collections::HashSet<_> = tree.methods().map(|(_, h, _)| h.name()).collect();
        for name in HandlerRegistry::with_defaults().names() {
            assert!(used.contains(name), "handler {name} is not in the tree");
        }
    }

    #[test]
    fn mounted_at_root_path() {
        let tree = QueryTree::build(&ROOT);
        assert!(tree.get(ROOT_PATH).is_some());
        assert!(tree.get("/chimaera/comm/ip").is_some());
        assert!(tree.get("/chimaera/custom/item/7").is_some());
        assert!(tree.get("/chimaera/custom/item/8").is_none());
    }
}
