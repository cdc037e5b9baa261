//! Runtime context handed to every handler.
//!
//! Owns the registry, the calibration table, the pending resolutions and
//! the injected hardware ports. All mutation of device state goes through
//! a `&mut Context`; there is no global state.

use bitflags::bitflags;
use chimaera_common::consts::REPLY_BUFFER_SIZE;
use chimaera_common::framing::frame_message;
use chimaera_common::net::{broadcast, network};
use chimaera_common::osc::OscMessage;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::calibration::Calibration;
use crate::error::{ConfigError, NetError, StoreError};
use crate::registry::{
    self, Comm, Config, DST_PORT, LoadOutcome, SOCKET_KINDS, SocketConfig, SocketKind,
};
use crate::reply::{self, Outbox};
use crate::resolver::{PendingResolutions, Resolver};
use crate::store::Eeprom;

// ─── Ports ──────────────────────────────────────────────────────────

/// Network interface driver.
pub trait NetInterface {
    /// Apply the interface identity.
    fn configure(&mut self, comm: &Comm) -> Result<(), NetError>;

    /// (Re)open the socket of `kind`.
    fn open(&mut self, kind: SocketKind, socket: &SocketConfig) -> Result<(), NetError>;

    /// Close the socket of `kind`; closing a closed socket is a no-op.
    fn close(&mut self, kind: SocketKind);

    /// Send one datagram to the remote of `kind`.
    fn send(&mut self, kind: SocketKind, data: &[u8]) -> Result<(), NetError>;

    /// Whether another host answers ARP for `ip`.
    fn arp_probe(&mut self, ip: Ipv4Addr) -> Result<bool, NetError>;
}

/// Restart flavours, stored in the battery-backed register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Plain restart.
    Soft = 1,
    /// Restart restoring and persisting the compiled-in defaults.
    Hard = 2,
    /// Restart into the bootloader.
    Bootloader = 3,
}

impl ResetMode {
    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Hard => "hard",
            Self::Bootloader => "bootloader",
        }
    }

    /// Mode from its register value.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Soft),
            2 => Some(Self::Hard),
            3 => Some(Self::Bootloader),
            _ => None,
        }
    }
}

/// System services outside the network stack.
pub trait SystemControl {
    /// 96-bit unique device id, hex encoded.
    fn uid(&self) -> String;

    /// Store the mode for the next boot.
    fn write_reset_mode(&mut self, mode: ResetMode);

    /// Read and clear the stored mode.
    fn take_reset_mode(&mut self) -> Option<ResetMode>;
}

/// Restart requested by a handler, executed by the runner after the reply
/// is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetRequest {
    pub mode: ResetMode,
    pub delay: Duration,
}

bitflags! {
    /// Active output engines.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Engines: u8 {
        const TUIO = 1 << 0;
        const DUMP = 1 << 1;
        const SCSYNTH = 1 << 2;
        const OSCMIDI = 1 << 3;
        const CUSTOM = 1 << 4;
        const DUMMY = 1 << 5;
    }
}

impl Engines {
    /// Engines enabled in `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut engines = Self::empty();
        engines.set(Self::TUIO, config.tuio.enabled);
        engines.set(Self::DUMP, config.dump.enabled);
        engines.set(Self::SCSYNTH, config.scsynth.enabled);
        engines.set(Self::OSCMIDI, config.oscmidi.enabled);
        engines.set(Self::CUSTOM, config.custom.enabled);
        engines.set(Self::DUMMY, config.dummy.enabled);
        engines
    }
}

// ─── Enable Hooks ───────────────────────────────────────────────────

type EnableHook = fn(&mut Context, SocketKind, bool) -> Result<(), NetError>;

/// Per-kind socket enable hooks, indexed by [`SocketKind::index`].
/// Kinds without a hook only store their flag.
const ENABLE_HOOKS: [Option<EnableHook>; SOCKET_KINDS] = [
    Some(service_hook),
    Some(service_hook),
    Some(service_hook),
    Some(service_hook),
    Some(mdns_hook),
    None,
];

fn service_hook(ctx: &mut Context, kind: SocketKind, enabled: bool) -> Result<(), NetError> {
    if enabled {
        let socket = *ctx.config.socket(kind);
        ctx.net.open(kind, &socket)
    } else {
        ctx.net.close(kind);
        Ok(())
    }
}

fn mdns_hook(ctx: &mut Context, kind: SocketKind, enabled: bool) -> Result<(), NetError> {
    // multicast membership follows the interface identity
    ctx.net.close(kind);
    if enabled {
        let socket = *ctx.config.socket(kind);
        ctx.net.open(kind, &socket)?;
    }
    Ok(())
}

/// Maximum ARP probes of one link-local claim.
pub const IPV4LL_MAX_PROBES: usize = 10;

const IPV4LL_NETWORK: u32 = 0xa9fe_0000;
const IPV4LL_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 0, 0);

// ─── Context ────────────────────────────────────────────────────────

/// Device state and ports.
pub struct Context {
    pub config: Config,
    pub calibration: Calibration,
    pub engines: Engines,
    pub pending: PendingResolutions,
    pub reset: Option<ResetRequest>,
    pub(crate) eeprom: Box<dyn Eeprom>,
    pub(crate) net: Box<dyn NetInterface>,
    pub(crate) resolver: Box<dyn Resolver>,
    pub(crate) system: Box<dyn SystemControl>,
}

impl Context {
    /// Context with compiled-in defaults; call [`Context::boot`] to load
    /// the stored state.
    pub fn new(
        eeprom: Box<dyn Eeprom>,
        net: Box<dyn NetInterface>,
        resolver: Box<dyn Resolver>,
        system: Box<dyn SystemControl>,
        max_pending: usize,
    ) -> Self {
        let config = Config::default();
        Self {
            engines: Engines::from_config(&config),
            config,
            calibration: Calibration::new(),
            pending: PendingResolutions::new(max_pending),
            reset: None,
            eeprom,
            net,
            resolver,
            system,
        }
    }

    /// Load the stored state and bring up the network.
    ///
    /// A pending hard reset restores and persists the defaults. A missing
    /// calibration slot and failing socket hooks are logged, not fatal.
    pub fn boot(&mut self) -> Result<LoadOutcome, StoreError> {
        let outcome = match self.system.take_reset_mode() {
            Some(ResetMode::Hard) => {
                info!("Hard reset requested, restoring factory defaults");
                self.config = Config::default();
                registry::save_config(&self.config, self.eeprom.as_mut())?;
                LoadOutcome::DefaultsRestored
            }
            mode => {
                if let Some(mode) = mode {
                    debug!("Booting after {} reset", mode.as_str());
                }
                let (config, outcome) = registry::load_config(self.eeprom.as_mut())?;
                self.config = config;
                outcome
            }
        };

        let slot = self.config.calibration;
        if let Err(e) = self.calibration.load(self.eeprom.as_mut(), slot) {
            warn!("Calibration slot {} not loaded: {}", slot, e);
        }

        self.apply_network();
        if self.config.ipv4ll {
            if let Err(e) = self.claim_link_local() {
                warn!("IPv4 link-local claim failed: {}", e);
            }
        }
        self.engines = Engines::from_config(&self.config);

        info!(
            "Booted '{}' at {} ({:?})",
            self.config.name, self.config.comm.ip, outcome
        );
        Ok(outcome)
    }

    /// Configure the interface and run the enable hook of every enabled
    /// socket.
    pub fn apply_network(&mut self) {
        if let Err(e) = self.net.configure(&self.config.comm) {
            error!("Interface configuration failed: {}", e);
        }
        for kind in SocketKind::ALL {
            if self.config.socket(kind).enabled {
                if let Err(e) = self.run_hook(kind, true) {
                    warn!("Socket {} not opened: {}", kind, e);
                }
            }
        }
    }

    fn run_hook(&mut self, kind: SocketKind, enabled: bool) -> Result<(), NetError> {
        match ENABLE_HOOKS[kind.index()] {
            Some(hook) => hook(self, kind, enabled),
            None => Ok(()),
        }
    }

    /// Enable or disable the socket of `kind`; the flag only changes when
    /// the hook succeeds.
    pub fn set_socket_enabled(&mut self, kind: SocketKind, enabled: bool) -> Result<(), ConfigError> {
        self.run_hook(kind, enabled)?;
        self.config.socket_mut(kind).enabled = enabled;
        debug!("Socket {} {}", kind, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Re-run the hook of an enabled socket after its descriptor changed.
    pub fn rebind(&mut self, kind: SocketKind) -> Result<(), ConfigError> {
        if self.config.socket(kind).enabled {
            self.run_hook(kind, true)?;
        }
        Ok(())
    }

    /// Point the remote of `kind` at `ip`, and at remote `port` when given.
    pub fn set_remote(&mut self, kind: SocketKind, ip: Ipv4Addr, port: Option<u16>) -> Result<(), ConfigError> {
        self.update_socket(kind, |socket| {
            socket.ip = ip;
            if let Some(port) = port {
                socket.ports[DST_PORT] = port;
            }
        })
    }

    /// Change the descriptor of `kind` and re-bind it. The registry keeps
    /// the previous descriptor when the socket cannot be re-opened.
    pub fn update_socket(
        &mut self,
        kind: SocketKind,
        update: impl FnOnce(&mut SocketConfig),
    ) -> Result<(), ConfigError> {
        let previous = *self.config.socket(kind);
        update(self.config.socket_mut(kind));
        if let Err(e) = self.rebind(kind) {
            *self.config.socket_mut(kind) = previous;
            if let Err(e) = self.rebind(kind) {
                warn!("Socket {} not restored: {}", kind, e);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Apply an interface identity; the registry only changes when the
    /// interface accepts it.
    pub fn set_comm(&mut self, comm: Comm) -> Result<(), ConfigError> {
        self.net.configure(&comm)?;
        self.config.comm = comm;
        Ok(())
    }

    /// Apply a new interface address: service sockets are re-pointed to
    /// the subnet broadcast and re-bound if enabled, mDNS is re-bound.
    ///
    /// On failure the previous identity and socket remotes are restored.
    pub fn set_identity(&mut self, ip: Ipv4Addr, subnet: Ipv4Addr, gateway: Ipv4Addr) -> Result<(), ConfigError> {
        let previous_comm = self.config.comm;
        let previous_sockets = self.config.sockets;

        if let Err(e) = self.apply_identity(ip, subnet, gateway) {
            self.config.comm = previous_comm;
            self.config.sockets = previous_sockets;
            self.apply_network();
            return Err(e);
        }
        info!("Interface address {} / {}", ip, subnet);
        Ok(())
    }

    fn apply_identity(&mut self, ip: Ipv4Addr, subnet: Ipv4Addr, gateway: Ipv4Addr) -> Result<(), ConfigError> {
        self.set_comm(Comm {
            ip,
            subnet,
            gateway,
            ..self.config.comm
        })?;

        let brd = broadcast(ip, subnet);
        for kind in SocketKind::SERVICES {
            self.config.socket_mut(kind).ip = brd;
            self.rebind(kind)?;
        }
        self.rebind(SocketKind::Mdns)
    }

    /// Claim a free `169.254/16` address by ARP probing candidates seeded
    /// from the MAC.
    ///
    /// # Errors
    /// `ConfigError::LinkLocalExhausted` if every probed candidate is taken.
    pub fn claim_link_local(&mut self) -> Result<Ipv4Addr, ConfigError> {
        let mac = self.config.comm.mac;
        let mut seed = u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]]);

        for _ in 0..IPV4LL_MAX_PROBES {
            // 169.254.1.0 ..= 169.254.254.255
            let host = 0x0100 + seed % 0xfe00;
            let candidate = Ipv4Addr::from(IPV4LL_NETWORK | host);
            if self.net.arp_probe(candidate)? {
                debug!("Link-local candidate {} in use", candidate);
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                continue;
            }
            self.set_identity(candidate, IPV4LL_MASK, network(candidate, IPV4LL_MASK))?;
            info!("Claimed link-local address {}", candidate);
            return Ok(candidate);
        }
        Err(ConfigError::LinkLocalExhausted(IPV4LL_MAX_PROBES))
    }

    /// Persist the registry.
    pub fn save_config(&mut self) -> Result<(), StoreError> {
        registry::save_config(&self.config, self.eeprom.as_mut())
    }

    /// Reload the registry from EEPROM and re-apply it.
    pub fn load_config(&mut self) -> Result<LoadOutcome, StoreError> {
        let (config, outcome) = registry::load_config(self.eeprom.as_mut())?;
        self.config = config;
        self.apply_network();
        self.engines = Engines::from_config(&self.config);
        Ok(outcome)
    }

    /// Poll the resolver port.
    pub fn poll_resolver(&mut self) -> Option<crate::resolver::Resolution> {
        self.resolver.poll()
    }

    /// Device uid from the system port.
    pub fn uid(&self) -> String {
        self.system.uid()
    }

    /// Frame and send queued replies on the config socket. A reply that
    /// does not fit the reply buffer is replaced by a failure notice.
    pub fn flush(&mut self, outbox: &mut Outbox) -> usize {
        let framing = self.config.socket(SocketKind::Config).framing;
        let mut buf = [0u8; REPLY_BUFFER_SIZE];
        let mut sent = 0;

        for msg in outbox.drain() {
            let len = match frame_message(framing, &msg, &mut buf) {
                Ok(len) => len,
                Err(e) => {
                    warn!("Reply to {} dropped: {}", msg.path, e);
                    let notice = reply::oversized_notice(&msg, &e);
                    match frame_message(framing, &notice, &mut buf) {
                        Ok(len) => len,
                        Err(e) => {
                            error!("Failure notice not framed: {}", e);
                            continue;
                        }
                    }
                }
            };
            match self.net.send(SocketKind::Config, &buf[..len]) {
                Ok(()) => sent += 1,
                Err(e) => debug!("Reply not sent: {}", e),
            }
        }
        sent
    }

    /// Send engine output on the output socket with its framing.
    pub fn send_output(&mut self, messages: &[OscMessage]) -> Result<(), NetError> {
        let socket = *self.config.socket(SocketKind::Output);
        if !socket.enabled {
            return Ok(());
        }
        let mut buf = [0u8; REPLY_BUFFER_SIZE];
        for msg in messages {
            let len = frame_message(socket.framing, msg, &mut buf)
                .map_err(|e| NetError::Send(e.to_string()))?;
            self.net.send(SocketKind::Output, &buf[..len])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{QueuedResolver, SimNet, SimSystem};
    use crate::store::MemoryEeprom;
    use chimaera_common::framing::Framing;
    use chimaera_common::osc::OscArg;

    fn context_with(net: SimNet, system: SimSystem, eeprom: MemoryEeprom) -> Context {
        Context::new(
            Box::new(eeprom),
            Box::new(net),
            Box::new(QueuedResolver::new()),
            Box::new(system),
            1,
        )
    }

    #[test]
    fn boot_on_blank_device_persists_defaults_and_opens_sockets() {
        let net = SimNet::new();
        let mut ctx = context_with(net.clone(), SimSystem::new(), MemoryEeprom::default());
        assert_eq!(ctx.boot().unwrap(), LoadOutcome::DefaultsRestored);
        assert!(net.is_open(SocketKind::Config));
        assert!(net.is_open(SocketKind::Mdns));
        assert!(!net.is_open(SocketKind::Dhcpc));
    }

    #[test]
    fn hard_reset_flag_restores_defaults() {
        let mut eeprom = MemoryEeprom::default();
        let mut config = Config::default();
        config.set_name("custom").unwrap();
        registry::save_config(&config, &mut eeprom).unwrap();

        let system = SimSystem::new();
        let mut sys = system.clone();
        sys.write_reset_mode(ResetMode::Hard);

        let mut ctx = context_with(SimNet::new(), system.clone(), eeprom);
        assert_eq!(ctx.boot().unwrap(), LoadOutcome::DefaultsRestored);
        assert_eq!(ctx.config.name.as_str(), "chimaera");
        assert_eq!(system.clone().take_reset_mode(), None);
    }

    #[test]
    fn soft_reset_keeps_stored_config() {
        let mut eeprom = MemoryEeprom::default();
        let mut config = Config::default();
        config.set_name("kept").unwrap();
        registry::save_config(&config, &mut eeprom).unwrap();

        let mut system = SimSystem::new();
        system.write_reset_mode(ResetMode::Soft);
        let mut ctx = context_with(SimNet::new(), system, eeprom);
        assert_eq!(ctx.boot().unwrap(), LoadOutcome::Loaded);
        assert_eq!(ctx.config.name.as_str(), "kept");
    }

    #[test]
    fn dhcpc_has_no_hook() {
        let net = SimNet::new();
        let mut ctx = context_with(net.clone(), SimSystem::new(), MemoryEeprom::default());
        ctx.set_socket_enabled(SocketKind::Dhcpc, true).unwrap();
        assert!(ctx.config.socket(SocketKind::Dhcpc).enabled);
        assert!(!net.is_open(SocketKind::Dhcpc));
    }

    #[test]
    fn failing_hook_leaves_flag() {
        let net = SimNet::new();
        net.fail_open(SocketKind::Debug);
        let mut ctx = context_with(net, SimSystem::new(), MemoryEeprom::default());
        ctx.config.socket_mut(SocketKind::Debug).enabled = false;
        assert!(matches!(
            ctx.set_socket_enabled(SocketKind::Debug, true),
            Err(ConfigError::Net(NetError::Open { .. }))
        ));
        assert!(!ctx.config.socket(SocketKind::Debug).enabled);
    }

    #[test]
    fn link_local_claim_skips_taken_addresses() {
        let net = SimNet::new();
        let mut ctx = context_with(net.clone(), SimSystem::new(), MemoryEeprom::default());
        net.set_arp_taken(2);

        let ip = ctx.claim_link_local().unwrap();
        assert_eq!(ip.octets()[..2], [169, 254]);
        assert!((1..=254).contains(&ip.octets()[2]));
        assert_eq!(net.probes().len(), 3);
        assert_eq!(ctx.config.comm.subnet, IPV4LL_MASK);
        assert_eq!(
            ctx.config.socket(SocketKind::Output).ip,
            Ipv4Addr::new(169, 254, 255, 255)
        );
    }

    #[test]
    fn link_local_claim_gives_up() {
        let net = SimNet::new();
        net.set_arp_taken(usize::MAX);
        let mut ctx = context_with(net, SimSystem::new(), MemoryEeprom::default());
        let before = ctx.config.comm;
        assert_eq!(
            ctx.claim_link_local(),
            Err(ConfigError::LinkLocalExhausted(IPV4LL_MAX_PROBES))
        );
        assert_eq!(ctx.config.comm, before);
    }

    #[test]
    fn identity_keeps_disabled_sockets_closed() {
        let net = SimNet::new();
        let mut ctx = context_with(net.clone(), SimSystem::new(), MemoryEeprom::default());
        ctx.apply_network();
        ctx.set_socket_enabled(SocketKind::Debug, false).unwrap();

        ctx.set_identity(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 0, 0, 0), Ipv4Addr::new(10, 0, 0, 1))
            .unwrap();

        let debug = ctx.config.socket(SocketKind::Debug);
        assert!(!debug.enabled);
        assert_eq!(debug.ip, Ipv4Addr::new(10, 255, 255, 255));
        assert!(!net.is_open(SocketKind::Debug));
        assert_eq!(
            net.opened_with(SocketKind::Output).map(|s| s.ip),
            Some(Ipv4Addr::new(10, 255, 255, 255))
        );
    }

    #[test]
    fn failed_identity_is_rolled_back() {
        let net = SimNet::new();
        let mut ctx = context_with(net.clone(), SimSystem::new(), MemoryEeprom::default());
        ctx.apply_network();
        let before = ctx.config.clone();
        net.fail_open(SocketKind::Sntp);

        assert!(matches!(
            ctx.set_identity(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 0, 0, 0), Ipv4Addr::new(10, 0, 0, 1)),
            Err(ConfigError::Net(NetError::Open { .. }))
        ));
        assert_eq!(ctx.config, before);
        assert_eq!(
            net.opened_with(SocketKind::Output).map(|s| s.ip),
            Some(before.socket(SocketKind::Output).ip)
        );
    }

    #[test]
    fn failed_rebind_keeps_descriptor() {
        let net = SimNet::new();
        let mut ctx = context_with(net.clone(), SimSystem::new(), MemoryEeprom::default());
        ctx.apply_network();
        let before = *ctx.config.socket(SocketKind::Output);
        net.fail_open(SocketKind::Output);

        assert!(ctx.set_remote(SocketKind::Output, Ipv4Addr::new(10, 9, 9, 9), Some(9000)).is_err());
        assert!(ctx.update_socket(SocketKind::Output, |s| s.framing = Framing::Slip).is_err());
        assert_eq!(*ctx.config.socket(SocketKind::Output), before);
    }

    #[test]
    fn flush_frames_with_config_socket_framing() {
        let net = SimNet::new();
        let mut ctx = context_with(net.clone(), SimSystem::new(), MemoryEeprom::default());
        ctx.apply_network();
        ctx.config.socket_mut(SocketKind::Config).framing = Framing::Slip;

        let mut outbox = Outbox::new();
        outbox.success(1, "/chimaera/name", vec![OscArg::string("chimaera")]);
        assert_eq!(ctx.flush(&mut outbox), 1);

        let sent = net.sent(SocketKind::Config);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].first(), Some(&0xc0));
        assert_eq!(sent[0].last(), Some(&0xc0));
    }

    #[test]
    fn oversized_reply_becomes_notice() {
        let net = SimNet::new();
        let mut ctx = context_with(net.clone(), SimSystem::new(), MemoryEeprom::default());
        ctx.apply_network();

        let mut outbox = Outbox::new();
        outbox.success(9, "/chimaera/big", vec![OscArg::Blob(vec![0; REPLY_BUFFER_SIZE])]);
        assert_eq!(ctx.flush(&mut outbox), 1);

        let sent = net.sent(SocketKind::Config);
        let msg = OscMessage::decode(&sent[0]).unwrap();
        assert_eq!(msg.path, "/fail");
        assert_eq!(msg.args[0], OscArg::Int(9));
        assert_eq!(msg.args[1], OscArg::string("/chimaera/big"));
    }

    #[test]
    fn engines_follow_config() {
        let mut config = Config::default();
        config.custom.enabled = true;
        config.dummy.enabled = true;
        assert_eq!(Engines::from_config(&config), Engines::CUSTOM | Engines::DUMMY);
    }
}
