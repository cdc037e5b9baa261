//! Simulated ports.
//!
//! In-memory implementations of the network, resolver and system ports.
//! Clones share their state, so a test keeps one handle for inspection
//! while the [`Context`](crate::context::Context) owns another.

use chimaera_common::osc::OscMessage;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;

use crate::context::{Context, NetInterface, ResetMode, SystemControl};
use crate::error::{NetError, ResolveError};
use crate::registry::{Comm, SocketConfig, SocketKind};
use crate::resolver::{Resolution, Resolver};
use crate::store::MemoryEeprom;

// ─── Network ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct NetState {
    comm: Option<Comm>,
    open: HashMap<SocketKind, SocketConfig>,
    failing: HashSet<SocketKind>,
    sent: HashMap<SocketKind, Vec<Vec<u8>>>,
    arp_taken: usize,
    probes: Vec<Ipv4Addr>,
}

/// Network interface recording everything it is asked to do.
#[derive(Debug, Clone, Default)]
pub struct SimNet {
    state: Rc<RefCell<NetState>>,
}

impl SimNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the socket of `kind` is open.
    pub fn is_open(&self, kind: SocketKind) -> bool {
        self.state.borrow().open.contains_key(&kind)
    }

    /// Descriptor the socket of `kind` was last opened with.
    pub fn opened_with(&self, kind: SocketKind) -> Option<SocketConfig> {
        self.state.borrow().open.get(&kind).copied()
    }

    /// Make every open of `kind` fail.
    pub fn fail_open(&self, kind: SocketKind) {
        self.state.borrow_mut().failing.insert(kind);
    }

    /// Answer the next `n` ARP probes as taken.
    pub fn set_arp_taken(&self, n: usize) {
        self.state.borrow_mut().arp_taken = n;
    }

    /// Addresses probed so far.
    pub fn probes(&self) -> Vec<Ipv4Addr> {
        self.state.borrow().probes.clone()
    }

    /// Last applied interface identity.
    pub fn configured(&self) -> Option<Comm> {
        self.state.borrow().comm
    }

    /// Raw datagrams sent on `kind`.
    pub fn sent(&self, kind: SocketKind) -> Vec<Vec<u8>> {
        self.state.borrow().sent.get(&kind).cloned().unwrap_or_default()
    }

    /// Datagrams sent on `kind`, decoded as plain OSC messages.
    pub fn messages(&self, kind: SocketKind) -> Vec<OscMessage> {
        self.sent(kind)
            .iter()
            .filter_map(|bytes| OscMessage::decode(bytes).ok())
            .collect()
    }

    /// Forget sent datagrams.
    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }
}

impl NetInterface for SimNet {
    fn configure(&mut self, comm: &Comm) -> Result<(), NetError> {
        self.state.borrow_mut().comm = Some(*comm);
        Ok(())
    }

    fn open(&mut self, kind: SocketKind, socket: &SocketConfig) -> Result<(), NetError> {
        let mut state = self.state.borrow_mut();
        if state.failing.contains(&kind) {
            return Err(NetError::Open {
                kind: kind.as_str(),
                reason: "simulated failure".into(),
            });
        }
        state.open.insert(kind, *socket);
        Ok(())
    }

    fn close(&mut self, kind: SocketKind) {
        self.state.borrow_mut().open.remove(&kind);
    }

    fn send(&mut self, kind: SocketKind, data: &[u8]) -> Result<(), NetError> {
        let mut state = self.state.borrow_mut();
        if !state.open.contains_key(&kind) {
            return Err(NetError::NotOpen(kind.as_str()));
        }
        state.sent.entry(kind).or_default().push(data.to_vec());
        Ok(())
    }

    fn arp_probe(&mut self, ip: Ipv4Addr) -> Result<bool, NetError> {
        let mut state = self.state.borrow_mut();
        state.probes.push(ip);
        if state.arp_taken > 0 {
            state.arp_taken -= 1;
            return Ok(true);
        }
        Ok(false)
    }
}

// ─── Resolver ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ResolverState {
    queries: Vec<String>,
    completions: VecDeque<Resolution>,
    refuse: bool,
}

/// Resolver whose answers are queued by hand.
#[derive(Debug, Clone, Default)]
pub struct QueuedResolver {
    state: Rc<RefCell<ResolverState>>,
}

impl QueuedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hostnames queried so far.
    pub fn queries(&self) -> Vec<String> {
        self.state.borrow().queries.clone()
    }

    /// Queue the completion of `hostname`.
    pub fn complete(&self, hostname: &str, address: Option<Ipv4Addr>) {
        self.state.borrow_mut().completions.push_back(Resolution {
            hostname: hostname.to_string(),
            address,
        });
    }

    /// Refuse every further query.
    pub fn refuse(&self) {
        self.state.borrow_mut().refuse = true;
    }
}

impl Resolver for QueuedResolver {
    fn query(&mut self, hostname: &str) -> Result<(), ResolveError> {
        let mut state = self.state.borrow_mut();
        if state.refuse {
            return Err(ResolveError::QueryFailed(hostname.to_string()));
        }
        state.queries.push(hostname.to_string());
        Ok(())
    }

    fn poll(&mut self) -> Option<Resolution> {
        self.state.borrow_mut().completions.pop_front()
    }
}

// ─── System ─────────────────────────────────────────────────────────

/// System port with a RAM backup register.
#[derive(Debug, Clone, Default)]
pub struct SimSystem {
    mode: Rc<RefCell<Option<ResetMode>>>,
}

impl SimSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode currently stored in the backup register.
    pub fn stored_mode(&self) -> Option<ResetMode> {
        *self.mode.borrow()
    }
}

impl SystemControl for SimSystem {
    fn uid(&self) -> String {
        "0123456789abcdef01234567".to_string()
    }

    fn write_reset_mode(&mut self, mode: ResetMode) {
        *self.mode.borrow_mut() = Some(mode);
    }

    fn take_reset_mode(&mut self) -> Option<ResetMode> {
        self.mode.borrow_mut().take()
    }
}

// ─── Wiring ─────────────────────────────────────────────────────────

/// Inspection handles of a simulated device.
#[derive(Debug, Clone, Default)]
pub struct SimPorts {
    pub net: SimNet,
    pub resolver: QueuedResolver,
    pub system: SimSystem,
}

impl SimPorts {
    /// Context wired to these ports and a blank in-memory EEPROM.
    pub fn context(&self, max_pending: usize) -> Context {
        Context::new(
            Box::new(MemoryEeprom::default()),
            Box::new(self.net.clone()),
            Box::new(self.resolver.clone()),
            Box::new(self.system.clone()),
            max_pending,
        )
    }
}

/// Context on simulated ports with the default network applied.
pub fn sim_context() -> (Context, SimPorts) {
    let ports = SimPorts::default();
    let mut ctx = ports.context(1);
    ctx.apply_network();
    (ctx, ports)
}
