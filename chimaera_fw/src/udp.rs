//! UDP network interface.
//!
//! Every enabled socket kind is one non-blocking [`UdpSocket`] bound to
//! `bind_address:local_port` and sending to the configured remote. The
//! host keeps its own interface address, so identity changes are recorded
//! and logged only. ARP probing needs raw sockets; every probed address is
//! reported free.
//!
//! Clones share their sockets: the [`Context`](chimaera_config::context::Context)
//! owns one handle for sending, the runner keeps another for receiving.

use chimaera_config::context::NetInterface;
use chimaera_config::error::NetError;
use chimaera_config::registry::{Comm, SocketConfig, SocketKind};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::rc::Rc;
use tracing::{debug, info};

#[derive(Debug)]
struct Bound {
    socket: UdpSocket,
    remote: SocketAddrV4,
}

#[derive(Debug)]
struct UdpState {
    bind: Ipv4Addr,
    comm: Option<Comm>,
    sockets: HashMap<SocketKind, Bound>,
}

/// Host UDP sockets behind the network port.
#[derive(Debug, Clone)]
pub struct UdpNet {
    state: Rc<RefCell<UdpState>>,
}

impl UdpNet {
    /// Interface binding every socket to `bind`.
    pub fn new(bind: Ipv4Addr) -> Self {
        Self {
            state: Rc::new(RefCell::new(UdpState {
                bind,
                comm: None,
                sockets: HashMap::new(),
            })),
        }
    }

    /// Receive one datagram on `kind` without blocking.
    ///
    /// Returns `Ok(None)` when nothing is queued or the socket is closed.
    pub fn recv(&self, kind: SocketKind, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, NetError> {
        let state = self.state.borrow();
        let Some(bound) = state.sockets.get(&kind) else {
            return Ok(None);
        };
        match bound.socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(NetError::Interface(format!("receive on {kind} failed: {e}"))),
        }
    }

    /// Local address of the socket of `kind`.
    pub fn local_addr(&self, kind: SocketKind) -> Option<SocketAddr> {
        let state = self.state.borrow();
        state.sockets.get(&kind).and_then(|b| b.socket.local_addr().ok())
    }

    /// Whether the socket of `kind` is open.
    pub fn is_open(&self, kind: SocketKind) -> bool {
        self.state.borrow().sockets.contains_key(&kind)
    }

    /// Last applied interface identity.
    pub fn identity(&self) -> Option<Comm> {
        self.state.borrow().comm
    }
}

fn open_error(kind: SocketKind, e: std::io::Error) -> NetError {
    NetError::Open {
        kind: kind.as_str(),
        reason: e.to_string(),
    }
}

impl NetInterface for UdpNet {
    fn configure(&mut self, comm: &Comm) -> Result<(), NetError> {
        self.state.borrow_mut().comm = Some(*comm);
        info!("Interface identity {} / {} via {}", comm.ip, comm.subnet, comm.gateway);
        Ok(())
    }

    fn open(&mut self, kind: SocketKind, config: &SocketConfig) -> Result<(), NetError> {
        let mut state = self.state.borrow_mut();
        let remote = config.remote();

        // Same local port: only the remote moved.
        if let Some(bound) = state.sockets.get_mut(&kind) {
            let port = bound.socket.local_addr().map(|a| a.port()).unwrap_or_default();
            if config.local_port() == 0 || port == config.local_port() {
                bound.remote = remote;
                debug!("Socket {} now sends to {}", kind, remote);
                return Ok(());
            }
        }

        let socket = UdpSocket::bind(SocketAddrV4::new(state.bind, config.local_port()))
            .map_err(|e| open_error(kind, e))?;
        socket.set_nonblocking(true).map_err(|e| open_error(kind, e))?;
        socket.set_broadcast(true).map_err(|e| open_error(kind, e))?;

        info!(
            "Socket {} bound to {}, sending to {}",
            kind,
            socket.local_addr().map_err(|e| open_error(kind, e))?,
            remote
        );
        state.sockets.insert(kind, Bound { socket, remote });
        Ok(())
    }

    fn close(&mut self, kind: SocketKind) {
        if self.state.borrow_mut().sockets.remove(&kind).is_some() {
            debug!("Socket {} closed", kind);
        }
    }

    fn send(&mut self, kind: SocketKind, data: &[u8]) -> Result<(), NetError> {
        let state = self.state.borrow();
        let bound = state.sockets.get(&kind).ok_or(NetError::NotOpen(kind.as_str()))?;
        bound
            .socket
            .send_to(data, bound.remote)
            .map_err(|e| NetError::Send(e.to_string()))?;
        Ok(())
    }

    fn arp_probe(&mut self, ip: Ipv4Addr) -> Result<bool, NetError> {
        debug!("ARP probe of {} skipped on host", ip);
        Ok(false)
    }
}
