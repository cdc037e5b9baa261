//! Host name resolver.
//!
//! Each query runs the system resolver on a short-lived worker thread and
//! reports back over a channel. [`Resolver::poll`] is called from the event
//! loop; a query that has not answered within the timeout completes
//! without an address, and its late answer is dropped.

use chimaera_config::error::ResolveError;
use chimaera_config::resolver::{Resolution, Resolver};
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default time a query may take.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lookup function run on the worker thread.
pub type Lookup = fn(&str) -> Option<Ipv4Addr>;

/// First IPv4 address the system resolver returns for `hostname`.
pub fn system_lookup(hostname: &str) -> Option<Ipv4Addr> {
    (hostname, 0)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
}

/// Resolver running lookups on worker threads.
pub struct SystemResolver {
    lookup: Lookup,
    timeout: Duration,
    tx: Sender<Resolution>,
    rx: Receiver<Resolution>,
    deadlines: Vec<(String, Instant)>,
}

impl SystemResolver {
    /// Resolver using the system lookup and [`RESOLVE_TIMEOUT`].
    pub fn new() -> Self {
        Self::with_lookup(system_lookup, RESOLVE_TIMEOUT)
    }

    /// Resolver with a custom lookup and timeout.
    pub fn with_lookup(lookup: Lookup, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            lookup,
            timeout,
            tx,
            rx,
            deadlines: Vec::new(),
        }
    }

    /// Queries still waiting for an answer.
    pub fn in_flight(&self) -> usize {
        self.deadlines.len()
    }

    fn settle(&mut self, hostname: &str) -> bool {
        let before = self.deadlines.len();
        self.deadlines.retain(|(name, _)| name != hostname);
        self.deadlines.len() != before
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for SystemResolver {
    fn query(&mut self, hostname: &str) -> Result<(), ResolveError> {
        let name = hostname.to_string();
        let tx = self.tx.clone();
        let lookup = self.lookup;

        thread::Builder::new()
            .name(format!("resolve-{name}"))
            .spawn(move || {
                let address = lookup(&name);
                // the loop may have timed the query out already
                let _ = tx.send(Resolution { hostname: name, address });
            })
            .map_err(|e| ResolveError::QueryFailed(format!("{hostname}: {e}")))?;

        self.deadlines.push((hostname.to_string(), Instant::now() + self.timeout));
        debug!("Lookup of {} started", hostname);
        Ok(())
    }

    fn poll(&mut self) -> Option<Resolution> {
        while let Ok(resolution) = self.rx.try_recv() {
            if self.settle(&resolution.hostname) {
                return Some(resolution);
            }
            debug!("Late answer for {} dropped", resolution.hostname);
        }

        let now = Instant::now();
        let expired = self.deadlines.iter().position(|(_, deadline)| *deadline <= now)?;
        let (hostname, _) = self.deadlines.remove(expired);
        warn!("Lookup of {} timed out", hostname);
        Some(Resolution {
            hostname,
            address: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(hostname: &str) -> Option<Ipv4Addr> {
        (hostname == "synth.local").then_some(Ipv4Addr::new(10, 0, 0, 7))
    }

    fn stalled(_: &str) -> Option<Ipv4Addr> {
        thread::sleep(Duration::from_millis(300));
        Some(Ipv4Addr::LOCALHOST)
    }

    fn poll_within(resolver: &mut SystemResolver, limit: Duration) -> Option<Resolution> {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if let Some(resolution) = resolver.poll() {
                return Some(resolution);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn answer_is_delivered_once() {
        let mut resolver = SystemResolver::with_lookup(fixed, Duration::from_secs(5));
        resolver.query("synth.local").unwrap();

        let resolution = poll_within(&mut resolver, Duration::from_secs(2)).unwrap();
        assert_eq!(resolution.address, Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(resolver.in_flight(), 0);
        assert!(resolver.poll().is_none());
    }

    #[test]
    fn unknown_name_completes_without_address() {
        let mut resolver = SystemResolver::with_lookup(fixed, Duration::from_secs(5));
        resolver.query("nobody.local").unwrap();
        let resolution = poll_within(&mut resolver, Duration::from_secs(2)).unwrap();
        assert_eq!(resolution.hostname, "nobody.local");
        assert_eq!(resolution.address, None);
    }

    #[test]
    fn slow_lookup_times_out_and_late_answer_is_dropped() {
        let mut resolver = SystemResolver::with_lookup(stalled, Duration::from_millis(20));
        resolver.query("slow.local").unwrap();

        let resolution = poll_within(&mut resolver, Duration::from_secs(2)).unwrap();
        assert_eq!(resolution.address, None);

        thread::sleep(Duration::from_millis(400));
        assert!(resolver.poll().is_none());
    }

    #[test]
    fn literal_lookup_uses_system_resolver() {
        assert_eq!(system_lookup("127.0.0.1"), Some(Ipv4Addr::LOCALHOST));
    }
}
