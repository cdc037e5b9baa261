//! Host event loop.
//!
//! The `Runner` owns the device [`Context`] and drives it single-threaded:
//!
//! ```text
//! loop {
//!     config socket ──▶ deframe ──▶ Dispatcher ──▶ flush replies
//!     resolver      ──▶ Dispatcher::poll ──▶ flush replies
//!     sensor frame  ──▶ Pipeline ──▶ output socket      (at `rate`)
//!     reset due?    ──▶ return Exit::Reset
//!     sleep(poll_interval)
//! }
//! ```

use chimaera_common::config::HostConfig;
use chimaera_common::consts::{REPLY_BUFFER_SIZE, SENSOR_N};
use chimaera_common::framing::{FrameError, Framing, SlipDecoder, StreamDecoder};
use chimaera_common::osc::{OscMessage, seconds_to_timestamp};
use chimaera_config::context::{Context, ResetMode};
use chimaera_config::dispatch::Dispatcher;
use chimaera_config::pipeline::Pipeline;
use chimaera_config::registry::{LoadOutcome, SocketKind};
use chimaera_config::reply::Outbox;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::eeprom::FileEeprom;
use crate::error::RunnerError;
use crate::resolver::SystemResolver;
use crate::sensors::{PeakMapper, SimulatedSensors};
use crate::system::HostSystem;
use crate::udp::UdpNet;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: f64 = 2_208_988_800.0;

/// Why [`Runner::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Shutdown requested through the running flag.
    Stopped,
    /// A reset call came due; the mode is already in the reset register.
    Reset(ResetMode),
}

/// Event loop counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    /// Config packets dispatched.
    pub packets: u64,
    /// Replies sent on the config socket.
    pub replies: u64,
    /// Sensor frames run through the pipeline.
    pub frames: u64,
}

/// Reassembles calls from the config socket according to its framing.
#[derive(Debug)]
enum Deframer {
    Datagram,
    Stream(Box<StreamDecoder<REPLY_BUFFER_SIZE>>),
    Slip(Box<SlipDecoder<REPLY_BUFFER_SIZE>>),
}

impl Deframer {
    fn for_framing(framing: Framing) -> Self {
        match framing {
            Framing::Udp => Self::Datagram,
            Framing::Tcp => Self::Stream(Box::default()),
            Framing::Slip => Self::Slip(Box::default()),
        }
    }

    fn framing(&self) -> Framing {
        match self {
            Self::Datagram => Framing::Udp,
            Self::Stream(_) => Framing::Tcp,
            Self::Slip(_) => Framing::Slip,
        }
    }

    /// Complete packets contained in `data`.
    fn feed(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        let mut packets = Vec::new();
        match self {
            Self::Datagram => packets.push(data.to_vec()),
            Self::Stream(decoder) => {
                decoder.extend(data)?;
                while let Some(frame) = decoder.next_frame() {
                    packets.push(frame);
                }
            }
            Self::Slip(decoder) => {
                for &byte in data {
                    if let Some(frame) = decoder.push(byte)? {
                        packets.push(frame.to_vec());
                    }
                }
            }
        }
        Ok(packets)
    }
}

/// Host runner of one emulated device.
pub struct Runner {
    config: HostConfig,
    ctx: Context,
    dispatcher: Dispatcher,
    net: UdpNet,
    pipeline: Pipeline,
    sensors: Option<SimulatedSensors>,
    deframer: Deframer,
    outbox: Outbox,
    output: Vec<OscMessage>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    last_frame: Option<Instant>,
    reset_due: Option<(ResetMode, Instant)>,
    boot: LoadOutcome,
    stats: LoopStats,
}

impl Runner {
    /// Bring up the host ports and boot the device.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the EEPROM image
    /// cannot be opened or read.
    pub fn new(config: HostConfig) -> Result<Self, RunnerError> {
        Self::with_running_flag(config, Arc::new(AtomicBool::new(false)))
    }

    /// Like [`Runner::new`], stopped through an existing `running` flag.
    pub fn with_running_flag(config: HostConfig, running: Arc<AtomicBool>) -> Result<Self, RunnerError> {
        config.validate()?;

        let bind: Ipv4Addr = config
            .device
            .bind_address
            .parse()
            .map_err(|_| chimaera_common::config::ConfigError::ValidationError(format!(
                "bind_address '{}' is not an IPv4 address",
                config.device.bind_address
            )))?;

        let eeprom = FileEeprom::open(&config.device.eeprom_path)?;
        let register = HostSystem::register_path(eeprom.path());
        let system = HostSystem::new(register, &config.shared.service_name);
        let net = UdpNet::new(bind);

        let mut ctx = Context::new(
            Box::new(eeprom),
            Box::new(net.clone()),
            Box::new(SystemResolver::new()),
            Box::new(system),
            config.device.max_pending_resolutions,
        );
        let boot = ctx.boot()?;

        let sensors = config.device.simulate_sensors.then(SimulatedSensors::default);
        let deframer = Deframer::for_framing(ctx.config.socket(SocketKind::Config).framing);
        let poll_interval = Duration::from_millis(config.device.poll_interval_ms);

        info!(
            "Runner for '{}' ready (uid {}, sensors {})",
            config.shared.service_name,
            ctx.uid(),
            if sensors.is_some() { "simulated" } else { "off" }
        );

        Ok(Self {
            config,
            ctx,
            dispatcher: Dispatcher::with_defaults(),
            net,
            pipeline: Pipeline::new(Box::new(PeakMapper::new())),
            sensors,
            deframer,
            outbox: Outbox::new(),
            output: Vec::new(),
            running,
            poll_interval,
            last_frame: None,
            reset_due: None,
            boot,
            stats: LoopStats::default(),
        })
    }

    /// Run until the running flag is cleared or a reset comes due.
    pub fn run(&mut self) -> Exit {
        info!(
            "Starting event loop (poll interval {}ms)",
            self.poll_interval.as_millis()
        );
        self.running.store(true, Ordering::SeqCst);

        let exit = loop {
            if !self.running.load(Ordering::SeqCst) {
                break Exit::Stopped;
            }
            if let Some(exit) = self.step() {
                break exit;
            }
            if !self.poll_interval.is_zero() {
                std::thread::sleep(self.poll_interval);
            }
        };

        info!(
            "Event loop stopped after {} iterations ({} packets, {} frames): {:?}",
            self.stats.iterations, self.stats.packets, self.stats.frames, exit
        );
        exit
    }

    /// One loop iteration without sleeping. Returns the exit once a
    /// requested reset is due.
    pub fn step(&mut self) -> Option<Exit> {
        self.stats.iterations += 1;

        self.receive_calls();

        if self.dispatcher.poll(&mut self.ctx, &mut self.outbox) > 0 {
            self.flush();
        }

        if self.frame_due() {
            self.sample_frame();
        }

        if let Some(request) = self.ctx.reset.take() {
            self.reset_due = Some((request.mode, Instant::now() + request.delay));
        }
        match self.reset_due {
            Some((mode, at)) if Instant::now() >= at => {
                info!("Performing {} reset", mode.as_str());
                Some(Exit::Reset(mode))
            }
            _ => None,
        }
    }

    /// Dispatch one config packet and flush its replies.
    pub fn handle_packet(&mut self, packet: &[u8]) {
        self.stats.packets += 1;
        self.dispatcher.dispatch_packet(&mut self.ctx, packet, &mut self.outbox);
        self.flush();
    }

    fn receive_calls(&mut self) {
        let framing = self.ctx.config.socket(SocketKind::Config).framing;
        if self.deframer.framing() != framing {
            debug!("Config framing now {}", framing.as_str());
            self.deframer = Deframer::for_framing(framing);
        }

        let mut buf = [0u8; REPLY_BUFFER_SIZE];
        loop {
            let (n, from) = match self.net.recv(SocketKind::Config, &mut buf) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => {
                    warn!("{}", e);
                    break;
                }
            };
            debug!("{} bytes from {}", n, from);
            match self.deframer.feed(&buf[..n]) {
                Ok(packets) => {
                    for packet in packets {
                        self.handle_packet(&packet);
                    }
                }
                Err(e) => debug!("Dropped config data from {}: {}", from, e),
            }
        }
    }

    fn flush(&mut self) {
        self.stats.replies += self.ctx.flush(&mut self.outbox) as u64;
    }

    /// Whether the next sensor frame is due at the configured rate. Rate 0
    /// samples on every iteration.
    fn frame_due(&mut self) -> bool {
        if self.sensors.is_none() {
            return false;
        }
        let now = Instant::now();
        let due = match (self.ctx.config.rate, self.last_frame) {
            (0, _) | (_, None) => true,
            (rate, Some(last)) => now.duration_since(last) >= Duration::from_secs(1) / u32::from(rate),
        };
        if due {
            self.last_frame = Some(now);
        }
        due
    }

    fn sample_frame(&mut self) {
        let Some(sensors) = self.sensors.as_mut() else {
            return;
        };
        let raw: [u16; SENSOR_N] = sensors.frame();
        self.output.clear();
        self.pipeline.process(&mut self.ctx, &raw, osc_now(), &mut self.output);
        self.stats.frames += 1;
        if let Err(e) = self.ctx.send_output(&self.output) {
            debug!("Frame {} not sent: {}", self.pipeline.frame_id(), e);
        }
    }

    /// Request shutdown of the event loop.
    pub fn shutdown(&mut self) {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        if !self.outbox.is_empty() {
            self.flush();
        }
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Outcome of the boot-time registry load.
    pub fn boot_outcome(&self) -> LoadOutcome {
        self.boot
    }

    /// Host configuration the runner was built from.
    pub fn host_config(&self) -> &HostConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Local address of the socket of `kind`, if open.
    pub fn local_addr(&self, kind: SocketKind) -> Option<SocketAddr> {
        self.net.local_addr(kind)
    }

    /// Get loop statistics.
    pub fn stats(&self) -> LoopStats {
        self.stats
    }
}

/// Current wall-clock time as an OSC timestamp.
fn osc_now() -> u64 {
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    seconds_to_timestamp(unix + NTP_UNIX_OFFSET)
}
