//! Sensor pipeline.
//!
//! ```text
//! raw frame ──▶ moving average ──┬─ calibrating ──▶ Calibration::sample
//!                                └─ otherwise ───▶ normalize ──▶ ContactMapper
//!                                                                   │
//!                                     active OutputEngines ◀────────┘
//! ```
//!
//! Contact clustering is external; the pipeline only defines the
//! interface a mapper implements and drives the output engines with its
//! events.

use chimaera_common::consts::SENSOR_N;
use chimaera_common::osc::{OscArg, OscMessage, seconds_to_timestamp};

use crate::calibration::{Calibration, Pole};
use crate::context::{Context, Engines};
use crate::custom::CustomEngine;
use crate::registry::{Config, MovingAverage};

/// Frame-level information handed to the output engines.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInfo {
    pub fid: u32,
    /// OSC timestamp of the frame, output offset included.
    pub timestamp: u64,
    /// Contacts in the previous frame.
    pub blobs_old: u16,
    /// Contacts in this frame.
    pub blobs_new: u16,
}

/// One tracked contact.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Contact {
    /// Session id, persistent while the contact lives.
    pub sid: u32,
    /// Group id.
    pub gid: u16,
    /// Pole id.
    pub pid: u16,
    /// Position along the array, `[0, 1]`.
    pub x: f32,
    /// Pressure, `[0, 1]`.
    pub z: f32,
}

/// Normalized reading of one sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub pole: Pole,
    pub value: f32,
}

/// Contact lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactEvent {
    On(Contact),
    Off(Contact),
    Set(Contact),
}

/// Contact clustering engine.
pub trait ContactMapper {
    /// Group one normalized frame into contacts, appending lifecycle
    /// events to `events`. Returns the number of live contacts.
    fn map(&mut self, samples: &[Option<Sample>; SENSOR_N], events: &mut Vec<ContactEvent>) -> u16;
}

/// Consumer of contact events.
pub trait OutputEngine {
    fn frame(&mut self, _config: &Config, _frame: &FrameInfo, _out: &mut Vec<OscMessage>) {}

    fn on(&mut self, config: &Config, contact: &Contact, out: &mut Vec<OscMessage>);

    fn off(&mut self, config: &Config, contact: &Contact, out: &mut Vec<OscMessage>);

    fn set(&mut self, config: &Config, contact: &Contact, out: &mut Vec<OscMessage>);

    fn end(&mut self, _config: &Config, _frame: &FrameInfo, _out: &mut Vec<OscMessage>) {}
}

/// Test output engine echoing every event.
#[derive(Debug, Default)]
pub struct DummyEngine;

impl OutputEngine for DummyEngine {
    fn on(&mut self, _config: &Config, c: &Contact, out: &mut Vec<OscMessage>) {
        out.push(OscMessage::new(
            "/on",
            vec![
                OscArg::Int(c.sid as i32),
                OscArg::Int(c.gid as i32),
                OscArg::Int(c.pid as i32),
                OscArg::Float(c.x),
                OscArg::Float(c.z),
            ],
        ));
    }

    fn off(&mut self, _config: &Config, c: &Contact, out: &mut Vec<OscMessage>) {
        out.push(OscMessage::new(
            "/off",
            vec![
                OscArg::Int(c.sid as i32),
                OscArg::Int(c.gid as i32),
                OscArg::Int(c.pid as i32),
            ],
        ));
    }

    fn set(&mut self, _config: &Config, c: &Contact, out: &mut Vec<OscMessage>) {
        out.push(OscMessage::new(
            "/set",
            vec![
                OscArg::Int(c.sid as i32),
                OscArg::Int(c.gid as i32),
                OscArg::Int(c.pid as i32),
                OscArg::Float(c.x),
                OscArg::Float(c.z),
            ],
        ));
    }
}

// ─── Moving Average ─────────────────────────────────────────────────

/// Per-sensor exponential moving average over `1 << bitshift` samples.
#[derive(Debug, Clone)]
struct Smoother {
    acc: [u32; SENSOR_N],
    shift: Option<u8>,
}

impl Smoother {
    fn new() -> Self {
        Self {
            acc: [0; SENSOR_N],
            shift: None,
        }
    }

    fn apply(&mut self, settings: &MovingAverage, raw: &[u16; SENSOR_N]) -> [u16; SENSOR_N] {
        if !settings.enabled {
            self.shift = None;
            return *raw;
        }
        let shift = settings.bitshift;
        if self.shift != Some(shift) {
            // reseed on first use or window change
            for (acc, &value) in self.acc.iter_mut().zip(raw) {
                *acc = (value as u32) << shift;
            }
            self.shift = Some(shift);
        }
        let mut out = [0u16; SENSOR_N];
        for ((acc, &value), slot) in self.acc.iter_mut().zip(raw).zip(out.iter_mut()) {
            *acc = *acc + value as u32 - (*acc >> shift);
            *slot = (*acc >> shift) as u16;
        }
        out
    }
}

// ─── Pipeline ───────────────────────────────────────────────────────

/// Drives one raw frame through calibration, mapping and output.
pub struct Pipeline {
    mapper: Box<dyn ContactMapper>,
    engines: Vec<(Engines, Box<dyn OutputEngine>)>,
    smoother: Smoother,
    events: Vec<ContactEvent>,
    fid: u32,
    blobs: u16,
}

impl Pipeline {
    /// Pipeline with the built-in custom and dummy engines.
    pub fn new(mapper: Box<dyn ContactMapper>) -> Self {
        Self {
            mapper,
            engines: Vec::new(),
            smoother: Smoother::new(),
            events: Vec::new(),
            fid: 0,
            blobs: 0,
        }
        .with_engine(Engines::CUSTOM, Box::new(CustomEngine::new()))
        .with_engine(Engines::DUMMY, Box::new(DummyEngine))
    }

    /// Attach an engine fired while `flag` is active.
    pub fn with_engine(mut self, flag: Engines, engine: Box<dyn OutputEngine>) -> Self {
        self.engines.push((flag, engine));
        self
    }

    /// Frames processed so far.
    pub fn frame_id(&self) -> u32 {
        self.fid
    }

    /// Process one raw frame sampled at OSC time `now`, appending output
    /// messages to `out`. Frames only feed the calibration while a cycle
    /// is running.
    pub fn process(
        &mut self,
        ctx: &mut Context,
        raw: &[u16; SENSOR_N],
        now: u64,
        out: &mut Vec<OscMessage>,
    ) {
        let smoothed = self.smoother.apply(&ctx.config.movingaverage, raw);

        if ctx.calibration.is_calibrating() {
            ctx.calibration.sample(&smoothed);
            return;
        }

        let samples = normalize_frame(&ctx.calibration, &smoothed);
        self.events.clear();
        let blobs = self.mapper.map(&samples, &mut self.events);

        self.fid = self.fid.wrapping_add(1);
        let frame = FrameInfo {
            fid: self.fid,
            timestamp: now.wrapping_add(seconds_to_timestamp(ctx.config.output_offset)),
            blobs_old: self.blobs,
            blobs_new: blobs,
        };
        self.blobs = blobs;

        let config = &ctx.config;
        for (flag, engine) in self.engines.iter_mut() {
            if !ctx.engines.contains(*flag) {
                continue;
            }
            engine.frame(config, &frame, out);
            for event in &self.events {
                match event {
                    ContactEvent::On(c) => engine.on(config, c, out),
                    ContactEvent::Off(c) => engine.off(config, c, out),
                    ContactEvent::Set(c) => engine.set(config, c, out),
                }
            }
            engine.end(config, &frame, out);
        }
    }
}

/// Normalize every sensor of a frame.
pub fn normalize_frame(calibration: &Calibration, raw: &[u16; SENSOR_N]) -> [Option<Sample>; SENSOR_N] {
    std::array::from_fn(|i| {
        calibration
            .normalize(i, raw[i])
            .map(|(pole, value)| Sample { pole, value })
    })
}
