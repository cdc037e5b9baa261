//! Synthetic sensor frames and a single-contact mapper.
//!
//! Without the ADC board the runner feeds frames from
//! [`SimulatedSensors`]: every sensor sits at half scale while one south
//! pole bump sweeps back and forth along the array. [`PeakMapper`] turns
//! the strongest normalized sensor into one tracked contact.

use chimaera_common::consts::{ADC_HALF_BITDEPTH, SENSOR_N};
use chimaera_config::pipeline::{Contact, ContactEvent, ContactMapper, Sample};

/// Peak excursion of the simulated bump in ADC counts.
pub const BUMP_HEIGHT: u16 = 600;

/// Half width of the simulated bump in sensors.
pub const BUMP_RADIUS: usize = 3;

/// Sweeping bump generator.
#[derive(Debug, Clone)]
pub struct SimulatedSensors {
    /// Frames per sweep from one end of the array to the other.
    sweep: u32,
    tick: u32,
}

impl SimulatedSensors {
    /// Bump crossing the array once every `sweep` frames.
    pub fn new(sweep: u32) -> Self {
        Self {
            sweep: sweep.max(1),
            tick: 0,
        }
    }

    /// Sensor under the bump centre at the current tick.
    pub fn centre(&self) -> usize {
        let period = self.sweep * 2;
        let phase = self.tick % period;
        let pos = if phase < self.sweep { phase } else { period - phase };
        (pos as usize * (SENSOR_N - 1)) / self.sweep as usize
    }

    /// Next raw frame.
    pub fn frame(&mut self) -> [u16; SENSOR_N] {
        let centre = self.centre();
        self.tick = self.tick.wrapping_add(1);

        let mut raw = [ADC_HALF_BITDEPTH; SENSOR_N];
        let lo = centre.saturating_sub(BUMP_RADIUS);
        let hi = (centre + BUMP_RADIUS).min(SENSOR_N - 1);
        for (i, value) in raw.iter_mut().enumerate().take(hi + 1).skip(lo) {
            let distance = i.abs_diff(centre) as u16;
            let step = BUMP_HEIGHT / (BUMP_RADIUS as u16 + 1);
            *value += BUMP_HEIGHT - distance * step;
        }
        raw
    }
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new(2000)
    }
}

/// Tracks the strongest sensor as a single contact.
#[derive(Debug, Default)]
pub struct PeakMapper {
    sid: u32,
    live: bool,
}

impl PeakMapper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContactMapper for PeakMapper {
    fn map(&mut self, samples: &[Option<Sample>; SENSOR_N], events: &mut Vec<ContactEvent>) -> u16 {
        let peak = samples
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|s| (i, s)))
            .max_by(|a, b| a.1.value.total_cmp(&b.1.value));

        match peak {
            Some((i, sample)) => {
                if !self.live {
                    self.sid = self.sid.wrapping_add(1);
                }
                let contact = Contact {
                    sid: self.sid,
                    gid: 0,
                    pid: sample.pole.index() as u16,
                    x: i as f32 / (SENSOR_N - 1) as f32,
                    z: sample.value,
                };
                events.push(if self.live {
                    ContactEvent::Set(contact)
                } else {
                    ContactEvent::On(contact)
                });
                self.live = true;
                1
            }
            None => {
                if self.live {
                    events.push(ContactEvent::Off(Contact {
                        sid: self.sid,
                        ..Contact::default()
                    }));
                    self.live = false;
                }
                0
            }
        }
    }
}
