//! Calibration engine.
//!
//! Tracks the quiescent baseline of every sensor and fits a per-pole
//! response curve through three calibration points:
//!
//! ```text
//! start ──▶ zero ──▶ min ──▶ mid(Y1)
//!   │         │        │        └─ fit y = a + b·e + c·e² through
//!   │         │        │           (thresh, 0) (mid, Y1) (full, 1)
//!   │         │        └─ thresh = recorded minimal excursion
//!   │         └─ mean = baseline moving average
//!   └─ seed baselines at half scale
//! ```
//!
//! Phases are not sequence-checked: calling them out of order yields stale
//! values, never a panic. South pole readings rise above the baseline,
//! north pole readings fall below it.

use chimaera_common::consts::{
    ADC_HALF_BITDEPTH, CALIBRATION_SLOTS, EEPROM_RANGE_OFFSET, EEPROM_RANGE_STRIDE,
    QUIESCENT_SHIFT, SENSOR_N,
};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::registry::image::{self, HEADER_LEN, ImageHeader};
use crate::store::Eeprom;

/// Magnetic pole of an excursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pole {
    South = 0,
    North = 1,
}

impl Pole {
    /// Both poles, in storage order.
    pub const ALL: [Pole; 2] = [Pole::South, Pole::North];

    /// Storage index.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Calibration data of one sensor. Pairs are indexed by [`Pole`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorRange {
    /// Quiescent baseline.
    pub mean: u16,
    pub a: [f32; 2],
    pub b: [f32; 2],
    pub c: [f32; 2],
    /// Minimal excursion that counts as contact.
    pub thresh: [u16; 2],
}

impl SensorRange {
    /// Uncalibrated sensor at half scale.
    pub const fn quiescent() -> Self {
        Self {
            mean: ADC_HALF_BITDEPTH,
            a: [0.0; 2],
            b: [0.0; 2],
            c: [0.0; 2],
            thresh: [0; 2],
        }
    }
}

/// Persisted calibration slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RangeImage {
    header: ImageHeader,
    ranges: Vec<SensorRange>,
}

/// Fit of one pole through the three calibration points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fit {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

/// Quadratic through `(thresh, 0)`, `(mid, y1)` and `(full, 1)`.
///
/// Degenerate inputs (excursions not strictly increasing) yield a zero
/// fit.
pub fn fit_curve(thresh: f32, mid: f32, full: f32, y1: f32) -> Fit {
    if !(thresh < mid && mid < full) {
        return Fit::default();
    }
    let d1 = y1 / (mid - thresh);
    let d2 = (1.0 - y1) / (full - mid);
    let c = (d2 - d1) / (full - thresh);
    let b = d1 - c * (thresh + mid);
    let a = -(b * thresh + c * thresh * thresh);
    if !(a.is_finite() && b.is_finite() && c.is_finite()) {
        return Fit::default();
    }
    Fit { a, b, c }
}

/// Byte offset of calibration `slot`.
pub const fn slot_offset(slot: u8) -> usize {
    EEPROM_RANGE_OFFSET + slot as usize * EEPROM_RANGE_STRIDE
}

/// Clamp `slot` to the last available slot.
pub fn clamp_slot(slot: i32) -> u8 {
    slot.clamp(0, CALIBRATION_SLOTS as i32 - 1) as u8
}

const_assert!(ADC_HALF_BITDEPTH as u32 <= u16::MAX as u32 >> QUIESCENT_SHIFT);

/// Per-sensor calibration state and range table.
#[derive(Debug, Clone)]
pub struct Calibration {
    ranges: [SensorRange; SENSOR_N],
    /// Baseline moving-average accumulators, scaled by `QUIESCENT_SHIFT`.
    quiescent: [u16; SENSOR_N],
    /// Extremes since the last phase: south max, north min.
    extreme: [[u16; SENSOR_N]; 2],
    /// Largest excursion since zeroing, per pole.
    peak: [[u16; SENSOR_N]; 2],
    /// Smallest full-scale excursion of the last fit.
    bmin: f32,
    zeroing: bool,
    calibrating: bool,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibration {
    /// Uncalibrated table with every baseline at half scale.
    pub fn new() -> Self {
        Self {
            ranges: [SensorRange::quiescent(); SENSOR_N],
            quiescent: [ADC_HALF_BITDEPTH << QUIESCENT_SHIFT; SENSOR_N],
            extreme: [[ADC_HALF_BITDEPTH; SENSOR_N]; 2],
            peak: [[0; SENSOR_N]; 2],
            bmin: 0.0,
            zeroing: false,
            calibrating: false,
        }
    }

    /// Range table.
    pub fn ranges(&self) -> &[SensorRange; SENSOR_N] {
        &self.ranges
    }

    /// Range of sensor `i`.
    pub fn range(&self, i: usize) -> Option<&SensorRange> {
        self.ranges.get(i)
    }

    /// Whether frames are consumed by calibration.
    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    /// Whether the baseline is being averaged.
    pub fn is_zeroing(&self) -> bool {
        self.zeroing
    }

    /// Smallest full-scale excursion of the last fit.
    pub fn bmin(&self) -> f32 {
        self.bmin
    }

    // ─── Phases ─────────────────────────────────────────────────────

    /// Seed all accumulators and start sampling.
    pub fn start(&mut self) {
        self.quiescent = [ADC_HALF_BITDEPTH << QUIESCENT_SHIFT; SENSOR_N];
        self.extreme = [[ADC_HALF_BITDEPTH; SENSOR_N]; 2];
        self.peak = [[0; SENSOR_N]; 2];
        self.zeroing = true;
        self.calibrating = true;
        info!("Calibration started");
    }

    /// Feed one raw frame.
    pub fn sample(&mut self, raw: &[u16; SENSOR_N]) {
        if !self.calibrating {
            return;
        }
        if self.zeroing {
            for (acc, &value) in self.quiescent.iter_mut().zip(raw) {
                let avg = *acc >> QUIESCENT_SHIFT;
                *acc = acc.wrapping_add(value).wrapping_sub(avg);
            }
            return;
        }

        for (i, &value) in raw.iter().enumerate() {
            let mean = self.ranges[i].mean;
            let south = &mut self.extreme[Pole::South.index()][i];
            if value > *south {
                *south = value;
            }
            let north = &mut self.extreme[Pole::North.index()][i];
            if value < *north {
                *north = value;
            }
            let (pole, excursion) = if value >= mean {
                (Pole::South, value - mean)
            } else {
                (Pole::North, mean - value)
            };
            let peak = &mut self.peak[pole.index()][i];
            *peak = (*peak).max(excursion);
        }
    }

    /// Finish zeroing: every mean becomes the averaged baseline.
    pub fn zero(&mut self) {
        self.zeroing = false;
        for (range, &acc) in self.ranges.iter_mut().zip(&self.quiescent) {
            range.mean = acc >> QUIESCENT_SHIFT;
        }
        self.reset_extremes();
        self.peak = [[0; SENSOR_N]; 2];
        debug!("Calibration baselines updated");
    }

    /// Record the minimal excursion of every sensor and pole.
    pub fn min(&mut self) {
        for (i, range) in self.ranges.iter_mut().enumerate() {
            range.thresh = [
                self.extreme[Pole::South.index()][i].abs_diff(range.mean),
                self.extreme[Pole::North.index()][i].abs_diff(range.mean),
            ];
        }
        self.reset_extremes();
        debug!("Calibration thresholds updated");
    }

    /// Fit the response curves with `y1` as the value of the recorded
    /// midpoint excursion, then stop calibrating.
    pub fn mid(&mut self, y1: f32) {
        let mut bmin = f32::INFINITY;

        for (i, range) in self.ranges.iter_mut().enumerate() {
            for pole in Pole::ALL {
                let p = pole.index();
                let thresh = range.thresh[p] as f32;
                let mid = self.extreme[p][i].abs_diff(range.mean) as f32;
                let peak = self.peak[p][i] as f32;
                let full = if peak > mid { peak } else { 2.0 * mid };

                let fit = fit_curve(thresh, mid, full, y1);
                range.a[p] = fit.a;
                range.b[p] = fit.b;
                range.c[p] = fit.c;

                if fit != Fit::default() {
                    bmin = bmin.min(full);
                }
            }
        }

        self.bmin = if bmin.is_finite() { bmin } else { 0.0 };
        self.calibrating = false;
        info!("Calibration finished (bmin {})", self.bmin);
    }

    fn reset_extremes(&mut self) {
        for (i, range) in self.ranges.iter().enumerate() {
            self.extreme[Pole::South.index()][i] = range.mean;
            self.extreme[Pole::North.index()][i] = range.mean;
        }
    }

    // ─── Normalization ──────────────────────────────────────────────

    /// Normalized value of sensor `i`, or `None` below threshold.
    pub fn normalize(&self, i: usize, raw: u16) -> Option<(Pole, f32)> {
        let range = self.ranges.get(i)?;
        let (pole, excursion) = if raw >= range.mean {
            (Pole::South, raw - range.mean)
        } else {
            (Pole::North, range.mean - raw)
        };
        let p = pole.index();
        if excursion <= range.thresh[p] {
            return None;
        }
        let e = excursion as f32;
        let y = range.a[p] + range.b[p] * e + range.c[p] * e * e;
        Some((pole, y.clamp(0.0, 1.0)))
    }

    // ─── Persistence ────────────────────────────────────────────────

    /// Write the range table to `slot` (clamped) in one operation.
    pub fn save(&self, eeprom: &mut dyn Eeprom, slot: u8) -> Result<(), StoreError> {
        let slot = slot.min(CALIBRATION_SLOTS - 1);
        let img = RangeImage {
            header: ImageHeader::current(),
            ranges: self.ranges.to_vec(),
        };
        let bytes = image::encode(&img)?;
        if bytes.len() > EEPROM_RANGE_STRIDE {
            return Err(StoreError::ImageTooLarge {
                size: bytes.len(),
                region: EEPROM_RANGE_STRIDE,
            });
        }
        eeprom.write(slot_offset(slot), &bytes)?;
        info!("Saved calibration to slot {}", slot);
        Ok(())
    }

    /// Replace the range table from `slot` (clamped).
    ///
    /// # Errors
    /// `StoreError::VersionMismatch` if the slot carries a foreign header;
    /// the table in RAM is left untouched on any error.
    pub fn load(&mut self, eeprom: &mut dyn Eeprom, slot: u8) -> Result<(), StoreError> {
        let slot = slot.min(CALIBRATION_SLOTS - 1);
        let offset = slot_offset(slot);

        let mut header = [0u8; HEADER_LEN];
        eeprom.read(offset, &mut header)?;
        if !ImageHeader::matches(&header) {
            warn!("Calibration slot {} has a foreign header", slot);
            return Err(StoreError::VersionMismatch);
        }

        let mut bytes = vec![0u8; EEPROM_RANGE_STRIDE];
        eeprom.read(offset, &mut bytes)?;
        let img: RangeImage = image::decode(&bytes)?;
        if img.ranges.len() != SENSOR_N {
            return Err(StoreError::Codec(format!(
                "slot holds {} sensors, expected {}",
                img.ranges.len(),
                SENSOR_N
            )));
        }

        self.ranges.copy_from_slice(&img.ranges);
        info!("Loaded calibration from slot {}", slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEeprom;

    fn frame(value: u16) -> [u16; SENSOR_N] {
        [value; SENSOR_N]
    }

    /// Runs a full cycle with a baseline of 2000, a threshold excursion of
    /// 20 and a midpoint excursion of 400 on the south pole.
    fn calibrated() -> Calibration {
        let mut cal = Calibration::new();
        cal.start();
        for _ in 0..512 {
            cal.sample(&frame(2000));
        }
        cal.zero();
        cal.sample(&frame(2020));
        cal.sample(&frame(1980));
        cal.min();
        cal.sample(&frame(2400));
        cal.mid(0.5);
        cal
    }

    #[test]
    fn start_seeds_half_scale() {
        let mut cal = Calibration::new();
        cal.start();
        assert!(cal.is_calibrating());
        assert!(cal.is_zeroing());
        cal.zero();
        assert_eq!(cal.range(0).unwrap().mean, ADC_HALF_BITDEPTH);
    }

    #[test]
    fn zero_converges_to_baseline() {
        let mut cal = Calibration::new();
        cal.start();
        for _ in 0..512 {
            cal.sample(&frame(1500));
        }
        cal.zero();
        let mean = cal.range(7).unwrap().mean;
        assert!((1499..=1500).contains(&mean), "mean {mean}");
        assert!(!cal.is_zeroing());
        assert!(cal.is_calibrating());
    }

    #[test]
    fn min_records_thresholds_per_pole() {
        let cal = calibrated();
        let range = cal.range(0).unwrap();
        let mean = range.mean;
        assert_eq!(range.thresh[Pole::South.index()], 2020 - mean);
        assert_eq!(range.thresh[Pole::North.index()], mean - 1980);
    }

    #[test]
    fn mid_fits_through_calibration_points() {
        let cal = calibrated();
        assert!(!cal.is_calibrating());

        let range = *cal.range(0).unwrap();
        let s = Pole::South.index();
        let y = |e: f32| range.a[s] + range.b[s] * e + range.c[s] * e * e;
        let mid = (2400 - range.mean) as f32;
        let thresh = range.thresh[s] as f32;

        assert!(y(thresh).abs() < 1e-4);
        assert!((y(mid) - 0.5).abs() < 1e-4);
        assert!((y(2.0 * mid) - 1.0).abs() < 1e-3);
        assert!((cal.bmin() - 2.0 * mid).abs() < 1e-3);

        // no north excursion beyond threshold was recorded
        let n = Pole::North.index();
        assert_eq!((range.a[n], range.b[n], range.c[n]), (0.0, 0.0, 0.0));
    }

    #[test]
    fn normalize_gates_and_clamps() {
        let cal = calibrated();
        let mean = cal.range(3).unwrap().mean;
        assert_eq!(cal.normalize(3, mean + 5), None);

        let (pole, y) = cal.normalize(3, 2400).unwrap();
        assert_eq!(pole, Pole::South);
        assert!((y - 0.5).abs() < 1e-3);

        let (_, y) = cal.normalize(3, 4095).unwrap();
        assert_eq!(y, 1.0);
        assert_eq!(cal.normalize(SENSOR_N, 2400), None);
    }

    #[test]
    fn degenerate_fit_is_zero() {
        assert_eq!(fit_curve(10.0, 10.0, 20.0, 0.5), Fit::default());
        assert_eq!(fit_curve(10.0, 20.0, 15.0, 0.5), Fit::default());
        assert_ne!(fit_curve(10.0, 20.0, 40.0, 0.5), Fit::default());
    }

    #[test]
    fn out_of_order_phases_do_not_panic() {
        let mut cal = Calibration::new();
        cal.mid(0.5);
        cal.min();
        cal.zero();
        cal.sample(&frame(0));
        assert!(!cal.is_calibrating());
    }

    #[test]
    fn slot_round_trip() {
        let mut eeprom = MemoryEeprom::default();
        let cal = calibrated();
        cal.save(&mut eeprom, 2).unwrap();

        let mut restored = Calibration::new();
        restored.load(&mut eeprom, 2).unwrap();
        assert_eq!(restored.ranges(), cal.ranges());
    }

    #[test]
    fn slots_are_clamped() {
        let mut eeprom = MemoryEeprom::default();
        let cal = calibrated();
        cal.save(&mut eeprom, 200).unwrap();

        let mut restored = Calibration::new();
        restored.load(&mut eeprom, CALIBRATION_SLOTS - 1).unwrap();
        assert_eq!(restored.ranges(), cal.ranges());
        assert_eq!(clamp_slot(-3), 0);
        assert_eq!(clamp_slot(99), CALIBRATION_SLOTS - 1);
    }

    #[test]
    fn foreign_slot_leaves_ram_untouched() {
        let mut eeprom = MemoryEeprom::default();
        let mut cal = calibrated();
        let before = *cal.ranges();
        assert_eq!(cal.load(&mut eeprom, 1), Err(StoreError::VersionMismatch));
        assert_eq!(cal.ranges(), &before);
    }

    #[test]
    fn slots_fit_their_stride() {
        let img = RangeImage {
            header: ImageHeader::current(),
            ranges: vec![SensorRange::default(); SENSOR_N],
        };
        assert!(image::encode(&img).unwrap().len() <= EEPROM_RANGE_STRIDE);
    }
}
