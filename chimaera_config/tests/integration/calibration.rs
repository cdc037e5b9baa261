//! Integration test: calibration cycle over remote calls.
//!
//! Validates: start → zero → min → mid produces baselines, thresholds and
//! fitted curves that normalize the recorded midpoint to the requested
//! value, and a saved slot survives a reload.

use chimaera_common::consts::SENSOR_N;
use chimaera_common::osc::OscArg;
use chimaera_config::calibration::{Calibration, Pole};

use super::{Device, fail_reason};

const BASELINE: u16 = 2000;

fn feed(dev: &mut Device, value: u16, frames: usize) {
    let frame = [value; SENSOR_N];
    for _ in 0..frames {
        dev.ctx.calibration.sample(&frame);
    }
}

fn calibrate(dev: &mut Device) {
    dev.call("/chimaera/calibration/start", vec![]);
    feed(dev, BASELINE, 300);
    dev.call("/chimaera/calibration/zero", vec![]);
    feed(dev, BASELINE + 10, 1);
    feed(dev, BASELINE - 10, 1);
    dev.call("/chimaera/calibration/min", vec![]);
    feed(dev, BASELINE + 100, 1);
}

#[test]
fn full_cycle_fits_midpoint() {
    let mut dev = Device::new();
    calibrate(&mut dev);
    assert!(dev.ctx.calibration.is_calibrating());

    let replies = dev.call("/chimaera/calibration/mid", vec![OscArg::Float(0.5)]);
    assert_eq!(replies.len(), SENSOR_N + 2);
    assert_eq!(replies[0].path, "/range/coeff");
    assert_eq!(replies[SENSOR_N].path, "/range/bmin");
    assert_eq!(replies[SENSOR_N].args, vec![OscArg::Float(200.0)]);
    assert_eq!(replies[SENSOR_N + 1].path, "/success");
    assert!(!dev.ctx.calibration.is_calibrating());

    let range = dev.ctx.calibration.range(0).unwrap();
    assert_eq!(range.mean, BASELINE);
    assert_eq!(range.thresh, [10, 10]);

    let (pole, value) = dev.ctx.calibration.normalize(0, BASELINE + 100).unwrap();
    assert_eq!(pole, Pole::South);
    assert!((value - 0.5).abs() < 1e-3, "normalized {value}");
    assert!(dev.ctx.calibration.normalize(0, BASELINE + 5).is_none());
}

#[test]
fn zero_reports_baselines() {
    let mut dev = Device::new();
    dev.call("/chimaera/calibration/start", vec![]);
    feed(&mut dev, BASELINE, 300);
    let replies = dev.call("/chimaera/calibration/zero", vec![]);

    assert_eq!(replies.len(), SENSOR_N + 1);
    assert_eq!(
        replies[3].args,
        vec![
            OscArg::Int(3),
            OscArg::Int(i32::from(BASELINE)),
            OscArg::Int(i32::from(BASELINE) - 0x7ff),
        ]
    );
}

#[test]
fn mid_without_value_is_rejected() {
    let mut dev = Device::new();
    let replies = dev.call("/chimaera/calibration/mid", vec![]);
    assert_eq!(
        fail_reason(&replies[0]),
        "callback, format or range invalid: query form not supported"
    );
}

#[test]
fn saved_slot_survives_reload() {
    let mut dev = Device::new();
    calibrate(&mut dev);
    dev.call("/chimaera/calibration/mid", vec![OscArg::Float(0.5)]);
    let fitted = *dev.ctx.calibration.range(0).unwrap();

    let replies = dev.call("/chimaera/calibration/save", vec![OscArg::Int(2)]);
    assert_eq!(replies[0].path, "/success");

    dev.ctx.calibration = Calibration::new();
    let replies = dev.call("/chimaera/calibration/load", vec![OscArg::Int(2)]);
    assert_eq!(replies[0].path, "/success");
    assert_eq!(*dev.ctx.calibration.range(0).unwrap(), fitted);

    let replies = dev.call("/chimaera/calibration/load", vec![OscArg::Int(1)]);
    assert_eq!(replies[0].path, "/fail");
}

#[test]
fn default_slot_is_used_without_argument() {
    let mut dev = Device::new();
    dev.call("/chimaera/calibration/slot", vec![OscArg::Int(3)]);
    dev.call("/chimaera/calibration/save", vec![]);
    assert_eq!(dev.query("/chimaera/calibration/slot"), vec![OscArg::Int(3)]);

    let replies = dev.call("/chimaera/calibration/load", vec![OscArg::Int(3)]);
    assert_eq!(replies[0].path, "/success");
}
