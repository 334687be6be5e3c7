//! Synthetic calibration data with a known ground truth

use std::ops::Range;

use nalgebra::{Matrix3, Rotation3, Unit, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::model;
use super::samples::SampleBatch;

pub const DIP_DEG: f64 = 60.0;

/// Roughly uniform points on the unit sphere (Fibonacci lattice)
pub fn sphere_points(n: usize) -> Vec<Vector3<f64>> {
    let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    (0..n)
        .map(|i| {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let r = (1.0 - z * z).sqrt();
            let theta = golden * i as f64;
            Vector3::new(r * theta.cos(), r * theta.sin(), z)
        })
        .collect()
}

pub fn mag_distortion() -> (Matrix3<f64>, Vector3<f64>) {
    let t = Matrix3::new(1.20, 0.08, -0.05, 0.08, 0.90, 0.06, -0.05, 0.06, 1.05);
    (t, Vector3::new(0.35, -0.20, 0.50))
}

pub fn grav_distortion() -> (Matrix3<f64>, Vector3<f64>) {
    let t = Matrix3::new(1.02, 0.01, 0.0, 0.01, 0.98, -0.02, 0.0, -0.02, 1.01);
    (t, Vector3::new(0.03, -0.02, 0.05))
}

/// Device-to-world rotation for a shot at `azimuth`/`inclination` with the
/// instrument rolled about the laser axis. All angles in degrees.
pub fn device_rotation(azimuth: f64, inclination: f64, roll: f64) -> Matrix3<f64> {
    let (az, inc, roll) = (azimuth.to_radians(), inclination.to_radians(), roll.to_radians());
    let y = Vector3::new(inc.cos() * az.sin(), inc.cos() * az.cos(), inc.sin());
    let x0 = Vector3::new(az.cos(), -az.sin(), 0.0);
    let z0 = x0.cross(&y);
    let x = x0 * roll.cos() + z0 * roll.sin();
    let z = x.cross(&y);
    Matrix3::from_columns(&[x, y, z])
}

/// An instrument with distorted, slightly misaligned sensors
pub struct Instrument {
    pub mag: (Matrix3<f64>, Vector3<f64>),
    pub grav: (Matrix3<f64>, Vector3<f64>),
    pub mag_mount: Matrix3<f64>,
    pub grav_mount: Matrix3<f64>,
    pub field: Vector3<f64>,
    noise: f64,
}

impl Instrument {
    pub fn new() -> Self {
        let dip = DIP_DEG.to_radians();
        let mag_axis = Unit::new_normalize(Vector3::new(1.0, 0.3, 1.0));
        let grav_axis = Unit::new_normalize(Vector3::new(0.2, 0.4, 1.0));
        Self {
            mag: mag_distortion(),
            grav: grav_distortion(),
            mag_mount: Rotation3::from_axis_angle(&mag_axis, 0.6f64.to_radians()).into_inner(),
            grav_mount: Rotation3::from_axis_angle(&grav_axis, 0.4f64.to_radians()).into_inner(),
            field: Vector3::new(0.0, dip.cos(), -dip.sin()),
            noise: 0.0,
        }
    }

    pub fn with_noise(mut self, sigma: f64) -> Self {
        self.noise = sigma;
        self
    }

    /// Raw (magnetometer, accelerometer) readings for one shot
    pub fn sample(&self, azimuth: f64, inclination: f64, roll: f64) -> (Vector3<f64>, Vector3<f64>) {
        let r = device_rotation(azimuth, inclination, roll).transpose();
        let mag_dev = r * self.field;
        let grav_dev = r * Vector3::z();
        let mag = self.mag.0.try_inverse().unwrap() * (self.mag_mount * mag_dev) + self.mag.1;
        let grav = self.grav.0.try_inverse().unwrap() * (self.grav_mount * grav_dev) + self.grav.1;
        (mag, grav)
    }

    pub fn batch(&self, shots: &[(f64, f64, f64)], seed: u64) -> SampleBatch {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut jitter = |v: Vector3<f64>| {
            if self.noise == 0.0 {
                v
            } else {
                v + Vector3::from_fn(|_, _| rng.gen_range(-self.noise..self.noise))
            }
        };
        let mut batch = SampleBatch::default();
        for &(az, inc, roll) in shots {
            let (m, g) = self.sample(az, inc, roll);
            batch.push(jitter(m), jitter(g));
        }
        batch
    }
}

/// Same-target runs used by the standard capture
pub const TARGETS: [(f64, f64); 3] = [(30.0, 10.0), (150.0, -20.0), (260.0, 40.0)];

const RUN_ROLLS: [f64; 6] = [0.0, 60.0, 120.0, 180.0, 240.0, 300.0];

/// Widely spread shots, none within 15° of a target
pub fn scattered_shots(n: usize) -> Vec<(f64, f64, f64)> {
    let targets: Vec<Vector3<f64>> = TARGETS.iter().map(|&(a, i)| unit(a, i)).collect();
    sphere_points(n)
        .into_iter()
        .enumerate()
        .filter(|(_, d)| targets.iter().all(|t| t.angle(d) > 15f64.to_radians()))
        .map(|(k, d)| {
            let inc = d.z.asin().to_degrees();
            let mut az = d.x.atan2(d.y).to_degrees();
            if az < 0.0 {
                az += 360.0;
            }
            (az, inc, (k as f64 * 73.0) % 360.0)
        })
        .collect()
}

/// Scattered blocks interleaved with three six-shot runs.
///
/// Returns the shots and the index range of each run.
pub fn standard_capture() -> (Vec<(f64, f64, f64)>, Vec<Range<usize>>) {
    let scattered = scattered_shots(36);
    let block = scattered.len() / 3;
    let mut shots = Vec::new();
    let mut runs = Vec::new();
    for (k, &(az, inc)) in TARGETS.iter().enumerate() {
        shots.extend_from_slice(&scattered[k * block..(k + 1) * block]);
        let start = shots.len();
        shots.extend(RUN_ROLLS.iter().map(|&roll| (az, inc, roll)));
        runs.push(start..shots.len());
    }
    shots.extend_from_slice(&scattered[3 * block..]);
    (shots, runs)
}

fn unit(azimuth: f64, inclination: f64) -> Vector3<f64> {
    crate::core::Leg::new(azimuth, inclination, 1.0).direction()
}

mod tests {
    use super::*;

    #[test]
    fn test_device_rotation_matches_orientation_convention() {
        let inst = Instrument { mag_mount: Matrix3::identity(), grav_mount: Matrix3::identity(), ..Instrument::new() };
        let (raw_m, raw_g) = inst.sample(123.0, -35.0, 77.0);
        let m = inst.mag.0 * (raw_m - inst.mag.1);
        let g = inst.grav.0 * (raw_g - inst.grav.1);
        let o = model::orientation(&m, &g).unwrap();
        approx::assert_abs_diff_eq!(o.azimuth, 123.0, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(o.inclination, -35.0, epsilon = 1e-9);
    }
}
