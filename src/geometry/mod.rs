//! Geometry collaborator interface.
//!
//! The validation engine never builds detector geometry itself. It asks a
//! [`GeometryService`] which components exist, how a roll-local point maps to
//! the global frame, and which strip a local point lands on. [`PlanarGeometry`]
//! is a small self-contained implementation with flat rectangular rolls, used
//! by hosts that only need a nominal layout and by the tests.

pub mod planar;

pub use planar::{PlanarGeometry, PlanarRoll, RingSpec};

use crate::detid::{ComponentKey, GemDetId};
use crate::error::Result;
use crate::{GlobalPoint, LocalPoint};

/// Per-station dimensions used to choose accumulator binning at booking time.
#[derive(Debug, Clone, PartialEq)]
pub struct StationLayout {
    /// Chambers per layer in one region.
    pub num_chambers: u32,
    /// Rolls (eta partitions) per chamber.
    pub num_rolls: u32,
    /// Strips per roll.
    pub num_strips: u32,
    /// Global |z| extent of the station (cm).
    pub abs_z_range: (f64, f64),
    /// Global radial extent of the station (cm).
    pub r_range: (f64, f64),
}

/// Lookup service mapping detector identifiers to geometry.
pub trait GeometryService {
    /// `true` if the identified roll is part of the geometry.
    fn component_exists(&self, id: &GemDetId) -> bool;

    /// Transform a roll-local point to the global frame.
    fn to_global(&self, id: &GemDetId, local: &LocalPoint) -> Result<GlobalPoint>;

    /// 1-based strip number containing a roll-local point.
    fn fired_channel(&self, id: &GemDetId, local: &LocalPoint) -> Result<i32>;

    /// Every roll-level key that physically exists. Called once at booking.
    fn enumerate_keys(&self) -> Vec<ComponentKey>;

    /// Dimensions of a station, `None` if the station is absent.
    fn station_layout(&self, region: i32, station: i32) -> Option<StationLayout>;
}

/// Cylindrical and pseudorapidity coordinates of a global point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalCoordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Transverse distance from the beam line.
    pub r: f64,
    /// Azimuth in (-π, π].
    pub phi: f64,
    /// Pseudorapidity, `asinh(z / r)`.
    pub eta: f64,
}

impl GlobalCoordinates {
    pub fn from_point(p: &GlobalPoint) -> Self {
        let r = p.x.hypot(p.y);
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
            r,
            phi: p.y.atan2(p.x),
            eta: (p.z / r).asinh(),
        }
    }

    pub fn abs_z(&self) -> f64 {
        self.z.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_coordinates() {
        let c = GlobalCoordinates::from_point(&GlobalPoint::new(0.0, 200.0, -570.0));
        assert!((c.r - 200.0).abs() < 1e-12);
        assert!((c.phi - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((c.abs_z() - 570.0).abs() < 1e-12);
        // η = -ln(tan(θ/2)), θ measured from +z
        let theta = 200.0_f64.atan2(-570.0);
        let expected_eta = -(theta / 2.0).tan().ln();
        assert!((c.eta - expected_eta).abs() < 1e-9);
        assert!(c.eta < 0.0);
    }
}
