//! Flat-roll reference geometry.
//!
//! Every roll is a rectangle in its own local frame: local x runs across the
//! strips (centered on the roll), local y runs along them. A rigid placement
//! (`Isometry3`) carries the local plane into the global frame. Chambers are
//! arranged in rings around the beam line, one ring per (region, station, layer).

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;

use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::detid::{ComponentKey, GemDetId};
use crate::error::{Result, ValidationError};
use crate::{GlobalPoint, LocalPoint};

use super::{GeometryService, StationLayout};

/// One readout roll.
#[derive(Debug, Clone)]
pub struct PlanarRoll {
    /// Local → global placement.
    pub placement: Isometry3<f64>,
    pub num_strips: u32,
    /// Strip pitch (cm).
    pub pitch: f64,
}

impl PlanarRoll {
    fn half_width(&self) -> f64 {
        0.5 * self.num_strips as f64 * self.pitch
    }

    /// Strip containing local x. Points beyond the edges land on the edge strips.
    pub fn strip(&self, local: &LocalPoint) -> i32 {
        let s = ((local.x + self.half_width()) / self.pitch).floor() as i64 + 1;
        s.clamp(1, self.num_strips as i64) as i32
    }

    /// Local position of the center of a strip.
    pub fn centre_of_strip(&self, strip: i32) -> LocalPoint {
        LocalPoint::new((strip as f64 - 0.5) * self.pitch - self.half_width(), 0.0)
    }

    pub fn to_global(&self, local: &LocalPoint) -> GlobalPoint {
        self.placement * Point3::new(local.x, local.y, 0.0)
    }
}

/// Parameters of one station's chamber ring.
#[derive(Debug, Clone)]
pub struct RingSpec {
    pub station: i32,
    pub num_chambers: u32,
    pub num_rolls: u32,
    pub num_strips: u32,
    /// Strip pitch (cm).
    pub pitch: f64,
    /// Inner and outer radius of the active area (cm).
    pub r_min: f64,
    pub r_max: f64,
    /// |z| of layer 1 (cm).
    pub z_layer1: f64,
    /// |z| offset of layer 2 relative to layer 1 (cm).
    pub layer_gap: f64,
}

impl RingSpec {
    /// Nominal GE1/1-like station.
    pub fn ge11() -> Self {
        Self {
            station: 1,
            num_chambers: 36,
            num_rolls: 8,
            num_strips: 384,
            pitch: 0.09,
            r_min: 130.0,
            r_max: 260.0,
            z_layer1: 568.0,
            layer_gap: 2.5,
        }
    }

    /// Nominal GE2/1-like station.
    pub fn ge21() -> Self {
        Self {
            station: 2,
            num_chambers: 18,
            num_rolls: 8,
            num_strips: 768,
            pitch: 0.1,
            r_min: 140.0,
            r_max: 320.0,
            z_layer1: 795.0,
            layer_gap: 2.5,
        }
    }
}

/// Geometry made of flat rolls. Built with [`PlanarGeometry::from_rings`] or
/// assembled roll by roll with [`PlanarGeometry::insert_roll`].
#[derive(Debug, Clone, Default)]
pub struct PlanarGeometry {
    rolls: HashMap<GemDetId, PlanarRoll>,
    layouts: BTreeMap<(i32, i32), StationLayout>,
}

impl PlanarGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both regions, every ring in `rings`, two layers per ring.
    pub fn from_rings(rings: &[RingSpec]) -> Result<Self> {
        let mut geom = Self::new();
        for region in [-1, 1] {
            for ring in rings {
                geom.add_ring(region, ring)?;
            }
        }
        Ok(geom)
    }

    /// Add one (region, station) ring of chambers.
    pub fn add_ring(&mut self, region: i32, ring: &RingSpec) -> Result<()> {
        let roll_height = (ring.r_max - ring.r_min) / ring.num_rolls as f64;
        for layer in 1..=2 {
            let z = region as f64 * (ring.z_layer1 + (layer - 1) as f64 * ring.layer_gap);
            for chamber in 1..=ring.num_chambers as i32 {
                let phi = TAU * (chamber - 1) as f64 / ring.num_chambers as f64;
                let (sin_phi, cos_phi) = phi.sin_cos();
                // Local x is tangential, local y radial.
                let ex = Vector3::new(-sin_phi, cos_phi, 0.0);
                let ey = Vector3::new(cos_phi, sin_phi, 0.0);
                let ez = ex.cross(&ey);
                let rot = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[ex, ey, ez]));
                for roll in 1..=ring.num_rolls as i32 {
                    // Roll 1 is the outermost partition.
                    let r = ring.r_max - (roll as f64 - 0.5) * roll_height;
                    let placement = Isometry3::from_parts(
                        Translation3::new(r * cos_phi, r * sin_phi, z),
                        UnitQuaternion::from_rotation_matrix(&rot),
                    );
                    let id = GemDetId::new(region, ring.station, layer, chamber, roll)?;
                    self.insert_roll(
                        id,
                        PlanarRoll {
                            placement,
                            num_strips: ring.num_strips,
                            pitch: ring.pitch,
                        },
                    );
                }
            }
        }
        self.layouts.insert(
            (region, ring.station),
            StationLayout {
                num_chambers: ring.num_chambers,
                num_rolls: ring.num_rolls,
                num_strips: ring.num_strips,
                abs_z_range: (ring.z_layer1, ring.z_layer1 + ring.layer_gap),
                r_range: (ring.r_min, ring.r_max),
            },
        );
        Ok(())
    }

    /// Insert or replace a single roll. The station layout is not updated.
    pub fn insert_roll(&mut self, id: GemDetId, roll: PlanarRoll) {
        self.rolls.insert(id, roll);
    }

    /// Remove a roll, e.g. to model a partially instrumented station.
    pub fn remove_roll(&mut self, id: &GemDetId) -> Option<PlanarRoll> {
        self.rolls.remove(id)
    }

    pub fn roll(&self, id: &GemDetId) -> Option<&PlanarRoll> {
        self.rolls.get(id)
    }

    pub fn num_rolls(&self) -> usize {
        self.rolls.len()
    }

    /// All roll identifiers, sorted.
    pub fn det_ids(&self) -> Vec<GemDetId> {
        let mut ids: Vec<GemDetId> = self.rolls.keys().copied().collect();
        ids.sort();
        ids
    }

    fn require_roll(&self, id: &GemDetId) -> Result<&PlanarRoll> {
        self.rolls
            .get(id)
            .ok_or(ValidationError::UnknownComponentKey {
                key: id.roll_key(),
                tag: None,
            })
    }
}

impl GeometryService for PlanarGeometry {
    fn component_exists(&self, id: &GemDetId) -> bool {
        self.rolls.contains_key(id)
    }

    fn to_global(&self, id: &GemDetId, local: &LocalPoint) -> Result<GlobalPoint> {
        Ok(self.require_roll(id)?.to_global(local))
    }

    fn fired_channel(&self, id: &GemDetId, local: &LocalPoint) -> Result<i32> {
        Ok(self.require_roll(id)?.strip(local))
    }

    fn enumerate_keys(&self) -> Vec<ComponentKey> {
        let mut keys: Vec<ComponentKey> = self.rolls.keys().map(|id| id.roll_key()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    fn station_layout(&self, region: i32, station: i32) -> Option<StationLayout> {
        self.layouts.get(&(region, station)).cloned()
    }
}
