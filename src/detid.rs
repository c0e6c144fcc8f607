//! Detector identifiers and the composite keys used to index accumulators.
//!
//! A [`GemDetId`] names one readout roll (eta partition) of one chamber.
//! Accumulators are not booked per chamber; they are booked per
//! [`ComponentKey`], a 1 to 4 level tuple of (region, station, layer, roll).
//! The depth of the key is part of its identity, so a station-level key never
//! compares equal to a layer-level key that happens to share its prefix.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{Result, ValidationError};

/// Highest station number known to the GEM system (GE1/1, GE2/1, ME0).
pub const MAX_STATION: i32 = 3;
/// Number of layers per super-chamber.
pub const NUM_LAYERS: i32 = 2;

fn check_region(region: i32) -> Result<i32> {
    if region == -1 || region == 1 {
        Ok(region)
    } else {
        Err(ValidationError::InvalidGeometryIndex {
            field: "region",
            value: region,
        })
    }
}

fn check_range(field: &'static str, value: i32, min: i32, max: i32) -> Result<i32> {
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(ValidationError::InvalidGeometryIndex { field, value })
    }
}

// ── Composite key ───────────────────────────────────────────────────────────

/// Composite integer key locating a detector element at one of four depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, Serialize, Deserialize)]
pub enum ComponentKey {
    Region(i32),
    Station(i32, i32),
    Layer(i32, i32, i32),
    Roll(i32, i32, i32, i32),
}

impl ComponentKey {
    /// Region-level key, validated.
    pub fn region(region: i32) -> Result<Self> {
        Ok(Self::Region(check_region(region)?))
    }

    /// Station-level key, validated.
    pub fn station(region: i32, station: i32) -> Result<Self> {
        Ok(Self::Station(
            check_region(region)?,
            check_range("station", station, 1, MAX_STATION)?,
        ))
    }

    /// Layer-level key, validated.
    pub fn layer(region: i32, station: i32, layer: i32) -> Result<Self> {
        Ok(Self::Layer(
            check_region(region)?,
            check_range("station", station, 1, MAX_STATION)?,
            check_range("layer", layer, 1, NUM_LAYERS)?,
        ))
    }

    /// Roll-level key, validated.
    pub fn roll(region: i32, station: i32, layer: i32, roll: i32) -> Result<Self> {
        Ok(Self::Roll(
            check_region(region)?,
            check_range("station", station, 1, MAX_STATION)?,
            check_range("layer", layer, 1, NUM_LAYERS)?,
            check_range("roll", roll, 1, i8::MAX as i32)?,
        ))
    }

    /// Number of components in the key (1 to 4).
    pub fn depth(&self) -> usize {
        match self {
            Self::Region(..) => 1,
            Self::Station(..) => 2,
            Self::Layer(..) => 3,
            Self::Roll(..) => 4,
        }
    }

    /// Key components in order, padded with zeros past `depth()`.
    pub fn components(&self) -> [i32; 4] {
        match *self {
            Self::Region(r) => [r, 0, 0, 0],
            Self::Station(r, s) => [r, s, 0, 0],
            Self::Layer(r, s, l) => [r, s, l, 0],
            Self::Roll(r, s, l, ro) => [r, s, l, ro],
        }
    }

    pub fn region_id(&self) -> i32 {
        self.components()[0]
    }

    /// Project onto the region level.
    pub fn region_key(&self) -> Self {
        Self::Region(self.region_id())
    }

    /// Project onto the station level. `None` for a region key.
    pub fn station_key(&self) -> Option<Self> {
        let [r, s, _, _] = self.components();
        (self.depth() >= 2).then_some(Self::Station(r, s))
    }

    /// Project onto the layer level. `None` for region and station keys.
    pub fn layer_key(&self) -> Option<Self> {
        let [r, s, l, _] = self.components();
        (self.depth() >= 3).then_some(Self::Layer(r, s, l))
    }

    /// Histogram name suffix, e.g. `_re1_st1_la2_ro3`.
    pub fn name_suffix(&self) -> String {
        match *self {
            Self::Region(r) => format!("_re{}", r),
            Self::Station(r, s) => format!("_re{}_st{}", r, s),
            Self::Layer(r, s, l) => format!("_re{}_st{}_la{}", r, s, l),
            Self::Roll(r, s, l, ro) => format!("_re{}_st{}_la{}_ro{}", r, s, l, ro),
        }
    }

    /// Histogram title suffix, e.g. ` Region 1 Station 1 Layer 2 Roll 3`.
    pub fn title_suffix(&self) -> String {
        match *self {
            Self::Region(r) => format!(" Region {}", r),
            Self::Station(r, s) => format!(" Region {} Station {}", r, s),
            Self::Layer(r, s, l) => format!(" Region {} Station {} Layer {}", r, s, l),
            Self::Roll(r, s, l, ro) => {
                format!(" Region {} Station {} Layer {} Roll {}", r, s, l, ro)
            }
        }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.components();
        write!(f, "(")?;
        for (i, v) in c[..self.depth()].iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

// ── Full detector identifier ────────────────────────────────────────────────

/// Identifier of a single readout roll: region, station, layer, chamber, roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GemDetId {
    region: i32,
    station: i32,
    layer: i32,
    chamber: i32,
    roll: i32,
}

impl GemDetId {
    /// Build a validated identifier. Chamber and roll numbering is 1-based.
    pub fn new(region: i32, station: i32, layer: i32, chamber: i32, roll: i32) -> Result<Self> {
        Ok(Self {
            region: check_region(region)?,
            station: check_range("station", station, 1, MAX_STATION)?,
            layer: check_range("layer", layer, 1, NUM_LAYERS)?,
            chamber: check_range("chamber", chamber, 1, i32::MAX)?,
            roll: check_range("roll", roll, 1, i8::MAX as i32)?,
        })
    }

    pub fn region(&self) -> i32 {
        self.region
    }

    pub fn station(&self) -> i32 {
        self.station
    }

    pub fn layer(&self) -> i32 {
        self.layer
    }

    pub fn chamber(&self) -> i32 {
        self.chamber
    }

    pub fn roll(&self) -> i32 {
        self.roll
    }

    pub fn region_key(&self) -> ComponentKey {
        ComponentKey::Region(self.region)
    }

    pub fn station_key(&self) -> ComponentKey {
        ComponentKey::Station(self.region, self.station)
    }

    pub fn layer_key(&self) -> ComponentKey {
        ComponentKey::Layer(self.region, self.station, self.layer)
    }

    pub fn roll_key(&self) -> ComponentKey {
        ComponentKey::Roll(self.region, self.station, self.layer, self.roll)
    }
}

impl fmt::Display for GemDetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GEM re{} st{} la{} ch{} ro{}",
            self.region, self.station, self.layer, self.chamber, self.roll
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_is_part_of_identity() {
        let station = ComponentKey::station(1, 1).unwrap();
        let layer = ComponentKey::layer(1, 1, 1).unwrap();
        assert_ne!(station, layer);
        assert_eq!(layer.station_key(), Some(station));
        assert_eq!(station.layer_key(), None);
        assert_eq!(layer.region_key(), ComponentKey::Region(1));
    }

    #[test]
    fn test_suffixes() {
        let key = ComponentKey::roll(-1, 2, 1, 8).unwrap();
        assert_eq!(key.name_suffix(), "_re-1_st2_la1_ro8");
        assert_eq!(key.title_suffix(), " Region -1 Station 2 Layer 1 Roll 8");
        assert_eq!(ComponentKey::Region(1).name_suffix(), "_re1");
        assert_eq!(key.to_string(), "(-1, 2, 1, 8)");
    }

    #[test]
    fn test_invalid_indices() {
        assert!(matches!(
            ComponentKey::region(0),
            Err(ValidationError::InvalidGeometryIndex { field: "region", value: 0 })
        ));
        assert!(ComponentKey::station(1, 4).is_err());
        assert!(ComponentKey::layer(1, 1, 3).is_err());
        assert!(GemDetId::new(1, 1, 1, 0, 1).is_err());
        assert!(GemDetId::new(1, 1, 1, 1, 0).is_err());
    }

    #[test]
    fn test_detid_projections() {
        let id = GemDetId::new(1, 1, 2, 7, 3).unwrap();
        assert_eq!(id.station_key(), ComponentKey::Station(1, 1));
        assert_eq!(id.roll_key(), ComponentKey::Roll(1, 1, 2, 3));
        assert_eq!(id.roll_key().layer_key(), Some(id.layer_key()));
    }
}
