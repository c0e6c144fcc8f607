//! Coordinate-to-bin mapping for detector occupancy maps.
//!
//! The detector occupancy of a station is a 2-D map: the X axis interleaves the
//! two layers of every chamber (chamber 1 layer 1, chamber 1 layer 2, chamber 2
//! layer 1, ...) and the Y axis is the roll number. Adjacent X bins are
//! physically adjacent layers of the same chamber.

use crate::detid::{GemDetId, NUM_LAYERS};
use crate::error::{Result, ValidationError};
use crate::geometry::StationLayout;
use crate::histogram::{Axis, MAX_AXIS_BINS};

/// Discrete occupancy coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyBin {
    pub x: i32,
    pub y: i32,
}

/// X bin for a (chamber, layer) pair: `2 * (chamber - 1) + (layer - 1)`.
///
/// (1, 1) maps to 0 and the value grows by 2 per chamber. Chamber numbers whose
/// bin does not fit in an `i32` are rejected.
pub fn occupancy_bin_x(chamber_id: i32, layer_id: i32) -> Result<i32> {
    if chamber_id < 1 {
        return Err(ValidationError::InvalidGeometryIndex {
            field: "chamber",
            value: chamber_id,
        });
    }
    if !(1..=NUM_LAYERS).contains(&layer_id) {
        return Err(ValidationError::InvalidGeometryIndex {
            field: "layer",
            value: layer_id,
        });
    }
    (chamber_id - 1)
        .checked_mul(NUM_LAYERS)
        .and_then(|x| x.checked_add(layer_id - 1))
        .ok_or(ValidationError::InvalidGeometryIndex {
            field: "chamber",
            value: chamber_id,
        })
}

/// Y bin is the roll number itself.
pub fn occupancy_bin_y(roll_id: i32) -> Result<i32> {
    if roll_id < 1 {
        return Err(ValidationError::InvalidGeometryIndex {
            field: "roll",
            value: roll_id,
        });
    }
    Ok(roll_id)
}

impl OccupancyBin {
    pub fn from_det_id(id: &GemDetId) -> Result<Self> {
        Ok(Self {
            x: occupancy_bin_x(id.chamber(), id.layer())?,
            y: occupancy_bin_y(id.roll())?,
        })
    }
}

/// X axis of a station's occupancy map: one unit bin per (chamber, layer), centered on integers.
pub fn detector_x_axis(layout: &StationLayout) -> Result<Axis> {
    let n = (layout.num_chambers.max(1) as usize).saturating_mul(NUM_LAYERS as usize);
    Axis::uniform(n, -0.5, n as f64 - 0.5)
}

/// Y axis of a station's occupancy map: one unit bin per roll, centered on 1..=num_rolls.
pub fn detector_y_axis(layout: &StationLayout) -> Result<Axis> {
    let n = layout.num_rolls.max(1) as usize;
    Axis::uniform(n, 0.5, n as f64 + 0.5)
}

/// Strip-number axis: one bin per strip, centered on 1..=num_strips.
pub fn strip_axis(layout: &StationLayout) -> Result<Axis> {
    let n = layout.num_strips.max(1) as usize;
    Axis::uniform(n, 0.5, n as f64 + 0.5)
}

/// |z| axis for a Z–R occupancy spanning several stations.
///
/// Each station window `[zmin - 1, zmax + 1]` is covered in `step` cm bins; the
/// empty space between windows becomes a single wide bin. `step` must be positive
/// and finite.
pub fn zr_z_axis(layouts: &[StationLayout], step: f64) -> Result<Axis> {
    if !(step.is_finite() && step > 0.0) {
        return Err(ValidationError::BinningMismatch(format!(
            "Z-R step must be positive, got {}",
            step
        )));
    }
    let mut windows: Vec<(f64, f64)> = layouts
        .iter()
        .map(|l| (l.abs_z_range.0 - 1.0, l.abs_z_range.1 + 1.0))
        .collect();
    windows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut edges: Vec<f64> = Vec::new();
    for (lo, hi) in windows {
        let n = ((hi - lo) / step).ceil().max(1.0);
        if !(n <= MAX_AXIS_BINS as f64) {
            return Err(ValidationError::BinningMismatch(format!(
                "Z-R window [{}, {}] needs {} bins of {} cm",
                lo, hi, n, step
            )));
        }
        let n = n as usize;
        for i in 0..=n {
            let e = lo + i as f64 * step;
            if edges.last().map_or(true, |&last| e > last) {
                edges.push(e);
            }
        }
    }
    Axis::variable(edges)
}
