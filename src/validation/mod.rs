//! Per-run aggregation: booking, per-event filling and end-of-run harvest.
//!
//! A [`ValidationRun`] moves forward through four phases:
//!
//! 1. **Booking**: [`ValidationRun::book`] enumerates the detector keys once
//!    from the geometry and books every accumulator the configuration asks for.
//! 2. **Processing**: [`ValidationRun::process_event`] matches every simulated
//!    hit against the clusters of its roll and updates the booked counters.
//!    Selected simulated tracks then fill the per-station layer combinations.
//!    An event either applies completely or, on error, not at all.
//! 3. **Harvesting**: [`ValidationRun::on_run_end`] publishes the raw counters
//!    and the efficiencies derived from them to a [`Sink`](crate::Sink).
//! 4. **Closed**: nothing more can be done with the run.
//!
//! Runs that process disjoint shards of one event stream are combined with
//! [`ValidationRun::finish`] and [`RunSnapshot::merge`]: raw counts are summed
//! first and efficiencies computed once from the sum.

pub mod harvest;
pub mod run;
pub mod snapshot;
pub mod track;

pub use harvest::HarvestSummary;
pub use run::ValidationRun;
pub use snapshot::RunSnapshot;
pub use track::LayerCombination;

use crate::error::{Result, ValidationError};
use crate::histogram::Axis;
use crate::matcher::ClosestCandidate;

// ── Run phase ───────────────────────────────────────────────────────────────

/// Lifecycle phase of a [`ValidationRun`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    Booking,
    Processing,
    Harvesting,
    Closed,
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Uniform binning: `nbins` bins over `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinSpec {
    pub nbins: usize,
    pub lo: f64,
    pub hi: f64,
}

impl BinSpec {
    pub const fn new(nbins: usize, lo: f64, hi: f64) -> Self {
        Self { nbins, lo, hi }
    }

    pub fn axis(&self) -> Result<Axis> {
        Axis::uniform(self.nbins, self.lo, self.hi)
    }
}

/// Parameters controlling what is booked and which hits are accepted.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Only accept simulated hits from muons. Default true.
    pub muon_only: bool,
    /// |PDG id| treated as a muon. Default 13.
    pub muon_pdg_id: i32,
    /// Book per-layer detail accumulators (residuals, pulls, cluster size,
    /// near-miss distance, X–Y occupancy). Default true.
    pub detail_plots: bool,
    /// Confidence level of the efficiency intervals. Default 0.683.
    pub confidence_level: f64,
    /// |η| occupancy binning, per region. Default 51 bins over [0, 4).
    pub eta: BinSpec,
    /// φ occupancy binning (rad), per station. Default 51 bins over [-π, π).
    pub phi: BinSpec,
    /// Local residual binning (cm). Default 100 bins over [-5, 5).
    pub residual: BinSpec,
    /// Pull binning. Default 100 bins over [-50, 50).
    pub pull: BinSpec,
    /// Cluster size binning. Default 11 bins over [-0.5, 10.5).
    pub cluster_size: BinSpec,
    /// Signed near-miss distance binning (strips). Default 81 bins over [-40.5, 40.5).
    pub match_distance: BinSpec,
    /// Number of time-of-flight bins. Default 40.
    pub tof_bins: usize,
    /// Time-of-flight window (ns) per station, indexed by `station - 1`.
    /// Stations without a window get no TOF accumulator.
    /// Default `[(18, 22), (26, 30)]`.
    pub tof_ranges: Vec<(f64, f64)>,
    /// Energy loss binning (eV), per station. Default 60 bins over [0, 6000).
    pub energy_loss: BinSpec,
    /// Scale applied to the simulated energy loss before filling. Default 1e9 (GeV → eV).
    pub energy_loss_scale: f64,
    /// Bins per axis of the X–Y occupancy. Default 360.
    pub xy_bins: usize,
    /// Radial bins of the Z–R occupancy. Default 110.
    pub zr_r_bins: usize,
    /// |z| bin width of the Z–R occupancy (cm). Default 0.25.
    pub zr_z_step: f64,
    /// Book per-station track efficiencies for the layer combinations. Default true.
    pub track_plots: bool,
    /// Minimum transverse momentum (GeV) of a simulated muon track. Default 5.
    pub track_min_pt: f64,
    /// Track |η| binning, per station. Default 101 bins over [0, 3).
    pub track_eta: BinSpec,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        use std::f64::consts::PI;
        Self {
            muon_only: true,
            muon_pdg_id: 13,
            detail_plots: true,
            confidence_level: crate::efficiency::DEFAULT_CONFIDENCE_LEVEL,
            eta: BinSpec::new(51, 0.0, 4.0),
            phi: BinSpec::new(51, -PI, PI),
            residual: BinSpec::new(100, -5.0, 5.0),
            pull: BinSpec::new(100, -50.0, 50.0),
            cluster_size: BinSpec::new(11, -0.5, 10.5),
            match_distance: BinSpec::new(81, -40.5, 40.5),
            tof_bins: 40,
            tof_ranges: vec![(18.0, 22.0), (26.0, 30.0)],
            energy_loss: BinSpec::new(60, 0.0, 6000.0),
            energy_loss_scale: 1e9,
            xy_bins: 360,
            zr_r_bins: 110,
            zr_z_step: 0.25,
            track_plots: true,
            track_min_pt: 5.0,
            track_eta: BinSpec::new(101, 0.0, 3.0),
        }
    }
}

impl ValidationConfig {
    /// Check every binning and threshold before anything is booked.
    pub fn validate(&self) -> Result<()> {
        let binned = [
            ("eta", &self.eta),
            ("phi", &self.phi),
            ("residual", &self.residual),
            ("pull", &self.pull),
            ("cluster_size", &self.cluster_size),
            ("match_distance", &self.match_distance),
            ("energy_loss", &self.energy_loss),
            ("track_eta", &self.track_eta),
        ];
        for (field, spec) in binned {
            spec.axis()
                .map_err(|e| ValidationError::InvalidConfig(format!("{}: {}", field, e)))?;
        }
        for (i, &(lo, hi)) in self.tof_ranges.iter().enumerate() {
            Axis::uniform(self.tof_bins, lo, hi).map_err(|e| {
                ValidationError::InvalidConfig(format!("tof_ranges[{}]: {}", i, e))
            })?;
        }
        for (field, nbins) in [("xy_bins", self.xy_bins), ("zr_r_bins", self.zr_r_bins)] {
            if nbins == 0 || nbins > crate::histogram::MAX_AXIS_BINS {
                return Err(ValidationError::InvalidConfig(format!(
                    "{} must be in 1..={}, got {}",
                    field,
                    crate::histogram::MAX_AXIS_BINS,
                    nbins
                )));
            }
        }
        if !(self.zr_z_step.is_finite() && self.zr_z_step > 0.0) {
            return Err(ValidationError::InvalidConfig(format!(
                "zr_z_step must be positive, got {}",
                self.zr_z_step
            )));
        }
        if !self.energy_loss_scale.is_finite() {
            return Err(ValidationError::InvalidConfig(format!(
                "energy_loss_scale must be finite, got {}",
                self.energy_loss_scale
            )));
        }
        if self.track_min_pt.is_nan() {
            return Err(ValidationError::InvalidConfig("track_min_pt is NaN".to_string()));
        }
        Ok(())
    }

    /// TOF window of a station, if configured.
    pub fn tof_range(&self, station: i32) -> Option<(f64, f64)> {
        usize::try_from(station - 1)
            .ok()
            .and_then(|i| self.tof_ranges.get(i).copied())
    }
}

// ── Outcomes ────────────────────────────────────────────────────────────────

/// Why a simulated hit contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Rejected by the particle filter.
    ParticleType,
    /// The hit's roll is not part of the geometry.
    OutsideGeometry,
    /// A required accumulator was never booked for the hit's keys.
    UnbookedKey,
}

/// Result of processing one simulated hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitOutcome {
    Matched {
        /// Index of the matched cluster among the candidates.
        cluster_index: usize,
    },
    Unmatched {
        closest: Option<ClosestCandidate>,
    },
    Skipped(SkipReason),
}

/// Per-event hit counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub skipped: usize,
    /// Selected tracks that filled at least one station.
    pub tracks: usize,
}

impl EventSummary {
    fn record(&mut self, outcome: &HitOutcome) {
        match outcome {
            HitOutcome::Matched { .. } => self.matched += 1,
            HitOutcome::Unmatched { .. } => self.unmatched += 1,
            HitOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Totals over every event processed by a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub events: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub skipped: u64,
    pub tracks: u64,
}

impl RunStats {
    fn add(&mut self, summary: &EventSummary) {
        self.events += 1;
        self.matched += summary.matched as u64;
        self.unmatched += summary.unmatched as u64;
        self.skipped += summary.skipped as u64;
        self.tracks += summary.tracks as u64;
    }
}
