//! # gemval
//!
//! Keyed aggregation, hit matching and **efficiency estimation** for the validation
//! of GEM (Gas Electron Multiplier) muon detectors.
//!
//! Given simulated hits and reconstructed clusters event by event, `gemval` fills
//! occupancy, residual and pull counters keyed by detector component, and at the
//! end of the run turns matched/total counts into efficiency profiles with exact
//! Clopper–Pearson intervals.
//!
//! ## Features
//!
//! - **Composite key index**: one sparse (region, station, layer, roll) index
//!   over every accumulator of the run, booked once from the geometry
//! - **Strip-range matching**: a hit matches the first cluster whose strip range
//!   contains its fired strip; misses report a signed distance to the closest cluster
//! - **Track efficiency**: per station, simulated muon tracks found in layer 1,
//!   layer 2, either layer or both layers share one track denominator
//! - **Exact intervals**: Clopper–Pearson bounds from the Beta quantile, plus a
//!   symmetrized error for plotting
//! - **Sharding**: per-shard raw counts merge exactly before estimation; snapshots
//!   serialize with [rkyv](https://docs.rs/rkyv)
//!
//! ## Example
//!
//! ```no_run
//! use gemval::{
//!     EventData, MemorySink, PlanarGeometry, RingSpec, ValidationConfig, ValidationRun,
//! };
//!
//! let geometry = PlanarGeometry::from_rings(&[RingSpec::ge11(), RingSpec::ge21()]).unwrap();
//! let config = ValidationConfig {
//!     detail_plots: false,
//!     ..Default::default()
//! };
//!
//! let mut run = ValidationRun::new(&geometry, config).unwrap();
//! run.book().unwrap();
//!
//! let events: Vec<EventData> = Vec::new(); // from the host's event source
//! for event in &events {
//!     run.process_event(event).unwrap();
//! }
//!
//! let mut sink = MemorySink::new();
//! let summary = run.on_run_end(&mut sink).unwrap();
//! println!("{} efficiency profiles", summary.efficiencies);
//! let eff = sink.efficiency("eff_matched_occ_eta_re1").unwrap();
//! println!("{:?}", eff.bin(10));
//! ```
//!
//! ## Processing overview
//!
//! 1. **Booking**: the geometry enumerates its roll keys; region, station and
//!    layer keys are derived from them and every accumulator is booked and sealed
//! 2. **Mapping**: each simulated hit is transformed to global coordinates and
//!    to its (chamber/layer, roll) occupancy bin
//! 3. **Matching**: the hit's fired strip is matched against the clusters of
//!    the same roll
//! 4. **Tracks**: each selected simulated track records which layers of each
//!    station it was found in
//! 5. **Harvest**: counters and the efficiencies of every total/matched pair are
//!    published to a [`Sink`]

pub mod detid;
pub mod efficiency;
pub mod error;
pub mod event;
pub mod geometry;
pub mod histogram;
pub mod index;
pub mod matcher;
pub mod occupancy;
pub mod sink;
pub mod tag;
pub mod validation;

pub use detid::{ComponentKey, GemDetId};
pub use efficiency::{
    clopper_pearson, ConfidenceInterval, EfficiencyBin, EfficiencyEstimator, EfficiencyProfile,
};
pub use error::{Result, ValidationError};
pub use event::{ClusterCollection, EventData, ReconstructedCluster, SimulatedHit, SimulatedTrack};
pub use geometry::{GeometryService, GlobalCoordinates, PlanarGeometry, RingSpec, StationLayout};
pub use histogram::{Accumulator, Axis, Histogram1D, Histogram2D};
pub use index::{AccumulatorHandle, AccumulatorIndex};
pub use matcher::{match_clusters, MatchResult, Reference};
pub use occupancy::{occupancy_bin_x, occupancy_bin_y, OccupancyBin};
pub use sink::{CsvSink, MemorySink, Sink, SinkItem};
pub use tag::AccumulatorTag;
pub use validation::{
    HarvestSummary, HitOutcome, LayerCombination, RunPhase, RunSnapshot, ValidationConfig,
    ValidationRun,
};

// Commonly used types
/// Position in a roll's local frame (cm).
pub type LocalPoint = nalgebra::Point2<f64>;
/// Position in the global detector frame (cm).
pub type GlobalPoint = nalgebra::Point3<f64>;
/// Per-bin (passed or total) counts fed to the efficiency estimator.
pub type PerBinCounts = Histogram1D;
