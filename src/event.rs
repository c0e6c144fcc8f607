//! Per-event input records.

use std::collections::BTreeMap;

use nalgebra::{Matrix2, Vector3};

use crate::detid::GemDetId;
use crate::LocalPoint;

/// A simulated energy deposit in one roll.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedHit {
    pub det_id: GemDetId,
    /// Entry point in the roll-local frame (cm).
    pub local: LocalPoint,
    /// PDG particle id (signed).
    pub particle_type: i32,
    /// Deposited energy (GeV).
    pub energy_loss: f64,
    /// Time of flight (ns).
    pub tof: f64,
    /// Simulated track that left the hit, if known.
    pub track_id: Option<u32>,
}

impl SimulatedHit {
    pub fn is_muon(&self, muon_pdg_id: i32) -> bool {
        self.particle_type.abs() == muon_pdg_id
    }
}

/// A simulated particle track. Its hits are the simulated hits carrying its `track_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedTrack {
    pub track_id: u32,
    /// PDG particle id (signed).
    pub particle_type: i32,
    /// Momentum at the vertex (GeV).
    pub momentum: Vector3<f64>,
}

impl SimulatedTrack {
    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.momentum.x.hypot(self.momentum.y)
    }
}

/// A contiguous run of fired strips in one roll.
///
/// Digis are clusters of size 1 with no position.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedCluster {
    pub det_id: GemDetId,
    /// First fired strip (1-based).
    pub first_channel: i32,
    /// Number of consecutive fired strips, at least 1.
    pub size: u32,
    /// Reconstructed position in the roll-local frame.
    pub local: Option<LocalPoint>,
    /// Local position covariance; variances on the diagonal.
    pub position_error: Option<Matrix2<f64>>,
}

impl ReconstructedCluster {
    /// A size-1 cluster without position, as produced by the digitizer.
    pub fn digi(det_id: GemDetId, channel: i32) -> Self {
        Self {
            det_id,
            first_channel: channel,
            size: 1,
            local: None,
            position_error: None,
        }
    }

    /// Last fired strip, inclusive.
    pub fn last_channel(&self) -> i32 {
        self.first_channel + self.size.max(1) as i32 - 1
    }

    pub fn contains(&self, channel: i32) -> bool {
        channel >= self.first_channel && channel <= self.last_channel()
    }
}

/// Clusters of one event grouped by roll, each group sorted by first channel.
#[derive(Debug, Clone, Default)]
pub struct ClusterCollection {
    by_roll: BTreeMap<GemDetId, Vec<ReconstructedCluster>>,
}

impl ClusterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cluster. Clusters with equal first channel keep insertion order.
    pub fn push(&mut self, cluster: ReconstructedCluster) {
        let group = self.by_roll.entry(cluster.det_id).or_default();
        let pos = group.partition_point(|c| c.first_channel <= cluster.first_channel);
        group.insert(pos, cluster);
    }

    /// Clusters of one roll; empty if the roll had none.
    pub fn for_det(&self, id: &GemDetId) -> &[ReconstructedCluster] {
        self.by_roll.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of clusters.
    pub fn len(&self) -> usize {
        self.by_roll.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_roll.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReconstructedCluster> {
        self.by_roll.values().flatten()
    }
}

impl FromIterator<ReconstructedCluster> for ClusterCollection {
    fn from_iter<I: IntoIterator<Item = ReconstructedCluster>>(iter: I) -> Self {
        let mut collection = Self::new();
        for c in iter {
            collection.push(c);
        }
        collection
    }
}

/// Everything the validation needs from one event.
#[derive(Debug, Clone, Default)]
pub struct EventData {
    pub sim_hits: Vec<SimulatedHit>,
    pub clusters: ClusterCollection,
    /// Simulated tracks; may be empty when only hit-level validation is wanted.
    pub tracks: Vec<SimulatedTrack>,
}
