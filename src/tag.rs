//! Semantic tags naming what an accumulator holds.

use rkyv::{Archive, Deserialize, Serialize};

/// What an accumulator measures. Together with a [`ComponentKey`](crate::ComponentKey)
/// it identifies one accumulator of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, Serialize, Deserialize)]
pub enum AccumulatorTag {
    /// |η| of every accepted simulated hit ("total").
    SimOccupancyEta,
    /// |η| of simulated hits with a matched cluster ("matched").
    MatchedOccupancyEta,
    SimOccupancyPhi,
    MatchedOccupancyPhi,
    /// Detector occupancy: (chamber/layer bin, roll).
    SimOccupancyDet,
    MatchedOccupancyDet,
    /// Fired strip number of the simulated hit.
    SimOccupancyStrip,
    MatchedOccupancyStrip,
    TofMuon,
    EnergyLossMuon,
    /// (|z|, r) of matched clusters.
    RecOccupancyZR,
    /// (x, y) of matched clusters.
    RecOccupancyXY,
    ResidualX,
    ResidualY,
    PullX,
    PullY,
    ClusterSize,
    /// Signed channel distance to the closest cluster when nothing matched.
    MatchDistance,
    /// |η| of every selected simulated track crossing the station ("total").
    TrackEta,
    /// Tracks with a matched cluster in layer 1.
    TrackMatchedEtaLayer1,
    /// Tracks with a matched cluster in layer 2.
    TrackMatchedEtaLayer2,
    /// Tracks with a matched cluster in layer 1 or layer 2.
    TrackMatchedEtaEither,
    /// Tracks with a matched cluster in both layers.
    TrackMatchedEtaBoth,
}

impl AccumulatorTag {
    /// (total, matched) pairs that yield an efficiency at harvest.
    pub const EFFICIENCY_PAIRS: [(AccumulatorTag, AccumulatorTag); 8] = [
        (Self::SimOccupancyEta, Self::MatchedOccupancyEta),
        (Self::SimOccupancyPhi, Self::MatchedOccupancyPhi),
        (Self::SimOccupancyDet, Self::MatchedOccupancyDet),
        (Self::SimOccupancyStrip, Self::MatchedOccupancyStrip),
        (Self::TrackEta, Self::TrackMatchedEtaLayer1),
        (Self::TrackEta, Self::TrackMatchedEtaLayer2),
        (Self::TrackEta, Self::TrackMatchedEtaEither),
        (Self::TrackEta, Self::TrackMatchedEtaBoth),
    ];

    /// Compact code used when packing (key, tag) into the index.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Name prefix; combined with a key suffix it forms the published name.
    pub fn name(self) -> &'static str {
        match self {
            Self::SimOccupancyEta => "sim_occ_eta",
            Self::MatchedOccupancyEta => "matched_occ_eta",
            Self::SimOccupancyPhi => "sim_occ_phi",
            Self::MatchedOccupancyPhi => "matched_occ_phi",
            Self::SimOccupancyDet => "sim_occ_det",
            Self::MatchedOccupancyDet => "matched_occ_det",
            Self::SimOccupancyStrip => "sim_occ_strip",
            Self::MatchedOccupancyStrip => "matched_occ_strip",
            Self::TofMuon => "tof_muon",
            Self::EnergyLossMuon => "eloss_muon",
            Self::RecOccupancyZR => "rec_occ_zr",
            Self::RecOccupancyXY => "rec_occ_xy",
            Self::ResidualX => "residual_x",
            Self::ResidualY => "residual_y",
            Self::PullX => "pull_x",
            Self::PullY => "pull_y",
            Self::ClusterSize => "cls",
            Self::MatchDistance => "match_distance",
            Self::TrackEta => "track_eta",
            Self::TrackMatchedEtaLayer1 => "matched_track_eta_l1",
            Self::TrackMatchedEtaLayer2 => "matched_track_eta_l2",
            Self::TrackMatchedEtaEither => "matched_track_eta_l1or2",
            Self::TrackMatchedEtaBoth => "matched_track_eta_l1and2",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::SimOccupancyEta => "SimHit Eta Occupancy",
            Self::MatchedOccupancyEta => "Matched SimHit Eta Occupancy",
            Self::SimOccupancyPhi => "SimHit Phi Occupancy",
            Self::MatchedOccupancyPhi => "Matched SimHit Phi Occupancy",
            Self::SimOccupancyDet => "SimHit Occupancy",
            Self::MatchedOccupancyDet => "Matched SimHit Occupancy",
            Self::SimOccupancyStrip => "SimHit Strip Occupancy",
            Self::MatchedOccupancyStrip => "Matched SimHit Strip Occupancy",
            Self::TofMuon => "SimHit TOF (Muon only)",
            Self::EnergyLossMuon => "SimHit Energy Loss (Muon only)",
            Self::RecOccupancyZR => "RecHit ZR Occupancy",
            Self::RecOccupancyXY => "RecHit XY Occupancy",
            Self::ResidualX => "Residual Of X",
            Self::ResidualY => "Residual Of Y",
            Self::PullX => "Pull Of X",
            Self::PullY => "Pull Of Y",
            Self::ClusterSize => "ClusterSize Distribution",
            Self::MatchDistance => "Distance To Closest Cluster",
            Self::TrackEta => "SimTrack Eta",
            Self::TrackMatchedEtaLayer1 => "Matched SimTrack Eta (Layer 1)",
            Self::TrackMatchedEtaLayer2 => "Matched SimTrack Eta (Layer 2)",
            Self::TrackMatchedEtaEither => "Matched SimTrack Eta (Layer 1 or 2)",
            Self::TrackMatchedEtaBoth => "Matched SimTrack Eta (Layer 1 and 2)",
        }
    }
}
