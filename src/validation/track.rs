//! Track-level efficiency over the two layers of a station.
//!
//! A selected simulated track contributes once per station it crosses. The
//! station total is filled with the track's |η|; each [`LayerCombination`] the
//! track satisfies fills the matching counter, so the four efficiencies share
//! one denominator.

use std::collections::BTreeMap;

use crate::detid::{ComponentKey, NUM_LAYERS};
use crate::tag::AccumulatorTag;

/// Layer requirement for a track to count as found in a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerCombination {
    Layer1,
    Layer2,
    Either,
    Both,
}

impl LayerCombination {
    pub const ALL: [LayerCombination; 4] = [Self::Layer1, Self::Layer2, Self::Either, Self::Both];

    /// `true` if a track found in `layers` (layer 1, layer 2) satisfies the combination.
    pub fn accepts(self, layers: [bool; 2]) -> bool {
        match self {
            Self::Layer1 => layers[0],
            Self::Layer2 => layers[1],
            Self::Either => layers[0] || layers[1],
            Self::Both => layers[0] && layers[1],
        }
    }

    /// Matched counter filled for tracks satisfying the combination.
    pub fn tag(self) -> AccumulatorTag {
        match self {
            Self::Layer1 => AccumulatorTag::TrackMatchedEtaLayer1,
            Self::Layer2 => AccumulatorTag::TrackMatchedEtaLayer2,
            Self::Either => AccumulatorTag::TrackMatchedEtaEither,
            Self::Both => AccumulatorTag::TrackMatchedEtaBoth,
        }
    }
}

/// Stations a track crossed, each with the layers (1, 2) it was found in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackLayers {
    stations: BTreeMap<ComponentKey, [bool; 2]>,
}

impl TrackLayers {
    /// Note a hit of the track in `layer` of `station`.
    pub fn record(&mut self, station: ComponentKey, layer: i32, matched: bool) {
        let Some(i) = usize::try_from(layer - 1)
            .ok()
            .filter(|&i| i < NUM_LAYERS as usize)
        else {
            return;
        };
        self.stations.entry(station).or_default()[i] |= matched;
    }

    /// Stations in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ComponentKey, &[bool; 2])> {
        self.stations.iter()
    }
}
