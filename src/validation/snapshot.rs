//! Raw-count snapshots of a run, for merging shards before estimation.

use std::collections::HashMap;

use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::detid::ComponentKey;
use crate::efficiency::EfficiencyEstimator;
use crate::error::{Result, ValidationError};
use crate::histogram::Accumulator;
use crate::index::AccumulatorIndex;
use crate::sink::Sink;
use crate::tag::AccumulatorTag;

use super::harvest::{harvest_index, HarvestSummary};
use super::RunStats;

/// Booked keys and raw counters of a processed run, serializable with rkyv.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// (key, tag) of every accumulator, in booking order.
    pub entries: Vec<(ComponentKey, AccumulatorTag)>,
    pub accumulators: Vec<Accumulator>,
    pub events: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub skipped: u64,
    pub tracks: u64,
}

impl RunSnapshot {
    pub(crate) fn from_index(index: AccumulatorIndex, stats: RunStats) -> Self {
        let (entries, accumulators) = index.into_parts();
        Self {
            entries,
            accumulators,
            events: stats.events,
            matched: stats.matched,
            unmatched: stats.unmatched,
            skipped: stats.skipped,
            tracks: stats.tracks,
        }
    }

    /// Run totals as seen by the shard (or the merged shards).
    pub fn stats(&self) -> RunStats {
        RunStats {
            events: self.events,
            matched: self.matched,
            unmatched: self.unmatched,
            skipped: self.skipped,
            tracks: self.tracks,
        }
    }

    /// Booked accumulator for (key, tag), if any.
    pub fn accumulator(&self, key: &ComponentKey, tag: AccumulatorTag) -> Option<&Accumulator> {
        self.entries
            .iter()
            .position(|(k, t)| k == key && *t == tag)
            .map(|i| &self.accumulators[i])
    }

    /// Every entry must have exactly one accumulator.
    fn check_shape(&self) -> Result<()> {
        if self.entries.len() == self.accumulators.len() {
            Ok(())
        } else {
            Err(ValidationError::BinningMismatch(format!(
                "snapshot has {} entries for {} accumulators",
                self.entries.len(),
                self.accumulators.len()
            )))
        }
    }

    /// Add the raw counts of another shard, bin by bin.
    ///
    /// Both shards must have booked the same (key, tag) set with identical binning.
    /// On error `self` is left unchanged.
    pub fn merge(&mut self, other: &RunSnapshot) -> Result<()> {
        self.check_shape()?;
        other.check_shape()?;
        if self.entries.len() != other.entries.len() {
            return Err(ValidationError::BinningMismatch(format!(
                "shards booked {} and {} accumulators",
                self.entries.len(),
                other.entries.len()
            )));
        }
        let mut merged = self.accumulators.clone();
        if self.entries == other.entries {
            for (a, b) in merged.iter_mut().zip(&other.accumulators) {
                a.merge(b)?;
            }
        } else {
            let position: HashMap<(ComponentKey, AccumulatorTag), usize> = other
                .entries
                .iter()
                .enumerate()
                .map(|(i, e)| (*e, i))
                .collect();
            for (acc, entry) in merged.iter_mut().zip(&self.entries) {
                let j = *position.get(entry).ok_or(ValidationError::UnknownComponentKey {
                    key: entry.0,
                    tag: Some(entry.1),
                })?;
                acc.merge(&other.accumulators[j])?;
            }
        }
        self.accumulators = merged;
        self.events += other.events;
        self.matched += other.matched;
        self.unmatched += other.unmatched;
        self.skipped += other.skipped;
        self.tracks += other.tracks;
        Ok(())
    }

    /// Merge a sequence of shards into one snapshot. `None` for an empty sequence.
    pub fn merge_all<I: IntoIterator<Item = RunSnapshot>>(shards: I) -> Result<Option<RunSnapshot>> {
        let mut iter = shards.into_iter();
        let Some(mut merged) = iter.next() else {
            return Ok(None);
        };
        for shard in iter {
            merged.merge(&shard)?;
        }
        Ok(Some(merged))
    }

    /// Publish the counters and the efficiencies computed from them.
    pub fn harvest(&self, sink: &mut dyn Sink, estimator: &EfficiencyEstimator) -> Result<HarvestSummary> {
        self.check_shape()?;
        let index = AccumulatorIndex::from_parts(self.entries.clone(), self.accumulators.clone())?;
        info!("Harvesting snapshot of {} events", self.events);
        harvest_index(&index, estimator, sink)
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Serialize to rkyv bytes.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Deserialize from rkyv bytes. The input need not be aligned.
    pub fn from_rkyv_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))
    }

    /// Save the snapshot to a file using rkyv.
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)?;
        info!("Saved run snapshot to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a snapshot written by [`save_to_file`](Self::save_to_file).
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let snapshot = Self::from_rkyv_bytes(&bytes)?;
        info!(
            "Loaded run snapshot from {}: {} accumulators, {} events",
            path.display(),
            snapshot.accumulators.len(),
            snapshot.events
        );
        Ok(snapshot)
    }
}
