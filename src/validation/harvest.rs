//! End-of-run publication of counters and derived efficiencies.

use tracing::{debug, info};

use crate::detid::ComponentKey;
use crate::efficiency::{EfficiencyEstimator, EfficiencyProfile};
use crate::error::{Result, ValidationError};
use crate::histogram::Accumulator;
use crate::index::AccumulatorIndex;
use crate::sink::{Sink, SinkItem};
use crate::tag::AccumulatorTag;

/// What a harvest published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Raw accumulators published.
    pub counters: usize,
    /// Efficiency profiles published.
    pub efficiencies: usize,
    /// Clamped bins summed over all profiles.
    pub inconsistencies: usize,
}

/// Published name of an accumulator, e.g. `matched_occ_det_re1_st1`.
pub fn accumulator_name(key: &ComponentKey, tag: AccumulatorTag) -> String {
    format!("{}{}", tag.name(), key.name_suffix())
}

/// Published title of an accumulator, e.g. `Matched SimHit Occupancy Region 1 Station 1`.
pub fn accumulator_title(key: &ComponentKey, tag: AccumulatorTag) -> String {
    format!("{}{}", tag.title(), key.title_suffix())
}

/// Published name of the efficiency derived from a matched accumulator.
pub fn efficiency_name(key: &ComponentKey, matched: AccumulatorTag) -> String {
    format!("eff_{}", accumulator_name(key, matched))
}

pub fn efficiency_title(key: &ComponentKey, matched: AccumulatorTag) -> String {
    format!("Efficiency of {}", accumulator_title(key, matched))
}

fn publish(sink: &mut dyn Sink, name: &str, title: &str, item: SinkItem<'_>) -> Result<()> {
    sink.publish(name, title, item)
        .map_err(|source| ValidationError::Sink {
            name: name.to_string(),
            source,
        })
}

fn profile_of(
    estimator: &EfficiencyEstimator,
    passed: &Accumulator,
    total: &Accumulator,
) -> Result<EfficiencyProfile> {
    match (passed, total) {
        (Accumulator::H1(p), Accumulator::H1(t)) => estimator.compute(p, t),
        (Accumulator::H2(p), Accumulator::H2(t)) => estimator.compute_2d(p, t),
        _ => Err(ValidationError::BinningMismatch(
            "passed and total accumulators have different dimensions".to_string(),
        )),
    }
}

/// Publish every accumulator of `index`, then one efficiency per booked
/// (total, matched) pair.
pub fn harvest_index(
    index: &AccumulatorIndex,
    estimator: &EfficiencyEstimator,
    sink: &mut dyn Sink,
) -> Result<HarvestSummary> {
    let mut summary = HarvestSummary::default();

    for (key, tag, acc) in index.iter() {
        let (name, title) = (accumulator_name(key, tag), accumulator_title(key, tag));
        match acc {
            Accumulator::H1(h) => publish(sink, &name, &title, SinkItem::Counts1D(h))?,
            Accumulator::H2(h) => publish(sink, &name, &title, SinkItem::Counts2D(h))?,
        }
        summary.counters += 1;
    }

    for (total_tag, matched_tag) in AccumulatorTag::EFFICIENCY_PAIRS {
        for (key, tag) in index.entries() {
            if *tag != total_tag {
                continue;
            }
            let Some(matched) = index.lookup(key, matched_tag) else {
                debug!("No {} accumulator for key {}", matched_tag.name(), key);
                continue;
            };
            let total = index.require(key, total_tag)?;
            let profile = profile_of(estimator, index.get(matched), index.get(total))?;
            summary.inconsistencies += profile.inconsistencies.len();
            publish(
                sink,
                &efficiency_name(key, matched_tag),
                &efficiency_title(key, matched_tag),
                SinkItem::Efficiency(&profile),
            )?;
            summary.efficiencies += 1;
        }
    }

    info!(
        "Harvested {} accumulators and {} efficiency profiles ({} clamped bins)",
        summary.counters, summary.efficiencies, summary.inconsistencies
    );
    Ok(summary)
}
