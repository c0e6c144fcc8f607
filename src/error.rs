use thiserror::Error;

use crate::detid::ComponentKey;
use crate::tag::AccumulatorTag;
use crate::validation::RunPhase;

/// Errors produced while booking, filling or harvesting validation accumulators.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A detector identifier field is outside its physical range.
    #[error("invalid geometry index: {field} = {value}")]
    InvalidGeometryIndex {
        /// Name of the offending field (region, station, layer, chamber, roll).
        field: &'static str,
        /// Value that was supplied.
        value: i32,
    },

    /// Lookup against a (key, tag) pair that was never booked.
    #[error("unknown component key {key} (accumulator {tag:?})")]
    UnknownComponentKey {
        /// Key that was looked up.
        key: ComponentKey,
        /// Accumulator tag that was looked up, if the lookup was for an accumulator.
        tag: Option<AccumulatorTag>,
    },

    /// Two accumulators that must share binning do not.
    #[error("binning mismatch: {0}")]
    BinningMismatch(String),

    /// A matched count exceeds the total count of the same bin.
    #[error("data inconsistency in bin {bin}: passed {passed} > total {total}")]
    DataInconsistency {
        /// Flat bin index.
        bin: usize,
        /// Matched count as filled.
        passed: u64,
        /// Total count as filled.
        total: u64,
    },

    /// Operation called in the wrong run phase.
    #[error("operation needs run phase {expected:?}, run is in {found:?}")]
    InvalidPhase {
        /// Phase the operation requires.
        expected: RunPhase,
        /// Phase the run is actually in.
        found: RunPhase,
    },

    /// A configuration value that cannot produce a valid booking.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Confidence level outside (0, 1).
    #[error("confidence level must be in (0, 1), got {0}")]
    InvalidConfidenceLevel(f64),

    /// Failure inside the statistics backend.
    #[error("statistics error: {0}")]
    Statistics(String),

    /// The output sink rejected a published item.
    #[error("sink failed to publish {name}: {source}")]
    Sink {
        /// Name of the item being published.
        name: String,
        /// Underlying sink error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, ValidationError>;
