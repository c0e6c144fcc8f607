//! Binomial efficiency estimation.
//!
//! Turns per-bin (passed, total) counts into an efficiency with an exact
//! Clopper–Pearson interval. The interval bounds are kept as computed and a
//! symmetrized error `max(eff - lower, upper - eff)` is provided alongside for
//! consumers that plot a single error bar.

use statrs::distribution::{Beta, ContinuousCDF};
use tracing::warn;

use crate::error::{Result, ValidationError};
use crate::histogram::{Axis, Histogram1D, Histogram2D};

/// Default confidence level (one Gaussian sigma).
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.683;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

fn check_confidence_level(cl: f64) -> Result<f64> {
    if cl > 0.0 && cl < 1.0 {
        Ok(cl)
    } else {
        Err(ValidationError::InvalidConfidenceLevel(cl))
    }
}

fn beta_quantile(p: f64, a: f64, b: f64) -> Result<f64> {
    let beta = Beta::new(a, b).map_err(|e| ValidationError::Statistics(e.to_string()))?;
    Ok(beta.inverse_cdf(p).clamp(0.0, 1.0))
}

/// Exact (Clopper–Pearson) interval for `passed` successes out of `total` trials.
///
/// The lower bound is 0 when `passed == 0`, the upper bound 1 when `passed == total`.
pub fn clopper_pearson(passed: u64, total: u64, confidence_level: f64) -> Result<ConfidenceInterval> {
    let cl = check_confidence_level(confidence_level)?;
    if total == 0 {
        return Err(ValidationError::Statistics(
            "cannot build an interval from zero trials".to_string(),
        ));
    }
    if passed > total {
        return Err(ValidationError::DataInconsistency {
            bin: 0,
            passed,
            total,
        });
    }
    let alpha = 1.0 - cl;
    let (k, n) = (passed as f64, total as f64);
    let lower = if passed == 0 {
        0.0
    } else {
        beta_quantile(alpha / 2.0, k, n - k + 1.0)?
    };
    let upper = if passed == total {
        1.0
    } else {
        beta_quantile(1.0 - alpha / 2.0, k + 1.0, n - k)?
    };
    Ok(ConfidenceInterval { lower, upper })
}

// ── Profile ─────────────────────────────────────────────────────────────────

/// Efficiency of one bin with nonzero total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EfficiencyBin {
    /// Matched count, after clamping to `total`.
    pub passed: u64,
    pub total: u64,
    pub efficiency: f64,
    pub lower: f64,
    pub upper: f64,
    /// Symmetrized error: `max(efficiency - lower, upper - efficiency)`.
    pub error: f64,
}

/// A bin whose matched count exceeded its total and was clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inconsistency {
    pub bin: usize,
    pub passed: u64,
    pub total: u64,
}

impl From<Inconsistency> for ValidationError {
    fn from(i: Inconsistency) -> Self {
        ValidationError::DataInconsistency {
            bin: i.bin,
            passed: i.passed,
            total: i.total,
        }
    }
}

/// Efficiency per bin of a 1-D or 2-D binning. 2-D bins are row-major like [`Histogram2D`].
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyProfile {
    pub x: Axis,
    pub y: Option<Axis>,
    /// `None` where the total count is zero.
    pub bins: Vec<Option<EfficiencyBin>>,
    /// Bins clamped because passed > total, in bin order.
    pub inconsistencies: Vec<Inconsistency>,
}

impl EfficiencyProfile {
    pub fn bin(&self, i: usize) -> Option<&EfficiencyBin> {
        self.bins.get(i).and_then(Option::as_ref)
    }

    pub fn bin_2d(&self, ix: usize, iy: usize) -> Option<&EfficiencyBin> {
        self.bin(iy * self.x.nbins() + ix)
    }

    /// Fail with the first clamped bin, if any.
    pub fn ensure_consistent(&self) -> Result<()> {
        match self.inconsistencies.first() {
            Some(&i) => Err(i.into()),
            None => Ok(()),
        }
    }

    /// Number of bins with an efficiency.
    pub fn num_filled(&self) -> usize {
        self.bins.iter().filter(|b| b.is_some()).count()
    }
}

// ── Estimator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct EfficiencyEstimator {
    confidence_level: f64,
}

impl Default for EfficiencyEstimator {
    fn default() -> Self {
        Self {
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        }
    }
}

impl EfficiencyEstimator {
    pub fn new(confidence_level: f64) -> Result<Self> {
        Ok(Self {
            confidence_level: check_confidence_level(confidence_level)?,
        })
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Efficiency of `passed` relative to `total`. Both must share the same axis.
    pub fn compute(&self, passed: &Histogram1D, total: &Histogram1D) -> Result<EfficiencyProfile> {
        if passed.axis() != total.axis() {
            return Err(ValidationError::BinningMismatch(format!(
                "passed has {} bins over [{}, {}), total has {} bins over [{}, {})",
                passed.axis().nbins(),
                passed.axis().lo(),
                passed.axis().hi(),
                total.axis().nbins(),
                total.axis().lo(),
                total.axis().hi()
            )));
        }
        let (bins, inconsistencies) = self.estimate_bins(passed.counts(), total.counts())?;
        Ok(EfficiencyProfile {
            x: total.axis().clone(),
            y: None,
            bins,
            inconsistencies,
        })
    }

    /// 2-D variant of [`compute`](Self::compute).
    pub fn compute_2d(&self, passed: &Histogram2D, total: &Histogram2D) -> Result<EfficiencyProfile> {
        if passed.x_axis() != total.x_axis() || passed.y_axis() != total.y_axis() {
            return Err(ValidationError::BinningMismatch(format!(
                "passed is {}x{}, total is {}x{} (or edges differ)",
                passed.x_axis().nbins(),
                passed.y_axis().nbins(),
                total.x_axis().nbins(),
                total.y_axis().nbins()
            )));
        }
        let (bins, inconsistencies) = self.estimate_bins(passed.counts(), total.counts())?;
        Ok(EfficiencyProfile {
            x: total.x_axis().clone(),
            y: Some(total.y_axis().clone()),
            bins,
            inconsistencies,
        })
    }

    fn estimate_bins(
        &self,
        passed: &[u64],
        total: &[u64],
    ) -> Result<(Vec<Option<EfficiencyBin>>, Vec<Inconsistency>)> {
        let mut bins = Vec::with_capacity(total.len());
        let mut inconsistencies = Vec::new();
        for (bin, (&k, &n)) in passed.iter().zip(total).enumerate() {
            if n == 0 {
                if k > 0 {
                    warn!("Bin {}: {} matched with zero total, dropping", bin, k);
                    inconsistencies.push(Inconsistency { bin, passed: k, total: n });
                }
                bins.push(None);
                continue;
            }
            let k = if k > n {
                warn!("Bin {}: passed {} exceeds total {}, clamping", bin, k, n);
                inconsistencies.push(Inconsistency { bin, passed: k, total: n });
                n
            } else {
                k
            };
            let ci = clopper_pearson(k, n, self.confidence_level)?;
            let efficiency = k as f64 / n as f64;
            bins.push(Some(EfficiencyBin {
                passed: k,
                total: n,
                efficiency,
                lower: ci.lower,
                upper: ci.upper,
                error: (efficiency - ci.lower).max(ci.upper - efficiency),
            }));
        }
        Ok((bins, inconsistencies))
    }
}
