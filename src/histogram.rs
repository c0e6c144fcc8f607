//! Binned count storage.
//!
//! Histograms here only count. Every bin holds a `u64`, so the totals of
//! independently filled shards can be summed exactly and fed straight into a
//! binomial estimator. Underflow and overflow are tracked separately and are
//! never folded into the edge bins.

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{Result, ValidationError};

// ── Axis ────────────────────────────────────────────────────────────────────

/// Upper limit on the bins of one axis.
pub const MAX_AXIS_BINS: usize = 1 << 20;

/// Where a value falls relative to an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinPosition {
    Underflow,
    Bin(usize),
    Overflow,
}

/// A binned axis described by its bin edges (`nbins + 1` strictly increasing values).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Axis {
    edges: Vec<f64>,
}

impl Axis {
    /// `nbins` equal-width bins over `[lo, hi)`.
    pub fn uniform(nbins: usize, lo: f64, hi: f64) -> Result<Self> {
        if nbins == 0 || nbins > MAX_AXIS_BINS {
            return Err(ValidationError::BinningMismatch(format!(
                "an axis needs 1 to {} bins, got {}",
                MAX_AXIS_BINS, nbins
            )));
        }
        if !(lo.is_finite() && hi.is_finite() && hi > lo) {
            return Err(ValidationError::BinningMismatch(format!(
                "axis range [{}, {}) is empty or not finite",
                lo, hi
            )));
        }
        let width = (hi - lo) / nbins as f64;
        let mut edges: Vec<f64> = (0..nbins).map(|i| lo + i as f64 * width).collect();
        edges.push(hi);
        Ok(Self { edges })
    }

    /// Variable-width bins from explicit, strictly increasing edges.
    pub fn variable(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 || edges.len() > MAX_AXIS_BINS + 1 {
            return Err(ValidationError::BinningMismatch(format!(
                "an axis needs 2 to {} edges, got {}",
                MAX_AXIS_BINS + 1,
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(ValidationError::BinningMismatch(
                "axis edges must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { edges })
    }

    pub fn nbins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn lo(&self) -> f64 {
        self.edges[0]
    }

    pub fn hi(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    pub fn bin_low(&self, bin: usize) -> f64 {
        self.edges[bin]
    }

    pub fn bin_high(&self, bin: usize) -> f64 {
        self.edges[bin + 1]
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        0.5 * (self.edges[bin] + self.edges[bin + 1])
    }

    /// Locate `x`. Bins are closed below and open above; NaN counts as overflow.
    pub fn find_bin(&self, x: f64) -> BinPosition {
        if x.is_nan() {
            return BinPosition::Overflow;
        }
        let idx = self.edges.partition_point(|&e| e <= x);
        if idx == 0 {
            BinPosition::Underflow
        } else if idx == self.edges.len() {
            BinPosition::Overflow
        } else {
            BinPosition::Bin(idx - 1)
        }
    }
}

fn check_same_axis(what: &str, a: &Axis, b: &Axis) -> Result<()> {
    if a == b {
        Ok(())
    } else {
        Err(ValidationError::BinningMismatch(format!(
            "{} axes differ: {} bins over [{}, {}) vs {} bins over [{}, {})",
            what,
            a.nbins(),
            a.lo(),
            a.hi(),
            b.nbins(),
            b.lo(),
            b.hi()
        )))
    }
}

// ── 1-D histogram ───────────────────────────────────────────────────────────

/// One-dimensional count histogram.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Histogram1D {
    axis: Axis,
    counts: Vec<u64>,
    underflow: u64,
    overflow: u64,
    /// Running sums over in-range fills, for mean and RMS.
    sum: f64,
    sum_sq: f64,
}

impl Histogram1D {
    pub fn new(axis: Axis) -> Self {
        let n = axis.nbins();
        Self {
            axis,
            counts: vec![0; n],
            underflow: 0,
            overflow: 0,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Build from precomputed per-bin counts, e.g. counts read back from a sink.
    pub fn from_counts(axis: Axis, counts: Vec<u64>) -> Result<Self> {
        if counts.len() != axis.nbins() {
            return Err(ValidationError::BinningMismatch(format!(
                "{} counts for an axis of {} bins",
                counts.len(),
                axis.nbins()
            )));
        }
        let (sum, sum_sq) = counts
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(s, s2), (i, &c)| {
                let x = axis.bin_center(i);
                (s + c as f64 * x, s2 + c as f64 * x * x)
            });
        Ok(Self {
            axis,
            counts,
            underflow: 0,
            overflow: 0,
            sum,
            sum_sq,
        })
    }

    pub fn fill(&mut self, x: f64) {
        match self.axis.find_bin(x) {
            BinPosition::Underflow => self.underflow += 1,
            BinPosition::Overflow => self.overflow += 1,
            BinPosition::Bin(i) => {
                self.counts[i] += 1;
                self.sum += x;
                self.sum_sq += x * x;
            }
        }
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn count(&self, bin: usize) -> u64 {
        self.counts[bin]
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Sum of in-range counts.
    pub fn integral(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Number of fills including under/overflow.
    pub fn entries(&self) -> u64 {
        self.integral() + self.underflow + self.overflow
    }

    /// Mean of in-range fills, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        let n = self.integral();
        (n > 0).then(|| self.sum / n as f64)
    }

    /// Standard deviation of in-range fills, `None` when empty.
    pub fn rms(&self) -> Option<f64> {
        let n = self.integral() as f64;
        let mean = self.mean()?;
        Some((self.sum_sq / n - mean * mean).max(0.0).sqrt())
    }

    /// Add another histogram with identical binning, bin by bin.
    pub fn merge(&mut self, other: &Histogram1D) -> Result<()> {
        check_same_axis("x", &self.axis, &other.axis)?;
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        Ok(())
    }
}

// ── 2-D histogram ───────────────────────────────────────────────────────────

/// Two-dimensional count histogram. Bins are stored row-major: `iy * nx + ix`.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Histogram2D {
    x: Axis,
    y: Axis,
    counts: Vec<u64>,
    /// Fills where either coordinate fell outside its axis.
    outside: u64,
}

impl Histogram2D {
    pub fn new(x: Axis, y: Axis) -> Self {
        let n = x.nbins() * y.nbins();
        Self {
            x,
            y,
            counts: vec![0; n],
            outside: 0,
        }
    }

    pub fn from_counts(x: Axis, y: Axis, counts: Vec<u64>) -> Result<Self> {
        if counts.len() != x.nbins() * y.nbins() {
            return Err(ValidationError::BinningMismatch(format!(
                "{} counts for a {}x{} grid",
                counts.len(),
                x.nbins(),
                y.nbins()
            )));
        }
        Ok(Self {
            x,
            y,
            counts,
            outside: 0,
        })
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        match (self.x.find_bin(x), self.y.find_bin(y)) {
            (BinPosition::Bin(ix), BinPosition::Bin(iy)) => {
                let nx = self.x.nbins();
                self.counts[iy * nx + ix] += 1;
            }
            _ => self.outside += 1,
        }
    }

    pub fn x_axis(&self) -> &Axis {
        &self.x
    }

    pub fn y_axis(&self) -> &Axis {
        &self.y
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn count(&self, ix: usize, iy: usize) -> u64 {
        self.counts[iy * self.x.nbins() + ix]
    }

    pub fn outside(&self) -> u64 {
        self.outside
    }

    pub fn integral(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn entries(&self) -> u64 {
        self.integral() + self.outside
    }

    pub fn merge(&mut self, other: &Histogram2D) -> Result<()> {
        check_same_axis("x", &self.x, &other.x)?;
        check_same_axis("y", &self.y, &other.y)?;
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.outside += other.outside;
        Ok(())
    }
}

// ── Accumulator ─────────────────────────────────────────────────────────────

/// A booked accumulator: either a 1-D or a 2-D count histogram.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Accumulator {
    H1(Histogram1D),
    H2(Histogram2D),
}

impl Accumulator {
    pub fn entries(&self) -> u64 {
        match self {
            Self::H1(h) => h.entries(),
            Self::H2(h) => h.entries(),
        }
    }

    pub fn as_1d(&self) -> Option<&Histogram1D> {
        match self {
            Self::H1(h) => Some(h),
            Self::H2(_) => None,
        }
    }

    pub fn as_2d(&self) -> Option<&Histogram2D> {
        match self {
            Self::H2(h) => Some(h),
            Self::H1(_) => None,
        }
    }

    /// Fill a 1-D accumulator. A 2-D accumulator is a booking bug: it asserts in
    /// debug builds and the value is dropped in release builds.
    pub fn fill(&mut self, x: f64) {
        match self {
            Self::H1(h) => h.fill(x),
            Self::H2(_) => debug_assert!(false, "1-D fill of a 2-D accumulator"),
        }
    }

    /// Fill a 2-D accumulator. A 1-D accumulator asserts in debug builds.
    pub fn fill_2d(&mut self, x: f64, y: f64) {
        match self {
            Self::H2(h) => h.fill(x, y),
            Self::H1(_) => debug_assert!(false, "2-D fill of a 1-D accumulator"),
        }
    }

    pub fn merge(&mut self, other: &Accumulator) -> Result<()> {
        match (self, other) {
            (Self::H1(a), Self::H1(b)) => a.merge(b),
            (Self::H2(a), Self::H2(b)) => a.merge(b),
            _ => Err(ValidationError::BinningMismatch(
                "cannot merge a 1-D accumulator with a 2-D accumulator".to_string(),
            )),
        }
    }
}
