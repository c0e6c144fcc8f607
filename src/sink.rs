//! Output sinks for harvested accumulators and efficiency profiles.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::efficiency::EfficiencyProfile;
use crate::histogram::{Histogram1D, Histogram2D};

/// Error type returned by sinks. Wrapped into `ValidationError::Sink` by the caller.
pub type SinkError = Box<dyn Error + Send + Sync>;

/// One labeled item handed to a sink.
#[derive(Debug, Clone, Copy)]
pub enum SinkItem<'a> {
    Counts1D(&'a Histogram1D),
    Counts2D(&'a Histogram2D),
    Efficiency(&'a EfficiencyProfile),
}

/// Receiver of harvested results, keyed by unique name.
pub trait Sink {
    /// Publish one item under `name` with a human-readable `title`.
    fn publish(&mut self, name: &str, title: &str, item: SinkItem<'_>) -> Result<(), SinkError>;
}

// ── In-memory sink ──────────────────────────────────────────────────────────

/// Owned copy of a published item.
#[derive(Debug, Clone, PartialEq)]
pub enum Published {
    Counts1D(Histogram1D),
    Counts2D(Histogram2D),
    Efficiency(EfficiencyProfile),
}

/// Keeps every published item in memory. Names must be unique.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    items: BTreeMap<String, (String, Published)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Published> {
        self.items.get(name).map(|(_, item)| item)
    }

    pub fn title(&self, name: &str) -> Option<&str> {
        self.items.get(name).map(|(title, _)| title.as_str())
    }

    pub fn counts_1d(&self, name: &str) -> Option<&Histogram1D> {
        match self.get(name)? {
            Published::Counts1D(h) => Some(h),
            _ => None,
        }
    }

    pub fn counts_2d(&self, name: &str) -> Option<&Histogram2D> {
        match self.get(name)? {
            Published::Counts2D(h) => Some(h),
            _ => None,
        }
    }

    pub fn efficiency(&self, name: &str) -> Option<&EfficiencyProfile> {
        match self.get(name)? {
            Published::Efficiency(p) => Some(p),
            _ => None,
        }
    }

    /// Published names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Sink for MemorySink {
    fn publish(&mut self, name: &str, title: &str, item: SinkItem<'_>) -> Result<(), SinkError> {
        if self.items.contains_key(name) {
            return Err(format!("duplicate item name {name}").into());
        }
        let owned = match item {
            SinkItem::Counts1D(h) => Published::Counts1D(h.clone()),
            SinkItem::Counts2D(h) => Published::Counts2D(h.clone()),
            SinkItem::Efficiency(p) => Published::Efficiency(p.clone()),
        };
        self.items.insert(name.to_string(), (title.to_string(), owned));
        Ok(())
    }
}

// ── CSV sink ────────────────────────────────────────────────────────────────

/// Writes every published item to `<dir>/<name>.csv`. The first line of each
/// file is a `# <title>` comment; read it back with
/// `csv::ReaderBuilder::new().comment(Some(b'#'))`.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            written: Vec::new(),
        })
    }

    /// Files written so far, in publish order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn writer(path: &Path, title: &str) -> Result<csv::Writer<File>, csv::Error> {
        let mut file = File::create(path)?;
        writeln!(file, "# {}", title.replace('\n', " "))?;
        Ok(csv::Writer::from_writer(file))
    }

    fn write_1d(path: &Path, title: &str, h: &Histogram1D) -> Result<(), csv::Error> {
        let mut wtr = Self::writer(path, title)?;
        wtr.write_record(["bin", "low", "high", "count"])?;
        wtr.write_record(["underflow", "", "", h.underflow().to_string().as_str()])?;
        let axis = h.axis();
        for (i, c) in h.counts().iter().enumerate() {
            wtr.write_record([
                i.to_string(),
                axis.bin_low(i).to_string(),
                axis.bin_high(i).to_string(),
                c.to_string(),
            ])?;
        }
        wtr.write_record(["overflow", "", "", h.overflow().to_string().as_str()])?;
        wtr.flush()?;
        Ok(())
    }

    fn write_2d(path: &Path, title: &str, h: &Histogram2D) -> Result<(), csv::Error> {
        let mut wtr = Self::writer(path, title)?;
        wtr.write_record(["ix", "iy", "x_low", "x_high", "y_low", "y_high", "count"])?;
        let (x, y) = (h.x_axis(), h.y_axis());
        for iy in 0..y.nbins() {
            for ix in 0..x.nbins() {
                wtr.write_record([
                    ix.to_string(),
                    iy.to_string(),
                    x.bin_low(ix).to_string(),
                    x.bin_high(ix).to_string(),
                    y.bin_low(iy).to_string(),
                    y.bin_high(iy).to_string(),
                    h.count(ix, iy).to_string(),
                ])?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    /// Only bins with nonzero total are written.
    fn write_efficiency(path: &Path, title: &str, p: &EfficiencyProfile) -> Result<(), csv::Error> {
        let mut wtr = Self::writer(path, title)?;
        wtr.write_record([
            "ix",
            "iy",
            "x_center",
            "y_center",
            "passed",
            "total",
            "efficiency",
            "lower",
            "upper",
            "error",
        ])?;
        let nx = p.x.nbins();
        for (i, bin) in p.bins.iter().enumerate() {
            let Some(b) = bin else { continue };
            let (ix, iy) = (i % nx, i / nx);
            let y_center = p
                .y
                .as_ref()
                .map(|y| y.bin_center(iy).to_string())
                .unwrap_or_default();
            wtr.write_record([
                ix.to_string(),
                iy.to_string(),
                p.x.bin_center(ix).to_string(),
                y_center,
                b.passed.to_string(),
                b.total.to_string(),
                b.efficiency.to_string(),
                b.lower.to_string(),
                b.upper.to_string(),
                b.error.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl Sink for CsvSink {
    fn publish(&mut self, name: &str, title: &str, item: SinkItem<'_>) -> Result<(), SinkError> {
        let path = self.dir.join(format!("{name}.csv"));
        if path.exists() {
            return Err(format!("{} already exists", path.display()).into());
        }
        match item {
            SinkItem::Counts1D(h) => Self::write_1d(&path, title, h)?,
            SinkItem::Counts2D(h) => Self::write_2d(&path, title, h)?,
            SinkItem::Efficiency(p) => Self::write_efficiency(&path, title, p)?,
        }
        self.written.push(path);
        Ok(())
    }
}
