//! Fixed-binning 1D histogram with under/overflow and merge support.

use crate::constants::HistogramDefinition;
use crate::error::{DimuonError, Result};
use serde::Serialize;

/// Uniform binning: `bins` bins between `low` (inclusive) and `high` (exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Binning {
    pub bins: usize,
    pub low: f64,
    pub high: f64,
}

impl Binning {
    pub fn new(bins: usize, low: f64, high: f64) -> Result<Self> {
        if bins == 0 || !low.is_finite() || !high.is_finite() || low >= high {
            return Err(DimuonError::configuration(format!(
                "invalid binning: {} bins in [{}, {})",
                bins, low, high
            )));
        }
        Ok(Self { bins, low, high })
    }

    pub fn width(&self) -> f64 {
        (self.high - self.low) / self.bins as f64
    }

    /// Storage index of `x`: 0 is underflow, `bins + 1` is overflow
    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.low {
            0
        } else if x >= self.high {
            self.bins + 1
        } else {
            // Rounding near the upper edge can land on `bins`
            let bin = ((x - self.low) / self.width()) as usize;
            1 + bin.min(self.bins - 1)
        }
    }

    /// Lower edge of in-range bin `bin` (1-based)
    pub fn low_edge(&self, bin: usize) -> f64 {
        self.low + (bin as f64 - 1.0) * self.width()
    }

    /// Centre of in-range bin `bin` (1-based)
    pub fn center(&self, bin: usize) -> f64 {
        self.low_edge(bin) + 0.5 * self.width()
    }
}

/// Unweighted-fill histogram with ROOT-style storage layout
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    name: String,
    title: String,
    x_label: String,
    y_label: String,
    binning: Binning,
    /// Length `bins + 2`: underflow, in-range bins, overflow
    contents: Vec<f64>,
    sumw2: Vec<f64>,
    entries: u64,
    // In-range moments for mean and standard deviation
    sum_w: f64,
    sum_wx: f64,
    sum_wx2: f64,
}

impl Histogram {
    pub fn new(name: impl Into<String>, title: impl Into<String>, binning: Binning) -> Self {
        let cells = binning.bins + 2;
        Self {
            name: name.into(),
            title: title.into(),
            x_label: String::new(),
            y_label: String::new(),
            binning,
            contents: vec![0.0; cells],
            sumw2: vec![0.0; cells],
            entries: 0,
            sum_w: 0.0,
            sum_wx: 0.0,
            sum_wx2: 0.0,
        }
    }

    /// Book an empty histogram from a static definition
    pub fn from_definition(definition: &HistogramDefinition) -> Result<Self> {
        let binning = Binning::new(definition.bins, definition.low, definition.high)?;
        Ok(Self::new(definition.name, definition.title, binning)
            .with_axis_labels(definition.x_label, definition.y_label))
    }

    pub fn with_axis_labels(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }

    /// Add one entry with unit weight
    pub fn fill(&mut self, x: f64) -> Result<()> {
        if !x.is_finite() {
            return Err(DimuonError::NonFiniteValue {
                histogram: self.name.clone(),
                value: x,
            });
        }

        let bin = self.binning.find_bin(x);
        self.contents[bin] += 1.0;
        self.sumw2[bin] += 1.0;
        self.entries += 1;

        if bin != 0 && bin != self.binning.bins + 1 {
            self.sum_w += 1.0;
            self.sum_wx += x;
            self.sum_wx2 += x * x;
        }
        Ok(())
    }

    /// Bin-wise addition of a histogram with identical binning
    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        if self.name != other.name {
            return Err(DimuonError::HistogramMismatch {
                name: self.name.clone(),
                reason: format!("other histogram is '{}'", other.name),
            });
        }
        if self.binning != other.binning {
            return Err(DimuonError::HistogramMismatch {
                name: self.name.clone(),
                reason: format!("binning {:?} differs from {:?}", self.binning, other.binning),
            });
        }

        for (mine, theirs) in self.contents.iter_mut().zip(&other.contents) {
            *mine += theirs;
        }
        for (mine, theirs) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *mine += theirs;
        }
        self.entries += other.entries;
        self.sum_w += other.sum_w;
        self.sum_wx += other.sum_wx;
        self.sum_wx2 += other.sum_wx2;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn x_label(&self) -> &str {
        &self.x_label
    }

    pub fn y_label(&self) -> &str {
        &self.y_label
    }

    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Number of fills, including under/overflow
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Content of in-range bin `bin` (1-based), 0 for underflow, `bins + 1` for overflow
    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    pub fn bin_sumw2(&self, bin: usize) -> f64 {
        self.sumw2.get(bin).copied().unwrap_or(0.0)
    }

    /// In-range bin contents
    pub fn contents(&self) -> &[f64] {
        &self.contents[1..=self.binning.bins]
    }

    /// All cells including underflow and overflow
    pub fn all_cells(&self) -> &[f64] {
        &self.contents
    }

    pub fn underflow(&self) -> f64 {
        self.contents[0]
    }

    pub fn overflow(&self) -> f64 {
        self.contents[self.binning.bins + 1]
    }

    /// Sum of in-range bin contents
    pub fn integral(&self) -> f64 {
        self.contents().iter().sum()
    }

    pub fn maximum(&self) -> f64 {
        self.contents().iter().copied().fold(0.0, f64::max)
    }

    /// Mean of in-range fills
    pub fn mean(&self) -> f64 {
        if self.sum_w == 0.0 {
            0.0
        } else {
            self.sum_wx / self.sum_w
        }
    }

    /// Standard deviation of in-range fills
    pub fn std_dev(&self) -> f64 {
        if self.sum_w == 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_wx2 / self.sum_w - mean * mean).max(0.0).sqrt()
    }
}
