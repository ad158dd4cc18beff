//! The histogram capability used by monitor elements.
//!
//! One container covers 1-D, 2-D, and 3-D histograms plus 1-D/2-D profiles.
//! Bins are uniform per axis and stored with one underflow and one overflow
//! slot per axis: global index 0 is underflow and `bins + 1` overflow, so a
//! 1-D histogram with `n` bins stores `n + 2` values. Sum-of-squared-weights
//! is always tracked, which makes bin errors well defined for weighted fills.
//!
//! Profiles accumulate a value per coordinate instead of a plain count: a
//! profile bin's content is the weighted mean of the observed values and its
//! error is the spread (the `s` error option).

/// A uniformly binned axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    /// Number of in-range bins.
    pub bins: usize,
    /// Lower edge of the first in-range bin.
    pub low: f64,
    /// Upper edge of the last in-range bin.
    pub high: f64,
}

impl Axis {
    /// Create an axis with `bins` uniform bins over `[low, high)`.
    ///
    /// # Panics
    ///
    /// Panics when `bins` is zero or the range is empty or inverted.
    #[must_use]
    pub fn new(bins: usize, low: f64, high: f64) -> Self {
        assert!(bins > 0, "axis needs at least one bin");
        assert!(high > low, "axis range must not be empty");
        Self { bins, low, high }
    }

    /// Width of one bin.
    #[must_use]
    pub fn width(&self) -> f64 {
        (self.high - self.low) / self.bins as f64
    }

    /// Bin index for coordinate `x`: 0 for underflow, `bins + 1` for
    /// overflow.
    #[must_use]
    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.low {
            0
        } else if x >= self.high {
            self.bins + 1
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bin = ((x - self.low) / self.width()) as usize + 1;
            bin.min(self.bins)
        }
    }

    /// Center of bin `i`. Underflow and overflow get the centers the uniform
    /// grid would extrapolate to.
    #[must_use]
    pub fn center(&self, i: usize) -> f64 {
        self.low + (i as f64 - 0.5) * self.width()
    }
}

/// Histogram container: up to three axes, optional profile accumulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    name: String,
    title: String,
    axes: Vec<Axis>,
    profile: bool,
    /// Per bin: sum of weights, or for profiles sum of `w * value`.
    contents: Vec<f64>,
    /// Per bin: sum of squared weights, or for profiles sum of
    /// `w * value^2`.
    sumw2: Vec<f64>,
    /// Per bin, profiles only: sum of weights.
    bin_entries: Vec<f64>,
    entries: f64,
}

impl Histogram {
    fn build(name: &str, title: &str, axes: Vec<Axis>, profile: bool) -> Self {
        let slots = axes.iter().map(|a| a.bins + 2).product();
        Self {
            name: name.to_owned(),
            title: title.to_owned(),
            axes,
            profile,
            contents: vec![0.0; slots],
            sumw2: vec![0.0; slots],
            bin_entries: if profile { vec![0.0; slots] } else { Vec::new() },
            entries: 0.0,
        }
    }

    /// New 1-D histogram.
    #[must_use]
    pub fn new_1d(name: &str, title: &str, x: Axis) -> Self {
        Self::build(name, title, vec![x], false)
    }

    /// New 2-D histogram.
    #[must_use]
    pub fn new_2d(name: &str, title: &str, x: Axis, y: Axis) -> Self {
        Self::build(name, title, vec![x, y], false)
    }

    /// New 3-D histogram.
    #[must_use]
    pub fn new_3d(name: &str, title: &str, x: Axis, y: Axis, z: Axis) -> Self {
        Self::build(name, title, vec![x, y, z], false)
    }

    /// New 1-D profile: x bins accumulating a y value.
    #[must_use]
    pub fn new_profile(name: &str, title: &str, x: Axis) -> Self {
        Self::build(name, title, vec![x], true)
    }

    /// New 2-D profile: x/y bins accumulating a z value.
    #[must_use]
    pub fn new_profile_2d(name: &str, title: &str, x: Axis, y: Axis) -> Self {
        Self::build(name, title, vec![x, y], true)
    }

    /// Rebuild a histogram from archived parts. Lengths must agree with the
    /// axis layout; `bin_entries` must be present exactly for profiles.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        name: &str,
        title: &str,
        axes: Vec<Axis>,
        profile: bool,
        contents: Vec<f64>,
        sumw2: Vec<f64>,
        bin_entries: Vec<f64>,
        entries: f64,
    ) -> Result<Self, String> {
        if axes.is_empty() || axes.len() > 3 {
            return Err(format!("unsupported dimensionality {}", axes.len()));
        }
        let slots: usize = axes.iter().map(|a| a.bins + 2).product();
        if contents.len() != slots || sumw2.len() != slots {
            return Err(format!(
                "bin array length {} does not match axis layout ({slots} slots)",
                contents.len()
            ));
        }
        if profile && bin_entries.len() != slots {
            return Err("profile histogram is missing its per-bin entries".into());
        }
        if !profile && !bin_entries.is_empty() {
            return Err("plain histogram carries profile entries".into());
        }
        Ok(Self {
            name: name.to_owned(),
            title: title.to_owned(),
            axes,
            profile,
            contents,
            sumw2,
            bin_entries,
            entries,
        })
    }

    /// Histogram name (the archive leaf name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of axes (1 to 3).
    #[must_use]
    pub fn dims(&self) -> usize {
        self.axes.len()
    }

    /// True for profile histograms.
    #[must_use]
    pub fn is_profile(&self) -> bool {
        self.profile
    }

    /// Axis `i` (0 = x, 1 = y, 2 = z).
    #[must_use]
    pub fn axis(&self, i: usize) -> &Axis {
        &self.axes[i]
    }

    /// In-range bin count of axis `i`.
    #[must_use]
    pub fn nbins(&self, i: usize) -> usize {
        self.axes[i].bins
    }

    /// Total number of `fill` calls (weight-independent), or the archived
    /// equivalent.
    #[must_use]
    pub fn entries(&self) -> f64 {
        self.entries
    }

    /// Raw per-bin contents, including under/overflow slots.
    #[must_use]
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Raw per-bin squared-weight sums.
    #[must_use]
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    /// Raw per-bin profile weights (empty for plain histograms).
    #[must_use]
    pub fn profile_entries(&self) -> &[f64] {
        &self.bin_entries
    }

    /// Global slot index for per-axis bin indices. Unused axes must pass 0.
    #[must_use]
    pub fn slot(&self, ix: usize, iy: usize, iz: usize) -> usize {
        let sx = self.axes[0].bins + 2;
        let sy = self.axes.get(1).map_or(1, |a| a.bins + 2);
        debug_assert!(self.axes.len() > 1 || iy == 0);
        debug_assert!(self.axes.len() > 2 || iz == 0);
        ix + sx * (iy + sy * iz)
    }

    /// Bin content. For profiles this is the weighted mean of accumulated
    /// values (0 for empty bins).
    #[must_use]
    pub fn content(&self, ix: usize, iy: usize, iz: usize) -> f64 {
        let s = self.slot(ix, iy, iz);
        if self.profile {
            let n = self.bin_entries[s];
            if n > 0.0 { self.contents[s] / n } else { 0.0 }
        } else {
            self.contents[s]
        }
    }

    /// Bin error: `sqrt(sum w^2)` for plain histograms, the spread of
    /// accumulated values for profiles.
    #[must_use]
    pub fn error(&self, ix: usize, iy: usize, iz: usize) -> f64 {
        let s = self.slot(ix, iy, iz);
        if self.profile {
            let n = self.bin_entries[s];
            if n <= 0.0 {
                return 0.0;
            }
            let mean = self.contents[s] / n;
            let variance = self.sumw2[s] / n - mean * mean;
            variance.max(0.0).sqrt()
        } else {
            self.sumw2[s].sqrt()
        }
    }

    /// Accumulated fill weight of a profile bin (0 for plain histograms).
    #[must_use]
    pub fn bin_entries(&self, ix: usize, iy: usize, iz: usize) -> f64 {
        if self.profile {
            self.bin_entries[self.slot(ix, iy, iz)]
        } else {
            0.0
        }
    }

    /// Overwrite a bin's raw accumulators (archive restore, collation glue).
    pub fn set_bin_raw(&mut self, slot: usize, content: f64, sumw2: f64, bin_entries: f64) {
        self.contents[slot] = content;
        self.sumw2[slot] = sumw2;
        if self.profile {
            self.bin_entries[slot] = bin_entries;
        }
    }

    /// Weighted fill of a plain histogram. Extra coordinates are ignored on
    /// lower-dimensional histograms.
    pub fn fill(&mut self, coords: &[f64], weight: f64) {
        debug_assert!(!self.profile, "profiles fill through fill_profile");
        let s = self.coord_slot(coords);
        self.contents[s] += weight;
        self.sumw2[s] += weight * weight;
        self.entries += 1.0;
    }

    /// Weighted profile fill: `coords` locate the bin, `value` is averaged.
    pub fn fill_profile(&mut self, coords: &[f64], value: f64, weight: f64) {
        debug_assert!(self.profile, "plain histograms fill through fill");
        let s = self.coord_slot(coords);
        self.contents[s] += weight * value;
        self.sumw2[s] += weight * value * value;
        self.bin_entries[s] += weight;
        self.entries += 1.0;
    }

    fn coord_slot(&self, coords: &[f64]) -> usize {
        let ix = self.axes[0].find_bin(coords[0]);
        let iy = self
            .axes
            .get(1)
            .map_or(0, |a| a.find_bin(coords.get(1).copied().unwrap_or(0.0)));
        let iz = self
            .axes
            .get(2)
            .map_or(0, |a| a.find_bin(coords.get(2).copied().unwrap_or(0.0)));
        self.slot(ix, iy, iz)
    }

    /// True when both histograms have identical axis layout and profile
    /// flag, which is the precondition for `add` and exact comparison.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.profile == other.profile && self.axes == other.axes
    }

    /// Element-wise merge of another histogram of identical shape. Returns
    /// false (and leaves `self` untouched) on shape mismatch.
    #[must_use]
    pub fn add(&mut self, other: &Self) -> bool {
        if !self.same_shape(other) {
            return false;
        }
        for (a, b) in self.contents.iter_mut().zip(&other.contents) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        for (a, b) in self.bin_entries.iter_mut().zip(&other.bin_entries) {
            *a += b;
        }
        self.entries += other.entries;
        true
    }

    /// Element-wise subtraction used by the soft-reset display view.
    /// Entries are clamped at zero. Returns false on shape mismatch.
    #[must_use]
    pub fn subtract(&mut self, baseline: &Self) -> bool {
        if !self.same_shape(baseline) {
            return false;
        }
        for (a, b) in self.contents.iter_mut().zip(&baseline.contents) {
            *a -= b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&baseline.sumw2) {
            *a -= b;
        }
        for (a, b) in self.bin_entries.iter_mut().zip(&baseline.bin_entries) {
            *a -= b;
        }
        self.entries = (self.entries - baseline.entries).max(0.0);
        true
    }

    /// Zero all accumulators.
    pub fn reset(&mut self) {
        self.contents.fill(0.0);
        self.sumw2.fill(0.0);
        self.bin_entries.fill(0.0);
        self.entries = 0.0;
    }

    /// Binned mean along axis `axis`, over in-range bins. Profile bins are
    /// weighted by their accumulated entries, plain bins by their content.
    #[must_use]
    pub fn mean(&self, axis: usize) -> f64 {
        let (sumw, sumwx, _) = self.axis_stats(axis);
        if sumw > 0.0 { sumwx / sumw } else { 0.0 }
    }

    /// Binned RMS along axis `axis`, over in-range bins.
    #[must_use]
    pub fn rms(&self, axis: usize) -> f64 {
        let (sumw, sumwx, sumwx2) = self.axis_stats(axis);
        if sumw <= 0.0 {
            return 0.0;
        }
        let mean = sumwx / sumw;
        (sumwx2 / sumw - mean * mean).max(0.0).sqrt()
    }

    fn axis_stats(&self, axis: usize) -> (f64, f64, f64) {
        let (mut sumw, mut sumwx, mut sumwx2) = (0.0, 0.0, 0.0);
        let nx = self.axes[0].bins;
        let ny = self.axes.get(1).map_or(1, |a| a.bins);
        let nz = self.axes.get(2).map_or(1, |a| a.bins);
        for iz in 0..nz {
            for iy in 0..ny {
                for ix in 0..nx {
                    let (bx, by, bz) = (
                        ix + 1,
                        if self.axes.len() > 1 { iy + 1 } else { 0 },
                        if self.axes.len() > 2 { iz + 1 } else { 0 },
                    );
                    let s = self.slot(bx, by, bz);
                    let w = if self.profile {
                        self.bin_entries[s]
                    } else {
                        self.contents[s]
                    };
                    let coord = match axis {
                        0 => self.axes[0].center(bx),
                        1 => self.axes[1].center(by),
                        _ => self.axes[2].center(bz),
                    };
                    sumw += w;
                    sumwx += w * coord;
                    sumwx2 += w * coord * coord;
                }
            }
        }
        (sumw, sumwx, sumwx2)
    }
}
