//! Bin-content range tests: X/Y windows, dead and noisy channels, mean
//! within expectation, and the 2-D/profile cell checks.

use std::any::Any;

use crate::element::{BadChannel, Kind};
use crate::engine::{AlgoResult, QAlgorithm, TestContext};
use crate::hist::Histogram;
use crate::stats::chi2_prob;

/// Fraction of entries whose bin center lies inside an allowed X window.
///
/// Sums every bin including under/overflow; when no window was configured
/// the histogram's own axis range is adopted (and kept).
#[derive(Debug, Default)]
pub struct ContentsXRange {
    range: Option<(f64, f64)>,
}

impl ContentsXRange {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "ContentsXRange";

    /// Allowed window on the X axis.
    pub fn set_allowed_x_range(&mut self, xmin: f64, xmax: f64) {
        self.range = Some((xmin, xmax));
    }
}

impl QAlgorithm for ContentsXRange {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };
        if !ctx.kind.is_1d() {
            return AlgoResult::inapplicable();
        }

        let axis = h.axis(0);
        let (xmin, xmax) = *self
            .range
            .get_or_insert_with(|| (axis.low, axis.high));

        let mut sum = 0.0;
        let mut fail = 0.0;
        for bin in 0..=h.nbins(0) + 1 {
            let contents = h.content(bin, 0, 0);
            let x = axis.center(bin);
            sum += contents;
            if x < xmin || x > xmax {
                fail += contents;
            }
        }

        if sum == 0.0 {
            return AlgoResult::prob(1.0);
        }
        AlgoResult::prob((sum - fail) / sum)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fraction of bins whose content lies inside an allowed Y window.
///
/// Flow bins are excluded. In the empty-bin-ignoring mode only bins with
/// non-zero content are judged.
#[derive(Debug)]
pub struct ContentsYRange {
    range: Option<(f64, f64)>,
    use_empty_bins: bool,
}

impl Default for ContentsYRange {
    fn default() -> Self {
        Self {
            range: None,
            use_empty_bins: true,
        }
    }
}

impl ContentsYRange {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "ContentsYRange";

    /// Allowed window on bin contents.
    pub fn set_allowed_y_range(&mut self, ymin: f64, ymax: f64) {
        self.range = Some((ymin, ymax));
    }

    /// When false, empty bins are not judged at all.
    pub fn set_use_empty_bins(&mut self, use_empty: bool) {
        self.use_empty_bins = use_empty;
    }
}

impl QAlgorithm for ContentsYRange {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };
        if !ctx.kind.is_1d() {
            return AlgoResult::inapplicable();
        }
        // Every bin is accepted until a window is configured.
        let Some((ymin, ymax)) = self.range else {
            return AlgoResult::prob(1.0);
        };

        let ncx = h.nbins(0);
        let mut fail = 0usize;
        let mut bad_channels = Vec::new();
        for bin in 1..=ncx {
            let contents = h.content(bin, 0, 0);
            let judged = self.use_empty_bins || contents != 0.0;
            if judged && (contents < ymin || contents > ymax) {
                if self.use_empty_bins {
                    bad_channels.push(BadChannel::x(bin, contents, h.error(bin, 0, 0)));
                }
                fail += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let prob = (ncx - fail) as f64 / ncx as f64;
        AlgoResult { prob, bad_channels }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fraction of channels alive: a channel is dead when its content is at or
/// below the configured threshold. 1-D and 2-D histograms.
#[derive(Debug, Default)]
pub struct DeadChannel {
    threshold: Option<f64>,
}

impl DeadChannel {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "DeadChannel";

    /// Contents at or below `ymin` mark a channel dead.
    pub fn set_threshold(&mut self, ymin: f64) {
        self.threshold = Some(ymin);
    }
}

impl QAlgorithm for DeadChannel {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };
        if !(ctx.kind.is_1d() || ctx.kind.is_2d()) {
            return AlgoResult::inapplicable();
        }
        let Some(ymin) = self.threshold else {
            return AlgoResult::prob(1.0);
        };

        let mut fail = 0usize;
        let mut bad_channels = Vec::new();
        let total;
        if ctx.kind.is_1d() {
            let ncx = h.nbins(0);
            total = ncx;
            for bin in 1..=ncx {
                let contents = h.content(bin, 0, 0);
                if contents <= ymin {
                    bad_channels.push(BadChannel::x(bin, contents, h.error(bin, 0, 0)));
                    fail += 1;
                }
            }
        } else {
            let (ncx, ncy) = (h.nbins(0), h.nbins(1));
            total = ncx * ncy;
            for cx in 1..=ncx {
                for cy in 1..=ncy {
                    let contents = h.content(cx, cy, 0);
                    if contents <= ymin {
                        bad_channels.push(BadChannel::xy(cx, cy, contents, h.error(cx, cy, 0)));
                        fail += 1;
                    }
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let prob = (total - fail) as f64 / total as f64;
        AlgoResult { prob, bad_channels }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fraction of channels not noisy: a channel is noisy when it exceeds the
/// average of its `2 * num_neighbors` symmetric neighbors (with wrap-around
/// at the ends) by more than the configured relative tolerance.
///
/// 2-D histograms are judged over their row-major in-range bin sequence.
#[derive(Debug)]
pub struct NoisyChannel {
    tolerance: Option<f64>,
    num_neighbors: usize,
}

impl Default for NoisyChannel {
    fn default() -> Self {
        Self {
            tolerance: None,
            num_neighbors: 1,
        }
    }
}

impl NoisyChannel {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "NoisyChannel";

    /// Relative excess over the neighborhood average that marks noise.
    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = Some(tolerance);
    }

    /// Number of neighbors on each side entering the average.
    pub fn set_num_neighbors(&mut self, n: usize) {
        self.num_neighbors = n.max(1);
    }

    fn neighbor_average(&self, ring: &[f64], bin: usize) -> f64 {
        let n = ring.len();
        let mut sum = 0.0;
        for i in 1..=self.num_neighbors {
            let lo = (bin + n - i % n) % n;
            let hi = (bin + i) % n;
            sum += ring[lo] + ring[hi];
        }
        #[allow(clippy::cast_precision_loss)]
        let count = (self.num_neighbors * 2) as f64;
        sum / count
    }
}

impl QAlgorithm for NoisyChannel {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };
        if !(ctx.kind.is_1d() || ctx.kind.is_2d()) {
            return AlgoResult::inapplicable();
        }
        let Some(tolerance) = self.tolerance else {
            return AlgoResult::prob(1.0);
        };

        // In-range contents as one ring, row-major for 2-D.
        let ring: Vec<f64> = if ctx.kind.is_1d() {
            (1..=h.nbins(0)).map(|i| h.content(i, 0, 0)).collect()
        } else {
            let (ncx, ncy) = (h.nbins(0), h.nbins(1));
            (1..=ncy)
                .flat_map(|cy| (1..=ncx).map(move |cx| (cx, cy)))
                .map(|(cx, cy)| h.content(cx, cy, 0))
                .collect()
        };

        let mut fail = 0usize;
        let mut bad_channels = Vec::new();
        for (i, &contents) in ring.iter().enumerate() {
            let average = self.neighbor_average(&ring, i);
            if average != 0.0 && (contents - average) / average.abs() > tolerance {
                fail += 1;
                bad_channels.push(BadChannel::x(i + 1, contents, 0.0));
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let prob = (ring.len() - fail) as f64 / ring.len() as f64;
        AlgoResult { prob, bad_channels }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// How [`MeanWithinExpected`] judges the histogram mean.
#[derive(Debug, Clone, Copy)]
enum MeanMode {
    /// Pass iff the mean falls in the closed window.
    Range(f64, f64),
    /// Chi-square probability of the deviation in units of a fixed sigma.
    Sigma(f64),
    /// Chi-square probability of the deviation in units of the histogram
    /// RMS.
    Rms,
}

/// Check that a 1-D histogram's mean is compatible with an expectation.
///
/// Exactly one of the three modes is active; configuring one deactivates the
/// others. The range mode needs no expected mean.
#[derive(Debug, Default)]
pub struct MeanWithinExpected {
    mode: Option<MeanMode>,
    expected_mean: f64,
}

impl MeanWithinExpected {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "MeanWithinExpected";

    /// Pass/fail window on the mean.
    pub fn use_range(&mut self, xmin: f64, xmax: f64) {
        self.mode = Some(MeanMode::Range(xmin, xmax));
    }

    /// Significance mode with a fixed expected sigma.
    pub fn use_sigma(&mut self, expected_sigma: f64) {
        self.mode = Some(MeanMode::Sigma(expected_sigma));
    }

    /// Significance mode using the histogram's own RMS.
    pub fn use_rms(&mut self) {
        self.mode = Some(MeanMode::Rms);
    }

    /// Expected mean for the sigma/RMS modes.
    pub fn set_expected_mean(&mut self, mean: f64) {
        self.expected_mean = mean;
    }
}

impl QAlgorithm for MeanWithinExpected {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };
        if !ctx.kind.is_1d() {
            return AlgoResult::inapplicable();
        }

        let prob = match self.mode {
            Some(MeanMode::Range(xmin, xmax)) => {
                let mean = h.mean(0);
                if mean >= xmin && mean <= xmax { 1.0 } else { 0.0 }
            }
            Some(MeanMode::Sigma(sigma)) => {
                if sigma == 0.0 {
                    0.0
                } else {
                    let chi = (h.mean(0) - self.expected_mean) / sigma;
                    chi2_prob(chi * chi, 1)
                }
            }
            Some(MeanMode::Rms) => {
                let rms = h.rms(0);
                if rms == 0.0 {
                    0.0
                } else {
                    let chi = (h.mean(0) - self.expected_mean) / rms;
                    chi2_prob(chi * chi, 1)
                }
            }
            None => -1.0,
        };
        AlgoResult::prob(prob)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Per-cell checks on 2-D histograms and profiles: mean window, RMS window,
/// and relative deviation from the cell average. Profile cells with fewer
/// than `min_entries / ncells` accumulated entries are skipped.
///
/// The empty-bin-ignoring mode applies only the mean window, only to 2-D
/// histograms, and only to non-empty cells.
#[derive(Debug)]
pub struct ContentsWithinExpected {
    mean_range: Option<(f64, f64)>,
    rms_range: Option<(f64, f64)>,
    tolerance_mean: Option<f64>,
    min_entries: f64,
    use_empty_bins: bool,
}

impl Default for ContentsWithinExpected {
    fn default() -> Self {
        Self {
            mean_range: None,
            rms_range: None,
            tolerance_mean: None,
            min_entries: 0.0,
            use_empty_bins: true,
        }
    }
}

impl ContentsWithinExpected {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "ContentsWithinExpected";

    /// Allowed window on cell contents (profile cell means).
    pub fn set_mean_range(&mut self, min: f64, max: f64) {
        if max < min {
            tracing::warn!(min, max, "illogical mean range");
        }
        self.mean_range = Some((min, max));
    }

    /// Allowed window on cell errors (profile cell spreads).
    pub fn set_rms_range(&mut self, min: f64, max: f64) {
        if max < min {
            tracing::warn!(min, max, "illogical RMS range");
        }
        self.rms_range = Some((min, max));
    }

    /// Allowed relative deviation of a cell from the average of all cells.
    pub fn set_mean_tolerance(&mut self, tolerance: f64) {
        self.tolerance_mean = Some(tolerance);
    }

    /// Total entries below which individual profile cells are skipped
    /// (divided evenly across cells).
    pub fn set_min_entries(&mut self, entries: f64) {
        self.min_entries = entries;
    }

    /// When false, judge only non-empty 2-D cells against the mean window.
    pub fn set_use_empty_bins(&mut self, use_empty: bool) {
        self.use_empty_bins = use_empty;
    }

    fn cells(kind: Kind, h: &Histogram) -> (usize, usize) {
        if kind == Kind::Profile {
            (h.nbins(0), 1)
        } else {
            (h.nbins(0), h.nbins(1))
        }
    }
}

impl QAlgorithm for ContentsWithinExpected {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    #[allow(clippy::cast_precision_loss)]
    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };

        if !self.use_empty_bins {
            // Empty-bin-ignoring variant: 2-D histograms only.
            if !ctx.kind.is_2d() {
                return AlgoResult::inapplicable();
            }
            let Some((min_mean, max_mean)) = self.mean_range else {
                return AlgoResult::prob(1.0);
            };
            let (ncx, ncy) = (h.nbins(0), h.nbins(1));
            let mut fail = 0usize;
            for cx in 1..=ncx {
                for cy in 1..=ncy {
                    let contents = h.content(cx, cy, 0);
                    if contents != 0.0 && (contents < min_mean || contents > max_mean) {
                        fail += 1;
                    }
                }
            }
            return AlgoResult::prob((ncx * ncy - fail) as f64 / (ncx * ncy) as f64);
        }

        let profile = matches!(ctx.kind, Kind::Profile | Kind::Profile2d);
        if !(ctx.kind.is_2d() || profile) {
            return AlgoResult::inapplicable();
        }

        let (ncx, ncy) = Self::cells(ctx.kind, h);
        let ncells = (ncx * ncy) as f64;
        let entries_floor = self.min_entries / ncells;
        let cell = |cx: usize, cy: usize| {
            let (y, _) = if ctx.kind == Kind::Profile { (0, 0) } else { (cy, 0) };
            (h.content(cx, y, 0), h.error(cx, y, 0), h.bin_entries(cx, y, 0))
        };
        let skipped = |entries: f64| profile && entries < entries_floor;

        // Average of usable cells, for the tolerance check.
        let average = if self.tolerance_mean.is_some() {
            let mut sum = 0.0;
            let mut nsum = 0u32;
            for cx in 1..=ncx {
                for cy in 1..=ncy {
                    let (contents, _, entries) = cell(cx, cy);
                    if !skipped(entries) {
                        sum += contents;
                        nsum += 1;
                    }
                }
            }
            if nsum > 0 { sum / f64::from(nsum) } else { 0.0 }
        } else {
            0.0
        };

        let mut fail = 0usize;
        let mut bad_channels = Vec::new();
        for cx in 1..=ncx {
            for cy in 1..=ncy {
                let (contents, error, entries) = cell(cx, cy);
                if skipped(entries) {
                    continue;
                }
                let fail_mean = self
                    .mean_range
                    .is_some_and(|(min, max)| contents < min || contents > max);
                let fail_rms = self
                    .rms_range
                    .is_some_and(|(min, max)| error < min || error > max);
                let fail_tolerance = self
                    .tolerance_mean
                    .is_some_and(|tol| (contents - average).abs() > tol * average.abs());
                if fail_mean || fail_rms || fail_tolerance {
                    bad_channels.push(BadChannel::xy(cx, cy, contents, error));
                    fail += 1;
                }
            }
        }

        AlgoResult {
            prob: (ncells - fail as f64) / ncells,
            bad_channels,
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hist::Axis;

    fn h(bins: usize) -> Histogram {
        Histogram::new_1d("h", "t", Axis::new(bins, 0.0, bins as f64))
    }

    fn ctx<'a>(kind: Kind, hist: &'a Histogram) -> TestContext<'a> {
        TestContext {
            fullname: "A/h",
            kind,
            hist: Some(hist),
            reference: None,
            entries: hist.entries(),
        }
    }

    #[test]
    fn xrange_counts_out_of_window_entries() {
        // 6 entries inside [0, 4], 2 outside.
        let mut hist = h(8);
        for x in [0.5, 1.5, 2.5, 3.5, 0.5, 1.5, 6.5, 7.5] {
            hist.fill(&[x], 1.0);
        }
        let mut algo = ContentsXRange::default();
        algo.set_allowed_x_range(0.0, 4.0);
        let prob = algo.run(&ctx(Kind::H1F, &hist)).prob;
        assert!((prob - 0.75).abs() < 1e-12);
    }

    #[test]
    fn xrange_includes_flow_bins() {
        let mut hist = h(4);
        hist.fill(&[1.5], 3.0);
        hist.fill(&[99.0], 1.0); // overflow center is outside any window
        let mut algo = ContentsXRange::default();
        algo.set_allowed_x_range(0.0, 4.0);
        let prob = algo.run(&ctx(Kind::H1F, &hist)).prob;
        assert!((prob - 0.75).abs() < 1e-12);
    }

    #[test]
    fn xrange_empty_histogram_passes() {
        let hist = h(4);
        let mut algo = ContentsXRange::default();
        assert!((algo.run(&ctx(Kind::H1F, &hist)).prob - 1.0).abs() < 1e-12);
    }

    #[test]
    fn xrange_defaults_to_axis_range() {
        let mut hist = h(4);
        hist.fill(&[1.5], 1.0);
        hist.fill(&[-2.0], 1.0); // underflow: outside the axis range
        let mut algo = ContentsXRange::default();
        let prob = algo.run(&ctx(Kind::H1F, &hist)).prob;
        assert!((prob - 0.5).abs() < 1e-12);
    }

    #[test]
    fn yrange_standard_counts_empty_bins() {
        let mut hist = h(4);
        hist.fill(&[0.5], 5.0);
        let mut algo = ContentsYRange::default();
        algo.set_allowed_y_range(1.0, 10.0);
        // Bins 2..4 are empty (content 0 < ymin): three failures.
        let result = algo.run(&ctx(Kind::H1F, &hist));
        assert!((result.prob - 0.25).abs() < 1e-12);
        assert_eq!(result.bad_channels.len(), 3);
    }

    #[test]
    fn yrange_ignoring_empty_bins() {
        let mut hist = h(4);
        hist.fill(&[0.5], 5.0);
        hist.fill(&[1.5], 20.0);
        let mut algo = ContentsYRange::default();
        algo.set_allowed_y_range(1.0, 10.0);
        algo.set_use_empty_bins(false);
        // Only bin 2 (content 20) fails; empty bins are skipped.
        let prob = algo.run(&ctx(Kind::H1F, &hist)).prob;
        assert!((prob - 0.75).abs() < 1e-12);
    }

    #[test]
    fn yrange_without_window_accepts_everything() {
        let mut hist = h(4);
        hist.fill(&[0.5], 5.0);
        let mut algo = ContentsYRange::default();
        assert!((algo.run(&ctx(Kind::H1F, &hist)).prob - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dead_channel_fraction_1d() {
        let mut hist = h(10);
        for bin in 0..9 {
            hist.fill(&[f64::from(bin) + 0.5], 1.0);
        }
        let mut algo = DeadChannel::default();
        algo.set_threshold(0.0);
        let result = algo.run(&ctx(Kind::H1F, &hist));
        assert!((result.prob - 0.9).abs() < 1e-12);
        assert_eq!(result.bad_channels.len(), 1);
        assert_eq!(result.bad_channels[0].bin_x, 10);
    }

    #[test]
    fn dead_channel_fraction_2d() {
        let mut hist =
            Histogram::new_2d("h2", "t", Axis::new(2, 0.0, 2.0), Axis::new(2, 0.0, 2.0));
        hist.fill(&[0.5, 0.5], 1.0);
        hist.fill(&[1.5, 1.5], 1.0);
        let mut algo = DeadChannel::default();
        algo.set_threshold(0.0);
        let result = algo.run(&ctx(Kind::H2F, &hist));
        assert!((result.prob - 0.5).abs() < 1e-12);
    }

    #[test]
    fn noisy_channel_flags_spike_with_wraparound() {
        let mut hist = h(10);
        for bin in 0..10 {
            hist.fill(&[f64::from(bin) + 0.5], 10.0);
        }
        hist.fill(&[4.5], 90.0); // bin 5 spikes to 100 against neighbors at 10
        let mut algo = NoisyChannel::default();
        algo.set_tolerance(1.0);
        algo.set_num_neighbors(2);
        let result = algo.run(&ctx(Kind::H1F, &hist));
        assert!((result.prob - 0.9).abs() < 1e-12);
        assert_eq!(result.bad_channels[0].bin_x, 5);
    }

    #[test]
    fn noisy_channel_tolerance_definition() {
        // Property: bin fails iff (c - avg) / |avg| > tolerance.
        let mut hist = h(4);
        for (bin, weight) in [(0.5, 10.0), (1.5, 20.0), (2.5, 10.0), (3.5, 10.0)] {
            hist.fill(&[bin], weight);
        }
        // Bin 2: neighbors (1 each side) average (10 + 10) / 2 = 10; excess = 1.0.
        let mut algo = NoisyChannel::default();
        algo.set_tolerance(0.99);
        assert!((algo.run(&ctx(Kind::H1F, &hist)).prob - 0.75).abs() < 1e-12);
        let mut algo = NoisyChannel::default();
        algo.set_tolerance(1.0);
        assert!((algo.run(&ctx(Kind::H1F, &hist)).prob - 1.0).abs() < 1e-12);
    }

    #[test]
    fn noisy_channel_without_tolerance_accepts() {
        let hist = h(4);
        let mut algo = NoisyChannel::default();
        assert!((algo.run(&ctx(Kind::H1F, &hist)).prob - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mean_within_range_mode() {
        let mut hist = h(10);
        for _ in 0..10 {
            hist.fill(&[4.5], 1.0);
        }
        let mut algo = MeanWithinExpected::default();
        algo.use_range(4.0, 5.0);
        assert!((algo.run(&ctx(Kind::H1F, &hist)).prob - 1.0).abs() < 1e-12);
        algo.use_range(5.0, 6.0);
        assert!((algo.run(&ctx(Kind::H1F, &hist)).prob).abs() < 1e-12);
    }

    #[test]
    fn mean_within_sigma_mode() {
        let mut hist = h(10);
        for _ in 0..10 {
            hist.fill(&[4.5], 1.0);
        }
        let mut algo = MeanWithinExpected::default();
        algo.set_expected_mean(4.5);
        algo.use_sigma(1.0);
        // Zero deviation: probability 1.
        assert!((algo.run(&ctx(Kind::H1F, &hist)).prob - 1.0).abs() < 1e-9);
        // One-sigma deviation.
        algo.set_expected_mean(5.5);
        let prob = algo.run(&ctx(Kind::H1F, &hist)).prob;
        assert!((prob - 0.3173).abs() < 1e-3, "prob = {prob}");
        // Degenerate sigma.
        algo.use_sigma(0.0);
        assert!((algo.run(&ctx(Kind::H1F, &hist)).prob).abs() < 1e-12);
    }

    #[test]
    fn mean_without_mode_is_inapplicable() {
        let hist = h(4);
        let mut algo = MeanWithinExpected::default();
        assert!(algo.run(&ctx(Kind::H1F, &hist)).prob < 0.0);
    }

    #[test]
    fn contents_within_expected_mean_window_2d() {
        let mut hist =
            Histogram::new_2d("h2", "t", Axis::new(2, 0.0, 2.0), Axis::new(2, 0.0, 2.0));
        for (x, y, w) in [(0.5, 0.5, 5.0), (1.5, 0.5, 5.0), (0.5, 1.5, 5.0), (1.5, 1.5, 50.0)] {
            hist.fill(&[x, y], w);
        }
        let mut algo = ContentsWithinExpected::default();
        algo.set_mean_range(1.0, 10.0);
        let result = algo.run(&ctx(Kind::H2F, &hist));
        assert!((result.prob - 0.75).abs() < 1e-12);
        assert_eq!(result.bad_channels.len(), 1);
        assert_eq!((result.bad_channels[0].bin_x, result.bad_channels[0].bin_y), (2, 2));
    }

    #[test]
    fn contents_within_expected_tolerance_check() {
        let mut hist =
            Histogram::new_2d("h2", "t", Axis::new(2, 0.0, 2.0), Axis::new(2, 0.0, 2.0));
        for (x, y, w) in [(0.5, 0.5, 10.0), (1.5, 0.5, 10.0), (0.5, 1.5, 10.0), (1.5, 1.5, 30.0)] {
            hist.fill(&[x, y], w);
        }
        // Average = 15; cell at 30 deviates by 15 = 1.0 relative.
        let mut algo = ContentsWithinExpected::default();
        algo.set_mean_tolerance(0.5);
        let result = algo.run(&ctx(Kind::H2F, &hist));
        // 10 deviates by 5/15 = 0.33 (pass); 30 deviates by 1.0 (fail).
        assert!((result.prob - 0.75).abs() < 1e-12);
    }

    #[test]
    fn contents_within_expected_profile_skips_thin_cells() {
        let mut p = Histogram::new_profile("p", "t", Axis::new(4, 0.0, 4.0));
        // Cell 1 gets plenty of entries at a bad mean; cell 2 only one entry.
        for _ in 0..100 {
            p.fill_profile(&[0.5], 50.0, 1.0);
        }
        p.fill_profile(&[1.5], 50.0, 1.0);
        let mut algo = ContentsWithinExpected::default();
        algo.set_mean_range(0.0, 10.0);
        algo.set_min_entries(40.0); // floor = 10 entries per cell
        let result = algo.run(&ctx(Kind::Profile, &p));
        // Only cell 1 is judged (fails); cells 2..4 skipped; 3 of 4 pass.
        assert!((result.prob - 0.75).abs() < 1e-12);
        assert_eq!(result.bad_channels.len(), 1);
    }

    #[test]
    fn contents_within_expected_as_mode_needs_2d() {
        let hist = h(4);
        let mut algo = ContentsWithinExpected::default();
        algo.set_use_empty_bins(false);
        assert!(algo.run(&ctx(Kind::H1F, &hist)).prob < 0.0);
    }
}
