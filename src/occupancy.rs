//! Occupancy-style quality tests: the Landau most-probable-value fit and the
//! windowed bin-occupancy rules with statistical-significance verdicts.
//!
//! The occupancy rules share one decision scheme: count failing bins, then
//! weigh the observed failure fraction against the allowed fraction
//! `eps_max` with a binomial log-likelihood-ratio significance. The verdict
//! is five-way; only a significant pass maps to probability 1.

use std::any::Any;

use crate::element::BadChannel;
use crate::engine::{AlgoResult, QAlgorithm, TestContext};
use crate::hist::Histogram;
use crate::stats::{binomial_significance, erfc_as, fit_landau, FitPoint};

/// Outcome of an occupancy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OccupancyVerdict {
    /// Failure fraction within bounds, significantly so.
    PassSignificant,
    /// Failure fraction out of bounds, significantly so.
    FailSignificant,
    /// Within bounds but statistically inconclusive.
    PassInsignificant,
    /// Out of bounds but statistically inconclusive.
    FailInsignificant,
    /// The rule could not be evaluated.
    #[default]
    Inapplicable,
}

impl OccupancyVerdict {
    /// Collapse onto the unified criterion probability: a significant pass
    /// is 1, an unevaluable rule −1, everything else 0.
    #[must_use]
    pub fn prob(self) -> f64 {
        match self {
            Self::PassSignificant => 1.0,
            Self::Inapplicable => -1.0,
            _ => 0.0,
        }
    }
}

/// Shared thresholds of the occupancy rules.
#[derive(Debug, Clone, Copy)]
struct OccupancyThresholds {
    eps_max: f64,
    s_fail: f64,
    s_pass: f64,
}

impl Default for OccupancyThresholds {
    fn default() -> Self {
        Self {
            eps_max: 0.05,
            s_fail: 5.0,
            s_pass: 5.0,
        }
    }
}

impl OccupancyThresholds {
    #[allow(clippy::cast_precision_loss)]
    fn judge(self, total: usize, failed: usize) -> OccupancyVerdict {
        if total == 0 {
            return OccupancyVerdict::Inapplicable;
        }
        let (total_f, failed_f) = (total as f64, failed as f64);
        let (s_fail, s_pass) = binomial_significance(total_f, failed_f, self.eps_max);
        if failed_f / total_f > self.eps_max {
            if s_fail >= self.s_fail {
                OccupancyVerdict::FailSignificant
            } else {
                OccupancyVerdict::FailInsignificant
            }
        } else if s_pass >= self.s_pass {
            OccupancyVerdict::PassSignificant
        } else {
            OccupancyVerdict::PassInsignificant
        }
    }
}

/// Landau fit over a configured window, comparing the fitted most-probable
/// value against an expectation.
#[derive(Debug, Default)]
pub struct MostProbableLandau {
    x_range: Option<(f64, f64)>,
    expected_mpv: Option<f64>,
    expected_sigma: f64,
    normalization: Option<f64>,
    fitted_mpv: Option<f64>,
}

impl MostProbableLandau {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "MostProbableLandau";

    /// Fit window on the X axis.
    pub fn set_x_range(&mut self, xmin: f64, xmax: f64) {
        self.x_range = Some((xmin, xmax));
    }

    /// Expected most-probable value.
    pub fn set_most_probable(&mut self, mpv: f64) {
        self.expected_mpv = Some(mpv);
    }

    /// Expected width, also the fit seed for the scale parameter.
    pub fn set_sigma(&mut self, sigma: f64) {
        self.expected_sigma = sigma;
    }

    /// Normalization seed; estimated from the histogram when unset.
    pub fn set_normalization(&mut self, norm: f64) {
        self.normalization = Some(norm);
    }

    /// Most-probable value of the last successful fit.
    #[must_use]
    pub fn fitted_mpv(&self) -> Option<f64> {
        self.fitted_mpv
    }

    fn compare(&mut self, h: &Histogram) -> f64 {
        let (Some((xmin, xmax)), Some(expected_mpv)) = (self.x_range, self.expected_mpv) else {
            return -1.0;
        };
        if self.expected_sigma <= 0.0 {
            return -1.0;
        }

        let axis = h.axis(0);
        let points: Vec<FitPoint> = (1..=h.nbins(0))
            .filter(|&i| {
                let x = axis.center(i);
                x >= xmin && x <= xmax
            })
            .map(|i| (axis.center(i), h.content(i, 0, 0), h.error(i, 0, 0)))
            .collect();

        let norm_seed = self.normalization.unwrap_or_else(|| {
            // The Landau peak density is about 0.18; scale from the tallest
            // in-window bin.
            points.iter().map(|p| p.1).fold(0.0, f64::max) / 0.18
        });

        let Some(fit) = fit_landau(&points, (norm_seed, expected_mpv, self.expected_sigma)) else {
            return -1.0;
        };
        self.fitted_mpv = Some(fit.mpv);

        let delta = (fit.mpv - expected_mpv).abs();
        if delta / self.expected_sigma >= 2.0 {
            return 0.0;
        }
        let combined = (fit.mpv_error * fit.mpv_error
            + self.expected_sigma * self.expected_sigma)
            .sqrt();
        erfc_as(delta / (std::f64::consts::SQRT_2 * combined))
    }
}

impl QAlgorithm for MostProbableLandau {
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
        AlgoResult::prob(self.compare(h))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All bin contents inside a fixed window, judged statistically.
#[derive(Debug, Default)]
pub struct AllContentWithinFixedRange {
    range: Option<(f64, f64)>,
    thresholds: OccupancyThresholds,
    verdict: OccupancyVerdict,
}

impl AllContentWithinFixedRange {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "AllContentWithinFixedRange";

    /// Allowed content window.
    pub fn set_range(&mut self, xmin: f64, xmax: f64) {
        self.range = Some((xmin, xmax));
    }

    /// Allowed failure fraction.
    pub fn set_epsilon_max(&mut self, eps: f64) {
        self.thresholds.eps_max = eps;
    }

    /// Significance levels for the fail and pass hypotheses.
    pub fn set_significance(&mut self, s_fail: f64, s_pass: f64) {
        self.thresholds.s_fail = s_fail;
        self.thresholds.s_pass = s_pass;
    }

    /// Verdict of the last run.
    #[must_use]
    pub fn verdict(&self) -> OccupancyVerdict {
        self.verdict
    }
}

impl QAlgorithm for AllContentWithinFixedRange {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        self.verdict = OccupancyVerdict::Inapplicable;
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };
        if !ctx.kind.is_1d() {
            return AlgoResult::inapplicable();
        }
        let Some((xmin, xmax)) = self.range else {
            return AlgoResult::inapplicable();
        };

        let ncx = h.nbins(0);
        let mut bad_channels = Vec::new();
        for bin in 1..=ncx {
            let contents = h.content(bin, 0, 0);
            if contents < xmin || contents > xmax {
                bad_channels.push(BadChannel::x(bin, contents, h.error(bin, 0, 0)));
            }
        }
        self.verdict = self.thresholds.judge(ncx, bad_channels.len());
        AlgoResult {
            prob: self.verdict.prob(),
            bad_channels,
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All bin contents inside a window floating with the data: the mean of the
/// in-range contents defines a Poisson band `mean ± N * sqrt(mean)`.
#[derive(Debug)]
pub struct AllContentWithinFloatingRange {
    n_range: f64,
    thresholds: OccupancyThresholds,
    verdict: OccupancyVerdict,
}

impl Default for AllContentWithinFloatingRange {
    fn default() -> Self {
        Self {
            n_range: 2.0,
            thresholds: OccupancyThresholds::default(),
            verdict: OccupancyVerdict::Inapplicable,
        }
    }
}

impl AllContentWithinFloatingRange {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "AllContentWithinFloatingRange";

    /// Band half-width in units of `sqrt(mean)`.
    pub fn set_n_range(&mut self, n: f64) {
        self.n_range = n;
    }

    /// Allowed failure fraction.
    pub fn set_epsilon_max(&mut self, eps: f64) {
        self.thresholds.eps_max = eps;
    }

    /// Significance levels for the fail and pass hypotheses.
    pub fn set_significance(&mut self, s_fail: f64, s_pass: f64) {
        self.thresholds.s_fail = s_fail;
        self.thresholds.s_pass = s_pass;
    }

    /// Verdict of the last run.
    #[must_use]
    pub fn verdict(&self) -> OccupancyVerdict {
        self.verdict
    }
}

impl QAlgorithm for AllContentWithinFloatingRange {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    #[allow(clippy::cast_precision_loss)]
    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        self.verdict = OccupancyVerdict::Inapplicable;
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };
        if !ctx.kind.is_1d() {
            return AlgoResult::inapplicable();
        }

        let ncx = h.nbins(0);
        let mean = (1..=ncx).map(|i| h.content(i, 0, 0)).sum::<f64>() / ncx as f64;
        if mean <= 0.0 {
            return AlgoResult::inapplicable();
        }
        let half_width = self.n_range * mean.sqrt();
        let (lo, hi) = (mean - half_width, mean + half_width);

        let mut bad_channels = Vec::new();
        for bin in 1..=ncx {
            let contents = h.content(bin, 0, 0);
            if contents < lo || contents > hi {
                bad_channels.push(BadChannel::x(bin, contents, h.error(bin, 0, 0)));
            }
        }
        self.verdict = self.thresholds.judge(ncx, bad_channels.len());
        AlgoResult {
            prob: self.verdict.prob(),
            bad_channels,
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Dead-bin occupancy rule: a bin fails when it holds no content at all.
#[derive(Debug, Default)]
pub struct Csc01 {
    thresholds: OccupancyThresholds,
    verdict: OccupancyVerdict,
}

impl Csc01 {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "CSC01";

    /// Allowed failure fraction.
    pub fn set_epsilon_max(&mut self, eps: f64) {
        self.thresholds.eps_max = eps;
    }

    /// Significance levels for the fail and pass hypotheses.
    pub fn set_significance(&mut self, s_fail: f64, s_pass: f64) {
        self.thresholds.s_fail = s_fail;
        self.thresholds.s_pass = s_pass;
    }

    /// Verdict of the last run.
    #[must_use]
    pub fn verdict(&self) -> OccupancyVerdict {
        self.verdict
    }
}

impl QAlgorithm for Csc01 {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        self.verdict = OccupancyVerdict::Inapplicable;
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };
        if !ctx.kind.is_1d() {
            return AlgoResult::inapplicable();
        }

        let ncx = h.nbins(0);
        let mut bad_channels = Vec::new();
        for bin in 1..=ncx {
            let contents = h.content(bin, 0, 0);
            if contents <= 0.0 {
                bad_channels.push(BadChannel::x(bin, contents, h.error(bin, 0, 0)));
            }
        }
        self.verdict = self.thresholds.judge(ncx, bad_channels.len());
        AlgoResult {
            prob: self.verdict.prob(),
            bad_channels,
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Flat-occupancy rule: every non-masked bin should sit within a relative
/// tolerance of a fixed expected occupancy level.
#[derive(Debug)]
pub struct FixedFlatOccupancy1d {
    occupancy: Option<f64>,
    tolerance: f64,
    exclusion_mask: Vec<bool>,
    thresholds: OccupancyThresholds,
    verdict: OccupancyVerdict,
}

impl Default for FixedFlatOccupancy1d {
    fn default() -> Self {
        Self {
            occupancy: None,
            tolerance: 0.1,
            exclusion_mask: Vec::new(),
            thresholds: OccupancyThresholds::default(),
            verdict: OccupancyVerdict::Inapplicable,
        }
    }
}

impl FixedFlatOccupancy1d {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "FixedFlatOccupancy1d";

    /// Expected per-bin occupancy level.
    pub fn set_occupancy(&mut self, level: f64) {
        self.occupancy = Some(level);
    }

    /// Allowed relative deviation from the occupancy level.
    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Bins to exclude (index 0 of the mask is bin 1). Masked bins count
    /// neither as trials nor as failures.
    pub fn set_exclusion_mask(&mut self, mask: Vec<bool>) {
        self.exclusion_mask = mask;
    }

    /// Allowed failure fraction.
    pub fn set_epsilon_max(&mut self, eps: f64) {
        self.thresholds.eps_max = eps;
    }

    /// Significance levels for the fail and pass hypotheses.
    pub fn set_significance(&mut self, s_fail: f64, s_pass: f64) {
        self.thresholds.s_fail = s_fail;
        self.thresholds.s_pass = s_pass;
    }

    /// Verdict of the last run.
    #[must_use]
    pub fn verdict(&self) -> OccupancyVerdict {
        self.verdict
    }
}

impl QAlgorithm for FixedFlatOccupancy1d {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        self.verdict = OccupancyVerdict::Inapplicable;
        let Some(h) = ctx.hist else {
            return AlgoResult::inapplicable();
        };
        if !ctx.kind.is_1d() {
            return AlgoResult::inapplicable();
        }
        let Some(level) = self.occupancy else {
            return AlgoResult::inapplicable();
        };
        if level <= 0.0 {
            return AlgoResult::inapplicable();
        }

        let ncx = h.nbins(0);
        let mut trials = 0usize;
        let mut bad_channels = Vec::new();
        for bin in 1..=ncx {
            if self.exclusion_mask.get(bin - 1).copied().unwrap_or(false) {
                continue;
            }
            trials += 1;
            let contents = h.content(bin, 0, 0);
            if (contents - level).abs() > self.tolerance * level {
                bad_channels.push(BadChannel::x(bin, contents, h.error(bin, 0, 0)));
            }
        }
        self.verdict = self.thresholds.judge(trials, bad_channels.len());
        AlgoResult {
            prob: self.verdict.prob(),
            bad_channels,
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
