//! Reference-comparison quality tests: exact bin equality, normalized
//! chi-square, and Kolmogorov–Smirnov.
//!
//! All three need the element's mirror histogram under `Reference/`; without
//! one they report inapplicability (negative probability), never an error.

use std::any::Any;

use tracing::warn;

use crate::element::{BadChannel, Kind};
use crate::engine::{AlgoResult, QAlgorithm, TestContext};
use crate::hist::Histogram;
use crate::stats::{chi2_prob, kolmogorov_prob};

/// Axis-edge agreement required by the Kolmogorov comparison.
const EDGE_TOLERANCE: f64 = 1e-5;

fn one_dimensional(kind: Kind) -> bool {
    kind.is_1d() || kind == Kind::Profile
}

/// Exact equality against the reference, every bin including under/overflow.
#[derive(Debug, Default)]
pub struct Comp2RefEqualH;

impl Comp2RefEqualH {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "Comp2RefEqualH";
}

impl QAlgorithm for Comp2RefEqualH {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        let (Some(h), Some(reference)) = (ctx.hist, ctx.reference) else {
            return AlgoResult::inapplicable();
        };
        if !ctx.kind.is_histogram() || ctx.kind == Kind::Profile || ctx.kind == Kind::Profile2d {
            return AlgoResult::inapplicable();
        }
        if !h.same_shape(reference) {
            return AlgoResult::inapplicable();
        }

        let mut bad_channels = Vec::new();
        for (slot, (&a, &b)) in h.contents().iter().zip(reference.contents()).enumerate() {
            if a != b {
                bad_channels.push(BadChannel::x(slot, a, h.sumw2()[slot].sqrt()));
            }
        }
        let prob = if bad_channels.is_empty() { 1.0 } else { 0.0 };
        AlgoResult { prob, bad_channels }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Normalized chi-square comparison of a 1-D histogram or profile against a
/// reference with identical binning.
#[derive(Debug, Default)]
pub struct Comp2RefChi2 {
    /// Chi-square of the last run.
    chi2: f64,
    /// Degrees of freedom of the last run.
    ndof: i64,
}

impl Comp2RefChi2 {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "Comp2RefChi2";

    /// Chi-square computed by the last run.
    #[must_use]
    pub fn chi2(&self) -> f64 {
        self.chi2
    }

    /// Degrees of freedom used by the last run.
    #[must_use]
    pub fn ndof(&self) -> i64 {
        self.ndof
    }

    fn compare(&mut self, h: &Histogram, reference: &Histogram) -> f64 {
        let ncx = h.nbins(0);
        if ncx != reference.nbins(0) {
            return -1.0;
        }

        self.chi2 = -1.0;
        self.ndof = 0;

        let range = 1..=ncx;
        let sum1: f64 = range.clone().map(|i| h.content(i, 0, 0)).sum();
        let sum2: f64 = range.clone().map(|i| reference.content(i, 0, 0)).sum();
        if sum1 == 0.0 || sum2 == 0.0 {
            return -1.0;
        }

        #[allow(clippy::cast_possible_wrap)]
        let mut ndof = ncx as i64;
        let mut chi2 = 0.0;
        for i in range {
            let bin1 = h.content(i, 0, 0) / sum1;
            let bin2 = reference.content(i, 0, 0) / sum2;
            if bin1 == 0.0 && bin2 == 0.0 {
                // No data on either side: one less degree of freedom.
                ndof -= 1;
                continue;
            }
            let err1 = h.error(i, 0, 0);
            let err2 = reference.error(i, 0, 0);
            if err1 == 0.0 && err2 == 0.0 {
                return -1.0;
            }
            let var = (err1 * err1) / (sum1 * sum1) + (err2 * err2) / (sum2 * sum2);
            let diff = bin1 - bin2;
            chi2 += diff * diff / var;
        }

        self.chi2 = chi2;
        self.ndof = ndof;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        chi2_prob(0.5 * chi2, (ndof.max(0) / 2) as u32)
    }
}

impl QAlgorithm for Comp2RefChi2 {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        let (Some(h), Some(reference)) = (ctx.hist, ctx.reference) else {
            return AlgoResult::inapplicable();
        };
        if !one_dimensional(ctx.kind) {
            return AlgoResult::inapplicable();
        }
        AlgoResult::prob(self.compare(h, reference))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Kolmogorov–Smirnov comparison of a 1-D histogram or profile against a
/// reference with identical bin count and edges.
#[derive(Debug, Default)]
pub struct Comp2RefKolmogorov;

impl Comp2RefKolmogorov {
    /// Catalog name.
    pub const ALGO_NAME: &'static str = "Comp2RefKolmogorov";

    #[allow(clippy::cast_possible_truncation)]
    fn compare(h: &Histogram, reference: &Histogram) -> f64 {
        let ncx = h.nbins(0);
        if ncx != reference.nbins(0) {
            return -1.0;
        }
        let (ax, bx) = (h.axis(0), reference.axis(0));
        if (ax.low - bx.low).abs() > EDGE_TOLERANCE || (ax.high - bx.high).abs() > EDGE_TOLERANCE {
            return -1.0;
        }

        let mut sum1 = 0.0;
        let mut sum2 = 0.0;
        let mut w1 = 0.0;
        let mut w2 = 0.0;
        for i in 1..=ncx {
            sum1 += h.content(i, 0, 0);
            sum2 += reference.content(i, 0, 0);
            let e1 = h.error(i, 0, 0);
            let e2 = reference.error(i, 0, 0);
            w1 += e1 * e1;
            w2 += e2 * e2;
        }
        if sum1 == 0.0 || sum2 == 0.0 {
            return -1.0;
        }

        // Totals including the flow bins drive the cumulative comparison.
        let tsum1 = sum1 + h.content(0, 0, 0) + h.content(ncx + 1, 0, 0);
        let tsum2 = sum2 + reference.content(0, 0, 0) + reference.content(ncx + 1, 0, 0);

        // Weighted-fill detection: when the entry count disagrees with the
        // accumulated weight, switch to equivalent entries sum^2 / sum(w^2).
        let equivalent = |entries: f64, tsum: f64, sum: f64, w: f64| {
            let difsum = (entries - tsum) / tsum;
            if difsum > EDGE_TOLERANCE && entries as i64 != ncx as i64 && w > 0.0 {
                sum * sum / w
            } else {
                sum
            }
        };
        let esum1 = equivalent(h.entries(), tsum1, sum1, w1);
        let esum2 = equivalent(reference.entries(), tsum2, sum2, w2);

        let s1 = 1.0 / tsum1;
        let s2 = 1.0 / tsum2;
        let mut dfmax: f64 = 0.0;
        let mut rsum1 = 0.0;
        let mut rsum2 = 0.0;
        for i in 0..=ncx + 1 {
            rsum1 += s1 * h.content(i, 0, 0);
            rsum2 += s2 * reference.content(i, 0, 0);
            dfmax = dfmax.max((rsum1 - rsum2).abs());
        }

        if (rsum1 - 1.0).abs() > 0.002 || (rsum2 - 1.0).abs() > 0.002 {
            warn!(
                histogram = h.name(),
                "numerical problems normalizing cumulative distributions"
            );
        }

        let z = dfmax * (esum1 * esum2 / (esum1 + esum2)).sqrt();
        kolmogorov_prob(z)
    }
}

impl QAlgorithm for Comp2RefKolmogorov {
    fn algo_name(&self) -> &'static str {
        Self::ALGO_NAME
    }

    fn run(&mut self, ctx: &TestContext<'_>) -> AlgoResult {
        let (Some(h), Some(reference)) = (ctx.hist, ctx.reference) else {
            return AlgoResult::inapplicable();
        };
        if !one_dimensional(ctx.kind) {
            return AlgoResult::inapplicable();
        }
        AlgoResult::prob(Self::compare(h, reference))
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

    fn ctx<'a>(
        kind: Kind,
        hist: &'a Histogram,
        reference: Option<&'a Histogram>,
    ) -> TestContext<'a> {
        TestContext {
            fullname: "A/h",
            kind,
            hist: Some(hist),
            reference,
            entries: hist.entries(),
        }
    }

    #[test]
    fn equal_h_passes_on_identical_and_fails_on_any_bin() {
        let mut a = h(10);
        a.fill(&[2.5], 1.0);
        a.fill(&[-1.0], 1.0); // underflow must participate too
        let b = a.clone();
        let mut algo = Comp2RefEqualH;
        assert!((algo.run(&ctx(Kind::H1F, &a, Some(&b))).prob - 1.0).abs() < 1e-12);

        let mut c = b.clone();
        c.fill(&[7.5], 1.0);
        let result = algo.run(&ctx(Kind::H1F, &a, Some(&c)));
        assert!((result.prob).abs() < 1e-12);
        assert_eq!(result.bad_channels.len(), 1);
    }

    #[test]
    fn equal_h_flags_flow_bin_mismatch() {
        let mut a = h(10);
        a.fill(&[50.0], 1.0); // overflow
        let b = h(10);
        let mut algo = Comp2RefEqualH;
        assert!((algo.run(&ctx(Kind::H1F, &a, Some(&b))).prob).abs() < 1e-12);
    }

    #[test]
    fn equal_h_shape_mismatch_is_inapplicable() {
        let a = h(10);
        let b = h(5);
        let mut algo = Comp2RefEqualH;
        assert!(algo.run(&ctx(Kind::H1F, &a, Some(&b))).prob < 0.0);
        assert!(algo.run(&ctx(Kind::H1F, &a, None)).prob < 0.0);
    }

    #[test]
    fn chi2_identical_histograms_probability_near_one() {
        let mut a = h(10);
        for i in 0..10 {
            for _ in 0..(10 + i) {
                a.fill(&[f64::from(i) + 0.5], 1.0);
            }
        }
        let b = a.clone();
        let mut algo = Comp2RefChi2::default();
        let prob = algo.run(&ctx(Kind::H1F, &a, Some(&b))).prob;
        assert!(prob > 0.99, "prob = {prob}");
        assert!(algo.chi2().abs() < 1e-9);
    }

    #[test]
    fn chi2_diverging_histograms_probability_near_zero() {
        let mut a = h(4);
        let mut b = h(4);
        for _ in 0..400 {
            a.fill(&[0.5], 1.0);
            b.fill(&[3.5], 1.0);
        }
        // Give both a little content everywhere so no zero-error bins trip.
        for i in 0..4 {
            a.fill(&[f64::from(i) + 0.5], 1.0);
            b.fill(&[f64::from(i) + 0.5], 1.0);
        }
        let mut algo = Comp2RefChi2::default();
        let prob = algo.run(&ctx(Kind::H1F, &a, Some(&b))).prob;
        assert!(prob < 1e-6, "prob = {prob}");
    }

    #[test]
    fn chi2_rejects_empty_and_mismatched() {
        let a = h(10);
        let mut filled = h(10);
        filled.fill(&[1.0], 1.0);
        let mut algo = Comp2RefChi2::default();
        // Empty test histogram.
        assert!(algo.run(&ctx(Kind::H1F, &a, Some(&filled))).prob < 0.0);
        // Different binning.
        let other = h(5);
        assert!(algo.run(&ctx(Kind::H1F, &filled, Some(&other))).prob < 0.0);
        // Non-zero content with zero errors on both sides.
        let mut flat1 = h(2);
        let mut flat2 = h(2);
        flat1.set_bin_raw(1, 5.0, 0.0, 0.0);
        flat2.set_bin_raw(1, 5.0, 0.0, 0.0);
        assert!(algo.run(&ctx(Kind::H1F, &flat1, Some(&flat2))).prob < 0.0);
    }

    #[test]
    fn chi2_skipped_bins_reduce_ndof() {
        let mut a = h(6);
        let mut b = h(6);
        for _ in 0..50 {
            a.fill(&[0.5], 1.0);
            b.fill(&[0.5], 1.0);
            a.fill(&[1.5], 1.0);
            b.fill(&[1.5], 1.0);
        }
        let mut algo = Comp2RefChi2::default();
        let _ = algo.run(&ctx(Kind::H1F, &a, Some(&b)));
        // Four empty bins on both sides drop out of the six.
        assert_eq!(algo.ndof(), 2);
    }

    #[test]
    fn kolmogorov_identical_histograms_pass() {
        let mut a = h(10);
        for i in 0..1000 {
            a.fill(&[f64::from(i % 10) + 0.3], 1.0);
        }
        let b = a.clone();
        let mut algo = Comp2RefKolmogorov;
        let prob = algo.run(&ctx(Kind::H1F, &a, Some(&b))).prob;
        assert!((prob - 1.0).abs() < 1e-9, "prob = {prob}");
    }

    #[test]
    fn kolmogorov_shifted_distributions_fail() {
        let mut a = h(10);
        let mut b = h(10);
        for _ in 0..500 {
            a.fill(&[1.5], 1.0);
            b.fill(&[8.5], 1.0);
        }
        let mut algo = Comp2RefKolmogorov;
        let prob = algo.run(&ctx(Kind::H1F, &a, Some(&b))).prob;
        assert!(prob < 1e-9, "prob = {prob}");
    }

    #[test]
    fn kolmogorov_requires_matching_edges() {
        let mut a = h(10);
        let mut b = Histogram::new_1d("h", "t", Axis::new(10, 0.0, 20.0));
        a.fill(&[1.0], 1.0);
        b.fill(&[1.0], 1.0);
        let mut algo = Comp2RefKolmogorov;
        assert!(algo.run(&ctx(Kind::H1F, &a, Some(&b))).prob < 0.0);
    }

    #[test]
    fn comparisons_skip_unsupported_kinds() {
        let mut a = Histogram::new_2d("h2", "t", Axis::new(2, 0.0, 2.0), Axis::new(2, 0.0, 2.0));
        a.fill(&[0.5, 0.5], 1.0);
        let b = a.clone();
        let mut chi2 = Comp2RefChi2::default();
        assert!(chi2.run(&ctx(Kind::H2F, &a, Some(&b))).prob < 0.0);
        let mut ks = Comp2RefKolmogorov;
        assert!(ks.run(&ctx(Kind::H2F, &a, Some(&b))).prob < 0.0);
    }
}
