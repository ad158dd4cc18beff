//! Statistical kernels backing the quality-test algorithms.
//!
//! Everything here is hand-rolled rather than imported: the comparison tests
//! depend on the exact tail behavior of these functions (empty-histogram and
//! zero-error edge cases included), so the crate owns the numerics.
//!
//! Contents:
//! - chi-square tail probability via the regularized incomplete gamma
//!   function (series + continued fraction),
//! - the Kolmogorov distribution tail,
//! - the Abramowitz–Stegun five-term erfc approximation,
//! - the Landau density (piecewise rational approximation) and a small
//!   Nelder–Mead chi-square fitter for it,
//! - binomial log-likelihood-ratio significances for occupancy rules.

/// Convergence tolerance for the incomplete-gamma expansions.
const GAMMA_EPS: f64 = 3.0e-12;
/// Smallest representable scale in the continued-fraction evaluation.
const FPMIN: f64 = 1.0e-300;

/// Natural log of the gamma function (Lanczos approximation).
fn ln_gamma(x: f64) -> f64 {
    const COF: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000_000_000_190_015;
    for c in COF {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
}

/// Regularized upper incomplete gamma function `Q(a, x)`.
fn gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    if a <= 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        // Series for P(a, x); Q = 1 - P.
        let mut ap = a;
        let mut sum = 1.0 / a;
        let mut del = sum;
        for _ in 0..500 {
            ap += 1.0;
            del *= x / ap;
            sum += del;
            if del.abs() < sum.abs() * GAMMA_EPS {
                break;
            }
        }
        1.0 - sum * (-x + a * x.ln() - ln_gamma(a)).exp()
    } else {
        // Lentz continued fraction for Q directly.
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / FPMIN;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..500 {
            let an = -f64::from(i) * (f64::from(i) - a);
            b += 2.0;
            d = an.mul_add(d, b);
            if d.abs() < FPMIN {
                d = FPMIN;
            }
            c = b + an / c;
            if c.abs() < FPMIN {
                c = FPMIN;
            }
            d = 1.0 / d;
            let del = d * c;
            h *= del;
            if (del - 1.0).abs() < GAMMA_EPS {
                break;
            }
        }
        (-x + a * x.ln() - ln_gamma(a)).exp() * h
    }
}

/// Probability that a chi-square with `ndof` degrees of freedom exceeds
/// `chi2`.
///
/// Degenerate inputs follow the usual convention: negative `chi2` yields 0,
/// and zero degrees of freedom yields 1 for `chi2 == 0` and 0 otherwise.
#[must_use]
pub fn chi2_prob(chi2: f64, ndof: u32) -> f64 {
    if chi2 < 0.0 {
        return 0.0;
    }
    if ndof == 0 {
        return if chi2 == 0.0 { 1.0 } else { 0.0 };
    }
    gamma_q(f64::from(ndof) / 2.0, chi2 / 2.0)
}

/// Tail of the Kolmogorov distribution: the probability that the scaled KS
/// statistic exceeds `z`.
#[must_use]
pub fn kolmogorov_prob(z: f64) -> f64 {
    const W: f64 = 2.506_628_27;
    const C1: f64 = -1.233_700_550_136_169_7; // -pi^2 / 8
    const C2: f64 = -11.103_304_951_225_528;
    const C3: f64 = -30.842_513_753_404_244;
    const FJ: [f64; 4] = [-2.0, -8.0, -18.0, -32.0];

    let u = z.abs();
    if u < 0.2 {
        1.0
    } else if u < 0.755 {
        let v = 1.0 / (u * u);
        1.0 - W * ((C1 * v).exp() + (C2 * v).exp() + (C3 * v).exp()) / u
    } else if u < 6.8116 {
        let v = u * u;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let maxj = (3.0 / u).round().max(1.0) as usize;
        let mut r = [0.0_f64; 4];
        for (j, slot) in r.iter_mut().enumerate().take(maxj) {
            *slot = (FJ[j] * v).exp();
        }
        2.0 * (r[0] - r[1] + r[2] - r[3])
    } else {
        0.0
    }
}

/// Complementary error function, Abramowitz–Stegun 7.1.26 (five-term
/// polynomial, absolute error below 1.5e-7).
#[must_use]
pub fn erfc_as(x: f64) -> f64 {
    const P: f64 = 0.327_591_1;
    const A: [f64; 5] = [
        0.254_829_592,
        -0.284_496_736,
        1.421_413_741,
        -1.453_152_027,
        1.061_405_429,
    ];
    let ax = x.abs();
    let t = 1.0 / P.mul_add(ax, 1.0);
    let poly = t * (A[0] + t * (A[1] + t * (A[2] + t * (A[3] + t * A[4]))));
    let erfc = poly * (-ax * ax).exp();
    if x >= 0.0 { erfc } else { 2.0 - erfc }
}

/// Landau density at `v` for location 0 and scale 1 (piecewise rational
/// approximation; peak near `v = -0.2228`).
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn landau_density(v: f64) -> f64 {
    const P1: [f64; 5] = [
        0.425_989_487_5,
        -0.124_976_255,
        0.039_842_437,
        -0.006_298_287_635,
        0.001_511_162_253,
    ];
    const Q1: [f64; 5] = [
        1.0,
        -0.338_826_062_9,
        0.095_943_933_23,
        -0.016_080_422_83,
        0.003_778_942_063,
    ];
    const P2: [f64; 5] = [
        0.178_854_160_9,
        0.117_395_740_3,
        0.014_888_505_18,
        -0.001_394_989_411,
        0.000_128_361_721_1,
    ];
    const Q2: [f64; 5] = [
        1.0,
        0.742_879_508_2,
        0.315_393_296_1,
        0.066_942_195_48,
        0.008_790_609_714,
    ];
    const P3: [f64; 5] = [
        0.178_854_450_3,
        0.093_591_616_62,
        0.006_325_387_654,
        0.000_066_116_673_19,
        -0.000_002_031_049_101,
    ];
    const Q3: [f64; 5] = [
        1.0,
        0.609_780_992_1,
        0.256_061_666_5,
        0.047_467_223_84,
        0.006_957_301_675,
    ];
    const P4: [f64; 5] = [
        0.987_405_440_7,
        118.672_327_3,
        849.279_436,
        -743.779_244_4,
        427.026_218_6,
    ];
    const Q4: [f64; 5] = [1.0, 106.861_596_1, 337.649_621_4, 2_016.712_389, 1_597.063_511];
    const P5: [f64; 5] = [
        1.003_675_074,
        167.570_243_4,
        4_789.711_289,
        21_217.867_67,
        -22_324.949_1,
    ];
    const Q5: [f64; 5] = [1.0, 156.942_453_7, 3_745.310_488, 9_834.698_876, 66_924.283_57];
    const P6: [f64; 5] = [
        1.000_827_619,
        664.914_313_6,
        62_972.926_65,
        475_554.699_8,
        -5_743_609.109,
    ];
    const Q6: [f64; 5] = [
        1.0,
        651.410_109_8,
        56_974.733_33,
        165_917.472_5,
        -2_815_759.939,
    ];
    const A1: [f64; 3] = [0.041_666_666_67, -0.019_965_277_78, 0.027_095_389_66];
    const A2: [f64; 2] = [-1.845_568_67, -4.284_640_743];

    let rational = |p: &[f64; 5], q: &[f64; 5], x: f64| {
        (p[0] + x * (p[1] + x * (p[2] + x * (p[3] + x * p[4]))))
            / (q[0] + x * (q[1] + x * (q[2] + x * (q[3] + x * q[4]))))
    };

    if v < -5.5 {
        let u = (v + 1.0).exp();
        if u < 1e-10 {
            return 0.0;
        }
        let ue = (-1.0 / u).exp();
        let us = u.sqrt();
        0.398_942_280_3 * (ue / us) * (1.0 + (A1[0] + (A1[1] + A1[2] * u) * u) * u)
    } else if v < -1.0 {
        let u = (-v - 1.0).exp();
        (-u).exp() * u.sqrt() * rational(&P1, &Q1, v)
    } else if v < 1.0 {
        rational(&P2, &Q2, v)
    } else if v < 5.0 {
        rational(&P3, &Q3, v)
    } else if v < 12.0 {
        let u = 1.0 / v;
        u * u * rational(&P4, &Q4, u)
    } else if v < 50.0 {
        let u = 1.0 / v;
        u * u * rational(&P5, &Q5, u)
    } else if v < 300.0 {
        let u = 1.0 / v;
        u * u * rational(&P6, &Q6, u)
    } else {
        let u = 1.0 / (v - v * v.ln() / (v + 1.0));
        u * u * (1.0 + (A2[0] + A2[1] * u) * u)
    }
}

/// Result of a successful Landau chi-square fit.
#[derive(Debug, Clone, Copy)]
pub struct LandauFit {
    /// Fitted normalization (area scale).
    pub norm: f64,
    /// Fitted most-probable value.
    pub mpv: f64,
    /// Fitted scale parameter.
    pub sigma: f64,
    /// Uncertainty on the most-probable value from a delta-chi-square = 1
    /// scan.
    pub mpv_error: f64,
}

/// One fit point: bin center, observed content, content error.
pub type FitPoint = (f64, f64, f64);

fn landau_chi2(points: &[FitPoint], norm: f64, mpv: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return f64::INFINITY;
    }
    let mut chi2 = 0.0;
    for &(x, y, err) in points {
        if err <= 0.0 {
            continue;
        }
        let model = norm * landau_density((x - mpv) / sigma);
        let d = (y - model) / err;
        chi2 += d * d;
    }
    chi2
}

/// Fit a Landau shape to `points` by Nelder–Mead chi-square minimization.
///
/// `points` should already be restricted to the fit range and carry positive
/// errors (zero-error points are ignored). Returns `None` when fewer than
/// four usable points exist, when the simplex fails to shrink, or when the
/// MPV uncertainty scan cannot bracket `chi2_min + 1`.
#[must_use]
pub fn fit_landau(points: &[FitPoint], seeds: (f64, f64, f64)) -> Option<LandauFit> {
    let usable = points.iter().filter(|&&(_, _, e)| e > 0.0).count();
    if usable < 4 {
        return None;
    }

    let f = |p: &[f64; 3]| landau_chi2(points, p[0], p[1], p[2]);
    let start = [seeds.0, seeds.1, seeds.2];
    let best = nelder_mead(&f, start)?;
    let (norm, mpv, sigma) = (best.0[0], best.0[1], best.0[2]);
    let chi2_min = best.1;
    if !chi2_min.is_finite() || sigma <= 0.0 {
        return None;
    }

    let mpv_error = scan_mpv_error(points, norm, mpv, sigma, chi2_min)?;
    Some(LandauFit {
        norm,
        mpv,
        sigma,
        mpv_error,
    })
}

/// Walk outward from the fitted MPV until chi2 crosses `chi2_min + 1`, then
/// interpolate the crossing linearly. Other parameters stay fixed.
fn scan_mpv_error(
    points: &[FitPoint],
    norm: f64,
    mpv: f64,
    sigma: f64,
    chi2_min: f64,
) -> Option<f64> {
    let target = chi2_min + 1.0;
    let step = (sigma / 50.0).max(1e-9);
    let mut prev_chi2 = chi2_min;
    for i in 1..=2000 {
        let d = step * f64::from(i);
        let chi2 = landau_chi2(points, norm, mpv + d, sigma)
            .min(landau_chi2(points, norm, mpv - d, sigma));
        if chi2 >= target {
            let frac = if chi2 > prev_chi2 {
                (target - prev_chi2) / (chi2 - prev_chi2)
            } else {
                1.0
            };
            return Some(step * (f64::from(i) - 1.0 + frac));
        }
        prev_chi2 = chi2;
    }
    None
}

/// Minimal Nelder–Mead over three parameters. Returns the best vertex and
/// its function value, or `None` if the objective never becomes finite.
fn nelder_mead(f: &dyn Fn(&[f64; 3]) -> f64, start: [f64; 3]) -> Option<([f64; 3], f64)> {
    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;
    const ITERATIONS: usize = 400;

    let mut simplex: Vec<([f64; 3], f64)> = Vec::with_capacity(4);
    simplex.push((start, f(&start)));
    for i in 0..3 {
        let mut v = start;
        let delta = if v[i].abs() > 1e-12 {
            v[i] * 0.1
        } else {
            0.05
        };
        v[i] += delta;
        simplex.push((v, f(&v)));
    }

    for _ in 0..ITERATIONS {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let best = simplex[0].1;
        let worst = simplex[3].1;
        if worst.is_finite() && (worst - best).abs() < 1e-10 * (1.0 + best.abs()) {
            break;
        }

        let mut centroid = [0.0; 3];
        for (v, _) in &simplex[..3] {
            for k in 0..3 {
                centroid[k] += v[k] / 3.0;
            }
        }

        let reflect = |scale: f64| {
            let mut v = [0.0; 3];
            for k in 0..3 {
                v[k] = centroid[k] + scale * (centroid[k] - simplex[3].0[k]);
            }
            v
        };

        let xr = reflect(ALPHA);
        let fr = f(&xr);
        if fr < simplex[0].1 {
            let xe = reflect(GAMMA);
            let fe = f(&xe);
            simplex[3] = if fe < fr { (xe, fe) } else { (xr, fr) };
        } else if fr < simplex[2].1 {
            simplex[3] = (xr, fr);
        } else {
            let xc = reflect(-RHO);
            let fc = f(&xc);
            if fc < simplex[3].1 {
                simplex[3] = (xc, fc);
            } else {
                let best_v = simplex[0].0;
                for vertex in &mut simplex[1..] {
                    for k in 0..3 {
                        vertex.0[k] = best_v[k] + SIGMA * (vertex.0[k] - best_v[k]);
                    }
                    vertex.1 = f(&vertex.0);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    simplex[0].1.is_finite().then_some(simplex[0])
}

/// Binomial log-likelihood-ratio significances for an observed failure count.
///
/// With `total` trials, `failed` failures, and an allowed failure fraction
/// `eps_max`, returns `(s_fail, s_pass)`: the significance of the failure
/// hypothesis when the observed fraction exceeds `eps_max` (else 0), and of
/// the pass hypothesis when it does not (else 0). Both are
/// `sqrt(2 * (lnL(observed) - lnL(eps_max)))` with the binomial
/// log-likelihood; zero-count terms are dropped.
#[must_use]
pub fn binomial_significance(total: f64, failed: f64, eps_max: f64) -> (f64, f64) {
    if total <= 0.0 || !(0.0..1.0).contains(&eps_max) || eps_max <= 0.0 {
        return (0.0, 0.0);
    }
    let observed = (failed / total).clamp(0.0, 1.0);
    let lnl = |p: f64| {
        let mut l = 0.0;
        if failed > 0.0 {
            l += failed * p.ln();
        }
        if total - failed > 0.0 {
            l += (total - failed) * (1.0 - p).ln();
        }
        l
    };
    let llr = 2.0 * (lnl(observed) - lnl(eps_max));
    let s = llr.max(0.0).sqrt();
    if observed > eps_max { (s, 0.0) } else { (0.0, s) }
}
