//! Ridge regression primitives
//!
//! The design matrices here are small (a few hundred rows, ~28 columns), so
//! everything is solved through explicit normal equations: build X'WX and
//! X'Wy, add the ridge penalty to the diagonal, and solve. Cholesky handles
//! the healthy case; a symmetric eigendecomposition pseudo-inverse picks up
//! near-singular systems so a model fit never surfaces an error.

/// Dot product; panics on length mismatch in debug builds only.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Logistic squashing with overflow guards.
pub fn sigmoid(z: f64) -> f64 {
    if z > 50.0 {
        return 1.0;
    }
    if z < -50.0 {
        return 0.0;
    }
    1.0 / (1.0 + (-z).exp())
}

/// Closed-form ridge: w = (X'X + αI)^-1 X'y
pub fn ridge_fit(xs: &[Vec<f64>], y: &[f64], alpha: f64) -> Vec<f64> {
    ridge_fit_weighted(xs, y, alpha, None)
}

/// Weighted ridge over per-row weights (all ones when absent).
pub fn ridge_fit_weighted(xs: &[Vec<f64>], y: &[f64], alpha: f64, weights: Option<&[f64]>) -> Vec<f64> {
    let d = xs.first().map(|r| r.len()).unwrap_or(0);
    if d == 0 {
        return Vec::new();
    }

    let mut xtx = vec![vec![0.0; d]; d];
    let mut xty = vec![0.0; d];

    for (n, row) in xs.iter().enumerate() {
        let w = weights.map(|ws| ws[n]).unwrap_or(1.0);
        for i in 0..d {
            let wxi = w * row[i];
            xty[i] += wxi * y[n];
            for j in i..d {
                xtx[i][j] += wxi * row[j];
            }
        }
    }
    // Mirror the upper triangle.
    for i in 0..d {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
    }

    // Strictly positive ridge keeps the system positive definite.
    let a = alpha.max(1e-6);
    for (i, row) in xtx.iter_mut().enumerate() {
        row[i] += a;
    }

    solve_symmetric(&xtx, &xty)
}

/// Huber-robust ridge via iteratively reweighted least squares.
///
/// Residuals beyond `delta` are downweighted by delta/|r| each iteration,
/// so isolated spikes stop dominating the fit.
pub fn ridge_fit_huber(xs: &[Vec<f64>], y: &[f64], alpha: f64, delta: f64, iters: usize) -> Vec<f64> {
    let mut coef = ridge_fit(xs, y, alpha);

    for _ in 0..iters {
        let weights: Vec<f64> = xs
            .iter()
            .zip(y)
            .map(|(row, &target)| {
                let resid = (target - dot(row, &coef)).abs();
                if resid > delta {
                    delta / resid.max(1e-12)
                } else {
                    1.0
                }
            })
            .collect();
        coef = ridge_fit_weighted(xs, y, alpha, Some(&weights));
    }

    coef
}

/// Column means and standard deviations of a design matrix.
///
/// Near-constant columns get std 1.0 so standardizing never divides by a
/// vanishing denominator. The bias column comes out as (1, 1) and is skipped
/// at application time.
pub fn fit_standardizer(xs: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let d = xs.first().map(|r| r.len()).unwrap_or(0);
    let n = xs.len().max(1) as f64;

    let mut mean = vec![0.0; d];
    for row in xs {
        for (m, &v) in mean.iter_mut().zip(row) {
            *m += v;
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let mut std = vec![0.0; d];
    for row in xs {
        for ((s, &v), &m) in std.iter_mut().zip(row).zip(&mean) {
            *s += (v - m) * (v - m);
        }
    }
    for s in &mut std {
        *s = (*s / n).sqrt();
        if *s < 1e-12 {
            *s = 1.0;
        }
    }

    (mean, std)
}

/// Standardize a feature row in place, leaving the leading bias untouched.
pub fn standardize_row(row: &mut [f64], mean: &[f64], std: &[f64]) {
    for i in 1..row.len() {
        row[i] = (row[i] - mean[i]) / std[i];
    }
}

/// Solve the symmetric system A x = b: Cholesky first, pseudo-inverse on
/// failure.
fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    match cholesky_solve(a, b) {
        Some(x) => x,
        None => pinv_solve(a, b),
    }
}

/// Cholesky decomposition solve; None when A is not positive definite.
fn cholesky_solve(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // Forward substitution: L z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * z[j];
        }
        z[i] = sum / l[i][i];
    }

    // Back substitution: L' x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for j in i + 1..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    Some(x)
}

/// Pseudo-inverse solve for a symmetric matrix via cyclic Jacobi
/// eigendecomposition: eigenvalues below tolerance are treated as zero.
fn pinv_solve(a: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut m: Vec<Vec<f64>> = a.to_vec();
    let mut v = vec![vec![0.0; n]; n];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    // Cyclic Jacobi sweeps; 30 is far more than needed at this size.
    for _ in 0..30 {
        let mut off = 0.0;
        for i in 0..n {
            for j in i + 1..n {
                off += m[i][j] * m[i][j];
            }
        }
        if off < 1e-18 {
            break;
        }

        for p in 0..n {
            for q in p + 1..n {
                if m[p][q].abs() < 1e-30 {
                    continue;
                }
                let theta = (m[q][q] - m[p][p]) / (2.0 * m[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (mkp, mkq) = (m[k][p], m[k][q]);
                    m[k][p] = c * mkp - s * mkq;
                    m[k][q] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let (mpk, mqk) = (m[p][k], m[q][k]);
                    m[p][k] = c * mpk - s * mqk;
                    m[q][k] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[k][p], v[k][q]);
                    v[k][p] = c * vkp - s * vkq;
                    v[k][q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues: Vec<f64> = (0..n).map(|i| m[i][i]).collect();
    let max_eig = eigenvalues.iter().fold(0.0f64, |acc, e| acc.max(e.abs()));
    let tol = max_eig * 1e-10;

    // x = V diag(1/λ) V' b, zeroing tiny eigenvalues
    let mut vtb = vec![0.0; n];
    for i in 0..n {
        for k in 0..n {
            vtb[i] += v[k][i] * b[k];
        }
    }
    for (i, e) in eigenvalues.iter().enumerate() {
        vtb[i] = if e.abs() > tol { vtb[i] / e } else { 0.0 };
    }
    let mut x = vec![0.0; n];
    for k in 0..n {
        for i in 0..n {
            x[k] += v[k][i] * vtb[i];
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ridge_recovers_known_coefficients() {
        // y = 2 + 3x with negligible regularization.
        let xs: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0, i as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| 2.0 + 3.0 * i as f64).collect();

        let w = ridge_fit(&xs, &y, 1e-6);
        assert!((w[0] - 2.0).abs() < 1e-3, "intercept {}", w[0]);
        assert!((w[1] - 3.0).abs() < 1e-4, "slope {}", w[1]);
    }

    #[test]
    fn test_ridge_shrinks_with_large_alpha() {
        let xs: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0, i as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| 2.0 + 3.0 * i as f64).collect();

        let small = ridge_fit(&xs, &y, 1e-6);
        let large = ridge_fit(&xs, &y, 1e4);
        assert!(large[1].abs() < small[1].abs());
    }

    #[test]
    fn test_singular_system_falls_back_to_pinv() {
        // Duplicate columns make X'X singular without the ridge term; with
        // alpha at the 1e-6 floor Cholesky may still pass, so drive the
        // pseudo-inverse directly.
        let a = vec![
            vec![1.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![0.0, 0.0, 2.0],
        ];
        let b = vec![2.0, 2.0, 4.0];

        let x = pinv_solve(&a, &b);
        // Minimum-norm solution: x0 = x1 = 1, x2 = 2.
        assert!((x[0] - 1.0).abs() < 1e-6, "x0 {}", x[0]);
        assert!((x[1] - 1.0).abs() < 1e-6, "x1 {}", x[1]);
        assert!((x[2] - 2.0).abs() < 1e-6, "x2 {}", x[2]);
    }

    #[test]
    fn test_collinear_fit_never_panics() {
        let xs: Vec<Vec<f64>> = (0..15)
            .map(|i| vec![1.0, i as f64, i as f64])
            .collect();
        let y: Vec<f64> = (0..15).map(|i| i as f64).collect();

        let w = ridge_fit(&xs, &y, 1e-6);
        assert!(w.iter().all(|v| v.is_finite()));
        // Prediction still works despite the duplicated regressor.
        let pred = dot(&[1.0, 10.0, 10.0], &w);
        assert!((pred - 10.0).abs() < 0.5, "pred {}", pred);
    }

    #[test]
    fn test_huber_downweights_outlier() {
        let mut xs: Vec<Vec<f64>> = (0..30).map(|i| vec![1.0, i as f64]).collect();
        let mut y: Vec<f64> = (0..30).map(|i| 1.0 + 0.5 * i as f64).collect();
        // One wild spike.
        xs.push(vec![1.0, 15.0]);
        y.push(500.0);

        let plain = ridge_fit(&xs, &y, 1e-6);
        let robust = ridge_fit_huber(&xs, &y, 1e-6, 5.0, 6);

        let truth_at_20 = 1.0 + 0.5 * 20.0;
        let plain_err = (dot(&[1.0, 20.0], &plain) - truth_at_20).abs();
        let robust_err = (dot(&[1.0, 20.0], &robust) - truth_at_20).abs();
        assert!(robust_err < plain_err);
        assert!(robust_err < 1.0, "robust error {}", robust_err);
    }

    #[test]
    fn test_standardizer() {
        let xs = vec![
            vec![1.0, 10.0, 5.0],
            vec![1.0, 20.0, 5.0],
            vec![1.0, 30.0, 5.0],
        ];
        let (mean, std) = fit_standardizer(&xs);

        assert_eq!(mean[1], 20.0);
        // Constant column keeps std 1.0.
        assert_eq!(std[2], 1.0);

        let mut row = vec![1.0, 20.0, 5.0];
        standardize_row(&mut row, &mean, &std);
        assert_eq!(row[0], 1.0); // bias untouched
        assert_eq!(row[1], 0.0);
        assert_eq!(row[2], 0.0);
    }

    #[test]
    fn test_sigmoid_guards() {
        assert_eq!(sigmoid(100.0), 1.0);
        assert_eq!(sigmoid(-100.0), 0.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
    }
}
