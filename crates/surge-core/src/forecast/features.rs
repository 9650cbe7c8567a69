//! Feature engineering for the gated forecaster
//!
//! Every training row and every recursive-forecast row goes through the
//! same fixed layout: bias, autoregressive lags, a shifted trailing mean,
//! weekday indicators (Monday dropped against the intercept), dormancy
//! features (is-zero flag, zero-run length, last nonzero, trailing max,
//! EMA), and two Fourier harmonics over a weekly period.
//!
//! The target is mapped onto logit scale before regression so the bounded
//! [0, 100] range stops distorting the tails; predictions are inverse-mapped
//! afterwards.

use chrono::{Datelike, Duration, NaiveDate};

use crate::series::DailySeries;

pub const LAGS: [usize; 11] = [1, 2, 3, 4, 5, 6, 7, 14, 21, 28, 35];
pub const MAX_LAG: usize = 35;
pub const MA_WINDOW: usize = 7;
pub const FOURIER_PERIOD: f64 = 7.0;
pub const FOURIER_K: usize = 2;
pub const EPS_ZERO: f64 = 1e-9;

/// Row layout: bias, 11 lags, ma7, wd_1..wd_6, z_lag1, z_run, prev_nz,
/// max14, ema7, s1, c1, s2, c2.
pub const FEATURE_LEN: usize = 1 + LAGS.len() + 1 + 6 + 5 + 2 * FOURIER_K;

/// Raw-row indices needed again at forecast time.
pub const IDX_Z_RUN: usize = 1 + LAGS.len() + 1 + 6 + 1;
pub const IDX_PREV_NZ: usize = IDX_Z_RUN + 1;
pub const IDX_MAX14: usize = IDX_PREV_NZ + 1;
pub const IDX_EMA7: usize = IDX_MAX14 + 1;

/// Map interest [0, 100] onto logit scale.
pub fn to_logit(y: f64) -> f64 {
    let p = ((y + 0.5) / 101.0).clamp(1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

/// Inverse of [`to_logit`], clipped back into [0, 100].
pub fn from_logit(z: f64) -> f64 {
    let p = crate::forecast::linalg::sigmoid(z);
    (101.0 * p - 0.5).clamp(0.0, 100.0)
}

/// Consecutive near-zero days at the end of `values`, capped.
pub fn trailing_zero_run(values: &[f64], cap: f64) -> f64 {
    let mut run: f64 = 0.0;
    for &v in values.iter().rev() {
        if v.abs() < EPS_ZERO {
            run += 1.0;
        } else {
            break;
        }
    }
    run.min(cap)
}

fn weekday_index(date: NaiveDate) -> usize {
    // Monday = 0 .. Sunday = 6; Monday is the dropped baseline.
    date.weekday().num_days_from_monday() as usize
}

fn last_nonzero(values: &[f64]) -> f64 {
    values
        .iter()
        .rev()
        .find(|v| **v > EPS_ZERO)
        .copied()
        .unwrap_or(0.0)
}

fn tail_mean(values: &[f64], window: usize) -> f64 {
    let tail = &values[values.len().saturating_sub(window)..];
    if tail.is_empty() {
        return 0.0;
    }
    tail.iter().sum::<f64>() / tail.len() as f64
}

fn tail_max(values: &[f64], window: usize) -> f64 {
    values[values.len().saturating_sub(window)..]
        .iter()
        .fold(0.0f64, |acc, &v| acc.max(v))
}

/// EMA with span 7 over the last 50 values, zero-initialized. The burn-in
/// makes the initialization irrelevant by the time it reaches the tail.
fn tail_ema(values: &[f64], span: usize) -> f64 {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut ema = 0.0;
    for &v in &values[values.len().saturating_sub(50)..] {
        ema = alpha * v + (1.0 - alpha) * ema;
    }
    ema
}

/// Build the feature row for the day following `history`.
///
/// `history` is everything known before the day being predicted (actuals
/// plus any prior predictions); `t` is the row's position on the Fourier
/// clock, counted in design rows.
pub fn feature_row(history: &[f64], next_date: NaiveDate, t: usize, zero_run_cap: f64) -> Vec<f64> {
    let n = history.len();
    let mut row = Vec::with_capacity(FEATURE_LEN);

    row.push(1.0);
    for &lag in &LAGS {
        row.push(if n >= lag { history[n - lag] } else { history[0] });
    }
    row.push(tail_mean(history, MA_WINDOW));

    let wd = weekday_index(next_date);
    for k in 1..=6 {
        row.push(if wd == k { 1.0 } else { 0.0 });
    }

    row.push(if history[n - 1].abs() < EPS_ZERO { 1.0 } else { 0.0 });
    row.push(trailing_zero_run(history, zero_run_cap));
    row.push(last_nonzero(history));
    row.push(tail_max(history, 14));
    row.push(tail_ema(history, MA_WINDOW));

    for k in 1..=FOURIER_K {
        let phase = 2.0 * std::f64::consts::PI * k as f64 * t as f64 / FOURIER_PERIOD;
        row.push(phase.sin());
        row.push(phase.cos());
    }

    debug_assert_eq!(row.len(), FEATURE_LEN);
    row
}

/// Build the supervised design matrix from a dense daily series.
///
/// Rows start once every lag is available; targets stay on the original
/// interest scale (the logit transform is applied per fitting stage).
/// Returns None when the series is too short to produce any row.
pub fn design_matrix(series: &DailySeries, zero_run_cap: f64) -> Option<(Vec<Vec<f64>>, Vec<f64>)> {
    let values = series.values();
    let n = values.len();
    if n <= MAX_LAG {
        return None;
    }

    let n_rows = n - MAX_LAG;
    let mut xs = Vec::with_capacity(n_rows);
    let mut ys = Vec::with_capacity(n_rows);

    // Training rows use the running EMA from the very start of the series;
    // it converges to the tail formula well inside the burn-in.
    let alpha = 2.0 / (MA_WINDOW as f64 + 1.0);
    let mut ema = values[0];
    for &v in &values[1..MAX_LAG] {
        ema = alpha * v + (1.0 - alpha) * ema;
    }

    for t in MAX_LAG..n {
        let history = &values[..t];
        let date = series.start() + Duration::days(t as i64);

        let mut row = feature_row(history, date, t - MAX_LAG, zero_run_cap);
        // Overwrite the tail EMA with the exact running value.
        row[IDX_EMA7] = ema;

        xs.push(row);
        ys.push(values[t]);

        ema = alpha * values[t] + (1.0 - alpha) * ema;
    }

    Some((xs, ys))
}
