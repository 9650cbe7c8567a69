//! Two-stage gated forecaster
//!
//! Stage one is a ridge classifier deciding whether a day has signal at
//! all; stage two is a Huber-robust ridge regression on the logit-scaled
//! positive days. The gate threshold is picked on a held-out slice and a
//! small α×τ grid is scored by replaying a recursive forecast against a
//! training tail, with near-zero days weighted 3x so reviving a dormant
//! keyword costs more than missing a spike.

use chrono::Duration;
use tracing::debug;

use crate::config::ForecastSettings;
use crate::error::{Error, Result};
use crate::series::DailySeries;

use super::features::{
    design_matrix, feature_row, from_logit, to_logit, EPS_ZERO, IDX_MAX14, IDX_PREV_NZ, IDX_Z_RUN,
    MAX_LAG,
};
use super::linalg::{
    dot, fit_standardizer, ridge_fit, ridge_fit_huber, sigmoid, standardize_row,
};

/// A fitted per-slug model. Ephemeral: rebuilt on every forecasting run,
/// never persisted.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub alpha: f64,
    pub tau: f64,
    pub gate_weights: Vec<f64>,
    pub reg_weights: Vec<f64>,
    pub feature_mean: Vec<f64>,
    pub feature_std: Vec<f64>,
}

/// The gate bar for one forecast day: the longer the series has sat at
/// zero, the more probability mass it takes to revive it.
pub fn dynamic_threshold(tau: f64, zero_run: f64, gain: f64) -> f64 {
    (tau + gain * (zero_run / (zero_run + 4.0))).clamp(0.05, 0.95)
}

/// Fit the zero-vs-nonzero gate: ridge on the binary indicator.
fn fit_zero_gate(xs: &[Vec<f64>], y: &[f64], alpha: f64) -> Vec<f64> {
    let y_bin: Vec<f64> = y
        .iter()
        .map(|&v| if v > EPS_ZERO { 1.0 } else { 0.0 })
        .collect();
    ridge_fit(xs, &y_bin, alpha)
}

/// Sweep 11 thresholds in [0.10, 0.60] on the holdout, maximizing F1
/// against actual-positive days. Empty holdout keeps the 0.35 default.
fn pick_tau(gate_weights: &[f64], x_hold: &[Vec<f64>], y_hold: &[f64]) -> f64 {
    let probs: Vec<f64> = x_hold.iter().map(|row| sigmoid(dot(row, gate_weights))).collect();
    let actual: Vec<bool> = y_hold.iter().map(|&v| v > EPS_ZERO).collect();

    let mut best_tau = 0.35;
    let mut best_f1 = 0.0;

    for i in 0..11 {
        let tau = 0.10 + 0.05 * i as f64;
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut fneg = 0.0;
        for (p, &a) in probs.iter().zip(&actual) {
            let predicted = *p >= tau;
            match (predicted, a) {
                (true, true) => tp += 1.0,
                (true, false) => fp += 1.0,
                (false, true) => fneg += 1.0,
                (false, false) => {}
            }
        }
        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fneg > 0.0 { tp / (tp + fneg) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        if f1 > best_f1 {
            best_f1 = f1;
            best_tau = tau;
        }
    }

    best_tau
}

/// Fit the regression stage: Huber ridge on the logit target, restricted to
/// positive-interest rows when there are enough of them.
fn fit_regression(xs: &[Vec<f64>], y: &[f64], alpha: f64, cfg: &ForecastSettings) -> Vec<f64> {
    let positive: Vec<usize> = (0..y.len()).filter(|&i| y[i] > EPS_ZERO).collect();

    let (x_fit, z_fit): (Vec<Vec<f64>>, Vec<f64>) = if positive.len() < 10 {
        (xs.to_vec(), y.iter().map(|&v| to_logit(v)).collect())
    } else {
        (
            positive.iter().map(|&i| xs[i].clone()).collect(),
            positive.iter().map(|&i| to_logit(y[i])).collect(),
        )
    };

    ridge_fit_huber(&x_fit, &z_fit, alpha, cfg.huber_delta, cfg.huber_iters)
}

/// Step-by-step recursive forecast.
///
/// `history` is consumed as the running series: each prediction is appended
/// before the next step so lags and dormancy features see prior
/// predictions. `t_start` continues the training rows' Fourier clock.
fn recursive_forecast(
    model: &TrainedModel,
    mut history: Vec<f64>,
    first_date: chrono::NaiveDate,
    t_start: usize,
    horizon: usize,
    cfg: &ForecastSettings,
) -> Vec<f64> {
    let mut preds = Vec::with_capacity(horizon);
    let mut date = first_date;

    for step in 0..horizon {
        let raw = feature_row(&history, date, t_start + step, cfg.zero_run_cap);
        let zero_run = raw[IDX_Z_RUN];
        let prev_nz = raw[IDX_PREV_NZ];
        let max14 = raw[IDX_MAX14];

        let mut x = raw;
        standardize_row(&mut x, &model.feature_mean, &model.feature_std);

        let p = sigmoid(dot(&x, &model.gate_weights));
        let tau_dyn = dynamic_threshold(model.tau, zero_run, cfg.dyn_tau_gain);

        let mut yhat = if p < tau_dyn {
            0.0
        } else {
            let raw_pred = from_logit(dot(&x, &model.reg_weights));
            let scaled = if cfg.soft_gate {
                let s = ((p - tau_dyn) / (1.0 - tau_dyn).max(1e-6)).clamp(0.0, 1.0);
                raw_pred * s
            } else {
                raw_pred
            };
            // A single day's prediction may not leap past recent behavior.
            let cap = (max14 * 1.25).max(prev_nz * 1.5).max(10.0);
            scaled.min(cap)
        };
        yhat = yhat.clamp(0.0, 100.0);

        preds.push(yhat);
        history.push(yhat);
        date += Duration::days(1);
    }

    preds
}

/// Train the two-stage model for one slug's history.
pub fn train(series: &DailySeries, cfg: &ForecastSettings) -> Result<TrainedModel> {
    let (xs_raw, y) = design_matrix(series, cfg.zero_run_cap)
        .ok_or_else(|| Error::Model("history too short for feature lags".to_string()))?;
    let n = xs_raw.len();
    if n < 12 {
        return Err(Error::Model(format!("only {} usable training rows", n)));
    }

    // Hold out the tail for the hyperparameter search.
    let split = if n > cfg.val_days + 10 {
        n - cfg.val_days
    } else {
        (n as f64 * 0.8) as usize
    };
    let split = split.clamp(10, n - 2);

    let (mean, std) = fit_standardizer(&xs_raw[..split]);
    let xs: Vec<Vec<f64>> = xs_raw
        .iter()
        .map(|row| {
            let mut r = row.clone();
            standardize_row(&mut r, &mean, &std);
            r
        })
        .collect();

    let x_train = &xs[..split];
    let y_train = &y[..split];

    // Gate threshold from a 90/10 split of the training rows.
    let g_split = ((0.9 * split as f64) as usize).max(10).min(split);
    let gate0 = fit_zero_gate(&x_train[..g_split], &y_train[..g_split], cfg.gate_alpha);
    let tau0 = pick_tau(&gate0, &x_train[g_split..], &y_train[g_split..]).max(cfg.tau_floor);

    // Validation replay: forecast the held-out tail from the training
    // prefix, weighting near-zero actuals 3x.
    let val_h = cfg.val_days.min(7).min(n - split);
    let val_history = series.values()[..split + MAX_LAG].to_vec();
    let val_first_date = series.start() + Duration::days((split + MAX_LAG) as i64);
    let actual = &y[split..split + val_h];

    let mut best_alpha = cfg.ridge_alphas.first().copied().unwrap_or(1.0);
    let mut best_tau = tau0;
    let mut best_score = f64::INFINITY;

    for &alpha in &cfg.ridge_alphas {
        let gate = fit_zero_gate(x_train, y_train, cfg.gate_alpha);
        let reg = fit_regression(x_train, y_train, alpha, cfg);

        for &factor in &cfg.tau_neighbor_factors {
            let tau = (tau0 * factor).clamp(cfg.tau_floor, 0.90);
            let candidate = TrainedModel {
                alpha,
                tau,
                gate_weights: gate.clone(),
                reg_weights: reg.clone(),
                feature_mean: mean.clone(),
                feature_std: std.clone(),
            };
            let preds = recursive_forecast(
                &candidate,
                val_history.clone(),
                val_first_date,
                split,
                val_h,
                cfg,
            );

            let mut weighted = 0.0;
            for (pred, &act) in preds.iter().zip(actual) {
                let w = if act < 1e-6 { 3.0 } else { 1.0 };
                weighted += w * (act - pred) * (act - pred);
            }
            let score = (weighted / preds.len().max(1) as f64).sqrt();

            if score < best_score {
                best_score = score;
                best_alpha = alpha;
                best_tau = tau;
            }
        }
    }
    debug!(
        "grid search settled on alpha={} tau={:.3} (score {:.4})",
        best_alpha, best_tau, best_score
    );

    // Final fit on the full history with the winners.
    let (mean_f, std_f) = fit_standardizer(&xs_raw);
    let xs_full: Vec<Vec<f64>> = xs_raw
        .iter()
        .map(|row| {
            let mut r = row.clone();
            standardize_row(&mut r, &mean_f, &std_f);
            r
        })
        .collect();

    Ok(TrainedModel {
        alpha: best_alpha,
        tau: best_tau,
        gate_weights: fit_zero_gate(&xs_full, &y, cfg.gate_alpha),
        reg_weights: fit_regression(&xs_full, &y, best_alpha, cfg),
        feature_mean: mean_f,
        feature_std: std_f,
    })
}

/// Forecast `horizon` days past the end of `series` with a trained model.
pub fn forecast(model: &TrainedModel, series: &DailySeries, horizon: usize, cfg: &ForecastSettings) -> Vec<f64> {
    let t_start = series.len().saturating_sub(MAX_LAG);
    recursive_forecast(
        model,
        series.values().to_vec(),
        series.last_day() + Duration::days(1),
        t_start,
        horizon,
        cfg,
    )
}
