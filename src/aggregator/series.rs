//! Per-model derived series: day-over-day trend and the hourly sparkline
//!
//! The sparkline is illustrative. The usage source only has daily
//! granularity, so the hourly buckets are an apportioning of the usage
//! total over a fixed diurnal profile, not measured traffic. Consumers see
//! this through `sparklineSynthetic` on every model.

use chrono::{DateTime, Timelike, Utc};

use crate::config::SparklineMode;
use crate::models::{CanonicalModel, DailyCost, SparkPoint, UsageRecord};

pub const SPARKLINE_BUCKETS: usize = 12;

/// Relative activity per UTC hour, quiet at night and busiest mid-afternoon
const DIURNAL_PROFILE: [f64; 24] = [
    0.20, 0.15, 0.10, 0.10, 0.10, 0.15, 0.30, 0.50, 0.80, 1.00, 1.10, 1.20, 1.15, 1.20, 1.30,
    1.25, 1.10, 0.95, 0.80, 0.70, 0.60, 0.50, 0.40, 0.30,
];

/// Hours the profile is shifted per model, so rows do not move in lockstep
const MODEL_PHASE_HOURS: usize = 2;

/// Percent change between the last two days of the series
///
/// Returns the display string and the rounded percentage. Fewer than two
/// entries, or a rounded change of zero, is `+0%`. Growth from a zero day
/// counts as `+100%`.
pub fn trend(series: &[DailyCost]) -> (String, f64) {
    let [.., previous, last] = series else {
        return ("+0%".to_string(), 0.0);
    };

    let percent = if previous.cost == 0.0 {
        if last.cost > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (last.cost - previous.cost) / previous.cost * 100.0
    };

    let rounded = percent.round();
    if rounded == 0.0 || !rounded.is_finite() {
        return ("+0%".to_string(), 0.0);
    }
    (format!("{:+}%", rounded as i64), rounded)
}

/// Labels of the buckets ending at the hour containing `now`, oldest first
fn bucket_hours(now: DateTime<Utc>) -> impl Iterator<Item = usize> {
    let current = now.hour() as usize;
    (0..SPARKLINE_BUCKETS).map(move |i| (current + 24 + i + 1 - SPARKLINE_BUCKETS) % 24)
}

/// Normalised weights for the model's buckets; they sum to 1
fn bucket_weights(model: CanonicalModel, now: DateTime<Utc>) -> Vec<f64> {
    let phase = model.ordinal() * MODEL_PHASE_HOURS;
    let raw: Vec<f64> = bucket_hours(now)
        .map(|hour| DIURNAL_PROFILE[(hour + phase) % 24])
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / sum).collect()
}

/// Float residue left after apportioning must not flip the bucket's sign
fn same_sign(remainder: f64, total: f64) -> f64 {
    if total >= 0.0 {
        remainder.max(0.0)
    } else {
        remainder.min(0.0)
    }
}

/// Sparkline for one model; empty in flat mode
///
/// Bucket costs and tokens sum to the usage totals, negative totals
/// (credits) included. Rounding remainders land in the most recent bucket.
pub fn sparkline(
    model: CanonicalModel,
    usage: &UsageRecord,
    now: DateTime<Utc>,
    mode: SparklineMode,
) -> Vec<SparkPoint> {
    if mode == SparklineMode::Flat {
        return Vec::new();
    }

    let weights = bucket_weights(model, now);
    let total_tokens = usage.total_tokens();
    let mut cost_left = usage.total_cost;
    let mut tokens_left = total_tokens;

    bucket_hours(now)
        .zip(weights)
        .enumerate()
        .map(|(i, (hour, weight))| {
            let (cost, tokens) = if i + 1 == SPARKLINE_BUCKETS {
                (same_sign(cost_left, usage.total_cost), tokens_left)
            } else {
                let cost = usage.total_cost * weight;
                let tokens = ((total_tokens as f64) * weight).floor() as u64;
                let tokens = tokens.min(tokens_left);
                (cost, tokens)
            };
            cost_left -= cost;
            tokens_left -= tokens;

            SparkPoint {
                label: format!("{:02}:00", hour),
                cost,
                tokens,
            }
        })
        .collect()
}
