//! Token and request estimation from cost
//!
//! The usage source reports money, never tokens. Every token and request
//! figure on the dashboard is derived here from cost and a static average
//! price per token. The results are approximations with a known accuracy
//! limit: the real input/output mix and request sizes are not observable,
//! so a model whose traffic is output-heavy will be over-estimated and an
//! input-heavy one under-estimated.

use crate::models::CanonicalModel;

/// Fixed input share of estimated tokens, in tenths
const INPUT_SHARE_TENTHS: u64 = 7;

/// Assumed request size used to derive a request count
const TOKENS_PER_REQUEST: u64 = 1_000;

/// Upper bound on any single estimate; larger costs are clamped
pub const MAX_ESTIMATED_TOKENS: u64 = 1_000_000_000_000_000;

/// Estimated token split for a given cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenEstimate {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub requests: u64,
}

impl TokenEstimate {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Swappable estimation policy
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, model: CanonicalModel, cost: f64) -> TokenEstimate;
}

/// Default policy: a 70/30 blend of list input/output prices per model
#[derive(Debug, Clone, Copy, Default)]
pub struct AveragePriceEstimator;

impl AveragePriceEstimator {
    /// Average USD price per token
    pub fn average_price(model: CanonicalModel) -> f64 {
        match model {
            CanonicalModel::Gpt4o => 4.75e-6,
            CanonicalModel::Gpt4oMini => 2.85e-7,
            CanonicalModel::Gpt41 => 3.8e-6,
            CanonicalModel::Gpt41Mini => 7.6e-7,
            CanonicalModel::Gpt41Nano => 1.9e-7,
            CanonicalModel::O1 => 2.85e-5,
            CanonicalModel::O1Mini => 2.09e-6,
            CanonicalModel::O3Mini => 2.09e-6,
            CanonicalModel::Gpt35Turbo => 8e-7,
        }
    }
}

impl TokenEstimator for AveragePriceEstimator {
    fn estimate(&self, model: CanonicalModel, cost: f64) -> TokenEstimate {
        let total = tokens_for_cost(cost, Self::average_price(model));
        split_tokens(total)
    }
}

/// `floor(cost / avg)` capped at [`MAX_ESTIMATED_TOKENS`], zero for
/// non-positive or NaN input
pub fn tokens_for_cost(cost: f64, average_price: f64) -> u64 {
    if cost.is_nan() || cost <= 0.0 || average_price.is_nan() || average_price <= 0.0 {
        return 0;
    }
    let tokens = (cost / average_price).floor();
    if tokens >= MAX_ESTIMATED_TOKENS as f64 {
        MAX_ESTIMATED_TOKENS
    } else {
        tokens as u64
    }
}

/// Split a token total 70/30 and derive the request count
pub fn split_tokens(total: u64) -> TokenEstimate {
    let input_tokens = (u128::from(total) * u128::from(INPUT_SHARE_TENTHS) / 10) as u64;
    let requests = if total == 0 {
        0
    } else {
        (total / TOKENS_PER_REQUEST).max(1)
    };

    TokenEstimate {
        input_tokens,
        output_tokens: total - input_tokens,
        requests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_cost_yields_zero_everything() {
        let estimate = AveragePriceEstimator.estimate(CanonicalModel::Gpt4o, 0.0);
        assert_eq!(estimate, TokenEstimate::default());
    }

    #[test]
    fn test_negative_or_nan_cost_is_ignored() {
        assert_eq!(tokens_for_cost(-3.0, 1e-6), 0);
        assert_eq!(tokens_for_cost(f64::NAN, 1e-6), 0);
    }

    #[test]
    fn test_split_is_seventy_thirty() {
        let estimate = split_tokens(10_000);
        assert_eq!(estimate.input_tokens, 7_000);
        assert_eq!(estimate.output_tokens, 3_000);
        assert_eq!(estimate.requests, 10);
    }

    #[test]
    fn test_split_keeps_remainder_on_output_side() {
        let estimate = split_tokens(11);
        assert_eq!(estimate.input_tokens, 7);
        assert_eq!(estimate.output_tokens, 4);
        assert_eq!(estimate.total_tokens(), 11);
    }

    #[test]
    fn test_small_usage_counts_as_one_request() {
        assert_eq!(split_tokens(1).requests, 1);
        assert_eq!(split_tokens(999).requests, 1);
        assert_eq!(split_tokens(2_500).requests, 2);
    }

    #[test]
    fn test_estimate_uses_model_average_price() {
        // 1 USD of gpt-4o at 4.75e-6 per token is roughly 210 526 tokens
        let estimate = AveragePriceEstimator.estimate(CanonicalModel::Gpt4o, 1.0);
        let total = estimate.total_tokens() as i64;
        assert!((total - 210_526).abs() <= 1, "got {}", total);

        let cheap = AveragePriceEstimator.estimate(CanonicalModel::Gpt41Nano, 1.0);
        assert!(cheap.total_tokens() > estimate.total_tokens());
    }

    #[test]
    fn test_huge_cost_is_clamped() {
        let estimate = AveragePriceEstimator.estimate(CanonicalModel::Gpt4oMini, 1e15);
        assert_eq!(estimate.total_tokens(), MAX_ESTIMATED_TOKENS);
        assert_eq!(tokens_for_cost(f64::INFINITY, 1e-6), MAX_ESTIMATED_TOKENS);
    }

    #[test]
    fn test_split_of_max_total_does_not_overflow() {
        let estimate = split_tokens(u64::MAX);
        assert_eq!(estimate.input_tokens, (u128::from(u64::MAX) * 7 / 10) as u64);
        assert_eq!(estimate.total_tokens(), u64::MAX);
    }

    #[test]
    fn test_every_model_has_positive_average_price() {
        for model in CanonicalModel::ALL {
            assert!(AveragePriceEstimator::average_price(model) > 0.0);
        }
    }
}
