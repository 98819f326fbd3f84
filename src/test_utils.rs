//! Shared fixtures for unit tests

use chrono::{NaiveDate, Utc};

use crate::models::{
    CanonicalModel, DailyCost, DashboardSnapshot, ExchangeRates, PriceRecord, SourceHealth,
    SourceStatus, Summary, UsageRecord,
};

pub fn sample_snapshot(total_cost: f64) -> DashboardSnapshot {
    DashboardSnapshot {
        models: Vec::new(),
        summary: Summary {
            total_cost,
            total_tokens: 0,
            total_requests: 0,
            avg_cost_per_request: 0.0,
            top_model: None,
            peak_hour: None,
        },
        exchange_rate: ExchangeRates::default(),
        health: SourceHealth {
            pricing: SourceStatus::Live,
            usage: SourceStatus::Live,
            exchange_rate: SourceStatus::Live,
        },
        generated_at: Utc::now(),
    }
}

pub fn price(model: CanonicalModel, input: f64, output: f64) -> PriceRecord {
    PriceRecord {
        canonical_model: model,
        input_unit_price: input,
        output_unit_price: output,
        currency: "USD".to_string(),
        region: "swedencentral".to_string(),
        observed_at: Utc::now(),
    }
}

/// Usage record with the given daily costs on consecutive days from 2025-03-01
pub fn usage(model: CanonicalModel, daily_costs: &[f64], requests: u64) -> UsageRecord {
    let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let daily_series: Vec<DailyCost> = daily_costs
        .iter()
        .enumerate()
        .map(|(i, cost)| DailyCost {
            date: start + chrono::Duration::days(i as i64),
            cost: *cost,
            tokens: 0,
        })
        .collect();

    UsageRecord {
        canonical_model: model,
        total_cost: daily_costs.iter().sum(),
        currency: "USD".to_string(),
        estimated_input_tokens: 700,
        estimated_output_tokens: 300,
        request_count_estimate: requests,
        daily_series,
    }
}
