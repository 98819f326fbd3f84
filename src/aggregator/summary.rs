use crate::models::{CanonicalModel, ModelSnapshot, Summary};

/// Dashboard-wide totals over the merged models
pub fn summarize(models: &[ModelSnapshot]) -> Summary {
    let total_cost: f64 = models.iter().map(|m| m.usage.total_cost).sum();
    let total_tokens = models
        .iter()
        .fold(0u64, |acc, m| acc.saturating_add(m.usage.total_tokens()));
    let total_requests = models
        .iter()
        .fold(0u64, |acc, m| acc.saturating_add(m.usage.request_count_estimate));

    let avg_cost_per_request = if total_requests == 0 {
        0.0
    } else {
        total_cost / total_requests as f64
    };

    Summary {
        total_cost,
        total_tokens,
        total_requests,
        avg_cost_per_request,
        top_model: top_model(models),
        peak_hour: peak_hour(models),
    }
}

/// Model with the highest cost; ties go to the first encountered
fn top_model(models: &[ModelSnapshot]) -> Option<CanonicalModel> {
    let mut best: Option<&ModelSnapshot> = None;
    for model in models {
        match best {
            Some(current) if model.usage.total_cost <= current.usage.total_cost => {}
            _ => best = Some(model),
        }
    }
    best.map(|m| m.canonical_model)
}

/// Label of the bucket with the largest cost summed across models
///
/// `None` when there are no buckets or every bucket is empty.
fn peak_hour(models: &[ModelSnapshot]) -> Option<String> {
    let buckets = models.iter().map(|m| m.sparkline.len()).max().unwrap_or(0);

    let mut peak: Option<(usize, f64)> = None;
    for i in 0..buckets {
        let cost: f64 = models
            .iter()
            .filter_map(|m| m.sparkline.get(i))
            .map(|p| p.cost)
            .sum();
        match peak {
            Some((_, best)) if cost <= best => {}
            _ if cost > 0.0 => peak = Some((i, cost)),
            _ => {}
        }
    }

    let (index, _) = peak?;
    models
        .iter()
        .find_map(|m| m.sparkline.get(index))
        .map(|p| p.label.clone())
}
