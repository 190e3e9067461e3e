use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::EngineConfig;
use crate::metrics::mean;
use crate::models::{RepRanking, SchedulingData, SchedulingRecommendation};
use crate::rollup::{Rollup, Tally};

/// Advisory staffing view per store. Nothing here is persisted.
pub fn recommend(rollup: &Rollup, config: &EngineConfig) -> SchedulingData {
    let no_reps = BTreeMap::new();
    let mut all_reps = BTreeSet::new();
    let stores: Vec<SchedulingRecommendation> = rollup
        .stores
        .keys()
        .map(|store_id| {
            let reps = rollup.store_reps.get(store_id).unwrap_or(&no_reps);
            all_reps.extend(reps.keys().cloned());
            recommend_store(store_id, reps, config)
        })
        .collect();

    SchedulingData {
        total_stores: stores.len(),
        total_reps: all_reps.len(),
        stores,
    }
}

pub fn recommend_store(
    store_id: &str,
    reps: &BTreeMap<String, Tally>,
    config: &EngineConfig,
) -> SchedulingRecommendation {
    let mut ranked: Vec<RepRanking> = reps
        .iter()
        .filter(|(_, tally)| tally.tickets >= config.min_tickets)
        .map(|(rep_name, tally)| RepRanking {
            rep_name: rep_name.clone(),
            ticket_count: tally.tickets,
            revenue: tally.revenue,
            avg_ticket_size: tally.average(),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.avg_ticket_size
            .partial_cmp(&a.avg_ticket_size)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.rep_name.cmp(&b.rep_name))
    });

    let averages: Vec<f64> = ranked.iter().map(|r| r.avg_ticket_size).collect();
    let store_average = mean(&averages);
    let potential_daily_revenue = averages
        .iter()
        .take(config.top_reps_for_projection)
        .sum::<f64>()
        * config.shifts_per_day;

    SchedulingRecommendation {
        store_id: store_id.to_string(),
        relocation_candidates: relocation_candidates(&ranked, store_average, config),
        reps: ranked,
        store_average,
        potential_daily_revenue,
    }
}

/// Reps ranked outside the top percentile band who also trail the store average.
///
/// `ranked` must already be ordered best first.
pub fn relocation_candidates(
    ranked: &[RepRanking],
    store_average: f64,
    config: &EngineConfig,
) -> Vec<String> {
    let cutoff_rank = (ranked.len() as f64 * config.relocation_rank_percentile).floor() as usize;
    let threshold = store_average * config.relocation_average_ratio;

    ranked
        .iter()
        .enumerate()
        .filter(|(rank, rep)| *rank >= cutoff_rank && rep.avg_ticket_size < threshold)
        .map(|(_, rep)| rep.rep_name.clone())
        .collect()
}
