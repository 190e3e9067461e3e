use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::metrics::ratio;
use crate::models::{AlertRecord, EntityType, PerformanceAlerts, Severity};
use crate::rollup::{EntityRollup, Rollup, Tally};

pub fn classify_alerts(rollup: &Rollup, config: &EngineConfig) -> PerformanceAlerts {
    PerformanceAlerts {
        underperforming_stores: classify_entities(EntityType::Store, &rollup.stores, config),
        underperforming_reps: classify_entities(EntityType::Rep, &rollup.reps, config),
        benchmark: config.benchmark,
    }
}

fn classify_entities(
    entity_type: EntityType,
    entities: &BTreeMap<String, EntityRollup>,
    config: &EngineConfig,
) -> Vec<AlertRecord> {
    let mut alerts: Vec<AlertRecord> = entities
        .iter()
        .filter_map(|(id, entity)| classify_days(entity_type, id, &entity.days, config))
        .collect();

    alerts.sort_by(|a, b| {
        b.performance_ratio
            .partial_cmp(&a.performance_ratio)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    alerts
}

/// Alert for one entity, or `None` when every worked day met the benchmark.
pub fn classify_days(
    entity_type: EntityType,
    entity_id: &str,
    days: &BTreeMap<NaiveDate, Tally>,
    config: &EngineConfig,
) -> Option<AlertRecord> {
    let mut underperforming = 0usize;
    let mut worst: Option<(NaiveDate, f64)> = None;

    for (day, tally) in days {
        if tally.tickets == 0 {
            continue;
        }
        let average = tally.average();
        if average < config.benchmark {
            underperforming += 1;
            if worst.is_none_or(|(_, lowest)| average < lowest) {
                worst = Some((*day, average));
            }
        }
    }

    let (worst_day, worst_day_avg_ticket) = worst?;
    let total_days_worked = days.values().filter(|t| t.tickets > 0).count();
    let performance_ratio = ratio(underperforming as f64, total_days_worked as f64);

    Some(AlertRecord {
        entity_type,
        entity_id: entity_id.to_string(),
        underperforming_day_count: underperforming,
        total_days_worked,
        performance_ratio,
        severity: severity_for(performance_ratio, config.coaching_ratio),
        worst_day,
        worst_day_avg_ticket,
    })
}

pub fn severity_for(performance_ratio: f64, coaching_ratio: f64) -> Severity {
    if performance_ratio > coaching_ratio {
        Severity::NeedsCoaching
    } else {
        Severity::BeAware
    }
}
