use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::metrics::{consistency_score, mean, ratio};
use crate::models::{Leaderboard, LeaderboardEntry, RepMetrics, StoreMetrics};
use crate::reconcile::{Ledger, ReturnTally};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub revenue: f64,
    pub tickets: usize,
}

impl Tally {
    fn add(&mut self, revenue: f64) {
        self.revenue += revenue;
        self.tickets += 1;
    }

    pub fn average(&self) -> f64 {
        ratio(self.revenue, self.tickets as f64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityRollup {
    pub total: Tally,
    pub profits: Vec<f64>,
    pub days: BTreeMap<NaiveDate, Tally>,
    /// Stores this entity sold in; only filled for reps.
    pub stores: BTreeSet<String>,
}

impl EntityRollup {
    fn record(&mut self, day: NaiveDate, revenue: f64, profit: Option<f64>) {
        self.total.add(revenue);
        self.days.entry(day).or_default().add(revenue);
        if let Some(profit) = profit {
            self.profits.push(profit);
        }
    }

    fn daily_revenue(&self) -> BTreeMap<NaiveDate, f64> {
        self.days.iter().map(|(day, t)| (*day, t.revenue)).collect()
    }
}

/// Entity indexes built in one pass over the ledger.
#[derive(Debug, Clone, Default)]
pub struct Rollup {
    pub stores: BTreeMap<String, EntityRollup>,
    pub reps: BTreeMap<String, EntityRollup>,
    /// store -> rep -> tickets the rep closed in that store.
    pub store_reps: BTreeMap<String, BTreeMap<String, Tally>>,
}

pub fn build(ledger: &Ledger) -> Rollup {
    let mut rollup = Rollup::default();

    for ticket in ledger.tickets.values() {
        let day = ticket.day();
        if let Some(store) = &ticket.store_id {
            rollup.stores.entry(store.clone()).or_default().record(
                day,
                ticket.revenue_total,
                ticket.gross_profit_percent,
            );
        }
        if let Some(rep) = &ticket.sales_rep {
            let entry = rollup.reps.entry(rep.clone()).or_default();
            entry.record(day, ticket.revenue_total, ticket.gross_profit_percent);
            if let Some(store) = &ticket.store_id {
                entry.stores.insert(store.clone());
                rollup
                    .store_reps
                    .entry(store.clone())
                    .or_default()
                    .entry(rep.clone())
                    .or_default()
                    .add(ticket.revenue_total);
            }
        }
    }

    rollup
}

impl Rollup {
    pub fn store_metrics(&self, ledger: &Ledger) -> Vec<StoreMetrics> {
        let mut rows: Vec<StoreMetrics> = self
            .stores
            .iter()
            .map(|(store_id, entity)| {
                let returns = ledger
                    .returns_by_store
                    .get(store_id)
                    .copied()
                    .unwrap_or_default();
                StoreMetrics {
                    store_id: store_id.clone(),
                    revenue: entity.total.revenue,
                    ticket_count: entity.total.tickets,
                    avg_ticket_size: entity.total.average(),
                    gross_profit_percent: mean(&entity.profits),
                    return_count: returns.count,
                    return_value: returns.value,
                    return_rate: return_rate(&returns, entity.total.tickets),
                    items_sold: ledger.items_by_store.get(store_id).copied().unwrap_or(0),
                    days_worked: entity.days.len(),
                    consistency_score: consistency_score(&entity.daily_revenue()),
                }
            })
            .collect();
        rows.sort_by(|a, b| desc(a.revenue, b.revenue).then_with(|| a.store_id.cmp(&b.store_id)));
        rows
    }

    pub fn rep_metrics(&self, ledger: &Ledger) -> Vec<RepMetrics> {
        let mut rows: Vec<RepMetrics> = self
            .reps
            .iter()
            .map(|(rep_name, entity)| {
                let returns = ledger
                    .returns_by_rep
                    .get(rep_name)
                    .copied()
                    .unwrap_or_default();
                RepMetrics {
                    rep_name: rep_name.clone(),
                    stores: entity.stores.iter().cloned().collect(),
                    revenue: entity.total.revenue,
                    ticket_count: entity.total.tickets,
                    avg_ticket_size: entity.total.average(),
                    gross_profit_percent: mean(&entity.profits),
                    return_count: returns.count,
                    return_value: returns.value,
                    return_rate: return_rate(&returns, entity.total.tickets),
                    items_sold: ledger.items_by_rep.get(rep_name).copied().unwrap_or(0),
                    days_worked: entity.days.len(),
                    consistency_score: consistency_score(&entity.daily_revenue()),
                }
            })
            .collect();
        rows.sort_by(|a, b| desc(a.revenue, b.revenue).then_with(|| a.rep_name.cmp(&b.rep_name)));
        rows
    }
}

fn return_rate(returns: &ReturnTally, tickets: usize) -> f64 {
    let count = returns.count as f64;
    ratio(count, tickets as f64 + count)
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Rows that can appear on a leaderboard.
pub trait Ranked {
    fn entity_id(&self) -> &str;
    fn avg_ticket_size(&self) -> f64;
    fn gross_profit(&self) -> f64;
    fn total_revenue(&self) -> f64;
    fn ticket_count(&self) -> usize;
}

impl Ranked for StoreMetrics {
    fn entity_id(&self) -> &str {
        &self.store_id
    }
    fn avg_ticket_size(&self) -> f64 {
        self.avg_ticket_size
    }
    fn gross_profit(&self) -> f64 {
        self.gross_profit_percent
    }
    fn total_revenue(&self) -> f64 {
        self.revenue
    }
    fn ticket_count(&self) -> usize {
        self.ticket_count
    }
}

impl Ranked for RepMetrics {
    fn entity_id(&self) -> &str {
        &self.rep_name
    }
    fn avg_ticket_size(&self) -> f64 {
        self.avg_ticket_size
    }
    fn gross_profit(&self) -> f64 {
        self.gross_profit_percent
    }
    fn total_revenue(&self) -> f64 {
        self.revenue
    }
    fn ticket_count(&self) -> usize {
        self.ticket_count
    }
}

/// Top `size` rows by `metric`, highest first; ties go to the lower id.
pub fn top_by<T: Ranked>(rows: &[T], metric: fn(&T) -> f64, size: usize) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&T> = rows.iter().collect();
    ranked.sort_by(|a, b| {
        desc(metric(*a), metric(*b)).then_with(|| a.entity_id().cmp(b.entity_id()))
    });
    ranked
        .into_iter()
        .take(size)
        .map(|row| LeaderboardEntry {
            entity_id: row.entity_id().to_string(),
            value: metric(row),
            ticket_count: row.ticket_count(),
        })
        .collect()
}

pub fn leaderboard<T: Ranked>(rows: &[T], size: usize) -> Leaderboard {
    Leaderboard {
        avg_ticket_size: top_by(rows, T::avg_ticket_size, size),
        gross_profit: top_by(rows, T::gross_profit, size),
        total_revenue: top_by(rows, T::total_revenue, size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::tests::line;
    use crate::reconcile::{reconcile, EntityFilter};
    use chrono::Duration;

    fn ledger() -> Ledger {
        let mut sales = vec![
            line("T1", "S1", "Dana", 100.0),
            line("T2", "S1", "Dana", 60.0),
            line("T3", "S1", "Eli", 40.0),
            line("T4", "S2", "Eli", 90.0),
        ];
        sales[1].sale_date += Duration::days(1);
        sales[1].gross_profit_percent = Some("30%".to_string());
        sales[0].gross_profit_percent = Some("50%".to_string());
        let returns = vec![line("T3", "S1", "Eli", 40.0)];
        reconcile(&sales, &returns, &[], &EntityFilter::default())
    }

    #[test]
    fn store_rows_group_tickets() {
        let ledger = ledger();
        let rollup = build(&ledger);
        let stores = rollup.store_metrics(&ledger);

        assert_eq!(stores.len(), 2);
        let s1 = &stores[0];
        assert_eq!(s1.store_id, "S1");
        assert_eq!(s1.revenue, 200.0);
        assert_eq!(s1.ticket_count, 3);
        assert!((s1.avg_ticket_size - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(s1.gross_profit_percent, 40.0);
        assert_eq!(s1.return_count, 1);
        assert_eq!(s1.return_rate, 0.25);
        assert_eq!(s1.items_sold, 3);
        assert_eq!(s1.days_worked, 2);
    }

    #[test]
    fn rep_rows_track_stores() {
        let ledger = ledger();
        let rollup = build(&ledger);
        let reps = rollup.rep_metrics(&ledger);

        let eli = reps.iter().find(|r| r.rep_name == "Eli").unwrap();
        assert_eq!(eli.stores, vec!["S1".to_string(), "S2".to_string()]);
        assert_eq!(eli.ticket_count, 2);
        assert_eq!(rollup.store_reps["S1"]["Dana"].tickets, 2);
        assert_eq!(rollup.store_reps["S1"]["Eli"].revenue, 40.0);
    }

    #[test]
    fn leaderboard_is_sorted_and_truncated() {
        let ledger = ledger();
        let rollup = build(&ledger);
        let stores = rollup.store_metrics(&ledger);

        let board = leaderboard(&stores, 1);
        assert_eq!(board.avg_ticket_size.len(), 1);
        assert_eq!(board.avg_ticket_size[0].entity_id, "S2");
        assert_eq!(board.total_revenue[0].entity_id, "S1");
    }

    #[test]
    fn ties_break_on_entity_id() {
        let sales = vec![
            line("T1", "S9", "Zed", 50.0),
            line("T2", "S1", "Amy", 50.0),
        ];
        let ledger = reconcile(&sales, &[], &[], &EntityFilter::default());
        let reps = build(&ledger).rep_metrics(&ledger);

        let board = leaderboard(&reps, 5);
        let order: Vec<_> = board.total_revenue.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(order, vec!["Amy", "Zed"]);
    }
}
