use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{ObservedRange, SalesMetrics};
use crate::reconcile::Ledger;

/// Parse a gross-profit value such as `"42.5%"`, `" 38 "` or `"0.4"`.
///
/// Returns `None` for anything that is not a finite number once a single
/// trailing `%` is stripped.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `numerator / denominator`, or 0 when the denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn mean(values: &[f64]) -> f64 {
    ratio(values.iter().sum(), values.len() as f64)
}

/// Stability of daily revenue on a 0-100 scale from the coefficient of variation.
pub fn consistency_score(daily_revenue: &BTreeMap<NaiveDate, f64>) -> f64 {
    let values: Vec<f64> = daily_revenue.values().copied().collect();
    match values.len() {
        0 => return 0.0,
        1 => return 100.0,
        _ => {}
    }

    let avg = mean(&values);
    if avg <= 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    let cv = variance.sqrt() / avg;
    (100.0 * (1.0 - cv)).clamp(0.0, 100.0)
}

/// Tenant-wide KPIs over the reconciled ledger.
pub fn aggregate(ledger: &Ledger) -> SalesMetrics {
    let ticket_count = ledger.tickets.len();
    let total_sales = ledger.total_revenue();

    let mut profits = Vec::new();
    let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut stores = BTreeSet::new();
    let mut reps = BTreeSet::new();
    let mut earliest = None;
    let mut latest = None;

    for ticket in ledger.tickets.values() {
        if let Some(profit) = ticket.gross_profit_percent {
            profits.push(profit);
        }
        *daily.entry(ticket.day()).or_default() += ticket.revenue_total;
        if let Some(store) = &ticket.store_id {
            stores.insert(store.clone());
        }
        if let Some(rep) = &ticket.sales_rep {
            reps.insert(rep.clone());
        }
        earliest = Some(earliest.map_or(ticket.sale_date, |e: DateTime<Utc>| {
            e.min(ticket.sale_date)
        }));
        latest = Some(latest.map_or(ticket.sale_date, |l: DateTime<Utc>| {
            l.max(ticket.sale_date)
        }));
    }

    let tickets = ticket_count as f64;
    let returns = ledger.returns.count as f64;

    SalesMetrics {
        total_sales,
        ticket_count,
        avg_ticket_value: ratio(total_sales, tickets),
        gross_profit_percent: mean(&profits),
        items_sold: ledger.items_sold,
        return_rate: ratio(returns, tickets + returns),
        gift_card_usage: ratio(ledger.gift_card_tickets() as f64, tickets),
        sales_consistency: consistency_score(&daily),
        unique_tickets: ticket_count,
        total_return_value: ledger.returns.value,
        total_gift_card_value: ledger.gift_card_value,
        stores: stores.into_iter().collect(),
        sales_reps: reps.into_iter().collect(),
        date_range: ObservedRange { earliest, latest },
    }
}
