use std::fmt::Write;

use crate::models::{AlertRecord, AnalyticsResponse, LeaderboardEntry, RetrievalStatus, Severity};

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::NeedsCoaching => "needs coaching",
        Severity::BeAware => "be aware",
    }
}

fn write_alerts(output: &mut String, alerts: &[AlertRecord], empty: &str) {
    if alerts.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }
    for alert in alerts {
        let _ = writeln!(
            output,
            "- {} ({}): {}/{} days below benchmark, worst {} at ${:.2}",
            alert.entity_id,
            severity_label(alert.severity),
            alert.underperforming_day_count,
            alert.total_days_worked,
            alert.worst_day,
            alert.worst_day_avg_ticket
        );
    }
}

fn write_board(output: &mut String, title: &str, entries: &[LeaderboardEntry], money: bool) {
    let _ = writeln!(output, "### {title}");
    if entries.is_empty() {
        let _ = writeln!(output, "No entries for this window.");
        return;
    }
    for (rank, entry) in entries.iter().enumerate() {
        if money {
            let _ = writeln!(
                output,
                "{}. {} ${:.2} ({} tickets)",
                rank + 1,
                entry.entity_id,
                entry.value,
                entry.ticket_count
            );
        } else {
            let _ = writeln!(
                output,
                "{}. {} {:.1}% ({} tickets)",
                rank + 1,
                entry.entity_id,
                entry.value,
                entry.ticket_count
            );
        }
    }
}

pub fn build_report(tenant_id: &str, scope: Option<&str>, response: &AnalyticsResponse) -> String {
    let mut output = String::new();
    let metrics = &response.metrics;
    let scope_label = scope.unwrap_or("all stores");

    let _ = writeln!(output, "# Sales Performance Report");
    match (metrics.date_range.earliest, metrics.date_range.latest) {
        (Some(earliest), Some(latest)) => {
            let _ = writeln!(
                output,
                "Generated for {} / {} (tickets {} to {})",
                tenant_id,
                scope_label,
                earliest.date_naive(),
                latest.date_naive()
            );
        }
        _ => {
            let _ = writeln!(output, "Generated for {} / {}", tenant_id, scope_label);
        }
    }

    let degraded: Vec<&str> = [
        ("sales", response.diagnostics.sales),
        ("returns", response.diagnostics.returns),
        ("gift cards", response.diagnostics.gift_cards),
    ]
    .into_iter()
    .filter(|(_, status)| matches!(status, RetrievalStatus::Degraded | RetrievalStatus::Failed))
    .map(|(name, _)| name)
    .collect();
    if !degraded.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "> Partial data: {} could not be read completely.",
            degraded.join(", ")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Total sales: ${:.2}", metrics.total_sales);
    let _ = writeln!(output, "- Tickets: {}", metrics.ticket_count);
    let _ = writeln!(output, "- Average ticket: ${:.2}", metrics.avg_ticket_value);
    let _ = writeln!(output, "- Gross profit: {:.1}%", metrics.gross_profit_percent);
    let _ = writeln!(output, "- Items sold: {}", metrics.items_sold);
    let _ = writeln!(
        output,
        "- Returns: {:.1}% of tickets (${:.2})",
        metrics.return_rate * 100.0,
        metrics.total_return_value
    );
    let _ = writeln!(
        output,
        "- Gift cards: {:.1}% of tickets (${:.2})",
        metrics.gift_card_usage * 100.0,
        metrics.total_gift_card_value
    );
    let _ = writeln!(output, "- Consistency: {:.0}/100", metrics.sales_consistency);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Leaderboards");
    let reps = &response.leaderboards.reps;
    write_board(&mut output, "Reps by average ticket", &reps.avg_ticket_size, true);
    write_board(&mut output, "Reps by revenue", &reps.total_revenue, true);
    write_board(&mut output, "Reps by gross profit", &reps.gross_profit, false);
    let stores = &response.leaderboards.stores;
    write_board(&mut output, "Stores by average ticket", &stores.avg_ticket_size, true);
    write_board(&mut output, "Stores by revenue", &stores.total_revenue, true);

    let alerts = &response.performance_alerts;
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Performance Alerts (benchmark ${:.2})",
        alerts.benchmark
    );
    let _ = writeln!(output, "### Stores");
    write_alerts(
        &mut output,
        &alerts.underperforming_stores,
        "Every store met the benchmark.",
    );
    let _ = writeln!(output, "### Reps");
    write_alerts(
        &mut output,
        &alerts.underperforming_reps,
        "Every rep met the benchmark.",
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Scheduling");
    if response.scheduling_data.stores.is_empty() {
        let _ = writeln!(output, "No store activity for this window.");
    }
    for store in &response.scheduling_data.stores {
        let _ = writeln!(
            output,
            "### {} (rep average ${:.2}, projected ${:.2}/day)",
            store.store_id, store.store_average, store.potential_daily_revenue
        );
        if store.reps.is_empty() {
            let _ = writeln!(output, "Not enough tickets per rep to rank.");
            continue;
        }
        for rep in &store.reps {
            let marker = if store.relocation_candidates.contains(&rep.rep_name) {
                " - relocation candidate"
            } else {
                ""
            };
            let _ = writeln!(
                output,
                "- {} ${:.2} over {} tickets{}",
                rep.rep_name, rep.avg_ticket_size, rep.ticket_count, marker
            );
        }
    }

    output
}
