use tracing::{debug, info};

use crate::alerts;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fetch::{fetch_streams, RecordSource, StreamSet};
use crate::metrics;
use crate::models::{
    AnalyticsRequest, AnalyticsResponse, Diagnostics, Leaderboards, RepPerformance,
    StorePerformance,
};
use crate::reconcile::{reconcile, EntityFilter};
use crate::rollup;
use crate::scheduling;

/// Reject requests that cannot be served before any fetch starts.
pub fn validate(request: &AnalyticsRequest) -> EngineResult<()> {
    if request.tenant_id.trim().is_empty() {
        return Err(EngineError::InvalidRequest("tenant id is required".to_string()));
    }
    if let Some(range) = request.date_range {
        if range.start > range.end {
            return Err(EngineError::InvalidRequest(format!(
                "date range starts ({}) after it ends ({})",
                range.start, range.end
            )));
        }
    }
    Ok(())
}

/// Fetch the three streams for `request` and derive every view from one ledger.
pub async fn run(
    source: &dyn RecordSource,
    request: &AnalyticsRequest,
    config: &EngineConfig,
) -> EngineResult<AnalyticsResponse> {
    validate(request)?;
    info!(
        tenant = %request.tenant_id,
        store = request.store_id.as_deref().unwrap_or("*"),
        rep = request.sales_rep_id.as_deref().unwrap_or("*"),
        "running sales analytics"
    );

    let streams = fetch_streams(source, request, &config.fetch).await;
    Ok(analyze(&streams, request, config))
}

/// Pure part of the pipeline: reconcile, then aggregate, roll up, alert and schedule.
pub fn analyze(
    streams: &StreamSet,
    request: &AnalyticsRequest,
    config: &EngineConfig,
) -> AnalyticsResponse {
    for outcome in [&streams.sales, &streams.returns, &streams.gift_cards] {
        debug!(
            table = outcome.stream.table(),
            rows = outcome.records.len(),
            status = ?outcome.status,
            "stream ready"
        );
    }

    let ledger = reconcile(
        &streams.sales.records,
        &streams.returns.records,
        &streams.gift_cards.records,
        &EntityFilter::from_request(request),
    );

    let sales_metrics = metrics::aggregate(&ledger);
    let rollup = rollup::build(&ledger);
    let stores = rollup.store_metrics(&ledger);
    let reps = rollup.rep_metrics(&ledger);

    let leaderboards = Leaderboards {
        reps: rollup::leaderboard(&reps, config.leaderboard_size),
        stores: rollup::leaderboard(&stores, config.leaderboard_size),
    };
    let performance_alerts = alerts::classify_alerts(&rollup, config);
    let scheduling_data = scheduling::recommend(&rollup, config);

    info!(
        tickets = sales_metrics.ticket_count,
        total_sales = sales_metrics.total_sales,
        store_alerts = performance_alerts.underperforming_stores.len(),
        rep_alerts = performance_alerts.underperforming_reps.len(),
        "analytics computed"
    );

    AnalyticsResponse {
        metrics: sales_metrics,
        leaderboards,
        performance_alerts,
        store_performance: StorePerformance { stores },
        rep_performance: RepPerformance { reps },
        scheduling_data,
        diagnostics: Diagnostics {
            sales: streams.sales.status,
            returns: streams.returns.status,
            gift_cards: streams.gift_cards.status,
            parse_skipped: ledger.parse_skipped,
            records_without_ticket: ledger.records_without_ticket,
        },
    }
}
