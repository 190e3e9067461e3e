use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which of the three transaction streams a raw record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Sale,
    Return,
    GiftCard,
}

impl StreamKind {
    pub fn table(self) -> &'static str {
        match self {
            StreamKind::Sale => "sales",
            StreamKind::Return => "returns",
            StreamKind::GiftCard => "giftcards",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub ticket_number: Option<String>,
    pub sale_date: DateTime<Utc>,
    pub store_id: Option<String>,
    pub sales_rep: Option<String>,
    pub transaction_total: f64,
    pub gross_profit_percent: Option<String>,
    pub quantity_sold: i64,
    pub gift_card_amount: Option<f64>,
}

impl RawRecord {
    /// Ticket number with surrounding whitespace removed, `None` when blank.
    pub fn ticket(&self) -> Option<&str> {
        self.ticket_number
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Sale,
    ReturnOnly,
    GiftCardOnly,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTicket {
    pub ticket_number: String,
    pub revenue_total: f64,
    pub gross_profit_percent: Option<f64>,
    pub store_id: Option<String>,
    pub sales_rep: Option<String>,
    pub sale_date: DateTime<Utc>,
    pub source_kind: SourceKind,
    pub has_gift_card: bool,
}

impl CanonicalTicket {
    pub fn day(&self) -> NaiveDate {
        self.sale_date.date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub sales_rep_id: Option<String>,
    #[serde(default = "default_true")]
    pub include_returns: bool,
    #[serde(default = "default_true")]
    pub include_gift_cards: bool,
}

fn default_true() -> bool {
    true
}

impl AnalyticsRequest {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            date_range: None,
            store_id: None,
            sales_rep_id: None,
            include_returns: true,
            include_gift_cards: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStatus {
    Complete,
    Degraded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesMetrics {
    pub total_sales: f64,
    pub ticket_count: usize,
    pub avg_ticket_value: f64,
    pub gross_profit_percent: f64,
    pub items_sold: i64,
    pub return_rate: f64,
    pub gift_card_usage: f64,
    pub sales_consistency: f64,
    pub unique_tickets: usize,
    pub total_return_value: f64,
    pub total_gift_card_value: f64,
    pub stores: Vec<String>,
    pub sales_reps: Vec<String>,
    pub date_range: ObservedRange,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetrics {
    pub store_id: String,
    pub revenue: f64,
    pub ticket_count: usize,
    pub avg_ticket_size: f64,
    pub gross_profit_percent: f64,
    pub return_count: usize,
    pub return_value: f64,
    pub return_rate: f64,
    pub items_sold: i64,
    pub days_worked: usize,
    pub consistency_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepMetrics {
    pub rep_name: String,
    pub stores: Vec<String>,
    pub revenue: f64,
    pub ticket_count: usize,
    pub avg_ticket_size: f64,
    pub gross_profit_percent: f64,
    pub return_count: usize,
    pub return_value: f64,
    pub return_rate: f64,
    pub items_sold: i64,
    pub days_worked: usize,
    pub consistency_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub entity_id: String,
    pub value: f64,
    pub ticket_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub avg_ticket_size: Vec<LeaderboardEntry>,
    pub gross_profit: Vec<LeaderboardEntry>,
    pub total_revenue: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Leaderboards {
    pub reps: Leaderboard,
    pub stores: Leaderboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityType {
    Store,
    Rep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    NeedsCoaching,
    BeAware,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub underperforming_day_count: usize,
    pub total_days_worked: usize,
    pub performance_ratio: f64,
    pub severity: Severity,
    pub worst_day: NaiveDate,
    pub worst_day_avg_ticket: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAlerts {
    pub underperforming_stores: Vec<AlertRecord>,
    pub underperforming_reps: Vec<AlertRecord>,
    pub benchmark: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepRanking {
    pub rep_name: String,
    pub ticket_count: usize,
    pub revenue: f64,
    pub avg_ticket_size: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingRecommendation {
    pub store_id: String,
    pub reps: Vec<RepRanking>,
    pub store_average: f64,
    pub potential_daily_revenue: f64,
    pub relocation_candidates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingData {
    pub stores: Vec<SchedulingRecommendation>,
    pub total_stores: usize,
    pub total_reps: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorePerformance {
    pub stores: Vec<StoreMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepPerformance {
    pub reps: Vec<RepMetrics>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub sales: RetrievalStatus,
    pub returns: RetrievalStatus,
    pub gift_cards: RetrievalStatus,
    pub parse_skipped: usize,
    pub records_without_ticket: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub metrics: SalesMetrics,
    pub leaderboards: Leaderboards,
    pub performance_alerts: PerformanceAlerts,
    pub store_performance: StorePerformance,
    pub rep_performance: RepPerformance,
    pub scheduling_data: SchedulingData,
    pub diagnostics: Diagnostics,
}
