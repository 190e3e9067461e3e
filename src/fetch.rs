use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{AnalyticsRequest, DateRange, RawRecord, RetrievalStatus, StreamKind};

#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    pub stream: StreamKind,
    pub tenant_id: &'a str,
    pub range: Option<DateRange>,
    pub offset: usize,
    pub limit: usize,
}

/// Read-only access to the three transaction tables.
///
/// Rows come back ordered by `(sale_date, id)` so that offsets are stable
/// across pages. A store may return fewer rows than `limit` when it enforces
/// its own per-query cap.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_page(&self, query: PageQuery<'_>) -> EngineResult<Vec<RawRecord>>;
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub stream: StreamKind,
    pub records: Vec<RawRecord>,
    pub status: RetrievalStatus,
}

impl FetchOutcome {
    pub fn skipped(stream: StreamKind) -> Self {
        Self {
            stream,
            records: Vec::new(),
            status: RetrievalStatus::Skipped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamSet {
    pub sales: FetchOutcome,
    pub returns: FetchOutcome,
    pub gift_cards: FetchOutcome,
}

/// Pull every matching row for one stream.
///
/// Pages through the table until the store hands back an empty page. Any
/// page error, a timeout, or crossing `safety_limit` drops to one large
/// bounded read flagged as degraded. When that also fails the stream is
/// reported as failed with no rows.
pub async fn fetch_complete(
    source: &dyn RecordSource,
    stream: StreamKind,
    tenant_id: &str,
    range: Option<DateRange>,
    config: &FetchConfig,
) -> FetchOutcome {
    let table = stream.table();
    let primary = tokio::time::timeout(
        config.timeout,
        read_exhaustive(source, stream, tenant_id, range, config),
    )
    .await
    .unwrap_or_else(|_| {
        Err(EngineError::Timeout {
            table,
            seconds: config.timeout.as_secs(),
        })
    });

    match primary {
        Ok(Some(records)) => {
            debug!(table, rows = records.len(), "exhaustive read complete");
            return FetchOutcome {
                stream,
                records,
                status: RetrievalStatus::Complete,
            };
        }
        Ok(None) => warn!(
            table,
            safety_limit = config.safety_limit,
            "exhaustive read passed safety limit, using bounded read"
        ),
        Err(err) => warn!(table, error = %err, "exhaustive read failed, using bounded read"),
    }

    let query = PageQuery {
        stream,
        tenant_id,
        range,
        offset: 0,
        limit: config.fallback_limit,
    };
    let fallback = tokio::time::timeout(config.timeout, source.fetch_page(query))
        .await
        .unwrap_or_else(|_| {
            Err(EngineError::Timeout {
                table,
                seconds: config.timeout.as_secs(),
            })
        });

    match fallback {
        Ok(records) => {
            info!(table, rows = records.len(), "bounded read returned partial data");
            FetchOutcome {
                stream,
                records,
                status: RetrievalStatus::Degraded,
            }
        }
        Err(err) => {
            warn!(table, error = %err, "bounded read failed, stream unavailable");
            FetchOutcome {
                stream,
                records: Vec::new(),
                status: RetrievalStatus::Failed,
            }
        }
    }
}

/// `Ok(None)` means the safety limit was crossed before the table ran out.
async fn read_exhaustive(
    source: &dyn RecordSource,
    stream: StreamKind,
    tenant_id: &str,
    range: Option<DateRange>,
    config: &FetchConfig,
) -> EngineResult<Option<Vec<RawRecord>>> {
    let page_size = config.page_size.max(1);
    let mut records = Vec::new();

    loop {
        let page = source
            .fetch_page(PageQuery {
                stream,
                tenant_id,
                range,
                offset: records.len(),
                limit: page_size,
            })
            .await?;

        if page.is_empty() {
            return Ok(Some(records));
        }
        records.extend(page);
        if records.len() > config.safety_limit {
            return Ok(None);
        }
    }
}

/// Fetch the three streams concurrently and join them before reconciliation.
pub async fn fetch_streams(
    source: &dyn RecordSource,
    request: &AnalyticsRequest,
    config: &FetchConfig,
) -> StreamSet {
    let tenant = request.tenant_id.as_str();
    let range = request.date_range;

    let returns = async {
        if request.include_returns {
            fetch_complete(source, StreamKind::Return, tenant, range, config).await
        } else {
            FetchOutcome::skipped(StreamKind::Return)
        }
    };
    let gift_cards = async {
        if request.include_gift_cards {
            fetch_complete(source, StreamKind::GiftCard, tenant, range, config).await
        } else {
            FetchOutcome::skipped(StreamKind::GiftCard)
        }
    };

    let (sales, returns, gift_cards) = tokio::join!(
        fetch_complete(source, StreamKind::Sale, tenant, range, config),
        returns,
        gift_cards
    );

    StreamSet {
        sales,
        returns,
        gift_cards,
    }
}

/// In-memory tables with a per-query row cap, used for offline CSV runs and tests.
#[derive(Debug, Clone)]
pub struct MemorySource {
    tables: HashMap<StreamKind, Vec<RawRecord>>,
    row_cap: usize,
}

impl MemorySource {
    pub fn new(row_cap: usize) -> Self {
        Self {
            tables: HashMap::new(),
            row_cap: row_cap.max(1),
        }
    }

    pub fn insert(&mut self, stream: StreamKind, records: impl IntoIterator<Item = RawRecord>) {
        let table = self.tables.entry(stream).or_default();
        table.extend(records);
        table.sort_by(|a, b| a.sale_date.cmp(&b.sale_date).then(a.id.cmp(&b.id)));
    }

    pub fn with(mut self, stream: StreamKind, records: Vec<RawRecord>) -> Self {
        self.insert(stream, records);
        self
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn fetch_page(&self, query: PageQuery<'_>) -> EngineResult<Vec<RawRecord>> {
        let Some(table) = self.tables.get(&query.stream) else {
            return Ok(Vec::new());
        };

        let rows = table
            .iter()
            .filter(|record| record.tenant_id == query.tenant_id)
            .filter(|record| match query.range {
                Some(range) => record.sale_date >= range.start && record.sale_date <= range.end,
                None => true,
            })
            .skip(query.offset)
            .take(query.limit.min(self.row_cap))
            .cloned()
            .collect();

        Ok(rows)
    }
}
