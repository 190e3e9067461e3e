use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::fetch::{MemorySource, PageQuery, RecordSource};
use crate::models::{RawRecord, StreamKind};

const COLUMNS: &str = "id, tenant_id, ticket_number, sale_date, store_id, sales_rep, \
     transaction_total, gross_profit_percent, quantity_sold, gift_card_amount";

pub async fn init_db(pool: &PgPool) -> EngineResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Reads the three stream tables in `retail_analytics`.
#[derive(Clone)]
pub struct PgRecordSource {
    pool: PgPool,
}

impl PgRecordSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSource for PgRecordSource {
    async fn fetch_page(&self, query: PageQuery<'_>) -> EngineResult<Vec<RawRecord>> {
        let mut sql = format!(
            "SELECT {COLUMNS} FROM retail_analytics.{} WHERE tenant_id = $1",
            query.stream.table()
        );
        let mut next = 2;
        if query.range.is_some() {
            sql.push_str(" AND sale_date >= $2 AND sale_date <= $3");
            next = 4;
        }
        sql.push_str(&format!(
            " ORDER BY sale_date, id LIMIT ${} OFFSET ${}",
            next,
            next + 1
        ));

        let mut rows = sqlx::query(&sql).bind(query.tenant_id);
        if let Some(range) = query.range {
            rows = rows.bind(range.start).bind(range.end);
        }
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        let records = rows.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        debug!(
            table = query.stream.table(),
            offset = query.offset,
            rows = records.len(),
            "page fetched"
        );

        records
            .into_iter()
            .map(|row| -> EngineResult<RawRecord> {
                Ok(RawRecord {
                    id: row.try_get("id")?,
                    tenant_id: row.try_get("tenant_id")?,
                    ticket_number: row.try_get("ticket_number")?,
                    sale_date: row.try_get("sale_date")?,
                    store_id: row.try_get("store_id")?,
                    sales_rep: row.try_get("sales_rep")?,
                    transaction_total: row.try_get("transaction_total")?,
                    gross_profit_percent: row.try_get("gross_profit_percent")?,
                    quantity_sold: row.try_get("quantity_sold")?,
                    gift_card_amount: row.try_get("gift_card_amount")?,
                })
            })
            .collect()
    }
}

/// Insert one line; returns false when `source_key` was already loaded.
pub async fn insert_record(
    pool: &PgPool,
    stream: StreamKind,
    record: &RawRecord,
    source_key: &str,
) -> EngineResult<bool> {
    let sql = format!(
        "INSERT INTO retail_analytics.{} ({COLUMNS}, source_key) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (source_key) DO NOTHING",
        stream.table()
    );

    let result = sqlx::query(&sql)
        .bind(record.id)
        .bind(&record.tenant_id)
        .bind(&record.ticket_number)
        .bind(record.sale_date)
        .bind(&record.store_id)
        .bind(&record.sales_rep)
        .bind(record.transaction_total)
        .bind(&record.gross_profit_percent)
        .bind(record.quantity_sold)
        .bind(record.gift_card_amount)
        .bind(source_key)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool, tenant_id: &str) -> EngineResult<usize> {
    let start = NaiveDate::from_ymd_opt(2026, 2, 2)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .ok_or_else(|| EngineError::InvalidRequest("invalid seed date".to_string()))?
        .and_utc();

    let mut inserted = 0usize;
    for (stream, record, source_key) in demo_records(tenant_id, start) {
        if insert_record(pool, stream, &record, &source_key).await? {
            inserted += 1;
        }
    }
    info!(tenant = tenant_id, inserted, "seed data loaded");
    Ok(inserted)
}

/// Two weeks of tickets for two stores, with overlapping returns and gift-card lines.
pub fn demo_records(
    tenant_id: &str,
    start: DateTime<Utc>,
) -> Vec<(StreamKind, RawRecord, String)> {
    let staff = [
        ("ST-01", "Avery Lee", 96.0),
        ("ST-01", "Jules Moreno", 82.0),
        ("ST-01", "Kiara Patel", 64.0),
        ("ST-01", "Noor Haddad", 48.0),
        ("ST-02", "Sam Ortiz", 88.0),
        ("ST-02", "Rin Takeda", 71.0),
        ("ST-02", "Jules Moreno", 58.0),
    ];

    let mut out = Vec::new();
    for day in 0..14i64 {
        for (slot, (store, rep, base)) in staff.iter().enumerate() {
            for n in 0..2i64 {
                let ticket = format!("{store}-{day:02}-{slot}{n}");
                // Deterministic wobble of +/- 15% around each rep's baseline.
                let wobble = ((day * 7 + slot as i64 * 3 + n * 5) % 31 - 15) as f64 / 100.0;
                let total = (base * (1.0 + wobble) * 100.0).round() / 100.0;
                let record = RawRecord {
                    id: Uuid::new_v4(),
                    tenant_id: tenant_id.to_string(),
                    ticket_number: Some(ticket.clone()),
                    sale_date: start + Duration::days(day) + Duration::minutes(slot as i64 * 40 + n),
                    store_id: Some(store.to_string()),
                    sales_rep: Some(rep.to_string()),
                    transaction_total: total,
                    gross_profit_percent: Some(format!("{:.1}%", 30.0 + (slot as f64) * 2.5)),
                    quantity_sold: 1 + (day + n) % 4,
                    gift_card_amount: None,
                };

                if (day + slot as i64) % 9 == 0 {
                    let returned = RawRecord {
                        id: Uuid::new_v4(),
                        transaction_total: -(total / 2.0),
                        quantity_sold: 1,
                        ..record.clone()
                    };
                    out.push((StreamKind::Return, returned, format!("seed-ret-{ticket}")));
                }
                if n == 1 && day % 4 == 0 {
                    let redeemed = RawRecord {
                        id: Uuid::new_v4(),
                        gift_card_amount: Some(25.0),
                        transaction_total: 25.0,
                        ..record.clone()
                    };
                    out.push((StreamKind::GiftCard, redeemed, format!("seed-gc-{ticket}")));
                }
                out.push((StreamKind::Sale, record, format!("seed-sale-{ticket}")));
            }
        }

        // Gift-card redemption with no matching sale line.
        let orphan = format!("GC-ONLY-{day:02}");
        for (i, amount) in [20.0, 15.0].into_iter().enumerate() {
            out.push((
                StreamKind::GiftCard,
                RawRecord {
                    id: Uuid::new_v4(),
                    tenant_id: tenant_id.to_string(),
                    ticket_number: Some(orphan.clone()),
                    sale_date: start + Duration::days(day) + Duration::hours(6),
                    store_id: Some("ST-02".to_string()),
                    sales_rep: Some("Rin Takeda".to_string()),
                    transaction_total: amount,
                    gross_profit_percent: None,
                    quantity_sold: 0,
                    gift_card_amount: Some(amount),
                },
                format!("seed-gc-{orphan}-{i}"),
            ));
        }
    }
    out
}

#[derive(Debug, serde::Deserialize)]
struct CsvLine {
    ticket_number: Option<String>,
    sale_date: DateTime<Utc>,
    store_id: Option<String>,
    sales_rep: Option<String>,
    transaction_total: Option<f64>,
    gross_profit_percent: Option<String>,
    quantity_sold: Option<i64>,
    gift_card_amount: Option<f64>,
    source_key: Option<String>,
}

/// Parse a stream export into records plus the key used to deduplicate imports.
pub fn read_csv(
    path: &std::path::Path,
    tenant_id: &str,
) -> EngineResult<Vec<(RawRecord, String)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut lines = Vec::new();

    for result in reader.deserialize::<CsvLine>() {
        let line = result?;
        let source_key = line
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        lines.push((
            RawRecord {
                id: Uuid::new_v4(),
                tenant_id: tenant_id.to_string(),
                ticket_number: line.ticket_number,
                sale_date: line.sale_date,
                store_id: line.store_id,
                sales_rep: line.sales_rep,
                transaction_total: line.transaction_total.unwrap_or(0.0),
                gross_profit_percent: line.gross_profit_percent,
                quantity_sold: line.quantity_sold.unwrap_or(0),
                gift_card_amount: line.gift_card_amount,
            },
            source_key,
        ));
    }

    Ok(lines)
}

pub async fn import_csv(
    pool: &PgPool,
    stream: StreamKind,
    tenant_id: &str,
    csv_path: &std::path::Path,
) -> EngineResult<usize> {
    let mut inserted = 0usize;
    for (record, source_key) in read_csv(csv_path, tenant_id)? {
        if insert_record(pool, stream, &record, &source_key).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Load `sales.csv`, `returns.csv` and `giftcards.csv` from `dir` into memory.
///
/// Missing files are treated as empty streams.
pub fn load_csv_dir(
    dir: &std::path::Path,
    tenant_id: &str,
    row_cap: usize,
) -> EngineResult<MemorySource> {
    let mut source = MemorySource::new(row_cap);
    for stream in [StreamKind::Sale, StreamKind::Return, StreamKind::GiftCard] {
        let path = dir.join(format!("{}.csv", stream.table()));
        if !path.exists() {
            debug!(path = %path.display(), "no export for stream");
            continue;
        }
        let records = read_csv(&path, tenant_id)?
            .into_iter()
            .map(|(record, _)| record)
            .collect();
        source = source.with(stream, records);
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use crate::reconcile::{reconcile, EntityFilter};
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap()
    }

    #[test]
    fn demo_keys_are_unique() {
        let records = demo_records("demo", start());
        let keys: HashSet<_> = records.iter().map(|(_, _, key)| key.as_str()).collect();
        assert_eq!(keys.len(), records.len());
    }

    #[test]
    fn demo_data_exercises_every_source_kind() {
        let records = demo_records("demo", start());
        let pick = |kind: StreamKind| -> Vec<RawRecord> {
            records
                .iter()
                .filter(|(stream, _, _)| *stream == kind)
                .map(|(_, record, _)| record.clone())
                .collect()
        };

        let ledger = reconcile(
            &pick(StreamKind::Sale),
            &pick(StreamKind::Return),
            &pick(StreamKind::GiftCard),
            &EntityFilter::default(),
        );
        let has = |kind: SourceKind| ledger.tickets.values().any(|t| t.source_kind == kind);
        assert!(has(SourceKind::Sale));
        assert!(has(SourceKind::GiftCardOnly));
        assert!(ledger.returns.count > 0);
        assert_eq!(ledger.tickets["GC-ONLY-00"].revenue_total, 35.0);
    }

    #[test]
    fn reads_csv_with_blank_fields() {
        let dir = std::env::temp_dir().join(format!("retail-csv-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sales.csv");
        std::fs::write(
            &path,
            "ticket_number,sale_date,store_id,sales_rep,transaction_total,gross_profit_percent,quantity_sold,gift_card_amount,source_key\n\
             T1,2026-03-01T10:00:00Z,S1,Dana,120.5,41%,3,,k1\n\
             ,2026-03-01T11:00:00Z,S1,,10,,,,\n",
        )
        .unwrap();

        let lines = read_csv(&path, "acme").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0.ticket_number.as_deref(), Some("T1"));
        assert_eq!(lines[0].0.gross_profit_percent.as_deref(), Some("41%"));
        assert_eq!(lines[0].1, "k1");
        assert!(lines[1].0.ticket_number.is_none());
        assert_eq!(lines[1].0.quantity_sold, 0);
        assert!(lines[1].1.starts_with("import-"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn csv_dir_feeds_the_fetcher() {
        let dir = std::env::temp_dir().join(format!("retail-dir-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let header = "ticket_number,sale_date,store_id,sales_rep,transaction_total,gross_profit_percent,quantity_sold,gift_card_amount,source_key\n";
        std::fs::write(
            dir.join("sales.csv"),
            format!("{header}T1,2026-03-01T10:00:00Z,S1,Dana,100,40%,2,,\n"),
        )
        .unwrap();
        std::fs::write(
            dir.join("returns.csv"),
            format!("{header}T1,2026-03-02T10:00:00Z,S1,Dana,30,,1,,\n"),
        )
        .unwrap();

        let source = load_csv_dir(&dir, "acme", 1).unwrap();
        let config = crate::config::FetchConfig::default();
        let sales =
            crate::fetch::fetch_complete(&source, StreamKind::Sale, "acme", None, &config).await;
        let gifts =
            crate::fetch::fetch_complete(&source, StreamKind::GiftCard, "acme", None, &config)
                .await;
        assert_eq!(sales.records.len(), 1);
        assert!(gifts.records.is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
