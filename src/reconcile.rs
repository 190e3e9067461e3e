use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::metrics::parse_percent;
use crate::models::{AnalyticsRequest, CanonicalTicket, RawRecord, SourceKind};

/// Store/rep restriction applied to attributed entities.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub store_id: Option<String>,
    pub sales_rep: Option<String>,
}

impl EntityFilter {
    pub fn from_request(request: &AnalyticsRequest) -> Self {
        Self {
            store_id: clean(&request.store_id),
            sales_rep: clean(&request.sales_rep_id),
        }
    }

    pub fn matches(&self, store: Option<&str>, rep: Option<&str>) -> bool {
        let store_ok = match &self.store_id {
            Some(wanted) => store == Some(wanted.as_str()),
            None => true,
        };
        let rep_ok = match &self.sales_rep {
            Some(wanted) => rep == Some(wanted.as_str()),
            None => true,
        };
        store_ok && rep_ok
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReturnTally {
    pub count: usize,
    pub value: f64,
}

impl ReturnTally {
    fn add(&mut self, amount: f64) {
        self.count += 1;
        self.value += amount.abs();
    }
}

/// Canonical per-ticket ledger plus the side metrics gathered while building it.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub tickets: BTreeMap<String, CanonicalTicket>,
    pub returns: ReturnTally,
    pub returns_by_store: BTreeMap<String, ReturnTally>,
    pub returns_by_rep: BTreeMap<String, ReturnTally>,
    pub items_sold: i64,
    pub items_by_store: BTreeMap<String, i64>,
    pub items_by_rep: BTreeMap<String, i64>,
    pub gift_card_value: f64,
    pub parse_skipped: usize,
    pub records_without_ticket: usize,
}

impl Ledger {
    pub fn total_revenue(&self) -> f64 {
        self.tickets.values().map(|t| t.revenue_total).sum()
    }

    pub fn gift_card_tickets(&self) -> usize {
        self.tickets.values().filter(|t| t.has_gift_card).count()
    }
}

struct Claim<'a> {
    kind: SourceKind,
    record: &'a RawRecord,
    revenue: f64,
}

#[derive(Default)]
struct ProfitSlots {
    sale: Option<f64>,
    returned: Option<f64>,
    gift_card: Option<f64>,
}

impl ProfitSlots {
    fn for_claim(&self, kind: SourceKind) -> Option<f64> {
        let own = match kind {
            SourceKind::Sale => self.sale,
            SourceKind::ReturnOnly => self.returned,
            SourceKind::GiftCardOnly => self.gift_card,
        };
        own.or(self.sale).or(self.returned).or(self.gift_card)
    }
}

/// Merge the three streams into one ledger.
///
/// Each ticket number is claimed once, Sale first, then Return, then
/// GiftCard. Within a stream the first line for a ticket wins; gift-card
/// lines are summed per ticket before claiming.
pub fn reconcile(
    sales: &[RawRecord],
    returns: &[RawRecord],
    gift_cards: &[RawRecord],
    filter: &EntityFilter,
) -> Ledger {
    let mut ledger = Ledger::default();
    let mut claims: BTreeMap<&str, Claim<'_>> = BTreeMap::new();
    let mut profits: HashMap<&str, ProfitSlots> = HashMap::new();

    for record in sales {
        let Some(ticket) = record.ticket() else {
            ledger.records_without_ticket += 1;
            continue;
        };

        let store = clean(&record.store_id);
        let rep = clean(&record.sales_rep);
        if filter.matches(store.as_deref(), rep.as_deref()) {
            ledger.items_sold += record.quantity_sold;
            if let Some(store) = store {
                *ledger.items_by_store.entry(store).or_default() += record.quantity_sold;
            }
            if let Some(rep) = rep {
                *ledger.items_by_rep.entry(rep).or_default() += record.quantity_sold;
            }
        }

        if claims.contains_key(ticket) {
            continue;
        }
        let slots = profits.entry(ticket).or_default();
        slots.sale = profit_of(record, &mut ledger.parse_skipped);
        claims.insert(
            ticket,
            Claim {
                kind: SourceKind::Sale,
                record,
                revenue: record.transaction_total,
            },
        );
    }

    let mut seen_returns: HashSet<&str> = HashSet::new();
    for record in returns {
        let Some(ticket) = record.ticket() else {
            ledger.records_without_ticket += 1;
            continue;
        };
        if !seen_returns.insert(ticket) {
            continue;
        }

        let store = clean(&record.store_id);
        let rep = clean(&record.sales_rep);
        if filter.matches(store.as_deref(), rep.as_deref()) {
            ledger.returns.add(record.transaction_total);
            if let Some(store) = store {
                ledger
                    .returns_by_store
                    .entry(store)
                    .or_default()
                    .add(record.transaction_total);
            }
            if let Some(rep) = rep {
                ledger
                    .returns_by_rep
                    .entry(rep)
                    .or_default()
                    .add(record.transaction_total);
            }
        }

        profits.entry(ticket).or_default().returned =
            profit_of(record, &mut ledger.parse_skipped);
        claims.entry(ticket).or_insert(Claim {
            kind: SourceKind::ReturnOnly,
            record,
            revenue: record.transaction_total,
        });
    }

    let mut gift_sums: BTreeMap<&str, (f64, &RawRecord)> = BTreeMap::new();
    for record in gift_cards {
        let Some(ticket) = record.ticket() else {
            ledger.records_without_ticket += 1;
            continue;
        };
        let amount = record.gift_card_amount.unwrap_or(record.transaction_total);
        let slots = profits.entry(ticket).or_default();
        if slots.gift_card.is_none() {
            slots.gift_card = profit_of(record, &mut ledger.parse_skipped);
        }
        gift_sums
            .entry(ticket)
            .and_modify(|(sum, _)| *sum += amount)
            .or_insert((amount, record));
    }

    for (&ticket, &(sum, first_line)) in &gift_sums {
        claims.entry(ticket).or_insert(Claim {
            kind: SourceKind::GiftCardOnly,
            record: first_line,
            revenue: sum,
        });
    }

    for (ticket, claim) in claims {
        let store_id = clean(&claim.record.store_id);
        let sales_rep = clean(&claim.record.sales_rep);
        if !filter.matches(store_id.as_deref(), sales_rep.as_deref()) {
            continue;
        }

        let gift_amount = gift_sums.get(ticket).map(|(sum, _)| *sum);
        if let Some(amount) = gift_amount {
            ledger.gift_card_value += amount;
        }

        let gross_profit_percent = profits
            .get(ticket)
            .and_then(|slots| slots.for_claim(claim.kind));

        ledger.tickets.insert(
            ticket.to_string(),
            CanonicalTicket {
                ticket_number: ticket.to_string(),
                revenue_total: claim.revenue,
                gross_profit_percent,
                store_id,
                sales_rep,
                sale_date: claim.record.sale_date,
                source_kind: claim.kind,
                has_gift_card: gift_amount.is_some(),
            },
        );
    }

    debug!(
        tickets = ledger.tickets.len(),
        returns = ledger.returns.count,
        skipped = ledger.records_without_ticket,
        "ledger reconciled"
    );
    ledger
}

fn profit_of(record: &RawRecord, skipped: &mut usize) -> Option<f64> {
    let raw = record.gross_profit_percent.as_deref()?;
    let parsed = parse_percent(raw);
    if parsed.is_none() {
        *skipped += 1;
    }
    parsed
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    pub(crate) fn line(ticket: &str, store: &str, rep: &str, total: f64) -> RawRecord {
        RawRecord {
            id: Uuid::new_v4(),
            tenant_id: "acme".to_string(),
            ticket_number: Some(ticket.to_string()),
            sale_date: Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
            store_id: Some(store.to_string()),
            sales_rep: Some(rep.to_string()),
            transaction_total: total,
            gross_profit_percent: None,
            quantity_sold: 1,
            gift_card_amount: None,
        }
    }

    fn gift(ticket: &str, amount: f64) -> RawRecord {
        RawRecord {
            gift_card_amount: Some(amount),
            ..line(ticket, "S1", "Dana", amount)
        }
    }

    #[test]
    fn sale_wins_over_return() {
        let sales = vec![line("T1", "S1", "Dana", 100.0)];
        let returns = vec![line("T1", "S1", "Dana", 30.0)];

        let ledger = reconcile(&sales, &returns, &[], &EntityFilter::default());
        let ticket = &ledger.tickets["T1"];
        assert_eq!(ticket.revenue_total, 100.0);
        assert_eq!(ticket.source_kind, SourceKind::Sale);
        assert_eq!(ledger.returns.count, 1);
        assert_eq!(ledger.returns.value, 30.0);
        assert_eq!(ledger.total_revenue(), 100.0);
    }

    #[test]
    fn gift_card_lines_are_summed_when_unclaimed() {
        let gifts = vec![gift("T2", 20.0), gift("T2", 15.0)];

        let ledger = reconcile(&[], &[], &gifts, &EntityFilter::default());
        let ticket = &ledger.tickets["T2"];
        assert_eq!(ticket.revenue_total, 35.0);
        assert_eq!(ticket.source_kind, SourceKind::GiftCardOnly);
        assert!(ticket.has_gift_card);
        assert_eq!(ledger.gift_card_value, 35.0);
    }

    #[test]
    fn ticket_in_all_streams_is_claimed_once() {
        let sales = vec![line("T3", "S1", "Dana", 80.0)];
        let returns = vec![line("T3", "S2", "Eli", 80.0)];
        let gifts = vec![gift("T3", 25.0)];

        let ledger = reconcile(&sales, &returns, &gifts, &EntityFilter::default());
        assert_eq!(ledger.tickets.len(), 1);
        let ticket = &ledger.tickets["T3"];
        assert_eq!(ticket.revenue_total, 80.0);
        assert_eq!(ticket.store_id.as_deref(), Some("S1"));
        assert!(ticket.has_gift_card);
        let raw: f64 = 80.0 + 80.0 + 25.0;
        assert!(ledger.total_revenue() <= raw);
    }

    #[test]
    fn duplicate_sale_lines_are_not_summed() {
        let sales = vec![
            line("T4", "S1", "Dana", 60.0),
            line("T4", "S1", "Dana", 45.0),
        ];

        let ledger = reconcile(&sales, &[], &[], &EntityFilter::default());
        assert_eq!(ledger.tickets["T4"].revenue_total, 60.0);
        assert_eq!(ledger.items_sold, 2);
    }

    #[test]
    fn return_only_ticket_takes_return_attribution() {
        let returns = vec![line("T5", "S2", "Eli", 42.0)];

        let ledger = reconcile(&[], &returns, &[], &EntityFilter::default());
        let ticket = &ledger.tickets["T5"];
        assert_eq!(ticket.source_kind, SourceKind::ReturnOnly);
        assert_eq!(ticket.sales_rep.as_deref(), Some("Eli"));
        assert_eq!(ledger.returns_by_store["S2"].count, 1);
    }

    #[test]
    fn profit_falls_back_to_first_available_source() {
        let sales = vec![line("T6", "S1", "Dana", 90.0)];
        let mut returned = line("T6", "S1", "Dana", 90.0);
        returned.gross_profit_percent = Some("38.5%".to_string());

        let ledger = reconcile(&sales, &[returned], &[], &EntityFilter::default());
        assert_eq!(ledger.tickets["T6"].gross_profit_percent, Some(38.5));
    }

    #[test]
    fn malformed_profit_is_counted_not_zeroed() {
        let mut sale = line("T7", "S1", "Dana", 90.0);
        sale.gross_profit_percent = Some("n/a".to_string());

        let ledger = reconcile(&[sale], &[], &[], &EntityFilter::default());
        assert_eq!(ledger.tickets["T7"].gross_profit_percent, None);
        assert_eq!(ledger.parse_skipped, 1);
    }

    #[test]
    fn records_without_ticket_are_skipped() {
        let mut sale = line("", "S1", "Dana", 90.0);
        sale.ticket_number = Some("   ".to_string());
        let mut other = line("T8", "S1", "Dana", 10.0);
        other.ticket_number = None;

        let ledger = reconcile(&[sale, other], &[], &[], &EntityFilter::default());
        assert!(ledger.tickets.is_empty());
        assert_eq!(ledger.records_without_ticket, 2);
    }

    #[test]
    fn filter_uses_claiming_entity() {
        let sales = vec![
            line("T1", "S1", "Dana", 100.0),
            line("T2", "S2", "Eli", 50.0),
        ];
        let returns = vec![line("T1", "S2", "Eli", 20.0)];
        let filter = EntityFilter {
            store_id: Some("S2".to_string()),
            sales_rep: None,
        };

        let ledger = reconcile(&sales, &returns, &[], &filter);
        assert_eq!(ledger.tickets.len(), 1);
        assert!(ledger.tickets.contains_key("T2"));
        assert_eq!(ledger.returns.count, 1);
        assert_eq!(ledger.items_sold, 1);
    }

    #[test]
    fn ticket_without_entity_still_counts_in_totals() {
        let mut sale = line("T9", "S1", "Dana", 75.0);
        sale.store_id = None;
        sale.sales_rep = Some(" ".to_string());

        let ledger = reconcile(&[sale], &[], &[], &EntityFilter::default());
        let ticket = &ledger.tickets["T9"];
        assert!(ticket.store_id.is_none());
        assert!(ticket.sales_rep.is_none());
        assert_eq!(ledger.total_revenue(), 75.0);

        let rollup = crate::rollup::build(&ledger);
        assert!(rollup.stores.is_empty());
        assert!(rollup.reps.is_empty());
        let metrics = crate::metrics::aggregate(&ledger);
        assert_eq!(metrics.total_sales, 75.0);
        assert_eq!(metrics.ticket_count, 1);
    }
}
