//! Read-only ledger reports.
//!
//! Reports are built from [`LedgerLine`]s (ledger entries joined with their position)
//! served by any [`InventoryStore`]. Rendering is stateless: see [`format_date`] and
//! [`stockledger_core::format_money`].

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    CustomerId, DomainError, DomainResult, LedgerEntryId, LocationId, Quantity, StockId,
    UnitCost, add_money, extended_cost, format_money,
};
use stockledger_inventory::{LedgerEntry, MaterialType};

use crate::store::{InventoryStore, StoreResult};

/// A ledger entry with the position attributes reports group and filter by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub entry: LedgerEntry,
    pub customer_id: CustomerId,
    pub location_id: LocationId,
    pub material_type: MaterialType,
}

/// Store-level selection of ledger lines. Bounds apply to `updated_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub customer_id: Option<CustomerId>,
    pub material_type: Option<MaterialType>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn matches(&self, line: &LedgerLine) -> bool {
        self.customer_id.is_none_or(|c| c == line.customer_id)
            && self.material_type.is_none_or(|t| t == line.material_type)
            && self.from.is_none_or(|from| line.entry.updated_at >= from)
            && self.until.is_none_or(|until| line.entry.updated_at < until)
    }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn end_of(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.checked_add_days(Days::new(1)).map(start_of)
}

/// `M/D/YYYY`, without zero padding.
pub fn format_date(day: NaiveDate) -> String {
    format!("{}/{}/{}", day.month(), day.day(), day.year())
}

/// Filters of the transaction report. Dates are inclusive calendar days (UTC).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReportQuery {
    pub customer_id: Option<CustomerId>,
    pub material_type: Option<MaterialType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl TransactionReportQuery {
    pub fn filter(&self) -> LedgerFilter {
        LedgerFilter {
            customer_id: self.customer_id,
            material_type: self.material_type,
            from: self.date_from.map(start_of),
            until: self.date_to.and_then(end_of),
        }
    }
}

/// Filters of the balance report. `as_of` includes the whole day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReportQuery {
    pub customer_id: Option<CustomerId>,
    pub material_type: Option<MaterialType>,
    pub as_of: Option<NaiveDate>,
}

impl BalanceReportQuery {
    pub fn filter(&self) -> LedgerFilter {
        LedgerFilter {
            customer_id: self.customer_id,
            material_type: self.material_type,
            from: None,
            until: self.as_of.and_then(end_of),
        }
    }
}

/// One ledger movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub entry_id: LedgerEntryId,
    pub stock_id: StockId,
    pub material_type: MaterialType,
    pub location_id: LocationId,
    pub quantity: Quantity,
    pub unit_cost: UnitCost,
    pub cost: Decimal,
    pub date: NaiveDate,
}

/// [`TransactionRow`] rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedTransactionRow {
    pub stock_id: String,
    pub material_type: String,
    pub quantity: Quantity,
    pub unit_cost: String,
    pub cost: String,
    pub date: String,
}

impl TransactionRow {
    pub fn formatted(&self) -> FormattedTransactionRow {
        FormattedTransactionRow {
            stock_id: self.stock_id.to_string(),
            material_type: self.material_type.to_string(),
            quantity: self.quantity,
            unit_cost: format_money(self.unit_cost),
            cost: format_money(self.cost),
            date: format_date(self.date),
        }
    }
}

/// Net holding of one stock at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub stock_id: StockId,
    pub location_id: LocationId,
    pub material_type: MaterialType,
    pub quantity: Quantity,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedBalanceRow {
    pub stock_id: String,
    pub location_id: LocationId,
    pub material_type: String,
    pub quantity: Quantity,
    pub value: String,
}

impl BalanceRow {
    pub fn formatted(&self) -> FormattedBalanceRow {
        FormattedBalanceRow {
            stock_id: self.stock_id.to_string(),
            location_id: self.location_id,
            material_type: self.material_type.to_string(),
            quantity: self.quantity,
            value: format_money(self.value),
        }
    }
}

/// Transaction rows ordered by date, then by entry id.
pub fn transaction_rows(lines: &[LedgerLine]) -> DomainResult<Vec<TransactionRow>> {
    let mut rows = lines
        .iter()
        .map(|line| {
            Ok(TransactionRow {
                entry_id: line.entry.id,
                stock_id: line.entry.stock_id.clone(),
                material_type: line.material_type,
                location_id: line.location_id,
                quantity: line.entry.quantity_change,
                unit_cost: line.entry.unit_cost,
                cost: extended_cost(line.entry.quantity_change, line.entry.unit_cost)?,
                date: line.entry.updated_at.date_naive(),
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;
    rows.sort_by(|a, b| a.date.cmp(&b.date).then(a.entry_id.cmp(&b.entry_id)));
    Ok(rows)
}

/// Lines summed per (stock, location, material type), in that order.
pub fn balance_rows(lines: &[LedgerLine]) -> DomainResult<Vec<BalanceRow>> {
    let mut groups: BTreeMap<(StockId, LocationId, MaterialType), (Quantity, Decimal)> =
        BTreeMap::new();
    for line in lines {
        let slot = groups
            .entry((
                line.entry.stock_id.clone(),
                line.location_id,
                line.material_type,
            ))
            .or_insert((0, Decimal::ZERO));
        slot.0 = slot
            .0
            .checked_add(line.entry.quantity_change)
            .ok_or_else(|| DomainError::validation("balance quantity overflows"))?;
        slot.1 = add_money(
            slot.1,
            extended_cost(line.entry.quantity_change, line.entry.unit_cost)?,
        )?;
    }
    Ok(groups
        .into_iter()
        .map(
            |((stock_id, location_id, material_type), (quantity, value))| BalanceRow {
                stock_id,
                location_id,
                material_type,
                quantity,
                value,
            },
        )
        .collect())
}

pub async fn transaction_report<S: InventoryStore>(
    store: &S,
    query: &TransactionReportQuery,
) -> StoreResult<Vec<TransactionRow>> {
    let lines = store.ledger_lines(&query.filter()).await?;
    Ok(transaction_rows(&lines)?)
}

pub async fn balance_report<S: InventoryStore>(
    store: &S,
    query: &BalanceReportQuery,
) -> StoreResult<Vec<BalanceRow>> {
    let lines = store.ledger_lines(&query.filter()).await?;
    Ok(balance_rows(&lines)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use stockledger_core::PositionId;

    fn line(
        id: i64,
        location: i64,
        quantity: Quantity,
        cost: Decimal,
        at: DateTime<Utc>,
    ) -> LedgerLine {
        LedgerLine {
            entry: LedgerEntry {
                id: LedgerEntryId::new(id),
                position_id: PositionId::new(location),
                stock_id: StockId::new("CARD-100").unwrap(),
                quantity_change: quantity,
                unit_cost: cost,
                notes: String::new(),
                job_ticket: None,
                updated_at: at,
                remaining_quantity: 0,
            },
            customer_id: CustomerId::new(1),
            location_id: LocationId::new(location),
            material_type: MaterialType::Card,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dates_render_without_padding() {
        assert_eq!(format_date(day(2024, 3, 7)), "3/7/2024");
        assert_eq!(format_date(day(2023, 12, 31)), "12/31/2023");
    }

    #[test]
    fn date_range_includes_both_end_days() {
        let query = TransactionReportQuery {
            date_from: Some(day(2024, 3, 1)),
            date_to: Some(day(2024, 3, 2)),
            ..TransactionReportQuery::default()
        };
        let filter = query.filter();

        let inside = line(1, 1, 5, dec!(1), Utc.with_ymd_and_hms(2024, 3, 2, 23, 59, 59).unwrap());
        let before = line(2, 1, 5, dec!(1), Utc.with_ymd_and_hms(2024, 2, 29, 23, 0, 0).unwrap());
        let after = line(3, 1, 5, dec!(1), Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap());

        assert!(filter.matches(&inside));
        assert!(!filter.matches(&before));
        assert!(!filter.matches(&after));
    }

    #[test]
    fn filter_by_customer_and_type() {
        let at = Utc::now();
        let mut other = line(1, 1, 5, dec!(1), at);
        other.customer_id = CustomerId::new(2);
        other.material_type = MaterialType::Envelope;

        let filter = LedgerFilter {
            customer_id: Some(CustomerId::new(1)),
            ..LedgerFilter::default()
        };
        assert!(!filter.matches(&other));
        assert!(filter.matches(&line(2, 1, 5, dec!(1), at)));

        let by_type = LedgerFilter {
            material_type: Some(MaterialType::Envelope),
            ..LedgerFilter::default()
        };
        assert!(by_type.matches(&other));
    }

    #[test]
    fn transaction_rows_carry_extended_cost() {
        let at = Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap();
        let rows =
            transaction_rows(&[line(2, 1, -2, dec!(2), at), line(1, 1, 10, dec!(1.5), at)])
                .unwrap();

        assert_eq!(rows[0].entry_id, LedgerEntryId::new(1));
        assert_eq!(rows[0].cost, dec!(15.0));
        assert_eq!(rows[1].cost, dec!(-4));

        let formatted = rows[1].formatted();
        assert_eq!(formatted.cost, "-$4.00");
        assert_eq!(formatted.unit_cost, "$2.00");
        assert_eq!(formatted.date, "5/4/2024");
    }

    #[test]
    fn balance_rows_group_per_location() {
        let at = Utc::now();
        let rows = balance_rows(&[
            line(1, 1, 10, dec!(1), at),
            line(2, 1, 5, dec!(2), at),
            line(3, 1, -10, dec!(1), at),
            line(4, 1, -2, dec!(2), at),
            line(5, 2, 10, dec!(1), at),
            line(6, 2, 2, dec!(2), at),
        ])
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].quantity, rows[0].value), (3, dec!(6)));
        assert_eq!((rows[1].quantity, rows[1].value), (12, dec!(14)));
        assert_eq!(rows[1].formatted().value, "$14.00");
    }

    #[test]
    fn oversized_values_fail_instead_of_panicking() {
        let at = Utc::now();
        let huge = [line(1, 1, 9_000_000_000_000_000_000, dec!(10000000000), at)];

        assert!(matches!(transaction_rows(&huge), Err(DomainError::Validation(_))));
        assert!(matches!(balance_rows(&huge), Err(DomainError::Validation(_))));

        let wrapping = [
            line(1, 1, i64::MAX, dec!(0), at),
            line(2, 1, 1, dec!(0), at),
        ];
        assert!(balance_rows(&wrapping).is_err());
    }
}
