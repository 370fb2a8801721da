use core::str::FromStr;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use stockledger_core::{CustomerId, IncomingId, LocationId, PositionId, Quantity, StockId};
use stockledger_infra::lifecycle::MoveOutcome;
use stockledger_infra::reporting::{
    BalanceReportQuery, BalanceRow, TransactionReportQuery, TransactionRow,
};
use stockledger_inventory::{
    IncomingRecord, LedgerBalance, LedgerEntry, MaterialPosition, MaterialType, MoveMaterial,
    NewIncoming, ReceiveMaterial, RemoveMaterial, ReorderThresholds,
};

use crate::app::errors;

type Parsed<T> = Result<T, axum::response::Response>;

// -------------------------
// Request DTOs
// -------------------------

/// Numbers arrive as strings, as the warehouse front end sends them.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageIncomingRequest {
    pub customer_id: String,
    pub stock_id: String,
    #[serde(rename = "type")]
    pub material_type: String,
    pub quantity: String,
    pub cost: String,
    #[serde(default)]
    pub min_quantity: String,
    #[serde(default)]
    pub max_quantity: String,
    #[serde(default)]
    pub description: String,
    pub owner: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// `materialId` names the staged (incoming) record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveMaterialRequest {
    pub material_id: String,
    pub location_id: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMaterialRequest {
    pub material_id: String,
    pub location_id: String,
    pub quantity: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMaterialRequest {
    pub material_id: String,
    pub quantity: String,
    pub job_ticket: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReportParams {
    pub customer_id: Option<String>,
    pub material_type: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReportParams {
    pub customer_id: Option<String>,
    pub material_type: Option<String>,
    pub date_as_of: Option<String>,
}

// -------------------------
// Request parsing
// -------------------------

fn parse<T>(field: &str, raw: &str) -> Parsed<T>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| errors::bad_request(format!("invalid {field} {raw:?}: {e}")))
}

/// Empty thresholds mean "not set".
fn parse_or_zero(field: &str, raw: &str) -> Parsed<Quantity> {
    if raw.trim().is_empty() {
        return Ok(0);
    }
    parse(field, raw)
}

/// Missing and empty query values both mean "no filter".
fn parse_optional<T>(field: &str, raw: Option<&str>) -> Parsed<Option<T>>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => parse(field, value).map(Some),
        None => Ok(None),
    }
}

fn parse_date(field: &str, raw: Option<&str>) -> Parsed<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| errors::bad_request(format!("invalid {field} {value:?}: {e}"))),
        None => Ok(None),
    }
}

impl StageIncomingRequest {
    pub fn into_new_incoming(self) -> Parsed<NewIncoming> {
        let thresholds = ReorderThresholds::new(
            parse_or_zero("minQuantity", &self.min_quantity)?,
            parse_or_zero("maxQuantity", &self.max_quantity)?,
        )
        .map_err(|e| errors::bad_request(e.to_string()))?;

        Ok(NewIncoming {
            customer_id: parse::<CustomerId>("customerId", &self.customer_id)?,
            stock_id: parse::<StockId>("stockId", &self.stock_id)?,
            material_type: parse::<MaterialType>("type", &self.material_type)?,
            quantity: parse("quantity", &self.quantity)?,
            unit_cost: parse::<Decimal>("cost", &self.cost)?,
            thresholds,
            notes: self.description,
            is_active: self.is_active,
            owner: self.owner,
        })
    }
}

impl ReceiveMaterialRequest {
    pub fn into_command(self) -> Parsed<ReceiveMaterial> {
        Ok(ReceiveMaterial {
            incoming_id: parse::<IncomingId>("materialId", &self.material_id)?,
            location_id: parse::<LocationId>("locationId", &self.location_id)?,
            notes: self.notes,
            occurred_at: Utc::now(),
        })
    }
}

impl MoveMaterialRequest {
    pub fn into_command(self) -> Parsed<MoveMaterial> {
        Ok(MoveMaterial {
            position_id: parse::<PositionId>("materialId", &self.material_id)?,
            location_id: parse::<LocationId>("locationId", &self.location_id)?,
            quantity: parse("quantity", &self.quantity)?,
            notes: self.notes,
            occurred_at: Utc::now(),
        })
    }
}

impl RemoveMaterialRequest {
    pub fn into_command(self) -> Parsed<RemoveMaterial> {
        Ok(RemoveMaterial {
            position_id: parse::<PositionId>("materialId", &self.material_id)?,
            quantity: parse("quantity", &self.quantity)?,
            job_ticket: self.job_ticket,
            notes: self.notes.filter(|n| !n.is_empty()),
            occurred_at: Utc::now(),
        })
    }
}

impl TransactionReportParams {
    pub fn into_query(self) -> Parsed<TransactionReportQuery> {
        Ok(TransactionReportQuery {
            customer_id: parse_optional("customerId", self.customer_id.as_deref())?,
            material_type: parse_optional("materialType", self.material_type.as_deref())?,
            date_from: parse_date("dateFrom", self.date_from.as_deref())?,
            date_to: parse_date("dateTo", self.date_to.as_deref())?,
        })
    }
}

impl BalanceReportParams {
    pub fn into_query(self) -> Parsed<BalanceReportQuery> {
        Ok(BalanceReportQuery {
            customer_id: parse_optional("customerId", self.customer_id.as_deref())?,
            material_type: parse_optional("materialType", self.material_type.as_deref())?,
            as_of: parse_date("dateAsOf", self.date_as_of.as_deref())?,
        })
    }
}

pub fn parse_position_id(raw: &str) -> Parsed<PositionId> {
    parse("material id", raw)
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn position_to_json(p: MaterialPosition) -> serde_json::Value {
    serde_json::json!({
        "materialId": p.id,
        "stockId": p.stock_id,
        "customerId": p.customer_id,
        "locationId": p.location_id,
        "owner": p.owner,
        "materialType": p.material_type.as_str(),
        "description": p.description,
        "notes": p.notes,
        "quantity": p.quantity,
        "cost": p.unit_cost.to_string(),
        "minQuantity": p.thresholds.min,
        "maxQuantity": p.thresholds.max,
        "isActive": p.is_active,
        "updatedAt": p.updated_at.to_rfc3339(),
    })
}

pub fn move_outcome_to_json(outcome: MoveOutcome) -> serde_json::Value {
    serde_json::json!({
        "source": position_to_json(outcome.source),
        "destination": position_to_json(outcome.destination),
    })
}

pub fn incoming_to_json(r: IncomingRecord) -> serde_json::Value {
    serde_json::json!({
        "shippingId": r.id,
        "customerId": r.customer_id,
        "stockId": r.stock_id,
        "materialType": r.material_type.as_str(),
        "quantity": r.quantity,
        "cost": r.unit_cost.to_string(),
        "minQuantity": r.thresholds.min,
        "maxQuantity": r.thresholds.max,
        "notes": r.notes,
        "isActive": r.is_active,
        "owner": r.owner,
    })
}

pub fn ledger_entry_to_json(e: LedgerEntry) -> serde_json::Value {
    serde_json::json!({
        "transactionId": e.id,
        "materialId": e.position_id,
        "stockId": e.stock_id,
        "quantityChange": e.quantity_change,
        "cost": e.unit_cost.to_string(),
        "remainingQuantity": e.remaining_quantity,
        "notes": e.notes,
        "jobTicket": e.job_ticket,
        "updatedAt": e.updated_at.to_rfc3339(),
    })
}

pub fn ledger_balance_to_json(b: LedgerBalance) -> serde_json::Value {
    serde_json::json!({
        "materialId": b.position_id,
        "quantity": b.quantity,
        "value": b.value.to_string(),
        "openLayers": b.open_layers.into_iter().map(|l| serde_json::json!({
            "cost": l.unit_cost.to_string(),
            "remainingQuantity": l.remaining_quantity,
        })).collect::<Vec<_>>(),
    })
}

pub fn transaction_row_to_json(row: TransactionRow) -> serde_json::Value {
    let shown = row.formatted();
    serde_json::json!({
        "stockId": shown.stock_id,
        "materialType": shown.material_type,
        "locationId": row.location_id,
        "quantity": shown.quantity,
        "unitCost": shown.unit_cost,
        "cost": shown.cost,
        "date": shown.date,
    })
}

pub fn balance_row_to_json(row: BalanceRow) -> serde_json::Value {
    let shown = row.formatted();
    serde_json::json!({
        "stockId": shown.stock_id,
        "locationId": shown.location_id,
        "materialType": shown.material_type,
        "quantity": shown.quantity,
        "totalValue": shown.value,
    })
}
