//! Inventory ledger domain.
//!
//! Positions, staged receipts, cost layers and the pure FIFO allocation over them.
//! Deterministic domain logic only (no IO, no storage).

pub mod audit;
pub mod commands;
pub mod incoming;
pub mod layer;
pub mod material;

pub use audit::{LedgerBalance, OpenLayer, reconcile};
pub use commands::{MoveMaterial, ReceiveMaterial, RemoveMaterial};
pub use incoming::{IncomingRecord, NewIncoming};
pub use layer::{
    LayerAmendment, LayerDraw, LedgerEntry, NewLedgerEntry, Posting, ReceiptPlan, plan_issue,
    plan_receipt,
};
pub use material::{MaterialPosition, MaterialType, NewPosition, PositionKey, ReorderThresholds};
