//! `stockledger-core`: domain primitives shared by every stockledger crate.
//!
//! Pure domain code only (no storage, no I/O).

pub mod entity;
pub mod error;
pub mod id;
pub mod money;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, IncomingId, LedgerEntryId, LocationId, PositionId, StockId};
pub use money::{
    MAX_QUANTITY, MAX_UNIT_COST, Quantity, UnitCost, add_money, extended_cost, format_money,
    validate_unit_cost,
};
