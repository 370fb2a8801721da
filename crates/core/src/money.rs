//! Quantities, unit costs and money rendering.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Signed unit count. On-hand quantities are never negative; ledger deltas may be.
pub type Quantity = i64;

/// Cost per unit. Fixed-point so that same-cost layers compare exactly.
pub type UnitCost = Decimal;

/// Largest quantity a single receipt may carry.
pub const MAX_QUANTITY: Quantity = 1_000_000_000_000;

/// Fractional digits a unit cost may carry (`NUMERIC(18, 6)`).
pub const UNIT_COST_SCALE: u32 = 6;

/// Largest unit cost that fits `NUMERIC(18, 6)`.
pub const MAX_UNIT_COST: UnitCost =
    Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, UNIT_COST_SCALE);

/// Reject unit costs the ledger cannot store exactly.
pub fn validate_unit_cost(unit_cost: UnitCost) -> DomainResult<()> {
    if unit_cost.is_sign_negative() && !unit_cost.is_zero() {
        return Err(DomainError::validation("unit cost cannot be negative"));
    }
    if unit_cost > MAX_UNIT_COST {
        return Err(DomainError::validation(format!(
            "unit cost {unit_cost} exceeds {MAX_UNIT_COST}"
        )));
    }
    if unit_cost.normalize().scale() > UNIT_COST_SCALE {
        return Err(DomainError::validation(format!(
            "unit cost {unit_cost} has more than {UNIT_COST_SCALE} decimal places"
        )));
    }
    Ok(())
}

/// `quantity * unit_cost`, the value carried by a ledger line.
pub fn extended_cost(quantity: Quantity, unit_cost: UnitCost) -> DomainResult<Decimal> {
    Decimal::from(quantity)
        .checked_mul(unit_cost)
        .ok_or_else(|| {
            DomainError::validation(format!("value of {quantity} x {unit_cost} overflows"))
        })
}

/// Checked sum of two amounts.
pub fn add_money(left: Decimal, right: Decimal) -> DomainResult<Decimal> {
    left.checked_add(right)
        .ok_or_else(|| DomainError::validation(format!("sum of {left} and {right} overflows")))
}

/// Render an amount as `$1,234.56` (two decimals, half away from zero).
///
/// Negative amounts render as `-$12.00`.
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let digits = format!("{:.2}", rounded.abs());
    let (whole, cents) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn formats_with_grouping_and_two_decimals() {
        assert_eq!(format_money(dec!(0)), "$0.00");
        assert_eq!(format_money(dec!(5)), "$5.00");
        assert_eq!(format_money(dec!(1234.5)), "$1,234.50");
        assert_eq!(format_money(dec!(1234567.891)), "$1,234,567.89");
        assert_eq!(format_money(dec!(-12)), "-$12.00");
        assert_eq!(format_money(dec!(0.005)), "$0.01");
        assert_eq!(format_money(dec!(-0.001)), "$0.00");
    }

    #[test]
    fn extended_cost_keeps_sign_of_quantity() {
        assert_eq!(extended_cost(12, dec!(1.25)).unwrap(), dec!(15.00));
        assert_eq!(extended_cost(-2, dec!(2)).unwrap(), dec!(-4));
    }

    #[test]
    fn extended_cost_overflow_is_an_error() {
        let err = extended_cost(9_000_000_000_000_000_000, dec!(10000000000)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(add_money(Decimal::MAX, dec!(1)).is_err());
    }

    #[test]
    fn unit_cost_must_fit_the_ledger_column() {
        assert_eq!(MAX_UNIT_COST, dec!(999999999999.999999));
        assert!(validate_unit_cost(dec!(0)).is_ok());
        assert!(validate_unit_cost(dec!(1.250000)).is_ok());
        assert!(validate_unit_cost(MAX_UNIT_COST).is_ok());
        assert!(validate_unit_cost(dec!(1000000000000)).is_err());
        assert!(validate_unit_cost(dec!(0.0000001)).is_err());
        assert!(validate_unit_cost(dec!(-1)).is_err());
    }

    #[test]
    fn largest_receipt_value_is_representable() {
        assert!(extended_cost(MAX_QUANTITY, MAX_UNIT_COST).is_ok());
        assert!(extended_cost(-MAX_QUANTITY, MAX_UNIT_COST).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn whole_cents_round_trip_through_formatting(cents in -10_000_000i64..10_000_000i64) {
            let amount = Decimal::new(cents, 2);
            let rendered = format_money(amount);
            let stripped: String = rendered.chars().filter(|c| *c != '$' && *c != ',').collect();
            prop_assert_eq!(stripped.parse::<Decimal>().unwrap(), amount);
        }
    }
}
