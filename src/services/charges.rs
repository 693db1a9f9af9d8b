//! Pure tax and service-charge arithmetic. No I/O; everything here is
//! deterministic over `rust_decimal` values so retries and merges recompute
//! to identical results.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::hotel;

/// A hotel's percentage rate configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    pub cgst_rate: Decimal,
    pub sgst_rate: Decimal,
    pub service_charge_rate: Decimal,
}

impl From<&hotel::Model> for RateCard {
    fn from(hotel: &hotel::Model) -> Self {
        Self {
            cgst_rate: hotel.cgst_rate,
            sgst_rate: hotel.sgst_rate,
            service_charge_rate: hotel.service_charge_rate,
        }
    }
}

/// Charges computed from one subtotal at one rate card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeBreakdown {
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub service_charge: Decimal,
}

impl ChargeBreakdown {
    pub fn charges_total(&self) -> Decimal {
        self.cgst_amount + self.sgst_amount + self.service_charge
    }
}

/// Computes CGST, SGST and service charge on a subtotal. On merge this is
/// re-run against the cumulative subtotal, not added per delta.
pub fn compute_charges(subtotal: Decimal, rates: &RateCard) -> ChargeBreakdown {
    ChargeBreakdown {
        cgst_amount: subtotal * rates.cgst_rate / Decimal::ONE_HUNDRED,
        sgst_amount: subtotal * rates.sgst_rate / Decimal::ONE_HUNDRED,
        service_charge: subtotal * rates.service_charge_rate / Decimal::ONE_HUNDRED,
    }
}

/// `total = subtotal + charges - discount`.
pub fn compute_total(subtotal: Decimal, charges: &ChargeBreakdown, discount: Decimal) -> Decimal {
    subtotal + charges.charges_total() - discount
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rates() -> RateCard {
        RateCard {
            cgst_rate: dec!(2.5),
            sgst_rate: dec!(2.5),
            service_charge_rate: dec!(5),
        }
    }

    #[test]
    fn charges_on_three_hundred() {
        let charges = compute_charges(dec!(300), &rates());
        assert_eq!(charges.cgst_amount, dec!(7.5));
        assert_eq!(charges.sgst_amount, dec!(7.5));
        assert_eq!(charges.service_charge, dec!(15));
        assert_eq!(compute_total(dec!(300), &charges, Decimal::ZERO), dec!(330));
    }

    #[test]
    fn charges_on_cumulative_subtotal_after_merge() {
        // Taxes are recomputed on the new cumulative subtotal (400), not
        // added to the previous breakdown for 300.
        let charges = compute_charges(dec!(400), &rates());
        assert_eq!(charges.cgst_amount, dec!(10));
        assert_eq!(charges.sgst_amount, dec!(10));
        assert_eq!(charges.service_charge, dec!(20));
        assert_eq!(compute_total(dec!(400), &charges, Decimal::ZERO), dec!(440));
    }

    #[test]
    fn discount_reduces_total() {
        let charges = compute_charges(dec!(200), &rates());
        assert_eq!(compute_total(dec!(200), &charges, dec!(20)), dec!(200));
    }

    #[test]
    fn zero_subtotal_yields_zero_charges() {
        let charges = compute_charges(Decimal::ZERO, &rates());
        assert_eq!(charges.charges_total(), Decimal::ZERO);
    }
}
