//! Line and sheet monetary math.
//!
//! All amounts are `rust_decimal::Decimal` (28 significant digits of working
//! precision), rounded to 2 decimal places half-up at the point of storage.
//! Binary floating point never touches money.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use lexledger_core::model::{LineItem, LineKind, Sheet};

/// Round to 2 decimal places, half away from zero (commercial half-up).
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Net amount of a line: quantity times unit price, rounded.
pub fn line_net(quantity: Decimal, unit_price: Decimal) -> Decimal {
    round2(quantity * unit_price)
}

/// VAT on a (rounded) net amount at a percentage rate.
pub fn line_vat(net: Decimal, vat_rate: Decimal) -> Decimal {
    round2(net * vat_rate / Decimal::ONE_HUNDRED)
}

/// Total of a line: net plus VAT. Both inputs are already rounded.
pub fn line_total(net: Decimal, vat: Decimal) -> Decimal {
    round2(net + vat)
}

/// Net, VAT and total for a line in one call. Used by the store when it
/// recomputes stored amounts on every line edit.
pub fn line_amounts(quantity: Decimal, unit_price: Decimal, vat_rate: Decimal) -> (Decimal, Decimal, Decimal) {
    let net = line_net(quantity, unit_price);
    let vat = line_vat(net, vat_rate);
    (net, vat, line_total(net, vat))
}

/// Aggregate totals for one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetTotals {
    /// Sum of line totals over all lines, any kind.
    pub gross_expenses_total: Decimal,
    /// Sum of line totals over lines counting toward the request.
    pub included_expenses_total: Decimal,
    /// Sum of line VAT amounts over all lines.
    pub vat_total: Decimal,
    /// Deductible + legacy already-paid + excluded adjustment/compensation
    /// line totals.
    pub adjustments_total: Decimal,
    /// Included minus adjustments; signed. Internal figure, never requested
    /// from the insurer as a negative.
    pub amount_before_info_only: Decimal,
    /// Final requested amount: zero for info-only sheets, clamped at zero
    /// otherwise.
    pub amount_to_request: Decimal,
    pub info_only_applied: bool,
}

/// Compute the per-sheet aggregate totals.
///
/// Pure function of its inputs: no store access, no side effects, no failure
/// modes. Stored line amounts are taken as-is (the store keeps them in sync
/// with quantity/price/rate on every edit).
pub fn sheet_totals(sheet: &Sheet, lines: &[LineItem]) -> SheetTotals {
    let mut gross = Decimal::ZERO;
    let mut included = Decimal::ZERO;
    let mut vat = Decimal::ZERO;
    let mut excluded_offsets = Decimal::ZERO;

    for line in lines {
        gross += line.total_amount;
        vat += line.vat_amount;
        if line.included_in_request {
            included += line.total_amount;
        } else {
            // Excluded adjustments and compensations reduce the request;
            // excluded plain expenses simply do not count.
            match line.kind {
                LineKind::Adjustment | LineKind::Compensation { .. } => {
                    excluded_offsets += line.total_amount;
                }
                LineKind::Expense { .. } => {}
            }
        }
    }

    let adjustments_total = round2(sheet.deductible_amount + sheet.already_paid_amount + excluded_offsets);
    let amount_before_info_only = round2(included - adjustments_total);
    let amount_to_request = if sheet.info_only {
        Decimal::ZERO
    } else {
        amount_before_info_only.max(Decimal::ZERO)
    };

    SheetTotals {
        gross_expenses_total: round2(gross),
        included_expenses_total: round2(included),
        vat_total: round2(vat),
        adjustments_total,
        amount_before_info_only,
        amount_to_request,
        info_only_applied: sheet.info_only,
    }
}
