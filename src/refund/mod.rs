use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::booking::models::CancelActor;

/// Which cancellation schedule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundSchedule {
    /// Customer- or system-initiated cancellation: tiered by days to
    /// departure, the booking deposit is forfeited in every tier.
    Standard,
    /// Company-initiated cancellation: the more generous schedule, paid
    /// partly or wholly as a credit note close to departure.
    CompanyInitiated,
}

impl RefundSchedule {
    pub fn for_actor(actor: CancelActor) -> Self {
        match actor {
            CancelActor::Admin => RefundSchedule::CompanyInitiated,
            CancelActor::User | CancelActor::System => RefundSchedule::Standard,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefundInput {
    /// Full trip amount of the booking.
    pub total_amount: Decimal,
    /// What the customer has actually paid so far.
    pub total_paid: Decimal,
    /// Non-refundable deposit (partial initial tranche, or the flat
    /// booking deposit for full payments).
    pub deposit: Decimal,
    /// Whole days between cancellation and the batch start date. Negative
    /// means the departure already passed.
    pub days_until_departure: i64,
}

/// Refund split. Cash goes back through the gateway; credit is a credit
/// note usable against a future booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefundQuote {
    pub cash: Decimal,
    pub credit: Decimal,
}

impl RefundQuote {
    pub const ZERO: RefundQuote = RefundQuote {
        cash: Decimal::ZERO,
        credit: Decimal::ZERO,
    };

    pub fn total(&self) -> Decimal {
        self.cash + self.credit
    }
}

/// Pure tiered refund calculation. Output is clamped to [0, total_paid]
/// componentwise and in sum; no caller ever needs to re-check the bounds.
pub fn calculate(schedule: RefundSchedule, input: RefundInput) -> RefundQuote {
    let paid = input.total_paid.max(Decimal::ZERO);
    if paid.is_zero() {
        return RefundQuote::ZERO;
    }

    let quote = match schedule {
        RefundSchedule::Standard => standard_schedule(input, paid),
        RefundSchedule::CompanyInitiated => company_schedule(input, paid),
    };

    clamp(quote, paid)
}

fn standard_schedule(input: RefundInput, paid: Decimal) -> RefundQuote {
    let days = input.days_until_departure;
    let cash = if days >= 21 {
        paid - input.deposit
    } else if days >= 15 {
        paid - input.total_amount * dec!(0.25)
    } else if days >= 8 {
        paid - input.total_amount * dec!(0.50)
    } else {
        Decimal::ZERO
    };

    RefundQuote {
        cash,
        credit: Decimal::ZERO,
    }
}

fn company_schedule(input: RefundInput, paid: Decimal) -> RefundQuote {
    let days = input.days_until_departure;
    if days >= 30 {
        RefundQuote {
            cash: paid,
            credit: Decimal::ZERO,
        }
    } else if days >= 15 {
        let half = paid * dec!(0.5);
        RefundQuote {
            cash: half,
            credit: paid - half,
        }
    } else {
        RefundQuote {
            cash: Decimal::ZERO,
            credit: paid,
        }
    }
}

fn clamp(quote: RefundQuote, paid: Decimal) -> RefundQuote {
    let cash = quote.cash.clamp(Decimal::ZERO, paid);
    let credit = quote.credit.clamp(Decimal::ZERO, paid - cash);
    RefundQuote { cash, credit }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(paid: i64, days: i64) -> RefundInput {
        RefundInput {
            total_amount: dec!(1000),
            total_paid: Decimal::new(paid, 0),
            deposit: dec!(200),
            days_until_departure: days,
        }
    }

    #[test]
    fn test_standard_tiers() {
        // >= 21 days: everything back except the deposit
        let q = calculate(RefundSchedule::Standard, input(1000, 25));
        assert_eq!(q.cash, dec!(800));
        assert_eq!(q.credit, dec!(0));

        // 15-20 days: paid minus 25% of trip amount
        let q = calculate(RefundSchedule::Standard, input(1000, 18));
        assert_eq!(q.cash, dec!(750));

        // 8-14 days: paid minus 50% of trip amount
        let q = calculate(RefundSchedule::Standard, input(1000, 10));
        assert_eq!(q.cash, dec!(500.00));

        // 0-7 days: nothing
        let q = calculate(RefundSchedule::Standard, input(1000, 3));
        assert_eq!(q, RefundQuote::ZERO);

        // Past departure: nothing
        let q = calculate(RefundSchedule::Standard, input(1000, -2));
        assert_eq!(q, RefundQuote::ZERO);
    }

    #[test]
    fn test_standard_clamps_at_zero_for_small_payments() {
        // Only the 200 initial tranche paid; the 25% penalty (250) exceeds
        // it and the refund floors at zero instead of going negative.
        let q = calculate(RefundSchedule::Standard, input(200, 18));
        assert_eq!(q, RefundQuote::ZERO);

        // Same partial payment three weeks out: deposit forfeit eats it all.
        let q = calculate(RefundSchedule::Standard, input(200, 25));
        assert_eq!(q, RefundQuote::ZERO);
    }

    #[test]
    fn test_company_tiers() {
        // 30+ days: full cash refund
        let q = calculate(RefundSchedule::CompanyInitiated, input(1000, 35));
        assert_eq!(q.cash, dec!(1000));
        assert_eq!(q.credit, dec!(0));

        // 15-29 days: half cash, half credit
        let q = calculate(RefundSchedule::CompanyInitiated, input(1000, 20));
        assert_eq!(q.cash, dec!(500.0));
        assert_eq!(q.credit, dec!(500.0));
        assert_eq!(q.total(), dec!(1000.0));

        // 0-14 days: full credit note
        let q = calculate(RefundSchedule::CompanyInitiated, input(1000, 5));
        assert_eq!(q.cash, dec!(0));
        assert_eq!(q.credit, dec!(1000));
    }

    #[test]
    fn test_never_exceeds_paid() {
        let q = calculate(
            RefundSchedule::Standard,
            RefundInput {
                total_amount: dec!(1000),
                total_paid: dec!(300),
                deposit: dec!(0),
                days_until_departure: 25,
            },
        );
        assert!(q.total() <= dec!(300));

        let q = calculate(RefundSchedule::CompanyInitiated, input(0, 40));
        assert_eq!(q, RefundQuote::ZERO);
    }

    #[test]
    fn test_schedule_selection_by_actor() {
        assert_eq!(
            RefundSchedule::for_actor(CancelActor::Admin),
            RefundSchedule::CompanyInitiated
        );
        assert_eq!(
            RefundSchedule::for_actor(CancelActor::User),
            RefundSchedule::Standard
        );
        assert_eq!(
            RefundSchedule::for_actor(CancelActor::System),
            RefundSchedule::Standard
        );
    }
}
