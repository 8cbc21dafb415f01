//! Order total aggregation.
//!
//! Gross is the sum of `quantity × unit price` over the order's line items and
//! net is gross minus the order discount. Every monetary value is truncated
//! toward zero at two decimal places.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use validator::ValidationError;

use crate::config::DiscountPolicy;
use crate::errors::ServiceError;

/// Decimal places kept for every monetary value.
pub const MONEY_SCALE: u32 = 2;

/// Truncates (never rounds) to cents.
pub fn truncate_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero)
}

/// `validator` rule for prices, discounts and other amounts.
pub fn validate_non_negative_money(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must be zero or greater".into());
        return Err(err);
    }
    Ok(())
}

/// `quantity × unit price`, truncated to cents.
pub fn line_total(quantidade: i32, valor_unitario: Decimal) -> Result<Decimal, ServiceError> {
    Decimal::from(quantidade)
        .checked_mul(truncate_money(valor_unitario))
        .map(truncate_money)
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "line total overflows for quantity {} and unit price {}",
                quantidade, valor_unitario
            ))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    /// Gross total
    pub valor_total: Decimal,
    /// Net total
    pub valor_final: Decimal,
}

/// Derives the gross and net totals from `(quantity, unit price)` pairs.
///
/// Order of the items does not matter and the result depends only on the
/// inputs, so running it twice over unchanged items yields identical totals.
pub fn compute_totals<I>(
    items: I,
    desconto: Decimal,
    policy: DiscountPolicy,
) -> Result<OrderTotals, ServiceError>
where
    I: IntoIterator<Item = (i32, Decimal)>,
{
    let mut gross = Decimal::ZERO;
    for (quantidade, valor_unitario) in items {
        let line = line_total(quantidade, valor_unitario)?;
        gross = gross
            .checked_add(line)
            .ok_or_else(|| ServiceError::InvalidInput("order gross total overflows".into()))?;
    }
    let gross = truncate_money(gross);

    let mut net = truncate_money(gross - truncate_money(desconto));
    if policy == DiscountPolicy::ClampAtZero && net.is_sign_negative() {
        net = Decimal::ZERO;
    }

    Ok(OrderTotals {
        valor_total: gross,
        valor_final: net,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(0), true)]
    #[case(dec!(-0.00), true)]
    #[case(dec!(42.90), true)]
    #[case(dec!(-0.01), false)]
    fn money_rule_rejects_only_negative_amounts(#[case] value: Decimal, #[case] ok: bool) {
        let result = validate_non_negative_money(&value);
        assert_eq!(result.is_ok(), ok);
        if let Err(err) = result {
            assert_eq!(err.code, "non_negative");
        }
    }

    #[test]
    fn sums_lines_and_subtracts_discount() {
        let totals = compute_totals(
            vec![(2, dec!(50.00)), (1, dec!(30.00))],
            dec!(10),
            DiscountPolicy::AllowNegative,
        )
        .unwrap();
        assert_eq!(totals.valor_total, dec!(130.00));
        assert_eq!(totals.valor_final, dec!(120.00));
    }

    #[test]
    fn empty_order_has_zero_gross() {
        let totals =
            compute_totals(Vec::new(), dec!(0), DiscountPolicy::AllowNegative).unwrap();
        assert_eq!(totals.valor_total, Decimal::ZERO);
        assert_eq!(totals.valor_final, Decimal::ZERO);
    }

    #[rstest]
    #[case(DiscountPolicy::AllowNegative, dec!(-10.00))]
    #[case(DiscountPolicy::ClampAtZero, dec!(0))]
    fn discount_larger_than_gross(#[case] policy: DiscountPolicy, #[case] expected: Decimal) {
        let totals = compute_totals(vec![(1, dec!(40.00))], dec!(50.00), policy).unwrap();
        assert_eq!(totals.valor_total, dec!(40.00));
        assert_eq!(totals.valor_final, expected);
    }

    #[rstest]
    #[case(3, dec!(0.333), dec!(0.99))]
    #[case(1, dec!(19.999), dec!(19.99))]
    #[case(7, dec!(1.005), dec!(7.00))]
    #[case(2, dec!(0.125), dec!(0.24))]
    fn money_is_truncated_not_rounded(
        #[case] quantidade: i32,
        #[case] valor_unitario: Decimal,
        #[case] expected: Decimal,
    ) {
        assert_eq!(line_total(quantidade, valor_unitario).unwrap(), expected);
    }

    #[test]
    fn truncation_goes_toward_zero_for_negatives() {
        assert_eq!(truncate_money(dec!(-1.239)), dec!(-1.23));
    }

    fn cents() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000).prop_map(|c| Decimal::new(c, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn gross_is_sum_of_line_totals(
            items in prop::collection::vec((1i32..1_000, cents()), 0..20),
            desconto in cents(),
        ) {
            let totals = compute_totals(items.clone(), desconto, DiscountPolicy::AllowNegative).unwrap();
            let expected: Decimal = items
                .iter()
                .map(|(q, p)| Decimal::from(*q) * *p)
                .sum();
            prop_assert_eq!(totals.valor_total, expected);
            prop_assert_eq!(totals.valor_final, expected - desconto);
        }

        #[test]
        fn recalculation_is_idempotent(
            items in prop::collection::vec((1i32..1_000, cents()), 0..20),
            desconto in cents(),
        ) {
            let first = compute_totals(items.clone(), desconto, DiscountPolicy::AllowNegative).unwrap();
            let second = compute_totals(items, desconto, DiscountPolicy::AllowNegative).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn item_order_does_not_matter(
            items in prop::collection::vec((1i32..1_000, cents()), 0..20),
        ) {
            let mut reversed = items.clone();
            reversed.reverse();
            let a = compute_totals(items, Decimal::ZERO, DiscountPolicy::AllowNegative).unwrap();
            let b = compute_totals(reversed, Decimal::ZERO, DiscountPolicy::AllowNegative).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn clamped_net_is_never_negative(
            items in prop::collection::vec((1i32..100, cents()), 0..5),
            desconto in cents(),
        ) {
            let totals = compute_totals(items, desconto, DiscountPolicy::ClampAtZero).unwrap();
            prop_assert!(!totals.valor_final.is_sign_negative());
        }
    }
}
