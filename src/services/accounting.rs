//! Money-splitting arithmetic shared by payment allocation and installment
//! plans. All splits are exact: the remainder after rounding lands on the
//! last share so the parts always sum to the input.

use rust_decimal::Decimal;

/// Decimal places used when splitting amounts.
const SCALE: u32 = 2;

/// Splits `amount` across `weights` proportionally. Zero-weight entries get
/// zero; the final share absorbs the rounding remainder so the shares sum to
/// `amount` exactly. An empty or all-zero weight list returns zeros.
pub fn allocate_across(amount: Decimal, weights: &[Decimal]) -> Vec<Decimal> {
    if weights.is_empty() {
        return Vec::new();
    }
    let total: Decimal = weights.iter().sum();
    if total.is_zero() {
        return vec![Decimal::ZERO; weights.len()];
    }

    let mut shares = Vec::with_capacity(weights.len());
    let mut allocated = Decimal::ZERO;
    for weight in &weights[..weights.len() - 1] {
        let share = (amount * weight / total).round_dp(SCALE);
        allocated += share;
        shares.push(share);
    }
    shares.push(amount - allocated);
    shares
}

/// Divides `total` into `parts` equal obligations, remainder on the last.
pub fn split_even(total: Decimal, parts: u32) -> Vec<Decimal> {
    if parts == 0 {
        return Vec::new();
    }
    allocate_across(total, &vec![Decimal::ONE; parts as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[test]
    fn proportional_split_sums_exactly() {
        let shares = allocate_across(dec!(10), &[dec!(3), dec!(3), dec!(3)]);
        assert_eq!(shares, vec![dec!(3.33), dec!(3.33), dec!(3.34)]);
        assert_eq!(shares.iter().sum::<Decimal>(), dec!(10));
    }

    #[rstest]
    #[case(dec!(1000000), 2, dec!(500000))]
    #[case(dec!(1000000), 4, dec!(250000))]
    #[case(dec!(500000), 5, dec!(100000))]
    fn even_divisions_have_equal_parts(
        #[case] total: Decimal,
        #[case] parts: u32,
        #[case] each: Decimal,
    ) {
        let split = split_even(total, parts);
        assert_eq!(split.len(), parts as usize);
        assert!(split.iter().all(|p| *p == each));
    }

    #[test]
    fn equal_weights_split_evenly() {
        let shares = allocate_across(dec!(100), &[dec!(50), dec!(50)]);
        assert_eq!(shares, vec![dec!(50), dec!(50)]);
    }

    #[test]
    fn zero_weight_items_get_nothing() {
        let shares = allocate_across(dec!(500000), &[dec!(500000), dec!(0)]);
        assert_eq!(shares, vec![dec!(500000), dec!(0)]);
    }

    #[test]
    fn single_weight_takes_all() {
        let shares = allocate_across(dec!(500000), &[dec!(500000)]);
        assert_eq!(shares, vec![dec!(500000)]);
    }

    #[test]
    fn all_zero_weights_yield_zeros() {
        let shares = allocate_across(dec!(100), &[dec!(0), dec!(0)]);
        assert_eq!(shares, vec![dec!(0), dec!(0)]);
    }

    #[test]
    fn empty_weights_yield_empty() {
        assert!(allocate_across(dec!(100), &[]).is_empty());
    }

    #[test]
    fn uneven_proportions_preserve_total() {
        let amount = dec!(250000);
        let weights = [dec!(500000), dec!(300000), dec!(150000)];
        let shares = allocate_across(amount, &weights);
        assert_eq!(shares.iter().sum::<Decimal>(), amount);
        // Larger weight gets the larger share.
        assert!(shares[0] > shares[1] && shares[1] > shares[2]);
    }

    #[test]
    fn even_split_carries_remainder_on_last() {
        let parts = split_even(dec!(1000000), 3);
        assert_eq!(parts, vec![dec!(333333.33), dec!(333333.33), dec!(333333.34)]);
        assert_eq!(parts.iter().sum::<Decimal>(), dec!(1000000));
    }

    #[test]
    fn zero_parts_yield_empty() {
        assert!(split_even(dec!(100), 0).is_empty());
    }
}
