use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Returned when there is no previous trade price to compare against
pub const NO_BASELINE_PROFITABILITY: Decimal = dec!(100);

/// Percentage gain of trading at `current_price` relative to the previous
/// opposite-side trade at `previous_price`.
///
/// After a buy the gain comes from the price rising; after a sell it comes
/// from the price falling. A positive result means the round trip is
/// profitable.
pub fn profit_pct(previous_price: Decimal, current_price: Decimal, previous_side_was_buy: bool) -> Decimal {
    if previous_price.is_zero() {
        return NO_BASELINE_PROFITABILITY;
    }

    let hundred = dec!(100);
    if previous_side_was_buy {
        current_price / previous_price * hundred - hundred
    } else {
        // A zero candidate price cannot be compared
        match previous_price.checked_div(current_price) {
            Some(ratio) => ratio * hundred - hundred,
            None => Decimal::ZERO,
        }
    }
}
