use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::common::errors::Result;
use crate::common::traits::SharedMarket;
use crate::common::types::TradingPair;
use crate::strategy::types::{Proposal, TradeState};

/// Turns one market snapshot into a single directional trade candidate
///
/// The side is always the opposite of the last recorded trade.
pub struct ProposalBuilder {
    market: SharedMarket,
    pair: TradingPair,
    order_amount: Decimal,
}

impl ProposalBuilder {
    pub fn new(market: SharedMarket, pair: TradingPair, order_amount: Decimal) -> Self {
        Self {
            market,
            pair,
            order_amount,
        }
    }

    /// Build a proposal for the side following `trade_state`
    ///
    /// Returns `Ok(None)` when the market cannot price the order; such a
    /// proposal is discarded rather than executed with partial data.
    #[instrument(skip(self), fields(pair = %self.pair))]
    pub async fn build(&self, trade_state: &TradeState) -> Result<Option<Proposal>> {
        let side = trade_state.next_side();

        let quote_price = self
            .market
            .get_quote_price(&self.pair, side, self.order_amount)
            .await?;
        let order_price = self
            .market
            .get_order_price(&self.pair, side, self.order_amount)
            .await?;

        match (quote_price, order_price) {
            (Some(quote_price), Some(order_price))
                if quote_price > Decimal::ZERO && order_price > Decimal::ZERO =>
            {
                let proposal = Proposal {
                    side,
                    quote_price,
                    order_price,
                    amount: self.order_amount,
                };
                debug!(%proposal, "Built proposal");
                Ok(Some(proposal))
            }
            (quote_price, order_price) => {
                warn!(
                    %side,
                    ?quote_price,
                    ?order_price,
                    "Market could not price the order, discarding proposal"
                );
                Ok(None)
            }
        }
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    pub fn order_amount(&self) -> Decimal {
        self.order_amount
    }
}

/// Quantizes proposal price and amount to the market's tick and lot sizes
pub struct PriceAdjuster {
    market: SharedMarket,
    pair: TradingPair,
}

impl PriceAdjuster {
    pub fn new(market: SharedMarket, pair: TradingPair) -> Self {
        Self { market, pair }
    }

    pub fn adjust(&self, proposal: &mut Proposal) {
        proposal.amount = self.market.quantize_order_amount(&self.pair, proposal.amount);
        proposal.order_price = self
            .market
            .quantize_order_price(&self.pair, proposal.order_price);
    }
}
