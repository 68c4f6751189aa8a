use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::common::errors::{Result, StrategyError};
use crate::common::shutdown::ShutdownListener;
use crate::common::traits::SharedMarket;
use crate::common::types::{TradeSide, TradingPair};
use crate::config::ReferenceRateConfig;
use crate::strategy::traits::RateSource;

/// Rate source backed by a market quote for `ASSET-REFERENCE`
pub struct MarketRateSource {
    market: SharedMarket,
}

impl MarketRateSource {
    pub fn new(market: SharedMarket) -> Self {
        Self { market }
    }
}

#[async_trait]
impl RateSource for MarketRateSource {
    async fn fetch_rate(&self, asset: &str, reference: &str) -> Result<Decimal> {
        let pair = TradingPair::new(asset, reference);
        match self
            .market
            .get_quote_price(&pair, TradeSide::Buy, Decimal::ONE)
            .await?
        {
            Some(rate) if rate > Decimal::ZERO => Ok(rate),
            _ => Err(StrategyError::Market(format!("no quote for {}", pair))),
        }
    }
}

/// Periodically fetches the quote asset's price in the reference asset
pub struct RatePoller {
    source: Arc<dyn RateSource>,
    asset: String,
    reference: String,
    interval: Duration,
    error_backoff: Duration,
    rate: Arc<RwLock<Option<Decimal>>>,
}

impl RatePoller {
    pub fn new(source: Arc<dyn RateSource>, asset: impl Into<String>, config: &ReferenceRateConfig) -> Self {
        Self {
            source,
            asset: asset.into(),
            reference: config.asset.clone(),
            interval: Duration::from_secs(config.interval_secs),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
            rate: Arc::new(RwLock::new(None)),
        }
    }

    /// Polling only makes sense when the quote asset is not the reference itself
    pub fn applies(&self) -> bool {
        !self.asset.eq_ignore_ascii_case(&self.reference)
    }

    /// Shared handle to the latest rate
    pub fn rate_handle(&self) -> Arc<RwLock<Option<Decimal>>> {
        self.rate.clone()
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Poll until shutdown
    pub async fn run(self, mut shutdown: ShutdownListener) {
        info!(
            asset = %self.asset,
            reference = %self.reference,
            interval_secs = self.interval.as_secs(),
            "Starting reference rate poller"
        );

        loop {
            let delay = tokio::select! {
                _ = shutdown.recv() => break,
                result = self.source.fetch_rate(&self.asset, &self.reference) => match result {
                    Ok(rate) => {
                        *self.rate.write().await = Some(rate);
                        info!(
                            asset = %self.asset,
                            reference = %self.reference,
                            %rate,
                            "Reference rate updated"
                        );
                        self.interval
                    }
                    Err(e) => {
                        error!(
                            asset = %self.asset,
                            reference = %self.reference,
                            error = %e,
                            "Unexpected error while fetching reference rate"
                        );
                        self.error_backoff
                    }
                },
            };

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Reference rate poller stopped");
    }
}
