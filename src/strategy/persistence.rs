//! Durable trade state
//!
//! The state lives in a JSON document shared with other settings of the
//! running strategy. Only two keys are owned here:
//!
//! - `previous_trade_price` (number)
//! - `is_previous_side_trade_buy` (boolean)
//!
//! Every other key in the document is carried over untouched on save.
//! Writes go to a temporary file in the same directory which is then renamed
//! over the document, so a crash never leaves a half-written file behind.

use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::common::errors::{Result, StrategyError};
use crate::common::types::TradeSide;
use crate::strategy::traits::StatePersistence;
use crate::strategy::types::TradeState;

pub const PREVIOUS_TRADE_PRICE_KEY: &str = "previous_trade_price";
pub const PREVIOUS_SIDE_BUY_KEY: &str = "is_previous_side_trade_buy";

/// Trade state stored in a JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStatePersistence {
    path: PathBuf,
}

impl JsonFileStatePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Option<Map<String, Value>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Some(Map::new()));
        }

        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(document) => Ok(Some(document)),
            other => Err(StrategyError::Persistence(format!(
                "{} is not a JSON object (found {})",
                self.path.display(),
                json_type_name(&other)
            ))),
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.tmp_path();
        let json = serde_json::to_string_pretty(document)?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()))
    }
}

impl StatePersistence for JsonFileStatePersistence {
    fn load(&self) -> Result<Option<TradeState>> {
        let document = match self.read_document()? {
            Some(document) => document,
            None => {
                info!(path = %self.path.display(), "No trade state document found");
                return Ok(None);
            }
        };

        let price = document.get(PREVIOUS_TRADE_PRICE_KEY);
        let side = document.get(PREVIOUS_SIDE_BUY_KEY);
        let (price, side) = match (price, side) {
            (None, None) => return Ok(None),
            (Some(price), Some(side)) => (price, side),
            _ => {
                return Err(StrategyError::Persistence(format!(
                    "{} must contain both {} and {}",
                    self.path.display(),
                    PREVIOUS_TRADE_PRICE_KEY,
                    PREVIOUS_SIDE_BUY_KEY
                )))
            }
        };

        let last_price = decimal_from_json(price).ok_or_else(|| {
            StrategyError::Persistence(format!(
                "{} is not a valid price: {}",
                PREVIOUS_TRADE_PRICE_KEY, price
            ))
        })?;
        let is_buy = side.as_bool().ok_or_else(|| {
            StrategyError::Persistence(format!(
                "{} is not a boolean: {}",
                PREVIOUS_SIDE_BUY_KEY, side
            ))
        })?;

        let state = TradeState::new(TradeSide::from_is_buy(is_buy), last_price);
        info!(
            path = %self.path.display(),
            side = %state.last_side,
            price = %state.last_price,
            "Loaded trade state"
        );
        Ok(Some(state))
    }

    fn save(&self, state: &TradeState) -> Result<()> {
        let mut document = self.read_document()?.unwrap_or_default();

        // Written from the decimal text so the stored number is exact
        let price = Number::from_str(&state.last_price.normalize().to_string()).map_err(|e| {
            StrategyError::Persistence(format!(
                "price {} cannot be stored as a JSON number: {}",
                state.last_price, e
            ))
        })?;

        document.insert(PREVIOUS_TRADE_PRICE_KEY.to_string(), Value::Number(price));
        document.insert(
            PREVIOUS_SIDE_BUY_KEY.to_string(),
            Value::Bool(state.last_side.is_buy()),
        );

        self.write_document(&document)?;
        debug!(
            path = %self.path.display(),
            side = %state.last_side,
            price = %state.last_price,
            "Saved trade state"
        );
        Ok(())
    }
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Trade state held in memory, for dry runs and tests
#[derive(Debug, Default)]
pub struct InMemoryStatePersistence {
    state: Mutex<Option<TradeState>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl InMemoryStatePersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: TradeState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// Last saved state
    pub fn current(&self) -> Option<TradeState> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail, simulating a read-only disk
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl StatePersistence for InMemoryStatePersistence {
    fn load(&self) -> Result<Option<TradeState>> {
        Ok(self.current())
    }

    fn save(&self, state: &TradeState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StrategyError::Persistence("saves disabled".to_string()));
        }
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(*state);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared handles persist through the inner store
impl<P: StatePersistence + ?Sized> StatePersistence for std::sync::Arc<P> {
    fn load(&self) -> Result<Option<TradeState>> {
        (**self).load()
    }

    fn save(&self, state: &TradeState) -> Result<()> {
        (**self).save(state)
    }
}
