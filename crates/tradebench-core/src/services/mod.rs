//! Collaborator interfaces consumed by scenarios.
//!
//! Every service is an async trait object so the runner can inject real
//! clients, the in-process [`sim`] backend, or test fakes through the same
//! [`Services`] bundle.

pub mod sim;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, ServiceError};

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last_price: f64,
    pub bid: f64,
    pub ask: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Open,
    Filled,
    Cancelled,
    Rejected,
}

/// Acknowledgement returned when an order is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub state: OrderState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: u32,
    pub filled_quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    pub state: OrderState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub order_id: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub average_price: f64,
}

/// One OHLCV bar of historical data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_id: String,
    pub cash: f64,
    pub buying_power: f64,
    pub equity: f64,
}

/// Structured result of parsing a spoken or typed trading command.
///
/// `fields` always carries a `"type"` entry when the command was understood
/// (e.g. `"buy_order"`, `"quote"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub valid: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl ParsedCommand {
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("type").and_then(serde_json::Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Service traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TradingService: Send + Sync {
    async fn place_market_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: Side,
    ) -> Result<OrderAck, ServiceError>;

    async fn place_limit_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: Side,
        price: f64,
    ) -> Result<OrderAck, ServiceError>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, ServiceError>;

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck, ServiceError>;

    async fn get_open_orders(&self) -> Result<Vec<OrderStatus>, ServiceError>;

    async fn get_positions(&self) -> Result<Vec<Position>, ServiceError>;
}

#[async_trait]
pub trait MarketDataService: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, ServiceError>;

    /// Bars for `symbol` between `start` and `end`; `interval` is a span such
    /// as `"5m"`, `"1h"` or `"1d"`.
    async fn get_historical_data(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ServiceError>;
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn get_account_info(&self) -> Result<AccountInfo, ServiceError>;
}

#[async_trait]
pub trait VoiceService: Send + Sync {
    /// Transcribe the audio sample at `sample`.
    async fn recognize_speech(&self, sample: &Path) -> Result<String, ServiceError>;

    /// Select the recognition engine used by later calls.
    async fn set_speech_engine(&self, engine: &str) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait CommandParser: Send + Sync {
    async fn parse_command(&self, text: &str) -> Result<ParsedCommand, ServiceError>;
}

// ---------------------------------------------------------------------------
// Services: the injected bundle
// ---------------------------------------------------------------------------

/// Collaborator named in "not available" setup errors.
#[derive(Debug, Clone, Copy)]
enum ServiceKind {
    Trading,
    MarketData,
    Account,
    Voice,
    CommandParser,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceKind::Trading => "trading",
            ServiceKind::MarketData => "market_data",
            ServiceKind::Account => "account",
            ServiceKind::Voice => "voice",
            ServiceKind::CommandParser => "command_parser",
        };
        write!(f, "{s}")
    }
}

/// Typed bundle of collaborator handles, resolved once per run and cloned
/// into every scenario context.
#[derive(Clone, Default)]
pub struct Services {
    pub trading: Option<Arc<dyn TradingService>>,
    pub market_data: Option<Arc<dyn MarketDataService>>,
    pub account: Option<Arc<dyn AccountService>>,
    pub voice: Option<Arc<dyn VoiceService>>,
    pub command_parser: Option<Arc<dyn CommandParser>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire every collaborator to the in-process simulated backend.
    pub fn simulated(seed: u64) -> Result<Self, ServiceError> {
        sim::SimBackend::new(seed).services()
    }

    pub fn with_trading(mut self, service: Arc<dyn TradingService>) -> Self {
        self.trading = Some(service);
        self
    }

    pub fn with_market_data(mut self, service: Arc<dyn MarketDataService>) -> Self {
        self.market_data = Some(service);
        self
    }

    pub fn with_account(mut self, service: Arc<dyn AccountService>) -> Self {
        self.account = Some(service);
        self
    }

    pub fn with_voice(mut self, service: Arc<dyn VoiceService>) -> Self {
        self.voice = Some(service);
        self
    }

    pub fn with_command_parser(mut self, service: Arc<dyn CommandParser>) -> Self {
        self.command_parser = Some(service);
        self
    }

    pub fn require_trading(&self) -> Result<Arc<dyn TradingService>, BenchError> {
        self.trading.clone().ok_or_else(|| missing(ServiceKind::Trading))
    }

    pub fn require_market_data(&self) -> Result<Arc<dyn MarketDataService>, BenchError> {
        self.market_data
            .clone()
            .ok_or_else(|| missing(ServiceKind::MarketData))
    }

    pub fn require_account(&self) -> Result<Arc<dyn AccountService>, BenchError> {
        self.account.clone().ok_or_else(|| missing(ServiceKind::Account))
    }

    pub fn require_voice(&self) -> Result<Arc<dyn VoiceService>, BenchError> {
        self.voice.clone().ok_or_else(|| missing(ServiceKind::Voice))
    }

    pub fn require_command_parser(&self) -> Result<Arc<dyn CommandParser>, BenchError> {
        self.command_parser
            .clone()
            .ok_or_else(|| missing(ServiceKind::CommandParser))
    }
}

fn missing(kind: ServiceKind) -> BenchError {
    BenchError::Setup(format!("{kind} service is not available"))
}
