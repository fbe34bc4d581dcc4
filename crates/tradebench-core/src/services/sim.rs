//! In-process simulated trading platform.
//!
//! A small paper broker with a random-walk price board, a regex command
//! parser and a file-based "speech recognizer". It lets the harness run end
//! to end without a live platform; nothing here aims at market realism.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use uuid::Uuid;

use super::{
    AccountInfo, AccountService, Bar, CancelAck, CommandParser, MarketDataService, OrderAck,
    OrderState, OrderStatus, ParsedCommand, Position, Quote, Services, Side, TradingService,
    VoiceService,
};
use crate::error::ServiceError;

/// Reference prices the simulated board starts from.
const BASE_PRICES: [(&str, f64); 8] = [
    ("AAPL", 190.0),
    ("MSFT", 410.0),
    ("GOOG", 140.0),
    ("AMZN", 180.0),
    ("TSLA", 250.0),
    ("META", 480.0),
    ("NFLX", 610.0),
    ("DIS", 95.0),
];

/// Spoken company names the command parser maps to tickers.
const COMPANY_SYMBOLS: [(&str, &str); 8] = [
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOG"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("meta", "META"),
    ("netflix", "NFLX"),
    ("disney", "DIS"),
];

const SPEECH_ENGINES: [&str; 3] = ["google", "whisper", "sphinx"];

const MAX_BARS: usize = 10_000;

// ---------------------------------------------------------------------------
// SimBackend: builder for the simulated Services bundle
// ---------------------------------------------------------------------------

pub struct SimBackend {
    seed: u64,
    latency: RangeInclusive<Duration>,
    starting_cash: f64,
}

impl SimBackend {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            latency: Duration::from_millis(1)..=Duration::from_millis(3),
            starting_cash: 1_000_000.0,
        }
    }

    /// Artificial per-call latency range. `ZERO..=ZERO` disables sleeping.
    pub fn with_latency(mut self, latency: RangeInclusive<Duration>) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_starting_cash(mut self, cash: f64) -> Self {
        self.starting_cash = cash;
        self
    }

    pub fn services(&self) -> Result<Services, ServiceError> {
        let market = Arc::new(PriceBoard::new(self.seed));
        let book = Arc::new(Mutex::new(Book::new(self.starting_cash)));
        let latency = |salt: u64| Arc::new(Latency::new(self.latency.clone(), self.seed ^ salt));

        let trading = SimTrading {
            market: Arc::clone(&market),
            book: Arc::clone(&book),
            latency: latency(1),
        };
        let market_data = SimMarketData {
            market: Arc::clone(&market),
            latency: latency(2),
        };
        let account = SimAccount {
            account_id: format!("SIM-{:08}", self.seed % 100_000_000),
            market,
            book,
        };
        let voice = SimVoice::new(latency(3));

        Ok(Services::new()
            .with_trading(Arc::new(trading))
            .with_market_data(Arc::new(market_data))
            .with_account(Arc::new(account))
            .with_voice(Arc::new(voice))
            .with_command_parser(Arc::new(SimCommandParser::new()?)))
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Latency {
    range: RangeInclusive<Duration>,
    rng: Mutex<StdRng>,
}

impl Latency {
    fn new(range: RangeInclusive<Duration>, seed: u64) -> Self {
        Self {
            range,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    async fn pause(&self) {
        let (lo, hi) = (*self.range.start(), *self.range.end());
        let delay = if lo >= hi {
            lo
        } else {
            self.rng.lock().gen_range(lo..=hi)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

struct PriceBoard {
    prices: Mutex<HashMap<String, f64>>,
    rng: Mutex<StdRng>,
}

impl PriceBoard {
    fn new(seed: u64) -> Self {
        let prices = BASE_PRICES
            .iter()
            .map(|(s, p)| (s.to_string(), *p))
            .collect();
        Self {
            prices: Mutex::new(prices),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Advance the symbol's random walk by one tick and return the new price.
    fn tick(&self, symbol: &str) -> Result<f64, ServiceError> {
        let step: f64 = self.rng.lock().gen_range(-0.005..=0.005);
        let mut prices = self.prices.lock();
        let price = prices
            .get_mut(symbol)
            .ok_or_else(|| ServiceError::NotFound(format!("unknown symbol {symbol}")))?;
        *price = round_cents(*price * (1.0 + step));
        Ok(*price)
    }

    fn last(&self, symbol: &str) -> Result<f64, ServiceError> {
        self.prices
            .lock()
            .get(symbol)
            .copied()
            .ok_or_else(|| ServiceError::NotFound(format!("unknown symbol {symbol}")))
    }

    fn quote(&self, symbol: &str) -> Result<Quote, ServiceError> {
        let last = self.tick(symbol)?;
        Ok(Quote {
            symbol: symbol.to_string(),
            last_price: last,
            bid: round_cents(last * 0.9995),
            ask: round_cents(last * 1.0005),
            timestamp: Utc::now(),
        })
    }

    fn noise(&self, amplitude: f64) -> f64 {
        self.rng.lock().gen_range(-amplitude..=amplitude)
    }
}

struct Book {
    orders: HashMap<String, OrderStatus>,
    positions: HashMap<String, Position>,
    cash: f64,
}

impl Book {
    fn new(cash: f64) -> Self {
        Self {
            orders: HashMap::new(),
            positions: HashMap::new(),
            cash,
        }
    }

    fn fill(&mut self, symbol: &str, side: Side, quantity: u32, price: f64) -> Result<(), ServiceError> {
        let notional = price * f64::from(quantity);
        if side == Side::Buy && notional > self.cash {
            return Err(ServiceError::Rejected(format!(
                "insufficient buying power for {quantity} {symbol}"
            )));
        }
        let signed = match side {
            Side::Buy => i64::from(quantity),
            Side::Sell => -i64::from(quantity),
        };
        self.cash -= notional * signed.signum() as f64;

        let pos = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position {
                symbol: symbol.to_string(),
                quantity: 0,
                average_price: 0.0,
            });
        let new_qty = pos.quantity + signed;
        if new_qty != 0 && pos.quantity.signum() == signed.signum() {
            let held = pos.quantity.abs() as f64;
            pos.average_price = (pos.average_price * held + notional) / (held + f64::from(quantity));
        } else if new_qty.signum() != pos.quantity.signum() {
            pos.average_price = price;
        }
        pos.quantity = new_qty;
        if pos.quantity == 0 {
            self.positions.remove(symbol);
        }
        Ok(())
    }

    fn insert(&mut self, status: OrderStatus) -> OrderAck {
        let ack = OrderAck {
            order_id: status.order_id.clone(),
            state: status.state,
        };
        self.orders.insert(status.order_id.clone(), status);
        ack
    }
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn validate_order(symbol: &str, quantity: u32) -> Result<(), ServiceError> {
    if quantity == 0 {
        return Err(ServiceError::Rejected("quantity must be positive".to_string()));
    }
    if symbol.is_empty() {
        return Err(ServiceError::Rejected("symbol must not be empty".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

pub struct SimTrading {
    market: Arc<PriceBoard>,
    book: Arc<Mutex<Book>>,
    latency: Arc<Latency>,
}

#[async_trait]
impl TradingService for SimTrading {
    async fn place_market_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: Side,
    ) -> Result<OrderAck, ServiceError> {
        self.latency.pause().await;
        validate_order(symbol, quantity)?;
        let quote = self.market.quote(symbol)?;
        let price = match side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        };
        let mut book = self.book.lock();
        book.fill(symbol, side, quantity, price)?;
        Ok(book.insert(OrderStatus {
            order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
            filled_quantity: quantity,
            limit_price: None,
            state: OrderState::Filled,
        }))
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: Side,
        price: f64,
    ) -> Result<OrderAck, ServiceError> {
        self.latency.pause().await;
        validate_order(symbol, quantity)?;
        if !(price.is_finite() && price > 0.0) {
            return Err(ServiceError::Rejected(format!("invalid limit price {price}")));
        }
        let price = round_cents(price);
        let last = self.market.last(symbol)?;
        let marketable = match side {
            Side::Buy => price >= last,
            Side::Sell => price <= last,
        };

        let mut book = self.book.lock();
        let state = if marketable {
            book.fill(symbol, side, quantity, price)?;
            OrderState::Filled
        } else {
            OrderState::Open
        };
        Ok(book.insert(OrderStatus {
            order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
            filled_quantity: if marketable { quantity } else { 0 },
            limit_price: Some(price),
            state,
        }))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, ServiceError> {
        self.latency.pause().await;
        self.book
            .lock()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck, ServiceError> {
        self.latency.pause().await;
        let mut book = self.book.lock();
        let order = book
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;
        let success = order.state == OrderState::Open;
        if success {
            order.state = OrderState::Cancelled;
        }
        Ok(CancelAck {
            order_id: order_id.to_string(),
            success,
        })
    }

    async fn get_open_orders(&self) -> Result<Vec<OrderStatus>, ServiceError> {
        self.latency.pause().await;
        let mut open: Vec<OrderStatus> = self
            .book
            .lock()
            .orders
            .values()
            .filter(|o| o.state == OrderState::Open)
            .cloned()
            .collect();
        open.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        Ok(open)
    }

    async fn get_positions(&self) -> Result<Vec<Position>, ServiceError> {
        self.latency.pause().await;
        let mut positions: Vec<Position> = self.book.lock().positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

pub struct SimMarketData {
    market: Arc<PriceBoard>,
    latency: Arc<Latency>,
}

/// Parse spans like `5m`, `1h`, `1d` into a bar width.
fn parse_interval(interval: &str) -> Result<chrono::Duration, ServiceError> {
    let invalid = || ServiceError::Rejected(format!("invalid interval '{interval}'"));
    let s = interval.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (num, unit) = s.split_at(split);
    let n: i64 = num.parse().map_err(|_| invalid())?;
    if n <= 0 {
        return Err(invalid());
    }
    match unit {
        "m" | "min" => Ok(chrono::Duration::minutes(n)),
        "h" => Ok(chrono::Duration::hours(n)),
        "d" => Ok(chrono::Duration::days(n)),
        _ => Err(invalid()),
    }
}

#[async_trait]
impl MarketDataService for SimMarketData {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, ServiceError> {
        self.latency.pause().await;
        self.market.quote(symbol)
    }

    async fn get_historical_data(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ServiceError> {
        self.latency.pause().await;
        let step = parse_interval(interval)?;
        if end <= start {
            return Err(ServiceError::Rejected("end must be after start".to_string()));
        }
        let mut close = self.market.last(symbol)?;
        let mut bars = Vec::new();
        let mut ts = start;
        while ts < end && bars.len() < MAX_BARS {
            let open = close;
            close = round_cents(open * (1.0 + self.market.noise(0.01)));
            let spread = open.max(close) * self.market.noise(0.005).abs();
            bars.push(Bar {
                timestamp: ts,
                open,
                high: round_cents(open.max(close) + spread),
                low: round_cents(open.min(close) - spread),
                close,
                volume: 10_000 + (self.market.noise(1.0).abs() * 90_000.0) as u64,
            });
            ts += step;
        }
        Ok(bars)
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

pub struct SimAccount {
    account_id: String,
    market: Arc<PriceBoard>,
    book: Arc<Mutex<Book>>,
}

#[async_trait]
impl AccountService for SimAccount {
    async fn get_account_info(&self) -> Result<AccountInfo, ServiceError> {
        let book = self.book.lock();
        let holdings: f64 = book
            .positions
            .values()
            .map(|p| {
                let mark = self.market.last(&p.symbol).unwrap_or(p.average_price);
                mark * p.quantity as f64
            })
            .sum();
        Ok(AccountInfo {
            account_id: self.account_id.clone(),
            cash: round_cents(book.cash),
            buying_power: round_cents(book.cash.max(0.0)),
            equity: round_cents(book.cash + holdings),
        })
    }
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// "Recognizes" a sample by reading its sibling `.txt` transcript, falling
/// back to the file stem with separators turned into spaces.
pub struct SimVoice {
    engine: Mutex<String>,
    latency: Arc<Latency>,
}

impl SimVoice {
    fn new(latency: Arc<Latency>) -> Self {
        Self {
            engine: Mutex::new("whisper".to_string()),
            latency,
        }
    }

    /// Engine selected by the last successful `set_speech_engine`.
    pub fn engine(&self) -> String {
        self.engine.lock().clone()
    }
}

#[async_trait]
impl VoiceService for SimVoice {
    async fn recognize_speech(&self, sample: &Path) -> Result<String, ServiceError> {
        let engine = self.engine();
        tracing::debug!(engine = %engine, sample = %sample.display(), "recognizing sample");
        self.latency.pause().await;
        if tokio::fs::metadata(sample).await.is_err() {
            return Err(ServiceError::NotFound(format!(
                "voice sample {}",
                sample.display()
            )));
        }
        if let Ok(text) = tokio::fs::read_to_string(sample.with_extension("txt")).await {
            return Ok(text.trim().to_string());
        }
        let stem = sample
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        Ok(stem.replace(['_', '-'], " "))
    }

    async fn set_speech_engine(&self, engine: &str) -> Result<(), ServiceError> {
        let engine = engine.to_ascii_lowercase();
        if !SPEECH_ENGINES.contains(&engine.as_str()) {
            return Err(ServiceError::Rejected(format!(
                "unsupported speech engine '{engine}'"
            )));
        }
        *self.engine.lock() = engine;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command parser
// ---------------------------------------------------------------------------

pub struct SimCommandParser {
    order: Regex,
    quote: Regex,
    strategy: Regex,
}

impl SimCommandParser {
    pub fn new() -> Result<Self, ServiceError> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ServiceError::Unavailable(format!("command grammar: {e}")))
        };
        Ok(Self {
            order: compile(
                r"(?i)^\s*(buy|sell)\s+(\d+)\s+shares?\s+of\s+([a-z.]+)(?:\s+at\s+\$?(\d+(?:\.\d+)?)(?:\s+dollars)?)?\s*$",
            )?,
            quote: compile(
                r"(?i)(?:what\s+is|get|show)\s+(?:the\s+)?(?:price|quote)\s+(?:of|for)\s+([a-z.]+)",
            )?,
            strategy: compile(
                r"(?i)start\s+(ladder|oscillating)\s+strategy\s+for\s+([a-z.]+)(?:\s+with\s+(\d+)\s+steps)?",
            )?,
        })
    }

    fn parse(&self, text: &str) -> ParsedCommand {
        use serde_json::json;

        let mut cmd = ParsedCommand::default();
        let fields = &mut cmd.fields;

        if let Some(c) = self.order.captures(text) {
            let side = c[1].to_ascii_lowercase();
            let quantity: u64 = c[2].parse().unwrap_or(0);
            fields.insert("type".into(), json!(format!("{side}_order")));
            fields.insert("symbol".into(), json!(resolve_symbol(&c[3])));
            fields.insert("quantity".into(), json!(quantity));
            match c.get(4).and_then(|m| m.as_str().parse::<f64>().ok()) {
                Some(price) => {
                    fields.insert("order_type".into(), json!("limit"));
                    fields.insert("price".into(), json!(price));
                }
                None => {
                    fields.insert("order_type".into(), json!("market"));
                }
            }
            cmd.valid = quantity > 0;
            return cmd;
        }

        if let Some(c) = self.quote.captures(text) {
            fields.insert("type".into(), json!("quote"));
            fields.insert("symbol".into(), json!(resolve_symbol(&c[1])));
            cmd.valid = true;
            return cmd;
        }

        if let Some(c) = self.strategy.captures(text) {
            fields.insert("type".into(), json!("strategy"));
            fields.insert("strategy".into(), json!(c[1].to_ascii_lowercase()));
            fields.insert("symbol".into(), json!(resolve_symbol(&c[2])));
            if let Some(steps) = c.get(3).and_then(|m| m.as_str().parse::<u64>().ok()) {
                fields.insert("steps".into(), json!(steps));
            }
            cmd.valid = true;
            return cmd;
        }

        let lower = text.to_ascii_lowercase();
        let account_kind = if lower.contains("account balance") {
            Some("account_balance")
        } else if lower.contains("buying power") {
            Some("buying_power")
        } else if lower.contains("open orders") {
            Some("open_orders")
        } else if lower.contains("positions") {
            Some("positions")
        } else {
            None
        };
        if let Some(kind) = account_kind {
            fields.insert("type".into(), json!(kind));
            cmd.valid = true;
        }
        cmd
    }
}

fn resolve_symbol(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    COMPANY_SYMBOLS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, symbol)| symbol.to_string())
        .unwrap_or_else(|| word.to_ascii_uppercase())
}

#[async_trait]
impl CommandParser for SimCommandParser {
    async fn parse_command(&self, text: &str) -> Result<ParsedCommand, ServiceError> {
        Ok(self.parse(text))
    }
}
