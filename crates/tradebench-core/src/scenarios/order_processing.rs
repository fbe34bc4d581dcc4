use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;

use super::{random_side, random_symbol};
use crate::engine::{run_load, LoadProfile, UserTurn, UserWorkload};
use crate::error::BenchError;
use crate::scenario::{Scenario, ScenarioContext, WeightedSampler};
use crate::services::{
    AccountService, MarketDataService, OrderAck, Side, TradingService,
};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn not_set_up(scenario: &str) -> BenchError {
    BenchError::Execution(format!("{scenario} executed before a successful setup"))
}

/// Limit price `offset` (a fraction) below the last price for buys and the
/// same fraction above it for sells.
fn limit_price(last_price: f64, side: Side, offset: f64) -> f64 {
    match side {
        Side::Buy => last_price * (1.0 - offset),
        Side::Sell => last_price * (1.0 + offset),
    }
}

/// Cancel every order in `order_ids`. Failures are logged and skipped.
async fn cancel_all(ctx: &ScenarioContext, trading: &dyn TradingService, order_ids: Vec<String>) {
    if order_ids.is_empty() {
        return;
    }
    let mut cancelled = 0usize;
    for order_id in &order_ids {
        match trading.cancel_order(order_id).await {
            Ok(ack) if ack.success => cancelled += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(scenario = ctx.name(), order_id = %order_id, "error cancelling order: {e}")
            }
        }
    }
    tracing::info!(
        scenario = ctx.name(),
        orders = order_ids.len(),
        cancelled,
        "cleanup cancelled open orders"
    );
}

// ---------------------------------------------------------------------------
// OrderProcessingTest
// ---------------------------------------------------------------------------

/// Quote, place and track one order per iteration.
pub struct OrderProcessingTest {
    ctx: ScenarioContext,
    trading: Option<Arc<dyn TradingService>>,
    market_data: Option<Arc<dyn MarketDataService>>,
    order_ids: Vec<String>,
}

impl OrderProcessingTest {
    pub const NAME: &'static str = "OrderProcessingTest";
    pub const DEFAULT_ITERATIONS: u32 = 100;
    const LIMIT_OFFSET: f64 = 0.01;

    pub fn new(ctx: ScenarioContext) -> Self {
        Self {
            ctx,
            trading: None,
            market_data: None,
            order_ids: Vec::new(),
        }
    }

    /// Orders placed so far and not yet cleaned up.
    pub fn order_ids(&self) -> &[String] {
        &self.order_ids
    }

    async fn place_and_track(
        &mut self,
        trading: &dyn TradingService,
        market_data: &dyn MarketDataService,
        symbol: &str,
        quantity: u32,
        side: Side,
    ) -> Result<(), BenchError> {
        let ctx = &self.ctx;
        let quote = ctx.time("get_quote", market_data.get_quote(symbol)).await?;

        let ack: OrderAck = if ctx.config().options.use_limit_orders {
            let price = limit_price(quote.last_price, side, Self::LIMIT_OFFSET);
            ctx.time(
                "place_limit_order",
                trading.place_limit_order(symbol, quantity, side, price),
            )
            .await?
        } else {
            ctx.time(
                "place_market_order",
                trading.place_market_order(symbol, quantity, side),
            )
            .await?
        };

        self.order_ids.push(ack.order_id.clone());
        let status = self
            .ctx
            .time("get_order_status", trading.get_order_status(&ack.order_id))
            .await?;
        tracing::debug!(
            scenario = self.ctx.name(),
            order_id = %status.order_id,
            state = ?status.state,
            "order tracked"
        );
        Ok(())
    }
}

#[async_trait]
impl Scenario for OrderProcessingTest {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    async fn setup(&mut self) -> Result<(), BenchError> {
        let services = self.ctx.services();
        self.trading = Some(services.require_trading()?);
        self.market_data = Some(services.require_market_data()?);
        Ok(())
    }

    async fn execute(&mut self) -> Result<bool, BenchError> {
        let (Some(trading), Some(market_data)) = (self.trading.clone(), self.market_data.clone())
        else {
            return Err(not_set_up(Self::NAME));
        };
        let iterations = self.ctx.config().iterations_or(Self::DEFAULT_ITERATIONS);
        tracing::info!(
            scenario = self.ctx.name(),
            iterations,
            use_limit_orders = self.ctx.config().options.use_limit_orders,
            "placing orders"
        );

        let mut rng = self.ctx.rng(0);
        for i in 0..iterations {
            let symbol = random_symbol(&mut rng);
            let quantity = rng.gen_range(1..=100);
            let side = random_side(&mut rng);
            if let Err(e) = self
                .place_and_track(trading.as_ref(), market_data.as_ref(), symbol, quantity, side)
                .await
            {
                self.ctx.iteration_failed(u64::from(i), &e);
            }
        }
        Ok(true)
    }

    async fn cleanup(&mut self) -> Result<(), BenchError> {
        let order_ids = std::mem::take(&mut self.order_ids);
        if let Some(trading) = &self.trading {
            cancel_all(&self.ctx, trading.as_ref(), order_ids).await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OrderProcessingLoadTest
// ---------------------------------------------------------------------------

/// Concurrent virtual users, each quoting and placing market orders until
/// its deadline.
pub struct OrderProcessingLoadTest {
    ctx: ScenarioContext,
    flow: Option<Arc<OrderFlow>>,
}

/// What each virtual user does per operation. Shared by all users.
struct OrderFlow {
    ctx: ScenarioContext,
    trading: Arc<dyn TradingService>,
    market_data: Arc<dyn MarketDataService>,
    order_ids: tokio::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl UserWorkload for OrderFlow {
    async fn run(&self, turn: &mut UserTurn) -> Result<(), BenchError> {
        let symbol = random_symbol(&mut turn.rng);
        let quantity = turn.rng.gen_range(1..=100);
        let side = random_side(&mut turn.rng);

        self.ctx
            .time("get_quote", self.market_data.get_quote(symbol))
            .await?;
        let ack = self
            .ctx
            .time(
                "place_market_order",
                self.trading.place_market_order(symbol, quantity, side),
            )
            .await?;
        self.order_ids.lock().await.push(ack.order_id);
        Ok(())
    }
}

impl OrderProcessingLoadTest {
    pub const NAME: &'static str = "OrderProcessingLoadTest";

    pub fn new(ctx: ScenarioContext) -> Self {
        Self { ctx, flow: None }
    }
}

#[async_trait]
impl Scenario for OrderProcessingLoadTest {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    async fn setup(&mut self) -> Result<(), BenchError> {
        let services = self.ctx.services();
        self.flow = Some(Arc::new(OrderFlow {
            ctx: self.ctx.clone(),
            trading: services.require_trading()?,
            market_data: services.require_market_data()?,
            order_ids: tokio::sync::Mutex::new(Vec::new()),
        }));
        Ok(())
    }

    async fn execute(&mut self) -> Result<bool, BenchError> {
        let flow = self.flow.clone().ok_or_else(|| not_set_up(Self::NAME))?;
        let profile = LoadProfile::from_config(self.ctx.config());
        let reports = run_load(&self.ctx, &profile, flow).await;
        if reports.len() < profile.users as usize {
            return Err(BenchError::Execution(format!(
                "{} of {} virtual users did not finish",
                profile.users as usize - reports.len(),
                profile.users
            )));
        }
        Ok(true)
    }

    async fn cleanup(&mut self) -> Result<(), BenchError> {
        if let Some(flow) = &self.flow {
            let order_ids = std::mem::take(&mut *flow.order_ids.lock().await);
            cancel_all(&self.ctx, flow.trading.as_ref(), order_ids).await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OrderMixTest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MixOperation {
    MarketOrder,
    LimitOrder,
    OpenOrders,
    CancelRandomOrder,
    Positions,
    HistoricalData,
}

const OPERATION_MIX: [(MixOperation, f64); 6] = [
    (MixOperation::MarketOrder, 0.3),
    (MixOperation::LimitOrder, 0.3),
    (MixOperation::OpenOrders, 0.1),
    (MixOperation::CancelRandomOrder, 0.1),
    (MixOperation::Positions, 0.1),
    (MixOperation::HistoricalData, 0.1),
];

#[derive(Clone)]
struct MixHandles {
    trading: Arc<dyn TradingService>,
    market_data: Arc<dyn MarketDataService>,
}

/// A weighted mix of order placement, cancellation, position and market data
/// calls.
pub struct OrderMixTest {
    ctx: ScenarioContext,
    handles: Option<MixHandles>,
    order_ids: Vec<String>,
    buying_power: Option<f64>,
}

impl OrderMixTest {
    pub const NAME: &'static str = "OrderMixTest";
    pub const DEFAULT_ITERATIONS: u32 = 100;
    const LIMIT_OFFSET: f64 = 0.03;

    pub fn new(ctx: ScenarioContext) -> Self {
        Self {
            ctx,
            handles: None,
            order_ids: Vec::new(),
            buying_power: None,
        }
    }

    /// Buying power read during setup.
    pub fn buying_power(&self) -> Option<f64> {
        self.buying_power
    }

    async fn perform<R: Rng + Send>(
        &mut self,
        h: &MixHandles,
        op: MixOperation,
        rng: &mut R,
    ) -> Result<(), BenchError> {
        match op {
            MixOperation::MarketOrder => {
                let (symbol, quantity, side) = (random_symbol(rng), rng.gen_range(1..=10), random_side(rng));
                let ack = self
                    .ctx
                    .time(
                        "place_market_order",
                        h.trading.place_market_order(symbol, quantity, side),
                    )
                    .await?;
                self.order_ids.push(ack.order_id);
            }
            MixOperation::LimitOrder => {
                let (symbol, quantity, side) = (random_symbol(rng), rng.gen_range(1..=10), random_side(rng));
                let quote = self
                    .ctx
                    .time("get_quote", h.market_data.get_quote(symbol))
                    .await?;
                let price = limit_price(quote.last_price, side, Self::LIMIT_OFFSET);
                let ack = self
                    .ctx
                    .time(
                        "place_limit_order",
                        h.trading.place_limit_order(symbol, quantity, side, price),
                    )
                    .await?;
                self.order_ids.push(ack.order_id);
            }
            MixOperation::OpenOrders => {
                self.ctx
                    .time("get_open_orders", h.trading.get_open_orders())
                    .await?;
            }
            MixOperation::CancelRandomOrder => {
                let Some(order_id) = self.order_ids.choose(rng).cloned() else {
                    return Ok(());
                };
                let ack = self
                    .ctx
                    .time("cancel_order", h.trading.cancel_order(&order_id))
                    .await?;
                if ack.success {
                    self.order_ids.retain(|id| *id != order_id);
                }
            }
            MixOperation::Positions => {
                self.ctx
                    .time("get_positions", h.trading.get_positions())
                    .await?;
            }
            MixOperation::HistoricalData => {
                let symbol = random_symbol(rng);
                let end = Utc::now();
                let start = end - chrono::Duration::days(1);
                self.ctx
                    .time(
                        "get_historical_data",
                        h.market_data.get_historical_data(symbol, "1h", start, end),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Scenario for OrderMixTest {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    async fn setup(&mut self) -> Result<(), BenchError> {
        let services = self.ctx.services();
        let trading = services.require_trading()?;
        let market_data = services.require_market_data()?;
        let account: Arc<dyn AccountService> = services.require_account()?;

        let info = self
            .ctx
            .time("check_account", account.get_account_info())
            .await
            .map_err(|e| BenchError::Setup(format!("account check failed: {e}")))?;
        tracing::info!(
            scenario = self.ctx.name(),
            account = %info.account_id,
            buying_power = info.buying_power,
            "account checked"
        );
        self.buying_power = Some(info.buying_power);
        self.handles = Some(MixHandles {
            trading,
            market_data,
        });
        Ok(())
    }

    async fn execute(&mut self) -> Result<bool, BenchError> {
        let handles = self.handles.clone().ok_or_else(|| not_set_up(Self::NAME))?;
        let sampler = WeightedSampler::new(OPERATION_MIX)?;
        let iterations = self.ctx.config().iterations_or(Self::DEFAULT_ITERATIONS);
        tracing::info!(scenario = self.ctx.name(), iterations, "running operation mix");

        let mut rng = self.ctx.rng(0);
        for i in 0..iterations {
            let op = *sampler.sample(&mut rng);
            if let Err(e) = self.perform(&handles, op, &mut rng).await {
                self.ctx.iteration_failed(u64::from(i), &e);
            }
        }
        Ok(true)
    }

    async fn cleanup(&mut self) -> Result<(), BenchError> {
        let order_ids = std::mem::take(&mut self.order_ids);
        if let Some(h) = &self.handles {
            cancel_all(&self.ctx, h.trading.as_ref(), order_ids).await;
        }
        Ok(())
    }
}
