use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tradebench_core::engine::{run_load, LoadProfile, UserTurn, UserWorkload};
use tradebench_core::services::sim::SimBackend;
use tradebench_core::services::{
    CancelAck, OrderAck, OrderStatus, Position, Side, TradingService,
};
use tradebench_core::{
    BenchError, MetricsCollector, RunConfig, Runner, ScenarioContext, ServiceError, Services,
};

fn quiet_services(seed: u64) -> Services {
    SimBackend::new(seed)
        .with_latency(Duration::ZERO..=Duration::ZERO)
        .services()
        .expect("sim services should start")
}

fn config_for(category: &str) -> RunConfig {
    RunConfig {
        category: category.to_string(),
        seed: Some(11),
        ..RunConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Single-pass scenarios through the runner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn order_processing_records_each_step_per_iteration() {
    let mut config = config_for("order_processing");
    config.options.iterations = Some(10);

    let outcome = Runner::new(config, Services::simulated(11).expect("sim"))
        .run()
        .await
        .expect("run should complete");

    let result = &outcome.results["OrderProcessingTest"];
    assert!(result.success, "{:?}", result.error);
    for op in ["get_quote", "place_market_order", "get_order_status"] {
        assert_eq!(result.metrics[op].count, 10, "{op}");
        assert!(result.metrics[op].min_ms >= 0.0);
    }
}

#[tokio::test]
async fn voice_processing_without_sample_dir_sets_gauges() {
    let mut config = config_for("voice_commands");
    config.options.iterations = Some(15);

    let outcome = Runner::new(config, quiet_services(11))
        .run()
        .await
        .expect("run should complete");

    assert!(outcome.success());
    for gauge in [
        "recognition_time_avg",
        "processing_time_avg",
        "total_time_avg",
        "success_rate",
    ] {
        assert!(outcome.metrics.gauge(gauge).is_some(), "missing gauge {gauge}");
    }
}

#[tokio::test]
async fn missing_collaborator_fails_setup_only() {
    let config = config_for("voice_accuracy");
    let outcome = Runner::new(config, Services::new())
        .run()
        .await
        .expect("run should complete");

    let result = &outcome.results["VoiceCommandAccuracyTest"];
    assert!(!result.success);
    assert!(result.metrics.is_empty());
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Setup error")));
}

// ---------------------------------------------------------------------------
// Failing trading collaborator
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RejectingTrading {
    cancels: AtomicUsize,
}

#[async_trait]
impl TradingService for RejectingTrading {
    async fn place_market_order(
        &self,
        symbol: &str,
        _quantity: u32,
        _side: Side,
    ) -> Result<OrderAck, ServiceError> {
        Err(ServiceError::Unavailable(format!("exchange closed for {symbol}")))
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        _quantity: u32,
        _side: Side,
        _price: f64,
    ) -> Result<OrderAck, ServiceError> {
        Err(ServiceError::Unavailable(format!("exchange closed for {symbol}")))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, ServiceError> {
        Err(ServiceError::NotFound(order_id.to_string()))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck, ServiceError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::NotFound(order_id.to_string()))
    }

    async fn get_open_orders(&self) -> Result<Vec<OrderStatus>, ServiceError> {
        Ok(Vec::new())
    }

    async fn get_positions(&self) -> Result<Vec<Position>, ServiceError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn rejected_orders_leave_nothing_to_clean_up() {
    let trading = Arc::new(RejectingTrading::default());
    let services = quiet_services(3).with_trading(trading.clone());
    let mut config = config_for("order_processing");
    config.options.iterations = Some(6);

    let outcome = Runner::new(config, services)
        .run()
        .await
        .expect("run should complete");

    let result = &outcome.results["OrderProcessingTest"];
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.metrics["place_market_order"].count, 6);
    assert!(!result.metrics.contains_key("get_order_status"));
    assert_eq!(outcome.metrics.counter("OrderProcessingTest.iteration_errors"), 6);
    assert_eq!(trading.cancels.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Virtual users
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scalability_records_users_times_operations() {
    let mut config = config_for("scalability");
    config.users = 4;
    config.duration = Duration::from_secs(10);
    config.ramp_up = Duration::ZERO;
    config.options.think_time_min_ms = 0;
    config.options.think_time_max_ms = 0;
    config.options.operations_per_user = Some(5);

    let outcome = Runner::new(config, quiet_services(5))
        .run()
        .await
        .expect("run should complete");

    let result = &outcome.results["OrderProcessingLoadTest"];
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.metrics["place_market_order"].count, 20);
    assert_eq!(outcome.metrics.counter("OrderProcessingLoadTest.virtual_users"), 4);
    assert_eq!(
        outcome.metrics.counter("OrderProcessingLoadTest.operations")
            + outcome.metrics.counter("OrderProcessingLoadTest.errors"),
        20
    );
}

struct StartRecorder {
    starts: Mutex<Vec<Instant>>,
}

#[async_trait]
impl UserWorkload for StartRecorder {
    async fn run(&self, _turn: &mut UserTurn) -> Result<(), BenchError> {
        self.starts.lock().push(Instant::now());
        tokio::time::sleep(Duration::from_millis(15)).await;
        Ok(())
    }
}

#[tokio::test]
async fn no_operation_starts_after_the_deadline() {
    let ctx = ScenarioContext::new(
        "deadline",
        Arc::new(MetricsCollector::new()),
        Arc::new(RunConfig::default()),
        Services::new(),
        1,
    );
    let profile = LoadProfile {
        users: 3,
        duration: Duration::from_millis(120),
        ramp_up: Duration::ZERO,
        think_time: Duration::from_millis(5)..=Duration::from_millis(10),
        max_operations: None,
    };
    let recorder = Arc::new(StartRecorder {
        starts: Mutex::new(Vec::new()),
    });

    let began = Instant::now();
    let reports = run_load(&ctx, &profile, Arc::clone(&recorder)).await;

    assert_eq!(reports.len(), 3);
    let starts = recorder.starts.lock();
    assert!(!starts.is_empty());
    let latest_allowed = began + profile.duration + Duration::from_millis(30);
    for start in starts.iter() {
        assert!(*start <= latest_allowed, "operation started past the deadline");
    }
    let recorded: u64 = reports.iter().map(|r| r.operations).sum();
    assert_eq!(recorded, starts.len() as u64);
}

#[tokio::test]
async fn ramp_up_staggers_user_starts() {
    let ctx = ScenarioContext::new(
        "ramp",
        Arc::new(MetricsCollector::new()),
        Arc::new(RunConfig::default()),
        Services::new(),
        1,
    );
    let profile = LoadProfile {
        users: 3,
        duration: Duration::from_secs(10),
        ramp_up: Duration::from_millis(400),
        think_time: Duration::ZERO..=Duration::ZERO,
        max_operations: Some(1),
    };
    let recorder = Arc::new(StartRecorder {
        starts: Mutex::new(Vec::new()),
    });

    let began = Instant::now();
    let reports = run_load(&ctx, &profile, Arc::clone(&recorder)).await;
    let wall = began.elapsed();

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.operations == 1));
    assert!(wall >= Duration::from_millis(400), "finished after {wall:?}");

    let mut starts = recorder.starts.lock().clone();
    starts.sort();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(180), "users started {gap:?} apart");
    }
    assert!(starts[2] - starts[0] >= Duration::from_millis(380));
}
