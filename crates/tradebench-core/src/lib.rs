pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod results;
pub mod scenario;
pub mod scenarios;
pub mod services;

pub use config::RunConfig;
pub use engine::{RunOutcome, Runner};
pub use error::{BenchError, ServiceError};
pub use metrics::MetricsCollector;
pub use registry::Registry;
pub use results::Reporter;
pub use scenario::{Scenario, ScenarioContext};
pub use services::Services;
