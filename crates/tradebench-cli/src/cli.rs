use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tradebench_core::RunConfig;

/// Parse `10`, `10s`, `250ms`, `1m` or `1h`. A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let invalid = || format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)");
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);
    if number_end == 0 {
        return Err(invalid());
    }

    let (number, unit) = s.split_at(number_end);
    let value: u64 = number.parse().map_err(|_| invalid())?;
    let scaled = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };

    match unit.trim() {
        "" | "s" | "sec" | "secs" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "millis" | "milliseconds" => Ok(Duration::from_millis(value)),
        "m" | "min" | "mins" | "minutes" => scaled(60),
        "h" | "hr" | "hours" => scaled(3600),
        _ => Err(invalid()),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "tradebench",
    version,
    about = "Performance and load scenarios for the trading platform",
    after_help = "Examples:\n  tradebench list\n  tradebench run --category order_processing --iterations 50\n  tradebench run --category scalability --users 25 --duration 2m --ramp-up 20s\n  tradebench run --config bench.json --compare-with reports/20240101_120000"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scenarios of one category (or all of them) and write a report
    #[command(long_about = "Run the scenarios of one category (or all of them) and write a report.\n\nFlags override values from --config.")]
    Run(RunArgs),

    /// List the registered categories and scenarios
    List,
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Category, scenario name, or `all`
    #[arg(long)]
    pub category: Option<String>,

    /// Concurrent virtual users for load scenarios
    #[arg(long)]
    pub users: Option<u32>,

    /// How long each virtual user keeps working (e.g. 30s, 2m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Period over which virtual users are started (e.g. 10s)
    #[arg(long, value_parser = parse_duration)]
    pub ramp_up: Option<Duration>,

    /// Parent directory of the timestamped run directories
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Previous report.json (or its run directory) to compare against
    #[arg(long, value_name = "PATH")]
    pub compare_with: Option<PathBuf>,

    /// Percent latency increase reported as a regression
    #[arg(long, value_name = "PCT")]
    pub regression_threshold: Option<f64>,

    /// Iterations for single-pass scenarios
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Use limit orders instead of market orders where supported
    #[arg(long)]
    pub use_limit_orders: bool,

    /// Speech engine for voice command processing
    #[arg(long, value_name = "ENGINE")]
    pub speech_engine: Option<String>,

    /// Comma-separated engines compared by the accuracy scenario
    #[arg(long, value_name = "ENGINES", value_delimiter = ',')]
    pub speech_engines: Option<Vec<String>>,

    /// Seed for every random choice, to reproduce a run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log at debug level (ignored when RUST_LOG is set)
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply_to(&self, config: &mut RunConfig) {
        if let Some(category) = &self.category {
            config.category = category.clone();
        }
        if let Some(users) = self.users {
            config.users = users;
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(ramp_up) = self.ramp_up {
            config.ramp_up = ramp_up;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(path) = &self.compare_with {
            config.compare_with = Some(path.clone());
        }
        if let Some(pct) = self.regression_threshold {
            config.regression_threshold_pct = pct;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }

        let options = &mut config.options;
        if let Some(iterations) = self.iterations {
            options.iterations = Some(iterations);
        }
        if self.use_limit_orders {
            options.use_limit_orders = true;
        }
        if let Some(engine) = &self.speech_engine {
            options.speech_engine = engine.clone();
        }
        if let Some(engines) = &self.speech_engines {
            options.speech_engines = engines.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("10"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "tradebench",
            "run",
            "--category",
            "scalability",
            "--users",
            "4",
            "--duration",
            "250ms",
            "--ramp-up",
            "0",
            "--speech-engines",
            "google,sphinx",
            "--use-limit-orders",
            "--seed",
            "9",
        ])
        .expect("args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.category.as_deref(), Some("scalability"));
        assert_eq!(args.users, Some(4));
        assert_eq!(args.duration, Some(Duration::from_millis(250)));
        assert_eq!(args.ramp_up, Some(Duration::ZERO));
        assert_eq!(
            args.speech_engines,
            Some(vec!["google".to_string(), "sphinx".to_string()])
        );
        assert!(args.use_limit_orders);
        assert_eq!(args.seed, Some(9));
    }

    #[test]
    fn bad_duration_is_a_parse_error() {
        let result = Cli::try_parse_from(["tradebench", "run", "--duration", "fast"]);
        assert!(result.is_err());
    }

    #[test]
    fn list_parses() {
        let cli = Cli::try_parse_from(["tradebench", "list"]).expect("args should parse");
        assert!(matches!(cli.command, Command::List));
    }

    #[test]
    fn flags_override_only_what_was_given() {
        let mut config = RunConfig {
            users: 50,
            category: "order_mix".to_string(),
            ..RunConfig::default()
        };
        config.options.iterations = Some(5);

        let args = RunArgs {
            users: Some(2),
            speech_engine: Some("sphinx".to_string()),
            ..RunArgs::default()
        };
        args.apply_to(&mut config);

        assert_eq!(config.users, 2);
        assert_eq!(config.category, "order_mix");
        assert_eq!(config.options.iterations, Some(5));
        assert_eq!(config.options.speech_engine, "sphinx");
        assert!(!config.options.use_limit_orders);
    }
}
