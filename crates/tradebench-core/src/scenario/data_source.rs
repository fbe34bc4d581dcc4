//! Voice samples for the voice-command scenarios.
//!
//! Samples come from a directory of `.wav` recordings when one is available
//! and are synthesized otherwise. The choice is made once, at setup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::BenchError;

/// Sub-directories of a voice sample directory, with the number of
/// synthetic samples generated for each when no recordings exist.
pub const VOICE_CATEGORIES: [(&str, usize); 5] = [
    ("buy_orders", 10),
    ("sell_orders", 10),
    ("quotes", 10),
    ("account", 5),
    ("strategy", 5),
];

const SAMPLES_README: &str = "# Voice Sample Files\n\n\
Place voice sample WAV files in this directory for testing.\n\
Organize samples in subdirectories by command type:\n\
- buy_orders/\n\
- sell_orders/\n\
- quotes/\n\
- account/\n\
- strategy/\n";

const LABELED_README: &str = "# Labeled Voice Sample Files\n\n\
Place voice sample WAV files in this directory with corresponding JSON files.\n\
Example: sample1.wav and sample1.json\n\n\
JSON format:\n\
```json\n\
{\n  \"expected_text\": \"Buy 100 shares of Apple\",\n  \"expected_command\": {\n    \"type\": \"buy_order\",\n    \"symbol\": \"AAPL\",\n    \"quantity\": 100\n  }\n}\n\
```\n";

// ---------------------------------------------------------------------------
// VoiceDataSource
// ---------------------------------------------------------------------------

/// One sample picked for an iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceSample {
    /// A recording to run through the speech recognizer.
    Recording(PathBuf),
    /// A stand-in whose transcript is generated instead of recognized.
    Synthetic { category: &'static str, index: usize },
}

/// Where voice samples come from, decided once at setup.
///
/// Both voice scenarios fall back to synthetic data the same way: when no
/// directory is configured, when it does not exist, or when it holds nothing
/// usable (no `.wav` here, no `.wav` + `.json` pair for
/// [`load_labeled_samples`]).
#[derive(Debug, Clone)]
pub enum VoiceDataSource {
    /// Recordings per category subdirectory.
    FileBacked {
        samples: BTreeMap<String, Vec<PathBuf>>,
    },
    Synthetic,
}

impl VoiceDataSource {
    /// Scan `dir` for recordings.
    ///
    /// Falls back to [`VoiceDataSource::Synthetic`] when no directory is
    /// configured, when it holds no `.wav` file, or when it does not exist.
    /// A missing directory is created with a README describing the layout.
    pub async fn load(dir: Option<&Path>) -> Result<Self, BenchError> {
        let Some(root) = dir else {
            return Ok(Self::Synthetic);
        };
        if !tokio::fs::try_exists(root).await.unwrap_or(false) {
            tracing::warn!(dir = %root.display(), "voice sample directory not found, using synthetic samples");
            write_readme(root, SAMPLES_README).await;
            return Ok(Self::Synthetic);
        }

        let mut samples = BTreeMap::new();
        for (category, _) in VOICE_CATEGORIES {
            let sub = root.join(category);
            if !tokio::fs::try_exists(&sub).await.unwrap_or(false) {
                continue;
            }
            samples.insert(category.to_string(), list_with_extension(&sub, "wav").await?);
        }

        if samples.values().all(Vec::is_empty) {
            tracing::warn!(dir = %root.display(), "no .wav samples found, using synthetic samples");
            return Ok(Self::Synthetic);
        }
        Ok(Self::FileBacked { samples })
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Synthetic)
    }

    /// Total number of samples available.
    pub fn len(&self) -> usize {
        match self {
            Self::FileBacked { samples } => samples.values().map(Vec::len).sum(),
            Self::Synthetic => VOICE_CATEGORIES.iter().map(|(_, n)| n).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick a category uniformly, then a sample within it. `None` when the
    /// chosen category has no recordings.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<VoiceSample> {
        match self {
            Self::FileBacked { samples } => {
                let categories: Vec<&Vec<PathBuf>> = samples.values().collect();
                let files = categories.choose(rng)?;
                files.choose(rng).cloned().map(VoiceSample::Recording)
            }
            Self::Synthetic => {
                let &(category, count) = VOICE_CATEGORIES.choose(rng)?;
                Some(VoiceSample::Synthetic {
                    category,
                    index: rng.gen_range(0..count),
                })
            }
        }
    }
}

/// Transcript standing in for speech recognition of a synthetic sample.
pub fn synthetic_transcript<R: Rng + ?Sized>(category: &str, rng: &mut R) -> String {
    let pick = |rng: &mut R, names: &[&'static str]| *names.choose(rng).unwrap_or(&"Apple");
    match category {
        "buy_orders" => format!(
            "Buy {} shares of {}",
            rng.gen_range(10..=100),
            pick(rng, &["Apple", "Microsoft", "Google"])
        ),
        "sell_orders" => format!(
            "Sell {} shares of {}",
            rng.gen_range(10..=100),
            pick(rng, &["Tesla", "Amazon", "Netflix"])
        ),
        "quotes" => format!(
            "Get quote for {}",
            pick(rng, &["Apple", "Microsoft", "Google", "Amazon"])
        ),
        "account" => "What is my account balance".to_string(),
        "strategy" => format!(
            "Start ladder strategy for {} with {} steps",
            pick(rng, &["Apple", "Microsoft"]),
            rng.gen_range(3..=5)
        ),
        _ => "Unknown command".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Labeled samples
// ---------------------------------------------------------------------------

/// A sample with its known transcript and command. `recording` is `None`
/// for synthetic samples, whose "recognized" text is the expected text.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub id: String,
    pub recording: Option<PathBuf>,
    pub expected_text: String,
    pub expected_command: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Label {
    expected_text: String,
    expected_command: BTreeMap<String, Value>,
}

/// Load `x.wav` + `x.json` pairs from `dir`, or synthesize a labeled set when
/// no directory is configured, it does not exist (creating it with a
/// README), or it holds no readable pair. Unreadable label files are skipped
/// with a warning.
pub async fn load_labeled_samples<R: Rng + ?Sized>(
    dir: Option<&Path>,
    rng: &mut R,
) -> Result<Vec<LabeledSample>, BenchError> {
    let Some(root) = dir else {
        return Ok(synthetic_labeled_samples(rng));
    };
    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        tracing::warn!(dir = %root.display(), "labeled sample directory not found, using synthetic samples");
        write_readme(root, LABELED_README).await;
        return Ok(synthetic_labeled_samples(rng));
    }

    let mut samples = Vec::new();
    for wav in list_with_extension(root, "wav").await? {
        let label_path = wav.with_extension("json");
        let raw = match tokio::fs::read_to_string(&label_path).await {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        match serde_json::from_str::<Label>(&raw) {
            Ok(label) => samples.push(LabeledSample {
                id: wav
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                recording: Some(wav),
                expected_text: label.expected_text,
                expected_command: label.expected_command,
            }),
            Err(e) => {
                tracing::warn!(file = %label_path.display(), "skipping unreadable label: {e}");
            }
        }
    }
    if samples.is_empty() {
        tracing::warn!(dir = %root.display(), "no labeled samples found, using synthetic samples");
        return Ok(synthetic_labeled_samples(rng));
    }
    Ok(samples)
}

fn command(fields: Value) -> BTreeMap<String, Value> {
    match fields {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}

/// 5 market buys, 5 limit sells, 5 quotes and 4 account queries.
pub fn synthetic_labeled_samples<R: Rng + ?Sized>(rng: &mut R) -> Vec<LabeledSample> {
    let mut samples = Vec::with_capacity(19);
    let mut push = |id: String, text: String, cmd: Value| {
        samples.push(LabeledSample {
            id,
            recording: None,
            expected_text: text,
            expected_command: command(cmd),
        })
    };

    for i in 0..5 {
        let symbol = *["AAPL", "MSFT", "GOOG", "AMZN"].choose(rng).unwrap_or(&"AAPL");
        let quantity: u32 = rng.gen_range(10..=100);
        push(
            format!("synthetic_buy_{i}"),
            format!("Buy {quantity} shares of {symbol}"),
            json!({"type": "buy_order", "symbol": symbol, "quantity": quantity, "order_type": "market"}),
        );
    }
    for i in 0..5 {
        let symbol = *["TSLA", "META", "NFLX", "DIS"].choose(rng).unwrap_or(&"TSLA");
        let quantity: u32 = rng.gen_range(10..=100);
        let price: u32 = rng.gen_range(100..=500);
        push(
            format!("synthetic_sell_{i}"),
            format!("Sell {quantity} shares of {symbol} at {price} dollars"),
            json!({"type": "sell_order", "symbol": symbol, "quantity": quantity, "order_type": "limit", "price": price}),
        );
    }
    for i in 0..5 {
        let symbol = *["AAPL", "MSFT", "GOOG", "AMZN", "TSLA"].choose(rng).unwrap_or(&"AAPL");
        push(
            format!("synthetic_quote_{i}"),
            format!("Get quote for {symbol}"),
            json!({"type": "quote", "symbol": symbol}),
        );
    }
    let account = [
        ("What is my account balance", "account_balance"),
        ("Show my positions", "positions"),
        ("Show my open orders", "open_orders"),
        ("How much buying power do I have", "buying_power"),
    ];
    for (i, (text, kind)) in account.into_iter().enumerate() {
        push(
            format!("synthetic_account_{i}"),
            text.to_string(),
            json!({"type": kind}),
        );
    }
    samples
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn list_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, BenchError> {
    let read_err = |e: std::io::Error| BenchError::Setup(format!("cannot read {}: {e}", dir.display()));
    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Create `dir` and drop a README into it. Best effort.
async fn write_readme(dir: &Path, contents: &str) {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::warn!(dir = %dir.display(), "could not create sample directory: {e}");
        return;
    }
    let readme = dir.join("README.md");
    if tokio::fs::try_exists(&readme).await.unwrap_or(false) {
        return;
    }
    if let Err(e) = tokio::fs::write(&readme, contents).await {
        tracing::warn!(file = %readme.display(), "could not write README: {e}");
    }
}
