use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::mean;
use super::scoring::{command_match, text_similarity};
use crate::error::BenchError;
use crate::scenario::data_source::{load_labeled_samples, synthetic_transcript};
use crate::scenario::{LabeledSample, Scenario, ScenarioContext, VoiceDataSource, VoiceSample};
use crate::services::{CommandParser, VoiceService};

fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Voice and parser handles acquired during setup.
#[derive(Clone)]
struct VoiceHandles {
    voice: Arc<dyn VoiceService>,
    parser: Arc<dyn CommandParser>,
}

impl VoiceHandles {
    fn acquire(ctx: &ScenarioContext) -> Result<Self, BenchError> {
        let services = ctx.services();
        Ok(Self {
            voice: services.require_voice()?,
            parser: services.require_command_parser()?,
        })
    }
}

fn not_set_up(scenario: &str) -> BenchError {
    BenchError::Execution(format!("{scenario} executed before a successful setup"))
}

// ---------------------------------------------------------------------------
// VoiceCommandProcessingTest
// ---------------------------------------------------------------------------

/// Latency of the recognize-then-parse pipeline over random samples.
///
/// Sets the gauges `recognition_time_avg`, `processing_time_avg` and
/// `total_time_avg` (ms) and `success_rate` (valid parses per iteration).
pub struct VoiceCommandProcessingTest {
    ctx: ScenarioContext,
    handles: Option<VoiceHandles>,
    source: Option<VoiceDataSource>,
}

impl VoiceCommandProcessingTest {
    pub const NAME: &'static str = "VoiceCommandProcessingTest";
    pub const DEFAULT_ITERATIONS: u32 = 50;

    pub fn new(ctx: ScenarioContext) -> Self {
        Self {
            ctx,
            handles: None,
            source: None,
        }
    }
}

#[async_trait]
impl Scenario for VoiceCommandProcessingTest {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    async fn setup(&mut self) -> Result<(), BenchError> {
        let handles = VoiceHandles::acquire(&self.ctx)?;
        let dir = self.ctx.config().options.voice_samples_dir.clone();
        let source = VoiceDataSource::load(dir.as_deref()).await?;
        if source.is_empty() {
            return Err(BenchError::Setup("no voice samples found".to_string()));
        }
        tracing::info!(
            scenario = self.ctx.name(),
            samples = source.len(),
            synthetic = source.is_synthetic(),
            "voice samples ready"
        );
        self.handles = Some(handles);
        self.source = Some(source);
        Ok(())
    }

    async fn execute(&mut self) -> Result<bool, BenchError> {
        let (Some(h), Some(source)) = (self.handles.clone(), self.source.as_ref()) else {
            return Err(not_set_up(Self::NAME));
        };
        let ctx = &self.ctx;
        let options = &ctx.config().options;
        let iterations = ctx.config().iterations_or(Self::DEFAULT_ITERATIONS);

        h.voice.set_speech_engine(&options.speech_engine).await?;
        tracing::info!(
            scenario = ctx.name(),
            iterations,
            engine = %options.speech_engine,
            "processing voice commands"
        );

        let mut rng = ctx.rng(0);
        let mut recognition_ms = Vec::new();
        let mut processing_ms = Vec::new();
        let mut total_ms = Vec::new();
        let mut valid = 0u32;

        for i in 0..iterations {
            let Some(sample) = source.pick(&mut rng) else {
                tracing::debug!(scenario = ctx.name(), iteration = i, "no sample in chosen category");
                continue;
            };

            let started = Instant::now();
            let recognized = {
                let _timing = ctx.measure("speech_recognition");
                match &sample {
                    VoiceSample::Recording(path) => h.voice.recognize_speech(path).await,
                    VoiceSample::Synthetic { category, .. } => {
                        Ok(synthetic_transcript(category, &mut rng))
                    }
                }
            };
            let text = match recognized {
                Ok(text) => text,
                Err(e) => {
                    ctx.iteration_failed(u64::from(i), &e);
                    continue;
                }
            };
            let recognition = started.elapsed();

            let parsed = match ctx
                .time("command_processing", h.parser.parse_command(&text))
                .await
            {
                Ok(parsed) => parsed,
                Err(e) => {
                    ctx.iteration_failed(u64::from(i), &e);
                    continue;
                }
            };
            let total = started.elapsed();

            recognition_ms.push(as_ms(recognition));
            processing_ms.push(as_ms(total.saturating_sub(recognition)));
            total_ms.push(as_ms(total));
            if parsed.valid {
                valid += 1;
            }
            tracing::debug!(
                scenario = ctx.name(),
                iteration = i,
                text = %text,
                valid = parsed.valid,
                "command processed"
            );
        }

        if !recognition_ms.is_empty() {
            let metrics = ctx.metrics();
            let success_rate = f64::from(valid) / f64::from(iterations);
            metrics.set_gauge("recognition_time_avg", mean(&recognition_ms));
            metrics.set_gauge("processing_time_avg", mean(&processing_ms));
            metrics.set_gauge("total_time_avg", mean(&total_ms));
            metrics.set_gauge("success_rate", success_rate);
            tracing::info!(
                scenario = ctx.name(),
                success_rate,
                recognition_ms = mean(&recognition_ms),
                processing_ms = mean(&processing_ms),
                "voice command processing finished"
            );
        }
        Ok(true)
    }

    async fn cleanup(&mut self) -> Result<(), BenchError> {
        self.source = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VoiceCommandAccuracyTest
// ---------------------------------------------------------------------------

/// Recognition and parsing accuracy of each configured speech engine over a
/// labeled sample set.
///
/// Per engine `e`, times `e_recognition` and `e_command_processing` and sets
/// the gauges `e_text_accuracy`, `e_command_accuracy` and
/// `e_recognition_time` (ms).
pub struct VoiceCommandAccuracyTest {
    ctx: ScenarioContext,
    handles: Option<VoiceHandles>,
    samples: Vec<LabeledSample>,
}

/// Averages for one engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineAccuracy {
    pub text_accuracy: f64,
    pub command_accuracy: f64,
    pub recognition_time_ms: f64,
}

impl VoiceCommandAccuracyTest {
    pub const NAME: &'static str = "VoiceCommandAccuracyTest";

    pub fn new(ctx: ScenarioContext) -> Self {
        Self {
            ctx,
            handles: None,
            samples: Vec::new(),
        }
    }

    async fn evaluate_engine(&self, h: &VoiceHandles, engine: &str) -> EngineAccuracy {
        let ctx = &self.ctx;
        let recognition_op = format!("{engine}_recognition");
        let processing_op = format!("{engine}_command_processing");

        let mut text_scores = Vec::with_capacity(self.samples.len());
        let mut command_scores = Vec::with_capacity(self.samples.len());
        let mut recognition_ms = Vec::with_capacity(self.samples.len());

        for (i, sample) in self.samples.iter().enumerate() {
            let started = Instant::now();
            let recognized = {
                let _timing = ctx.measure(recognition_op.as_str());
                match &sample.recording {
                    Some(path) => h.voice.recognize_speech(path).await,
                    None => Ok(sample.expected_text.clone()),
                }
            };
            let text = match recognized {
                Ok(text) => text,
                Err(e) => {
                    ctx.iteration_failed(i as u64, &e);
                    continue;
                }
            };
            recognition_ms.push(as_ms(started.elapsed()));

            let parsed = match ctx
                .time(processing_op.as_str(), h.parser.parse_command(&text))
                .await
            {
                Ok(parsed) => parsed,
                Err(e) => {
                    ctx.iteration_failed(i as u64, &e);
                    continue;
                }
            };

            let text_score = text_similarity(&sample.expected_text, &text);
            let command_score = command_match(&sample.expected_command, &parsed.fields);
            text_scores.push(text_score);
            command_scores.push(command_score);
            tracing::debug!(
                scenario = ctx.name(),
                engine,
                sample = %sample.id,
                expected = %sample.expected_text,
                recognized = %text,
                text_score,
                command_score,
                "sample scored"
            );
        }

        EngineAccuracy {
            text_accuracy: mean(&text_scores),
            command_accuracy: mean(&command_scores),
            recognition_time_ms: mean(&recognition_ms),
        }
    }
}

#[async_trait]
impl Scenario for VoiceCommandAccuracyTest {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    async fn setup(&mut self) -> Result<(), BenchError> {
        let handles = VoiceHandles::acquire(&self.ctx)?;
        let dir = self.ctx.config().options.labeled_samples_dir.clone();
        let mut rng = self.ctx.rng(0);
        let samples = load_labeled_samples(dir.as_deref(), &mut rng).await?;
        if samples.is_empty() {
            return Err(BenchError::Setup("no labeled voice samples found".to_string()));
        }
        tracing::info!(scenario = self.ctx.name(), samples = samples.len(), "labeled samples ready");
        self.handles = Some(handles);
        self.samples = samples;
        Ok(())
    }

    async fn execute(&mut self) -> Result<bool, BenchError> {
        let h = self.handles.clone().ok_or_else(|| not_set_up(Self::NAME))?;
        let engines = self.ctx.config().options.speech_engines.clone();
        let mut evaluated = 0usize;

        for engine in &engines {
            if let Err(e) = h.voice.set_speech_engine(engine).await {
                tracing::error!(scenario = self.ctx.name(), engine = %engine, "cannot select engine: {e}");
                continue;
            }
            tracing::info!(scenario = self.ctx.name(), engine = %engine, "testing speech engine");

            let accuracy = self.evaluate_engine(&h, engine).await;
            let metrics = self.ctx.metrics();
            metrics.set_gauge(&format!("{engine}_text_accuracy"), accuracy.text_accuracy);
            metrics.set_gauge(&format!("{engine}_command_accuracy"), accuracy.command_accuracy);
            metrics.set_gauge(&format!("{engine}_recognition_time"), accuracy.recognition_time_ms);
            tracing::info!(
                scenario = self.ctx.name(),
                engine = %engine,
                text_accuracy = accuracy.text_accuracy,
                command_accuracy = accuracy.command_accuracy,
                recognition_time_ms = accuracy.recognition_time_ms,
                "engine evaluated"
            );
            evaluated += 1;
        }

        if evaluated == 0 {
            return Err(BenchError::Execution(format!(
                "none of the speech engines [{}] could be selected",
                engines.join(", ")
            )));
        }
        Ok(true)
    }

    async fn cleanup(&mut self) -> Result<(), BenchError> {
        self.samples.clear();
        Ok(())
    }
}
