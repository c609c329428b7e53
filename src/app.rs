//! Voice control application entry point.
//!
//! Wires the command line to the library:
//! load model → start pipeline → run the command of each recognized word.

use crate::action::{Action, ActionRunner, CommandExecutor};
use crate::audio::capture::CpalAudioSource;
use crate::audio::source::AudioCapture;
use crate::audio::wav::WavAudioSource;
use crate::config::Config;
use crate::error::{Result, VoicectlError};
use crate::features::FilterbankExtractor;
use crate::model::Model;
use crate::pipeline::{Pipeline, PipelineConfig, RecognitionEvent};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Options of the listen command, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ListenOptions {
    pub model: PathBuf,
    pub input: Option<PathBuf>,
    pub device: Option<String>,
    pub once: bool,
    pub json: bool,
    pub dry_run: bool,
}

/// Listen and act on recognized words until stopped.
///
/// # Returns
/// The process exit code: the item index with `--once`, otherwise 0.
pub fn run_listen_command(mut config: Config, options: ListenOptions) -> Result<i32> {
    if let Some(device) = options.device {
        config.audio.device = Some(device);
    }
    config.validate()?;

    let model = Model::load(&options.model, false)?;
    info!(
        items = model.items().len(),
        samples = model.sample_count(),
        "speaker model loaded"
    );

    let source: Box<dyn AudioCapture> = match &options.input {
        Some(path) => Box::new(WavAudioSource::from_path(path)?),
        None => Box::new(CpalAudioSource::new(config.audio.device.as_deref())?),
    };
    let extractor = FilterbankExtractor::new(
        config.features.channel_mean_vector(),
        config.features.mean_subtraction,
    );

    let handle = Pipeline::new(PipelineConfig::from(&config)).start(
        source,
        Box::new(extractor),
        model,
    )?;
    if !options.json {
        eprintln!("{}", "Ready. Listening...".dimmed());
    }

    let runner = ActionRunner::shell().with_dry_run(options.dry_run);

    while let Some(event) = handle.recv() {
        print_event(&event, options.json)?;
        match next_step(&runner, &event, options.once) {
            Step::Listen => {}
            Step::Exit(code) => {
                handle.stop();
                return Ok(code);
            }
            Step::Failed(message) => {
                handle.stop();
                return Err(VoicectlError::AudioCapture { message });
            }
        }
    }

    handle.stop();
    Ok(0)
}

/// What the listen loop does after an event.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Listen,
    Exit(i32),
    Failed(String),
}

/// Act on one event. With `once` the first recognition only sets the exit
/// code; its command is not run.
fn next_step<E: CommandExecutor>(
    runner: &ActionRunner<E>,
    event: &RecognitionEvent,
    once: bool,
) -> Step {
    match event {
        RecognitionEvent::Recognized(recognition) if once => {
            Step::Exit(i32::try_from(recognition.item).unwrap_or(i32::MAX))
        }
        RecognitionEvent::Recognized(recognition) => match runner.handle(recognition) {
            Ok(Action::Stop) => Step::Exit(0),
            Ok(_) => Step::Listen,
            Err(e) => {
                warn!("{e}");
                eprintln!("voicectl: {e}");
                Step::Listen
            }
        },
        RecognitionEvent::NoMatch => Step::Listen,
        RecognitionEvent::Stopped { error: Some(message) } => Step::Failed(message.clone()),
        RecognitionEvent::Stopped { error: None } => Step::Exit(0),
    }
}

fn print_event(event: &RecognitionEvent, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(event).map_err(|e| VoicectlError::Other(e.to_string()))?;
        println!("{line}");
        return Ok(());
    }

    match event {
        RecognitionEvent::Recognized(r) => {
            println!("{} {}", r.label.green(), format!("({:.2})", r.score).dimmed());
        }
        RecognitionEvent::NoMatch => println!("{}", "no match".yellow()),
        RecognitionEvent::Stopped { .. } => {}
    }
    Ok(())
}

/// Print the items of a speaker model.
pub fn inspect_model(path: &Path) -> Result<()> {
    let model = Model::load(path, true)?;

    println!(
        "{} items, {} samples",
        model.items().len(),
        model.sample_count()
    );
    for (index, item) in model.items().iter().enumerate() {
        let command = if item.command.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            item.command.clone()
        };
        println!("[{index}] {}  {} {command}", item.label.bold(), "→".dimmed());
        for sample in &item.samples {
            let wave = match &sample.waveform {
                Some(bytes) => format!(", {} bytes audio", bytes.len()),
                None => String::new(),
            };
            println!("      {} {} frames{wave}", sample.id.dimmed(), sample.len());
        }
    }
    Ok(())
}

/// Print the peak level of each capture chunk for `seconds`, marking
/// chunks loud enough to start or keep a recording.
pub fn run_levels_command(config: &Config, device: Option<String>, seconds: u64) -> Result<()> {
    let device = device.or_else(|| config.audio.device.clone());
    let mut source = CpalAudioSource::new(device.as_deref())?;
    source.open()?;

    let rec_level = config.audio.rec_level;
    let stop_level = config.audio.stop_level;
    eprintln!(
        "{}",
        format!("rec_level {rec_level}, stop_level {stop_level}").dimmed()
    );

    let deadline = Instant::now() + Duration::from_secs(seconds);
    let result = print_levels(&mut source, deadline, rec_level, stop_level);
    source.close()?;
    result
}

fn print_levels(
    source: &mut dyn AudioCapture,
    deadline: Instant,
    rec_level: i16,
    stop_level: i16,
) -> Result<()> {
    while Instant::now() < deadline {
        let peak = source.block_max()?;
        println!("{}", level_line(peak, rec_level, stop_level));
    }
    Ok(())
}

fn level_line(peak: i16, rec_level: i16, stop_level: i16) -> String {
    const WIDTH: usize = 50;
    let filled = (peak.max(0) as usize * WIDTH) / i16::MAX as usize;
    let bar = format!("{:<width$}", "#".repeat(filled), width = WIDTH);
    let label = format!("{peak:>6}");
    if peak > rec_level {
        format!("{label} {}", bar.green())
    } else if peak > stop_level {
        format!("{label} {}", bar.yellow())
    } else {
        format!("{label} {}", bar.dimmed())
    }
}
