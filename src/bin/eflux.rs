//! eflux CLI - Command-line interface for Emotion Flux
//!
//! Commands:
//! - score: Score landmark frames into smoothed emotion events
//! - rules: Inspect a FURIA rule file
//! - features: Print the feature vectors of landmark frames
//! - doctor: Diagnose rule file, settings and environment

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use emotion_flux::config::EngineSettings;
use emotion_flux::features::{FeatureExtractor, FeatureVectorSpec};
use emotion_flux::pipeline::EmotionEngine;
use emotion_flux::rules::parse_rule_text;
use emotion_flux::schema::{LandmarkFrame, LandmarkFrameAdapter, SCHEMA_VERSION};
use emotion_flux::types::{FaceId, ScoreEvent};
use emotion_flux::{InferenceError, FLUX_VERSION, PRODUCER_NAME};

/// eflux - Fuzzy-rule emotion inference from facial landmarks
#[derive(Parser)]
#[command(name = "eflux")]
#[command(version = FLUX_VERSION)]
#[command(about = "Score facial landmark frames with FURIA fuzzy rules", long_about = None)]
struct Cli {
    /// Raise log verbosity to debug (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score landmark frames into smoothed emotion events (NDJSON)
    Score {
        /// FURIA rule file
        #[arg(short, long)]
        rules: PathBuf,

        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Engine settings JSON file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Number of inference cycles averaged per face
        #[arg(long)]
        average: Option<usize>,

        /// Correct single-frame spikes before averaging
        #[arg(long)]
        suppress_spikes: bool,

        /// Minimum jump for a value to count as a spike
        #[arg(long)]
        spike_amplitude: Option<f64>,

        /// Do not clamp law-of-cosines results (NaN on degenerate triangles)
        #[arg(long)]
        no_clamp: bool,

        /// Load face histories from file
        #[arg(long)]
        load_history: Option<PathBuf>,

        /// Save face histories to file after processing
        #[arg(long)]
        save_history: Option<PathBuf>,
    },

    /// Inspect a FURIA rule file
    Rules {
        /// FURIA rule file
        #[arg(short, long)]
        rules: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the feature vector of every face (NDJSON)
    Features {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Do not clamp law-of-cosines results
        #[arg(long)]
        no_clamp: bool,
    },

    /// Diagnose rule file, settings and environment
    Doctor {
        /// Check a rule file
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Check a settings file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one frame per line)
    Ndjson,
    /// JSON array of frames
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .init();
}

fn run(cli: Cli) -> Result<(), EfluxCliError> {
    match cli.command {
        Commands::Score {
            rules,
            input,
            output,
            input_format,
            settings,
            average,
            suppress_spikes,
            spike_amplitude,
            no_clamp,
            load_history,
            save_history,
        } => {
            let mut engine_settings = match settings {
                Some(path) => EngineSettings::from_json(&fs::read_to_string(path)?)?,
                None => EngineSettings::default(),
            };
            if let Some(average) = average {
                engine_settings.average = average;
            }
            if suppress_spikes {
                engine_settings.suppress_spikes = true;
            }
            if let Some(amplitude) = spike_amplitude {
                engine_settings.spike_amplitude = amplitude;
            }
            if no_clamp {
                engine_settings.clamp_cosines = false;
            }

            cmd_score(
                &rules,
                &input,
                &output,
                input_format,
                engine_settings,
                load_history.as_deref(),
                save_history.as_deref(),
            )
        }
        Commands::Rules { rules, json } => cmd_rules(&rules, json),
        Commands::Features {
            input,
            input_format,
            no_clamp,
        } => cmd_features(&input, input_format, !no_clamp),
        Commands::Doctor {
            rules,
            settings,
            json,
        } => cmd_doctor(rules.as_deref(), settings.as_deref(), json),
    }
}

/// One output line of `eflux score`
#[derive(Serialize)]
struct ScoreRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    frame: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    face: FaceId,
    emotion: String,
    value: f64,
}

fn cmd_score(
    rules: &Path,
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    settings: EngineSettings,
    load_history: Option<&Path>,
    save_history: Option<&Path>,
) -> Result<(), EfluxCliError> {
    let mut engine = EmotionEngine::with_settings(settings)?;
    engine.load_rules(&fs::read_to_string(rules)?)?;
    info!(
        engine = %engine.id(),
        rules = engine.rules().len(),
        "engine ready"
    );

    if let Some(history_path) = load_history {
        engine.load_history(&fs::read_to_string(history_path)?)?;
    }

    let frames = read_frames(input, &input_format)?;
    if frames.is_empty() {
        return Err(EfluxCliError::NoFrames);
    }
    validate(&frames)?;

    let mut lines: Vec<String> = Vec::new();
    for frame in &frames {
        let mut events: Vec<ScoreEvent> = Vec::new();
        let processed = engine.process_faces(&frame.faces, &mut events)?;
        debug!(frame = ?frame.frame, faces = processed, "scored frame");

        for event in events {
            lines.push(serde_json::to_string(&ScoreRecord {
                frame: frame.frame,
                timestamp: frame.timestamp,
                face: event.face,
                emotion: event.emotion,
                value: event.value,
            })?);
        }
    }

    if let Some(history_path) = save_history {
        fs::write(history_path, engine.save_history()?)?;
    }

    write_output(output, &lines)
}

#[derive(Serialize)]
struct RulesReport {
    rules: usize,
    emotions: Vec<String>,
    max_variable: Option<usize>,
    fits_default_table: bool,
    rendered: Vec<String>,
}

fn cmd_rules(rules: &Path, json: bool) -> Result<(), EfluxCliError> {
    let set = parse_rule_text(&fs::read_to_string(rules)?)?;
    let feature_count = FeatureVectorSpec::default_68().feature_count();

    let report = RulesReport {
        rules: set.len(),
        emotions: set.emotions().to_vec(),
        max_variable: set.max_variable(),
        fits_default_table: set.max_variable().map_or(true, |max| max < feature_count),
        rendered: set.rules().iter().map(|rule| rule.to_string()).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Rule Set");
        println!("========");
        println!("Rules:    {}", report.rules);
        println!("Emotions: {}", report.emotions.join(", "));
        if let Some(max) = report.max_variable {
            println!(
                "Highest variable: V{} ({} features in the 68-point table)",
                max, feature_count
            );
        }
        for emotion in &report.emotions {
            println!("\n{}:", emotion);
            for rule in set.rules_for(emotion) {
                println!("  {}", rule);
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct FeatureRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    frame: Option<u64>,
    face: FaceId,
    features: Vec<f64>,
}

fn cmd_features(
    input: &Path,
    input_format: InputFormat,
    clamp_cosines: bool,
) -> Result<(), EfluxCliError> {
    let frames = read_frames(input, &input_format)?;
    validate(&frames)?;

    let extractor = FeatureExtractor::new(clamp_cosines);
    let spec = FeatureVectorSpec::default_68();

    let mut lines: Vec<String> = Vec::new();
    for frame in &frames {
        for (index, face) in frame.faces.iter().enumerate() {
            if face.landmarks.is_empty() {
                continue;
            }
            let features = extractor.extract(&face.landmarks, &spec)?;
            lines.push(serde_json::to_string(&FeatureRecord {
                frame: frame.frame,
                face: face.id.unwrap_or(index as FaceId),
                features,
            })?);
        }
    }

    write_output(Path::new("-"), &lines)
}

fn cmd_doctor(
    rules: Option<&Path>,
    settings: Option<&Path>,
    json: bool,
) -> Result<(), EfluxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck::ok(
        "eflux_version",
        format!("eflux version {}", FLUX_VERSION),
    ));
    checks.push(DoctorCheck::ok(
        "schema_version",
        format!("Input schema: {}", SCHEMA_VERSION),
    ));

    let spec = FeatureVectorSpec::default_68();
    checks.push(DoctorCheck::ok(
        "feature_table",
        format!(
            "{} landmark pairs, {} triangles, {} features, needs {} landmarks",
            spec.pairs().len(),
            spec.triangle_count(),
            spec.feature_count(),
            spec.max_index() + 1
        ),
    ));

    if let Some(rules_path) = rules {
        checks.push(check_rules(rules_path));
    }
    if let Some(settings_path) = settings {
        checks.push(check_settings(settings_path));
    }

    let stdin_message = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (ready for --input -)"
    };
    checks.push(DoctorCheck::ok("stdin", stdin_message.to_string()));

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("eflux Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(EfluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_rules(path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck::new("rules", CheckStatus::Error, "Rule file does not exist");
    }
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            return DoctorCheck::new(
                "rules",
                CheckStatus::Error,
                format!("Cannot read rule file: {}", e),
            )
        }
    };

    let mut engine = EmotionEngine::new();
    match engine.load_rules(&text) {
        Ok(set) if set.is_empty() => DoctorCheck::new(
            "rules",
            CheckStatus::Warning,
            "Rule file contains no rules",
        ),
        Ok(set) => DoctorCheck::ok(
            "rules",
            format!(
                "{} rules for {} emotions ({})",
                set.len(),
                set.emotions().len(),
                set.emotions().join(", ")
            ),
        ),
        Err(e) => DoctorCheck::new("rules", CheckStatus::Error, e.to_string()),
    }
}

fn check_settings(path: &Path) -> DoctorCheck {
    match fs::read_to_string(path) {
        Ok(content) => match EngineSettings::from_json(&content) {
            Ok(settings) => DoctorCheck::ok(
                "settings",
                format!(
                    "average {}, spike suppression {}, amplitude {}, clamping {}, aggregation {:?}",
                    settings.average,
                    if settings.suppress_spikes { "on" } else { "off" },
                    settings.spike_amplitude,
                    if settings.clamp_cosines { "on" } else { "off" },
                    settings.aggregation
                ),
            ),
            Err(e) => DoctorCheck::new("settings", CheckStatus::Error, e.to_string()),
        },
        Err(e) => DoctorCheck::new(
            "settings",
            CheckStatus::Error,
            format!("Cannot read settings file: {}", e),
        ),
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, EfluxCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_frames(
    input: &Path,
    input_format: &InputFormat,
) -> Result<Vec<LandmarkFrame>, EfluxCliError> {
    let data = read_input(input)?;
    let frames = match input_format {
        InputFormat::Ndjson => LandmarkFrameAdapter::parse_ndjson(&data)?,
        InputFormat::Json => LandmarkFrameAdapter::parse_array(&data)?,
    };
    Ok(frames)
}

fn validate(frames: &[LandmarkFrame]) -> Result<(), EfluxCliError> {
    match LandmarkFrameAdapter::validate_frames(frames).into_iter().next() {
        Some(failure) => Err(EfluxCliError::InvalidFrame {
            index: failure.index,
            message: failure.error.to_string(),
        }),
        None => Ok(()),
    }
}

fn write_output(output: &Path, lines: &[String]) -> Result<(), EfluxCliError> {
    let mut data = lines.join("\n");
    if !data.is_empty() {
        data.push('\n');
    }

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Doctor report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }

    fn ok(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Ok, message)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

// Error types

#[derive(Debug)]
enum EfluxCliError {
    Io(io::Error),
    Inference(InferenceError),
    Json(serde_json::Error),
    InvalidFrame { index: usize, message: String },
    NoFrames,
    DoctorFailed,
}

impl From<io::Error> for EfluxCliError {
    fn from(e: io::Error) -> Self {
        EfluxCliError::Io(e)
    }
}

impl From<InferenceError> for EfluxCliError {
    fn from(e: InferenceError) -> Self {
        EfluxCliError::Inference(e)
    }
}

impl From<serde_json::Error> for EfluxCliError {
    fn from(e: serde_json::Error) -> Self {
        EfluxCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<EfluxCliError> for CliError {
    fn from(e: EfluxCliError) -> Self {
        match e {
            EfluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            EfluxCliError::Inference(e) => {
                let (code, hint) = match &e {
                    InferenceError::Parse { .. } => (
                        "RULE_PARSE_ERROR",
                        "Lines starting with (V must follow the FURIA rule syntax",
                    ),
                    InferenceError::InvalidRuleSet(_) => (
                        "INVALID_RULES",
                        "Rule variables must index the 54-feature 68-point table",
                    ),
                    InferenceError::IndexOutOfRange { .. } => (
                        "LANDMARK_ERROR",
                        "Faces need all 68 landmarks of the detector model",
                    ),
                    InferenceError::InvalidConfig(_) => (
                        "CONFIG_ERROR",
                        "Check --average, --spike-amplitude and the settings file",
                    ),
                    InferenceError::Json(_) | InferenceError::Schema(_) => (
                        "PARSE_ERROR",
                        "Ensure input matches the face.landmark_frame.v1 schema",
                    ),
                    _ => ("INFERENCE_ERROR", "Run 'eflux doctor' for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            EfluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            EfluxCliError::InvalidFrame { index, message } => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: format!("Frame {}: {}", index, message),
                hint: Some("Fix the frame record and retry".to_string()),
            },
            EfluxCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            EfluxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}
