// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use dubwai::app_config::{self, Config, SpeechProvider, TranslationProvider};
use dubwai::app_controller::{format_duration, Controller, DubInput};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    #[value(name = "openai")]
    OpenAI,
    #[value(name = "lmstudio")]
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for SpeechProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliSpeechProvider {
    #[value(name = "openai")]
    OpenAI,
    Preview,
}

impl From<CliSpeechProvider> for SpeechProvider {
    fn from(cli_provider: CliSpeechProvider) -> Self {
        match cli_provider {
            CliSpeechProvider::OpenAI => SpeechProvider::OpenAI,
            CliSpeechProvider::Preview => SpeechProvider::Preview,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dub a video (default command)
    #[command(alias = "run")]
    Dub(DubArgs),

    /// Merge caption fragments into spoken units and write them out
    Merge(MergeArgs),

    /// Generate shell completions for dubwai
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by every command that reads the config file
#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Largest gap (seconds) between fragments that may still be merged
    #[arg(long)]
    gap_threshold: Option<f64>,

    /// Upper bound (seconds) on a merged unit's span
    #[arg(long)]
    max_group_duration: Option<f64>,
}

#[derive(Args, Debug, Clone)]
struct DubArgs {
    /// Video URL, or a local video file together with --captions or --record
    #[arg(value_name = "INPUT")]
    input: Option<String>,

    /// Caption file (VTT or SRT) for a local video
    #[arg(long, conflicts_with = "record")]
    captions: Option<PathBuf>,

    /// Resume from a stage record written by an earlier run
    #[arg(long)]
    record: Option<PathBuf>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Source language code (e.g., 'en', 'es', 'fr')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'tt', 'ru', 'de')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Speech backend; preview renders silent placeholder clips offline
    #[arg(long, value_enum)]
    speech_provider: Option<CliSpeechProvider>,

    /// Voice name for speech synthesis
    #[arg(long)]
    voice: Option<String>,

    /// Root folder for per-video work directories
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Keep caption fragments as they are
    #[arg(long)]
    no_merge: bool,

    /// Speed factor above which a clip is reported as too fast
    #[arg(long)]
    extreme_speed: Option<f64>,

    /// Keep the original background audio under the dub
    #[arg(long)]
    separate_background: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
struct MergeArgs {
    /// Caption file to merge (VTT or SRT)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file; `.vtt` writes WebVTT, anything else SRT
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

/// dubwai - automatic video dubbing
///
/// Downloads a video with its captions, merges caption fragments into spoken
/// units, translates them, synthesizes speech and fits every clip into its
/// caption window before muxing the dub back into the video.
#[derive(Parser, Debug)]
#[command(name = "dubwai")]
#[command(version = "0.1.0")]
#[command(about = "Caption-driven video dubbing tool")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "dubwai dubs videos from their captions using AI translation and speech.

EXAMPLES:
    dubwai https://www.youtube.com/watch?v=VIDEO        # Download and dub with default config
    dubwai -t ru https://youtu.be/VIDEO                  # Dub into Russian
    dubwai movie.mp4 --captions movie.en.vtt             # Dub a local video
    dubwai movie.mp4 --record downloads/movie/translations/translated_output.json
    dubwai merge movie.en.vtt movie.merged.srt           # Only merge caption fragments
    dubwai completions bash > dubwai.bash                # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    ollama    - Local Ollama server (default: llama3.2:3b)
    openai    - OpenAI API (requires API key)
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    dub: DubArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color and emoji for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("1;31", "❌ "),
            Level::Warn => ("1;33", "🚧 "),
            Level::Info => ("1;32", " "),
            Level::Debug => ("1;36", "🔍 "),
            Level::Trace => ("1;35", "📋 "),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (color, emoji) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, emoji, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Verbose until the config says otherwise; set_max_level narrows it later
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "dubwai", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Merge(args)) => run_merge(args),
        Some(Commands::Dub(args)) => run_dub(args).await,
        None => run_dub(cli.dub).await,
    }
}

/// Load (or create) the config and apply the shared overrides
fn load_config(common: &CommonArgs) -> Result<Config> {
    if let Some(level) = &common.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    if !Path::new(&common.config_path).exists() {
        warn!("Config file not found at '{}', creating default config.", common.config_path);
    }
    let mut config = Config::load_or_create(&common.config_path)?;

    if let Some(level) = &common.log_level {
        config.log_level = level.clone().into();
    }
    if let Some(gap) = common.gap_threshold {
        config.timing.merge_gap_threshold = gap;
    }
    if let Some(max) = common.max_group_duration {
        config.timing.max_group_duration = max;
    }

    log::set_max_level(config.log_level.to_level_filter());
    Ok(config)
}

fn run_merge(args: MergeArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    config.timing.validate().context("Configuration validation failed")?;

    let controller = Controller::with_config(config)?;
    let merged = controller.merge_file(&args.input, &args.output)?;
    info!("Success: {} units written to {:?}", merged.len(), args.output);
    Ok(())
}

async fn run_dub(args: DubArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;

    if let Some(provider) = &args.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &args.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }
    if let Some(source_language) = &args.source_language {
        config.source_language = source_language.clone();
    }
    if let Some(target_language) = &args.target_language {
        config.target_language = target_language.clone();
    }
    if let Some(speech_provider) = &args.speech_provider {
        config.speech.provider = speech_provider.clone().into();
    }
    if let Some(voice) = &args.voice {
        config.speech.voice = voice.clone();
    }
    if let Some(work_dir) = &args.work_dir {
        config.work_dir = work_dir.clone();
    }
    if args.no_merge {
        config.timing.merge_segments = false;
    }
    if let Some(extreme_speed) = args.extreme_speed {
        config.timing.extreme_speed_factor = extreme_speed;
    }
    if args.separate_background {
        config.media.separate_background = true;
    }

    config.validate().context("Configuration validation failed")?;

    let input = dub_input(&args)?;
    let controller = Controller::with_config(config)?;
    let outcome = controller.run(input).await?;

    info!(
        "Success: {:?} ({} clips, {:.1}s track, {})",
        outcome.video,
        outcome.clips,
        outcome.track_duration,
        format_duration(outcome.elapsed)
    );
    if let Some(issue_log) = &outcome.issue_log {
        warn!("{} issues, see {:?}", outcome.issues, issue_log);
    }
    Ok(())
}

fn dub_input(args: &DubArgs) -> Result<DubInput> {
    let input = args
        .input
        .clone()
        .ok_or_else(|| anyhow!("INPUT is required when no subcommand is specified"))?;

    if let Some(record) = &args.record {
        return Ok(DubInput::Record { video: PathBuf::from(input), record: record.clone() });
    }
    if let Some(captions) = &args.captions {
        return Ok(DubInput::Local { video: PathBuf::from(input), captions: captions.clone() });
    }
    if input.starts_with("http://") || input.starts_with("https://") {
        return Ok(DubInput::Url(input));
    }

    Err(anyhow!("A local video needs --captions or --record: {}", input))
}
