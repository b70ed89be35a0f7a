use anyhow::{anyhow, Result, Context};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles loading, validating and saving the dubbing settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language spoken in the source video (ISO)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Language of the dub (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Root directory for per-video work folders
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Segment merging and clip timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Speech synthesis config
    #[serde(default)]
    pub speech: SpeechConfig,

    /// External media tools
    #[serde(default)]
    pub media: MediaConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Thresholds driving segment merging and clip timing
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimingConfig {
    /// Merge caption fragments into spoken units before translating
    #[serde(default = "default_true")]
    pub merge_segments: bool,

    /// Pauses shorter than this (seconds) never separate two units
    #[serde(default = "default_merge_gap_threshold")]
    pub merge_gap_threshold: f64,

    /// Longest span (seconds) a merged unit may cover
    #[serde(default = "default_max_group_duration")]
    pub max_group_duration: f64,

    /// A clip shorter than this share of its window gets the mild slowdown
    #[serde(default = "default_short_clip_ratio")]
    pub short_clip_ratio: f64,

    /// Playback rate used for short clips
    #[serde(default = "default_mild_slowdown_factor")]
    pub mild_slowdown_factor: f64,

    /// Minimum leftover (seconds) worth planning trailing silence for
    #[serde(default = "default_min_trailing_silence")]
    pub min_trailing_silence: f64,

    /// Minimum trailing padding (seconds) inserted by the assembler
    #[serde(default = "default_min_gap_silence")]
    pub min_gap_silence: f64,

    /// Speed factors above this are reported as unnatural speech
    #[serde(default = "default_extreme_speed_factor")]
    pub extreme_speed_factor: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            merge_segments: true,
            merge_gap_threshold: default_merge_gap_threshold(),
            max_group_duration: default_max_group_duration(),
            short_clip_ratio: default_short_clip_ratio(),
            mild_slowdown_factor: default_mild_slowdown_factor(),
            min_trailing_silence: default_min_trailing_silence(),
            min_gap_silence: default_min_gap_silence(),
            extreme_speed_factor: default_extreme_speed_factor(),
        }
    }
}

impl TimingConfig {
    /// Check that the thresholds describe a usable plan
    pub fn validate(&self) -> Result<()> {
        if !(self.merge_gap_threshold >= 0.0) {
            return Err(anyhow!("merge_gap_threshold must not be negative"));
        }
        if !(self.max_group_duration > 0.0) {
            return Err(anyhow!("max_group_duration must be positive"));
        }
        if !(self.short_clip_ratio > 0.0 && self.short_clip_ratio <= 1.0) {
            return Err(anyhow!("short_clip_ratio must be in (0, 1], got {}", self.short_clip_ratio));
        }
        if !(self.mild_slowdown_factor >= 0.5 && self.mild_slowdown_factor <= 2.0) {
            return Err(anyhow!(
                "mild_slowdown_factor must be in [0.5, 2.0], got {}",
                self.mild_slowdown_factor
            ));
        }
        // A short clip slowed by mild_slowdown_factor must still end inside its window
        if self.short_clip_ratio > self.mild_slowdown_factor {
            return Err(anyhow!(
                "short_clip_ratio ({}) must not exceed mild_slowdown_factor ({})",
                self.short_clip_ratio,
                self.mild_slowdown_factor
            ));
        }
        if !(self.min_trailing_silence >= 0.0) || !(self.min_gap_silence >= 0.0) {
            return Err(anyhow!("silence thresholds must not be negative"));
        }
        if !(self.extreme_speed_factor >= 1.0) {
            return Err(anyhow!("extreme_speed_factor must be at least 1.0"));
        }
        Ok(())
    }
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Ollama
    #[default]
    Ollama,
    // @provider: OpenAI
    OpenAI,
    // @provider: LM Studio (OpenAI-compatible local server)
    LMStudio,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::LMStudio => "LM Studio",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
        }
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "lmstudio" => Ok(Self::LMStudio),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Max concurrent requests
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    // @field: Max chars per request
    #[serde(default = "default_max_chars_per_request")]
    pub max_chars_per_request: usize,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        let (model, endpoint) = match provider_type {
            TranslationProvider::Ollama => (default_ollama_model(), default_ollama_endpoint()),
            TranslationProvider::OpenAI => (default_openai_model(), default_openai_endpoint()),
            TranslationProvider::LMStudio => (default_lmstudio_model(), default_lmstudio_endpoint()),
        };

        Self {
            provider_type: provider_type.to_lowercase_string(),
            model,
            api_key: String::new(),
            endpoint,
            concurrent_requests: default_concurrent_requests(),
            max_chars_per_request: default_max_chars_per_request(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// System prompt template for translation
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        let provider_str = self.provider.to_lowercase_string();
        self.available_providers.iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Mutable access to the active provider, inserting defaults when missing
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let position = match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(position) => position,
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider.clone()));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[position]
    }

    // @returns: Field of the active provider, or the built-in default when blank
    fn active_or_default(&self, field: impl Fn(&ProviderConfig) -> &String, fallback: fn(&TranslationProvider) -> String) -> String {
        self.get_active_provider_config()
            .map(field)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| fallback(&self.provider))
    }

    /// Model name used for translation requests
    pub fn get_model(&self) -> String {
        self.active_or_default(|p| &p.model, |provider| match provider {
            TranslationProvider::Ollama => default_ollama_model(),
            TranslationProvider::OpenAI => default_openai_model(),
            TranslationProvider::LMStudio => default_lmstudio_model(),
        })
    }

    /// API key of the active provider; blank for local servers
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Base URL the translator talks to
    pub fn get_endpoint(&self) -> String {
        self.active_or_default(|p| &p.endpoint, |provider| match provider {
            TranslationProvider::Ollama => default_ollama_endpoint(),
            TranslationProvider::OpenAI => default_openai_endpoint(),
            TranslationProvider::LMStudio => default_lmstudio_endpoint(),
        })
    }

    /// Get the max chars per request for the active provider
    pub fn get_max_chars_per_request(&self) -> usize {
        self.get_active_provider_config()
            .map(|p| p.max_chars_per_request)
            .filter(|chars| *chars > 0)
            .unwrap_or_else(default_max_chars_per_request)
    }

    /// Number of translation requests allowed in flight
    pub fn optimal_concurrent_requests(&self) -> usize {
        self.get_active_provider_config()
            .map(|p| p.concurrent_requests)
            .filter(|n| *n > 0)
            .unwrap_or_else(default_concurrent_requests)
    }

    /// Request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::Ollama),
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::LMStudio),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}

/// Speech synthesis backend
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    // @provider: OpenAI text-to-speech
    #[default]
    OpenAI,
    // @provider: Silent renders sized to the text, for checking timing offline
    Preview,
}

impl SpeechProvider {
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::OpenAI => "openai".to_string(),
            Self::Preview => "preview".to_string(),
        }
    }
}

impl std::str::FromStr for SpeechProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "preview" => Ok(Self::Preview),
            _ => Err(anyhow!("Invalid speech provider: {}", s)),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default)]
    pub provider: SpeechProvider,

    /// TTS model name
    #[serde(default = "default_speech_model")]
    pub model: String,

    /// Voice preset
    #[serde(default = "default_speech_voice")]
    pub voice: String,

    #[serde(default = "String::new")]
    pub api_key: String,

    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    /// Maximum number of clips synthesized at once
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Sample rate of every rendered clip and of the final track
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: SpeechProvider::default(),
            model: default_speech_model(),
            voice: default_speech_voice(),
            api_key: String::new(),
            endpoint: default_openai_endpoint(),
            concurrent_requests: default_concurrent_requests(),
            sample_rate: default_sample_rate(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// External tool locations and behaviour
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,

    #[serde(default = "default_spleeter_path")]
    pub spleeter_path: String,

    /// Split the original audio into voice and background and keep the background
    #[serde(default)]
    pub separate_background: bool,

    /// yt-dlp format selector
    #[serde(default = "default_download_format")]
    pub download_format: String,

    /// Upper bound for any single external tool run
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            ytdlp_path: default_ytdlp_path(),
            spleeter_path: default_spleeter_path(),
            separate_background: false,
            download_format: default_download_format(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "tt".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_true() -> bool {
    true
}

fn default_merge_gap_threshold() -> f64 {
    0.3
}

fn default_max_group_duration() -> f64 {
    10.0
}

fn default_short_clip_ratio() -> f64 {
    0.7
}

fn default_mild_slowdown_factor() -> f64 {
    0.9
}

fn default_min_trailing_silence() -> f64 {
    0.3
}

fn default_min_gap_silence() -> f64 {
    0.2
}

fn default_extreme_speed_factor() -> f64 {
    2.0
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_max_chars_per_request() -> usize {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // doubled on each retry
}

fn default_temperature() -> f32 {
    0.3
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_lmstudio_endpoint() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_lmstudio_model() -> String {
    "local-model".to_string()
}

fn default_system_prompt() -> String {
    "You are a professional translator for video dubbing. Translate the following spoken lines from {source_language} to {target_language}. Keep each line short enough to be spoken in the same time as the original and spell out numbers as words.".to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

fn default_speech_voice() -> String {
    "nova".to_string()
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_spleeter_path() -> String {
    "spleeter".to_string()
}

fn default_download_format() -> String {
    "bestvideo+bestaudio/best".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    600
}

impl Config {
    /// Load a config file, or write the defaults there when it does not exist yet
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {:?}", path))?;
            let config: Config = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            return Ok(config);
        }

        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write config to file: {:?}", path.as_ref()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        let _source_name = crate::language_utils::get_language_name(&self.source_language)?;
        let _target_name = crate::language_utils::get_language_name(&self.target_language)?;

        if self.translation.provider == TranslationProvider::OpenAI && self.translation.get_api_key().is_empty() {
            return Err(anyhow!("Translation API key is required for OpenAI provider"));
        }

        if self.speech.provider == SpeechProvider::OpenAI && self.speech.api_key.is_empty() {
            return Err(anyhow!("Speech API key is required for OpenAI text-to-speech"));
        }

        if self.speech.sample_rate < 8000 {
            return Err(anyhow!("Sample rate {} is too low for speech", self.speech.sample_rate));
        }

        self.timing.validate().context("Invalid timing configuration")?;

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            work_dir: default_work_dir(),
            timing: TimingConfig::default(),
            translation: TranslationConfig::default(),
            speech: SpeechConfig::default(),
            media: MediaConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
