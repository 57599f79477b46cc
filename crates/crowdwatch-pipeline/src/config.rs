//! Pipeline configuration.
//!
//! Every setting has a default and can be overridden through a
//! `CROWDWATCH_*` environment variable.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crowdwatch_inference::{NormalizationRegime, DEFAULT_SEQUENCE_MODEL};
use crowdwatch_media::density::DEFAULT_DENSITY_MODEL;
use crowdwatch_media::{DensityStrategy, MotionConfig};
use crowdwatch_models::DEFAULT_WINDOW_SIZE;

use crate::error::{PipelineError, PipelineResult};

macro_rules! config_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = PipelineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(PipelineError::config(format!(
                        "invalid {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

config_enum!(RuleMode {
    Threshold => "threshold",
    DensityRisk => "density_risk",
});

config_enum!(CountSource {
    Tracker => "tracker",
    Density => "density",
});

config_enum!(SequenceBackendKind {
    Onnx => "onnx",
    Process => "process",
    None => "none",
});

config_enum!(DispatchMode {
    Inline => "inline",
    Detached => "detached",
});

/// Full pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Feature vectors per classifier window (W)
    pub window_size: usize,
    /// Frames between sequence invocations once the window is full
    pub sequence_stride: usize,
    /// Sequence decision threshold
    pub decision_threshold: f64,
    pub normalization: NormalizationRegime,
    /// "Running" threshold on motion energy
    pub energy_threshold: f64,
    /// "Rushing" threshold on flux of count
    pub flux_threshold: f64,
    pub rule_mode: RuleMode,
    pub risk_scale: f64,
    /// Consecutive frames required to enter and to leave PANIC (K)
    pub hysteresis_frames: usize,
    /// Whether a sequence panic verdict counts toward PANIC entry
    pub escalate_on_sequence_panic: bool,
    pub motion: MotionConfig,
    pub density: DensityStrategy,
    pub count_source: CountSource,
    /// Detector classes that contribute to live and unique counts
    pub counted_classes: Vec<String>,
    pub sequence_backend: SequenceBackendKind,
    pub sequence_model: PathBuf,
    /// Worker command line for the process backend
    pub infer_command: String,
    pub sequence_timeout: Duration,
    pub dispatch: DispatchMode,
    /// Detached mode: windows beyond this many pending calls are skipped
    pub max_in_flight: usize,
    /// Fail startup instead of degrading when model weights are missing
    pub require_models: bool,
    pub alert_min_confidence: f64,
    pub alert_cooldown: Duration,
    /// Prometheus listener address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            sequence_stride: DEFAULT_WINDOW_SIZE,
            decision_threshold: 0.5,
            normalization: NormalizationRegime::Window,
            energy_threshold: 3.5,
            flux_threshold: 10.0,
            rule_mode: RuleMode::Threshold,
            risk_scale: 10.0,
            hysteresis_frames: 3,
            escalate_on_sequence_panic: false,
            motion: MotionConfig::default(),
            density: DensityStrategy::Geometric,
            count_source: CountSource::Tracker,
            counted_classes: vec!["person".to_string()],
            sequence_backend: SequenceBackendKind::Onnx,
            sequence_model: PathBuf::from(DEFAULT_SEQUENCE_MODEL),
            infer_command: "crowdwatch-infer".to_string(),
            sequence_timeout: Duration::from_millis(2000),
            dispatch: DispatchMode::Inline,
            max_in_flight: 2,
            require_models: false,
            alert_min_confidence: 0.75,
            alert_cooldown: Duration::from_secs(10),
            metrics_addr: None,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl PipelineConfig {
    /// Create config from environment variables.
    ///
    /// Unparseable numbers fall back to their defaults; unknown mode names
    /// and malformed normalization statistics are errors.
    pub fn from_env() -> PipelineResult<Self> {
        let defaults = Self::default();

        let normalization = NormalizationRegime::parse(
            &std::env::var("CROWDWATCH_NORMALIZATION").unwrap_or_else(|_| "window".to_string()),
            std::env::var("CROWDWATCH_GLOBAL_STATS").ok().as_deref(),
        )?;

        let density = match std::env::var("CROWDWATCH_DENSITY") {
            Ok(kind) => match kind.parse::<DensityStrategy>()? {
                DensityStrategy::Learned { .. } => DensityStrategy::learned(
                    std::env::var("CROWDWATCH_DENSITY_MODEL")
                        .unwrap_or_else(|_| DEFAULT_DENSITY_MODEL.to_string()),
                ),
                geometric => geometric,
            },
            Err(_) => defaults.density.clone(),
        };

        let motion = MotionConfig {
            noise_floor: env_parse("CROWDWATCH_MOTION_NOISE_FLOOR")
                .unwrap_or(defaults.motion.noise_floor),
            analysis_size: env_parse("CROWDWATCH_ANALYSIS_SIZE")
                .unwrap_or(defaults.motion.analysis_size),
            risk_width: env_parse("CROWDWATCH_RISK_WIDTH").unwrap_or(defaults.motion.risk_width),
            risk_height: env_parse("CROWDWATCH_RISK_HEIGHT")
                .unwrap_or(defaults.motion.risk_height),
            ..defaults.motion.clone()
        };

        let counted_classes = std::env::var("CROWDWATCH_COUNTED_CLASSES")
            .map(|v| {
                v.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| defaults.counted_classes.clone());

        let metrics_addr = match std::env::var("CROWDWATCH_METRICS_ADDR") {
            Ok(addr) if !addr.trim().is_empty() => Some(addr.trim().parse().map_err(|e| {
                PipelineError::config(format!("invalid CROWDWATCH_METRICS_ADDR '{addr}': {e}"))
            })?),
            _ => None,
        };

        let window_size = env_parse("CROWDWATCH_WINDOW_SIZE").unwrap_or(defaults.window_size);

        Ok(Self {
            window_size,
            sequence_stride: env_parse("CROWDWATCH_SEQUENCE_STRIDE").unwrap_or(window_size),
            decision_threshold: env_parse("CROWDWATCH_DECISION_THRESHOLD")
                .unwrap_or(defaults.decision_threshold),
            normalization,
            energy_threshold: env_parse("CROWDWATCH_ENERGY_THRESHOLD")
                .unwrap_or(defaults.energy_threshold),
            flux_threshold: env_parse("CROWDWATCH_FLUX_THRESHOLD")
                .unwrap_or(defaults.flux_threshold),
            rule_mode: env_enum("CROWDWATCH_RULE_MODE", defaults.rule_mode)?,
            risk_scale: env_parse("CROWDWATCH_RISK_SCALE").unwrap_or(defaults.risk_scale),
            hysteresis_frames: env_parse("CROWDWATCH_HYSTERESIS_FRAMES")
                .unwrap_or(defaults.hysteresis_frames),
            escalate_on_sequence_panic: env_bool("CROWDWATCH_ESCALATE_ON_SEQUENCE")
                .unwrap_or(defaults.escalate_on_sequence_panic),
            motion,
            density,
            count_source: env_enum("CROWDWATCH_COUNT_SOURCE", defaults.count_source)?,
            counted_classes,
            sequence_backend: env_enum("CROWDWATCH_SEQUENCE_BACKEND", defaults.sequence_backend)?,
            sequence_model: std::env::var("CROWDWATCH_SEQUENCE_MODEL")
                .map(PathBuf::from)
                .unwrap_or(defaults.sequence_model),
            infer_command: std::env::var("CROWDWATCH_INFER_COMMAND")
                .unwrap_or(defaults.infer_command),
            sequence_timeout: Duration::from_millis(
                env_parse("CROWDWATCH_SEQUENCE_TIMEOUT_MS").unwrap_or(2000),
            ),
            dispatch: env_enum("CROWDWATCH_SEQUENCE_DISPATCH", defaults.dispatch)?,
            max_in_flight: env_parse("CROWDWATCH_MAX_IN_FLIGHT").unwrap_or(defaults.max_in_flight),
            require_models: env_bool("CROWDWATCH_REQUIRE_MODELS").unwrap_or(defaults.require_models),
            alert_min_confidence: env_parse("CROWDWATCH_ALERT_MIN_CONFIDENCE")
                .unwrap_or(defaults.alert_min_confidence),
            alert_cooldown: Duration::from_secs(
                env_parse("CROWDWATCH_ALERT_COOLDOWN_SECS").unwrap_or(10),
            ),
            metrics_addr,
        })
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.window_size < 2 {
            return Err(PipelineError::config("window size must be at least 2"));
        }
        if self.sequence_stride == 0 {
            return Err(PipelineError::config("sequence stride must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(PipelineError::config("decision threshold must be within [0, 1]"));
        }
        if !(self.energy_threshold > 0.0 && self.flux_threshold > 0.0) {
            return Err(PipelineError::config("rule thresholds must be positive"));
        }
        if !(self.risk_scale > 0.0) {
            return Err(PipelineError::config("risk scale must be positive"));
        }
        if self.hysteresis_frames == 0 {
            return Err(PipelineError::config("hysteresis frames must be at least 1"));
        }
        if self.motion.analysis_size < 16 {
            return Err(PipelineError::config("analysis size must be at least 16"));
        }
        if self.motion.risk_width == 0 || self.motion.risk_height == 0 {
            return Err(PipelineError::config("risk resolution must be non-zero"));
        }
        if !(self.motion.noise_floor >= 0.0) {
            return Err(PipelineError::config("motion noise floor must be non-negative"));
        }
        if self.counted_classes.is_empty() {
            return Err(PipelineError::config("at least one counted class is required"));
        }
        if self.sequence_timeout.is_zero() {
            return Err(PipelineError::config("sequence timeout must be positive"));
        }
        if self.max_in_flight == 0 {
            return Err(PipelineError::config("max in-flight requests must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.alert_min_confidence) {
            return Err(PipelineError::config("alert confidence must be within [0, 1]"));
        }
        Ok(())
    }
}

fn env_enum<T>(name: &str, default: T) -> PipelineResult<T>
where
    T: FromStr<Err = PipelineError>,
{
    match std::env::var(name) {
        Ok(value) => value.parse(),
        Err(_) => Ok(default),
    }
}
