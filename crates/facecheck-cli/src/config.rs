use clap::ValueEnum;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("scale must be in (0, 1], got {0}")]
    Scale(f32),
    #[error("sample interval must be at least 1")]
    SampleInterval,
    #[error("scan step must be at least 1 pixel")]
    ScanStep,
}

/// Tuning presets for the live loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Quarter-size working frame, every 3rd frame, 3 s grace, plain boxes.
    #[default]
    Classic,
    /// Half-size working frame, every 5th frame, 6 s grace, scan overlay.
    Scan,
}

/// Which comparator decides a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity at or above the threshold.
    #[default]
    Cosine,
    /// Euclidean distance at or below the threshold.
    Euclidean,
}

impl Metric {
    /// Threshold used when none is configured.
    pub fn default_threshold(self) -> f32 {
        match self {
            Metric::Cosine => 0.40,
            Metric::Euclidean => 0.6,
        }
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Still image holding the face to look for.
    pub reference: PathBuf,
    /// Camera index (`"0"`) or V4L2 device path.
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Working-copy scale factor for detection, in (0, 1].
    pub scale: f32,
    /// Run detection on every Nth frame.
    pub sample_interval: u64,
    /// How long to keep showing the camera after the first match.
    pub grace: Duration,
    /// Draw the moving scan line while scanning. Status text is always drawn.
    pub scan_overlay: bool,
    /// Scan line movement per iteration, in pixels.
    pub scan_step: u32,
    pub metric: Metric,
    /// Similarity floor (cosine) or distance ceiling (euclidean); the
    /// metric's default when unset.
    pub threshold: Option<f32>,
    /// Quit-poll wait when a face was located this iteration.
    pub face_poll: Duration,
    /// Quit-poll wait otherwise.
    pub idle_poll: Duration,
    /// Use the no-op display sink.
    pub headless: bool,
}

impl Config {
    /// Defaults for a preset, before any file, environment or flag overrides.
    pub fn preset(preset: Preset) -> Self {
        let base = Self {
            reference: PathBuf::from("img.jpg"),
            camera_device: "0".to_string(),
            model_dir: facecheck_core::default_model_dir(),
            capture_width: 640,
            capture_height: 480,
            scale: 0.25,
            sample_interval: 3,
            grace: Duration::from_secs(3),
            scan_overlay: false,
            scan_step: 5,
            metric: Metric::Cosine,
            threshold: None,
            face_poll: Duration::from_millis(10),
            idle_poll: Duration::from_millis(50),
            headless: false,
        };
        match preset {
            Preset::Classic => base,
            Preset::Scan => Self {
                scale: 0.5,
                sample_interval: 5,
                grace: Duration::from_secs(6),
                scan_overlay: true,
                ..base
            },
        }
    }

    /// Overlay values from a TOML config file.
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.reference {
            self.reference = v;
        }
        if let Some(v) = file.camera_device {
            self.camera_device = v;
        }
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.capture_width {
            self.capture_width = v;
        }
        if let Some(v) = file.capture_height {
            self.capture_height = v;
        }
        if let Some(v) = file.scale {
            self.scale = v;
        }
        if let Some(v) = file.sample_interval {
            self.sample_interval = v;
        }
        if let Some(v) = file.grace_secs.and_then(secs) {
            self.grace = v;
        }
        if let Some(v) = file.scan_overlay {
            self.scan_overlay = v;
        }
        if let Some(v) = file.scan_step {
            self.scan_step = v;
        }
        if let Some(v) = file.metric {
            self.metric = v;
        }
        if let Some(v) = file.threshold {
            self.threshold = Some(v);
        }
        if let Some(v) = file.face_poll_ms {
            self.face_poll = Duration::from_millis(v);
        }
        if let Some(v) = file.idle_poll_ms {
            self.idle_poll = Duration::from_millis(v);
        }
        if let Some(v) = file.headless {
            self.headless = v;
        }
    }

    /// Overlay `FACECHECK_*` environment variables. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FACECHECK_REFERENCE") {
            self.reference = PathBuf::from(v);
        }
        if let Some(v) = var("FACECHECK_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = var("FACECHECK_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        self.scale = env_f32(&var, "FACECHECK_SCALE", self.scale);
        self.sample_interval = env_u64(&var, "FACECHECK_SAMPLE_INTERVAL", self.sample_interval);
        if let Some(grace) = var("FACECHECK_GRACE_SECS")
            .and_then(|v| v.parse().ok())
            .and_then(secs)
        {
            self.grace = grace;
        }
        self.scan_overlay = env_bool(&var, "FACECHECK_SCAN_OVERLAY", self.scan_overlay);
        if let Some(v) = var("FACECHECK_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.threshold = Some(v);
        }
        self.headless = env_bool(&var, "FACECHECK_HEADLESS", self.headless);
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.unwrap_or(self.metric.default_threshold())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(ConfigError::Scale(self.scale));
        }
        if self.sample_interval == 0 {
            return Err(ConfigError::SampleInterval);
        }
        if self.scan_step == 0 {
            return Err(ConfigError::ScanStep);
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(facecheck_core::DETECTOR_MODEL)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(facecheck_core::RECOGNIZER_MODEL)
            .to_string_lossy()
            .into_owned()
    }
}

/// On-disk form of [`Config`]; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub preset: Option<Preset>,
    pub reference: Option<PathBuf>,
    pub camera_device: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub capture_width: Option<u32>,
    pub capture_height: Option<u32>,
    pub scale: Option<f32>,
    pub sample_interval: Option<u64>,
    pub grace_secs: Option<f32>,
    pub scan_overlay: Option<bool>,
    pub scan_step: Option<u32>,
    pub metric: Option<Metric>,
    pub threshold: Option<f32>,
    pub face_poll_ms: Option<u64>,
    pub idle_poll_ms: Option<u64>,
    pub headless: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Non-negative seconds as a `Duration`; `None` for NaN or infinity.
pub fn secs(value: f32) -> Option<Duration> {
    Duration::try_from_secs_f32(value.max(0.0)).ok()
}

fn env_f32(var: &impl Fn(&str) -> Option<String>, key: &str, default: f32) -> f32 {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    var(key).map(|v| v != "0" && v != "false").unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_classic_preset() {
        let c = Config::preset(Preset::Classic);
        assert_eq!(c.scale, 0.25);
        assert_eq!(c.sample_interval, 3);
        assert_eq!(c.grace, Duration::from_secs(3));
        assert!(!c.scan_overlay);
        assert_eq!(c.face_poll, Duration::from_millis(10));
        assert_eq!(c.idle_poll, Duration::from_millis(50));
        assert_eq!(c.camera_device, "0");
        assert_eq!(c.threshold(), 0.40);
        c.validate().unwrap();
    }

    #[test]
    fn test_scan_preset() {
        let c = Config::preset(Preset::Scan);
        assert_eq!(c.scale, 0.5);
        assert_eq!(c.sample_interval, 5);
        assert_eq!(c.grace, Duration::from_secs(6));
        assert!(c.scan_overlay);
        c.validate().unwrap();
    }

    #[test]
    fn test_file_overrides_preset() {
        let file = ConfigFile::parse(
            r#"
            reference = "me.png"
            scale = 0.5
            grace_secs = 1.5
            metric = "euclidean"
            threshold = 0.6
            "#,
        )
        .unwrap();
        let mut c = Config::preset(Preset::Classic);
        c.apply_file(file);
        assert_eq!(c.reference, PathBuf::from("me.png"));
        assert_eq!(c.scale, 0.5);
        assert_eq!(c.grace, Duration::from_millis(1500));
        assert_eq!(c.metric, Metric::Euclidean);
        assert_eq!(c.threshold(), 0.6);
        assert_eq!(c.sample_interval, 3);
    }

    #[test]
    fn test_file_rejects_unknown_keys() {
        assert!(ConfigFile::parse("frame_skip = 2").is_err());
    }

    #[test]
    fn test_file_preset_key() {
        let file = ConfigFile::parse(r#"preset = "scan""#).unwrap();
        assert_eq!(file.preset, Some(Preset::Scan));
    }

    #[test]
    fn test_env_overrides() {
        let mut c = Config::preset(Preset::Classic);
        c.apply_vars(vars(&[
            ("FACECHECK_CAMERA_DEVICE", "/dev/video2"),
            ("FACECHECK_SAMPLE_INTERVAL", "7"),
            ("FACECHECK_SCAN_OVERLAY", "1"),
            ("FACECHECK_HEADLESS", "true"),
            ("FACECHECK_GRACE_SECS", "0.5"),
        ]));
        assert_eq!(c.camera_device, "/dev/video2");
        assert_eq!(c.sample_interval, 7);
        assert!(c.scan_overlay);
        assert!(c.headless);
        assert_eq!(c.grace, Duration::from_millis(500));
    }

    #[test]
    fn test_env_unparseable_keeps_default() {
        let mut c = Config::preset(Preset::Classic);
        c.apply_vars(vars(&[("FACECHECK_SCALE", "big"), ("FACECHECK_SCAN_OVERLAY", "0")]));
        assert_eq!(c.scale, 0.25);
        assert!(!c.scan_overlay);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = Config::preset(Preset::Classic);
        c.scale = 0.0;
        assert!(matches!(c.validate(), Err(ConfigError::Scale(_))));
        c.scale = 1.5;
        assert!(matches!(c.validate(), Err(ConfigError::Scale(_))));
        c.scale = 1.0;
        c.validate().unwrap();

        c.sample_interval = 0;
        assert!(matches!(c.validate(), Err(ConfigError::SampleInterval)));
        c.sample_interval = 1;

        c.scan_step = 0;
        assert!(matches!(c.validate(), Err(ConfigError::ScanStep)));
    }

    #[test]
    fn test_model_paths() {
        let mut c = Config::preset(Preset::Classic);
        c.model_dir = PathBuf::from("/opt/models");
        assert_eq!(c.scrfd_model_path(), "/opt/models/det_10g.onnx");
        assert_eq!(c.arcface_model_path(), "/opt/models/w600k_r50.onnx");
    }
}
