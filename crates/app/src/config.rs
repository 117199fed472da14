//! Viewer settings from CLI flags.

use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "assets/crate";
pub const DEFAULT_SCALE: f32 = 0.1;

#[derive(Clone, Debug, PartialEq)]
pub struct ViewerConfig {
    /// Model stems (`<stem>.obj` + `<stem>.mtl`), in draw order.
    pub models: Vec<PathBuf>,
    pub scale: f32,
    /// Start every load before the first frame.
    pub preload: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            models: vec![PathBuf::from(DEFAULT_MODEL)],
            scale: DEFAULT_SCALE,
            preload: false,
        }
    }
}

impl ViewerConfig {
    /// Accepts: --model=<stem> (repeatable), --scale=<f32>, --preload[=on|off]
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut config = Self::default();
        let mut models = Vec::new();

        for arg in args {
            let arg = arg.as_ref();
            if let Some(val) = arg.strip_prefix("--model=") {
                if val.is_empty() {
                    log::warn!("Ignoring empty --model");
                } else {
                    models.push(PathBuf::from(val));
                }
            } else if let Some(val) = arg.strip_prefix("--scale=") {
                match val.parse::<f32>() {
                    Ok(s) if s.is_finite() && s > 0.0 => config.scale = s,
                    _ => log::warn!("Invalid scale '{}', keeping {}", val, config.scale),
                }
            } else if arg == "--preload" {
                config.preload = true;
            } else if let Some(val) = arg.strip_prefix("--preload=") {
                config.preload = matches!(
                    val.to_ascii_lowercase().as_str(),
                    "1" | "true" | "on" | "yes"
                );
            } else {
                log::warn!("Unknown argument '{}'", arg);
            }
        }

        if !models.is_empty() {
            config.models = models;
        }
        config
    }
}
