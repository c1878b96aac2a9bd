use std::{env, path::PathBuf, str::FromStr, time::Duration};

use vaccel_core::VideoAcceleration;

use crate::logger::FfmpegLogLevel;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleConfig {
    pub input: PathBuf,
    pub acceleration: VideoAcceleration,
    /// Negative selects the default device.
    pub device_index: i32,
    pub fps_interval: Duration,
    pub logger: LoggerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    pub level: String,
    pub format: LoggerFormat,
    pub ffmpeg_logger_level: FfmpegLogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerFormat {
    Pretty,
    Json,
    Compact,
}

impl FromStr for LoggerFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(LoggerFormat::Json),
            "pretty" => Ok(LoggerFormat::Pretty),
            "compact" => Ok(LoggerFormat::Compact),
            _ => Err("invalid logger format"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No input file. Pass it as the first argument or set VACCEL_INPUT.")]
    MissingInput,

    #[error("Invalid value {value:?} of {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Reads the sample configuration from `VACCEL_*` environment variables.
/// The first command line argument is used as input when `VACCEL_INPUT` is unset.
pub fn read_config() -> Result<SampleConfig, ConfigError> {
    let arg_input = env::args().nth(1);
    config_from(|var| match var {
        "VACCEL_INPUT" => env::var(var).ok().or_else(|| arg_input.clone()),
        _ => env::var(var).ok(),
    })
}

fn parse<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value
        .parse()
        .map_err(|err: T::Err| ConfigError::InvalidValue {
            var,
            value,
            reason: err.to_string(),
        })
}

fn config_from(lookup: impl Fn(&str) -> Option<String>) -> Result<SampleConfig, ConfigError> {
    let input = lookup("VACCEL_INPUT")
        .map(PathBuf::from)
        .ok_or(ConfigError::MissingInput)?;

    let acceleration = match lookup("VACCEL_ACCELERATION") {
        Some(value) => parse("VACCEL_ACCELERATION", value)?,
        None => VideoAcceleration::Any,
    };
    let device_index = match lookup("VACCEL_DEVICE_INDEX") {
        Some(value) => parse("VACCEL_DEVICE_INDEX", value)?,
        None => -1,
    };
    let fps_interval = match lookup("VACCEL_FPS_INTERVAL_MS") {
        Some(value) => Duration::from_millis(parse("VACCEL_FPS_INTERVAL_MS", value)?),
        None => Duration::from_millis(500),
    };

    let level = lookup("VACCEL_LOGGER_LEVEL").unwrap_or_else(|| "info".to_string());
    let format = match lookup("VACCEL_LOGGER_FORMAT") {
        Some(value) => parse("VACCEL_LOGGER_FORMAT", value)?,
        None => LoggerFormat::Compact,
    };
    let ffmpeg_logger_level = match lookup("VACCEL_FFMPEG_LOGGER_LEVEL") {
        Some(value) => parse("VACCEL_FFMPEG_LOGGER_LEVEL", value)?,
        None => FfmpegLogLevel::Warn,
    };

    Ok(SampleConfig {
        input,
        acceleration,
        device_index,
        fps_interval,
        logger: LoggerConfig {
            level,
            format,
            ffmpeg_logger_level,
        },
    })
}
