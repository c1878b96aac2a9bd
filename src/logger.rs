use std::str::FromStr;

use tracing_subscriber::{
    Layer, Registry,
    fmt::{self},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::{LoggerConfig, LoggerFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegLogLevel {
    Quiet,
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
    Trace,
}

impl FfmpegLogLevel {
    fn into_i32(self) -> i32 {
        match self {
            FfmpegLogLevel::Quiet => -8,
            FfmpegLogLevel::Error => 16,
            FfmpegLogLevel::Warn => 24,
            FfmpegLogLevel::Info => 32,
            FfmpegLogLevel::Verbose => 40,
            FfmpegLogLevel::Debug => 48,
            FfmpegLogLevel::Trace => 56,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(FfmpegLogLevel::Trace),
            "debug" => Ok(FfmpegLogLevel::Debug),
            "verbose" => Ok(FfmpegLogLevel::Verbose),
            "info" => Ok(FfmpegLogLevel::Info),
            "warn" => Ok(FfmpegLogLevel::Warn),
            "error" => Ok(FfmpegLogLevel::Error),
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            _ => Err("Invalid FFmpeg logger level."),
        }
    }
}

pub fn init_logger(opts: &LoggerConfig) {
    let filter = tracing_subscriber::EnvFilter::new(opts.level.clone());
    let layer = match opts.format {
        LoggerFormat::Pretty => fmt::Layer::default().pretty().boxed(),
        LoggerFormat::Json => fmt::Layer::default().json().boxed(),
        LoggerFormat::Compact => fmt::Layer::default().compact().boxed(),
    }
    .with_filter(filter);

    Registry::default().with(layer).init();

    unsafe {
        ffmpeg_next::sys::av_log_set_level(opts.ffmpeg_logger_level.into_i32());
    }
}
