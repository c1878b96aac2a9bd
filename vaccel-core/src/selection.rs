//! Ordered acceleration candidates for one decode or encode session.

use std::{collections::HashMap, env, fmt};

use itertools::Itertools;
use tracing::{debug, warn};

use crate::{
    catalog::{HwDeviceType, Platform, VideoAcceleration},
    codec::{CodecCategory, DisabledCodecs},
};

pub const CAPTURE_OPTIONS_ENV: &str = "VACCEL_CAPTURE_OPTIONS";
pub const WRITER_OPTIONS_ENV: &str = "VACCEL_WRITER_OPTIONS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Decode,
    Encode,
}

impl Direction {
    pub fn category(self) -> CodecCategory {
        match self {
            Direction::Decode => CodecCategory::Decoder,
            Direction::Encode => CodecCategory::Encoder,
        }
    }

    fn candidates_key(self, acceleration: VideoAcceleration) -> String {
        match self {
            Direction::Decode => format!("hw_decoders_{}", acceleration.name()),
            Direction::Encode => format!("hw_encoders_{}", acceleration.name()),
        }
    }

    fn disabled_codecs_key(self) -> &'static str {
        match self {
            Direction::Decode => "hw_disable_decoders",
            Direction::Encode => "hw_disabled_encoders",
        }
    }

    fn options_env(self) -> &'static str {
        match self {
            Direction::Decode => CAPTURE_OPTIONS_ENV,
            Direction::Encode => WRITER_OPTIONS_ENV,
        }
    }
}

/// String options overriding the built-in candidate tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccelerationConfig {
    values: HashMap<String, String>,
}

impl AccelerationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parses `key;value|key;value`. Entries without a `;` are skipped.
    pub fn parse(options: &str) -> Self {
        let values = options
            .split('|')
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match entry.split_once(';') {
                Some((key, value)) => Some((key.to_owned(), value.to_owned())),
                None => {
                    warn!("Ignoring malformed acceleration option: {entry:?}");
                    None
                }
            })
            .collect();
        Self { values }
    }

    /// Reads the options of `direction` from the environment. Unset or
    /// non-unicode variables give an empty config.
    pub fn from_env(direction: Direction) -> Self {
        match env::var(direction.options_env()) {
            Ok(options) => Self::parse(&options),
            Err(_) => Self::default(),
        }
    }

    pub fn candidates(&self, direction: Direction, acceleration: VideoAcceleration) -> Option<&str> {
        self.get(&direction.candidates_key(acceleration))
    }

    pub fn disabled_codecs(&self, direction: Direction) -> Option<&str> {
        self.get(direction.disabled_codecs_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Plain software codec.
    Software,
    Hardware {
        /// Entry as written in the candidate list.
        spec: String,
        /// `HwDeviceType::None` for unknown backend names.
        device_type: HwDeviceType,
        /// Device name substring, empty for any device.
        device_filter: String,
    },
}

impl Candidate {
    fn parse(spec: &str) -> Self {
        let (name, filter) = spec.split_once('.').unwrap_or((spec, ""));
        Candidate::Hardware {
            spec: spec.to_owned(),
            device_type: HwDeviceType::find_by_name(name),
            device_filter: filter.to_owned(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Software => f.write_str("none"),
            Candidate::Hardware { spec, .. } => f.write_str(spec),
        }
    }
}

/// Iterates acceleration candidates in priority order.
#[derive(Debug, Clone)]
pub struct AccelerationCandidates {
    candidates: std::vec::IntoIter<Candidate>,
    disabled: DisabledCodecs,
}

impl AccelerationCandidates {
    pub fn new(
        acceleration: VideoAcceleration,
        direction: Direction,
        config: &AccelerationConfig,
        platform: Platform,
    ) -> Self {
        if acceleration == VideoAcceleration::None {
            return Self {
                candidates: vec![Candidate::Software].into_iter(),
                disabled: DisabledCodecs::default(),
            };
        }

        let list = config
            .candidates(direction, acceleration)
            .unwrap_or_else(|| default_candidates(platform, direction, acceleration));
        let mut candidates: Vec<Candidate> = list
            .split(',')
            .map(str::trim)
            .filter(|spec| !spec.is_empty())
            .map(Candidate::parse)
            .collect();
        if acceleration == VideoAcceleration::Any {
            candidates.push(Candidate::Software);
        }

        let disabled = DisabledCodecs::parse(
            config
                .disabled_codecs(direction)
                .unwrap_or_else(|| default_disabled_codecs(platform, direction)),
        );
        debug!(
            "Acceleration candidates for {acceleration} ({direction:?}): [{}], disabled codecs: [{disabled}]",
            candidates.iter().join(", ")
        );

        Self {
            candidates: candidates.into_iter(),
            disabled,
        }
    }

    pub fn disabled_codecs(&self) -> &DisabledCodecs {
        &self.disabled
    }
}

impl Iterator for AccelerationCandidates {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        self.candidates.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.candidates.size_hint()
    }
}

fn default_candidates(
    platform: Platform,
    direction: Direction,
    acceleration: VideoAcceleration,
) -> &'static str {
    use VideoAcceleration as Va;
    match (platform, direction, acceleration) {
        (Platform::Windows, Direction::Decode, Va::Any | Va::D3d11) => "d3d11va",
        (Platform::Windows, Direction::Encode, Va::Any | Va::Mfx) => "qsv",
        (Platform::Windows, _, _) => "",
        (_, Direction::Decode, Va::Any | Va::Vaapi) => "vaapi.iHD",
        (_, Direction::Encode, Va::Any) => "qsv.iHD,vaapi.iHD",
        (_, Direction::Encode, Va::Vaapi) => "vaapi.iHD",
        (_, Direction::Encode, Va::Mfx) => "qsv.iHD",
        _ => "",
    }
}

fn default_disabled_codecs(platform: Platform, direction: Direction) -> &'static str {
    match (platform, direction) {
        (Platform::Windows, Direction::Decode) => "none",
        (Platform::Windows, Direction::Encode) => "mjpeg_qsv",
        (_, Direction::Decode) => "av1.vaapi,av1_qsv,vp8.vaapi,vp8_qsv",
        (_, Direction::Encode) => "mjpeg_vaapi,mjpeg_qsv,vp8_vaapi",
    }
}
