//! Media-domain types shared by the proxy and the compatibility supervisor.
//!
//! Enums serialize in lowercase and implement `Display` manually for
//! consistent string representation in URLs, job ids and ffmpeg arguments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ---------------------------------------------------------------------------
// CompatMode
// ---------------------------------------------------------------------------

/// How a compatibility rendition is produced from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatMode {
    /// Copy the video stream, re-encode audio only.
    Remux,
    /// Re-encode video and audio.
    Transcode,
}

impl fmt::Display for CompatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remux => write!(f, "remux"),
            Self::Transcode => write!(f, "transcode"),
        }
    }
}

impl FromStr for CompatMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remux" => Ok(Self::Remux),
            "transcode" => Ok(Self::Transcode),
            other => Err(Error::Validation(format!(
                "unknown mode '{other}' (expected remux or transcode)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Bitrate
// ---------------------------------------------------------------------------

/// A bitrate in bits per second, written the way ffmpeg accepts it
/// (`800000`, `800k`, `2.5M`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bitrate(u64);

impl Bitrate {
    /// Construct from kilobits per second.
    pub const fn from_kbps(kbps: u64) -> Self {
        Self(kbps * 1000)
    }

    /// Bits per second.
    pub fn bits_per_sec(self) -> u64 {
        self.0
    }

    /// Scale by a rational factor, rounding down to whole kilobits.
    pub fn scaled(self, num: u64, den: u64) -> Self {
        let bits = self.0.saturating_mul(num) / den.max(1);
        Self(bits - bits % 1000)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 != 0 && self.0 % 1000 == 0 {
            write!(f, "{}k", self.0 / 1000)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for Bitrate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || Error::Validation(format!("invalid bitrate '{s}'"));

        let (number, multiplier) = match s.char_indices().last() {
            Some((i, 'k' | 'K')) => (&s[..i], 1_000f64),
            Some((i, 'm' | 'M')) => (&s[..i], 1_000_000f64),
            Some(_) => (s, 1f64),
            None => return Err(invalid()),
        };

        let value: f64 = number.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid());
        }

        let bits = (value * multiplier).round() as u64;
        if bits == 0 {
            return Err(invalid());
        }
        Ok(Self(bits))
    }
}

impl TryFrom<String> for Bitrate {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bitrate> for String {
    fn from(value: Bitrate) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compat_mode_display_and_parse() {
        assert_eq!(CompatMode::Remux.to_string(), "remux");
        assert_eq!(CompatMode::Transcode.to_string(), "transcode");
        assert_eq!("Remux".parse::<CompatMode>().unwrap(), CompatMode::Remux);
        assert_eq!(" transcode ".parse::<CompatMode>().unwrap(), CompatMode::Transcode);
        assert!("copy".parse::<CompatMode>().is_err());
    }

    #[test]
    fn compat_mode_serde() {
        let json = serde_json::to_string(&CompatMode::Transcode).unwrap();
        assert_eq!(json, r#""transcode""#);
        let back: CompatMode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CompatMode::Transcode);
    }

    #[test]
    fn bitrate_parse_suffixes() {
        assert_eq!("800k".parse::<Bitrate>().unwrap().bits_per_sec(), 800_000);
        assert_eq!("2.5M".parse::<Bitrate>().unwrap().bits_per_sec(), 2_500_000);
        assert_eq!("128000".parse::<Bitrate>().unwrap().bits_per_sec(), 128_000);
        assert_eq!("96K".parse::<Bitrate>().unwrap(), Bitrate::from_kbps(96));
    }

    #[test]
    fn bitrate_rejects_garbage() {
        assert!("".parse::<Bitrate>().is_err());
        assert!("fast".parse::<Bitrate>().is_err());
        assert!("-5k".parse::<Bitrate>().is_err());
        assert!("k".parse::<Bitrate>().is_err());
    }

    #[test]
    fn bitrate_display_prefers_kilobits() {
        assert_eq!(Bitrate::from_kbps(2500).to_string(), "2500k");
        assert_eq!("2.5M".parse::<Bitrate>().unwrap().to_string(), "2500k");
        assert_eq!("1500".parse::<Bitrate>().unwrap().to_string(), "1500");
    }

    #[test]
    fn bitrate_scaled() {
        let b = Bitrate::from_kbps(1800);
        assert_eq!(b.scaled(3, 2), Bitrate::from_kbps(2700));
    }

    #[test]
    fn bitrate_serde_as_string() {
        let json = serde_json::to_string(&Bitrate::from_kbps(128)).unwrap();
        assert_eq!(json, r#""128k""#);
        let back: Bitrate = serde_json::from_str(r#""3M""#).unwrap();
        assert_eq!(back, Bitrate::from_kbps(3000));
    }
}
