//! Volume size of a split archive.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

fn size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:-v)?\s*(\d+)\s*([kmg]?)(?:i?b)?\s*$").expect("valid split size pattern")
    })
}

/// Size of each archive volume, 1024-based.
///
/// Accepts compressor notation and human-readable forms: `2g`, `2 GiB`,
/// `500m`, `-v2g`, `1048576`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSize(u64);

impl SplitSize {
    /// 2 GiB volumes
    pub const DEFAULT: SplitSize = SplitSize(2 * GIB);

    pub fn from_bytes(bytes: u64) -> Option<Self> {
        (bytes > 0).then_some(Self(bytes))
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Volume switch for the compressor (`-v2g`)
    pub fn volume_arg(&self) -> String {
        format!("-v{}", self)
    }
}

impl Default for SplitSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for SplitSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = size_pattern()
            .captures(s)
            .ok_or_else(|| format!("invalid split size '{}'", s))?;

        let value: u64 = caps[1]
            .parse()
            .map_err(|_| format!("split size '{}' is too large", s))?;
        let unit = match caps[2].to_ascii_lowercase().as_str() {
            "k" => KIB,
            "m" => MIB,
            "g" => GIB,
            _ => 1,
        };

        let bytes = value
            .checked_mul(unit)
            .ok_or_else(|| format!("split size '{}' is too large", s))?;
        Self::from_bytes(bytes).ok_or_else(|| format!("split size '{}' must be greater than zero", s))
    }
}

/// Compressor notation, using the largest unit that divides exactly.
impl fmt::Display for SplitSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes % GIB == 0 {
            write!(f, "{}g", bytes / GIB)
        } else if bytes % MIB == 0 {
            write!(f, "{}m", bytes / MIB)
        } else if bytes % KIB == 0 {
            write!(f, "{}k", bytes / KIB)
        } else {
            write!(f, "{}b", bytes)
        }
    }
}

impl Serialize for SplitSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SplitSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!("2g".parse::<SplitSize>().unwrap().bytes(), 2 * GIB);
        assert_eq!("2 GiB".parse::<SplitSize>().unwrap().bytes(), 2 * GIB);
        assert_eq!("2GB".parse::<SplitSize>().unwrap().bytes(), 2 * GIB);
        assert_eq!("500m".parse::<SplitSize>().unwrap().bytes(), 500 * MIB);
        assert_eq!("-v2g".parse::<SplitSize>().unwrap().bytes(), 2 * GIB);
        assert_eq!("64k".parse::<SplitSize>().unwrap().bytes(), 64 * KIB);
        assert_eq!("1000".parse::<SplitSize>().unwrap().bytes(), 1000);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!("".parse::<SplitSize>().is_err());
        assert!("0g".parse::<SplitSize>().is_err());
        assert!("2t".parse::<SplitSize>().is_err());
        assert!("two gigs".parse::<SplitSize>().is_err());
        assert!("99999999999999999999g".parse::<SplitSize>().is_err());
    }

    #[test]
    fn test_volume_arg() {
        assert_eq!(SplitSize::DEFAULT.volume_arg(), "-v2g");
        assert_eq!("1536m".parse::<SplitSize>().unwrap().volume_arg(), "-v1536m");
        assert_eq!(SplitSize::from_bytes(1000).unwrap().volume_arg(), "-v1000b");
        assert!(SplitSize::from_bytes(0).is_none());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&SplitSize::DEFAULT).unwrap();
        assert_eq!(json, "\"2g\"");
        let size: SplitSize = serde_json::from_str("\"500 MiB\"").unwrap();
        assert_eq!(size.bytes(), 500 * MIB);
        assert!(serde_json::from_str::<SplitSize>("\"nope\"").is_err());
    }
}
