//! Compression settings and quality bounds.

use serde::{Deserialize, Serialize};

use crate::encode::FormatPolicy;
use crate::error::ConvertError;

/// Lowest quality the encoder will ever use.
pub const MIN_QUALITY: f32 = 0.05;
/// Highest quality the encoder will ever use.
pub const MAX_QUALITY: f32 = 1.0;
/// Quality used for initial conversions and the size-search fast path.
pub const DEFAULT_QUALITY: f32 = 0.8;

/// Clamp a quality into `[MIN_QUALITY, MAX_QUALITY]`.
///
/// NaN maps to `MIN_QUALITY`.
pub fn clamp_quality(quality: f32) -> f32 {
    if quality.is_nan() {
        return MIN_QUALITY;
    }
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

/// Tunables for converting items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    /// Quality for plain conversions and the search fast path.
    pub default_quality: f32,
    /// Number of encode probes the size search performs.
    pub probe_budget: u32,
    /// Amount the search moves a bound past the probed quality.
    pub bracket_step: f32,
    /// Formats to try, in order.
    pub formats: FormatPolicy,
    /// Appended to the source file stem when naming outputs.
    pub name_suffix: String,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            default_quality: DEFAULT_QUALITY,
            probe_budget: 12,
            bracket_step: 0.02,
            formats: FormatPolicy::compress(),
            name_suffix: "-compressed".to_string(),
        }
    }
}

impl CompressionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every value is usable.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.default_quality) {
            return Err(ConvertError::InvalidSettings(format!(
                "default_quality {} outside [{}, {}]",
                self.default_quality, MIN_QUALITY, MAX_QUALITY
            )));
        }
        if self.probe_budget == 0 {
            return Err(ConvertError::InvalidSettings(
                "probe_budget must be at least 1".to_string(),
            ));
        }
        if !(0.0..0.5).contains(&self.bracket_step) {
            return Err(ConvertError::InvalidSettings(format!(
                "bracket_step {} outside [0, 0.5)",
                self.bracket_step
            )));
        }
        if self.name_suffix.contains(['/', '\\']) {
            return Err(ConvertError::InvalidSettings(
                "name_suffix must not contain path separators".to_string(),
            ));
        }
        Ok(())
    }
}

/// A byte budget for size-targeted conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSize {
    bytes: u64,
}

impl TargetSize {
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// Convert a kilobyte value (1 KB = 1024 bytes) to a budget.
    ///
    /// # Errors
    ///
    /// `InvalidTarget` for zero, negative, NaN or infinite values.
    pub fn from_kb(kb: f64) -> Result<Self, ConvertError> {
        if !kb.is_finite() || kb <= 0.0 {
            return Err(ConvertError::InvalidTarget(format!(
                "{} is not a positive size in KB",
                kb
            )));
        }
        Ok(Self {
            bytes: (kb * 1024.0).floor() as u64,
        })
    }

    pub fn bytes(self) -> u64 {
        self.bytes
    }
}
