//! Output formats and the ordered fallback policy between them.

use serde::{Deserialize, Serialize};

/// An encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    WebP,
    Jpeg,
    Png,
}

impl OutputFormat {
    /// MIME type of the encoded bytes.
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::WebP => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    /// File extension used when naming exported files.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::WebP => "webp",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// Which formats to try, in order.
///
/// The primary format is probed first; the fallback only when the surface
/// cannot produce the primary at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatPolicy {
    pub primary: OutputFormat,
    #[serde(default)]
    pub fallback: Option<OutputFormat>,
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self::compress()
    }
}

impl FormatPolicy {
    /// WebP, falling back to JPEG. Used by the compressor.
    pub fn compress() -> Self {
        Self {
            primary: OutputFormat::WebP,
            fallback: Some(OutputFormat::Jpeg),
        }
    }

    /// WebP only.
    pub fn to_webp() -> Self {
        Self {
            primary: OutputFormat::WebP,
            fallback: None,
        }
    }

    /// PNG only.
    pub fn to_png() -> Self {
        Self {
            primary: OutputFormat::Png,
            fallback: None,
        }
    }

    /// Formats in probe order. A fallback equal to the primary is skipped.
    pub fn order(&self) -> impl Iterator<Item = OutputFormat> {
        let primary = self.primary;
        std::iter::once(primary).chain(self.fallback.filter(|f| *f != primary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_webp_then_jpeg() {
        let order: Vec<_> = FormatPolicy::default().order().collect();
        assert_eq!(order, vec![OutputFormat::WebP, OutputFormat::Jpeg]);
    }

    #[test]
    fn test_duplicate_fallback_is_skipped() {
        let policy = FormatPolicy {
            primary: OutputFormat::Jpeg,
            fallback: Some(OutputFormat::Jpeg),
        };
        assert_eq!(policy.order().count(), 1);
    }

    #[test]
    fn test_extensions_and_mime() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::WebP.mime_type(), "image/webp");
    }
}
