//! Naming and sizing of converted results for download or archiving.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::encode::OutputFormat;
use crate::item::ItemState;
use crate::ledger::HandleReleaser;
use crate::settings::CompressionSettings;
use crate::working_set::WorkingSet;

/// One file to hand to an archive writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportEntry {
    pub name: String,
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
    pub format: OutputFormat,
}

/// File name for an encoded result: the source stem, `suffix`, then the
/// format's extension.
///
/// Only the last extension is replaced. Names that are all extension, like
/// `.png`, keep their full text as the stem.
pub fn output_file_name(source_name: &str, format: OutputFormat, suffix: &str) -> String {
    format!("{}{}.{}", file_stem(source_name), suffix, format.extension())
}

fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) if name[dot + 1..].contains(['/', '\\']) => name,
        Some(dot) => &name[..dot],
    }
}

/// A custom name with the format's extension, appended if missing.
fn with_extension(name: &str, format: OutputFormat) -> String {
    let ext = format!(".{}", format.extension());
    if name.to_ascii_lowercase().ends_with(&ext) {
        name.to_string()
    } else {
        format!("{}{}", name, ext)
    }
}

/// `photo.webp` -> `photo (2).webp`
fn numbered(name: &str, n: usize) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &name[..dot], n, &name[dot..]),
        _ => format!("{} ({})", name, n),
    }
}

/// Entries for every converted item, in working-set order.
///
/// Names are unique within the returned list.
pub fn export_entries<R: HandleReleaser>(
    set: &WorkingSet<R>,
    settings: &CompressionSettings,
) -> Vec<ExportEntry> {
    let mut taken = HashSet::new();
    set.iter()
        .filter(|item| item.state() == ItemState::Converted)
        .filter_map(|item| {
            let result = item.last_result()?;
            let base = match item.output_name() {
                Some(custom) => with_extension(custom, result.format),
                None => output_file_name(item.source_name(), result.format, &settings.name_suffix),
            };

            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.to_ascii_lowercase()) {
                name = numbered(&base, n);
                n += 1;
            }

            Some(ExportEntry {
                name,
                bytes: result.shared_bytes(),
                format: result.format,
            })
        })
        .collect()
}

/// Human-readable byte count in base-1024 units.
///
/// Bytes are shown whole, larger units with two decimals.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Original versus encoded size of one item or a whole set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    pub original_bytes: u64,
    pub encoded_bytes: u64,
}

impl SizeReport {
    pub fn new(original_bytes: u64, encoded_bytes: u64) -> Self {
        Self {
            original_bytes,
            encoded_bytes,
        }
    }

    /// Totals over the converted items of a set.
    pub fn for_set<R: HandleReleaser>(set: &WorkingSet<R>) -> Self {
        set.iter()
            .filter_map(|item| {
                item.last_result()
                    .map(|result| Self::new(item.original_byte_size(), result.byte_size()))
            })
            .fold(Self::default(), |acc, r| {
                Self::new(
                    acc.original_bytes + r.original_bytes,
                    acc.encoded_bytes + r.encoded_bytes,
                )
            })
    }

    /// Percentage saved, never negative. Zero when either side is empty.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 || self.encoded_bytes == 0 {
            return 0.0;
        }
        let ratio = self.encoded_bytes as f64 / self.original_bytes as f64;
        (100.0 - ratio * 100.0).max(0.0)
    }
}

impl fmt::Display for SizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.original_bytes == 0 || self.encoded_bytes == 0 {
            return write!(f, "Original: 0 KB | Compressed: 0 KB (0%)");
        }
        write!(
            f,
            "Original: {} | Compressed: {} (-{:.0}%)",
            format_bytes(self.original_bytes),
            format_bytes(self.encoded_bytes),
            self.reduction_percent()
        )
    }
}
