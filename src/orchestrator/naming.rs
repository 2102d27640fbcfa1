//! Output file naming.

use crate::options::TargetFormat;

/// Replace the extension of `original` with the target format's suffix.
///
/// Only the last extension is replaced. Names without an extension (or
/// dot-files such as `.hidden`) get the suffix appended.
pub fn output_name(original: &str, format: TargetFormat) -> String {
    let stem = match original.rfind('.') {
        Some(index) if index > 0 => &original[..index],
        _ => original,
    };
    format!("{}.{}", stem, format.extension())
}
