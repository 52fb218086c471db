use std::path::Path;

use serde::{Deserialize, Serialize};

pub const FALLBACK_ATTACHMENT_NAME: &str = "attachment";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedAttachment {
    pub name: String,
    pub content: Vec<u8>,
}

impl StagedAttachment {
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentLimits {
    pub max_count: usize,
    pub max_file_size: u64,
    pub max_total_size: u64,
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self { max_count: 20, max_file_size: 10_380_902, max_total_size: 20 * 1024 * 1024 }
    }
}

/// What a user currently has staged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StagingUsage {
    pub count: usize,
    pub total_size: u64,
}

impl AttachmentLimits {
    /// All three limits are checked as if the candidate were already staged.
    pub fn accepts(&self, usage: StagingUsage, candidate_size: u64) -> bool {
        let count_ok = usage.count.saturating_add(1) <= self.max_count;
        let total_ok = usage.total_size.saturating_add(candidate_size) <= self.max_total_size;
        let file_ok = candidate_size <= self.max_file_size;
        count_ok && total_ok && file_ok
    }
}

/// Reduces an uploaded filename to a single safe path component.
pub fn sanitize_filename(raw: &str) -> String {
    let last_segment = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last_segment.chars().filter(|ch| !ch.is_control()).collect();
    let cleaned = cleaned.trim();

    match cleaned {
        "" | "." | ".." => FALLBACK_ATTACHMENT_NAME.to_owned(),
        other => other.to_owned(),
    }
}

/// Picks `name`, or `stem (n).ext` with the lowest free `n`.
pub fn disambiguate_name<F>(name: &str, is_taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    if !is_taken(name) {
        return name.to_owned();
    }

    let path = Path::new(name);
    let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or(name);
    let suffix = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| format!(".{extension}"))
        .unwrap_or_default();

    let mut index = 1u32;
    loop {
        let candidate = format!("{stem} ({index}){suffix}");
        if !is_taken(&candidate) {
            return candidate;
        }
        index += 1;
    }
}

/// Renders a byte count with binary units, e.g. `9.9 MiB`.
pub fn format_byte_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }

    let rendered = format!("{value:.1}");
    let rendered = rendered.strip_suffix(".0").unwrap_or(&rendered);
    format!("{rendered} {unit}")
}
