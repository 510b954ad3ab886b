//! Structural PDF validation
//!
//! Documents are checked against a configurable rule set before upload. Rule
//! evaluation is deterministic and side-effect-free: every rule inspects the
//! raw bytes only. The print rule set is strictly stricter than the digital
//! one, adding the page cap and the left-margin rule on top of everything
//! the digital set checks.

use crate::config::PdfValidationSettings;
use crate::error::{Error, Result};

const MM_PER_POINT: f64 = 25.4 / 72.0;

/// A concrete rule set derived from [`PdfValidationSettings`]
#[derive(Debug, Clone)]
pub struct PdfRules {
    pub allowed_versions: Vec<String>,
    pub max_pages: Option<u32>,
    pub reject_encrypted: bool,
    /// Empty means all fonts pass
    pub font_whitelist: Vec<String>,
    /// Minimum left margin in millimetres; `None` disables the rule
    pub min_margin_left_mm: Option<f64>,
}

impl PdfRules {
    /// Rules applied to documents bound for digital delivery
    pub fn digital(settings: &PdfValidationSettings) -> Self {
        Self {
            allowed_versions: settings.allowed_pdf_versions.clone(),
            max_pages: settings.max_pages_digital,
            reject_encrypted: settings.reject_encrypted,
            font_whitelist: settings.font_whitelist.clone(),
            min_margin_left_mm: None,
        }
    }

    /// Rules applied to print copies; everything digital checks, plus the
    /// page cap and left-margin rule.
    pub fn print(settings: &PdfValidationSettings) -> Self {
        let digital_cap = settings.max_pages_digital.unwrap_or(u32::MAX);
        Self {
            allowed_versions: settings.allowed_pdf_versions.clone(),
            max_pages: Some(settings.max_pages_for_print.min(digital_cap)),
            reject_encrypted: settings.reject_encrypted,
            font_whitelist: settings.font_whitelist.clone(),
            min_margin_left_mm: Some(settings.min_margin_left_mm),
        }
    }
}

/// True if the bytes begin with a PDF header
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Validates PDF bytes against a rule set
#[derive(Debug, Clone, Default)]
pub struct PdfValidator;

impl PdfValidator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate all rules; collects every failed rule rather than stopping
    /// at the first.
    pub fn validate(&self, bytes: &[u8], rules: &PdfRules) -> Result<()> {
        let mut failures = Vec::new();

        if !looks_like_pdf(bytes) {
            return Err(Error::PdfValidationFailed(vec!["not a PDF document".to_string()]));
        }

        match header_version(bytes) {
            Some(version) if rules.allowed_versions.iter().any(|v| v == &version) => {}
            Some(version) => failures.push(format!("PDF version {} is not allowed", version)),
            None => failures.push("unreadable PDF version header".to_string()),
        }

        if !has_eof_marker(bytes) {
            failures.push("missing %%EOF marker".to_string());
        }

        if rules.reject_encrypted && contains_token(bytes, b"/Encrypt") {
            failures.push("document is encrypted".to_string());
        }

        let pages = count_pages(bytes);
        if let Some(max_pages) = rules.max_pages {
            if pages > max_pages {
                failures.push(format!("{} pages exceeds the maximum of {}", pages, max_pages));
            }
        }
        if pages == 0 {
            failures.push("document has no pages".to_string());
        }

        if !rules.font_whitelist.is_empty() {
            for font in base_fonts(bytes) {
                if !rules.font_whitelist.iter().any(|f| f.eq_ignore_ascii_case(&font)) {
                    failures.push(format!("font '{}' is not in the whitelist", font));
                }
            }
        }

        if let Some(min_margin_mm) = rules.min_margin_left_mm {
            if let Some(leftmost_mm) = leftmost_text_position_mm(bytes) {
                if leftmost_mm < min_margin_mm {
                    failures.push(format!(
                        "text starts {:.1}mm from the left edge, minimum is {:.1}mm",
                        leftmost_mm, min_margin_mm
                    ));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::PdfValidationFailed(failures))
        }
    }
}

fn header_version(bytes: &[u8]) -> Option<String> {
    // header is "%PDF-M.m"
    let header = bytes.get(5..8)?;
    let version = std::str::from_utf8(header).ok()?;
    let mut parts = version.splitn(2, '.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    Some(format!("{}.{}", major, minor))
}

fn has_eof_marker(bytes: &[u8]) -> bool {
    let tail_start = bytes.len().saturating_sub(1024);
    contains_token(&bytes[tail_start..], b"%%EOF")
}

fn contains_token(bytes: &[u8], token: &[u8]) -> bool {
    bytes.windows(token.len()).any(|w| w == token)
}

/// Count page objects: occurrences of /Type followed by /Page that is not
/// /Pages (the page-tree node).
fn count_pages(bytes: &[u8]) -> u32 {
    let mut count = 0;
    let mut i = 0;
    while let Some(pos) = find_from(bytes, b"/Type", i) {
        let mut j = pos + b"/Type".len();
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if bytes[j..].starts_with(b"/Page") && !bytes[j + b"/Page".len()..].starts_with(b"s") {
            count += 1;
        }
        i = pos + 1;
    }
    count
}

fn find_from(bytes: &[u8], token: &[u8], from: usize) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(token.len())
        .position(|w| w == token)
        .map(|p| p + from)
}

/// Collect /BaseFont names with any subset prefix ("ABCDEF+") stripped
fn base_fonts(bytes: &[u8]) -> Vec<String> {
    let mut fonts = Vec::new();
    let mut i = 0;
    while let Some(pos) = find_from(bytes, b"/BaseFont", i) {
        let mut j = pos + b"/BaseFont".len();
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'/' {
            j += 1;
            let start = j;
            while j < bytes.len() && !is_pdf_delimiter(bytes[j]) {
                j += 1;
            }
            if let Ok(name) = std::str::from_utf8(&bytes[start..j]) {
                let name = name.rsplit('+').next().unwrap_or(name);
                if !name.is_empty() && !fonts.iter().any(|f| f == name) {
                    fonts.push(name.to_string());
                }
            }
        }
        i = pos + 1;
    }
    fonts
}

fn is_pdf_delimiter(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'/' | b'<' | b'>' | b'[' | b']' | b'(' | b')')
}

/// Leftmost x coordinate of text positioning operators (Td, Tm) in
/// uncompressed content, converted to millimetres. Compressed streams are
/// not inflated; `None` when no text position is visible.
fn leftmost_text_position_mm(bytes: &[u8]) -> Option<f64> {
    let text = String::from_utf8_lossy(bytes);
    let mut recent: Vec<f64> = Vec::new();
    let mut leftmost: Option<f64> = None;

    for token in text.split_ascii_whitespace() {
        if let Ok(number) = token.parse::<f64>() {
            recent.push(number);
            if recent.len() > 6 {
                recent.remove(0);
            }
            continue;
        }
        let x_points = match token {
            // "x y Td"
            "Td" | "TD" if recent.len() >= 2 => Some(recent[recent.len() - 2]),
            // "a b c d e f Tm", e is the x translation
            "Tm" if recent.len() >= 6 => Some(recent[recent.len() - 2]),
            _ => None,
        };
        if let Some(x) = x_points {
            let x_mm = x * MM_PER_POINT;
            leftmost = Some(leftmost.map_or(x_mm, |current: f64| current.min(x_mm)));
        }
        recent.clear();
    }
    leftmost
}
