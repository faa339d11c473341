//! Deterministic repair of the structuring model's raw response text.
//!
//! ## Why is normalisation necessary?
//!
//! Even well-prompted models occasionally wrap their answer in
//! ` ```json ... ``` ` fences despite the prompt saying "return ONLY valid
//! JSON", and pad it with whitespace. Stripping those artefacts here rather
//! than in the prompt keeps the prompt focused on *what to extract* and
//! gives downstream parsing one predictable input shape.
//!
//! Both routines are total: they never fail, whatever the input. An
//! unparsable result is the *parser's* problem (and the parser repairs it
//! to defaults rather than failing — see [`crate::extract`]).

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

// ── JSON fence stripping ─────────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```json").unwrap());

/// Strip code-fence markers and surrounding whitespace from a raw model
/// response so it can be handed to a JSON parser.
///
/// Absent or empty input yields `"{}"` so the parser sees an empty object
/// rather than erroring on nothing. The output is *syntactically ready*
/// for parsing, not guaranteed valid — callers must tolerate parse
/// failure.
///
/// Idempotent: already-clean text passes through unchanged.
pub fn clean_json(raw: Option<&str>) -> String {
    let Some(s) = raw else {
        return "{}".to_string();
    };
    if s.trim().is_empty() {
        return "{}".to_string();
    }
    let without_tagged = RE_JSON_FENCE.replace_all(s, "");
    without_tagged.replace("```", "").trim().to_string()
}

// ── Date repair ──────────────────────────────────────────────────────────

/// Calendar formats the extractor has been seen to emit. Ordered so the
/// contract format wins outright and day-first beats month-first for the
/// ambiguous slash forms (the receipts this pipeline grew up on are
/// day-first locales).
const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d %B %Y",
    "%B %d, %Y",
];

/// Re-render a date string in canonical `YYYY-MM-DD` form when any known
/// calendar format parses it; otherwise return the input verbatim.
///
/// Never discards: an extracted value that fails to parse is still worth
/// showing to the user, who can correct it in review.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return d.format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────
