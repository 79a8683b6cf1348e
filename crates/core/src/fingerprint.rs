//! The Fingerprinter (§4.C): a pure, deterministic function from an error
//! input to a stable fingerprint, a coarser pattern hash, and the
//! normalized fields used elsewhere (similarity scoring, group templates).
//!
//! Hashing uses XXH3 (`twox-hash`), a non-cryptographic, stable hash —
//! `blake3` (the only hash the teacher repo depends on) is a cryptographic
//! hash and the wrong tool for a bucket key that must stay bit-identical
//! across restarts but has no adversarial-input requirement.

use regex::Regex;
use std::sync::OnceLock;
use twox_hash::xxh3;

/// Keep at most this many stack frames when normalizing (§4.C rule 2).
const MAX_STACK_FRAMES: usize = 10;

/// Title is truncated to this many characters (§4.C rule 4).
const TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// 16 bytes, hex-encoded (32 hex chars) — XXH3-128.
    pub fingerprint: String,
    /// 8 bytes, hex-encoded (16 hex chars) — XXH3-64.
    pub pattern_hash: String,
    pub normalized_message: String,
    pub normalized_stack: Option<String>,
    pub url_pattern: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorInput<'a> {
    pub message: &'a str,
    pub stack_trace: Option<&'a str>,
    pub url: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

struct Patterns {
    integer: Regex,
    uuid: Regex,
    hex: Regex,
    quoted: Regex,
    absolute_url: Regex,
    path: Regex,
    mem_addr: Regex,
    frame_loc: Regex,
    frame_query: Regex,
    single_letter_fn: Regex,
    anon_frame: Regex,
    url_segment: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        integer: Regex::new(r"\d+").unwrap(),
        uuid: Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap(),
        hex: Regex::new(r"\b[0-9a-f]{8,}\b").unwrap(),
        quoted: Regex::new(r#"'[^']*'|"[^"]*""#).unwrap(),
        absolute_url: Regex::new(r"https?://[^\s)'"]+").unwrap(),
        path: Regex::new(r"(?:/[\w.\-]+){2,}").unwrap(),
        mem_addr: Regex::new(r"0x[0-9a-f]+").unwrap(),
        frame_loc: Regex::new(r":\d+:\d+\)?$").unwrap(),
        frame_query: Regex::new(r"\?[^\s):]*").unwrap(),
        single_letter_fn: Regex::new(r"\bat [a-zA-Z]\b").unwrap(),
        anon_frame: Regex::new(r"(?i)<anonymous>|\banonymous\b").unwrap(),
        url_segment: Regex::new(r"^[0-9a-f-]{8,}$|^\d+$").unwrap(),
    })
}

/// Normalizes a raw error message per §4.C rule 1, applying token
/// replacements in the exact order the spec prescribes.
pub fn normalize_message(message: &str) -> String {
    let p = patterns();
    let mut s = message.trim().to_lowercase();
    s = p.integer.replace_all(&s, "<num>").into_owned();
    s = p.uuid.replace_all(&s, "<uuid>").into_owned();
    s = p.hex.replace_all(&s, "<hex>").into_owned();
    s = p.quoted.replace_all(&s, "<str>").into_owned();
    s = p.absolute_url.replace_all(&s, "<url>").into_owned();
    s = p.path.replace_all(&s, "/<path>").into_owned();
    s = p.mem_addr.replace_all(&s, "<addr>").into_owned();
    s
}

/// Normalizes a stack trace per §4.C rule 2: keep the first N frames, drop
/// line/column numbers and query strings, collapse minified single-letter
/// function names, and truncate anonymous frames.
pub fn normalize_stack(stack_trace: &str) -> String {
    let p = patterns();
    stack_trace
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(MAX_STACK_FRAMES)
        .map(|frame| {
            if p.anon_frame.is_match(frame) {
                return "<anon>".to_string();
            }
            let mut f = frame.to_string();
            f = p.frame_query.replace_all(&f, "").into_owned();
            f = p.frame_loc.replace_all(&f, "").into_owned();
            f = p.single_letter_fn.replace_all(&f, "at <fn>").into_owned();
            f
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalizes a URL per §4.C rule 3: scheme+host kept, parameter-like
/// segments replaced by `:param`, query dropped.
pub fn normalize_url(url: &str) -> String {
    let p = patterns();
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let Some(scheme_end) = without_query.find("://") else {
        return without_query.to_string();
    };
    let (scheme_and_host_start, rest) = without_query.split_at(scheme_end + 3);
    let mut parts = rest.splitn(2, '/');
    let host = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    let normalized_path: Vec<String> = path
        .split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if p.url_segment.is_match(seg) || seg.len() >= 24 {
                ":param".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect();

    if normalized_path.is_empty() {
        format!("{scheme_and_host_start}{host}")
    } else {
        format!("{scheme_and_host_start}{host}/{}", normalized_path.join("/"))
    }
}

/// First 80 chars of the normalized message, up to the first `:` or em
/// dash, per §4.C rule 4.
fn derive_title(normalized_message: &str) -> String {
    let truncated: String = normalized_message.chars().take(TITLE_MAX_CHARS).collect();
    let cut = truncated
        .find(':')
        .into_iter()
        .chain(truncated.find('\u{2014}'))
        .min();
    match cut {
        Some(idx) => truncated[..idx].to_string(),
        None => truncated,
    }
}

/// The substring of the normalized message up to the first `:`, or the
/// whole message if there is none — used as the coarse "error class"
/// component of the pattern hash.
fn error_class_prefix(normalized_message: &str) -> &str {
    match normalized_message.find(':') {
        Some(idx) => &normalized_message[..idx],
        None => normalized_message,
    }
}

fn first_frame(normalized_stack: &str) -> &str {
    normalized_stack.lines().next().unwrap_or("")
}

fn hash_fingerprint(input: &str) -> String {
    let digest = xxh3::hash128(input.as_bytes());
    format!("{digest:032x}")
}

fn hash_pattern(input: &str) -> String {
    let digest = xxh3::hash64(input.as_bytes());
    format!("{digest:016x}")
}

pub struct Fingerprinter;

impl Fingerprinter {
    /// Computes a `Fingerprint` for the given error input. Pure and
    /// deterministic: identical input always yields an identical output,
    /// including across process restarts (S1, invariant 1).
    pub fn compute(input: &ErrorInput<'_>) -> Fingerprint {
        let normalized_message = normalize_message(input.message);
        let normalized_stack = input.stack_trace.map(normalize_stack);
        let url_pattern = input.url.map(|u| normalize_url(u));

        let fingerprint_key = format!(
            "{}|{}|{}",
            normalized_message,
            normalized_stack.as_deref().unwrap_or(""),
            url_pattern.as_deref().unwrap_or("")
        );
        let fingerprint = hash_fingerprint(&fingerprint_key);

        let pattern_key = format!(
            "{}|{}",
            normalized_stack.as_deref().map(first_frame).unwrap_or(""),
            error_class_prefix(&normalized_message)
        );
        let pattern_hash = hash_pattern(&pattern_key);

        let title = derive_title(&normalized_message);

        Fingerprint {
            fingerprint,
            pattern_hash,
            normalized_message,
            normalized_stack,
            url_pattern,
            title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(message: &'a str, stack: Option<&'a str>) -> ErrorInput<'a> {
        ErrorInput {
            message,
            stack_trace: stack,
            url: None,
            user_agent: None,
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let i = input("TypeError: boom", Some("at f (a.js:1:1)"));
        let a = Fingerprinter::compute(&i);
        let b = Fingerprinter::compute(&i);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.pattern_hash, b.pattern_hash);
    }

    #[test]
    fn s1_fingerprint_stable_across_line_numbers() {
        let a = input(
            "TypeError: Cannot read property 'map' of undefined at line 42",
            Some("at f (a.js:10:1)\nat g (a.js:20:2)"),
        );
        let b = input(
            "TypeError: Cannot read property 'map' of undefined at line 7",
            Some("at f (a.js:10:99)\nat g (a.js:20:3)"),
        );
        let fp_a = Fingerprinter::compute(&a);
        let fp_b = Fingerprinter::compute(&b);
        assert_eq!(fp_a.fingerprint, fp_b.fingerprint);
        assert_eq!(fp_a.pattern_hash, fp_b.pattern_hash);
    }

    #[test]
    fn normalize_message_replaces_quoted_strings_and_numbers() {
        let s = normalize_message("Cannot read property 'map' of undefined at line 42");
        assert!(s.contains("<str>"));
        assert!(s.contains("<num>"));
        assert!(!s.contains("42"));
    }

    #[test]
    fn normalize_stack_caps_frame_count() {
        let many = (0..20).map(|i| format!("at f{i} (a.js:{i}:1)")).collect::<Vec<_>>().join("\n");
        let normalized = normalize_stack(&many);
        assert_eq!(normalized.lines().count(), MAX_STACK_FRAMES);
    }

    #[test]
    fn normalize_stack_collapses_single_letter_functions() {
        let normalized = normalize_stack("at f (a.js:10:1)");
        assert!(normalized.contains("<fn>"));
        assert!(!normalized.contains(":10:1"));
    }

    #[test]
    fn normalize_stack_truncates_anonymous_frames() {
        let normalized = normalize_stack("at <anonymous> (a.js:10:1)");
        assert_eq!(normalized, "<anon>");
    }

    #[test]
    fn normalize_url_replaces_numeric_and_long_segments() {
        let normalized = normalize_url("https://api.example.com/users/12345/profile?x=1");
        assert_eq!(normalized, "https://api.example.com/users/:param/profile");
    }

    #[test]
    fn normalize_url_replaces_uuid_segments() {
        let normalized = normalize_url("https://api.example.com/orders/550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(normalized, "https://api.example.com/orders/:param");
    }

    #[test]
    fn title_truncates_at_colon() {
        let title = derive_title("typeerror: cannot read property <str> of undefined");
        assert_eq!(title, "typeerror");
    }

    #[test]
    fn title_falls_back_to_whole_message_without_separator() {
        let title = derive_title("boom");
        assert_eq!(title, "boom");
    }

    #[test]
    fn fingerprint_and_pattern_hash_have_expected_hex_lengths() {
        let fp = Fingerprinter::compute(&input("boom", None));
        assert_eq!(fp.fingerprint.len(), 32);
        assert_eq!(fp.pattern_hash.len(), 16);
    }
}
