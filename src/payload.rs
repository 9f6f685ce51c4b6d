//! Recovery of the history payload embedded in the page HTML.
//!
//! The history page pushes its data as hex-escaped string literals
//! (`initialData.push({..., data: '\x7b...'})`). Payloads sometimes carry
//! unescaped quotes (song titles with quotation marks) or arrive truncated,
//! so decoding is followed by two best-effort repairs: a quote-repair scan
//! and a bracket-balancing pass. Repaired JSON is only accepted when it
//! carries one of the structural markers of a history listing; anything else
//! is rejected rather than returned.

use anyhow::{Result, bail};
use serde_json::Value;

const PUSH_MARKER: &str = "initialData.push(";
const DATA_KEY: &str = "data:";

const HISTORY_MARKERS: &[&str] = &[
    "singleColumnBrowseResultsRenderer",
    "musicShelfRenderer",
    "FEmusic_history",
];

/// Returns the first embedded payload that parses (possibly after repair)
/// and looks like a history listing.
pub fn extract_initial_data(html: &str) -> Result<Value> {
    for blob in find_data_blobs(html) {
        let decoded = decode_hex_escapes(blob);
        if !(decoded.starts_with('{') || decoded.starts_with('[')) {
            continue;
        }
        let parsed = match serde_json::from_str::<Value>(&repair_quotes(&decoded)) {
            Ok(value) => value,
            Err(err) => {
                log::debug!("strict parse failed ({err}), retrying with balanced brackets");
                let balanced = balance_brackets(&decoded);
                match serde_json::from_str::<Value>(&balanced) {
                    Ok(value) => value,
                    Err(err) => {
                        log::debug!("candidate rejected after bracket repair: {err}");
                        continue;
                    }
                }
            }
        };
        if has_history_markers(&parsed) {
            return Ok(parsed);
        }
        log::debug!("candidate parsed but carries no history markers");
    }
    bail!("no history payload located")
}

/// Hex-escaped string literals pushed into `initialData`, in page order.
/// The `data:` key must appear inside the pushed object literal.
fn find_data_blobs(html: &str) -> Vec<&str> {
    let mut blobs = Vec::new();
    let mut cursor = 0;
    while let Some(found) = html[cursor..].find(PUSH_MARKER) {
        let start = cursor + found + PUSH_MARKER.len();
        cursor = start;
        let rest = &html[start..];
        if !rest.starts_with('{') {
            continue;
        }
        let Some(data_at) = rest.find(DATA_KEY) else {
            continue;
        };
        if rest[..data_at].contains('}') {
            continue;
        }
        let after = rest[data_at + DATA_KEY.len()..].trim_start();
        let Some(literal) = after.strip_prefix('\'') else {
            continue;
        };
        let Some(end) = literal.find('\'') else {
            continue;
        };
        blobs.push(&literal[..end]);
    }
    blobs
}

/// Replaces every `\xHH` escape with the byte it names; everything else is
/// copied through untouched.
pub fn decode_hex_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find("\\x") {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);
        let byte = tail
            .get(2..4)
            .filter(|hex| hex.chars().all(|ch| ch.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match byte {
            Some(byte) => {
                out.push(char::from(byte));
                rest = &tail[4..];
            }
            None => {
                out.push_str("\\x");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escapes interior quotes the source page failed to escape.
///
/// Small state machine over (in-string, escape, delimiter): a delimiter seen
/// inside a string only terminates it when the next significant character is
/// one of `, } ] :` or end of input; otherwise it must be a literal quote in
/// the string value and gets a backslash. Never touches braces or brackets.
pub fn repair_quotes(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escape_next = false;
    let mut delimiter = '"';
    for (i, &ch) in chars.iter().enumerate() {
        if escape_next {
            out.push(ch);
            escape_next = false;
            continue;
        }
        if ch == '\\' {
            out.push(ch);
            escape_next = true;
            continue;
        }
        if !in_string {
            if ch == '"' || ch == '\'' {
                in_string = true;
                delimiter = ch;
            }
            out.push(ch);
        } else if ch == delimiter {
            if closes_string(&chars, i + 1) {
                in_string = false;
                out.push(ch);
            } else {
                out.push('\\');
                out.push(ch);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn closes_string(chars: &[char], mut next: usize) -> bool {
    while next < chars.len() && chars[next].is_whitespace() {
        next += 1;
    }
    match chars.get(next) {
        None => true,
        Some(ch) => matches!(ch, ',' | '}' | ']' | ':'),
    }
}

/// Drops a single trailing comma and appends whatever `}` / `]` characters
/// are needed to equalize open and close counts.
pub fn balance_brackets(decoded: &str) -> String {
    let mut cleaned = decoded.trim().to_string();
    if cleaned.ends_with(',') {
        cleaned.pop();
    }
    let missing_braces = cleaned
        .matches('{')
        .count()
        .saturating_sub(cleaned.matches('}').count());
    let missing_brackets = cleaned
        .matches('[')
        .count()
        .saturating_sub(cleaned.matches(']').count());
    for _ in 0..missing_braces {
        cleaned.push('}');
    }
    for _ in 0..missing_brackets {
        cleaned.push(']');
    }
    cleaned
}

fn has_history_markers(parsed: &Value) -> bool {
    let serialized = serde_json::to_string(parsed).unwrap_or_default();
    HISTORY_MARKERS
        .iter()
        .any(|marker| serialized.contains(marker))
}
