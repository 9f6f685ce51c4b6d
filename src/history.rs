//! Walks the recovered payload tree into play records.
//!
//! The history listing has a fixed nested shape: browse results → first tab
//! → section list → shelves, where each shelf is titled with a recency
//! phrase ("Today", "Ayer", ...) and holds one list-item renderer per play.
//! Malformed items are skipped; only a missing top-level path is fatal.

use anyhow::{Result, bail};
use serde_json::Value;

/// Suffix marking auto-generated non-music channels; plays attributed to
/// such a channel are not scrobblable tracks.
pub const TOPIC_CHANNEL_SUFFIX: &str = " - Topic";

const ARTIST_PAGE_TYPE: &str = "MUSIC_PAGE_TYPE_ARTIST";
const ALBUM_PAGE_TYPE: &str = "MUSIC_PAGE_TYPE_ALBUM";

/// One play from the history page. Page order is preserved by the parser:
/// index 0 is the most recently played track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRecord {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub played_at: Option<String>,
}

pub fn parse_history(tree: &Value) -> Result<Vec<PlayRecord>> {
    let sections = tree
        .get("contents")
        .and_then(|value| value.get("singleColumnBrowseResultsRenderer"))
        .and_then(|value| value.get("tabs"))
        .and_then(Value::as_array)
        .and_then(|tabs| tabs.first())
        .and_then(|tab| tab.get("tabRenderer"))
        .and_then(|value| value.get("content"))
        .and_then(|value| value.get("sectionListRenderer"))
        .and_then(|value| value.get("contents"))
        .and_then(Value::as_array);
    let Some(sections) = sections else {
        bail!("no results found in history payload");
    };
    if sections.is_empty() {
        bail!("no results found in history payload");
    }

    let mut records = Vec::new();
    for section in sections {
        let Some(shelf) = section.get("musicShelfRenderer") else {
            continue;
        };
        let played_at = shelf
            .get("title")
            .and_then(|title| title.get("runs"))
            .and_then(Value::as_array)
            .and_then(|runs| runs.first())
            .and_then(|run| run.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let Some(items) = shelf.get("contents").and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            let Some(renderer) = item.get("musicResponsiveListItemRenderer") else {
                continue;
            };
            let Some(columns) = renderer.get("flexColumns").and_then(Value::as_array) else {
                continue;
            };
            let title = find_watch_run(columns);
            let artist = find_browse_run(columns, ARTIST_PAGE_TYPE);
            let (Some(title), Some(artist)) = (title, artist) else {
                continue;
            };
            if artist.ends_with(TOPIC_CHANNEL_SUFFIX) {
                continue;
            }
            let album = find_browse_run(columns, ALBUM_PAGE_TYPE).unwrap_or_else(|| title.clone());
            records.push(PlayRecord {
                title: sanitize_text(&title),
                artist: sanitize_text(&artist),
                album: sanitize_text(&album),
                played_at: played_at.clone(),
            });
        }
    }
    Ok(records)
}

fn column_first_run(column: &Value) -> Option<&Value> {
    column
        .get("musicResponsiveListItemFlexColumnRenderer")?
        .get("text")?
        .get("runs")?
        .as_array()?
        .first()
}

/// The track title is the first text run whose navigation target is a
/// watch action.
fn find_watch_run(columns: &[Value]) -> Option<String> {
    columns.iter().find_map(|column| {
        let run = column_first_run(column)?;
        run.get("navigationEndpoint")?.get("watchEndpoint")?;
        run_text(run)
    })
}

/// Artist and album are text runs navigating to a browse page of the given
/// page type.
fn find_browse_run(columns: &[Value], page_type: &str) -> Option<String> {
    columns.iter().find_map(|column| {
        let run = column_first_run(column)?;
        let config = run
            .get("navigationEndpoint")?
            .get("browseEndpoint")?
            .get("browseEndpointContextSupportedConfigs")?
            .get("browseEndpointContextMusicConfig")?;
        if config.get("pageType")?.as_str()? != page_type {
            return None;
        }
        run_text(run)
    })
}

fn run_text(run: &Value) -> Option<String> {
    run.get("text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Normalizes extracted text: literal `\uXXXX` escapes are decoded, curly
/// punctuation is flattened to ASCII, and control characters plus the two
/// trailing non-characters are dropped.
pub fn sanitize_text(raw: &str) -> String {
    let decoded = decode_unicode_escapes(raw);
    let mut out = String::with_capacity(decoded.len());
    for ch in decoded.chars() {
        match ch {
            '\u{2026}' => out.push_str("..."),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{0000}'..='\u{001F}' | '\u{007F}' | '\u{FFFE}' | '\u{FFFF}' => {}
            _ => out.push(ch),
        }
    }
    out
}

fn decode_unicode_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find("\\u") {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);
        let decoded = tail
            .get(2..6)
            .filter(|hex| hex.chars().all(|ch| ch.is_ascii_hexdigit()))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[6..];
            }
            None => {
                out.push_str("\\u");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    out
}
