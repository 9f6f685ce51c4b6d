//! Fetching the history page.
//!
//! Authentication is a raw browser cookie; the page only renders the
//! signed-in history when the cookie carries the `__Secure-3PAPISID` token.
//! Cookies pasted from browsers routinely contain characters that are not
//! legal in an HTTP header, so the cookie is cleaned and reassembled before
//! use.

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;

pub const HISTORY_URL: &str = "https://music.youtube.com/history";

const REQUIRED_COOKIE_TOKEN: &str = "__Secure-3PAPISID=";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36";

pub fn validate_cookie(cookie: &str) -> Result<()> {
    if !cookie.contains(REQUIRED_COOKIE_TOKEN) {
        bail!(
            "Cookie is missing the required __Secure-3PAPISID token. \
             Copy the complete cookie from your browser."
        );
    }
    Ok(())
}

/// Drops characters that cannot appear in an HTTP header value and
/// collapses whitespace runs to single spaces.
fn sanitize_cookie_header(cookie: &str) -> String {
    let mut out = String::with_capacity(cookie.len());
    let mut pending_space = false;
    for ch in cookie.chars() {
        if (0x100..=0xFFFF).contains(&(ch as u32)) {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

/// Rebuilds the cookie as clean name=value pairs, deduplicating names and
/// injecting the consent cookie (`SOCS=CAI`) when absent; without it the
/// history endpoint redirects to a consent interstitial.
pub fn prepare_cookie_header(cookie: &str) -> String {
    let sanitized = sanitize_cookie_header(cookie);
    let mut pairs: Vec<(String, String)> = Vec::new();
    for pair in sanitized.split(';') {
        let Some((name, value)) = pair.trim().split_once('=') else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        match pairs.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, existing_value)) => *existing_value = value.to_string(),
            None => pairs.push((name.to_string(), value.to_string())),
        }
    }
    if !pairs.iter().any(|(name, _)| name == "SOCS") {
        pairs.push(("SOCS".to_string(), "CAI".to_string()));
    }
    pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Blocking GET of the history page. A 401 is surfaced with the upstream
/// wording so the failure classifier buckets it as an auth failure.
pub fn fetch_history_page(http: &Client, cookie: &str) -> Result<String> {
    validate_cookie(cookie)?;
    let cookie_header = prepare_cookie_header(cookie);
    log::debug!("requesting {HISTORY_URL}");
    let response = http
        .get(HISTORY_URL)
        .header("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
        .header("accept-language", "en-US,en;q=0.9")
        .header("cache-control", "no-cache")
        .header("cookie", cookie_header)
        .header("pragma", "no-cache")
        .header("sec-fetch-dest", "document")
        .header("sec-fetch-mode", "navigate")
        .header("sec-fetch-site", "same-origin")
        .header("upgrade-insecure-requests", "1")
        .header("user-agent", USER_AGENT)
        .send()
        .context("Failed requesting YouTube Music history page")?;
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 UNAUTHENTICATED: Request is missing required authentication credential. \
             Your YouTube Music credentials have expired."
        );
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        bail!("Failed to fetch YouTube Music history page: {status}\n{body}");
    }
    response.text().context("Failed reading history page body")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_without_required_token_is_rejected() {
        let err = validate_cookie("VISITOR_INFO1_LIVE=abc; PREF=f1")
            .expect_err("cookie without token must be rejected");
        assert!(err.to_string().contains("__Secure-3PAPISID"));
    }

    #[test]
    fn cookie_with_required_token_passes() {
        validate_cookie("__Secure-3PAPISID=abc123; PREF=f1").expect("cookie should validate");
    }

    #[test]
    fn preparation_reassembles_pairs_and_injects_consent_cookie() {
        let header = prepare_cookie_header("__Secure-3PAPISID=abc; PREF=f1");
        assert_eq!(header, "__Secure-3PAPISID=abc; PREF=f1; SOCS=CAI");
    }

    #[test]
    fn preparation_keeps_existing_consent_cookie() {
        let header = prepare_cookie_header("SOCS=CAESEwgD; __Secure-3PAPISID=abc");
        assert_eq!(header, "SOCS=CAESEwgD; __Secure-3PAPISID=abc");
    }

    #[test]
    fn preparation_drops_malformed_pairs() {
        let header = prepare_cookie_header("junk; =orphan; __Secure-3PAPISID=abc;");
        assert_eq!(header, "__Secure-3PAPISID=abc; SOCS=CAI");
    }

    #[test]
    fn preparation_deduplicates_names_keeping_the_last_value() {
        let header = prepare_cookie_header("PREF=old; __Secure-3PAPISID=abc; PREF=new");
        assert_eq!(header, "PREF=new; __Secure-3PAPISID=abc; SOCS=CAI");
    }

    #[test]
    fn sanitizer_strips_non_header_characters_and_collapses_whitespace() {
        let cleaned = sanitize_cookie_header("  A=1;\n\t B=ünïcödé\u{0100}\u{FFFF}x  ");
        assert_eq!(cleaned, "A=1; B=ünïcödéx");
    }

    #[test]
    fn values_with_embedded_equals_are_preserved() {
        let header = prepare_cookie_header("__Secure-3PAPISID=a=b=c");
        assert_eq!(header, "__Secure-3PAPISID=a=b=c; SOCS=CAI");
    }
}
