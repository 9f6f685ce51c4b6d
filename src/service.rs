//! Last.fm submission client.
//!
//! Requests are signed with an md5 digest over the sorted parameters. The
//! scrobble response carries accepted/ignored counts; a submission counts as
//! successful when at least one entry was accepted or none were ignored.
//! An empty 0/0 response means nothing was rejected and is treated as
//! success.

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

pub const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

pub struct ScrobbleClient {
    api_key: String,
    api_secret: String,
    session_key: String,
    http: Client,
    debug_response: bool,
}

impl ScrobbleClient {
    pub fn new(
        api_key: &str,
        api_secret: &str,
        session_key: &str,
        debug_response: bool,
    ) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed building HTTP client")?;
        Ok(Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            session_key: session_key.to_string(),
            http,
            debug_response,
        })
    }

    pub fn scrobble(&self, title: &str, artist: &str, album: &str, timestamp: i64) -> Result<()> {
        let mut params = vec![
            ("method".to_string(), "track.scrobble".to_string()),
            ("artist".to_string(), artist.to_string()),
            ("track".to_string(), title.to_string()),
            ("album".to_string(), album.to_string()),
            ("timestamp".to_string(), timestamp.to_string()),
            ("api_key".to_string(), self.api_key.clone()),
            ("sk".to_string(), self.session_key.clone()),
        ];
        let api_sig = sign_params(&params, &self.api_secret);
        params.push(("api_sig".to_string(), api_sig));
        params.push(("format".to_string(), "json".to_string()));
        let response = self
            .http
            .post(API_URL)
            .form(&params)
            .send()
            .context("Failed sending scrobble request")?;
        let text = response
            .text()
            .context("Failed reading scrobble response")?;
        if self.debug_response {
            eprintln!("Scrobble response: {text}");
        }
        check_api_error(&text)?;
        check_scrobble_result(&text)
    }
}

/// Exchanges username and password for a session key. The session key does
/// not expire, so this runs once and the key is saved to the config.
pub fn fetch_mobile_session(
    api_key: &str,
    api_secret: &str,
    username: &str,
    password: &str,
) -> Result<String> {
    let http = Client::builder()
        .build()
        .context("Failed building HTTP client")?;
    let password_md5 = format!("{:x}", md5::compute(password));
    let auth_token = format!("{:x}", md5::compute(format!("{username}{password_md5}")));
    let mut params = vec![
        ("method".to_string(), "auth.getMobileSession".to_string()),
        ("username".to_string(), username.to_string()),
        ("authToken".to_string(), auth_token),
        ("api_key".to_string(), api_key.to_string()),
    ];
    let api_sig = sign_params(&params, api_secret);
    params.push(("api_sig".to_string(), api_sig));
    params.push(("format".to_string(), "json".to_string()));
    let response = http
        .post(API_URL)
        .form(&params)
        .send()
        .context("Failed requesting mobile session")?;
    let text = response.text().context("Failed reading session response")?;
    check_api_error(&text)?;
    let json: Value = serde_json::from_str(&text).context("Failed parsing session response")?;
    let key = json
        .get("session")
        .and_then(|session| session.get("key"))
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Missing session key in response"))?;
    Ok(key)
}

fn sign_params(params: &[(String, String)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut signature = String::new();
    for (key, value) in sorted {
        signature.push_str(&key);
        signature.push_str(&value);
    }
    signature.push_str(secret);
    format!("{:x}", md5::compute(signature))
}

fn check_api_error(payload: &str) -> Result<()> {
    let json: Value = serde_json::from_str(payload).context("Failed parsing API response")?;
    if let Some(error) = json.get("error") {
        let message = json
            .get("message")
            .and_then(|value| value.as_str())
            .unwrap_or("API error");
        bail!("last.fm API error {error}: {message}");
    }
    Ok(())
}

/// Success rule: accepted > 0 OR ignored == 0. A response reporting zero
/// accepted and zero ignored rejected nothing and passes; zero accepted
/// with at least one ignored is a rejection, surfaced with the ignored
/// code and message.
fn check_scrobble_result(payload: &str) -> Result<()> {
    let Ok(parsed) = serde_json::from_str::<ScrobbleResponse>(payload) else {
        return Ok(());
    };
    let Some(scrobbles) = parsed.scrobbles else {
        return Ok(());
    };
    let accepted = scrobbles.attr.as_ref().map_or(0, |attr| attr.accepted);
    let ignored = scrobbles.attr.as_ref().map_or(0, |attr| attr.ignored);
    if accepted > 0 || ignored == 0 {
        return Ok(());
    }
    let (code, message) = match scrobbles
        .scrobble
        .as_ref()
        .and_then(ScrobbleEntries::first_ignored_message)
    {
        Some(IgnoredMessageField::Object(ignored_message)) => (
            ignored_message
                .code
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            ignored_message
                .text
                .clone()
                .unwrap_or_else(|| "entry ignored".to_string()),
        ),
        Some(IgnoredMessageField::Text(text)) => ("unknown".to_string(), text.clone()),
        Some(IgnoredMessageField::Number(code)) => ("unknown".to_string(), code.to_string()),
        None => ("unknown".to_string(), "entry ignored".to_string()),
    };
    bail!("scrobble rejected (code {code}): {message}");
}

#[derive(Debug, Deserialize)]
struct ScrobbleResponse {
    #[serde(default)]
    scrobbles: Option<Scrobbles>,
}

#[derive(Debug, Deserialize)]
struct Scrobbles {
    #[serde(rename = "@attr")]
    #[serde(default)]
    attr: Option<ScrobbleAttr>,
    #[serde(default)]
    scrobble: Option<ScrobbleEntries>,
}

#[derive(Debug, Deserialize)]
struct ScrobbleAttr {
    #[serde(deserialize_with = "deserialize_u32_string_or_number")]
    accepted: u32,
    #[serde(deserialize_with = "deserialize_u32_string_or_number")]
    ignored: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScrobbleEntries {
    One(ScrobbleEntry),
    Many(Vec<ScrobbleEntry>),
}

impl ScrobbleEntries {
    fn first_ignored_message(&self) -> Option<&IgnoredMessageField> {
        match self {
            ScrobbleEntries::One(entry) => entry.ignored_message.as_ref(),
            ScrobbleEntries::Many(entries) => entries
                .first()
                .and_then(|entry| entry.ignored_message.as_ref()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScrobbleEntry {
    #[serde(rename = "ignoredMessage")]
    #[serde(default)]
    ignored_message: Option<IgnoredMessageField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IgnoredMessageField {
    Object(IgnoredMessage),
    Text(String),
    Number(u32),
}

#[derive(Debug, Deserialize)]
struct IgnoredMessage {
    #[serde(rename = "#text")]
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn deserialize_u32_string_or_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrU32 {
        String(String),
        Number(u32),
    }
    match StringOrU32::deserialize(deserializer)? {
        StringOrU32::String(value) => value.parse::<u32>().map_err(serde::de::Error::custom),
        StringOrU32::Number(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_scrobble_passes() {
        let payload = r#"{"scrobbles": {"@attr": {"accepted": 1, "ignored": 0}}}"#;
        check_scrobble_result(payload).expect("accepted scrobble should pass");
    }

    #[test]
    fn zero_accepted_zero_ignored_counts_as_success() {
        // Nothing was rejected, so nothing failed.
        let payload = r#"{"scrobbles": {"@attr": {"accepted": "0", "ignored": "0"}}}"#;
        check_scrobble_result(payload).expect("0/0 response should pass");
    }

    #[test]
    fn accepted_with_some_ignored_still_passes() {
        let payload = r#"{"scrobbles": {"@attr": {"accepted": 2, "ignored": 1}}}"#;
        check_scrobble_result(payload).expect("partially accepted batch should pass");
    }

    #[test]
    fn ignored_only_response_fails_with_code() {
        let payload = r##"{
            "scrobbles": {
                "@attr": {"accepted": 0, "ignored": 1},
                "scrobble": {"ignoredMessage": {"code": "1", "#text": "Artist was ignored"}}
            }
        }"##;
        let err = check_scrobble_result(payload).expect_err("ignored-only response must fail");
        let message = err.to_string();
        assert!(message.contains("code 1"), "unexpected message: {message}");
        assert!(message.contains("Artist was ignored"));
    }

    #[test]
    fn ignored_entry_list_reports_first_message() {
        let payload = r##"{
            "scrobbles": {
                "@attr": {"accepted": "0", "ignored": "2"},
                "scrobble": [
                    {"ignoredMessage": {"code": "2", "#text": "Track was ignored"}},
                    {"ignoredMessage": {"code": "3", "#text": "Timestamp too old"}}
                ]
            }
        }"##;
        let err = check_scrobble_result(payload).expect_err("ignored batch must fail");
        assert!(err.to_string().contains("code 2"));
    }

    #[test]
    fn api_error_objects_are_surfaced() {
        let payload = r#"{"error": 9, "message": "Invalid session key"}"#;
        let err = check_api_error(payload).expect_err("API error must surface");
        assert!(err.to_string().contains("last.fm API error 9"));
    }

    #[test]
    fn api_payload_without_error_passes() {
        check_api_error(r#"{"scrobbles": {}}"#).expect("clean payload should pass");
    }

    #[test]
    fn signature_is_deterministic_and_key_ordered() {
        let params = vec![
            ("method".to_string(), "track.scrobble".to_string()),
            ("api_key".to_string(), "key".to_string()),
        ];
        let reordered = vec![
            ("api_key".to_string(), "key".to_string()),
            ("method".to_string(), "track.scrobble".to_string()),
        ];
        assert_eq!(
            sign_params(&params, "secret"),
            sign_params(&reordered, "secret")
        );
        assert_eq!(
            sign_params(&params, "secret"),
            format!(
                "{:x}",
                md5::compute("api_keykeymethodtrack.scrobblesecret")
            )
        );
    }
}
