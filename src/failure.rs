//! Failure taxonomy for fetch and scrobble errors.
//!
//! Classification is a plain keyword-membership test over the rendered error
//! message, checked in priority order. Each kind carries a deactivation
//! threshold: the number of consecutive failures after which the owning
//! account should be considered broken rather than unlucky.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    Network,
    Temporary,
    LastFm,
    Unknown,
}

const AUTH_KEYWORDS: &[&str] = &[
    "401",
    "UNAUTHENTICATED",
    "authentication credential",
    "Headers.append",
    "invalid header value",
    "__Secure-3PAPISID",
];

const TEMPORARY_KEYWORDS: &[&str] = &[
    "503",
    "Service Unavailable",
    "502",
    "Bad Gateway",
    "429",
    "Too Many Requests",
    "rate limit",
    "temporarily unavailable",
    "try again later",
];

const NETWORK_KEYWORDS: &[&str] = &[
    "Failed to fetch",
    "network",
    "timeout",
    "ECONNRESET",
    "ENOTFOUND",
    "ConnectionError",
];

const LASTFM_KEYWORDS: &[&str] = &["audioscrobbler", "last.fm", "scrobble"];

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Auth => "AUTH",
            FailureKind::Network => "NETWORK",
            FailureKind::Temporary => "TEMPORARY",
            FailureKind::LastFm => "LASTFM",
            FailureKind::Unknown => "UNKNOWN",
        }
    }

    /// Consecutive failures tolerated before the account should be disabled.
    /// Auth failures are persistent; temporary ones should almost never
    /// deactivate anybody.
    pub fn deactivation_threshold(self) -> u32 {
        match self {
            FailureKind::Auth => 3,
            FailureKind::Network => 8,
            FailureKind::Temporary => 15,
            FailureKind::LastFm => 5,
            FailureKind::Unknown => 7,
        }
    }
}

/// Temporary is checked before Network so that "503" style outages are not
/// swallowed by the broader connectivity keywords.
pub fn classify_error(message: &str) -> FailureKind {
    if matches_any(message, AUTH_KEYWORDS) {
        FailureKind::Auth
    } else if matches_any(message, TEMPORARY_KEYWORDS) {
        FailureKind::Temporary
    } else if matches_any(message, NETWORK_KEYWORDS) {
        FailureKind::Network
    } else if matches_any(message, LASTFM_KEYWORDS) {
        FailureKind::LastFm
    } else {
        FailureKind::Unknown
    }
}

pub fn should_deactivate(kind: FailureKind, consecutive_failures: u32) -> bool {
    consecutive_failures >= kind.deactivation_threshold()
}

fn matches_any(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| message.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_credentials_classify_as_auth() {
        let message = "401 UNAUTHENTICATED: Request is missing required authentication credential.";
        assert_eq!(classify_error(message), FailureKind::Auth);
    }

    #[test]
    fn missing_cookie_token_classifies_as_auth() {
        let message = "Cookie is missing the required __Secure-3PAPISID token.";
        assert_eq!(classify_error(message), FailureKind::Auth);
    }

    #[test]
    fn rate_limit_classifies_as_temporary() {
        assert_eq!(
            classify_error("429 Too Many Requests"),
            FailureKind::Temporary
        );
        assert_eq!(
            classify_error("503 Service Unavailable"),
            FailureKind::Temporary
        );
    }

    #[test]
    fn connectivity_errors_classify_as_network() {
        assert_eq!(classify_error("connection timeout"), FailureKind::Network);
        assert_eq!(classify_error("ECONNRESET"), FailureKind::Network);
    }

    #[test]
    fn sink_rejections_classify_as_lastfm() {
        assert_eq!(
            classify_error("last.fm API error 13: Invalid method signature supplied"),
            FailureKind::LastFm
        );
        assert_eq!(
            classify_error("scrobble rejected (code 1): Artist was ignored"),
            FailureKind::LastFm
        );
    }

    #[test]
    fn unmatched_messages_classify_as_unknown() {
        assert_eq!(classify_error("something odd happened"), FailureKind::Unknown);
    }

    #[test]
    fn auth_beats_lastfm_when_both_match() {
        // A 401 from the scrobble endpoint must still abort the run.
        let message = "last.fm returned 401 UNAUTHENTICATED";
        assert_eq!(classify_error(message), FailureKind::Auth);
    }

    #[test]
    fn deactivation_thresholds_apply_at_the_boundary() {
        assert!(!should_deactivate(FailureKind::Auth, 2));
        assert!(should_deactivate(FailureKind::Auth, 3));
        assert!(!should_deactivate(FailureKind::Network, 7));
        assert!(should_deactivate(FailureKind::Network, 8));
        assert!(should_deactivate(FailureKind::Temporary, 15));
        assert!(should_deactivate(FailureKind::LastFm, 5));
        assert!(should_deactivate(FailureKind::Unknown, 7));
    }
}
