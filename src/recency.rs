//! Multilingual classification of the history page's "played at" phrases.
//!
//! The history page groups plays into shelves titled with a localized
//! "Today" / "Yesterday" phrase. Recognition is an exact-match lookup over
//! static phrase tables covering 50+ languages; phrases matching neither
//! table are collected so the tables can grow over time.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use crate::history::PlayRecord;

/// (phrase, BCP 47 language tag). Later entries win on duplicate phrases,
/// so the Cyrillic "Вчера" resolves to Russian rather than Bulgarian.
pub static TODAY_PHRASES: &[(&str, &str)] = &[
    // Latin script
    ("Today", "en"),
    ("Hoy", "es"),
    ("Hoje", "pt"),
    ("Oggi", "it"),
    ("Aujourd'hui", "fr"),
    ("Heute", "de"),
    ("Vandaag", "nl"),
    ("Idag", "sv"),
    ("I dag", "no"),
    ("Tänään", "fi"),
    ("Ma", "et"),
    ("Šodien", "lv"),
    ("Šiandien", "lt"),
    ("Dzisiaj", "pl"),
    ("Dnes", "cs"),
    ("Danes", "sl"),
    ("Astăzi", "ro"),
    ("Täna", "et"),
    ("Bugün", "tr"),
    ("Σήμερα", "el"),
    ("Днес", "bg"),
    ("Данас", "sr"),
    ("Danas", "hr"),
    ("Данеска", "mk"),
    // Cyrillic script
    ("Сегодня", "ru"),
    ("Сьогодні", "uk"),
    ("Сёння", "be"),
    // Arabic script
    ("اليوم", "ar"),
    ("امروز", "fa"),
    ("آج", "ur"),
    // CJK scripts
    ("今天", "zh"),
    ("今日", "ja"),
    ("오늘", "ko"),
    // Indic scripts
    ("आज", "hi"),
    ("আজ", "bn"),
    ("આજે", "gu"),
    ("இன்று", "ta"),
    ("ఈ రోజు", "te"),
    ("ಇಂದು", "kn"),
    ("ഇന്ന്", "ml"),
    ("ਅੱਜ", "pa"),
    // Southeast Asian
    ("วันนี้", "th"),
    ("Hôm nay", "vi"),
    ("Hari ini", "id"),
    ("Ngayong araw", "tl"),
    ("ယနေ့", "my"),
    // African languages
    ("Leo", "sw"),
    ("Vandag", "af"),
    // Other scripts
    ("היום", "he"),
    ("დღეს", "ka"),
    ("այսօր", "hy"),
];

pub static YESTERDAY_PHRASES: &[(&str, &str)] = &[
    // Latin script
    ("Yesterday", "en"),
    ("Ayer", "es"),
    ("Ontem", "pt"),
    ("Ieri", "it"),
    ("Hier", "fr"),
    ("Gestern", "de"),
    ("Gisteren", "nl"),
    ("Igår", "sv"),
    ("I går", "no"),
    ("Eilen", "fi"),
    ("Wczoraj", "pl"),
    ("Včera", "cs"),
    ("Včeraj", "sl"),
    ("Tegnap", "hu"),
    ("Dün", "tr"),
    ("Χθες", "el"),
    ("Вчера", "bg"),
    ("Јуче", "sr"),
    ("Jučer", "hr"),
    // Cyrillic script
    ("Вчера", "ru"),
    ("Вчора", "uk"),
    ("Учора", "be"),
    // Arabic script
    ("أمس", "ar"),
    ("دیروز", "fa"),
    ("کل", "ur"),
    // CJK scripts
    ("昨天", "zh"),
    ("昨日", "ja"),
    ("어제", "ko"),
    // Indic scripts
    ("कल", "hi"), // can mean yesterday or tomorrow; resolved as yesterday
    ("গতকাল", "bn"),
    ("ગઈકાલે", "gu"),
    ("நேற்று", "ta"),
    ("నిన్న", "te"),
    ("ನಿನ್ನೆ", "kn"),
    ("ഇന്നലെ", "ml"),
    ("ਕੱਲ੍ਹ", "pa"),
    // Southeast Asian
    ("เมื่อวาน", "th"),
    ("Hôm qua", "vi"),
    ("Kemarin", "id"),
    ("Semalam", "ms"),
    ("Kahapon", "tl"),
    ("မနေ့က", "my"),
    // African languages
    ("Jana", "sw"),
    ("Gister", "af"),
    // Other scripts
    ("אתמול", "he"),
    ("გუშინ", "ka"),
    ("երեկ", "hy"),
];

static TODAY_INDEX: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| TODAY_PHRASES.iter().copied().collect());

static YESTERDAY_INDEX: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| YESTERDAY_PHRASES.iter().copied().collect());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recency {
    pub is_today: bool,
    pub is_yesterday: bool,
    pub language: Option<&'static str>,
    pub phrase: String,
}

/// Exact-match lookup against the phrase tables, today table first.
/// Case-sensitive; the only normalization is a whitespace trim.
pub fn classify_played_at(played_at: Option<&str>) -> Recency {
    let trimmed = played_at.unwrap_or_default().trim();
    if let Some(&language) = TODAY_INDEX.get(trimmed) {
        return Recency {
            is_today: true,
            is_yesterday: false,
            language: Some(language),
            phrase: trimmed.to_string(),
        };
    }
    if let Some(&language) = YESTERDAY_INDEX.get(trimmed) {
        return Recency {
            is_today: false,
            is_yesterday: true,
            language: Some(language),
            phrase: trimmed.to_string(),
        };
    }
    Recency {
        is_today: false,
        is_yesterday: false,
        language: None,
        phrase: trimmed.to_string(),
    }
}

pub fn played_today(record: &PlayRecord) -> bool {
    classify_played_at(record.played_at.as_deref()).is_today
}

/// Phrases matching neither table, deduplicated, for the run report.
pub fn collect_unknown_phrases(records: &[PlayRecord]) -> Vec<String> {
    let mut unknown = BTreeSet::new();
    for record in records {
        let recency = classify_played_at(record.played_at.as_deref());
        if !recency.is_today && !recency.is_yesterday && !recency.phrase.is_empty() {
            unknown.insert(recency.phrase);
        }
    }
    unknown.into_iter().collect()
}

/// Languages seen among records classified as played today.
pub fn detected_today_languages(records: &[PlayRecord]) -> BTreeSet<&'static str> {
    let mut languages = BTreeSet::new();
    for record in records {
        let recency = classify_played_at(record.played_at.as_deref());
        if !recency.is_today {
            continue;
        }
        if let Some(language) = recency.language {
            languages.insert(language);
        }
    }
    languages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(played_at: Option<&str>) -> PlayRecord {
        PlayRecord {
            title: "Track".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            played_at: played_at.map(str::to_string),
        }
    }

    #[test]
    fn every_today_phrase_classifies_as_today() {
        for (phrase, language) in TODAY_PHRASES {
            let recency = classify_played_at(Some(phrase));
            assert!(recency.is_today, "phrase {phrase:?} should be today");
            assert!(!recency.is_yesterday);
            assert!(recency.language.is_some(), "phrase {phrase:?} ({language})");
        }
    }

    #[test]
    fn every_yesterday_phrase_classifies_as_yesterday() {
        for (phrase, _) in YESTERDAY_PHRASES {
            let recency = classify_played_at(Some(phrase));
            assert!(recency.is_yesterday, "phrase {phrase:?} should be yesterday");
            assert!(!recency.is_today);
        }
    }

    #[test]
    fn unknown_phrase_matches_neither_table() {
        let recency = classify_played_at(Some("Last week"));
        assert!(!recency.is_today);
        assert!(!recency.is_yesterday);
        assert_eq!(recency.language, None);
        assert_eq!(recency.phrase, "Last week");
    }

    #[test]
    fn lookup_trims_surrounding_whitespace() {
        let recency = classify_played_at(Some("  Today \n"));
        assert!(recency.is_today);
        assert_eq!(recency.phrase, "Today");
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(!classify_played_at(Some("today")).is_today);
    }

    #[test]
    fn missing_phrase_yields_empty_result() {
        let recency = classify_played_at(None);
        assert!(!recency.is_today);
        assert!(!recency.is_yesterday);
        assert_eq!(recency.language, None);
        assert_eq!(recency.phrase, "");
    }

    #[test]
    fn hindi_ambiguous_phrase_resolves_to_yesterday() {
        // कल can mean yesterday or tomorrow; the table pins it to yesterday.
        let recency = classify_played_at(Some("कल"));
        assert!(recency.is_yesterday);
        assert_eq!(recency.language, Some("hi"));
    }

    #[test]
    fn shared_cyrillic_phrase_resolves_to_later_table_entry() {
        let recency = classify_played_at(Some("Вчера"));
        assert!(recency.is_yesterday);
        assert_eq!(recency.language, Some("ru"));
    }

    #[test]
    fn unknown_phrases_are_deduplicated() {
        let records = vec![
            record(Some("Last week")),
            record(Some("Last week")),
            record(Some("3 days ago")),
            record(Some("Today")),
            record(None),
        ];
        let unknown = collect_unknown_phrases(&records);
        assert_eq!(unknown, vec!["3 days ago".to_string(), "Last week".to_string()]);
    }

    #[test]
    fn detected_languages_cover_only_today_records() {
        let records = vec![
            record(Some("Today")),
            record(Some("Hoy")),
            record(Some("Yesterday")),
        ];
        let languages = detected_today_languages(&records);
        assert_eq!(languages.into_iter().collect::<Vec<_>>(), vec!["en", "es"]);
    }
}
