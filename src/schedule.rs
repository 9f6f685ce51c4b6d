//! Decides which of today's plays get submitted, and when.
//!
//! Planning joins today's page-ordered records against the stored positions
//! from previous runs. A track sitting at a lower (more recent) position
//! than last time must have been played again; a track drifting to a higher
//! position merely had newer plays stack up ahead of it. First-time runs
//! submit only a bounded prefix of the history instead of replaying it all.
//!
//! Submission timestamps are spread backwards from `now` so a batch looks
//! like a listening session rather than a single burst.

use std::f64::consts::E;

use crate::history::PlayRecord;
use crate::store::StoredPlay;

pub const MIN_OFFSET_SECONDS: f64 = 30.0;
const FIRST_TIME_WINDOW_SECONDS: f64 = 86_400.0;
const FREE_WINDOW_SECONDS: f64 = 3_600.0;
const PRO_WINDOW_SECONDS: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    NewSong,
    Reproduction,
    PositionUpdate,
    FirstTime,
    FirstTimeNoScrobble,
}

impl Reason {
    pub fn label(self) -> &'static str {
        match self {
            Reason::NewSong => "new_song",
            Reason::Reproduction => "reproduction",
            Reason::PositionUpdate => "position_update",
            Reason::FirstTime => "first_time",
            Reason::FirstTimeNoScrobble => "first_time_no_scrobble",
        }
    }
}

/// One per record in today's history, in page order. Consumed within the
/// run: submitted (maybe) and persisted, never stored itself.
#[derive(Debug, Clone)]
pub struct Decision {
    pub record: PlayRecord,
    /// 1-based page position, 1 = most recent play.
    pub position: i64,
    pub reason: Reason,
    pub should_submit: bool,
    pub previous_position: Option<i64>,
}

pub fn plan_scrobbles(
    today: &[PlayRecord],
    stored: &[StoredPlay],
    first_time: bool,
    max_first_time: usize,
) -> Vec<Decision> {
    let mut decisions = Vec::with_capacity(today.len());
    for (index, record) in today.iter().enumerate() {
        let position = index as i64 + 1;
        let decision = if first_time {
            let submit = index < max_first_time;
            Decision {
                record: record.clone(),
                position,
                reason: if submit {
                    Reason::FirstTime
                } else {
                    Reason::FirstTimeNoScrobble
                },
                should_submit: submit,
                previous_position: None,
            }
        } else {
            match stored.iter().find(|row| row.matches(record)) {
                None => Decision {
                    record: record.clone(),
                    position,
                    reason: Reason::NewSong,
                    should_submit: true,
                    previous_position: None,
                },
                Some(row) if position < row.position => Decision {
                    record: record.clone(),
                    position,
                    reason: Reason::Reproduction,
                    should_submit: true,
                    previous_position: Some(row.position),
                },
                Some(_) => Decision {
                    record: record.clone(),
                    position,
                    reason: Reason::PositionUpdate,
                    should_submit: false,
                    previous_position: None,
                },
            }
        };
        decisions.push(decision);
    }
    decisions
}

/// Unix timestamp for the submission at `index` (0 = most recent) out of
/// `total` submissions in this batch.
///
/// A single submission lands 30 seconds ago. Otherwise the batch spreads
/// over a window: 24h for first-time runs, 1h for free accounts, 5min
/// (linearly spaced) for pro accounts. The logarithmic curve keeps recent
/// plays close together and pushes older ones towards the far edge of the
/// window. Offsets never shrink as `index` grows, so timestamps are
/// non-increasing across a batch and never in the future.
pub fn scrobble_timestamp(
    now: i64,
    index: usize,
    total: usize,
    pro: bool,
    first_time: bool,
) -> i64 {
    if total <= 1 {
        return now - MIN_OFFSET_SECONDS as i64;
    }
    let (window, linear) = if first_time {
        (FIRST_TIME_WINDOW_SECONDS, false)
    } else if !pro {
        (FREE_WINDOW_SECONDS, false)
    } else {
        (PRO_WINDOW_SECONDS, true)
    };
    let offset = if linear {
        MIN_OFFSET_SECONDS + (window / total as f64) * index as f64
    } else {
        let ratio = index as f64 / (total as f64 - 1.0);
        MIN_OFFSET_SECONDS + (window - MIN_OFFSET_SECONDS) * (1.0 + ratio * (E - 1.0)).ln()
    };
    now - offset as i64
}
