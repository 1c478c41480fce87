//! "On this day" candidate selection.
//!
//! Each publish cycle picks one not-yet-published feed entry. Dated entries
//! compete on how close their original month/day/time-of-day lies to the
//! current moment (their year is swapped onto today's date before
//! comparing), which makes the stream favor anniversary-style reposts.
//! Entries with missing or garbage dates are never stuck: they ride along
//! in every candidate pool as fallback.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::feed::FeedEntry;

/// Build the pool of entries eligible for this cycle.
///
/// Entries whose name is in `published` are dropped. Among the remaining
/// dated entries the one closest to `now` (year-adjusted) wins, and every
/// dated entry whose original published timestamp is exactly equal to the
/// winner's joins it; all undated entries join unconditionally.
///
/// The tie rule is deliberately exact-timestamp equality, not equality of
/// the adjusted-year difference. Entries from different years that land on
/// the same calendar moment are not pooled together.
pub fn candidate_pool<'a>(
    entries: &'a [FeedEntry],
    published: &HashSet<String>,
    now: DateTime<Utc>,
) -> Vec<&'a FeedEntry> {
    let filtered: Vec<&FeedEntry> = entries
        .iter()
        .filter(|e| !published.contains(&e.title))
        .collect();

    let mut undated = Vec::new();
    let mut closest: Option<(&FeedEntry, i64)> = None;

    for entry in &filtered {
        let Some(ts) = entry.published.filter(|ts| ts.year() > 1) else {
            undated.push(*entry);
            continue;
        };

        let diff = (this_year_occurrence(ts, now) - ts).num_seconds().abs();
        match closest {
            Some((_, min_diff)) if diff >= min_diff => {}
            _ => closest = Some((entry, diff)),
        }
    }

    let mut pool = Vec::new();
    if let Some((winner, _)) = closest {
        for entry in &filtered {
            if entry.published.is_some() && entry.published == winner.published {
                pool.push(*entry);
            }
        }
    }
    pool.extend(undated);
    pool
}

/// Pick the entry to publish, or `None` when nothing is eligible.
pub fn select_candidate<'a, R: Rng>(
    entries: &'a [FeedEntry],
    published: &HashSet<String>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<&'a FeedEntry> {
    let pool = candidate_pool(entries, published, now);
    let entry = pool.choose(rng).copied()?;

    info!(
        title = %entry.title,
        published = ?entry.published,
        pool_size = pool.len(),
        "Selected entry closest to current date/time (ignoring year)"
    );

    Some(entry)
}

/// The entry's original month/day/time-of-day placed into today's calendar
/// position in its own year.
///
/// Built as day 1 of the month plus an offset so an overflowing day
/// normalizes forward: Feb 29 on a non-leap year becomes Mar 1.
fn this_year_occurrence(published: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let first_of_month = Utc
        .with_ymd_and_hms(
            published.year(),
            now.month(),
            1,
            now.hour(),
            now.minute(),
            now.second(),
        )
        .single();
    match first_of_month {
        Some(dt) => dt + chrono::Duration::days(i64::from(now.day()) - 1),
        None => published,
    }
}
