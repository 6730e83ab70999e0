//! Retention windows: which calendar dates must keep a backup.
//!
//! Three independent walks start at local midnight of "now" and step back
//! until they pass the earliest backup (less one step) or leave their own
//! window. A window of 0 is unbounded.
//!
//! | Tier    | Step    | Date kept                    | Window          |
//! |---------|---------|------------------------------|-----------------|
//! | Daily   | 1 day   | the midnight itself          | `weeks_to_keep` |
//! | Weekly  | 1 week  | snapped to day 1/8/15/22/29  | `months_to_keep`|
//! | Monthly | 1 month | snapped to day 1             | `years_to_keep` |
//!
//! All times are wall-clock times in the configured zone.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How far back each tier reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Weeks of daily backups (0 = unbounded)
    pub weeks_to_keep: u32,

    /// Months of weekly backups (0 = unbounded)
    pub months_to_keep: u32,

    /// Years of monthly backups (0 = unbounded)
    pub years_to_keep: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            weeks_to_keep: 1,
            months_to_keep: 1,
            years_to_keep: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Daily => write!(f, "daily"),
            Tier::Weekly => write!(f, "weekly"),
            Tier::Monthly => write!(f, "monthly"),
        }
    }
}

/// Deduplicated, ascending set of dates to keep, with the tiers that asked for each
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    dates: BTreeMap<NaiveDate, BTreeSet<Tier>>,
}

impl RetentionPlan {
    fn add(&mut self, date: NaiveDate, tier: Tier) {
        self.dates.entry(date).or_default().insert(tier);
    }

    /// Dates in ascending order
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.dates.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Dates requested by `tier`, ascending
    pub fn dates_for(&self, tier: Tier) -> Vec<NaiveDate> {
        self.dates
            .iter()
            .filter(|(_, tiers)| tiers.contains(&tier))
            .map(|(date, _)| *date)
            .collect()
    }
}

/// Snap a date to the start of its month quartile: 1, 8, 15, 22 or 29.
pub fn quartile_start(date: NaiveDate) -> NaiveDate {
    let start = match date.day() {
        1..=7 => 1,
        8..=14 => 8,
        15..=21 => 15,
        22..=28 => 22,
        _ => 29,
    };
    date - Days::new(u64::from(date.day() - start))
}

/// First day of the date's month
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// `months` months before `from`, or None when 0 (unbounded)
fn months_back(from: NaiveDate, months: u32) -> Option<NaiveDate> {
    if months == 0 {
        return None;
    }
    Some(from.checked_sub_months(Months::new(months)).unwrap_or(NaiveDate::MIN))
}

/// Compute the dates to keep.
///
/// `now` and `earliest_backup` are wall-clock times in the configured zone;
/// `earliest_backup` is the modification time of the oldest backup on disk.
pub fn compute(
    now: NaiveDateTime,
    earliest_backup: NaiveDateTime,
    policy: &RetentionPolicy,
) -> RetentionPlan {
    let today = now.date();
    let mut plan = RetentionPlan::default();

    // Daily
    let floor = earliest_backup - chrono::Duration::days(1);
    let window = if policy.weeks_to_keep == 0 {
        None
    } else {
        Some(
            today
                .checked_sub_days(Days::new(7 * u64::from(policy.weeks_to_keep)))
                .unwrap_or(NaiveDate::MIN),
        )
    };
    let mut cursor = today;
    while midnight(cursor) >= floor && window.map_or(true, |w| cursor >= w) {
        plan.add(cursor, Tier::Daily);
        match cursor.checked_sub_days(Days::new(1)) {
            Some(prev) => cursor = prev,
            None => break,
        }
    }

    // Weekly: the snapped date becomes the cursor for the next step
    let floor = earliest_backup - chrono::Duration::weeks(1);
    let window = months_back(today, policy.months_to_keep);
    let mut cursor = today;
    while midnight(cursor) >= floor && window.map_or(true, |w| cursor >= w) {
        cursor = quartile_start(cursor);
        plan.add(cursor, Tier::Weekly);
        match cursor.checked_sub_days(Days::new(7)) {
            Some(prev) => cursor = prev,
            None => break,
        }
    }

    // Monthly: the cursor keeps any day clamped by a short month
    let floor = earliest_backup
        .checked_sub_months(Months::new(1))
        .unwrap_or(NaiveDateTime::MIN);
    let window = months_back(today, policy.years_to_keep.saturating_mul(12));
    let mut cursor = today;
    while midnight(cursor) >= floor && window.map_or(true, |w| cursor >= w) {
        plan.add(month_start(cursor), Tier::Monthly);
        match cursor.checked_sub_months(Months::new(1)) {
            Some(prev) => cursor = prev,
            None => break,
        }
    }

    tracing::debug!(
        daily = plan.dates_for(Tier::Daily).len(),
        weekly = plan.dates_for(Tier::Weekly).len(),
        monthly = plan.dates_for(Tier::Monthly).len(),
        total = plan.len(),
        "[RETENTION] Computed retention dates"
    );

    plan
}
