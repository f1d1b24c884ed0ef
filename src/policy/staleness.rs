use crate::config::{StalenessConfig, MAX_STALENESS_DAYS};
use crate::policy::ItemState;
use crate::storage::ItemRecord;
use chrono::{DateTime, Duration, Utc};

/// Decides when a mirrored item becomes eligible for refetch
///
/// A source-reported next-update date `D` is trusted while `D + hint_grace`
/// is still ahead; otherwise the record is refreshed `refresh_after` after
/// its last successful fetch. A hint too far out to represent counts as no
/// hint, and the refresh floor saturates at the latest representable time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// Refresh floor for records without a usable hint
    pub refresh_after: Duration,

    /// Added to a hinted next-update date
    pub hint_grace: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            refresh_after: Duration::days(30),
            hint_grace: Duration::days(1),
        }
    }
}

impl StalenessPolicy {
    pub fn from_config(config: &StalenessConfig) -> Self {
        Self {
            refresh_after: Duration::days(config.refresh_after_days.clamp(1, MAX_STALENESS_DAYS)),
            hint_grace: Duration::days(config.hint_grace_days.clamp(0, MAX_STALENESS_DAYS)),
        }
    }

    /// Computes when a record becomes eligible for refetch
    ///
    /// # Arguments
    ///
    /// * `fetched_at` - Time of the last successful fetch
    /// * `hint` - Source-reported next-update date, if any
    /// * `now` - Evaluation time; the orchestrator passes the fetch time
    pub fn next_eligible_at(
        &self,
        fetched_at: DateTime<Utc>,
        hint: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        if let Some(candidate) = hint.and_then(|h| h.checked_add_signed(self.hint_grace)) {
            if candidate > now {
                return candidate;
            }
        }
        fetched_at
            .checked_add_signed(self.refresh_after)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Computes `next_eligible_at` from a record's own fields
    pub fn next_eligible_for(&self, record: &ItemRecord, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_eligible_at(record.fetched_at, record.next_update_hint(), now)
    }

    /// Classifies a key given its stored record (if any)
    pub fn item_state(&self, record: Option<&ItemRecord>, now: DateTime<Utc>) -> ItemState {
        match record {
            None => ItemState::Unseen,
            Some(r) if now >= r.next_eligible_at => ItemState::Stale,
            Some(_) => ItemState::Fresh,
        }
    }

    /// True if the key has never been fetched or its record has gone stale
    pub fn should_fetch(&self, record: Option<&ItemRecord>, now: DateTime<Utc>) -> bool {
        self.item_state(record, now).should_fetch()
    }
}
