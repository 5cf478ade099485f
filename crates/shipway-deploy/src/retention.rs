use chrono::{Duration, Months, NaiveDateTime};

use shipway_core::ReleaseId;

/// What happens to one old release directory during cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDecision {
    OlderThanMonth,
    ReplacedSameDay,
    Stays,
}

impl RetentionDecision {
    pub fn is_delete(self) -> bool {
        matches!(self, Self::OlderThanMonth | Self::ReplacedSameDay)
    }

    /// The phrase logged after the directory name.
    pub fn describe(self) -> &'static str {
        match self {
            Self::OlderThanMonth => "is older than a month",
            Self::ReplacedSameDay => "was replaced the same day",
            Self::Stays => "stays",
        }
    }
}

/// Applies the retention policy to an ascending release listing. The newest
/// two releases are never candidates and do not appear in the result: the
/// live release must stay and the one before it is the rollback target.
///
/// Candidates older than a month go. Candidates between a week and a month
/// old go only when the next candidate landed on the same calendar day, so
/// one deployment per day survives from that period.
pub fn plan_retention(
    releases: &[ReleaseId],
    now: NaiveDateTime,
) -> Vec<(ReleaseId, RetentionDecision)> {
    let Some(kept) = releases.len().checked_sub(2).filter(|count| *count > 0) else {
        return Vec::new();
    };
    let candidates = &releases[..kept];

    let (Some(month_ago), Some(week_ago)) = (
        now.checked_sub_months(Months::new(1)),
        now.checked_sub_signed(Duration::weeks(1)),
    ) else {
        return Vec::new();
    };

    let mut plan = Vec::with_capacity(candidates.len());
    for (index, release) in candidates.iter().enumerate() {
        let timestamp = release.timestamp();
        let decision = if timestamp < month_ago {
            RetentionDecision::OlderThanMonth
        } else if timestamp < week_ago {
            match candidates.get(index + 1) {
                Some(next) if next.timestamp().date() == timestamp.date() => {
                    RetentionDecision::ReplacedSameDay
                }
                _ => RetentionDecision::Stays,
            }
        } else {
            RetentionDecision::Stays
        };
        plan.push((release.clone(), decision));
    }
    plan
}
