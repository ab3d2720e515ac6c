//! Access grants.
//!
//! A grant is the server-side record that a commitment is entitled to a
//! creator's tier until `valid_until`. There is at most one grant per
//! (commitment, creator); a new payment renews it in place.

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};

use veil_core::{Commitment, CreatorId, TierId};

use crate::error::{PermsError, Result};

/// How long one payment extends a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPeriod {
    /// Calendar months; the day of month is clamped at month end.
    Months(u32),
    /// Whole days.
    Days(u32),
}

impl SubscriptionPeriod {
    /// `start + self`, or `None` if out of calendar range.
    pub fn add_to(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            SubscriptionPeriod::Months(n) => start.checked_add_months(Months::new(n)),
            SubscriptionPeriod::Days(n) => start.checked_add_days(Days::new(u64::from(n))),
        }
    }
}

impl Default for SubscriptionPeriod {
    fn default() -> Self {
        SubscriptionPeriod::Months(1)
    }
}

/// A time-bounded entitlement of a commitment to a creator's tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub commitment: Commitment,
    pub creator_id: CreatorId,
    pub tier_id: TierId,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub revoked: bool,
}

impl AccessGrant {
    /// Check if this grant is currently valid.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.valid_until
    }

    /// Issue or extend the grant for a confirmed payment.
    ///
    /// `valid_until = max(now, current valid_until) + period`. A live grant
    /// keeps its `valid_from`; an expired or revoked one starts over at
    /// `now`. The paid tier replaces any previous tier.
    pub fn renew(
        existing: Option<&AccessGrant>,
        commitment: Commitment,
        creator_id: CreatorId,
        tier_id: TierId,
        period: SubscriptionPeriod,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let (valid_from, base) = match existing {
            Some(current) if current.is_valid(now) => (current.valid_from, current.valid_until),
            _ => (now, now),
        };
        let valid_until = period.add_to(base).ok_or(PermsError::PeriodOverflow)?;

        Ok(Self {
            commitment,
            creator_id,
            tier_id,
            valid_from,
            valid_until,
            revoked: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn fresh(now: DateTime<Utc>) -> AccessGrant {
        AccessGrant::renew(
            None,
            Commitment::from_bytes([1; 32]),
            CreatorId::from("c"),
            TierId::from("basic"),
            SubscriptionPeriod::default(),
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_first_payment_one_month() {
        let grant = fresh(at(2025, 1, 15));
        assert_eq!(grant.valid_from, at(2025, 1, 15));
        assert_eq!(grant.valid_until, at(2025, 2, 15));
        assert!(grant.is_valid(at(2025, 2, 14)));
        assert!(!grant.is_valid(at(2025, 2, 15)));
    }

    #[test]
    fn test_month_end_clamps() {
        let grant = fresh(at(2025, 1, 31));
        assert_eq!(grant.valid_until, at(2025, 2, 28));
    }

    #[test]
    fn test_renewal_extends_from_current_end() {
        let first = fresh(at(2025, 1, 1));
        let renewed = AccessGrant::renew(
            Some(&first),
            first.commitment,
            first.creator_id.clone(),
            TierId::from("gold"),
            SubscriptionPeriod::default(),
            at(2025, 1, 20),
        )
        .unwrap();

        assert_eq!(renewed.valid_from, at(2025, 1, 1));
        assert_eq!(renewed.valid_until, at(2025, 3, 1));
        assert_eq!(renewed.tier_id.as_str(), "gold");
    }

    #[test]
    fn test_renewal_after_expiry_starts_now() {
        let first = fresh(at(2025, 1, 1));
        let later = at(2025, 6, 10);
        let renewed = AccessGrant::renew(
            Some(&first),
            first.commitment,
            first.creator_id.clone(),
            first.tier_id.clone(),
            SubscriptionPeriod::Days(30),
            later,
        )
        .unwrap();

        assert_eq!(renewed.valid_from, later);
        assert_eq!(renewed.valid_until, at(2025, 7, 10));
    }

    #[test]
    fn test_revoked_is_invalid_and_resets() {
        let mut grant = fresh(at(2025, 1, 1));
        grant.revoked = true;
        assert!(!grant.is_valid(at(2025, 1, 2)));

        let renewed = AccessGrant::renew(
            Some(&grant),
            grant.commitment,
            grant.creator_id.clone(),
            grant.tier_id.clone(),
            SubscriptionPeriod::default(),
            at(2025, 1, 10),
        )
        .unwrap();
        assert!(!renewed.revoked);
        assert_eq!(renewed.valid_from, at(2025, 1, 10));
        assert_eq!(renewed.valid_until, at(2025, 2, 10));
    }

    #[test]
    fn test_period_serde() {
        let json = serde_json::to_string(&SubscriptionPeriod::Months(3)).unwrap();
        assert_eq!(json, r#"{"months":3}"#);
    }
}
