use chrono::{DateTime, NaiveDate, Utc};

use super::outcome::{Denial, Eligibility};
use super::policy::{ceil_seconds, AdPolicy};
use crate::db::Account;

/// Pre-issuance gate. Rules run in order and the first failure wins:
/// account exists, account is active, daily quota, cooldown.
pub fn evaluate(
    account: Option<&Account>,
    now: DateTime<Utc>,
    today: NaiveDate,
    policy: &AdPolicy,
) -> Eligibility {
    let Some(account) = account else {
        return Eligibility::Denied(Denial::NoAccount);
    };

    if !account.is_active() {
        return Eligibility::Denied(Denial::AccountInactive);
    }

    if account.ads_on(today) >= policy.daily_max_sessions {
        return Eligibility::Denied(Denial::DailyLimitReached);
    }

    if let Some(last_ad_at) = account.last_ad_at {
        let since_last = now - last_ad_at;
        if since_last < policy.cooldown {
            return Eligibility::Denied(Denial::Cooldown {
                remaining_seconds: ceil_seconds(policy.cooldown - since_last),
            });
        }
    }

    Eligibility::Eligible
}
