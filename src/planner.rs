use chrono::{Datelike, NaiveDate};

/// How much fiat to spend on each pair in this run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PurchasePlan {
    pub fiat_per_pair: f64,
    pub pair_count: usize,
}

impl PurchasePlan {
    /// Fixed mode: every pair gets the full configured amount, the amount
    /// is not divided across pairs.
    pub fn fixed(amount: f64, pair_count: usize) -> Self {
        Self {
            fiat_per_pair: amount,
            pair_count,
        }
    }

    /// Dynamic mode: spread the balance snapshot over the remaining days,
    /// split across all pairs. An insufficient balance is not guarded here;
    /// the exchange rejects orders below its minimum.
    pub fn dynamic(balance: f64, days_left: u32, pair_count: usize) -> Self {
        Self {
            fiat_per_pair: balance / (days_left as f64 * pair_count as f64),
            pair_count,
        }
    }
}

/// Calendar days from `today` until the next occurrence of `target_day`.
/// Wraps into next month using the current month's day count when the
/// target day has already passed. A target day equal to the current day
/// counts as one day remaining, so the divisor can never be zero.
pub fn days_until_next_purchase(today: NaiveDate, target_day: u32) -> u32 {
    let current_day = today.day();
    if target_day > current_day {
        target_day - current_day
    } else if target_day == current_day {
        1
    } else {
        days_in_month(today) - current_day + target_day
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = (date.year(), date.month());
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|date| date.pred_opt())
        .map(|date| date.day())
        .unwrap_or(30)
}
