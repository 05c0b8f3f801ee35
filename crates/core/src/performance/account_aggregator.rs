//! Value-weighted blending of several accounts into one return series.
//!
//! Weights are pre-change (start-of-day) values. Weighting by the end-of-day
//! value over-weights accounts that gained on that same day.

use chrono::NaiveDate;
use log::warn;
use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::errors::{CalculatorError, Error, Result, ValidationError};

use super::performance_model::{
    AccountDayValue, AccountSeries, Currency, DailyReturnRecord, MultiAccountDailyBlend,
};

/// Value before the day's change: `value / (1 + change / 100)`, or the value
/// itself on a flat day. A -100% day leaves nothing to divide, so its weight
/// is the account's known opening value.
pub fn pre_change_value(account: &AccountDayValue) -> Result<Decimal> {
    let change = account.change_percent;
    if !change.is_finite() {
        return Err(CalculatorError::NonFiniteInput {
            field: "changePercent",
            value: change,
            date: None,
        }
        .into());
    }
    if change < -100.0 {
        return Err(CalculatorError::ChangeBelowTotalLoss {
            change_percent: change,
        }
        .into());
    }
    if account.current_value.is_sign_negative() && !account.current_value.is_zero() {
        return Err(Error::Validation(ValidationError::InvalidInput(format!(
            "Negative account value {}",
            account.current_value
        ))));
    }
    if change == -100.0 {
        return match account.opening_value {
            Some(opening) if opening.is_sign_negative() && !opening.is_zero() => {
                Err(Error::Validation(ValidationError::InvalidInput(format!(
                    "Negative opening value {}",
                    opening
                ))))
            }
            Some(opening) => Ok(opening),
            None => Err(CalculatorError::WipeoutWithoutOpeningValue { date: None }.into()),
        };
    }
    if change == 0.0 {
        return Ok(account.current_value);
    }

    let growth = Decimal::from_f64(1.0 + change / 100.0).ok_or_else(|| {
        CalculatorError::Calculation(format!("cannot represent growth for {}%", change))
    })?;
    account
        .current_value
        .checked_div(growth)
        .ok_or_else(|| CalculatorError::Calculation(format!("pre-change value overflow at {}%", change)).into())
}

/// Blends one date's accounts. Returns 0% when no account held value.
pub fn blend_daily(date: NaiveDate, accounts: &[AccountDayValue]) -> Result<MultiAccountDailyBlend> {
    let mut total_pre_change_value = Decimal::ZERO;
    let mut weighted_sum = 0.0_f64;
    let mut weight_total = 0.0_f64;
    let mut min_change = f64::INFINITY;
    let mut max_change = f64::NEG_INFINITY;

    for account in accounts {
        let pre_change = match pre_change_value(account) {
            Err(Error::Calculation(CalculatorError::WipeoutWithoutOpeningValue { .. })) => {
                return Err(CalculatorError::WipeoutWithoutOpeningValue { date: Some(date) }.into());
            }
            other => other?,
        };
        let weight = pre_change.to_f64().ok_or_else(|| {
            CalculatorError::Calculation(format!("cannot weight value {}", pre_change))
        })?;

        total_pre_change_value += pre_change;
        weighted_sum += weight * account.change_percent;
        weight_total += weight;
        min_change = min_change.min(account.change_percent);
        max_change = max_change.max(account.change_percent);
    }

    let blended_change_percent = if weight_total > 0.0 {
        // Rounding can land an ulp outside the day's range.
        (weighted_sum / weight_total).clamp(min_change, max_change)
    } else {
        0.0
    };

    Ok(MultiAccountDailyBlend {
        date,
        blended_change_percent,
        total_pre_change_value,
    })
}

/// Blended change percent for one date's accounts.
pub fn blended_change_percent(accounts: &[AccountDayValue]) -> Result<f64> {
    Ok(blend_daily(NaiveDate::MIN, accounts)?.blended_change_percent)
}

/// Merges account series into one series per currency over the union of
/// their dates. An account without a record on a date does not take part in
/// that date's blend. Values, investments and cash flows are summed.
///
/// A -100% day is weighted by the account's previous value in that currency.
/// When the account's history starts with such a day there is no previous
/// value, and the account carries no weight that day.
pub fn blend_series(accounts: &[AccountSeries]) -> Result<Vec<DailyReturnRecord>> {
    let mut by_day: BTreeMap<(NaiveDate, &Currency), Vec<AccountDay>> = BTreeMap::new();

    for account in accounts {
        let mut last_seen: BTreeMap<&Currency, (NaiveDate, Decimal)> = BTreeMap::new();
        for record in &account.records {
            record.validate()?;
            let previous = last_seen.insert(&record.currency, (record.date, record.total_value));
            if let Some((previous_date, _)) = previous {
                if record.date <= previous_date {
                    return Err(CalculatorError::UnorderedRecords {
                        currency: format!("{} in account {}", record.currency, account.account_id),
                        date: record.date,
                    }
                    .into());
                }
            }

            let opening_value = if record.adjusted_change_percent == -100.0 {
                if previous.is_none() {
                    warn!(
                        "Account {} starts with a total loss on {} ({}); it carries no weight that day",
                        account.account_id, record.date, record.currency
                    );
                }
                Some(previous.map_or(Decimal::ZERO, |(_, value)| value))
            } else {
                None
            };
            by_day
                .entry((record.date, &record.currency))
                .or_default()
                .push(AccountDay {
                    record,
                    opening_value,
                });
        }
    }

    let mut blended = Vec::with_capacity(by_day.len());
    for ((date, currency), days) in by_day {
        let day_values: Vec<AccountDayValue> = days
            .iter()
            .map(|day| AccountDayValue {
                current_value: day.record.total_value,
                change_percent: day.record.adjusted_change_percent,
                opening_value: day.opening_value,
            })
            .collect();
        let blend = blend_daily(date, &day_values)?;

        blended.push(DailyReturnRecord {
            date,
            currency: currency.clone(),
            total_value: days.iter().map(|day| day.record.total_value).sum(),
            total_investment: days.iter().map(|day| day.record.total_investment).sum(),
            cash_flow: days.iter().map(|day| day.record.cash_flow).sum(),
            adjusted_change_percent: blend.blended_change_percent,
        });
    }

    Ok(blended)
}

struct AccountDay<'a> {
    record: &'a DailyReturnRecord,
    opening_value: Option<Decimal>,
}
