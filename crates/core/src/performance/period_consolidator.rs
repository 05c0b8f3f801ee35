//! Rolls one period's daily records into a `ConsolidatedPeriod`.

use chrono::{Duration, NaiveDate};
use log::{debug, warn};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

use crate::constants::CONSOLIDATED_SCHEMA_VERSION;
use crate::errors::{CalculatorError, Result};
use crate::utils::time_utils::days_inclusive;

use super::factor_chain::capture_period;
use super::performance_model::{
    CompoundingFactor, ConsolidatedPeriod, Currency, CurrencyPeriodSummary, DailyReturnRecord,
    PeriodKey,
};
use super::period_chainer::consolidate_year;

/// Consolidates the daily records of exactly one period.
///
/// Returns `Ok(None)` for an empty period: no trading data is a normal state,
/// not a failure. Records must be ascending by date within each currency; a
/// currency missing on some days is simply absent on those days.
pub fn consolidate(
    daily_records: &[DailyReturnRecord],
    period_key: PeriodKey,
) -> Result<Option<ConsolidatedPeriod>> {
    let Some(first) = daily_records.first() else {
        debug!("No daily records for period {}, nothing to consolidate", period_key);
        return Ok(None);
    };

    let mut by_currency: BTreeMap<&Currency, Vec<&DailyReturnRecord>> = BTreeMap::new();
    let mut start_date = first.date;
    let mut end_date = first.date;

    for record in daily_records {
        record.validate()?;
        if !period_key.contains(record.date) {
            return Err(CalculatorError::MixedPeriod {
                period_key: period_key.to_string(),
                date: record.date,
            }
            .into());
        }

        let series = by_currency.entry(&record.currency).or_default();
        if let Some(previous) = series.last() {
            if record.date <= previous.date {
                return Err(CalculatorError::UnorderedRecords {
                    currency: record.currency.to_string(),
                    date: record.date,
                }
                .into());
            }
        }
        series.push(record);

        start_date = start_date.min(record.date);
        end_date = end_date.max(record.date);
    }

    let mut per_currency = BTreeMap::new();
    for (currency, series) in by_currency {
        per_currency.insert(currency.clone(), summarize_currency(&series)?);
    }

    Ok(Some(ConsolidatedPeriod {
        period_type: period_key.period_type(),
        period_key,
        start_date,
        end_date,
        record_count: u32::try_from(daily_records.len()).unwrap_or(u32::MAX),
        schema_version: CONSOLIDATED_SCHEMA_VERSION,
        per_currency,
    }))
}

fn summarize_currency(series: &[&DailyReturnRecord]) -> Result<CurrencyPeriodSummary> {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Err(CalculatorError::Calculation("empty currency series".to_string()).into());
    };

    // Period-local factor: the start is 1.0 and is captured before day one.
    let boundary = capture_period(
        CompoundingFactor::ONE,
        series.iter().map(|r| r.adjusted_change_percent),
    )?;

    let total_cash_flow: Decimal = series.iter().map(|r| r.cash_flow).sum();
    let opening_value = first.opening_value().unwrap_or_else(|| {
        warn!(
            "Opening value for {} on {} cannot be derived from a {}% day; using value net of cash flow",
            first.currency, first.date, first.adjusted_change_percent
        );
        first.total_value - first.cash_flow
    });
    let flows: Vec<(NaiveDate, Decimal)> = series
        .iter()
        .filter(|r| !r.cash_flow.is_zero())
        .map(|r| (r.date, r.cash_flow))
        .collect();

    Ok(CurrencyPeriodSummary {
        factor_at_start: boundary.factor_at_start,
        factor_at_end: boundary.factor_at_end,
        period_return_percent: boundary.return_percent()?,
        start_total_value: first.total_value,
        end_total_value: last.total_value,
        start_total_investment: first.total_investment,
        end_total_investment: last.total_investment,
        total_cash_flow,
        opening_value,
        money_weighted_return_percent: modified_dietz_percent(
            opening_value,
            last.total_value,
            &flows,
            first.date,
            last.date,
        ),
    })
}

/// Modified Dietz return in percent over `[start, end]`, the first and last
/// dates with data.
///
/// Daily changes exclude the day's own flow, so a flow dated `d` is credited
/// at the end of that day: its weight is `(end - d) / days_inclusive(start, end)`
/// and a flow on `end` carries no weight. Returns 0 when the weighted capital
/// is not positive.
pub(crate) fn modified_dietz_percent(
    opening_value: Decimal,
    ending_value: Decimal,
    flows: &[(NaiveDate, Decimal)],
    start: NaiveDate,
    end: NaiveDate,
) -> f64 {
    let total_days = days_inclusive(start, end);
    if total_days <= 0 {
        return 0.0;
    }
    let total_days_dec = Decimal::from(total_days);

    let mut net_flow = Decimal::ZERO;
    let mut weighted_flow = Decimal::ZERO;
    for (date, flow) in flows {
        net_flow += *flow;
        let remaining = (end - *date).num_days().clamp(0, total_days);
        weighted_flow += *flow * Decimal::from(remaining) / total_days_dec;
    }

    let gain = ending_value - opening_value - net_flow;
    let weighted_capital = opening_value + weighted_flow;
    if weighted_capital <= Decimal::ZERO {
        return 0.0;
    }

    gain.checked_div(weighted_capital)
        .and_then(|r| r.checked_mul(dec!(100)))
        .and_then(|r| r.to_f64())
        .unwrap_or_else(|| {
            warn!(
                "Money-weighted return overflowed for gain {} on capital {}",
                gain, weighted_capital
            );
            0.0
        })
}

/// Midpoint of a consolidated period's data range, used to place a month's
/// aggregated cash flow when only month-level data is available.
pub(crate) fn period_midpoint(period: &ConsolidatedPeriod) -> NaiveDate {
    let half = (period.end_date - period.start_date).num_days() / 2;
    period.start_date + Duration::days(half)
}

/// Closed months and years derived from one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesConsolidation {
    pub months: Vec<ConsolidatedPeriod>,
    pub years: Vec<ConsolidatedPeriod>,
}

/// Consolidates every month of `records` that is closed at `as_of`, then
/// builds each year (partial years included) from those months.
pub fn consolidate_closed_periods(
    records: &[DailyReturnRecord],
    as_of: NaiveDate,
) -> Result<SeriesConsolidation> {
    let mut sorted: Vec<&DailyReturnRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.date);

    let mut by_month: BTreeMap<PeriodKey, Vec<DailyReturnRecord>> = BTreeMap::new();
    for record in sorted {
        let key = PeriodKey::month_of(record.date);
        if key.is_closed(as_of) {
            by_month.entry(key).or_default().push(record.clone());
        }
    }

    let mut months = Vec::with_capacity(by_month.len());
    for (key, month_records) in &by_month {
        if let Some(period) = consolidate(month_records, *key)? {
            months.push(period);
        }
    }

    let mut by_year: BTreeMap<i32, Vec<ConsolidatedPeriod>> = BTreeMap::new();
    for month in &months {
        by_year
            .entry(month.period_key.year())
            .or_default()
            .push(month.clone());
    }

    let mut years = Vec::with_capacity(by_year.len());
    for year_months in by_year.values() {
        if let Some(period) = consolidate_year(year_months)? {
            years.push(period);
        }
    }

    Ok(SeriesConsolidation { months, years })
}
