//! Chains consolidated periods: years from months, and arbitrary reporting
//! windows from years, months and the remaining daily records.

use chrono::NaiveDate;
use log::{debug, warn};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::constants::CONSOLIDATED_SCHEMA_VERSION;
use crate::errors::{CalculatorError, Error, Result, ValidationError};
use crate::utils::time_utils::{month_end, month_start, year_start};

use super::factor_chain::{capture_period, chain_ratios, chain_sequence};
use super::performance_model::{
    CompoundingFactor, ConsolidatedPeriod, Currency, CurrencyPeriodSummary, DailyReturnRecord,
    Granularity, PeriodBoundarySnapshot, PeriodKey, PeriodType, WindowResolution, WindowSegment,
};
use super::period_consolidator::{modified_dietz_percent, period_midpoint};

// =============================================================================
// Year from months
// =============================================================================

/// Builds a year record from that year's consolidated months.
///
/// Months are independently re-based at 1.0, so the year factor is the product
/// of each month's `factor_at_end / factor_at_start`. Partial years are valid
/// and cover exactly the months supplied. Returns `Ok(None)` for no months.
pub fn consolidate_year(monthly_periods: &[ConsolidatedPeriod]) -> Result<Option<ConsolidatedPeriod>> {
    let (Some(first), Some(last)) = (monthly_periods.first(), monthly_periods.last()) else {
        return Ok(None);
    };
    let year = first.period_key.year();

    let mut previous: Option<PeriodKey> = None;
    for month in monthly_periods {
        month.ensure_supported_schema()?;
        if month.period_type != PeriodType::Month {
            return Err(CalculatorError::PeriodTypeMismatch {
                expected: PeriodType::Month.as_str(),
                actual: month.period_type.as_str(),
                period_key: month.period_key.to_string(),
            }
            .into());
        }
        if month.period_key.year() != year {
            return Err(CalculatorError::MixedPeriod {
                period_key: year.to_string(),
                date: month.start_date,
            }
            .into());
        }
        if previous.is_some_and(|p| month.period_key <= p) {
            return Err(CalculatorError::Calculation(format!(
                "Months for {} are not strictly ascending at {}",
                year, month.period_key
            ))
            .into());
        }
        previous = Some(month.period_key);
    }

    let currencies: BTreeSet<&Currency> = monthly_periods
        .iter()
        .flat_map(|m| m.per_currency.keys())
        .collect();

    let mut per_currency = BTreeMap::new();
    for currency in currencies {
        let months: Vec<(&ConsolidatedPeriod, &CurrencyPeriodSummary)> = monthly_periods
            .iter()
            .filter_map(|m| m.summary(currency).map(|s| (m, s)))
            .collect();
        per_currency.insert(currency.clone(), chain_month_summaries(&months)?);
    }

    Ok(Some(ConsolidatedPeriod {
        period_type: PeriodType::Year,
        period_key: PeriodKey::Year(year),
        start_date: first.start_date,
        end_date: last.end_date,
        record_count: monthly_periods
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(m.record_count)),
        schema_version: CONSOLIDATED_SCHEMA_VERSION,
        per_currency,
    }))
}

fn chain_month_summaries(
    months: &[(&ConsolidatedPeriod, &CurrencyPeriodSummary)],
) -> Result<CurrencyPeriodSummary> {
    let (Some((first_period, first)), Some((last_period, last))) = (months.first(), months.last())
    else {
        return Err(CalculatorError::Calculation("no months for currency".to_string()).into());
    };

    let ratios = months
        .iter()
        .map(|(_, s)| s.boundary().ratio())
        .collect::<std::result::Result<Vec<f64>, CalculatorError>>()?;
    let boundary = PeriodBoundarySnapshot {
        factor_at_start: CompoundingFactor::ONE,
        factor_at_end: chain_ratios(CompoundingFactor::ONE, ratios)?,
    };

    let total_cash_flow: Decimal = months.iter().map(|(_, s)| s.total_cash_flow).sum();
    // Only month totals are known here, so each month's flow sits at its midpoint.
    let flows: Vec<(NaiveDate, Decimal)> = months
        .iter()
        .filter(|(_, s)| !s.total_cash_flow.is_zero())
        .map(|(p, s)| (period_midpoint(p), s.total_cash_flow))
        .collect();

    Ok(CurrencyPeriodSummary {
        factor_at_start: boundary.factor_at_start,
        factor_at_end: boundary.factor_at_end,
        period_return_percent: boundary.return_percent()?,
        start_total_value: first.start_total_value,
        end_total_value: last.end_total_value,
        start_total_investment: first.start_total_investment,
        end_total_investment: last.end_total_investment,
        total_cash_flow,
        opening_value: first.opening_value,
        money_weighted_return_percent: modified_dietz_percent(
            first.opening_value,
            last.end_total_value,
            &flows,
            first_period.start_date,
            last_period.end_date,
        ),
    })
}

// =============================================================================
// Window planning
// =============================================================================

/// One piece of a planned window: either a consolidated period used whole, or
/// a date range to be chained from daily records.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedSegment<'a> {
    Period {
        granularity: Granularity,
        period: &'a ConsolidatedPeriod,
        start: NaiveDate,
        end: NaiveDate,
    },
    Daily {
        start: NaiveDate,
        end: NaiveDate,
    },
}

impl PlannedSegment<'_> {
    /// Date range that still has to be read from daily records.
    pub fn daily_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            PlannedSegment::Daily { start, end } => Some((*start, *end)),
            PlannedSegment::Period { .. } => None,
        }
    }
}

fn index_periods<'a>(
    periods: &'a [ConsolidatedPeriod],
    period_type: PeriodType,
) -> Result<HashMap<PeriodKey, &'a ConsolidatedPeriod>> {
    let mut index = HashMap::with_capacity(periods.len());
    for period in periods {
        period.ensure_supported_schema()?;
        if period.period_type != period_type {
            return Err(CalculatorError::PeriodTypeMismatch {
                expected: period_type.as_str(),
                actual: period.period_type.as_str(),
                period_key: period.period_key.to_string(),
            }
            .into());
        }
        if !period.period_key.contains(period.start_date) || !period.period_key.contains(period.end_date) {
            return Err(CalculatorError::MixedPeriod {
                period_key: period.period_key.to_string(),
                date: if period.period_key.contains(period.start_date) {
                    period.end_date
                } else {
                    period.start_date
                },
            }
            .into());
        }
        if index.insert(period.period_key, period).is_some() {
            warn!(
                "Duplicate {} record {}; using the later one",
                period_type, period.period_key
            );
        }
    }
    Ok(index)
}

/// Splits `[window_start, window_end]` into the coarsest segments available.
///
/// At each cursor position a year record is used when the cursor is January 1,
/// the record carries `currency` and its coverage ends inside the window; else
/// a month record under the same rules; else the rest of the calendar month
/// (clipped to the window) is left to daily records.
pub fn plan_window<'a>(
    yearly_periods: &'a [ConsolidatedPeriod],
    monthly_periods: &'a [ConsolidatedPeriod],
    currency: &Currency,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Result<Vec<PlannedSegment<'a>>> {
    if window_start > window_end {
        return Err(Error::Validation(ValidationError::InvalidInput(format!(
            "Window start {} is after window end {}",
            window_start, window_end
        ))));
    }

    let years = index_periods(yearly_periods, PeriodType::Year)?;
    let months = index_periods(monthly_periods, PeriodType::Month)?;

    let mut segments = Vec::new();
    let mut cursor = window_start;
    while cursor <= window_end {
        let (segment, through) = next_segment(&years, &months, currency, cursor, window_end);
        segments.push(segment);
        match through.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    Ok(segments)
}

fn next_segment<'a>(
    years: &HashMap<PeriodKey, &'a ConsolidatedPeriod>,
    months: &HashMap<PeriodKey, &'a ConsolidatedPeriod>,
    currency: &Currency,
    cursor: NaiveDate,
    window_end: NaiveDate,
) -> (PlannedSegment<'a>, NaiveDate) {
    if cursor == year_start(cursor) {
        if let Some(year) = years
            .get(&PeriodKey::year_of(cursor))
            .filter(|p| p.summary(currency).is_some())
        {
            let through = year.covered_through();
            if through <= window_end {
                let segment = PlannedSegment::Period {
                    granularity: Granularity::Year,
                    period: year,
                    start: cursor,
                    end: through,
                };
                return (segment, through);
            }
        }
    }

    if cursor == month_start(cursor) {
        if let Some(month) = months
            .get(&PeriodKey::month_of(cursor))
            .filter(|p| p.summary(currency).is_some())
        {
            let through = month_end(cursor);
            if through <= window_end {
                let segment = PlannedSegment::Period {
                    granularity: Granularity::Month,
                    period: month,
                    start: cursor,
                    end: through,
                };
                return (segment, through);
            }
        }
    }

    let through = month_end(cursor).min(window_end);
    (
        PlannedSegment::Daily {
            start: cursor,
            end: through,
        },
        through,
    )
}

// =============================================================================
// Window evaluation
// =============================================================================

/// Daily changes of one currency keyed by date, validated and strictly ascending.
fn index_daily(
    daily_records: &[DailyReturnRecord],
    currency: &Currency,
) -> Result<BTreeMap<NaiveDate, f64>> {
    let mut index = BTreeMap::new();
    let mut previous: Option<NaiveDate> = None;
    for record in daily_records.iter().filter(|r| &r.currency == currency) {
        record.validate()?;
        if previous.is_some_and(|p| record.date <= p) {
            return Err(CalculatorError::UnorderedRecords {
                currency: currency.to_string(),
                date: record.date,
            }
            .into());
        }
        previous = Some(record.date);
        index.insert(record.date, record.adjusted_change_percent);
    }
    Ok(index)
}

/// Chains a planned window. Periods contribute their factor ratio, daily
/// segments chain whatever records of `currency` fall inside them.
pub fn evaluate_window(
    plan: &[PlannedSegment<'_>],
    daily_records: &[DailyReturnRecord],
    currency: &Currency,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Result<WindowResolution> {
    let daily = index_daily(daily_records, currency)?;

    let mut factor = CompoundingFactor::ONE;
    let mut segments = Vec::with_capacity(plan.len());

    for planned in plan {
        match planned {
            PlannedSegment::Period {
                granularity,
                period,
                start,
                end,
            } => {
                let Some(summary) = period.summary(currency) else {
                    continue;
                };
                let ratio = summary.boundary().ratio()?;
                factor = chain_ratios(factor, [ratio])?;
                debug!(
                    "Window {}..{}: {:?} {} ratio {}",
                    window_start, window_end, granularity, period.period_key, ratio
                );
                segments.push(WindowSegment {
                    granularity: *granularity,
                    start: *start,
                    end: *end,
                    factor_ratio: ratio,
                    record_count: period.record_count,
                });
            }
            PlannedSegment::Daily { start, end } => {
                let changes: Vec<f64> = daily.range(*start..=*end).map(|(_, pct)| *pct).collect();
                if changes.is_empty() {
                    continue;
                }
                let ratio = capture_period(CompoundingFactor::ONE, changes.iter().copied())?.ratio()?;
                factor = chain_ratios(factor, [ratio])?;
                segments.push(WindowSegment {
                    granularity: Granularity::Day,
                    start: *start,
                    end: *end,
                    factor_ratio: ratio,
                    record_count: u32::try_from(changes.len()).unwrap_or(u32::MAX),
                });
            }
        }
    }

    Ok(window_resolution(window_start, window_end, factor, segments))
}

fn window_resolution(
    window_start: NaiveDate,
    window_end: NaiveDate,
    factor: CompoundingFactor,
    segments: Vec<WindowSegment>,
) -> WindowResolution {
    let has_sufficient_data = !segments.is_empty();
    WindowResolution {
        window_start,
        window_end,
        factor,
        return_percent: if has_sufficient_data {
            factor.return_percent()
        } else {
            0.0
        },
        has_sufficient_data,
        segments,
    }
}

/// Return over `[window_start, window_end]` from the coarsest records that
/// cover each sub-range: whole years, then whole months, then daily records
/// for the open edges.
pub fn resolve_window(
    yearly_periods: &[ConsolidatedPeriod],
    monthly_periods: &[ConsolidatedPeriod],
    daily_records: &[DailyReturnRecord],
    currency: &Currency,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Result<WindowResolution> {
    let plan = plan_window(
        yearly_periods,
        monthly_periods,
        currency,
        window_start,
        window_end,
    )?;
    evaluate_window(&plan, daily_records, currency, window_start, window_end)
}

/// Reference path: chains every daily record in the window in one pass.
pub fn resolve_window_naive(
    daily_records: &[DailyReturnRecord],
    currency: &Currency,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Result<WindowResolution> {
    if window_start > window_end {
        return Err(Error::Validation(ValidationError::InvalidInput(format!(
            "Window start {} is after window end {}",
            window_start, window_end
        ))));
    }
    let daily = index_daily(daily_records, currency)?;
    let changes: Vec<f64> = daily
        .range(window_start..=window_end)
        .map(|(_, pct)| *pct)
        .collect();

    let mut segments = Vec::new();
    let factor = chain_sequence(CompoundingFactor::ONE, changes.iter().copied())?;
    if !changes.is_empty() {
        segments.push(WindowSegment {
            granularity: Granularity::Day,
            start: window_start,
            end: window_end,
            factor_ratio: factor.value(),
            record_count: u32::try_from(changes.len()).unwrap_or(u32::MAX),
        });
    }
    Ok(window_resolution(window_start, window_end, factor, segments))
}
