/// Decimal precision for reported percentages
pub const DECIMAL_PRECISION: u32 = 6;

/// Current layout of `ConsolidatedPeriod`.
/// Version 2 added `opening_value` to the per-currency summary.
pub const CONSOLIDATED_SCHEMA_VERSION: u32 = 2;

/// Oldest consolidated layout readers still accept
pub const MIN_SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// Default tolerance (percentage points) for time-weighted return checks
pub const DEFAULT_TWR_TOLERANCE_PP: f64 = 0.01;

/// Money-weighted checks use this multiple of the TWR tolerance
pub const DEFAULT_MWR_TOLERANCE_MULTIPLIER: f64 = 5.0;

/// Chart-level aggregates use this multiple of the TWR tolerance
pub const DEFAULT_CHART_TOLERANCE_MULTIPLIER: f64 = 10.0;

/// Relative tolerance for factor equivalence (monthly chain vs one daily pass)
pub const DEFAULT_EQUIVALENCE_RELATIVE_TOLERANCE: f64 = 1e-4;

/// Earliest year queried when listing an owner's consolidated history
pub const EARLIEST_PERIOD_YEAR: i32 = 1900;
