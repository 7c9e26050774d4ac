pub mod filters;
pub mod fit;
pub mod ibe;
pub mod io;
pub mod plan;
pub mod rate;
pub mod stats;
pub mod table;
pub mod trim;

pub use filters::{
    edge_percent, filter_edge_percent, filter_greater_than, filter_less_than, filter_range,
    filter_rows, filter_three_sigma, greater_than, less_than, three_sigma, ColumnPredicate,
    EdgePercent, FilterError, GreaterThan, LessThan, PredicateError, ThreeSigma,
};
pub use fit::{polyfit, FitError, LinearFit};
pub use ibe::{write_ibe, IbeError, IbeHeader};
pub use io::{read_delimited, separator_byte, write_delimited, TableIoError};
pub use plan::{FilterStep, Plan, PlanError, RateSpec, TrimSection};
pub use rate::{Identity, Linear, Polynomial, RateError, RateFunction};
pub use table::{
    clip_columns, numeric_column, resolve_target_param, BoundPair, ColumnError, ColumnSelector,
    TestStep,
};
pub use trim::{
    compute_trim, shift_table, trim_to_frequency, trim_to_thickness, TrimError, TrimOutcome,
    TrimSettings, TrimVariant,
};
