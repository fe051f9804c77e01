//! Attribution reporting — channel statistics, perimeter summary, path-based
//! attribution solvers, and report export.

pub mod channel_stats;
pub mod perimeter;
pub mod report_builder;
pub mod solver;

pub use channel_stats::{compute_channel_stats, ChannelStatistic, Ratio};
pub use perimeter::{compute_perimeter_summary, PerimeterSummary};
pub use report_builder::{read_chains, write_chains, AttributionReport, ReportBuilder};
pub use solver::{solver_for, AttributionSolver, ChannelAttribution, PathTable};
