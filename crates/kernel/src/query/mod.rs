//! Typed predicates and sorts over the document index.

pub mod builder;
pub mod types;

pub use builder::{DocumentQueryBuilder, QueryService};
pub use types::{DocumentQuery, FilterOp, FilterValue, PathFilter, PathSort, RefFilter, SortDirection};
