//! the kernels behind each instruction family

pub mod distinct;
pub mod filter;
pub mod limit;
pub mod sort;

pub use distinct::{distinct_hashed, distinct_sorted};
pub use filter::{IntoBits, Refine, RowTestVisitor, ScanInto, bit_filter, dispatch, id_range, sorted_range};
pub use limit::{limit_indices, limit_range};
pub use sort::{KeyColumn, RadixScratch, radix_sort, sort, sort_by, sort_rows};
