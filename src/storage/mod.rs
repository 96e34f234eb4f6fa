pub mod bit_vector;
pub mod buffer_pool;
pub mod column;
pub mod flex_vector;
pub mod slab;
pub mod string_pool;
pub mod table;

pub use bit_vector::BitVector;
pub use buffer_pool::BufferPool;
pub use column::{Column, ColumnBuilder, ColumnData, ColumnValue};
pub use flex_vector::FlexVector;
pub use slab::Slab;
pub use string_pool::{StringId, StringPool};
pub use table::{ColumnSource, Table};
