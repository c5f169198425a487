pub mod infer;
pub mod types;

pub use infer::{infer_columns, infer_type};
pub use types::{Column, ColumnType};
