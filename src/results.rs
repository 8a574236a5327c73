mod row;

pub use row::{Columns, Row, normalize_column};
