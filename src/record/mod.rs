/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

pub mod column;
pub mod field;
pub mod row;
pub mod row_id;
pub mod schema;

pub use column::{Column, ColumnType};
pub use field::Field;
pub use row::Row;
pub use row_id::RowId;
pub use schema::Schema;
