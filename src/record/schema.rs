/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! An ordered sequence of columns, plus the ownership flag the source
//! carries ("does this schema own/manage its columns"). Rust doesn't need
//! that flag for memory safety, but it is kept as plain data since the
//! catalog layout and serialized format depend on it.

use crate::constants::SCHEMA_MAGIC_NUM;
use crate::error::{DbError, DbResult};
use crate::io::{read_bool, read_u32, write_bool, write_u32};
use crate::record::column::Column;

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    is_manage: bool,
}

impl Schema {
    pub fn new(columns: Vec<Column>, is_manage: bool) -> Self {
        Schema { columns, is_manage }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> u32 {
        self.columns.len() as u32
    }

    pub fn is_manage(&self) -> bool {
        self.is_manage
    }

    pub fn get_column_index(&self, name: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c.name() == name)
            .map(|i| i as u32)
    }

    pub fn serialized_size(&self) -> u32 {
        4 + 1 + 4 + self.columns.iter().map(|c| c.serialized_size()).sum::<u32>()
    }

    pub fn serialize_to(&self, buf: &mut [u8]) -> DbResult<u32> {
        let mut off = 0usize;
        write_u32(&mut buf[off..], SCHEMA_MAGIC_NUM);
        off += 4;
        write_bool(&mut buf[off..], self.is_manage);
        off += 1;
        write_u32(&mut buf[off..], self.column_count());
        off += 4;
        for c in &self.columns {
            off += c.serialize_to(&mut buf[off..])? as usize;
        }
        Ok(off as u32)
    }

    pub fn deserialize_from(buf: &[u8]) -> DbResult<(Self, u32)> {
        let mut off = 0usize;
        let magic = read_u32(&buf[off..])?;
        off += 4;
        if magic != SCHEMA_MAGIC_NUM {
            return Err(DbError::Corrupt(format!(
                "schema deserialize error: bad magic {magic:#x}"
            )));
        }
        let _is_manage_on_disk = read_bool(&buf[off..])?;
        off += 1;
        let count = read_u32(&buf[off..])?;
        off += 4;
        let mut columns = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (col, n) = Column::deserialize_from(&buf[off..])?;
            off += n as usize;
            columns.push(col);
        }
        // A reconstructed schema always owns the columns it just built.
        Ok((Schema::new(columns, true), off as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::column::ColumnType;

    fn sample() -> Schema {
        Schema::new(
            vec![
                Column::new_fixed("id", ColumnType::Int32, 0, false, true).unwrap(),
                Column::new_char("name", 16, 1, true, false),
            ],
            false,
        )
    }

    #[test]
    fn roundtrip_preserves_columns_and_ownership() {
        let s = sample();
        let mut buf = vec![0u8; s.serialized_size() as usize];
        let written = s.serialize_to(&mut buf).unwrap();
        assert_eq!(written, s.serialized_size());
        let (back, read) = Schema::deserialize_from(&buf).unwrap();
        assert_eq!(read, written);
        assert_eq!(back.columns(), s.columns());
        assert!(back.is_manage());
    }

    #[test]
    fn column_index_lookup() {
        let s = sample();
        assert_eq!(s.get_column_index("name"), Some(1));
        assert_eq!(s.get_column_index("missing"), None);
    }
}
