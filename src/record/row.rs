/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A row is an ordered sequence of fields plus its `RowId`. The byte
//! layout writes the field count, a byte-granular null bitmap (`ceil(n/8)`
//! bytes, bit `i` set means field `i` is null, the canonical choice
//! between the two bitmap variants the source disagreed on), and then the
//! bytes of non-null fields only, in column order.

use crate::error::{DbError, DbResult};
use crate::io::{read_u32, write_u32};
use crate::record::column::Column;
use crate::record::field::Field;
use crate::record::row_id::RowId;
use crate::record::schema::Schema;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub rid: RowId,
    pub fields: Vec<Option<Field>>,
}

fn bitmap_bytes(field_count: usize) -> usize {
    (field_count + 7) / 8
}

impl Row {
    pub fn new(fields: Vec<Option<Field>>) -> Self {
        Row {
            rid: RowId::invalid(),
            fields,
        }
    }

    pub fn with_rid(rid: RowId, fields: Vec<Option<Field>>) -> Self {
        Row { rid, fields }
    }

    fn check_schema(&self, schema: &Schema) -> DbResult<()> {
        if self.fields.len() != schema.columns().len() {
            return Err(DbError::Corrupt(format!(
                "row has {} fields but schema has {} columns",
                self.fields.len(),
                schema.columns().len()
            )));
        }
        Ok(())
    }

    pub fn serialized_size(&self, schema: &Schema) -> DbResult<u32> {
        self.check_schema(schema)?;
        let mut size = 4 + bitmap_bytes(self.fields.len()) as u32;
        for (field, col) in self.fields.iter().zip(schema.columns()) {
            if let Some(f) = field {
                size += f.serialized_size(col)?;
            }
        }
        Ok(size)
    }

    pub fn serialize_to(&self, buf: &mut [u8], schema: &Schema) -> DbResult<u32> {
        self.check_schema(schema)?;
        let mut off = 0usize;
        write_u32(&mut buf[off..], self.fields.len() as u32);
        off += 4;
        let bitmap_len = bitmap_bytes(self.fields.len());
        buf[off..off + bitmap_len].fill(0);
        for (i, field) in self.fields.iter().enumerate() {
            if field.is_none() {
                buf[off + i / 8] |= 1 << (i % 8);
            }
        }
        off += bitmap_len;
        for (field, col) in self.fields.iter().zip(schema.columns()) {
            if let Some(f) = field {
                off += f.serialize_to(&mut buf[off..], col)? as usize;
            }
        }
        Ok(off as u32)
    }

    pub fn deserialize_from(buf: &[u8], schema: &Schema) -> DbResult<(Self, u32)> {
        let mut off = 0usize;
        let count = read_u32(&buf[off..])? as usize;
        off += 4;
        if count != schema.columns().len() {
            return Err(DbError::Corrupt(format!(
                "row field count {count} does not match schema's {}",
                schema.columns().len()
            )));
        }
        let bitmap_len = bitmap_bytes(count);
        let bitmap = &buf[off..off + bitmap_len];
        off += bitmap_len;
        let mut fields = Vec::with_capacity(count);
        for (i, col) in schema.columns().iter().enumerate() {
            let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
            if is_null {
                fields.push(None);
            } else {
                let (f, n) = Field::deserialize_from(&buf[off..], col)?;
                off += n as usize;
                fields.push(Some(f));
            }
        }
        Ok((Row::new(fields), off as u32))
    }

    /// Projects this row onto the columns named in `key_schema`, in the
    /// order `key_schema` lists them, by looking up each name's index in
    /// `schema`.
    pub fn get_key_from_row(&self, schema: &Schema, key_schema: &Schema) -> DbResult<Row> {
        self.check_schema(schema)?;
        let mut fields = Vec::with_capacity(key_schema.columns().len());
        for key_col in key_schema.columns() {
            let idx = schema
                .get_column_index(key_col.name())
                .ok_or_else(|| DbError::ColumnNotFound(key_col.name().to_owned()))?;
            fields.push(self.fields[idx as usize].clone());
        }
        Ok(Row::new(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::column::ColumnType;

    fn schema() -> Schema {
        Schema::new(
            vec![
                Column::new_fixed("id", ColumnType::Int32, 0, false, true).unwrap(),
                Column::new_char("name", 8, 1, true, false),
            ],
            false,
        )
    }

    #[test]
    fn roundtrip_with_a_null_field() {
        let schema = schema();
        let row = Row::new(vec![Some(Field::Int32(5)), None]);
        let mut buf = vec![0u8; row.serialized_size(&schema).unwrap() as usize];
        let written = row.serialize_to(&mut buf, &schema).unwrap();
        let (back, read) = Row::deserialize_from(&buf, &schema).unwrap();
        assert_eq!(read, written);
        assert_eq!(back.fields, row.fields);
    }

    #[test]
    fn empty_field_count_is_legal() {
        let empty_schema = Schema::new(vec![], false);
        let row = Row::new(vec![]);
        let mut buf = vec![0u8; row.serialized_size(&empty_schema).unwrap() as usize];
        row.serialize_to(&mut buf, &empty_schema).unwrap();
        let (back, _) = Row::deserialize_from(&buf, &empty_schema).unwrap();
        assert!(back.fields.is_empty());
    }

    #[test]
    fn get_key_from_row_projects_by_name() {
        let schema = schema();
        let key_schema = Schema::new(
            vec![Column::new_fixed("id", ColumnType::Int32, 0, false, true).unwrap()],
            false,
        );
        let row = Row::new(vec![Some(Field::Int32(42)), Some(Field::Char("x".into()))]);
        let key = row.get_key_from_row(&schema, &key_schema).unwrap();
        assert_eq!(key.fields, vec![Some(Field::Int32(42))]);
    }
}
