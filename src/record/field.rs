/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A field holds the value of one column. Nullability is expressed as
//! `Option<Field>` at the `Row` level rather than as a field carrying its
//! own null flag, an idiomatic fit for Rust that still matches the
//! on-disk contract ("bytes emitted only for non-null fields").

use crate::error::{DbError, DbResult};
use crate::io::{read_f32, read_i32, write_f32, write_i32};
use crate::record::column::{Column, ColumnType};

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int32(i32),
    Float32(f32),
    Char(String),
}

impl Field {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Field::Int32(_) => ColumnType::Int32,
            Field::Float32(_) => ColumnType::Float32,
            Field::Char(_) => ColumnType::Char,
        }
    }

    pub fn serialized_size(&self, col: &Column) -> DbResult<u32> {
        match (self, col.column_type()) {
            (Field::Int32(_), ColumnType::Int32) => Ok(4),
            (Field::Float32(_), ColumnType::Float32) => Ok(4),
            (Field::Char(_), ColumnType::Char) => Ok(col.len()),
            _ => Err(DbError::Corrupt("field/column type mismatch".into())),
        }
    }

    pub fn serialize_to(&self, buf: &mut [u8], col: &Column) -> DbResult<u32> {
        match (self, col.column_type()) {
            (Field::Int32(v), ColumnType::Int32) => {
                write_i32(buf, *v);
                Ok(4)
            }
            (Field::Float32(v), ColumnType::Float32) => {
                write_f32(buf, *v);
                Ok(4)
            }
            (Field::Char(s), ColumnType::Char) => {
                let width = col.len() as usize;
                if s.len() > width {
                    return Err(DbError::Corrupt(format!(
                        "char value '{s}' longer than column width {width}"
                    )));
                }
                buf[..s.len()].copy_from_slice(s.as_bytes());
                buf[s.len()..width].fill(0);
                Ok(width as u32)
            }
            _ => Err(DbError::Corrupt("field/column type mismatch".into())),
        }
    }

    pub fn deserialize_from(buf: &[u8], col: &Column) -> DbResult<(Self, u32)> {
        match col.column_type() {
            ColumnType::Int32 => Ok((Field::Int32(read_i32(buf)?), 4)),
            ColumnType::Float32 => Ok((Field::Float32(read_f32(buf)?), 4)),
            ColumnType::Char => {
                let width = col.len() as usize;
                let end = buf[..width]
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(width);
                let s = std::str::from_utf8(&buf[..end])
                    .map_err(|e| DbError::Corrupt(format!("invalid utf8 char field: {e}")))?
                    .to_owned();
                Ok((Field::Char(s), width as u32))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_roundtrip() {
        let col = Column::new_fixed("n", ColumnType::Int32, 0, false, false).unwrap();
        let f = Field::Int32(-7);
        let mut buf = [0u8; 4];
        f.serialize_to(&mut buf, &col).unwrap();
        let (back, n) = Field::deserialize_from(&buf, &col).unwrap();
        assert_eq!(back, f);
        assert_eq!(n, 4);
    }

    #[test]
    fn char_roundtrip_pads_and_trims() {
        let col = Column::new_char("name", 8, 0, true, false);
        let f = Field::Char("hi".into());
        let mut buf = [0u8; 8];
        f.serialize_to(&mut buf, &col).unwrap();
        let (back, n) = Field::deserialize_from(&buf, &col).unwrap();
        assert_eq!(back, Field::Char("hi".into()));
        assert_eq!(n, 8);
    }

    #[test]
    fn char_too_long_is_rejected() {
        let col = Column::new_char("name", 2, 0, true, false);
        let f = Field::Char("abc".into());
        let mut buf = [0u8; 2];
        assert!(f.serialize_to(&mut buf, &col).is_err());
    }
}
