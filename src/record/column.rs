/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A single column's type and metadata. Two constructors mirror the
//! source: one for fixed-width types that derive their length from the
//! type, one for `char` columns that takes an explicit length.

use crate::constants::COLUMN_MAGIC_NUM;
use crate::error::{DbError, DbResult};
use crate::io::{
    read_bool, read_i32, read_str, read_u32, str_serialized_size, write_bool, write_i32,
    write_str, write_u32,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int32,
    Float32,
    Char,
}

impl ColumnType {
    fn tag(self) -> i32 {
        match self {
            ColumnType::Int32 => 0,
            ColumnType::Float32 => 1,
            ColumnType::Char => 2,
        }
    }

    fn from_tag(tag: i32) -> DbResult<Self> {
        match tag {
            0 => Ok(ColumnType::Int32),
            1 => Ok(ColumnType::Float32),
            2 => Ok(ColumnType::Char),
            other => Err(DbError::Corrupt(format!("unknown column type tag {other}"))),
        }
    }

    pub fn fixed_len(self) -> Option<u32> {
        match self {
            ColumnType::Int32 => Some(4),
            ColumnType::Float32 => Some(4),
            ColumnType::Char => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    len: u32,
    table_index: u32,
    nullable: bool,
    unique: bool,
}

impl Column {
    /// Constructor for `int32`/`float32` columns; `char` is rejected here
    /// since its length cannot be derived from the type alone.
    pub fn new_fixed(
        name: impl Into<String>,
        column_type: ColumnType,
        table_index: u32,
        nullable: bool,
        unique: bool,
    ) -> DbResult<Self> {
        let len = column_type.fixed_len().ok_or_else(|| {
            DbError::Corrupt("wrong constructor for char column: length required".into())
        })?;
        Ok(Column {
            name: name.into(),
            column_type,
            len,
            table_index,
            nullable,
            unique,
        })
    }

    /// Constructor for `char` columns, which carry a user-supplied length.
    pub fn new_char(
        name: impl Into<String>,
        len: u32,
        table_index: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        Column {
            name: name.into(),
            column_type: ColumnType::Char,
            len,
            table_index,
            nullable,
            unique,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn table_index(&self) -> u32 {
        self.table_index
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn serialized_size(&self) -> u32 {
        let mut size = 4 // magic
            + str_serialized_size(&self.name) as u32
            + 4 // type tag
            + 4 // table index
            + 1 // nullable
            + 1; // unique
        if self.column_type == ColumnType::Char {
            size += 4; // char_len, emitted only for char columns
        }
        size
    }

    pub fn serialize_to(&self, buf: &mut [u8]) -> DbResult<u32> {
        let mut off = 0usize;
        write_u32(&mut buf[off..], COLUMN_MAGIC_NUM);
        off += 4;
        write_str(&mut buf[off..], &self.name);
        off += str_serialized_size(&self.name);
        write_i32(&mut buf[off..], self.column_type.tag());
        off += 4;
        if self.column_type == ColumnType::Char {
            write_u32(&mut buf[off..], self.len);
            off += 4;
        }
        write_u32(&mut buf[off..], self.table_index);
        off += 4;
        write_bool(&mut buf[off..], self.nullable);
        off += 1;
        write_bool(&mut buf[off..], self.unique);
        off += 1;
        Ok(off as u32)
    }

    pub fn deserialize_from(buf: &[u8]) -> DbResult<(Self, u32)> {
        let mut off = 0usize;
        let magic = read_u32(&buf[off..])?;
        off += 4;
        if magic != COLUMN_MAGIC_NUM {
            return Err(DbError::Corrupt(format!(
                "column deserialize error: bad magic {magic:#x}"
            )));
        }
        let (name, n) = read_str(&buf[off..])?;
        off += n;
        let tag = read_i32(&buf[off..])?;
        off += 4;
        let column_type = ColumnType::from_tag(tag)?;
        let len = if column_type == ColumnType::Char {
            let l = read_u32(&buf[off..])?;
            off += 4;
            l
        } else {
            column_type.fixed_len().unwrap()
        };
        let table_index = read_u32(&buf[off..])?;
        off += 4;
        let nullable = read_bool(&buf[off..])?;
        off += 1;
        let unique = read_bool(&buf[off..])?;
        off += 1;
        Ok((
            Column {
                name,
                column_type,
                len,
                table_index,
                nullable,
                unique,
            },
            off as u32,
        ))
    }
}
