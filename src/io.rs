/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Little-endian byte helpers used by the record codec and page headers.
//! Kept as free functions over `&[u8]`/`&mut [u8]` slices rather than fixed
//! arrays so callers can operate directly on sub-ranges of a page buffer.

use crate::error::{DbError, DbResult};

fn need(buf: &[u8], len: usize) -> DbResult<()> {
    if buf.len() < len {
        return Err(DbError::Corrupt(format!(
            "buffer too short: need {len} bytes, have {}",
            buf.len()
        )));
    }
    Ok(())
}

pub fn write_u32(buf: &mut [u8], v: u32) {
    buf[..4].copy_from_slice(&v.to_le_bytes());
}

pub fn read_u32(buf: &[u8]) -> DbResult<u32> {
    need(buf, 4)?;
    Ok(u32::from_le_bytes(buf[..4].try_into().unwrap()))
}

pub fn write_i32(buf: &mut [u8], v: i32) {
    buf[..4].copy_from_slice(&v.to_le_bytes());
}

pub fn read_i32(buf: &[u8]) -> DbResult<i32> {
    need(buf, 4)?;
    Ok(i32::from_le_bytes(buf[..4].try_into().unwrap()))
}

pub fn write_i64(buf: &mut [u8], v: i64) {
    buf[..8].copy_from_slice(&v.to_le_bytes());
}

pub fn read_i64(buf: &[u8]) -> DbResult<i64> {
    need(buf, 8)?;
    Ok(i64::from_le_bytes(buf[..8].try_into().unwrap()))
}

pub fn write_f32(buf: &mut [u8], v: f32) {
    buf[..4].copy_from_slice(&v.to_le_bytes());
}

pub fn read_f32(buf: &[u8]) -> DbResult<f32> {
    need(buf, 4)?;
    Ok(f32::from_le_bytes(buf[..4].try_into().unwrap()))
}

pub fn write_bool(buf: &mut [u8], v: bool) {
    buf[0] = if v { 1 } else { 0 };
}

pub fn read_bool(buf: &[u8]) -> DbResult<bool> {
    need(buf, 1)?;
    Ok(buf[0] != 0)
}

/// Writes a length-prefixed string: `u32` byte length followed by raw bytes.
pub fn write_str(buf: &mut [u8], s: &str) {
    write_u32(buf, s.len() as u32);
    buf[4..4 + s.len()].copy_from_slice(s.as_bytes());
}

pub fn str_serialized_size(s: &str) -> usize {
    4 + s.len()
}

pub fn read_str(buf: &[u8]) -> DbResult<(String, usize)> {
    let len = read_u32(buf)? as usize;
    need(buf, 4 + len)?;
    let s = std::str::from_utf8(&buf[4..4 + len])
        .map_err(|e| DbError::Corrupt(format!("invalid utf8 string: {e}")))?
        .to_owned();
    Ok((s, 4 + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        let mut buf = [0u8; 8];
        write_u32(&mut buf, 0xdead_beef);
        assert_eq!(read_u32(&buf).unwrap(), 0xdead_beef);
        write_i32(&mut buf, -42);
        assert_eq!(read_i32(&buf).unwrap(), -42);
        write_i64(&mut buf, -1);
        assert_eq!(read_i64(&buf).unwrap(), -1);
        write_f32(&mut buf, 3.5);
        assert_eq!(read_f32(&buf).unwrap(), 3.5);
    }

    #[test]
    fn round_trips_string() {
        let mut buf = [0u8; 32];
        write_str(&mut buf, "hello");
        let (s, n) = read_str(&buf).unwrap();
        assert_eq!(s, "hello");
        assert_eq!(n, str_serialized_size("hello"));
    }

    #[test]
    fn rejects_short_buffer() {
        let buf = [0u8; 2];
        assert!(read_u32(&buf).is_err());
    }
}
