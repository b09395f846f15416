mod hash_table_bucket_page;
mod hash_table_directory_page;
mod page;
mod table_page;

pub use hash_table_bucket_page::*;
pub use hash_table_directory_page::*;
pub use page::*;
pub use table_page::*;

use bytes::{Buf, BufMut};

/// Reads a little-endian `u32` at `offset`.
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    (&data[offset..offset + 4]).get_u32_le()
}

/// Writes a little-endian `u32` at `offset`.
pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    let mut buf = &mut data[offset..offset + 4];
    buf.put_u32_le(value);
}

pub(crate) fn read_i32(data: &[u8], offset: usize) -> i32 {
    (&data[offset..offset + 4]).get_i32_le()
}

pub(crate) fn write_i32(data: &mut [u8], offset: usize, value: i32) {
    let mut buf = &mut data[offset..offset + 4];
    buf.put_i32_le(value);
}

pub(crate) fn read_i64(data: &[u8], offset: usize) -> i64 {
    (&data[offset..offset + 8]).get_i64_le()
}

pub(crate) fn write_i64(data: &mut [u8], offset: usize, value: i64) {
    let mut buf = &mut data[offset..offset + 8];
    buf.put_i64_le(value);
}
