//! Random-access, bounds-checked reads over an `Arc`-owned byte buffer.
//!
//! `BinaryReader` never borrows from a caller-supplied lifetime: it holds an
//! [`ArcRef`] into a shared buffer, so sub-views (`fork`) and the values
//! decoded from them can outlive the original `from_bytes`/`from_file` call
//! and be shared freely across threads — the lazy object model in
//! [`crate::model`] depends on this.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use owning_ref::ArcRef;

use crate::error::{MetadataError, Result};

#[derive(Clone)]
pub struct BinaryReader {
	data: ArcRef<[u8]>,
	position: usize,
}

impl Debug for BinaryReader {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BinaryReader")
			.field("position", &self.position)
			.field("len", &self.data.len())
			.finish()
	}
}

impl BinaryReader {
	pub fn new(data: Arc<[u8]>) -> Self {
		Self { data: ArcRef::new(data).map(|d| &d[..]), position: 0 }
	}

	pub fn from_arc_ref(data: ArcRef<[u8]>) -> Self {
		Self { data, position: 0 }
	}

	#[inline]
	pub fn position(&self) -> usize {
		self.position
	}

	#[inline]
	pub fn set_position(&mut self, position: usize) {
		self.position = position;
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	#[inline]
	pub fn remaining(&self) -> usize {
		self.data.len().saturating_sub(self.position)
	}

	/// Backing bytes from the current position to the end of the view.
	pub fn bytes(&self) -> &[u8] {
		&self.data[self.position..]
	}

	/// The full backing view this reader was constructed over, independent
	/// of the current cursor position.
	pub fn as_arc_ref(&self) -> ArcRef<[u8]> {
		self.data.clone()
	}

	/// An independent sub-reader over `[offset, offset + len)` of the
	/// *original* buffer this reader was constructed from.
	pub fn fork(&self, offset: usize, len: usize) -> Result<BinaryReader> {
		let end = offset.checked_add(len).ok_or(MetadataError::OutOfRange { offset, len })?;
		if end > self.data.len() {
			return Err(MetadataError::OutOfRange { offset, len });
		}
		let view = self.data.clone().map(|d| &d[offset..end]);
		Ok(BinaryReader { data: view, position: 0 })
	}

	fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
		let end = self.position + buf.len();
		if end > self.data.len() {
			return Err(MetadataError::OutOfRange { offset: self.position, len: self.data.len() });
		}
		buf.copy_from_slice(&self.data[self.position..end]);
		self.position = end;
		Ok(())
	}

	pub fn read_u8(&mut self) -> Result<u8> {
		let mut b = [0u8; 1];
		self.read_exact(&mut b)?;
		Ok(b[0])
	}

	pub fn read_u16(&mut self) -> Result<u16> {
		let mut b = [0u8; 2];
		self.read_exact(&mut b)?;
		Ok(u16::from_le_bytes(b))
	}

	pub fn read_u32(&mut self) -> Result<u32> {
		let mut b = [0u8; 4];
		self.read_exact(&mut b)?;
		Ok(u32::from_le_bytes(b))
	}

	pub fn read_u64(&mut self) -> Result<u64> {
		let mut b = [0u8; 8];
		self.read_exact(&mut b)?;
		Ok(u64::from_le_bytes(b))
	}

	pub fn read_uint(&mut self, width: usize) -> Result<u32> {
		match width {
			2 => Ok(self.read_u16()? as u32),
			4 => self.read_u32(),
			_ => unreachable!("index widths are always 2 or 4 bytes"),
		}
	}

	/// Reads `n` bytes and returns an owned view sharing the backing buffer.
	pub fn read_bytes(&mut self, n: usize) -> Result<ArcRef<[u8]>> {
		let end = self.position + n;
		if end > self.data.len() {
			return Err(MetadataError::OutOfRange { offset: self.position, len: self.data.len() });
		}
		let slice = self.data.clone().map(|d| &d[self.position..end]);
		self.position = end;
		Ok(slice)
	}

	/// ECMA-335 §II.23.2 compressed unsigned integer: 1, 2 or 4 bytes.
	pub fn read_compressed_u32(&mut self) -> Result<u32> {
		let first = self.read_u8()?;
		if first & 0x80 == 0 {
			return Ok(first as u32);
		}
		if first & 0xC0 == 0x80 {
			let second = self.read_u8()?;
			return Ok((((first & 0x3F) as u32) << 8) | second as u32);
		}
		if first & 0xE0 == 0xC0 {
			let rest = self.read_u8()? as u32;
			let rest = (rest << 8) | self.read_u8()? as u32;
			let rest = (rest << 8) | self.read_u8()? as u32;
			return Ok((((first & 0x1F) as u32) << 24) | rest);
		}
		Err(MetadataError::BadImageFormat {
			offset: self.position - 1,
			message: "invalid compressed unsigned integer prefix",
		})
	}

	/// ECMA-335 §II.23.2 compressed signed integer.
	pub fn read_compressed_i32(&mut self) -> Result<i32> {
		let value = self.read_compressed_u32()?;
		let negative = value & 1 != 0;
		let value = value >> 1;
		let value = match negative {
			false => value as i32,
			true if value < 0x40 => value as i32 - 0x40,
			true if value < 0x2000 => value as i32 - 0x2000,
			true if value < 0x10000000 => value as i32 - 0x10000000,
			true => value as i32 - 0x20000000,
		};
		Ok(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn reader(bytes: &[u8]) -> BinaryReader {
		BinaryReader::new(Arc::from(bytes))
	}

	#[test]
	fn compressed_u32_one_byte_boundary() {
		assert_eq!(reader(&[0x00]).read_compressed_u32().unwrap(), 0);
		assert_eq!(reader(&[0x7F]).read_compressed_u32().unwrap(), 0x7F);
	}

	#[test]
	fn compressed_u32_two_byte_boundary() {
		assert_eq!(reader(&[0x80, 0x80]).read_compressed_u32().unwrap(), 0x80);
		assert_eq!(reader(&[0xBF, 0xFF]).read_compressed_u32().unwrap(), 0x3FFF);
	}

	#[test]
	fn compressed_u32_four_byte_boundary() {
		assert_eq!(reader(&[0xC0, 0x00, 0x40, 0x00]).read_compressed_u32().unwrap(), 0x4000);
		assert_eq!(reader(&[0xDF, 0xFF, 0xFF, 0xFF]).read_compressed_u32().unwrap(), 0x1FFF_FFFF);
	}

	#[test]
	fn compressed_u32_invalid_prefix_errors() {
		assert!(reader(&[0xF0]).read_compressed_u32().is_err());
	}

	#[test]
	fn compressed_i32_round_trips_small_values() {
		assert_eq!(reader(&[0x06]).read_compressed_i32().unwrap(), 3);
		assert_eq!(reader(&[0x7F]).read_compressed_i32().unwrap(), -1);
		assert_eq!(reader(&[0x01]).read_compressed_i32().unwrap(), -64);
	}

	#[test]
	fn fork_is_independent_of_the_parent_cursor() {
		let mut r = reader(&[1, 2, 3, 4, 5]);
		r.read_u16().unwrap();
		let forked = r.fork(0, 2).unwrap();
		assert_eq!(forked.bytes(), &[1, 2]);
		assert_eq!(r.position(), 2);
	}

	#[test]
	fn fork_out_of_range_errors() {
		let r = reader(&[1, 2, 3]);
		assert!(r.fork(2, 5).is_err());
	}

	#[test]
	fn read_bytes_advances_position_and_shares_storage() {
		let mut r = reader(&[10, 20, 30]);
		let slice = r.read_bytes(2).unwrap();
		assert_eq!(&*slice, &[10, 20]);
		assert_eq!(r.remaining(), 1);
	}
}
