use owning_ref::ArcRef;

use crate::error::{MetadataError, Result};
use crate::io::BinaryReader;

/// `#Blob`: length-prefixed (compressed-integer length) byte runs.
#[derive(Clone)]
pub struct BlobHeap {
	data: ArcRef<[u8]>,
}

impl BlobHeap {
	pub fn new(data: ArcRef<[u8]>) -> Self {
		Self { data }
	}

	pub fn empty() -> Self {
		Self { data: ArcRef::new(std::sync::Arc::from([0u8])).map(|d| &d[..]) }
	}

	/// A reader over the length-prefixed slice at `index`. Index 0 yields
	/// an empty reader.
	pub fn get_blob(&self, index: u32) -> Result<BinaryReader> {
		if index == 0 {
			return Ok(BinaryReader::from_arc_ref(self.data.clone().map(|d| &d[0..0])));
		}
		let offset = index as usize;
		if offset >= self.data.len() {
			return Err(MetadataError::OutOfRange { offset, len: self.data.len() });
		}
		let mut header = BinaryReader::from_arc_ref(self.data.clone().map(|d| &d[offset..]));
		let len = header.read_compressed_u32()? as usize;
		let start = offset + header.position();
		let end = start.checked_add(len).ok_or(MetadataError::OutOfRange { offset: start, len })?;
		if end > self.data.len() {
			return Err(MetadataError::OutOfRange { offset: start, len: self.data.len() });
		}
		Ok(BinaryReader::from_arc_ref(self.data.clone().map(|d| &d[start..end])))
	}
}

impl std::fmt::Debug for BlobHeap {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "BlobHeap({} bytes)", self.data.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn heap(bytes: &[u8]) -> BlobHeap {
		BlobHeap::new(ArcRef::new(std::sync::Arc::from(bytes)).map(|d| &d[..]))
	}

	#[test]
	fn index_zero_is_an_empty_blob() {
		let blob = heap(&[0u8]).get_blob(0).unwrap();
		assert!(blob.bytes().is_empty());
	}

	#[test]
	fn reads_one_byte_length_prefix() {
		let h = heap(&[0, 3, b'a', b'b', b'c']);
		let blob = h.get_blob(1).unwrap();
		assert_eq!(blob.bytes(), b"abc");
	}

	#[test]
	fn reads_two_byte_length_prefix() {
		// 0x81 0x2C == compressed length 300, per ECMA-335 §II.23.2.
		let mut bytes = vec![0u8, 0x81, 0x2C];
		bytes.extend(std::iter::repeat(b'x').take(300));
		let h = heap(&bytes);
		let blob = h.get_blob(1).unwrap();
		assert_eq!(blob.bytes().len(), 300);
	}

	#[test]
	fn index_at_end_of_heap_is_out_of_range() {
		let h = heap(&[0u8]);
		assert!(h.get_blob(1).is_err());
	}
}
