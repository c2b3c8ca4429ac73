use owning_ref::ArcRef;

use crate::error::{MetadataError, Result};
use crate::io::BinaryReader;

/// `#US`: length-prefixed UTF-16 strings, used by `ldstr` operands.
/// Out of scope for IL decoding itself, but the heap is
/// still addressable by index like the other three.
#[derive(Clone)]
pub struct UserStringsHeap {
	data: ArcRef<[u8]>,
}

impl UserStringsHeap {
	pub fn new(data: ArcRef<[u8]>) -> Self {
		Self { data }
	}

	pub fn empty() -> Self {
		Self { data: ArcRef::new(std::sync::Arc::from([0u8])).map(|d| &d[..]) }
	}

	pub fn get_string(&self, index: u32) -> Result<String> {
		let offset = index as usize;
		if offset >= self.data.len() {
			return Err(MetadataError::OutOfRange { offset, len: self.data.len() });
		}
		let mut header = BinaryReader::from_arc_ref(self.data.clone().map(|d| &d[offset..]));
		let len = header.read_compressed_u32()? as usize;
		// The trailing byte is a non-ASCII/quoting marker, not part of the text.
		let text_len = len.saturating_sub(1);
		let bytes = header.read_bytes(text_len)?;
		let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
		String::from_utf16(&units).map_err(|_| MetadataError::BadImageFormat {
			offset,
			message: "#US entry is not valid UTF-16",
		})
	}
}

impl std::fmt::Debug for UserStringsHeap {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "UserStringsHeap({} bytes)", self.data.len())
	}
}
