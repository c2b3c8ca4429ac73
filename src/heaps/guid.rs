use owning_ref::ArcRef;
use uuid::Uuid;

/// `#GUID`: a 1-based array of 16-byte values. Index 0
/// returns the zero GUID.
#[derive(Clone)]
pub struct GuidHeap {
	data: ArcRef<[u8]>,
}

impl GuidHeap {
	pub fn new(data: ArcRef<[u8]>) -> Self {
		Self { data }
	}

	pub fn empty() -> Self {
		Self { data: ArcRef::new(std::sync::Arc::from([])).map(|d| &d[..]) }
	}

	pub fn get_guid(&self, index: u32) -> Uuid {
		if index == 0 {
			return Uuid::nil();
		}
		let offset = (index as usize - 1) * 16;
		match self.data.get(offset..offset + 16) {
			Some(bytes) => Uuid::from_slice_le(bytes).unwrap_or(Uuid::nil()),
			None => Uuid::nil(),
		}
	}
}

impl std::fmt::Debug for GuidHeap {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "GuidHeap({} entries)", self.data.len() / 16)
	}
}
