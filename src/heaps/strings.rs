use owning_ref::ArcRef;

/// `#Strings`: UTF-8 strings terminated by a zero byte, indexed by byte
/// offset. Index 0 is always the empty string.
#[derive(Clone)]
pub struct StringsHeap {
	data: ArcRef<[u8]>,
}

impl StringsHeap {
	pub fn new(data: ArcRef<[u8]>) -> Self {
		Self { data }
	}

	pub fn empty() -> Self {
		Self { data: ArcRef::new(std::sync::Arc::from([0u8])).map(|d| &d[..]) }
	}

	/// `null` for index 0; otherwise the string starting at `index`.
	pub fn get_string(&self, index: u32) -> Option<&str> {
		if index == 0 {
			return None;
		}
		let slice = self.data.get(index as usize..)?;
		let end = slice.iter().position(|b| *b == 0)?;
		std::str::from_utf8(&slice[..end]).ok()
	}
}

impl std::fmt::Debug for StringsHeap {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "StringsHeap({} bytes)", self.data.len())
	}
}
