//! The CLI metadata root: magic/version header followed by a directory of
//! named streams.

pub mod blob;
pub mod guid;
pub mod strings;
pub mod user_strings;

use owning_ref::ArcRef;

pub use blob::BlobHeap;
pub use guid::GuidHeap;
pub use strings::StringsHeap;
pub use user_strings::UserStringsHeap;

use crate::error::{MetadataError, Result};
use crate::io::BinaryReader;
use crate::tables::TablesStream;

const METADATA_MAGIC: u32 = 0x424A5342;

/// The decoded contents of a CLI metadata root: the `#~` tables stream plus
/// whichever of `#Strings`/`#Blob`/`#GUID`/`#US` are present. Assemblies
/// built without strings, user strings or GUIDs (vanishingly rare, but legal)
/// get an empty heap rather than a missing one, so callers never need to
/// special-case their absence.
#[derive(Debug, Clone)]
pub struct MetadataRoot {
	major_version: u16,
	minor_version: u16,
	version: String,
	flags: u16,
	strings: StringsHeap,
	blobs: BlobHeap,
	guids: GuidHeap,
	user_strings: UserStringsHeap,
	tables: TablesStream,
}

impl MetadataRoot {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn read(data: ArcRef<[u8]>) -> Result<Self> {
		let mut reader = BinaryReader::from_arc_ref(data);

		let magic = reader.read_u32()?;
		if magic != METADATA_MAGIC {
			return Err(MetadataError::BadImageFormat {
				offset: 0,
				message: "metadata root magic mismatch",
			});
		}

		let major_version = reader.read_u16()?;
		let minor_version = reader.read_u16()?;
		reader.read_u32()?; // reserved

		let version_len = reader.read_u32()? as usize;
		let padded_len = (version_len + 3) / 4 * 4;
		let version_bytes = reader.read_bytes(padded_len)?;
		let nul = version_bytes.iter().position(|b| *b == 0).unwrap_or(version_bytes.len());
		let version = std::str::from_utf8(&version_bytes[..nul])
			.map_err(|_| MetadataError::BadImageFormat {
				offset: 16,
				message: "metadata version string is not valid UTF-8",
			})?
			.to_owned();

		let flags = reader.read_u16()?;
		let stream_count = reader.read_u16()? as usize;

		let mut strings = None;
		let mut blobs = None;
		let mut guids = None;
		let mut user_strings = None;
		let mut tables = None;

		for _ in 0..stream_count {
			let offset = reader.read_u32()? as usize;
			let size = reader.read_u32()? as usize;
			let name = read_padded_name(&mut reader)?;

			let stream_data = reader_source(&reader, offset, size)?;

			match name.as_str() {
				"#Strings" => strings = Some(StringsHeap::new(stream_data)),
				"#Blob" => blobs = Some(BlobHeap::new(stream_data)),
				"#GUID" => guids = Some(GuidHeap::new(stream_data)),
				"#US" => user_strings = Some(UserStringsHeap::new(stream_data)),
				"#~" | "#-" => {
					let mut table_reader = BinaryReader::from_arc_ref(stream_data);
					tables = Some(TablesStream::read(&mut table_reader)?);
				},
				_ => {}, // unrecognised/debug streams (e.g. "#Pdb") are skipped
			}
		}

		Ok(Self {
			major_version,
			minor_version,
			version,
			flags,
			strings: strings.unwrap_or_else(StringsHeap::empty),
			blobs: blobs.unwrap_or_else(BlobHeap::empty),
			guids: guids.unwrap_or_else(GuidHeap::empty),
			user_strings: user_strings.unwrap_or_else(UserStringsHeap::empty),
			tables: tables.ok_or(MetadataError::BadImageFormat {
				offset: 0,
				message: "metadata root has no #~ tables stream",
			})?,
		})
	}

	pub fn major_version(&self) -> u16 {
		self.major_version
	}

	pub fn minor_version(&self) -> u16 {
		self.minor_version
	}

	pub fn version(&self) -> &str {
		&self.version
	}

	pub fn flags(&self) -> u16 {
		self.flags
	}

	pub fn strings(&self) -> &StringsHeap {
		&self.strings
	}

	pub fn blobs(&self) -> &BlobHeap {
		&self.blobs
	}

	pub fn guids(&self) -> &GuidHeap {
		&self.guids
	}

	pub fn user_strings(&self) -> &UserStringsHeap {
		&self.user_strings
	}

	pub fn tables(&self) -> &TablesStream {
		&self.tables
	}

	/// Consumes the root, handing its heaps and tables stream to the
	/// caller by value (used by [`crate::model::MetadataContext::new`] to
	/// move them behind `Arc` without an extra clone).
	pub fn into_parts(self) -> (TablesStream, StringsHeap, BlobHeap, GuidHeap, UserStringsHeap) {
		(self.tables, self.strings, self.blobs, self.guids, self.user_strings)
	}
}

/// Stream names are NUL-terminated and padded to a 4-byte boundary.
fn read_padded_name(reader: &mut BinaryReader) -> Result<String> {
	let start = reader.position();
	let mut bytes = Vec::new();
	loop {
		let b = reader.read_u8()?;
		if b == 0 {
			break;
		}
		bytes.push(b);
	}
	let consumed = reader.position() - start;
	let pad = (4 - consumed % 4) % 4;
	for _ in 0..pad {
		reader.read_u8()?;
	}
	String::from_utf8(bytes).map_err(|_| MetadataError::BadImageFormat {
		offset: start,
		message: "stream name is not valid UTF-8",
	})
}

/// An `ArcRef` view over `[offset, offset + size)` of the metadata root
/// buffer the reader was constructed from, independent of the reader's
/// current cursor position.
fn reader_source(reader: &BinaryReader, offset: usize, size: usize) -> Result<ArcRef<[u8]>> {
	Ok(reader.fork(offset, size)?.as_arc_ref())
}
