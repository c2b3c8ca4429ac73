//! Portable Executable parsing: just enough of the DOS header, PE header
//! and section table to resolve the CLI header's RVA and hand the metadata
//! root bytes to [`crate::heaps::MetadataRoot`].

use std::fmt::{Debug, Formatter};
use std::ops::Range;
use std::sync::Arc;

use bitflags::bitflags;
use owning_ref::ArcRef;

use crate::error::{MetadataError, Result};
use crate::io::BinaryReader;
use crate::token::MetadataToken;

const DOS_MAGIC: u16 = 0x5A4D;
const PE_MAGIC: u32 = 0x4550;
const PE32_MAGIC: u16 = 0x010B;
const PE64_MAGIC: u16 = 0x020B;
const CLI_DATA_DIRECTORY: usize = 14;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DataDirectory {
	pub virtual_address: u32,
	pub size: u32,
}

impl DataDirectory {
	fn read(reader: &mut BinaryReader) -> Result<Self> {
		Ok(Self { virtual_address: reader.read_u32()?, size: reader.read_u32()? })
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ImageFileHeader {
	pub machine: u16,
	pub number_of_sections: u16,
	pub time_date_stamp: u32,
	pub pointer_to_symbol_table: u32,
	pub number_of_symbols: u32,
	pub size_of_optional_header: u16,
	pub characteristics: u16,
}

impl ImageFileHeader {
	fn read(reader: &mut BinaryReader) -> Result<Self> {
		Ok(Self {
			machine: reader.read_u16()?,
			number_of_sections: reader.read_u16()?,
			time_date_stamp: reader.read_u32()?,
			pointer_to_symbol_table: reader.read_u32()?,
			number_of_symbols: reader.read_u32()?,
			size_of_optional_header: reader.read_u16()?,
			characteristics: reader.read_u16()?,
		})
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ImageOptionalHeader {
	None,
	PE32 { image_base: u32, data_directories: [DataDirectory; 16] },
	PE64 { image_base: u64, data_directories: [DataDirectory; 16] },
}

impl ImageOptionalHeader {
	fn read(reader: &mut BinaryReader, size: usize) -> Result<Self> {
		if size == 0 {
			return Ok(Self::None);
		}
		let start = reader.position();
		let magic = reader.read_u16()?;
		match magic {
			PE32_MAGIC => {
				reader.set_position(start + 28);
				let image_base = reader.read_u32()?;
				reader.set_position(start + 96);
				let data_directories = read_data_directories(reader)?;
				reader.set_position(start + size);
				Ok(Self::PE32 { image_base, data_directories })
			},
			PE64_MAGIC => {
				reader.set_position(start + 24);
				let image_base = reader.read_u64()?;
				reader.set_position(start + 112);
				let data_directories = read_data_directories(reader)?;
				reader.set_position(start + size);
				Ok(Self::PE64 { image_base, data_directories })
			},
			_ => Err(MetadataError::BadImageFormat { offset: start, message: "unrecognised optional header magic" }),
		}
	}

	fn data_directory(&self, index: usize) -> Option<DataDirectory> {
		match self {
			Self::None => None,
			Self::PE32 { data_directories, .. } => data_directories.get(index).copied(),
			Self::PE64 { data_directories, .. } => data_directories.get(index).copied(),
		}
	}
}

fn read_data_directories(reader: &mut BinaryReader) -> Result<[DataDirectory; 16]> {
	let mut dirs = [DataDirectory { virtual_address: 0, size: 0 }; 16];
	for dir in &mut dirs {
		*dir = DataDirectory::read(reader)?;
	}
	Ok(dirs)
}

bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct RuntimeFlags: u32 {
		const IL_ONLY = 0x1;
		const REQUIRE_32BIT = 0x2;
		const IL_LIBRARY = 0x4;
		const STRONG_NAME_SIGNED = 0x8;
		const NATIVE_ENTRYPOINT = 0x10;
		const TRACK_DEBUG_DATA = 0x10000;
		const PREFER_32BIT = 0x00020000;
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CliHeader {
	pub size_in_bytes: u32,
	pub major_runtime_version: u16,
	pub minor_runtime_version: u16,
	pub metadata: DataDirectory,
	pub flags: RuntimeFlags,
	pub entry_point_token: MetadataToken,
	pub resources: DataDirectory,
	pub strong_name_signature: DataDirectory,
}

impl CliHeader {
	fn read(reader: &mut BinaryReader) -> Result<Self> {
		Ok(Self {
			size_in_bytes: reader.read_u32()?,
			major_runtime_version: reader.read_u16()?,
			minor_runtime_version: reader.read_u16()?,
			metadata: DataDirectory::read(reader)?,
			flags: RuntimeFlags::from_bits_truncate(reader.read_u32()?),
			entry_point_token: MetadataToken::from_u32(reader.read_u32()?)?,
			resources: DataDirectory::read(reader)?,
			strong_name_signature: DataDirectory::read(reader)?,
		})
	}
}

#[derive(Clone, Eq, PartialEq)]
struct SectionName([u8; 8]);

impl SectionName {
	fn as_str(&self) -> &str {
		match std::str::from_utf8(&self.0) {
			Ok(name) => name.trim_end_matches('\0'),
			Err(_) => "<invalid>",
		}
	}
}

impl Debug for SectionName {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}", self.as_str())
	}
}

#[derive(Debug, Clone)]
struct Section {
	name: SectionName,
	virtual_address: u32,
	virtual_size: u32,
	data: Arc<[u8]>,
}

impl Section {
	/// Matches raw file data size rather than the header's virtual size, so
	/// the range always stays within the bytes actually copied into `data`.
	fn virtual_range(&self) -> Range<u32> {
		self.virtual_address..self.virtual_address + self.data.len() as u32
	}
}

/// A parsed `.dll`/`.exe` image: DOS header, PE header, section table and
/// (if present) the CLI/.NET header it points to.
#[derive(Debug, Clone)]
pub struct PEImage {
	image_file_header: ImageFileHeader,
	image_optional_header: ImageOptionalHeader,
	sections: Vec<Section>,
	cli_header: Option<CliHeader>,
}

impl PEImage {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn parse(data: ArcRef<[u8]>) -> Result<Self> {
		let mut reader = BinaryReader::from_arc_ref(data);

		let dos_magic = reader.read_u16()?;
		if dos_magic != DOS_MAGIC {
			return Err(MetadataError::BadImageFormat { offset: 0, message: "DOS header magic mismatch" });
		}
		reader.set_position(0x3C);
		let pe_header_offset = reader.read_u32()? as usize;

		reader.set_position(pe_header_offset);
		let pe_magic = reader.read_u32()?;
		if pe_magic != PE_MAGIC {
			return Err(MetadataError::BadImageFormat { offset: pe_header_offset, message: "PE header magic mismatch" });
		}

		let image_file_header = ImageFileHeader::read(&mut reader)?;
		let optional_header_start = reader.position();
		let image_optional_header =
			ImageOptionalHeader::read(&mut reader, image_file_header.size_of_optional_header as usize)?;
		reader.set_position(optional_header_start + image_file_header.size_of_optional_header as usize);

		let mut sections = Vec::with_capacity(image_file_header.number_of_sections as usize);
		for _ in 0..image_file_header.number_of_sections {
			let mut name = [0u8; 8];
			for byte in &mut name {
				*byte = reader.read_u8()?;
			}
			let virtual_size = reader.read_u32()?;
			let virtual_address = reader.read_u32()?;
			let size_of_raw_data = reader.read_u32()?;
			let pointer_to_raw_data = reader.read_u32()?;
			reader.set_position(reader.position() + 16); // relocations/line numbers/characteristics

			let raw_data = reader.fork(pointer_to_raw_data as usize, size_of_raw_data as usize)?;
			sections.push(Section {
				name: SectionName(name),
				virtual_address,
				virtual_size,
				data: Arc::from(raw_data.bytes()),
			});
		}

		let mut image = Self { image_file_header, image_optional_header, sections, cli_header: None };

		if let Some(dir) = image.image_optional_header.data_directory(CLI_DATA_DIRECTORY) {
			if dir.virtual_address != 0 {
				let cli_bytes = image
					.resolve_rva(dir.virtual_address)
					.ok_or(MetadataError::BadImageFormat { offset: 0, message: "CLI header RVA has no backing section" })?;
				let mut cli_reader = BinaryReader::new(Arc::from(&cli_bytes[..cli_bytes.len().min(72)]));
				image.cli_header = Some(CliHeader::read(&mut cli_reader)?);
			}
		}

		Ok(image)
	}

	pub fn image_file_header(&self) -> &ImageFileHeader {
		&self.image_file_header
	}

	pub fn image_optional_header(&self) -> &ImageOptionalHeader {
		&self.image_optional_header
	}

	/// The parsed CLI header, if this image carries a populated .NET data
	/// directory.
	pub fn cli_header(&self) -> Option<CliHeader> {
		self.cli_header
	}

	/// Translates a relative virtual address into the bytes of whichever
	/// section contains it.
	pub fn resolve_rva(&self, rva: u32) -> Option<&[u8]> {
		let section = self.sections.iter().find(|s| s.virtual_range().contains(&rva))?;
		let index = (rva - section.virtual_address) as usize;
		section.data.get(index..)
	}

	/// The CLI metadata root bytes, resolved through the CLI header's
	/// metadata data directory.
	pub fn metadata_root_bytes(&self) -> Result<ArcRef<[u8]>> {
		let header = self.cli_header.ok_or(MetadataError::BadImageFormat {
			offset: 0,
			message: "image has no CLI header",
		})?;
		let bytes = self
			.resolve_rva(header.metadata.virtual_address)
			.ok_or(MetadataError::BadImageFormat { offset: 0, message: "metadata RVA has no backing section" })?;
		let bytes = &bytes[..bytes.len().min(header.metadata.size as usize)];
		Ok(ArcRef::new(Arc::<[u8]>::from(bytes)).map(|d| &d[..]))
	}
}
