use std::fmt::{Display, Formatter};

use crate::token::{CodedIndexKind, TableIndex};

/// The error taxonomy shared by every component of the crate.
///
/// Structural errors (`BadImageFormat`, `OutOfRange`, `InvalidCodedIndex`)
/// surface immediately at construction; `NotSerialized` surfaces at the
/// access site of whichever call required a loaded backing. The resolver
/// never produces one of these for "assembly not found" — see
/// [`crate::resolver::AssemblyResolver::resolve`].
#[derive(Debug)]
pub enum MetadataError {
	/// A structural violation: missing `.NET` directory, missing metadata
	/// stream, bad magic, unknown table index, impossible row-count encoding.
	BadImageFormat { offset: usize, message: &'static str },
	/// A read crossed the end of the backing stream or a heap bound.
	OutOfRange { offset: usize, len: usize },
	/// A coded index's tag selected a table outside its candidate list.
	InvalidCodedIndex { kind: CodedIndexKind, raw: u32 },
	/// A row id pointed past the end of its table.
	InvalidRowId { table: TableIndex, rid: u32, row_count: u32 },
	/// `lookup_member` (or a lazy field that requires one) was called on a
	/// module that wasn't produced by the loader.
	NotSerialized,
	/// Propagated from the PE/file layer.
	Io(std::io::Error),
}

impl Display for MetadataError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			MetadataError::BadImageFormat { offset, message } => {
				write!(f, "bad image format at offset {offset:#x}: {message}")
			},
			MetadataError::OutOfRange { offset, len } => {
				write!(f, "read at offset {offset:#x} exceeds bound of {len:#x} bytes")
			},
			MetadataError::InvalidCodedIndex { kind, raw } => {
				write!(f, "coded index {kind:?} with raw value {raw:#x} selects a nonexistent table")
			},
			MetadataError::InvalidRowId { table, rid, row_count } => {
				write!(f, "rid {rid} is out of range for table {table:?} ({row_count} rows)")
			},
			MetadataError::NotSerialized => {
				write!(f, "member lookup requires a loaded (serialized) module")
			},
			MetadataError::Io(err) => write!(f, "{err}"),
		}
	}
}

impl std::error::Error for MetadataError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			MetadataError::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl From<std::io::Error> for MetadataError {
	fn from(value: std::io::Error) -> Self {
		Self::Io(value)
	}
}

pub type Result<T> = std::result::Result<T, MetadataError>;
