//! Shared bytes/file/image → [`MetadataContext`] plumbing behind
//! `AssemblyDefinition::from_*` / `ModuleDefinition::from_*`.
//!
//! Kept as one place so the four constructors on each of those two types
//! don't re-derive the same PE-parse-then-metadata-parse pipeline.

use std::path::Path;
use std::sync::Arc;

use owning_ref::ArcRef;

use crate::error::Result;
use crate::heaps::MetadataRoot;
use crate::io::BinaryReader;
use crate::model::MetadataContext;
use crate::pe::PEImage;

pub fn context_from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<MetadataContext> {
	let data = ArcRef::new(bytes.into()).map(|d| &d[..]);
	context_from_image(&PEImage::parse(data)?)
}

#[cfg(feature = "mmap")]
pub fn context_from_file(path: impl AsRef<Path>) -> Result<MetadataContext> {
	let file = std::fs::File::open(path)?;
	let mmap = unsafe { memmap2::Mmap::map(&file) }?;
	context_from_bytes(Arc::<[u8]>::from(mmap.as_ref()))
}

#[cfg(not(feature = "mmap"))]
pub fn context_from_file(path: impl AsRef<Path>) -> Result<MetadataContext> {
	let bytes = std::fs::read(path)?;
	context_from_bytes(bytes)
}

/// Consumes the rest of `reader`'s current view as the whole PE image.
pub fn context_from_reader(reader: &mut BinaryReader) -> Result<MetadataContext> {
	let bytes = reader.read_bytes(reader.remaining())?;
	context_from_image(&PEImage::parse(bytes)?)
}

pub fn context_from_image(image: &PEImage) -> Result<MetadataContext> {
	let root = MetadataRoot::read(image.metadata_root_bytes()?)?;
	Ok(MetadataContext::new(root))
}
