use std::path::Path;
use std::sync::{Arc, RwLock, Weak};

use crate::error::Result;
use crate::io::BinaryReader;
use crate::lazy::{Lazy, OwnedCollection};
use crate::model::flags::{AssemblyFlags, AssemblyHashAlgorithm};
use crate::model::module::ModuleDefinition;
use crate::model::{AssemblyVersion, MetadataContext};
use crate::pe::PEImage;
use crate::resolver::AssemblyDescriptor;
use crate::tables::rows::Assembly as AssemblyRow;
use crate::token::{MetadataToken, TableIndex};

/// A non-owning handle to an [`AssemblyDefinition`].
#[derive(Clone)]
pub struct AssemblyHandle(Weak<AssemblyInner>);

impl AssemblyHandle {
	pub fn upgrade(&self) -> Option<AssemblyDefinition> {
		self.0.upgrade().map(AssemblyDefinition)
	}
}

impl std::fmt::Debug for AssemblyHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "AssemblyHandle({:?})", self.0.upgrade().map(|a| AssemblyDefinition(a).token()))
	}
}

struct AssemblyInner {
	token: MetadataToken,
	context: Option<MetadataContext>,
	row: Option<AssemblyRow>,
	self_handle: AssemblyHandle,

	name: Lazy<Arc<str>>,
	culture: Lazy<Arc<str>>,
	public_key: Lazy<Arc<[u8]>>,
	flags: RwLock<AssemblyFlags>,
	modules: Lazy<Arc<RwLock<OwnedCollection<AssemblyHandle, ModuleDefinition>>>>,
}

/// The manifest row (`Assembly`, rid 1 by convention) identifying this
/// .NET assembly: name, version, culture, public key and the hash
/// algorithm its references are checked against.
#[derive(Clone)]
pub struct AssemblyDefinition(Arc<AssemblyInner>);

impl AssemblyDefinition {
	pub(crate) fn from_context(context: MetadataContext, rid: u32) -> Result<Self> {
		let row = context.tables().row_checked::<AssemblyRow>(rid)?.clone();
		let token = MetadataToken::new(TableIndex::Assembly, rid);
		let flags = AssemblyFlags::from_bits_truncate(row.flags);
		Ok(Arc::new_cyclic(|weak| AssemblyInner {
			token,
			context: Some(context),
			row: Some(row),
			self_handle: AssemblyHandle(weak.clone()),
			name: Lazy::unset(),
			culture: Lazy::unset(),
			public_key: Lazy::unset(),
			flags: RwLock::new(flags),
			modules: Lazy::unset(),
		})
		.into())
	}

	/// Builds an assembly with no backing row and a single empty module
	/// named `name`, ready for programmatic construction.
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		let name = name.into();
		let inner = Arc::new_cyclic(|weak| AssemblyInner {
			token: MetadataToken::new(TableIndex::Assembly, 0),
			context: None,
			row: None,
			self_handle: AssemblyHandle(weak.clone()),
			name: Lazy::set_value(name.clone()),
			culture: Lazy::set_value("".into()),
			public_key: Lazy::set_value(Arc::from([])),
			flags: RwLock::new(AssemblyFlags::empty()),
			modules: Lazy::unset(),
		});
		let assembly = Self(inner);
		let module = ModuleDefinition::new(name);
		let modules = OwnedCollection::from_elements(assembly.handle(), vec![module]);
		assembly.0.modules.set(Arc::new(RwLock::new(modules)));
		assembly
	}

	pub fn token(&self) -> MetadataToken {
		self.0.token
	}

	pub fn handle(&self) -> AssemblyHandle {
		self.0.self_handle.clone()
	}

	pub fn name(&self) -> Arc<str> {
		self.0.name.get_or_init(|| self.string_field(|row| row.name.0))
	}

	pub fn set_name(&self, name: impl Into<Arc<str>>) {
		self.0.name.set(name.into());
	}

	pub fn culture(&self) -> Arc<str> {
		self.0.culture.get_or_init(|| self.string_field(|row| row.culture.0))
	}

	fn string_field(&self, select: impl Fn(&AssemblyRow) -> u32) -> Arc<str> {
		match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => ctx.strings().get_string(select(row)).unwrap_or("").into(),
			_ => "".into(),
		}
	}

	pub fn version(&self) -> AssemblyVersion {
		match &self.0.row {
			Some(row) => {
				AssemblyVersion { major: row.major_version, minor: row.minor_version, build: row.build_number, revision: row.revision_number }
			},
			None => AssemblyVersion::default(),
		}
	}

	pub fn hash_algorithm(&self) -> AssemblyHashAlgorithm {
		self.0.row.as_ref().map(|row| AssemblyHashAlgorithm::from_raw(row.hash_alg_id)).unwrap_or(AssemblyHashAlgorithm::None)
	}

	pub fn flags(&self) -> AssemblyFlags {
		*self.0.flags.read().unwrap()
	}

	pub fn set_flags(&self, flags: AssemblyFlags) {
		*self.0.flags.write().unwrap() = flags;
	}

	pub fn public_key(&self) -> Arc<[u8]> {
		self.0.public_key.get_or_init(|| match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => match ctx.blobs().get_blob(row.public_key.0) {
				Ok(reader) => Arc::from(reader.bytes()),
				Err(_) => Arc::from([]),
			},
			_ => Arc::from([]),
		})
	}

	/// This assembly's modules, manifest module first. Single-module
	/// assemblies — the vast majority in practice — always report exactly one.
	pub fn modules(&self) -> Arc<RwLock<OwnedCollection<AssemblyHandle, ModuleDefinition>>> {
		self.0.modules.get_or_init(|| {
			let elements = match &self.0.context {
				Some(ctx) => self.load_modules(ctx).unwrap_or_default(),
				None => Vec::new(),
			};
			Arc::new(RwLock::new(OwnedCollection::from_elements(self.handle(), elements)))
		})
	}

	fn load_modules(&self, ctx: &MetadataContext) -> Result<Vec<ModuleDefinition>> {
		let row_count = ctx.tables().row_count(TableIndex::Module);
		(1..=row_count).map(|rid| ctx.get_or_build_module(rid)).collect()
	}

	/// Parses `bytes` as a PE image and returns its manifest assembly (row 1
	/// of the `Assembly` table). Fails if the image has no CLI header, no
	/// `#~` tables stream, or no `Assembly` row — a module-only assembly in
	/// a multi-module deployment has none; load it via
	/// [`ModuleDefinition::from_bytes`] instead.
	pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
		crate::loader::context_from_bytes(bytes)?.get_or_build_assembly(1)
	}

	/// As [`Self::from_bytes`], reading the file at `path` (mapped via
	/// `memmap2` when the `mmap` feature is enabled, else read fully into
	/// memory).
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		crate::loader::context_from_file(path)?.get_or_build_assembly(1)
	}

	/// As [`Self::from_bytes`], consuming the remainder of `reader`'s
	/// current view as the whole PE image.
	pub fn from_reader(reader: &mut BinaryReader) -> Result<Self> {
		crate::loader::context_from_reader(reader)?.get_or_build_assembly(1)
	}

	/// Builds from an already-parsed [`PEImage`], for callers who located
	/// and validated the PE layer themselves.
	pub fn from_image(image: &PEImage) -> Result<Self> {
		crate::loader::context_from_image(image)?.get_or_build_assembly(1)
	}

	/// A resolver-facing snapshot of this assembly's identity, for comparing
	/// a probed candidate against the descriptor it's meant to satisfy.
	pub fn descriptor(&self) -> AssemblyDescriptor {
		AssemblyDescriptor { name: self.name(), version: self.version(), culture: self.culture(), public_key_token: self.public_key() }
	}
}

impl std::fmt::Debug for AssemblyDefinition {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AssemblyDefinition")
			.field("token", &self.token())
			.field("name", &self.name())
			.field("version", &self.version())
			.finish()
	}
}

impl From<Arc<AssemblyInner>> for AssemblyDefinition {
	fn from(inner: Arc<AssemblyInner>) -> Self {
		Self(inner)
	}
}
