use std::path::Path;
use std::sync::{Arc, Weak};

use uuid::Uuid;

use crate::error::{MetadataError, Result};
use crate::io::BinaryReader;
use crate::lazy::{HasOwner, Lazy, OwnedCollection};
use crate::model::assembly::AssemblyHandle;
use crate::model::assembly_ref::AssemblyReference;
use crate::model::type_def::{TypeDefinition, TypeOwner};
use crate::model::{Member, MetadataContext};
use crate::pe::PEImage;
use crate::tables::rows::Module as ModuleRow;
use crate::token::{MetadataToken, TableIndex};

/// A non-owning handle to a [`ModuleDefinition`], used as the `Owner` type
/// parameter of [`OwnedCollection`]s whose elements need to reach back to
/// their module without extending its lifetime.
#[derive(Clone)]
pub struct ModuleHandle(Weak<ModuleInner>);

impl ModuleHandle {
	pub fn upgrade(&self) -> Option<ModuleDefinition> {
		self.0.upgrade().map(ModuleDefinition)
	}

	/// A handle that never upgrades, used when a type's owning module can't
	/// be resolved (e.g. a malformed `Module` table in a hand-assembled
	/// image under test).
	pub(crate) fn dangling() -> Self {
		Self(Weak::new())
	}
}

impl std::fmt::Debug for ModuleHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "ModuleHandle({:?})", self.0.upgrade().map(|m| ModuleDefinition(m).token()))
	}
}

struct ModuleInner {
	token: MetadataToken,
	context: Option<MetadataContext>,
	row: Option<ModuleRow>,
	self_handle: ModuleHandle,

	owner: Lazy<Option<AssemblyHandle>>,
	name: Lazy<Arc<str>>,
	mvid: Lazy<Uuid>,
	enc_id: Lazy<Uuid>,
	enc_base_id: Lazy<Uuid>,
	top_level_types: Lazy<Arc<std::sync::RwLock<OwnedCollection<TypeOwner, TypeDefinition>>>>,
	assembly_references: Lazy<Arc<std::sync::RwLock<OwnedCollection<ModuleHandle, AssemblyReference>>>>,
}

/// The container holding a module's top-level types and assembly
/// references. One module is constructed
/// per loaded CLI metadata stream; hand-built modules (no backing row) can
/// be created for test fixtures or programmatic graphs, but
/// [`ModuleDefinition::lookup_member`] on one always fails with
/// [`MetadataError::NotSerialized`].
#[derive(Clone)]
pub struct ModuleDefinition(Arc<ModuleInner>);

impl ModuleDefinition {
	/// Row 1 of the `Module` table is always the module that owns the
	/// metadata stream it was read from.
	pub(crate) fn from_context(context: MetadataContext, rid: u32) -> Result<Self> {
		let row = context.tables().row_checked::<ModuleRow>(rid)?.clone();
		let token = MetadataToken::new(TableIndex::Module, rid);
		Ok(Self::new_loaded(context, token, row))
	}

	fn new_loaded(context: MetadataContext, token: MetadataToken, row: ModuleRow) -> Self {
		Arc::new_cyclic(|weak| ModuleInner {
			token,
			context: Some(context),
			row: Some(row),
			self_handle: ModuleHandle(weak.clone()),
			owner: Lazy::unset(),
			name: Lazy::unset(),
			mvid: Lazy::unset(),
			enc_id: Lazy::unset(),
			enc_base_id: Lazy::unset(),
			top_level_types: Lazy::unset(),
			assembly_references: Lazy::unset(),
		})
		.into()
	}

	/// Builds a module with no backing metadata stream. Every field is
	/// user-settable; [`Self::lookup_member`] always returns
	/// [`MetadataError::NotSerialized`].
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		let inner = Arc::new_cyclic(|weak| ModuleInner {
			token: MetadataToken::new(TableIndex::Module, 1),
			context: None,
			row: None,
			self_handle: ModuleHandle(weak.clone()),
			owner: Lazy::unset(),
			name: Lazy::set_value(name.into()),
			mvid: Lazy::set_value(Uuid::nil()),
			enc_id: Lazy::set_value(Uuid::nil()),
			enc_base_id: Lazy::set_value(Uuid::nil()),
			top_level_types: Lazy::unset(),
			assembly_references: Lazy::unset(),
		});
		Self(inner)
	}

	pub fn token(&self) -> MetadataToken {
		self.0.token
	}

	pub fn handle(&self) -> ModuleHandle {
		self.0.self_handle.clone()
	}

	pub fn name(&self) -> Arc<str> {
		self.0.name.get_or_init(|| match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => {
				ctx.strings().get_string(row.name.0).unwrap_or("").into()
			},
			_ => "".into(),
		})
	}

	pub fn set_name(&self, name: impl Into<Arc<str>>) {
		self.0.name.set(name.into());
	}

	pub fn mvid(&self) -> Uuid {
		self.0.mvid.get_or_init(|| self.guid_field(|row| row.mvid.0))
	}

	pub fn enc_id(&self) -> Uuid {
		self.0.enc_id.get_or_init(|| self.guid_field(|row| row.enc_id.0))
	}

	pub fn enc_base_id(&self) -> Uuid {
		self.0.enc_base_id.get_or_init(|| self.guid_field(|row| row.enc_base_id.0))
	}

	fn guid_field(&self, select: impl Fn(&ModuleRow) -> u32) -> Uuid {
		match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => ctx.guids().get_guid(select(row)),
			_ => Uuid::nil(),
		}
	}

	/// The assembly this module belongs to. Determined from the metadata
	/// stream's own `Assembly` row (rid 1) if one is present — every module
	/// loaded from a given stream shares that stream's single manifest, so
	/// this doesn't depend on having traversed `AssemblyDefinition::modules`
	/// first. `None` for a hand-built module or a stream with no manifest
	/// (a non-manifest module of a multi-module assembly).
	pub fn assembly(&self) -> Option<crate::model::AssemblyDefinition> {
		self.0
			.owner
			.get_or_init(|| match &self.0.context {
				Some(ctx) if ctx.tables().row_count(TableIndex::Assembly) > 0 => {
					ctx.get_or_build_assembly(1).ok().map(|a| a.handle())
				},
				_ => None,
			})
			.and_then(|handle| handle.upgrade())
	}

	/// Types directly declared at module scope (the invariant
	/// `DeclaringType == null ⇔ type ∈ Module.TopLevelTypes` holds).
	pub fn top_level_types(&self) -> Arc<std::sync::RwLock<OwnedCollection<TypeOwner, TypeDefinition>>> {
		self.0.top_level_types.get_or_init(|| {
			let collection = match (&self.0.context, &self.0.row) {
				(Some(ctx), Some(_)) => self.load_top_level_types(ctx).unwrap_or_default(),
				_ => Vec::new(),
			};
			Arc::new(std::sync::RwLock::new(OwnedCollection::from_elements(
				TypeOwner::Module(self.handle()),
				collection,
			)))
		})
	}

	fn load_top_level_types(&self, ctx: &MetadataContext) -> Result<Vec<TypeDefinition>> {
		let row_count = ctx.tables().row_count(TableIndex::TypeDef);
		let mut types = Vec::new();
		for rid in 1..=row_count {
			let ty = ctx.get_or_build_type(rid)?;
			if ty.declaring_type().is_none() {
				types.push(ty);
			}
		}
		Ok(types)
	}

	/// Assemblies this module references, in table order.
	pub fn assembly_references(&self) -> Arc<std::sync::RwLock<OwnedCollection<ModuleHandle, AssemblyReference>>> {
		self.0.assembly_references.get_or_init(|| {
			let elements = match (&self.0.context, &self.0.row) {
				(Some(ctx), Some(_)) => self.load_assembly_references(ctx).unwrap_or_default(),
				_ => Vec::new(),
			};
			Arc::new(std::sync::RwLock::new(OwnedCollection::from_elements(self.handle(), elements)))
		})
	}

	fn load_assembly_references(&self, ctx: &MetadataContext) -> Result<Vec<AssemblyReference>> {
		let row_count = ctx.tables().row_count(TableIndex::AssemblyRef);
		(1..=row_count).map(|rid| ctx.get_or_build_assembly_ref(rid)).collect()
	}

	/// Resolves `token` against this module's tables stream, caching the
	/// result. Fails with [`MetadataError::NotSerialized`] for a hand-built
	/// module.
	pub fn lookup_member(&self, token: MetadataToken) -> Result<Member> {
		match &self.0.context {
			Some(ctx) => ctx.lookup_member(token),
			None => Err(MetadataError::NotSerialized),
		}
	}

	pub fn context(&self) -> Option<&MetadataContext> {
		self.0.context.as_ref()
	}

	/// Parses `bytes` as a PE image and returns row 1 of its `Module`
	/// table — every CLI assembly has exactly one, manifest or not.
	pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
		crate::loader::context_from_bytes(bytes)?.get_or_build_module(1)
	}

	/// As [`Self::from_bytes`], reading the file at `path`.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		crate::loader::context_from_file(path)?.get_or_build_module(1)
	}

	/// As [`Self::from_bytes`], consuming the remainder of `reader`'s
	/// current view as the whole PE image.
	pub fn from_reader(reader: &mut BinaryReader) -> Result<Self> {
		crate::loader::context_from_reader(reader)?.get_or_build_module(1)
	}

	/// Builds from an already-parsed [`PEImage`].
	pub fn from_image(image: &PEImage) -> Result<Self> {
		crate::loader::context_from_image(image)?.get_or_build_module(1)
	}
}

impl HasOwner<AssemblyHandle> for ModuleDefinition {
	fn owner(&self) -> Option<AssemblyHandle> {
		self.0.owner.get_or_init(|| None)
	}

	fn set_owner(&self, owner: Option<AssemblyHandle>) {
		self.0.owner.set(owner);
	}
}

impl std::fmt::Debug for ModuleDefinition {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ModuleDefinition").field("token", &self.token()).field("name", &self.name()).finish()
	}
}

impl From<Arc<ModuleInner>> for ModuleDefinition {
	fn from(inner: Arc<ModuleInner>) -> Self {
		Self(inner)
	}
}
