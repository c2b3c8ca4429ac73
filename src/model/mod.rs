//! The lazy object model: typed member graph built on
//! top of the tables stream and heaps, plus the [`MetadataContext`] every
//! member holds a handle to for on-demand field population.

pub mod flags;

mod assembly;
mod assembly_ref;
mod generic_param;
mod method;
mod module;
mod type_def;

pub use assembly::AssemblyDefinition;
pub use assembly_ref::AssemblyReference;
pub use generic_param::{GenericParamOwner, GenericParameter};
pub use method::MethodDefinition;
pub use module::ModuleDefinition;
pub use type_def::{TypeDefOrRef, TypeDefinition, TypeOwner};

use std::sync::{Arc, RwLock};

use nohash_hasher::IntMap;

use crate::error::{MetadataError, Result};
use crate::heaps::{BlobHeap, GuidHeap, MetadataRoot, StringsHeap, UserStringsHeap};
use crate::tables::TablesStream;
use crate::token::{MetadataToken, TableIndex};

/// A four-part assembly version, shared by both `AssemblyDefinition` and
/// `AssemblyReference` so the resolver can compare a
/// reference's requested version against a candidate's own exactly.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct AssemblyVersion {
	pub major: u16,
	pub minor: u16,
	pub build: u16,
	pub revision: u16,
}

/// A token-addressable member, the tagged union [`crate::model`]'s design
/// notes describe in place of a `MetadataMember` base class.
#[derive(Debug, Clone)]
pub enum Member {
	Module(ModuleDefinition),
	Assembly(AssemblyDefinition),
	TypeDef(TypeDefinition),
	MethodDef(MethodDefinition),
	AssemblyRef(AssemblyReference),
	GenericParam(GenericParameter),
}

impl Member {
	pub fn token(&self) -> MetadataToken {
		match self {
			Member::Module(m) => m.token(),
			Member::Assembly(a) => a.token(),
			Member::TypeDef(t) => t.token(),
			Member::MethodDef(m) => m.token(),
			Member::AssemblyRef(a) => a.token(),
			Member::GenericParam(g) => g.token(),
		}
	}
}

/// Everything a loaded member needs to materialize its lazy fields: the
/// tables stream, the four heaps, and a per-token member cache that gives
/// `lookup_member` (and every cross-reference that resolves through it)
/// reference-stable results.
///
/// Cloning a [`MetadataContext`] is cheap — it's a single `Arc` bump.
#[derive(Clone)]
pub struct MetadataContext(Arc<ContextInner>);

struct ContextInner {
	tables: Arc<TablesStream>,
	strings: Arc<StringsHeap>,
	blobs: Arc<BlobHeap>,
	guids: Arc<GuidHeap>,
	user_strings: Arc<UserStringsHeap>,
	members: RwLock<IntMap<u32, Member>>,
}

impl std::fmt::Debug for MetadataContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MetadataContext")
			.field("cached_members", &self.0.members.read().unwrap().len())
			.finish()
	}
}

impl MetadataContext {
	pub fn new(root: MetadataRoot) -> Self {
		let (tables, strings, blobs, guids, user_strings) = root.into_parts();
		Self(Arc::new(ContextInner {
			tables: Arc::new(tables),
			strings: Arc::new(strings),
			blobs: Arc::new(blobs),
			guids: Arc::new(guids),
			user_strings: Arc::new(user_strings),
			members: RwLock::new(IntMap::default()),
		}))
	}

	pub fn tables(&self) -> &Arc<TablesStream> {
		&self.0.tables
	}

	pub fn strings(&self) -> &StringsHeap {
		&self.0.strings
	}

	pub fn blobs(&self) -> &BlobHeap {
		&self.0.blobs
	}

	pub fn guids(&self) -> &GuidHeap {
		&self.0.guids
	}

	pub fn user_strings(&self) -> &UserStringsHeap {
		&self.0.user_strings
	}

	/// Looks up a cached member by token, or constructs and caches it.
	/// `Err(NotSerialized)` is never produced here — it's only raised when
	/// a hand-built module (no [`MetadataContext`]) is asked to resolve a
	/// token; see [`ModuleDefinition::lookup_member`].
	pub fn lookup_member(&self, token: MetadataToken) -> Result<Member> {
		if let Some(member) = self.0.members.read().unwrap().get(&token.to_u32()) {
			return Ok(member.clone());
		}

		let member = match token.table() {
			TableIndex::Module => Member::Module(module::ModuleDefinition::from_context(self.clone(), token.rid())?),
			TableIndex::Assembly => {
				Member::Assembly(assembly::AssemblyDefinition::from_context(self.clone(), token.rid())?)
			},
			TableIndex::TypeDef => Member::TypeDef(type_def::TypeDefinition::from_context(self.clone(), token.rid())?),
			TableIndex::MethodDef => Member::MethodDef(method::MethodDefinition::from_context(self.clone(), token.rid())?),
			TableIndex::AssemblyRef => {
				Member::AssemblyRef(assembly_ref::AssemblyReference::from_context(self.clone(), token.rid())?)
			},
			TableIndex::GenericParam => {
				Member::GenericParam(generic_param::GenericParameter::from_context(self.clone(), token.rid())?)
			},
			_ => {
				return Err(MetadataError::BadImageFormat {
					offset: 0,
					message: "token refers to a table with no navigable member type in this crate",
				})
			},
		};

		self.0.members.write().unwrap().entry(token.to_u32()).or_insert_with(|| member.clone());
		Ok(member)
	}

	/// Typed shortcuts over [`Self::lookup_member`] for the cross-references
	/// every model type resolves through (declaring types, owners, method
	/// signatures' coded-index targets, ...). These share `lookup_member`'s
	/// cache, so resolving the same token twice never allocates twice.
	pub(crate) fn get_or_build_module(&self, rid: u32) -> Result<ModuleDefinition> {
		match self.lookup_member(MetadataToken::new(TableIndex::Module, rid))? {
			Member::Module(module) => Ok(module),
			_ => unreachable!("Module token always resolves to Member::Module"),
		}
	}

	pub(crate) fn get_or_build_assembly(&self, rid: u32) -> Result<AssemblyDefinition> {
		match self.lookup_member(MetadataToken::new(TableIndex::Assembly, rid))? {
			Member::Assembly(assembly) => Ok(assembly),
			_ => unreachable!("Assembly token always resolves to Member::Assembly"),
		}
	}

	pub(crate) fn get_or_build_type(&self, rid: u32) -> Result<TypeDefinition> {
		match self.lookup_member(MetadataToken::new(TableIndex::TypeDef, rid))? {
			Member::TypeDef(type_def) => Ok(type_def),
			_ => unreachable!("TypeDef token always resolves to Member::TypeDef"),
		}
	}

	pub(crate) fn get_or_build_method(&self, rid: u32) -> Result<MethodDefinition> {
		match self.lookup_member(MetadataToken::new(TableIndex::MethodDef, rid))? {
			Member::MethodDef(method) => Ok(method),
			_ => unreachable!("MethodDef token always resolves to Member::MethodDef"),
		}
	}

	pub(crate) fn get_or_build_assembly_ref(&self, rid: u32) -> Result<AssemblyReference> {
		match self.lookup_member(MetadataToken::new(TableIndex::AssemblyRef, rid))? {
			Member::AssemblyRef(assembly_ref) => Ok(assembly_ref),
			_ => unreachable!("AssemblyRef token always resolves to Member::AssemblyRef"),
		}
	}

	pub(crate) fn get_or_build_generic_param(&self, rid: u32) -> Result<GenericParameter> {
		match self.lookup_member(MetadataToken::new(TableIndex::GenericParam, rid))? {
			Member::GenericParam(param) => Ok(param),
			_ => unreachable!("GenericParam token always resolves to Member::GenericParam"),
		}
	}
}
