use std::sync::{Arc, RwLock, Weak};

use crate::error::Result;
use crate::lazy::{HasOwner, Lazy, OwnedCollection};
use crate::model::flags::TypeAttributes;
use crate::model::module::ModuleHandle;
use crate::model::MetadataContext;
use crate::tables::rows::{self, TypeDef as TypeDefRow};
use crate::tables::GetTable;
use crate::token::{MetadataToken, TableIndex};

/// Either half of `TypeDefOrRef`'s two navigable outcomes: a resolved
/// [`TypeDefinition`] when the coded index targets this module's `TypeDef`
/// table, or the raw token otherwise (`TypeRef`/`TypeSpec` aren't modeled as
/// distinct types).
#[derive(Clone, Debug)]
pub enum TypeDefOrRef {
	TypeDef(TypeDefHandle),
	Token(MetadataToken),
}

/// A [`TypeDefinition`]'s owner: either the module it's declared at top
/// level in, or the type it's nested inside (the invariant
/// `DeclaringType == null ⇔ type ∈ Module.TopLevelTypes` holds).
#[derive(Clone)]
pub enum TypeOwner {
	Module(ModuleHandle),
	Type(TypeDefHandle),
}

impl std::fmt::Debug for TypeOwner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Module(m) => write!(f, "TypeOwner::Module({m:?})"),
			Self::Type(t) => write!(f, "TypeOwner::Type({t:?})"),
		}
	}
}

/// A non-owning handle to a [`TypeDefinition`].
#[derive(Clone)]
pub struct TypeDefHandle(Weak<TypeDefInner>);

impl TypeDefHandle {
	pub fn upgrade(&self) -> Option<TypeDefinition> {
		self.0.upgrade().map(TypeDefinition)
	}
}

impl std::fmt::Debug for TypeDefHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "TypeDefHandle({:?})", self.0.upgrade().map(|t| TypeDefinition(t).token()))
	}
}

struct TypeDefInner {
	token: MetadataToken,
	context: Option<MetadataContext>,
	row: Option<TypeDefRow>,
	self_handle: TypeDefHandle,

	owner: Lazy<Option<TypeOwner>>,
	namespace: Lazy<Arc<str>>,
	name: Lazy<Arc<str>>,
	full_name: RwLock<Option<Arc<str>>>,
	flags: RwLock<TypeAttributes>,
	base_type: Lazy<Option<TypeDefOrRef>>,
	nested_types: Lazy<Arc<RwLock<OwnedCollection<TypeOwner, TypeDefinition>>>>,
}

/// A row of the `TypeDef` table, wrapped with lazily-populated name,
/// namespace, base type, owner and nested-type list.
#[derive(Clone)]
pub struct TypeDefinition(Arc<TypeDefInner>);

impl TypeDefinition {
	pub(crate) fn from_context(context: MetadataContext, rid: u32) -> Result<Self> {
		let row = context.tables().row_checked::<TypeDefRow>(rid)?.clone();
		let token = MetadataToken::new(TableIndex::TypeDef, rid);
		let flags = TypeAttributes::from_bits_truncate(row.flags);
		Ok(Arc::new_cyclic(|weak| TypeDefInner {
			token,
			context: Some(context),
			row: Some(row),
			self_handle: TypeDefHandle(weak.clone()),
			owner: Lazy::unset(),
			namespace: Lazy::unset(),
			name: Lazy::unset(),
			full_name: RwLock::new(None),
			flags: RwLock::new(flags),
			base_type: Lazy::unset(),
			nested_types: Lazy::unset(),
		})
		.into())
	}

	/// Builds a type with no backing row. Every field is user-settable and
	/// starts detached (no owner) until added to a module's or another
	/// type's collection.
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		let inner = Arc::new_cyclic(|weak| TypeDefInner {
			token: MetadataToken::new(TableIndex::TypeDef, 0),
			context: None,
			row: None,
			self_handle: TypeDefHandle(weak.clone()),
			owner: Lazy::unset(),
			namespace: Lazy::set_value("".into()),
			name: Lazy::set_value(name.into()),
			full_name: RwLock::new(None),
			flags: RwLock::new(TypeAttributes::empty()),
			base_type: Lazy::set_value(None),
			nested_types: Lazy::unset(),
		});
		Self(inner)
	}

	pub fn token(&self) -> MetadataToken {
		self.0.token
	}

	pub fn handle(&self) -> TypeDefHandle {
		self.0.self_handle.clone()
	}

	pub fn name(&self) -> Arc<str> {
		self.0.name.get_or_init(|| self.string_field(|row| row.type_name.0))
	}

	pub fn set_name(&self, name: impl Into<Arc<str>>) {
		self.0.name.set(name.into());
		*self.0.full_name.write().unwrap() = None;
	}

	pub fn namespace(&self) -> Arc<str> {
		self.0.namespace.get_or_init(|| self.string_field(|row| row.type_namespace.0))
	}

	pub fn set_namespace(&self, namespace: impl Into<Arc<str>>) {
		self.0.namespace.set(namespace.into());
		*self.0.full_name.write().unwrap() = None;
	}

	fn string_field(&self, select: impl Fn(&TypeDefRow) -> u32) -> Arc<str> {
		match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => ctx.strings().get_string(select(row)).unwrap_or("").into(),
			_ => "".into(),
		}
	}

	/// `Namespace.Name`, or plain `Name` for a type in the global namespace.
	/// Cached until the next [`Self::set_name`]/[`Self::set_namespace`].
	pub fn full_name(&self) -> Arc<str> {
		if let Some(cached) = self.0.full_name.read().unwrap().clone() {
			return cached;
		}
		let namespace = self.namespace();
		let name = self.name();
		let full: Arc<str> = if namespace.is_empty() { name } else { format!("{namespace}.{name}").into() };
		*self.0.full_name.write().unwrap() = Some(full.clone());
		full
	}

	pub fn flags(&self) -> TypeAttributes {
		*self.0.flags.read().unwrap()
	}

	pub fn set_flags(&self, flags: TypeAttributes) {
		*self.0.flags.write().unwrap() = flags;
	}

	pub fn is_not_public(&self) -> bool {
		self.flags().is_not_public()
	}

	pub fn set_not_public(&self, value: bool) {
		self.0.flags.write().unwrap().set_not_public(value);
	}

	pub fn is_public(&self) -> bool {
		self.flags().is_public()
	}

	pub fn set_public(&self, value: bool) {
		self.0.flags.write().unwrap().set_public(value);
	}

	pub fn is_class(&self) -> bool {
		self.flags().is_class()
	}

	pub fn set_class(&self, value: bool) {
		self.0.flags.write().unwrap().set_class(value);
	}

	pub fn is_interface(&self) -> bool {
		self.flags().is_interface()
	}

	pub fn set_interface(&self, value: bool) {
		self.0.flags.write().unwrap().set_interface(value);
	}

	pub fn is_auto_layout(&self) -> bool {
		self.flags().is_auto_layout()
	}

	pub fn set_auto_layout(&self, value: bool) {
		self.0.flags.write().unwrap().set_auto_layout(value);
	}

	pub fn is_ansi_class(&self) -> bool {
		self.flags().is_ansi_class()
	}

	pub fn set_ansi_class(&self, value: bool) {
		self.0.flags.write().unwrap().set_ansi_class(value);
	}

	pub fn is_runtime_special_name(&self) -> bool {
		self.flags().is_runtime_special_name()
	}

	pub fn is_forwarder(&self) -> bool {
		self.flags().is_forwarder()
	}

	pub fn is_abstract(&self) -> bool {
		self.flags().contains(TypeAttributes::ABSTRACT)
	}

	pub fn set_abstract(&self, value: bool) {
		self.0.flags.write().unwrap().set(TypeAttributes::ABSTRACT, value);
	}

	pub fn is_sealed(&self) -> bool {
		self.flags().contains(TypeAttributes::SEALED)
	}

	pub fn set_sealed(&self, value: bool) {
		self.0.flags.write().unwrap().set(TypeAttributes::SEALED, value);
	}

	/// The type this one extends, decoded from the `Extends` coded index.
	/// `None` for `<Module>` and for interfaces, which never have a base
	/// type.
	pub fn base_type(&self) -> Option<TypeDefOrRef> {
		self.0.base_type.get_or_init(|| match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => Self::decode_type_def_or_ref(ctx, row.extends.decode().ok()),
			_ => None,
		})
	}

	fn decode_type_def_or_ref(ctx: &MetadataContext, token: Option<MetadataToken>) -> Option<TypeDefOrRef> {
		let token = token.filter(|t| !t.is_null())?;
		match token.table() {
			TableIndex::TypeDef => ctx.get_or_build_type(token.rid()).ok().map(|t| TypeDefOrRef::TypeDef(t.handle())),
			_ => Some(TypeDefOrRef::Token(token)),
		}
	}

	/// The type this one is nested inside, or `None` for a top-level type.
	pub fn declaring_type(&self) -> Option<TypeDefinition> {
		match self.owner() {
			Some(TypeOwner::Type(handle)) => handle.upgrade(),
			_ => None,
		}
	}

	/// The module this type (or, for a nested type, its outermost enclosing
	/// type) belongs to.
	pub fn module(&self) -> Option<crate::model::ModuleDefinition> {
		match self.owner() {
			Some(TypeOwner::Module(handle)) => handle.upgrade(),
			Some(TypeOwner::Type(handle)) => handle.upgrade().and_then(|t| t.module()),
			None => None,
		}
	}

	fn owner(&self) -> Option<TypeOwner> {
		self.0.owner.get_or_init(|| match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(_)) => Some(self.compute_owner(ctx)),
			_ => None,
		})
	}

	/// Finds this type's enclosing type via a binary search on `NestedClass`
	/// (sorted by its `NestedClass` column per ECMA-335), falling back to
	/// module scope when no entry names this type as nested.
	fn compute_owner(&self, ctx: &MetadataContext) -> TypeOwner {
		let rid = self.token().rid();
		let range = ctx.tables().find_range::<rows::NestedClass, _>(|r| r.nested_class.0, rid);
		if range.start < range.end {
			if let Some(nested_row) = ctx.tables().row::<rows::NestedClass>(range.start) {
				if let Ok(parent) = ctx.get_or_build_type(nested_row.enclosing_class.0) {
					return TypeOwner::Type(parent.handle());
				}
			}
		}
		match ctx.get_or_build_module(1) {
			Ok(module) => TypeOwner::Module(module.handle()),
			Err(_) => TypeOwner::Module(ModuleHandle::dangling()),
		}
	}

	/// Types declared directly inside this one. A linear scan over
	/// `NestedClass`: the table's guaranteed sort key is its `NestedClass`
	/// (child) column, not `EnclosingClass`, so this reverse query can't
	/// binary search.
	pub fn nested_types(&self) -> Arc<RwLock<OwnedCollection<TypeOwner, TypeDefinition>>> {
		self.0.nested_types.get_or_init(|| {
			let elements = match (&self.0.context, &self.0.row) {
				(Some(ctx), Some(_)) => self.load_nested_types(ctx).unwrap_or_default(),
				_ => Vec::new(),
			};
			Arc::new(RwLock::new(OwnedCollection::from_elements(TypeOwner::Type(self.handle()), elements)))
		})
	}

	fn load_nested_types(&self, ctx: &MetadataContext) -> Result<Vec<TypeDefinition>> {
		let my_rid = self.token().rid();
		let nested_rows = GetTable::<rows::NestedClass>::table(ctx.tables().as_ref());
		let mut result = Vec::new();
		for row in nested_rows {
			if row.enclosing_class.0 == my_rid {
				result.push(ctx.get_or_build_type(row.nested_class.0)?);
			}
		}
		Ok(result)
	}
}

impl HasOwner<TypeOwner> for TypeDefinition {
	fn owner(&self) -> Option<TypeOwner> {
		TypeDefinition::owner(self)
	}

	fn set_owner(&self, owner: Option<TypeOwner>) {
		self.0.owner.set(owner);
	}
}

impl std::fmt::Debug for TypeDefinition {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TypeDefinition").field("token", &self.token()).field("full_name", &self.full_name()).finish()
	}
}

impl From<Arc<TypeDefInner>> for TypeDefinition {
	fn from(inner: Arc<TypeDefInner>) -> Self {
		Self(inner)
	}
}
