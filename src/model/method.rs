use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::lazy::Lazy;
use crate::model::flags::{MethodAttributes, MethodImplAttributes};
use crate::model::type_def::TypeDefinition;
use crate::model::MetadataContext;
use crate::signature::MethodSignature;
use crate::tables::rows::{MethodDef as MethodDefRow, TypeDef as TypeDefRow};
use crate::tables::{GetTable, TablesStream};
use crate::token::{MetadataToken, TableIndex};

struct MethodInner {
	token: MetadataToken,
	context: Option<MetadataContext>,
	row: Option<MethodDefRow>,

	name: Lazy<Arc<str>>,
	signature: Lazy<Arc<MethodSignature>>,
	flags: RwLock<MethodAttributes>,
	impl_flags: RwLock<MethodImplAttributes>,
	declaring_type: Lazy<Option<TypeDefinition>>,
}

/// A row of the `MethodDef` table: name, signature and flags populated
/// lazily from `#Strings`/`#Blob`, plus the declaring type resolved by a
/// binary search over `TypeDef.MethodList`.
#[derive(Clone)]
pub struct MethodDefinition(Arc<MethodInner>);

impl MethodDefinition {
	pub(crate) fn from_context(context: MetadataContext, rid: u32) -> Result<Self> {
		let row = context.tables().row_checked::<MethodDefRow>(rid)?.clone();
		let token = MetadataToken::new(TableIndex::MethodDef, rid);
		let flags = MethodAttributes::from_bits_truncate(row.flags);
		let impl_flags = MethodImplAttributes::from_bits_truncate(row.impl_flags);
		Ok(Self(Arc::new(MethodInner {
			token,
			context: Some(context),
			row: Some(row),
			name: Lazy::unset(),
			signature: Lazy::unset(),
			flags: RwLock::new(flags),
			impl_flags: RwLock::new(impl_flags),
			declaring_type: Lazy::unset(),
		})))
	}

	/// Builds a method with no backing row; every field is user-settable.
	pub fn new(name: impl Into<Arc<str>>, signature: MethodSignature) -> Self {
		Self(Arc::new(MethodInner {
			token: MetadataToken::new(TableIndex::MethodDef, 0),
			context: None,
			row: None,
			name: Lazy::set_value(name.into()),
			signature: Lazy::set_value(Arc::new(signature)),
			flags: RwLock::new(MethodAttributes::empty()),
			impl_flags: RwLock::new(MethodImplAttributes::empty()),
			declaring_type: Lazy::set_value(None),
		}))
	}

	pub fn token(&self) -> MetadataToken {
		self.0.token
	}

	pub fn name(&self) -> Arc<str> {
		self.0.name.get_or_init(|| match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => ctx.strings().get_string(row.name.0).unwrap_or("").into(),
			_ => "".into(),
		})
	}

	pub fn set_name(&self, name: impl Into<Arc<str>>) {
		self.0.name.set(name.into());
	}

	/// The method's parsed signature (calling convention, return type,
	/// parameter types). Parsed once from `#Blob` on first access; falls
	/// back to an empty `(void)` signature if the blob doesn't parse. Use
	/// [`Self::try_signature`] to see the underlying error instead.
	pub fn signature(&self) -> Arc<MethodSignature> {
		self.try_signature().unwrap_or_else(|_| Arc::new(empty_signature()))
	}

	/// As [`Self::signature`], but surfaces the blob-index and decode error
	/// instead of silently falling back to an empty signature. Leaves the
	/// cache unset on failure, so a later call can retry.
	pub fn try_signature(&self) -> Result<Arc<MethodSignature>> {
		self.0.signature.try_get_or_init(|| match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => {
				let mut reader = ctx.blobs().get_blob(row.signature.0)?;
				Ok(Arc::new(MethodSignature::read(&mut reader)?))
			},
			_ => Ok(Arc::new(empty_signature())),
		})
	}

	pub fn set_signature(&self, signature: MethodSignature) {
		self.0.signature.set(Arc::new(signature));
	}

	/// The relative virtual address of the method body, or 0 if it has
	/// none (abstract, `PInvoke`-forwarded, ...).
	pub fn rva(&self) -> u32 {
		self.0.row.as_ref().map(|row| row.rva).unwrap_or(0)
	}

	pub fn flags(&self) -> MethodAttributes {
		*self.0.flags.read().unwrap()
	}

	pub fn set_flags(&self, flags: MethodAttributes) {
		*self.0.flags.write().unwrap() = flags;
	}

	pub fn impl_flags(&self) -> MethodImplAttributes {
		*self.0.impl_flags.read().unwrap()
	}

	pub fn set_impl_flags(&self, flags: MethodImplAttributes) {
		*self.0.impl_flags.write().unwrap() = flags;
	}

	pub fn is_static(&self) -> bool {
		self.flags().contains(MethodAttributes::STATIC)
	}

	pub fn is_virtual(&self) -> bool {
		self.flags().contains(MethodAttributes::VIRTUAL)
	}

	pub fn is_abstract(&self) -> bool {
		self.flags().contains(MethodAttributes::ABSTRACT)
	}

	/// The type this method is declared on, found by binary search over
	/// the monotonic `TypeDef.MethodList` column.
	pub fn declaring_type(&self) -> Option<TypeDefinition> {
		self.0.declaring_type.get_or_init(|| match &self.0.context {
			Some(ctx) => self.find_declaring_type(ctx),
			None => None,
		})
	}

	fn find_declaring_type(&self, ctx: &MetadataContext) -> Option<TypeDefinition> {
		let type_defs = GetTable::<TypeDefRow>::table(ctx.tables().as_ref());
		let starts: Vec<u32> = type_defs.iter().map(|row| row.method_list.0).collect();
		let index = TablesStream::parent_of(&starts, self.token().rid());
		ctx.get_or_build_type((index + 1) as u32).ok()
	}
}

fn empty_signature() -> MethodSignature {
	MethodSignature {
		calling_convention: crate::signature::CallingConvention::DEFAULT,
		generic_param_count: 0,
		return_type: crate::signature::TypeSignature::Void,
		parameters: Vec::new(),
		sentinel_index: None,
	}
}

impl std::fmt::Debug for MethodDefinition {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MethodDefinition").field("token", &self.token()).field("name", &self.name()).finish()
	}
}
