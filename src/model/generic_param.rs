use std::sync::Arc;

use crate::error::{MetadataError, Result};
use crate::lazy::Lazy;
use crate::model::flags::GenericParamAttributes;
use crate::model::method::MethodDefinition;
use crate::model::type_def::TypeDefinition;
use crate::model::MetadataContext;
use crate::tables::rows::GenericParam as GenericParamRow;
use crate::token::{MetadataToken, TableIndex};

/// The type or method a [`GenericParameter`] is declared on (decoded eagerly
/// from the row's `TypeOrMethodDef` coded index).
#[derive(Clone, Debug)]
pub enum GenericParamOwner {
	Type(TypeDefinition),
	Method(MethodDefinition),
}

struct GenericParamInner {
	token: MetadataToken,
	context: Option<MetadataContext>,
	row: Option<GenericParamRow>,

	name: Lazy<Arc<str>>,
	owner: Lazy<Option<GenericParamOwner>>,
}

/// A row of the `GenericParam` table: the zero-based position a type or
/// method parameterizes, its variance/special-constraint flags, and its
/// declared name.
#[derive(Clone)]
pub struct GenericParameter(Arc<GenericParamInner>);

impl GenericParameter {
	pub(crate) fn from_context(context: MetadataContext, rid: u32) -> Result<Self> {
		let row = context.tables().row_checked::<GenericParamRow>(rid)?.clone();
		let token = MetadataToken::new(TableIndex::GenericParam, rid);
		Ok(Self(Arc::new(GenericParamInner {
			token,
			context: Some(context),
			row: Some(row),
			name: Lazy::unset(),
			owner: Lazy::unset(),
		})))
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

	/// The parameter's zero-based position in its owner's parameter list.
	pub fn number(&self) -> u16 {
		self.0.row.as_ref().map(|row| row.number).unwrap_or(0)
	}

	pub fn flags(&self) -> GenericParamAttributes {
		self.0.row.as_ref().map(|row| GenericParamAttributes::from_bits_truncate(row.flags)).unwrap_or(GenericParamAttributes::NONE)
	}

	pub fn is_covariant(&self) -> bool {
		self.flags().contains(GenericParamAttributes::COVARIANT)
	}

	pub fn is_contravariant(&self) -> bool {
		self.flags().contains(GenericParamAttributes::CONTRAVARIANT)
	}

	/// The `TypeDefinition` or `MethodDefinition` this parameter belongs to.
	pub fn owner(&self) -> Option<GenericParamOwner> {
		self.0.owner.get_or_init(|| match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => Self::decode_owner(ctx, row).ok(),
			_ => None,
		})
	}

	fn decode_owner(ctx: &MetadataContext, row: &GenericParamRow) -> Result<GenericParamOwner> {
		let token = row.owner.decode()?;
		match token.table() {
			TableIndex::TypeDef => Ok(GenericParamOwner::Type(ctx.get_or_build_type(token.rid())?)),
			TableIndex::MethodDef => Ok(GenericParamOwner::Method(ctx.get_or_build_method(token.rid())?)),
			_ => Err(MetadataError::BadImageFormat {
				offset: 0,
				message: "GenericParam.Owner coded index resolved outside {TypeDef, MethodDef}",
			}),
		}
	}
}

impl std::fmt::Debug for GenericParameter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GenericParameter")
			.field("token", &self.token())
			.field("number", &self.number())
			.field("name", &self.name())
			.finish()
	}
}
