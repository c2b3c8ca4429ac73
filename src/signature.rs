//! Signature blob decoder: element-type bytes, encoded
//! tokens and the method/field/local/property signature grammars built from
//! them.

use bitflags::bitflags;

use crate::error::{MetadataError, Result};
use crate::io::BinaryReader;
use crate::token::{CodedIndexKind, MetadataToken};

bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct CallingConvention: u8 {
		const DEFAULT = 0x0;
		const C = 0x1;
		const STD_CALL = 0x2;
		const THIS_CALL = 0x3;
		const FAST_CALL = 0x4;
		const VAR_ARG = 0x5;
		const UNMANAGED = 0x9;
		const GENERIC = 0x10;
		const HAS_THIS = 0x20;
		const EXPLICIT_THIS = 0x40;
	}
}

/// A custom modifier (`CMOD_REQD`/`CMOD_OPT`) prefixing a type.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CustomModifier {
	pub required: bool,
	pub type_token: MetadataToken,
}

/// A decoded type signature. Recursive cases box their operand rather than
/// borrowing a slice, since the lazy object model needs these to be
/// `'static` and cheaply cloneable.
#[derive(Debug, Clone)]
pub enum TypeSignature {
	Void,
	Boolean,
	Char,
	I1,
	U1,
	I2,
	U2,
	I4,
	U4,
	I8,
	U8,
	R4,
	R8,
	String,
	Object,
	IntPtr,
	UIntPtr,
	TypedByRef,
	Pointer(Box<TypeSignature>),
	ByRef(Box<TypeSignature>),
	ValueType(MetadataToken),
	Class(MetadataToken),
	GenericParam(u32),
	MethodGenericParam(u32),
	SzArray(Box<TypeSignature>),
	Array { element: Box<TypeSignature>, rank: u32, sizes: Vec<u32>, lower_bounds: Vec<i32> },
	GenericInst { generic_type: Box<TypeSignature>, is_value_type: bool, args: Vec<TypeSignature> },
	FnPointer(Box<MethodSignature>),
	Modified { modifiers: Vec<CustomModifier>, underlying: Box<TypeSignature> },
	Pinned(Box<TypeSignature>),
}

impl TypeSignature {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn read(reader: &mut BinaryReader) -> Result<Self> {
		let mut modifiers = Vec::new();
		loop {
			let offset = reader.position();
			let tag = reader.read_u8()?;
			match tag {
				0x1F | 0x20 => {
					let raw = reader.read_compressed_u32()?;
					let type_token = CodedIndexKind::TypeDefOrRef.decode(raw)?;
					modifiers.push(CustomModifier { required: tag == 0x1F, type_token });
				},
				_ => {
					let underlying = Self::read_unmodified(reader, tag, offset)?;
					return Ok(match modifiers.is_empty() {
						true => underlying,
						false => Self::Modified { modifiers, underlying: Box::new(underlying) },
					});
				},
			}
		}
	}

	fn read_unmodified(reader: &mut BinaryReader, tag: u8, offset: usize) -> Result<Self> {
		Ok(match tag {
			0x01 => Self::Void,
			0x02 => Self::Boolean,
			0x03 => Self::Char,
			0x04 => Self::I1,
			0x05 => Self::U1,
			0x06 => Self::I2,
			0x07 => Self::U2,
			0x08 => Self::I4,
			0x09 => Self::U4,
			0x0A => Self::I8,
			0x0B => Self::U8,
			0x0C => Self::R4,
			0x0D => Self::R8,
			0x0E => Self::String,
			0x0F => Self::Pointer(Box::new(Self::read(reader)?)),
			0x10 => Self::ByRef(Box::new(Self::read(reader)?)),
			0x11 => Self::ValueType(Self::read_type_token(reader)?),
			0x12 => Self::Class(Self::read_type_token(reader)?),
			0x13 => Self::GenericParam(reader.read_compressed_u32()?),
			0x14 => Self::read_array(reader)?,
			0x15 => Self::read_generic_inst(reader)?,
			0x16 => Self::TypedByRef,
			0x18 => Self::IntPtr,
			0x19 => Self::UIntPtr,
			0x1B => Self::FnPointer(Box::new(MethodSignature::read(reader)?)),
			0x1C => Self::Object,
			0x1D => Self::SzArray(Box::new(Self::read(reader)?)),
			0x1E => Self::MethodGenericParam(reader.read_compressed_u32()?),
			0x45 => Self::Pinned(Box::new(Self::read(reader)?)),
			_ => {
				return Err(MetadataError::BadImageFormat {
					offset,
					message: "unrecognised signature element type",
				})
			},
		})
	}

	fn read_type_token(reader: &mut BinaryReader) -> Result<MetadataToken> {
		let raw = reader.read_compressed_u32()?;
		CodedIndexKind::TypeDefOrRef.decode(raw)
	}

	fn read_array(reader: &mut BinaryReader) -> Result<Self> {
		let element = Box::new(Self::read(reader)?);
		let rank = reader.read_compressed_u32()?;
		let num_sizes = reader.read_compressed_u32()?;
		let mut sizes = Vec::with_capacity(num_sizes as usize);
		for _ in 0..num_sizes {
			sizes.push(reader.read_compressed_u32()?);
		}
		let num_lo_bounds = reader.read_compressed_u32()?;
		let mut lower_bounds = Vec::with_capacity(num_lo_bounds as usize);
		for _ in 0..num_lo_bounds {
			lower_bounds.push(reader.read_compressed_i32()?);
		}
		Ok(Self::Array { element, rank, sizes, lower_bounds })
	}

	fn read_generic_inst(reader: &mut BinaryReader) -> Result<Self> {
		let kind = reader.read_u8()?;
		let is_value_type = match kind {
			0x11 => true,
			0x12 => false,
			_ => {
				return Err(MetadataError::BadImageFormat {
					offset: reader.position() - 1,
					message: "GENERICINST must be prefixed by CLASS or VALUETYPE",
				})
			},
		};
		// The byte after CLASS/VALUETYPE is the instantiated type's own
		// encoded TypeDefOrRefOrSpec token, not a fresh element-type tag.
		let token = Self::read_type_token(reader)?;
		let generic_type = Box::new(match is_value_type {
			true => Self::ValueType(token),
			false => Self::Class(token),
		});
		let arg_count = reader.read_compressed_u32()?;
		let mut args = Vec::with_capacity(arg_count as usize);
		for _ in 0..arg_count {
			args.push(Self::read(reader)?);
		}
		Ok(Self::GenericInst { generic_type, is_value_type, args })
	}
}

/// A full method reference/definition signature.
#[derive(Debug, Clone)]
pub struct MethodSignature {
	pub calling_convention: CallingConvention,
	pub generic_param_count: u32,
	pub return_type: TypeSignature,
	pub parameters: Vec<TypeSignature>,
	/// Index into `parameters` of the first vararg extra parameter, if the
	/// blob contained a `SENTINEL` (0x41).
	pub sentinel_index: Option<usize>,
}

impl MethodSignature {
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn read(reader: &mut BinaryReader) -> Result<Self> {
		let calling_convention = CallingConvention::from_bits_truncate(reader.read_u8()?);

		let generic_param_count = match calling_convention.contains(CallingConvention::GENERIC) {
			true => reader.read_compressed_u32()?,
			false => 0,
		};

		let param_count = reader.read_compressed_u32()?;
		let return_type = TypeSignature::read(reader)?;

		let mut parameters = Vec::with_capacity(param_count as usize);
		let mut sentinel_index = None;
		for _ in 0..param_count {
			if reader.remaining() > 0 && reader.bytes()[0] == 0x41 {
				reader.read_u8()?;
				sentinel_index = Some(parameters.len());
			}
			parameters.push(TypeSignature::read(reader)?);
		}

		Ok(Self { calling_convention, generic_param_count, return_type, parameters, sentinel_index })
	}
}

/// A field signature: calling convention byte `FIELD` (0x06) followed by a
/// single type.
#[derive(Debug, Clone)]
pub struct FieldSignature {
	pub field_type: TypeSignature,
}

impl FieldSignature {
	pub fn read(reader: &mut BinaryReader) -> Result<Self> {
		let tag = reader.read_u8()?;
		if tag != 0x06 {
			return Err(MetadataError::BadImageFormat {
				offset: reader.position() - 1,
				message: "field signature must start with the FIELD tag",
			});
		}
		Ok(Self { field_type: TypeSignature::read(reader)? })
	}
}

/// A property signature: `PROPERTY` (0x08, optionally `HASTHIS`-tagged),
/// parameter count, return type, parameter types.
#[derive(Debug, Clone)]
pub struct PropertySignature {
	pub has_this: bool,
	pub property_type: TypeSignature,
	pub parameters: Vec<TypeSignature>,
}

impl PropertySignature {
	pub fn read(reader: &mut BinaryReader) -> Result<Self> {
		let tag = reader.read_u8()?;
		if tag & 0x0F != 0x08 {
			return Err(MetadataError::BadImageFormat {
				offset: reader.position() - 1,
				message: "property signature must start with the PROPERTY tag",
			});
		}
		let has_this = tag & CallingConvention::HAS_THIS.bits() != 0;
		let param_count = reader.read_compressed_u32()?;
		let property_type = TypeSignature::read(reader)?;
		let mut parameters = Vec::with_capacity(param_count as usize);
		for _ in 0..param_count {
			parameters.push(TypeSignature::read(reader)?);
		}
		Ok(Self { has_this, property_type, parameters })
	}
}

/// A local variable signature blob: `LOCAL_SIG` (0x07) followed by a count
/// and that many types.
#[derive(Debug, Clone)]
pub struct LocalVarSignature {
	pub locals: Vec<TypeSignature>,
}

impl LocalVarSignature {
	pub fn read(reader: &mut BinaryReader) -> Result<Self> {
		let tag = reader.read_u8()?;
		if tag != 0x07 {
			return Err(MetadataError::BadImageFormat {
				offset: reader.position() - 1,
				message: "local variable signature must start with the LOCAL_SIG tag",
			});
		}
		let count = reader.read_compressed_u32()?;
		let mut locals = Vec::with_capacity(count as usize);
		for _ in 0..count {
			locals.push(TypeSignature::read(reader)?);
		}
		Ok(Self { locals })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::token::TableIndex;

	fn reader(bytes: &[u8]) -> BinaryReader {
		BinaryReader::new(std::sync::Arc::from(bytes))
	}

	#[test]
	fn primitive_element_types_decode_directly() {
		assert!(matches!(TypeSignature::read(&mut reader(&[0x08])).unwrap(), TypeSignature::I4));
		assert!(matches!(TypeSignature::read(&mut reader(&[0x0E])).unwrap(), TypeSignature::String));
	}

	#[test]
	fn szarray_boxes_its_element_type() {
		let sig = TypeSignature::read(&mut reader(&[0x1D, 0x08])).unwrap();
		assert!(matches!(sig, TypeSignature::SzArray(e) if matches!(*e, TypeSignature::I4)));
	}

	#[test]
	fn valuetype_decodes_a_typedef_token() {
		// TypeDefOrRef coded index, tag 0 (TypeDef), rid 5: raw = 5 << 2.
		let sig = TypeSignature::read(&mut reader(&[0x11, (5 << 2) as u8])).unwrap();
		let TypeSignature::ValueType(token) = sig else { panic!("expected a ValueType") };
		assert_eq!(token.table(), TableIndex::TypeDef);
		assert_eq!(token.rid(), 5);
	}

	#[test]
	fn custom_modifiers_wrap_the_underlying_type() {
		// CMOD_REQD (0x1F) targeting TypeDef rid 1, then I4.
		let sig = TypeSignature::read(&mut reader(&[0x1F, (1 << 2) as u8, 0x08])).unwrap();
		let TypeSignature::Modified { modifiers, underlying } = sig else { panic!("expected Modified") };
		assert_eq!(modifiers.len(), 1);
		assert!(modifiers[0].required);
		assert!(matches!(*underlying, TypeSignature::I4));
	}

	#[test]
	fn generic_inst_decodes_the_instantiated_type_token_not_an_element_tag() {
		// GENERICINST CLASS <TypeDef rid 5> <arg count 1> I4.
		let bytes = [0x15, 0x12, (5 << 2) as u8, 0x01, 0x08];
		let sig = TypeSignature::read(&mut reader(&bytes)).unwrap();
		let TypeSignature::GenericInst { generic_type, is_value_type, args } = sig else { panic!("expected GenericInst") };
		assert!(!is_value_type);
		let TypeSignature::Class(token) = *generic_type else { panic!("expected Class") };
		assert_eq!(token.table(), TableIndex::TypeDef);
		assert_eq!(token.rid(), 5);
		assert_eq!(args.len(), 1);
		assert!(matches!(args[0], TypeSignature::I4));
	}

	#[test]
	fn array_shape_reads_rank_sizes_and_lower_bounds() {
		// I4 element, rank 2, one size (7), zero lower bounds.
		let bytes = [0x14, 0x08, 0x02, 0x01, 0x07, 0x00];
		let sig = TypeSignature::read(&mut reader(&bytes)).unwrap();
		let TypeSignature::Array { rank, sizes, lower_bounds, .. } = sig else { panic!("expected Array") };
		assert_eq!(rank, 2);
		assert_eq!(sizes, vec![7]);
		assert!(lower_bounds.is_empty());
	}

	#[test]
	fn method_signature_reads_return_type_and_parameters() {
		// DEFAULT calling convention, 1 parameter, I4 return, I1 parameter.
		let bytes = [0x00, 0x01, 0x08, 0x04];
		let sig = MethodSignature::read(&mut reader(&bytes)).unwrap();
		assert!(matches!(sig.return_type, TypeSignature::I4));
		assert_eq!(sig.parameters.len(), 1);
		assert!(matches!(sig.parameters[0], TypeSignature::I1));
		assert!(sig.sentinel_index.is_none());
	}

	#[test]
	fn field_signature_rejects_a_wrong_leading_tag() {
		assert!(FieldSignature::read(&mut reader(&[0x08, 0x08])).is_err());
	}

	#[test]
	fn field_signature_reads_its_single_type() {
		let sig = FieldSignature::read(&mut reader(&[0x06, 0x02])).unwrap();
		assert!(matches!(sig.field_type, TypeSignature::Boolean));
	}
}
