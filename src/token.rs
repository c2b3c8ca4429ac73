//! Metadata tokens, table indices and coded indices.
//!
//! The candidate tables per [`CodedIndexKind`] and the tag-bit counts below
//! must reproduce ECMA-335 §II.24.2.6 exactly — an off-by-one here breaks
//! every row offset downstream of the first coded-index column in any
//! table.

use std::fmt::{Debug, Formatter};

use crate::error::{MetadataError, Result};
use crate::io::BinaryReader;

/// The 45 standard (non-debug) CLI metadata tables, `Module` (0x00) through
/// `GenericParamConstraint` (0x2c). The portable-PDB debug tables
/// (`Document`, `MethodDebugInformation`, ...) are out of scope: no coded
/// index candidate list references them.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TableIndex {
	Module = 0x00,
	TypeRef = 0x01,
	TypeDef = 0x02,
	FieldPtr = 0x03,
	Field = 0x04,
	MethodPtr = 0x05,
	MethodDef = 0x06,
	ParamPtr = 0x07,
	Param = 0x08,
	InterfaceImpl = 0x09,
	MemberRef = 0x0a,
	Constant = 0x0b,
	CustomAttribute = 0x0c,
	FieldMarshal = 0x0d,
	DeclSecurity = 0x0e,
	ClassLayout = 0x0f,
	FieldLayout = 0x10,
	StandAloneSig = 0x11,
	EventMap = 0x12,
	EventPtr = 0x13,
	Event = 0x14,
	PropertyMap = 0x15,
	PropertyPtr = 0x16,
	Property = 0x17,
	MethodSemantics = 0x18,
	MethodImpl = 0x19,
	ModuleRef = 0x1a,
	TypeSpec = 0x1b,
	ImplMap = 0x1c,
	FieldRVA = 0x1d,
	EncLog = 0x1e,
	EncMap = 0x1f,
	Assembly = 0x20,
	AssemblyProcessor = 0x21,
	AssemblyOS = 0x22,
	AssemblyRef = 0x23,
	AssemblyRefProcessor = 0x24,
	AssemblyRefOS = 0x25,
	File = 0x26,
	ExportedType = 0x27,
	ManifestResource = 0x28,
	NestedClass = 0x29,
	GenericParam = 0x2a,
	MethodSpec = 0x2b,
	GenericParamConstraint = 0x2c,
}

pub const TABLE_COUNT: usize = 0x2d;

impl TableIndex {
	pub const ALL: [TableIndex; TABLE_COUNT] = [
		Self::Module, Self::TypeRef, Self::TypeDef, Self::FieldPtr, Self::Field,
		Self::MethodPtr, Self::MethodDef, Self::ParamPtr, Self::Param, Self::InterfaceImpl,
		Self::MemberRef, Self::Constant, Self::CustomAttribute, Self::FieldMarshal, Self::DeclSecurity,
		Self::ClassLayout, Self::FieldLayout, Self::StandAloneSig, Self::EventMap, Self::EventPtr,
		Self::Event, Self::PropertyMap, Self::PropertyPtr, Self::Property, Self::MethodSemantics,
		Self::MethodImpl, Self::ModuleRef, Self::TypeSpec, Self::ImplMap, Self::FieldRVA,
		Self::EncLog, Self::EncMap, Self::Assembly, Self::AssemblyProcessor, Self::AssemblyOS,
		Self::AssemblyRef, Self::AssemblyRefProcessor, Self::AssemblyRefOS, Self::File, Self::ExportedType,
		Self::ManifestResource, Self::NestedClass, Self::GenericParam, Self::MethodSpec, Self::GenericParamConstraint,
	];

	pub fn from_discriminant(value: u8) -> Option<Self> {
		Self::ALL.into_iter().find(|t| *t as u8 == value)
	}
}

/// 32-bit `(table: 8 bits, rid: 24 bits)` row identifier. `rid == 0` means
/// "no reference".
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct MetadataToken(u32);

impl MetadataToken {
	pub const fn new(table: TableIndex, rid: u32) -> Self {
		Self(((table as u32) << 24) | (rid & 0x00FF_FFFF))
	}

	#[inline]
	pub fn table(&self) -> TableIndex {
		TableIndex::from_discriminant((self.0 >> 24) as u8).expect("validated at construction")
	}

	#[inline]
	pub fn rid(&self) -> u32 {
		self.0 & 0x00FF_FFFF
	}

	#[inline]
	pub fn is_null(&self) -> bool {
		self.rid() == 0
	}

	#[inline]
	pub fn to_u32(&self) -> u32 {
		self.0
	}

	pub fn from_u32(value: u32) -> Result<Self> {
		let table = TableIndex::from_discriminant((value >> 24) as u8).ok_or(MetadataError::BadImageFormat {
			offset: 0,
			message: "metadata token references an unknown table index",
		})?;
		Ok(Self::new(table, value & 0x00FF_FFFF))
	}
}

impl Debug for MetadataToken {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "MetadataToken({:?}, {})", self.table(), self.rid())
	}
}

/// Width (in bytes, 2 or 4) of every heap index and coded index, computed
/// once per tables stream from the heap-size flags and per-table row
/// counts.
#[derive(Debug, Clone)]
pub struct IndexSizes {
	pub string: usize,
	pub guid: usize,
	pub blob: usize,
	pub tables: [u32; TABLE_COUNT],
	pub table_widths: [usize; TABLE_COUNT],
	pub coded: [usize; CodedIndexKind::COUNT],
}

impl Default for IndexSizes {
	fn default() -> Self {
		Self {
			string: 2,
			guid: 2,
			blob: 2,
			tables: [0; TABLE_COUNT],
			table_widths: [2; TABLE_COUNT],
			coded: [2; CodedIndexKind::COUNT],
		}
	}
}

impl IndexSizes {
	pub fn new(heap_sizes: u8, row_counts: [u32; TABLE_COUNT]) -> Self {
		let mut table_widths = [2usize; TABLE_COUNT];
		for (width, count) in table_widths.iter_mut().zip(row_counts) {
			if count > 0xFFFF {
				*width = 4;
			}
		}

		let mut coded = [2usize; CodedIndexKind::COUNT];
		for (i, kind) in CodedIndexKind::ALL.into_iter().enumerate() {
			coded[i] = kind.width(&row_counts);
		}

		Self {
			string: 2 + 2 * ((heap_sizes & 0x1) != 0) as usize,
			guid: 2 + 2 * ((heap_sizes & 0x2) != 0) as usize,
			blob: 2 + 2 * ((heap_sizes & 0x4) != 0) as usize,
			tables: row_counts,
			table_widths,
			coded,
		}
	}

	pub fn row_count(&self, table: TableIndex) -> u32 {
		self.tables[table as usize]
	}
}

/// A logical reference that encodes one of several candidate tables
/// Tag bit counts and candidate orderings are fixed by
/// ECMA-335 and must not be reordered.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CodedIndexKind {
	TypeDefOrRef,
	HasConstant,
	HasCustomAttribute,
	HasFieldMarshal,
	HasDeclSecurity,
	MemberRefParent,
	HasSemantics,
	MethodDefOrRef,
	MemberForwarded,
	Implementation,
	CustomAttributeType,
	ResolutionScope,
	TypeOrMethodDef,
}

impl CodedIndexKind {
	pub const COUNT: usize = 13;
	pub const ALL: [CodedIndexKind; Self::COUNT] = [
		Self::TypeDefOrRef, Self::HasConstant, Self::HasCustomAttribute, Self::HasFieldMarshal,
		Self::HasDeclSecurity, Self::MemberRefParent, Self::HasSemantics, Self::MethodDefOrRef,
		Self::MemberForwarded, Self::Implementation, Self::CustomAttributeType, Self::ResolutionScope,
		Self::TypeOrMethodDef,
	];

	/// Candidate tables in tag order; `CustomAttributeType`'s tag space is
	/// sparse (only tags 2 and 3 are defined) and is handled specially in
	/// [`CodedIndexKind::table_for_tag`].
	pub const fn candidates(&self) -> &'static [TableIndex] {
		use TableIndex::*;
		match self {
			Self::TypeDefOrRef => &[TypeDef, TypeRef, TypeSpec],
			Self::HasConstant => &[Field, Param, Property],
			Self::HasCustomAttribute => &[
				MethodDef, Field, TypeRef, TypeDef, Param, InterfaceImpl, MemberRef,
				Module, DeclSecurity, Property, Event, StandAloneSig, ModuleRef,
				TypeSpec, Assembly, AssemblyRef, File, ExportedType,
				ManifestResource, GenericParam, GenericParamConstraint, MethodSpec,
			],
			Self::HasFieldMarshal => &[Field, Param],
			Self::HasDeclSecurity => &[TypeDef, MethodDef, Assembly],
			Self::MemberRefParent => &[TypeDef, TypeRef, ModuleRef, MethodDef, TypeSpec],
			Self::HasSemantics => &[Event, Property],
			Self::MethodDefOrRef => &[MethodDef, MemberRef],
			Self::MemberForwarded => &[Field, MethodDef],
			Self::Implementation => &[File, AssemblyRef, ExportedType],
			// Tags 0/1 are unused; only MethodDef (2) and MemberRef (3) are valid.
			Self::CustomAttributeType => &[MethodDef, MemberRef],
			Self::ResolutionScope => &[Module, ModuleRef, AssemblyRef, TypeRef],
			Self::TypeOrMethodDef => &[TypeDef, MethodDef],
		}
	}

	/// Number of tag bits `t` such that `N <= 2^t` for `N` candidates.
	pub const fn tag_bits(&self) -> u32 {
		match self {
			Self::CustomAttributeType => 3,
			_ => {
				let n = self.candidates().len() as u32;
				match n {
					0 | 1 => 0,
					_ => 32 - (n - 1).leading_zeros(),
				}
			},
		}
	}

	const fn tag_mask(&self) -> u32 {
		(1 << self.tag_bits()) - 1
	}

	/// `4 bytes iff any candidate table has at least 2^(16-t) rows` — at
	/// exactly the threshold the largest rid no longer fits the `16-t`-bit
	/// field alongside the tag.
	pub fn width(&self, row_counts: &[u32; TABLE_COUNT]) -> usize {
		let bits = self.tag_bits();
		let threshold = 1u32 << (16 - bits);
		let over = self.candidates().iter().any(|t| row_counts[*t as usize] >= threshold);
		2 + 2 * over as usize
	}

	fn table_for_tag(&self, tag: u32) -> Option<TableIndex> {
		match self {
			Self::CustomAttributeType => match tag {
				2 => Some(TableIndex::MethodDef),
				3 => Some(TableIndex::MemberRef),
				_ => None,
			},
			_ => self.candidates().get(tag as usize).copied(),
		}
	}

	/// Decodes `raw` (already read at this kind's configured width) into a
	/// token. `rid == 0` is preserved as a null reference.
	pub fn decode(&self, raw: u32) -> Result<MetadataToken> {
		let tag = raw & self.tag_mask();
		let rid = raw >> self.tag_bits();
		let table = self.table_for_tag(tag).ok_or(MetadataError::InvalidCodedIndex { kind: *self, raw })?;
		Ok(MetadataToken::new(table, rid))
	}
}

/// A column that can be read given the tables stream's computed
/// [`IndexSizes`].
pub trait Column: Sized {
	fn read(reader: &mut BinaryReader, sizes: &IndexSizes) -> Result<Self>;
}

impl Column for u8 {
	fn read(reader: &mut BinaryReader, _: &IndexSizes) -> Result<Self> {
		reader.read_u8()
	}
}

impl Column for u16 {
	fn read(reader: &mut BinaryReader, _: &IndexSizes) -> Result<Self> {
		reader.read_u16()
	}
}

impl Column for u32 {
	fn read(reader: &mut BinaryReader, _: &IndexSizes) -> Result<Self> {
		reader.read_u32()
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct StringIndex(pub u32);

impl Column for StringIndex {
	fn read(reader: &mut BinaryReader, sizes: &IndexSizes) -> Result<Self> {
		Ok(Self(reader.read_uint(sizes.string)?))
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct BlobIndex(pub u32);

impl Column for BlobIndex {
	fn read(reader: &mut BinaryReader, sizes: &IndexSizes) -> Result<Self> {
		Ok(Self(reader.read_uint(sizes.blob)?))
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct GuidIndex(pub u32);

impl Column for GuidIndex {
	fn read(reader: &mut BinaryReader, sizes: &IndexSizes) -> Result<Self> {
		Ok(Self(reader.read_uint(sizes.guid)?))
	}
}

/// Zero-sized marker identifying a single (non-coded) table a `RowIndex`
/// column points into.
pub trait TableMarker: Copy + Debug + 'static {
	const INDEX: TableIndex;
}

/// A "simple" table index column: a plain row id into a single, statically
/// known table. Width is 2 bytes unless that table has more than 65535 rows.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct RowIndex<T: TableMarker>(pub u32, std::marker::PhantomData<T>);

impl<T: TableMarker> RowIndex<T> {
	pub fn new(rid: u32) -> Self {
		Self(rid, std::marker::PhantomData)
	}

	pub fn idx(&self) -> Option<usize> {
		match self.0 {
			0 => None,
			rid => Some(rid as usize),
		}
	}
}

impl<T: TableMarker> Debug for RowIndex<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "RowIndex::<{:?}>({})", T::INDEX, self.0)
	}
}

impl<T: TableMarker> Column for RowIndex<T> {
	fn read(reader: &mut BinaryReader, sizes: &IndexSizes) -> Result<Self> {
		Ok(Self::new(reader.read_uint(sizes.table_widths[T::INDEX as usize])?))
	}
}

/// Zero-sized marker identifying a single [`CodedIndexKind`] a `CodedCol`
/// column decodes.
pub trait CodedIndexMarker: Copy + Debug + 'static {
	const KIND: CodedIndexKind;
}

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct CodedCol<K: CodedIndexMarker>(pub u32, std::marker::PhantomData<K>);

impl<K: CodedIndexMarker> CodedCol<K> {
	pub fn decode(&self) -> Result<MetadataToken> {
		K::KIND.decode(self.0)
	}
}

impl<K: CodedIndexMarker> Debug for CodedCol<K> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "CodedCol::<{:?}>({:#x})", K::KIND, self.0)
	}
}

impl<K: CodedIndexMarker> Column for CodedCol<K> {
	fn read(reader: &mut BinaryReader, sizes: &IndexSizes) -> Result<Self> {
		Ok(Self(reader.read_uint(sizes.coded[K::KIND as usize])?, std::marker::PhantomData))
	}
}

macro_rules! define_table_markers {
	($($name:ident => $table:ident),* $(,)?) => {
		$(
			#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
			pub struct $name;
			impl TableMarker for $name {
				const INDEX: TableIndex = TableIndex::$table;
			}
		)*
	};
}

define_table_markers! {
	ModuleTag => Module, TypeRefTag => TypeRef, TypeDefTag => TypeDef, FieldTag => Field,
	MethodDefTag => MethodDef, ParamTag => Param, EventTag => Event, PropertyTag => Property,
	ModuleRefTag => ModuleRef, AssemblyRefTag => AssemblyRef, GenericParamTag => GenericParam,
}

macro_rules! define_coded_markers {
	($($name:ident => $kind:ident),* $(,)?) => {
		$(
			#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
			pub struct $name;
			impl CodedIndexMarker for $name {
				const KIND: CodedIndexKind = CodedIndexKind::$kind;
			}
		)*
	};
}

define_coded_markers! {
	TypeDefOrRefTag => TypeDefOrRef, HasConstantTag => HasConstant, HasCustomAttributeTag => HasCustomAttribute,
	HasFieldMarshalTag => HasFieldMarshal, HasDeclSecurityTag => HasDeclSecurity, MemberRefParentTag => MemberRefParent,
	HasSemanticsTag => HasSemantics, MethodDefOrRefTag => MethodDefOrRef, MemberForwardedTag => MemberForwarded,
	ImplementationTag => Implementation, CustomAttributeTypeTag => CustomAttributeType,
	ResolutionScopeTag => ResolutionScope, TypeOrMethodDefTag => TypeOrMethodDef,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn metadata_token_round_trips_table_and_rid() {
		let token = MetadataToken::new(TableIndex::TypeDef, 0x1234);
		assert_eq!(token.table(), TableIndex::TypeDef);
		assert_eq!(token.rid(), 0x1234);
		assert_eq!(MetadataToken::from_u32(token.to_u32()).unwrap().to_u32(), token.to_u32());
	}

	#[test]
	fn rid_zero_is_null() {
		assert!(MetadataToken::new(TableIndex::TypeDef, 0).is_null());
		assert!(!MetadataToken::new(TableIndex::TypeDef, 1).is_null());
	}

	#[test]
	fn from_u32_rejects_unknown_table_index() {
		let bogus = (0xFFu32 << 24) | 1;
		assert!(MetadataToken::from_u32(bogus).is_err());
	}

	#[test]
	fn type_def_or_ref_tag_bits_and_width_match_ecma_335() {
		// ECMA-335 §II.24.2.6: 3 candidates -> 2 tag bits -> 4 bytes iff any
		// candidate table has at least 2^14 = 16384 rows.
		assert_eq!(CodedIndexKind::TypeDefOrRef.tag_bits(), 2);
		let mut counts = [0u32; TABLE_COUNT];
		assert_eq!(CodedIndexKind::TypeDefOrRef.width(&counts), 2);
		counts[TableIndex::TypeDef as usize] = 16383;
		assert_eq!(CodedIndexKind::TypeDefOrRef.width(&counts), 2);
		counts[TableIndex::TypeDef as usize] = 16384;
		assert_eq!(CodedIndexKind::TypeDefOrRef.width(&counts), 4);
		counts = [0u32; TABLE_COUNT];
		counts[TableIndex::TypeRef as usize] = 16385;
		assert_eq!(CodedIndexKind::TypeDefOrRef.width(&counts), 4);
	}

	#[test]
	fn custom_attribute_type_only_decodes_tags_two_and_three() {
		assert_eq!(CodedIndexKind::CustomAttributeType.tag_bits(), 3);
		assert_eq!(CodedIndexKind::CustomAttributeType.decode(2 | (5 << 3)).unwrap().table(), TableIndex::MethodDef);
		assert_eq!(CodedIndexKind::CustomAttributeType.decode(3 | (5 << 3)).unwrap().table(), TableIndex::MemberRef);
		assert!(CodedIndexKind::CustomAttributeType.decode(0).is_err());
	}

	#[test]
	fn coded_index_decode_preserves_null_rid() {
		let token = CodedIndexKind::TypeDefOrRef.decode(0).unwrap();
		assert!(token.is_null());
		assert_eq!(token.table(), TableIndex::TypeDef);
	}

	#[test]
	fn index_sizes_widen_string_heap_when_flag_is_set() {
		let sizes = IndexSizes::new(0x1, [0; TABLE_COUNT]);
		assert_eq!(sizes.string, 4);
		assert_eq!(sizes.guid, 2);
		assert_eq!(sizes.blob, 2);
	}

	#[test]
	fn index_sizes_widen_row_index_past_64k_rows() {
		let mut counts = [0u32; TABLE_COUNT];
		counts[TableIndex::TypeDef as usize] = 70_000;
		let sizes = IndexSizes::new(0, counts);
		assert_eq!(sizes.table_widths[TableIndex::TypeDef as usize], 4);
		assert_eq!(sizes.table_widths[TableIndex::Module as usize], 2);
	}
}
