//! Row schemas for the 45 standard CLI metadata tables. Each row is a plain
//! struct of [`Column`]s; widths are resolved at read time from the tables
//! stream's [`IndexSizes`].

use crate::error::Result;
use crate::io::BinaryReader;
use crate::token::*;

/// Implemented by every row type; lets [`crate::tables::TablesStream`] read
/// a table generically without a `TypeId`-keyed trait object per row.
pub trait Row: Sized + Send + Sync + 'static {
	const TABLE: TableIndex;
	fn read(reader: &mut BinaryReader, sizes: &IndexSizes) -> Result<Self>;
}

macro_rules! define_row {
	($table:ident { $($field:ident : $ty:ty),* $(,)? }) => {
		#[derive(Debug, Clone)]
		#[allow(dead_code)]
		pub struct $table {
			$(pub $field: $ty),*
		}

		impl Row for $table {
			const TABLE: TableIndex = TableIndex::$table;

			fn read(reader: &mut BinaryReader, sizes: &IndexSizes) -> Result<Self> {
				$(let $field = <$ty as Column>::read(reader, sizes)?;)*
				Ok(Self { $($field),* })
			}
		}
	};
}

define_row!(Module {
	generation: u16,
	name: StringIndex,
	mvid: GuidIndex,
	enc_id: GuidIndex,
	enc_base_id: GuidIndex,
});

define_row!(TypeRef {
	resolution_scope: CodedCol<ResolutionScopeTag>,
	type_name: StringIndex,
	type_namespace: StringIndex,
});

define_row!(TypeDef {
	flags: u32,
	type_name: StringIndex,
	type_namespace: StringIndex,
	extends: CodedCol<TypeDefOrRefTag>,
	field_list: RowIndex<FieldTag>,
	method_list: RowIndex<MethodDefTag>,
});

define_row!(FieldPtr {
	field: RowIndex<FieldTag>,
});

define_row!(Field {
	flags: u16,
	name: StringIndex,
	signature: BlobIndex,
});

define_row!(MethodPtr {
	method: RowIndex<MethodDefTag>,
});

define_row!(MethodDef {
	rva: u32,
	impl_flags: u16,
	flags: u16,
	name: StringIndex,
	signature: BlobIndex,
	param_list: RowIndex<ParamTag>,
});

define_row!(ParamPtr {
	param: RowIndex<ParamTag>,
});

define_row!(Param {
	flags: u16,
	sequence: u16,
	name: StringIndex,
});

define_row!(InterfaceImpl {
	class: RowIndex<TypeDefTag>,
	interface: CodedCol<TypeDefOrRefTag>,
});

define_row!(MemberRef {
	class: CodedCol<MemberRefParentTag>,
	name: StringIndex,
	signature: BlobIndex,
});

define_row!(Constant {
	kind: u16,
	parent: CodedCol<HasConstantTag>,
	value: BlobIndex,
});

define_row!(CustomAttribute {
	parent: CodedCol<HasCustomAttributeTag>,
	kind: CodedCol<CustomAttributeTypeTag>,
	value: BlobIndex,
});

define_row!(FieldMarshal {
	parent: CodedCol<HasFieldMarshalTag>,
	native_type: BlobIndex,
});

define_row!(DeclSecurity {
	action: u16,
	parent: CodedCol<HasDeclSecurityTag>,
	permission_set: BlobIndex,
});

define_row!(ClassLayout {
	packing_size: u16,
	class_size: u32,
	parent: RowIndex<TypeDefTag>,
});

define_row!(FieldLayout {
	offset: u32,
	field: RowIndex<FieldTag>,
});

define_row!(StandAloneSig {
	signature: BlobIndex,
});

define_row!(EventMap {
	parent: RowIndex<TypeDefTag>,
	event_list: RowIndex<EventTag>,
});

define_row!(EventPtr {
	event: RowIndex<EventTag>,
});

define_row!(Event {
	flags: u16,
	name: StringIndex,
	event_type: CodedCol<TypeDefOrRefTag>,
});

define_row!(PropertyMap {
	parent: RowIndex<TypeDefTag>,
	property_list: RowIndex<PropertyTag>,
});

define_row!(PropertyPtr {
	property: RowIndex<PropertyTag>,
});

define_row!(Property {
	flags: u16,
	name: StringIndex,
	kind: BlobIndex,
});

define_row!(MethodSemantics {
	semantics: u16,
	method: RowIndex<MethodDefTag>,
	association: CodedCol<HasSemanticsTag>,
});

define_row!(MethodImpl {
	class: RowIndex<TypeDefTag>,
	method_body: CodedCol<MethodDefOrRefTag>,
	method_declaration: CodedCol<MethodDefOrRefTag>,
});

define_row!(ModuleRef {
	name: StringIndex,
});

define_row!(TypeSpec {
	signature: BlobIndex,
});

define_row!(ImplMap {
	mapping_flags: u16,
	member_forwarded: CodedCol<MemberForwardedTag>,
	import_name: StringIndex,
	import_scope: RowIndex<ModuleRefTag>,
});

define_row!(FieldRVA {
	rva: u32,
	field: RowIndex<FieldTag>,
});

define_row!(EncLog {
	token: u32,
	func_code: u32,
});

define_row!(EncMap {
	token: u32,
});

define_row!(Assembly {
	hash_alg_id: u32,
	major_version: u16,
	minor_version: u16,
	build_number: u16,
	revision_number: u16,
	flags: u32,
	public_key: BlobIndex,
	name: StringIndex,
	culture: StringIndex,
});

define_row!(AssemblyProcessor {
	processor: u32,
});

define_row!(AssemblyOS {
	os_platform_id: u32,
	os_major_version: u32,
	os_minor_version: u32,
});

define_row!(AssemblyRef {
	major_version: u16,
	minor_version: u16,
	build_number: u16,
	revision_number: u16,
	flags: u32,
	public_key_or_token: BlobIndex,
	name: StringIndex,
	culture: StringIndex,
	hash_value: BlobIndex,
});

define_row!(AssemblyRefProcessor {
	processor: u32,
	assembly_ref: RowIndex<AssemblyRefTag>,
});

define_row!(AssemblyRefOS {
	os_platform_id: u32,
	os_major_version: u32,
	os_minor_version: u32,
	assembly_ref: RowIndex<AssemblyRefTag>,
});

define_row!(File {
	flags: u32,
	name: StringIndex,
	hash_value: BlobIndex,
});

define_row!(ExportedType {
	flags: u32,
	type_def_id: u32,
	type_name: StringIndex,
	type_namespace: StringIndex,
	implementation: CodedCol<ImplementationTag>,
});

define_row!(ManifestResource {
	offset: u32,
	flags: u32,
	name: StringIndex,
	implementation: CodedCol<ImplementationTag>,
});

define_row!(NestedClass {
	nested_class: RowIndex<TypeDefTag>,
	enclosing_class: RowIndex<TypeDefTag>,
});

define_row!(GenericParam {
	number: u16,
	flags: u16,
	owner: CodedCol<TypeOrMethodDefTag>,
	name: StringIndex,
});

define_row!(MethodSpec {
	method: CodedCol<MethodDefOrRefTag>,
	instantiation: BlobIndex,
});

define_row!(GenericParamConstraint {
	owner: RowIndex<GenericParamTag>,
	constraint: CodedCol<TypeDefOrRefTag>,
});
