//! Builds a minimal CLI metadata root by hand (no real .NET toolchain is
//! available to produce a fixture) and drives it through the public
//! loading/navigation surface: a single
//! manifest module, and a three-row `TypeDef` table with one `NestedClass`
//! pairing.

use std::sync::Arc;

use ilmeta::heaps::MetadataRoot;
use ilmeta::model::{Member, MetadataContext};
use ilmeta::token::{MetadataToken, TableIndex};

/// Appends `name` nul-terminated, padded with zero bytes to a 4-byte
/// boundary, and returns the total number of bytes appended (stream names
/// and the metadata version string share this encoding).
fn push_padded(buf: &mut Vec<u8>, s: &str) -> usize {
	let start = buf.len();
	buf.extend_from_slice(s.as_bytes());
	buf.push(0);
	while (buf.len() - start) % 4 != 0 {
		buf.push(0);
	}
	buf.len() - start
}

/// A `#Strings` heap builder: index 0 is always the empty string.
#[derive(Default)]
struct StringsBuilder(Vec<u8>);

impl StringsBuilder {
	fn new() -> Self {
		Self(vec![0u8])
	}

	fn push(&mut self, s: &str) -> u16 {
		let index = self.0.len() as u16;
		self.0.extend_from_slice(s.as_bytes());
		self.0.push(0);
		index
	}
}

/// Assembles a full CLI metadata root blob (`#Strings` + `#~` streams only
/// — no `#Blob`/`#GUID`/`#US` entries are touched by this test) from
/// pre-encoded tables-stream bytes and a strings heap.
fn build_metadata_root(strings: Vec<u8>, tables: Vec<u8>) -> Arc<[u8]> {
	let mut root = Vec::new();
	root.extend_from_slice(&0x424A5342u32.to_le_bytes());
	root.extend_from_slice(&1u16.to_le_bytes()); // major
	root.extend_from_slice(&1u16.to_le_bytes()); // minor
	root.extend_from_slice(&0u32.to_le_bytes()); // reserved

	let mut version = Vec::new();
	let version_len = push_padded(&mut version, "v4.0.30319");
	root.extend_from_slice(&(version_len as u32).to_le_bytes());
	root.extend_from_slice(&version);

	root.extend_from_slice(&0u16.to_le_bytes()); // flags
	root.extend_from_slice(&2u16.to_le_bytes()); // stream count

	// Stream directory: two entries, offsets patched in after we know where
	// the header ends.
	let directory_start = root.len();
	for name in ["#Strings", "#~"] {
		root.extend_from_slice(&0u32.to_le_bytes()); // offset placeholder
		root.extend_from_slice(&0u32.to_le_bytes()); // size placeholder
		push_padded(&mut root, name);
	}

	let strings_offset = root.len() as u32;
	root.extend_from_slice(&strings);
	let tables_offset = root.len() as u32;
	root.extend_from_slice(&tables);

	let patch = |root: &mut Vec<u8>, at: usize, offset: u32, size: u32| {
		root[at..at + 4].copy_from_slice(&offset.to_le_bytes());
		root[at + 4..at + 8].copy_from_slice(&size.to_le_bytes());
	};
	patch(&mut root, directory_start, strings_offset, strings.len() as u32);
	// "#Strings\0" is 9 bytes, padded to 12.
	patch(&mut root, directory_start + 8 + 12, tables_offset, tables.len() as u32);

	Arc::from(root)
}

/// Builds a `#~` stream with one `Module` row, three `TypeDef` rows and one
/// `NestedClass` pairing `(3 -> 2)`, plus one `Assembly` row, all using
/// 2-byte heap/coded/row indices (row counts stay well under the 64k
/// widening threshold).
fn build_tables_stream(module_name: u16, assembly_name: u16, type_names: [u16; 3]) -> Vec<u8> {
	let mut buf = Vec::new();
	buf.extend_from_slice(&0u32.to_le_bytes()); // reserved
	buf.push(2); // major
	buf.push(0); // minor
	buf.push(0); // heap_sizes: all 2-byte indices
	buf.push(0); // reserved

	let module: u64 = TableIndex::Module as u64;
	let type_def: u64 = TableIndex::TypeDef as u64;
	let assembly: u64 = TableIndex::Assembly as u64;
	let nested_class: u64 = TableIndex::NestedClass as u64;
	let valid = (1 << module) | (1 << type_def) | (1 << assembly) | (1 << nested_class);
	let sorted = 1u64 << nested_class;
	buf.extend_from_slice(&valid.to_le_bytes());
	buf.extend_from_slice(&sorted.to_le_bytes());

	// Row counts, ascending table-index order: Module, TypeDef, Assembly, NestedClass.
	for count in [1u32, 3, 1, 1] {
		buf.extend_from_slice(&count.to_le_bytes());
	}

	// Module row.
	buf.extend_from_slice(&0u16.to_le_bytes()); // generation
	buf.extend_from_slice(&module_name.to_le_bytes());
	buf.extend_from_slice(&0u16.to_le_bytes()); // mvid
	buf.extend_from_slice(&0u16.to_le_bytes()); // enc_id
	buf.extend_from_slice(&0u16.to_le_bytes()); // enc_base_id

	// TypeDef rows: flags(4) name(2) namespace(2) extends(2) field_list(2) method_list(2).
	for name in type_names {
		buf.extend_from_slice(&0u32.to_le_bytes()); // flags
		buf.extend_from_slice(&name.to_le_bytes());
		buf.extend_from_slice(&0u16.to_le_bytes()); // namespace (global)
		buf.extend_from_slice(&0u16.to_le_bytes()); // extends: tag 0, rid 0 -> null
		buf.extend_from_slice(&1u16.to_le_bytes()); // field_list: no Field rows
		buf.extend_from_slice(&1u16.to_le_bytes()); // method_list: no MethodDef rows
	}

	// Assembly row.
	buf.extend_from_slice(&0x8004u32.to_le_bytes()); // hash_alg_id: SHA1
	buf.extend_from_slice(&1u16.to_le_bytes()); // major
	buf.extend_from_slice(&0u16.to_le_bytes()); // minor
	buf.extend_from_slice(&0u16.to_le_bytes()); // build
	buf.extend_from_slice(&0u16.to_le_bytes()); // revision
	buf.extend_from_slice(&0u32.to_le_bytes()); // flags
	buf.extend_from_slice(&0u16.to_le_bytes()); // public_key: empty blob
	buf.extend_from_slice(&assembly_name.to_le_bytes());
	buf.extend_from_slice(&0u16.to_le_bytes()); // culture: empty

	// NestedClass row: type 3 is nested inside type 2.
	buf.extend_from_slice(&3u16.to_le_bytes());
	buf.extend_from_slice(&2u16.to_le_bytes());

	buf
}

fn load_fixture() -> MetadataContext {
	let mut strings = StringsBuilder::new();
	let module_name = strings.push("HelloWorld.dll");
	let assembly_name = strings.push("HelloWorld");
	let type_names = [strings.push("Type1"), strings.push("Type2"), strings.push("Type3")];

	let tables = build_tables_stream(module_name, assembly_name, type_names);
	let bytes = build_metadata_root(strings.0, tables);

	let root = MetadataRoot::read(owning_ref::ArcRef::new(bytes).map(|d| &d[..])).expect("metadata root parses");
	MetadataContext::new(root)
}

#[test]
fn hello_world_assembly_name_and_version() {
	let ctx = load_fixture();
	let Member::Assembly(assembly) = ctx.lookup_member(MetadataToken::new(TableIndex::Assembly, 1)).unwrap() else {
		panic!("expected an assembly member");
	};
	assert_eq!(&*assembly.name(), "HelloWorld");
	assert_eq!(assembly.version().major, 1);
	assert_eq!(assembly.version().minor, 0);
}

#[test]
fn single_module_round_trips_to_its_assembly() {
	let ctx = load_fixture();
	let Member::Assembly(assembly) = ctx.lookup_member(MetadataToken::new(TableIndex::Assembly, 1)).unwrap() else {
		panic!("expected an assembly member");
	};
	let modules = assembly.modules();
	let modules = modules.read().unwrap();
	assert_eq!(modules.len(), 1);
	assert_eq!(modules.get(0).unwrap().name().as_ref(), "HelloWorld.dll");
	assert_eq!(modules.get(0).unwrap().assembly().unwrap().token(), assembly.token());
}

#[test]
fn nested_class_splits_top_level_from_nested_types() {
	let ctx = load_fixture();
	let Member::Module(module) = ctx.lookup_member(MetadataToken::new(TableIndex::Module, 1)).unwrap() else {
		panic!("expected a module member");
	};

	let top_level = module.top_level_types();
	let top_level = top_level.read().unwrap();
	let top_level_names: Vec<_> = top_level.iter().map(|t| t.name().to_string()).collect();
	assert_eq!(top_level_names, vec!["Type1", "Type2"]);

	let type2 = top_level.get(1).unwrap();
	let nested = type2.nested_types();
	let nested = nested.read().unwrap();
	assert_eq!(nested.len(), 1);
	let type3 = nested.get(0).unwrap();
	assert_eq!(&*type3.name(), "Type3");
	assert_eq!(type3.declaring_type().unwrap().token(), type2.token());
	assert!(type3.declaring_type().is_some());
	assert!(top_level.iter().all(|t| t.declaring_type().is_none()));
}

#[test]
fn full_name_reflects_empty_namespace() {
	let ctx = load_fixture();
	let Member::Module(module) = ctx.lookup_member(MetadataToken::new(TableIndex::Module, 1)).unwrap() else {
		panic!("expected a module member");
	};
	let top_level = module.top_level_types();
	let top_level = top_level.read().unwrap();
	let type1 = top_level.get(0).unwrap();
	assert_eq!(&*type1.full_name(), "Type1");
	type1.set_name("Renamed");
	assert_eq!(&*type1.full_name(), "Renamed");
}
