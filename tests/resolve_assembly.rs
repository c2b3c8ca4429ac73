//! Drives [`DirectoryAssemblyResolver`] end to end: writes a minimal `.dll`
//! (a full PE image wrapping a one-row `Assembly` table) to a real scratch
//! directory and resolves it by descriptor, the flat-layout probing path.
//! No `tempfile` dependency in this pack's teacher lineage, so the scratch
//! directory is a hand-rolled one under `std::env::temp_dir()`, same as the
//! rest of this crate's direct-`std::fs` style.

use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};

use ilmeta::resolver::{AssemblyDescriptor, AssemblyResolver, DirectoryAssemblyResolver};
use ilmeta::token::TableIndex;

fn push_padded(buf: &mut Vec<u8>, s: &str) -> usize {
	let start = buf.len();
	buf.extend_from_slice(s.as_bytes());
	buf.push(0);
	while (buf.len() - start) % 4 != 0 {
		buf.push(0);
	}
	buf.len() - start
}

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

/// Single `Module` row plus a single `Assembly` row named `name`.
fn build_tables_stream(module_name: u16, assembly_name: u16) -> Vec<u8> {
	let mut buf = Vec::new();
	buf.extend_from_slice(&0u32.to_le_bytes()); // reserved
	buf.push(2); // major
	buf.push(0); // minor
	buf.push(0); // heap_sizes: all 2-byte indices
	buf.push(0); // reserved

	let module: u64 = TableIndex::Module as u64;
	let assembly: u64 = TableIndex::Assembly as u64;
	let valid = (1 << module) | (1 << assembly);
	buf.extend_from_slice(&valid.to_le_bytes());
	buf.extend_from_slice(&0u64.to_le_bytes()); // sorted

	for count in [1u32, 1] {
		buf.extend_from_slice(&count.to_le_bytes());
	}

	// Module row: generation, name, mvid, enc_id, enc_base_id.
	buf.extend_from_slice(&0u16.to_le_bytes());
	buf.extend_from_slice(&module_name.to_le_bytes());
	buf.extend_from_slice(&0u16.to_le_bytes());
	buf.extend_from_slice(&0u16.to_le_bytes());
	buf.extend_from_slice(&0u16.to_le_bytes());

	// Assembly row.
	buf.extend_from_slice(&0x8004u32.to_le_bytes()); // hash_alg_id: SHA1
	buf.extend_from_slice(&3u16.to_le_bytes()); // major
	buf.extend_from_slice(&1u16.to_le_bytes()); // minor
	buf.extend_from_slice(&4u16.to_le_bytes()); // build
	buf.extend_from_slice(&0u16.to_le_bytes()); // revision
	buf.extend_from_slice(&0u32.to_le_bytes()); // flags
	buf.extend_from_slice(&0u16.to_le_bytes()); // public_key: empty blob
	buf.extend_from_slice(&assembly_name.to_le_bytes());
	buf.extend_from_slice(&0u16.to_le_bytes()); // culture: empty

	buf
}

fn build_metadata_root(strings: Vec<u8>, tables: Vec<u8>) -> Vec<u8> {
	let mut root = Vec::new();
	root.extend_from_slice(&0x424A5342u32.to_le_bytes());
	root.extend_from_slice(&1u16.to_le_bytes());
	root.extend_from_slice(&1u16.to_le_bytes());
	root.extend_from_slice(&0u32.to_le_bytes());

	let mut version = Vec::new();
	let version_len = push_padded(&mut version, "v4.0.30319");
	root.extend_from_slice(&(version_len as u32).to_le_bytes());
	root.extend_from_slice(&version);

	root.extend_from_slice(&0u16.to_le_bytes()); // flags
	root.extend_from_slice(&2u16.to_le_bytes()); // stream count

	let directory_start = root.len();
	for name in ["#Strings", "#~"] {
		root.extend_from_slice(&0u32.to_le_bytes());
		root.extend_from_slice(&0u32.to_le_bytes());
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
	patch(&mut root, directory_start + 8 + 12, tables_offset, tables.len() as u32);

	root
}

/// Wraps `metadata_root` in a minimal single-section PE32 image with a CLI
/// header pointing straight at it, the same layout `src/pe.rs`'s own test
/// fixture uses.
fn build_pe_image(metadata_root: &[u8]) -> Vec<u8> {
	const PE_MAGIC: u32 = 0x4550;
	const PE32_MAGIC: u16 = 0x010B;
	const CLI_DATA_DIRECTORY: usize = 14;

	let mut buf = vec![0u8; 64];
	buf[0] = 0x4D;
	buf[1] = 0x5A;
	buf[0x3C..0x40].copy_from_slice(&64u32.to_le_bytes());

	buf.extend_from_slice(&PE_MAGIC.to_le_bytes());
	buf.extend_from_slice(&0x014Cu16.to_le_bytes());
	buf.extend_from_slice(&1u16.to_le_bytes());
	buf.extend_from_slice(&0u32.to_le_bytes());
	buf.extend_from_slice(&0u32.to_le_bytes());
	buf.extend_from_slice(&0u32.to_le_bytes());
	buf.extend_from_slice(&224u16.to_le_bytes());
	buf.extend_from_slice(&0x0102u16.to_le_bytes());

	let optional_start = buf.len();
	buf.extend_from_slice(&PE32_MAGIC.to_le_bytes());
	buf.resize(optional_start + 28, 0);
	buf.extend_from_slice(&0x0040_0000u32.to_le_bytes());
	buf.resize(optional_start + 96, 0);
	for i in 0..16 {
		let (va, size) = if i == CLI_DATA_DIRECTORY { (0x2000u32, 40u32) } else { (0, 0) };
		buf.extend_from_slice(&va.to_le_bytes());
		buf.extend_from_slice(&size.to_le_bytes());
	}
	buf.resize(optional_start + 224, 0);

	let cli_header_len = 40;
	let raw_len = (cli_header_len + metadata_root.len()) as u32;
	let pointer_to_raw_data = buf.len() as u32 + 40;
	buf.extend_from_slice(b".text\0\0\0");
	buf.extend_from_slice(&raw_len.to_le_bytes());
	buf.extend_from_slice(&0x2000u32.to_le_bytes());
	buf.extend_from_slice(&raw_len.to_le_bytes());
	buf.extend_from_slice(&pointer_to_raw_data.to_le_bytes());
	buf.resize(buf.len() + 16, 0);

	buf.extend_from_slice(&72u32.to_le_bytes()); // size_in_bytes
	buf.extend_from_slice(&2u16.to_le_bytes()); // major_runtime_version
	buf.extend_from_slice(&5u16.to_le_bytes()); // minor_runtime_version
	buf.extend_from_slice(&0x2028u32.to_le_bytes()); // metadata.virtual_address
	buf.extend_from_slice(&(metadata_root.len() as u32).to_le_bytes());
	buf.extend_from_slice(&1u32.to_le_bytes()); // flags: IL_ONLY
	buf.extend_from_slice(&0x06000000u32.to_le_bytes()); // entry_point_token: MethodDef, rid 0
	buf.extend_from_slice(&0u32.to_le_bytes());
	buf.extend_from_slice(&0u32.to_le_bytes());
	buf.extend_from_slice(&0u32.to_le_bytes());
	buf.extend_from_slice(&0u32.to_le_bytes());

	buf.extend_from_slice(metadata_root);
	buf
}

fn build_dll(assembly_name: &str) -> Vec<u8> {
	let mut strings = StringsBuilder::new();
	let module_name = strings.push("a.dll");
	let name_index = strings.push(assembly_name);
	let tables = build_tables_stream(module_name, name_index);
	let root = build_metadata_root(strings.0, tables);
	build_pe_image(&root)
}

/// A scratch directory under `std::env::temp_dir()`, removed on drop.
struct ScratchDir(std::path::PathBuf);

impl ScratchDir {
	fn new(tag: &str) -> Self {
		static COUNTER: AtomicU32 = AtomicU32::new(0);
		let n = COUNTER.fetch_add(1, Ordering::Relaxed);
		let dir = std::env::temp_dir().join(format!("ilmeta-resolve-test-{tag}-{}-{n}", std::process::id()));
		fs::create_dir_all(&dir).expect("create scratch dir");
		Self(dir)
	}
}

impl Drop for ScratchDir {
	fn drop(&mut self) {
		let _ = fs::remove_dir_all(&self.0);
	}
}

fn descriptor(name: &str) -> AssemblyDescriptor {
	AssemblyDescriptor {
		name: name.into(),
		version: ilmeta::model::AssemblyVersion { major: 3, minor: 1, build: 4, revision: 0 },
		culture: "".into(),
		public_key_token: std::sync::Arc::from([]),
	}
}

#[test]
fn resolves_a_flat_layout_assembly_from_a_search_directory() {
	let scratch = ScratchDir::new("flat");
	fs::write(scratch.0.join("Contoso.Utils.dll"), build_dll("Contoso.Utils")).unwrap();

	let resolver = DirectoryAssemblyResolver::new([scratch.0.clone()]);
	let resolved = resolver.resolve(&descriptor("Contoso.Utils")).expect("resolves from the flat layout");
	assert_eq!(&*resolved.name(), "Contoso.Utils");
	assert_eq!(resolved.version().major, 3);
}

#[test]
fn resolves_a_name_as_folder_layout_assembly() {
	let scratch = ScratchDir::new("folder");
	let sub = scratch.0.join("Contoso.Utils");
	fs::create_dir_all(&sub).unwrap();
	fs::write(sub.join("Contoso.Utils.dll"), build_dll("Contoso.Utils")).unwrap();

	let resolver = DirectoryAssemblyResolver::new([scratch.0.clone()]);
	let resolved = resolver.resolve(&descriptor("Contoso.Utils")).expect("resolves from the name-as-folder layout");
	assert_eq!(&*resolved.name(), "Contoso.Utils");
}

#[test]
fn a_name_mismatch_in_the_directory_does_not_resolve() {
	let scratch = ScratchDir::new("mismatch");
	fs::write(scratch.0.join("Contoso.Utils.dll"), build_dll("Contoso.Utils")).unwrap();

	let resolver = DirectoryAssemblyResolver::new([scratch.0.clone()]);
	assert!(resolver.resolve(&descriptor("Fabrikam.Core")).is_none());
}

#[test]
fn repeated_resolution_of_the_same_descriptor_is_served_from_cache() {
	let scratch = ScratchDir::new("cache");
	let path = scratch.0.join("Contoso.Utils.dll");
	fs::write(&path, build_dll("Contoso.Utils")).unwrap();

	let resolver = DirectoryAssemblyResolver::new([scratch.0.clone()]);
	let first = resolver.resolve(&descriptor("Contoso.Utils")).expect("resolves once");

	// Remove the backing file: a cache hit must not need to re-probe disk.
	fs::remove_file(&path).unwrap();
	let second = resolver.resolve(&descriptor("Contoso.Utils")).expect("served from cache, not re-probed");
	assert_eq!(first.token(), second.token());
}
