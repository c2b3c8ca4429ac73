//! Assembly resolution: turning an `AssemblyReference`'s
//! identity into a loaded [`AssemblyDefinition`] by probing a list of
//! directories, the way the CLR's own fusion-ish binder walks a search path.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fxhash::FxHashMap;

use crate::model::{AssemblyDefinition, AssemblyVersion};

/// A resolver-facing snapshot of an assembly's identity — everything the
/// CLR's strong-name binder compares before accepting a candidate as a
/// match for a reference.
#[derive(Debug, Clone)]
pub struct AssemblyDescriptor {
	/// Compared case-sensitively.
	pub name: Arc<str>,
	/// Compared as an exact 4-tuple; no "compatible version" fallback.
	pub version: AssemblyVersion,
	/// Compared case-insensitively; `""` and a culture-neutral reference are
	/// equivalent (the model layer already normalizes a null culture index
	/// to `""`).
	pub culture: Arc<str>,
	/// Compared byte-for-byte. Note: this is whatever `#Blob` entry the row
	/// carries, which may be a full public key or just its 8-byte token
	/// depending on [`crate::model::flags::AssemblyFlags::PUBLIC_KEY`] —
	/// this crate does not derive one from the other (see DESIGN.md).
	pub public_key_token: Arc<[u8]>,
}

impl PartialEq for AssemblyDescriptor {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name
			&& self.version == other.version
			&& self.culture.eq_ignore_ascii_case(&other.culture)
			&& self.public_key_token == other.public_key_token
	}
}

impl Eq for AssemblyDescriptor {}

impl Hash for AssemblyDescriptor {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.name.hash(state);
		self.version.hash(state);
		self.culture.to_ascii_lowercase().hash(state);
		self.public_key_token.hash(state);
	}
}

/// Resolves an `AssemblyReference`'s descriptor into a loaded assembly.
/// Implementations are expected to cache: the object model calls `resolve`
/// every time a reference is navigated, not just once per distinct assembly.
pub trait AssemblyResolver: Send + Sync {
	fn resolve(&self, descriptor: &AssemblyDescriptor) -> Option<AssemblyDefinition>;
}

/// Probes an ordered list of directories for a matching assembly, trying
/// both the flat (`dir/Name.dll`) and name-as-folder (`dir/Name/Name.dll`)
/// layouts .NET's own default binder uses. Caches both hits and misses,
/// guarded by a single lock — single-flight correctness takes priority over
/// per-descriptor concurrency here.
pub struct DirectoryAssemblyResolver {
	search_directories: Vec<PathBuf>,
	cache: Mutex<FxHashMap<AssemblyDescriptor, Option<AssemblyDefinition>>>,
}

impl DirectoryAssemblyResolver {
	pub fn new(search_directories: impl IntoIterator<Item = PathBuf>) -> Self {
		Self { search_directories: search_directories.into_iter().collect(), cache: Mutex::new(FxHashMap::default()) }
	}

	pub fn add_search_directory(&mut self, directory: impl Into<PathBuf>) {
		self.search_directories.push(directory.into());
	}

	pub fn search_directories(&self) -> &[PathBuf] {
		&self.search_directories
	}

	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	fn probe(&self, descriptor: &AssemblyDescriptor) -> Option<AssemblyDefinition> {
		for directory in &self.search_directories {
			for candidate in candidate_paths(directory, descriptor) {
				if !candidate.is_file() {
					continue;
				}
				#[cfg(feature = "tracing")]
				tracing::debug!(path = %candidate.display(), "probing candidate assembly");
				match AssemblyDefinition::from_file(&candidate) {
					Ok(assembly) if &assembly.descriptor() == descriptor => return Some(assembly),
					_ => continue,
				}
			}
		}
		None
	}
}

/// `P.dll`, `P.exe`, then the name-as-subfolder layout `P/name.{dll,exe}`,
/// in that order, where `P = dir/culture/name` if `culture` is non-empty
/// else `P = dir/name`.
fn candidate_paths(directory: &Path, descriptor: &AssemblyDescriptor) -> [PathBuf; 4] {
	let name = descriptor.name.as_ref();
	let base = match descriptor.culture.is_empty() {
		true => directory.to_path_buf(),
		false => directory.join(descriptor.culture.as_ref()),
	};
	[
		base.join(format!("{name}.dll")),
		base.join(format!("{name}.exe")),
		base.join(name).join(format!("{name}.dll")),
		base.join(name).join(format!("{name}.exe")),
	]
}

impl AssemblyResolver for DirectoryAssemblyResolver {
	fn resolve(&self, descriptor: &AssemblyDescriptor) -> Option<AssemblyDefinition> {
		let mut cache = self.cache.lock().unwrap();
		if let Some(cached) = cache.get(descriptor) {
			return cached.clone();
		}
		let result = self.probe(descriptor);
		cache.insert(descriptor.clone(), result.clone());
		result
	}
}

impl std::fmt::Debug for DirectoryAssemblyResolver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DirectoryAssemblyResolver")
			.field("search_directories", &self.search_directories)
			.field("cached", &self.cache.lock().unwrap().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn descriptor(name: &str, culture: &str) -> AssemblyDescriptor {
		AssemblyDescriptor {
			name: name.into(),
			version: AssemblyVersion { major: 1, minor: 0, build: 0, revision: 0 },
			culture: culture.into(),
			public_key_token: Arc::from([]),
		}
	}

	#[test]
	fn descriptor_equality_ignores_culture_case() {
		assert_eq!(descriptor("Foo", "en-US"), descriptor("Foo", "EN-us"));
	}

	#[test]
	fn descriptor_equality_is_case_sensitive_on_name() {
		assert_ne!(descriptor("Foo", ""), descriptor("foo", ""));
	}

	#[test]
	fn candidate_paths_try_flat_then_name_as_folder_layout() {
		let dir = Path::new("/libs");
		let candidates = candidate_paths(dir, &descriptor("System.Core", ""));
		assert_eq!(
			candidates,
			[
				PathBuf::from("/libs/System.Core.dll"),
				PathBuf::from("/libs/System.Core.exe"),
				PathBuf::from("/libs/System.Core/System.Core.dll"),
				PathBuf::from("/libs/System.Core/System.Core.exe"),
			]
		);
	}

	#[test]
	fn candidate_paths_insert_culture_segment_when_present() {
		let dir = Path::new("/libs");
		let candidates = candidate_paths(dir, &descriptor("Foo", "en-US"));
		assert_eq!(
			candidates,
			[
				PathBuf::from("/libs/en-US/Foo.dll"),
				PathBuf::from("/libs/en-US/Foo.exe"),
				PathBuf::from("/libs/en-US/Foo/Foo.dll"),
				PathBuf::from("/libs/en-US/Foo/Foo.exe"),
			]
		);
	}

	#[test]
	fn resolver_with_no_search_directories_never_resolves() {
		let resolver = DirectoryAssemblyResolver::new(Vec::new());
		assert!(resolver.resolve(&descriptor("Anything", "")).is_none());
	}
}
