use std::sync::Arc;

use crate::lazy::{HasOwner, Lazy};
use crate::model::flags::AssemblyFlags;
use crate::model::module::ModuleHandle;
use crate::model::{AssemblyVersion, MetadataContext};
use crate::resolver::AssemblyDescriptor;
use crate::tables::rows::AssemblyRef as AssemblyRefRow;
use crate::token::{MetadataToken, TableIndex};

struct AssemblyRefInner {
	token: MetadataToken,
	context: Option<MetadataContext>,
	row: Option<AssemblyRefRow>,

	owner: Lazy<Option<ModuleHandle>>,
	name: Lazy<Arc<str>>,
	culture: Lazy<Arc<str>>,
	public_key_or_token: Lazy<Arc<[u8]>>,
	hash_value: Lazy<Arc<[u8]>>,
}

/// A row of the `AssemblyRef` table: the identity (name, version, culture,
/// public key token, flags) of an assembly this module depends on, resolved
/// against the runtime search path via [`crate::resolver::AssemblyResolver`].
#[derive(Clone)]
pub struct AssemblyReference(Arc<AssemblyRefInner>);

impl AssemblyReference {
	pub(crate) fn from_context(context: MetadataContext, rid: u32) -> crate::error::Result<Self> {
		let row = context.tables().row_checked::<AssemblyRefRow>(rid)?.clone();
		let token = MetadataToken::new(TableIndex::AssemblyRef, rid);
		Ok(Self(Arc::new(AssemblyRefInner {
			token,
			context: Some(context),
			row: Some(row),
			owner: Lazy::unset(),
			name: Lazy::unset(),
			culture: Lazy::unset(),
			public_key_or_token: Lazy::unset(),
			hash_value: Lazy::unset(),
		})))
	}

	pub fn token(&self) -> MetadataToken {
		self.0.token
	}

	pub fn name(&self) -> Arc<str> {
		self.0.name.get_or_init(|| self.string_field(|row| row.name.0))
	}

	/// The culture name, or the empty string for a culture-neutral reference
	/// (`null` and `""` compare equal).
	pub fn culture(&self) -> Arc<str> {
		self.0.culture.get_or_init(|| self.string_field(|row| row.culture.0))
	}

	fn string_field(&self, select: impl Fn(&AssemblyRefRow) -> u32) -> Arc<str> {
		match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => ctx.strings().get_string(select(row)).unwrap_or("").into(),
			_ => "".into(),
		}
	}

	pub fn version(&self) -> AssemblyVersion {
		match &self.0.row {
			Some(row) => {
				AssemblyVersion { major: row.major_version, minor: row.minor_version, build: row.build_number, revision: row.revision_number }
			},
			None => AssemblyVersion::default(),
		}
	}

	pub fn flags(&self) -> AssemblyFlags {
		self.0.row.as_ref().map(|row| AssemblyFlags::from_bits_truncate(row.flags)).unwrap_or(AssemblyFlags::empty())
	}

	/// The public key (if [`AssemblyFlags::PUBLIC_KEY`] is set) or public key
	/// token, as stored in `#Blob` — raw bytes, not hex-decoded.
	pub fn public_key_or_token(&self) -> Arc<[u8]> {
		self.0.public_key_or_token.get_or_init(|| self.blob_field(|row| row.public_key_or_token.0))
	}

	pub fn hash_value(&self) -> Arc<[u8]> {
		self.0.hash_value.get_or_init(|| self.blob_field(|row| row.hash_value.0))
	}

	fn blob_field(&self, select: impl Fn(&AssemblyRefRow) -> u32) -> Arc<[u8]> {
		match (&self.0.context, &self.0.row) {
			(Some(ctx), Some(row)) => match ctx.blobs().get_blob(select(row)) {
				Ok(reader) => Arc::from(reader.bytes()),
				Err(_) => Arc::from([]),
			},
			_ => Arc::from([]),
		}
	}

	/// The module that references this assembly.
	pub fn module(&self) -> Option<crate::model::ModuleDefinition> {
		self.0.owner.get_or_init(|| None).and_then(|handle| handle.upgrade())
	}

	/// A resolver-facing snapshot of this reference's identity.
	pub fn descriptor(&self) -> AssemblyDescriptor {
		AssemblyDescriptor {
			name: self.name(),
			version: self.version(),
			culture: self.culture(),
			public_key_token: self.public_key_or_token(),
		}
	}
}

impl HasOwner<ModuleHandle> for AssemblyReference {
	fn owner(&self) -> Option<ModuleHandle> {
		self.0.owner.get_or_init(|| None)
	}

	fn set_owner(&self, owner: Option<ModuleHandle>) {
		self.0.owner.set(owner);
	}
}

impl std::fmt::Debug for AssemblyReference {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AssemblyReference")
			.field("token", &self.token())
			.field("name", &self.name())
			.field("version", &self.version())
			.finish()
	}
}

