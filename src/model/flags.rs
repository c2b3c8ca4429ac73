//! Attribute bitflags for the member types in [`crate::model`], mirrored
//! from ECMA-335 §II.23.1. These live on the typed model layer rather than
//! the row layer, since `tables::rows` keeps flags as plain integers.

use bitflags::bitflags;

bitflags! {
	/// ECMA-335 §II.23.1.15.
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct TypeAttributes: u32 {
		const VISIBILITY_MASK = 0x0000_0007;
		const NOT_PUBLIC = 0x0000_0000;
		const PUBLIC = 0x0000_0001;
		const NESTED_PUBLIC = 0x0000_0002;
		const NESTED_PRIVATE = 0x0000_0003;
		const NESTED_FAMILY = 0x0000_0004;
		const NESTED_ASSEMBLY = 0x0000_0005;
		const NESTED_FAMILY_AND_ASSEMBLY = 0x0000_0006;
		const NESTED_FAMILY_OR_ASSEMBLY = 0x0000_0007;

		const LAYOUT_MASK = 0x0000_0018;
		const AUTO_LAYOUT = 0x0000_0000;
		const SEQUENTIAL_LAYOUT = 0x0000_0008;
		const EXPLICIT_LAYOUT = 0x0000_0010;

		const CLASS_SEMANTICS_MASK = 0x0000_0020;
		const CLASS = 0x0000_0000;
		const INTERFACE = 0x0000_0020;

		const ABSTRACT = 0x0000_0080;
		const SEALED = 0x0000_0100;
		const SPECIAL_NAME = 0x0000_0400;

		const IMPORT = 0x0000_1000;
		const SERIALIZABLE = 0x0000_2000;

		const STRING_FORMAT_MASK = 0x0003_0000;
		const ANSI_CLASS = 0x0000_0000;
		const UNICODE_CLASS = 0x0001_0000;
		const AUTO_CLASS = 0x0002_0000;
		const CUSTOM_FORMAT_CLASS = 0x0003_0000;
		const CUSTOM_STRING_FORMAT_MASK = 0x00C0_0000;

		const BEFORE_FIELD_INIT = 0x0010_0000;

		/// CLI provides "special" behavior depending on the name of the
		/// type. Kept distinct from [`Self::FORWARDER`] — see DESIGN.md
		/// for the Open Question this resolves.
		const RT_SPECIAL_NAME = 0x0000_0800;
		const HAS_SECURITY = 0x0004_0000;
		/// This type is a type forwarder (exported via `ExportedType`, not
		/// actually defined in this module).
		const FORWARDER = 0x0020_0000;
	}
}

impl TypeAttributes {
	pub fn visibility(&self) -> TypeAttributes {
		*self & Self::VISIBILITY_MASK
	}

	pub fn is_not_public(&self) -> bool {
		self.visibility() == Self::NOT_PUBLIC
	}

	/// Clears the visibility mask and sets [`Self::NOT_PUBLIC`] when `true`;
	/// otherwise the mask is left untouched (asymmetric with the other
	/// visibility setters — see DESIGN.md Open Question).
	pub fn set_not_public(&mut self, value: bool) {
		if value {
			self.remove(Self::VISIBILITY_MASK);
		}
	}

	pub fn is_public(&self) -> bool {
		self.visibility() == Self::PUBLIC
	}

	pub fn set_public(&mut self, value: bool) {
		self.remove(Self::VISIBILITY_MASK);
		if value {
			self.insert(Self::PUBLIC);
		}
	}

	pub fn is_class(&self) -> bool {
		(*self & Self::CLASS_SEMANTICS_MASK) == Self::CLASS
	}

	pub fn set_class(&mut self, value: bool) {
		if value {
			self.remove(Self::CLASS_SEMANTICS_MASK);
		}
	}

	pub fn is_interface(&self) -> bool {
		(*self & Self::CLASS_SEMANTICS_MASK) == Self::INTERFACE
	}

	pub fn set_interface(&mut self, value: bool) {
		self.remove(Self::CLASS_SEMANTICS_MASK);
		if value {
			self.insert(Self::INTERFACE);
		}
	}

	pub fn is_auto_layout(&self) -> bool {
		(*self & Self::LAYOUT_MASK) == Self::AUTO_LAYOUT
	}

	pub fn set_auto_layout(&mut self, value: bool) {
		if value {
			self.remove(Self::LAYOUT_MASK);
		}
	}

	pub fn is_ansi_class(&self) -> bool {
		(*self & Self::STRING_FORMAT_MASK) == Self::ANSI_CLASS
	}

	pub fn set_ansi_class(&mut self, value: bool) {
		if value {
			self.remove(Self::STRING_FORMAT_MASK);
		}
	}

	/// `RTSpecialName` (0x0800), split from [`Self::FORWARDER`] per the
	/// Open Question resolution recorded in DESIGN.md.
	pub fn is_runtime_special_name(&self) -> bool {
		self.contains(Self::RT_SPECIAL_NAME)
	}

	/// `Forwarder` (0x00200000), split from [`Self::RT_SPECIAL_NAME`].
	pub fn is_forwarder(&self) -> bool {
		self.contains(Self::FORWARDER)
	}
}

bitflags! {
	/// ECMA-335 §II.23.1.10.
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct MethodAttributes: u16 {
		const MEMBER_ACCESS_MASK = 0x0007;
		const COMPILER_CONTROLLED = 0x0000;
		const PRIVATE = 0x0001;
		const FAM_AND_ASSEM = 0x0002;
		const ASSEM = 0x0003;
		const FAMILY = 0x0004;
		const FAM_OR_ASSEM = 0x0005;
		const PUBLIC = 0x0006;

		const STATIC = 0x0010;
		const FINAL = 0x0020;
		const VIRTUAL = 0x0040;
		const HIDE_BY_SIG = 0x0080;

		const VTABLE_LAYOUT_MASK = 0x0100;
		const REUSE_SLOT = 0x0000;
		const NEW_SLOT = 0x0100;

		const STRICT = 0x0200;
		const ABSTRACT = 0x0400;
		const SPECIAL_NAME = 0x0800;

		const PINVOKE_IMPL = 0x2000;
		const UNMANAGED_EXPORT = 0x0008;

		const RT_SPECIAL_NAME = 0x1000;
		const HAS_SECURITY = 0x4000;
		const REQUIRE_SEC_OBJECT = 0x8000;
	}
}

bitflags! {
	/// ECMA-335 §II.23.1.10 (`MethodImplAttributes`).
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct MethodImplAttributes: u16 {
		const CODE_TYPE_MASK = 0x0003;
		const IL = 0x0000;
		const NATIVE = 0x0001;
		const OPTIL = 0x0002;
		const RUNTIME = 0x0003;

		const MANAGED_MASK = 0x0004;
		const UNMANAGED = 0x0004;
		const MANAGED = 0x0000;

		const FORWARD_REF = 0x0010;
		const PRESERVE_SIG = 0x0080;
		const INTERNAL_CALL = 0x1000;
		const SYNCHRONIZED = 0x0020;
		const NO_INLINING = 0x0008;
		const MAX_METHOD_IMPL_VAL = 0xFFFF;
		const NO_OPTIMIZATION = 0x0040;
	}
}

bitflags! {
	/// ECMA-335 §II.23.1.7.
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct GenericParamAttributes: u16 {
		const VARIANCE_MASK = 0x0003;
		const NONE = 0x0000;
		const COVARIANT = 0x0001;
		const CONTRAVARIANT = 0x0002;

		const SPECIAL_CONSTRAINT_MASK = 0x001C;
		const REFERENCE_TYPE_CONSTRAINT = 0x0004;
		const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
		const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AssemblyHashAlgorithm {
	None,
	Md5,
	Sha1,
	Sha256,
	Sha384,
	Sha512,
	Unknown(u32),
}

impl AssemblyHashAlgorithm {
	pub fn from_raw(value: u32) -> Self {
		match value {
			0x0000 => Self::None,
			0x8003 => Self::Md5,
			0x8004 => Self::Sha1,
			0x800C => Self::Sha256,
			0x800D => Self::Sha384,
			0x800E => Self::Sha512,
			other => Self::Unknown(other),
		}
	}
}

bitflags! {
	/// ECMA-335 §II.23.1.2, shared by `Assembly` and `AssemblyRef`.
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct AssemblyFlags: u32 {
		/// The public key blob holds the full public key, not just its token.
		const PUBLIC_KEY = 0x0001;
		const RETARGETABLE = 0x0100;
		const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
		const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
	}
}
