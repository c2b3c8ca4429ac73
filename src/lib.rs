//! `ilmeta` reads the CLI metadata of a .NET assembly — the PE image's
//! `.NET directory`, its named heaps, the `#~` tables stream — and exposes
//! it as a lazily-materialized object graph: [`model::AssemblyDefinition`],
//! [`model::ModuleDefinition`], [`model::TypeDefinition`],
//! [`model::MethodDefinition`], [`model::GenericParameter`] and
//! [`model::AssemblyReference`].
//!
//! ```no_run
//! use ilmeta::model::AssemblyDefinition;
//!
//! let assembly = AssemblyDefinition::from_file("HelloWorld.dll")?;
//! println!("{} v{:?}", assembly.name(), assembly.version());
//! for module in assembly.modules().read().unwrap().iter() {
//!     for ty in module.top_level_types().read().unwrap().iter() {
//!         println!("  {}", ty.full_name());
//!     }
//! }
//! # Ok::<(), ilmeta::error::MetadataError>(())
//! ```
//!
//! The tables stream, heaps and signature grammar follow ECMA-335; see
//! `DESIGN.md` in the repository root for the rationale behind this
//! crate's few intentional departures from the literal CLR object model.

pub mod error;
pub mod heaps;
pub mod io;
pub mod lazy;
mod loader;
pub mod model;
pub mod pe;
pub mod resolver;
pub mod signature;
pub mod tables;
pub mod token;

pub use error::{MetadataError, Result};
