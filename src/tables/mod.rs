//! The `#~` tables stream: header, row counts, column widths, and the 45
//! row tables themselves.

pub mod rows;

use std::ops::Range;

use crate::error::{MetadataError, Result};
use crate::io::BinaryReader;
use crate::token::{IndexSizes, TableIndex, TABLE_COUNT};
use rows::*;

macro_rules! define_tables_stream {
	($($field:ident : $row:ty),* $(,)?) => {
		#[derive(Debug, Default)]
		pub struct TablesStream {
			major_version: u8,
			minor_version: u8,
			valid: u64,
			sorted: u64,
			sizes: IndexSizes,
			$($field: Vec<$row>),*
		}

		impl TablesStream {
			#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
			pub fn read(reader: &mut BinaryReader) -> Result<Self> {
				let reserved_0 = reader.read_u32()?;
				let major_version = reader.read_u8()?;
				let minor_version = reader.read_u8()?;
				let heap_sizes = reader.read_u8()?;
				let _reserved_1 = reader.read_u8()?;
				let valid = reader.read_u64()?;
				let sorted = reader.read_u64()?;
				let _ = reserved_0;

				let mut row_counts = [0u32; TABLE_COUNT];
				for table in TableIndex::ALL {
					if valid & (1 << table as u64) != 0 {
						row_counts[table as usize] = reader.read_u32()?;
					}
				}

				let sizes = IndexSizes::new(heap_sizes, row_counts);
				let mut stream = Self {
					major_version, minor_version, valid, sorted, sizes,
					..Default::default()
				};

				$(
					if valid & (1 << <$row as Row>::TABLE as u64) != 0 {
						let len = row_counts[<$row as Row>::TABLE as usize] as usize;
						let mut rows = Vec::with_capacity(len);
						for _ in 0..len {
							rows.push(<$row as Row>::read(reader, &stream.sizes)?);
						}
						stream.$field = rows;
					}
				)*

				Ok(stream)
			}

			pub fn major_version(&self) -> u8 { self.major_version }
			pub fn minor_version(&self) -> u8 { self.minor_version }
			pub fn sizes(&self) -> &IndexSizes { &self.sizes }

			pub fn is_present(&self, table: TableIndex) -> bool {
				self.valid & (1 << table as u64) != 0
			}

			pub fn is_sorted(&self, table: TableIndex) -> bool {
				self.sorted & (1 << table as u64) != 0
			}

			pub fn row_count(&self, table: TableIndex) -> u32 {
				self.sizes.row_count(table)
			}
		}

		$(
			impl GetTable<$row> for TablesStream {
				fn table(&self) -> &[$row] {
					&self.$field
				}
			}
		)*
	};
}

pub trait GetTable<R: Row> {
	/// All rows of `R`'s table, in ascending-rid order, i.e. metadata-table
	/// order.
	fn table(&self) -> &[R];
}

impl TablesStream {
	/// Row `rid` of table `R`, or `None` for `rid == 0` / out of range.
	pub fn row<R: Row>(&self, rid: u32) -> Option<&R>
	where Self: GetTable<R> {
		match rid {
			0 => None,
			rid => GetTable::<R>::table(self).get(rid as usize - 1),
		}
	}

	pub fn row_checked<R: Row>(&self, rid: u32) -> Result<&R>
	where Self: GetTable<R> {
		let table = GetTable::<R>::table(self);
		match rid {
			0 => Err(MetadataError::InvalidRowId { table: R::TABLE, rid, row_count: table.len() as u32 }),
			rid => table.get(rid as usize - 1).ok_or(MetadataError::InvalidRowId {
				table: R::TABLE,
				rid,
				row_count: table.len() as u32,
			}),
		}
	}

	/// Binary search (falling back to a linear scan on unsorted tables) for
	/// the contiguous `[lo, hi)` rid range whose key equals `key`. Ties
	/// resolve to the lowest rid.
	pub fn find_range<R: Row, K: Ord + Copy>(&self, key_of: impl Fn(&R) -> K, key: K) -> Range<u32>
	where Self: GetTable<R> {
		let rows = GetTable::<R>::table(self);
		if self.is_sorted(R::TABLE) {
			let lo = rows.partition_point(|r| key_of(r) < key);
			let hi = rows.partition_point(|r| key_of(r) <= key);
			(lo as u32 + 1)..(hi as u32 + 1)
		} else {
			let mut lo = None;
			let mut hi = 0u32;
			for (i, row) in rows.iter().enumerate() {
				if key_of(row) == key {
					lo.get_or_insert(i as u32 + 1);
					hi = i as u32 + 2;
				}
			}
			lo.unwrap_or(1)..hi.max(1)
		}
	}

	/// Resolves the parent-pointer "list start" pattern shared by
	/// `TypeDef.FieldList`/`MethodList`, `EventMap.EventList` and
	/// `PropertyMap.PropertyList`: row `i`'s children are
	/// `[starts[i], starts[i+1])`, with the last row's range implicitly
	/// extending to `child_row_count + 1`.
	pub fn child_range(starts: &[u32], index: usize, child_row_count: u32) -> Range<u32> {
		let start = starts[index];
		let end = starts.get(index + 1).copied().unwrap_or(child_row_count + 1);
		start..end
	}

	/// Binary search for the largest parent index whose list-start is
	/// `<= child_rid`.
	pub fn parent_of(starts: &[u32], child_rid: u32) -> usize {
		match starts.partition_point(|s| *s <= child_rid) {
			0 => 0,
			n => n - 1,
		}
	}
}

define_tables_stream! {
	module: Module,
	type_ref: TypeRef,
	type_def: TypeDef,
	field_ptr: FieldPtr,
	field: Field,
	method_ptr: MethodPtr,
	method_def: MethodDef,
	param_ptr: ParamPtr,
	param: Param,
	interface_impl: InterfaceImpl,
	member_ref: MemberRef,
	constant: Constant,
	custom_attribute: CustomAttribute,
	field_marshal: FieldMarshal,
	decl_security: DeclSecurity,
	class_layout: ClassLayout,
	field_layout: FieldLayout,
	stand_alone_sig: StandAloneSig,
	event_map: EventMap,
	event_ptr: EventPtr,
	event: Event,
	property_map: PropertyMap,
	property_ptr: PropertyPtr,
	property: Property,
	method_semantics: MethodSemantics,
	method_impl: MethodImpl,
	module_ref: ModuleRef,
	type_spec: TypeSpec,
	impl_map: ImplMap,
	field_rva: FieldRVA,
	enc_log: EncLog,
	enc_map: EncMap,
	assembly: Assembly,
	assembly_processor: AssemblyProcessor,
	assembly_os: AssemblyOS,
	assembly_ref: AssemblyRef,
	assembly_ref_processor: AssemblyRefProcessor,
	assembly_ref_os: AssemblyRefOS,
	file: File,
	exported_type: ExportedType,
	manifest_resource: ManifestResource,
	nested_class: NestedClass,
	generic_param: GenericParam,
	method_spec: MethodSpec,
	generic_param_constraint: GenericParamConstraint,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::token::RowIndex;

	#[test]
	fn child_range_spans_to_the_next_starts_entry() {
		let starts = [1, 3, 3, 6];
		assert_eq!(TablesStream::child_range(&starts, 0, 10), 1..3);
		assert_eq!(TablesStream::child_range(&starts, 1, 10), 3..3);
		assert_eq!(TablesStream::child_range(&starts, 3, 10), 6..11);
	}

	#[test]
	fn parent_of_finds_the_largest_start_at_or_below_the_child() {
		let starts = [1, 3, 3, 6];
		assert_eq!(TablesStream::parent_of(&starts, 1), 0);
		assert_eq!(TablesStream::parent_of(&starts, 2), 0);
		assert_eq!(TablesStream::parent_of(&starts, 3), 2);
		assert_eq!(TablesStream::parent_of(&starts, 5), 2);
		assert_eq!(TablesStream::parent_of(&starts, 6), 3);
	}

	#[test]
	fn find_range_on_a_sorted_table_binary_searches_to_a_contiguous_range() {
		let mut stream = TablesStream::default();
		stream.sorted = 1 << (TableIndex::NestedClass as u64);
		stream.nested_class = vec![
			NestedClass { nested_class: RowIndex::new(2), enclosing_class: RowIndex::new(1) },
			NestedClass { nested_class: RowIndex::new(2), enclosing_class: RowIndex::new(1) },
			NestedClass { nested_class: RowIndex::new(5), enclosing_class: RowIndex::new(1) },
		];
		assert_eq!(stream.find_range::<NestedClass, _>(|r| r.nested_class.0, 2), 1..3);
		assert_eq!(stream.find_range::<NestedClass, _>(|r| r.nested_class.0, 3), 3..3);
		assert_eq!(stream.find_range::<NestedClass, _>(|r| r.nested_class.0, 5), 3..4);
	}

	#[test]
	fn find_range_on_an_unsorted_table_falls_back_to_a_linear_scan() {
		let mut stream = TablesStream::default();
		stream.nested_class = vec![
			NestedClass { nested_class: RowIndex::new(5), enclosing_class: RowIndex::new(1) },
			NestedClass { nested_class: RowIndex::new(2), enclosing_class: RowIndex::new(1) },
			NestedClass { nested_class: RowIndex::new(5), enclosing_class: RowIndex::new(2) },
		];
		assert_eq!(stream.find_range::<NestedClass, _>(|r| r.nested_class.0, 5), 1..4);
		assert_eq!(stream.find_range::<NestedClass, _>(|r| r.nested_class.0, 9), 1..1);
	}
}
