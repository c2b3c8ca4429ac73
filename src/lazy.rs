//! The lazy-initialization primitives the member graph is built from: a
//! single-init cell that may race benignly but only ever
//! publishes one result, and an owned collection that keeps every element's
//! back-pointer to its owner in sync with membership.

use std::fmt::{Debug, Formatter};
use std::sync::RwLock;

/// A lazily-computed slot. `get_or_init` may invoke `init` more than once
/// under concurrent first-touch, but only one of the results is ever
/// observed by any reader; `set` unconditionally overwrites whatever is
/// there, bypassing initialization entirely (the "set by user" case).
///
/// Built on `RwLock` rather than `OnceLock`: `OnceLock` cannot be reset once
/// written, and `set` must be able to replace an already initialized value.
pub struct Lazy<T> {
	value: RwLock<Option<T>>,
}

impl<T> Lazy<T> {
	pub const fn unset() -> Self {
		Self { value: RwLock::new(None) }
	}

	pub fn set_value(value: T) -> Self {
		Self { value: RwLock::new(Some(value)) }
	}

	/// Unconditionally publishes `value`, discarding any prior value.
	pub fn set(&self, value: T) {
		*self.value.write().unwrap() = Some(value);
	}

	pub fn is_set(&self) -> bool {
		self.value.read().unwrap().is_some()
	}
}

impl<T: Clone> Lazy<T> {
	/// Returns the published value, computing and publishing it via `init`
	/// on first access. `init` may run more than once in a race; exactly one
	/// result is retained.
	pub fn get_or_init(&self, init: impl FnOnce() -> T) -> T {
		if let Some(value) = self.value.read().unwrap().as_ref() {
			return value.clone();
		}
		let computed = init();
		let mut guard = self.value.write().unwrap();
		if guard.is_none() {
			*guard = Some(computed.clone());
		}
		guard.as_ref().unwrap().clone()
	}

	/// Returns the published value, computing and publishing it via the
	/// fallible `init` on first access. The cell stays unset if `init` fails,
	/// so a later call can retry.
	pub fn try_get_or_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
		if let Some(value) = self.value.read().unwrap().as_ref() {
			return Ok(value.clone());
		}
		let computed = init()?;
		let mut guard = self.value.write().unwrap();
		if guard.is_none() {
			*guard = Some(computed.clone());
		}
		Ok(guard.as_ref().unwrap().clone())
	}
}

impl<T> Default for Lazy<T> {
	fn default() -> Self {
		Self::unset()
	}
}

impl<T: Debug> Debug for Lazy<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self.value.read().unwrap().as_ref() {
			Some(value) => Debug::fmt(value, f),
			None => f.write_str("Lazy(unset)"),
		}
	}
}

/// An element that can belong to at most one [`OwnedCollection`] at a time,
/// tracking its current owner (or none) internally.
pub trait HasOwner<Owner> {
	fn owner(&self) -> Option<Owner>;
	fn set_owner(&self, owner: Option<Owner>);
}

/// An ordered sequence whose elements each carry a back-pointer to their
/// owner, kept consistent on every mutation: an element's
/// `owner()` equals the collection's own owner for exactly as long as it
/// remains a member.
pub struct OwnedCollection<Owner, Element> {
	owner: Owner,
	elements: Vec<Element>,
}

impl<Owner, Element> OwnedCollection<Owner, Element>
where
	Owner: Clone,
	Element: HasOwner<Owner> + Clone,
{
	pub fn new(owner: Owner) -> Self {
		Self { owner, elements: Vec::new() }
	}

	pub fn from_elements(owner: Owner, elements: Vec<Element>) -> Self {
		for element in &elements {
			element.set_owner(Some(owner.clone()));
		}
		Self { owner, elements }
	}

	pub fn owner(&self) -> &Owner {
		&self.owner
	}

	pub fn len(&self) -> usize {
		self.elements.len()
	}

	pub fn is_empty(&self) -> bool {
		self.elements.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, Element> {
		self.elements.iter()
	}

	pub fn get(&self, index: usize) -> Option<&Element> {
		self.elements.get(index)
	}

	/// Appends `element` to the end. `element` must not already belong to a
	/// collection.
	pub fn add(&mut self, element: Element) {
		assert!(element.owner().is_none(), "element already belongs to a collection");
		element.set_owner(Some(self.owner.clone()));
		self.elements.push(element);
	}

	pub fn insert(&mut self, index: usize, element: Element) {
		assert!(element.owner().is_none(), "element already belongs to a collection");
		element.set_owner(Some(self.owner.clone()));
		self.elements.insert(index, element);
	}

	pub fn set(&mut self, index: usize, element: Element) {
		assert!(element.owner().is_none(), "element already belongs to a collection");
		self.elements[index].set_owner(None);
		element.set_owner(Some(self.owner.clone()));
		self.elements[index] = element;
	}

	/// Removes the element at `index`, clearing its owner back-pointer.
	pub fn remove(&mut self, index: usize) -> Element {
		let element = self.elements.remove(index);
		element.set_owner(None);
		element
	}

	pub fn clear(&mut self) {
		for element in self.elements.drain(..) {
			element.set_owner(None);
		}
	}
}

impl<Owner: Debug, Element: Debug> Debug for OwnedCollection<Owner, Element> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OwnedCollection")
			.field("owner", &self.owner)
			.field("elements", &self.elements)
			.finish()
	}
}

impl<'a, Owner, Element> IntoIterator for &'a OwnedCollection<Owner, Element> {
	type Item = &'a Element;
	type IntoIter = std::slice::Iter<'a, Element>;

	fn into_iter(self) -> Self::IntoIter {
		self.elements.iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::Cell;
	use std::rc::Rc;

	#[derive(Clone)]
	struct Leaf(Rc<Cell<Option<u32>>>);

	impl HasOwner<u32> for Leaf {
		fn owner(&self) -> Option<u32> {
			self.0.get()
		}

		fn set_owner(&self, owner: Option<u32>) {
			self.0.set(owner);
		}
	}

	impl Leaf {
		fn new() -> Self {
			Self(Rc::new(Cell::new(None)))
		}
	}

	#[test]
	fn lazy_set_overwrites_an_already_initialized_value() {
		let cell = Lazy::unset();
		assert_eq!(cell.get_or_init(|| 1), 1);
		cell.set(2);
		assert_eq!(cell.get_or_init(|| 99), 2);
	}

	#[test]
	fn lazy_try_get_or_init_leaves_the_cell_unset_on_failure() {
		let cell: Lazy<u32> = Lazy::unset();
		assert!(cell.try_get_or_init(|| Err::<u32, &str>("boom")).is_err());
		assert!(!cell.is_set());
		assert_eq!(cell.try_get_or_init(|| Ok::<u32, &str>(7)).unwrap(), 7);
		assert!(cell.is_set());
	}

	#[test]
	fn from_elements_stamps_every_element_with_the_owner() {
		let leaves = vec![Leaf::new(), Leaf::new()];
		let collection = OwnedCollection::from_elements(42, leaves.clone());
		assert_eq!(collection.len(), 2);
		for leaf in &leaves {
			assert_eq!(leaf.owner(), Some(42));
		}
	}

	#[test]
	fn remove_clears_the_removed_elements_owner_but_not_the_others() {
		let leaves = vec![Leaf::new(), Leaf::new()];
		let mut collection = OwnedCollection::from_elements(1, leaves.clone());
		let removed = collection.remove(0);
		assert_eq!(removed.owner(), None);
		assert_eq!(collection.len(), 1);
		assert_eq!(leaves[1].owner(), Some(1));
	}

	#[test]
	#[should_panic(expected = "already belongs to a collection")]
	fn add_panics_if_the_element_already_has_an_owner() {
		let leaf = Leaf::new();
		let mut first = OwnedCollection::new(1);
		first.add(leaf.clone());
		let mut second = OwnedCollection::new(2);
		second.add(leaf);
	}
}
