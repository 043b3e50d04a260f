#[allow(unused_imports)]
use crate::*;

use std::hash::{ Hash, Hasher, DefaultHasher, BuildHasher };



/// A `Category` is a pre-hashed trace-category name, so the hot-path registry
/// lookup hashes the string once instead of on every lookup. Category names
/// are caller-supplied short identifiers with no embedded whitespace; dotted
/// namespacing ("module.subsystem") keeps crates from colliding.

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Category
{
	value : u64,
}

impl Category
{
	pub fn compute_hash(text : &str) -> u64
	{
		let mut hasher = DefaultHasher::new();
		text.hash(&mut hasher);

		hasher.finish()
	}

	pub fn new(text : &str) -> Self
	{
		Self
		{
			value : Self::compute_hash(text),
		}
	}

	pub fn raw_value(&self) -> u64
	{
		self.value
	}
}

impl Hash for Category
{
	fn hash<H : Hasher>(&self, hasher : &mut H)
	{
		self.value.hash(hasher)
	}
}

impl std::fmt::Debug for Category
{
	fn fmt(&self, formatter : &mut std::fmt::Formatter<'_>) -> std::fmt::Result
	{
		write!(formatter, "cat:{:0x}", self.raw_value())
	}
}



pub type CategoryMap<Value> =
	std::collections::HashMap<Category, Value, category_internal::BuildCategoryHasher>;

pub trait ExtCategoryMap
{
	fn new() -> Self;
	fn with_capacity(capacity : usize) -> Self;
}

impl<Value> ExtCategoryMap for CategoryMap<Value>
{
	fn new() -> Self
	{
		Self::with_hasher(category_internal::BuildCategoryHasher::new())
	}

	fn with_capacity(capacity : usize) -> Self
	{
		Self::with_capacity_and_hasher(capacity, category_internal::BuildCategoryHasher::new())
	}
}



mod category_internal
{
	use super::*;

	/// `Category` keys are pre-hashed. `CategoryHasher` is thus a special
	/// `Hasher` type that just passes through that hashed value. It's not
	/// generally safe to use with any other type.

	#[derive(Default)]
	pub struct CategoryHasher
	{
		value : u64,
	}

	impl CategoryHasher
	{
		pub fn new() -> Self
		{
			Self
			{
				value : 0,
			}
		}
	}

	impl Hasher for CategoryHasher
	{
		fn finish(&self) -> u64
		{
			self.value
		}

		fn write(&mut self, _bytes : &[u8])
		{
			unreachable!("Category hashes via write_u64");
		}

		fn write_u64(&mut self, value : u64)
		{
			debug_assert_eq!(self.value, 0);

			self.value = value;
		}
	}

	#[derive(Default)]
	pub struct BuildCategoryHasher {}

	impl BuildCategoryHasher
	{
		pub fn new() -> Self
		{
			Self {}
		}
	}

	impl BuildHasher for BuildCategoryHasher
	{
		type Hasher = CategoryHasher;

		fn build_hasher(&self) -> Self::Hasher
		{
			CategoryHasher::new()
		}
	}
}



// Tests

#[test]
fn test_category_equality()
{
	let first = Category::new("vigil.cache");
	let second = Category::new("vigil.cache");
	let other = Category::new("vigil.net");

	assert_eq!(first, second);
	assert_eq!(first.raw_value(), second.raw_value());
	assert_ne!(first, other);
}

#[test]
fn test_category_map()
{
	let category_names = ["foo", "bar", "baz"];
	let mut category_map = CategoryMap::with_capacity(1);

	for &category_name in category_names.iter()
	{
		category_map.insert(Category::new(category_name), String::from(category_name));
	}

	for &category_name in category_names.iter()
	{
		let category = Category::new(category_name);

		assert_eq!(category_map.get(&category), Some(&String::from(category_name)));
	}

	assert!(!category_map.contains_key(&Category::new("quux")));
}

#[test]
fn test_category_hasher_passthrough()
{
	let category = Category::new("vigil.cache");

	let mut hasher = category_internal::BuildCategoryHasher::new().build_hasher();
	category.hash(&mut hasher);

	assert_eq!(hasher.finish(), category.raw_value());
}
