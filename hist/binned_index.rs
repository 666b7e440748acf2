use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// This is the width of each value stored in a `BinnedIndex`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinWidth {
	U8,
	U16,
	U32,
}

impl BinWidth {
	pub fn n_bytes(self) -> usize {
		match self {
			BinWidth::U8 => 1,
			BinWidth::U16 => 2,
			BinWidth::U32 => 4,
		}
	}

	/// Choose the narrowest width that can hold every value in `0..=max_value`.
	pub fn for_max_value(max_value: usize) -> BinWidth {
		if max_value <= u8::MAX.to_usize().unwrap() {
			BinWidth::U8
		} else if max_value <= u16::MAX.to_usize().unwrap() {
			BinWidth::U16
		} else {
			BinWidth::U32
		}
	}
}

/// `BinValue` is implemented by the integer types a `BinnedIndex` can store.
pub trait BinValue: Copy + Default + Ord + Send + Sync + std::fmt::Debug + 'static {
	const WIDTH: BinWidth;
	/// Narrow a bin value. The caller guarantees `value` fits in `Self`.
	fn from_bin(value: u32) -> Self;
	fn to_bin(self) -> u32;
	fn to_index(self) -> usize;
}

impl BinValue for u8 {
	const WIDTH: BinWidth = BinWidth::U8;
	#[inline]
	fn from_bin(value: u32) -> u8 {
		debug_assert!(value <= u8::MAX as u32);
		value as u8
	}
	#[inline]
	fn to_bin(self) -> u32 {
		self as u32
	}
	#[inline]
	fn to_index(self) -> usize {
		self as usize
	}
}

impl BinValue for u16 {
	const WIDTH: BinWidth = BinWidth::U16;
	#[inline]
	fn from_bin(value: u32) -> u16 {
		debug_assert!(value <= u16::MAX as u32);
		value as u16
	}
	#[inline]
	fn to_bin(self) -> u32 {
		self as u32
	}
	#[inline]
	fn to_index(self) -> usize {
		self as usize
	}
}

impl BinValue for u32 {
	const WIDTH: BinWidth = BinWidth::U32;
	#[inline]
	fn from_bin(value: u32) -> u32 {
		value
	}
	#[inline]
	fn to_bin(self) -> u32 {
		self
	}
	#[inline]
	fn to_index(self) -> usize {
		self as usize
	}
}

/// The values of a `BinnedIndex`, stored at one of three widths.
#[derive(Clone, Debug, PartialEq)]
pub enum BinnedIndexData {
	U8(Vec<u8>),
	U16(Vec<u16>),
	U32(Vec<u32>),
}

impl BinnedIndexData {
	fn zeroed(width: BinWidth, len: usize) -> BinnedIndexData {
		match width {
			BinWidth::U8 => BinnedIndexData::U8(vec![0; len]),
			BinWidth::U16 => BinnedIndexData::U16(vec![0; len]),
			BinWidth::U32 => BinnedIndexData::U32(vec![0; len]),
		}
	}

	pub fn len(&self) -> usize {
		match self {
			BinnedIndexData::U8(values) => values.len(),
			BinnedIndexData::U16(values) => values.len(),
			BinnedIndexData::U32(values) => values.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn width(&self) -> BinWidth {
		match self {
			BinnedIndexData::U8(_) => BinWidth::U8,
			BinnedIndexData::U16(_) => BinWidth::U16,
			BinnedIndexData::U32(_) => BinWidth::U32,
		}
	}

	fn get(&self, index: usize) -> u32 {
		match self {
			BinnedIndexData::U8(values) => values[index].to_bin(),
			BinnedIndexData::U16(values) => values[index].to_bin(),
			BinnedIndexData::U32(values) => values[index],
		}
	}
}

/**
A `BinnedIndex` stores one bin value per entry of a binned matrix.

In the dense form, `offsets` holds the first global bin of each feature and the stored values are feature-local, so the value at position `i` plus `offsets[i % n_features]` is the global bin. Because the stored values only need to cover the bins of a single feature, they can usually be stored with a narrower width than the total number of bins would require.

In the sparse form, there are no offsets and the stored values are global bins. A stored value equal to the total number of bins marks padding.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct BinnedIndex {
	data: BinnedIndexData,
	offsets: Option<Vec<u32>>,
}

impl BinnedIndex {
	pub fn zeroed(width: BinWidth, len: usize, offsets: Option<Vec<u32>>) -> BinnedIndex {
		BinnedIndex {
			data: BinnedIndexData::zeroed(width, len),
			offsets,
		}
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn width(&self) -> BinWidth {
		self.data.width()
	}

	/// This is the number of bytes used to store the values, not including the offsets.
	pub fn byte_size(&self) -> usize {
		self.len() * self.width().n_bytes()
	}

	pub fn offsets(&self) -> Option<&[u32]> {
		self.offsets.as_deref()
	}

	pub fn data(&self) -> &BinnedIndexData {
		&self.data
	}

	pub(crate) fn data_mut(&mut self) -> &mut BinnedIndexData {
		&mut self.data
	}

	/// Get the value stored at `index` without adding the feature offset.
	pub fn raw(&self, index: usize) -> u32 {
		self.data.get(index)
	}

	/// Get the global bin at `index`. In the sparse form this may be the padding value.
	pub fn get(&self, index: usize) -> u32 {
		match &self.offsets {
			Some(offsets) => self.data.get(index) + offsets[index % offsets.len()],
			None => self.data.get(index),
		}
	}
}

#[test]
fn test_bin_width_for_max_value() {
	assert_eq!(BinWidth::for_max_value(0), BinWidth::U8);
	assert_eq!(BinWidth::for_max_value(255), BinWidth::U8);
	assert_eq!(BinWidth::for_max_value(256), BinWidth::U16);
	assert_eq!(BinWidth::for_max_value(65535), BinWidth::U16);
	assert_eq!(BinWidth::for_max_value(65536), BinWidth::U32);
	assert_eq!(<u16 as BinValue>::WIDTH, BinWidth::U16);
}

#[test]
fn test_byte_size() {
	let index = BinnedIndex::zeroed(BinWidth::U16, 6, Some(vec![0, 10, 20]));
	assert_eq!(index.len(), 6);
	assert_eq!(index.byte_size(), 12);
	assert_eq!(index.width(), BinWidth::U16);
}

#[test]
fn test_get_adds_offsets() {
	let mut index = BinnedIndex::zeroed(BinWidth::U8, 4, Some(vec![0, 300]));
	if let BinnedIndexData::U8(values) = index.data_mut() {
		values.copy_from_slice(&[1, 2, 3, 4]);
	}
	assert_eq!(index.raw(1), 2);
	assert_eq!(index.get(0), 1);
	assert_eq!(index.get(1), 302);
	assert_eq!(index.get(2), 3);
	assert_eq!(index.get(3), 304);
	let index = BinnedIndex::zeroed(BinWidth::U32, 2, None);
	assert_eq!(index.offsets(), None);
	assert_eq!(index.get(1), 0);
}
