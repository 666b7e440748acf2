use crate::cut_table::CutTable;
use num_traits::{Float, ToPrimitive};
use rayon::prelude::*;
use std::{fmt::Debug, ops::AddAssign};

/// The gradient and hessian of the loss for a single row.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GradientPair {
	pub gradient: f32,
	pub hessian: f32,
}

impl GradientPair {
	pub fn new(gradient: f32, hessian: f32) -> GradientPair {
		GradientPair { gradient, hessian }
	}
}

/// `GradientSum` is implemented by the float types histograms can accumulate in.
pub trait GradientSum: Float + AddAssign + Default + Debug + Send + Sync + 'static {
	fn from_f32(value: f32) -> Self;
}

impl GradientSum for f32 {
	#[inline]
	fn from_f32(value: f32) -> f32 {
		value
	}
}

impl GradientSum for f64 {
	#[inline]
	fn from_f32(value: f32) -> f64 {
		value as f64
	}
}

/// This struct tracks the sum of gradients and hessians for all rows whose value for a particular feature falls in a particular bin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BinStatsEntry<T> {
	pub sum_gradients: T,
	pub sum_hessians: T,
}

/// A `HistogramRow` has one `BinStatsEntry` for each global bin.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramRow<T> {
	entries: Vec<BinStatsEntry<T>>,
}

impl<T> HistogramRow<T>
where
	T: GradientSum,
{
	pub fn zeroed(n_bins: usize) -> HistogramRow<T> {
		HistogramRow {
			entries: vec![BinStatsEntry::default(); n_bins],
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn entries(&self) -> &[BinStatsEntry<T>] {
		&self.entries
	}

	pub fn entries_mut(&mut self) -> &mut [BinStatsEntry<T>] {
		&mut self.entries
	}

	pub fn fill_zero(&mut self) {
		self.entries
			.par_iter_mut()
			.for_each(|entry| *entry = BinStatsEntry::default());
	}

	pub fn copy_from(&mut self, other: &HistogramRow<T>) {
		assert_eq!(
			self.len(),
			other.len(),
			"cannot copy a histogram with {} bins into one with {} bins",
			other.len(),
			self.len(),
		);
		self.entries.copy_from_slice(&other.entries);
	}

	/// Get the entries for the bins of `feature`.
	pub fn feature(&self, cut_table: &CutTable, feature: usize) -> &[BinStatsEntry<T>] {
		&self.entries[cut_table.feature_bins(feature)]
	}

	/// Get the sums of each bin widened to `f64`.
	pub fn sums(&self) -> Vec<(f64, f64)> {
		self.entries
			.iter()
			.map(|entry| {
				(
					entry.sum_gradients.to_f64().unwrap(),
					entry.sum_hessians.to_f64().unwrap(),
				)
			})
			.collect()
	}
}

/// Compute the histogram of `row` as the difference between its `parent` and its `sibling`. All three rows must have the same length.
pub fn subtraction_trick<T>(
	row: &mut HistogramRow<T>,
	sibling: &HistogramRow<T>,
	parent: &HistogramRow<T>,
) where
	T: GradientSum,
{
	assert_eq!(
		row.len(),
		sibling.len(),
		"the sibling histogram has {} bins but the destination has {}",
		sibling.len(),
		row.len(),
	);
	assert_eq!(
		row.len(),
		parent.len(),
		"the parent histogram has {} bins but the destination has {}",
		parent.len(),
		row.len(),
	);
	pzip!(&mut row.entries, &sibling.entries, &parent.entries).for_each(
		|(entry, sibling, parent)| {
			entry.sum_gradients = parent.sum_gradients - sibling.sum_gradients;
			entry.sum_hessians = parent.sum_hessians - sibling.sum_hessians;
		},
	);
}

#[cfg(test)]
fn histogram_from_sums<T: GradientSum>(sums: &[(f32, f32)]) -> HistogramRow<T> {
	let mut row = HistogramRow::zeroed(sums.len());
	for (entry, (gradient, hessian)) in row.entries_mut().iter_mut().zip(sums) {
		entry.sum_gradients = T::from_f32(*gradient);
		entry.sum_hessians = T::from_f32(*hessian);
	}
	row
}

#[test]
fn test_subtraction_trick() {
	let parent = histogram_from_sums::<f64>(&[(10.0, 4.0), (3.0, 2.0), (-1.0, 1.0)]);
	let sibling = histogram_from_sums::<f64>(&[(4.0, 1.0), (3.0, 2.0), (0.5, 0.5)]);
	let mut row = HistogramRow::zeroed(3);
	subtraction_trick(&mut row, &sibling, &parent);
	assert_eq!(row.sums(), vec![(6.0, 3.0), (0.0, 0.0), (-1.5, 0.5)]);
}

#[test]
#[should_panic(expected = "the parent histogram has 2 bins but the destination has 3")]
fn test_subtraction_trick_length_mismatch() {
	let parent = HistogramRow::<f32>::zeroed(2);
	let sibling = HistogramRow::<f32>::zeroed(3);
	let mut row = HistogramRow::<f32>::zeroed(3);
	subtraction_trick(&mut row, &sibling, &parent);
}

#[test]
fn test_fill_zero_and_copy_from() {
	let source = histogram_from_sums::<f32>(&[(1.0, 2.0), (3.0, 4.0)]);
	let mut row = HistogramRow::zeroed(2);
	row.copy_from(&source);
	assert_eq!(row, source);
	row.fill_zero();
	assert_eq!(row, HistogramRow::zeroed(2));
}

#[test]
fn test_feature_entries() {
	let cut_table = CutTable::from_thresholds(&[vec![1.0], vec![1.0, 2.0]], vec![0.0, 0.0]).unwrap();
	let row = histogram_from_sums::<f32>(&[(1.0, 1.0), (2.0, 1.0), (3.0, 1.0), (4.0, 1.0), (5.0, 1.0)]);
	let feature = row.feature(&cut_table, 1);
	assert_eq!(feature.len(), 3);
	assert_eq!(feature[0].sum_gradients, 3.0);
}
