use crate::error::{Error, Result};
use itertools::Itertools;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, ops::Range};

/**
A `CutTable` holds the quantile boundaries for every feature. The cut values for all features are concatenated into `cut_values`, and the slice for feature `f` is `cut_values[cut_ptrs[f]..cut_ptrs[f + 1]]`. Each cut value is the inclusive upper bound of one bin, so the global bin ids for feature `f` are the positions of its cut values. For example, given the cut values `[1.0, 2.0, MAX]` for the first feature and `[5.0, MAX]` for the second, the bins are:

0. (-infinity, 1.0]
1. (1.0, 2.0]
2. (2.0, MAX]
3. (-infinity, 5.0]
4. (5.0, MAX]

Values greater than the last cut of a feature still belong to its last bin.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CutTableFields")]
pub struct CutTable {
	cut_values: Vec<f32>,
	cut_ptrs: Vec<u32>,
	min_vals: Vec<f32>,
}

/// Deserialized cut tables are validated through `CutTable::new`.
#[derive(Deserialize)]
struct CutTableFields {
	cut_values: Vec<f32>,
	cut_ptrs: Vec<u32>,
	min_vals: Vec<f32>,
}

impl TryFrom<CutTableFields> for CutTable {
	type Error = Error;
	fn try_from(fields: CutTableFields) -> Result<CutTable> {
		CutTable::new(fields.cut_values, fields.cut_ptrs, fields.min_vals)
	}
}

impl CutTable {
	pub fn new(cut_values: Vec<f32>, cut_ptrs: Vec<u32>, min_vals: Vec<f32>) -> Result<CutTable> {
		let cut_table = CutTable {
			cut_values,
			cut_ptrs,
			min_vals,
		};
		cut_table.validate()?;
		Ok(cut_table)
	}

	/// Create a `CutTable` from the split thresholds of each feature. An upper cut of `f32::MAX` is appended to each feature, so a feature with `k` thresholds gets `k + 1` bins.
	pub fn from_thresholds(thresholds: &[Vec<f32>], min_vals: Vec<f32>) -> Result<CutTable> {
		let n_cut_values = thresholds.iter().map(|t| t.len() + 1).sum();
		let mut cut_values = Vec::with_capacity(n_cut_values);
		let mut cut_ptrs = Vec::with_capacity(thresholds.len() + 1);
		cut_ptrs.push(0);
		for feature_thresholds in thresholds {
			cut_values.extend_from_slice(feature_thresholds);
			cut_values.push(f32::MAX);
			cut_ptrs.push(cut_values.len().to_u32().unwrap());
		}
		CutTable::new(cut_values, cut_ptrs, min_vals)
	}

	fn validate(&self) -> Result<()> {
		let (start, end) = match (self.cut_ptrs.first(), self.cut_ptrs.last()) {
			(Some(start), Some(end)) => (*start, *end),
			_ => return Err(Error::EmptyCutPtrs),
		};
		if start != 0 || end.to_usize().unwrap() != self.cut_values.len() {
			return Err(Error::CutPtrsBounds {
				start,
				end,
				n_cut_values: self.cut_values.len(),
			});
		}
		for (feature, (begin, end)) in self.cut_ptrs.iter().tuple_windows().enumerate() {
			// A decreasing pointer is reported as an empty slice, because the feature has no cut values of its own.
			if end <= begin {
				return Err(Error::EmptyCutSlice { feature });
			}
			if end.to_usize().unwrap() > self.cut_values.len() {
				return Err(Error::CutPtrsBounds {
					start,
					end: *end,
					n_cut_values: self.cut_values.len(),
				});
			}
			let values = &self.cut_values[begin.to_usize().unwrap()..end.to_usize().unwrap()];
			if !values.iter().tuple_windows().all(|(a, b)| a <= b) {
				return Err(Error::UnsortedCutValues { feature });
			}
		}
		if self.min_vals.len() != self.n_features() {
			return Err(Error::MinValsLength {
				expected: self.n_features(),
				actual: self.min_vals.len(),
			});
		}
		Ok(())
	}

	pub fn n_features(&self) -> usize {
		self.cut_ptrs.len() - 1
	}

	/// This is the number of bins across all features.
	pub fn n_bins(&self) -> usize {
		self.cut_values.len()
	}

	pub fn cut_values(&self) -> &[f32] {
		&self.cut_values
	}

	pub fn cut_ptrs(&self) -> &[u32] {
		&self.cut_ptrs
	}

	pub fn min_vals(&self) -> &[f32] {
		&self.min_vals
	}

	/// Get the range of global bin ids that belong to `feature`.
	pub fn feature_bins(&self, feature: usize) -> Range<usize> {
		self.cut_ptrs[feature].to_usize().unwrap()..self.cut_ptrs[feature + 1].to_usize().unwrap()
	}

	pub fn feature_cut_values(&self, feature: usize) -> &[f32] {
		&self.cut_values[self.feature_bins(feature)]
	}

	pub fn n_bins_for_feature(&self, feature: usize) -> usize {
		self.feature_bins(feature).len()
	}

	pub fn max_bins_per_feature(&self) -> usize {
		(0..self.n_features())
			.map(|feature| self.n_bins_for_feature(feature))
			.max()
			.unwrap_or(0)
	}

	/// Find the global bin for `value` of `feature`. This is the first cut value greater than or equal to `value`, or the last bin of the feature if `value` exceeds every cut.
	pub fn search_bin(&self, feature: usize, value: f32) -> u32 {
		let begin = self.cut_ptrs[feature];
		let values = self.feature_cut_values(feature);
		let position = values
			.partition_point(|cut| *cut < value)
			.min(values.len() - 1);
		begin + position.to_u32().unwrap()
	}

	/// Get the lower and upper bounds of the values that fall into `bin`. The lower bound of a feature's first bin is that feature's minimum value.
	pub fn bin_bounds(&self, bin: usize) -> (f32, f32) {
		let feature = self.feature_for_bin(bin);
		let lower = if bin == self.feature_bins(feature).start {
			self.min_vals[feature]
		} else {
			self.cut_values[bin - 1]
		};
		(lower, self.cut_values[bin])
	}

	/// Get the feature whose bin range contains `bin`.
	pub fn feature_for_bin(&self, bin: usize) -> usize {
		let bin = bin.to_u32().unwrap();
		self.cut_ptrs[1..].partition_point(|end| *end <= bin)
	}
}

#[cfg(test)]
fn example_cut_table() -> CutTable {
	CutTable::from_thresholds(&[vec![1.0, 2.0], vec![5.0]], vec![0.0, 3.0]).unwrap()
}

#[test]
fn test_from_thresholds() {
	let cut_table = example_cut_table();
	assert_eq!(cut_table.n_features(), 2);
	assert_eq!(cut_table.n_bins(), 5);
	assert_eq!(cut_table.cut_ptrs(), &[0, 3, 5]);
	assert_eq!(cut_table.cut_values(), &[1.0, 2.0, f32::MAX, 5.0, f32::MAX]);
	assert_eq!(cut_table.feature_bins(1), 3..5);
	assert_eq!(cut_table.max_bins_per_feature(), 3);
}

#[test]
fn test_search_bin() {
	let cut_table = example_cut_table();
	assert_eq!(cut_table.search_bin(0, -10.0), 0);
	assert_eq!(cut_table.search_bin(0, 0.5), 0);
	// A value equal to a cut belongs to the bin that cut closes.
	assert_eq!(cut_table.search_bin(0, 1.0), 0);
	assert_eq!(cut_table.search_bin(0, 1.5), 1);
	assert_eq!(cut_table.search_bin(0, 2.0), 1);
	assert_eq!(cut_table.search_bin(0, 2.5), 2);
	assert_eq!(cut_table.search_bin(0, f32::INFINITY), 2);
	assert_eq!(cut_table.search_bin(1, 4.0), 3);
	assert_eq!(cut_table.search_bin(1, 6.0), 4);
}

#[test]
fn test_search_bin_clamps_to_last_bin() {
	// Without an upper sentinel, values beyond the last cut still land in the last bin.
	let cut_table = CutTable::new(vec![1.0, 2.0], vec![0, 2], vec![0.0]).unwrap();
	assert_eq!(cut_table.search_bin(0, 3.0), 1);
}

#[test]
fn test_bin_bounds() {
	let cut_table = example_cut_table();
	assert_eq!(cut_table.bin_bounds(0), (0.0, 1.0));
	assert_eq!(cut_table.bin_bounds(1), (1.0, 2.0));
	assert_eq!(cut_table.bin_bounds(3), (3.0, 5.0));
	assert_eq!(cut_table.feature_for_bin(2), 0);
	assert_eq!(cut_table.feature_for_bin(3), 1);
	assert_eq!(cut_table.feature_for_bin(4), 1);
}

#[test]
fn test_invalid_cut_tables() {
	assert!(matches!(
		CutTable::new(vec![1.0], vec![0, 0, 1], vec![0.0, 0.0]),
		Err(Error::EmptyCutSlice { feature: 0 })
	));
	assert!(matches!(
		CutTable::new(vec![2.0, 1.0], vec![0, 2], vec![0.0]),
		Err(Error::UnsortedCutValues { feature: 0 })
	));
	assert!(matches!(
		CutTable::new(vec![1.0], vec![0, 2], vec![0.0]),
		Err(Error::CutPtrsBounds { .. })
	));
	assert!(matches!(
		CutTable::new(vec![1.0], vec![0, 1], vec![]),
		Err(Error::MinValsLength {
			expected: 1,
			actual: 0
		})
	));
	assert!(matches!(
		CutTable::new(vec![], vec![], vec![]),
		Err(Error::EmptyCutPtrs)
	));
	// A middle pointer past the end of cut_values is reported even when the last pointer is in range.
	assert!(matches!(
		CutTable::new(vec![1.0, 2.0, 3.0], vec![0, 5, 3], vec![0.0, 0.0]),
		Err(Error::CutPtrsBounds { end: 5, .. })
	));
}

#[test]
fn test_deserialize() {
	let cut_table: CutTable = serde_json::from_str(
		r#"{ "cut_values": [0.5, 1.5, 10.0], "cut_ptrs": [0, 2, 3], "min_vals": [0.0, -1.0] }"#,
	)
	.unwrap();
	assert_eq!(cut_table.n_bins(), 3);
	assert_eq!(cut_table.search_bin(1, 100.0), 2);
	let error = serde_json::from_str::<CutTable>(
		r#"{ "cut_values": [0.5], "cut_ptrs": [0, 1, 1], "min_vals": [0.0, 0.0] }"#,
	)
	.unwrap_err();
	assert!(error.to_string().contains("feature 1 has no cut values"));
	let error = serde_json::from_str::<CutTable>(
		r#"{ "cut_values": [0.5, 1.5, 2.5], "cut_ptrs": [0, 5, 3], "min_vals": [0.0, 0.0] }"#,
	)
	.unwrap_err();
	assert!(error.to_string().contains("spans 0..5"));
}
