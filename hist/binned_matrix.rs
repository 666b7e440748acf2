use crate::{
	binned_index::{BinValue, BinWidth, BinnedIndex, BinnedIndexData},
	cut_table::CutTable,
	error::{Error, Result},
	merge_sort::merge_sort,
};
use itertools::Itertools;
use num_traits::ToPrimitive;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An `Entry` is a single non-missing cell of a raw row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry {
	pub feature: u32,
	pub value: f32,
}

/// A view of raw rows in compressed sparse row format. The entries for row `i` are `entries[row_ptr[i]..row_ptr[i + 1]]`.
#[derive(Clone, Copy, Debug)]
pub struct CsrMatrixView<'a> {
	pub row_ptr: &'a [usize],
	pub entries: &'a [Entry],
}

impl<'a> CsrMatrixView<'a> {
	pub fn new(row_ptr: &'a [usize], entries: &'a [Entry]) -> CsrMatrixView<'a> {
		CsrMatrixView { row_ptr, entries }
	}

	pub fn n_rows(&self) -> usize {
		self.row_ptr.len().saturating_sub(1)
	}

	pub fn row(&self, row: usize) -> &'a [Entry] {
		&self.entries[self.row_ptr[row]..self.row_ptr[row + 1]]
	}

	/// This is the largest number of entries in any row.
	pub fn row_stride(&self) -> usize {
		self.row_ptr
			.iter()
			.tuple_windows()
			.map(|(start, end)| end - start)
			.max()
			.unwrap_or(0)
	}

	fn validate(&self) -> Result<()> {
		match (self.row_ptr.first(), self.row_ptr.last()) {
			(Some(0), Some(end)) if *end <= self.entries.len() => {}
			(None, _) => return Err(Error::InvalidRowPtr("row_ptr is empty")),
			(Some(_), _) if self.row_ptr[0] != 0 => {
				return Err(Error::InvalidRowPtr("row_ptr does not start at 0"))
			}
			_ => return Err(Error::InvalidRowPtr("row_ptr ends past the last entry")),
		}
		if !self.row_ptr.iter().tuple_windows().all(|(a, b)| a <= b) {
			return Err(Error::InvalidRowPtr("row_ptr is decreasing"));
		}
		Ok(())
	}

	/// Rows are dense if every row has exactly one entry for each feature, in feature order.
	fn is_dense(&self, n_features: usize) -> bool {
		(0..self.n_rows()).all(|row| {
			let row = self.row(row);
			row.len() == n_features
				&& row
					.iter()
					.enumerate()
					.all(|(position, entry)| entry.feature.to_usize().unwrap() == position)
		})
	}
}

/// This option controls which layout `compute_binned_matrix` produces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Layout {
	/// Use the dense layout if every row has a value for every feature, and the sparse layout otherwise.
	Auto,
	/// Always use the sparse layout.
	Sparse,
}

/// These are the options passed to `compute_binned_matrix`.
#[derive(Clone, Debug)]
pub struct ComputeBinnedMatrixOptions {
	/// This is the maximum number of bins the sketch produced for a single feature. In the dense layout it determines the width of the stored values. It must be at least 2.
	pub max_num_bins: usize,
	pub layout: Layout,
}

impl Default for ComputeBinnedMatrixOptions {
	fn default() -> ComputeBinnedMatrixOptions {
		ComputeBinnedMatrixOptions {
			max_num_bins: 256,
			layout: Layout::Auto,
		}
	}
}

/**
A `BinnedMatrix` holds the bin of every entry of a dataset.

Row `i` occupies positions `i * row_stride..(i + 1) * row_stride` of `index`. In the dense layout, `row_stride` is the number of features and position `j` of a row holds the feature-local bin of feature `j`. In the sparse layout, `row_stride` is the length of the longest row, each row's global bins are sorted in ascending order, and the rest of the row is filled with the padding value `n_bins`.
*/
#[derive(Clone, Debug)]
pub struct BinnedMatrix {
	row_ptr: Vec<usize>,
	index: BinnedIndex,
	hit_count: Vec<usize>,
	cut_table: CutTable,
	max_num_bins: usize,
	row_stride: usize,
	is_dense: bool,
}

impl BinnedMatrix {
	pub(crate) fn from_parts(
		row_ptr: Vec<usize>,
		index: BinnedIndex,
		hit_count: Vec<usize>,
		cut_table: CutTable,
		max_num_bins: usize,
		row_stride: usize,
		is_dense: bool,
	) -> BinnedMatrix {
		BinnedMatrix {
			row_ptr,
			index,
			hit_count,
			cut_table,
			max_num_bins,
			row_stride,
			is_dense,
		}
	}

	pub fn n_rows(&self) -> usize {
		self.row_ptr.len() - 1
	}

	pub fn n_features(&self) -> usize {
		self.cut_table.n_features()
	}

	pub fn n_bins(&self) -> usize {
		self.cut_table.n_bins()
	}

	pub fn row_stride(&self) -> usize {
		self.row_stride
	}

	pub fn is_dense(&self) -> bool {
		self.is_dense
	}

	pub fn max_num_bins(&self) -> usize {
		self.max_num_bins
	}

	/// These are the row boundaries of the raw rows this matrix was binned from.
	pub fn row_ptr(&self) -> &[usize] {
		&self.row_ptr
	}

	pub fn index(&self) -> &BinnedIndex {
		&self.index
	}

	pub fn cut_table(&self) -> &CutTable {
		&self.cut_table
	}

	/// This is the number of entries that fell into each bin.
	pub fn hit_count(&self) -> &[usize] {
		&self.hit_count
	}

	/// Compute the number of entries for each feature by summing the hit counts over the feature's bins.
	pub fn feature_counts(&self) -> Vec<usize> {
		(0..self.n_features())
			.map(|feature| {
				self.hit_count[self.cut_table.feature_bins(feature)]
					.iter()
					.sum()
			})
			.collect()
	}

	/// Get the global bins of the entries in `row`, skipping padding.
	pub fn row_bins(&self, row: usize) -> impl Iterator<Item = u32> + '_ {
		let n_bins = self.n_bins().to_u32().unwrap();
		let start = row * self.row_stride;
		(start..start + self.row_stride)
			.map(move |position| self.index.get(position))
			.filter(move |bin| *bin < n_bins)
	}
}

/// Bin every entry of `rows` using `cut_table`. `progress` is called once for each row.
pub fn compute_binned_matrix(
	cut_table: CutTable,
	rows: CsrMatrixView,
	options: &ComputeBinnedMatrixOptions,
	progress: &(impl Fn() + Sync),
) -> Result<BinnedMatrix> {
	#[cfg(feature = "timing")]
	let start = std::time::Instant::now();
	if options.max_num_bins < 2 {
		return Err(Error::InvalidMaxNumBins(options.max_num_bins));
	}
	rows.validate()?;
	let n_rows = rows.n_rows();
	let n_features = cut_table.n_features();
	let is_dense = options.layout == Layout::Auto && rows.is_dense(n_features);
	let (width, row_stride, offsets) = if is_dense {
		// Feature-local values must fit in the width chosen for max_num_bins.
		for feature in 0..n_features {
			let n_bins = cut_table.n_bins_for_feature(feature);
			if n_bins > options.max_num_bins {
				return Err(Error::TooManyBins {
					feature,
					n_bins,
					max_num_bins: options.max_num_bins,
				});
			}
		}
		let offsets = cut_table.cut_ptrs()[..n_features].to_owned();
		(
			BinWidth::for_max_value(options.max_num_bins - 1),
			n_features,
			Some(offsets),
		)
	} else {
		(BinWidth::U32, rows.row_stride(), None)
	};
	log::debug!(
		"binning {} rows with {} features and {} bins into a {} matrix with {:?} values and row stride {}",
		n_rows,
		n_features,
		cut_table.n_bins(),
		if is_dense { "dense" } else { "sparse" },
		width,
		row_stride,
	);
	let mut index = BinnedIndex::zeroed(width, n_rows * row_stride, offsets);
	let hit_count: Vec<AtomicUsize> = (0..cut_table.n_bins())
		.map(|_| AtomicUsize::new(0))
		.collect();
	{
		let offsets = index.offsets().map(|offsets| offsets.to_owned());
		let binning = BinRows {
			cut_table: &cut_table,
			rows,
			row_stride,
			offsets: offsets.as_deref(),
			hit_count: &hit_count,
		};
		match index.data_mut() {
			BinnedIndexData::U8(values) => binning.bin(values, progress)?,
			BinnedIndexData::U16(values) => binning.bin(values, progress)?,
			BinnedIndexData::U32(values) => binning.bin(values, progress)?,
		}
	}
	let hit_count = hit_count.into_iter().map(AtomicUsize::into_inner).collect();
	#[cfg(feature = "timing")]
	crate::timing::BINNING_TIMING.inc(start.elapsed());
	Ok(BinnedMatrix::from_parts(
		rows.row_ptr.to_owned(),
		index,
		hit_count,
		cut_table,
		options.max_num_bins,
		row_stride,
		is_dense,
	))
}

/// This struct holds everything the parallel binning pass reads.
struct BinRows<'a> {
	cut_table: &'a CutTable,
	rows: CsrMatrixView<'a>,
	row_stride: usize,
	/// These are present only for the dense layout.
	offsets: Option<&'a [u32]>,
	hit_count: &'a [AtomicUsize],
}

impl<'a> BinRows<'a> {
	fn bin<T>(&self, values: &mut [T], progress: &(impl Fn() + Sync)) -> Result<()>
	where
		T: BinValue,
	{
		// Every row is empty, so there is nothing to write.
		if self.row_stride == 0 {
			(0..self.rows.n_rows()).for_each(|_| progress());
			return Ok(());
		}
		values
			.par_chunks_mut(self.row_stride)
			.enumerate()
			.try_for_each_init(
				|| vec![T::default(); self.row_stride],
				|sort_buffer, (row_index, binned_row)| {
					self.bin_row(row_index, binned_row, sort_buffer)?;
					progress();
					Ok(())
				},
			)
	}

	fn bin_row<T>(&self, row_index: usize, binned_row: &mut [T], sort_buffer: &mut [T]) -> Result<()>
	where
		T: BinValue,
	{
		let row = self.rows.row(row_index);
		let n_features = self.cut_table.n_features();
		for (binned_value, entry) in binned_row.iter_mut().zip(row) {
			let feature = entry.feature.to_usize().unwrap();
			if feature >= n_features {
				return Err(Error::FeatureOutOfRange {
					row: row_index,
					feature: entry.feature,
					n_features,
				});
			}
			if entry.value.is_nan() {
				return Err(Error::NanValue {
					row: row_index,
					feature: entry.feature,
				});
			}
			let bin = self.cut_table.search_bin(feature, entry.value);
			self.hit_count[bin.to_usize().unwrap()].fetch_add(1, Ordering::Relaxed);
			*binned_value = match self.offsets {
				Some(offsets) => T::from_bin(bin - offsets[feature]),
				None => T::from_bin(bin),
			};
		}
		if self.offsets.is_none() {
			let n_entries = row.len();
			merge_sort(&mut binned_row[..n_entries], &mut sort_buffer[..n_entries]);
			let padding = T::from_bin(self.cut_table.n_bins().to_u32().unwrap());
			for binned_value in binned_row[n_entries..].iter_mut() {
				*binned_value = padding;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
fn example_rows() -> (Vec<usize>, Vec<Entry>) {
	let entry = |feature, value| Entry { feature, value };
	let row_ptr = vec![0, 2, 3, 5, 5];
	let entries = vec![
		entry(0, 0.5),
		entry(1, 6.0),
		entry(0, 1.5),
		entry(0, 2.5),
		entry(1, 4.0),
	];
	(row_ptr, entries)
}

#[cfg(test)]
fn example_cut_table() -> CutTable {
	CutTable::from_thresholds(&[vec![1.0, 2.0], vec![5.0]], vec![0.0, 0.0]).unwrap()
}

#[test]
fn test_compute_binned_matrix_sparse() {
	let (row_ptr, entries) = example_rows();
	let matrix = compute_binned_matrix(
		example_cut_table(),
		CsrMatrixView::new(&row_ptr, &entries),
		&ComputeBinnedMatrixOptions::default(),
		&|| {},
	)
	.unwrap();
	assert!(!matrix.is_dense());
	assert_eq!(matrix.n_rows(), 4);
	assert_eq!(matrix.n_bins(), 5);
	assert_eq!(matrix.row_stride(), 2);
	assert_eq!(matrix.index().width(), BinWidth::U32);
	assert_eq!(matrix.index().offsets(), None);
	assert_eq!(
		matrix.index().data(),
		&BinnedIndexData::U32(vec![0, 4, 1, 5, 2, 3, 5, 5])
	);
	assert_eq!(matrix.hit_count(), &[1, 1, 1, 1, 1]);
	assert_eq!(matrix.row_bins(0).collect::<Vec<_>>(), vec![0, 4]);
	assert_eq!(matrix.row_bins(1).collect::<Vec<_>>(), vec![1]);
	assert_eq!(matrix.row_bins(3).count(), 0);
	insta::assert_debug_snapshot!(matrix.feature_counts(), @r###"
	[
	    3,
	    2,
	]
	"###);
}

#[test]
fn test_sparse_rows_are_sorted() {
	let cut_table = CutTable::from_thresholds(
		&[vec![0.0], vec![0.0], vec![0.0]],
		vec![-1.0, -1.0, -1.0],
	)
	.unwrap();
	let entry = |feature, value| Entry { feature, value };
	let row_ptr = vec![0, 3, 4];
	let entries = vec![entry(2, 1.0), entry(0, -1.0), entry(1, 1.0), entry(2, -1.0)];
	let matrix = compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&ComputeBinnedMatrixOptions::default(),
		&|| {},
	)
	.unwrap();
	assert!(!matrix.is_dense());
	assert_eq!(
		matrix.index().data(),
		&BinnedIndexData::U32(vec![0, 3, 5, 4, 6, 6])
	);
}

#[test]
fn test_compute_binned_matrix_dense() {
	let cut_table = CutTable::from_thresholds(
		&[vec![1.0, 2.0], vec![5.0], vec![0.0, 10.0, 20.0]],
		vec![0.0, 0.0, -5.0],
	)
	.unwrap();
	let entry = |feature, value| Entry { feature, value };
	let row_ptr = vec![0, 3, 6];
	let entries = vec![
		entry(0, 2.5),
		entry(1, 1.0),
		entry(2, 15.0),
		entry(0, 1.0),
		entry(1, 7.0),
		entry(2, 100.0),
	];
	let progress_count = AtomicUsize::new(0);
	let matrix = compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&ComputeBinnedMatrixOptions::default(),
		&|| {
			progress_count.fetch_add(1, Ordering::Relaxed);
		},
	)
	.unwrap();
	assert_eq!(progress_count.into_inner(), 2);
	assert!(matrix.is_dense());
	assert_eq!(matrix.row_stride(), 3);
	assert_eq!(matrix.index().width(), BinWidth::U8);
	assert_eq!(matrix.index().offsets(), Some(&[0, 3, 5][..]));
	assert_eq!(
		matrix.index().data(),
		&BinnedIndexData::U8(vec![2, 0, 2, 0, 1, 3])
	);
	assert_eq!(matrix.row_bins(0).collect::<Vec<_>>(), vec![2, 3, 7]);
	assert_eq!(matrix.row_bins(1).collect::<Vec<_>>(), vec![0, 4, 8]);
	assert_eq!(matrix.hit_count(), &[1, 0, 1, 1, 1, 0, 0, 1, 1]);
	assert_eq!(matrix.feature_counts(), vec![2, 2, 2]);
}

#[test]
fn test_dense_width_follows_max_num_bins() {
	// 300 bins for the first feature need 16 bit values, even though each row only holds one value per feature.
	let thresholds: Vec<f32> = (0..299).map(|i| i as f32).collect();
	let cut_table = CutTable::from_thresholds(&[thresholds, vec![0.5]], vec![0.0, 0.0]).unwrap();
	let entry = |feature, value| Entry { feature, value };
	let row_ptr = vec![0, 2, 4];
	let entries = vec![entry(0, 298.5), entry(1, 1.0), entry(0, -3.0), entry(1, 0.0)];
	let options = ComputeBinnedMatrixOptions {
		max_num_bins: 300,
		..Default::default()
	};
	let matrix = compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&options,
		&|| {},
	)
	.unwrap();
	assert_eq!(matrix.index().width(), BinWidth::U16);
	assert_eq!(matrix.index().raw(0), 299);
	assert_eq!(matrix.index().get(1), 301);
	assert_eq!(matrix.row_bins(1).collect::<Vec<_>>(), vec![0, 300]);
}

#[test]
fn test_forced_sparse_layout() {
	let cut_table = CutTable::from_thresholds(&[vec![1.0], vec![1.0]], vec![0.0, 0.0]).unwrap();
	let entry = |feature, value| Entry { feature, value };
	let row_ptr = vec![0, 2];
	let entries = vec![entry(0, 2.0), entry(1, 0.0)];
	let options = ComputeBinnedMatrixOptions {
		layout: Layout::Sparse,
		..Default::default()
	};
	let matrix = compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&options,
		&|| {},
	)
	.unwrap();
	assert!(!matrix.is_dense());
	assert_eq!(matrix.index().data(), &BinnedIndexData::U32(vec![1, 2]));
}

#[test]
fn test_all_rows_empty() {
	let row_ptr = vec![0, 0, 0];
	let matrix = compute_binned_matrix(
		example_cut_table(),
		CsrMatrixView::new(&row_ptr, &[]),
		&ComputeBinnedMatrixOptions::default(),
		&|| {},
	)
	.unwrap();
	assert_eq!(matrix.n_rows(), 2);
	assert_eq!(matrix.row_stride(), 0);
	assert!(matrix.index().is_empty());
	assert_eq!(matrix.hit_count().iter().sum::<usize>(), 0);
}

#[test]
fn test_compute_binned_matrix_errors() {
	let (row_ptr, entries) = example_rows();
	let rows = CsrMatrixView::new(&row_ptr, &entries);
	let options = ComputeBinnedMatrixOptions {
		max_num_bins: 1,
		..Default::default()
	};
	assert!(matches!(
		compute_binned_matrix(example_cut_table(), rows, &options, &|| {}),
		Err(Error::InvalidMaxNumBins(1))
	));
	let bad_entries = vec![Entry {
		feature: 7,
		value: 1.0,
	}];
	assert!(matches!(
		compute_binned_matrix(
			example_cut_table(),
			CsrMatrixView::new(&[0, 1], &bad_entries),
			&ComputeBinnedMatrixOptions::default(),
			&|| {},
		),
		Err(Error::FeatureOutOfRange {
			row: 0,
			feature: 7,
			n_features: 2
		})
	));
	let nan_entries = vec![Entry {
		feature: 1,
		value: f32::NAN,
	}];
	assert!(matches!(
		compute_binned_matrix(
			example_cut_table(),
			CsrMatrixView::new(&[0, 1], &nan_entries),
			&ComputeBinnedMatrixOptions::default(),
			&|| {},
		),
		Err(Error::NanValue { row: 0, feature: 1 })
	));
	assert!(matches!(
		compute_binned_matrix(
			example_cut_table(),
			CsrMatrixView::new(&[0, 3], &entries[..2]),
			&ComputeBinnedMatrixOptions::default(),
			&|| {},
		),
		Err(Error::InvalidRowPtr(_))
	));
	// The first feature has 3 bins, so a dense matrix cannot be stored with max_num_bins 2.
	let dense_entries = vec![
		Entry {
			feature: 0,
			value: 0.0,
		},
		Entry {
			feature: 1,
			value: 0.0,
		},
	];
	let options = ComputeBinnedMatrixOptions {
		max_num_bins: 2,
		..Default::default()
	};
	assert!(matches!(
		compute_binned_matrix(
			example_cut_table(),
			CsrMatrixView::new(&[0, 2], &dense_entries),
			&options,
			&|| {},
		),
		Err(Error::TooManyBins {
			feature: 0,
			n_bins: 3,
			max_num_bins: 2
		})
	));
}
