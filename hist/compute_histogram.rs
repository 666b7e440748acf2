use crate::{
	binned_index::{BinValue, BinnedIndexData},
	binned_matrix::BinnedMatrix,
	error::{Error, Result},
	histogram::{BinStatsEntry, GradientPair, GradientSum},
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rayon::prelude::*;

/// `RowBins` gives the global bins of the entries in a row of a binned matrix.
trait RowBins: Sync {
	fn for_each_bin(&self, row: usize, f: impl FnMut(usize));
}

/// Rows of a dense matrix. Position `j` of each row holds the local bin of feature `j`.
struct DenseRows<'a, B> {
	values: &'a [B],
	offsets: &'a [u32],
}

impl<'a, B> RowBins for DenseRows<'a, B>
where
	B: BinValue,
{
	#[inline]
	fn for_each_bin(&self, row: usize, mut f: impl FnMut(usize)) {
		let n_features = self.offsets.len();
		let start = row * n_features;
		for (value, offset) in self.values[start..start + n_features]
			.iter()
			.zip(self.offsets)
		{
			f(value.to_index() + offset.to_usize().unwrap());
		}
	}
}

/// Rows of a sparse matrix. Each row holds sorted global bins followed by padding.
struct SparseRows<'a> {
	values: &'a [u32],
	row_stride: usize,
	n_bins: u32,
}

impl<'a> RowBins for SparseRows<'a> {
	#[inline]
	fn for_each_bin(&self, row: usize, mut f: impl FnMut(usize)) {
		let start = row * self.row_stride;
		for bin in self.values[start..start + self.row_stride]
			.iter()
			.take_while(|bin| **bin != self.n_bins)
		{
			f(bin.to_usize().unwrap());
		}
	}
}

/**
Accumulate the gradients of `rows` into `partials`, which has one row of `2 * n_bins` accumulators for each block. The gradient and hessian sums for bin `b` are at positions `2 * b` and `2 * b + 1`. Block `i` handles rows `i, i + n_blocks, i + 2 * n_blocks, ...` of the subset.
*/
pub fn scatter<T>(
	matrix: &BinnedMatrix,
	rows: &[u32],
	gradients: &[GradientPair],
	partials: ArrayViewMut2<T>,
) -> Result<()>
where
	T: GradientSum,
{
	let index = matrix.index();
	match (index.data(), index.offsets()) {
		(BinnedIndexData::U8(values), Some(offsets)) => {
			scatter_rows(&DenseRows { values, offsets }, rows, gradients, partials)
		}
		(BinnedIndexData::U16(values), Some(offsets)) => {
			scatter_rows(&DenseRows { values, offsets }, rows, gradients, partials)
		}
		(BinnedIndexData::U32(values), Some(offsets)) => {
			scatter_rows(&DenseRows { values, offsets }, rows, gradients, partials)
		}
		(BinnedIndexData::U32(values), None) => scatter_rows(
			&SparseRows {
				values,
				row_stride: matrix.row_stride(),
				n_bins: matrix.n_bins().to_u32().unwrap(),
			},
			rows,
			gradients,
			partials,
		),
		(data, None) => return Err(Error::UnsupportedBinWidth(data.width())),
	}
	Ok(())
}

fn scatter_rows<T, R>(
	row_bins: &R,
	rows: &[u32],
	gradients: &[GradientPair],
	mut partials: ArrayViewMut2<T>,
) where
	T: GradientSum,
	R: RowBins,
{
	let n_blocks = partials.nrows();
	pzip!(partials.axis_iter_mut(Axis(0)), 0..n_blocks).for_each(|(mut partial, block)| {
		partial.fill(T::zero());
		let partial = partial.as_slice_mut().unwrap();
		for row in rows.iter().skip(block).step_by(n_blocks) {
			let row = row.to_usize().unwrap();
			let gradient = T::from_f32(gradients[row].gradient);
			let hessian = T::from_f32(gradients[row].hessian);
			row_bins.for_each_bin(row, |bin| {
				partial[2 * bin] += gradient;
				partial[2 * bin + 1] += hessian;
			});
		}
	});
}

/// Sum the partial histograms of every block into `histogram`. The blocks are added in block order, so the result only depends on the number of blocks and the order of the rows.
pub fn reduce<T>(partials: ArrayView2<T>, histogram: &mut [BinStatsEntry<T>])
where
	T: GradientSum,
{
	pzip!(histogram, 0..partials.ncols() / 2).for_each(|(entry, bin)| {
		let mut sum_gradients = T::zero();
		let mut sum_hessians = T::zero();
		for partial in partials.axis_iter(Axis(0)) {
			sum_gradients += partial[2 * bin];
			sum_hessians += partial[2 * bin + 1];
		}
		*entry = BinStatsEntry {
			sum_gradients,
			sum_hessians,
		};
	});
}

#[cfg(test)]
fn example_matrix(layout: crate::binned_matrix::Layout) -> BinnedMatrix {
	use crate::{
		binned_matrix::{compute_binned_matrix, ComputeBinnedMatrixOptions, CsrMatrixView, Entry},
		cut_table::CutTable,
	};
	let cut_table = CutTable::from_thresholds(&[vec![1.0], vec![0.0, 1.0]], vec![0.0, 0.0]).unwrap();
	let entry = |feature, value| Entry { feature, value };
	let row_ptr = vec![0, 2, 4, 6];
	let entries = vec![
		entry(0, 0.5),
		entry(1, 0.5),
		entry(0, 2.0),
		entry(1, 2.0),
		entry(0, 0.0),
		entry(1, -1.0),
	];
	let options = ComputeBinnedMatrixOptions {
		layout,
		..Default::default()
	};
	compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&options,
		&|| {},
	)
	.unwrap()
}

#[test]
fn test_scatter_and_reduce() {
	use crate::binned_matrix::Layout;
	let gradients = vec![
		GradientPair::new(1.0, 0.5),
		GradientPair::new(2.0, 0.5),
		GradientPair::new(4.0, 0.5),
	];
	for layout in [Layout::Auto, Layout::Sparse].iter() {
		let matrix = example_matrix(*layout);
		assert_eq!(matrix.is_dense(), *layout == Layout::Auto);
		let mut scratch = vec![0.0f64; 2 * 2 * matrix.n_bins()];
		let mut partials = ArrayViewMut2::from_shape((2, 2 * matrix.n_bins()), &mut scratch[..]).unwrap();
		scatter(&matrix, &[0, 1, 2], &gradients, partials.view_mut()).unwrap();
		// Rows 0 and 2 go to block 0 and row 1 goes to block 1.
		assert_eq!(partials[[0, 0]], 5.0);
		assert_eq!(partials[[1, 2]], 2.0);
		let mut histogram = vec![BinStatsEntry::default(); matrix.n_bins()];
		reduce(partials.view(), &mut histogram);
		let sums: Vec<f64> = histogram.iter().map(|entry| entry.sum_gradients).collect();
		assert_eq!(sums, vec![5.0, 2.0, 4.0, 1.0, 2.0]);
		assert_eq!(histogram[0].sum_hessians, 1.0);
	}
}

#[test]
fn test_wide_dense_index() {
	use crate::binned_index::BinWidth;
	use crate::binned_matrix::{compute_binned_matrix, ComputeBinnedMatrixOptions, CsrMatrixView, Entry};
	use crate::cut_table::CutTable;
	let cut_table = CutTable::from_thresholds(&[vec![0.5], vec![0.5]], vec![0.0, 0.0]).unwrap();
	let entry = |feature, value| Entry { feature, value };
	let row_ptr = vec![0, 2];
	let entries = vec![entry(0, 1.0), entry(1, 0.0)];
	let options = ComputeBinnedMatrixOptions {
		max_num_bins: 70000,
		..Default::default()
	};
	let matrix = compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&options,
		&|| {},
	)
	.unwrap();
	assert!(matrix.is_dense());
	assert_eq!(matrix.index().width(), BinWidth::U32);
	let mut scratch = vec![0.0f64; 2 * matrix.n_bins()];
	let partials = ArrayViewMut2::from_shape((1, 2 * matrix.n_bins()), &mut scratch[..]).unwrap();
	scatter(&matrix, &[0], &[GradientPair::new(1.0, 1.0)], partials).unwrap();
	let partials = ArrayView2::from_shape((1, 2 * matrix.n_bins()), &scratch[..]).unwrap();
	let mut histogram = vec![BinStatsEntry::default(); matrix.n_bins()];
	reduce(partials, &mut histogram);
	let sums: Vec<(f64, f64)> = histogram
		.iter()
		.map(|entry| (entry.sum_gradients, entry.sum_hessians))
		.collect();
	assert_eq!(sums, vec![(0.0, 0.0), (1.0, 1.0), (1.0, 1.0), (0.0, 0.0)]);
}

#[test]
fn test_narrow_sparse_index_is_rejected() {
	use crate::{binned_index::BinnedIndex, binned_index::BinWidth, cut_table::CutTable};
	let cut_table = CutTable::from_thresholds(&[vec![1.0]], vec![0.0]).unwrap();
	let matrix = BinnedMatrix::from_parts(
		vec![0, 1],
		BinnedIndex::zeroed(BinWidth::U8, 1, None),
		vec![1, 0],
		cut_table,
		256,
		1,
		false,
	);
	let mut scratch = vec![0.0f32; 4];
	let partials = ArrayViewMut2::from_shape((1, 4), &mut scratch[..]).unwrap();
	assert!(matches!(
		scatter(&matrix, &[0], &[GradientPair::new(1.0, 1.0)], partials),
		Err(Error::UnsupportedBinWidth(BinWidth::U8))
	));
}
