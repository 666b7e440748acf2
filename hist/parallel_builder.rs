use crate::{
	binned_matrix::BinnedMatrix,
	compute_histogram::{reduce, scatter},
	error::{Error, Result},
	histogram::{GradientPair, GradientSum, HistogramRow},
};
#[cfg(feature = "timing")]
use crate::timing::Timing;
use ndarray::prelude::*;

/// These are the options used by a `ParallelHistogramBuilder`.
#[derive(Clone, Debug)]
pub struct BuildHistogramOptions {
	/// A histogram build uses one block for every `min_rows_per_block` rows, up to the number of blocks the scratch buffer holds.
	pub min_rows_per_block: usize,
}

impl Default for BuildHistogramOptions {
	fn default() -> BuildHistogramOptions {
		BuildHistogramOptions {
			min_rows_per_block: 128,
		}
	}
}

/**
A `ParallelHistogramBuilder` builds histograms by splitting a node's rows into blocks, accumulating each block into its own region of a scratch buffer in parallel, and then summing the regions bin by bin.

The scratch buffer holds `2 * n_bins` accumulators for each block. It is sized with `reset` and reused across builds. It grows when more blocks are requested and is only released by `reconfigure` when the number of bins changes.
*/
pub struct ParallelHistogramBuilder<T> {
	n_bins: usize,
	options: BuildHistogramOptions,
	max_blocks: usize,
	scratch: Vec<T>,
	#[cfg(feature = "timing")]
	timing: Timing,
}

impl<T> ParallelHistogramBuilder<T>
where
	T: GradientSum,
{
	pub fn new(n_bins: usize, options: BuildHistogramOptions) -> ParallelHistogramBuilder<T> {
		ParallelHistogramBuilder {
			n_bins,
			options,
			max_blocks: 0,
			scratch: Vec::new(),
			#[cfg(feature = "timing")]
			timing: Timing::new(),
		}
	}

	pub fn n_bins(&self) -> usize {
		self.n_bins
	}

	pub fn options(&self) -> &BuildHistogramOptions {
		&self.options
	}

	/// This is the number of blocks the scratch buffer can hold.
	pub fn max_blocks(&self) -> usize {
		self.max_blocks
	}

	#[cfg(feature = "timing")]
	pub fn timing(&self) -> &Timing {
		&self.timing
	}

	/// Make sure the scratch buffer holds at least `block_count` blocks. The buffer is never shrunk.
	pub fn reset(&mut self, block_count: usize) -> Result<()> {
		if block_count <= self.max_blocks {
			return Ok(());
		}
		let len = self
			.n_bins
			.checked_mul(2)
			.and_then(|block_len| block_count.checked_mul(block_len))
			.ok_or(Error::ScratchTooLarge {
				n_blocks: block_count,
				n_bins: self.n_bins,
			})?;
		self.scratch
			.try_reserve_exact(len - self.scratch.len())
			.map_err(|source| Error::ScratchAllocation {
				n_blocks: block_count,
				source,
			})?;
		self.scratch.resize(len, T::zero());
		log::debug!(
			"grew the histogram scratch buffer from {} to {} blocks of {} bins",
			self.max_blocks,
			block_count,
			self.n_bins,
		);
		self.max_blocks = block_count;
		Ok(())
	}

	/// Set the number of bins. If it changed, the scratch buffer is released and `reset` must be called again before building.
	pub fn reconfigure(&mut self, n_bins: usize) {
		if n_bins != self.n_bins {
			self.n_bins = n_bins;
			self.max_blocks = 0;
			self.scratch = Vec::new();
		}
	}

	/// Build the histogram of `rows` into `histogram`. `gradients` has one entry for every row of `matrix` and is indexed by row.
	pub fn build_histogram(
		&mut self,
		matrix: &BinnedMatrix,
		rows: &[u32],
		gradients: &[GradientPair],
		histogram: &mut HistogramRow<T>,
	) -> Result<()> {
		if matrix.n_bins() != self.n_bins {
			return Err(Error::BinCountMismatch {
				expected: self.n_bins,
				actual: matrix.n_bins(),
			});
		}
		if histogram.len() != self.n_bins {
			return Err(Error::BinCountMismatch {
				expected: self.n_bins,
				actual: histogram.len(),
			});
		}
		if gradients.len() != matrix.n_rows() {
			return Err(Error::GradientCountMismatch {
				n_gradients: gradients.len(),
				n_rows: matrix.n_rows(),
			});
		}
		if let Some(row) = rows
			.iter()
			.map(|row| *row as usize)
			.find(|row| *row >= matrix.n_rows())
		{
			return Err(Error::RowOutOfRange {
				row,
				n_rows: matrix.n_rows(),
			});
		}
		if self.max_blocks == 0 {
			return Err(Error::EmptyScratch);
		}
		if rows.is_empty() {
			histogram.fill_zero();
			return Ok(());
		}
		let min_rows_per_block = self.options.min_rows_per_block.max(1);
		let n_blocks = self
			.max_blocks
			.min((rows.len() + min_rows_per_block - 1) / min_rows_per_block);
		log::debug!(
			"building a histogram of {} rows with {} blocks",
			rows.len(),
			n_blocks,
		);
		let block_len = 2 * self.n_bins;
		let mut partials = ArrayViewMut2::from_shape(
			(n_blocks, block_len),
			&mut self.scratch[..n_blocks * block_len],
		)?;
		#[cfg(feature = "timing")]
		let start = std::time::Instant::now();
		scatter(matrix, rows, gradients, partials.view_mut())?;
		#[cfg(feature = "timing")]
		self.timing.build_histogram_scatter.inc(start.elapsed());
		#[cfg(feature = "timing")]
		let start = std::time::Instant::now();
		reduce(partials.view(), histogram.entries_mut());
		#[cfg(feature = "timing")]
		self.timing.build_histogram_reduce.inc(start.elapsed());
		Ok(())
	}
}

#[cfg(test)]
fn example_matrix() -> BinnedMatrix {
	use crate::{
		binned_matrix::{compute_binned_matrix, ComputeBinnedMatrixOptions, CsrMatrixView, Entry},
		cut_table::CutTable,
	};
	let cut_table = CutTable::from_thresholds(&[vec![10.0, 20.0], vec![0.5]], vec![0.0, 0.0]).unwrap();
	let mut row_ptr = vec![0];
	let mut entries = Vec::new();
	for i in 0..1000u32 {
		entries.push(Entry {
			feature: 0,
			value: (i % 30) as f32,
		});
		if i % 3 != 0 {
			entries.push(Entry {
				feature: 1,
				value: (i % 2) as f32,
			});
		}
		row_ptr.push(entries.len());
	}
	compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&ComputeBinnedMatrixOptions::default(),
		&|| {},
	)
	.unwrap()
}

#[cfg(test)]
fn example_gradients(n_rows: usize) -> Vec<GradientPair> {
	(0..n_rows)
		.map(|i| GradientPair::new((i % 7) as f32 - 3.0, 0.25))
		.collect()
}

#[test]
fn test_reset_grows_and_never_shrinks() {
	let mut builder = ParallelHistogramBuilder::<f64>::new(5, BuildHistogramOptions::default());
	assert_eq!(builder.max_blocks(), 0);
	builder.reset(4).unwrap();
	assert_eq!(builder.max_blocks(), 4);
	builder.reset(2).unwrap();
	assert_eq!(builder.max_blocks(), 4);
	builder.reconfigure(5);
	assert_eq!(builder.max_blocks(), 4);
	builder.reconfigure(7);
	assert_eq!(builder.max_blocks(), 0);
	assert_eq!(builder.n_bins(), 7);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_reset_rejects_oversized_scratch() {
	let mut builder = ParallelHistogramBuilder::<f64>::new(1 << 40, BuildHistogramOptions::default());
	assert!(matches!(
		builder.reset(1 << 40),
		Err(Error::ScratchTooLarge { .. })
	));
	assert_eq!(builder.max_blocks(), 0);
	let mut builder =
		ParallelHistogramBuilder::<f64>::new(usize::MAX / 2 + 1, BuildHistogramOptions::default());
	assert!(matches!(builder.reset(1), Err(Error::ScratchTooLarge { .. })));
	// Sizes that fit in usize but not in memory fail to allocate.
	let mut builder = ParallelHistogramBuilder::<f64>::new(1 << 30, BuildHistogramOptions::default());
	assert!(matches!(
		builder.reset(1 << 30),
		Err(Error::ScratchAllocation { .. })
	));
	assert_eq!(builder.max_blocks(), 0);
}

#[test]
fn test_block_count_does_not_change_sums() {
	let matrix = example_matrix();
	let gradients = example_gradients(matrix.n_rows());
	let rows: Vec<u32> = (0..1000).filter(|i| i % 5 != 0).collect();
	let mut single = HistogramRow::<f64>::zeroed(matrix.n_bins());
	let mut builder = ParallelHistogramBuilder::new(matrix.n_bins(), BuildHistogramOptions::default());
	builder.reset(1).unwrap();
	builder
		.build_histogram(&matrix, &rows, &gradients, &mut single)
		.unwrap();
	let mut blocked = HistogramRow::<f64>::zeroed(matrix.n_bins());
	let options = BuildHistogramOptions {
		min_rows_per_block: 16,
	};
	let mut builder = ParallelHistogramBuilder::new(matrix.n_bins(), options);
	builder.reset(8).unwrap();
	builder
		.build_histogram(&matrix, &rows, &gradients, &mut blocked)
		.unwrap();
	// The gradients are small integers, so every partial sum is exact.
	assert_eq!(single, blocked);
	let total_hessian: f64 = single.entries()[0..3]
		.iter()
		.map(|entry| entry.sum_hessians)
		.sum();
	assert_eq!(total_hessian, 0.25 * rows.len() as f64);
}

#[test]
fn test_rebuild_is_bit_identical() {
	let matrix = example_matrix();
	let gradients: Vec<GradientPair> = (0..matrix.n_rows())
		.map(|i| GradientPair::new((i as f32 * 0.37).sin(), 0.1 + (i as f32 * 0.11).cos().abs()))
		.collect();
	let rows: Vec<u32> = (0..1000).collect();
	let mut builder = ParallelHistogramBuilder::<f32>::new(matrix.n_bins(), BuildHistogramOptions::default());
	builder.reset(4).unwrap();
	let mut first = HistogramRow::zeroed(matrix.n_bins());
	builder
		.build_histogram(&matrix, &rows, &gradients, &mut first)
		.unwrap();
	let mut second = HistogramRow::zeroed(matrix.n_bins());
	builder
		.build_histogram(&matrix, &rows, &gradients, &mut second)
		.unwrap();
	let bits = |row: &HistogramRow<f32>| {
		row.entries()
			.iter()
			.map(|entry| (entry.sum_gradients.to_bits(), entry.sum_hessians.to_bits()))
			.collect::<Vec<_>>()
	};
	assert_eq!(bits(&first), bits(&second));
}

#[test]
fn test_empty_rows_give_zeros() {
	let matrix = example_matrix();
	let gradients = example_gradients(matrix.n_rows());
	let mut builder = ParallelHistogramBuilder::<f64>::new(matrix.n_bins(), BuildHistogramOptions::default());
	builder.reset(2).unwrap();
	let mut histogram = HistogramRow::zeroed(matrix.n_bins());
	builder
		.build_histogram(&matrix, &[0, 1, 2], &gradients, &mut histogram)
		.unwrap();
	builder
		.build_histogram(&matrix, &[], &gradients, &mut histogram)
		.unwrap();
	assert_eq!(histogram, HistogramRow::zeroed(matrix.n_bins()));
}

#[test]
fn test_build_histogram_errors() {
	let matrix = example_matrix();
	let gradients = example_gradients(matrix.n_rows());
	let mut builder = ParallelHistogramBuilder::<f64>::new(matrix.n_bins(), BuildHistogramOptions::default());
	let mut histogram = HistogramRow::zeroed(matrix.n_bins());
	assert!(matches!(
		builder.build_histogram(&matrix, &[0], &gradients, &mut histogram),
		Err(Error::EmptyScratch)
	));
	builder.reset(1).unwrap();
	assert!(matches!(
		builder.build_histogram(&matrix, &[0, 1000], &gradients, &mut histogram),
		Err(Error::RowOutOfRange {
			row: 1000,
			n_rows: 1000
		})
	));
	assert!(matches!(
		builder.build_histogram(&matrix, &[0], &gradients[1..], &mut histogram),
		Err(Error::GradientCountMismatch {
			n_gradients: 999,
			n_rows: 1000
		})
	));
	let mut short = HistogramRow::zeroed(2);
	assert!(matches!(
		builder.build_histogram(&matrix, &[0], &gradients, &mut short),
		Err(Error::BinCountMismatch {
			expected: 5,
			actual: 2
		})
	));
}
