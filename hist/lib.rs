/*!
This crate implements the data layout and histogram math at the core of histogram-based gradient boosted tree training. Feature values are binned into compact integer indices using per-feature quantile cuts, and then for each tree node the gradients and hessians of the examples in that node are summed into one histogram entry per bin. Once a parent's histogram is known, one of its two children's histograms can be derived by subtraction instead of being rebuilt from the examples.

The flow is:

1. An external sketch produces a [`CutTable`].
2. [`compute_binned_matrix`] bins the raw rows into a [`BinnedMatrix`].
3. A [`ParallelHistogramBuilder`] accumulates a node's rows into a [`HistogramRow`], usually one owned by a [`HistogramStore`].
4. [`subtraction_trick`] derives the sibling.

For an end to end example, see the `test_end_to_end` test in `histogram_store.rs`.
*/

#![allow(clippy::tabs_in_doc_comments)]

/// Zip any number of parallel iterators together.
macro_rules! pzip {
	($($e:expr),* $(,)*) => {
		rayon::iter::IntoParallelIterator::into_par_iter(($($e,)*))
	};
}

mod binned_index;
mod binned_matrix;
mod compute_histogram;
mod cut_table;
mod error;
mod histogram;
mod histogram_store;
mod merge_sort;
mod parallel_builder;
mod precision;
#[cfg(feature = "timing")]
mod timing;

pub use self::binned_index::{BinValue, BinWidth, BinnedIndex, BinnedIndexData};
pub use self::binned_matrix::{
	compute_binned_matrix, BinnedMatrix, ComputeBinnedMatrixOptions, CsrMatrixView, Entry, Layout,
};
pub use self::cut_table::CutTable;
pub use self::error::{Error, Result};
pub use self::histogram::{subtraction_trick, BinStatsEntry, GradientPair, GradientSum, HistogramRow};
pub use self::histogram_store::HistogramStore;
pub use self::merge_sort::{merge_sort, merge_sort_by};
pub use self::parallel_builder::{BuildHistogramOptions, ParallelHistogramBuilder};
pub use self::precision::{Capabilities, HistogramContext, NodeHistograms, Precision};
#[cfg(feature = "timing")]
pub use self::timing::{Timing, TimingDuration, BINNING_TIMING};
