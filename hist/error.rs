use crate::binned_index::BinWidth;
use std::collections::TryReserveError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// These are the errors that binning and histogram construction can return. Mismatched histogram lengths in the subtraction trick are not represented here because they indicate a bug in the caller, so they panic instead.
#[derive(Debug, Error)]
pub enum Error {
	#[error("max_num_bins must be at least 2, but it is {0}")]
	InvalidMaxNumBins(usize),
	#[error("cut_ptrs must contain at least one element")]
	EmptyCutPtrs,
	#[error("cut_ptrs must start at 0 and end at the number of cut values {n_cut_values}, but it spans {start}..{end}")]
	CutPtrsBounds {
		start: u32,
		end: u32,
		n_cut_values: usize,
	},
	#[error("feature {feature} has no cut values")]
	EmptyCutSlice { feature: usize },
	#[error("the cut values for feature {feature} are not sorted in ascending order")]
	UnsortedCutValues { feature: usize },
	#[error("min_vals has {actual} values, but there are {expected} features")]
	MinValsLength { expected: usize, actual: usize },
	#[error("feature {feature} has {n_bins} bins, which exceeds max_num_bins {max_num_bins}")]
	TooManyBins {
		feature: usize,
		n_bins: usize,
		max_num_bins: usize,
	},
	#[error("row_ptr is malformed: {0}")]
	InvalidRowPtr(&'static str),
	#[error("row {row} has an entry for feature {feature}, but there are only {n_features} features")]
	FeatureOutOfRange {
		row: usize,
		feature: u32,
		n_features: usize,
	},
	#[error("row {row} has a NaN value for feature {feature}")]
	NanValue { row: usize, feature: u32 },
	#[error("a sparse bin index must be stored with 32 bit values, but it uses {0:?}")]
	UnsupportedBinWidth(BinWidth),
	#[error("expected a histogram with {expected} bins, but it has {actual}")]
	BinCountMismatch { expected: usize, actual: usize },
	#[error("there are {n_gradients} gradient pairs, but the matrix has {n_rows} rows")]
	GradientCountMismatch { n_gradients: usize, n_rows: usize },
	#[error("row {row} is out of range for a matrix with {n_rows} rows")]
	RowOutOfRange { row: usize, n_rows: usize },
	#[error("the scratch buffer has no blocks, call reset before building histograms")]
	EmptyScratch,
	#[error("failed to allocate a scratch buffer for {n_blocks} blocks")]
	ScratchAllocation {
		n_blocks: usize,
		#[source]
		source: TryReserveError,
	},
	#[error("a scratch buffer for {n_blocks} blocks of {n_bins} bins is too large to address")]
	ScratchTooLarge { n_blocks: usize, n_bins: usize },
	#[error("node {0} has no histogram")]
	MissingNode(usize),
	#[error(transparent)]
	Shape(#[from] ndarray::ShapeError),
}
