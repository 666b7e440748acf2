use crate::{
	binned_matrix::BinnedMatrix,
	error::Result,
	histogram::{GradientPair, GradientSum},
	histogram_store::HistogramStore,
	parallel_builder::{BuildHistogramOptions, ParallelHistogramBuilder},
};

/// These are the capabilities of the device histograms are accumulated on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capabilities {
	pub supports_f64: bool,
}

impl Capabilities {
	/// The capabilities of the host CPU, which always supports `f64`.
	pub fn host() -> Capabilities {
		Capabilities { supports_f64: true }
	}
}

/// This is the float type histogram sums are accumulated in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Precision {
	Single,
	Double,
}

impl Precision {
	/// Use `f64` when the device supports it and fall back to `f32` otherwise.
	pub fn for_capabilities(capabilities: &Capabilities) -> Precision {
		if capabilities.supports_f64 {
			Precision::Double
		} else {
			Precision::Single
		}
	}
}

/// A `NodeHistograms` bundles the histogram rows of a tree's nodes with the builder that fills them.
pub struct NodeHistograms<T> {
	pub store: HistogramStore<T>,
	pub builder: ParallelHistogramBuilder<T>,
}

impl<T> NodeHistograms<T>
where
	T: GradientSum,
{
	pub fn new(n_bins: usize, options: BuildHistogramOptions) -> NodeHistograms<T> {
		NodeHistograms {
			store: HistogramStore::new(n_bins),
			builder: ParallelHistogramBuilder::new(n_bins, options),
		}
	}

	pub fn reset(&mut self, block_count: usize) -> Result<()> {
		self.builder.reset(block_count)
	}

	pub fn build_histogram(
		&mut self,
		node: usize,
		matrix: &BinnedMatrix,
		rows: &[u32],
		gradients: &[GradientPair],
	) -> Result<()> {
		self.store
			.build_histogram(&mut self.builder, node, matrix, rows, gradients)
	}

	pub fn subtraction_trick(&mut self, node: usize, sibling: usize, parent: usize) -> Result<()> {
		#[cfg(feature = "timing")]
		let start = std::time::Instant::now();
		self.store.subtraction_trick(node, sibling, parent)?;
		#[cfg(feature = "timing")]
		self.builder.timing().subtraction_trick.inc(start.elapsed());
		Ok(())
	}
}

/**
A `HistogramContext` holds the histograms for one tree at the precision chosen for the device. Every row in a context has the same precision.
*/
pub enum HistogramContext {
	Single(NodeHistograms<f32>),
	Double(NodeHistograms<f64>),
}

impl HistogramContext {
	pub fn new(
		capabilities: &Capabilities,
		n_bins: usize,
		options: BuildHistogramOptions,
	) -> HistogramContext {
		let precision = Precision::for_capabilities(capabilities);
		log::debug!("accumulating histograms with {:?} precision", precision);
		match precision {
			Precision::Single => HistogramContext::Single(NodeHistograms::new(n_bins, options)),
			Precision::Double => HistogramContext::Double(NodeHistograms::new(n_bins, options)),
		}
	}

	pub fn precision(&self) -> Precision {
		match self {
			HistogramContext::Single(_) => Precision::Single,
			HistogramContext::Double(_) => Precision::Double,
		}
	}

	pub fn reset(&mut self, block_count: usize) -> Result<()> {
		match self {
			HistogramContext::Single(histograms) => histograms.reset(block_count),
			HistogramContext::Double(histograms) => histograms.reset(block_count),
		}
	}

	pub fn build_histogram(
		&mut self,
		node: usize,
		matrix: &BinnedMatrix,
		rows: &[u32],
		gradients: &[GradientPair],
	) -> Result<()> {
		match self {
			HistogramContext::Single(histograms) => {
				histograms.build_histogram(node, matrix, rows, gradients)
			}
			HistogramContext::Double(histograms) => {
				histograms.build_histogram(node, matrix, rows, gradients)
			}
		}
	}

	pub fn subtraction_trick(&mut self, node: usize, sibling: usize, parent: usize) -> Result<()> {
		match self {
			HistogramContext::Single(histograms) => histograms.subtraction_trick(node, sibling, parent),
			HistogramContext::Double(histograms) => histograms.subtraction_trick(node, sibling, parent),
		}
	}

	/// Get the gradient and hessian sums of each bin for `node`, widened to `f64`.
	pub fn sums(&self, node: usize) -> Option<Vec<(f64, f64)>> {
		match self {
			HistogramContext::Single(histograms) => histograms.store.get(node).map(|row| row.sums()),
			HistogramContext::Double(histograms) => histograms.store.get(node).map(|row| row.sums()),
		}
	}
}

#[test]
fn test_precision_for_capabilities() {
	assert_eq!(
		Precision::for_capabilities(&Capabilities::host()),
		Precision::Double
	);
	assert_eq!(
		Precision::for_capabilities(&Capabilities {
			supports_f64: false
		}),
		Precision::Single
	);
}

#[test]
fn test_contexts_agree() {
	use crate::{
		binned_matrix::{compute_binned_matrix, ComputeBinnedMatrixOptions, CsrMatrixView, Entry},
		cut_table::CutTable,
	};
	let cut_table = CutTable::from_thresholds(&[vec![0.0, 1.0], vec![2.0]], vec![-1.0, 0.0]).unwrap();
	let entry = |feature, value| Entry { feature, value };
	let row_ptr = vec![0, 2, 3, 4];
	let entries = vec![entry(0, -0.5), entry(1, 3.0), entry(1, 1.0), entry(0, 0.5)];
	let matrix = compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&ComputeBinnedMatrixOptions::default(),
		&|| {},
	)
	.unwrap();
	let gradients = vec![
		GradientPair::new(0.5, 1.0),
		GradientPair::new(-1.5, 2.0),
		GradientPair::new(2.0, 0.5),
	];
	let mut sums = Vec::new();
	for capabilities in [
		Capabilities { supports_f64: false },
		Capabilities { supports_f64: true },
	]
	.iter()
	{
		let mut context = HistogramContext::new(
			capabilities,
			matrix.n_bins(),
			BuildHistogramOptions::default(),
		);
		context.reset(2).unwrap();
		context
			.build_histogram(0, &matrix, &[0, 1, 2], &gradients)
			.unwrap();
		context.build_histogram(1, &matrix, &[1], &gradients).unwrap();
		context.subtraction_trick(2, 1, 0).unwrap();
		assert!(context.sums(3).is_none());
		sums.push((context.sums(0).unwrap(), context.sums(2).unwrap()));
	}
	assert_eq!(sums[0], sums[1]);
	assert_eq!(
		sums[1].1,
		vec![(0.5, 1.0), (2.0, 0.5), (0.0, 0.0), (0.0, 0.0), (0.5, 1.0)]
	);
}
