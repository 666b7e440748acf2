use crate::{
	binned_matrix::BinnedMatrix,
	error::{Error, Result},
	histogram::{subtraction_trick, GradientPair, GradientSum, HistogramRow},
	parallel_builder::ParallelHistogramBuilder,
};

/// A `HistogramStore` holds one `HistogramRow` for each tree node that has one, indexed by node id.
#[derive(Clone, Debug)]
pub struct HistogramStore<T> {
	n_bins: usize,
	rows: Vec<Option<HistogramRow<T>>>,
}

impl<T> HistogramStore<T>
where
	T: GradientSum,
{
	pub fn new(n_bins: usize) -> HistogramStore<T> {
		HistogramStore {
			n_bins,
			rows: Vec::new(),
		}
	}

	/// Prepare the store for a new tree with `n_bins` bins. The rows are kept if the number of bins did not change, so they can be reused.
	pub fn reset(&mut self, n_bins: usize) {
		if n_bins != self.n_bins {
			self.n_bins = n_bins;
			self.rows.clear();
		}
	}

	/// Make room for node ids up to and including `max_node_id`.
	pub fn reserve(&mut self, max_node_id: usize) {
		if self.rows.len() <= max_node_id {
			self.rows.resize_with(max_node_id + 1, || None);
		}
	}

	/// Get the row for `node`, creating a zero filled row if the node has none.
	pub fn ensure_row(&mut self, node: usize) -> &mut HistogramRow<T> {
		self.reserve(node);
		let n_bins = self.n_bins;
		self.rows[node].get_or_insert_with(|| HistogramRow::zeroed(n_bins))
	}

	pub fn get(&self, node: usize) -> Option<&HistogramRow<T>> {
		self.rows.get(node).and_then(|row| row.as_ref())
	}

	pub fn get_mut(&mut self, node: usize) -> Option<&mut HistogramRow<T>> {
		self.rows.get_mut(node).and_then(|row| row.as_mut())
	}

	pub fn contains(&self, node: usize) -> bool {
		self.get(node).is_some()
	}

	pub fn n_bins(&self) -> usize {
		self.n_bins
	}

	/// This is the number of nodes that have a row.
	pub fn n_nodes(&self) -> usize {
		self.rows.iter().filter(|row| row.is_some()).count()
	}

	pub fn clear(&mut self) {
		self.rows.clear();
	}

	/// Build the histogram of `rows` into the row for `node`.
	pub fn build_histogram(
		&mut self,
		builder: &mut ParallelHistogramBuilder<T>,
		node: usize,
		matrix: &BinnedMatrix,
		rows: &[u32],
		gradients: &[GradientPair],
	) -> Result<()> {
		if builder.n_bins() != self.n_bins {
			return Err(Error::BinCountMismatch {
				expected: self.n_bins,
				actual: builder.n_bins(),
			});
		}
		let histogram = self.ensure_row(node);
		builder.build_histogram(matrix, rows, gradients, histogram)
	}

	/// Derive the row for `node` from the rows of its `sibling` and `parent`.
	pub fn subtraction_trick(&mut self, node: usize, sibling: usize, parent: usize) -> Result<()> {
		assert!(
			node != sibling && node != parent && sibling != parent,
			"node {} cannot be derived from sibling {} and parent {}, the three nodes must differ",
			node,
			sibling,
			parent,
		);
		let sibling_row = self.take(sibling)?;
		let parent_row = match self.take(parent) {
			Ok(parent_row) => parent_row,
			Err(error) => {
				self.rows[sibling] = Some(sibling_row);
				return Err(error);
			}
		};
		log::trace!(
			"deriving the histogram of node {} from parent {} and sibling {}",
			node,
			parent,
			sibling,
		);
		subtraction_trick(self.ensure_row(node), &sibling_row, &parent_row);
		self.rows[sibling] = Some(sibling_row);
		self.rows[parent] = Some(parent_row);
		Ok(())
	}

	fn take(&mut self, node: usize) -> Result<HistogramRow<T>> {
		self.rows
			.get_mut(node)
			.and_then(|row| row.take())
			.ok_or(Error::MissingNode(node))
	}
}

#[test]
fn test_ensure_row_and_reset() {
	let mut store = HistogramStore::<f32>::new(3);
	assert!(!store.contains(2));
	store.ensure_row(2).entries_mut()[1].sum_gradients = 4.0;
	assert!(store.contains(2));
	assert!(!store.contains(0));
	assert_eq!(store.n_nodes(), 1);
	assert_eq!(store.get(2).unwrap().entries()[1].sum_gradients, 4.0);
	store.reset(3);
	assert!(store.contains(2));
	store.reset(4);
	assert_eq!(store.n_nodes(), 0);
	assert_eq!(store.ensure_row(0).len(), 4);
	store.clear();
	assert!(store.get_mut(0).is_none());
}

#[test]
fn test_missing_node() {
	let mut store = HistogramStore::<f64>::new(2);
	store.ensure_row(0);
	assert!(matches!(
		store.subtraction_trick(2, 1, 0),
		Err(Error::MissingNode(1))
	));
	store.ensure_row(1);
	assert!(matches!(
		store.subtraction_trick(2, 1, 5),
		Err(Error::MissingNode(5))
	));
	// A failed derivation leaves the existing rows in place.
	assert!(store.contains(0));
	assert!(store.contains(1));
	assert!(!store.contains(2));
}

#[test]
#[should_panic(expected = "the three nodes must differ")]
fn test_subtraction_trick_sibling_is_parent() {
	let mut store = HistogramStore::<f64>::new(2);
	store.ensure_row(0);
	let _ = store.subtraction_trick(1, 0, 0);
}

#[test]
fn test_end_to_end() {
	use crate::{
		binned_matrix::{compute_binned_matrix, ComputeBinnedMatrixOptions, CsrMatrixView, Entry},
		cut_table::CutTable,
		parallel_builder::BuildHistogramOptions,
	};
	let cut_table = CutTable::from_thresholds(&[vec![1.0, 2.0], vec![5.0]], vec![0.0, 0.0]).unwrap();
	let entry = |feature, value| Entry { feature, value };
	let row_ptr = vec![0, 2, 3, 5, 5];
	let entries = vec![
		entry(0, 0.5),
		entry(1, 6.0),
		entry(0, 1.5),
		entry(0, 2.5),
		entry(1, 4.0),
	];
	let matrix = compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&ComputeBinnedMatrixOptions::default(),
		&|| {},
	)
	.unwrap();
	let gradients = vec![
		GradientPair::new(1.0, 1.0),
		GradientPair::new(2.0, 1.0),
		GradientPair::new(3.0, 1.0),
		GradientPair::new(4.0, 1.0),
	];
	let mut builder = ParallelHistogramBuilder::<f64>::new(matrix.n_bins(), BuildHistogramOptions::default());
	builder.reset(4).unwrap();
	let mut store = HistogramStore::new(matrix.n_bins());
	store
		.build_histogram(&mut builder, 0, &matrix, &[0, 1, 2, 3], &gradients)
		.unwrap();
	insta::assert_debug_snapshot!(store.get(0).unwrap().sums(), @r###"
	[
	    (
	        1.0,
	        1.0,
	    ),
	    (
	        2.0,
	        1.0,
	    ),
	    (
	        3.0,
	        1.0,
	    ),
	    (
	        3.0,
	        1.0,
	    ),
	    (
	        1.0,
	        1.0,
	    ),
	]
	"###);
	// Split the root into rows [0, 1] and [2, 3], build the left child, and derive the right.
	store
		.build_histogram(&mut builder, 1, &matrix, &[0, 1], &gradients)
		.unwrap();
	store.subtraction_trick(2, 1, 0).unwrap();
	let mut right = HistogramRow::zeroed(matrix.n_bins());
	builder
		.build_histogram(&matrix, &[2, 3], &gradients, &mut right)
		.unwrap();
	assert_eq!(store.get(2).unwrap(), &right);
	assert_eq!(store.n_nodes(), 3);
}
