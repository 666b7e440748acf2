use proptest::prelude::*;
use tangram_hist::{
	compute_binned_matrix, subtraction_trick, BinWidth, BinnedMatrix, BuildHistogramOptions,
	ComputeBinnedMatrixOptions, CsrMatrixView, CutTable, Entry, GradientPair, HistogramRow, Layout,
	ParallelHistogramBuilder,
};

#[derive(Debug, Clone)]
struct Dataset {
	cut_table: CutTable,
	row_ptr: Vec<usize>,
	entries: Vec<Entry>,
	gradients: Vec<GradientPair>,
}

impl Dataset {
	fn new(thresholds: Vec<Vec<f32>>, rows: Vec<Vec<Option<f32>>>, gradients: Vec<(i32, i32)>) -> Dataset {
		let thresholds: Vec<Vec<f32>> = thresholds
			.into_iter()
			.map(|mut thresholds| {
				thresholds.sort_by(|a, b| a.partial_cmp(b).unwrap());
				thresholds.dedup();
				thresholds
			})
			.collect();
		let min_vals = vec![-20.0; thresholds.len()];
		let cut_table = CutTable::from_thresholds(&thresholds, min_vals).unwrap();
		let mut row_ptr = vec![0];
		let mut entries = Vec::new();
		for row in rows.iter() {
			for (feature, value) in row.iter().enumerate() {
				if let Some(value) = value {
					entries.push(Entry {
						feature: feature as u32,
						value: *value,
					});
				}
			}
			row_ptr.push(entries.len());
		}
		let gradients = gradients
			.into_iter()
			.take(rows.len())
			.map(|(gradient, hessian)| GradientPair::new(gradient as f32, hessian as f32 * 0.5))
			.collect();
		Dataset {
			cut_table,
			row_ptr,
			entries,
			gradients,
		}
	}

	fn rows(&self) -> CsrMatrixView {
		CsrMatrixView::new(&self.row_ptr, &self.entries)
	}

	fn bin(&self, layout: Layout) -> BinnedMatrix {
		self.bin_with_max_num_bins(layout, ComputeBinnedMatrixOptions::default().max_num_bins)
	}

	fn bin_with_max_num_bins(&self, layout: Layout, max_num_bins: usize) -> BinnedMatrix {
		let options = ComputeBinnedMatrixOptions {
			max_num_bins,
			layout,
		};
		compute_binned_matrix(self.cut_table.clone(), self.rows(), &options, &|| {}).unwrap()
	}
}

const MAX_ROWS: usize = 48;

fn arb_dataset(missing: bool) -> impl Strategy<Value = Dataset> {
	(1usize..5)
		.prop_flat_map(move |n_features| {
			let value = if missing {
				prop::option::weighted(0.7, -20.0f32..20.0).boxed()
			} else {
				(-20.0f32..20.0).prop_map(Some).boxed()
			};
			(
				prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 0..8), n_features),
				prop::collection::vec(prop::collection::vec(value, n_features), 0..MAX_ROWS),
				prop::collection::vec((-8i32..8, 0i32..4), MAX_ROWS),
			)
		})
		.prop_map(|(thresholds, rows, gradients)| Dataset::new(thresholds, rows, gradients))
}

/// Draw a max_num_bins for each dense value width, along with that width. Datasets have at most 8 thresholds, so at most 9 bins, per feature.
fn arb_max_num_bins() -> impl Strategy<Value = (usize, BinWidth)> {
	prop_oneof![
		(9usize..=256).prop_map(|n| (n, BinWidth::U8)),
		(257usize..=65536).prop_map(|n| (n, BinWidth::U16)),
		(65537usize..=100_000).prop_map(|n| (n, BinWidth::U32)),
	]
}

fn build(matrix: &BinnedMatrix, rows: &[u32], gradients: &[GradientPair], n_blocks: usize) -> HistogramRow<f64> {
	let options = BuildHistogramOptions {
		min_rows_per_block: 4,
	};
	let mut builder = ParallelHistogramBuilder::new(matrix.n_bins(), options);
	builder.reset(n_blocks).unwrap();
	let mut histogram = HistogramRow::zeroed(matrix.n_bins());
	builder
		.build_histogram(matrix, rows, gradients, &mut histogram)
		.unwrap();
	histogram
}

fn split(n_rows: usize, seed: usize) -> (Vec<u32>, Vec<u32>) {
	(0..n_rows as u32).partition(|row| (*row as usize * 7 + seed) % 3 == 0)
}

proptest! {
	#[test]
	fn bins_respect_cut_values(dataset in arb_dataset(true)) {
		let cut_table = &dataset.cut_table;
		for entry in dataset.entries.iter() {
			let feature = entry.feature as usize;
			let bins = cut_table.feature_bins(feature);
			let bin = cut_table.search_bin(feature, entry.value) as usize;
			prop_assert!(bins.contains(&bin));
			if bin > bins.start {
				prop_assert!(cut_table.cut_values()[bin - 1] < entry.value);
			}
			prop_assert!(entry.value <= cut_table.cut_values()[bin] || bin == bins.end - 1);
		}
	}

	#[test]
	fn dense_values_decode_to_feature_bins(
		dataset in arb_dataset(false),
		(max_num_bins, width) in arb_max_num_bins(),
	) {
		let matrix = dataset.bin_with_max_num_bins(Layout::Auto, max_num_bins);
		prop_assert!(matrix.is_dense());
		prop_assert_eq!(matrix.index().width(), width);
		let n_features = matrix.n_features();
		for (position, entry) in dataset.entries.iter().enumerate() {
			let feature = position % n_features;
			let bin = matrix.index().get(position);
			prop_assert!(matrix.cut_table().feature_bins(feature).contains(&(bin as usize)));
			prop_assert_eq!(bin, dataset.cut_table.search_bin(feature, entry.value));
		}
	}

	#[test]
	fn sparse_rows_are_sorted(dataset in arb_dataset(true)) {
		let matrix = dataset.bin(Layout::Sparse);
		for row in 0..matrix.n_rows() {
			let bins: Vec<u32> = matrix.row_bins(row).collect();
			prop_assert_eq!(bins.len(), dataset.rows().row(row).len());
			prop_assert!(bins.windows(2).all(|pair| pair[0] <= pair[1]));
		}
	}

	#[test]
	fn hit_counts_sum_to_entries(dataset in arb_dataset(true)) {
		let matrix = dataset.bin(Layout::Auto);
		prop_assert_eq!(matrix.hit_count().iter().sum::<usize>(), dataset.entries.len());
		prop_assert_eq!(matrix.feature_counts().iter().sum::<usize>(), dataset.entries.len());
	}

	#[test]
	fn histograms_are_additive(dataset in arb_dataset(true), seed in 0usize..3, n_blocks in 1usize..6) {
		let matrix = dataset.bin(Layout::Auto);
		let (left, right) = split(matrix.n_rows(), seed);
		let all: Vec<u32> = (0..matrix.n_rows() as u32).collect();
		let parent = build(&matrix, &all, &dataset.gradients, n_blocks);
		let left = build(&matrix, &left, &dataset.gradients, n_blocks);
		let right = build(&matrix, &right, &dataset.gradients, n_blocks);
		for (parent, (left, right)) in parent.entries().iter().zip(left.entries().iter().zip(right.entries())) {
			prop_assert!((left.sum_gradients + right.sum_gradients - parent.sum_gradients).abs() < 1e-9);
			prop_assert!((left.sum_hessians + right.sum_hessians - parent.sum_hessians).abs() < 1e-9);
		}
	}

	#[test]
	fn subtraction_matches_build(dataset in arb_dataset(true), seed in 0usize..3) {
		let matrix = dataset.bin(Layout::Auto);
		let (left, right) = split(matrix.n_rows(), seed);
		let all: Vec<u32> = (0..matrix.n_rows() as u32).collect();
		let parent = build(&matrix, &all, &dataset.gradients, 3);
		let left = build(&matrix, &left, &dataset.gradients, 3);
		let expected = build(&matrix, &right, &dataset.gradients, 3);
		let mut derived = HistogramRow::zeroed(matrix.n_bins());
		subtraction_trick(&mut derived, &left, &parent);
		for (derived, expected) in derived.entries().iter().zip(expected.entries()) {
			prop_assert!((derived.sum_gradients - expected.sum_gradients).abs() < 1e-9);
			prop_assert!((derived.sum_hessians - expected.sum_hessians).abs() < 1e-9);
		}
	}

	#[test]
	fn rebuilds_are_identical(dataset in arb_dataset(true), n_blocks in 1usize..6) {
		let matrix = dataset.bin(Layout::Auto);
		let all: Vec<u32> = (0..matrix.n_rows() as u32).rev().collect();
		let first = build(&matrix, &all, &dataset.gradients, n_blocks);
		let second = build(&matrix, &all, &dataset.gradients, n_blocks);
		let bits = |row: &HistogramRow<f64>| -> Vec<(u64, u64)> {
			row.entries()
				.iter()
				.map(|entry| (entry.sum_gradients.to_bits(), entry.sum_hessians.to_bits()))
				.collect()
		};
		prop_assert_eq!(bits(&first), bits(&second));
	}

	#[test]
	fn dense_and_sparse_layouts_agree(
		dataset in arb_dataset(false),
		(max_num_bins, _) in arb_max_num_bins(),
	) {
		let dense = dataset.bin_with_max_num_bins(Layout::Auto, max_num_bins);
		let sparse = dataset.bin(Layout::Sparse);
		prop_assert!(dense.is_dense());
		prop_assert!(!sparse.is_dense());
		prop_assert_eq!(dense.hit_count(), sparse.hit_count());
		let all: Vec<u32> = (0..dense.n_rows() as u32).collect();
		prop_assert_eq!(
			build(&dense, &all, &dataset.gradients, 2),
			build(&sparse, &all, &dataset.gradients, 2)
		);
	}
}
