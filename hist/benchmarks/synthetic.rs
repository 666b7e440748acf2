use clap::Clap;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use serde_json::json;
use tangram_hist::{
	compute_binned_matrix, BuildHistogramOptions, Capabilities, ComputeBinnedMatrixOptions,
	CsrMatrixView, CutTable, Entry, GradientPair, HistogramContext, Layout,
};

#[derive(Clap)]
#[clap(about = "bin a synthetic dataset and build histograms for a two level tree")]
struct Options {
	#[clap(long, default_value = "1000000")]
	n_rows: usize,
	#[clap(long, default_value = "32")]
	n_features: usize,
	#[clap(long, default_value = "255", about = "the number of thresholds for each feature")]
	n_thresholds: usize,
	#[clap(long, default_value = "1.0", about = "the fraction of present entries")]
	density: f64,
	#[clap(long, default_value = "16")]
	n_blocks: usize,
	#[clap(long, about = "force the sparse layout")]
	sparse: bool,
	#[clap(long, about = "accumulate in f32")]
	single: bool,
	#[clap(long, default_value = "42")]
	seed: u64,
}

fn main() {
	let options = Options::parse();
	let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);

	// Generate the data.
	let thresholds: Vec<Vec<f32>> = (0..options.n_features)
		.map(|_| {
			(0..options.n_thresholds)
				.map(|i| i as f32 / options.n_thresholds as f32)
				.collect()
		})
		.collect();
	let cut_table = CutTable::from_thresholds(&thresholds, vec![0.0; options.n_features]).unwrap();
	let mut row_ptr = Vec::with_capacity(options.n_rows + 1);
	let mut entries = Vec::new();
	row_ptr.push(0);
	for _ in 0..options.n_rows {
		for feature in 0..options.n_features {
			if options.density >= 1.0 || rng.gen_bool(options.density) {
				entries.push(Entry {
					feature: feature as u32,
					value: rng.gen::<f32>(),
				});
			}
		}
		row_ptr.push(entries.len());
	}
	let gradients: Vec<GradientPair> = (0..options.n_rows)
		.map(|_| GradientPair::new(rng.gen_range(-1.0, 1.0), rng.gen_range(0.0, 1.0)))
		.collect();

	// Bin the data.
	let start = std::time::Instant::now();
	let layout = if options.sparse {
		Layout::Sparse
	} else {
		Layout::Auto
	};
	let matrix = compute_binned_matrix(
		cut_table,
		CsrMatrixView::new(&row_ptr, &entries),
		&ComputeBinnedMatrixOptions {
			max_num_bins: (options.n_thresholds + 1).max(2),
			layout,
		},
		&|| {},
	)
	.unwrap();
	let binning_duration = start.elapsed();

	// Build the root, build the smaller child, and derive the larger one.
	let start = std::time::Instant::now();
	let capabilities = Capabilities {
		supports_f64: !options.single,
	};
	let mut context =
		HistogramContext::new(&capabilities, matrix.n_bins(), BuildHistogramOptions::default());
	context.reset(options.n_blocks).unwrap();
	let rows: Vec<u32> = (0..options.n_rows as u32).collect();
	let (left, _): (Vec<u32>, Vec<u32>) = rows.iter().partition(|row| *row % 3 == 0);
	context.build_histogram(0, &matrix, &rows, &gradients).unwrap();
	context.build_histogram(1, &matrix, &left, &gradients).unwrap();
	context.subtraction_trick(2, 1, 0).unwrap();
	let histogram_duration = start.elapsed();

	#[cfg(feature = "timing")]
	{
		eprintln!("binning: {:?}", tangram_hist::BINNING_TIMING);
		if let HistogramContext::Double(histograms) = &context {
			eprintln!("{:?}", histograms.builder.timing());
		}
		if let HistogramContext::Single(histograms) = &context {
			eprintln!("{:?}", histograms.builder.timing());
		}
	}

	let output = json!({
		"dense": matrix.is_dense(),
		"width": format!("{:?}", matrix.index().width()),
		"index_bytes": matrix.index().byte_size(),
		"binning_ms": binning_duration.as_secs_f64() * 1000.0,
		"histogram_ms": histogram_duration.as_secs_f64() * 1000.0,
	});
	println!("{}", output);
}
