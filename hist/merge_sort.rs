use std::cmp::Ordering;

/// Sort `values` in ascending order with a stable bottom-up merge sort. `buffer` must be at least as long as `values`.
pub fn merge_sort<T>(values: &mut [T], buffer: &mut [T])
where
	T: Copy + Ord,
{
	merge_sort_by(values, buffer, |a, b| a.cmp(b))
}

/// Sort `values` with a stable bottom-up merge sort using `compare`. Elements that compare equal keep their relative order. `buffer` must be at least as long as `values`.
pub fn merge_sort_by<T, F>(values: &mut [T], buffer: &mut [T], mut compare: F)
where
	T: Copy,
	F: FnMut(&T, &T) -> Ordering,
{
	let len = values.len();
	assert!(
		buffer.len() >= len,
		"merge sort buffer has length {} but {} values are being sorted",
		buffer.len(),
		len,
	);
	let mut run_len = 1;
	while run_len < len {
		let mut start = 0;
		while start + run_len < len {
			let mid = start + run_len;
			let end = (mid + run_len).min(len);
			let (mut left, mut right) = (start, mid);
			for slot in buffer[start..end].iter_mut() {
				// Take from the left run on ties to keep the sort stable.
				let take_left = right == end
					|| (left < mid && compare(&values[left], &values[right]) != Ordering::Greater);
				if take_left {
					*slot = values[left];
					left += 1;
				} else {
					*slot = values[right];
					right += 1;
				}
			}
			values[start..end].copy_from_slice(&buffer[start..end]);
			start += 2 * run_len;
		}
		run_len *= 2;
	}
}

#[test]
fn test_merge_sort() {
	let mut values = vec![5u32, 3, 9, 1, 1, 7, 0, 12, 4];
	let mut buffer = vec![0; values.len()];
	merge_sort(&mut values, &mut buffer);
	assert_eq!(values, vec![0, 1, 1, 3, 4, 5, 7, 9, 12]);
}

#[test]
fn test_merge_sort_empty_and_single() {
	let mut values: Vec<u32> = Vec::new();
	merge_sort(&mut values, &mut []);
	assert!(values.is_empty());
	let mut values = vec![42u16];
	merge_sort(&mut values, &mut [0]);
	assert_eq!(values, vec![42]);
}

#[test]
fn test_merge_sort_is_stable() {
	let mut values = vec![(2, 'a'), (1, 'b'), (2, 'c'), (0, 'd'), (1, 'e'), (2, 'f')];
	let mut buffer = vec![(0, ' '); values.len()];
	merge_sort_by(&mut values, &mut buffer, |a, b| a.0.cmp(&b.0));
	assert_eq!(
		values,
		vec![(0, 'd'), (1, 'b'), (1, 'e'), (2, 'a'), (2, 'c'), (2, 'f')]
	);
}

#[test]
fn test_merge_sort_matches_std_sort() {
	let mut values: Vec<u32> = (0..1000u32).map(|i| (i * 7919) % 613).collect();
	let mut expected = values.clone();
	expected.sort();
	let mut buffer = vec![0; values.len()];
	merge_sort(&mut values, &mut buffer);
	assert_eq!(values, expected);
}
