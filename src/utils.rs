use std::cmp::Ordering;

/// Create a string of all available items.
pub fn items_to_strings(items: &[&str]) -> String {
    items.join(", ")
}

/// Sort a slice of floats in descending order. NaN values compare equal to
/// everything and keep whatever position the sort leaves them in.
pub fn sort_descending(values: &mut [f64]) {
    values.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
}

/// Arithmetic mean of a slice. Returns NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of a slice. For an even count this is the mean of the two middle
/// values. Returns NaN for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Positions a value would occupy in a descending sorted slice.
///
/// Returns `(rank0, rank1)`: `rank0` is the number of entries strictly
/// greater than `value`, which is the position the value would get when
/// placed ahead of its ties. When the value occurs in the slice, `rank1` is
/// the position of the last occurrence; otherwise `rank1 == rank0`.
///
/// * `sorted` - Slice sorted in descending order.
/// * `value` - Value to place.
pub fn descending_rank_bounds(sorted: &[f64], value: f64) -> (usize, usize) {
    let rank0 = sorted.partition_point(|&s| s > value);
    let count_ge = sorted.partition_point(|&s| s >= value);
    let rank1 = if count_ge > rank0 { count_ge - 1 } else { rank0 };
    (rank0, rank1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_to_strings() {
        assert_eq!(items_to_strings(&["a", "b", "c"]), "a, b, c");
    }

    #[test]
    fn test_sort_descending() {
        let mut v = vec![0.5, 0.9, 0.7, 0.7];
        sort_descending(&mut v);
        assert_eq!(v, vec![0.9, 0.7, 0.7, 0.5]);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[7.0]), 7.0);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_descending_rank_bounds() {
        let scores = vec![0.9, 0.7, 0.7, 0.5];
        assert_eq!(descending_rank_bounds(&scores, 0.7), (1, 2));
        assert_eq!(descending_rank_bounds(&scores, 0.8), (1, 1));
        assert_eq!(descending_rank_bounds(&scores, 0.9), (0, 0));
        assert_eq!(descending_rank_bounds(&scores, 1.0), (0, 0));
        assert_eq!(descending_rank_bounds(&scores, 0.5), (3, 3));
        assert_eq!(descending_rank_bounds(&scores, 0.4), (4, 4));
        assert_eq!(descending_rank_bounds(&[], 0.5), (0, 0));
    }
}
