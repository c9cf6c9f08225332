pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1). Zero for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Sorts and drops `floor(n * fraction)` values from each tail, keeping at least two.
pub fn trimmed(values: &[f64], fraction: f64) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let cut = (sorted.len() as f64 * fraction).floor() as usize;
    if sorted.len() < cut * 2 + 2 {
        return sorted;
    }
    sorted[cut..sorted.len() - cut].to_vec()
}

/// Shannon entropy (bits) of a count histogram.
pub fn entropy(counts: &[u32]) -> f64 {
    let total: u32 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    counts
        .iter()
        .filter(|count| **count > 0)
        .map(|count| {
            let p = *count as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_std_matches_hand_computation() {
        let values = [1150.0, 1300.0, 1450.0, 1150.0, 1450.0];
        assert_eq!(mean(&values), 1300.0);
        assert_eq!(std_dev(&values), 150.0);
    }

    #[test]
    fn trimming_drops_both_tails() {
        let values = [5.0, 1.0, 100.0, 3.0, 2.0, 4.0, 6.0, 7.0, 8.0, -50.0];
        let kept = trimmed(&values, 0.1);
        assert_eq!(kept.len(), 8);
        assert_eq!(kept.first(), Some(&1.0));
        assert_eq!(kept.last(), Some(&8.0));
    }

    #[test]
    fn trimming_small_samples_is_a_no_op() {
        let kept = trimmed(&[3.0, 1.0, 2.0, 4.0], 0.1);
        assert_eq!(kept, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn entropy_of_uniform_histogram() {
        assert!((entropy(&[5, 5, 5, 5]) - 2.0).abs() < 1e-12);
        assert_eq!(entropy(&[0, 9, 0]), 0.0);
        assert_eq!(entropy(&[]), 0.0);
    }
}
