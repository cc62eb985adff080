//! String similarity used by entity resolution

/// Indel-normalized similarity of two strings, case-insensitive.
///
/// `(|a| + |b| - indel_distance) / (|a| + |b|)`, where the indel distance
/// only counts insertions and deletions. Two empty strings are identical.
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let chars1: Vec<char> = a.to_lowercase().chars().collect();
    let chars2: Vec<char> = b.to_lowercase().chars().collect();
    let total = chars1.len() + chars2.len();
    if total == 0 {
        return 1.0;
    }

    let lcs = longest_common_subsequence(&chars1, &chars2);
    // indel distance = total - 2 * lcs
    (2 * lcs) as f64 / total as f64
}

/// Indel distance between two strings, case-insensitive
pub fn indel_distance(a: &str, b: &str) -> usize {
    let chars1: Vec<char> = a.to_lowercase().chars().collect();
    let chars2: Vec<char> = b.to_lowercase().chars().collect();
    chars1.len() + chars2.len() - 2 * longest_common_subsequence(&chars1, &chars2)
}

fn longest_common_subsequence(chars1: &[char], chars2: &[char]) -> usize {
    let len1 = chars1.len();
    let len2 = chars2.len();

    let mut matrix = vec![vec![0usize; len2 + 1]; len1 + 1];

    for i in 1..=len1 {
        for j in 1..=len2 {
            matrix[i][j] = if chars1[i - 1] == chars2[j - 1] {
                matrix[i - 1][j - 1] + 1
            } else {
                matrix[i - 1][j].max(matrix[i][j - 1])
            };
        }
    }

    matrix[len1][len2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_ratios() {
        assert!((indel_ratio("Joe's Pizza", "Joes Pizza") - 20.0 / 21.0).abs() < 1e-9);
        assert_eq!(indel_ratio("", ""), 1.0);
        assert_eq!(indel_ratio("abc", ""), 0.0);
        assert_eq!(indel_ratio("PIZZA", "pizza"), 1.0);
        assert_eq!(indel_ratio("abcd", "wxyz"), 0.0);
    }

    #[test]
    fn test_indel_distance_counts_insertions_and_deletions() {
        // substitution costs one deletion plus one insertion
        assert_eq!(indel_distance("cat", "cut"), 2);
        assert_eq!(indel_distance("joes", "joe's"), 1);
    }

    proptest! {
        #[test]
        fn prop_ratio_is_symmetric_and_bounded(a in "[a-zA-Z ']{0,24}", b in "[a-zA-Z ']{0,24}") {
            let forward = indel_ratio(&a, &b);
            let backward = indel_ratio(&b, &a);
            prop_assert!((0.0..=1.0).contains(&forward));
            prop_assert!((forward - backward).abs() < 1e-12);
            prop_assert_eq!(indel_ratio(&a, &a), 1.0);
        }
    }
}
