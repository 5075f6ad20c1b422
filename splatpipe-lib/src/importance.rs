use crate::structures::CanonicalRecord;

/// Indices ordered by descending score. Equal scores keep their original
/// relative order.
pub fn importance_order(scores: &[f32]) -> Vec<u32> {
    let mut order: Vec<u32> = (0..scores.len() as u32).collect();
    order.sort_by(|&a, &b| scores[b as usize].total_cmp(&scores[a as usize]));
    order
}

/// Reorders records so the most important splats come first.
pub fn sort_by_importance(records: Vec<CanonicalRecord>, scores: &[f32]) -> Vec<CanonicalRecord> {
    debug_assert_eq!(records.len(), scores.len());
    importance_order(scores)
        .into_iter()
        .map(|i| records[i as usize])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descending_and_stable() {
        let scores = [0.5, 2.0, 0.5, 0.0, 2.0];
        assert_eq!(importance_order(&scores), vec![1, 4, 0, 2, 3]);
    }

    #[test]
    fn test_all_zero_keeps_file_order() {
        assert_eq!(importance_order(&[0.0; 4]), vec![0, 1, 2, 3]);
        assert!(importance_order(&[]).is_empty());
    }

    #[test]
    fn test_records_follow_scores() {
        let records: Vec<_> = (0..3)
            .map(|i| CanonicalRecord::new([i as f32; 3], [1.0; 3], [0; 4], [0; 4]))
            .collect();
        let sorted = sort_by_importance(records, &[1.0, 3.0, 2.0]);
        let xs: Vec<f32> = sorted.iter().map(|r| r.position()[0]).collect();
        assert_eq!(xs, vec![1.0, 2.0, 0.0]);
    }
}
