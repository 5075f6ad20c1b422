//! Back-to-front depth ordering.
//!
//! Depths are projected onto the view's forward axis, converted to fixed
//! point, re-quantized into 16 bits and ordered with a single counting sort
//! pass, which keeps the ordering stable and linear in the point count.

use crate::structures::CanonicalRecord;

pub const DEPTH_BUCKETS: usize = 1 << 16;
pub const DEPTH_FIXED_POINT: f32 = 4096.0;
/// A new view whose forward axis is within this cosine distance of the last
/// sorted one does not trigger a re-sort.
pub const VIEW_SKIP_EPSILON: f32 = 0.01;

/// Third column of a column-major 4x4 matrix: the row producing view depth.
#[inline]
pub fn forward_axis(view_projection: &[f32]) -> [f32; 3] {
    [view_projection[2], view_projection[6], view_projection[10]]
}

fn cosine_similarity(a: [f32; 3], b: [f32; 3]) -> Option<f32> {
    let dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
    let norms = (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt()
        * (b[0] * b[0] + b[1] * b[1] + b[2] * b[2]).sqrt();
    (norms > 0.0 && norms.is_finite()).then(|| dot / norms)
}

/// Fixed-point depth keys along `forward`.
pub fn depth_keys(records: &[CanonicalRecord], forward: [f32; 3]) -> Vec<i32> {
    records
        .iter()
        .map(|r| {
            let p = r.position();
            ((forward[0] * p[0] + forward[1] * p[1] + forward[2] * p[2]) * DEPTH_FIXED_POINT)
                as i32
        })
        .collect()
}

/// Re-quantizes keys into `[0, DEPTH_BUCKETS)`. A zero-width range uses a
/// divisor of 1.
pub fn quantize_keys(keys: &[i32]) -> Vec<u16> {
    let (min, max) = keys
        .iter()
        .fold((i32::MAX, i32::MIN), |(lo, hi), &k| (lo.min(k), hi.max(k)));
    let span = (max as i64 - min as i64).max(1) as f64;
    let scale = (DEPTH_BUCKETS - 1) as f64 / span;
    keys.iter()
        .map(|&k| (((k as i64 - min as i64) as f64 * scale) as u32).min(u16::MAX as u32) as u16)
        .collect()
}

/// Stable counting sort of point indices by bucket.
pub fn counting_sort(buckets: &[u16]) -> Vec<u32> {
    let mut starts = vec![0u32; DEPTH_BUCKETS];
    for &b in buckets {
        starts[b as usize] += 1;
    }
    let mut total = 0u32;
    for slot in starts.iter_mut() {
        let count = *slot;
        *slot = total;
        total += count;
    }

    let mut order = vec![0u32; buckets.len()];
    for (i, &b) in buckets.iter().enumerate() {
        let slot = &mut starts[b as usize];
        order[*slot as usize] = i as u32;
        *slot += 1;
    }
    order
}

/// Sorter state carried between runs: the last sorted forward axis and
/// vertex count.
#[derive(Debug, Clone, Default)]
pub struct DepthSorter {
    last_forward: Option<[f32; 3]>,
    last_vertex_count: Option<usize>,
}

impl DepthSorter {
    pub fn last_vertex_count(&self) -> Option<usize> {
        self.last_vertex_count
    }

    /// Whether a view would be skipped as redundant for `vertex_count` points.
    pub fn is_redundant(&self, vertex_count: usize, forward: [f32; 3]) -> bool {
        if self.last_vertex_count != Some(vertex_count) {
            return false;
        }
        self.last_forward
            .and_then(|last| cosine_similarity(last, forward))
            .is_some_and(|cos| (cos - 1.0).abs() < VIEW_SKIP_EPSILON)
    }

    /// Returns a back-to-front permutation of `records`, or `None` when the
    /// input is unusable or the view barely moved since the last run.
    pub fn sort(&mut self, records: &[CanonicalRecord], view_projection: &[f32]) -> Option<Vec<u32>> {
        if records.is_empty() || view_projection.len() < 16 {
            return None;
        }
        let forward = forward_axis(view_projection);
        if self.is_redundant(records.len(), forward) {
            log::trace!("Skipping depth sort, view direction unchanged");
            return None;
        }

        let keys = depth_keys(records, forward);
        let order = counting_sort(&quantize_keys(&keys));

        self.last_forward = Some(forward);
        self.last_vertex_count = Some(records.len());
        Some(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_looking_along(forward: [f32; 3]) -> Vec<f32> {
        let mut m = vec![0.0f32; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[15] = 1.0;
        m[2] = forward[0];
        m[6] = forward[1];
        m[10] = forward[2];
        m
    }

    fn points(zs: &[f32]) -> Vec<CanonicalRecord> {
        zs.iter()
            .map(|&z| CanonicalRecord::new([0.0, 0.0, z], [1.0; 3], [0; 4], [0; 4]))
            .collect()
    }

    fn assert_bijection(order: &[u32], n: usize) {
        let mut seen = vec![false; n];
        for &i in order {
            assert!(!seen[i as usize], "index {} repeated", i);
            seen[i as usize] = true;
        }
        assert_eq!(order.len(), n);
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn test_orders_by_ascending_key() {
        let records = points(&[3.0, -1.0, 10.0, 0.5, -7.0]);
        let mut sorter = DepthSorter::default();
        let order = sorter
            .sort(&records, &view_looking_along([0.0, 0.0, 1.0]))
            .expect("sorted");
        assert_eq!(order, vec![4, 1, 3, 0, 2]);

        let buckets = quantize_keys(&depth_keys(&records, [0.0, 0.0, 1.0]));
        for pair in order.windows(2) {
            assert!(buckets[pair[0] as usize] <= buckets[pair[1] as usize]);
        }
    }

    #[test]
    fn test_bijection_for_many_sizes() {
        for n in [0usize, 1, 2, 17, 1000] {
            let zs: Vec<f32> = (0..n).map(|i| ((i * 7919) % 113) as f32 - 50.0).collect();
            let order = counting_sort(&quantize_keys(&depth_keys(
                &points(&zs),
                [0.3, -0.2, 0.9],
            )));
            assert_bijection(&order, n);
        }
    }

    #[test]
    fn test_colliding_keys_keep_original_order() {
        let records = points(&vec![2.5; DEPTH_BUCKETS]);
        let mut sorter = DepthSorter::default();
        let order = sorter
            .sort(&records, &view_looking_along([0.0, 1.0, 1.0]))
            .expect("sorted");
        assert_bijection(&order, DEPTH_BUCKETS);
        assert!(order.iter().enumerate().all(|(i, &v)| i as u32 == v));
    }

    #[test]
    fn test_skips_unchanged_view_and_rejects_bad_input() {
        let records = points(&[1.0, 2.0]);
        let mut sorter = DepthSorter::default();
        assert!(sorter.sort(&[], &view_looking_along([0.0, 0.0, 1.0])).is_none());
        assert!(sorter.sort(&records, &[0.0; 15]).is_none());

        let view = view_looking_along([0.0, 0.0, 2.0]);
        assert!(sorter.sort(&records, &view).is_some());
        assert!(sorter.sort(&records, &view).is_none());
        // Same direction at a different magnitude is still the same view.
        assert!(sorter.sort(&records, &view_looking_along([0.0, 0.0, 0.5])).is_none());
        assert!(sorter.sort(&records, &view_looking_along([0.0, 1.0, 0.0])).is_some());

        // A changed vertex count always re-sorts.
        let more = points(&[1.0, 2.0, 3.0]);
        assert!(sorter.sort(&more, &view_looking_along([0.0, 1.0, 0.0])).is_some());
        assert_eq!(sorter.last_vertex_count(), Some(3));
    }

    #[test]
    fn test_zero_forward_axis_never_skips() {
        let records = points(&[1.0, 2.0]);
        let mut sorter = DepthSorter::default();
        let flat = view_looking_along([0.0, 0.0, 0.0]);
        assert_eq!(sorter.sort(&records, &flat), Some(vec![0, 1]));
        assert!(sorter.sort(&records, &flat).is_some());
    }
}
