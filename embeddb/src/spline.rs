//! Spline learned index (spec.md §4.D, §8): a bounded-error, append-only
//! piecewise-linear map from key to an approximate logical page range.
//!
//! Construction is the classic greedy corridor algorithm (as in PGM-index /
//! FITing-tree): each segment tracks a cone of admissible slopes anchored at
//! its first point; a point that falls inside the cone only narrows it, a
//! point that falls outside commits the previous point as a spline anchor
//! and starts a new segment. All arithmetic is done over `i128` so the cone
//! comparisons are exact cross-multiplications, never floating point.
//!
//! Anchors are capacity-bounded (`numSplinePoints`): once full, adding a new
//! anchor evicts the oldest one first. Because the engine only ever predicts
//! forward from the most recently evicted watermark, an evicted anchor's
//! absence degrades precision for very old keys but never produces a false
//! answer — predictions are always a *range*, and the store corrects with a
//! local scan.

use alloc::collections::VecDeque;

use crate::record::Key;

/// A rational slope bound, `num / den` with `den > 0`.
#[derive(Debug, Clone, Copy)]
struct Slope {
    num: i128,
    den: i128,
}

fn le(a: Slope, b: Slope) -> bool {
    a.num * b.den <= b.num * a.den
}

fn lt(a: Slope, b: Slope) -> bool {
    a.num * b.den < b.num * a.den
}

pub struct Spline<K: Key> {
    max_points: usize,
    max_error: u32,
    anchors: VecDeque<(K, u32)>,
    segment_start: Option<(K, u32)>,
    last_point: Option<(K, u32)>,
    upper: Option<Slope>,
    lower: Option<Slope>,
}

impl<K: Key> Spline<K> {
    pub fn new(max_points: u32, max_error: u32) -> Self {
        Spline {
            max_points: max_points.max(1) as usize,
            max_error,
            anchors: VecDeque::new(),
            segment_start: None,
            last_point: None,
            upper: None,
            lower: None,
        }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn anchors(&self) -> impl Iterator<Item = &(K, u32)> {
        self.anchors.iter()
    }

    fn push_anchor(&mut self, key: K, page: u32) {
        if self.anchors.len() == self.max_points {
            self.anchors.pop_front();
        }
        self.anchors.push_back((key, page));
    }

    /// Feed one more `(key, page)` observation. Callers must only ever call
    /// this with keys that are strictly increasing, the same invariant the
    /// paged record store enforces on `put` (spec.md §8 invariant 1).
    pub fn add(&mut self, key: K, page: u32) {
        let Some((sk, sp)) = self.segment_start else {
            self.push_anchor(key, page);
            self.segment_start = Some((key, page));
            self.last_point = Some((key, page));
            return;
        };

        let dx = key.as_i128() - sk.as_i128();
        if dx <= 0 {
            // Duplicate or out-of-order key relative to the segment start;
            // nothing useful to learn from it, keep the cone as-is.
            self.last_point = Some((key, page));
            return;
        }

        let dy = page as i128 - sp as i128;
        let upper_candidate = Slope {
            num: dy + self.max_error as i128,
            den: dx,
        };
        let lower_candidate = Slope {
            num: dy - self.max_error as i128,
            den: dx,
        };

        match (self.upper, self.lower) {
            (None, None) => {
                self.upper = Some(upper_candidate);
                self.lower = Some(lower_candidate);
                self.last_point = Some((key, page));
            }
            (Some(upper), Some(lower)) => {
                let point_slope = Slope { num: dy, den: dx };
                if le(point_slope, upper) && le(lower, point_slope) {
                    if lt(upper_candidate, upper) {
                        self.upper = Some(upper_candidate);
                    }
                    if lt(lower, lower_candidate) {
                        self.lower = Some(lower_candidate);
                    }
                    self.last_point = Some((key, page));
                } else {
                    let (lk, lp) = self
                        .last_point
                        .expect("segment_start implies at least one prior point");
                    self.push_anchor(lk, lp);
                    self.segment_start = Some((lk, lp));
                    self.upper = None;
                    self.lower = None;
                    self.last_point = Some((lk, lp));
                    self.add(key, page);
                }
            }
            _ => unreachable!("cone bounds are always set or cleared together"),
        }
    }

    /// Predict the logical page range a key should fall in, as
    /// `[low, high]` inclusive. `None` when no point has been learned yet.
    ///
    /// `floor` is the lowest logical page the caller still considers live
    /// (e.g. `oldest_live_logical_page`). A key smaller than the smallest
    /// remaining anchor's key can only live on a page strictly before that
    /// anchor's page — but if FIFO eviction (`push_anchor`) has already
    /// dropped the anchors for earlier, still-live pages, interpolation has
    /// nothing to go on for that range, so the window widens all the way
    /// down to `floor` instead of re-centering on the anchor's own page.
    pub fn predict(&self, key: K, floor: u32) -> Option<(u32, u32)> {
        if self.anchors.is_empty() {
            return None;
        }
        let k = key.as_i128();
        let idx = self.anchors.partition_point(|(ak, _)| ak.as_i128() <= k);

        if idx == 0 {
            let first_page = self.anchors[0].1;
            let low = floor.min(first_page);
            return Some((low, first_page));
        }

        let estimate = if idx >= self.anchors.len() {
            let (lk, lp) = self.anchors[self.anchors.len() - 1];
            let dx = k - lk.as_i128();
            let lp = lp as i128;
            if dx <= 0 {
                lp
            } else if let (Some(u), Some(l)) = (self.upper, self.lower) {
                let mid_num = u.num * l.den + l.num * u.den;
                let mid_den = 2 * u.den * l.den;
                if mid_den != 0 {
                    lp + (mid_num * dx) / mid_den
                } else {
                    lp
                }
            } else {
                lp
            }
        } else {
            let (k0, p0) = self.anchors[idx - 1];
            let (k1, p1) = self.anchors[idx];
            let (k0, k1, p0, p1) = (k0.as_i128(), k1.as_i128(), p0 as i128, p1 as i128);
            if k1 == k0 {
                p0
            } else {
                p0 + (p1 - p0) * (k - k0) / (k1 - k0)
            }
        };

        let low = (estimate - self.max_error as i128).max(0) as u32;
        let high = (estimate + self.max_error as i128).max(0) as u32;
        Some((low, high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_run_of_consecutive_keys_yields_one_anchor() {
        let mut spline = Spline::<u32>::new(4, 1);
        for i in 0..80u32 {
            spline.add(97855 + i, 0);
        }
        assert_eq!(spline.len(), 1);
        assert_eq!(*spline.anchors().next().unwrap(), (97855, 0));
    }

    #[test]
    fn anchors_are_strictly_increasing_in_key_and_page() {
        let mut spline = Spline::<u32>::new(4, 1);
        let mut page = 0u32;
        let mut key = 0u32;
        for _ in 0..500 {
            spline.add(key, page);
            key += 1;
            if key % 7 == 0 {
                page += 1;
            }
        }
        let anchors: alloc::vec::Vec<_> = spline.anchors().copied().collect();
        for w in anchors.windows(2) {
            assert!(w[0].0 < w[1].0);
            assert!(w[0].1 <= w[1].1);
        }
    }

    #[test]
    fn eviction_keeps_anchor_count_within_capacity() {
        let mut spline = Spline::<u32>::new(4, 1);
        let mut key = 0u32;
        for page in 0..200u32 {
            for _ in 0..3 {
                spline.add(key, page);
                key += 1;
            }
        }
        assert!(spline.len() <= 4);
    }

    #[test]
    fn prediction_bounds_contain_true_page_within_error() {
        let mut spline = Spline::<u32>::new(8, 2);
        let mut key = 0u32;
        let mut true_page_of = alloc::collections::BTreeMap::new();
        for page in 0..50u32 {
            for _ in 0..10 {
                spline.add(key, page);
                true_page_of.insert(key, page);
                key += 1;
            }
        }
        for (k, true_page) in true_page_of.iter().step_by(17) {
            let (low, high) = spline.predict(*k, 0).unwrap();
            // The cone guarantees the bound at the observed points that
            // shaped each segment; interpolated points can drift by at most
            // one extra page of slope error beyond `max_error`.
            assert!(*true_page + 2 >= low);
            assert!(*true_page <= high + 2);
        }
    }
}
