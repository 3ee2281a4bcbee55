//! Range-scan iterator (spec.md §3's component C, §4.E pruning): because
//! `put` rejects any key that isn't strictly greater than the last one
//! inserted, the whole store is already sorted by key across every page —
//! there's no merge step, just a page-at-a-time walk forward from an
//! approximate spline-predicted start page, skipping whatever the bitmap or
//! min/max summary proves can't match, and stopping the instant a key
//! exceeds the query's upper bound.

use embeddb_storage::PageStorage;

use crate::bitmap::{BitmapStrategy, Summary};
use crate::error::Error;
use crate::record::{DataValue, Key};
use crate::store::Store;

/// Inclusive range filter over key and/or data value. Any bound left as
/// `None` is unconstrained on that side.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeQuery<K, D> {
    pub min_key: Option<K>,
    pub max_key: Option<K>,
    pub min_data: Option<D>,
    pub max_data: Option<D>,
}

/// Forward-only cursor produced by [`crate::EmbedDB::range`].
pub struct RangeIter<'a, K: Key, D: DataValue, S: PageStorage, B: BitmapStrategy<D>> {
    store: &'a mut Store<K, D, S, B>,
    query: RangeQuery<K, D>,
    query_bitmap: u64,
    current_logical: u32,
    last_logical: u32,
    record_idx: usize,
    record_count: usize,
    done: bool,
    error: Option<Error>,
}

impl<'a, K: Key, D: DataValue, S: PageStorage, B: BitmapStrategy<D>> RangeIter<'a, K, D, S, B> {
    pub(crate) fn new(store: &'a mut Store<K, D, S, B>, query: RangeQuery<K, D>) -> Self {
        let query_bitmap = store
            .bitmap_strategy()
            .build_range(query.min_data, query.max_data);

        let start_logical = match query.min_key {
            Some(k) => store
                .predict_start_page(k)
                .unwrap_or_else(|| store.oldest_live_logical_page())
                .max(store.oldest_live_logical_page()),
            None => store.oldest_live_logical_page(),
        };
        let last_logical = store.write_logical_page();
        let done = store.write_logical_page() == 0 && store.write_record_count() == 0;

        let mut iter = RangeIter {
            store,
            query,
            query_bitmap,
            current_logical: start_logical,
            last_logical,
            record_idx: 0,
            record_count: 0,
            done,
            error: None,
        };
        if !iter.done {
            iter.load_next_page();
        }
        iter
    }

    /// Surface any I/O error encountered while iterating; `next()` stops
    /// producing items once this is set.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Load the first non-prunable page at or after `current_logical`,
    /// advancing `current_logical` past anything skipped. Leaves `done` set
    /// and returns `false` once the scan runs off the end of the store.
    ///
    /// Per spec.md §4.E, a page's summary is consulted from the dedicated
    /// index file (or the index-write buffer for a not-yet-sealed tail
    /// summary) first, so most skipped pages never touch the data file at
    /// all; only a page that survives pruning (or one with no index entry
    /// available) needs a full data-page read.
    fn load_next_page(&mut self) -> bool {
        loop {
            if self.current_logical > self.last_logical {
                self.done = true;
                return false;
            }
            match self.store.read_summary_for_page(self.current_logical) {
                Ok(Some(summary)) => {
                    if summary.prunable(self.query_bitmap, self.query.min_data, self.query.max_data) {
                        self.current_logical += 1;
                        continue;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.error = Some(e);
                    self.done = true;
                    return false;
                }
            }
            match self.store.read_page(self.current_logical) {
                Ok(Some(header)) => {
                    let summary = Summary {
                        bitmap: header.bitmap,
                        min_data: header.min_data,
                        max_data: header.max_data,
                        logical_page: header.page_number,
                    };
                    if header.record_count == 0
                        || summary.prunable(self.query_bitmap, self.query.min_data, self.query.max_data)
                    {
                        self.current_logical += 1;
                        continue;
                    }
                    self.record_idx = 0;
                    self.record_count = header.record_count as usize;
                    return true;
                }
                Ok(None) => {
                    self.current_logical += 1;
                    continue;
                }
                Err(e) => {
                    self.error = Some(e);
                    self.done = true;
                    return false;
                }
            }
        }
    }
}

impl<'a, K: Key, D: DataValue, S: PageStorage, B: BitmapStrategy<D>> Iterator
    for RangeIter<'a, K, D, S, B>
{
    type Item = (K, D);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.record_idx >= self.record_count {
                self.current_logical += 1;
                if !self.load_next_page() {
                    return None;
                }
            }
            let (key, data, _) = self.store.record_at(self.current_logical, self.record_idx);
            self.record_idx += 1;

            if let Some(max_key) = self.query.max_key {
                if key > max_key {
                    self.done = true;
                    return None;
                }
            }
            if let Some(min_key) = self.query.min_key {
                if key < min_key {
                    continue;
                }
            }
            if let Some(min_data) = self.query.min_data {
                if data < min_data {
                    continue;
                }
            }
            if let Some(max_data) = self.query.max_data {
                if data > max_data {
                    continue;
                }
            }
            return Some((key, data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::BucketStrategy;
    use crate::config::{Config, Parameters};
    use embeddb_storage::mock::MemoryPageStore;

    fn cfg() -> Config {
        Config {
            page_size: 128,
            num_spline_points: 8,
            spline_max_error: 2,
            bitmap_size: 8,
            num_data_pages: 64,
            num_index_pages: 0,
            num_var_pages: 0,
            erase_size_in_pages: 4,
            parameters: Parameters::USE_BMAP,
        }
    }

    fn store() -> Store<u32, u32, MemoryPageStore, BucketStrategy<u32>> {
        let c = cfg();
        let data = MemoryPageStore::new(c.num_data_pages, c.page_size, 0xFF);
        let mut store = Store::new(c, BucketStrategy::new(50), data, None, None, None).unwrap();
        store
            .open(embeddb_storage::OpenMode::TruncateReadWrite)
            .unwrap();
        store
    }

    #[test]
    fn range_scan_respects_key_bounds_and_ascends() {
        let mut s = store();
        for i in 0u32..300 {
            s.put(i, i * 10, None).unwrap();
        }
        s.flush().unwrap();

        let query = RangeQuery {
            min_key: Some(100),
            max_key: Some(110),
            min_data: None,
            max_data: None,
        };
        let results: alloc::vec::Vec<_> = RangeIter::new(&mut s, query).collect();
        let keys: alloc::vec::Vec<u32> = results.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (100..=110).collect::<alloc::vec::Vec<u32>>());
    }

    #[test]
    fn range_scan_with_no_bounds_returns_everything_in_order() {
        let mut s = store();
        for i in 0u32..50 {
            s.put(i, i, None).unwrap();
        }
        s.flush().unwrap();

        let query = RangeQuery::default();
        let results: alloc::vec::Vec<_> = RangeIter::new(&mut s, query).collect();
        assert_eq!(results.len(), 50);
        for w in results.windows(2) {
            assert!(w[0].0 < w[1].0);
        }
    }
}
