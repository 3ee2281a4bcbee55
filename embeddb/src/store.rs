//! Paged record store (spec.md §3's component C): owns the data, index, and
//! variable-data files, the spline index, and the consistency tail, and
//! drives the five-step page "seal" sequence described in spec.md §3:
//! write the header, feed the spline, write the page through `PageStorage`,
//! erase the evicted physical slot's erase-group when the ring wraps onto
//! an erase-group boundary, and reset the write buffer under the next
//! logical page number.

use embeddb_storage::{OpenMode, PageStorage};

use crate::bitmap::{BitmapStrategy, Summary};
use crate::buffer::BufferPool;
use crate::config::{Config, Parameters};
use crate::consistency::ConsistencyTail;
use crate::error::Error;
use crate::page::{self, DataPageHeader, Layout};
use crate::record::{DataValue, Key};
use crate::spline::Spline;
use crate::vardata::{VarDataLog, VarStream};

/// Everything the store needs to talk to the outside world: one
/// `PageStorage` per file, plus the caller's bitmap strategy.
pub struct Store<K: Key, D: DataValue, S: PageStorage, B: BitmapStrategy<D>> {
    config: Config,
    layout: Layout,
    bitmap_strategy: B,
    buffers: BufferPool,

    data_storage: S,
    index_storage: Option<S>,
    var: Option<VarDataLog<S>>,
    consistency: ConsistencyTail<S>,

    spline: Spline<K>,
    last_key: Option<K>,

    write_logical_page: u32,
    write_first_key: Option<K>,
    write_header: DataPageHeader<D>,
    oldest_live_logical_page: u32,

    index_write_logical_page: u32,
    index_record_count: u32,
}

impl<K: Key, D: DataValue, S: PageStorage, B: BitmapStrategy<D>> Store<K, D, S, B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        bitmap_strategy: B,
        data_storage: S,
        index_storage: Option<S>,
        var_storage: Option<S>,
        tail_storage: Option<S>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let has_var = config.parameters.contains(Parameters::USE_VDATA);
        if has_var && var_storage.is_none() {
            return Err(Error::ResourceExhaustion);
        }
        if config.parameters.contains(Parameters::USE_INDEX) && index_storage.is_none() {
            return Err(Error::ResourceExhaustion);
        }
        if config
            .parameters
            .contains(Parameters::RECORD_LEVEL_CONSISTENCY)
            != tail_storage.is_some()
        {
            return Err(Error::ResourceExhaustion);
        }

        let layout = Layout::new::<K, D>(&config, has_var);
        if layout.records_per_page == 0 {
            return Err(Error::ResourceExhaustion);
        }
        let buffers = BufferPool::new(config.page_size, config.parameters)?;
        let var = var_storage.map(|s| VarDataLog::new(s, config.page_size, config.num_var_pages));

        Ok(Store {
            spline: Spline::new(config.num_spline_points, config.spline_max_error),
            consistency: ConsistencyTail::new(tail_storage),
            write_header: DataPageHeader::new(0),
            config,
            layout,
            bitmap_strategy,
            buffers,
            data_storage,
            index_storage,
            var,
            last_key: None,
            write_logical_page: 0,
            write_first_key: None,
            oldest_live_logical_page: 0,
            index_write_logical_page: 0,
            index_record_count: 0,
        })
    }

    pub fn open(&mut self, mode: OpenMode) -> Result<(), Error> {
        self.data_storage.open(mode).map_err(Error::from_storage)?;
        if let Some(storage) = self.index_storage.as_mut() {
            storage.open(mode).map_err(Error::from_storage)?;
        }
        if let Some(var) = self.var.as_mut() {
            var.open(mode)?;
        }
        self.consistency.open(mode)?;
        if mode != OpenMode::TruncateReadWrite {
            self.recover()?;
        }
        Ok(())
    }

    /// A page's header decodes to something structurally plausible: a
    /// nonzero record count that doesn't exceed what the layout can hold.
    /// Blank/erased media (all-zero or all-one fill bytes alike) fails this
    /// check, which is what lets `recover` tell a genuinely sealed page
    /// apart from one that was never written.
    fn header_is_plausible(&self, record_count: u16) -> bool {
        record_count > 0 && record_count as usize <= self.layout.records_per_page
    }

    /// Rebuild in-memory state from what's already on disk: the highest
    /// sealed logical page and the spline anchors for every still-live page
    /// (spec.md §3's lifecycle, "rebuilds spline from persisted pages if
    /// EMBEDDB_RESET_DATA absent"), then reinstates the consistency tail's
    /// shadow into the write buffer if it's newer than the last sealed page
    /// (spec.md §4.C).
    fn recover(&mut self) -> Result<(), Error> {
        let page_size = self.config.page_size;
        let num_data_pages = self.config.num_data_pages;

        let mut max_logical: Option<u32> = None;
        for physical in 0..num_data_pages {
            self.data_storage
                .read(self.buffers.read_mut(), physical, page_size)
                .map_err(Error::from_storage)?;
            let header = DataPageHeader::<D>::decode(&self.layout, self.buffers.read());
            if !self.header_is_plausible(header.record_count) {
                continue;
            }
            let newer = match max_logical {
                None => true,
                Some(m) => header.page_number > m,
            };
            if newer {
                max_logical = Some(header.page_number);
            }
        }

        if let Some(newest) = max_logical {
            self.write_logical_page = newest + 1;
            self.oldest_live_logical_page = self.write_logical_page.saturating_sub(num_data_pages);

            for logical in self.oldest_live_logical_page..=newest {
                let physical = logical % num_data_pages;
                self.data_storage
                    .read(self.buffers.read_mut(), physical, page_size)
                    .map_err(Error::from_storage)?;
                let header = DataPageHeader::<D>::decode(&self.layout, self.buffers.read());
                if header.page_number != logical || !self.header_is_plausible(header.record_count) {
                    continue;
                }
                let (first_key, _, _) =
                    page::read_record::<K, D>(&self.layout, self.buffers.read(), 0);
                self.spline.add(first_key, logical);
                if logical == newest {
                    let (last_key, _, _) = page::read_record::<K, D>(
                        &self.layout,
                        self.buffers.read(),
                        header.record_count as usize - 1,
                    );
                    self.last_key = Some(last_key);
                }
            }

            self.write_header = DataPageHeader::new(self.write_logical_page);
            self.write_first_key = None;
        }

        // The index ring itself is intentionally not replayed here: spec.md's
        // lifecycle only names the spline and the consistency tail as things
        // `init` rebuilds. Index summaries for already-live data pages that
        // hadn't reached a sealed index page yet are lost across a reopen,
        // but `Store::read_summary_for_page` already treats a missing or
        // mismatched summary as "fall back to reading the data page", so
        // resuming with `index_write_logical_page` at its default degrades
        // range-query pruning for those specific pages rather than answering
        // incorrectly.

        if let Some(slots) = self.consistency.recover(page_size)? {
            let records_per_page = self.layout.records_per_page;
            let mut best: Option<(u32, DataPageHeader<D>)> = None;
            for (slot, raw) in slots.iter().enumerate() {
                let header = DataPageHeader::<D>::decode(&self.layout, raw);
                if header.record_count == 0 || header.record_count as usize > records_per_page {
                    continue;
                }
                let newer = match &best {
                    None => true,
                    Some((_, best_header)) => header.page_number > best_header.page_number,
                };
                if newer {
                    best = Some((slot as u32, header));
                }
            }
            if let Some((slot, header)) = best {
                let already_sealed = match max_logical {
                    Some(m) => header.page_number <= m,
                    None => false,
                };
                if !already_sealed {
                    self.buffers.write_mut().copy_from_slice(&slots[slot as usize]);
                    self.write_header = header;
                    self.write_logical_page = header.page_number;
                    self.oldest_live_logical_page =
                        self.write_logical_page.saturating_sub(num_data_pages);
                    let (first_key, _, _) =
                        page::read_record::<K, D>(&self.layout, self.buffers.write(), 0);
                    self.write_first_key = Some(first_key);
                    let (last_key, _, _) = page::read_record::<K, D>(
                        &self.layout,
                        self.buffers.write(),
                        header.record_count as usize - 1,
                    );
                    self.last_key = Some(last_key);
                    self.consistency.resume_at(slot);
                }
            }
        }

        Ok(())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.data_storage.close().map_err(Error::from_storage)?;
        if let Some(storage) = self.index_storage.as_mut() {
            storage.close().map_err(Error::from_storage)?;
        }
        if let Some(var) = self.var.as_mut() {
            var.close()?;
        }
        self.consistency.close()?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn oldest_live_logical_page(&self) -> u32 {
        self.oldest_live_logical_page
    }

    pub fn write_logical_page(&self) -> u32 {
        self.write_logical_page
    }

    pub fn write_record_count(&self) -> usize {
        self.write_header.record_count as usize
    }

    pub(crate) fn write_buffer(&self) -> &[u8] {
        self.buffers.write()
    }

    pub(crate) fn read_buffer_mut(&mut self) -> &mut [u8] {
        self.buffers.read_mut()
    }

    /// Insert one record. Keys must be strictly greater than the last one
    /// inserted (spec.md §8 invariant 1); `var_payload`, if given, is
    /// appended to the variable-data log and the returned address embedded
    /// in the fixed record.
    pub fn put(&mut self, key: K, data: D, var_payload: Option<&[u8]>) -> Result<(), Error> {
        if let Some(last) = self.last_key {
            if key <= last {
                return Err(Error::KeyOrderViolation);
            }
        }

        let var_address = match (var_payload, self.var.as_mut()) {
            (Some(bytes), Some(var)) => {
                let buf = self.buffers.var_write_mut()?;
                Some(var.put_var(buf, bytes)?)
            }
            (Some(_), None) => return Err(Error::ResourceExhaustion),
            (None, _) => None,
        };

        let idx = self.write_header.record_count as usize;
        page::write_record::<K, D>(&self.layout, self.buffers.write_mut(), idx, key, data, var_address);

        let first = self.write_header.record_count == 0;
        if first {
            self.write_first_key = Some(key);
        }
        self.write_header.record_count += 1;

        let bitmap_bit = self.bitmap_strategy.hash(&data) & self.config.bitmap_mask();
        self.write_header.bitmap |= bitmap_bit;
        if first {
            self.write_header.min_data = data;
            self.write_header.max_data = data;
        } else {
            if data < self.write_header.min_data {
                self.write_header.min_data = data;
            }
            if data > self.write_header.max_data {
                self.write_header.max_data = data;
            }
        }

        self.last_key = Some(key);
        self.consistency.record_appended();
        if self.consistency.is_enabled() {
            self.write_header.encode(&self.layout, self.buffers.write_mut());
            self.consistency
                .shadow(self.buffers.write(), self.config.page_size)?;
        }

        if self.write_header.record_count as usize == self.layout.records_per_page {
            self.seal_write_page()?;
        }
        Ok(())
    }

    fn seal_write_page(&mut self) -> Result<(), Error> {
        let page_size = self.config.page_size;
        self.write_header.encode(&self.layout, self.buffers.write_mut());
        let physical = self.write_logical_page % self.config.num_data_pages;

        if self.write_logical_page >= self.config.num_data_pages {
            let group = self.config.erase_size_in_pages;
            if physical % group == 0 {
                self.data_storage
                    .erase(physical, physical + group, page_size)
                    .map_err(Error::from_storage)?;
            }
        }

        self.data_storage
            .write(self.buffers.write(), physical, page_size)
            .map_err(Error::from_storage)?;

        if let Some(first_key) = self.write_first_key {
            self.spline.add(first_key, self.write_logical_page);
        }

        if self.config.parameters.contains(Parameters::USE_BMAP)
            && self.config.parameters.contains(Parameters::USE_INDEX)
        {
            let summary = Summary {
                bitmap: self.write_header.bitmap,
                min_data: self.write_header.min_data,
                max_data: self.write_header.max_data,
                logical_page: self.write_logical_page,
            };
            self.append_index_summary(summary)?;
        }

        self.consistency.mark_sealed();
        self.consistency.reset_for_next_page();

        self.write_logical_page += 1;
        self.write_header = DataPageHeader::new(self.write_logical_page);
        self.write_first_key = None;
        self.oldest_live_logical_page = self
            .write_logical_page
            .saturating_sub(self.config.num_data_pages);
        Ok(())
    }

    fn append_index_summary(&mut self, summary: Summary<D>) -> Result<(), Error> {
        let idx = self.index_record_count as usize;
        let layout = self.layout;
        page::write_summary(&layout, self.buffers.index_write_mut()?, idx, &summary);
        self.index_record_count += 1;
        if self.index_record_count as usize == self.layout.summaries_per_index_page {
            self.seal_index_page()?;
        }
        Ok(())
    }

    fn seal_index_page(&mut self) -> Result<(), Error> {
        page::write_index_page_number(self.buffers.index_write_mut()?, self.index_write_logical_page);
        let physical = self.index_write_logical_page % self.config.num_index_pages;
        let page_size = self.config.page_size;
        let buf = self.buffers.index_write_mut()?;
        self.index_storage
            .as_mut()
            .expect("append_index_summary only runs when USE_INDEX is set")
            .write(buf, physical, page_size)
            .map_err(Error::from_storage)?;
        self.index_write_logical_page += 1;
        self.index_record_count = 0;
        Ok(())
    }

    /// Look up a single record by key.
    pub fn get(&mut self, key: K) -> Result<D, Error> {
        for i in 0..self.write_header.record_count as usize {
            let (k, d, _) = page::read_record::<K, D>(&self.layout, self.buffers.write(), i);
            if k == key {
                return Ok(d);
            }
        }

        let Some((low, high)) = self.spline.predict(key, self.oldest_live_logical_page) else {
            return Err(Error::NotFound);
        };
        let low = low.max(self.oldest_live_logical_page);
        let high = high.min(self.write_logical_page.saturating_sub(1).max(self.oldest_live_logical_page));
        if self.write_logical_page == 0 || low > high {
            return Err(Error::NotFound);
        }

        for logical in low..=high {
            let physical = logical % self.config.num_data_pages;
            self.data_storage
                .read(self.buffers.read_mut(), physical, self.config.page_size)
                .map_err(Error::from_storage)?;
            let header = DataPageHeader::<D>::decode(&self.layout, self.buffers.read());
            if header.page_number != logical {
                continue;
            }
            for i in 0..header.record_count as usize {
                let (k, d, _) = page::read_record::<K, D>(&self.layout, self.buffers.read(), i);
                if k == key {
                    return Ok(d);
                }
            }
        }
        Err(Error::NotFound)
    }

    /// Fetch the variable-data address recorded alongside `key`, if any.
    pub fn get_var_address(&mut self, key: K) -> Result<Option<u64>, Error> {
        for i in 0..self.write_header.record_count as usize {
            let (k, _, addr) = page::read_record::<K, D>(&self.layout, self.buffers.write(), i);
            if k == key {
                return Ok(addr);
            }
        }

        let Some((low, high)) = self.spline.predict(key, self.oldest_live_logical_page) else {
            return Err(Error::NotFound);
        };
        let low = low.max(self.oldest_live_logical_page);
        let high = high.min(self.write_logical_page.saturating_sub(1).max(self.oldest_live_logical_page));
        if self.write_logical_page == 0 || low > high {
            return Err(Error::NotFound);
        }
        for logical in low..=high {
            let physical = logical % self.config.num_data_pages;
            self.data_storage
                .read(self.buffers.read_mut(), physical, self.config.page_size)
                .map_err(Error::from_storage)?;
            let header = DataPageHeader::<D>::decode(&self.layout, self.buffers.read());
            if header.page_number != logical {
                continue;
            }
            for i in 0..header.record_count as usize {
                let (k, _, addr) = page::read_record::<K, D>(&self.layout, self.buffers.read(), i);
                if k == key {
                    return Ok(addr);
                }
            }
        }
        Err(Error::NotFound)
    }

    pub fn open_var_stream(&self, address: u64) -> Result<VarStream, Error> {
        let var = self.var.as_ref().ok_or(Error::ResourceExhaustion)?;
        var.open_stream(address, var.write_logical_page().saturating_sub(self.config.num_var_pages))
    }

    pub fn read_var(&mut self, stream: &mut VarStream, dst: &mut [u8]) -> Result<usize, Error> {
        let oldest_live = self
            .var
            .as_ref()
            .map(|v| v.write_logical_page().saturating_sub(self.config.num_var_pages))
            .unwrap_or(0);
        let var = self.var.as_mut().ok_or(Error::ResourceExhaustion)?;
        let read_buf = self.buffers.var_read_mut()?;
        var.stream_read(stream, read_buf, dst, oldest_live)
    }

    /// Seal the in-progress write page (if non-empty) and flush every file.
    pub fn flush(&mut self) -> Result<(), Error> {
        if self.write_header.record_count > 0 {
            self.seal_write_page()?;
        }
        if let Some(var) = self.var.as_mut() {
            let buf = self.buffers.var_write_mut()?;
            var.flush(buf)?;
        }
        self.data_storage.flush().map_err(Error::from_storage)?;
        if let Some(storage) = self.index_storage.as_mut() {
            storage.flush().map_err(Error::from_storage)?;
        }
        Ok(())
    }

    pub(crate) fn bitmap_strategy(&self) -> &B {
        &self.bitmap_strategy
    }

    /// Conservative (possibly too-low) starting logical page for a range
    /// scan beginning at `key`, per the spline's bounded-error prediction.
    pub(crate) fn predict_start_page(&self, key: K) -> Option<u32> {
        self.spline
            .predict(key, self.oldest_live_logical_page)
            .map(|(low, _)| low)
    }

    /// Fetch the per-page bitmap/min-max summary for `logical` from the
    /// dedicated index file when one is configured, or from the in-memory
    /// index-write buffer for a page whose summary hasn't been sealed yet
    /// (spec.md §4.E: "from the index file via index-read slot or from the
    /// index-write buffer for tail pages"). Returns `Ok(None)` when no index
    /// is configured or the summary for this page is no longer live, in
    /// which case the caller must fall back to reading the data page
    /// itself.
    pub(crate) fn read_summary_for_page(&mut self, logical: u32) -> Result<Option<Summary<D>>, Error> {
        if logical == self.write_logical_page {
            return Ok(Some(Summary {
                bitmap: self.write_header.bitmap,
                min_data: self.write_header.min_data,
                max_data: self.write_header.max_data,
                logical_page: self.write_header.page_number,
            }));
        }
        if !(self.config.parameters.contains(Parameters::USE_BMAP)
            && self.config.parameters.contains(Parameters::USE_INDEX))
        {
            return Ok(None);
        }
        let per_page = self.layout.summaries_per_index_page;
        if per_page == 0 {
            return Ok(None);
        }
        let index_logical = logical / per_page as u32;
        let slot = (logical % per_page as u32) as usize;

        if index_logical == self.index_write_logical_page {
            if slot >= self.index_record_count as usize {
                return Ok(None);
            }
            let layout = self.layout;
            let buf = self.buffers.index_write_mut()?;
            return Ok(Some(page::read_summary::<D>(&layout, buf, slot)));
        }

        let oldest_live_index = self
            .index_write_logical_page
            .saturating_sub(self.config.num_index_pages);
        if index_logical < oldest_live_index || index_logical > self.index_write_logical_page {
            return Ok(None);
        }
        let physical = index_logical % self.config.num_index_pages;
        let page_size = self.config.page_size;
        let Some(storage) = self.index_storage.as_mut() else {
            return Ok(None);
        };
        let buf = self.buffers.index_read_mut()?;
        storage
            .read(buf, physical, page_size)
            .map_err(Error::from_storage)?;
        if page::read_index_page_number(buf) != index_logical {
            return Ok(None);
        }
        let layout = self.layout;
        let summary = page::read_summary::<D>(&layout, buf, slot);
        if summary.logical_page != logical {
            return Ok(None);
        }
        Ok(Some(summary))
    }

    pub(crate) fn read_page(&mut self, logical: u32) -> Result<Option<DataPageHeader<D>>, Error> {
        if logical == self.write_logical_page {
            return Ok(Some(DataPageHeader {
                page_number: self.write_header.page_number,
                record_count: self.write_header.record_count,
                bitmap: self.write_header.bitmap,
                min_data: self.write_header.min_data,
                max_data: self.write_header.max_data,
            }));
        }
        let physical = logical % self.config.num_data_pages;
        self.data_storage
            .read(self.buffers.read_mut(), physical, self.config.page_size)
            .map_err(Error::from_storage)?;
        let header = DataPageHeader::<D>::decode(&self.layout, self.buffers.read());
        if header.page_number != logical {
            return Ok(None);
        }
        Ok(Some(header))
    }

    pub(crate) fn record_at(&self, logical: u32, idx: usize) -> (K, D, Option<u64>) {
        let buf = if logical == self.write_logical_page {
            self.buffers.write()
        } else {
            self.buffers.read()
        };
        page::read_record::<K, D>(&self.layout, buf, idx)
    }
}
