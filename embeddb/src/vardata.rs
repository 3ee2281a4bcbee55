//! Variable-data log (spec.md §3's component F): a circular log of
//! length-prefixed chunks, written through the same `PageStorage` capability
//! as the data and index files but kept as its own ring.
//!
//! A `put`'s variable payload is encoded as `[u32 length][bytes]` and may
//! span any number of pages; the returned address packs the logical page a
//! chunk starts in together with its byte offset in that page, so a later
//! [`VarStream`] can resume reading from exactly that point. Each page's
//! header also records the offset of the first *new* chunk that begins in
//! it (`first_chunk_offset`), so a reader that only has a page number can
//! find a valid chunk boundary without walking backward through
//! continuations — spec.md §3's "streaming reader spanning pages".

use alloc::vec::Vec;

use embeddb_storage::{OpenMode, PageStorage};

use crate::error::Error;
use crate::page::VarPageHeader;

const VAR_HEADER_SIZE: usize = 10;

fn pack_address(logical_page: u32, offset: u16) -> u64 {
    ((logical_page as u64) << 32) | offset as u64
}

fn unpack_address(address: u64) -> (u32, u16) {
    ((address >> 32) as u32, (address & 0xFFFF) as u16)
}

/// Owns the var-data file's `PageStorage` and the writer's cursor state.
pub struct VarDataLog<S: PageStorage> {
    storage: S,
    page_size: u32,
    ring_pages: u32,
    write_logical_page: u32,
    write_offset: usize,
    pending_new_chunk_offset: Option<u16>,
    prev_logical_page: Option<u32>,
}

impl<S: PageStorage> VarDataLog<S> {
    pub fn new(storage: S, page_size: u32, ring_pages: u32) -> Self {
        VarDataLog {
            storage,
            page_size,
            ring_pages: ring_pages.max(1),
            write_logical_page: 0,
            write_offset: VAR_HEADER_SIZE,
            pending_new_chunk_offset: None,
            prev_logical_page: None,
        }
    }

    pub fn open(&mut self, mode: OpenMode) -> Result<(), Error> {
        self.storage.open(mode).map_err(Error::from_storage)
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.storage.close().map_err(Error::from_storage)
    }

    fn physical(&self, logical: u32) -> u32 {
        logical % self.ring_pages
    }

    /// Logical page number of the page currently being filled, i.e. the
    /// oldest var page that must stay live for every address returned by
    /// `put_var` so far that hasn't been consumed yet.
    pub fn write_logical_page(&self) -> u32 {
        self.write_logical_page
    }

    /// Append one length-prefixed chunk, writing sealed pages through
    /// `write_buf` (exactly `page_size` bytes — typically
    /// `BufferPool::var_write_mut()`). Returns the address to embed in the
    /// record that owns this payload.
    pub fn put_var(&mut self, write_buf: &mut [u8], data: &[u8]) -> Result<u64, Error> {
        let start_page = self.write_logical_page;
        let start_offset = self.write_offset as u16;
        if self.pending_new_chunk_offset.is_none() {
            self.pending_new_chunk_offset = Some(start_offset);
        }

        let mut payload = Vec::with_capacity(4 + data.len());
        payload.extend_from_slice(&(data.len() as u32).to_ne_bytes());
        payload.extend_from_slice(data);

        let mut src_off = 0usize;
        while src_off < payload.len() {
            let space = self.page_size as usize - self.write_offset;
            let n = space.min(payload.len() - src_off);
            write_buf[self.write_offset..self.write_offset + n]
                .copy_from_slice(&payload[src_off..src_off + n]);
            self.write_offset += n;
            src_off += n;
            if self.write_offset == self.page_size as usize {
                self.seal_write_page(write_buf)?;
            }
        }

        Ok(pack_address(start_page, start_offset))
    }

    fn seal_write_page(&mut self, write_buf: &mut [u8]) -> Result<(), Error> {
        let header = VarPageHeader {
            page_number: self.write_logical_page,
            first_chunk_offset: self
                .pending_new_chunk_offset
                .unwrap_or(self.page_size as u16),
            prev_var_page: self.prev_logical_page.unwrap_or(self.write_logical_page),
        };
        header.encode(write_buf);
        let physical = self.physical(self.write_logical_page);
        self.storage
            .write(write_buf, physical, self.page_size)
            .map_err(Error::from_storage)?;

        self.prev_logical_page = Some(self.write_logical_page);
        self.write_logical_page += 1;
        self.write_offset = VAR_HEADER_SIZE;
        self.pending_new_chunk_offset = None;
        Ok(())
    }

    /// Force the in-progress page to disk even though it isn't full yet.
    pub fn flush(&mut self, write_buf: &mut [u8]) -> Result<(), Error> {
        if self.write_offset > VAR_HEADER_SIZE {
            self.seal_write_page(write_buf)?;
        }
        self.storage.flush().map_err(Error::from_storage)
    }

    /// Open a pull-based reader at `address`, rejecting it up front if the
    /// page it starts in has already been evicted by ring wraparound.
    pub fn open_stream(&self, address: u64, oldest_live_logical_page: u32) -> Result<VarStream, Error> {
        let (page, offset) = unpack_address(address);
        if page < oldest_live_logical_page {
            return Err(Error::VarChunkEvicted);
        }
        Ok(VarStream {
            logical_page: page,
            offset: offset as usize,
            chunk_len: None,
            delivered: 0,
            loaded_page: None,
        })
    }

    fn ensure_page_loaded(
        &mut self,
        stream: &mut VarStream,
        read_buf: &mut [u8],
        oldest_live_logical_page: u32,
    ) -> Result<(), Error> {
        if stream.loaded_page == Some(stream.logical_page) {
            return Ok(());
        }
        if stream.logical_page < oldest_live_logical_page
            || stream.logical_page >= self.write_logical_page
        {
            return Err(Error::VarChunkEvicted);
        }
        let physical = self.physical(stream.logical_page);
        self.storage
            .read(read_buf, physical, self.page_size)
            .map_err(Error::from_storage)?;
        let header = VarPageHeader::decode(read_buf);
        if header.page_number != stream.logical_page {
            return Err(Error::VarChunkEvicted);
        }
        stream.loaded_page = Some(stream.logical_page);
        Ok(())
    }

    fn read_bytes_spanning(
        &mut self,
        stream: &mut VarStream,
        read_buf: &mut [u8],
        dst: &mut [u8],
        oldest_live_logical_page: u32,
    ) -> Result<(), Error> {
        let mut written = 0;
        while written < dst.len() {
            self.ensure_page_loaded(stream, read_buf, oldest_live_logical_page)?;
            let avail = self.page_size as usize - stream.offset;
            let n = avail.min(dst.len() - written);
            dst[written..written + n].copy_from_slice(&read_buf[stream.offset..stream.offset + n]);
            stream.offset += n;
            written += n;
            if stream.offset == self.page_size as usize {
                stream.logical_page += 1;
                stream.offset = VAR_HEADER_SIZE;
                stream.loaded_page = None;
            }
        }
        Ok(())
    }

    /// Pull up to `dst.len()` bytes of the current chunk's payload into
    /// `dst`, reading sealed pages through `read_buf` (typically
    /// `BufferPool::var_read_mut()`). Returns the number of bytes written,
    /// `0` once the chunk is exhausted.
    pub fn stream_read(
        &mut self,
        stream: &mut VarStream,
        read_buf: &mut [u8],
        dst: &mut [u8],
        oldest_live_logical_page: u32,
    ) -> Result<usize, Error> {
        if stream.chunk_len.is_none() {
            let mut len_bytes = [0u8; 4];
            self.read_bytes_spanning(stream, read_buf, &mut len_bytes, oldest_live_logical_page)?;
            stream.chunk_len = Some(u32::from_ne_bytes(len_bytes) as usize);
        }
        let remaining = stream.chunk_len.unwrap() - stream.delivered;
        let n = remaining.min(dst.len());
        if n == 0 {
            return Ok(0);
        }
        self.read_bytes_spanning(stream, read_buf, &mut dst[..n], oldest_live_logical_page)?;
        stream.delivered += n;
        Ok(n)
    }
}

/// Cursor over one chunk's payload, pulled page by page through
/// [`VarDataLog::stream_read`].
pub struct VarStream {
    logical_page: u32,
    offset: usize,
    chunk_len: Option<usize>,
    delivered: usize,
    loaded_page: Option<u32>,
}

impl VarStream {
    pub fn total_len(&self) -> Option<usize> {
        self.chunk_len
    }

    pub fn is_done(&self) -> bool {
        self.chunk_len.is_some_and(|len| self.delivered >= len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embeddb_storage::mock::MemoryPageStore;

    fn log(ring_pages: u32) -> VarDataLog<MemoryPageStore> {
        let storage = MemoryPageStore::new(ring_pages, 64, 0xFF);
        let mut log = VarDataLog::new(storage, 64, ring_pages);
        log.open(OpenMode::TruncateReadWrite).unwrap();
        log
    }

    #[test]
    fn small_chunk_round_trips_within_one_page() {
        let mut log = log(8);
        let mut write_buf = [0u8; 64];
        let addr = log.put_var(&mut write_buf, b"hello").unwrap();
        log.flush(&mut write_buf).unwrap();

        let mut stream = log.open_stream(addr, 0).unwrap();
        let mut read_buf = [0u8; 64];
        let mut out = [0u8; 5];
        let n = log
            .stream_read(&mut stream, &mut read_buf, &mut out, 0)
            .unwrap();
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");
        assert!(stream.is_done());
    }

    #[test]
    fn chunk_spanning_several_pages_round_trips() {
        let mut log = log(16);
        let mut write_buf = [0u8; 64];
        let payload: Vec<u8> = (0u8..200).collect();
        let addr = log.put_var(&mut write_buf, &payload).unwrap();
        log.flush(&mut write_buf).unwrap();

        let mut stream = log.open_stream(addr, 0).unwrap();
        let mut read_buf = [0u8; 64];
        let mut out = alloc::vec![0u8; payload.len()];
        let mut total = 0;
        loop {
            let n = log
                .stream_read(&mut stream, &mut read_buf, &mut out[total..], 0)
                .unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, payload.len());
        assert_eq!(out, payload);
    }

    #[test]
    fn reading_an_evicted_chunk_is_rejected() {
        let mut log = log(4);
        let mut write_buf = [0u8; 64];
        let addr = log.put_var(&mut write_buf, b"old").unwrap();
        log.flush(&mut write_buf).unwrap();

        // Oldest-live watermark has advanced past the page this chunk lives in.
        let result = log.open_stream(addr, 10);
        assert!(matches!(result, Err(Error::VarChunkEvicted)));
    }
}
