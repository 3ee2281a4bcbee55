//! An in-memory [`PageStorage`] used by `embeddb`'s own test suite, playing
//! the role the teacher's `VirtualNandFlash` plays for NAND driver tests:
//! a fixed-size, host-only stand-in for a real medium.

use crate::fmt::{debug, trace};
use crate::{ErrorType, OpenMode, PageStorage, PageStorageError, PageStorageErrorKind};

use alloc::vec;
use alloc::vec::Vec;

/// A flat, in-memory page store. `erase` overwrites the requested page range
/// with `erase_fill` (typically `0x00` or `0xFF`), mirroring how the original
/// engine's `MOCK_FILE_ERASE` back-end makes erase observable in tests even
/// though a plain desktop file has no real erase operation.
#[derive(Debug)]
pub struct MemoryPageStore {
    pages: Vec<u8>,
    page_size: u32,
    num_pages: u32,
    erase_fill: u8,
    opened: bool,
    error: bool,
    eof: bool,
}

/// Error kind returned by [`MemoryPageStore`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    NotOpen,
    OutOfBounds,
    WrongBufferLength,
}

impl PageStorageError for Error {
    fn kind(&self) -> PageStorageErrorKind {
        match self {
            Error::NotOpen => PageStorageErrorKind::Io,
            Error::OutOfBounds => PageStorageErrorKind::OutOfBounds,
            Error::WrongBufferLength => PageStorageErrorKind::NotAligned,
        }
    }
}

impl MemoryPageStore {
    /// Create a store with room for `num_pages` pages of `page_size` bytes
    /// each, erased (filled with `erase_fill`) up front.
    pub fn new(num_pages: u32, page_size: u32, erase_fill: u8) -> Self {
        MemoryPageStore {
            pages: vec![erase_fill; (num_pages as usize) * (page_size as usize)],
            page_size,
            num_pages,
            erase_fill,
            opened: false,
            error: false,
            eof: false,
        }
    }

    fn page_range(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> Result<core::ops::Range<usize>, Error> {
        if page_size != self.page_size {
            return Err(Error::WrongBufferLength);
        }
        if page_number >= self.num_pages {
            return Err(Error::OutOfBounds);
        }
        let start = page_number as usize * page_size as usize;
        Ok(start..start + page_size as usize)
    }
}

impl ErrorType for MemoryPageStore {
    type Error = Error;
}

impl PageStorage for MemoryPageStore {
    fn open(&mut self, mode: OpenMode) -> Result<(), Self::Error> {
        if mode == OpenMode::TruncateReadWrite {
            self.pages.fill(self.erase_fill);
        }
        self.opened = true;
        self.error = false;
        self.eof = false;
        trace!("mock: opened");
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.opened = false;
        Ok(())
    }

    fn read(
        &mut self,
        buffer: &mut [u8],
        page_number: u32,
        page_size: u32,
    ) -> Result<(), Self::Error> {
        if !self.opened {
            self.error = true;
            return Err(Error::NotOpen);
        }
        if buffer.len() != page_size as usize {
            self.error = true;
            return Err(Error::WrongBufferLength);
        }
        let range = match self.page_range(page_number, page_size) {
            Ok(r) => r,
            Err(e) => {
                self.eof = true;
                self.error = true;
                return Err(e);
            }
        };
        buffer.copy_from_slice(&self.pages[range]);
        Ok(())
    }

    fn write(
        &mut self,
        buffer: &[u8],
        page_number: u32,
        page_size: u32,
    ) -> Result<(), Self::Error> {
        if !self.opened {
            self.error = true;
            return Err(Error::NotOpen);
        }
        if buffer.len() != page_size as usize {
            self.error = true;
            return Err(Error::WrongBufferLength);
        }
        let range = match self.page_range(page_number, page_size) {
            Ok(r) => r,
            Err(e) => {
                self.error = true;
                return Err(e);
            }
        };
        self.pages[range].copy_from_slice(buffer);
        Ok(())
    }

    fn erase(
        &mut self,
        start_page: u32,
        end_page: u32,
        page_size: u32,
    ) -> Result<(), Self::Error> {
        if page_size != self.page_size {
            self.error = true;
            return Err(Error::WrongBufferLength);
        }
        if end_page > self.num_pages || start_page > end_page {
            self.error = true;
            return Err(Error::OutOfBounds);
        }
        debug!("mock: erasing pages {} to {}", start_page, end_page);
        let start = start_page as usize * page_size as usize;
        let end = end_page as usize * page_size as usize;
        self.pages[start..end].fill(self.erase_fill);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn error(&self) -> bool {
        self.error
    }

    fn eof(&self) -> bool {
        self.eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut store = MemoryPageStore::new(4, 16, 0xFF);
        store.open(OpenMode::TruncateReadWrite).unwrap();
        let page = [7u8; 16];
        store.write(&page, 2, 16).unwrap();
        let mut out = [0u8; 16];
        store.read(&mut out, 2, 16).unwrap();
        assert_eq!(page, out);
    }

    #[test]
    fn erase_fills_range() {
        let mut store = MemoryPageStore::new(4, 8, 0xFF);
        store.open(OpenMode::TruncateReadWrite).unwrap();
        store.write(&[1; 8], 0, 8).unwrap();
        store.write(&[2; 8], 1, 8).unwrap();
        store.erase(0, 1, 8).unwrap();
        let mut out = [0u8; 8];
        store.read(&mut out, 0, 8).unwrap();
        assert_eq!(out, [0xFF; 8]);
        store.read(&mut out, 1, 8).unwrap();
        assert_eq!(out, [2; 8]);
    }

    #[test]
    fn out_of_bounds_page_is_rejected() {
        let mut store = MemoryPageStore::new(2, 8, 0xFF);
        store.open(OpenMode::TruncateReadWrite).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(store.read(&mut out, 5, 8), Err(Error::OutOfBounds));
        assert!(store.error());
    }
}
