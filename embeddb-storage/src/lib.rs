#![no_std]
//! Capability abstraction over a page-granular block storage back-end.
//!
//! `embeddb` never talks to an SD card, a raw data-flash chip, or a desktop
//! file directly. It only knows about [`PageStorage`]: read/write/erase a
//! whole page at a time, flush, and query error/eof state. Concrete adapters
//! (an SD card driver, a data-flash chip driver, a host file wrapper) live
//! outside this crate entirely; [`mock`] provides the one in-memory
//! implementation this workspace needs for its own test suite.

extern crate alloc;

mod fmt;
pub mod mock;

/// Errors returned by a [`PageStorage`] implementation map onto one of these
/// kinds so `embeddb` can react uniformly regardless of back-end.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum PageStorageErrorKind {
    /// The offset or length passed to an operation was not page-aligned.
    NotAligned,
    /// The offset or length passed to an operation was out of bounds.
    OutOfBounds,
    /// The underlying medium reported a read/write/erase/flush failure.
    Io,
    /// Back-end specific failure that doesn't map onto the above.
    Other,
}

/// A [`PageStorage::Error`] must be able to classify itself.
pub trait PageStorageError: core::fmt::Debug {
    fn kind(&self) -> PageStorageErrorKind;
}

/// Associates a [`PageStorage`] implementation with its error type.
pub trait ErrorType {
    type Error: PageStorageError;
}

/// Mode passed to [`PageStorage::open`], mirroring the two modes the engine
/// ever requests: start fresh, or resume what's already on the medium.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpenMode {
    /// Truncate (or erase) and open for read/write. Used when the
    /// `RESET_DATA` parameter is set.
    TruncateReadWrite,
    /// Open for read/write, preserving existing contents.
    ReadWrite,
}

/// A page-granular block storage back-end.
///
/// Every operation is addressed in whole pages; `page_size` is passed on each
/// call rather than fixed as an associated constant, since it is a runtime
/// `Config` field, not something this crate's types can know about at
/// compile time. Implementations are never assumed to give atomicity beyond
/// a single page write, and `erase` is free to be a no-op on media that
/// don't require one before a rewrite.
pub trait PageStorage: ErrorType {
    /// Open the backing medium. Must be called exactly once before any other
    /// method.
    fn open(&mut self, mode: OpenMode) -> Result<(), Self::Error>;

    /// Close the backing medium. No further calls are made afterwards.
    fn close(&mut self) -> Result<(), Self::Error>;

    /// Read exactly one page of `page_size` bytes at logical `page_number`
    /// into `buffer`. `buffer.len()` must equal `page_size`.
    fn read(
        &mut self,
        buffer: &mut [u8],
        page_number: u32,
        page_size: u32,
    ) -> Result<(), Self::Error>;

    /// Write exactly one page of `page_size` bytes at logical `page_number`
    /// from `buffer`. `buffer.len()` must equal `page_size`.
    fn write(
        &mut self,
        buffer: &[u8],
        page_number: u32,
        page_size: u32,
    ) -> Result<(), Self::Error>;

    /// Erase pages `[start_page, end_page)`. May be a no-op on media that do
    /// not require an explicit erase before rewrite.
    fn erase(&mut self, start_page: u32, end_page: u32, page_size: u32) -> Result<(), Self::Error>;

    /// Flush any host-side buffering so previously written pages are durable.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Whether the last operation left the medium in an error state.
    fn error(&self) -> bool;

    /// Whether the last read ran past the end of the medium.
    fn eof(&self) -> bool;
}
