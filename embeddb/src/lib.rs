//! An embedded, append-only, time-series key-value storage engine for
//! resource-constrained devices.
//!
//! The engine is built from the pieces spec.md's components map onto:
//! a page buffer pool ([`buffer`]), a paged record store with range
//! scanning ([`store`], [`iter`]), a bounded-error spline learned index
//! ([`spline`]) that narrows every lookup to a handful of candidate pages,
//! a per-page bitmap/min-max summary ([`bitmap`]) that lets range scans
//! skip whole pages, a circular variable-data log for payloads that don't
//! fit in a fixed-width record ([`vardata`]), and an optional record-level
//! consistency tail ([`consistency`]) that shadows the active write page so
//! a crash never loses an acknowledged `put`.
//!
//! Every file the engine touches — data, index, variable-data, and the
//! consistency tail — is a separate [`embeddb_storage::PageStorage`]
//! instance, so callers can back them with anything from a RAM disk to
//! raw NAND.

#![no_std]

extern crate alloc;

mod buffer;
mod fmt;
mod page;
mod store;

pub mod bitmap;
pub mod config;
pub mod error;
pub mod iter;
pub mod record;
pub mod spline;
pub mod consistency;
pub mod vardata;

pub use bitmap::{BitmapStrategy, BucketStrategy, Summary};
pub use config::{Config, Parameters};
pub use error::{Error, Status};
pub use iter::{RangeIter, RangeQuery};
pub use record::{DataValue, Key};
pub use vardata::VarStream;

use embeddb_storage::{OpenMode, PageStorage};

use crate::fmt::info;
use crate::store::Store;

/// Handle to one instance of the engine, parameterized by:
/// - `K`: the fixed-width, strictly-ordered key type,
/// - `D`: the fixed-width data value type,
/// - `S`: the pluggable page storage capability backing every file,
/// - `B`: the caller's bitmap strategy for `D`.
pub struct EmbedDB<K: Key, D: DataValue, S: PageStorage, B: BitmapStrategy<D>> {
    store: Store<K, D, S, B>,
}

impl<K: Key, D: DataValue, S: PageStorage, B: BitmapStrategy<D>> EmbedDB<K, D, S, B> {
    /// Bring up an instance. `data_storage` is required; `index_storage`
    /// must be `Some` iff [`Parameters::USE_INDEX`] is set, `var_storage`
    /// iff [`Parameters::USE_VDATA`] is set, and `tail_storage` iff
    /// [`Parameters::RECORD_LEVEL_CONSISTENCY`] is set. Opens every file in
    /// truncate mode when [`Parameters::RESET_DATA`] is set, otherwise in
    /// plain read-write mode and rebuilds the spline from whatever data
    /// pages are already live, reinstating the consistency tail's shadow
    /// into the write buffer if it's newer than the last sealed page
    /// (spec.md §3's lifecycle: "Init either starts a fresh instance or
    /// attaches to one already on disk... rebuilds spline from persisted
    /// pages if EMBEDDB_RESET_DATA absent").
    pub fn init(
        config: Config,
        bitmap_strategy: B,
        data_storage: S,
        index_storage: Option<S>,
        var_storage: Option<S>,
        tail_storage: Option<S>,
    ) -> Result<Self, Error> {
        let mut store = Store::new(
            config,
            bitmap_strategy,
            data_storage,
            index_storage,
            var_storage,
            tail_storage,
        )?;
        let mode = if store.config().parameters.contains(Parameters::RESET_DATA) {
            OpenMode::TruncateReadWrite
        } else {
            OpenMode::ReadWrite
        };
        store.open(mode)?;
        info!("embeddb initialized");
        Ok(EmbedDB { store })
    }

    /// Insert a fixed-width record. `key` must be strictly greater than the
    /// last key inserted.
    pub fn put(&mut self, key: K, data: D) -> Result<(), Error> {
        self.store.put(key, data, None)
    }

    /// Insert a record together with a variable-length payload, appended to
    /// the variable-data log and referenced from the fixed record.
    pub fn put_var(&mut self, key: K, data: D, payload: &[u8]) -> Result<(), Error> {
        self.store.put(key, data, Some(payload))
    }

    /// Look up the fixed-width data value stored for `key`.
    pub fn get(&mut self, key: K) -> Result<D, Error> {
        self.store.get(key)
    }

    /// Open a streaming reader over the variable-length payload stored
    /// alongside `key`, or `Ok(None)` if that record has no variable data.
    pub fn get_var(&mut self, key: K) -> Result<Option<VarStream>, Error> {
        match self.store.get_var_address(key)? {
            Some(address) => Ok(Some(self.store.open_var_stream(address)?)),
            None => Ok(None),
        }
    }

    /// Pull the next chunk of `stream`'s payload into `dst`.
    pub fn read_var(&mut self, stream: &mut VarStream, dst: &mut [u8]) -> Result<usize, Error> {
        self.store.read_var(stream, dst)
    }

    /// Scan records matching `query` in ascending key order.
    pub fn range(&mut self, query: RangeQuery<K, D>) -> RangeIter<'_, K, D, S, B> {
        RangeIter::new(&mut self.store, query)
    }

    /// Seal the in-progress write page, if any, and flush every file.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.store.flush()
    }

    /// Flush and release every underlying storage handle.
    pub fn close(mut self) -> Result<(), Error> {
        self.store.flush()?;
        self.store.close()
    }
}
