//! Record-level consistency tail (spec.md §3's component G): an optional
//! per-insert shadow of the active write page, so a reader recovering after
//! a crash can see every record that was ever appended to the in-memory
//! write buffer, not just the ones that made it into a sealed page.
//!
//! Only active when [`crate::config::Parameters::RECORD_LEVEL_CONSISTENCY`]
//! is set; otherwise `shadow` is a no-op and the state machine never leaves
//! `Empty`.

use alloc::vec;
use alloc::vec::Vec;

use embeddb_storage::{OpenMode, PageStorage};

use crate::error::Error;

/// The four states a write page's shadow can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// Write page has no records yet; nothing to shadow.
    Empty,
    /// Write page holds records, but no shadow copy has been persisted —
    /// a crash here loses them.
    Partial,
    /// Write page holds records and a matching shadow copy is durable.
    PartialWithTail,
    /// Write page has been sealed into the primary store; the shadow is
    /// about to be reset for the next page.
    Sealed,
}

/// Double-buffered shadow of the active write page. Two physical slots are
/// used so the previous page's shadow stays intact until the new page's
/// first shadow write lands in the other slot.
pub struct ConsistencyTail<S: PageStorage> {
    storage: Option<S>,
    physical_page: u32,
    state: TailState,
}

impl<S: PageStorage> ConsistencyTail<S> {
    /// `storage` is `None` when `RECORD_LEVEL_CONSISTENCY` is disabled.
    pub fn new(storage: Option<S>) -> Self {
        ConsistencyTail {
            storage,
            physical_page: 0,
            state: TailState::Empty,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.storage.is_some()
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    pub fn open(&mut self, mode: OpenMode) -> Result<(), Error> {
        if let Some(storage) = self.storage.as_mut() {
            storage.open(mode).map_err(Error::from_storage)?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        if let Some(storage) = self.storage.as_mut() {
            storage.close().map_err(Error::from_storage)?;
        }
        Ok(())
    }

    /// Call once a record has been appended to the write page's in-memory
    /// buffer, before any shadow write.
    pub fn record_appended(&mut self) {
        if self.storage.is_some() && self.state == TailState::Empty {
            self.state = TailState::Partial;
        }
    }

    /// Persist a shadow copy of the write page as it stands right now. A
    /// no-op when the tail is disabled.
    pub fn shadow(&mut self, write_buf: &[u8], page_size: u32) -> Result<(), Error> {
        let Some(storage) = self.storage.as_mut() else {
            return Ok(());
        };
        storage
            .write(write_buf, self.physical_page, page_size)
            .map_err(Error::from_storage)?;
        storage.flush().map_err(Error::from_storage)?;
        self.state = TailState::PartialWithTail;
        Ok(())
    }

    /// The write page has just been sealed into the primary store.
    pub fn mark_sealed(&mut self) {
        if self.storage.is_some() {
            self.state = TailState::Sealed;
        }
    }

    /// Flip to the other shadow slot and reset for the next write page.
    pub fn reset_for_next_page(&mut self) {
        if self.storage.is_some() {
            self.physical_page ^= 1;
            self.state = TailState::Empty;
        }
    }

    /// On reopen (spec.md §4.C: "the tail is examined; if newer than the
    /// last sealed page, its records are reinstated into the write
    /// buffer"), read both shadow slots' raw bytes back (each exactly
    /// `page_size` long), or `None` if the tail is disabled. A slot this
    /// instance never wrote reads back as whatever the storage's
    /// blank/erased pattern is, so validating the decoded header (the
    /// record-count bound, in particular) is left to the caller, which
    /// knows the record layout this tail doesn't.
    pub fn recover(&mut self, page_size: u32) -> Result<Option<[Vec<u8>; 2]>, Error> {
        let Some(storage) = self.storage.as_mut() else {
            return Ok(None);
        };
        let mut slot0 = vec![0u8; page_size as usize];
        let mut slot1 = vec![0u8; page_size as usize];
        storage
            .read(&mut slot0, 0, page_size)
            .map_err(Error::from_storage)?;
        storage
            .read(&mut slot1, 1, page_size)
            .map_err(Error::from_storage)?;
        Ok(Some([slot0, slot1]))
    }

    /// Commit to resuming through `slot`, in `PartialWithTail` — the caller
    /// has just decided this slot holds a page worth continuing to shadow.
    pub fn resume_at(&mut self, slot: u32) {
        if self.storage.is_some() {
            self.physical_page = slot;
            self.state = TailState::PartialWithTail;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embeddb_storage::mock::MemoryPageStore;

    fn enabled_tail() -> ConsistencyTail<MemoryPageStore> {
        let storage = MemoryPageStore::new(2, 32, 0);
        let mut tail = ConsistencyTail::new(Some(storage));
        tail.open(OpenMode::TruncateReadWrite).unwrap();
        tail
    }

    #[test]
    fn disabled_tail_never_leaves_empty() {
        let mut tail = ConsistencyTail::<MemoryPageStore>::new(None);
        tail.record_appended();
        assert_eq!(tail.state(), TailState::Empty);
        assert!(!tail.is_enabled());
    }

    #[test]
    fn enabled_tail_walks_the_full_state_machine() {
        let mut tail = enabled_tail();
        assert_eq!(tail.state(), TailState::Empty);

        tail.record_appended();
        assert_eq!(tail.state(), TailState::Partial);

        let buf = [0u8; 32];
        tail.shadow(&buf, 32).unwrap();
        assert_eq!(tail.state(), TailState::PartialWithTail);

        tail.mark_sealed();
        assert_eq!(tail.state(), TailState::Sealed);

        tail.reset_for_next_page();
        assert_eq!(tail.state(), TailState::Empty);
    }

    #[test]
    fn shadow_slot_alternates_across_pages() {
        let mut tail = enabled_tail();
        let buf = [1u8; 32];
        tail.record_appended();
        tail.shadow(&buf, 32).unwrap();
        tail.mark_sealed();
        let first_slot = tail.physical_page;
        tail.reset_for_next_page();
        assert_ne!(tail.physical_page, first_slot);
    }
}
