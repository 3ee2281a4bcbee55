//! Error taxonomy (spec.md §7).

use embeddb_storage::{PageStorageError, PageStorageErrorKind};

/// Every fallible engine operation returns this.
#[derive(Debug, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// `put` was called with a key strictly less than the last inserted key.
    #[error("key is out of order with respect to the last inserted key")]
    KeyOrderViolation,
    /// The underlying `PageStorage` reported a failure.
    #[error("storage I/O failure")]
    Io,
    /// `get` found no record for the requested key.
    #[error("no record for the requested key")]
    NotFound,
    /// `init` could not allocate/size the buffers its configuration demands.
    #[error("insufficient buffers or invalid configuration")]
    ResourceExhaustion,
    /// A variable-data stream referenced a page that the var-data ring has
    /// since overwritten.
    #[error("referenced variable-data chunk has been evicted")]
    VarChunkEvicted,
}

impl Error {
    pub(crate) fn from_storage<E: PageStorageError>(e: E) -> Self {
        match e.kind() {
            PageStorageErrorKind::Io
            | PageStorageErrorKind::NotAligned
            | PageStorageErrorKind::OutOfBounds
            | PageStorageErrorKind::Other => Error::Io,
        }
    }
}

/// An `i8`-style status code, for call sites that want the original C API's
/// "every call returns 0 on success" convention alongside `Result`.
///
/// Recoverable outcomes (`NotFound`, `VarChunkEvicted`) get their own codes;
/// everything else that can happen on the put/flush path collapses to a
/// single nonzero failure code, per spec.md §7: "Non-recoverable errors...
/// are surfaced to the caller immediately; the engine makes no attempt to
/// retry."
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(i8)]
pub enum Status {
    Ok = 0,
    KeyOrderViolation = 1,
    Io = 2,
    NotFound = 3,
    ResourceExhaustion = 4,
    VarChunkEvicted = 5,
}

impl<T> From<&Result<T, Error>> for Status {
    fn from(r: &Result<T, Error>) -> Self {
        match r {
            Ok(_) => Status::Ok,
            Err(Error::KeyOrderViolation) => Status::KeyOrderViolation,
            Err(Error::Io) => Status::Io,
            Err(Error::NotFound) => Status::NotFound,
            Err(Error::ResourceExhaustion) => Status::ResourceExhaustion,
            Err(Error::VarChunkEvicted) => Status::VarChunkEvicted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_success_to_zero() {
        let r: Result<(), Error> = Ok(());
        assert_eq!(Status::from(&r), Status::Ok);
        assert_eq!(Status::Ok as i8, 0);
    }

    #[test]
    fn status_maps_each_error_distinctly() {
        let r: Result<(), Error> = Err(Error::NotFound);
        assert_eq!(Status::from(&r), Status::NotFound);
        let r: Result<(), Error> = Err(Error::VarChunkEvicted);
        assert_eq!(Status::from(&r), Status::VarChunkEvicted);
    }
}
