//! Page buffer pool (spec.md §3's component B).
//!
//! One fixed-size buffer per role, allocated once in `init` and reused for
//! the life of the instance — no allocation on the put/get/iterate hot path.
//! Mirrors the teacher's `VirtualNandFlash` fixed backing store in spirit:
//! size everything up front, reject what doesn't fit at construction time
//! rather than failing deep in an operation.

use alloc::vec;
use alloc::vec::Vec;

use crate::config::Parameters;
use crate::error::Error;

/// The six buffer roles a fully-configured instance may need. Index and
/// var-data roles are only allocated when their `Parameters` bit is set.
pub struct BufferPool {
    page_size: u32,
    write: Vec<u8>,
    read: Vec<u8>,
    index_write: Option<Vec<u8>>,
    index_read: Option<Vec<u8>>,
    var_write: Option<Vec<u8>>,
    var_read: Option<Vec<u8>>,
}

impl BufferPool {
    pub fn new(page_size: u32, parameters: Parameters) -> Result<Self, Error> {
        if page_size == 0 {
            return Err(Error::ResourceExhaustion);
        }
        let page_size_usize = page_size as usize;
        let make = || vec![0u8; page_size_usize];

        Ok(BufferPool {
            page_size,
            write: make(),
            read: make(),
            index_write: parameters.contains(Parameters::USE_INDEX).then(make),
            index_read: parameters.contains(Parameters::USE_INDEX).then(make),
            var_write: parameters.contains(Parameters::USE_VDATA).then(make),
            var_read: parameters.contains(Parameters::USE_VDATA).then(make),
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn write(&self) -> &[u8] {
        &self.write
    }

    pub fn write_mut(&mut self) -> &mut [u8] {
        &mut self.write
    }

    pub fn read(&self) -> &[u8] {
        &self.read
    }

    pub fn read_mut(&mut self) -> &mut [u8] {
        &mut self.read
    }

    pub fn index_write_mut(&mut self) -> Result<&mut [u8], Error> {
        self.index_write
            .as_mut()
            .map(|v| v.as_mut_slice())
            .ok_or(Error::ResourceExhaustion)
    }

    pub fn index_read_mut(&mut self) -> Result<&mut [u8], Error> {
        self.index_read
            .as_mut()
            .map(|v| v.as_mut_slice())
            .ok_or(Error::ResourceExhaustion)
    }

    pub fn var_write_mut(&mut self) -> Result<&mut [u8], Error> {
        self.var_write
            .as_mut()
            .map(|v| v.as_mut_slice())
            .ok_or(Error::ResourceExhaustion)
    }

    pub fn var_read_mut(&mut self) -> Result<&mut [u8], Error> {
        self.var_read
            .as_mut()
            .map(|v| v.as_mut_slice())
            .ok_or(Error::ResourceExhaustion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_only_enabled_roles() {
        let pool = BufferPool::new(512, Parameters::empty()).unwrap();
        assert_eq!(pool.write().len(), 512);
        assert_eq!(pool.read().len(), 512);
    }

    fn check_missing_role_is_resource_exhaustion() {
        let mut pool = BufferPool::new(512, Parameters::empty()).unwrap();
        assert!(matches!(
            pool.index_write_mut(),
            Err(Error::ResourceExhaustion)
        ));
    }

    #[test]
    fn index_roles_allocated_when_requested() {
        let mut pool = BufferPool::new(512, Parameters::USE_INDEX).unwrap();
        assert_eq!(pool.index_write_mut().unwrap().len(), 512);
        check_missing_role_is_resource_exhaustion();
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(matches!(
            BufferPool::new(0, Parameters::empty()),
            Err(Error::ResourceExhaustion)
        ));
    }
}
