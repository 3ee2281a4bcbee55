//! Runtime configuration (spec.md §6's "Configuration struct").

use bitflags::bitflags;

bitflags! {
    /// Feature toggles (spec.md §6's `parameters` bitflags).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Parameters: u8 {
        /// Maintain the bitmap/min-max index (component E).
        const USE_BMAP = 1 << 0;
        /// Persist index-page summaries to a separate index file.
        const USE_INDEX = 1 << 1;
        /// Enable the variable-data log (component F).
        const USE_VDATA = 1 << 2;
        /// Truncate and start fresh instead of rebuilding from what's on disk.
        const RESET_DATA = 1 << 3;
        /// Shadow the active write page to a tail page on every put (component G).
        const RECORD_LEVEL_CONSISTENCY = 1 << 4;
    }
}

/// Runtime configuration for an [`crate::EmbedDB`] instance.
///
/// Every size here is fixed for the lifetime of the instance; buffers sized
/// from these fields are allocated exactly once, in `init`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Physical page size in bytes (spec.md's `pageSize`).
    pub page_size: u32,
    /// Max anchors the spline index may hold (spec.md's `numSplinePoints`).
    pub num_spline_points: u32,
    /// Page-number prediction error bound the spline is built to respect.
    pub spline_max_error: u32,
    /// Width of the per-page bitmap summary, in bytes (1-8).
    pub bitmap_size: u8,
    /// Ring size of the data file, in pages.
    pub num_data_pages: u32,
    /// Ring size of the index file, in pages. Ignored unless `USE_INDEX` is set.
    pub num_index_pages: u32,
    /// Ring size of the variable-data file, in pages. Ignored unless
    /// `USE_VDATA` is set.
    pub num_var_pages: u32,
    /// Erase-group alignment, in pages, for the data ring.
    pub erase_size_in_pages: u32,
    /// Feature toggles.
    pub parameters: Parameters,
}

impl Config {
    /// Sanity-check the configuration before it's used to size buffers.
    /// Mirrors the `InvalidConfg`-style guard the teacher's `FlashMap::init`
    /// performs before doing any I/O.
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.page_size == 0 || self.num_data_pages == 0 {
            return Err(crate::error::Error::ResourceExhaustion);
        }
        if self.bitmap_size == 0 || self.bitmap_size > 8 {
            return Err(crate::error::Error::ResourceExhaustion);
        }
        if self.num_spline_points < 2 {
            return Err(crate::error::Error::ResourceExhaustion);
        }
        if self.parameters.contains(Parameters::USE_INDEX) && self.num_index_pages == 0 {
            return Err(crate::error::Error::ResourceExhaustion);
        }
        if self.parameters.contains(Parameters::USE_VDATA) && self.num_var_pages == 0 {
            return Err(crate::error::Error::ResourceExhaustion);
        }
        if self.erase_size_in_pages == 0 || self.num_data_pages % self.erase_size_in_pages != 0 {
            return Err(crate::error::Error::ResourceExhaustion);
        }
        Ok(())
    }

    /// Mask applied to the internal `u64` bitmap before it's persisted.
    pub fn bitmap_mask(&self) -> u64 {
        if self.bitmap_size >= 8 {
            u64::MAX
        } else {
            (1u64 << (self.bitmap_size as u32 * 8)) - 1
        }
    }
}
