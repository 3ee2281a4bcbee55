//! On-disk page layouts (spec.md §3/§6): data, index, variable, and
//! consistency-tail pages. All integers are encoded native-endian, per
//! spec.md §6: "Endianness is host-native; files are not portable across
//! architectures."

use crate::bitmap::Summary;
use crate::config::Config;
use crate::record::{DataValue, Key};

/// Byte layout derived once from [`Config`] plus the monomorphized
/// `K`/`D` types and whether the variable-data log is enabled. Computed at
/// `init` and reused on every put/get/iterate — none of this changes for the
/// life of the instance.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub key_size: usize,
    pub data_size: usize,
    pub has_var: bool,
    pub bitmap_size: usize,
    /// `[key][data]` plus, when `has_var`, a trailing `u32` var address.
    pub record_size: usize,
    pub data_header_size: usize,
    pub records_per_page: usize,
    pub index_summary_size: usize,
    pub summaries_per_index_page: usize,
    pub var_header_size: usize,
}

/// Fixed header fields that appear in every data/index/var page before the
/// packed payload: a `u32` logical page number.
const PAGE_NUMBER_SIZE: usize = 4;

impl Layout {
    pub fn new<K: Key, D: DataValue>(config: &Config, has_var: bool) -> Self {
        let key_size = K::SIZE;
        let data_size = D::SIZE;
        let bitmap_size = config.bitmap_size as usize;
        let record_size = key_size + data_size + if has_var { 8 } else { 0 };
        // pageNumber(4) + recordCount(2) + bitmap + minData + maxData
        let data_header_size = PAGE_NUMBER_SIZE + 2 + bitmap_size + data_size * 2;
        let records_per_page = (config.page_size as usize).saturating_sub(data_header_size)
            / record_size.max(1);

        // bitmap + minData + maxData + logicalDataPage(4)
        let index_summary_size = bitmap_size + data_size * 2 + 4;
        let summaries_per_index_page = (config.page_size as usize)
            .saturating_sub(PAGE_NUMBER_SIZE)
            / index_summary_size.max(1);

        // pageNumber(4) + firstChunkOffset(2) + prevVarPage(4)
        let var_header_size = PAGE_NUMBER_SIZE + 2 + 4;

        Layout {
            key_size,
            data_size,
            has_var,
            bitmap_size,
            record_size,
            data_header_size,
            records_per_page,
            index_summary_size,
            summaries_per_index_page,
            var_header_size,
        }
    }
}

fn write_bitmap(buf: &mut [u8], bitmap: u64, bitmap_size: usize) {
    let bytes = bitmap.to_ne_bytes();
    buf[..bitmap_size].copy_from_slice(&bytes[..bitmap_size]);
}

fn read_bitmap(buf: &[u8], bitmap_size: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..bitmap_size].copy_from_slice(&buf[..bitmap_size]);
    u64::from_ne_bytes(bytes)
}

/// Header of a data page (spec.md §3/§6).
#[derive(Debug, Clone, Copy)]
pub struct DataPageHeader<D> {
    pub page_number: u32,
    pub record_count: u16,
    pub bitmap: u64,
    pub min_data: D,
    pub max_data: D,
}

impl<D: DataValue> DataPageHeader<D> {
    pub fn new(page_number: u32) -> Self {
        DataPageHeader {
            page_number,
            record_count: 0,
            bitmap: 0,
            min_data: D::default(),
            max_data: D::default(),
        }
    }

    pub fn encode(&self, layout: &Layout, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_number.to_ne_bytes());
        buf[4..6].copy_from_slice(&self.record_count.to_ne_bytes());
        let mut off = 6;
        write_bitmap(&mut buf[off..], self.bitmap, layout.bitmap_size);
        off += layout.bitmap_size;
        self.min_data.write_bytes(&mut buf[off..off + layout.data_size]);
        off += layout.data_size;
        self.max_data.write_bytes(&mut buf[off..off + layout.data_size]);
    }

    pub fn decode(layout: &Layout, buf: &[u8]) -> Self {
        let page_number = u32::from_ne_bytes(buf[0..4].try_into().unwrap());
        let record_count = u16::from_ne_bytes(buf[4..6].try_into().unwrap());
        let mut off = 6;
        let bitmap = read_bitmap(&buf[off..], layout.bitmap_size);
        off += layout.bitmap_size;
        let min_data = D::read_bytes(&buf[off..off + layout.data_size]);
        off += layout.data_size;
        let max_data = D::read_bytes(&buf[off..off + layout.data_size]);
        DataPageHeader {
            page_number,
            record_count,
            bitmap,
            min_data,
            max_data,
        }
    }
}

/// Write one packed record (`[key][data]`, plus a trailing var address when
/// the layout carries variable data) at record index `idx` within a data
/// page buffer.
pub fn write_record<K: Key, D: DataValue>(
    layout: &Layout,
    page: &mut [u8],
    idx: usize,
    key: K,
    data: D,
    var_address: Option<u64>,
) {
    let start = layout.data_header_size + idx * layout.record_size;
    key.write_bytes(&mut page[start..start + layout.key_size]);
    let mut off = start + layout.key_size;
    data.write_bytes(&mut page[off..off + layout.data_size]);
    off += layout.data_size;
    if layout.has_var {
        let addr = var_address.unwrap_or(0);
        page[off..off + 8].copy_from_slice(&addr.to_ne_bytes());
    }
}

/// Read back one packed record at record index `idx`.
pub fn read_record<K: Key, D: DataValue>(
    layout: &Layout,
    page: &[u8],
    idx: usize,
) -> (K, D, Option<u64>) {
    let start = layout.data_header_size + idx * layout.record_size;
    let key = K::read_bytes(&page[start..start + layout.key_size]);
    let mut off = start + layout.key_size;
    let data = D::read_bytes(&page[off..off + layout.data_size]);
    off += layout.data_size;
    let var_address = if layout.has_var {
        Some(u64::from_ne_bytes(page[off..off + 8].try_into().unwrap()))
    } else {
        None
    };
    (key, data, var_address)
}

/// Encode an index-page summary record at `idx`.
pub fn write_summary<D: DataValue>(
    layout: &Layout,
    page: &mut [u8],
    idx: usize,
    summary: &Summary<D>,
) {
    let start = PAGE_NUMBER_SIZE + idx * layout.index_summary_size;
    write_bitmap(&mut page[start..], summary.bitmap, layout.bitmap_size);
    let mut off = start + layout.bitmap_size;
    summary
        .min_data
        .write_bytes(&mut page[off..off + layout.data_size]);
    off += layout.data_size;
    summary
        .max_data
        .write_bytes(&mut page[off..off + layout.data_size]);
    off += layout.data_size;
    page[off..off + 4].copy_from_slice(&summary.logical_page.to_ne_bytes());
}

/// Decode an index-page summary record at `idx`.
pub fn read_summary<D: DataValue>(layout: &Layout, page: &[u8], idx: usize) -> Summary<D> {
    let start = PAGE_NUMBER_SIZE + idx * layout.index_summary_size;
    let bitmap = read_bitmap(&page[start..], layout.bitmap_size);
    let mut off = start + layout.bitmap_size;
    let min_data = D::read_bytes(&page[off..off + layout.data_size]);
    off += layout.data_size;
    let max_data = D::read_bytes(&page[off..off + layout.data_size]);
    off += layout.data_size;
    let logical_page = u32::from_ne_bytes(page[off..off + 4].try_into().unwrap());
    Summary {
        bitmap,
        min_data,
        max_data,
        logical_page,
    }
}

pub fn write_index_page_number(page: &mut [u8], page_number: u32) {
    page[0..4].copy_from_slice(&page_number.to_ne_bytes());
}

pub fn read_index_page_number(page: &[u8]) -> u32 {
    u32::from_ne_bytes(page[0..4].try_into().unwrap())
}

/// Header of a variable-data page (spec.md §3/§6).
#[derive(Debug, Clone, Copy)]
pub struct VarPageHeader {
    pub page_number: u32,
    pub first_chunk_offset: u16,
    pub prev_var_page: u32,
}

impl VarPageHeader {
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_number.to_ne_bytes());
        buf[4..6].copy_from_slice(&self.first_chunk_offset.to_ne_bytes());
        buf[6..10].copy_from_slice(&self.prev_var_page.to_ne_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        VarPageHeader {
            page_number: u32::from_ne_bytes(buf[0..4].try_into().unwrap()),
            first_chunk_offset: u16::from_ne_bytes(buf[4..6].try_into().unwrap()),
            prev_var_page: u32::from_ne_bytes(buf[6..10].try_into().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;

    fn cfg() -> Config {
        Config {
            page_size: 512,
            num_spline_points: 4,
            spline_max_error: 1,
            bitmap_size: 8,
            num_data_pages: 32,
            num_index_pages: 8,
            num_var_pages: 8,
            erase_size_in_pages: 4,
            parameters: Parameters::USE_BMAP | Parameters::USE_INDEX,
        }
    }

    #[test]
    fn data_page_header_round_trips() {
        let layout = Layout::new::<u32, u64>(&cfg(), false);
        let header = DataPageHeader::<u64> {
            page_number: 7,
            record_count: 3,
            bitmap: 0xABCD,
            min_data: 100,
            max_data: 900,
        };
        let mut buf = vec![0u8; cfg().page_size as usize];
        header.encode(&layout, &mut buf);
        let decoded = DataPageHeader::<u64>::decode(&layout, &buf);
        assert_eq!(decoded.page_number, 7);
        assert_eq!(decoded.record_count, 3);
        assert_eq!(decoded.bitmap, 0xABCD);
        assert_eq!(decoded.min_data, 100);
        assert_eq!(decoded.max_data, 900);
    }

    #[test]
    fn record_round_trips_with_var_address() {
        let layout = Layout::new::<u32, u64>(&cfg(), true);
        let mut buf = vec![0u8; cfg().page_size as usize];
        write_record::<u32, u64>(&layout, &mut buf, 0, 42, 4242, Some(0x1_0000_0000));
        let (k, d, addr) = read_record::<u32, u64>(&layout, &buf, 0);
        assert_eq!(k, 42);
        assert_eq!(d, 4242);
        assert_eq!(addr, Some(0x1_0000_0000));
    }

    #[test]
    fn summary_round_trips() {
        let layout = Layout::new::<u32, u64>(&cfg(), false);
        let mut buf = vec![0u8; cfg().page_size as usize];
        let s = Summary::<u64> {
            bitmap: 0b1010,
            min_data: 1,
            max_data: 99,
            logical_page: 12,
        };
        write_summary(&layout, &mut buf, 0, &s);
        let decoded = read_summary::<u64>(&layout, &buf, 0);
        assert_eq!(decoded, s);
    }

    #[test]
    fn var_page_header_round_trips() {
        let header = VarPageHeader {
            page_number: 3,
            first_chunk_offset: 10,
            prev_var_page: 2,
        };
        let mut buf = [0u8; 16];
        header.encode(&mut buf);
        let decoded = VarPageHeader::decode(&buf);
        assert_eq!(decoded.page_number, 3);
        assert_eq!(decoded.first_chunk_offset, 10);
        assert_eq!(decoded.prev_var_page, 2);
    }
}
