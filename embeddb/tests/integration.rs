use embeddb::{BucketStrategy, Config, EmbedDB, Error, Parameters, RangeQuery};
use embeddb_storage::mock::MemoryPageStore;

fn config(parameters: Parameters) -> Config {
    Config {
        page_size: 512,
        num_spline_points: 4,
        spline_max_error: 1,
        bitmap_size: 8,
        num_data_pages: 32,
        num_index_pages: 8,
        num_var_pages: 8,
        erase_size_in_pages: 4,
        parameters,
    }
}

fn data_storage(cfg: &Config) -> MemoryPageStore {
    MemoryPageStore::new(cfg.num_data_pages, cfg.page_size, 0xFF)
}

#[test]
fn put_then_get_round_trips() {
    let cfg = config(Parameters::USE_BMAP);
    let data = data_storage(&cfg);
    let mut db: EmbedDB<u32, u64, _, _> =
        EmbedDB::init(cfg, BucketStrategy::new(100), data, None, None, None).unwrap();

    db.put(1, 111).unwrap();
    db.put(2, 222).unwrap();
    db.put(3, 333).unwrap();

    assert_eq!(db.get(1).unwrap(), 111);
    assert_eq!(db.get(2).unwrap(), 222);
    assert_eq!(db.get(3).unwrap(), 333);
    assert!(matches!(db.get(4), Err(Error::NotFound)));
}

#[test]
fn out_of_order_key_is_rejected() {
    let cfg = config(Parameters::USE_BMAP);
    let data = data_storage(&cfg);
    let mut db: EmbedDB<u32, u64, _, _> =
        EmbedDB::init(cfg, BucketStrategy::new(100), data, None, None, None).unwrap();

    db.put(10, 1).unwrap();
    assert!(matches!(
        db.put(10, 2),
        Err(Error::KeyOrderViolation)
    ));
    assert!(matches!(
        db.put(9, 2),
        Err(Error::KeyOrderViolation)
    ));
}

#[test]
fn lookups_survive_many_page_seals() {
    let cfg = config(Parameters::USE_BMAP);
    let data = data_storage(&cfg);
    let mut db: EmbedDB<u32, u64, _, _> =
        EmbedDB::init(cfg, BucketStrategy::new(100), data, None, None, None).unwrap();

    for key in 97855u32..97855 + 400 {
        db.put(key, (key as u64) * 2).unwrap();
    }
    db.flush().unwrap();

    for key in [97855u32, 97900, 98000, 98254] {
        assert_eq!(db.get(key).unwrap(), (key as u64) * 2);
    }
}

#[test]
fn variable_length_payload_round_trips_across_pages() {
    let cfg = config(Parameters::USE_BMAP | Parameters::USE_VDATA);
    let data = data_storage(&cfg);
    let var = MemoryPageStore::new(cfg.num_var_pages, cfg.page_size, 0);
    let mut db: EmbedDB<u32, u32, _, _> =
        EmbedDB::init(cfg, BucketStrategy::new(100), data, None, Some(var), None).unwrap();

    let payload: Vec<u8> = (0u8..=255).cycle().take(900).collect();
    db.put_var(1, 1, &payload).unwrap();
    db.flush().unwrap();

    let mut stream = db.get_var(1).unwrap().expect("record has variable data");
    let mut out = vec![0u8; payload.len()];
    let mut total = 0;
    loop {
        let n = db.read_var(&mut stream, &mut out[total..]).unwrap();
        if n == 0 {
            break;
        }
        total += n;
    }
    assert_eq!(total, payload.len());
    assert_eq!(out, payload);
}

#[test]
fn range_query_prunes_by_data_bitmap_and_bounds() {
    let cfg = config(Parameters::USE_BMAP);
    let data = data_storage(&cfg);
    let mut db: EmbedDB<u32, u32, _, _> =
        EmbedDB::init(cfg, BucketStrategy::new(10), data, None, None, None).unwrap();

    for key in 0u32..200 {
        db.put(key, key * 3).unwrap();
    }
    db.flush().unwrap();

    let query = RangeQuery {
        min_key: Some(50),
        max_key: Some(60),
        min_data: None,
        max_data: None,
    };
    let results: Vec<_> = db.range(query).collect();
    assert_eq!(results.len(), 11);
    assert_eq!(results.first().unwrap().0, 50);
    assert_eq!(results.last().unwrap().0, 60);
}

#[test]
fn range_query_prunes_via_separate_index_file() {
    let cfg = config(Parameters::USE_BMAP | Parameters::USE_INDEX);
    let data = data_storage(&cfg);
    let index = MemoryPageStore::new(cfg.num_index_pages, cfg.page_size, 0);
    let mut db: EmbedDB<u32, u32, _, _> =
        EmbedDB::init(cfg, BucketStrategy::new(10), data, Some(index), None, None).unwrap();

    for key in 0u32..200 {
        db.put(key, key * 3).unwrap();
    }
    db.flush().unwrap();

    let query = RangeQuery {
        min_key: Some(50),
        max_key: Some(60),
        min_data: None,
        max_data: None,
    };
    let results: Vec<_> = db.range(query).collect();
    assert_eq!(results.len(), 11);
    assert_eq!(results.first().unwrap().0, 50);
    assert_eq!(results.last().unwrap().0, 60);

    let query = RangeQuery {
        min_key: None,
        max_key: None,
        min_data: Some(0),
        max_data: Some(9),
    };
    let results: Vec<_> = db.range(query).collect();
    assert_eq!(results, vec![(0u32, 0u32), (1, 3), (2, 6), (3, 9)]);
}

#[test]
fn get_survives_spline_anchor_eviction_below_floor() {
    // Mirrors the teacher's should_erase_previous_spline_points_when_full
    // fixture: drive enough page seals that the spline's FIFO eviction
    // drops the anchor for an early page, then look up a key from that
    // page while it's still live on disk (well within num_data_pages).
    let mut cfg = config(Parameters::USE_BMAP);
    cfg.num_spline_points = 4;
    cfg.spline_max_error = 0;
    let data = data_storage(&cfg);
    let mut db: EmbedDB<u32, u64, _, _> =
        EmbedDB::init(cfg, BucketStrategy::new(100), data, None, None, None).unwrap();

    // records_per_page works out to 40 for this key/data/bitmap sizing, so
    // 20 pages of sequential keys seals 20 pages — well under num_data_pages
    // (32), so nothing is evicted from the data ring. Each page boundary
    // flips the observed slope from flat (same page, many keys) to a sharp
    // jump (next page, same key step), which breaks the zero-error cone
    // every time, so the spline accumulates far more than 4 anchors and
    // FIFO-evicts the ones for the earliest pages.
    for key in 0u32..800 {
        db.put(key, key as u64 * 2).unwrap();
    }
    db.flush().unwrap();

    assert_eq!(db.get(0).unwrap(), 0);
    assert_eq!(db.get(39).unwrap(), 78);
}

#[test]
fn record_level_consistency_tail_does_not_disturb_normal_reads() {
    let cfg = config(Parameters::USE_BMAP | Parameters::RECORD_LEVEL_CONSISTENCY);
    let data = data_storage(&cfg);
    let tail = MemoryPageStore::new(2, cfg.page_size, 0);
    let mut db: EmbedDB<u32, u64, _, _> =
        EmbedDB::init(cfg, BucketStrategy::new(100), data, None, None, Some(tail)).unwrap();

    for key in 0u32..150 {
        db.put(key, key as u64).unwrap();
    }
    for key in [0u32, 75, 149] {
        assert_eq!(db.get(key).unwrap(), key as u64);
    }
}
