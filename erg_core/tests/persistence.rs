use erg_core::mocks::MemStorage;
use erg_core::table::persist::{decode, encode};
use erg_core::{LoadOutcome, PowerPositionTable, TableCell, TableCfg, TableStore};
use rstest::rstest;

const FILE: &str = "power_table.bin";

fn table() -> PowerPositionTable {
    PowerPositionTable::new(TableCfg::default())
}

/// Four reliable cells in row 6 above the unreliable low-watt columns.
fn learned(offset: i16, confidence: i8) -> PowerPositionTable {
    let mut t = table();
    for (i, p) in [(4, 400), (6, 600), (8, 800), (10, 1_000)] {
        t.set_cell(6, i, TableCell::observed(p + offset, confidence));
    }
    t
}

#[test]
fn snapshot_into_empty_grid_reproduces_every_cell() {
    let mut src = learned(0, 7);
    src.set_cell(2, 1, TableCell::observed(-40, 1));
    src.set_cell(9, 19, TableCell::observed(2_000, 10));
    let saved = decode(&encode(&src), 200, 5).unwrap();

    let mut fresh = table();
    let offset = fresh.apply_snapshot(&saved);
    assert_eq!(offset, 0);
    assert_eq!(fresh.cells(), src.cells());
    assert_eq!(saved.stored_confidence, src.total_confidence());
}

#[rstest]
#[case(0)]
#[case(25)]
#[case(-130)]
fn load_shifts_saved_cells_by_constant_difference(#[case] delta: i16) {
    let mem = MemStorage::default();
    // saved table learned under a different mechanical zero, plus one cell
    // the active session has never seen
    let mut saved = learned(-delta, 9);
    saved.set_cell(3, 12, TableCell::observed(1_500, 6));
    mem.put(FILE, encode(&saved));

    let mut active = learned(0, 4);
    let mut store = TableStore::new(mem, &TableCfg::default());
    let out = store.manage_save_state(&mut active, 1).unwrap();
    assert_eq!(
        out,
        LoadOutcome::Loaded {
            offset: i32::from(delta),
            overlap: 4
        }
    );
    assert!(store.is_loaded());
    for (i, p) in [(4, 400), (6, 600), (8, 800), (10, 1_000)] {
        assert_eq!(active.cell(6, i), TableCell::observed(p, 9));
    }
    assert_eq!(active.position(3, 12), Some(1_500 + delta));
}

#[test]
fn too_little_overlap_keeps_active_table_and_retries() {
    let mem = MemStorage::default();
    mem.put(FILE, encode(&learned(0, 9)));
    let mut active = table();
    active.set_cell(6, 4, TableCell::observed(400, 5));

    let mut store = TableStore::new(mem.clone(), &TableCfg::default());
    let writes = mem.writes();
    let out = store.manage_save_state(&mut active, 1_000_000).unwrap();
    assert_eq!(out, LoadOutcome::InsufficientOverlap { found: 1, needed: 3 });
    assert!(!store.is_loaded());
    assert_eq!(active.populated(), 1);
    // no timer save while the file is still pending a merge
    assert_eq!(mem.writes(), writes);
}

#[test]
fn more_confident_active_table_overwrites_file() {
    let mem = MemStorage::default();
    mem.put(FILE, encode(&learned(0, 4)));
    let mut active = learned(3, 9);

    let mut store = TableStore::new(mem.clone(), &TableCfg::default());
    let out = store.manage_save_state(&mut active, 1).unwrap();
    assert_eq!(out, LoadOutcome::ActiveIsBetter { active: 36, stored: 16 });
    let on_disk = decode(&mem.get(FILE).unwrap(), 200, 5).unwrap();
    assert_eq!(on_disk.cells, active.cells());
    assert_eq!(active.position(6, 4), Some(403));
}

#[test]
fn sparse_saved_table_is_replaced_by_a_better_session() {
    let mem = MemStorage::default();
    let mut sparse = table();
    sparse.set_cell(5, 7, TableCell::observed(700, 2));
    mem.put(FILE, encode(&sparse));

    // 16 confident cells, none of them where the saved one is
    let mut active = table();
    for k in 6..8 {
        for i in 4..12 {
            active.set_cell(k, i, TableCell::observed(100 * i as i16, 10));
        }
    }

    let mut store = TableStore::new(mem.clone(), &TableCfg::default());
    let writes = mem.writes();
    let out = store.manage_save_state(&mut active, 1).unwrap();
    assert_eq!(out, LoadOutcome::ActiveIsBetter { active: 160, stored: 2 });
    assert!(store.is_loaded());
    assert_eq!(mem.writes(), writes + 1);
    let on_disk = decode(&mem.get(FILE).unwrap(), 200, 5).unwrap();
    assert_eq!(on_disk.stored_confidence, 160);

    // later sessions keep saving on the timer
    assert_eq!(
        store.manage_save_state(&mut active, 400_000).unwrap(),
        LoadOutcome::AlreadyLoaded
    );
    assert_eq!(mem.writes(), writes + 2);
}

#[test]
fn lowest_watt_columns_do_not_count_as_overlap() {
    let mut low = table();
    for i in 0..3 {
        low.set_cell(6, i, TableCell::observed(100 * i as i16, 9));
    }
    let saved = decode(&encode(&low), 200, 5).unwrap();
    assert_eq!(low.reliable_overlap(&saved), 0);
    let full = learned(0, 9);
    let saved = decode(&encode(&full), 200, 5).unwrap();
    assert_eq!(full.reliable_overlap(&saved), 4);
}
