#![no_main]
use erg_core::table::persist::decode;
use erg_core::{PowerPositionTable, TableCfg};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let cfg = TableCfg::default();
    let version = cfg.version;
    let mut table = PowerPositionTable::new(cfg);
    if let Ok(saved) = decode(data, table.cells().len(), version) {
        // Whatever decodes must be safe to merge into a live grid.
        let _ = table.reliable_overlap(&saved);
        table.apply_snapshot(&saved);
        let _ = table.lookup(150, 90);
    }
});
