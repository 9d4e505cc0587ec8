//! `erg table ...`: offline access to the persisted power table.

use std::fs;
use std::io::Write;
use std::path::Path;

use erg_core::storage::DirStorage;
use erg_core::{PowerPositionTable, TableCfg, TableStore};
use eyre::WrapErr;

use crate::cli::TableCmd;

/// The persisted table, opened for editing outside the control loop.
struct OpenTable {
    table: PowerPositionTable,
    store: TableStore<DirStorage>,
}

fn open(cfg: &erg_config::Config) -> eyre::Result<OpenTable> {
    let table_cfg: TableCfg = (&cfg.table).into();
    let storage = DirStorage::open(&cfg.storage.dir)
        .wrap_err_with(|| format!("open storage dir {}", cfg.storage.dir))?;
    let mut store = TableStore::new(storage, &table_cfg);
    let mut table = PowerPositionTable::new(table_cfg);
    match store.read_saved(&table)? {
        Some(Ok(saved)) => {
            table.apply_snapshot(&saved);
        }
        Some(Err(e)) => {
            return Err(eyre::Report::new(e)).wrap_err("saved table is unusable");
        }
        None => tracing::info!(dir = %cfg.storage.dir, "no saved table yet"),
    }
    Ok(OpenTable { table, store })
}

pub fn run_table(cfg: &erg_config::Config, cmd: &TableCmd, json: bool) -> eyre::Result<()> {
    let mut t = open(cfg)?;
    match cmd {
        TableCmd::Show => {
            if json {
                let rows: Vec<_> = t
                    .table
                    .rows()
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "cadence": r.cadence,
                            "watts": r.watts,
                            "position": r.position,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "observed": t.table.observed(),
                        "total_confidence": t.table.total_confidence(),
                        "rows": rows,
                    })
                );
            } else {
                print!("{}", t.table);
                println!(
                    "observed cells: {}  total confidence: {}",
                    t.table.observed(),
                    t.table.total_confidence()
                );
            }
        }
        TableCmd::Export { out } => {
            let rows = t.table.rows();
            match out {
                Some(path) => {
                    let f = fs::File::create(path)
                        .wrap_err_with(|| format!("create {}", path.display()))?;
                    erg_config::write_table_csv(f, &rows)?;
                    tracing::info!(rows = rows.len(), file = %path.display(), "table exported");
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut lock = stdout.lock();
                    erg_config::write_table_csv(&mut lock, &rows)?;
                    lock.flush()?;
                }
            }
        }
        TableCmd::Import { file } => {
            import(&mut t, file, json)?;
        }
        TableCmd::Reset => {
            t.store.reset(&mut t.table, 0)?;
            if json {
                println!("{}", serde_json::json!({ "reset": true }));
            } else {
                println!("table reset");
            }
        }
    }
    Ok(())
}

fn import(t: &mut OpenTable, file: &Path, json: bool) -> eyre::Result<()> {
    let rows = erg_config::load_table_csv(file)?;
    let summary = t.table.import_rows(&rows);
    t.store.save(&t.table, 0)?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "stored": summary.stored,
                "vetoed": summary.vetoed,
                "out_of_range": summary.out_of_range,
            })
        );
    } else {
        println!(
            "imported {} rows: {} stored, {} vetoed, {} out of range",
            rows.len(),
            summary.stored,
            summary.vetoed,
            summary.out_of_range
        );
    }
    Ok(())
}
