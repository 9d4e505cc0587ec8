use erg_config::{TableRow, load_table_csv, write_table_csv};
use rstest::rstest;
use std::fs;
use tempfile::tempdir;

#[test]
fn loads_rows_with_strict_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("table.csv");
    fs::write(
        &path,
        "cadence,watts,position\n90,150,50000\n 90 , 180 , 56000 \n",
    )
    .unwrap();

    let rows = load_table_csv(&path).expect("valid csv");
    assert_eq!(
        rows,
        vec![
            TableRow {
                cadence: 90,
                watts: 150,
                position: 50_000
            },
            TableRow {
                cadence: 90,
                watts: 180,
                position: 56_000
            },
        ]
    );
}

#[rstest]
#[case("cad,watts,position\n90,150,1\n", "must have headers")]
#[case("cadence,watts\n90,150\n", "must have headers")]
#[case("cadence,watts,position\n90,abc,1\n", "invalid CSV row 2")]
#[case("cadence,watts,position\n90,150,1\n0,150,1\n", "invalid CSV row 3")]
fn rejects_bad_input(#[case] body: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("table.csv");
    fs::write(&path, body).unwrap();
    let err = load_table_csv(&path).expect_err("should fail");
    assert!(format!("{err}").contains(needle), "got: {err}");
}

#[test]
fn missing_file_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.csv");
    let err = load_table_csv(&path).expect_err("should fail");
    assert!(format!("{err}").contains("open table CSV"));
}

#[test]
fn written_csv_loads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let rows = vec![
        TableRow {
            cadence: 85,
            watts: 120,
            position: 41_000,
        },
        TableRow {
            cadence: 95,
            watts: 300,
            position: 88_800,
        },
    ];
    let file = fs::File::create(&path).unwrap();
    write_table_csv(file, &rows).unwrap();
    assert_eq!(load_table_csv(&path).unwrap(), rows);
}
