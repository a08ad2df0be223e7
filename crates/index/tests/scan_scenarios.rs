mod common;

use common::{build_index, drain, rid_for};
use index::{IndexError, IndexResult, ScanOp};
use tempfile::TempDir;

#[test]
fn closed_range_includes_both_bounds() -> IndexResult<()> {
    let dir = TempDir::new().expect("temp dir create failed");
    let keys: Vec<i32> = (0..5000).collect();
    let mut index = build_index(&dir, &keys);

    index.start_scan(100, ScanOp::Gte, 200, ScanOp::Lte)?;
    let rids = drain(&mut index);
    index.end_scan()?;

    let expected: Vec<_> = (100..=200).map(rid_for).collect();
    assert_eq!(rids.len(), 101);
    assert_eq!(rids, expected);
    assert_eq!(index.buffer_pool().pinned_page_count().unwrap(), 0);
    Ok(())
}

#[test]
fn open_range_excludes_both_bounds() -> IndexResult<()> {
    let dir = TempDir::new().expect("temp dir create failed");
    let keys: Vec<i32> = (0..5000).collect();
    let mut index = build_index(&dir, &keys);

    index.start_scan(100, ScanOp::Gt, 200, ScanOp::Lt)?;
    let rids = drain(&mut index);
    index.end_scan()?;

    let expected: Vec<_> = (101..200).map(rid_for).collect();
    assert_eq!(rids.len(), 99);
    assert_eq!(rids, expected);
    Ok(())
}

#[test]
fn half_open_ranges_drop_one_bound() -> IndexResult<()> {
    let dir = TempDir::new().expect("temp dir create failed");
    let keys: Vec<i32> = (0..1000).collect();
    let mut index = build_index(&dir, &keys);

    index.start_scan(10, ScanOp::Gt, 20, ScanOp::Lte)?;
    assert_eq!(drain(&mut index), (11..=20).map(rid_for).collect::<Vec<_>>());
    index.end_scan()?;

    index.start_scan(10, ScanOp::Gte, 20, ScanOp::Lt)?;
    assert_eq!(drain(&mut index), (10..20).map(rid_for).collect::<Vec<_>>());
    index.end_scan()?;
    Ok(())
}

#[test]
fn empty_open_interval_finds_nothing() {
    let dir = TempDir::new().expect("temp dir create failed");
    let keys: Vec<i32> = (0..1000).collect();
    let mut index = build_index(&dir, &keys);

    assert!(matches!(
        index.start_scan(10, ScanOp::Gt, 10, ScanOp::Lt),
        Err(IndexError::NoSuchKeyFound)
    ));
    assert_eq!(index.buffer_pool().pinned_page_count().unwrap(), 0);
}

#[test]
fn reversed_range_is_rejected() {
    let dir = TempDir::new().expect("temp dir create failed");
    let mut index = build_index(&dir, &[1, 2, 3]);

    assert!(matches!(
        index.start_scan(500, ScanOp::Gte, 100, ScanOp::Lte),
        Err(IndexError::BadScanRange)
    ));
}

#[test]
fn misused_operators_are_rejected() {
    let dir = TempDir::new().expect("temp dir create failed");
    let mut index = build_index(&dir, &[1, 2, 3]);

    assert!(matches!(
        index.start_scan(0, ScanOp::Lt, 10, ScanOp::Gt),
        Err(IndexError::BadOpcodes)
    ));
    // Operator validation precedes range validation.
    assert!(matches!(
        index.start_scan(500, ScanOp::Lt, 100, ScanOp::Gt),
        Err(IndexError::BadOpcodes)
    ));
}

#[test]
fn scan_still_works_after_rejected_starts() -> IndexResult<()> {
    let dir = TempDir::new().expect("temp dir create failed");
    let keys: Vec<i32> = (0..100).collect();
    let mut index = build_index(&dir, &keys);

    assert!(index.start_scan(0, ScanOp::Lt, 10, ScanOp::Gt).is_err());
    assert!(index.start_scan(50, ScanOp::Gte, 10, ScanOp::Lte).is_err());

    index.start_scan(90, ScanOp::Gte, 99, ScanOp::Lte)?;
    assert_eq!(drain(&mut index).len(), 10);
    index.end_scan()?;
    Ok(())
}

#[test]
fn bounds_absent_from_the_data_still_delimit() -> IndexResult<()> {
    let dir = TempDir::new().expect("temp dir create failed");
    // Even keys only; scan bounds fall in the gaps.
    let keys: Vec<i32> = (0..500).map(|n| n * 2).collect();
    let mut index = build_index(&dir, &keys);

    index.start_scan(99, ScanOp::Gte, 201, ScanOp::Lte)?;
    let rids = drain(&mut index);
    index.end_scan()?;

    let expected: Vec<_> = (50..=100).map(|n| rid_for(n * 2)).collect();
    assert_eq!(rids, expected);
    Ok(())
}

#[test]
fn range_covering_everything_returns_everything() -> IndexResult<()> {
    let dir = TempDir::new().expect("temp dir create failed");
    let keys: Vec<i32> = (-250..250).collect();
    let mut index = build_index(&dir, &keys);

    index.start_scan(i32::MIN, ScanOp::Gte, i32::MAX, ScanOp::Lte)?;
    let rids = drain(&mut index);
    index.end_scan()?;

    assert_eq!(rids, keys.iter().map(|&k| rid_for(k)).collect::<Vec<_>>());
    Ok(())
}
