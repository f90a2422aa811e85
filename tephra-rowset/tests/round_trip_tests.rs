//! Encode-into-slot / decode-out-of-slot coverage across types and widths.

use std::sync::Arc;

use tephra_rowset::{
    AggKind, QueryDescription, ResultLayout, ResultLayoutBuilder, RowSet, RowSetMemoryOwner,
    StringDictProxy, TargetInfo,
};
use tephra_types::sentinel::{inline_int_null_value, NULL_DOUBLE, NULL_FLOAT, NULL_INT};
use tephra_types::{Datum, ElemType, LogicalType};

fn grouped_layout(entry_count: usize) -> ResultLayoutBuilder {
    ResultLayout::builder(QueryDescription::GroupByPerfectHash, entry_count).keys(1, 8)
}

fn rowset_with(layout: ResultLayout, targets: Vec<TargetInfo>) -> RowSet {
    let mut rs = RowSet::new(Arc::new(layout), targets, RowSetMemoryOwner::new());
    rs.add_storage().unwrap();
    rs
}

/// Mark an entry occupied so the iterator will visit it.
fn occupy(rs: &mut RowSet, entry: usize) {
    rs.storage_mut(0).write_key(entry, 0, entry as i64 + 1);
}

#[test]
fn integer_round_trip_all_widths() {
    let cases: [(usize, LogicalType, i64); 4] = [
        (1, LogicalType::Int8, -5),
        (2, LogicalType::Int16, -3_000),
        (4, LogicalType::Int32, 70_000),
        (8, LogicalType::Int64, 1 << 40),
    ];
    for (width, ty, value) in cases {
        let layout = grouped_layout(2).slot(width, width).build();
        let mut rs = rowset_with(layout, vec![TargetInfo::projection(ty)]);
        occupy(&mut rs, 0);
        occupy(&mut rs, 1);
        rs.storage_mut(0).write_slot_int(0, 0, value);
        rs.storage_mut(0)
            .write_slot_int(1, 0, inline_int_null_value(width));

        assert_eq!(
            rs.get_row_at(0).unwrap()[0],
            Datum::Int(value),
            "width {width}"
        );
        assert!(rs.get_row_at(1).unwrap()[0].is_null(), "width {width}");
    }
}

#[test]
fn boolean_round_trip() {
    let layout = grouped_layout(3).slot(1, 1).build();
    let mut rs = rowset_with(layout, vec![TargetInfo::projection(LogicalType::Boolean)]);
    for e in 0..3 {
        occupy(&mut rs, e);
    }
    rs.storage_mut(0).write_slot_int(0, 0, 1);
    rs.storage_mut(0).write_slot_int(1, 0, 0);
    rs.storage_mut(0)
        .write_slot_int(2, 0, inline_int_null_value(1));

    assert_eq!(rs.get_row_at(0).unwrap()[0], Datum::Int(1));
    assert_eq!(rs.get_row_at(1).unwrap()[0], Datum::Int(0));
    assert!(rs.get_row_at(2).unwrap()[0].is_null());
}

#[test]
fn float_round_trip_both_widths() {
    // f32 at its own width, and f32 stored widened into an 8-byte slot.
    // Projection layout: the perfect-hash shared-slot width rule must not
    // apply to the widened column.
    let layout = ResultLayout::builder(QueryDescription::Projection, 2)
        .keys(1, 8)
        .slot(4, 4)
        .slot(8, 4)
        .slot(8, 8)
        .build();
    let mut rs = rowset_with(
        layout,
        vec![
            TargetInfo::projection(LogicalType::Float32),
            TargetInfo::projection(LogicalType::Float32),
            TargetInfo::projection(LogicalType::Float64),
        ],
    );
    occupy(&mut rs, 0);
    occupy(&mut rs, 1);
    rs.storage_mut(0).write_slot_f32(0, 0, 1.5);
    rs.storage_mut(0).write_slot_f64(0, 1, 2.25);
    rs.storage_mut(0).write_slot_f64(0, 2, -9.125);
    rs.storage_mut(0).write_slot_f32(1, 0, NULL_FLOAT);
    rs.storage_mut(0).write_slot_f64(1, 1, NULL_DOUBLE);
    rs.storage_mut(0).write_slot_f64(1, 2, NULL_DOUBLE);

    let row = rs.get_row_at(0).unwrap();
    assert_eq!(row[0], Datum::Float(1.5));
    assert_eq!(row[1], Datum::Float(2.25));
    assert_eq!(row[2], Datum::Double(-9.125));
    let nulls = rs.get_row_at(1).unwrap();
    assert!(nulls.iter().all(Datum::is_null));
}

#[test]
fn narrow_sum_slot_uses_argument_null_sentinel() {
    // SUM(int32) compacted into a 4-byte slot: the argument width's
    // sentinel marks null.
    let layout = grouped_layout(2).slot(4, 4).build();
    let mut rs = rowset_with(
        layout,
        vec![TargetInfo::aggregate(
            AggKind::Sum,
            LogicalType::Int64,
            LogicalType::Int32,
        )],
    );
    occupy(&mut rs, 0);
    occupy(&mut rs, 1);
    rs.storage_mut(0).write_slot_int(0, 0, 123_456);
    rs.storage_mut(0)
        .write_slot_int(1, 0, inline_int_null_value(4));

    assert_eq!(rs.get_row_at(0).unwrap()[0], Datum::Int(123_456));
    assert!(rs.get_row_at(1).unwrap()[0].is_null());
}

#[test]
fn decimal_scaling_and_null() {
    let ty = LogicalType::Decimal {
        precision: 10,
        scale: 2,
    };
    let layout = grouped_layout(2).slot(8, 8).build();
    let mut rs = rowset_with(layout, vec![TargetInfo::projection(ty)]);
    occupy(&mut rs, 0);
    occupy(&mut rs, 1);
    rs.storage_mut(0).write_slot_int(0, 0, 1234);
    rs.storage_mut(0)
        .write_slot_int(1, 0, inline_int_null_value(8));

    // Raw scaled integer by default.
    assert_eq!(rs.get_row_at(0).unwrap()[0], Datum::Int(1234));
    // Divided down when decimal_to_double is requested.
    let row = rs.get_row_at_opts(0, true, true, &[]).unwrap();
    assert_eq!(row[0], Datum::Double(12.34));
    let null_row = rs.get_row_at_opts(1, true, true, &[]).unwrap();
    assert!(null_row[0].is_null());
}

#[test]
fn datetime_kinds_decode_as_integers() {
    let layout = grouped_layout(1).slot(8, 8).slot(8, 8).slot(8, 8).build();
    let mut rs = rowset_with(
        layout,
        vec![
            TargetInfo::projection(LogicalType::Date),
            TargetInfo::projection(LogicalType::Time),
            TargetInfo::projection(LogicalType::Timestamp),
        ],
    );
    occupy(&mut rs, 0);
    rs.storage_mut(0).write_slot_int(0, 0, 86_400 * 3 + 7);
    rs.storage_mut(0).write_slot_int(0, 1, 12 * 3600);
    rs.storage_mut(0).write_slot_int(0, 2, 1_600_000_000);

    let row = rs.get_row_at(0).unwrap();
    assert_eq!(row[0], Datum::Int(86_400 * 3 + 7));
    assert_eq!(row[1], Datum::Int(12 * 3600));
    assert_eq!(row[2], Datum::Int(1_600_000_000));
}

#[test]
fn dict_string_translation_and_raw_ids() {
    let layout = grouped_layout(4).slot(4, 4).build();
    let ty = LogicalType::DictString { dict_id: 7 };
    let mut rs = rowset_with(layout, vec![TargetInfo::projection(ty)]);
    rs.owner().register_dict_proxy(Arc::new(StringDictProxy::new(
        7,
        vec!["apple".into(), "banana".into()],
    )));
    let transient_id = rs.owner().string_dict_proxy(7).get_or_add_transient("minted");

    for e in 0..4 {
        occupy(&mut rs, e);
    }
    rs.storage_mut(0).write_slot_int(0, 0, 0);
    rs.storage_mut(0).write_slot_int(1, 0, 1);
    rs.storage_mut(0).write_slot_int(2, 0, NULL_INT as i64);
    rs.storage_mut(0).write_slot_int(3, 0, transient_id as i64);

    assert_eq!(rs.get_row_at(0).unwrap()[0].as_str(), Some("apple"));
    assert_eq!(rs.get_row_at(1).unwrap()[0].as_str(), Some("banana"));
    assert!(rs.get_row_at(2).unwrap()[0].is_null());
    assert_eq!(rs.get_row_at(3).unwrap()[0].as_str(), Some("minted"));

    // Untranslated reads hand back the raw ids, nulls included.
    let raw = rs.get_row_at_opts(2, false, false, &[]).unwrap();
    assert_eq!(raw[0], Datum::Int(NULL_INT as i64));
}

#[test]
fn string_pair_round_trip() {
    let layout = grouped_layout(3).slot(8, 8).slot(8, 8).build();
    let mut rs = rowset_with(layout, vec![TargetInfo::projection(LogicalType::String)]);
    for e in 0..3 {
        occupy(&mut rs, e);
    }
    let handle = rs.owner().add_varlen(b"hello");
    rs.storage_mut(0).write_slot_int(0, 0, handle as i64);
    rs.storage_mut(0).write_slot_int(0, 1, 5);
    // Handle 0 is the null encoding; entry 2 keeps it.
    let empty = rs.owner().add_varlen(b"");
    rs.storage_mut(0).write_slot_int(1, 0, empty as i64);
    rs.storage_mut(0).write_slot_int(1, 1, 0);

    assert_eq!(rs.get_row_at(0).unwrap()[0].as_str(), Some("hello"));
    assert_eq!(rs.get_row_at(1).unwrap()[0].as_str(), Some(""));
    assert!(rs.get_row_at(2).unwrap()[0].is_null());
}

#[test]
fn array_pair_round_trip() {
    let ty = LogicalType::Array {
        elem: ElemType::Int32,
        fixed_elems: None,
    };
    let layout = grouped_layout(2).slot(8, 8).slot(8, 8).build();
    let mut rs = rowset_with(layout, vec![TargetInfo::projection(ty)]);
    occupy(&mut rs, 0);
    occupy(&mut rs, 1);

    let mut payload = Vec::new();
    for v in [3i32, -1, 40] {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    let handle = rs.owner().add_varlen(&payload);
    rs.storage_mut(0).write_slot_int(0, 0, handle as i64);
    rs.storage_mut(0).write_slot_int(0, 1, 3);

    assert_eq!(
        rs.get_row_at(0).unwrap()[0],
        Datum::Array(vec![Datum::Int(3), Datum::Int(-1), Datum::Int(40)])
    );
    assert!(rs.get_row_at(1).unwrap()[0].is_null());
}

#[test]
fn separate_varlen_storage_indexes_with_negative_null() {
    let layout = grouped_layout(3).slot(8, 8).build();
    let mut rs = rowset_with(layout, vec![TargetInfo::projection(LogicalType::String)]);
    for e in 0..3 {
        occupy(&mut rs, e);
    }
    rs.set_separate_varlen_storage(vec![vec![b"alpha".to_vec(), b"beta".to_vec()]]);
    rs.storage_mut(0).write_slot_int(0, 0, 1);
    rs.storage_mut(0).write_slot_int(1, 0, 0);
    rs.storage_mut(0).write_slot_int(2, 0, -1);

    assert_eq!(rs.get_row_at(0).unwrap()[0].as_str(), Some("beta"));
    assert_eq!(rs.get_row_at(1).unwrap()[0].as_str(), Some("alpha"));
    assert!(rs.get_row_at(2).unwrap()[0].is_null());
}

#[test]
fn randomized_int64_round_trip() {
    use rand::prelude::*;

    let mut rng = StdRng::seed_from_u64(0x7e9a);
    let entry_count = 512;
    let layout = grouped_layout(entry_count).slot(8, 8).build();
    let mut rs = rowset_with(layout, vec![TargetInfo::projection(LogicalType::Int64)]);

    let mut expected = Vec::new();
    for entry in 0..entry_count {
        if rng.random_bool(0.2) {
            continue; // leave the entry empty
        }
        occupy(&mut rs, entry);
        if rng.random_bool(0.1) {
            rs.storage_mut(0)
                .write_slot_int(entry, 0, inline_int_null_value(8));
            expected.push(None);
        } else {
            let v: i64 = rng.random_range(-1_000_000..1_000_000);
            rs.storage_mut(0).write_slot_int(entry, 0, v);
            expected.push(Some(v));
        }
    }

    let decoded: Vec<Option<i64>> = rs
        .row_iter(true, false)
        .map(|row| match row[0] {
            Datum::Null => None,
            Datum::Int(v) => Some(v),
            ref other => panic!("unexpected datum {other:?}"),
        })
        .collect();
    assert_eq!(decoded, expected);
    assert_eq!(rs.row_count(), expected.len());
}

#[test]
fn shared_key_value_slot_reads_logical_width() {
    // Single-column perfect hash where the 8-byte slot carries a 4-byte
    // logical value.
    let layout = ResultLayout::builder(QueryDescription::GroupByPerfectHash, 2)
        .keys(1, 8)
        .slot(8, 4)
        .build();
    let mut rs = rowset_with(layout, vec![TargetInfo::projection(LogicalType::Int32)]);
    occupy(&mut rs, 0);
    // Write a value whose high half is garbage; the logical-width read must
    // ignore it.
    let off_garbage = (0xdead_beefu64 << 32) as i64 | 0x0000_0042;
    rs.storage_mut(0).write_slot_int(0, 0, off_garbage);

    assert_eq!(rs.get_row_at(0).unwrap()[0], Datum::Int(0x42));
}
