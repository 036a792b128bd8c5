//! Properties that must hold for every record, not only hand-picked ones.

use pdi_core::db;
use pdi_core::domain::IncidentRecord;
use pdi_core::repo;
use pdi_core::row::IncidentRow;
use proptest::prelude::*;
use time::{Duration, OffsetDateTime, UtcOffset};

/// Instants between 1970 and ~2100 with nanosecond precision and an arbitrary whole-minute offset.
fn arb_timestamp() -> impl Strategy<Value = OffsetDateTime> {
    (0i64..4_102_444_800, 0u32..1_000_000_000, -(23 * 60)..=(23 * 60i32)).prop_map(
        |(secs, nanos, offset_minutes)| {
            let offset = UtcOffset::from_whole_seconds(offset_minutes * 60).unwrap();
            let instant = OffsetDateTime::from_unix_timestamp(secs).unwrap()
                + Duration::nanoseconds(nanos.into());
            instant.to_offset(offset)
        },
    )
}

/// Keys of 1..=100 characters, mixing ASCII with multi-byte characters.
fn arb_key() -> impl Strategy<Value = String> {
    proptest::collection::vec(prop_oneof![Just('a'), Just('_'), Just('é'), Just('🚨')], 1..=100)
        .prop_map(|chars| chars.into_iter().collect())
}

fn arb_event_id() -> impl Strategy<Value = Option<i32>> {
    proptest::option::of(1..i32::MAX)
}

proptest! {
    #[test]
    fn valid_keys_are_accepted(key in arb_key(), start in arb_timestamp()) {
        let record = IncidentRecord::create(key.clone(), start, None, None).unwrap();
        prop_assert_eq!(record.deduplication_key(), key.as_str());
    }

    #[test]
    fn keys_over_limit_are_rejected(
        key in arb_key(),
        extra in proptest::collection::vec(prop_oneof![Just('x'), Just('ü')], 1..20),
        start in arb_timestamp(),
    ) {
        // Pad to exactly 100 characters, then go over.
        let mut padded: String = key.chars().chain(std::iter::repeat('k')).take(100).collect();
        padded.extend(extra);
        prop_assert!(IncidentRecord::create(padded, start, None, None).is_err());
    }

    #[test]
    fn end_before_start_is_always_rejected(
        start in arb_timestamp(),
        back_nanos in 1i64..1_000_000_000_000,
    ) {
        let mut record = IncidentRecord::create("k", start, Some(1), None).unwrap();
        let before = record.clone();
        prop_assert!(record.set_ended_at(start - Duration::nanoseconds(back_nanos)).is_err());
        prop_assert_eq!(record, before);
    }

    #[test]
    fn setting_end_twice_equals_once(
        start in arb_timestamp(),
        after_nanos in 0i64..1_000_000_000_000,
    ) {
        let end = start + Duration::nanoseconds(after_nanos);
        let mut once = IncidentRecord::create("k", start, None, Some(2)).unwrap();
        once.set_ended_at(end).unwrap();
        let mut twice = once.clone();
        twice.set_ended_at(end).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert!(!twice.is_open());
    }

    #[test]
    fn six_field_round_trip_is_lossless(
        key in arb_key(),
        start in arb_timestamp(),
        uptime in arb_event_id(),
        ssl in arb_event_id(),
        id in proptest::option::of(1..i32::MAX),
        end_after in proptest::option::of(0i64..1_000_000_000_000),
    ) {
        let mut record = IncidentRecord::create(key, start, uptime, ssl).unwrap();
        if let Some(id) = id {
            record.attach(id).unwrap();
        }
        if let Some(after) = end_after {
            record.set_ended_at(start + Duration::nanoseconds(after)).unwrap();
        }
        let values = record.to_row().into_values();
        let back = IncidentRecord::from_row(IncidentRow::from_values(values).unwrap()).unwrap();
        prop_assert_eq!(back, record);
    }

    #[test]
    fn storage_round_trip_preserves_instants(
        key in arb_key(),
        start in arb_timestamp(),
        end_after in proptest::option::of(0i64..1_000_000_000_000),
    ) {
        let mut conn = db::open_in_memory().unwrap();
        db::migrate(&mut conn).unwrap();

        let mut record = IncidentRecord::create(key, start, Some(1), None).unwrap();
        let mut persisted = repo::insert_incident(&conn, &record).unwrap();
        if let Some(after) = end_after {
            record.set_ended_at(start + Duration::nanoseconds(after)).unwrap();
            persisted.set_ended_at(start + Duration::nanoseconds(after)).unwrap();
            repo::update_incident(&conn, &persisted).unwrap();
        }

        let loaded = repo::get_incident(&conn, persisted.key().unwrap()).unwrap();
        prop_assert_eq!(&loaded, &persisted);
        prop_assert_eq!(loaded.started_at(), record.started_at());
        prop_assert_eq!(loaded.ended_at(), record.ended_at());
    }

    #[test]
    fn open_listing_follows_start_time(
        starts in proptest::collection::vec(arb_timestamp(), 1..8),
    ) {
        let mut conn = db::open_in_memory().unwrap();
        db::migrate(&mut conn).unwrap();
        for (i, start) in starts.iter().enumerate() {
            let record = IncidentRecord::create(format!("k{i}"), *start, Some(1), None).unwrap();
            repo::insert_incident(&conn, &record).unwrap();
        }

        let listed: Vec<OffsetDateTime> = repo::list_open_incidents(&conn)
            .unwrap()
            .iter()
            .map(|r| r.started_at())
            .collect();
        let mut expected = starts.clone();
        expected.sort();
        prop_assert_eq!(listed, expected);
    }
}
