mod common;

use std::sync::Arc;
use std::thread;

use bagmanager::core::{BagManager, Error, Message, ReaderConfig};
use common::{write_scenario_bag, SEC};
use tempfile::tempdir;

#[test]
fn scenario_queries_against_bag_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("scenario.bag");
    write_scenario_bag(&path);

    let bag = BagManager::open(&path).expect("open");
    assert_eq!(bag.path(), path.as_path());

    let msg = bag
        .get_closest_message_by_rosbag_time("B", 2 * SEC)
        .expect("closest");
    assert_eq!(msg.body(), format!("b@{}", 5 * SEC / 2).as_bytes());

    let counts = bag
        .get_message_count_in_interval(Some(&["A", "B"][..]), Some(SEC), Some(3 * SEC))
        .expect("counts");
    assert_eq!(counts.get("A"), Some(3));
    assert_eq!(counts.get("B"), Some(1));

    let last = bag.get_message_by_index("A", 4).expect("last");
    assert_eq!(last.body(), format!("a@{}", 4 * SEC).as_bytes());
    assert!(matches!(
        bag.get_message_by_index("A", 5),
        Err(Error::IndexOutOfRange { .. })
    ));
}

#[test]
fn header_times_come_from_payload_stamps() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("scenario.bag");
    write_scenario_bag(&path);

    let bag = BagManager::open(&path).expect("open");
    let info = bag.get_topic_info("A", true).expect("info");
    let expected: Vec<u64> = info.rosbag_times().iter().map(|t| t + 10).collect();
    assert_eq!(info.header_times(), Some(expected.as_slice()));

    let msg = bag
        .get_closest_message_by_header_time("A", 2 * SEC + 10)
        .expect("closest");
    assert_eq!(msg.header_timestamp().expect("stamp"), Some(2 * SEC + 10));
    assert_eq!(msg.type_name(), "test/Stamped");

    assert!(matches!(
        bag.get_closest_message_by_header_time("B", SEC),
        Err(Error::HeaderTimesUnavailable(_))
    ));
}

#[test]
fn summary_of_bag_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("scenario.bag");
    write_scenario_bag(&path);

    let bag = BagManager::open(&path).expect("open");
    let summary = bag.summary().expect("summary").with_path(bag.path());
    assert_eq!(summary.messages, 8);
    assert_eq!(summary.duration_ns(), 9 * SEC / 2);
    assert_eq!(summary.topics.len(), 3);
    assert_eq!(summary.topics[2].topic, "idle");
    assert_eq!(summary.topics[2].message_count, 0);

    let text = summary.to_string();
    assert!(text.contains("messages: 8"));
    assert!(text.contains("test/Plain"));

    let json = serde_json::to_value(&summary).expect("json");
    assert_eq!(json["messages"], 8);
    assert_eq!(json["topics"][0]["topic"], "A");
}

#[test]
fn truncated_payload_stamp_is_a_decode_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("short.bag");
    let mut writer = bagmanager::core::BagWriter::create(&path).expect("create");
    let conn = writer.add_connection("cam", "test/Image", true).expect("conn");
    writer.write(conn, 1, Some(1), b"ok").expect("write");
    writer.write_raw(conn, 2, b"abc").expect("write raw");
    writer.finish().expect("finish");

    let bag = BagManager::open(&path).expect("open");
    assert!(matches!(
        bag.get_topic_info("cam", true),
        Err(Error::Decode { position: 1, .. })
    ));
    assert_eq!(bag.get_topic_info("cam", false).expect("info").message_count(), 2);
}

#[test]
fn open_errors_are_log_open() {
    let dir = tempdir().expect("tempdir");
    let err = BagManager::open(dir.path().join("absent.bag"))
        .err()
        .expect("missing file");
    assert!(matches!(err, Error::LogOpen { .. }));

    let bogus = dir.path().join("bogus.bag");
    std::fs::write(&bogus, b"definitely not a bag file, just some text that is long enough")
        .expect("write");
    let err = BagManager::open_with_config(&bogus, ReaderConfig { verify_crc: false })
        .err()
        .expect("bad magic");
    assert!(matches!(err, Error::LogOpen { .. }));
}

#[test]
fn concurrent_queries_share_cached_indexes() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("scenario.bag");
    write_scenario_bag(&path);

    let bag = Arc::new(BagManager::open(&path).expect("open"));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let bag = Arc::clone(&bag);
            thread::spawn(move || {
                let info = bag.get_topic_info("A", i % 2 == 0).expect("info");
                let counts = bag
                    .get_message_count_in_interval(None, None, None)
                    .expect("counts");
                (info.message_count(), counts.total())
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("join"), (5, 8));
    }

    let cached = bag.cached_index("A").expect("cached");
    assert!(cached.has_header_times());
    assert_eq!(cached.header_times().map(<[u64]>::len), Some(5));
}
