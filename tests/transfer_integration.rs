//! End-to-end transfers between two managers
//!
//! Covers each transfer variant (file, memory, registered memory, object),
//! both packet sizes, and the failure statuses a server reports back.

use std::fs;
use std::sync::Arc;
use uuid::Uuid;
use xfer_core::packet::{DEFAULT_CHUNK_SIZE, decode_packet_num, is_last_packet, split_size_prefix};
use xfer_core::{Completion, ErrorCode, FileRequest, XferState};
use xfer_files::{LocationKind, MemoryObjectStore, ObjectKey, ObjectType};
use xfer_integration_tests::{Pair, Side, host_a, host_b, payload};
use xfer_transport::XferMessage;

#[test]
fn test_file_download_from_cache() {
    let mut pair = Pair::new();
    let data = payload(2500);
    pair.put_in_cache_b("abcdef.tmp", &data);
    let local = pair.dir().join("downloaded.bin");

    let (done, mut rx) = Completion::channel();
    let id = pair.a.request_file(
        FileRequest::new(local.clone(), "abcdef.tmp", LocationKind::Cache, host_b())
            .with_completion(done),
    );

    // Request, then three data packets each confirmed
    assert_eq!(pair.pump(), 7);

    let outcome = rx.try_recv().unwrap();
    assert_eq!(outcome.id, id);
    assert_eq!(outcome.status, Ok(()));
    assert!(outcome.data.is_none());
    assert_eq!(fs::read(&local).unwrap(), data);

    assert!(pair.a.receive_list().is_empty());
    assert!(pair.b.send_list().is_empty());
    assert_eq!(pair.b.num_active_xfers(&host_a()), 0);
    // Source is kept unless deletion was asked for
    assert!(pair.cache_b().join("abcdef.tmp").exists());
}

#[test]
fn test_200k_file_download() {
    let mut pair = Pair::new();
    let data = payload(200_000);
    pair.put_in_cache_b("twohundredk.tmp", &data);
    let local = pair.dir().join("twohundredk.bin");

    let (done, mut rx) = Completion::channel();
    pair.a.request_file(
        FileRequest::new(local.clone(), "twohundredk.tmp", LocationKind::Cache, host_b())
            .with_completion(done),
    );

    let mut sequence = Vec::new();
    let mut first_prefix = None;
    let mut last_flags = 0;
    pair.pump_with(|side, out| {
        if side == Side::B {
            if let Ok(XferMessage::Data(packet)) = out.message() {
                let num = decode_packet_num(packet.packet_number);
                if num == 0 {
                    first_prefix = split_size_prefix(&packet.data).map(|(size, _)| size);
                }
                if is_last_packet(packet.packet_number) {
                    last_flags += 1;
                }
                sequence.push(num);
            }
        }
        false
    });

    let expected = 200_000usize.div_ceil(DEFAULT_CHUNK_SIZE);
    assert_eq!(sequence.len(), expected);
    assert!(sequence.iter().enumerate().all(|(i, &n)| n as usize == i));
    assert_eq!(first_prefix, Some(200_000));
    assert_eq!(last_flags, 1);

    // Spans several buffer flushes into the temp file
    assert!(data.len() > pair.a.config().max_buffer_size);
    assert!(rx.try_recv().unwrap().is_ok());
    assert_eq!(fs::read(&local).unwrap(), data);
    assert!(fs::read_dir(&pair.a.config().temp_dir).unwrap().next().is_none());
}

#[test]
fn test_big_packets() {
    let mut pair = Pair::new();
    let data = payload(20_000);
    pair.put_in_cache_b("bigfile.tmp", &data);
    let local = pair.dir().join("big.bin");

    let (done, mut rx) = Completion::channel();
    pair.a.request_file(
        FileRequest::new(local.clone(), "bigfile.tmp", LocationKind::Cache, host_b())
            .with_completion(done)
            .big_packets(),
    );

    // 7680 + 7680 + 4640
    assert_eq!(pair.pump(), 7);
    assert!(rx.try_recv().unwrap().is_ok());
    assert_eq!(fs::read(&local).unwrap(), data);
}

#[test]
fn test_exact_packet_multiple() {
    let mut pair = Pair::new();
    let data = payload(3000);
    pair.put_in_cache_b("exactly3k.tmp", &data);

    let (done, mut rx) = Completion::channel();
    pair.a.request_memory(
        "exactly3k.tmp",
        LocationKind::Cache,
        host_b(),
        false,
        Some(done),
        false,
    );

    assert_eq!(pair.pump(), 7);
    assert_eq!(rx.try_recv().unwrap().data.unwrap(), data);
}

#[test]
fn test_delete_remote_on_completion() {
    let mut pair = Pair::new();
    let data = payload(1200);
    let source = pair.put_in_cache_b("deleteme.tmp", &data);
    let local = pair.dir().join("kept.bin");
    fs::write(&local, b"stale").unwrap();

    let (done, mut rx) = Completion::channel();
    pair.a.request_file(
        FileRequest::new(local.clone(), "deleteme.tmp", LocationKind::Cache, host_b())
            .with_completion(done)
            .delete_remote_on_completion(),
    );
    pair.pump();

    assert!(rx.try_recv().unwrap().is_ok());
    assert_eq!(fs::read(&local).unwrap(), data);
    assert!(!source.exists());
}

#[test]
fn test_memory_download() {
    let mut pair = Pair::new();
    let data = payload(4321);
    pair.put_in_cache_b("memory_src.tmp", &data);

    let (done, mut rx) = Completion::channel();
    pair.a.request_memory(
        "memory_src.tmp",
        LocationKind::Cache,
        host_b(),
        false,
        Some(done),
        false,
    );
    pair.pump();

    let outcome = rx.try_recv().unwrap();
    assert_eq!(outcome.status, Ok(()));
    assert_eq!(outcome.data.unwrap(), data);
}

#[test]
fn test_registered_memory_download() {
    let mut pair = Pair::new();
    let data = payload(1800);
    let id = pair.b.register_xfer(data.clone());
    assert_eq!(
        pair.b.send_list().find(id).unwrap().state(),
        XferState::Registered
    );

    let (done, mut rx) = Completion::channel();
    let requested = pair
        .a
        .request_registered_memory(id, host_b(), Some(done), false);
    assert_eq!(requested, id);
    pair.pump();

    let outcome = rx.try_recv().unwrap();
    assert_eq!(outcome.id, id);
    assert_eq!(outcome.data.unwrap(), data);
    assert!(pair.b.send_list().is_empty());
}

#[test]
fn test_object_download() {
    let mut pair = Pair::new();
    let local_store = MemoryObjectStore::new();
    let remote_store = MemoryObjectStore::new();
    let kind = ObjectType(0);
    let (local_id, remote_id) = (Uuid::new_v4(), Uuid::new_v4());
    let data = payload(5000);
    remote_store.insert(ObjectKey::new(remote_id, kind), data.clone());

    pair.a = pair.a.with_object_store(Arc::new(local_store.clone()));
    pair.b = pair.b.with_object_store(Arc::new(remote_store));

    let (done, mut rx) = Completion::channel();
    pair.a
        .request_object(local_id, remote_id, kind, host_b(), Some(done), false);
    pair.pump();

    assert!(rx.try_recv().unwrap().is_ok());
    assert_eq!(local_store.get(&ObjectKey::new(local_id, kind)).unwrap(), data);
    // Only the committed object remains
    assert_eq!(local_store.len(), 1);
}

#[test]
fn test_large_object_download() {
    let mut pair = Pair::new();
    let local_store = MemoryObjectStore::new();
    let remote_store = MemoryObjectStore::new();
    let kind = ObjectType(0);
    let (local_id, remote_id) = (Uuid::new_v4(), Uuid::new_v4());
    let data = payload(200_001);
    remote_store.insert(ObjectKey::new(remote_id, kind), data.clone());

    pair.a = pair.a.with_object_store(Arc::new(local_store.clone()));
    pair.b = pair.b.with_object_store(Arc::new(remote_store));

    let (done, mut rx) = Completion::channel();
    pair.a
        .request_object(local_id, remote_id, kind, host_b(), Some(done), true);
    pair.pump();

    assert!(data.len() > pair.a.config().max_buffer_size);
    assert!(rx.try_recv().unwrap().is_ok());
    assert_eq!(local_store.get(&ObjectKey::new(local_id, kind)).unwrap(), data);
    assert_eq!(local_store.len(), 1);
}

#[test]
fn test_object_request_deduplicated() {
    let mut pair = Pair::new();
    let (local_id, remote_id) = (Uuid::new_v4(), Uuid::new_v4());
    let first = pair
        .a
        .request_object(local_id, remote_id, ObjectType(1), host_b(), None, false);
    let second = pair
        .a
        .request_object(local_id, remote_id, ObjectType(1), host_b(), None, false);
    assert_eq!(first, second);
    assert_eq!(pair.a.receive_list().len(), 1);
}

#[test]
fn test_missing_file_reports_not_found() {
    let mut pair = Pair::new();
    let local = pair.dir().join("never.bin");

    let (done, mut rx) = Completion::channel();
    pair.a.request_file(
        FileRequest::new(local.clone(), "nosuchfile.tmp", LocationKind::Cache, host_b())
            .with_completion(done),
    );
    pair.pump();

    assert_eq!(rx.try_recv().unwrap().status, Err(ErrorCode::FileNotFound));
    assert!(!local.exists());
    assert!(pair.a.receive_list().is_empty());
}

#[test]
fn test_empty_file_reports_empty() {
    let mut pair = Pair::new();
    pair.put_in_cache_b("emptyfile.tmp", b"");

    let (done, mut rx) = Completion::channel();
    pair.a.request_memory(
        "emptyfile.tmp",
        LocationKind::Cache,
        host_b(),
        false,
        Some(done),
        false,
    );
    pair.pump();

    assert_eq!(rx.try_recv().unwrap().status, Err(ErrorCode::FileEmpty));
}

#[test]
fn test_unknown_registered_id_reports_not_found() {
    let mut pair = Pair::new();
    let (done, mut rx) = Completion::channel();
    pair.a.request_registered_memory(
        xfer_core::TransferId::from_raw(0xdead_beef),
        host_b(),
        Some(done),
        false,
    );
    pair.pump();

    assert_eq!(rx.try_recv().unwrap().status, Err(ErrorCode::FileNotFound));
}

#[test]
fn test_missing_object_reports_not_found() {
    let mut pair = Pair::new();
    let (done, mut rx) = Completion::channel();
    pair.a.request_object(
        Uuid::new_v4(),
        Uuid::new_v4(),
        ObjectType(3),
        host_b(),
        Some(done),
        false,
    );
    pair.pump();

    assert_eq!(rx.try_recv().unwrap().status, Err(ErrorCode::FileNotFound));
}
