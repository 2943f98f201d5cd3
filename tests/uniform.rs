mod support;

use http2_priority::{ByteDistributor, StreamId, StreamState, UniformQueue};
use support::TestWriter;

fn id(n: u32) -> StreamId {
    StreamId::from(n)
}

/// The budget splits evenly across queued streams.
#[test]
fn budget_splits_evenly() {
    let mut q = UniformQueue::new();
    q.set_min_allocation_chunk(10).unwrap();
    for stream in [3, 5, 7] {
        q.stream_added(id(stream), StreamState::Open);
        q.update_streamable_bytes(id(stream), 1000, true, 1000);
    }

    let mut writer = TestWriter::with_streams(&[(3, 1000), (5, 1000), (7, 1000)]);
    assert!(q.distribute(300, &mut writer).unwrap());

    assert_eq!(writer.writes, vec![(3, 100), (5, 100), (7, 100)]);
}

/// Priority frames are accepted and ignored.
#[test]
fn priority_is_ignored() {
    let mut q = UniformQueue::new();
    q.stream_added(id(3), StreamState::Open);
    q.stream_added(id(5), StreamState::Open);
    q.update_dependency_tree(id(5), id(3), 256, true);
    q.update_streamable_bytes(id(3), 100, true, 100);
    q.update_streamable_bytes(id(5), 100, true, 100);

    let mut writer = TestWriter::with_streams(&[(3, 100), (5, 100)]);
    assert!(!q.distribute(1000, &mut writer).unwrap());

    // FIFO order, not dependency order.
    assert_eq!(writer.writes, vec![(3, 100), (5, 100)]);
}

/// Streams whose window went negative are skipped until the codec reports
/// recovery.
#[test]
fn negative_window_is_skipped() {
    let mut q = UniformQueue::new();
    q.stream_added(id(3), StreamState::Open);
    q.update_streamable_bytes(id(3), 500, true, 500);
    q.update_streamable_bytes(id(3), 500, true, -1);

    let mut writer = TestWriter::with_streams(&[(3, 500)]);
    assert!(q.distribute(1000, &mut writer).unwrap());
    assert!(writer.writes.is_empty());

    q.update_streamable_bytes(id(3), 500, true, 500);
    assert!(!q.distribute(1000, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(3, 500)]);
}

/// When the budget runs dry mid-pass the head keeps its turn.
#[test]
fn exhausted_budget_requeues_the_head() {
    let mut q = UniformQueue::new();
    q.set_min_allocation_chunk(100).unwrap();
    q.stream_added(id(3), StreamState::Open);
    q.stream_added(id(5), StreamState::Open);
    q.update_streamable_bytes(id(3), 100, true, 100);
    q.update_streamable_bytes(id(5), 100, true, 100);

    let mut writer = TestWriter::with_streams(&[(3, 100), (5, 100)]);
    assert!(q.distribute(100, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(3, 100)]);

    // Stream 5 kept its place at the head.
    assert!(!q.distribute(100, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(3, 100), (5, 100)]);
}

/// A stream with a pending frame but no streamable bytes still gets an
/// empty write.
#[test]
fn header_only_stream_gets_an_empty_write() {
    let mut q = UniformQueue::new();
    q.stream_added(id(3), StreamState::Open);
    q.update_streamable_bytes(id(3), 0, true, 100);

    let mut writer = TestWriter::with_streams(&[(3, 0)]);
    assert!(!q.distribute(1000, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(3, 0)]);
}

/// Removed streams are dropped even if still queued.
#[test]
fn removed_streams_are_skipped() {
    let mut q = UniformQueue::new();
    q.stream_added(id(3), StreamState::Open);
    q.update_streamable_bytes(id(3), 500, true, 500);
    q.stream_closed(id(3));
    q.stream_removed(id(3));

    let mut writer = TestWriter::with_streams(&[(3, 500)]);
    assert!(!q.distribute(1000, &mut writer).unwrap());
    assert!(writer.writes.is_empty());
}

/// Chunking floors at the configured minimum to keep small streams moving.
#[test]
fn chunk_never_drops_below_the_floor() {
    let mut q = UniformQueue::new();
    q.set_min_allocation_chunk(64).unwrap();
    for stream in [3, 5, 7, 9] {
        q.stream_added(id(stream), StreamState::Open);
        q.update_streamable_bytes(id(stream), 1000, true, 1000);
    }

    // An even split would be 25 bytes; the floor lifts it to 64 for the
    // streams that fit the budget.
    let mut writer = TestWriter::with_streams(&[(3, 1000), (5, 1000), (7, 1000), (9, 1000)]);
    assert!(q.distribute(100, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(3, 64), (5, 36)]);
}
