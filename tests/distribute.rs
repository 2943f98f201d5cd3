mod support;

use http2_priority::{ByteDistributor, StreamId, StreamState, WeightedFairQueue};
use support::TestWriter;

fn id(n: u32) -> StreamId {
    StreamId::from(n)
}

/// Two equally weighted streams alternate and end up with identical byte
/// counts.
#[test]
fn equal_weights_share_evenly() {
    let mut q = WeightedFairQueue::new();
    q.set_allocation_quantum(100).unwrap();
    q.stream_added(id(3), StreamState::Open);
    q.stream_added(id(5), StreamState::Open);
    q.update_streamable_bytes(id(3), 1000, true, i32::MAX);
    q.update_streamable_bytes(id(5), 1000, true, i32::MAX);

    let mut writer = TestWriter::replenishing(&[(3, 1000), (5, 1000)]);
    for _ in 0..1000 {
        assert!(q.distribute(100, &mut writer).unwrap());
    }

    // The first slot goes to the stream that was added first.
    assert_eq!(writer.writes[0], (3, 100));
    assert_eq!(writer.writes[1], (5, 100));
    assert_eq!(writer.written(3), 500 * 100);
    assert_eq!(writer.written(5), 500 * 100);
}

/// A 24:8 weighting converges to a 3:1 byte split.
#[test]
fn three_to_one_weighting_converges() {
    let mut q = WeightedFairQueue::new();
    q.set_allocation_quantum(100).unwrap();
    q.stream_added(id(3), StreamState::Open);
    q.stream_added(id(5), StreamState::Open);
    q.update_dependency_tree(id(3), id(0), 24, false);
    q.update_dependency_tree(id(5), id(0), 8, false);
    q.update_streamable_bytes(id(3), 10_000, true, i32::MAX);
    q.update_streamable_bytes(id(5), 10_000, true, i32::MAX);

    let mut writer = TestWriter::replenishing(&[(3, 10_000), (5, 10_000)]);
    for _ in 0..1000 {
        assert!(q.distribute(100, &mut writer).unwrap());
    }

    assert_eq!(writer.written(3) + writer.written(5), 100_000);
    let ratio = writer.written(3) as f64 / writer.written(5) as f64;
    assert!((2.8..=3.2).contains(&ratio), "ratio {} out of range", ratio);
}

/// A parent with nothing to send does not block its subtree.
#[test]
fn blocked_parent_passes_bytes_through() {
    let mut q = WeightedFairQueue::new();
    q.stream_added(id(3), StreamState::Open);
    q.stream_added(id(5), StreamState::Open);
    q.update_dependency_tree(id(5), id(3), 16, false);
    q.update_streamable_bytes(id(3), 0, false, 0);
    q.update_streamable_bytes(id(5), 500, true, 500);

    let mut writer = TestWriter::with_streams(&[(5, 500)]);
    let still_active = q.distribute(500, &mut writer).unwrap();

    assert_eq!(writer.writes, vec![(5, 500)]);
    assert!(!still_active);
}

/// Bytes flow down an inactive chain to the single active leaf.
#[test]
fn deep_chain_reaches_the_leaf() {
    let mut q = WeightedFairQueue::new();
    for stream in [3, 5, 7] {
        q.stream_added(id(stream), StreamState::Open);
    }
    q.update_dependency_tree(id(5), id(3), 16, false);
    q.update_dependency_tree(id(7), id(5), 16, false);
    q.update_streamable_bytes(id(7), 200, true, 200);

    let mut writer = TestWriter::with_streams(&[(7, 200)]);
    assert!(!q.distribute(1000, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(7, 200)]);
}

/// A zero budget still emits one empty write so the codec can flush an
/// empty frame, and the stream stays eligible.
#[test]
fn zero_budget_emits_an_empty_write() {
    let mut q = WeightedFairQueue::new();
    q.stream_added(id(3), StreamState::Open);
    q.update_streamable_bytes(id(3), 1000, true, 1000);

    let mut writer = TestWriter::with_streams(&[(3, 1000)]);
    assert!(q.distribute(0, &mut writer).unwrap());
    assert!(q.distribute(0, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(3, 0), (3, 0)]);
}

/// The budget caps a pass, and the remainder is picked up by the next.
#[test]
fn budget_is_respected_across_passes() {
    let mut q = WeightedFairQueue::new();
    q.stream_added(id(3), StreamState::Open);
    q.update_streamable_bytes(id(3), 1000, true, 1000);

    let mut writer = TestWriter::with_streams(&[(3, 1000)]);
    assert!(q.distribute(300, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(3, 300)]);

    assert!(!q.distribute(10_000, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(3, 300), (3, 700)]);

    // Everything is drained.
    assert!(!q.distribute(10_000, &mut writer).unwrap());
    assert_eq!(writer.writes.len(), 2);
}

/// An active stream that cannot use its slot is written once with zero
/// bytes and then taken out of rotation instead of starving its sibling.
#[test]
fn empty_active_stream_stops_blocking_siblings() {
    let mut q = WeightedFairQueue::new();
    q.stream_added(id(3), StreamState::Open);
    q.stream_added(id(5), StreamState::Open);
    // Stream 3 claims a pending frame but has nothing streamable.
    q.update_streamable_bytes(id(3), 0, true, 100);
    q.update_streamable_bytes(id(5), 400, true, 400);

    let mut writer = TestWriter::with_streams(&[(3, 0), (5, 400)]);
    assert!(!q.distribute(400, &mut writer).unwrap());

    assert!(writer.writes.contains(&(5, 400)));
    assert_eq!(writer.written(3), 0);
}
