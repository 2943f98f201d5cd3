#![allow(dead_code)]

use std::collections::HashMap;
use std::error;

use http2_priority::{PendingUpdates, StreamId, StreamWriter};

/// Models the codec side of a distribution pass: tracks how many bytes
/// each stream has left and reports the new readiness after every write,
/// the way the real flow controller would.
pub struct TestWriter {
    pub writes: Vec<(u32, usize)>,
    remaining: HashMap<u32, usize>,
    replenish: bool,
}

impl TestWriter {
    /// Streams drain as they are written and go quiet when empty.
    pub fn with_streams(streams: &[(u32, usize)]) -> TestWriter {
        TestWriter {
            writes: Vec::new(),
            remaining: streams.iter().copied().collect(),
            replenish: false,
        }
    }

    /// Streams never run out of data; readiness is re-reported unchanged.
    pub fn replenishing(streams: &[(u32, usize)]) -> TestWriter {
        TestWriter {
            replenish: true,
            ..TestWriter::with_streams(streams)
        }
    }

    /// Total bytes written to `stream_id` so far.
    pub fn written(&self, stream_id: u32) -> usize {
        self.writes
            .iter()
            .filter(|(id, _)| *id == stream_id)
            .map(|(_, len)| len)
            .sum()
    }
}

impl StreamWriter for TestWriter {
    fn write(
        &mut self,
        stream_id: StreamId,
        len: usize,
        pending: &mut PendingUpdates,
    ) -> Result<(), Box<dyn error::Error + Send + Sync>> {
        let id: u32 = stream_id.into();
        self.writes.push((id, len));

        if let Some(remaining) = self.remaining.get_mut(&id) {
            if !self.replenish {
                *remaining = remaining.saturating_sub(len);
            }
            let remaining = *remaining;
            pending.push(stream_id, remaining, remaining > 0, i32::MAX);
        }
        Ok(())
    }
}
