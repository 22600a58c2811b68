//! Per-flow TCP stream reassembly.
//!
//! Segments arrive out of order, duplicated, and with holes. Each direction
//! of a flow tracks the next expected sequence number and a small buffer of
//! early segments; payload is released strictly in order. A hole that
//! outlives the out-of-order allowance is skipped and reported, because a
//! partial stream is still worth framing; the framer fails and resynchronizes
//! on its own.

use std::collections::HashMap;
use std::time::SystemTime;

use siege_core::flow::{Direction, Endpoint, FlowKey};
use tracing::debug;

/// Out-of-order bytes buffered per direction before a hole is given up on.
const MAX_OUT_OF_ORDER_BYTES: usize = 256 * 1024;

/// A decoded TCP segment in capture order.
#[derive(Debug, Clone)]
pub struct TcpSegment {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub seq: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: Vec<u8>,
    pub ts: SystemTime,
}

/// Ordered stream data handed to the framer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// In-order payload for one direction of a flow. `skipped` counts bytes
    /// lost to an unrecoverable hole immediately before this payload.
    Data {
        flow: FlowKey,
        dir: Direction,
        payload: Vec<u8>,
        ts: SystemTime,
        skipped: usize,
    },
    /// No more data will arrive for either side of the flow.
    Closed { flow: FlowKey, ts: SystemTime },
}

/// Signed distance from `b` to `a` in 32-bit sequence space.
fn seq_distance(a: u32, b: u32) -> i64 {
    i64::from(a.wrapping_sub(b) as i32)
}

struct PendingSegment {
    seq: u32,
    data: Vec<u8>,
    ts: SystemTime,
}

#[derive(Default)]
struct DirState {
    /// Next expected sequence number. Unset until the first segment; a
    /// capture that starts mid-flow begins wherever it begins.
    next_seq: Option<u32>,
    pending: Vec<PendingSegment>,
    pending_bytes: usize,
    fin: bool,
}

impl DirState {
    /// Index of the pending segment closest to the read point.
    fn earliest(&self) -> Option<usize> {
        let next = self.next_seq?;
        self.pending
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| seq_distance(p.seq, next))
            .map(|(i, _)| i)
    }

    fn emit(&mut self, out: &mut Vec<StreamEvent>, flow: FlowKey, dir: Direction, payload: Vec<u8>, ts: SystemTime, skipped: usize) {
        let next = self.next_seq.unwrap_or_default();
        self.next_seq = Some(next.wrapping_add(payload.len() as u32));
        out.push(StreamEvent::Data {
            flow,
            dir,
            payload,
            ts,
            skipped,
        });
    }

    /// Pop the earliest pending segment and deliver it, trimming overlap or
    /// reporting a skipped hole as needed. Returns false when nothing is
    /// buffered.
    fn pop_earliest(&mut self, out: &mut Vec<StreamEvent>, flow: FlowKey, dir: Direction) -> bool {
        let Some(idx) = self.earliest() else {
            return false;
        };
        let p = self.pending.swap_remove(idx);
        self.pending_bytes -= p.data.len();

        let next = self.next_seq.unwrap_or(p.seq);
        let rel = seq_distance(p.seq, next);
        if rel <= 0 {
            // Duplicate or partial overlap with already-delivered bytes.
            let overlap = rel.unsigned_abs() as usize;
            if overlap < p.data.len() {
                self.emit(out, flow, dir, p.data[overlap..].to_vec(), p.ts, 0);
            }
        } else {
            // Hole we are giving up on.
            let skipped = rel as usize;
            debug!(%flow, skipped, "skipping unrecoverable gap");
            self.next_seq = Some(p.seq);
            self.emit(out, flow, dir, p.data, p.ts, skipped);
        }
        true
    }

    /// Deliver every buffered segment that is now contiguous.
    fn drain_contiguous(&mut self, out: &mut Vec<StreamEvent>, flow: FlowKey, dir: Direction) {
        loop {
            let Some(next) = self.next_seq else { return };
            let Some(idx) = self.earliest() else { return };
            if seq_distance(self.pending[idx].seq, next) > 0 {
                return;
            }
            self.pop_earliest(out, flow, dir);
        }
    }

    /// Deliver everything left, holes included.
    fn flush(&mut self, out: &mut Vec<StreamEvent>, flow: FlowKey, dir: Direction) {
        while self.pop_earliest(out, flow, dir) {}
    }
}

struct FlowState {
    dirs: [DirState; 2],
    last_activity: SystemTime,
}

/// Reassembles captured TCP segments into per-direction ordered streams.
#[derive(Default)]
pub struct FlowAssembler {
    flows: HashMap<FlowKey, FlowState>,
}

impl FlowAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one segment, returning any stream events it unlocks.
    pub fn feed(&mut self, seg: TcpSegment) -> Vec<StreamEvent> {
        let (flow, dir) = FlowKey::from_segment(seg.src, seg.dst);
        let mut out = Vec::new();

        if seg.rst {
            if self.flows.remove(&flow).is_some() {
                out.push(StreamEvent::Closed { flow, ts: seg.ts });
            }
            return out;
        }

        let state = self.flows.entry(flow).or_insert_with(|| FlowState {
            dirs: [DirState::default(), DirState::default()],
            last_activity: seg.ts,
        });
        state.last_activity = seg.ts;
        let side = &mut state.dirs[dir.index()];

        if seg.syn {
            // SYN occupies one sequence number; data starts after it.
            side.next_seq = Some(seg.seq.wrapping_add(1));
        }

        if !seg.payload.is_empty() {
            let next = *side.next_seq.get_or_insert(seg.seq);
            let rel = seq_distance(seg.seq, next);
            if rel <= 0 {
                let overlap = rel.unsigned_abs() as usize;
                if overlap < seg.payload.len() {
                    side.emit(&mut out, flow, dir, seg.payload[overlap..].to_vec(), seg.ts, 0);
                    side.drain_contiguous(&mut out, flow, dir);
                }
            } else {
                side.pending_bytes += seg.payload.len();
                side.pending.push(PendingSegment {
                    seq: seg.seq,
                    data: seg.payload,
                    ts: seg.ts,
                });
                if side.pending_bytes > MAX_OUT_OF_ORDER_BYTES {
                    side.pop_earliest(&mut out, flow, dir);
                    side.drain_contiguous(&mut out, flow, dir);
                }
            }
        }

        if seg.fin {
            state.dirs[dir.index()].fin = true;
            let done = state
                .dirs
                .iter()
                .all(|d| d.fin && d.pending.is_empty());
            if done {
                out.push(StreamEvent::Closed { flow, ts: seg.ts });
                self.flows.remove(&flow);
            }
        }

        out
    }

    /// Flush and close every flow with no activity since `cutoff`.
    pub fn flush_older_than(&mut self, cutoff: SystemTime) -> Vec<StreamEvent> {
        let stale: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, s)| s.last_activity < cutoff)
            .map(|(k, _)| *k)
            .collect();
        let mut out = Vec::new();
        for flow in stale {
            self.close_flow(flow, &mut out);
        }
        out
    }

    /// Flush and close everything; used at end of capture and shutdown.
    pub fn close_all(&mut self) -> Vec<StreamEvent> {
        let flows: Vec<FlowKey> = self.flows.keys().copied().collect();
        let mut out = Vec::new();
        for flow in flows {
            self.close_flow(flow, &mut out);
        }
        out
    }

    fn close_flow(&mut self, flow: FlowKey, out: &mut Vec<StreamEvent>) {
        let Some(mut state) = self.flows.remove(&flow) else {
            return;
        };
        for dir in [Direction::AtoB, Direction::BtoA] {
            state.dirs[dir.index()].flush(out, flow, dir);
        }
        out.push(StreamEvent::Closed {
            flow,
            ts: state.last_activity,
        });
    }
}
