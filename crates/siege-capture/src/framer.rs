//! Stateful HTTP/1 message framing over reassembled flows.
//!
//! Each side of a flow owns an unparsed buffer and a queue of framed
//! requests awaiting their responses. Requests pair with responses in FIFO
//! order per side (pipelining), and a side's request queue is drained only by
//! activity on the opposite side. Framing never reorders; a lost response
//! desynchronizes the queue until the flow ages out.

use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use siege_core::flow::{Direction, FlowKey};
use siege_core::http1::{self, Request, Status};
use siege_core::pair::HttpPair;
use tracing::{debug, warn};

use crate::assembler::StreamEvent;

/// Per-side buffers past this size are discarded rather than grown.
const MAX_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// A buffer that still fails hard parsing past this size is abandoned rather
/// than retried on every delivery.
const MAX_RETRY_BYTES: usize = 64 * 1024;

#[derive(Default)]
struct SideState {
    buffer: Vec<u8>,
    buffer_start_ts: Option<SystemTime>,
    buffer_end_ts: Option<SystemTime>,
    /// Framed request blobs awaiting the opposite side's responses, oldest
    /// first, with the capture timestamp of their first byte.
    request_queue: VecDeque<(Vec<u8>, SystemTime)>,
}

impl SideState {
    fn append(&mut self, payload: &[u8], ts: SystemTime) {
        if self.buffer.is_empty() {
            self.buffer_start_ts = Some(ts);
        }
        self.buffer.extend_from_slice(payload);
        self.buffer_end_ts = Some(ts);
    }

    /// Remove a framed message from the front of the buffer. Bytes behind it
    /// arrived in the delivery that completed it, so the remainder inherits
    /// the end timestamp as its start.
    fn consume(&mut self, n: usize) -> Vec<u8> {
        let blob: Vec<u8> = self.buffer.drain(..n).collect();
        self.buffer_start_ts = self.buffer_end_ts;
        blob
    }
}

#[derive(Default)]
struct FlowFramer {
    sides: [SideState; 2],
}

impl FlowFramer {
    /// Run the framing procedure for one side until it needs more input.
    fn pump(&mut self, flow: FlowKey, dir: Direction, eof: bool, out: &mut Vec<HttpPair>) {
        loop {
            let side_idx = dir.index();
            let opposite_idx = dir.flip().index();
            if self.sides[side_idx].buffer.is_empty() {
                return;
            }

            // A complete request joins this side's queue to await its
            // response from the opposite side.
            match http1::parse_request(&self.sides[side_idx].buffer) {
                Ok(Status::Complete { consumed, .. }) => {
                    let side = &mut self.sides[side_idx];
                    let start = side.buffer_start_ts.unwrap_or(SystemTime::UNIX_EPOCH);
                    let blob = side.consume(consumed);
                    side.request_queue.push_back((blob, start));
                    continue;
                }
                Ok(Status::Partial) => return,
                Err(_) => {
                    // Not a request; try response framing below.
                }
            }

            // Response framing is disambiguated by the head request on the
            // opposite side, which was validated on ingress.
            let head_request: Option<Request> = self.sides[opposite_idx]
                .request_queue
                .front()
                .and_then(|(blob, _)| match http1::parse_request(blob) {
                    Ok(Status::Complete { message, .. }) => Some(message),
                    _ => None,
                });

            match http1::parse_response(&self.sides[side_idx].buffer, head_request.as_ref(), eof) {
                Ok(Status::Complete { consumed, .. }) => {
                    let end = self.sides[side_idx]
                        .buffer_end_ts
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    let response = self.sides[side_idx].consume(consumed);
                    match self.sides[opposite_idx].request_queue.pop_front() {
                        Some((request, start)) => {
                            let duration = end.duration_since(start).unwrap_or_default();
                            out.push(HttpPair {
                                request,
                                response,
                                duration,
                            });
                        }
                        None => {
                            debug!(%flow, "response with no pending request, discarding");
                        }
                    }
                    continue;
                }
                Ok(Status::Partial) => return,
                Err(e) => {
                    let side = &mut self.sides[side_idx];
                    if side.buffer.len() > MAX_RETRY_BYTES {
                        warn!(
                            %flow,
                            error = %e,
                            bytes = side.buffer.len(),
                            "unparseable buffer exceeded retry limit, discarding"
                        );
                        side.buffer.clear();
                    }
                    return;
                }
            }
        }
    }
}

/// Frames HTTP messages out of reassembled streams and pairs them.
#[derive(Default)]
pub struct HttpFramer {
    flows: HashMap<FlowKey, FlowFramer>,
}

impl HttpFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one stream event, returning any request/response pairs it
    /// completed.
    pub fn handle(&mut self, event: StreamEvent) -> Vec<HttpPair> {
        let mut out = Vec::new();
        match event {
            StreamEvent::Data {
                flow,
                dir,
                payload,
                ts,
                skipped,
            } => {
                if skipped > 0 {
                    warn!(%flow, skipped, "continuing after lost stream bytes");
                }
                let framer = self.flows.entry(flow).or_default();
                let side = &mut framer.sides[dir.index()];
                if side.buffer.len() + payload.len() > MAX_BUFFER_BYTES {
                    warn!(
                        %flow,
                        bytes = side.buffer.len(),
                        "side buffer exceeded limit, discarding"
                    );
                    side.buffer.clear();
                }
                side.append(&payload, ts);
                framer.pump(flow, dir, false, &mut out);
            }
            StreamEvent::Closed { flow, .. } => {
                // Final pass with EOF semantics so read-until-close response
                // bodies can complete, then the flow's state is dropped.
                if let Some(mut framer) = self.flows.remove(&flow) {
                    framer.pump(flow, Direction::AtoB, true, &mut out);
                    framer.pump(flow, Direction::BtoA, true, &mut out);
                }
            }
        }
        out
    }

    /// Number of flows currently holding framing state.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }
}
