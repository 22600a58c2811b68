//! libpcap packet source.
//!
//! Capture runs on a dedicated blocking thread (libpcap's read loop is not
//! async) and feeds a bounded channel. When the channel fills, the thread
//! blocks and packets accumulate in the kernel capture buffer.

use std::net::IpAddr;
use std::path::Path;
use std::time::{Duration, SystemTime};

use siege_core::error::CaptureError;
use siege_core::flow::Endpoint;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::assembler::TcpSegment;

const CHANNEL_CAPACITY: usize = 256;

/// A raw captured frame with its capture timestamp.
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    pub data: Vec<u8>,
    pub ts: SystemTime,
}

/// Packets from a live device or an offline savefile, matching a BPF filter.
pub struct PacketSource {
    rx: mpsc::Receiver<CapturedPacket>,
}

impl PacketSource {
    /// Open a live capture on `device` with promiscuous mode and `filter`.
    pub fn live(device: &str, filter: &str) -> Result<Self, CaptureError> {
        let mut capture = pcap::Capture::from_device(device)
            .map_err(|e| CaptureError::Open(e.to_string()))?
            .promisc(true)
            .snaplen(65535)
            .timeout(1000)
            .open()
            .map_err(|e| CaptureError::Open(e.to_string()))?;
        capture
            .filter(filter, true)
            .map_err(|e| CaptureError::Filter(e.to_string()))?;
        Ok(Self::start(capture))
    }

    /// Replay a pcap savefile through the same pipeline.
    pub fn offline(path: &Path, filter: &str) -> Result<Self, CaptureError> {
        let mut capture =
            pcap::Capture::from_file(path).map_err(|e| CaptureError::Open(e.to_string()))?;
        capture
            .filter(filter, true)
            .map_err(|e| CaptureError::Filter(e.to_string()))?;
        Ok(Self::start(capture))
    }

    fn start<T: pcap::Activated + 'static>(mut capture: pcap::Capture<T>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        std::thread::spawn(move || {
            loop {
                if tx.is_closed() {
                    break;
                }
                match capture.next_packet() {
                    Ok(packet) => {
                        let captured = CapturedPacket {
                            data: packet.data.to_vec(),
                            ts: packet_timestamp(packet.header),
                        };
                        if tx.blocking_send(captured).is_err() {
                            break;
                        }
                    }
                    // Live captures poll with a read timeout so shutdown is
                    // noticed even on quiet devices.
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(pcap::Error::NoMorePackets) => {
                        debug!("packet source exhausted");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "packet capture failed");
                        break;
                    }
                }
            }
        });

        Self { rx }
    }

    /// Next captured packet, or `None` once the source is exhausted.
    pub async fn recv(&mut self) -> Option<CapturedPacket> {
        self.rx.recv().await
    }
}

fn packet_timestamp(header: &pcap::PacketHeader) -> SystemTime {
    let secs = header.ts.tv_sec.max(0) as u64;
    let micros = header.ts.tv_usec.max(0) as u64;
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_micros(micros)
}

/// Slice a captured ethernet frame down to its TCP segment, if it has one.
pub fn decode_tcp(data: &[u8], ts: SystemTime) -> Option<TcpSegment> {
    let sliced = etherparse::SlicedPacket::from_ethernet(data).ok()?;

    let (src_addr, dst_addr) = match sliced.net? {
        etherparse::NetSlice::Ipv4(v4) => (
            IpAddr::V4(v4.header().source_addr()),
            IpAddr::V4(v4.header().destination_addr()),
        ),
        etherparse::NetSlice::Ipv6(v6) => (
            IpAddr::V6(v6.header().source_addr()),
            IpAddr::V6(v6.header().destination_addr()),
        ),
    };

    let etherparse::TransportSlice::Tcp(tcp) = sliced.transport? else {
        return None;
    };

    Some(TcpSegment {
        src: Endpoint::new(src_addr, tcp.source_port()),
        dst: Endpoint::new(dst_addr, tcp.destination_port()),
        seq: tcp.sequence_number(),
        syn: tcp.syn(),
        fin: tcp.fin(),
        rst: tcp.rst(),
        payload: tcp.payload().to_vec(),
        ts,
    })
}
