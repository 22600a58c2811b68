mod assembler;
mod framer;
mod source;

pub use assembler::{FlowAssembler, StreamEvent, TcpSegment};
pub use framer::HttpFramer;
pub use source::{decode_tcp, CapturedPacket, PacketSource};
