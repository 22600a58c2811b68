use std::fmt;
use std::net::IpAddr;

/// One end of a TCP conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Which way a segment travels within a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    AtoB,
    BtoA,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Self::AtoB => Self::BtoA,
            Self::BtoA => Self::AtoB,
        }
    }

    /// Stable side index for per-direction state arrays.
    pub fn index(self) -> usize {
        match self {
            Self::AtoB => 0,
            Self::BtoA => 1,
        }
    }
}

/// Identity of a bidirectional TCP conversation.
///
/// Endpoints are stored in canonical order (`a <= b`) so that both directions
/// of the same conversation map to one key; the direction bit distinguishes
/// them. Keys are owned by the framer that created them and dropped when the
/// flow is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub a: Endpoint,
    pub b: Endpoint,
}

impl FlowKey {
    /// Canonicalize a (src, dst) pair into a flow key and the direction the
    /// segment travels within it.
    pub fn from_segment(src: Endpoint, dst: Endpoint) -> (Self, Direction) {
        if src <= dst {
            (Self { a: src, b: dst }, Direction::AtoB)
        } else {
            (Self { a: dst, b: src }, Direction::BtoA)
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.a, self.b)
    }
}
