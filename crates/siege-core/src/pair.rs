use std::time::Duration;

/// A framed request blob matched with the response blob that answered it.
///
/// `duration` runs from the capture timestamp of the first request byte to
/// the capture timestamp of the last response byte, so it includes response
/// transmission time.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpPair {
    pub request: Vec<u8>,
    pub response: Vec<u8>,
    pub duration: Duration,
}
