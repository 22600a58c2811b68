mod aggregator;
mod decode;
mod event;
mod metrics;
mod publisher;

pub use aggregator::Aggregator;
pub use decode::decode_body;
pub use metrics::MetricRegistry;
pub use publisher::{Publisher, DEFAULT_PUBLISH_INTERVAL};
