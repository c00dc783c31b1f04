use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("murmur.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("murmur.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("murmur.client.request_duration_seconds");

pub(crate) static STREAM_FRAMES: Counter = Counter::new("murmur.stream.frames");
pub(crate) static STREAM_MALFORMED_FRAMES: Counter =
    Counter::new("murmur.stream.malformed_frames");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("murmur.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("murmur.stream.bytes");

pub(crate) static TURN_COMPLETED: Counter = Counter::new("murmur.turn.completed");
pub(crate) static TURN_FAILED: Counter = Counter::new("murmur.turn.failed");
pub(crate) static TURN_DURATION: Moments = Moments::new("murmur.turn.duration_seconds");

pub(crate) static BIND_REQUESTS: Counter = Counter::new("murmur.bind.requests");
pub(crate) static BIND_SHORT_CIRCUITS: Counter = Counter::new("murmur.bind.short_circuits");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_FRAMES);
    collector.register_counter(&STREAM_MALFORMED_FRAMES);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&TURN_COMPLETED);
    collector.register_counter(&TURN_FAILED);
    collector.register_moments(&TURN_DURATION);

    collector.register_counter(&BIND_REQUESTS);
    collector.register_counter(&BIND_SHORT_CIRCUITS);
}
