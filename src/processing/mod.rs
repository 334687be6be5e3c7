//! Committed-leg processing: the review buffer, the trip log and the
//! triple-shot cue

pub mod readings;
pub mod trip_log;
pub mod triple_shot;

pub use readings::ReadingBuffer;
pub use trip_log::TripLog;
pub use triple_shot::is_triple_shot;
