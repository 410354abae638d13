use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("event index {index} is out of range for a sequence of {len} events")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid normalized time {time} for {context}")]
    TimeOutOfRange { time: f32, context: String },

    #[error("event times are not sorted: {previous} at index {index} is followed by {next}")]
    UnsortedEvents {
        index: usize,
        previous: f32,
        next: f32,
    },

    #[error(
        "event sequence was modified while its events were being dispatched (version {expected} became {actual})"
    )]
    MutationDuringIteration { expected: u32, actual: u32 },

    #[error(
        "looping dispatch from normalized time {previous} to {current} exceeds the supported loop range"
    )]
    LoopOverflow { previous: f32, current: f32 },

    #[error("unknown event: {name}")]
    UnknownEvent { name: String },

    #[error("event name '{name}' is already used at index {index}")]
    DuplicateName { name: String, index: usize },

    #[error("unknown or removed playback state")]
    UnknownState,

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("events cannot be dispatched from inside an event callback")]
    ReentrantDispatch,

    #[cfg(feature = "json")]
    #[error("failed to parse event JSON: {message}")]
    JsonParse { message: String },

    #[cfg(feature = "json")]
    #[error("unknown callback '{name}'")]
    UnknownCallback { name: String },

    #[cfg(feature = "json")]
    #[error("callback of {context} is not registered")]
    UnregisteredCallback { context: String },
}
