//! JSON form of a [`Sequence`].
//!
//! Callbacks cannot be serialized, so events refer to them by the keys of a
//! [`CallbackRegistry`]:
//!
//! ```json
//! {
//!   "events": [
//!     { "time": 0.25, "name": "left_foot", "callbacks": ["footstep"] },
//!     { "time": 0.75, "callbacks": ["footstep"] }
//!   ],
//!   "end": { "callbacks": ["loop_done"] }
//! }
//! ```
//!
//! A missing end time selects the default for the play direction.

use crate::{
    Callback, CallbackRegistry, EndEvent, Error, Event, Handler, SchedulerConfig, Sequence,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializableSequence {
    #[serde(default)]
    pub events: Vec<SerializableEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<SerializableEndEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializableEvent {
    pub time: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub callbacks: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializableEndEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f32>,
    #[serde(default)]
    pub callbacks: Vec<String>,
}

fn parse_error(error: serde_json::Error) -> Error {
    Error::JsonParse {
        message: error.to_string(),
    }
}

fn resolve(registry: &CallbackRegistry, keys: &[String]) -> Result<Handler, Error> {
    let mut handler = Handler::new();
    for key in keys {
        let callback = registry.get(key).ok_or_else(|| Error::UnknownCallback {
            name: key.clone(),
        })?;
        handler.add(callback.clone());
    }
    Ok(handler)
}

fn keys_of(
    registry: &CallbackRegistry,
    handler: &Handler,
    context: &str,
) -> Result<Vec<String>, Error> {
    handler
        .iter()
        .map(|callback: &Callback| {
            registry
                .key_of(callback)
                .map(str::to_owned)
                .ok_or_else(|| Error::UnregisteredCallback {
                    context: context.to_string(),
                })
        })
        .collect()
}

impl SerializableSequence {
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(parse_error)
    }

    pub fn to_json_string(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(parse_error)
    }

    /// Resolves callback keys and builds a sequence. Event times must already be sorted.
    pub fn build(&self, registry: &CallbackRegistry) -> Result<Sequence, Error> {
        let events = self
            .events
            .iter()
            .map(|event| {
                Ok(Event::with_handler(
                    event.time,
                    resolve(registry, &event.callbacks)?,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let mut sequence = Sequence::from_events(events)?;

        for (index, event) in self.events.iter().enumerate() {
            if event.name.is_some() {
                sequence.set_name(index, event.name.clone())?;
            }
        }

        if let Some(end) = &self.end {
            *sequence.end_event_mut() = EndEvent {
                normalized_time: f32::NAN,
                handler: resolve(registry, &end.callbacks)?,
            };
            if let Some(time) = end.time {
                sequence.set_end_time(time)?;
            }
        }
        Ok(sequence)
    }

    /// Captures `sequence`, naming each callback by its registry key.
    pub fn capture(sequence: &Sequence, registry: &CallbackRegistry) -> Result<Self, Error> {
        let events = sequence
            .iter()
            .enumerate()
            .map(|(index, event)| {
                Ok(SerializableEvent {
                    time: event.normalized_time,
                    name: sequence.name(index).map(str::to_owned),
                    callbacks: keys_of(registry, &event.handler, &format!("event {index}"))?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let end_event = sequence.end_event();
        let end = if end_event.handler.is_empty() && end_event.normalized_time.is_nan() {
            None
        } else {
            Some(SerializableEndEvent {
                time: Some(end_event.normalized_time).filter(|time| !time.is_nan()),
                callbacks: keys_of(registry, &end_event.handler, "the end event")?,
            })
        };
        Ok(Self { events, end })
    }
}

impl Sequence {
    pub fn from_json_str(input: &str, registry: &CallbackRegistry) -> Result<Self, Error> {
        SerializableSequence::from_json_str(input)?.build(registry)
    }

    pub fn to_json_string(&self, registry: &CallbackRegistry) -> Result<String, Error> {
        SerializableSequence::capture(self, registry)?.to_json_string()
    }
}

impl SchedulerConfig {
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(parse_error)
    }
}
