use crate::{Callback, EndEvent, Error, Event, Handler};
use std::cell::RefCell;
use std::rc::Rc;

/// A sequence shared between its owner and the dispatchers reading it.
pub type SharedSequence = Rc<RefCell<Sequence>>;

/// Events sorted by normalized time, plus an end event.
///
/// Every structural change (adding, removing, re-timing or reordering events) increments
/// [`Sequence::version`], which dispatchers use to detect changes made while they iterate.
/// Replacing callbacks or names is not structural, and neither is any edit of the end event:
/// dispatchers read the end time and end callbacks afresh on every update.
#[derive(Clone, Debug, Default)]
pub struct Sequence {
    events: Vec<Event>,
    // Parallel to `events`, never longer. Missing entries are unnamed.
    names: Vec<Option<String>>,
    end_event: EndEvent,
    version: u32,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Builds a sequence from events that are already sorted.
    pub fn from_events(events: Vec<Event>) -> Result<Self, Error> {
        let sequence = Self {
            events,
            ..Self::default()
        };
        sequence.assert_normalized_times(false)?;
        Ok(sequence)
    }

    pub fn into_shared(self) -> SharedSequence {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when there are no events and no end callback.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.end_event.handler.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    fn check_index(&self, index: usize) -> Result<(), Error> {
        if index < self.events.len() {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.events.len(),
            })
        }
    }

    fn check_event_time(time: f32) -> Result<(), Error> {
        if time.is_finite() {
            Ok(())
        } else {
            Err(Error::TimeOutOfRange {
                time,
                context: "event".to_string(),
            })
        }
    }

    // Equal times keep insertion order: the new event goes after them.
    fn insertion_index(&self, time: f32) -> usize {
        self.events.partition_point(|event| event.normalized_time <= time)
    }

    fn insert_name(&mut self, index: usize, name: Option<String>) {
        if index < self.names.len() {
            self.names.insert(index, name);
        } else if name.is_some() {
            self.names.resize(index, None);
            self.names.push(name);
        }
    }

    fn remove_name(&mut self, index: usize) -> Option<String> {
        if index < self.names.len() {
            self.names.remove(index)
        } else {
            None
        }
    }

    /// Inserts `event` after any events with the same time and returns its index.
    pub fn add(&mut self, event: Event) -> Result<usize, Error> {
        Self::check_event_time(event.normalized_time)?;
        if self.events.iter().any(|existing| existing.matches(&event)) {
            log::warn!(
                "an event at normalized time {} with the same callbacks is already in the sequence",
                event.normalized_time
            );
        }
        let index = self.insertion_index(event.normalized_time);
        self.events.insert(index, event);
        self.insert_name(index, None);
        self.bump_version();
        Ok(index)
    }

    pub fn add_at(&mut self, normalized_time: f32, callback: Callback) -> Result<usize, Error> {
        self.add(Event::new(normalized_time, callback))
    }

    pub fn add_named(
        &mut self,
        name: impl Into<String>,
        normalized_time: f32,
        callback: Callback,
    ) -> Result<usize, Error> {
        let name = name.into();
        if let Some(index) = self.index_of_name(&name) {
            return Err(Error::DuplicateName { name, index });
        }
        let index = self.add(Event::new(normalized_time, callback))?;
        self.insert_name_at(index, name);
        Ok(index)
    }

    fn insert_name_at(&mut self, index: usize, name: String) {
        if index >= self.names.len() {
            self.names.resize(index + 1, None);
        }
        self.names[index] = Some(name);
    }

    pub fn extend<I>(&mut self, events: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Event>,
    {
        for event in events {
            self.add(event)?;
        }
        Ok(())
    }

    /// Adds `callback` to the handler of the event at `index`.
    pub fn add_callback(&mut self, index: usize, callback: Callback) -> Result<(), Error> {
        self.check_index(index)?;
        self.events[index].handler.add(callback);
        Ok(())
    }

    pub fn remove_callback(&mut self, index: usize, callback: &Callback) -> Result<bool, Error> {
        self.check_index(index)?;
        Ok(self.events[index].handler.remove(callback))
    }

    /// Replaces every callback of the event at `index`.
    pub fn set_callback(&mut self, index: usize, callback: Callback) -> Result<(), Error> {
        self.check_index(index)?;
        self.events[index].handler = Handler::from(callback);
        Ok(())
    }

    pub fn set_callback_named(&mut self, name: &str, callback: Callback) -> Result<usize, Error> {
        let index = self.index_of_required(name)?;
        self.set_callback(index, callback)?;
        Ok(index)
    }

    /// Changes the time of the event at `index`, moving it to keep the sequence sorted.
    ///
    /// Returns the new index of the event.
    pub fn set_normalized_time(
        &mut self,
        index: usize,
        normalized_time: f32,
    ) -> Result<usize, Error> {
        self.check_index(index)?;
        Self::check_event_time(normalized_time)?;
        let mut event = self.events.remove(index);
        let name = self.remove_name(index);
        event.normalized_time = normalized_time;
        let new_index = self.insertion_index(normalized_time);
        self.events.insert(new_index, event);
        self.insert_name(new_index, name);
        self.bump_version();
        Ok(new_index)
    }

    pub fn remove(&mut self, index: usize) -> Result<Event, Error> {
        self.check_index(index)?;
        let event = self.events.remove(index);
        self.remove_name(index);
        self.bump_version();
        Ok(event)
    }

    /// Removes the first event matching `event` by time and callbacks.
    pub fn remove_event(&mut self, event: &Event) -> bool {
        match self.index_of_event(event) {
            Some(index) => self.remove(index).is_ok(),
            None => false,
        }
    }

    pub fn remove_named(&mut self, name: &str) -> Option<Event> {
        let index = self.index_of_name(name)?;
        self.remove(index).ok()
    }

    /// Removes every event and name and resets the end event.
    pub fn clear(&mut self) {
        self.events.clear();
        self.names.clear();
        self.end_event = EndEvent::default();
        self.bump_version();
    }

    pub fn copy_from(&mut self, other: &Sequence) {
        self.events.clone_from(&other.events);
        self.names.clone_from(&other.names);
        self.end_event = other.end_event.clone();
        self.bump_version();
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|candidate| candidate.as_deref() == Some(name))
    }

    pub fn index_of_required(&self, name: &str) -> Result<usize, Error> {
        self.index_of_name(name).ok_or_else(|| Error::UnknownEvent {
            name: name.to_string(),
        })
    }

    pub fn index_of_event(&self, event: &Event) -> Option<usize> {
        let start = self
            .events
            .partition_point(|e| e.normalized_time < event.normalized_time);
        self.events[start..]
            .iter()
            .take_while(|e| e.normalized_time == event.normalized_time)
            .position(|e| e.matches(event))
            .map(|offset| start + offset)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).and_then(|name| name.as_deref())
    }

    pub fn set_name(&mut self, index: usize, name: Option<String>) -> Result<(), Error> {
        self.check_index(index)?;
        match name {
            Some(name) => {
                if let Some(existing) = self.index_of_name(&name) {
                    if existing != index {
                        return Err(Error::DuplicateName {
                            name,
                            index: existing,
                        });
                    }
                }
                self.insert_name_at(index, name);
            }
            None => {
                if index < self.names.len() {
                    self.names[index] = None;
                }
            }
        }
        Ok(())
    }

    pub fn end_event(&self) -> &EndEvent {
        &self.end_event
    }

    pub fn end_event_mut(&mut self) -> &mut EndEvent {
        &mut self.end_event
    }

    pub fn end_time(&self) -> f32 {
        self.end_event.normalized_time
    }

    /// Sets the end time. NaN selects the default for the play direction.
    pub fn set_end_time(&mut self, normalized_time: f32) -> Result<(), Error> {
        if normalized_time.is_infinite() {
            return Err(Error::TimeOutOfRange {
                time: normalized_time,
                context: "end event".to_string(),
            });
        }
        self.end_event.normalized_time = normalized_time;
        Ok(())
    }

    pub fn on_end(&self) -> &Handler {
        &self.end_event.handler
    }

    /// Replaces the end callbacks. `None` removes them.
    pub fn set_on_end(&mut self, callback: Option<Callback>) {
        self.end_event.handler = callback.map(Handler::from).unwrap_or_default();
    }

    /// End time with NaN resolved for a state playing at `speed`.
    pub fn normalized_end_time(&self, speed: f32) -> f32 {
        let time = self.end_event.normalized_time;
        if time.is_nan() {
            Self::default_normalized_end_time(speed)
        } else {
            time
        }
    }

    pub fn default_normalized_start_time(speed: f32) -> f32 {
        if speed < 0.0 { 1.0 } else { 0.0 }
    }

    pub fn default_normalized_end_time(speed: f32) -> f32 {
        if speed < 0.0 { 0.0 } else { 1.0 }
    }

    /// Edits event times in place, then restores time order.
    ///
    /// The events may be left unsorted by `edit`; they are stably re-sorted afterwards and each
    /// name stays with its event. If `edit` leaves a non-finite time, the events are restored to
    /// their state before the edit and the error is returned.
    pub fn edit_unsorted<R>(&mut self, edit: impl FnOnce(&mut [Event]) -> R) -> Result<R, Error> {
        let original = self.events.clone();
        let result = edit(&mut self.events);
        if let Err(error) = self
            .events
            .iter()
            .try_for_each(|event| Self::check_event_time(event.normalized_time))
        {
            self.events = original;
            return Err(error);
        }

        let mut names = std::mem::take(&mut self.names);
        names.resize(self.events.len(), None);
        let mut pairs = std::mem::take(&mut self.events)
            .into_iter()
            .zip(names)
            .collect::<Vec<_>>();
        pairs.sort_by(|(a, _), (b, _)| a.normalized_time.total_cmp(&b.normalized_time));

        let (events, mut names): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        while names.last().is_some_and(Option::is_none) {
            names.pop();
        }
        self.events = events;
        self.names = names;
        self.bump_version();
        Ok(result)
    }

    /// Checks the ordering invariant and, for looping playback, that every time lies in `[0, 1]`.
    pub fn assert_normalized_times(&self, looping: bool) -> Result<(), Error> {
        for (index, event) in self.events.iter().enumerate() {
            let time = event.normalized_time;
            Self::check_event_time(time)?;
            if looping && !(0.0..=1.0).contains(&time) {
                return Err(Error::TimeOutOfRange {
                    time,
                    context: format!("event {index} of a looping state"),
                });
            }
            if index > 0 {
                let previous = self.events[index - 1].normalized_time;
                if previous > time {
                    return Err(Error::UnsortedEvents {
                        index: index - 1,
                        previous,
                        next: time,
                    });
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
