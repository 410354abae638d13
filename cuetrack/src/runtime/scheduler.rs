use super::dispatcher::{DispatchStatus, Dispatcher};
use crate::{
    Error, EventContext, Handler, InvokedEvent, PlaybackState, Sequence, SharedSequence,
};
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "json", serde(default))]
pub struct SchedulerConfig {
    /// Whether new states drop their events when they are played again.
    pub auto_clear: bool,
    /// Log a warning the first time an end event fires on consecutive updates.
    pub warn_end_event_interrupt: bool,
    /// Dispatchers allocated up front.
    pub prewarm_dispatchers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_clear: true,
            warn_end_event_interrupt: true,
            prewarm_dispatchers: 0,
        }
    }
}

/// Weak reference to a state registered with an [`EventScheduler`].
///
/// Handles of removed states stop resolving, even when their slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateHandle {
    index: usize,
    generation: u32,
}

impl StateHandle {
    fn with_record_mut<R>(
        &self,
        scheduler: &mut EventScheduler,
        f: impl FnOnce(&mut StateRecord) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let record = scheduler.record_mut(*self).ok_or(Error::UnknownState)?;
        f(record)
    }

    pub fn set_speed(&self, scheduler: &mut EventScheduler, speed: f32) -> Result<(), Error> {
        self.with_record_mut(scheduler, |record| record.playback.set_speed(speed))
    }

    pub fn set_looping(&self, scheduler: &mut EventScheduler, looping: bool) -> Result<(), Error> {
        self.with_record_mut(scheduler, |record| {
            record.playback.set_looping(looping);
            Ok(())
        })
    }

    pub fn set_length(&self, scheduler: &mut EventScheduler, length: f32) -> Result<(), Error> {
        self.with_record_mut(scheduler, |record| {
            record.playback.set_length(length)?;
            record.restarted = false;
            Ok(())
        })
    }

    /// Jumps to `time` seconds. Events between the old and new time do not fire.
    pub fn set_time(&self, scheduler: &mut EventScheduler, time: f32) -> Result<(), Error> {
        self.with_record_mut(scheduler, |record| {
            record.playback.set_time(time)?;
            record.restarted = false;
            Ok(())
        })
    }

    pub fn set_normalized_time(
        &self,
        scheduler: &mut EventScheduler,
        normalized_time: f32,
    ) -> Result<(), Error> {
        self.with_record_mut(scheduler, |record| {
            record.playback.set_normalized_time(normalized_time)?;
            record.restarted = false;
            Ok(())
        })
    }

    /// Moves to `time` seconds. Events between the old and new time fire at the next dispatch.
    pub fn move_time(&self, scheduler: &mut EventScheduler, time: f32) -> Result<(), Error> {
        self.with_record_mut(scheduler, |record| record.playback.move_time(time))
    }

    /// Keeps the events of this state when it is played again if `auto_clear` is false.
    pub fn set_auto_clear(
        &self,
        scheduler: &mut EventScheduler,
        auto_clear: bool,
    ) -> Result<(), Error> {
        self.with_record_mut(scheduler, |record| {
            record.auto_clear = auto_clear;
            Ok(())
        })
    }
}

#[derive(Debug)]
struct StateRecord {
    playback: PlaybackState,
    events: Option<SharedSequence>,
    // Created by `events()` rather than assigned, so it may be cleared in place.
    owns_events: bool,
    auto_clear: bool,
    restarted: bool,
    dispatcher: Option<Dispatcher>,
}

impl StateRecord {
    fn has_pending_events(&self) -> bool {
        self.events
            .as_ref()
            .is_some_and(|events| !events.borrow().is_empty())
    }

    fn accepts(&self, dispatcher: &Dispatcher) -> bool {
        self.dispatcher.is_none()
            && self.playback.is_playing()
            && self.has_pending_events()
            && self
                .events
                .as_ref()
                .is_some_and(|events| dispatcher.is_bound_to(events))
    }
}

#[derive(Debug)]
struct StateSlot {
    generation: u32,
    state: Option<StateRecord>,
}

/// Owns playback states and dispatches their events as their time advances.
#[derive(Debug)]
pub struct EventScheduler {
    config: SchedulerConfig,
    slots: Vec<StateSlot>,
    free_list: Vec<usize>,
    dispatcher_pool: Vec<Dispatcher>,
    dispatching: bool,
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl EventScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let dispatcher_pool = (0..config.prewarm_dispatchers)
            .map(|_| Dispatcher::default())
            .collect();
        Self {
            config,
            slots: Vec::new(),
            free_list: Vec::new(),
            dispatcher_pool,
            dispatching: false,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SchedulerConfig {
        &mut self.config
    }

    pub fn add_state(&mut self, playback: PlaybackState) -> StateHandle {
        let record = StateRecord {
            playback,
            events: None,
            owns_events: false,
            auto_clear: self.config.auto_clear,
            restarted: false,
            dispatcher: None,
        };
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index];
            slot.state = Some(record);
            StateHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len();
            self.slots.push(StateSlot {
                generation: 0,
                state: Some(record),
            });
            StateHandle {
                index,
                generation: 0,
            }
        }
    }

    /// Removes a state and invalidates its handle.
    pub fn remove_state(&mut self, handle: StateHandle) -> Option<PlaybackState> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let record = slot.state.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        if let Some(dispatcher) = record.dispatcher {
            self.release_dispatcher(dispatcher);
        }
        Some(record.playback)
    }

    pub fn contains(&self, handle: StateHandle) -> bool {
        self.record(handle).is_some()
    }

    pub fn state_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state.is_some()).count()
    }

    pub fn playback(&self, handle: StateHandle) -> Option<&PlaybackState> {
        self.record(handle).map(|record| &record.playback)
    }

    /// Events of the state, created on first access.
    pub fn events(&mut self, handle: StateHandle) -> Result<SharedSequence, Error> {
        let record = self.record_mut(handle).ok_or(Error::UnknownState)?;
        if let Some(events) = &record.events {
            return Ok(events.clone());
        }
        let events = Sequence::new().into_shared();
        record.events = Some(events.clone());
        record.owns_events = true;
        Ok(events)
    }

    pub fn has_events(&self, handle: StateHandle) -> bool {
        self.record(handle).is_some_and(StateRecord::has_pending_events)
    }

    /// Assigns a sequence that may be shared with other states. Shared sequences are detached
    /// rather than cleared when the state is played again.
    pub fn set_events(
        &mut self,
        handle: StateHandle,
        events: Option<SharedSequence>,
    ) -> Result<(), Error> {
        let record = self.record_mut(handle).ok_or(Error::UnknownState)?;
        record.events = events;
        record.owns_events = false;
        let dispatcher = record.dispatcher.take();
        if let Some(dispatcher) = dispatcher {
            self.release_dispatcher(dispatcher);
        }
        Ok(())
    }

    /// Resumes playback from the current time.
    pub fn play(&mut self, handle: StateHandle) -> Result<(), Error> {
        let record = self.record_mut(handle).ok_or(Error::UnknownState)?;
        record.playback.play();
        record.restarted = false;
        self.auto_clear_events(handle);
        Ok(())
    }

    /// Plays from the start of the current direction.
    pub fn play_from_start(&mut self, handle: StateHandle) -> Result<(), Error> {
        let record = self.record_mut(handle).ok_or(Error::UnknownState)?;
        record.playback.restart();
        record.restarted = true;
        self.auto_clear_events(handle);
        Ok(())
    }

    pub fn pause(&mut self, handle: StateHandle) -> Result<(), Error> {
        let record = self.record_mut(handle).ok_or(Error::UnknownState)?;
        record.playback.pause();
        let dispatcher = record.dispatcher.take();
        if let Some(dispatcher) = dispatcher {
            self.release_dispatcher(dispatcher);
        }
        Ok(())
    }

    pub fn stop(&mut self, handle: StateHandle) -> Result<(), Error> {
        let record = self.record_mut(handle).ok_or(Error::UnknownState)?;
        record.playback.stop();
        record.restarted = false;
        let dispatcher = record.dispatcher.take();
        if let Some(dispatcher) = dispatcher {
            self.release_dispatcher(dispatcher);
        }
        Ok(())
    }

    /// Advances every playing state by `delta` seconds and fires the events they pass.
    ///
    /// Callback errors are logged and do not stop the update. A callback that structurally edits
    /// the sequence being dispatched makes this return [`Error::MutationDuringIteration`].
    /// A state whose dispatch fails does not stop the other states; the first error is returned
    /// once every state has been dispatched.
    pub fn update(&mut self, delta: f32) -> Result<(), Error> {
        if self.dispatching {
            return Err(Error::ReentrantDispatch);
        }
        self.prepare_dispatchers();
        for slot in &mut self.slots {
            if let Some(record) = slot.state.as_mut() {
                record.playback.advance(delta);
            }
        }
        self.dispatch()
    }

    /// Fires events for time changes made by the host since the last dispatch.
    pub fn dispatch_events(&mut self) -> Result<(), Error> {
        if self.dispatching {
            return Err(Error::ReentrantDispatch);
        }
        self.prepare_dispatchers();
        self.dispatch()
    }

    pub fn active_dispatchers(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|slot| slot.state.as_ref())
            .filter(|record| record.dispatcher.is_some())
            .count()
    }

    pub fn pooled_dispatchers(&self) -> usize {
        self.dispatcher_pool.len()
    }

    /// The dispatcher currently tracking `handle`, if any.
    pub fn dispatcher(&self, handle: StateHandle) -> Option<&Dispatcher> {
        self.record(handle)?.dispatcher.as_ref()
    }

    pub(crate) fn take_restarted(&mut self, handle: StateHandle) -> bool {
        self.record_mut(handle)
            .is_some_and(|record| std::mem::take(&mut record.restarted))
    }

    pub(crate) fn events_attached(&self, handle: StateHandle, sequence: &SharedSequence) -> bool {
        self.record(handle)
            .and_then(|record| record.events.as_ref())
            .is_some_and(|events| Rc::ptr_eq(events, sequence))
    }

    pub(crate) fn invoke(&mut self, state: StateHandle, handler: &Handler, event: &InvokedEvent) {
        for callback in handler.iter() {
            let mut context = EventContext::new(self, state, event);
            if let Err(error) = callback.call(&mut context) {
                match &event.name {
                    Some(name) => log::error!(
                        "callback of event '{name}' at normalized time {} failed: {error}",
                        event.normalized_time
                    ),
                    None => log::error!(
                        "{:?} event callback at normalized time {} failed: {error}",
                        event.kind,
                        event.normalized_time
                    ),
                }
            }
        }
    }

    fn record(&self, handle: StateHandle) -> Option<&StateRecord> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.state.as_ref()
    }

    fn record_mut(&mut self, handle: StateHandle) -> Option<&mut StateRecord> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.state.as_mut()
    }

    fn auto_clear_events(&mut self, handle: StateHandle) {
        let Some(record) = self.record_mut(handle) else {
            return;
        };
        if !record.auto_clear {
            return;
        }
        if record.owns_events {
            if let Some(events) = &record.events {
                events.borrow_mut().clear();
            }
        } else if record.events.take().is_some() {
            let dispatcher = record.dispatcher.take();
            if let Some(dispatcher) = dispatcher {
                self.release_dispatcher(dispatcher);
            }
        }
    }

    fn acquire_dispatcher(&mut self) -> Dispatcher {
        self.dispatcher_pool.pop().unwrap_or_else(|| {
            log::debug!("dispatcher pool is empty; allocating a new dispatcher");
            Dispatcher::default()
        })
    }

    fn release_dispatcher(&mut self, mut dispatcher: Dispatcher) {
        dispatcher.reset();
        self.dispatcher_pool.push(dispatcher);
    }

    /// Binds dispatchers to playing states with events, syncs time jumps and releases the
    /// dispatchers that are no longer needed.
    fn prepare_dispatchers(&mut self) {
        for index in 0..self.slots.len() {
            let generation = self.slots[index].generation;
            let handle = StateHandle { index, generation };
            let Some(record) = self.slots[index].state.as_mut() else {
                continue;
            };

            let needed = record.playback.is_playing() && record.has_pending_events();
            if !needed {
                if let Some(dispatcher) = record.dispatcher.take() {
                    self.release_dispatcher(dispatcher);
                }
                continue;
            }

            let restarted = std::mem::take(&mut record.restarted);
            if let Some(dispatcher) = record.dispatcher.as_mut() {
                dispatcher.sync(&record.playback, restarted);
                continue;
            }

            let Some(events) = record.events.clone() else {
                continue;
            };
            let playback = record.playback;
            let mut dispatcher = self.acquire_dispatcher();
            dispatcher.bind(handle, events, &playback, restarted);
            if let Some(record) = self.record_mut(handle) {
                record.dispatcher = Some(dispatcher);
            }
        }
    }

    fn dispatch(&mut self) -> Result<(), Error> {
        self.dispatching = true;
        let result = self.dispatch_slots();
        self.dispatching = false;
        result
    }

    fn dispatch_slots(&mut self) -> Result<(), Error> {
        let mut first_error = None;
        for index in 0..self.slots.len() {
            let generation = self.slots[index].generation;
            let handle = StateHandle { index, generation };
            let Some(mut dispatcher) = self
                .record_mut(handle)
                .and_then(|record| record.dispatcher.take())
            else {
                continue;
            };

            let result = dispatcher.update(self);
            let keep = !matches!(result, Ok(DispatchStatus::Release))
                && self
                    .record(handle)
                    .is_some_and(|record| record.accepts(&dispatcher));
            if keep {
                if let Some(record) = self.record_mut(handle) {
                    record.dispatcher = Some(dispatcher);
                }
            } else {
                self.release_dispatcher(dispatcher);
            }
            if let Err(error) = result {
                log::debug!("dispatch of state {index} failed: {error}");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
