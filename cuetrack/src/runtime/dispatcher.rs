use crate::{
    Error, EventKind, EventScheduler, Handler, InvokedEvent, PlaybackState, SharedSequence,
    StateHandle,
};
use std::rc::Rc;

// Bounds the correction of a loop base computed with rounded arithmetic.
const LOOP_BASE_CORRECTIONS: usize = 4;
/// Whole loops a looping state may pass in one update.
pub const MAX_CATCH_UP_LOOPS: f64 = (1u64 << 20) as f64;
/// Largest normalized time a looping state is dispatched at.
pub const MAX_LOOP_POSITION: f64 = (1u64 << 40) as f64;

/// Position of the next event to check in the current play direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// Recomputed from the previous time before the next scan.
    Uninitialized,
    Next(usize),
    /// Every event in the play direction has been passed.
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DispatchStatus {
    Continue,
    Release,
}

enum Flow {
    Proceed,
    Resynced,
    Release,
}

/// Fires the events of one playing state as its normalized time passes them.
///
/// Dispatchers are owned and pooled by the [`EventScheduler`]. The sequence is shared with the
/// state, so callbacks may edit it; a structural edit made while the dispatcher is iterating is
/// reported as [`Error::MutationDuringIteration`].
#[derive(Debug)]
pub struct Dispatcher {
    state: Option<StateHandle>,
    sequence: Option<SharedSequence>,
    previous_time: f32,
    is_looping: bool,
    cursor: Cursor,
    sequence_version: u32,
    was_playing_forwards: bool,
    // Events exactly at `previous_time` fire on the first scan after a restart.
    inclusive_start: bool,
    time_version: u32,
    end_fired_last_update: bool,
    end_interrupt_warned: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            state: None,
            sequence: None,
            previous_time: 0.0,
            is_looping: false,
            cursor: Cursor::Uninitialized,
            sequence_version: 0,
            was_playing_forwards: true,
            inclusive_start: false,
            time_version: 0,
            end_fired_last_update: false,
            end_interrupt_warned: false,
        }
    }
}

impl Dispatcher {
    pub fn state(&self) -> Option<StateHandle> {
        self.state
    }

    pub fn sequence(&self) -> Option<&SharedSequence> {
        self.sequence.as_ref()
    }

    pub fn previous_time(&self) -> f32 {
        self.previous_time
    }

    pub fn is_looping(&self) -> bool {
        self.is_looping
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn sequence_version(&self) -> u32 {
        self.sequence_version
    }

    pub fn is_playing_forwards(&self) -> bool {
        self.was_playing_forwards
    }

    pub(crate) fn is_bound_to(&self, sequence: &SharedSequence) -> bool {
        self.sequence
            .as_ref()
            .is_some_and(|bound| Rc::ptr_eq(bound, sequence))
    }

    pub(crate) fn bind(
        &mut self,
        state: StateHandle,
        sequence: SharedSequence,
        playback: &PlaybackState,
        restarted: bool,
    ) {
        *self = Self {
            state: Some(state),
            sequence: Some(sequence),
            previous_time: playback.normalized_time(),
            is_looping: playback.is_looping(),
            was_playing_forwards: playback.speed() >= 0.0,
            inclusive_start: restarted,
            time_version: playback.time_version(),
            ..Self::default()
        };
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Adopts the state's time if it jumped since the last update.
    pub(crate) fn sync(&mut self, playback: &PlaybackState, restarted: bool) {
        if playback.time_version() == self.time_version {
            return;
        }
        self.time_version = playback.time_version();
        self.previous_time = playback.normalized_time();
        self.cursor = Cursor::Uninitialized;
        self.inclusive_start = restarted;
        self.end_fired_last_update = false;
    }

    pub(crate) fn update(
        &mut self,
        scheduler: &mut EventScheduler,
    ) -> Result<DispatchStatus, Error> {
        let (Some(state), Some(sequence)) = (self.state, self.sequence.clone()) else {
            return Ok(DispatchStatus::Release);
        };
        let Some(playback) = scheduler.playback(state).copied() else {
            return Ok(DispatchStatus::Release);
        };
        if !playback.is_playing() || sequence.borrow().is_empty() {
            return Ok(DispatchStatus::Release);
        }

        if playback.time_version() != self.time_version {
            let restarted = scheduler.take_restarted(state);
            self.sync(&playback, restarted);
        }
        if playback.is_looping() != self.is_looping {
            self.is_looping = playback.is_looping();
            self.cursor = Cursor::Uninitialized;
        }

        if playback.length() > 0.0 {
            self.update_timed(scheduler, state, &sequence, &playback)
        } else {
            self.update_zero_length(scheduler, state, &sequence, &playback)
        }
    }

    fn update_timed(
        &mut self,
        scheduler: &mut EventScheduler,
        state: StateHandle,
        sequence: &SharedSequence,
        playback: &PlaybackState,
    ) -> Result<DispatchStatus, Error> {
        let current = playback.normalized_time();
        if !current.is_finite() || current == self.previous_time {
            return Ok(DispatchStatus::Continue);
        }

        let forward = current > self.previous_time;
        if forward != self.was_playing_forwards {
            self.was_playing_forwards = forward;
            self.cursor = Cursor::Uninitialized;
        }
        if sequence.borrow().version() != self.sequence_version {
            self.cursor = Cursor::Uninitialized;
        }

        // f64 positions: a loop base must still grow by one past 2^24.
        let direction = if forward { 1.0 } else { -1.0 };
        let previous = f64::from(self.previous_time) * direction;
        let target = f64::from(current) * direction;

        if self.is_looping
            && (target - previous > MAX_CATCH_UP_LOOPS
                || previous.abs() >= MAX_LOOP_POSITION
                || target.abs() >= MAX_LOOP_POSITION)
        {
            let error = Error::LoopOverflow {
                previous: self.previous_time,
                current,
            };
            self.previous_time = current;
            self.cursor = Cursor::Uninitialized;
            self.inclusive_start = false;
            return Err(error);
        }

        if self.cursor == Cursor::Uninitialized {
            self.seed(sequence, previous, direction)?;
        }

        let count = sequence.borrow().len();
        let mut loop_base = None;
        while let Cursor::Next(index) = self.cursor {
            let (time, handler, name) = {
                let sequence = sequence.borrow();
                let Some(event) = sequence.get(index) else {
                    self.cursor = Cursor::Uninitialized;
                    break;
                };
                (
                    event.normalized_time,
                    event.handler.clone(),
                    sequence.name(index).map(str::to_owned),
                )
            };

            let adjusted = f64::from(time) * direction;
            let position = if self.is_looping {
                let base = *loop_base
                    .get_or_insert_with(|| loop_base_for(adjusted, previous, self.inclusive_start));
                adjusted + base
            } else {
                adjusted
            };
            if position > target {
                break;
            }

            let (next, wrapped) = step(index, count, forward, self.is_looping);
            self.cursor = next;
            if wrapped {
                if let Some(base) = loop_base.as_mut() {
                    *base += 1.0;
                }
            }

            let invoked = InvokedEvent {
                kind: EventKind::Timed,
                index: Some(index),
                name,
                normalized_time: time,
                state_time: current,
            };
            scheduler.invoke(state, &handler, &invoked);
            match self.after_invoke(scheduler, state, sequence)? {
                Flow::Proceed => {}
                Flow::Resynced => return Ok(DispatchStatus::Continue),
                Flow::Release => return Ok(DispatchStatus::Release),
            }
        }

        let end_time = sequence
            .borrow()
            .normalized_end_time(if forward { 1.0 } else { -1.0 });
        let passed = if forward {
            current >= end_time
        } else {
            current <= end_time
        };
        match self.fire_end_event(scheduler, state, sequence, passed, end_time, current)? {
            Flow::Proceed => {}
            Flow::Resynced => return Ok(DispatchStatus::Continue),
            Flow::Release => return Ok(DispatchStatus::Release),
        }

        self.previous_time = current;
        self.inclusive_start = false;
        Ok(DispatchStatus::Continue)
    }

    fn update_zero_length(
        &mut self,
        scheduler: &mut EventScheduler,
        state: StateHandle,
        sequence: &SharedSequence,
        playback: &PlaybackState,
    ) -> Result<DispatchStatus, Error> {
        let speed = playback.effective_speed();
        if speed == 0.0 || speed.is_nan() {
            return Ok(DispatchStatus::Continue);
        }
        let forward = speed > 0.0;

        // Without a time axis every tick passes every event, so the cursor always starts from the
        // edge of the current direction.
        let (count, version) = {
            let sequence = sequence.borrow();
            (sequence.len(), sequence.version())
        };
        self.sequence_version = version;
        self.was_playing_forwards = forward;
        self.cursor = match (count, forward) {
            (0, _) => Cursor::Exhausted,
            (_, true) => Cursor::Next(0),
            (_, false) => Cursor::Next(count - 1),
        };

        while let Cursor::Next(index) = self.cursor {
            let (normalized_time, handler, name) = {
                let sequence = sequence.borrow();
                let Some(event) = sequence.get(index) else {
                    self.cursor = Cursor::Uninitialized;
                    break;
                };
                (
                    event.normalized_time,
                    event.handler.clone(),
                    sequence.name(index).map(str::to_owned),
                )
            };
            self.cursor = step(index, count, forward, false).0;

            let invoked = InvokedEvent {
                kind: EventKind::Timed,
                index: Some(index),
                name,
                normalized_time,
                state_time: 0.0,
            };
            scheduler.invoke(state, &handler, &invoked);
            match self.after_invoke(scheduler, state, sequence)? {
                Flow::Proceed => {}
                Flow::Resynced => return Ok(DispatchStatus::Continue),
                Flow::Release => return Ok(DispatchStatus::Release),
            }
        }

        let end_time = sequence.borrow().normalized_end_time(speed);
        match self.fire_end_event(scheduler, state, sequence, true, end_time, 0.0)? {
            Flow::Proceed | Flow::Resynced => Ok(DispatchStatus::Continue),
            Flow::Release => Ok(DispatchStatus::Release),
        }
    }

    /// Finds the first event ahead of `previous` in direction-adjusted time.
    fn seed(
        &mut self,
        sequence: &SharedSequence,
        previous: f64,
        direction: f64,
    ) -> Result<(), Error> {
        let sequence = sequence.borrow();
        self.sequence_version = sequence.version();
        let count = sequence.len();
        if count == 0 {
            self.cursor = Cursor::Exhausted;
            return Ok(());
        }
        if self.is_looping {
            if let Err(error) = sequence.assert_normalized_times(true) {
                self.cursor = Cursor::Uninitialized;
                return Err(error);
            }
        }

        let forward = direction > 0.0;
        let order = (0..count).map(|i| if forward { i } else { count - 1 - i });
        let events = sequence.events();
        let inclusive = self.inclusive_start;

        self.cursor = if self.is_looping {
            // Earliest (position, loop base) pair; ties keep the first index in play order.
            let mut best: Option<(f64, f64, usize)> = None;
            for index in order {
                let adjusted = f64::from(events[index].normalized_time) * direction;
                let base = loop_base_for(adjusted, previous, inclusive);
                let position = adjusted + base;
                let earlier = match best {
                    None => true,
                    Some((best_position, best_base, _)) => {
                        position < best_position || (position == best_position && base < best_base)
                    }
                };
                if earlier {
                    best = Some((position, base, index));
                }
            }
            best.map_or(Cursor::Exhausted, |(_, _, index)| Cursor::Next(index))
        } else {
            let mut cursor = Cursor::Exhausted;
            for index in order {
                let adjusted = f64::from(events[index].normalized_time) * direction;
                if is_ahead(adjusted, previous, inclusive) {
                    cursor = Cursor::Next(index);
                    break;
                }
            }
            cursor
        };
        Ok(())
    }

    fn fire_end_event(
        &mut self,
        scheduler: &mut EventScheduler,
        state: StateHandle,
        sequence: &SharedSequence,
        passed: bool,
        end_time: f32,
        current: f32,
    ) -> Result<Flow, Error> {
        let handler: Handler = sequence.borrow().on_end().clone();
        if !passed || handler.is_empty() {
            self.end_fired_last_update = false;
            return Ok(Flow::Proceed);
        }

        if self.end_fired_last_update
            && !self.end_interrupt_warned
            && scheduler.config().warn_end_event_interrupt
        {
            log::warn!(
                "end event of {state:?} fired again on the next update; it keeps firing every update until the state is stopped or its time is changed"
            );
            self.end_interrupt_warned = true;
        }
        self.end_fired_last_update = true;

        let invoked = InvokedEvent {
            kind: EventKind::End,
            index: None,
            name: None,
            normalized_time: end_time,
            state_time: current,
        };
        scheduler.invoke(state, &handler, &invoked);
        self.after_invoke(scheduler, state, sequence)
    }

    fn after_invoke(
        &mut self,
        scheduler: &mut EventScheduler,
        state: StateHandle,
        sequence: &SharedSequence,
    ) -> Result<Flow, Error> {
        let Some(playback) = scheduler.playback(state).copied() else {
            return Ok(Flow::Release);
        };
        if !playback.is_playing() || !scheduler.events_attached(state, sequence) {
            return Ok(Flow::Release);
        }
        if playback.time_version() != self.time_version {
            let restarted = scheduler.take_restarted(state);
            self.sync(&playback, restarted);
            return Ok(Flow::Resynced);
        }

        let version = sequence.borrow().version();
        if version != self.sequence_version {
            let expected = self.sequence_version;
            self.cursor = Cursor::Uninitialized;
            self.previous_time = playback.normalized_time();
            self.inclusive_start = false;
            return Err(Error::MutationDuringIteration {
                expected,
                actual: version,
            });
        }
        Ok(Flow::Proceed)
    }
}

fn is_ahead(position: f64, previous: f64, inclusive: bool) -> bool {
    if inclusive {
        position >= previous
    } else {
        position > previous
    }
}

/// Smallest whole number of loops that puts an event at `adjusted` ahead of `previous`.
fn loop_base_for(adjusted: f64, previous: f64, inclusive: bool) -> f64 {
    let mut base = (previous - adjusted).floor();
    for _ in 0..LOOP_BASE_CORRECTIONS {
        if is_ahead(adjusted + base, previous, inclusive) {
            break;
        }
        base += 1.0;
    }
    for _ in 0..LOOP_BASE_CORRECTIONS {
        if !is_ahead(adjusted + base - 1.0, previous, inclusive) {
            break;
        }
        base -= 1.0;
    }
    base
}

/// Next cursor in play order, and whether it wrapped to the other end of the sequence.
fn step(index: usize, count: usize, forward: bool, looping: bool) -> (Cursor, bool) {
    if forward {
        if index + 1 < count {
            (Cursor::Next(index + 1), false)
        } else if looping {
            (Cursor::Next(0), true)
        } else {
            (Cursor::Exhausted, false)
        }
    } else if index > 0 {
        (Cursor::Next(index - 1), false)
    } else if looping {
        (Cursor::Next(count - 1), true)
    } else {
        (Cursor::Exhausted, false)
    }
}
