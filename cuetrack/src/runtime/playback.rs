use crate::Error;

/// Playback position of a state, as observed by its event dispatcher.
///
/// `time` and `length` are in seconds. The sign of `speed` is the play direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackState {
    time: f32,
    length: f32,
    speed: f32,
    looping: bool,
    playing: bool,
    time_version: u32,
}

fn check_finite(value: f32, what: &str) -> Result<(), Error> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidValue {
            message: format!("{what} must be finite"),
        })
    }
}

fn check_length(length: f32) -> Result<(), Error> {
    if length.is_finite() && length >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidValue {
            message: "length must be finite and >= 0".to_string(),
        })
    }
}

impl PlaybackState {
    pub fn new(length: f32) -> Result<Self, Error> {
        check_length(length)?;
        Ok(Self {
            time: 0.0,
            length,
            speed: 1.0,
            looping: false,
            playing: false,
            time_version: 0,
        })
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Result<Self, Error> {
        check_finite(speed, "speed")?;
        self.speed = speed;
        Ok(self)
    }

    pub fn with_time(mut self, time: f32) -> Result<Self, Error> {
        check_finite(time, "time")?;
        self.time = time;
        Ok(self)
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Incremented whenever time jumps without its events being passed.
    pub fn time_version(&self) -> u32 {
        self.time_version
    }

    /// `time / length`, counting whole loops. Zero-length states report 0.
    pub fn normalized_time(&self) -> f32 {
        if self.length > 0.0 {
            self.time / self.length
        } else {
            0.0
        }
    }

    pub fn effective_speed(&self) -> f32 {
        if self.playing { self.speed } else { 0.0 }
    }

    fn jumped(&mut self) {
        self.time_version = self.time_version.wrapping_add(1);
    }

    pub(crate) fn set_time(&mut self, time: f32) -> Result<(), Error> {
        check_finite(time, "time")?;
        self.time = time;
        self.jumped();
        Ok(())
    }

    pub(crate) fn set_normalized_time(&mut self, normalized_time: f32) -> Result<(), Error> {
        check_finite(normalized_time, "normalized time")?;
        self.set_time(normalized_time * self.length)
    }

    /// Moves time so that events between the old and new time fire at the next dispatch.
    pub(crate) fn move_time(&mut self, time: f32) -> Result<(), Error> {
        check_finite(time, "time")?;
        self.time = time;
        Ok(())
    }

    pub(crate) fn set_length(&mut self, length: f32) -> Result<(), Error> {
        check_length(length)?;
        self.length = length;
        self.jumped();
        Ok(())
    }

    pub(crate) fn set_speed(&mut self, speed: f32) -> Result<(), Error> {
        check_finite(speed, "speed")?;
        self.speed = speed;
        Ok(())
    }

    pub(crate) fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub(crate) fn advance(&mut self, delta: f32) {
        if !self.playing || !delta.is_finite() || delta < 0.0 {
            return;
        }
        self.time += delta * self.speed;
    }

    pub(crate) fn play(&mut self) {
        self.playing = true;
        self.jumped();
    }

    /// Plays from the start of the current direction: 0, or `length` when playing backwards.
    pub(crate) fn restart(&mut self) {
        self.time = if self.speed < 0.0 { self.length } else { 0.0 };
        self.playing = true;
        self.jumped();
    }

    pub(crate) fn pause(&mut self) {
        self.playing = false;
    }

    pub(crate) fn stop(&mut self) {
        self.playing = false;
        self.time = 0.0;
        self.jumped();
    }
}
