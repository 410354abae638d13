mod dispatcher;
mod playback;
mod scheduler;

pub use dispatcher::*;
pub use playback::*;
pub use scheduler::*;




#[cfg(test)]
mod playback_tests;
