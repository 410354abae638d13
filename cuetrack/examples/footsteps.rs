use cuetrack::{Callback, EventKind, EventScheduler, PlaybackState};

fn main() {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut speed = 1.0f32;
    let mut looping = true;
    let mut frames = 12usize;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--speed" => {
                speed = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .expect("--speed takes a number");
                i += 2;
            }
            "--frames" => {
                frames = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .expect("--frames takes a count");
                i += 2;
            }
            "--once" => {
                looping = false;
                i += 1;
            }
            other => panic!("unknown argument: {other}"),
        }
    }

    // A 0.8 second walk cycle with a footstep on each contact pose.
    let playback = PlaybackState::new(0.8)
        .expect("length")
        .with_looping(looping)
        .with_speed(speed)
        .expect("speed");

    let mut scheduler = EventScheduler::default();
    let walk = scheduler.add_state(playback);
    scheduler.play_from_start(walk).expect("play");

    let footstep = Callback::new(|context| {
        let event = context.event();
        let side = event.name.as_deref().unwrap_or("?");
        println!(
            "  footstep {side:<5} at {:.3} (state time {:.3})",
            event.normalized_time, event.state_time
        );
    });

    let events = scheduler.events(walk).expect("events");
    {
        let mut events = events.borrow_mut();
        events
            .add_named("left", 0.0, footstep.clone())
            .expect("left");
        events.add_named("right", 0.5, footstep).expect("right");
        // The end event repeats on every update once passed, so only a single cycle reports it.
        if !looping {
            events.set_on_end(Some(Callback::new(|context| {
                if context.event().kind == EventKind::End {
                    println!("  cycle finished");
                }
            })));
        }
    }

    let delta = 1.0 / 10.0;
    for frame in 0..frames {
        scheduler.update(delta).expect("update");
        let time = scheduler.playback(walk).map_or(0.0, |p| p.normalized_time());
        println!("frame {frame:>3}: normalized time {time:.3}");
    }
}
