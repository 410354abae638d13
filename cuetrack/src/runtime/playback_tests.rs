use crate::{Error, PlaybackState};

#[test]
fn new_rejects_invalid_lengths() {
    for length in [-1.0, f32::NAN, f32::INFINITY] {
        let err = PlaybackState::new(length).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }), "{length}: {err:?}");
    }
    assert!(PlaybackState::new(0.0).is_ok());
}

#[test]
fn normalized_time_counts_loops_and_handles_zero_length() {
    let state = PlaybackState::new(2.0).unwrap().with_time(5.0).unwrap();
    assert_eq!(state.normalized_time(), 2.5);

    let state = PlaybackState::new(2.0).unwrap().with_time(-1.0).unwrap();
    assert_eq!(state.normalized_time(), -0.5);

    let state = PlaybackState::new(0.0).unwrap().with_time(3.0).unwrap();
    assert_eq!(state.normalized_time(), 0.0);
}

#[test]
fn advance_only_moves_playing_states_forward_in_delta() {
    let mut state = PlaybackState::new(1.0).unwrap().with_speed(-2.0).unwrap();
    state.advance(0.25);
    assert_eq!(state.time(), 0.0);

    state.play();
    state.advance(0.25);
    assert_eq!(state.time(), -0.5);
    state.advance(-1.0);
    state.advance(f32::NAN);
    assert_eq!(state.time(), -0.5);
    assert_eq!(state.effective_speed(), -2.0);

    state.pause();
    assert_eq!(state.effective_speed(), 0.0);
}

#[test]
fn jumps_bump_the_time_version_but_moves_do_not() {
    let mut state = PlaybackState::new(4.0).unwrap();
    let version = state.time_version();

    state.move_time(1.0).unwrap();
    state.set_speed(3.0).unwrap();
    state.set_looping(true);
    assert_eq!(state.time_version(), version);

    state.set_time(2.0).unwrap();
    assert_eq!(state.time_version(), version + 1);
    state.set_normalized_time(0.25).unwrap();
    assert_eq!(state.time(), 1.0);
    assert_eq!(state.time_version(), version + 2);
    state.play();
    state.stop();
    assert_eq!(state.time_version(), version + 4);
    assert_eq!(state.time(), 0.0);
    assert!(!state.is_playing());
}

#[test]
fn restart_starts_from_the_edge_of_the_play_direction() {
    let mut state = PlaybackState::new(3.0).unwrap().with_time(1.0).unwrap();
    state.restart();
    assert_eq!(state.time(), 0.0);
    assert!(state.is_playing());

    state.set_speed(-1.0).unwrap();
    state.restart();
    assert_eq!(state.time(), 3.0);
    assert_eq!(state.normalized_time(), 1.0);
}

#[test]
fn setters_reject_non_finite_values() {
    let mut state = PlaybackState::new(1.0).unwrap();
    assert!(state.set_time(f32::NAN).is_err());
    assert!(state.move_time(f32::INFINITY).is_err());
    assert!(state.set_speed(f32::NAN).is_err());
    assert!(state.set_length(-0.5).is_err());
    assert_eq!(state.time(), 0.0);
    assert_eq!(state.speed(), 1.0);
    assert_eq!(state.length(), 1.0);
}
