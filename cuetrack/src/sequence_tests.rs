use crate::{Callback, Error, Event, Sequence};

fn noop() -> Callback {
    Callback::new(|_| {})
}

fn times(sequence: &Sequence) -> Vec<f32> {
    sequence.iter().map(|event| event.normalized_time).collect()
}

#[test]
fn add_keeps_events_sorted_and_equal_times_in_insertion_order() {
    let mut sequence = Sequence::new();
    let first = noop();
    let second = noop();

    assert_eq!(sequence.add_at(0.5, first.clone()).unwrap(), 0);
    assert_eq!(sequence.add_at(0.2, noop()).unwrap(), 0);
    assert_eq!(sequence.add_at(0.9, noop()).unwrap(), 2);
    assert_eq!(sequence.add_at(0.5, second.clone()).unwrap(), 2);

    assert_eq!(times(&sequence), vec![0.2, 0.5, 0.5, 0.9]);
    assert!(sequence.events()[1].handler.contains(&first));
    assert!(sequence.events()[2].handler.contains(&second));
    sequence.assert_normalized_times(false).unwrap();
}

#[test]
fn add_rejects_non_finite_times() {
    let mut sequence = Sequence::new();
    for time in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        let err = sequence.add_at(time, noop()).unwrap_err();
        assert!(matches!(err, Error::TimeOutOfRange { .. }), "{err:?}");
    }
    assert_eq!(sequence.len(), 0);
    assert_eq!(sequence.version(), 0);
}

#[test]
fn times_outside_unit_range_are_allowed_for_non_looping_playback() {
    let mut sequence = Sequence::new();
    sequence.add_at(-0.5, noop()).unwrap();
    sequence.add_at(1.5, noop()).unwrap();

    sequence.assert_normalized_times(false).unwrap();
    let err = sequence.assert_normalized_times(true).unwrap_err();
    assert!(matches!(err, Error::TimeOutOfRange { time, .. } if time == -0.5));
}

#[test]
fn structural_edits_bump_the_version_but_callback_edits_do_not() {
    let mut sequence = Sequence::new();
    let callback = noop();
    sequence.add_at(0.5, callback.clone()).unwrap();
    let after_add = sequence.version();
    assert_eq!(after_add, 1);

    sequence.add_callback(0, noop()).unwrap();
    sequence.set_callback(0, callback.clone()).unwrap();
    assert!(sequence.remove_callback(0, &callback).unwrap());
    sequence.set_name(0, Some("step".to_string())).unwrap();
    sequence.set_on_end(Some(noop()));
    assert_eq!(sequence.version(), after_add);

    sequence.set_normalized_time(0, 0.25).unwrap();
    assert_eq!(sequence.version(), after_add + 1);
    sequence.remove(0).unwrap();
    assert_eq!(sequence.version(), after_add + 2);
    sequence.clear();
    assert_eq!(sequence.version(), after_add + 3);
}

#[test]
fn index_errors_report_the_length() {
    let mut sequence = Sequence::new();
    sequence.add_at(0.1, noop()).unwrap();

    let err = sequence.remove(3).unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { index: 3, len: 1 }));
    let err = sequence.set_callback(1, noop()).unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { index: 1, len: 1 }));
}

#[test]
fn names_follow_their_events() {
    let mut sequence = Sequence::new();
    sequence.add_named("late", 0.8, noop()).unwrap();
    sequence.add_at(0.9, noop()).unwrap();
    sequence.add_named("early", 0.1, noop()).unwrap();

    assert_eq!(sequence.index_of_name("early"), Some(0));
    assert_eq!(sequence.index_of_name("late"), Some(1));
    assert_eq!(sequence.name(2), None);

    let moved = sequence.set_normalized_time(0, 0.95).unwrap();
    assert_eq!(moved, 2);
    assert_eq!(sequence.name(2), Some("early"));
    assert_eq!(sequence.index_of_name("late"), Some(0));

    let removed = sequence.remove_named("late").unwrap();
    assert_eq!(removed.normalized_time, 0.8);
    assert_eq!(sequence.index_of_name("early"), Some(1));
    assert!(sequence.remove_named("late").is_none());
}

#[test]
fn duplicate_names_are_rejected() {
    let mut sequence = Sequence::new();
    sequence.add_named("step", 0.1, noop()).unwrap();
    sequence.add_at(0.2, noop()).unwrap();

    let err = sequence.add_named("step", 0.3, noop()).unwrap_err();
    assert!(matches!(err, Error::DuplicateName { index: 0, .. }));
    assert_eq!(sequence.len(), 2);

    let err = sequence.set_name(1, Some("step".to_string())).unwrap_err();
    assert!(matches!(err, Error::DuplicateName { index: 0, .. }));

    sequence.set_name(0, Some("step".to_string())).unwrap();
    sequence.set_name(0, None).unwrap();
    sequence.set_name(1, Some("step".to_string())).unwrap();
    assert_eq!(sequence.index_of_name("step"), Some(1));
}

#[test]
fn set_callback_named_requires_a_known_name() {
    let mut sequence = Sequence::new();
    sequence.add_named("hit", 0.4, noop()).unwrap();

    let replacement = noop();
    assert_eq!(sequence.set_callback_named("hit", replacement.clone()).unwrap(), 0);
    assert_eq!(sequence.events()[0].handler.len(), 1);
    assert!(sequence.events()[0].handler.contains(&replacement));

    let err = sequence.set_callback_named("miss", noop()).unwrap_err();
    assert!(matches!(err, Error::UnknownEvent { ref name } if name == "miss"));
}

#[test]
fn remove_event_matches_time_and_callbacks() {
    let mut sequence = Sequence::new();
    let a = noop();
    let b = noop();
    sequence.add_at(0.5, a.clone()).unwrap();
    sequence.add_at(0.5, b.clone()).unwrap();

    assert!(!sequence.remove_event(&Event::new(0.4, b.clone())));
    assert_eq!(sequence.index_of_event(&Event::new(0.5, b.clone())), Some(1));
    assert!(sequence.remove_event(&Event::new(0.5, b)));
    assert_eq!(sequence.len(), 1);
    assert!(sequence.events()[0].handler.contains(&a));
}

#[test]
fn from_events_fails_fast_on_unsorted_input() {
    let events = vec![Event::new(0.6, noop()), Event::new(0.3, noop())];
    let err = Sequence::from_events(events).unwrap_err();
    assert!(matches!(
        err,
        Error::UnsortedEvents { index: 0, previous, next } if previous == 0.6 && next == 0.3
    ));

    let sequence = Sequence::from_events(vec![Event::new(0.1, noop()), Event::new(0.1, noop())])
        .unwrap();
    assert_eq!(sequence.len(), 2);
}

#[test]
fn edit_unsorted_restores_order_stably() {
    let mut sequence = Sequence::new();
    sequence.add_named("a", 0.1, noop()).unwrap();
    sequence.add_named("b", 0.2, noop()).unwrap();
    sequence.add_named("c", 0.3, noop()).unwrap();
    let version = sequence.version();

    let edited = sequence
        .edit_unsorted(|events| {
            events[0].normalized_time = 0.9;
            events[2].normalized_time = 0.2;
            events.len()
        })
        .unwrap();

    assert_eq!(edited, 3);
    assert_eq!(times(&sequence), vec![0.2, 0.2, 0.9]);
    assert_eq!(sequence.name(0), Some("b"));
    assert_eq!(sequence.name(1), Some("c"));
    assert_eq!(sequence.name(2), Some("a"));
    assert_eq!(sequence.version(), version + 1);
}

#[test]
fn edit_unsorted_reports_non_finite_times() {
    let mut sequence = Sequence::new();
    sequence.add_at(0.2, noop()).unwrap();
    sequence.add_named("late", 0.8, noop()).unwrap();
    let version = sequence.version();

    let err = sequence
        .edit_unsorted(|events| {
            events[1].normalized_time = 0.1;
            events[0].normalized_time = f32::NAN;
        })
        .unwrap_err();
    assert!(matches!(err, Error::TimeOutOfRange { .. }));

    // A rejected edit leaves the sequence as it was.
    assert_eq!(times(&sequence), [0.2, 0.8]);
    assert_eq!(sequence.name(1), Some("late"));
    assert_eq!(sequence.version(), version);
    sequence.assert_normalized_times(false).unwrap();
}

#[test]
fn end_event_edits_are_not_structural() {
    let mut sequence = Sequence::new();
    sequence.add_at(0.5, noop()).unwrap();
    let version = sequence.version();

    sequence.set_end_time(0.75).unwrap();
    sequence.set_on_end(Some(noop()));
    sequence.set_end_time(f32::NAN).unwrap();
    assert_eq!(sequence.version(), version);
}

#[test]
fn end_time_defaults_by_direction() {
    let mut sequence = Sequence::new();
    assert!(sequence.end_time().is_nan());
    assert_eq!(sequence.normalized_end_time(1.0), 1.0);
    assert_eq!(sequence.normalized_end_time(-2.0), 0.0);
    assert_eq!(Sequence::default_normalized_start_time(-1.0), 1.0);
    assert_eq!(Sequence::default_normalized_start_time(0.0), 0.0);

    sequence.set_end_time(0.75).unwrap();
    assert_eq!(sequence.normalized_end_time(-1.0), 0.75);

    let err = sequence.set_end_time(f32::INFINITY).unwrap_err();
    assert!(matches!(err, Error::TimeOutOfRange { .. }));

    sequence.set_end_time(f32::NAN).unwrap();
    assert_eq!(sequence.normalized_end_time(1.0), 1.0);
}

#[test]
fn end_callback_makes_a_sequence_non_empty() {
    let mut sequence = Sequence::new();
    assert!(sequence.is_empty());

    sequence.set_on_end(Some(noop()));
    assert!(!sequence.is_empty());
    assert_eq!(sequence.len(), 0);

    sequence.set_on_end(None);
    assert!(sequence.is_empty());
}

#[test]
fn clear_resets_the_end_event() {
    let mut sequence = Sequence::new();
    sequence.add_named("x", 0.5, noop()).unwrap();
    sequence.set_end_time(0.5).unwrap();
    sequence.set_on_end(Some(noop()));

    sequence.clear();

    assert!(sequence.is_empty());
    assert!(sequence.end_time().is_nan());
    assert_eq!(sequence.index_of_name("x"), None);
}

#[test]
fn copy_from_replaces_contents() {
    let mut source = Sequence::new();
    source.add_named("a", 0.3, noop()).unwrap();
    source.set_end_time(0.9).unwrap();

    let mut target = Sequence::new();
    target.add_at(0.1, noop()).unwrap();
    target.add_at(0.2, noop()).unwrap();
    let version = target.version();

    target.copy_from(&source);

    assert_eq!(times(&target), vec![0.3]);
    assert_eq!(target.name(0), Some("a"));
    assert_eq!(target.end_time(), 0.9);
    assert_eq!(target.version(), version + 1);
}

#[test]
fn extend_adds_each_event_in_order() {
    let mut sequence = Sequence::with_capacity(4);
    assert!(sequence.capacity() >= 4);
    sequence
        .extend([0.7, 0.1, 0.4].map(|time| Event::new(time, noop())))
        .unwrap();
    assert_eq!(times(&sequence), vec![0.1, 0.4, 0.7]);
    assert_eq!((&sequence).into_iter().count(), 3);
}
