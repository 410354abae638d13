use crate::{Callback, CallbackRegistry, EndEvent, Event, Handler};

#[test]
fn callbacks_compare_by_identity() {
    let a = Callback::new(|_| {});
    let b = Callback::new(|_| {});
    assert!(a.ptr_eq(&a.clone()));
    assert!(!a.ptr_eq(&b));
}

#[test]
fn handler_removes_the_last_occurrence() {
    let a = Callback::new(|_| {});
    let b = Callback::new(|_| {});
    let mut handler = Handler::new();
    handler.add(a.clone());
    handler.add(b.clone());
    handler.add(a.clone());
    assert_eq!(handler.len(), 3);

    assert!(handler.remove(&a));
    let order: Vec<bool> = handler.iter().map(|c| c.ptr_eq(&a)).collect();
    assert_eq!(order, vec![true, false]);

    assert!(handler.remove(&a));
    assert!(!handler.remove(&a));
    assert!(handler.contains(&b));

    handler.clear();
    assert!(handler.is_empty());
}

#[test]
fn events_match_on_time_and_callbacks() {
    let a = Callback::new(|_| {});
    let b = Callback::new(|_| {});

    let event = Event::new(0.5, a.clone());
    assert!(event.matches(&Event::new(0.5, a.clone())));
    assert!(!event.matches(&Event::new(0.5, b.clone())));
    assert!(!event.matches(&Event::new(0.25, a.clone())));

    let mut both = Handler::from(a.clone());
    both.add(b.clone());
    assert!(!event.matches(&Event::with_handler(0.5, both)));
}

#[test]
fn end_event_defaults_to_auto_time() {
    let end = EndEvent::default();
    assert!(end.normalized_time.is_nan());
    assert!(end.handler.is_empty());
}

#[test]
fn registry_maps_keys_both_ways() {
    let step = Callback::new(|_| {});
    let other = Callback::new(|_| {});
    let mut registry = CallbackRegistry::new();
    assert!(registry.register("step", step.clone()).is_none());

    assert!(registry.get("step").is_some_and(|c| c.ptr_eq(&step)));
    assert_eq!(registry.key_of(&step), Some("step"));
    assert_eq!(registry.key_of(&other), None);

    let previous = registry.register("step", other.clone());
    assert!(previous.is_some_and(|c| c.ptr_eq(&step)));
    assert_eq!(registry.len(), 1);

    assert!(registry.unregister("step").is_some());
    assert!(registry.is_empty());
}

#[test]
fn aliased_callbacks_report_the_smallest_key() {
    let step = Callback::new(|_| {});
    let mut registry = CallbackRegistry::new();
    for key in ["walk", "run", "step"] {
        registry.register(key, step.clone());
    }
    for _ in 0..8 {
        assert_eq!(registry.key_of(&step), Some("run"));
    }
}
