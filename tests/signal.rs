use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use parking_lot::Mutex;
use signal_kit::{Disposable, DisposableBag, DisposeWith, Signal};

#[test]
fn add_observer() {
    let name = Signal::<String>::new();
    name.add_observer(|_| {});
    assert_eq!(name.observer_count(), 1);
}

#[test]
fn send_next_reaches_observers() {
    let name = Signal::<String>::new();
    let result = Arc::new(Mutex::new(String::new()));

    name.add_observer({
        let result = result.clone();
        move |value| *result.lock() = value.clone()
    });
    name.send_next("John".to_string());

    assert_eq!(*result.lock(), "John");
}

#[test]
fn next_registers_and_chains() {
    let name = Signal::<String>::new();
    let result = Arc::new(Mutex::new(String::new()));

    let chained = name.next({
        let result = result.clone();
        move |value| *result.lock() = value.clone()
    });
    name.send_next("John".to_string());

    assert_eq!(chained, name);
    assert_eq!(*result.lock(), "John");
}

#[test]
fn send_next_without_observers_is_silent() {
    let signal = Signal::<i32>::new();
    signal.send_next(1);
    assert_eq!(signal.observer_count(), 0);
}

#[test]
fn disposed_observer_is_not_called() {
    let name = Signal::<String>::new();
    let result = Arc::new(Mutex::new(String::new()));

    let observer = name.add_observer({
        let result = result.clone();
        move |value| *result.lock() = value.clone()
    });
    observer.dispose();
    name.send_next("John".to_string());

    assert_eq!(name.observer_count(), 0);
    assert_eq!(*result.lock(), "");
}

#[test]
fn disposing_a_handle_twice_only_removes_its_own_observer() {
    let signal = Signal::<i32>::new();
    let count = Arc::new(AtomicUsize::new(0));

    let first = signal.add_observer(|_| {});
    signal.add_observer({
        let count = count.clone();
        move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        }
    });

    first.dispose();
    first.dispose();
    signal.send_next(1);

    assert_eq!(signal.observer_count(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn dispose_keeps_own_observers() {
    let source = Signal::<i32>::new();
    let mapped = source.map(|v| v * 2);
    let received = Arc::new(Mutex::new(Vec::new()));

    mapped.add_observer({
        let received = received.clone();
        move |v| received.lock().push(*v)
    });

    mapped.dispose();
    source.send_next(1);
    mapped.send_next(10);

    assert_eq!(mapped.observer_count(), 1);
    assert!(!mapped.has_disposable_source());
    assert_eq!(*received.lock(), vec![10]);
}

#[test]
fn dispose_cascades_through_the_chain() {
    let year = Signal::<i32>::new();
    let chain = year.map(|v| v + 1).filter(|v| *v > 0).map(|v| v.to_string());

    assert_eq!(year.observer_count(), 1);
    chain.dispose();
    chain.dispose();

    assert_eq!(year.observer_count(), 0);
}

#[test]
fn dropping_a_derived_signal_makes_upstream_callback_inert() {
    let source = Signal::<i32>::new();
    let count = Arc::new(AtomicUsize::new(0));

    {
        let mapped = source.map(|v| *v);
        mapped.add_observer({
            let count = count.clone();
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        source.send_next(1);
    }
    source.send_next(2);

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(source.observer_count(), 0);
}

#[test]
fn dropped_chains_do_not_accumulate_upstream() {
    let root = Signal::<i32>::new();
    for _ in 0..1000 {
        let _ = root.map(|v| *v).filter(|v| *v > 0);
    }
    assert_eq!(root.observer_count(), 1000);

    root.send_next(1);
    assert_eq!(root.observer_count(), 0);
}

#[test]
fn observer_can_add_observers_while_delivering() {
    let signal = Signal::<i32>::new();
    let count = Arc::new(AtomicUsize::new(0));

    signal.add_observer({
        let signal = signal.clone();
        let count = count.clone();
        move |_| {
            let count = count.clone();
            signal.add_observer(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    signal.send_next(1);
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(signal.observer_count(), 2);

    signal.send_next(2);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn observer_can_send_while_delivering() {
    let input = Signal::<i32>::new();
    let output = Signal::<i32>::new();
    let received = Arc::new(Mutex::new(Vec::new()));

    input.add_observer({
        let output = output.clone();
        move |v| output.send_next(v * 10)
    });
    output.add_observer({
        let received = received.clone();
        move |v| received.lock().push(*v)
    });

    input.send_next(1);
    input.send_next(2);

    assert_eq!(*received.lock(), vec![10, 20]);
}

#[test]
fn dispose_with_stores_the_chain() {
    let bag = DisposableBag::new();
    let signal = Signal::<i32>::new();
    let result = Arc::new(AtomicUsize::new(0));

    signal
        .next({
            let result = result.clone();
            move |v| result.store(*v as usize, Ordering::SeqCst)
        })
        .dispose_with(&bag);

    signal.send_next(1);

    assert_eq!(result.load(Ordering::SeqCst), 1);
    assert_eq!(bag.len(), 1);
}

#[test]
fn disposing_a_bag_of_handles_removes_every_observer() {
    let bag = DisposableBag::new();
    let signal = Signal::<i32>::new();

    for _ in 0..5 {
        signal.add_observer(|_| {}).dispose_with(&bag);
    }
    assert_eq!(signal.observer_count(), 5);

    bag.dispose();
    bag.dispose();
    assert_eq!(signal.observer_count(), 0);
    assert!(bag.is_empty());
}

#[test]
fn concurrent_add_remove_and_send() {
    let signal = Signal::<usize>::new();
    let delivered = Arc::new(AtomicUsize::new(0));

    signal.add_observer({
        let delivered = delivered.clone();
        move |_| {
            delivered.fetch_add(1, Ordering::SeqCst);
        }
    });

    let senders: Vec<_> = (0..4)
        .map(|_| {
            let signal = signal.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    signal.send_next(i);
                }
            })
        })
        .collect();

    let churners: Vec<_> = (0..4)
        .map(|_| {
            let signal = signal.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    let handle = signal.add_observer(|_| {});
                    handle.dispose();
                }
            })
        })
        .collect();

    for handle in senders.into_iter().chain(churners) {
        handle.join().expect("thread success");
    }

    assert_eq!(signal.observer_count(), 1);
    assert_eq!(delivered.load(Ordering::SeqCst), 4 * 500);
}
