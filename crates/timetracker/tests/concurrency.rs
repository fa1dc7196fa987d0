//! Multi-threaded registration, cancellation and dispatch.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use timetracker::{
    DueSpec, ManualClock, Outcome, TimerId, Timeslices, Timetracker, TimetrackerConfig,
};

fn shared_tracker() -> (Arc<ManualClock>, Arc<Timetracker>) {
    let clock = Arc::new(ManualClock::default());
    let tracker = Arc::new(Timetracker::with_clock(
        TimetrackerConfig::default(),
        clock.clone(),
    ));
    (clock, tracker)
}

#[test]
fn test_concurrent_registration_yields_unique_ids() {
    let (_clock, tracker) = shared_tracker();
    let threads = 8;
    let per_thread = 200;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut ids = Vec::with_capacity(per_thread);
                for _ in 0..per_thread {
                    ids.push(
                        tracker
                            .register_timer_fn(DueSpec::slices(100).unwrap(), false, |_| {
                                Outcome::Retire
                            })
                            .unwrap(),
                    );
                }
                ids
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        let ids = handle.join().unwrap();
        // Each producer observes strictly increasing ids.
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        for id in ids {
            assert!(all.insert(id), "duplicate id {id}");
        }
    }

    assert_eq!(all.len(), threads * per_thread);
    assert_eq!(tracker.len(), threads * per_thread);
}

#[test]
fn test_cancel_while_pass_runs_slow_action_does_not_block() {
    let (_clock, tracker) = shared_tracker();
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(AtomicBool::new(false));

    let slow_entered = Arc::clone(&entered);
    let slow_release = Arc::clone(&release);
    tracker
        .register_timer_fn(DueSpec::slices(0).unwrap(), false, move |_| {
            slow_entered.wait();
            while !slow_release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Outcome::Retire
        })
        .unwrap();
    let bystander_fired = Arc::new(AtomicUsize::new(0));
    let bystander_counter = Arc::clone(&bystander_fired);
    let bystander = tracker
        .register_timer_fn(DueSpec::slices(0).unwrap(), false, move |_| {
            bystander_counter.fetch_add(1, Ordering::SeqCst);
            Outcome::Retire
        })
        .unwrap();

    let driver = {
        let tracker = Arc::clone(&tracker);
        thread::spawn(move || tracker.tick().unwrap())
    };

    // The slow action is running; the registry and queue must both be free.
    entered.wait();
    assert!(tracker.remove_timer(bystander));
    let late = tracker
        .register_timer_fn(DueSpec::slices(0).unwrap(), false, |_| Outcome::Retire)
        .unwrap();
    release.store(true, Ordering::SeqCst);

    let report = driver.join().unwrap();
    assert_eq!(report.fired, 1);
    assert_eq!(bystander_fired.load(Ordering::SeqCst), 0);
    assert!(!tracker.contains(bystander));
    assert!(tracker.contains(late));
}

#[test]
fn test_concurrent_ticks_serialize() {
    let (_clock, tracker) = shared_tracker();
    let in_action = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicBool::new(false));

    for _ in 0..16 {
        let in_action = Arc::clone(&in_action);
        let overlap = Arc::clone(&overlap);
        tracker
            .register_timer_fn(DueSpec::slices(0).unwrap(), true, move |_| {
                if in_action.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlap.store(true, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_micros(200));
                in_action.fetch_sub(1, Ordering::SeqCst);
                Outcome::Reschedule
            })
            .unwrap();
    }

    let drivers: Vec<_> = (0..4)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for _ in 0..5 {
                    tracker.tick().unwrap();
                }
            })
        })
        .collect();
    for driver in drivers {
        driver.join().unwrap();
    }

    assert!(!overlap.load(Ordering::SeqCst), "two passes fired actions at once");
    assert_eq!(tracker.len(), 16);
}

#[test]
fn test_cancelled_ids_never_fire_under_contention() {
    let (clock, tracker) = shared_tracker();
    let fired_after_cancel = Arc::new(Mutex::new(Vec::<TimerId>::new()));
    let cancelled: Arc<Mutex<HashSet<TimerId>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut ids = Vec::new();
    for _ in 0..200 {
        let cancelled = Arc::clone(&cancelled);
        let violations = Arc::clone(&fired_after_cancel);
        let id = tracker
            .register_timer_fn(DueSpec::slices(1).unwrap(), true, move |id| {
                if cancelled.lock().contains(&id) {
                    violations.lock().push(id);
                }
                Outcome::Reschedule
            })
            .unwrap();
        ids.push(id);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let driver = {
        let tracker = Arc::clone(&tracker);
        let clock = Arc::clone(&clock);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                clock.advance(Timeslices::new(1).unwrap());
                tracker.tick().unwrap();
            }
        })
    };

    for id in ids.iter().step_by(2) {
        // A firing already in progress when remove_timer returns is allowed,
        // so only count the id once a full pass has completed after it.
        if tracker.remove_timer(*id) {
            tracker.tick().unwrap();
            cancelled.lock().insert(*id);
        }
    }

    // Let several more passes run after the last cancellation.
    thread::sleep(Duration::from_millis(20));
    stop.store(true, Ordering::SeqCst);
    driver.join().unwrap();
    tracker.tick().unwrap();

    assert!(fired_after_cancel.lock().is_empty());
    assert_eq!(tracker.len(), 100);
}
