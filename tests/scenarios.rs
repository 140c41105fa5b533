use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use handoff::harness::{self, RunReport};
use handoff::interface::{Channel, Consumer};
use handoff::locked::LockedChannel;
use handoff::naive::NaiveChannel;
use handoff::notify::NotifyChannel;
use handoff::spin::SpinChannel;
use handoff::{Config, Strategy};
use rstest::{fixture, rstest};

fn labels(limit: usize) -> Vec<String> {
    (0..limit).map(|i| format!("item-{}", i)).collect()
}

fn config(strategy: Strategy, limit: usize) -> Config {
    Config::new(strategy).with_limit(limit).with_record(true)
}

fn assert_exactly_once(report: &RunReport<String>, limit: usize) {
    assert_eq!(report.consumer.items, labels(limit));
    assert_eq!(report.consumer.stats.consumed, limit);
    assert_eq!(report.channel.peak_occupancy, Some(1));
    assert_eq!(
        report.channel.remaining,
        report.producer.produced - limit,
        "every produced item is either consumed or still queued"
    );
}

//  True if `values` is not exactly `n, n + 1, n + 2, ...`.
fn out_of_sequence(values: &[u64]) -> bool {
    values.windows(2).any(|pair| pair[1] != pair[0].wrapping_add(1))
}

#[fixture]
fn slow_producer() -> Config {
    config(Strategy::Locked, 100).with_wait(true)
}

#[rstest]
fn scenario_a_five_items_in_order() {
    let report = harness::run::<LockedChannel>(&config(Strategy::Locked, 5)).unwrap();

    assert_eq!(
        report.consumer.items,
        vec!["item-0", "item-1", "item-2", "item-3", "item-4"]
    );
    assert_exactly_once(&report, 5);
}

#[rstest]
fn scenario_b_slow_producer_paces_the_run(slow_producer: Config) {
    let report = harness::run::<LockedChannel>(&slow_producer).unwrap();

    assert_exactly_once(&report, 100);
    assert!(
        report.elapsed >= Duration::from_millis(100),
        "100 items at 1ms each took only {:?}",
        report.elapsed
    );

    //  Busy, but not unboundedly so: a 1ms gap cannot fit millions of polls.
    let per_item = report.consumer.stats.empty_polls / 100;
    assert!(per_item < 10_000_000, "{} empty polls per item", per_item);
}

#[rstest]
fn scenario_c_locked_and_spin_agree() {
    let limit = 100_000;

    let locked = harness::run::<LockedChannel>(&config(Strategy::Locked, limit)).unwrap();
    let spin = harness::run::<SpinChannel>(&config(Strategy::Spin, limit)).unwrap();

    assert_exactly_once(&locked, limit);
    assert_exactly_once(&spin, limit);
    assert_eq!(locked.consumer.items, spin.consumer.items);

    //  The spin consumer only retries the lock once the producer pushed, so
    //  it never finds the queue empty twice in a row.
    let stats = spin.consumer.stats;
    assert!(stats.empty_polls <= stats.consumed as u64 + 1);
    assert_eq!(stats.lock_acquisitions, stats.consumed as u64 + stats.empty_polls);
}

#[rstest]
fn scenario_c_spin_acquires_no_more_than_locked() {
    //  A single pair of runs is at the mercy of the scheduler; the best spin
    //  run against the worst locked run is not.
    let limit = 100_000;
    let runs = 3;

    let acquisitions = |strategy: Strategy| -> Vec<u64> {
        (0..runs)
            .map(|_| {
                let config = config(strategy, limit).with_record(false);
                let summary = harness::run_configured(&config).unwrap();
                assert_eq!(summary.consumer.consumed, limit);
                summary.consumer.lock_acquisitions
            })
            .collect()
    };

    let locked = acquisitions(Strategy::Locked);
    let spin = acquisitions(Strategy::Spin);

    let best_spin = spin.iter().min().copied().unwrap_or(0);
    let worst_locked = locked.iter().max().copied().unwrap_or(0);
    assert!(
        best_spin <= worst_locked,
        "spin took the lock {:?} times, locked {:?} times",
        spin,
        locked
    );
}

#[rstest]
fn spin_wastes_fewer_acquisitions_than_locked(slow_producer: Config) {
    let locked = harness::run::<LockedChannel>(&slow_producer).unwrap();

    let spin_config = Config { strategy: Strategy::Spin, ..slow_producer };
    let spin = harness::run::<SpinChannel>(&spin_config).unwrap();

    assert_exactly_once(&spin, 100);
    assert!(
        spin.consumer.stats.lock_acquisitions <= locked.consumer.stats.lock_acquisitions,
        "spin took the lock {} times, locked {} times",
        spin.consumer.stats.lock_acquisitions,
        locked.consumer.stats.lock_acquisitions,
    );
    assert!(spin.consumer.stats.empty_polls <= 101);
}

#[rstest]
fn notify_wastes_fewer_acquisitions_than_locked(slow_producer: Config) {
    let locked = harness::run::<LockedChannel>(&slow_producer).unwrap();

    let notify_config = Config { strategy: Strategy::Notify, ..slow_producer };
    let notify = harness::run::<NotifyChannel>(&notify_config).unwrap();

    assert_exactly_once(&notify, 100);
    assert!(notify.consumer.stats.lock_acquisitions < locked.consumer.stats.lock_acquisitions);
    assert_eq!(notify.consumer.stats.flag_spins, 0);
}

#[rstest]
#[case(true)]
#[case(false)]
fn spin_survives_forged_flag(#[case] forged: bool) {
    //  A third thread keeps overwriting the flag with a stale value; the
    //  consumer may spin or take the lock for nothing, never consume wrongly.
    let limit = 2_000;
    let channel = SpinChannel::new(&config(Strategy::Spin, limit));
    let done = Arc::new(AtomicBool::new(false));

    let forger = {
        let channel = channel.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                channel.set_hint(forged);
                thread::sleep(Duration::from_micros(20));
            }
        })
    };

    let report = harness::run_channel(channel);
    done.store(true, Ordering::Release);
    forger.join().unwrap();

    assert_exactly_once(&report.unwrap(), limit);
}

#[rstest]
#[case(Strategy::Locked)]
#[case(Strategy::Spin)]
#[case(Strategy::Notify)]
fn independent_runs_in_parallel(#[case] strategy: Strategy) {
    //  No global state: several runs share the process, not their queues.
    let limit = 10_000;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let config = config(strategy, limit);
            thread::spawn(move || match strategy {
                Strategy::Spin => harness::run::<SpinChannel>(&config),
                Strategy::Notify => harness::run::<NotifyChannel>(&config),
                _ => harness::run::<LockedChannel>(&config),
            })
        })
        .collect();

    for handle in handles {
        assert_exactly_once(&handle.join().unwrap().unwrap(), limit);
    }
}

#[rstest]
fn naive_duplicates_or_skips_eventually() {
    //  A probabilistic property: any single run may well come out clean, but
    //  over enough runs the unsynchronized queue mangles the sequence. On a
    //  single core, preemption interleaves the two sides just as well.
    let trials = 500;
    let config = config(Strategy::Naive, 10_000);

    let mangled = (0..trials).find(|_| {
        let report = harness::run::<NaiveChannel>(&config).unwrap();
        report.consumer.stats.anomalies > 0 || out_of_sequence(&report.consumer.items)
    });

    assert!(mangled.is_some(), "{} naive runs, all clean", trials);
}

#[rstest]
fn naive_counts_passes_not_items() {
    //  Nothing was ever produced, yet the consumer terminates: its counter
    //  counted empty passes.
    let channel = NaiveChannel::new(&config(Strategy::Naive, 50));
    let consumer = channel.spawn_consumer().unwrap();

    let report = consumer.run();

    assert_eq!(report.stats.consumed, 0);
    assert_eq!(report.stats.empty_polls, 50);
}

#[rstest]
fn second_producer_is_refused() {
    let channel = LockedChannel::new(&config(Strategy::Locked, 1));
    let _producer = channel.spawn_producer().unwrap();

    let error = harness::run_channel(channel).unwrap_err();

    assert!(matches!(error, handoff::Error::RoleTaken(handoff::Role::Producer)));
}
