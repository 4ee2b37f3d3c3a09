use migrate_lat::channel::event_ring;
use migrate_lat::correlation::{
    Completion, ManualClock, MigrateOutcome, StartTable, TaskSnapshot, Tracer,
};
use migrate_lat::poller::{
    decode, OutputFormat, Poller, PollerConfig, SampleFilter, SampleWriter, StopFlag,
};
use migrate_lat_common::{LatencyEvent, EVENT_RING_BYTES, RING_RECORD_HEADER};
use std::sync::Arc;
use std::time::Duration;

fn tracer(ring_bytes: usize) -> (Tracer<ManualClock>, migrate_lat::channel::RingConsumer) {
    let (producer, consumer) = event_ring(ring_bytes);
    let table = Arc::new(StartTable::default());
    (Tracer::new(table, producer, ManualClock::new(0)), consumer)
}

fn outcome(succeeded: u64) -> MigrateOutcome {
    MigrateOutcome { succeeded, failed: 0, mode: 1, reason: 0 }
}

#[test]
fn test_start_then_complete_reports_elapsed() {
    let (tracer, consumer) = tracer(EVENT_RING_BYTES as usize);
    let task = TaskSnapshot::new(4243, 4242, "migratepages").with_cgroup(1);

    tracer.clock().set(1_000_000);
    tracer.start(&task);
    tracer.clock().set(1_250_000);
    assert!(matches!(tracer.complete(&task, outcome(4)), Completion::Published(_)));

    let records = consumer.poll(Duration::from_millis(10));
    assert_eq!(records.len(), 1);
    let sample = decode(&records[0]).expect("record decodes");
    assert_eq!(sample.comm, "migratepages");
    assert_eq!(sample.pid, 4242);
    assert_eq!(sample.delta_ns, 250_000);
    assert_eq!(sample.pages_ok, 4);
    assert_eq!((sample.mode, sample.reason), (1, 0));
    assert_eq!(sample.pages_failed, 0);

    // Entry is consumed by the completion
    assert_eq!(tracer.complete(&task, outcome(4)), Completion::Unmatched);
}

#[test]
fn test_lone_completion_reports_nothing() {
    let (tracer, consumer) = tracer(EVENT_RING_BYTES as usize);
    let task = TaskSnapshot::new(7, 7, "kcompactd0");

    assert_eq!(tracer.complete_at(&task, 500, outcome(1)), Completion::Unmatched);
    assert!(consumer.poll(Duration::from_millis(1)).is_empty());
    assert_eq!(tracer.stats().unmatched, 1);
}

#[test]
fn test_restart_overwrites_previous_start() {
    let (tracer, consumer) = tracer(EVENT_RING_BYTES as usize);
    let task = TaskSnapshot::new(9, 9, "numad");

    tracer.start_at(&task, 100);
    tracer.start_at(&task, 400);
    tracer.complete_at(&task, 1_000, outcome(1));

    let records = consumer.poll(Duration::from_millis(10));
    assert_eq!(records.len(), 1);
    assert_eq!(decode(&records[0]).unwrap().delta_ns, 600);
}

#[test]
fn test_same_tid_different_cgroup_is_distinct() {
    let (tracer, consumer) = tracer(EVENT_RING_BYTES as usize);
    let a = TaskSnapshot::new(11, 11, "a").with_cgroup(100);
    let b = TaskSnapshot::new(11, 11, "b").with_cgroup(200);

    tracer.start_at(&a, 10);
    tracer.start_at(&b, 20);
    tracer.complete_at(&a, 110, outcome(1));
    tracer.complete_at(&b, 220, outcome(1));

    let deltas: Vec<u64> = consumer
        .poll(Duration::from_millis(10))
        .iter()
        .map(|r| decode(r).unwrap().delta_ns)
        .collect();
    assert_eq!(deltas, vec![100, 200]);
}

#[test]
fn test_full_ring_drops_without_corrupting() {
    let record_bytes = LatencyEvent::SIZE + RING_RECORD_HEADER;
    let (tracer, consumer) = tracer(record_bytes * 4);

    for tid in 0..10u32 {
        let task = TaskSnapshot::new(tid, tid, "stress");
        tracer.start_at(&task, 0);
        tracer.complete_at(&task, u64::from(tid) + 1, outcome(1));
    }

    let stats = tracer.stats();
    assert_eq!(stats.published, 4);
    assert_eq!(stats.dropped, 6);

    let records = consumer.poll(Duration::from_millis(10));
    assert_eq!(records.len(), 4);
    for (tid, record) in records.iter().enumerate() {
        let sample = decode(record).expect("every delivered record is whole");
        assert_eq!(sample.pid, tid as u32);
        assert_eq!(sample.delta_ns, tid as u64 + 1);
    }
}

#[test]
fn test_concurrent_tasks_each_get_their_own_sample() {
    const THREADS: u32 = 8;
    const PER_THREAD: u32 = 200;

    let (tracer, consumer) = tracer(EVENT_RING_BYTES as usize);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let tracer = &tracer;
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let tid = t * PER_THREAD + i;
                    let task = TaskSnapshot::new(tid, tid, "worker");
                    tracer.start_at(&task, 1_000);
                    tracer.complete_at(&task, 1_000 + u64::from(tid), outcome(1));
                }
            });
        }
    });

    let mut pids: Vec<u32> = consumer
        .poll(Duration::from_millis(10))
        .iter()
        .map(|r| {
            let sample = decode(r).unwrap();
            assert_eq!(sample.delta_ns, u64::from(sample.pid));
            sample.pid
        })
        .collect();
    pids.sort_unstable();
    assert_eq!(pids, (0..THREADS * PER_THREAD).collect::<Vec<_>>());

    let stats = tracer.stats();
    assert_eq!(stats.matched, u64::from(THREADS * PER_THREAD));
    assert_eq!(stats.unmatched, 0);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn test_poller_applies_comm_filter() {
    let (tracer, mut consumer) = tracer(EVENT_RING_BYTES as usize);
    for (tid, comm) in [(1, "migratepages"), (2, "kcompactd0"), (3, "migratepages2")] {
        let task = TaskSnapshot::new(tid, tid, comm);
        tracer.start_at(&task, 0);
        tracer.complete_at(&task, 2_000_000, outcome(8));
    }

    let config = PollerConfig {
        timeout: Duration::from_millis(5),
        filter: SampleFilter::new(None, Some("migratepages")),
        duration: Some(Duration::from_millis(50)),
    };
    let mut poller = Poller::new(config, StopFlag::new());
    let mut out = SampleWriter::new(Vec::new(), OutputFormat::Text);
    poller.run(&mut consumer, &mut out).unwrap();

    let text = String::from_utf8(out.into_inner()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("COMM"));
    assert!(lines[1].starts_with("migratepages     1 "));
    assert!(lines[1].contains("2.000 ms"));
    assert_eq!(poller.summary().filtered, 2);
}
