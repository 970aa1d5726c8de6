// benches/schedule_bench.rs

//! Schedule Manager and Statistics Engine benchmarks.
//!
//! Measures the cost of the two hot paths the spec calls out explicitly:
//! the Schedule Manager's link CRUD (contended against the MAC's per-slot
//! read in the real service) and the Statistics Engine's per-frame EWMA
//! update (driven once per received/transmitted frame).

use criterion::{Criterion, criterion_group, criterion_main};
use sixtopd::core::addr::Addr;
use sixtopd::core::schedule::{LinkOptions, LinkType, ScheduleStore};
use sixtopd::core::stats::entry::MetricKind;
use sixtopd::core::stats::engine::{StatisticsEngine, StatsConfigRequest};

fn peer(byte: u8) -> Addr {
    Addr([byte; 8])
}

fn populated_schedule(links: u32) -> ScheduleStore {
    let mut schedule = ScheduleStore::new(1, links as usize);
    schedule.add_slotframe(1, links as u32 + 1).unwrap();
    for i in 0..links {
        schedule
            .add_link(
                1,
                i as u16,
                (i % 16) as u16,
                LinkOptions::TX | LinkOptions::RX,
                LinkType::Normal,
                peer((i % 250) as u8 + 1),
            )
            .unwrap();
    }
    schedule
}

/// Add/remove link churn, the pattern a controller reconfiguring a
/// schedule drives repeatedly (spec §4.C).
pub fn bench_link_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_link_churn");

    group.bench_function("add_remove_link_single_slotframe", |b| {
        b.iter_custom(|iters| {
            let mut schedule = ScheduleStore::new(1, 64);
            schedule.add_slotframe(1, 101).unwrap();
            let start = std::time::Instant::now();
            for i in 0..iters {
                let handle = schedule
                    .add_link(
                        1,
                        (i % 100) as u16,
                        2,
                        LinkOptions::TX,
                        LinkType::Normal,
                        peer(7),
                    )
                    .unwrap();
                schedule.remove_link(1, handle).unwrap();
            }
            start.elapsed()
        });
    });

    group.bench_function("find_link_by_slot_in_64_link_schedule", |b| {
        let schedule = populated_schedule(64);
        b.iter(|| {
            for ts in 0..64u16 {
                let _ = schedule.find_link_by_slot(1, ts);
            }
        });
    });

    group.finish();
}

/// Per-frame statistics updates: the callback path the MAC drives on
/// every received and acknowledged frame (spec §4.D).
pub fn bench_stats_online_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("stats_online_update");

    group.bench_function("on_rx_rssi_lqi_ewma", |b| {
        b.iter_custom(|iters| {
            let mut schedule = populated_schedule(32);
            let mut stats = StatisticsEngine::new(64, 64);
            for i in 0..32u32 {
                stats
                    .configure(
                        &mut schedule,
                        StatsConfigRequest {
                            slotframe: Some(1),
                            timeslot: Some(i as u16),
                            channel: None,
                            target: None,
                            metric: Some(MetricKind::Rssi),
                            id: Some(1),
                            enable: true,
                            window: 16,
                            value: None,
                        },
                    )
                    .unwrap();
            }
            let start = std::time::Instant::now();
            for i in 0..iters {
                let ts = (i % 32) as u16;
                stats.on_rx(&schedule, 1, ts, peer(9), -60, 200, i as u32);
            }
            start.elapsed()
        });
    });

    group.bench_function("on_tx_complete_etx_pdr_ewma", |b| {
        b.iter_custom(|iters| {
            let mut schedule = populated_schedule(32);
            let mut stats = StatisticsEngine::new(64, 64);
            for i in 0..32u32 {
                stats
                    .configure(
                        &mut schedule,
                        StatsConfigRequest {
                            slotframe: Some(1),
                            timeslot: Some(i as u16),
                            channel: None,
                            target: None,
                            metric: Some(MetricKind::Etx),
                            id: Some(1),
                            enable: true,
                            window: 16,
                            value: None,
                        },
                    )
                    .unwrap();
            }
            let start = std::time::Instant::now();
            for i in 0..iters {
                let ts = (i % 32) as u16;
                stats.on_tx_complete(&schedule, 1, ts, true, 2);
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_link_churn, bench_stats_online_update);
criterion_main!(benches);
