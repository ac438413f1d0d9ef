use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};
use slotrace::config::Config;
use slotrace::consumer::HeadDrainer;
use slotrace::exclusion::{Exclusion, Guarded, Unguarded};
use slotrace::lock::Mutex;
use slotrace::producer::TailAdvancer;
use slotrace::relax::{Relax, Spin, SpinBackoff, Yield};
use slotrace::state::Shared;

fn gen_lock_unlock<R: Relax>(bencher: &mut Bencher) {
    let mutex = Mutex::<u32, R>::new(0);
    bencher.iter(|| mutex.lock_then(|data| *data = data.wrapping_add(1)));
}

fn gen_lock_unlock_write_contention<R: Relax + 'static>(bencher: &mut Bencher) {
    let data = Arc::new(Mutex::<u32, R>::new(0));

    let thread = thread::spawn({
        let data = Arc::clone(&data);
        move || {
            while Arc::strong_count(&data) > 1 {
                for _ in 0..1000 {
                    data.lock_then(|data| *data = data.wrapping_add(1));
                }
            }
        }
    });

    bencher.iter(|| data.lock_then(|data| *data = data.wrapping_add(1)));

    drop(data);
    thread.join().unwrap();
}

/// One advance followed by one drain, with no induced delay.
fn gen_step_pair<E: Exclusion>(bencher: &mut Bencher) {
    let config = Config::default().with_slots(10).with_delay(Duration::ZERO);
    let shared = Arc::new(Shared::<E>::new(config.slots));
    let producer = TailAdvancer::new(Arc::clone(&shared), &config);
    let consumer = HeadDrainer::new(Arc::clone(&shared), &config);
    bencher.iter(|| {
        black_box(producer.step().unwrap());
        black_box(consumer.step().unwrap());
    });
}

fn lock_unlock(criterion: &mut Criterion) {
    criterion.bench_function("lock_unlock_spin", gen_lock_unlock::<Spin>);
    criterion.bench_function("lock_unlock_yield", gen_lock_unlock::<Yield>);
    criterion.bench_function("lock_unlock_backoff", gen_lock_unlock::<SpinBackoff>);
}

fn lock_unlock_write_contention(criterion: &mut Criterion) {
    criterion.bench_function("write_contention_spin", gen_lock_unlock_write_contention::<Spin>);
    criterion.bench_function("write_contention_yield", gen_lock_unlock_write_contention::<Yield>);
    criterion.bench_function("write_contention_backoff", gen_lock_unlock_write_contention::<SpinBackoff>);
}

fn step_pair(criterion: &mut Criterion) {
    criterion.bench_function("step_pair_unguarded", gen_step_pair::<Unguarded>);
    criterion.bench_function("step_pair_guarded", gen_step_pair::<Guarded>);
}

criterion_group!(steps, lock_unlock, lock_unlock_write_contention, step_pair);
criterion_main!(steps);
