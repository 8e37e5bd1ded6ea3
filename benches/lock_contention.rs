//! Lock manager contention benchmark (SPEC_FULL.md §8): throughput of
//! disjoint-owner acquire/release cycles at the Instance level, and of
//! a single contended name under alternating shared/exclusive load.

use clusterd::locking::{LockLevel, LockManager, LockTarget};
use criterion::{criterion_group, criterion_main, Criterion};

fn disjoint_owners(c: &mut Criterion) {
    c.bench_function("disjoint_owners_acquire_release", |b| {
        let locks = LockManager::new();
        b.iter(|| {
            let owner = locks.new_owner();
            locks
                .acquire(owner, LockLevel::Cluster, &LockTarget::Names(vec!["BGL".into()]), true, 0, None)
                .unwrap();
            locks
                .acquire(
                    owner,
                    LockLevel::Instance,
                    &LockTarget::Names(vec!["inst-bench".into()]),
                    false,
                    0,
                    None,
                )
                .unwrap();
            locks.release(owner, None);
        });
    });
}

fn contended_shared_acquire(c: &mut Criterion) {
    c.bench_function("contended_name_shared_acquire", |b| {
        let locks = LockManager::new();
        let holder = locks.new_owner();
        locks
            .acquire(holder, LockLevel::Cluster, &LockTarget::Names(vec!["BGL".into()]), true, 0, None)
            .unwrap();
        locks
            .acquire(holder, LockLevel::Instance, &LockTarget::Names(vec!["inst-bench".into()]), true, 0, None)
            .unwrap();

        b.iter(|| {
            let owner = locks.new_owner();
            locks
                .acquire(owner, LockLevel::Cluster, &LockTarget::Names(vec!["BGL".into()]), true, 0, None)
                .unwrap();
            locks
                .acquire(owner, LockLevel::Instance, &LockTarget::Names(vec!["inst-bench".into()]), true, 0, None)
                .unwrap();
            locks.release(owner, None);
        });
    });
}

criterion_group!(benches, disjoint_owners, contended_shared_acquire);
criterion_main!(benches);
