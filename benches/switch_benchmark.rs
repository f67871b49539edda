use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use argstack::HeapStack;
use greenstack::{Continuation, Switcher};

fn switch_benchmark(c: &mut Criterion) {
    c.bench_function("switch into a continuation and back", |b| {
        let switcher = Switcher::threaded(HeapStack::new(64 * 1024));
        b.iter_batched(
            || Continuation::new(&switcher, |_this| Ok(Some(1u32))),
            |cont| cont.switch(None),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("yield ten values through one continuation", |b| {
        let switcher = Switcher::threaded(HeapStack::new(64 * 1024));
        b.iter_batched(
            || {
                Continuation::new(&switcher, |this| {
                    for n in 0..10u32 {
                        this.switch(Some(n))?;
                    }
                    Ok(None)
                })
            },
            |cont| {
                while let Ok(Some(_)) = cont.switch(None) {}
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, switch_benchmark);
criterion_main!(benches);
