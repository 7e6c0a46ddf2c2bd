use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use teascript::broadcast::Collector;
use teascript::script::{compile, Invocation, InvocationInputs, MemoryListProvider};

const LOOP: &str = "\
set !n 1000
@top
add !sum !n
subtract !n 1
jump @top !n
print !sum
end
";

const LISTS: &str = "\
list:load bench
set !i 200
@fill
randomize !row.score 1 1000
set !row.id !i
list:add !row.*
subtract !i 1
jump @fill !i
list:sort score desc
list:limit 10
list:first !top.*
end
";

fn make_script(lines: usize) -> String {
    let mut src = String::from("script big\ncommand big\noptional who\n");
    for i in 0..lines {
        src.push_str(&format!("@l{i}\nset !v{i} {i}\nadd !total !v{i}\njump @l{i} !never\n"));
    }
    src.push_str("end\n");
    src
}

fn bench_engine(c: &mut Criterion) {
    let sink = Collector::new();
    let big = make_script(500);

    let mut g = c.benchmark_group("engine");

    g.bench_function("compile_2k_lines", |b| b.iter(|| compile(black_box(&big), "big", &*sink).unwrap()));

    let looped = Arc::new(compile(LOOP, "loop", &*sink).unwrap());
    g.bench_function("run_3k_statements", |b| {
        b.iter(|| {
            let inputs = InvocationInputs::new(sink.clone());
            let inv = Invocation::new(Arc::clone(&looped), inputs, "").unwrap();
            black_box(inv.run());
            sink.take();
        })
    });

    let lists = Arc::new(compile(LISTS, "lists", &*sink).unwrap());
    g.bench_function("fill_sort_200_records", |b| {
        b.iter(|| {
            let inputs = InvocationInputs::new(sink.clone()).lists(MemoryListProvider::new());
            let inv = Invocation::new(Arc::clone(&lists), inputs, "").unwrap();
            black_box(inv.run());
        })
    });

    g.finish();
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
