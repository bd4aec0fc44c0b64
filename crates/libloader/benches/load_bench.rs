use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use libloader::{LibraryLoader, mem};

fn host_c_library() -> &'static str {
    if cfg!(target_os = "macos") {
        "/usr/lib/libSystem.B.dylib"
    } else if cfg!(windows) {
        "msvcrt.dll"
    } else {
        "libc.so.6"
    }
}

fn benchmark_loader_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("loader_paths");

    group.bench_function("open_close", |b| {
        b.iter(|| {
            let loader = LibraryLoader::new(black_box(host_c_library())).unwrap();
            loader.close();
        });
    });

    let mut loader = LibraryLoader::new(host_c_library()).unwrap();
    group.bench_function("symbol_hit", |b| {
        b.iter(|| black_box(loader.get_symbol(black_box(c"free")).unwrap()));
    });
    group.bench_function("symbol_miss", |b| {
        b.iter(|| black_box(loader.get_symbol(black_box(c"there_is_no_such_a_symbol"))));
    });

    group.finish();
}

fn benchmark_allocator_indirection(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator_indirection");

    group.bench_function("vtable_malloc_free_64", |b| {
        b.iter(|| {
            let p = mem::malloc(black_box(64));
            // SAFETY: `p` came from `mem::malloc` under the default allocator.
            unsafe { mem::free(p) };
        });
    });

    group.bench_function("host_malloc_free_64", |b| {
        b.iter(|| {
            // SAFETY: plain libc allocation released immediately.
            unsafe { libc::free(libc::malloc(black_box(64))) };
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_loader_paths, benchmark_allocator_indirection);
criterion_main!(benches);
