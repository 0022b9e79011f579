use criterion::{criterion_group, criterion_main, Criterion};
use tinystack::{Listing, ListingError};

pub fn tokenize_benchmark(c: &mut Criterion) {
    let source = "PUSH 3 PUSH 4 ADD PUSH 5 MINUS\n".repeat(1_000);
    c.bench_function("tokenize", |b| {
        b.iter(|| -> Result<(), ListingError> {
            Listing::from_source(&source).into_stream()?;

            Ok(())
        })
    });
}

pub fn open_benchmark(c: &mut Criterion) {
    c.bench_function("open", |b| {
        b.iter(|| -> Result<(), ListingError> {
            Listing::open("programs/array.vm")?.into_stream()?;

            Ok(())
        })
    });
}

criterion_group!(listing, tokenize_benchmark, open_benchmark);
criterion_main!(listing);
