//! Benchmarks of endor-dictionary.
//!
//! Three aspects are measured:
//!
//! -   Look-ups of values already present, which never take the insertion lock, by 1 to 8 readers.
//! -   Insertions crossing many growth boundaries, against insertions into a table sized up-front.
//! -   The slow path under contention: concurrent writers, and readers sharing the dictionary with a writer.

use std::time::{Duration, Instant};

use bursty::BurstyBuilder;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use fxhash::FxHashSet;

use endor_dictionary::{DefaultBuildHasher, Dictionary, Global};

criterion_main!(lookup, growth, contention,);

const NUMBER_THREADS: [usize; 4] = [1, 2, 4, 8];

criterion_group!(lookup, lookup_baseline, lookup_readers,);

//  Membership tests of the skewed stream against a pre-filled FxHashSet.
//
//  Same hash, no atomics, no indirection through the segment table: the floor for `lookup_readers` with 1 thread.
fn lookup_baseline(c: &mut Criterion) {
    let stream = workload::get_stream();
    let set: FxHashSet<&str> = workload::get_vocabulary().iter().map(String::as_str).collect();

    c.bench_function(&format!("lookup baseline ({})", stream.len()), |b| {
        b.iter(|| stream.iter().filter(|word| set.contains(word.as_str())).count())
    });
}

//  Each reader interns the whole skewed stream into a dictionary already holding the entire vocabulary.
//
//  Only the lock-free path is taken; readers should scale with the number of cores.
fn lookup_readers(c: &mut Criterion) {
    let stream = workload::get_stream();

    for threads in NUMBER_THREADS {
        c.bench_function(&format!("lookup readers ({} each) {threads}T", stream.len()), |b| {
            b.iter_custom(|n| {
                (0..n)
                    .map(|_| timed_burst(filled(workload::get_vocabulary()), vec![stream; threads]))
                    .sum()
            })
        });
    }
}

criterion_group!(growth, growth_from_one_bucket, growth_presized,);

//  Interns the vocabulary into a dictionary starting from a single bucket.
//
//  The table grows through all its generations, each split walking every existing chain.
fn growth_from_one_bucket(c: &mut Criterion) {
    growth_impl(c, "growth from 1 bucket", 1);
}

//  Interns the vocabulary into a dictionary whose first generation already holds one bucket per value.
fn growth_presized(c: &mut Criterion) {
    let buckets = workload::get_vocabulary().len().next_power_of_two();

    growth_impl(c, "growth presized", buckets);
}

fn growth_impl(c: &mut Criterion, root: &str, initial_buckets: usize) {
    let vocabulary = workload::get_vocabulary();

    c.bench_function(&format!("{root} ({})", vocabulary.len()), |b| {
        b.iter_batched(
            || configured(initial_buckets),
            |dictionary| {
                for word in vocabulary {
                    let _ = black_box(dictionary.intern(word));
                }

                dictionary
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(contention, contention_writers, contention_mixed,);

//  N writers each intern their own share of the vocabulary into a fresh dictionary.
//
//  Every call misses, hence every call queues on the insertion lock.
fn contention_writers(c: &mut Criterion) {
    let vocabulary = workload::get_vocabulary();

    for threads in NUMBER_THREADS.into_iter().skip(1) {
        let share = vocabulary.len() / threads;

        c.bench_function(&format!("contention writers ({share} each) {threads}T"), |b| {
            b.iter_custom(|n| {
                (0..n)
                    .map(|_| timed_burst(Dictionary::new(), vocabulary.chunks(share).take(threads).collect()))
                    .sum()
            })
        });
    }
}

//  One writer interns the second half of the vocabulary, while N - 1 readers intern the first half, already present.
fn contention_mixed(c: &mut Criterion) {
    let (present, absent) = workload::get_vocabulary().split_at(workload::get_vocabulary().len() / 2);

    for threads in NUMBER_THREADS.into_iter().skip(1) {
        c.bench_function(&format!("contention mixed (1 writer, {} readers)", threads - 1), |b| {
            b.iter_custom(|n| {
                (0..n)
                    .map(|_| {
                        let mut slices = vec![present; threads];
                        slices[0] = absent;

                        timed_burst(filled(present), slices)
                    })
                    .sum()
            })
        });
    }
}

//  Runs a single burst, one thread per slice, each thread interning the words of its slice.
//
//  Returns the time taken by the slowest thread.
fn timed_burst(dictionary: Dictionary, slices: Vec<&'static [String]>) -> Duration {
    let locals: Vec<_> = slices.into_iter().map(|slice| (slice, Duration::ZERO)).collect();

    let mut builder = BurstyBuilder::new(dictionary, locals);

    builder.add_simple_step(|| {
        move |dictionary, local| {
            let start = Instant::now();

            for word in local.0 {
                let _ = black_box(dictionary.intern(word));
            }

            local.1 = start.elapsed();
        }
    });

    let bursty = builder.launch(1);

    bursty
        .into_locals()
        .into_iter()
        .map(|(_, elapsed)| elapsed)
        .max()
        .unwrap_or_default()
}

fn configured(initial_buckets: usize) -> Dictionary {
    let mut builder = Dictionary::with(DefaultBuildHasher::default(), Global);
    builder.set_initial_buckets(initial_buckets);

    builder.build()
}

fn filled(words: &[String]) -> Dictionary {
    let dictionary = Dictionary::new();

    for word in words {
        let _ = dictionary.intern(word);
    }

    dictionary
}

//  Seeded random workload:
//  -   A vocabulary of distinct words, of 1 to 16 alphanumeric characters.
//  -   A stream of words drawn from the vocabulary, skewed towards its front as natural text is.
mod workload {
    use std::{collections::HashSet, sync::OnceLock};

    use rand::{distributions::Alphanumeric, rngs::StdRng, Rng, SeedableRng};

    static VOCABULARY: OnceLock<Vec<String>> = OnceLock::new();

    static STREAM: OnceLock<Vec<String>> = OnceLock::new();

    const VOCABULARY_SIZE: usize = 50_000;

    const STREAM_SIZE: usize = 500_000;

    pub(super) fn get_vocabulary() -> &'static [String] {
        VOCABULARY.get_or_init(|| {
            let mut rng = StdRng::seed_from_u64(0xD1C7);
            let mut seen = HashSet::with_capacity(VOCABULARY_SIZE);
            let mut vocabulary = Vec::with_capacity(VOCABULARY_SIZE);

            while vocabulary.len() < VOCABULARY_SIZE {
                let length = rng.gen_range(1..=16);
                let word: String = (0..length).map(|_| char::from(rng.sample(Alphanumeric))).collect();

                if seen.insert(word.clone()) {
                    vocabulary.push(word);
                }
            }

            vocabulary
        })
    }

    pub(super) fn get_stream() -> &'static [String] {
        STREAM.get_or_init(|| {
            let vocabulary = get_vocabulary();
            let mut rng = StdRng::seed_from_u64(0x57EA);

            (0..STREAM_SIZE)
                .map(|_| {
                    //  Cubing a uniform sample concentrates the draws on the first few percents.
                    let uniform: f64 = rng.gen();
                    let index = (uniform.powi(3) * vocabulary.len() as f64) as usize;

                    vocabulary[index.min(vocabulary.len() - 1)].clone()
                })
                .collect()
        })
    }
}
