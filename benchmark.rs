use colvm::{
    Column, EngineConfig, Filter, Interpreter, QueryPlanner, QuerySpec, SortKey, StringPool, Table,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

const ROWS: usize = 1_000_000;
const RUNS: u32 = 5;

fn main() {
    println!("========================================");
    println!("colvm Benchmark ({} rows, best of {})", ROWS, RUNS);
    println!("========================================");
    println!();

    let table = generate_table(ROWS);

    // benchmark 1: comparison sort vs radix sort on an integer key
    benchmark_sort(&table);
    println!();

    // benchmark 2: index refinement vs bit vector filtering
    benchmark_filters(&table);
    println!();

    // benchmark 3: set membership by binary search vs hash set
    benchmark_membership(&table);
}

/// columns: id, key (int64), score (nullable int32), price (double), city (string)
fn generate_table(rows: usize) -> Table {
    let mut rng = StdRng::seed_from_u64(42);
    let cities = ["Amsterdam", "Berlin", "Lisbon", "Oslo", "Paris", "Rome", "Vienna"];

    let keys: Vec<i64> = (0..rows).map(|_| rng.gen_range(-1_000_000..1_000_000)).collect();
    let scores: Vec<Option<i32>> = (0..rows)
        .map(|_| rng.gen_bool(0.9).then(|| rng.gen_range(0..100)))
        .collect();
    let prices: Vec<f64> = (0..rows).map(|_| rng.gen_range(0.0..500.0)).collect();
    let city_names: Vec<Option<&str>> = (0..rows)
        .map(|_| Some(cities[rng.gen_range(0..cities.len())]))
        .collect();

    let mut pool = StringPool::new();
    let city = Column::from_strings(&city_names, &mut pool);
    let mut table = Table::with_strings(pool);
    table.add_column("id", Column::id(rows)).expect("id column");
    table.add_column("key", Column::from_values(&keys)).expect("key column");
    table.add_column("score", Column::from_options(&scores)).expect("score column");
    table.add_column("price", Column::from_values(&prices)).expect("price column");
    table.add_column("city", city).expect("city column");
    table
}

/// best wall time of compiling and running `spec` under `config`
fn time_query(table: &Table, spec: &QuerySpec, config: EngineConfig) -> (u128, usize) {
    let planner = QueryPlanner::new(config).expect("valid config");
    let interpreter = Interpreter::new(planner.config());
    let schema = table.schema();

    let mut best = u128::MAX;
    let mut rows = 0;
    for _ in 0..RUNS {
        let start = Instant::now();
        let program = planner.compile(&schema, spec).expect("compile failed");
        let result = interpreter.execute(&program, table).expect("execution failed");
        best = best.min(start.elapsed().as_micros());
        rows = result.row_count;
    }
    (best, rows)
}

fn report(label: &str, (micros, rows): (u128, usize)) {
    let throughput = (ROWS as f64 / (micros.max(1) as f64 / 1_000_000.0)) as u64;
    println!(
        "  {:<24} {:>8.2}ms ({} rows, {} rows/sec)",
        label,
        micros as f64 / 1000.0,
        rows,
        throughput
    );
}

fn benchmark_sort(table: &Table) {
    println!("Benchmark 1: ORDER BY key DESC, score");
    let spec = QuerySpec::new()
        .order_by(SortKey::desc(1))
        .order_by(SortKey::asc(2));

    let comparison = EngineConfig::default().with_radix_sort_threshold(usize::MAX);
    let radix = EngineConfig::default().with_radix_sort_threshold(0);
    report("comparison sort", time_query(table, &spec, comparison));
    report("radix sort", time_query(table, &spec, radix));
    println!("========================================");
}

fn benchmark_filters(table: &Table) {
    println!("Benchmark 2: score >= 20 AND price < 400 AND key > 0 AND city != 'Oslo'");
    let spec = QuerySpec::new()
        .filter(Filter::ge(2, 20))
        .filter(Filter::lt(3, 400.0))
        .filter(Filter::gt(1, 0))
        .filter(Filter::ne(4, "Oslo"));

    let refine = EngineConfig::default().without_bit_vector_filters();
    let bits = EngineConfig::default().with_bit_vector_filter_threshold(2);
    report("scan + refine", time_query(table, &spec, refine));
    report("bit vectors", time_query(table, &spec, bits));
    println!("========================================");
}

fn benchmark_membership(table: &Table) {
    println!("Benchmark 3: score IN (64 values)");
    let spec = QuerySpec::new().filter(Filter::in_list(2, (0..128).step_by(2)));

    let binary_search = EngineConfig::default().with_hash_set_threshold(usize::MAX);
    let hashed = EngineConfig::default().with_hash_set_threshold(1);
    report("binary search", time_query(table, &spec, binary_search));
    report("hash set", time_query(table, &spec, hashed));
    println!("========================================");
}
