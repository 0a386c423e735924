//! Criterion benchmarks for sharding-core.
//!
//! ## Benchmark groups
//!
//! 1. **expression** — data node expression expansion.
//! 2. **routing** — precise, broadcast and binding-table routes.
//! 3. **keygen** — snowflake and increment key generation.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/sharding-core/Cargo.toml
//! # Only the routing group:
//! cargo bench --manifest-path crates/sharding-core/Cargo.toml -- routing
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sharding_core::registry::MODULO;
use sharding_core::{
    resolve_data_nodes, AlgorithmRegistry, IncrementKeyGenerator, KeyGenerator, RoutingContext,
    ShardingCondition, ShardingRule, ShardingRuleConfig, SnowflakeKeyGenerator, StatementKind,
    StrategyConfig, TableRuleConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn order_rule(sources: usize, tables: usize) -> ShardingRule {
    let nodes = |table: &str| {
        format!(
            "ds${{0..{}}}.{table}_${{0..{}}}",
            sources - 1,
            tables - 1
        )
    };
    let config = ShardingRuleConfig {
        tables: vec![
            TableRuleConfig::new("t_order").with_data_nodes(nodes("t_order")),
            TableRuleConfig::new("t_order_item").with_data_nodes(nodes("t_order_item")),
        ],
        binding_table_groups: vec!["t_order, t_order_item".to_string()],
        default_database_strategy: Some(StrategyConfig::standard("user_id", MODULO, Some(MODULO))),
        default_table_strategy: Some(StrategyConfig::standard("order_id", MODULO, Some(MODULO))),
        ..ShardingRuleConfig::default()
    };
    ShardingRule::new(&config, Vec::new(), &AlgorithmRegistry::with_builtins()).unwrap()
}

// ---------------------------------------------------------------------------
// Benchmark: expression expansion
// ---------------------------------------------------------------------------

fn bench_expression(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression");

    group.bench_function("literal_list", |b| {
        b.iter(|| {
            resolve_data_nodes(black_box(
                "ds0.t_order_0,ds0.t_order_1,ds1.t_order_0,ds1.t_order_1",
            ))
            .unwrap()
        });
    });

    for size in [4usize, 64, 1024] {
        let expression = format!("ds${{0..3}}.t_order_${{0..{}}}", size / 4 - 1);
        group.bench_with_input(BenchmarkId::new("range_product", size), &expression, |b, e| {
            b.iter(|| resolve_data_nodes(black_box(e)).unwrap());
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: routing
// ---------------------------------------------------------------------------

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    let rule = order_rule(4, 16);
    let precise = [
        ShardingCondition::equal("user_id", 7),
        ShardingCondition::equal("order_id", 1_001),
    ];

    group.bench_function("precise_single_node", |b| {
        b.iter(|| {
            let mut ctx = RoutingContext::new();
            rule.route(&mut ctx, "t_order", black_box(&precise), StatementKind::Select)
                .unwrap()
        });
    });

    let none: [ShardingCondition; 0] = [];
    group.bench_function("broadcast_all_nodes", |b| {
        b.iter(|| {
            let mut ctx = RoutingContext::new();
            rule.route(&mut ctx, "t_order", black_box(&none), StatementKind::Select)
                .unwrap()
        });
    });

    group.bench_function("binding_pair", |b| {
        b.iter(|| {
            let mut ctx = RoutingContext::new();
            rule.route(&mut ctx, "t_order", black_box(&precise), StatementKind::Select)
                .unwrap();
            rule.route(&mut ctx, "t_order_item", &[], StatementKind::Select)
                .unwrap()
        });
    });

    let range = [
        ShardingCondition::equal("user_id", 7),
        ShardingCondition::between("order_id", 100, 105),
    ];
    group.bench_function("range_on_table_axis", |b| {
        b.iter(|| {
            let mut ctx = RoutingContext::new();
            rule.route(&mut ctx, "t_order", black_box(&range), StatementKind::Select)
                .unwrap()
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: key generation
// ---------------------------------------------------------------------------

fn bench_keygen(c: &mut Criterion) {
    let mut group = c.benchmark_group("keygen");

    let snowflake = SnowflakeKeyGenerator::new(1).unwrap();
    group.bench_function("snowflake_next_key", |b| {
        b.iter(|| black_box(snowflake.next_key().unwrap()));
    });

    let increment = IncrementKeyGenerator::default();
    group.bench_function("increment_next_key", |b| {
        b.iter(|| black_box(increment.next_key().unwrap()));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Register all benchmark groups
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_expression, bench_routing, bench_keygen);
criterion_main!(benches);
