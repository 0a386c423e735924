//! The aggregate sharding rule and the routing engine built on it.
//!
//! A [`ShardingRule`] is constructed once from configuration and is
//! immutable afterwards; share it as `Arc<ShardingRule>`.  Per-statement
//! state lives in a [`RoutingContext`] owned by the caller.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};

use crate::config::{ShardingRuleConfig, StrategyConfig, TableRuleConfig};
use crate::errors::{ShardingError, ShardingResult};
use crate::keygen::KeyGenerator;
use crate::models::{
    DataNode, GeneratedKey, Row, RoutingPlan, ShardingCondition, ShardingValue, StatementKind,
    StatementRoute,
};
use crate::registry::AlgorithmRegistry;
use crate::routing::{RoutingContext, Statement};
use crate::strategy::{ShardingStrategy, StrategyInput};

use super::binding::BindingTableGroup;
use super::table::TableRule;

#[derive(Debug)]
pub struct ShardingRule {
    /// Keyed by lower-cased logical table name.
    tables: IndexMap<String, TableRule>,
    binding_groups: Vec<BindingTableGroup>,
    default_database_strategy: ShardingStrategy,
    default_table_strategy: ShardingStrategy,
    default_key_generator: Option<Arc<dyn KeyGenerator>>,
    default_data_source: Option<String>,
    data_source_names: Vec<String>,
}

impl ShardingRule {
    /// Build and validate a rule.
    ///
    /// `data_source_names` is the set of data sources the caller can connect
    /// to; when empty it is inferred from the table rules.
    pub fn new(
        config: &ShardingRuleConfig,
        data_source_names: Vec<String>,
        registry: &AlgorithmRegistry,
    ) -> ShardingResult<Self> {
        let default_database_strategy = build_optional_strategy(
            registry,
            config.default_database_strategy.as_ref(),
        )?;
        let default_table_strategy =
            build_optional_strategy(registry, config.default_table_strategy.as_ref())?;
        let default_key_generator = config
            .default_key_generator
            .as_ref()
            .map(|generator| registry.build_key_generator(generator))
            .transpose()?;

        if let Some(ds) = &config.default_data_source_name {
            if !data_source_names.is_empty() && !data_source_names.contains(ds) {
                return Err(ShardingError::InvalidConfiguration(format!(
                    "default data source '{ds}' is not a known data source"
                )));
            }
        }

        let mut tables: IndexMap<String, TableRule> = IndexMap::with_capacity(config.tables.len());
        for table_config in &config.tables {
            let rule = build_table_rule(
                table_config,
                &data_source_names,
                registry,
                default_key_generator.as_ref(),
            )?;
            let key = rule.logical_table().to_ascii_lowercase();
            if tables.contains_key(&key) {
                return Err(ShardingError::InvalidConfiguration(format!(
                    "logical table '{}' is configured twice",
                    rule.logical_table()
                )));
            }
            tables.insert(key, rule);
        }

        let binding_groups = build_binding_groups(&config.binding_table_groups, &tables)?;

        let data_source_names = if data_source_names.is_empty() {
            let mut inferred: IndexSet<String> = tables
                .values()
                .flat_map(TableRule::data_source_names)
                .collect();
            inferred.extend(config.default_data_source_name.iter().cloned());
            inferred.into_iter().collect()
        } else {
            data_source_names
        };

        info!(
            tables = tables.len(),
            binding_groups = binding_groups.len(),
            data_sources = data_source_names.len(),
            "sharding rule built"
        );

        Ok(Self {
            tables,
            binding_groups,
            default_database_strategy,
            default_table_strategy,
            default_key_generator,
            default_data_source: config.default_data_source_name.clone(),
            data_source_names,
        })
    }

    pub fn from_json(
        json: &str,
        data_source_names: Vec<String>,
        registry: &AlgorithmRegistry,
    ) -> ShardingResult<Self> {
        Self::new(&ShardingRuleConfig::from_json(json)?, data_source_names, registry)
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Route one logical table.
    ///
    /// A member of a binding group whose reference plan is already recorded
    /// in `ctx` by another member follows that plan without evaluating any
    /// strategy.  Otherwise the database strategy picks data sources, the
    /// table strategy picks tables within each of them, and the result is
    /// recorded as the group's reference when the table is bound.
    pub fn route(
        &self,
        ctx: &mut RoutingContext,
        logical_table: &str,
        conditions: &[ShardingCondition],
        kind: StatementKind,
    ) -> ShardingResult<RoutingPlan> {
        self.route_with(ctx, logical_table, |rule, ctx| {
            self.evaluate(rule, ctx, conditions, kind)
        })
    }

    /// Write generated keys into rows of `logical_table` that lack its key
    /// column and report what was written.  A row that already carries the
    /// column keeps its value.
    pub fn assign_generated_keys(
        &self,
        logical_table: &str,
        rows: &mut [Row],
    ) -> ShardingResult<Vec<GeneratedKey>> {
        let Some(rule) = self.table_rule(logical_table) else {
            if self.default_data_source.is_some() {
                return Ok(Vec::new());
            }
            return Err(ShardingError::UnknownTable(logical_table.to_string()));
        };
        let (Some(column), Some(generator)) = (rule.generate_key_column(), rule.key_generator())
        else {
            return Ok(Vec::new());
        };

        let mut generated = Vec::new();
        for (row_index, row) in rows.iter_mut().enumerate() {
            if row.keys().any(|c| c.eq_ignore_ascii_case(column)) {
                continue;
            }
            let value = generator.next_key()?;
            row.insert(column.to_string(), ShardingValue::Int(value));
            generated.push(GeneratedKey {
                row_index,
                column: column.to_string(),
                value,
            });
        }
        if !generated.is_empty() {
            debug!(table = logical_table, count = generated.len(), "generated keys");
        }
        Ok(generated)
    }

    /// Route a whole statement in one fresh context.
    ///
    /// Insert rows belong to the first table: missing keys are generated
    /// first, then each row is routed on its own values and the nodes are
    /// merged.
    pub fn route_statement(&self, statement: &mut Statement) -> ShardingResult<StatementRoute> {
        let mut ctx = statement.context();
        let kind = statement.kind;
        let mut generated_keys = Vec::new();
        let mut plans = Vec::with_capacity(statement.tables.len());

        for (index, table) in statement.tables.iter().enumerate() {
            let plan = if index == 0 && kind == StatementKind::Insert && !statement.rows.is_empty() {
                generated_keys =
                    self.assign_generated_keys(&table.logical_table, &mut statement.rows)?;
                let rows = &statement.rows;
                self.route_with(&mut ctx, &table.logical_table, |rule, ctx| {
                    let mut nodes: IndexSet<DataNode> = IndexSet::new();
                    let mut broadcast = false;
                    for row in rows {
                        let mut conditions = table.conditions.clone();
                        conditions.extend(
                            row.iter()
                                .map(|(column, value)| ShardingCondition::equal(column.as_str(), value.clone())),
                        );
                        let (row_nodes, row_broadcast) = self.evaluate(rule, ctx, &conditions, kind)?;
                        nodes.extend(row_nodes);
                        broadcast |= row_broadcast;
                    }
                    Ok((nodes.into_iter().collect(), broadcast))
                })?
            } else {
                self.route(&mut ctx, &table.logical_table, &table.conditions, kind)?
            };
            plans.push(plan);
        }

        let data_nodes: IndexSet<DataNode> = plans
            .iter()
            .flat_map(|plan| plan.data_nodes.iter().cloned())
            .collect();
        Ok(StatementRoute {
            plans,
            data_nodes: data_nodes.into_iter().collect(),
            generated_keys,
        })
    }

    /// Lookup, binding propagation and reference recording around `evaluate`.
    fn route_with<F>(
        &self,
        ctx: &mut RoutingContext,
        logical_table: &str,
        evaluate: F,
    ) -> ShardingResult<RoutingPlan>
    where
        F: FnOnce(&TableRule, &RoutingContext) -> ShardingResult<(Vec<DataNode>, bool)>,
    {
        let Some(rule) = self.table_rule(logical_table) else {
            return match &self.default_data_source {
                Some(ds) => {
                    debug!(table = logical_table, data_source = %ds, "routing to default data source");
                    Ok(RoutingPlan {
                        logical_table: logical_table.to_string(),
                        data_nodes: vec![DataNode::new(ds.as_str(), logical_table)],
                        broadcast: false,
                        bound_to: None,
                    })
                }
                None => Err(ShardingError::UnknownTable(logical_table.to_string())),
            };
        };

        let group = self.binding_group(logical_table);
        if let Some(reference) = group.and_then(|g| ctx.binding_reference(g.name())) {
            if !reference.logical_table.eq_ignore_ascii_case(rule.logical_table()) {
                let reference_rule = self
                    .table_rule(&reference.logical_table)
                    .ok_or_else(|| ShardingError::UnknownTable(reference.logical_table.clone()))?;
                let data_nodes =
                    BindingTableGroup::align(reference_rule, rule, &reference.data_nodes)?;
                debug!(
                    table = rule.logical_table(),
                    reference = %reference.logical_table,
                    nodes = data_nodes.len(),
                    "routed through binding table"
                );
                return Ok(RoutingPlan {
                    logical_table: rule.logical_table().to_string(),
                    data_nodes,
                    broadcast: reference.broadcast,
                    bound_to: Some(reference.logical_table.clone()),
                });
            }
        }

        let (data_nodes, broadcast) = evaluate(rule, &*ctx)?;
        debug!(
            table = rule.logical_table(),
            nodes = data_nodes.len(),
            broadcast,
            "routed"
        );
        let plan = RoutingPlan {
            logical_table: rule.logical_table().to_string(),
            data_nodes,
            broadcast,
            bound_to: None,
        };
        if let Some(group) = group {
            ctx.record_binding_reference(group.name(), &plan);
        }
        Ok(plan)
    }

    /// Database axis, then table axis per selected data source.
    fn evaluate(
        &self,
        rule: &TableRule,
        ctx: &RoutingContext,
        conditions: &[ShardingCondition],
        kind: StatementKind,
    ) -> ShardingResult<(Vec<DataNode>, bool)> {
        let logical_table = rule.logical_table();
        let data_sources = rule.data_source_names();
        let database = rule
            .database_strategy(&self.default_database_strategy)
            .evaluate(&StrategyInput {
                logical_table,
                candidates: &data_sources,
                conditions,
                hint_values: ctx.database_hints(logical_table),
                kind,
                allow_broadcast: ctx.allow_broadcast(),
            })?;

        let table_strategy = rule.table_strategy(&self.default_table_strategy);
        let mut nodes: IndexSet<DataNode> = IndexSet::new();
        let mut broadcast = database.broadcast;
        for data_source in &database.targets {
            let tables = table_strategy.evaluate(&StrategyInput {
                logical_table,
                candidates: rule.actual_tables(data_source),
                conditions,
                hint_values: ctx.table_hints(logical_table),
                kind,
                allow_broadcast: ctx.allow_broadcast(),
            })?;
            broadcast |= tables.broadcast;
            nodes.extend(
                tables
                    .targets
                    .into_iter()
                    .map(|table| DataNode::new(data_source.as_str(), table)),
            );
        }
        Ok((nodes.into_iter().collect(), broadcast))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn table_rule(&self, logical_table: &str) -> Option<&TableRule> {
        self.tables.get(&logical_table.to_ascii_lowercase())
    }

    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.tables.values()
    }

    pub fn find_table_rule_by_actual_table(&self, actual_table: &str) -> Option<&TableRule> {
        self.tables
            .values()
            .find(|rule| rule.contains_actual_table(actual_table))
    }

    pub fn logic_table_for_actual(&self, actual_table: &str) -> Option<&str> {
        self.find_table_rule_by_actual_table(actual_table)
            .map(TableRule::logical_table)
    }

    /// Whether any effective strategy shards on `column`.
    pub fn is_sharding_column(&self, column: &str) -> bool {
        let defaults = [&self.default_database_strategy, &self.default_table_strategy];
        let own = self.tables.values().flat_map(|rule| {
            [
                rule.database_strategy(&self.default_database_strategy),
                rule.table_strategy(&self.default_table_strategy),
            ]
        });
        defaults.into_iter().chain(own).any(|strategy| {
            strategy
                .sharding_columns()
                .iter()
                .any(|c| c.eq_ignore_ascii_case(column))
        })
    }

    pub fn binding_group(&self, logical_table: &str) -> Option<&BindingTableGroup> {
        self.binding_groups
            .iter()
            .find(|group| group.contains(logical_table))
    }

    pub fn binding_groups(&self) -> &[BindingTableGroup] {
        &self.binding_groups
    }

    /// True when every table belongs to one and the same binding group.
    pub fn is_all_binding_tables(&self, logical_tables: &[&str]) -> bool {
        let Some(first) = logical_tables.first() else {
            return false;
        };
        self.binding_group(first)
            .is_some_and(|group| logical_tables.iter().all(|t| group.contains(t)))
    }

    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn default_data_source_name(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    pub fn generate_key_column(&self, logical_table: &str) -> Option<&str> {
        self.table_rule(logical_table)
            .and_then(TableRule::generate_key_column)
    }
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

fn build_optional_strategy(
    registry: &AlgorithmRegistry,
    config: Option<&StrategyConfig>,
) -> ShardingResult<ShardingStrategy> {
    config
        .map(|strategy| registry.build_strategy(strategy))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn build_table_rule(
    config: &TableRuleConfig,
    data_source_names: &[String],
    registry: &AlgorithmRegistry,
    default_key_generator: Option<&Arc<dyn KeyGenerator>>,
) -> ShardingResult<TableRule> {
    let logical_table = config.logical_table.trim();
    if logical_table.is_empty() {
        return Err(ShardingError::InvalidConfiguration(
            "table rule without a logical table name".to_string(),
        ));
    }
    let mut rule = TableRule::new(
        logical_table,
        config.actual_data_nodes.as_deref(),
        data_source_names,
    )?;
    if let Some(strategy) = &config.database_strategy {
        rule = rule.with_database_strategy(registry.build_strategy(strategy)?);
    }
    if let Some(strategy) = &config.table_strategy {
        rule = rule.with_table_strategy(registry.build_strategy(strategy)?);
    }

    match (&config.key_generator_column, &config.key_generator) {
        (Some(column), generator) => {
            let generator = match generator {
                Some(generator) => registry.build_key_generator(generator)?,
                None => default_key_generator.cloned().ok_or_else(|| {
                    ShardingError::InvalidConfiguration(format!(
                        "table '{logical_table}' generates '{column}' but no key generator is configured"
                    ))
                })?,
            };
            rule = rule.with_key_generator(column.clone(), generator);
        }
        (None, Some(_)) => {
            return Err(ShardingError::InvalidConfiguration(format!(
                "table '{logical_table}' has a key generator but no key generator column"
            )));
        }
        (None, None) => {}
    }
    Ok(rule)
}

fn build_binding_groups(
    groups: &[String],
    tables: &IndexMap<String, TableRule>,
) -> ShardingResult<Vec<BindingTableGroup>> {
    let mut built: Vec<BindingTableGroup> = Vec::with_capacity(groups.len());
    for raw in groups {
        let group = BindingTableGroup::parse(raw)?;
        let mut members = Vec::with_capacity(group.tables().len());
        for table in group.tables() {
            let rule = tables
                .get(&table.to_ascii_lowercase())
                .ok_or_else(|| ShardingError::UnknownTable(table.clone()))?;
            if let Some(other) = built.iter().find(|g| g.contains(table)) {
                return Err(ShardingError::InvalidConfiguration(format!(
                    "table '{table}' is in binding groups '{}' and '{}'",
                    other.name(),
                    group.name()
                )));
            }
            members.push(rule);
        }
        if let Some((reference, rest)) = members.split_first() {
            for member in rest {
                BindingTableGroup::check_aligned(reference, member)?;
            }
        }
        built.push(group);
    }
    Ok(built)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
