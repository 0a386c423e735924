//! Per-statement routing state.
//!
//! A [`RoutingContext`] lives for exactly one statement.  It carries the
//! caller's hint values and remembers the first plan computed for each
//! binding group so later members of the group follow it.

use std::collections::HashMap;

use crate::models::{DataNode, RoutingPlan, ShardingValue};

/// Plan recorded for a binding group by its first routed member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingReference {
    pub logical_table: String,
    pub data_nodes: Vec<DataNode>,
    pub broadcast: bool,
}

#[derive(Debug, Clone)]
pub struct RoutingContext {
    allow_broadcast: bool,
    database_hints: HashMap<String, Vec<ShardingValue>>,
    table_hints: HashMap<String, Vec<ShardingValue>>,
    binding_references: HashMap<String, BindingReference>,
}

impl Default for RoutingContext {
    fn default() -> Self {
        Self {
            allow_broadcast: true,
            database_hints: HashMap::new(),
            table_hints: HashMap::new(),
            binding_references: HashMap::new(),
        }
    }
}

fn key(logical_table: &str) -> String {
    logical_table.to_ascii_lowercase()
}

impl RoutingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// When disabled, reads without a usable condition fail instead of
    /// fanning out to every node.
    pub fn with_broadcast(mut self, allow: bool) -> Self {
        self.allow_broadcast = allow;
        self
    }

    pub fn allow_broadcast(&self) -> bool {
        self.allow_broadcast
    }

    pub fn add_database_hint(&mut self, logical_table: &str, value: impl Into<ShardingValue>) {
        self.database_hints
            .entry(key(logical_table))
            .or_default()
            .push(value.into());
    }

    pub fn add_table_hint(&mut self, logical_table: &str, value: impl Into<ShardingValue>) {
        self.table_hints
            .entry(key(logical_table))
            .or_default()
            .push(value.into());
    }

    pub fn database_hints(&self, logical_table: &str) -> Option<&[ShardingValue]> {
        self.database_hints.get(&key(logical_table)).map(Vec::as_slice)
    }

    pub fn table_hints(&self, logical_table: &str) -> Option<&[ShardingValue]> {
        self.table_hints.get(&key(logical_table)).map(Vec::as_slice)
    }

    pub fn binding_reference(&self, group: &str) -> Option<&BindingReference> {
        self.binding_references.get(group)
    }

    /// Record the group's reference plan; the first recording wins.
    pub(crate) fn record_binding_reference(&mut self, group: &str, plan: &RoutingPlan) {
        self.binding_references
            .entry(group.to_string())
            .or_insert_with(|| BindingReference {
                logical_table: plan.logical_table.clone(),
                data_nodes: plan.data_nodes.clone(),
                broadcast: plan.broadcast,
            });
    }

    /// Forget recorded binding plans, keeping hints and broadcast permission.
    pub fn clear_binding_references(&mut self) {
        self.binding_references.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_are_keyed_case_insensitively() {
        let mut ctx = RoutingContext::new();
        ctx.add_database_hint("T_ORDER", 1);
        ctx.add_database_hint("t_order", 2);
        ctx.add_table_hint("t_order", "t_order_0");
        assert_eq!(
            ctx.database_hints("t_order"),
            Some(&[ShardingValue::Int(1), ShardingValue::Int(2)][..])
        );
        assert_eq!(ctx.table_hints("T_Order").map(<[_]>::len), Some(1));
        assert!(ctx.database_hints("t_order_item").is_none());
        assert!(ctx.allow_broadcast());
        assert!(!ctx.with_broadcast(false).allow_broadcast());
    }

    fn plan(table: &str, node: DataNode) -> RoutingPlan {
        RoutingPlan {
            logical_table: table.to_string(),
            data_nodes: vec![node],
            broadcast: false,
            bound_to: None,
        }
    }

    #[test]
    fn first_binding_reference_wins() {
        let mut ctx = RoutingContext::new();
        let first = plan("t_order", DataNode::new("ds0", "t_order_1"));
        let second = plan("t_order_item", DataNode::new("ds1", "t_order_item_0"));
        ctx.record_binding_reference("g", &first);
        ctx.record_binding_reference("g", &second);
        let reference = ctx.binding_reference("g").unwrap();
        assert_eq!(reference.logical_table, "t_order");
        assert_eq!(reference.data_nodes, first.data_nodes);

        ctx.clear_binding_references();
        assert!(ctx.binding_reference("g").is_none());
    }
}
