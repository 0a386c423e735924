//! Pluggable sharding algorithms and the built-in implementations.
//!
//! Algorithms only see the candidate target names and the values relevant to
//! them; validating that their answers are real candidates is the strategy's
//! job.

use std::fmt;
use std::ops::Bound;

use indexmap::{IndexMap, IndexSet};

use crate::models::{ShardingOperator, ShardingValue};

// ---------------------------------------------------------------------------
// Sharding values handed to algorithms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PreciseShardingValue<'a> {
    pub logical_table: &'a str,
    pub column: &'a str,
    pub value: &'a ShardingValue,
}

#[derive(Debug, Clone)]
pub struct RangeShardingValue<'a> {
    pub logical_table: &'a str,
    pub column: &'a str,
    pub lower: Bound<&'a ShardingValue>,
    pub upper: Bound<&'a ShardingValue>,
}

impl RangeShardingValue<'_> {
    pub fn contains(&self, value: &ShardingValue) -> bool {
        let above = match self.lower {
            Bound::Included(lower) => value >= lower,
            Bound::Excluded(lower) => value > lower,
            Bound::Unbounded => true,
        };
        let below = match self.upper {
            Bound::Included(upper) => value <= upper,
            Bound::Excluded(upper) => value < upper,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Inclusive integer bounds, `None` when either end is open or non-numeric.
    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        let lower = match self.lower {
            Bound::Included(v) => v.as_i64()?,
            Bound::Excluded(v) => v.as_i64()?.checked_add(1)?,
            Bound::Unbounded => return None,
        };
        let upper = match self.upper {
            Bound::Included(v) => v.as_i64()?,
            Bound::Excluded(v) => v.as_i64()?.checked_sub(1)?,
            Bound::Unbounded => return None,
        };
        Some((lower, upper))
    }
}

/// Every condition on one of a complex strategy's columns, grouped per column.
#[derive(Debug, Clone)]
pub struct ComplexKeysShardingValue<'a> {
    pub logical_table: &'a str,
    pub columns: IndexMap<String, Vec<&'a ShardingOperator>>,
}

impl ComplexKeysShardingValue<'_> {
    /// Discrete (equals / in-list) values recorded for `column`.
    pub fn discrete_values(&self, column: &str) -> Vec<&ShardingValue> {
        self.columns
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(column))
            .flat_map(|(_, ops)| ops.iter())
            .flat_map(|op| match op {
                ShardingOperator::Equal(value) => std::slice::from_ref(value).iter(),
                ShardingOperator::In(values) => values.iter(),
                ShardingOperator::Range { .. } => [].iter(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HintShardingValue<'a> {
    pub logical_table: &'a str,
    pub values: &'a [ShardingValue],
}

// ---------------------------------------------------------------------------
// Algorithm traits
// ---------------------------------------------------------------------------

/// Maps one equals / in-list value to exactly one target.
pub trait PreciseShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Option<String>;
}

/// Maps a range to the ordered candidates whose value space intersects it.
pub trait RangeShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Vec<String>;
}

/// Sees every condition on a multi-column strategy at once.
pub trait ComplexKeysShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &ComplexKeysShardingValue<'_>,
    ) -> Vec<String>;
}

/// Maps caller supplied hint values to targets.
pub trait HintShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &HintShardingValue<'_>,
    ) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

fn trailing_number(name: &str) -> Option<i64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// Routes `value` to the candidate whose trailing number is
/// `value mod candidate count`, e.g. `order_id = 7` over
/// `[t_order_0, t_order_1]` picks `t_order_1`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModuloShardingAlgorithm;

impl ModuloShardingAlgorithm {
    fn target_for(available_targets: &[String], value: i64) -> Option<&String> {
        let count = i64::try_from(available_targets.len()).ok().filter(|c| *c > 0)?;
        let suffix = value.rem_euclid(count);
        available_targets
            .iter()
            .find(|target| trailing_number(target) == Some(suffix))
    }
}

impl PreciseShardingAlgorithm for ModuloShardingAlgorithm {
    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Option<String> {
        Self::target_for(available_targets, value.value.as_i64()?).cloned()
    }
}

impl RangeShardingAlgorithm for ModuloShardingAlgorithm {
    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Vec<String> {
        let count = available_targets.len() as u64;
        let Some((lower, upper)) = value.integer_bounds() else {
            return available_targets.to_vec();
        };
        if lower > upper {
            return Vec::new();
        }
        if upper.abs_diff(lower) >= count {
            return available_targets.to_vec();
        }
        let hit: IndexSet<&String> = (lower..=upper)
            .filter_map(|v| Self::target_for(available_targets, v))
            .collect();
        available_targets
            .iter()
            .filter(|target| hit.contains(target))
            .cloned()
            .collect()
    }
}

/// Picks the candidate at `crc32(value) mod candidate count`.
///
/// Useful for string keys with no natural numeric form.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32ModShardingAlgorithm;

impl PreciseShardingAlgorithm for Crc32ModShardingAlgorithm {
    fn do_sharding(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Option<String> {
        if available_targets.is_empty() {
            return None;
        }
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(value.value.to_string().as_bytes());
        let idx = hasher.finalize() as usize % available_targets.len();
        available_targets.get(idx).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn trailing_number_parses_suffix() {
        assert_eq!(trailing_number("t_order_12"), Some(12));
        assert_eq!(trailing_number("ds0"), Some(0));
        assert_eq!(trailing_number("t_order"), None);
    }

    #[test]
    fn modulo_precise_picks_matching_suffix() {
        let available = targets(&["t_order_0", "t_order_1"]);
        let value = ShardingValue::Int(7);
        let precise = PreciseShardingValue {
            logical_table: "t_order",
            column: "order_id",
            value: &value,
        };
        assert_eq!(
            PreciseShardingAlgorithm::do_sharding(&ModuloShardingAlgorithm, &available, &precise),
            Some("t_order_1".to_string())
        );
        let negative = ShardingValue::Int(-3);
        let precise = PreciseShardingValue { value: &negative, ..precise };
        assert_eq!(
            PreciseShardingAlgorithm::do_sharding(&ModuloShardingAlgorithm, &available, &precise),
            Some("t_order_1".to_string())
        );
    }

    #[test]
    fn modulo_does_not_confuse_multi_digit_suffixes() {
        let available: Vec<String> = (0..12).map(|i| format!("t_{i}")).collect();
        let value = ShardingValue::Int(1);
        let precise = PreciseShardingValue {
            logical_table: "t",
            column: "id",
            value: &value,
        };
        assert_eq!(
            PreciseShardingAlgorithm::do_sharding(&ModuloShardingAlgorithm, &available, &precise),
            Some("t_1".to_string())
        );
    }

    #[test]
    fn modulo_range_narrows_small_spans() {
        let available = targets(&["t_0", "t_1", "t_2", "t_3"]);
        let (lo, hi) = (ShardingValue::Int(5), ShardingValue::Int(6));
        let range = RangeShardingValue {
            logical_table: "t",
            column: "id",
            lower: Bound::Included(&lo),
            upper: Bound::Included(&hi),
        };
        assert_eq!(
            RangeShardingAlgorithm::do_sharding(&ModuloShardingAlgorithm, &available, &range),
            targets(&["t_1", "t_2"])
        );

        let hundred = ShardingValue::Int(100);
        let wide = RangeShardingValue {
            upper: Bound::Excluded(&hundred),
            ..range.clone()
        };
        assert_eq!(
            RangeShardingAlgorithm::do_sharding(&ModuloShardingAlgorithm, &available, &wide),
            available
        );

        let open = RangeShardingValue {
            upper: Bound::Unbounded,
            ..range
        };
        assert_eq!(
            RangeShardingAlgorithm::do_sharding(&ModuloShardingAlgorithm, &available, &open),
            available
        );
    }

    #[test]
    fn range_contains_respects_bounds() {
        let (lo, hi) = (ShardingValue::Int(1), ShardingValue::Int(3));
        let range = RangeShardingValue {
            logical_table: "t",
            column: "id",
            lower: Bound::Excluded(&lo),
            upper: Bound::Included(&hi),
        };
        assert!(!range.contains(&ShardingValue::Int(1)));
        assert!(range.contains(&ShardingValue::Int(3)));
        assert_eq!(range.integer_bounds(), Some((2, 3)));
    }

    #[test]
    fn crc32_mod_is_stable() {
        let available = targets(&["ds0", "ds1", "ds2"]);
        let value = ShardingValue::from("alice");
        let precise = PreciseShardingValue {
            logical_table: "t_user",
            column: "name",
            value: &value,
        };
        let first = Crc32ModShardingAlgorithm.do_sharding(&available, &precise);
        assert!(first.is_some());
        assert_eq!(first, Crc32ModShardingAlgorithm.do_sharding(&available, &precise));
    }

    #[test]
    fn complex_value_collects_discrete_values() {
        let eq = ShardingOperator::Equal(ShardingValue::Int(1));
        let list = ShardingOperator::In(vec![ShardingValue::Int(2), ShardingValue::Int(3)]);
        let mut columns = IndexMap::new();
        columns.insert("user_id".to_string(), vec![&eq, &list]);
        let value = ComplexKeysShardingValue {
            logical_table: "t_order",
            columns,
        };
        let values: Vec<i64> = value
            .discrete_values("USER_ID")
            .into_iter()
            .filter_map(ShardingValue::as_i64)
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }
}
