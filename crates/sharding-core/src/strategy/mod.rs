//! Sharding strategies: narrow a candidate set of data source or table names
//! down to the ones a statement actually needs.
//!
//! The variant set is closed, so strategies are an enum evaluated by `match`.
//! User supplied logic plugs in through the algorithm traits in [`algorithm`].

pub mod algorithm;
pub mod inline;

use std::ops::Bound;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::errors::{ShardingError, ShardingResult};
use crate::models::{ShardingCondition, ShardingOperator, ShardingValue, StatementKind};

use self::algorithm::{
    ComplexKeysShardingAlgorithm, ComplexKeysShardingValue, HintShardingAlgorithm,
    HintShardingValue, PreciseShardingAlgorithm, PreciseShardingValue, RangeShardingAlgorithm,
    RangeShardingValue,
};
use self::inline::InlineFormula;

// ---------------------------------------------------------------------------
// Strategy variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct InlineShardingStrategy {
    pub column: String,
    pub formula: InlineFormula,
}

impl InlineShardingStrategy {
    pub fn new(column: impl Into<String>, formula: &str) -> ShardingResult<Self> {
        let column = column.into();
        let formula = InlineFormula::parse(formula, &column)?;
        Ok(Self { column, formula })
    }
}

#[derive(Debug, Clone)]
pub struct StandardShardingStrategy {
    pub column: String,
    pub precise: Arc<dyn PreciseShardingAlgorithm>,
    pub range: Option<Arc<dyn RangeShardingAlgorithm>>,
}

#[derive(Debug, Clone)]
pub struct ComplexShardingStrategy {
    pub columns: Vec<String>,
    pub algorithm: Arc<dyn ComplexKeysShardingAlgorithm>,
}

#[derive(Debug, Clone, Default)]
pub struct HintShardingStrategy {
    /// Without an algorithm the hint values are the target names themselves.
    pub algorithm: Option<Arc<dyn HintShardingAlgorithm>>,
}

#[derive(Debug, Clone, Default)]
pub enum ShardingStrategy {
    /// Not sharded along this axis: every candidate.
    #[default]
    None,
    Inline(InlineShardingStrategy),
    Standard(StandardShardingStrategy),
    Complex(ComplexShardingStrategy),
    Hint(HintShardingStrategy),
}

// ---------------------------------------------------------------------------
// Evaluation input / output
// ---------------------------------------------------------------------------

/// Everything a strategy may look at for one axis of one logical table.
#[derive(Debug, Clone, Copy)]
pub struct StrategyInput<'a> {
    pub logical_table: &'a str,
    pub candidates: &'a [String],
    pub conditions: &'a [ShardingCondition],
    pub hint_values: Option<&'a [ShardingValue]>,
    pub kind: StatementKind,
    pub allow_broadcast: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOutcome {
    pub targets: Vec<String>,
    /// Fell back to every candidate for lack of a usable condition.
    pub broadcast: bool,
}

impl StrategyOutcome {
    fn precise(targets: Vec<String>) -> Self {
        Self {
            targets,
            broadcast: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl ShardingStrategy {
    pub fn sharding_columns(&self) -> Vec<&str> {
        match self {
            ShardingStrategy::None | ShardingStrategy::Hint(_) => Vec::new(),
            ShardingStrategy::Inline(s) => vec![s.column.as_str()],
            ShardingStrategy::Standard(s) => vec![s.column.as_str()],
            ShardingStrategy::Complex(s) => s.columns.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ShardingStrategy::None)
    }

    pub fn evaluate(&self, input: &StrategyInput<'_>) -> ShardingResult<StrategyOutcome> {
        match self {
            ShardingStrategy::None => Ok(StrategyOutcome::precise(input.candidates.to_vec())),
            ShardingStrategy::Inline(s) => s.evaluate(input),
            ShardingStrategy::Standard(s) => s.evaluate(input),
            ShardingStrategy::Complex(s) => s.evaluate(input),
            ShardingStrategy::Hint(s) => s.evaluate(input),
        }
    }
}

impl InlineShardingStrategy {
    fn evaluate(&self, input: &StrategyInput<'_>) -> ShardingResult<StrategyOutcome> {
        let Some(values) = discrete_values(input.conditions, &self.column) else {
            return broadcast_or_fail(input, &[self.column.as_str()]);
        };
        let mut targets = Vec::with_capacity(values.len());
        for value in &values {
            let target = self.formula.render(value).ok_or_else(|| {
                ShardingError::RoutingAlgorithm {
                    table: input.logical_table.to_string(),
                    target: format!("{} for value {value}", self.formula.source()),
                }
            })?;
            targets.push(target);
        }
        checked_targets(input, targets).map(StrategyOutcome::precise)
    }
}

impl StandardShardingStrategy {
    fn evaluate(&self, input: &StrategyInput<'_>) -> ShardingResult<StrategyOutcome> {
        // Equals / in-list wins over a range on the same column.
        if let Some(values) = discrete_values(input.conditions, &self.column) {
            let mut targets = Vec::with_capacity(values.len());
            for value in &values {
                let sharding_value = PreciseShardingValue {
                    logical_table: input.logical_table,
                    column: &self.column,
                    value,
                };
                let target = self
                    .precise
                    .do_sharding(input.candidates, &sharding_value)
                    .ok_or_else(|| ShardingError::RoutingAlgorithm {
                        table: input.logical_table.to_string(),
                        target: format!("<none> for value {value}"),
                    })?;
                targets.push(target);
            }
            return checked_targets(input, targets).map(StrategyOutcome::precise);
        }

        match (&self.range, range_bounds(input.conditions, &self.column)) {
            (Some(range), Some((lower, upper))) => {
                let sharding_value = RangeShardingValue {
                    logical_table: input.logical_table,
                    column: &self.column,
                    lower,
                    upper,
                };
                let targets = range.do_sharding(input.candidates, &sharding_value);
                checked_targets(input, targets).map(StrategyOutcome::precise)
            }
            _ => broadcast_or_fail(input, &[self.column.as_str()]),
        }
    }
}

impl ComplexShardingStrategy {
    fn evaluate(&self, input: &StrategyInput<'_>) -> ShardingResult<StrategyOutcome> {
        let mut columns: IndexMap<String, Vec<&ShardingOperator>> = IndexMap::new();
        for condition in input.conditions {
            if let Some(column) = self.columns.iter().find(|c| condition.is_on(c)) {
                columns
                    .entry(column.clone())
                    .or_default()
                    .push(&condition.operator);
            }
        }
        if columns.is_empty() {
            let names: Vec<&str> = self.columns.iter().map(String::as_str).collect();
            return broadcast_or_fail(input, &names);
        }
        let sharding_value = ComplexKeysShardingValue {
            logical_table: input.logical_table,
            columns,
        };
        let targets = self.algorithm.do_sharding(input.candidates, &sharding_value);
        checked_targets(input, targets).map(StrategyOutcome::precise)
    }
}

impl HintShardingStrategy {
    fn evaluate(&self, input: &StrategyInput<'_>) -> ShardingResult<StrategyOutcome> {
        let values = input
            .hint_values
            .filter(|values| !values.is_empty())
            .ok_or_else(|| ShardingError::MissingHint(input.logical_table.to_string()))?;
        let targets = match &self.algorithm {
            Some(algorithm) => algorithm.do_sharding(
                input.candidates,
                &HintShardingValue {
                    logical_table: input.logical_table,
                    values,
                },
            ),
            None => values.iter().map(ToString::to_string).collect(),
        };
        checked_targets(input, targets).map(StrategyOutcome::precise)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Values allowed on `column` by every equals / in-list condition, in the
/// order of the first such condition.  `None` when there is no such condition.
fn discrete_values(conditions: &[ShardingCondition], column: &str) -> Option<Vec<ShardingValue>> {
    let mut result: Option<IndexSet<ShardingValue>> = None;
    for condition in conditions.iter().filter(|c| c.is_on(column)) {
        let Some(values) = condition.discrete_values() else {
            continue;
        };
        result = Some(match result {
            None => values.iter().cloned().collect(),
            Some(previous) => previous
                .into_iter()
                .filter(|v| values.contains(v))
                .collect(),
        });
    }
    result.map(|set| set.into_iter().collect())
}

fn tighter_lower<'a>(a: Bound<&'a ShardingValue>, b: Bound<&'a ShardingValue>) -> Bound<&'a ShardingValue> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.max(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.max(y)),
        (Bound::Included(inc), Bound::Excluded(exc)) | (Bound::Excluded(exc), Bound::Included(inc)) => {
            if inc > exc {
                Bound::Included(inc)
            } else {
                Bound::Excluded(exc)
            }
        }
    }
}

fn tighter_upper<'a>(a: Bound<&'a ShardingValue>, b: Bound<&'a ShardingValue>) -> Bound<&'a ShardingValue> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.min(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.min(y)),
        (Bound::Included(inc), Bound::Excluded(exc)) | (Bound::Excluded(exc), Bound::Included(inc)) => {
            if inc < exc {
                Bound::Included(inc)
            } else {
                Bound::Excluded(exc)
            }
        }
    }
}

/// Intersection of every range condition on `column`.
fn range_bounds<'a>(
    conditions: &'a [ShardingCondition],
    column: &str,
) -> Option<(Bound<&'a ShardingValue>, Bound<&'a ShardingValue>)> {
    let mut result = None;
    for condition in conditions.iter().filter(|c| c.is_on(column)) {
        if let ShardingOperator::Range { lower, upper } = &condition.operator {
            let (lower, upper) = (lower.as_ref(), upper.as_ref());
            result = Some(match result {
                None => (lower, upper),
                Some((prev_lower, prev_upper)) => {
                    (tighter_lower(prev_lower, lower), tighter_upper(prev_upper, upper))
                }
            });
        }
    }
    result
}

/// Deduplicate `targets` and reject anything outside the candidate set.
fn checked_targets(input: &StrategyInput<'_>, targets: Vec<String>) -> ShardingResult<Vec<String>> {
    let mut seen: IndexSet<String> = IndexSet::with_capacity(targets.len());
    for target in targets {
        if !input.candidates.contains(&target) {
            return Err(ShardingError::RoutingAlgorithm {
                table: input.logical_table.to_string(),
                target,
            });
        }
        seen.insert(target);
    }
    Ok(seen.into_iter().collect())
}

/// No usable condition: reads broadcast when allowed, writes never do.  A
/// single candidate is not ambiguous and is taken as is.
fn broadcast_or_fail(input: &StrategyInput<'_>, columns: &[&str]) -> ShardingResult<StrategyOutcome> {
    if input.candidates.len() == 1 {
        return Ok(StrategyOutcome::precise(input.candidates.to_vec()));
    }
    if input.kind.is_write() {
        return Err(ShardingError::AmbiguousShardTarget {
            table: input.logical_table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
    }
    if !input.allow_broadcast {
        return Err(ShardingError::MissingShardingValue {
            table: input.logical_table.to_string(),
            column: columns.join(","),
        });
    }
    debug!(
        table = input.logical_table,
        candidates = input.candidates.len(),
        "no sharding condition on {columns:?}; broadcasting"
    );
    Ok(StrategyOutcome {
        targets: input.candidates.to_vec(),
        broadcast: true,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
