//! Name → implementation lookup for algorithms and key generators referenced
//! from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{KeyGeneratorConfig, StrategyConfig};
use crate::errors::{ShardingError, ShardingResult};
use crate::keygen::{snowflake_from_config, IncrementKeyGenerator, KeyGenerator};
use crate::strategy::algorithm::{
    ComplexKeysShardingAlgorithm, Crc32ModShardingAlgorithm, HintShardingAlgorithm,
    ModuloShardingAlgorithm, PreciseShardingAlgorithm, RangeShardingAlgorithm,
};
use crate::strategy::{
    ComplexShardingStrategy, HintShardingStrategy, InlineShardingStrategy, ShardingStrategy,
    StandardShardingStrategy,
};

pub const MODULO: &str = "modulo";
pub const CRC32_MOD: &str = "crc32_mod";

#[derive(Debug, Default, Clone)]
pub struct AlgorithmRegistry {
    precise: HashMap<String, Arc<dyn PreciseShardingAlgorithm>>,
    range: HashMap<String, Arc<dyn RangeShardingAlgorithm>>,
    complex: HashMap<String, Arc<dyn ComplexKeysShardingAlgorithm>>,
    hint: HashMap<String, Arc<dyn HintShardingAlgorithm>>,
    key_generators: HashMap<String, Arc<dyn KeyGenerator>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `modulo` (precise + range) and `crc32_mod`
    /// (precise).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register_precise(MODULO, Arc::new(ModuloShardingAlgorithm))
            .register_range(MODULO, Arc::new(ModuloShardingAlgorithm))
            .register_precise(CRC32_MOD, Arc::new(Crc32ModShardingAlgorithm));
        registry
    }

    pub fn register_precise(
        &mut self,
        name: impl Into<String>,
        algorithm: Arc<dyn PreciseShardingAlgorithm>,
    ) -> &mut Self {
        self.precise.insert(name.into(), algorithm);
        self
    }

    pub fn register_range(
        &mut self,
        name: impl Into<String>,
        algorithm: Arc<dyn RangeShardingAlgorithm>,
    ) -> &mut Self {
        self.range.insert(name.into(), algorithm);
        self
    }

    pub fn register_complex(
        &mut self,
        name: impl Into<String>,
        algorithm: Arc<dyn ComplexKeysShardingAlgorithm>,
    ) -> &mut Self {
        self.complex.insert(name.into(), algorithm);
        self
    }

    pub fn register_hint(
        &mut self,
        name: impl Into<String>,
        algorithm: Arc<dyn HintShardingAlgorithm>,
    ) -> &mut Self {
        self.hint.insert(name.into(), algorithm);
        self
    }

    pub fn register_key_generator(
        &mut self,
        name: impl Into<String>,
        generator: Arc<dyn KeyGenerator>,
    ) -> &mut Self {
        self.key_generators.insert(name.into(), generator);
        self
    }

    fn lookup<T: ?Sized>(
        map: &HashMap<String, Arc<T>>,
        kind: &'static str,
        name: &str,
    ) -> ShardingResult<Arc<T>> {
        map.get(name)
            .cloned()
            .ok_or_else(|| ShardingError::UnknownAlgorithm {
                kind,
                name: name.to_string(),
            })
    }

    /// Turn a strategy descriptor into an evaluable strategy.
    pub fn build_strategy(&self, config: &StrategyConfig) -> ShardingResult<ShardingStrategy> {
        Ok(match config {
            StrategyConfig::None => ShardingStrategy::None,
            StrategyConfig::Inline {
                sharding_column,
                algorithm_expression,
            } => ShardingStrategy::Inline(InlineShardingStrategy::new(
                sharding_column.as_str(),
                algorithm_expression,
            )?),
            StrategyConfig::Standard {
                sharding_column,
                precise_algorithm,
                range_algorithm,
            } => ShardingStrategy::Standard(StandardShardingStrategy {
                column: sharding_column.clone(),
                precise: Self::lookup(&self.precise, "precise", precise_algorithm)?,
                range: range_algorithm
                    .as_deref()
                    .map(|name| Self::lookup(&self.range, "range", name))
                    .transpose()?,
            }),
            StrategyConfig::Complex {
                sharding_columns,
                algorithm,
            } => {
                if sharding_columns.len() < 2 {
                    return Err(ShardingError::InvalidConfiguration(format!(
                        "complex strategy needs at least two columns, got {sharding_columns:?}"
                    )));
                }
                ShardingStrategy::Complex(ComplexShardingStrategy {
                    columns: sharding_columns.clone(),
                    algorithm: Self::lookup(&self.complex, "complex", algorithm)?,
                })
            }
            StrategyConfig::Hint { algorithm } => ShardingStrategy::Hint(HintShardingStrategy {
                algorithm: algorithm
                    .as_deref()
                    .map(|name| Self::lookup(&self.hint, "hint", name))
                    .transpose()?,
            }),
        })
    }

    /// Instantiate (or look up) the generator a descriptor names.
    pub fn build_key_generator(
        &self,
        config: &KeyGeneratorConfig,
    ) -> ShardingResult<Arc<dyn KeyGenerator>> {
        let generator: Arc<dyn KeyGenerator> = match config {
            KeyGeneratorConfig::Snowflake { worker_id } => {
                Arc::new(snowflake_from_config(*worker_id)?)
            }
            KeyGeneratorConfig::Increment { start } => Arc::new(IncrementKeyGenerator::new(*start)),
            KeyGeneratorConfig::Named { name } => {
                Self::lookup(&self.key_generators, "key generator", name)?
            }
        };
        Ok(generator)
    }
}
