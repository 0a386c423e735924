//! Rule model: data node expressions, table rules, binding groups and the
//! aggregate [`ShardingRule`](sharding::ShardingRule).

pub mod binding;
pub mod expression;
pub mod sharding;
pub mod table;
