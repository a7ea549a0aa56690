// pipeline/ — The stages: provider (or demo CSV) → email store → vector index → query.

pub mod demo;
pub mod embed;
pub mod extract;
pub mod query;
