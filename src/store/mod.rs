// store/ — The two on-disk databases: canonical emails and their vector index.

pub mod emails;
pub mod vectors;
