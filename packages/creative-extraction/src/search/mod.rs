//! Search index backends.

pub mod elastic;
pub mod mapping;
pub mod memory;

pub use elastic::ElasticsearchIndex;
pub use mapping::index_mapping;
pub use memory::MemorySearchIndex;
