// Re-export all items from the submodules
mod run_config;
mod source_tree;

pub use run_config::{RunContext, SourcesConfig};
pub use source_tree::{CollectorPath, SourceLeaf, SourceNode, SourceTree};
