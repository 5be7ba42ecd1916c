pub mod executor;
pub mod memory;
pub mod registry;
pub mod search;

pub use executor::ToolExecutor;
pub use memory::{LoadMemoryTool, PreloadMemoryTool};
pub use registry::{Tool, ToolContext, ToolRegistry};
pub use search::{SearchResult, WebSearchTool};
