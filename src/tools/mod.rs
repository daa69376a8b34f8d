//! Concrete, fully-deterministic reference tool catalogue (C9): one file
//! per tool, each a pure or locally side-effecting [`crate::tool::Tool`]
//! implementation, registered in bulk by [`register_reference_tools`].

pub mod data_analysis;
pub mod json_parser;
pub mod math_stats;
pub mod memo_tools;
pub mod regex_matcher;
pub mod repeat_message;
pub mod sort_array;
pub mod string_ops;
pub mod text_analysis;
pub mod write_file;

use std::path::PathBuf;
use std::sync::Arc;

use crate::memo::SqliteMemoStore;
use crate::tool::ToolRegistry;

pub use data_analysis::DataAnalysisTool;
pub use json_parser::JsonParserTool;
pub use math_stats::MathStatsTool;
pub use memo_tools::{MemoizeTool, RetrieveMemoTool};
pub use regex_matcher::RegexMatcherTool;
pub use repeat_message::RepeatMessageTool;
pub use sort_array::SortArrayTool;
pub use string_ops::StringOpsTool;
pub use text_analysis::TextAnalysisTool;
pub use write_file::WriteFileTool;

/// Build a [`ToolRegistry`] pre-populated with the whole reference
/// catalogue: `repeat_message`, `sort_array`, `string_ops`, `regex_matcher`,
/// `json_parser`, `math_stats`, `text_analysis`, `data_analysis`,
/// `write_file` (sandboxed under `output_root`), and `memoize`/
/// `retrieve_memo` bound to `memo_store`.
#[must_use]
pub fn register_reference_tools(
    output_root: impl Into<PathBuf>,
    memo_store: Arc<SqliteMemoStore>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(RepeatMessageTool));
    registry.register(Box::new(SortArrayTool));
    registry.register(Box::new(StringOpsTool));
    registry.register(Box::new(RegexMatcherTool));
    registry.register(Box::new(JsonParserTool));
    registry.register(Box::new(MathStatsTool));
    registry.register(Box::new(TextAnalysisTool));
    registry.register(Box::new(DataAnalysisTool));
    registry.register(Box::new(WriteFileTool::new(output_root)));
    registry.register(Box::new(MemoizeTool::new(Arc::clone(&memo_store))));
    registry.register(Box::new(RetrieveMemoTool::new(memo_store)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_reference_tool() {
        let store = Arc::new(SqliteMemoStore::in_memory().expect("opens"));
        let registry = register_reference_tools(std::env::temp_dir(), store);
        let names = registry.names();
        for expected in [
            "repeat_message",
            "sort_array",
            "string_ops",
            "regex_matcher",
            "json_parser",
            "math_stats",
            "text_analysis",
            "data_analysis",
            "write_file",
            "memoize",
            "retrieve_memo",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }
}
