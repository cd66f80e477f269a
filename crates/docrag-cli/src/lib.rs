//! Terminal interface for docrag

pub mod output;
mod ui;


pub use output::{
    format_collections, format_folder_info, format_folder_preview, format_folder_report,
    format_health, format_indexing_result, format_search_results, format_size, format_summary,
    print_json, FolderPreview,
};
pub use ui::{display_banner, handle_input_with_history, print_help, run_shell, ShellCommand};

// Re-export core types
pub use docrag_core::{Error, Result};
