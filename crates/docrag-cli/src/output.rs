//! Terminal rendering of indexing reports, search hits and store health

use colored::*;
use serde::Serialize;

use docrag_core::{
    CollectionInfo, CollectionSummary, FolderInfo, FolderReport, IndexingResult, Result,
    StoreHealth, VectorDocument,
};

/// Longest snippet shown per search hit
const SNIPPET_CHARS: usize = 300;

/// Print any serializable value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{}…", cut.trim_end())
}

pub fn format_indexing_result(source: &str, result: &IndexingResult) -> String {
    let mut out = String::new();
    if result.is_success() {
        out.push_str(&format!("{} Indexed {}\n", "✅".green(), source.bold()));
    } else {
        out.push_str(&format!("{} Indexed {} with errors\n", "⚠️".yellow(), source.bold()));
    }
    out.push_str(&format!(
        "   {} new, {} duplicate, {} failed chunks\n",
        result.chunks_indexed.to_string().green(),
        result.chunks_skipped.to_string().dimmed(),
        result.chunks_failed.to_string().red()
    ));
    if result.chunks_indexed == 0 && result.chunks_failed == 0 && result.chunks_skipped > 0 {
        out.push_str(&format!("   {}\n", "Document already indexed".dimmed()));
    }
    for error in &result.errors {
        out.push_str(&format!("   {} {}\n", "•".red(), error));
    }
    out
}

pub fn format_folder_report(report: &FolderReport) -> String {
    let mut out = format!(
        "{} Folder ingestion into {}: {}/{} files processed\n",
        "📁".blue(),
        report.collection.bold(),
        report.processed().to_string().green(),
        report.total_files
    );
    out.push_str(&format!(
        "   {} new, {} duplicate, {} failed chunks\n",
        report.chunks.chunks_indexed.to_string().green(),
        report.chunks.chunks_skipped.to_string().dimmed(),
        report.chunks.chunks_failed.to_string().red()
    ));
    if !report.failed_files.is_empty() {
        out.push_str(&format!("{}\n", "Failed files:".red().bold()));
        for (file, reason) in &report.failed_files {
            out.push_str(&format!("   {} {}: {}\n", "✗".red(), file, reason.dimmed()));
        }
    }
    out
}

/// Byte count with a binary unit, e.g. `1.5 KB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// What `load-dir` does with a folder when it stops before ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderPreview {
    InfoOnly,
    DryRun,
}

pub fn format_folder_info(info: &FolderInfo) -> String {
    let mut out = format!("{} Folder: {}\n", "📁".blue(), info.folder.bold());
    out.push_str(&format!("{} Files: {}\n", "📊".blue(), info.total_files()));
    out.push_str(&format!(
        "{} Total size: {}\n",
        "💾".blue(),
        format_size(info.total_size)
    ));
    out.push_str(&format!(
        "{} Extensions: {}\n",
        "📋".blue(),
        info.extensions.join(", ")
    ));
    if !info.files.is_empty() {
        out.push_str(&format!("\n{}\n", "Files:".bold()));
        for file in &info.files {
            out.push_str(&format!(
                "   {} {} {}\n",
                "•".blue(),
                file.path,
                format!("({})", format_size(file.size)).dimmed()
            ));
        }
    }
    out
}

pub fn format_folder_preview(info: &FolderInfo, collection: &str, preview: FolderPreview) -> String {
    let mut out = format_folder_info(info);
    if info.files.is_empty() {
        out.push_str(&format!(
            "\n{} No files with the requested extensions\n",
            "⚠️".yellow()
        ));
        return out;
    }
    match preview {
        FolderPreview::InfoOnly => {
            out.push_str(&format!("\n{} Info only, nothing was loaded\n", "ℹ️".blue()));
        }
        FolderPreview::DryRun => {
            out.push_str(&format!(
                "\n{} Dry run: would load {} files into {}\n",
                "🔍".blue(),
                info.total_files(),
                collection.bold()
            ));
        }
    }
    out
}

pub fn format_search_results(query: &str, documents: &[VectorDocument]) -> String {
    if documents.is_empty() {
        return format!("{} No results for \"{}\"\n", "🔍".yellow(), query);
    }

    let mut out = format!(
        "{} {} results for \"{}\"\n\n",
        "🔍".blue(),
        documents.len(),
        query.bold()
    );
    for (i, doc) in documents.iter().enumerate() {
        let source = doc.metadata_str("source").unwrap_or("unknown");
        let mut location = source.to_string();
        if let Some(page) = doc.metadata.get("page").and_then(|p| p.as_u64()) {
            location.push_str(&format!(" p.{}", page));
        }
        out.push_str(&format!(
            "{} {} {}\n",
            format!("{}.", i + 1).bold(),
            location.cyan(),
            format!("(score {:.3})", doc.score.unwrap_or(0.0)).dimmed()
        ));
        out.push_str(&format!("   {}\n\n", snippet(&doc.content)));
    }
    out
}

pub fn format_summary(summary: &CollectionSummary) -> String {
    if summary.documents.is_empty() {
        return format!("{} No documents loaded\n", "📭".yellow());
    }

    let mut out = format!(
        "{} {} documents\n",
        "📚".blue(),
        summary.total_documents.to_string().bold()
    );
    let mut current: Option<&str> = None;
    for doc in &summary.documents {
        if current != Some(doc.collection.as_str()) {
            out.push_str(&format!("\n{}\n", doc.collection.bold().underline()));
            current = Some(doc.collection.as_str());
        }
        out.push_str(&format!(
            "  {} {} {}\n",
            "•".blue(),
            doc.source,
            format!("({} chunks)", doc.chunks).dimmed()
        ));
    }
    out
}

pub fn format_collections(collections: &[CollectionInfo]) -> String {
    if collections.is_empty() {
        return format!("{} No collections\n", "📭".yellow());
    }

    let mut out = String::new();
    for info in collections {
        out.push_str(&format!(
            "{} {} {}\n",
            "•".blue(),
            info.name.bold(),
            format!("{} chunks, {} dims", info.count, info.dimensions).dimmed()
        ));
    }
    out
}

pub fn format_health(report: &[StoreHealth]) -> String {
    let mut out = String::new();
    for health in report {
        let status = if health.searchable {
            "OK".green().bold()
        } else {
            "FAIL".red().bold()
        };
        out.push_str(&format!(
            "{:<6} {} {}\n",
            status,
            health.collection.bold(),
            format!("({} chunks)", health.count).dimmed()
        ));
        if let Some(error) = &health.error {
            out.push_str(&format!("       {}\n", error.red()));
        } else if health.count == 0 {
            out.push_str(&format!("       {}\n", "collection is empty".yellow()));
        }
    }
    out
}
