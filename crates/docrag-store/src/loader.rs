//! Document loaders
//!
//! Text is extracted from supported file formats into [`Document`]s that carry
//! `source`, `file_type` and `file_name` metadata.

use regex::Regex;
use scraper::Html;
use serde_json::json;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use docrag_core::{Document, Error, FileEntry, FolderInfo, Result};

/// Load a file into one or more documents (PDFs yield one per page)
pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    let extension = file_extension(path).ok_or_else(|| {
        Error::UnsupportedFormat(format!("{} has no file extension", path.display()))
    })?;

    if !path.is_file() {
        return Err(Error::DocumentLoader(format!(
            "File not found: {}",
            path.display()
        )));
    }

    debug!(path = %path.display(), file_type = %extension, "Loading document");

    let pages = match extension.as_str() {
        "txt" => vec![read_text(path)?],
        "md" | "markdown" => vec![markdown_to_text(&read_text(path)?)],
        "html" | "htm" => vec![html_to_text(&read_text(path)?)],
        "pdf" => pdf_pages(path)?,
        "docx" | "doc" => vec![docx_text(path)?],
        other => return Err(Error::UnsupportedFormat(format!(".{}", other))),
    };

    let source = path.to_string_lossy().to_string();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source.clone());
    let paged = extension == "pdf";

    let documents: Vec<Document> = pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| {
            let mut metadata = json!({
                "source": source,
                "file_type": extension,
                "file_name": file_name,
            });
            let (id, title) = if paged {
                metadata["page"] = json!(i + 1);
                (format!("{}#{}", source, i + 1), format!("{} (page {})", file_name, i + 1))
            } else {
                (source.clone(), file_name.clone())
            };
            Document {
                id,
                title,
                content: text,
                source: source.clone(),
                metadata,
            }
        })
        .collect();

    if documents.is_empty() {
        return Err(Error::DocumentLoader(format!(
            "No text could be extracted from {}",
            path.display()
        )));
    }

    Ok(documents)
}

/// Recursively collect files under `folder` whose extension is in `extensions`
pub fn collect_files(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(Error::DocumentLoader(format!(
            "Folder not found: {}",
            folder.display()
        )));
    }

    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            file_extension(path)
                .map(|ext| wanted.contains(&ext))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Matching files under `folder` with their sizes
pub fn folder_info(folder: &Path, extensions: &[String]) -> Result<FolderInfo> {
    let mut files = Vec::new();
    for path in collect_files(folder, extensions)? {
        let size = std::fs::metadata(&path)?.len();
        files.push(FileEntry {
            path: path.to_string_lossy().to_string(),
            size,
        });
    }

    Ok(FolderInfo {
        folder: folder.to_string_lossy().to_string(),
        extensions: extensions.to_vec(),
        total_size: files.iter().map(|f| f.size).sum(),
        files,
    })
}

pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| {
        Error::DocumentLoader(format!("{} is not valid UTF-8 text", path.display()))
    })
}

fn markdown_to_text(markdown: &str) -> String {
    use pulldown_cmark::{Event, Parser, TagEnd};

    let mut text = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
            ) => text.push_str("\n\n"),
            _ => {}
        }
    }
    text.trim().to_string()
}

fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .map(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"))
            .unwrap_or(false);
        let text = text.trim();
        if !hidden && !text.is_empty() {
            parts.push(text.to_string());
        }
    }

    parts.join("\n")
}

fn pdf_pages(path: &Path) -> Result<Vec<String>> {
    pdf_extract::extract_text_by_pages(path).map_err(|e| {
        Error::DocumentLoader(format!("Failed to read PDF {}: {}", path.display(), e))
    })
}

fn docx_text(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        Error::DocumentLoader(format!(
            "{} is not a Word document archive: {}",
            path.display(),
            e
        ))
    })?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| Error::DocumentLoader(format!("Missing document body: {}", e)))?
        .read_to_string(&mut xml)?;

    word_xml_to_text(&xml)
}

/// Paragraph text from a WordprocessingML body
fn word_xml_to_text(xml: &str) -> Result<String> {
    let paragraph = Regex::new(r"(?s)<w:p[ >].*?</w:p>").map_err(|e| Error::Other(e.to_string()))?;
    let run = Regex::new(r"<w:t(?: [^>]*)?>([^<]*)</w:t>").map_err(|e| Error::Other(e.to_string()))?;

    let paragraphs: Vec<String> = paragraph
        .find_iter(xml)
        .map(|p| {
            run.captures_iter(p.as_str())
                .filter_map(|c| c.get(1))
                .map(|m| decode_xml_entities(m.as_str()))
                .collect::<String>()
        })
        .filter(|p| !p.trim().is_empty())
        .collect();

    Ok(paragraphs.join("\n"))
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
