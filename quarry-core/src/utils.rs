use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use colored::*;

use crate::entities::ExtractedDocument;

pub fn sanitize_doc_name(doc_name: &str) -> String {
    doc_name
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
}

/// Writes the extraction result as json into `output_dir` (or the
/// working directory) and prints where it landed.
pub fn save_extracted_document(
    doc: &ExtractedDocument,
    output_dir: Option<&Path>,
    doc_name: &str,
) -> anyhow::Result<PathBuf> {
    let file_name = format!("{}.json", sanitize_doc_name(doc_name));
    let file_out = output_dir.unwrap_or(Path::new(".")).join(file_name);
    let file = File::create(&file_out).context("can't create result file")?;
    let mut writer = BufWriter::new(file);
    let doc_json = serde_json::to_string(doc)?;
    writer.write_all(doc_json.as_bytes())?;
    println!(
        "{} Results saved in: {}",
        "✓".green().bold(),
        file_out.display().to_string().cyan().underline()
    );
    Ok(file_out)
}
