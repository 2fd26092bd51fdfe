//! Project/solution loading (spec §1, §5): a `db`/`summary`/`types` run takes
//! either a single TwinCAT project file or a solution file that references
//! several of them, and both resolve against the same [`crate::types::TypeTable`].

use crate::error::{CompileError, Result};
use crate::xml_obj::XmlTree;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Parse every project XML referenced by `entry_path` into one tree per file.
///
/// A `.sln` is scanned for `Project(...) = "Name", "path.tsproj", "{guid}"`
/// lines (the same shape Visual Studio solution files use) and each
/// referenced path is resolved relative to the solution's own directory.
/// Anything else is treated as a single project file.
pub fn load(entry_path: &Utf8Path) -> Result<Vec<XmlTree>> {
    discover_project_paths(entry_path)?
        .iter()
        .map(|path| {
            let text = fs::read_to_string(path)
                .map_err(|e| CompileError::MalformedXml(format!("{path}: {e}")))?;
            XmlTree::parse(&text)
        })
        .collect()
}

fn discover_project_paths(entry_path: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    if entry_path.extension() != Some("sln") {
        return Ok(vec![entry_path.to_path_buf()]);
    }
    let text = fs::read_to_string(entry_path)
        .map_err(|e| CompileError::MalformedXml(format!("{entry_path}: {e}")))?;
    let dir = entry_path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut paths = Vec::new();
    for line in text.lines() {
        if let Some(rel) = extract_quoted_project_path(line) {
            paths.push(dir.join(rel));
        }
    }
    if paths.is_empty() {
        return Err(CompileError::MalformedXml(format!(
            "solution file {entry_path} contains no .tsproj/.plcproj references"
        )));
    }
    Ok(paths)
}

fn extract_quoted_project_path(line: &str) -> Option<&str> {
    let parts: Vec<&str> = line.split('"').collect();
    parts
        .iter()
        .enumerate()
        .find(|(i, s)| i % 2 == 1 && (s.ends_with(".tsproj") || s.ends_with(".plcproj")))
        .map(|(_, s)| *s)
}
