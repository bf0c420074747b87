//! Find MCP server declarations in a source tree.
//!
//! This is a text heuristic, not a parser. It looks for `FastMCP(...)`
//! constructor calls in Python, TypeScript and JavaScript files and takes
//! the nearest comment or module docstring as the description.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::RegistryError;

const SOURCE_EXTENSIONS: &[&str] = &["py", "ts", "js"];
const IGNORED_DIRS: &[&str] = &["node_modules", ".git", "target", ".venv"];

/// A server declaration found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub file: PathBuf,
    pub name: String,
    pub description: Option<String>,
}

fn declaration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?:new\s+)?FastMCP\(\s*(?:name\s*=\s*)?(?:["']([^"'\n]+)["']|\{\s*name\s*:\s*["']([^"'\n]+)["'])"#,
        )
        .expect("declaration regex is valid")
    })
}

fn docstring_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*(?:#[^\n]*\n\s*)*(?:"""|''')([\s\S]*?)(?:"""|''')"#)
            .expect("docstring regex is valid")
    })
}

/// Walk `root` and report every server declaration, ordered by file.
pub fn discover_servers(root: &Path) -> Result<Vec<DiscoveredServer>, RegistryError> {
    let base = glob::Pattern::escape(&root.to_string_lossy());
    let mut servers = Vec::new();

    for ext in SOURCE_EXTENSIONS {
        let pattern = format!("{}/**/*.{}", base, ext);
        let paths = glob::glob(&pattern).map_err(|e| {
            RegistryError::Validation(format!("cannot search {}: {}", root.display(), e))
        })?;

        for path in paths.flatten() {
            if is_ignored(path.strip_prefix(root).unwrap_or(&path)) {
                continue;
            }
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            for (name, description) in scan_source(&text) {
                servers.push(DiscoveredServer {
                    file: path.clone(),
                    name,
                    description,
                });
            }
        }
    }

    servers.sort_by(|a, b| a.file.cmp(&b.file));
    debug!(root = %root.display(), count = servers.len(), "discovered servers");
    Ok(servers)
}

fn is_ignored(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(|n| IGNORED_DIRS.contains(&n)),
        _ => false,
    })
}

/// Server names and descriptions declared in one source text.
pub fn scan_source(text: &str) -> Vec<(String, Option<String>)> {
    declaration_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
            let description =
                comment_before(text, whole.start()).or_else(|| module_docstring(text));
            Some((name, description))
        })
        .collect()
}

/// The comment block that ends on the line above `offset`.
fn comment_before(text: &str, offset: usize) -> Option<String> {
    let line_start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let before = text[..line_start].trim_end();

    if let Some(body) = before.strip_suffix("*/") {
        let open = body.rfind("/**")?;
        return jsdoc_text(&body[open + 3..]);
    }

    let mut run: Vec<&str> = before
        .lines()
        .rev()
        .map(str::trim)
        .take_while(|l| (l.starts_with('#') && !l.starts_with("#!")) || l.starts_with("//"))
        .map(|l| l.trim_start_matches(['#', '/']).trim())
        .collect();
    run.reverse();

    let joined = run.join(" ").trim().to_string();
    (!joined.is_empty()).then_some(joined)
}

/// Text of a `/** ... */` body, preferring an `@description` tag.
fn jsdoc_text(body: &str) -> Option<String> {
    let lines: Vec<&str> = body
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .collect();

    let selected: Vec<&str> = match lines.iter().position(|l| l.starts_with("@description")) {
        Some(idx) => std::iter::once(lines[idx].trim_start_matches("@description").trim())
            .chain(
                lines[idx + 1..]
                    .iter()
                    .copied()
                    .take_while(|l| !l.starts_with('@')),
            )
            .collect(),
        None => lines.into_iter().take_while(|l| !l.starts_with('@')).collect(),
    };

    let joined = selected
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

fn module_docstring(text: &str) -> Option<String> {
    let doc = docstring_re().captures(text)?.get(1)?.as_str().trim();
    (!doc.is_empty()).then(|| doc.to_string())
}
