use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches `@delegate: instruction`, dropping a trailing block-comment
/// terminator (`*/` or `-->`)
static DIRECTIVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@delegate:\s*(.+?)(?:\s*(?:\*/|-->))?$").expect("Invalid directive regex")
});

/// One `@delegate:` marker found in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDirective {
    pub id: String,
    pub file_path: PathBuf,
    /// 1-based
    pub line_number: usize,
    /// The whole matching line, trimmed
    pub directive: String,
    pub instruction: String,
    pub created_at: DateTime<Utc>,
}

/// Scan already-loaded file content for directives
pub fn scan_text(path: &Path, text: &str, now: DateTime<Utc>) -> Vec<FileDirective> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let caps = DIRECTIVE_PATTERN.captures(line)?;
            let instruction = caps.get(1)?.as_str().trim();
            if instruction.is_empty() {
                return None;
            }
            Some(FileDirective {
                id: directive_id(now),
                file_path: path.to_path_buf(),
                line_number: index + 1,
                directive: line.trim().to_string(),
                instruction: instruction.to_string(),
                created_at: now,
            })
        })
        .collect()
}

/// Read `path` and scan it. An unreadable file yields no directives.
pub fn scan_file(path: &Path, now: DateTime<Utc>) -> Vec<FileDirective> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Failed to scan {:?} for directives: {}", path, e);
            return Vec::new();
        }
    };

    let directives = scan_text(path, &text, now);
    if !directives.is_empty() {
        tracing::info!("Found {} directive(s) in {:?}", directives.len(), path);
    }
    directives
}

fn directive_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("directive-{}-{}", now.timestamp_millis(), &suffix[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_line_comment_directive() {
        let mut text = String::new();
        for i in 1..12 {
            text.push_str(&format!("const a{} = {};\n", i, i));
        }
        text.push_str("  // @delegate: rename this function\n");
        text.push_str("function f() {}\n");

        let found = scan_text(Path::new("src/app.ts"), &text, now());
        assert_eq!(found.len(), 1);
        let d = &found[0];
        assert_eq!(d.line_number, 12);
        assert_eq!(d.instruction, "rename this function");
        assert_eq!(d.directive, "// @delegate: rename this function");
        assert_eq!(d.file_path, PathBuf::from("src/app.ts"));
        assert_eq!(d.created_at, now());
        assert!(d.id.starts_with("directive-"));
    }

    #[test]
    fn test_comment_styles() {
        let text = "\
# @delegate: add docstring
/* @delegate: extract helper */
<!-- @delegate: fix heading -->
@delegate:    tidy whitespace   
// plain comment
";
        let instructions: Vec<_> = scan_text(Path::new("x"), text, now())
            .into_iter()
            .map(|d| (d.line_number, d.instruction))
            .collect();
        assert_eq!(
            instructions,
            vec![
                (1, "add docstring".to_string()),
                (2, "extract helper".to_string()),
                (3, "fix heading".to_string()),
                (4, "tidy whitespace".to_string()),
            ]
        );
    }

    #[test]
    fn test_marker_without_instruction_is_ignored() {
        let found = scan_text(Path::new("x"), "// @delegate:\n// @delegate:   \n", now());
        assert!(found.is_empty());
    }

    #[test]
    fn test_crlf_lines() {
        let found = scan_text(Path::new("x"), "a\r\n// @delegate: do it\r\n", now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instruction, "do it");
        assert_eq!(found[0].line_number, 2);
    }

    #[test]
    fn test_scan_file_unreadable_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_file(&dir.path().join("missing.ts"), now()).is_empty());
    }

    #[test]
    fn test_scan_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ts");
        std::fs::write(&path, "// @delegate: write tests\n").unwrap();

        let found = scan_file(&path, now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_path, path);
    }
}
