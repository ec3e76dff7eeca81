//! Prompt files: JSONL, or a JSON array when the extension is `.json`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// One input row. Fields other than `prompt` are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PromptItem {
    pub prompt: String,
}

pub fn load_prompts(path: &Path) -> Result<Vec<PromptItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompts file: {}", path.display()))?;

    let is_array = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let items: Vec<PromptItem> = if is_array {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON array: {}", path.display()))?
    } else {
        parse_jsonl(&content)
            .with_context(|| format!("Failed to parse JSONL: {}", path.display()))?
    };

    if items.is_empty() {
        bail!("no prompts found in {}", path.display());
    }
    Ok(items)
}

fn parse_jsonl(content: &str) -> Result<Vec<PromptItem>> {
    let mut items = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item: PromptItem =
            serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
        items.push(item);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_jsonl_skips_blank_lines() {
        let (_dir, path) = write(
            "prompts.jsonl",
            "{\"prompt\": \"2+2?\", \"answer\": \"4\"}\n\n{\"prompt\": \"capital of France?\"}\n",
        );
        let items = load_prompts(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].prompt, "capital of France?");
    }

    #[test]
    fn test_json_array() {
        let (_dir, path) = write("prompts.json", r#"[{"prompt": "a"}, {"prompt": "b"}]"#);
        let items = load_prompts(&path).unwrap();
        assert_eq!(
            items,
            vec![
                PromptItem {
                    prompt: "a".to_string()
                },
                PromptItem {
                    prompt: "b".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_bad_line_reports_position() {
        let (_dir, path) = write("prompts.jsonl", "{\"prompt\": \"ok\"}\n{\"text\": \"no prompt\"}\n");
        let err = load_prompts(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_empty_file_rejected() {
        let (_dir, path) = write("prompts.jsonl", "\n\n");
        let err = load_prompts(&path).unwrap_err();
        assert!(err.to_string().contains("no prompts found"));
    }

    #[test]
    fn test_empty_json_array_rejected() {
        let (_dir, path) = write("prompts.json", "[]");
        let err = load_prompts(&path).unwrap_err();
        assert!(err.to_string().contains("no prompts found"));
    }

    #[test]
    fn test_missing_file() {
        assert!(load_prompts(Path::new("/nonexistent/prompts.jsonl")).is_err());
    }
}
