//! Seed wallet loading
//!
//! A seed file is either a JSON array of addresses or plain text with one
//! address per line (`#` starts a comment line). File order is exploration
//! order.

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Parse seed file contents
pub fn parse_seeds(content: &str) -> Result<Vec<String>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let seeds: Vec<String> = serde_json::from_str(trimmed)
            .map_err(|e| Error::Seeds(format!("invalid JSON seed list: {}", e)))?;
        return Ok(seeds
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect());
    }

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Load seeds from `file` (if any) followed by `inline`, dropping repeats
pub async fn load_seeds(file: Option<&Path>, inline: &[String]) -> Result<Vec<String>> {
    let mut seeds = Vec::new();

    if let Some(path) = file {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Seeds(format!("cannot read {}: {}", path.display(), e)))?;
        let parsed = parse_seeds(&content)?;
        debug!("Read {} seeds from {}", parsed.len(), path.display());
        seeds.extend(parsed);
    }

    seeds.extend(inline.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));

    let mut seen = HashSet::new();
    seeds.retain(|s| seen.insert(s.clone()));

    if seeds.is_empty() {
        return Err(Error::Seeds(
            "no seed wallets configured (set [seeds].file or [seeds].addresses)".into(),
        ));
    }

    info!("Loaded {} seed wallets", seeds.len());
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_json_array() {
        let seeds = parse_seeds(r#"["A", " B ", ""]"#).unwrap();
        assert_eq!(seeds, vec!["A", "B"]);
    }

    #[test]
    fn test_parse_lines_with_comments() {
        let seeds = parse_seeds("# known traders\nA\n\n  B  \n# C\nD\n").unwrap();
        assert_eq!(seeds, vec!["A", "B", "D"]);
    }

    #[test]
    fn test_parse_bad_json() {
        let err = parse_seeds("[\"A\", 3]").unwrap_err();
        assert!(matches!(err, Error::Seeds(_)));
    }

    #[tokio::test]
    async fn test_file_then_inline_deduplicated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "A\nB\nA").unwrap();

        let inline = vec!["C".to_string(), "B".to_string()];
        let seeds = load_seeds(Some(file.path()), &inline).await.unwrap();
        assert_eq!(seeds, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_no_seeds_is_an_error() {
        assert!(load_seeds(None, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let err = load_seeds(Some(Path::new("/nonexistent/seeds.txt")), &[]).await.unwrap_err();
        assert!(matches!(err, Error::Seeds(_)));
    }
}
