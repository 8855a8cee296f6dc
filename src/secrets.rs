//! Credential store backed by a flat KEY=VALUE file
//!
//! Secure deploys read `BASIC_AUTH_USER` / `BASIC_AUTH_PASS` from a dotenv
//! style file under the workspace root. The file is read fresh on every
//! request so edits take effect immediately; a missing file is a valid,
//! low-privilege state rather than a fault.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

/// Key holding the Basic Auth username
pub const BASIC_AUTH_USER: &str = "BASIC_AUTH_USER";
/// Key holding the Basic Auth password
pub const BASIC_AUTH_PASS: &str = "BASIC_AUTH_PASS";

/// Load KEY=VALUE pairs from a dotenv style file.
///
/// Empty lines and `#` comments are skipped, as are lines without `=`.
/// Keys and values are whitespace-trimmed and one matching pair of
/// surrounding quotes is stripped from the value. A nonexistent file
/// yields an empty map.
pub fn load_env_file(path: &Path) -> HashMap<String, String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to read env file");
            }
            return HashMap::new();
        }
    };

    let mut pairs = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            pairs.insert(key.trim().to_string(), unquote(value.trim()).to_string());
        }
    }

    pairs
}

/// Strip exactly one matching pair of surrounding single or double quotes.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_env(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_is_empty() {
        let pairs = load_env_file(Path::new("/nonexistent/deploygate.env"));
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_skips_comments_blanks_and_bad_lines() {
        let file = write_env("KEY='value'\n# comment\n\nBAD_LINE\n");
        let pairs = load_env_file(file.path());
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs.get("KEY").map(String::as_str), Some("value"));
    }

    #[test]
    fn test_splits_on_first_equals() {
        let file = write_env("DATABASE_URL=postgres://u:p@host/db?sslmode=require\n");
        let pairs = load_env_file(file.path());
        assert_eq!(
            pairs.get("DATABASE_URL").map(String::as_str),
            Some("postgres://u:p@host/db?sslmode=require")
        );
    }

    #[test]
    fn test_trims_whitespace() {
        let file = write_env("  BASIC_AUTH_USER  =  admin  \n");
        let pairs = load_env_file(file.path());
        assert_eq!(pairs.get("BASIC_AUTH_USER").map(String::as_str), Some("admin"));
    }

    #[test]
    fn test_strips_one_matching_quote_pair() {
        let file = write_env("A=\"double\"\nB='single'\nC=\"'nested'\"\nD='unmatched\"\nE=\"\"\n");
        let pairs = load_env_file(file.path());
        assert_eq!(pairs.get("A").map(String::as_str), Some("double"));
        assert_eq!(pairs.get("B").map(String::as_str), Some("single"));
        assert_eq!(pairs.get("C").map(String::as_str), Some("'nested'"));
        assert_eq!(pairs.get("D").map(String::as_str), Some("'unmatched\""));
        assert_eq!(pairs.get("E").map(String::as_str), Some(""));
    }

    #[test]
    fn test_lone_quote_kept() {
        let file = write_env("K='\n");
        let pairs = load_env_file(file.path());
        assert_eq!(pairs.get("K").map(String::as_str), Some("'"));
    }
}
