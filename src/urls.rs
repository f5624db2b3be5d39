//! Target URL lists: one URL per line, `#` comments and blank lines ignored.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Reads URLs from any line-oriented source.
pub fn read_urls<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut urls = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            urls.push(line.to_string());
        }
    }
    Ok(urls)
}

pub fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open URL file {}", path.display()))?;
    read_urls(BufReader::new(file))
        .with_context(|| format!("Failed to read URL file {}", path.display()))
}

pub fn read_url_stdin() -> Result<Vec<String>> {
    read_urls(io::stdin().lock()).context("Failed to read URLs from stdin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn skips_comments_and_blank_lines() {
        let input = "\
# staging endpoints
https://example.com/a

   https://example.com/b   
#https://example.com/disabled
\t
https://example.com/c
";
        let urls = read_urls(Cursor::new(input)).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com/c",
            ]
        );
    }

    #[test]
    fn empty_input() {
        assert!(read_urls(Cursor::new("")).unwrap().is_empty());
        assert!(read_urls(Cursor::new("# only a comment\n\n")).unwrap().is_empty());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_url_file(Path::new("/nonexistent/urls.txt")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/urls.txt"));
    }
}
