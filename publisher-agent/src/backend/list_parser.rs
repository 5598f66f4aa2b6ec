//! Stateless parser for FTP `LIST` response lines.
//!
//! Handles both the Unix `ls -l` style line format and the MS-DOS `dir`
//! style format some older FTP servers still emit. Pure function, no
//! connection state - kept separate from the backend so it can be unit
//! tested without a server.

use super::RemoteKind;
use std::sync::LazyLock;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unrecognized LIST line format: {0:?}")]
pub struct LineFormatError(pub String);

static UNIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<type>[-dl])[rwxXsStT-]{9}\s+\d+\s+\S+\s+\S+\s+(?P<size>\d+)\s+\S+\s+\S+\s+\S+\s+(?P<name>.+)$",
    )
    .unwrap()
});

static MSDOS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<date>\d{2}-\d{2}-\d{2,4})\s+(?P<time>\d{2}:\d{2}(?:AM|PM)?)\s+(?:(?P<dir><DIR>)|(?P<size>\d+))\s+(?P<name>.+)$",
    )
    .unwrap()
});

/// One parsed `LIST` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub kind: RemoteKind,
    pub size: u64,
}

/// Parse a single `LIST` response line, trying the Unix format first and
/// falling back to the MS-DOS format.
pub fn parse_list_line(line: &str) -> Result<ListEntry, LineFormatError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with("total ") {
        return Err(LineFormatError(line.to_string()));
    }

    if let Some(caps) = UNIX_RE.captures(line) {
        let kind = match &caps["type"] {
            "d" => RemoteKind::Directory,
            _ => RemoteKind::File,
        };
        let size: u64 = caps["size"].parse().unwrap_or(0);
        let mut name = caps["name"].to_string();
        // Unix listings append "-> target" for symlinks; keep only the link name.
        if let Some(idx) = name.find(" -> ") {
            name.truncate(idx);
        }
        return Ok(ListEntry { name, kind, size });
    }

    if let Some(caps) = MSDOS_RE.captures(line) {
        let is_dir = caps.name("dir").is_some();
        let size: u64 = caps
            .name("size")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let kind = if is_dir {
            RemoteKind::Directory
        } else {
            RemoteKind::File
        };
        return Ok(ListEntry {
            name: caps["name"].to_string(),
            kind,
            size,
        });
    }

    Err(LineFormatError(line.to_string()))
}

/// Parse a full multi-line `LIST` response, silently skipping lines that
/// don't match either format (blank lines, `total N` headers) rather than
/// failing the whole listing.
pub fn parse_list_output(output: &str) -> Vec<ListEntry> {
    output
        .lines()
        .filter_map(|line| parse_list_line(line).ok())
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_file_line() {
        let line = "-rw-r--r--   1 user     group        1234 Jan 15 10:30 index.html";
        let entry = parse_list_line(line).unwrap();
        assert_eq!(entry.name, "index.html");
        assert_eq!(entry.kind, RemoteKind::File);
        assert_eq!(entry.size, 1234);
    }

    #[test]
    fn parses_unix_directory_line() {
        let line = "drwxr-xr-x   2 user     group        4096 Jan 15 10:30 uploads";
        let entry = parse_list_line(line).unwrap();
        assert_eq!(entry.name, "uploads");
        assert_eq!(entry.kind, RemoteKind::Directory);
    }

    #[test]
    fn parses_unix_symlink_line_stripping_target() {
        let line = "lrwxrwxrwx   1 user     group           9 Jan 15 10:30 current -> releases/3";
        let entry = parse_list_line(line).unwrap();
        assert_eq!(entry.name, "current");
        assert_eq!(entry.kind, RemoteKind::File);
    }

    #[test]
    fn parses_msdos_file_line() {
        let line = "01-15-24  10:30AM             1234 index.html";
        let entry = parse_list_line(line).unwrap();
        assert_eq!(entry.name, "index.html");
        assert_eq!(entry.kind, RemoteKind::File);
        assert_eq!(entry.size, 1234);
    }

    #[test]
    fn parses_msdos_directory_line() {
        let line = "01-15-24  10:30AM       <DIR>          uploads";
        let entry = parse_list_line(line).unwrap();
        assert_eq!(entry.kind, RemoteKind::Directory);
    }

    #[test]
    fn rejects_garbage_lines() {
        assert!(parse_list_line("total 12").is_err());
        assert!(parse_list_line("").is_err());
        assert!(parse_list_line("not a listing line at all").is_err());
    }

    #[test]
    fn parse_list_output_skips_bad_lines_and_dot_entries() {
        let output = "total 8\n-rw-r--r-- 1 a a 1 Jan 1 00:00 a.txt\n.\n..\n";
        let entries = parse_list_output(output);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
    }
}
