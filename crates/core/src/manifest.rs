//! File-list manifest parsing.
//!
//! Manifests are plain text, one entry per line; the last
//! whitespace-delimited token on each line is the path (leading tokens,
//! e.g. numeric ids, are ignored). Substitution rules rewrite the path
//! in the order given, which lets a manifest recorded on one machine be
//! used on another (`{data_root}` style placeholders, absolute prefixes).

use std::path::PathBuf;

use regex::Regex;

use crate::error::{Error, Result};

/// An ordered pattern → replacement rewrite rule applied to every path.
#[derive(Debug, Clone)]
pub struct Substitution {
    pattern: Regex,
    replacement: String,
}

impl Substitution {
    pub fn new(pattern: &str, replacement: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    fn apply(&self, path: &str) -> String {
        self.pattern.replace_all(path, self.replacement.as_str()).into_owned()
    }
}

/// Parse a manifest into concrete paths, applying substitutions in order.
///
/// Blank lines are skipped. Fails if the file is unreadable or yields no
/// paths at all.
pub fn parse_paths(list_file: &std::path::Path, substitutions: &[Substitution]) -> Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(list_file).map_err(|e| Error::ManifestFormat {
        path: list_file.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for line in contents.lines() {
        let Some(token) = line.split_whitespace().last() else {
            continue;
        };
        let mut path = token.to_string();
        for sub in substitutions {
            path = sub.apply(&path);
        }
        paths.push(PathBuf::from(path));
    }

    if paths.is_empty() {
        return Err(Error::ManifestFormat {
            path: list_file.to_path_buf(),
            reason: "manifest contains no paths".to_string(),
        });
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn temp_manifest(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("dynmix_test_manifest");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_last_token_is_path() {
        let path = temp_manifest(
            "ids.lst",
            "0001 /data/spk1/a.wav\n0002 /data/spk2/b.wav\n",
        );
        let paths = parse_paths(&path, &[]).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], PathBuf::from("/data/spk1/a.wav"));
        assert_eq!(paths[1], PathBuf::from("/data/spk2/b.wav"));
    }

    #[test]
    fn test_substitutions_applied_in_order() {
        let path = temp_manifest("subs.lst", "{root}/a.wav\n");
        let subs = vec![
            Substitution::new(r"\{root\}", "/mnt/data").unwrap(),
            Substitution::new("^/mnt", "/scratch").unwrap(),
        ];
        let paths = parse_paths(&path, &subs).unwrap();
        assert_eq!(paths[0], PathBuf::from("/scratch/data/a.wav"));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let path = temp_manifest("blank.lst", "\n/a.wav\n\n/b.wav\n");
        let paths = parse_paths(&path, &[]).unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn test_empty_manifest_errors() {
        let path = temp_manifest("empty.lst", "\n\n");
        let err = parse_paths(&path, &[]).unwrap_err();
        assert!(matches!(err, Error::ManifestFormat { .. }));
    }

    #[test]
    fn test_missing_file_errors() {
        let err = parse_paths(std::path::Path::new("/nonexistent/x.lst"), &[]).unwrap_err();
        assert!(matches!(err, Error::ManifestFormat { .. }));
    }
}
