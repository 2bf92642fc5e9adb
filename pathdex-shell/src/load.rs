//! Seed files
//!
//! A seed file holds one `<key> <path>` pair per line. Keys are decimal integers of any size,
//! and the path is the remainder of the line, so it may contain spaces. Blank lines and lines
//! starting with `#` are ignored.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use pathdex::btree::BTree;
use pathdex::btree::PathKey;

/// Split `line` into a key and a path, or `None` if there is nothing to load.
pub(crate) fn parse_line(line: &str) -> Result<Option<(PathKey, String)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (key, path) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| anyhow!("expected `<key> <path>`, found: {line}"))?;
    let key = key
        .parse::<PathKey>()
        .with_context(|| format!("invalid key: {key}"))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(anyhow!("missing path for key: {key}"));
    }
    Ok(Some((key, path.to_string())))
}

/// Insert every pair in the seed file into `tree`, returning how many lines were loaded.
pub(crate) fn load_file(tree: &mut BTree<PathKey>, location: &Path) -> Result<usize> {
    let file = File::open(location)
        .with_context(|| format!("could not open seed file: {}", location.display()))?;
    let mut loaded = 0;
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let parsed =
            parse_line(&line).with_context(|| format!("{}:{}", location.display(), number + 1))?;
        if let Some((key, path)) = parsed {
            tree.insert(key, path);
            loaded += 1;
        }
    }
    tracing::info!(path = %location.display(), loaded, "loaded seed file");
    Ok(loaded)
}
