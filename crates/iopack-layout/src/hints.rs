use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{LayoutError, LayoutResult};

/// Package ordering hints.
///
/// Both files hold one `name<TAB>order` pair per line; blank lines and lines
/// starting with `#` are skipped. Names compare case-insensitively. When a
/// name appears twice the smaller order wins.
#[derive(Clone, Debug, Default)]
pub struct OrderHints {
    explicit: HashMap<String, i64>,
    open: HashMap<String, i64>,
}

impl OrderHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the explicit order file. Returns the number of entries read.
    pub fn load_explicit(&mut self, path: &Path) -> LayoutResult<usize> {
        let text = fs::read_to_string(path)?;
        let entries = parse_table(&text, path)?;
        let count = entries.len();
        merge(&mut self.explicit, entries);
        debug!(path = %path.display(), entries = count, "loaded explicit order hints");
        Ok(count)
    }

    /// Load the open-order file recorded by a runtime session.
    pub fn load_open(&mut self, path: &Path) -> LayoutResult<usize> {
        let text = fs::read_to_string(path)?;
        let entries = parse_table(&text, path)?;
        let count = entries.len();
        merge(&mut self.open, entries);
        debug!(path = %path.display(), entries = count, "loaded open order hints");
        Ok(count)
    }

    pub fn set_explicit(&mut self, name: &str, order: i64) {
        merge(&mut self.explicit, vec![(name.to_lowercase(), order)]);
    }

    pub fn set_open(&mut self, name: &str, order: i64) {
        merge(&mut self.open, vec![(name.to_lowercase(), order)]);
    }

    pub fn explicit(&self, name: &str) -> Option<i64> {
        self.explicit.get(&name.to_lowercase()).copied()
    }

    pub fn open(&self, name: &str) -> Option<i64> {
        self.open.get(&name.to_lowercase()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.explicit.is_empty() && self.open.is_empty()
    }
}

fn merge(table: &mut HashMap<String, i64>, entries: Vec<(String, i64)>) {
    for (name, order) in entries {
        table
            .entry(name)
            .and_modify(|existing| *existing = (*existing).min(order))
            .or_insert(order);
    }
}

fn parse_table(text: &str, path: &Path) -> LayoutResult<Vec<(String, i64)>> {
    let mut entries = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid = |reason: String| LayoutError::InvalidHint {
            path: path.to_path_buf(),
            line: number + 1,
            reason,
        };
        let (name, order) = line
            .split_once('\t')
            .ok_or_else(|| invalid("expected `name<TAB>order`".into()))?;
        let order = order
            .trim()
            .parse::<i64>()
            .map_err(|e| invalid(format!("bad order `{}`: {e}", order.trim())))?;
        entries.push((name.trim().to_lowercase(), order));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_entries_and_skips_comments() {
        let file = write_file("# startup\n/Game/Boot\t1\n\n/Game/Menu\t2\n");
        let mut hints = OrderHints::new();
        assert_eq!(hints.load_explicit(file.path()).unwrap(), 2);
        assert_eq!(hints.explicit("/game/boot"), Some(1));
        assert_eq!(hints.explicit("/GAME/MENU"), Some(2));
        assert_eq!(hints.open("/Game/Boot"), None);
    }

    #[test]
    fn duplicates_keep_smallest_order() {
        let file = write_file("/Game/A\t9\n/game/a\t3\n");
        let mut hints = OrderHints::new();
        hints.load_open(file.path()).unwrap();
        assert_eq!(hints.open("/Game/A"), Some(3));
    }

    #[test]
    fn reports_line_of_bad_entry() {
        let file = write_file("/Game/A\t1\n/Game/B 2\n");
        let err = OrderHints::new().load_explicit(file.path()).unwrap_err();
        match err {
            LayoutError::InvalidHint { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }

        let file = write_file("/Game/A\tsoon\n");
        let err = OrderHints::new().load_explicit(file.path()).unwrap_err();
        assert!(err.to_string().contains("bad order"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = OrderHints::new()
            .load_open(Path::new("/nonexistent/iopack/order.txt"))
            .unwrap_err();
        assert!(matches!(err, LayoutError::Io(_)));
    }
}
