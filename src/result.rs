//! Query results.

use crate::value::Value;

/// The outcome of a successful query.
///
/// `rows` and `columns` are `None` for statements that return no result
/// set (e.g. a plain INSERT) and for the empty query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Command name from the completion tag, lowercased with words
    /// joined by `_` (e.g. `insert`, `create_table`)
    pub command: Option<String>,
    /// Row count reported by the server, or the number of buffered rows
    pub num_rows: u32,
    /// Decoded rows, in server order
    pub rows: Option<Vec<Vec<Value>>>,
    /// Column names, in positional order
    pub columns: Option<Vec<String>>,
}

/// Split a CommandComplete tag into the command name and the trailing
/// row count.
///
/// `"INSERT 0 3"` → `(Some("insert"), Some(3))`,
/// `"SELECT 2"` → `(Some("select"), Some(2))`,
/// `"CREATE TABLE"` → `(Some("create_table"), None)`.
pub(crate) fn decode_tag(tag: &str) -> (Option<String>, Option<u32>) {
    let mut words = Vec::new();
    let mut count = None;

    for word in tag.split(' ').filter(|w| !w.is_empty()) {
        match word.parse::<u32>() {
            Ok(n) => count = Some(n),
            Err(_) => words.push(word.to_ascii_lowercase()),
        }
    }

    let command = if words.is_empty() {
        None
    } else {
        Some(words.join("_"))
    };
    (command, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tag_insert() {
        assert_eq!(decode_tag("INSERT 0 3"), (Some("insert".into()), Some(3)));
    }

    #[test]
    fn test_decode_tag_select() {
        assert_eq!(decode_tag("SELECT 2"), (Some("select".into()), Some(2)));
    }

    #[test]
    fn test_decode_tag_multiword() {
        assert_eq!(decode_tag("CREATE TABLE"), (Some("create_table".into()), None));
    }

    #[test]
    fn test_decode_tag_bare() {
        assert_eq!(decode_tag("BEGIN"), (Some("begin".into()), None));
        assert_eq!(decode_tag(""), (None, None));
    }
}
