/// Classification of one line of a bulk-insert dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpLine<'a> {
    /// Empty or whitespace-only.
    Blank,
    /// `INSERT INTO <table> ... VALUES` statement header.
    Header { table: Option<&'a str> },
    /// A `(...)` value tuple with any trailing `,` or `;` removed.
    Tuple(&'a str),
    /// Anything else: comments, `SET`, `LOCK TABLES`, DDL.
    Other,
}

const INSERT_INTO: &str = "INSERT INTO";

/// Classify a dump line. Leading and trailing whitespace is ignored.
pub fn classify_line(line: &str) -> DumpLine<'_> {
    let l = line.trim();
    if l.is_empty() {
        return DumpLine::Blank;
    }
    if l.starts_with('(') {
        let t = l
            .strip_suffix(',')
            .or_else(|| l.strip_suffix(';'))
            .unwrap_or(l);
        return DumpLine::Tuple(t);
    }
    if l
        .get(..INSERT_INTO.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(INSERT_INTO))
    {
        let table = l[INSERT_INTO.len()..]
            .split_whitespace()
            .next()
            .map(|t| t.trim_matches(|c| c == '`' || c == '"'))
            .map(|t| t.split('(').next().unwrap_or(t))
            .filter(|t| !t.is_empty());
        return DumpLine::Header { table };
    }
    DumpLine::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_lines() {
        assert_eq!(classify_line(""), DumpLine::Blank);
        assert_eq!(classify_line("   \t"), DumpLine::Blank);
    }

    #[test]
    fn test_header_captures_table() {
        assert_eq!(
            classify_line("INSERT INTO `esg_block` VALUES"),
            DumpLine::Header {
                table: Some("esg_block")
            }
        );
        assert_eq!(
            classify_line("insert into esg_block (id, date) VALUES"),
            DumpLine::Header {
                table: Some("esg_block")
            }
        );
    }

    #[test]
    fn test_tuple_strips_one_terminator() {
        assert_eq!(classify_line("(1,'a'),"), DumpLine::Tuple("(1,'a')"));
        assert_eq!(classify_line("  (1,'a');  "), DumpLine::Tuple("(1,'a')"));
        assert_eq!(classify_line("(1,'a')"), DumpLine::Tuple("(1,'a')"));
    }

    #[test]
    fn test_other_statements() {
        assert_eq!(classify_line("-- dump header"), DumpLine::Other);
        assert_eq!(classify_line("LOCK TABLES `esg_block` WRITE;"), DumpLine::Other);
        assert_eq!(classify_line("/*!40101 SET NAMES utf8mb4 */;"), DumpLine::Other);
    }
}
