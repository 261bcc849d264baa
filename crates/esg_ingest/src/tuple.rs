use esg_common::datum::Datum;
use esg_common::error::ParseError;
use esg_common::schema::SCHEMA_WIDTH;

/// Split one `(v1, v2, ...)` value tuple into raw, trimmed field strings.
///
/// One leading `(` and one trailing `)` are stripped. A quote (`'` or `"`)
/// toggles the quoted state unless it is escaped by an odd run of preceding
/// backslashes; inside quotes only the opening quote character closes the
/// span. Commas split fields only outside quotes. Quotes are kept in the
/// returned fields; [`coerce_field`] strips them.
pub fn split_tuple(line: &str) -> Vec<String> {
    let mut content = line.trim();
    if let Some(rest) = content.strip_prefix('(') {
        content = rest;
    }
    if let Some(rest) = content.strip_suffix(')') {
        content = rest;
    }

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut backslashes = 0usize;

    for c in content.chars() {
        let escaped = backslashes % 2 == 1;
        match c {
            '\'' | '"' if !escaped => {
                match quote {
                    None => quote = Some(c),
                    Some(q) if q == c => quote = None,
                    Some(_) => {}
                }
                current.push(c);
            }
            ',' if quote.is_none() => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
        backslashes = if c == '\\' { backslashes + 1 } else { 0 };
    }

    if !current.trim().is_empty() {
        fields.push(current.trim().to_string());
    }
    fields
}

/// Split a tuple and require at least [`SCHEMA_WIDTH`] fields.
pub fn parse_tuple(line: &str) -> Result<Vec<String>, ParseError> {
    let fields = split_tuple(line);
    if fields.len() < SCHEMA_WIDTH {
        return Err(ParseError::FieldCount {
            expected: SCHEMA_WIDTH,
            found: fields.len(),
        });
    }
    Ok(fields)
}

/// Coerce one raw field into a scalar.
///
/// A matching surrounding quote pair is stripped and its backslash escapes
/// decoded first; then `NULL`/`null`/empty become null, numeric literals
/// become integers (no `.` or exponent) or floats, `true`/`false` become
/// booleans, and everything else stays text.
pub fn coerce_field(raw: &str) -> Datum {
    let Some(value) = unquote(raw) else {
        return Datum::Null;
    };
    if let Some(n) = parse_number(&value) {
        return n;
    }
    match value.as_str() {
        "true" => Datum::Boolean(true),
        "false" => Datum::Boolean(false),
        _ => Datum::Text(value),
    }
}

/// Coerce a field bound for a text column: quotes, escapes and NULL are
/// handled as in [`coerce_field`], but `'0042'` stays the text `0042`.
pub fn coerce_text(raw: &str) -> Datum {
    unquote(raw).map_or(Datum::Null, Datum::Text)
}

/// Strip and decode a surrounding quote pair. `None` for NULL or empty.
fn unquote(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let value = match strip_quotes(raw) {
        Some((inner, q)) => unescape(inner, q),
        None => raw.to_string(),
    };
    if value.is_empty() || value == "NULL" || value == "null" {
        None
    } else {
        Some(value)
    }
}

fn strip_quotes(s: &str) -> Option<(&str, char)> {
    let first = s.chars().next()?;
    if (first == '\'' || first == '"') && s.len() >= 2 && s.ends_with(first) {
        Some((&s[1..s.len() - 1], first))
    } else {
        None
    }
}

/// Decode MySQL string escapes and doubled quotes.
fn unescape(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('0') => out.push('\0'),
                Some('Z') => out.push('\u{1a}'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else if c == quote && chars.peek() == Some(&quote) {
            chars.next();
            out.push(quote);
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_number(s: &str) -> Option<Datum> {
    if !looks_numeric(s) {
        return None;
    }
    let is_float = s.contains(['.', 'e', 'E']);
    if !is_float {
        if let Ok(i) = s.parse::<i64>() {
            return Some(Datum::Int64(i));
        }
    }
    s.parse::<f64>().ok().map(Datum::Float64)
}

/// `[+-]digits[.digits][(e|E)[+-]digits]`, with at least one mantissa digit.
fn looks_numeric(s: &str) -> bool {
    let b = s.as_bytes();
    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    let mut digits = 0;
    let mut dot = false;
    while i < b.len() {
        match b[i] {
            b'0'..=b'9' => digits += 1,
            b'.' if !dot => dot = true,
            _ => break,
        }
        i += 1;
    }
    if digits == 0 {
        return false;
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        i += 1;
        if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
            i += 1;
        }
        let start = i;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    i == b.len()
}
