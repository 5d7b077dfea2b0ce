/// Statement flattening: rewrite a log record body so that statements
/// differing only in literal values share one canonical string, which the
/// aggregator uses as the cluster key.
///
/// Two stages produce the key.  First a battery of targeted substitutions
/// handles the easy shapes: literals after WHERE/SET/SELECT, IN lists,
/// cursor names, timestamps, and a handful of well-known error message
/// forms.  Then a small state machine collapses VALUES/REPLACE tuple lists,
/// which regular expressions alone cannot do safely: the tuples may contain
/// quoted strings with escaped or doubled quotes, E'' strings, dollar-quoted
/// bodies, and nested parentheses.  If the machine runs off the end of the
/// text (unterminated quote, unbalanced parens) the occurrence is left
/// exactly as it was; a wrong cluster key is worse than a loose one.
///
/// A third, independent rewrite produces the *pretty* form of a body for
/// the report: continuation keywords pushed onto their own lines, and in
/// duration mode the duration/statement pair reshaped for readability.
/// The pretty form is never used for clustering.
use regex::{Captures, Regex};

pub struct Flattener {
    simple: Vec<(Regex, &'static str)>,
    func_args: Regex,
    in_list: Regex,
    tuple_opener: Regex,
    pretty_break: Regex,
    pretty_duration: Regex,
}

impl Flattener {
    pub fn new() -> Flattener {
        let simple = vec![
            // Quoted timestamps after an equals sign.
            (
                Regex::new(r"(=\s*)'\d{4}-\d\d-\d\d \d\d:\d\d:\d\d(?:\.\d+)?(?: [A-Za-z0-9+\-]+)?'")
                    .unwrap(),
                "${1}'?'",
            ),
            // Simple equality with a string or number after WHERE/AND/OR.
            (
                Regex::new(r#"(?i)\b((?:WHERE|AND|OR)\s+[\w\."]+\s*=\s*)'(?:[^']|'')*'"#).unwrap(),
                "${1}'?'",
            ),
            (
                Regex::new(r#"(?i)\b((?:WHERE|AND|OR)\s+[\w\."]+\s*=\s*)[-+]?\d+(?:\.\d+)?"#)
                    .unwrap(),
                "${1}?",
            ),
            // UPDATE ... SET col = literal.
            (
                Regex::new(r#"(?i)\b(SET\s+[\w\."]+\s*=\s*)'(?:[^']|'')*'"#).unwrap(),
                "${1}'?'",
            ),
            (
                Regex::new(r#"(?i)\b(SET\s+[\w\."]+\s*=\s*)[-+]?\d+(?:\.\d+)?"#).unwrap(),
                "${1}?",
            ),
            // Bare literals directly after SELECT and after commas.
            (
                Regex::new(r"(?i)\b(SELECT\s+)'(?:[^']|'')*'").unwrap(),
                "${1}'?'",
            ),
            (
                Regex::new(r"(?i)\b(SELECT\s+)[-+]?\d+(?:\.\d+)?\b").unwrap(),
                "${1}?",
            ),
            (Regex::new(r"(,\s*)'(?:[^']|'')*'").unwrap(), "${1}'?'"),
            (Regex::new(r"(,\s*)[-+]?\d+(?:\.\d+)?\b").unwrap(), "${1}?"),
            // Named cursors and portals.
            (
                Regex::new(r#"(?i)\b(CLOSE\s+)"?[\w\$]+"?"#).unwrap(),
                "${1}?",
            ),
            (
                Regex::new(r#"(?i)\b(FETCH\s+(?:\d+\s+)?(?:FROM|IN)\s+)"?[\w\$]+"?"#).unwrap(),
                "${1}?",
            ),
            (
                Regex::new(r#"(?i)\b(DECLARE\s+)"?[\w\$]+"?(\s+(?:NO\s+SCROLL\s+|SCROLL\s+)?CURSOR)"#)
                    .unwrap(),
                "${1}?${2}",
            ),
            // Well-known error message shapes.
            (
                Regex::new(r#"(invalid byte sequence for encoding "[^"]+": )0x[0-9a-fA-F]+"#)
                    .unwrap(),
                "${1}0x?",
            ),
            (
                Regex::new(r"(Failed on request of size )\d+").unwrap(),
                "${1}?",
            ),
            (
                Regex::new(r"(Failing row contains )\(.*\)").unwrap(),
                "${1}(?)",
            ),
            (Regex::new(r"ARRAY\[[^\]]*\]").unwrap(), "ARRAY[?]"),
            (
                Regex::new(r#"(syntax error at or near )"[^"]*""#).unwrap(),
                "${1}\"?\"",
            ),
            (Regex::new(r"( at character )\d+").unwrap(), "${1}?"),
            (
                Regex::new(r"(Key \([^)]+\)=\()[^)]*(\))").unwrap(),
                "${1}?${2}",
            ),
        ];
        Flattener {
            simple,
            func_args: Regex::new(r"(?i)(SELECT\s+)([\w\.]+)\(([^()]*)\)").unwrap(),
            in_list: Regex::new(r"(?i)\b(IN\s*\()([^()]+)(\))").unwrap(),
            tuple_opener: Regex::new(r"(?i)\b(?:VALUES|REPLACE)\s*\(").unwrap(),
            pretty_break: Regex::new(r"\s+(DETAIL|HINT|QUERY|CONTEXT|STATEMENT):").unwrap(),
            pretty_duration: Regex::new(
                r"^LOG:\s+duration:\s+([\d\.]+ ms)\s+(?:LOG:\s+)?(?:statement|execute [^:]*):\s*(.*)$",
            )
            .unwrap(),
        }
    }

    /// The canonical form of a squashed record body.
    pub fn flatten(&self, body: &str) -> String {
        let mut s = body.to_string();
        // SELECT func(a, b, c): every argument that is not a $N placeholder
        // becomes ?.
        s = self
            .func_args
            .replace_all(&s, |caps: &Captures| {
                let args = caps
                    .get(3)
                    .unwrap()
                    .as_str()
                    .split(',')
                    .map(|a| {
                        let t = a.trim();
                        if t.starts_with('$') && t[1..].chars().all(|c| c.is_ascii_digit()) {
                            t.to_string()
                        } else {
                            "?".to_string()
                        }
                    })
                    .collect::<Vec<String>>()
                    .join(",");
                format!("{}{}({})", &caps[1], &caps[2], args)
            })
            .into_owned();
        // IN (...) collapses unless it holds a subquery.
        s = self
            .in_list
            .replace_all(&s, |caps: &Captures| {
                if caps[2].trim_start().to_uppercase().starts_with("SELECT") {
                    caps[0].to_string()
                } else {
                    format!("{}?{}", &caps[1], &caps[3])
                }
            })
            .into_owned();
        for (re, replacement) in &self.simple {
            s = re.replace_all(&s, *replacement).into_owned();
        }
        self.flatten_tuple_lists(&s)
    }

    // Collapse every VALUES/REPLACE tuple list to "(?)".  The scan is per
    // occurrence; an occurrence the machine cannot finish is kept verbatim.

    fn flatten_tuple_lists(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut pos = 0;
        while let Some(m) = self.tuple_opener.find(&s[pos..]) {
            let open_end = pos + m.end(); // just past the '('
            out.push_str(&s[pos..open_end]);
            match scan_tuples(s.as_bytes(), open_end) {
                Some(end) => {
                    out.push_str("?)");
                    pos = end;
                }
                None => {
                    pos = open_end;
                }
            }
        }
        out.push_str(&s[pos..]);
        out
    }

    /// The report-friendly form of a raw body.
    pub fn pretty(&self, body: &str, duration_mode: bool) -> String {
        if duration_mode {
            if let Some(caps) = self.pretty_duration.captures(body) {
                return format!("DURATION: {}\nSTATEMENT: {}", &caps[1], &caps[2]);
            }
        }
        self.pretty_break.replace_all(body, "\n${1}:").into_owned()
    }
}

#[derive(PartialEq)]
enum ScanState {
    Start,
    Literal,
    InQuote,
    Dollar(usize, usize), // byte range of the "$tag$" opener
}

// Walk the text after "VALUES (" to the end of the whole tuple list, or
// None when the text is not tuple-shaped after all.  A top-level semicolon
// terminates the statement early; the caller keeps it.

fn scan_tuples(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut state = ScanState::Start;
    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i];
        match state {
            ScanState::Start | ScanState::Literal => {
                match c {
                    b'\'' => {
                        state = ScanState::InQuote;
                        i += 1;
                    }
                    b'E' | b'e' if state == ScanState::Start
                        && i + 1 < bytes.len()
                        && bytes[i + 1] == b'\'' =>
                    {
                        state = ScanState::InQuote;
                        i += 2;
                    }
                    b'$' => {
                        if let Some(end) = dollar_tag_end(bytes, i) {
                            state = ScanState::Dollar(i, end);
                            i = end;
                        } else {
                            state = ScanState::Literal;
                            i += 1;
                        }
                    }
                    b',' => {
                        state = ScanState::Start;
                        i += 1;
                    }
                    b'(' => {
                        depth += 1;
                        state = ScanState::Start;
                        i += 1;
                    }
                    b')' => {
                        depth -= 1;
                        i += 1;
                        if depth == 0 {
                            // Another tuple may follow: ", ("
                            let mut j = i;
                            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                                j += 1;
                            }
                            if j < bytes.len() && bytes[j] == b',' {
                                j += 1;
                                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                                    j += 1;
                                }
                                if j < bytes.len() && bytes[j] == b'(' {
                                    depth = 1;
                                    state = ScanState::Start;
                                    i = j + 1;
                                    continue;
                                }
                            }
                            return Some(i);
                        }
                        state = ScanState::Literal;
                    }
                    b';' => {
                        return Some(i);
                    }
                    _ => {
                        if state == ScanState::Start && !c.is_ascii_whitespace() {
                            state = ScanState::Literal;
                        }
                        i += 1;
                    }
                }
            }
            ScanState::InQuote => match c {
                b'\\' => {
                    i += 2;
                }
                b'\'' => {
                    if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                        i += 2;
                    } else {
                        state = ScanState::Literal;
                        i += 1;
                    }
                }
                _ => {
                    i += 1;
                }
            },
            ScanState::Dollar(tstart, tend) => {
                let tag = &bytes[tstart..tend];
                if bytes[i..].starts_with(tag) {
                    i += tag.len();
                    state = ScanState::Literal;
                } else {
                    i += 1;
                }
            }
        }
    }
    None
}

// At a '$', the span of a well-formed "$tag$" opener, if any.

fn dollar_tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'$' => return Some(i + 1),
            c if c == b'_' || c.is_ascii_alphanumeric() => i += 1,
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
fn flat(s: &str) -> String {
    Flattener::new().flatten(s)
}

#[test]
fn test_values_lists_share_a_key() {
    // The motivating case: multi-row and single-row inserts collapse to the
    // same canonical string.
    let a = flat("INSERT INTO t VALUES (1,'x'),(2,'y')");
    let b = flat("INSERT INTO t VALUES (3,'z')");
    assert!(a == "INSERT INTO t VALUES (?)");
    assert!(a == b);
}

#[test]
fn test_values_quoting_forms() {
    assert!(flat("INSERT INTO t VALUES (1, 'it''s', E'two\\'s')") == "INSERT INTO t VALUES (?)");
    assert!(flat("INSERT INTO t VALUES ($tag$x, (y)$tag$, 2)") == "INSERT INTO t VALUES (?)");
    assert!(flat("INSERT INTO t VALUES (now(), 'a,b')") == "INSERT INTO t VALUES (?)");
}

#[test]
fn test_values_unterminated_is_left_alone() {
    // A quote that never closes: better to keep the text than to guess.
    let s = "INSERT INTO t VALUES (1, 'oops";
    assert!(flat(s) == s);
}

#[test]
fn test_values_multiple_statements() {
    let s = "INSERT INTO a VALUES (1); INSERT INTO b VALUES (2,'x')";
    assert!(flat(s) == "INSERT INTO a VALUES (?); INSERT INTO b VALUES (?)");
}

#[test]
fn test_where_equality() {
    assert!(flat("SELECT * FROM t WHERE id = 42") == "SELECT * FROM t WHERE id = ?");
    assert!(flat("SELECT * FROM t WHERE name = 'bob'") == "SELECT * FROM t WHERE name = '?'");
    assert!(
        flat("SELECT * FROM t WHERE a = 1 AND b = 'x'")
            == "SELECT * FROM t WHERE a = ? AND b = '?'"
    );
}

#[test]
fn test_in_lists() {
    assert!(flat("SELECT * FROM t WHERE id IN (1,2,3)") == "SELECT * FROM t WHERE id IN (?)");
    // Subqueries are kept.
    let s = "SELECT * FROM t WHERE id IN (SELECT id FROM u)";
    assert!(flat(s) == s);
}

#[test]
fn test_function_arguments() {
    assert!(flat("SELECT lookup(17, 'x', $1)") == "SELECT lookup(?,?,$1)");
}

#[test]
fn test_update_set() {
    assert!(flat("UPDATE t SET name = 'bob' WHERE id = 3") == "UPDATE t SET name = '?' WHERE id = ?");
}

#[test]
fn test_timestamp_literal() {
    assert!(
        flat("DELETE FROM t WHERE seen = '2026-08-02 10:11:12.123456'")
            == "DELETE FROM t WHERE seen = '?'"
    );
}

#[test]
fn test_error_shapes() {
    assert!(
        flat("ERROR: invalid byte sequence for encoding \"UTF8\": 0xe28093")
            == "ERROR: invalid byte sequence for encoding \"UTF8\": 0x?"
    );
    assert!(flat("Failed on request of size 1048576") == "Failed on request of size ?");
    assert!(
        flat("DETAIL: Failing row contains (1, null, x).")
            == "DETAIL: Failing row contains (?)."
    );
    assert!(flat("SELECT ARRAY[1,2,3]") == "SELECT ARRAY[?]");
    assert!(
        flat("ERROR: syntax error at or near \"fromm\" at character 10")
            == "ERROR: syntax error at or near \"?\" at character ?"
    );
    assert!(
        flat("DETAIL: Key (id)=(17) already exists.") == "DETAIL: Key (id)=(?) already exists."
    );
}

#[test]
fn test_cursors() {
    assert!(flat("CLOSE cur_482") == "CLOSE ?");
    assert!(flat("FETCH 100 FROM c17") == "FETCH 100 FROM ?");
    assert!(
        flat("DECLARE \"p_9\" NO SCROLL CURSOR FOR SELECT 1")
            == "DECLARE ? NO SCROLL CURSOR FOR SELECT ?"
    );
}

#[test]
fn test_canonical_key_determinism() {
    // Statements differing only in handled literal kinds get equal keys.
    let variants = [
        "INSERT INTO log VALUES (1, 'a', '2026-08-01 00:00:00')",
        "INSERT INTO log VALUES (2, 'b', '2026-08-02 12:00:00'),(3, 'c', '2026-08-02 13:00:00')",
    ];
    let keys: Vec<String> = variants.iter().map(|v| flat(v)).collect();
    assert!(keys[0] == keys[1]);
}

#[test]
fn test_pretty() {
    let f = Flattener::new();
    assert!(
        f.pretty("ERROR: bad thing DETAIL: the detail HINT: the hint", false)
            == "ERROR: bad thing\nDETAIL: the detail\nHINT: the hint"
    );
    assert!(
        f.pretty("LOG: duration: 250.017 ms statement: select 1", true)
            == "DURATION: 250.017 ms\nSTATEMENT: select 1"
    );
    assert!(
        f.pretty("LOG: duration: 9.1 ms execute S_3: select 2", true)
            == "DURATION: 9.1 ms\nSTATEMENT: select 2"
    );
}
