/// Record filtering: per-file include/exclude rule sets, plus the body
/// squashing and the field extraction the typed report modes need.
///
/// A FilterSet is the compiled union of the global rules and one entry's
/// rules.  Compilation is memoized per distinct rule tuple, since many
/// entries usually share the same (often empty) rules.
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::rc::Rc;

pub struct FilterSet {
    include: Option<Regex>,
    exclude: Option<Regex>,
    exclude_prefix: Option<Regex>,
    exclude_non_parsed: Option<Regex>,
    duration: Regex,
    tempfile: Regex,
}

fn join_compile(what: &str, patterns: &[&String]) -> Result<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let alternation = patterns
        .iter()
        .map(|p| format!("(?:{})", p))
        .collect::<Vec<String>>()
        .join("|");
    Ok(Some(Regex::new(&alternation).with_context(|| {
        format!("Bad {what} filter regex '{alternation}'")
    })?))
}

impl FilterSet {
    pub fn compile(
        include: &[&String],
        exclude: &[&String],
        exclude_prefix: &[&String],
        exclude_non_parsed: &[&String],
    ) -> Result<FilterSet> {
        Ok(FilterSet {
            include: join_compile("include", include)?,
            exclude: join_compile("exclude", exclude)?,
            exclude_prefix: join_compile("exclude_prefix", exclude_prefix)?,
            exclude_non_parsed: join_compile("exclude_non_parsed", exclude_non_parsed)?,
            duration: Regex::new(r"duration: (\d+\.?\d*) ms").unwrap(),
            tempfile: Regex::new(r#"temporary file: .*?size (\d+)"#).unwrap(),
        })
    }

    /// The include/exclude decision for a closed record.  Forced records
    /// (pid "?") consult only the non-parsed exclusion.
    pub fn allows(&self, body: &str, prefix: &str, forced: bool) -> bool {
        if forced {
            return match self.exclude_non_parsed {
                Some(ref re) => !re.is_match(body),
                None => true,
            };
        }
        if let Some(ref re) = self.include {
            if !re.is_match(body) {
                return false;
            }
        }
        if let Some(ref re) = self.exclude {
            if re.is_match(body) {
                return false;
            }
        }
        if let Some(ref re) = self.exclude_prefix {
            if re.is_match(prefix) {
                return false;
            }
        }
        true
    }

    /// Milliseconds from a "duration: N ms" body, if present.
    pub fn duration_ms(&self, body: &str) -> Option<f64> {
        self.duration
            .captures(body)
            .and_then(|c| c.get(1).unwrap().as_str().parse::<f64>().ok())
    }

    /// Byte size from a "temporary file: ... size N" body, if present.
    pub fn tempfile_size(&self, body: &str) -> Option<u64> {
        self.tempfile
            .captures(body)
            .and_then(|c| c.get(1).unwrap().as_str().parse::<u64>().ok())
    }
}

/// In temp-file mode the statement is the interesting part of the body.
pub fn statement_tail(body: &str) -> Option<&str> {
    body.find("STATEMENT:")
        .map(|ix| body[ix + "STATEMENT:".len()..].trim_start())
}

/// Flatten a record's segments into the single line the filters and the
/// canonicalizer operate on: segments joined by single spaces, whitespace
/// runs collapsed, syslog tab encodings removed.
pub fn squash(segments: &[String]) -> String {
    let joined = segments.join(" ").replace("#011", " ").replace('\n', "\\n");
    let mut out = String::with_capacity(joined.len());
    let mut in_space = true; // leading whitespace is stripped
    for c in joined.chars() {
        if c == ' ' || c == '\t' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Run-scoped memoization of compiled filter sets.
pub struct FilterCache {
    sets: HashMap<String, Rc<FilterSet>>,
}

impl FilterCache {
    pub fn new() -> FilterCache {
        FilterCache {
            sets: HashMap::new(),
        }
    }

    pub fn get(
        &mut self,
        include: &[&String],
        exclude: &[&String],
        exclude_prefix: &[&String],
        exclude_non_parsed: &[&String],
    ) -> Result<Rc<FilterSet>> {
        let mut key = String::new();
        for group in [include, exclude, exclude_prefix, exclude_non_parsed] {
            for p in group {
                key.push_str(p);
                key.push('\x01');
            }
            key.push('\x02');
        }
        if let Some(set) = self.sets.get(&key) {
            return Ok(set.clone());
        }
        let set = Rc::new(FilterSet::compile(
            include,
            exclude,
            exclude_prefix,
            exclude_non_parsed,
        )?);
        self.sets.insert(key, set.clone());
        Ok(set)
    }
}

#[cfg(test)]
fn set_of(include: &[&str], exclude: &[&str]) -> FilterSet {
    let inc: Vec<String> = include.iter().map(|s| s.to_string()).collect();
    let exc: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
    FilterSet::compile(
        &inc.iter().collect::<Vec<&String>>(),
        &exc.iter().collect::<Vec<&String>>(),
        &[],
        &[],
    )
    .unwrap()
}

#[test]
fn test_include_exclude() {
    let f = set_of(&[], &[]);
    assert!(f.allows("anything", "", false));

    let f = set_of(&["ERROR", "FATAL"], &[]);
    assert!(f.allows("ERROR:  bad", "", false));
    assert!(!f.allows("LOG:  fine", "", false));

    let f = set_of(&[], &["checkpoint"]);
    assert!(!f.allows("LOG:  checkpoint starting", "", false));
    assert!(f.allows("LOG:  other", "", false));
}

#[test]
fn test_exclude_prefix_and_forced() {
    let inc = vec!["ERROR".to_string()];
    let xp = vec![r"\[999\]".to_string()];
    let xnp = vec!["harmless".to_string()];
    let f = FilterSet::compile(
        &inc.iter().collect::<Vec<&String>>(),
        &[],
        &xp.iter().collect::<Vec<&String>>(),
        &xnp.iter().collect::<Vec<&String>>(),
    )
    .unwrap();
    assert!(!f.allows("ERROR:  x", "2026-01-01 [999] ", false));
    assert!(f.allows("ERROR:  x", "2026-01-01 [1] ", false));
    // Forced records ignore include/exclude/exclude_prefix.
    assert!(f.allows("no error keyword here", "", true));
    assert!(!f.allows("a harmless kernel note", "", true));
}

#[test]
fn test_squash() {
    let segs = vec![
        "  LOG:  statement: select *".to_string(),
        "\tfrom t".to_string(),
        "where a = 1  ".to_string(),
    ];
    assert!(squash(&segs) == "LOG: statement: select * from t where a = 1");
    let segs = vec!["a#011b".to_string()];
    assert!(squash(&segs) == "a b");
}

#[test]
fn test_extractors() {
    let f = set_of(&[], &[]);
    assert!(f.duration_ms("LOG: duration: 250.017 ms statement: select 1") == Some(250.017));
    assert!(f.duration_ms("LOG: no duration here").is_none());
    assert!(
        f.tempfile_size("LOG: temporary file: path \"base/pgsql_tmp/pgsql_tmp123.4\", size 16384")
            == Some(16384)
    );
    assert!(f.tempfile_size("LOG: other").is_none());
}

#[test]
fn test_statement_tail() {
    assert!(
        statement_tail("LOG: temporary file: path \"x\", size 5 STATEMENT:  select * from t")
            == Some("select * from t")
    );
    assert!(statement_tail("no statement").is_none());
}

#[test]
fn test_cache_memoizes() {
    let mut cache = FilterCache::new();
    let a = vec!["x".to_string()];
    let refs: Vec<&String> = a.iter().collect();
    let s1 = cache.get(&refs, &[], &[], &[]).unwrap();
    let s2 = cache.get(&refs, &[], &[], &[]).unwrap();
    assert!(Rc::ptr_eq(&s1, &s2));
}
