/// Compile a server log_line_prefix format string into the matchers the line
/// reader needs.
///
/// The format string mixes literal text with percent specifiers (%t %m %p %c
/// %l %u %d %r %h %a %e %q and friends).  From one format we derive:
///
///  - a *strict* matcher that recognizes the head of a fresh log record and
///    captures the whole prefix text, the timestamp (from %t or %m) and the
///    backend pid (from %p, or %c when no %p is present).  When the format
///    carries no timestamp or no pid an empty capture is synthesized so that
///    callers always see the same shape.
///
///  - a *cluster* matcher for cluster-wide notices: these are printed with
///    the session-only fields (%u %d %r %h %i %c %l %s %v %x) left empty, so
///    those specifiers are dropped from the pattern entirely.
///
///  - a *timestamp-only* matcher covering the literal text up to and
///    including the first specifier; the reader uses it to recognize stray
///    "LOG:" lines adjacent to continuations that should be dropped.
///
/// For syslog-framed logs a fixed framing matcher captures the syslog
/// timestamp, host, process name, pid and the `[N-M]` sequence pair; the
/// grammar matchers then apply to the text after the framing.
///
/// Compilation is a pure function of (format, syslog flag) and is cheap
/// enough to redo per run.  Literal regex metacharacters in the format are
/// escaped as they are scanned, so a hostile format string cannot corrupt
/// the generated pattern.
use anyhow::{Context, Result};
use regex::Regex;

// %t is "2026-08-02 10:11:12 UTC", %m adds fractional seconds.  One pattern
// covers both; the zone abbreviation is optional.
const TS_PATTERN: &str = r"\d{4}-\d\d-\d\d \d\d:\d\d:\d\d(?:\.\d+)?(?: [A-Za-z0-9+\-]+)?";

const SYSLOG_PATTERN: &str = r"^(?P<slhead>\w{3}\s+\d+ \d\d:\d\d:\d\d \S+ [\w\/\.\-]+\[(?P<slpid>\d+)\]:\s+\[(?P<seq>\d+)-(?P<cseq>\d+)\]\s*)";

pub struct PrefixSet {
    strict: Regex,
    cluster: Regex,
    tsonly: Regex,
    syslog: Option<Regex>,
    sqlstate: Option<Regex>,
}

/// One strict match: the verbatim prefix text, the timestamp and pid texts
/// (possibly empty), and the message remainder.  Under syslog framing `seq`
/// carries the `[N-M]` pair.

#[derive(Debug)]
pub struct StrictMatch<'a> {
    pub prefix: &'a str,
    pub ts: &'a str,
    pub pid: &'a str,
    pub rest: &'a str,
    pub seq: Option<(u64, u64)>,
}

impl PrefixSet {
    pub fn compile(format: &str, syslog: bool, sqlstate_mode: bool) -> Result<PrefixSet> {
        let strict_src = format!("^{}(?P<rest>.*)", build_strict(format));
        let cluster_src = format!("^{}", build_cluster(format));
        let tsonly_src = format!("^{}", build_tsonly(format));
        let strict = Regex::new(&strict_src)
            .with_context(|| format!("Bad log line prefix '{format}'"))?;
        let cluster = Regex::new(&cluster_src)
            .with_context(|| format!("Bad log line prefix '{format}'"))?;
        let tsonly = Regex::new(&tsonly_src)
            .with_context(|| format!("Bad log line prefix '{format}'"))?;
        let syslog = if syslog {
            Some(Regex::new(SYSLOG_PATTERN).unwrap())
        } else {
            None
        };
        let sqlstate = if sqlstate_mode && format.contains("%e") {
            Some(Regex::new(r"^[0-9A-Z]{5}:?\s*").unwrap())
        } else {
            None
        };
        Ok(PrefixSet {
            strict,
            cluster,
            tsonly,
            syslog,
            sqlstate,
        })
    }

    /// Match the head of a fresh record.  For syslog input the framing is
    /// consumed first and the grammar applies to the text after it; a
    /// framing match whose payload does not parse yields None.
    pub fn match_strict<'a>(&self, line: &'a str) -> Option<StrictMatch<'a>> {
        if let Some(ref framing) = self.syslog {
            let caps = framing.captures(line)?;
            let head = caps.name("slhead").unwrap();
            let slpid = caps.name("slpid").unwrap().as_str();
            let seq = (
                caps.name("seq").unwrap().as_str().parse::<u64>().ok()?,
                caps.name("cseq").unwrap().as_str().parse::<u64>().ok()?,
            );
            let payload = &line[head.end()..];
            let inner = self.strict.captures(payload)?;
            let pid = inner.name("pid").map_or("", |m| m.as_str());
            Some(StrictMatch {
                prefix: &line[..head.end() + inner.name("prefix").unwrap().end()],
                ts: inner.name("ts").map_or("", |m| m.as_str()),
                pid: if pid.is_empty() { slpid } else { pid },
                rest: &payload[inner.name("rest").unwrap().start()..],
                seq: Some(seq),
            })
        } else {
            let caps = self.strict.captures(line)?;
            Some(StrictMatch {
                prefix: caps.name("prefix").unwrap().as_str(),
                ts: caps.name("ts").map_or("", |m| m.as_str()),
                pid: caps.name("pid").map_or("", |m| m.as_str()),
                rest: caps.name("rest").unwrap().as_str(),
                seq: None,
            })
        }
    }

    /// Syslog framing alone, for continuation lines that carry no grammar
    /// payload.  Returns (pid, (N, M), framing head, remainder).
    pub fn match_syslog<'a>(
        &self,
        line: &'a str,
    ) -> Option<(&'a str, (u64, u64), &'a str, &'a str)> {
        let framing = self.syslog.as_ref()?;
        let caps = framing.captures(line)?;
        let head = caps.name("slhead").unwrap();
        let seq = (
            caps.name("seq").unwrap().as_str().parse::<u64>().ok()?,
            caps.name("cseq").unwrap().as_str().parse::<u64>().ok()?,
        );
        Some((
            caps.name("slpid").unwrap().as_str(),
            seq,
            head.as_str(),
            &line[head.end()..],
        ))
    }

    pub fn match_cluster(&self, line: &str) -> bool {
        self.cluster.is_match(line)
    }

    /// True if the line opens with the literal-plus-first-specifier head and
    /// the remainder is a bare "LOG:" notice.
    pub fn match_tsonly_log(&self, line: &str) -> bool {
        if let Some(m) = self.tsonly.find(line) {
            line[m.end()..].trim_start().starts_with("LOG:")
        } else {
            false
        }
    }

    /// Strip a leading sqlstate token from a record body, when enabled.
    pub fn strip_sqlstate<'a>(&self, rest: &'a str) -> &'a str {
        if let Some(ref re) = self.sqlstate {
            if let Some(m) = re.find(rest) {
                return &rest[m.end()..];
            }
        }
        rest
    }
}

// The non-capturing shape of each specifier.  The shapes are deliberately
// loose: the prefix only has to be recognized, not validated.

fn shape_of(spec: char) -> Option<&'static str> {
    match spec {
        't' | 'm' | 's' => Some(TS_PATTERN),
        'p' | 'l' | 'x' => Some(r"\d+"),
        'c' => Some(r"[0-9a-f]+\.[0-9a-f]+"),
        'u' | 'd' => Some(r"[\[\]\w\.\-]*"),
        'r' | 'h' => Some(r"\S*"),
        'a' | 'i' => Some(r".*?"),
        'e' => Some(r"[0-9A-Z]{5}"),
        'v' => Some(r"[0-9a-f\/]*"),
        _ => None,
    }
}

fn escape_into(c: char, out: &mut String) {
    if "\\.+*?()|[]{}^$#&-~".contains(c) {
        out.push('\\');
    }
    out.push(c);
}

// Scan the format once, handing each piece to `emit`.  Literal characters
// arrive as Piece::Lit, specifiers as Piece::Spec, and %q as Piece::Stop.

enum Piece {
    Lit(char),
    Spec(char),
    Stop,
}

fn scan(format: &str, emit: &mut dyn FnMut(Piece)) {
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            emit(Piece::Lit(c));
            continue;
        }
        match chars.next() {
            None => emit(Piece::Lit('%')),
            Some('%') => emit(Piece::Lit('%')),
            Some('q') => emit(Piece::Stop),
            Some(s) => emit(Piece::Spec(s)),
        }
    }
}

// The strict pattern captures ts and pid by name inside the prefix group.
// Substitution order is fixed by the scan itself: each specifier is expanded
// exactly where it stands, so a later expansion can never touch an earlier
// capture.  Everything after %q is made optional, since server processes
// without a session print nothing there.

fn build_strict(format: &str) -> String {
    let prefer_p = format.contains("%p");
    let mut head = String::new();
    let mut tail = String::new();
    let mut stopped = false;
    let mut have_ts = false;
    let mut have_pid = false;
    scan(format, &mut |piece| {
        let out = if stopped { &mut tail } else { &mut head };
        match piece {
            Piece::Lit(c) => escape_into(c, out),
            Piece::Stop => stopped = true,
            Piece::Spec(s) => match s {
                't' | 'm' if !have_ts => {
                    have_ts = true;
                    out.push_str(&format!("(?P<ts>{})", TS_PATTERN));
                }
                'p' if !have_pid => {
                    have_pid = true;
                    out.push_str(r"(?P<pid>\d+)");
                }
                'c' if !have_pid && !prefer_p => {
                    have_pid = true;
                    out.push_str(r"(?P<pid>[0-9a-f]+\.[0-9a-f]+)");
                }
                _ => {
                    if let Some(shape) = shape_of(s) {
                        out.push_str(&format!("(?:{})", shape));
                    } else {
                        escape_into('%', out);
                        escape_into(s, out);
                    }
                }
            },
        }
    });
    let mut body = String::new();
    if !have_ts {
        body.push_str("(?P<ts>)");
    }
    if !have_pid {
        body.push_str("(?P<pid>)");
    }
    body.push_str(&head);
    if stopped && !tail.is_empty() {
        body.push_str(&format!("(?:{})?", tail));
    }
    format!("(?P<prefix>{})", body)
}

// Cluster-wide notices leave the session fields empty, so those specifiers
// vanish from the pattern; the rest expand as non-capturing shapes.

fn build_cluster(format: &str) -> String {
    let mut head = String::new();
    let mut tail = String::new();
    let mut stopped = false;
    scan(format, &mut |piece| {
        let out = if stopped { &mut tail } else { &mut head };
        match piece {
            Piece::Lit(c) => escape_into(c, out),
            Piece::Stop => stopped = true,
            Piece::Spec(s) => match s {
                'u' | 'd' | 'r' | 'h' | 'i' | 'c' | 'l' | 's' | 'v' | 'x' => {}
                _ => {
                    if let Some(shape) = shape_of(s) {
                        out.push_str(&format!("(?:{})", shape));
                    } else {
                        escape_into('%', out);
                        escape_into(s, out);
                    }
                }
            },
        }
    });
    if stopped && !tail.is_empty() {
        format!("{}(?:{})?", head, tail)
    } else {
        head
    }
}

// Literal text up to and including the first specifier; only a leading
// timestamp specifier survives as a pattern.

fn build_tsonly(format: &str) -> String {
    let mut out = String::new();
    let mut done = false;
    scan(format, &mut |piece| {
        if done {
            return;
        }
        match piece {
            Piece::Lit(c) => escape_into(c, &mut out),
            Piece::Stop => done = true,
            Piece::Spec(s) => {
                if s == 't' || s == 'm' {
                    out.push_str(&format!("(?:{})", TS_PATTERN));
                }
                done = true;
            }
        }
    });
    out
}

#[test]
fn test_strict_basic() {
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let m = set
        .match_strict("2026-08-02 10:11:12 UTC [4711] LOG:  statement: select 1")
        .unwrap();
    assert!(m.prefix == "2026-08-02 10:11:12 UTC [4711] ");
    assert!(m.ts == "2026-08-02 10:11:12 UTC");
    assert!(m.pid == "4711");
    assert!(m.rest == "LOG:  statement: select 1");
    assert!(m.seq.is_none());
}

#[test]
fn test_strict_synthesized_captures() {
    // No timestamp in the format: the ts capture exists and is empty.
    let set = PrefixSet::compile("[%p]: ", false, false).unwrap();
    let m = set.match_strict("[99]: ERROR:  oops").unwrap();
    assert!(m.ts == "");
    assert!(m.pid == "99");
    assert!(m.rest == "ERROR:  oops");

    // No pid either: both captures are empty but present.
    let set = PrefixSet::compile("db: ", false, false).unwrap();
    let m = set.match_strict("db: LOG:  checkpoint starting").unwrap();
    assert!(m.ts == "" && m.pid == "");
    assert!(m.rest == "LOG:  checkpoint starting");
}

#[test]
fn test_strict_session_id_as_pid() {
    let set = PrefixSet::compile("%m [%c] ", false, false).unwrap();
    let m = set
        .match_strict("2026-08-02 10:11:12.345 UTC [66a1b2c3.1a2b] LOG:  hi")
        .unwrap();
    assert!(m.pid == "66a1b2c3.1a2b");
    // %p wins over %c when both are present.
    let set = PrefixSet::compile("%m [%c] %p ", false, false).unwrap();
    let m = set
        .match_strict("2026-08-02 10:11:12.345 UTC [66a1b2c3.1a2b] 4711 LOG:  hi")
        .unwrap();
    assert!(m.pid == "4711");
}

#[test]
fn test_strict_user_db_fields() {
    let set = PrefixSet::compile("%t [%p] %u@%d ", false, false).unwrap();
    let m = set
        .match_strict("2026-08-02 10:11:12 UTC [17] alice@shop LOG:  ready")
        .unwrap();
    assert!(m.pid == "17");
    assert!(m.rest == "LOG:  ready");
    // Non-session lines print the fields empty; the shapes accept that.
    let m = set
        .match_strict("2026-08-02 10:11:12 UTC [17] @ LOG:  ready")
        .unwrap();
    assert!(m.rest == "LOG:  ready");
}

#[test]
fn test_stop_specifier_makes_tail_optional() {
    let set = PrefixSet::compile("%t %q[%p] ", false, false).unwrap();
    // Session process: full prefix.
    let m = set
        .match_strict("2026-08-02 10:11:12 UTC [4711] LOG:  x")
        .unwrap();
    assert!(m.pid == "4711");
    // Background process: everything after %q is absent.
    let m = set.match_strict("2026-08-02 10:11:12 UTC LOG:  x").unwrap();
    assert!(m.pid == "");
    assert!(m.rest.starts_with("LOG:"));
}

#[test]
fn test_cluster_matcher() {
    let set = PrefixSet::compile("%t [%p]: [%l] user=%u,db=%d ", false, false).unwrap();
    // Cluster notices drop the session fields but keep ts and pid shapes.
    assert!(set.match_cluster("2026-08-02 10:11:12 UTC [8]: [] user=,db= LOG:  shutting down"));
    assert!(!set.match_cluster("some random line"));
}

#[test]
fn test_tsonly_matcher() {
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    assert!(set.match_tsonly_log("2026-08-02 10:11:12 UTC LOG:  noise"));
    assert!(!set.match_tsonly_log("2026-08-02 10:11:12 UTC ERROR:  real"));
    assert!(!set.match_tsonly_log("plain text"));
}

#[test]
fn test_syslog_framing() {
    let set = PrefixSet::compile("%t [%p] ", true, false).unwrap();
    let m = set
        .match_strict("Aug  2 10:11:12 db1 postgres[4711]: [7-1] 2026-08-02 10:11:12 UTC [4711] LOG:  statement: select 1")
        .unwrap();
    assert!(m.pid == "4711");
    assert!(m.seq == Some((7, 1)));
    assert!(m.rest == "LOG:  statement: select 1");

    // A continuation line carries framing but no grammar payload; syslog
    // transcribes the tab as #011.
    assert!(set
        .match_strict("Aug  2 10:11:12 db1 postgres[4711]: [7-2] #011from t")
        .is_none());
    let (pid, seq, head, rest) = set
        .match_syslog("Aug  2 10:11:12 db1 postgres[4711]: [7-2] #011from t")
        .unwrap();
    assert!(pid == "4711");
    assert!(seq == (7, 2));
    assert!(head.ends_with("[7-2] "));
    assert!(rest == "#011from t");
}

#[test]
fn test_sqlstate_strip() {
    let set = PrefixSet::compile("%t [%p] %e ", false, true).unwrap();
    assert!(set.strip_sqlstate("42P01: relation does not exist") == "relation does not exist");
    assert!(set.strip_sqlstate("plain text") == "plain text");
    // Not enabled without %e in the format.
    let set = PrefixSet::compile("%t [%p] ", false, true).unwrap();
    assert!(set.strip_sqlstate("42P01: x") == "42P01: x");
}
