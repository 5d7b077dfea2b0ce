/// Read one log file from a saved byte offset and reassemble physical lines
/// into logical records.
///
/// Offset handling on open:
///
///  - an offset beyond the end of the file means the file was rotated or
///    truncated since the last run; reading restarts at the top.
///
///  - a gap larger than `maxsize` is skipped (unless the offset was given
///    explicitly on the command line), and the skip is reported so nobody
///    mistakes a capped run for a quiet day.
///
///  - reading starts ten bytes before the saved offset and discards up to
///    the first newline, which heals a previous run that stopped mid-line.
///
/// Records are assembled per pid: a prefixed line opens a record, known
/// continuation keywords (STATEMENT, DETAIL, ...) and tab-indented lines
/// extend it, and the record is emitted when the next prefixed line for the
/// same pid arrives or at end of file.  Lines that match neither the prefix
/// nor a continuation become "forced" records with the sentinel pid "?";
/// OS errors spliced into a log still deserve a report.
///
/// The new offset to persist is the position after the last complete line
/// read.  A final read with no newline gets one sleep-and-retry to let the
/// writer finish, then the partial line is processed and reading stops; the
/// partial bytes stay unacknowledged so the next run sees them again.
use crate::confile::LogKind;
use crate::prefix::PrefixSet;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::io::BufRead;
use ustr::Ustr;

const BACKSTEP: u64 = 10;
const COUNT_BLOCK: usize = 65536;
const TRUNCATION_NAP_MS: u64 = 500;

const CONTINUATION_KEYWORDS: [&str; 5] = ["STATEMENT:", "DETAIL:", "HINT:", "CONTEXT:", "QUERY:"];

#[derive(Debug)]
pub struct LogRecord {
    pub pid: String,
    pub prefix: String,
    pub timestamp: String,
    pub segments: Vec<String>,
    pub source_file: Ustr,
    pub source_line: u64,
    pub forced: bool,
}

pub struct ReadOutcome {
    pub records: Vec<LogRecord>,
    pub new_offset: u64,
    pub too_large: Option<String>,
}

pub struct ReadOptions {
    pub offset: u64,
    pub offset_override: bool,
    pub maxsize: u64,
    pub rewind: u64,
    pub find_line_number: bool,
    pub skip_non_parsed: bool,
    // Off means the file is not a database log at all: every line is its
    // own record and the prefix machinery stays out of the way.
    pub pgmode: bool,
}

/// Read one file.  Ok(None) means the file is missing or not a regular
/// file; the caller decides how loudly to complain.
pub fn read_file(
    path: &str,
    prefixes: &PrefixSet,
    kind: LogKind,
    opts: &ReadOptions,
) -> Result<Option<ReadOutcome>> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Ok(None),
    };
    if !meta.is_file() {
        return Ok(None);
    }
    let size = meta.len();

    let mut offset = opts.offset;
    if offset > size {
        // Rotated or truncated behind our back; the whole file is new.
        offset = 0;
    }
    let mut too_large = None;
    if !opts.offset_override && opts.maxsize > 0 && size - offset > opts.maxsize {
        too_large = Some(format!(
            "File '{}' is too large: skipping {} bytes to stay within {}",
            path,
            size - offset - opts.maxsize,
            opts.maxsize
        ));
        offset = size - opts.maxsize;
    }
    offset = offset.saturating_sub(opts.rewind);

    let outcome = match kind {
        LogKind::Csv => read_csv_file(path, offset, opts)?,
        LogKind::Plain | LogKind::Syslog => read_plain_file(path, offset, prefixes, opts)?,
    };
    Ok(Some(ReadOutcome {
        too_large,
        ..outcome
    }))
}

fn read_plain_file(
    path: &str,
    offset: u64,
    prefixes: &PrefixSet,
    opts: &ReadOptions,
) -> Result<ReadOutcome> {
    let file = File::open(path).with_context(|| format!("Cannot open '{path}'"))?;
    let mut reader = BufReader::new(file);

    let mut lineno = if opts.find_line_number {
        count_newlines(path, offset)? + 1
    } else {
        1
    };

    let mut pos;
    let back = offset.saturating_sub(BACKSTEP);
    if back > 0 {
        reader.seek(SeekFrom::Start(back))?;
        // Discard the partial line we likely landed in.
        let mut junk = vec![];
        let n = reader.read_until(b'\n', &mut junk)?;
        pos = back + n as u64;
    } else {
        pos = 0;
    }
    // Discard whole lines already acknowledged by a previous run.  When the
    // saved offset sits on a line boundary this loop does nothing; when it
    // sits mid-line the straddling line is consumed whole, which is the
    // point of the backstep.
    {
        let mut junk = vec![];
        while pos < offset {
            junk.clear();
            let n = reader.read_until(b'\n', &mut junk)?;
            if n == 0 {
                break;
            }
            pos += n as u64;
        }
    }

    let source = Ustr::from(path);
    let mut assembler = Assembler::new(prefixes, opts.skip_non_parsed, opts.pgmode, source);
    let mut last_good = pos;
    let mut buf = vec![];
    let mut retried = false;
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        pos += n as u64;
        if buf.ends_with(b"\n") {
            buf.pop();
            let line = String::from_utf8_lossy(&buf);
            assembler.line(&line, lineno);
            lineno += 1;
            last_good = pos;
        } else if !retried {
            // The writer may be mid-line; give it one chance to finish.
            retried = true;
            pos -= n as u64;
            reader.seek_relative(-(n as i64))?;
            std::thread::sleep(std::time::Duration::from_millis(TRUNCATION_NAP_MS));
        } else {
            // Still truncated: take what is there, but do not acknowledge
            // the bytes, and stop reading this file.
            let line = String::from_utf8_lossy(&buf);
            assembler.line(&line, lineno);
            break;
        }
    }
    let records = assembler.finish();
    Ok(ReadOutcome {
        records,
        new_offset: last_good,
        too_large: None,
    })
}

// Count newlines in [0, offset) so the report can cite approximate line
// numbers.  Block reads; the files can be large.

fn count_newlines(path: &str, offset: u64) -> Result<u64> {
    if offset == 0 {
        return Ok(0);
    }
    let mut file = File::open(path).with_context(|| format!("Cannot open '{path}'"))?;
    let mut remaining = offset;
    let mut buf = [0u8; COUNT_BLOCK];
    let mut count = 0u64;
    while remaining > 0 {
        let want = remaining.min(COUNT_BLOCK as u64) as usize;
        let got = file.read(&mut buf[..want])?;
        if got == 0 {
            break;
        }
        count += buf[..got].iter().filter(|&&b| b == b'\n').count() as u64;
        remaining -= got as u64;
    }
    Ok(count)
}

// Per-pid record assembly.  Every record is stamped with the arrival order
// of its first line when it opens; the output is sorted on that stamp, so
// records come out in first-line order no matter when they close.

struct Assembler<'a> {
    prefixes: &'a PrefixSet,
    skip_non_parsed: bool,
    pgmode: bool,
    source: Ustr,
    open: HashMap<String, (u64, LogRecord)>,
    next_stamp: u64,
    last_pid: Option<String>,
    last_seq: HashMap<String, u64>,
    out: Vec<(u64, LogRecord)>,
}

impl<'a> Assembler<'a> {
    fn new(
        prefixes: &'a PrefixSet,
        skip_non_parsed: bool,
        pgmode: bool,
        source: Ustr,
    ) -> Assembler<'a> {
        Assembler {
            prefixes,
            skip_non_parsed,
            pgmode,
            source,
            open: HashMap::new(),
            next_stamp: 0,
            last_pid: None,
            last_seq: HashMap::new(),
            out: vec![],
        }
    }

    fn stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    fn line(&mut self, line: &str, lineno: u64) {
        if !self.pgmode {
            // Not a database log: the line is the record.
            let stamp = self.stamp();
            self.out.push((
                stamp,
                LogRecord {
                    pid: "?".to_string(),
                    prefix: "".to_string(),
                    timestamp: "".to_string(),
                    segments: vec![line.to_string()],
                    source_file: self.source,
                    source_line: lineno,
                    forced: false,
                },
            ));
            return;
        }
        if let Some(m) = self.prefixes.match_strict(line) {
            let rest = self.prefixes.strip_sqlstate(m.rest).to_string();
            let pid = m.pid.to_string();
            match m.seq {
                Some((n, _)) => {
                    // Syslog: the logical-record counter decides.
                    if self.open.contains_key(&pid)
                        && self.last_seq.get(&pid) == Some(&n)
                    {
                        self.append(&pid, rest);
                    } else {
                        self.emit(&pid);
                        self.start(pid.clone(), m.prefix.to_string(), m.ts.to_string(), rest, lineno);
                    }
                    self.last_seq.insert(pid.clone(), n);
                }
                None => {
                    if self.open.contains_key(&pid)
                        && is_continuation_keyword(&rest)
                    {
                        self.append(&pid, rest);
                    } else {
                        self.emit(&pid);
                        self.start(pid.clone(), m.prefix.to_string(), m.ts.to_string(), rest, lineno);
                    }
                }
            }
            self.last_pid = Some(pid);
            return;
        }
        if self.prefixes.match_cluster(line) {
            return;
        }
        if let Some((pid, (n, _), head, rest)) = self.prefixes.match_syslog(line) {
            // Framing without a parseable payload: a continuation of the
            // same logical record, or the start of an unparsed one.
            let pid = pid.to_string();
            if self.open.contains_key(&pid) && self.last_seq.get(&pid) == Some(&n) {
                self.append(&pid, rest.to_string());
            } else {
                self.emit(&pid);
                self.start(pid.clone(), head.to_string(), "".to_string(), rest.to_string(), lineno);
            }
            self.last_seq.insert(pid.clone(), n);
            self.last_pid = Some(pid);
            return;
        }
        let Some(last_pid) = self.last_pid.clone() else {
            return;
        };
        if let Some(stripped) = line.strip_prefix('\t') {
            self.append(&last_pid, stripped.to_string());
            return;
        }
        if self.prefixes.match_tsonly_log(line) {
            return;
        }
        if !self.skip_non_parsed {
            let stamp = self.stamp();
            self.out.push((
                stamp,
                LogRecord {
                    pid: "?".to_string(),
                    prefix: "".to_string(),
                    timestamp: "".to_string(),
                    segments: vec![line.to_string()],
                    source_file: self.source,
                    source_line: lineno,
                    forced: true,
                },
            ));
        }
    }

    fn start(&mut self, pid: String, prefix: String, timestamp: String, first: String, lineno: u64) {
        let stamp = self.stamp();
        self.open.insert(
            pid.clone(),
            (
                stamp,
                LogRecord {
                    pid,
                    prefix,
                    timestamp,
                    segments: vec![first],
                    source_file: self.source,
                    source_line: lineno,
                    forced: false,
                },
            ),
        );
    }

    fn append(&mut self, pid: &str, segment: String) {
        if let Some((_, rec)) = self.open.get_mut(pid) {
            rec.segments.push(segment);
        }
    }

    fn emit(&mut self, pid: &str) {
        if let Some((stamp, rec)) = self.open.remove(pid) {
            self.out.push((stamp, rec));
        }
    }

    fn finish(mut self) -> Vec<LogRecord> {
        for (_, (stamp, rec)) in self.open.drain() {
            self.out.push((stamp, rec));
        }
        self.out.sort_by_key(|(stamp, _)| *stamp);
        self.out.into_iter().map(|(_, rec)| rec).collect()
    }
}

fn is_continuation_keyword(rest: &str) -> bool {
    let t = rest.trim_start();
    CONTINUATION_KEYWORDS.iter().any(|k| t.starts_with(k))
}

// CSV logs carry one complete record per row; there is nothing to
// reassemble.  The interesting columns are the timestamp, pid, severity,
// message, context and statement.

fn read_csv_file(path: &str, offset: u64, opts: &ReadOptions) -> Result<ReadOutcome> {
    let file = File::open(path).with_context(|| format!("Cannot open '{path}'"))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    if offset > 0 {
        let mut pos = csv::Position::new();
        pos.set_byte(offset);
        rdr.seek(pos)
            .with_context(|| format!("Cannot seek to {offset} in '{path}'"))?;
    }
    let start_line = if opts.find_line_number {
        count_newlines(path, offset)? + 1
    } else {
        1
    };

    let source = Ustr::from(path);
    let mut records = vec![];
    let mut lineno = start_line;
    let mut new_offset = offset;
    let mut row = csv::StringRecord::new();
    while rdr
        .read_record(&mut row)
        .with_context(|| format!("CSV log '{path}' cannot be parsed"))?
    {
        if row.len() < 14 {
            lineno += 1;
            continue;
        }
        let ts = row.get(0).unwrap_or("");
        let pid = row.get(3).unwrap_or("");
        let severity = row.get(11).unwrap_or("");
        let message = row.get(13).unwrap_or("");
        let context = row.get(18).unwrap_or("");
        let statement = row.get(19).unwrap_or("");
        let mut body = format!("{}:  {}", severity, message);
        if !context.is_empty() {
            body.push_str(&format!(" CONTEXT: {} ", context));
        }
        if !statement.is_empty() {
            body.push_str(&format!("STATEMENT:  {}", statement));
        }
        records.push(LogRecord {
            pid: pid.to_string(),
            prefix: format!("{} [{}]", ts, pid),
            timestamp: ts.to_string(),
            segments: vec![body],
            source_file: source,
            source_line: lineno,
            forced: false,
        });
        lineno += 1;
        new_offset = rdr.position().byte();
    }
    Ok(ReadOutcome {
        records,
        new_offset,
        too_large: None,
    })
}

#[cfg(test)]
fn tmppath(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("taillog_reader_{}_{}", tag, std::process::id()))
}

#[cfg(test)]
fn opts_at(offset: u64) -> ReadOptions {
    ReadOptions {
        offset,
        offset_override: false,
        maxsize: 0,
        rewind: 0,
        find_line_number: true,
        skip_non_parsed: false,
        pgmode: true,
    }
}

#[cfg(test)]
fn plain_opts_at(offset: u64) -> ReadOptions {
    ReadOptions {
        pgmode: false,
        ..opts_at(offset)
    }
}

#[test]
fn test_fresh_plain_file() {
    let p = tmppath("fresh");
    fs::write(&p, "A1\nA2\n").unwrap();
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &plain_opts_at(0))
        .unwrap()
        .unwrap();
    // In plain mode every line is its own record.
    assert!(out.records.len() == 2);
    assert!(!out.records[0].forced && out.records[0].pid == "?");
    assert!(out.records[0].segments == vec!["A1"]);
    assert!(out.records[1].segments == vec!["A2"]);
    assert!(out.records[0].source_line == 1);
    assert!(out.records[1].source_line == 2);
    assert!(out.new_offset == fs::metadata(&p).unwrap().len());
    let _ = fs::remove_file(&p);
}

#[test]
fn test_incremental_read() {
    use std::io::Write;
    let p = tmppath("incr");
    fs::write(&p, "A1\nA2\n").unwrap();
    let first_size = fs::metadata(&p).unwrap().len();
    let mut f = fs::OpenOptions::new().append(true).open(&p).unwrap();
    f.write_all(b"A3\n").unwrap();
    drop(f);
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &plain_opts_at(first_size))
        .unwrap()
        .unwrap();
    assert!(out.records.len() == 1);
    assert!(out.records[0].segments == vec!["A3"]);
    assert!(out.records[0].source_line == 3);
    assert!(out.new_offset == first_size + 3);
    let _ = fs::remove_file(&p);
}

#[test]
fn test_rotation_resets_to_zero() {
    let p = tmppath("rot");
    fs::write(&p, "B1\n").unwrap();
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    // Saved offset larger than the file: the file was rotated.
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &plain_opts_at(100000))
        .unwrap()
        .unwrap();
    assert!(out.records.len() == 1);
    assert!(out.records[0].segments == vec!["B1"]);
    assert!(out.new_offset == 3);
    let _ = fs::remove_file(&p);
}

#[test]
fn test_backstep_heals_partial_offset() {
    let p = tmppath("backstep");
    fs::write(&p, "first line here\nsecond\n").unwrap();
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    // An offset pointing into the middle of the first line: the rest of
    // that line is discarded, not treated as a record.
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &plain_opts_at(12))
        .unwrap()
        .unwrap();
    assert!(out.records.len() == 1);
    assert!(out.records[0].segments == vec!["second"]);
    assert!(out.new_offset == fs::metadata(&p).unwrap().len());
    let _ = fs::remove_file(&p);
}

#[test]
fn test_missing_file_is_skipped() {
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let out = read_file("/no/such/file/anywhere", &set, LogKind::Plain, &opts_at(0)).unwrap();
    assert!(out.is_none());
}

#[test]
fn test_maxsize_gap_is_clamped_and_reported() {
    let p = tmppath("maxsize");
    let mut content = String::new();
    for i in 0..100 {
        content.push_str(&format!("line number {}\n", i));
    }
    fs::write(&p, &content).unwrap();
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let mut opts = plain_opts_at(0);
    opts.maxsize = 50;
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &opts)
        .unwrap()
        .unwrap();
    assert!(out.too_large.is_some());
    assert!(out.new_offset == fs::metadata(&p).unwrap().len());
    // Only the tail survived the clamp.
    assert!(out.records.len() <= 4);
    // An explicit offset suppresses the clamp.
    opts.offset_override = true;
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &opts)
        .unwrap()
        .unwrap();
    assert!(out.too_large.is_none());
    assert!(out.records.len() == 100);
    let _ = fs::remove_file(&p);
}

#[test]
fn test_multiline_reassembly_interleaved() {
    let p = tmppath("multiline");
    let text = "\
2026-08-02 10:00:00 UTC [11] ERROR:  one\n\
2026-08-02 10:00:01 UTC [22] ERROR:  two\n\
2026-08-02 10:00:01 UTC [11] STATEMENT:  select a\n\
2026-08-02 10:00:02 UTC [22] STATEMENT:  select b\n\
\tfrom u\n\
2026-08-02 10:00:03 UTC [11] LOG:  closing one\n";
    fs::write(&p, text).unwrap();
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &opts_at(0))
        .unwrap()
        .unwrap();
    // Records come out in the order their first lines appeared: pid 11's
    // first record, pid 22's, then pid 11's trailing LOG record.
    assert!(out.records.len() == 3);
    let r0 = &out.records[0];
    assert!(r0.pid == "11");
    assert!(r0.segments == vec!["ERROR:  one", "STATEMENT:  select a"]);
    assert!(r0.source_line == 1);
    let r1 = &out.records[1];
    assert!(r1.pid == "22");
    assert!(r1.segments == vec!["ERROR:  two", "STATEMENT:  select b", "from u"]);
    let r2 = &out.records[2];
    assert!(r2.pid == "11");
    assert!(r2.segments == vec!["LOG:  closing one"]);
    let _ = fs::remove_file(&p);
}

#[test]
fn test_emission_follows_first_line_order() {
    let p = tmppath("firstline");
    // Pid 22 opens second but closes first; pid 11 must still come out
    // ahead of it because its first line arrived earlier.
    let text = "\
2026-08-02 10:00:00 UTC [11] ERROR:  one\n\
2026-08-02 10:00:01 UTC [22] ERROR:  two\n\
2026-08-02 10:00:02 UTC [22] LOG:  b moved on\n\
2026-08-02 10:00:03 UTC [11] LOG:  a moved on\n";
    fs::write(&p, text).unwrap();
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &opts_at(0))
        .unwrap()
        .unwrap();
    assert!(out.records.len() == 4);
    assert!(out.records[0].pid == "11" && out.records[0].segments == vec!["ERROR:  one"]);
    assert!(out.records[1].pid == "22" && out.records[1].segments == vec!["ERROR:  two"]);
    assert!(out.records[2].pid == "22" && out.records[2].segments == vec!["LOG:  b moved on"]);
    assert!(out.records[3].pid == "11" && out.records[3].segments == vec!["LOG:  a moved on"]);
    let _ = fs::remove_file(&p);
}

#[test]
fn test_tab_continuation_goes_to_last_pid() {
    let p = tmppath("tabcont");
    let text = "\
2026-08-02 10:00:00 UTC [5] LOG:  statement: select *\n\
\tfrom wide_table\n\
\twhere id = 1\n";
    fs::write(&p, text).unwrap();
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &opts_at(0))
        .unwrap()
        .unwrap();
    assert!(out.records.len() == 1);
    assert!(
        out.records[0].segments
            == vec!["LOG:  statement: select *", "from wide_table", "where id = 1"]
    );
    let _ = fs::remove_file(&p);
}

#[test]
fn test_stray_log_line_dropped() {
    let p = tmppath("stray");
    let text = "\
2026-08-02 10:00:00 UTC [5] LOG:  statement: select 1\n\
2026-08-02 10:00:00 UTC LOG:  some cluster chatter\n";
    fs::write(&p, text).unwrap();
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Plain, &opts_at(0))
        .unwrap()
        .unwrap();
    // The timestamp-only LOG line disappears instead of becoming a forced
    // record.
    assert!(out.records.len() == 1);
    assert!(out.records[0].pid == "5");
    let _ = fs::remove_file(&p);
}

#[test]
fn test_syslog_sequencing() {
    let p = tmppath("syslog");
    let text = "\
Aug  2 10:11:12 db1 postgres[41]: [7-1] ERROR:  bad thing\n\
Aug  2 10:11:12 db1 postgres[41]: [7-2] #011more detail\n\
Aug  2 10:11:13 db1 postgres[41]: [8-1] LOG:  next record\n";
    fs::write(&p, text).unwrap();
    let set = PrefixSet::compile("", true, false).unwrap();
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Syslog, &opts_at(0))
        .unwrap()
        .unwrap();
    assert!(out.records.len() == 2);
    assert!(out.records[0].pid == "41");
    assert!(out.records[0].segments == vec!["ERROR:  bad thing", "#011more detail"]);
    assert!(out.records[1].segments == vec!["LOG:  next record"]);
    let _ = fs::remove_file(&p);
}

#[test]
fn test_csv_mode() {
    let p = tmppath("csv");
    let text = "\
2026-08-02 10:00:00 UTC,alice,shop,77,\"1.2.3.4:5\",sess,1,SELECT,start,1/2,0,ERROR,42P01,relation \"nope\" does not exist,,,,,,\"select * from nope\",,loc,app\n";
    fs::write(&p, text).unwrap();
    let set = PrefixSet::compile("%t [%p] ", false, false).unwrap();
    let out = read_file(p.to_str().unwrap(), &set, LogKind::Csv, &opts_at(0))
        .unwrap()
        .unwrap();
    assert!(out.records.len() == 1);
    let r = &out.records[0];
    assert!(r.pid == "77");
    assert!(r.prefix == "2026-08-02 10:00:00 UTC [77]");
    assert!(
        r.segments
            == vec![
                "ERROR:  relation \"nope\" does not exist STATEMENT:  select * from nope"
                    .to_string()
            ]
    );
    assert!(out.new_offset == fs::metadata(&p).unwrap().len());
    let _ = fs::remove_file(&p);
}
