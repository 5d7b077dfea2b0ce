/// The configuration file: the tool's only persistent state.
///
/// The format is line oriented, `KEY: value`, with `#` comments at line
/// start.  File entries are numbered by a suffix, written `FILE[N]` (the
/// glued form `FILE1` is accepted on input): `FILE[N]` names a template,
/// `LASTFILE[N]` the concrete path scanned last run, and `OFFSET[N]` the
/// byte position reading stopped at.  A bare `FILE` gets the lowest unused
/// positive suffix assigned before the file is rewritten.
///
/// `INHERIT: name` pulls in a shared subset; entries that come from it are
/// marked inherited and their FILE lines are never rewritten here, but
/// their LASTFILE/OFFSET state is tracked in this file so inherited lists
/// still resume incrementally.
///
/// Rewriting regenerates the file from the parsed lines in their original
/// order, substituting fresh LASTFILE/OFFSET values and appending the lines
/// an entry has not acquired yet, so user comments and layout survive and a
/// run that read nothing rewrites the file to byte-identical contents.
///
/// Filter directives (INCLUDE, EXCLUDE, EXCLUDE_PREFIX, EXCLUDE_NON_PARSED)
/// are global when they appear before the first FILE line and attach to the
/// preceding entry otherwise.
use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Normal,
    Duration,
    TempFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Count,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Plain,
    Syslog,
    Csv,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub suffix: u32,
    pub template: String,
    pub current_path: String,
    pub last_path: String,
    pub offset: u64,
    pub inherited: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub exclude_prefix: Vec<String>,
    pub exclude_non_parsed: Vec<String>,
    // Filled in by the run; latest_path empty means the entry was skipped.
    pub latest_path: String,
    pub new_offset: Option<u64>,
}

impl FileEntry {
    fn new(suffix: u32, template: String, inherited: bool) -> FileEntry {
        FileEntry {
            suffix,
            template,
            current_path: "".to_string(),
            last_path: "".to_string(),
            offset: 0,
            inherited,
            include: vec![],
            exclude: vec![],
            exclude_prefix: vec![],
            exclude_non_parsed: vec![],
            latest_path: "".to_string(),
            new_offset: None,
        }
    }
}

// How each line of the main file is regenerated: verbatim, or from the
// current state of the entry it belongs to.

enum LineKind {
    Verbatim,
    File(usize),
    LastFile(usize),
    Offset(usize),
}

struct ConfLine {
    text: String,
    kind: LineKind,
}

pub struct Config {
    pub path: String,
    pub files: Vec<FileEntry>,
    pub emails: Vec<String>,
    pub from: String,
    pub report_type: ReportType,
    pub duration_min_ms: f64,
    pub duration_limit: usize,
    pub tempfile_min_bytes: u64,
    pub tempfile_limit: usize,
    pub log_line_prefix: String,
    pub log_kind: LogKind,
    // Off means the files are arbitrary logs, not database logs.
    pub pgmode: bool,
    pub sortby: SortBy,
    pub find_line_number: bool,
    pub skip_non_parsed: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub exclude_prefix: Vec<String>,
    pub exclude_non_parsed: Vec<String>,
    pub maxsize: u64,
    pub mailsubject: String,
    pub mailzero: bool,
    pub mailsig: Vec<String>,
    pub statement_size: usize,
    pub maxemailsize: u64,
    pub warnings: Vec<String>,
    lines: Vec<ConfLine>,
}

pub const DEFAULT_SUBJECT: &str = "Results for FILE on host: HOST UNIQUE : NUMBER";

impl Default for Config {
    fn default() -> Config {
        Config {
            path: "".to_string(),
            files: vec![],
            emails: vec![],
            from: "".to_string(),
            report_type: ReportType::Normal,
            duration_min_ms: 0.0,
            duration_limit: 0,
            tempfile_min_bytes: 0,
            tempfile_limit: 0,
            log_line_prefix: "%m [%p] ".to_string(),
            log_kind: LogKind::Plain,
            pgmode: true,
            sortby: SortBy::Count,
            find_line_number: true,
            skip_non_parsed: false,
            include: vec![],
            exclude: vec![],
            exclude_prefix: vec![],
            exclude_non_parsed: vec![],
            maxsize: 80_000_000,
            mailsubject: DEFAULT_SUBJECT.to_string(),
            mailzero: false,
            mailsig: vec![],
            statement_size: 1000,
            maxemailsize: 10_000_000,
            warnings: vec![],
            lines: vec![],
        }
    }
}

// KEY, optional [N] or glued N suffix, colon, value.

fn parse_key_line(line: &str) -> Option<(String, Option<u32>, String)> {
    let re = Regex::new(r"^([A-Za-z_]+?)(?:\[(\d+)\]|(\d+))?\s*:\s*(.*)$").unwrap();
    let caps = re.captures(line)?;
    let key = caps.get(1).unwrap().as_str().to_uppercase();
    let suffix = caps
        .get(2)
        .or_else(|| caps.get(3))
        .and_then(|m| m.as_str().parse::<u32>().ok());
    let value = caps.get(4).unwrap().as_str();
    // Quoted values keep their surrounding whitespace.
    let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.trim().to_string()
    };
    Some((key, suffix, value))
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| anyhow!("Bad numeric value '{value}' for {key}"))
}

fn parse_flag(value: &str) -> bool {
    !(value == "0" || value.is_empty() || value.eq_ignore_ascii_case("off"))
}

impl Config {
    /// Read and parse a config file, folding in RC-file defaults first.
    /// Returns None if an RC file disables the program entirely.
    pub fn load(path: &str) -> Result<Option<Config>> {
        let mut cfg = Config::default();
        cfg.path = path.to_string();
        for (key, value) in read_rcfile()? {
            if key == "DISABLE" && parse_flag(&value) {
                return Ok(None);
            }
            // RC keys are defaults; errors there should not be fatal.
            if let Err(e) = cfg.apply_setting(&key, &value) {
                cfg.warnings.push(format!("rcfile: {e}"));
            }
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{path}'"))?;
        cfg.parse_main(&text)?;
        Ok(Some(cfg))
    }

    /// Parse config text as the main file (tracked for rewrite).
    fn parse_main(&mut self, text: &str) -> Result<()> {
        let mut seen = HashSet::<String>::new();
        let mut current_entry: Option<usize> = None;
        for raw in text.lines() {
            let line = raw.trim_end();
            if line.is_empty() || line.starts_with('#') {
                self.lines.push(ConfLine {
                    text: line.to_string(),
                    kind: LineKind::Verbatim,
                });
                continue;
            }
            let Some((key, suffix, value)) = parse_key_line(line) else {
                self.warnings.push(format!("Unparseable config line: {line}"));
                self.lines.push(ConfLine {
                    text: line.to_string(),
                    kind: LineKind::Verbatim,
                });
                continue;
            };
            if !seen.insert(line.to_string()) {
                self.warnings.push(format!("Duplicate config line ignored: {line}"));
                continue;
            }
            match key.as_str() {
                "FILE" => {
                    let suffix = suffix.unwrap_or(0);
                    if suffix != 0 && self.files.iter().any(|f| f.suffix == suffix) {
                        bail!("Duplicate file suffix {suffix} in config");
                    }
                    self.files.push(FileEntry::new(suffix, value, false));
                    let ix = self.files.len() - 1;
                    current_entry = Some(ix);
                    self.lines.push(ConfLine {
                        text: line.to_string(),
                        kind: LineKind::File(ix),
                    });
                }
                "LASTFILE" => {
                    let ix = self.entry_for(suffix, line)?;
                    self.files[ix].last_path = value;
                    self.lines.push(ConfLine {
                        text: line.to_string(),
                        kind: LineKind::LastFile(ix),
                    });
                }
                "OFFSET" => {
                    let ix = self.entry_for(suffix, line)?;
                    self.files[ix].offset = parse_num::<u64>(&key, &value)?;
                    self.lines.push(ConfLine {
                        text: line.to_string(),
                        kind: LineKind::Offset(ix),
                    });
                }
                "INHERIT" => {
                    let inherit_path = find_inherit_file(&value, &self.path)
                        .ok_or_else(|| anyhow!("Cannot find inherited config '{value}'"))?;
                    let text = fs::read_to_string(&inherit_path).with_context(|| {
                        format!("Cannot read inherited config '{}'", inherit_path.display())
                    })?;
                    self.parse_inherited(&text)?;
                    self.lines.push(ConfLine {
                        text: line.to_string(),
                        kind: LineKind::Verbatim,
                    });
                }
                "INCLUDE" | "EXCLUDE" | "EXCLUDE_PREFIX" | "EXCLUDE_NON_PARSED" => {
                    let list = match (current_entry, key.as_str()) {
                        (Some(ix), "INCLUDE") => &mut self.files[ix].include,
                        (Some(ix), "EXCLUDE") => &mut self.files[ix].exclude,
                        (Some(ix), "EXCLUDE_PREFIX") => &mut self.files[ix].exclude_prefix,
                        (Some(ix), "EXCLUDE_NON_PARSED") => {
                            &mut self.files[ix].exclude_non_parsed
                        }
                        (None, "INCLUDE") => &mut self.include,
                        (None, "EXCLUDE") => &mut self.exclude,
                        (None, "EXCLUDE_PREFIX") => &mut self.exclude_prefix,
                        (None, _) => &mut self.exclude_non_parsed,
                        _ => unreachable!(),
                    };
                    list.push(value);
                    self.lines.push(ConfLine {
                        text: line.to_string(),
                        kind: LineKind::Verbatim,
                    });
                }
                _ => {
                    self.apply_setting(&key, &value)?;
                    self.lines.push(ConfLine {
                        text: line.to_string(),
                        kind: LineKind::Verbatim,
                    });
                }
            }
        }
        if self.files.is_empty() {
            bail!("Config file '{}' names no files to watch", self.path);
        }
        Ok(())
    }

    // Inherited configs contribute defaults and file entries but are never
    // rewritten; LASTFILE/OFFSET lines seen there are honored as starting
    // state only.

    fn parse_inherited(&mut self, text: &str) -> Result<()> {
        let mut current: Option<usize> = None;
        for raw in text.lines() {
            let line = raw.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, suffix, value)) = parse_key_line(line) else {
                continue;
            };
            match key.as_str() {
                "FILE" => {
                    let suffix = suffix.unwrap_or(0);
                    if suffix != 0 && self.files.iter().any(|f| f.suffix == suffix) {
                        bail!("Duplicate file suffix {suffix} in inherited config");
                    }
                    self.files.push(FileEntry::new(suffix, value, true));
                    current = Some(self.files.len() - 1);
                }
                "LASTFILE" => {
                    if let Some(ix) = self.lookup_entry(suffix, current) {
                        self.files[ix].last_path = value;
                    }
                }
                "OFFSET" => {
                    if let Some(ix) = self.lookup_entry(suffix, current) {
                        self.files[ix].offset = parse_num::<u64>(&key, &value)?;
                    }
                }
                "INHERIT" => bail!("Nested INHERIT is not supported"),
                "INCLUDE" => self.include.push(value),
                "EXCLUDE" => self.exclude.push(value),
                "EXCLUDE_PREFIX" => self.exclude_prefix.push(value),
                "EXCLUDE_NON_PARSED" => self.exclude_non_parsed.push(value),
                _ => self.apply_setting(&key, &value)?,
            }
        }
        Ok(())
    }

    fn entry_for(&self, suffix: Option<u32>, line: &str) -> Result<usize> {
        self.lookup_entry(suffix, self.files.len().checked_sub(1))
            .ok_or_else(|| anyhow!("No matching FILE for config line: {line}"))
    }

    fn lookup_entry(&self, suffix: Option<u32>, current: Option<usize>) -> Option<usize> {
        match suffix {
            Some(n) => self.files.iter().position(|f| f.suffix == n),
            None => current,
        }
    }

    fn apply_setting(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "EMAIL" => self.emails.push(value.to_string()),
            "FROM" => self.from = value.to_string(),
            "TYPE" => {
                self.report_type = match value.to_lowercase().as_str() {
                    "normal" => ReportType::Normal,
                    "duration" => ReportType::Duration,
                    "tempfile" => ReportType::TempFile,
                    _ => bail!("Unknown report type '{value}'"),
                }
            }
            "DURATION" => self.duration_min_ms = parse_num::<f64>(key, value)?,
            "DURATION_LIMIT" => self.duration_limit = parse_num::<usize>(key, value)?,
            "TEMPFILE" => self.tempfile_min_bytes = parse_num::<u64>(key, value)?,
            "TEMPFILE_LIMIT" => self.tempfile_limit = parse_num::<usize>(key, value)?,
            "LOG_LINE_PREFIX" => self.log_line_prefix = value.to_string(),
            "PGLOG" => {
                self.log_kind = match value.to_lowercase().as_str() {
                    "pg" | "plain" => LogKind::Plain,
                    "syslog" => LogKind::Syslog,
                    "csv" => LogKind::Csv,
                    _ => bail!("Unknown log kind '{value}'"),
                }
            }
            "PGMODE" => self.pgmode = parse_flag(value),
            "SORTBY" => {
                self.sortby = match value.to_lowercase().as_str() {
                    "count" => SortBy::Count,
                    "date" => SortBy::Date,
                    _ => bail!("Unknown sort order '{value}'"),
                }
            }
            "FIND_LINE_NUMBER" => self.find_line_number = parse_flag(value),
            "SKIP_NON_PARSED" => self.skip_non_parsed = parse_flag(value),
            "MAXSIZE" => self.maxsize = parse_num::<u64>(key, value)?,
            "MAILSUBJECT" => self.mailsubject = value.to_string(),
            "MAILZERO" => self.mailzero = parse_flag(value),
            "MAILSIG" => self.mailsig.push(value.to_string()),
            "STATEMENT_SIZE" => self.statement_size = parse_num::<usize>(key, value)?,
            "MAXEMAILSIZE" => self.maxemailsize = parse_num::<u64>(key, value)?,
            _ => self.warnings.push(format!("Unknown config key '{key}' ignored")),
        }
        Ok(())
    }

    /// Assign real suffixes to placeholder entries: the lowest unused
    /// positive integer, in declared order.
    pub fn assign_suffixes(&mut self) {
        let mut used: HashSet<u32> = self.files.iter().map(|f| f.suffix).collect();
        for f in self.files.iter_mut() {
            if f.suffix == 0 {
                let mut n = 1;
                while used.contains(&n) {
                    n += 1;
                }
                f.suffix = n;
                used.insert(n);
            }
        }
    }

    fn lastfile_value(&self, ix: usize) -> String {
        let f = &self.files[ix];
        if !f.latest_path.is_empty() {
            f.latest_path.clone()
        } else {
            f.last_path.clone()
        }
    }

    fn offset_value(&self, ix: usize) -> u64 {
        let f = &self.files[ix];
        f.new_offset.unwrap_or(f.offset)
    }

    /// Regenerate the config text with current offsets and last files.
    pub fn rendered(&self) -> String {
        let mut out = String::new();
        let mut have_lastfile = vec![false; self.files.len()];
        let mut have_offset = vec![false; self.files.len()];
        for line in &self.lines {
            match line.kind {
                LineKind::LastFile(ix) => have_lastfile[ix] = true,
                LineKind::Offset(ix) => have_offset[ix] = true,
                _ => {}
            }
        }
        for line in &self.lines {
            match line.kind {
                LineKind::Verbatim => {
                    out.push_str(&line.text);
                    out.push('\n');
                }
                LineKind::File(ix) => {
                    let f = &self.files[ix];
                    out.push_str(&format!("FILE[{}]: {}\n", f.suffix, f.template));
                    // A freshly scanned entry grows its state lines here.
                    if !have_lastfile[ix] && !self.lastfile_value(ix).is_empty() {
                        out.push_str(&format!(
                            "LASTFILE[{}]: {}\n",
                            f.suffix,
                            self.lastfile_value(ix)
                        ));
                        have_lastfile[ix] = true;
                    }
                    if !have_offset[ix] && have_lastfile[ix] {
                        out.push_str(&format!("OFFSET[{}]: {}\n", f.suffix, self.offset_value(ix)));
                        have_offset[ix] = true;
                    }
                }
                LineKind::LastFile(ix) => {
                    out.push_str(&format!(
                        "LASTFILE[{}]: {}\n",
                        self.files[ix].suffix,
                        self.lastfile_value(ix)
                    ));
                }
                LineKind::Offset(ix) => {
                    out.push_str(&format!(
                        "OFFSET[{}]: {}\n",
                        self.files[ix].suffix,
                        self.offset_value(ix)
                    ));
                }
            }
        }
        // Inherited entries have no FILE line of their own here; their
        // resume state still lives in this file.
        for (ix, f) in self.files.iter().enumerate() {
            if !f.inherited {
                continue;
            }
            if !have_lastfile[ix] && !self.lastfile_value(ix).is_empty() {
                out.push_str(&format!("LASTFILE[{}]: {}\n", f.suffix, self.lastfile_value(ix)));
                out.push_str(&format!("OFFSET[{}]: {}\n", f.suffix, self.offset_value(ix)));
            } else if !have_offset[ix] && have_lastfile[ix] {
                out.push_str(&format!("OFFSET[{}]: {}\n", f.suffix, self.offset_value(ix)));
            }
        }
        out
    }

    /// Write the regenerated config atomically over the original.
    pub fn rewrite(&self) -> Result<()> {
        let path = Path::new(&self.path);
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let tmp = dir.join(format!(
            ".{}.tmp{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("config"),
            std::process::id()
        ));
        {
            let mut f = fs::File::create(&tmp)
                .with_context(|| format!("Cannot create temp file '{}'", tmp.display()))?;
            f.write_all(self.rendered().as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("Cannot replace config file '{}'", self.path))?;
        Ok(())
    }
}

// An inherited config may live next to the tool, next to the config, or in
// a tnm/ subdirectory of any of those.

fn find_inherit_file(name: &str, config_path: &str) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = vec![
        PathBuf::from(name),
        PathBuf::from("tnm").join(name),
    ];
    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(name));
            candidates.push(dir.join("tnm").join(name));
        }
    }
    if let Some(dir) = Path::new(config_path).parent() {
        candidates.push(dir.join(name));
    }
    if let Ok(home) = env::var("HOME") {
        candidates.push(Path::new(&home).join("tnm").join(name));
    }
    candidates.into_iter().find(|c| c.is_file())
}

// RC files hold process-wide defaults.  Only the first one found is used.

fn read_rcfile() -> Result<Vec<(String, String)>> {
    let mut candidates = vec![PathBuf::from("./.tailnmailrc")];
    if let Ok(home) = env::var("HOME") {
        candidates.push(Path::new(&home).join(".tailnmailrc"));
    }
    candidates.push(PathBuf::from("/etc/tailnmailrc"));
    let Some(path) = candidates.into_iter().find(|c| c.is_file()) else {
        return Ok(vec![]);
    };
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Cannot read rc file '{}'", path.display()))?;
    let mut settings = vec![];
    for raw in text.lines() {
        let line = raw.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, _, value)) = parse_key_line(line) {
            settings.push((key, value));
        }
    }
    Ok(settings)
}

#[cfg(test)]
fn parse_text(text: &str) -> Config {
    let mut cfg = Config::default();
    cfg.path = "test.conf".to_string();
    cfg.parse_main(text).unwrap();
    cfg
}

#[test]
fn test_parse_basic() {
    let cfg = parse_text(
        "## Watch the main database log\n\
         EMAIL: dba@example.com\n\
         EMAIL: ops@example.com\n\
         FROM: reporter@example.com\n\
         TYPE: duration\n\
         DURATION: 200\n\
         LOG_LINE_PREFIX: %t [%p] \n\
         FILE[1]: /var/log/pg.log\n\
         LASTFILE[1]: /var/log/pg.log\n\
         OFFSET[1]: 12345\n",
    );
    assert!(cfg.emails == vec!["dba@example.com", "ops@example.com"]);
    assert!(cfg.from == "reporter@example.com");
    assert!(cfg.report_type == ReportType::Duration);
    assert!(cfg.duration_min_ms == 200.0);
    assert!(cfg.files.len() == 1);
    assert!(cfg.files[0].suffix == 1);
    assert!(cfg.files[0].template == "/var/log/pg.log");
    assert!(cfg.files[0].last_path == "/var/log/pg.log");
    assert!(cfg.files[0].offset == 12345);
}

#[test]
fn test_parse_glued_suffix_and_quoted_value() {
    let cfg = parse_text(
        "MAILSUBJECT: \" padded subject \"\n\
         FILE1: /a.log\n\
         OFFSET1: 7\n",
    );
    assert!(cfg.mailsubject == " padded subject ");
    assert!(cfg.files[0].suffix == 1);
    assert!(cfg.files[0].offset == 7);
}

#[test]
fn test_duplicate_line_warns() {
    let cfg = parse_text("FILE[1]: /a.log\nEMAIL: x@y\nEMAIL: x@y\n");
    assert!(cfg.emails.len() == 1);
    assert!(cfg.warnings.iter().any(|w| w.contains("Duplicate")));
}

#[test]
fn test_filters_global_and_per_entry() {
    let cfg = parse_text(
        "INCLUDE: FATAL\n\
         FILE[1]: /a.log\n\
         EXCLUDE: boring\n\
         FILE[2]: /b.log\n\
         EXCLUDE: dull\n",
    );
    assert!(cfg.include == vec!["FATAL"]);
    assert!(cfg.files[0].exclude == vec!["boring"]);
    assert!(cfg.files[1].exclude == vec!["dull"]);
}

#[test]
fn test_assign_suffixes() {
    let mut cfg = parse_text("FILE: /a.log\nFILE[1]: /b.log\nFILE: /c.log\n");
    cfg.assign_suffixes();
    assert!(cfg.files[0].suffix == 2);
    assert!(cfg.files[1].suffix == 1);
    assert!(cfg.files[2].suffix == 3);
}

#[test]
fn test_rendered_preserves_comments_and_updates_offsets() {
    let mut cfg = parse_text(
        "# main log\n\
         EMAIL: x@y\n\
         FILE[1]: /a.log\n\
         LASTFILE[1]: /a.log\n\
         OFFSET[1]: 100\n",
    );
    cfg.files[0].latest_path = "/a.log.1".to_string();
    cfg.files[0].new_offset = Some(999);
    let out = cfg.rendered();
    assert!(
        out == "# main log\n\
                EMAIL: x@y\n\
                FILE[1]: /a.log\n\
                LASTFILE[1]: /a.log.1\n\
                OFFSET[1]: 999\n"
    );
}

#[test]
fn test_rendered_appends_missing_state_lines() {
    let mut cfg = parse_text("FILE[1]: /a.log\nEMAIL: x@y\n");
    cfg.files[0].latest_path = "/a.log".to_string();
    cfg.files[0].new_offset = Some(42);
    let out = cfg.rendered();
    assert!(
        out == "FILE[1]: /a.log\n\
                LASTFILE[1]: /a.log\n\
                OFFSET[1]: 42\n\
                EMAIL: x@y\n"
    );
}

#[test]
fn test_rendered_is_stable_when_nothing_changed() {
    let text = "# hello\nEMAIL: x@y\nFILE[1]: /a.log\nLASTFILE[1]: /a.log\nOFFSET[1]: 5\n";
    let cfg = parse_text(text);
    assert!(cfg.rendered() == text);
    // And regeneration is a fixed point.
    let again = parse_text(&cfg.rendered());
    assert!(again.rendered() == cfg.rendered());
}

#[test]
fn test_duplicate_suffix_is_fatal() {
    let mut cfg = Config::default();
    cfg.path = "test.conf".to_string();
    assert!(cfg.parse_main("FILE[1]: /a.log\nFILE[1]: /b.log\n").is_err());
}

#[test]
fn test_no_files_is_fatal() {
    let mut cfg = Config::default();
    cfg.path = "test.conf".to_string();
    assert!(cfg.parse_main("EMAIL: x@y\n").is_err());
}
