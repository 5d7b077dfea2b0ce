/// `tailmail` -- incremental log reporter
///
/// Reads the log files named by a config file from their saved byte
/// offsets, clusters what it finds, mails one report per invocation, and
/// rewrites the config file so the next run resumes where this one
/// stopped.  Typically driven from cron.
///
/// Quirks
///
/// The config file is both configuration and state: a failed mail run
/// leaves it untouched, so the next run re-reads the same bytes and the
/// report is delivered at least once.  A dry run never rewrites it, with
/// one exception: --reset exists precisely to rewrite the offsets, so it
/// writes even when --dryrun is also given.
mod mailer;
mod report;

use crate::mailer::Transport;
use crate::report::ReportInfo;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::fs;
use std::process;
use taillog::{
    current_path, read_file, resolve, squash, statement_tail, Cluster, ClusterSet, Config,
    FilterCache, Flattener, LogKind, Occurrence, PrefixSet, ReadOptions, ReportType,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file describing the log files to watch
    configfile: String,

    /// Print the report to stdout instead of mailing it; do not rewrite
    /// the config file
    #[arg(long, default_value_t = false)]
    dryrun: bool,

    /// Process files and rewrite offsets, but send no mail
    #[arg(long, default_value_t = false)]
    nomail: bool,

    /// Print progress information to stderr
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    /// Suppress per-file warnings
    #[arg(long, short, default_value_t = false)]
    quiet: bool,

    /// Set every file's offset to its current end, rewrite, and exit
    #[arg(long, default_value_t = false)]
    reset: bool,

    /// Back up this many bytes from each saved offset before reading
    #[arg(long, default_value_t = 0)]
    rewind: u64,

    /// Explicit byte offset for the previously scanned files [default: the saved offset]
    #[arg(long)]
    offset: Option<u64>,

    /// Shift "now" by this many seconds when resolving file templates
    #[arg(long, default_value_t = 0)]
    timewarp: i64,

    /// Send mail even when nothing matched
    #[arg(long, default_value_t = false)]
    mailzero: bool,

    /// Additional include filter (repeatable)
    #[arg(long)]
    include: Vec<String>,

    /// Additional exclude filter (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Override the minimum duration in ms for duration reports
    #[arg(long)]
    duration: Option<f64>,

    /// Override the minimum size in bytes for tempfile reports
    #[arg(long)]
    tempfile: Option<u64>,

    /// Strip sqlstate error codes from record heads (needs %e in the prefix)
    #[arg(long, default_value_t = false)]
    sqlstate: bool,

    /// The sendmail-compatible program used to deliver mail
    #[arg(long, default_value = "/usr/sbin/sendmail")]
    sendmail: String,
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let Some(mut cfg) = Config::load(&cli.configfile)? else {
        // An rc file disabled us; exit silently.
        return Ok(());
    };
    if !cli.quiet {
        for w in &cfg.warnings {
            eprintln!("Warning: {}", w);
        }
    }

    // Command-line overrides.
    if cli.mailzero {
        cfg.mailzero = true;
    }
    cfg.include.extend(cli.include.iter().cloned());
    cfg.exclude.extend(cli.exclude.iter().cloned());
    if let Some(ms) = cli.duration {
        cfg.duration_min_ms = ms;
    }
    if let Some(bytes) = cli.tempfile {
        cfg.tempfile_min_bytes = bytes;
    }

    cfg.assign_suffixes();
    let prefixes = PrefixSet::compile(
        &cfg.log_line_prefix,
        cfg.log_kind == LogKind::Syslog,
        cli.sqlstate,
    )
    .context("Cannot compile the log line prefix")?;

    if cli.reset {
        return reset_offsets(&mut cfg, cli.timewarp, cli.verbose);
    }

    let (clusterset, file_counts, notes) = process_files(&mut cfg, &prefixes, &cli)?;
    let unique = clusterset.len();
    let matches = clusterset.total_count();
    if cli.verbose {
        eprintln!("Unique items: {unique}, total matches: {matches}");
    }
    let clusters = clusterset.into_sorted(cfg.sortby);

    if !clusters.is_empty() || cfg.mailzero {
        send_report(&cfg, &clusters, file_counts, notes, unique, matches, &cli)?;
    } else if cli.verbose {
        eprintln!("No new matches, no mail sent");
    }

    // The mail step succeeded or was skipped; now it is safe to advance
    // the offsets.
    if !cli.dryrun {
        cfg.rewrite()?;
    }
    Ok(())
}

// --reset forgets everything unread: every entry's offset moves to the
// current end of its current file.

fn reset_offsets(cfg: &mut Config, timewarp: i64, verbose: bool) -> Result<()> {
    for entry in cfg.files.iter_mut() {
        let current = current_path(&entry.template, timewarp);
        let size = fs::metadata(&current).map(|m| m.len()).unwrap_or(0);
        if verbose {
            eprintln!("Resetting {} to offset {}", current, size);
        }
        entry.latest_path = current;
        entry.new_offset = Some(size);
    }
    cfg.rewrite()
}

fn process_files(
    cfg: &mut Config,
    prefixes: &PrefixSet,
    cli: &Cli,
) -> Result<(ClusterSet, Vec<(String, u64)>, Vec<String>)> {
    let flattener = Flattener::new();
    let mut cache = FilterCache::new();
    let mut clusters = ClusterSet::new(cfg.report_type);
    let mut file_counts: Vec<(String, u64)> = vec![];
    let mut notes: Vec<String> = vec![];

    for ix in 0..cfg.files.len() {
        let resolved_now = current_path(&cfg.files[ix].template, cli.timewarp);
        cfg.files[ix].current_path = resolved_now;
        let (queue, fset, saved_offset, last_path) = {
            let entry = &cfg.files[ix];
            let queue = match resolve(&entry.template, &entry.last_path, cli.timewarp) {
                Ok(q) => q,
                Err(e) => {
                    if !cli.quiet {
                        eprintln!("Warning: {}", e);
                    }
                    continue;
                }
            };
            let include: Vec<&String> = cfg.include.iter().chain(entry.include.iter()).collect();
            let exclude: Vec<&String> = cfg.exclude.iter().chain(entry.exclude.iter()).collect();
            let exclude_prefix: Vec<&String> = cfg
                .exclude_prefix
                .iter()
                .chain(entry.exclude_prefix.iter())
                .collect();
            let exclude_non_parsed: Vec<&String> = cfg
                .exclude_non_parsed
                .iter()
                .chain(entry.exclude_non_parsed.iter())
                .collect();
            let fset = cache.get(&include, &exclude, &exclude_prefix, &exclude_non_parsed)?;
            (queue, fset, entry.offset, entry.last_path.clone())
        };

        for path in queue {
            if cli.verbose {
                eprintln!("Reading {}", path);
            }
            let kind = if path.ends_with(".csv") {
                LogKind::Csv
            } else {
                cfg.log_kind
            };
            // Only the previously scanned file resumes from the saved
            // offset; anything newer is read from the top.
            let offset = if path == last_path {
                cli.offset.unwrap_or(saved_offset)
            } else {
                0
            };
            let opts = ReadOptions {
                offset,
                offset_override: cli.offset.is_some(),
                maxsize: cfg.maxsize,
                rewind: cli.rewind,
                find_line_number: cfg.find_line_number,
                skip_non_parsed: cfg.skip_non_parsed,
                pgmode: cfg.pgmode,
            };
            let outcome = match read_file(&path, prefixes, kind, &opts) {
                Ok(Some(o)) => o,
                Ok(None) => {
                    if !cli.quiet {
                        eprintln!("Warning: skipping missing or irregular file '{}'", path);
                    }
                    continue;
                }
                Err(e) => {
                    if !cli.quiet {
                        eprintln!("Warning: {}", e);
                    }
                    continue;
                }
            };
            if let Some(note) = outcome.too_large {
                notes.push(note);
            }

            let mut matched = 0u64;
            for rec in outcome.records {
                let mut body = squash(&rec.segments);
                if body.is_empty() {
                    continue;
                }
                if !fset.allows(&body, &rec.prefix, rec.forced) {
                    continue;
                }
                let mut filesize = None;
                let mut duration = 0.0;
                match cfg.report_type {
                    ReportType::Duration => match fset.duration_ms(&body) {
                        Some(ms) if ms >= cfg.duration_min_ms => duration = ms,
                        _ => continue,
                    },
                    ReportType::TempFile => match fset.tempfile_size(&body) {
                        Some(size) if size >= cfg.tempfile_min_bytes => filesize = Some(size),
                        _ => continue,
                    },
                    ReportType::Normal => {}
                }
                // In tempfile mode the statement is the record; the size
                // and path live on the stats line, so both the raw example
                // and the cluster key come from the stripped body.
                if cfg.report_type == ReportType::TempFile {
                    if let Some(tail) = statement_tail(&body) {
                        body = tail.to_string();
                    }
                }
                let raw = flattener.pretty(&body, cfg.report_type == ReportType::Duration);
                // Duration reports keep the literal body as the key; the
                // point there is the individual slow statement.
                let canonical = if cfg.report_type == ReportType::Duration {
                    body
                } else {
                    flattener.flatten(&body)
                };
                clusters.add(
                    canonical,
                    raw,
                    Occurrence {
                        source_file: rec.source_file,
                        source_line: rec.source_line,
                        prefix: rec.prefix,
                        timestamp: rec.timestamp,
                        filesize,
                    },
                    ix,
                    duration,
                );
                matched += 1;
            }
            file_counts.push((path.clone(), matched));
            let entry = &mut cfg.files[ix];
            entry.latest_path = path;
            entry.new_offset = Some(outcome.new_offset);
        }
    }
    Ok((clusters, file_counts, notes))
}

fn send_report(
    cfg: &Config,
    clusters: &[Cluster],
    file_counts: Vec<(String, u64)>,
    notes: Vec<String>,
    unique: usize,
    matches: u64,
    cli: &Cli,
) -> Result<()> {
    let info = ReportInfo {
        hostname: report::hostname(),
        file_counts,
        notes,
        unique,
        matches,
    };
    let body = report::render(clusters, cfg, &info, Local::now());
    let chunks = report::chunk(&body, cfg.maxemailsize);
    let file_label = cfg
        .files
        .first()
        .map(|f| {
            if f.latest_path.is_empty() {
                f.current_path.clone()
            } else {
                f.latest_path.clone()
            }
        })
        .unwrap_or_default();
    let base_subject = report::subject(&cfg.mailsubject, &file_label, &info.hostname, matches, unique);
    let transport = if cli.dryrun {
        Transport::Stdout
    } else {
        Transport::Sendmail {
            path: cli.sendmail.clone(),
        }
    };
    if cli.nomail {
        if cli.verbose {
            eprintln!("Mail suppressed by --nomail");
        }
        return Ok(());
    }
    let total = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        let subject = if total > 1 {
            format!("{} (chunk {}/{})", base_subject, i + 1, total)
        } else {
            base_subject.clone()
        };
        mailer::deliver(&transport, &cfg.from, &cfg.emails, &subject, chunk)?;
    }
    Ok(())
}

#[cfg(test)]
fn test_cli(configfile: &str) -> Cli {
    Cli {
        configfile: configfile.to_string(),
        dryrun: true,
        nomail: true,
        verbose: false,
        quiet: true,
        reset: false,
        rewind: 0,
        offset: None,
        timewarp: 0,
        mailzero: false,
        include: vec![],
        exclude: vec![],
        duration: None,
        tempfile: None,
        sqlstate: false,
        sendmail: "/usr/sbin/sendmail".to_string(),
    }
}

#[cfg(test)]
fn test_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("tailmail_run_{}_{}", tag, process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[cfg(test)]
fn load_cfg(path: &std::path::Path) -> Config {
    let mut cfg = Config::load(path.to_str().unwrap()).unwrap().unwrap();
    cfg.assign_suffixes();
    cfg
}

#[test]
fn test_fresh_and_incremental_runs() {
    use std::io::Write;
    let dir = test_dir("incr");
    let log = dir.join("app.log");
    fs::write(&log, "A1\nA2\n").unwrap();
    let conf = dir.join("watch.conf");
    fs::write(
        &conf,
        format!("EMAIL: x@y\nPGMODE: 0\nFILE[1]: {}\n", log.display()),
    )
    .unwrap();

    // First run: one cluster per distinct line, offset at EOF, LASTFILE
    // recorded.
    let mut cfg = load_cfg(&conf);
    let prefixes = PrefixSet::compile(&cfg.log_line_prefix, false, false).unwrap();
    let cli = test_cli(conf.to_str().unwrap());
    let (set, counts, _) = process_files(&mut cfg, &prefixes, &cli).unwrap();
    assert!(set.len() == 2);
    assert!(counts == vec![(log.to_str().unwrap().to_string(), 2)]);
    assert!(cfg.files[0].new_offset == Some(6));
    assert!(cfg.files[0].latest_path == log.to_str().unwrap());
    cfg.rewrite().unwrap();

    // Second run with new bytes: exactly the appended line.
    let mut f = fs::OpenOptions::new().append(true).open(&log).unwrap();
    f.write_all(b"A3\n").unwrap();
    drop(f);
    let mut cfg = load_cfg(&conf);
    assert!(cfg.files[0].offset == 6);
    assert!(cfg.files[0].last_path == log.to_str().unwrap());
    let (set, _, _) = process_files(&mut cfg, &prefixes, &cli).unwrap();
    assert!(set.len() == 1);
    assert!(cfg.files[0].new_offset == Some(9));
    cfg.rewrite().unwrap();

    // Third run with nothing new: zero clusters and a byte-identical
    // config rewrite.
    let before = fs::read_to_string(&conf).unwrap();
    let mut cfg = load_cfg(&conf);
    let (set, _, _) = process_files(&mut cfg, &prefixes, &cli).unwrap();
    assert!(set.is_empty());
    cfg.rewrite().unwrap();
    let after = fs::read_to_string(&conf).unwrap();
    assert!(before == after);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_database_log_clustering_run() {
    let dir = test_dir("dblog");
    let log = dir.join("pg.log");
    let text = "\
2026-08-02 10:00:00 UTC [11] ERROR:  duplicate key value violates unique constraint \"t_pk\"\n\
2026-08-02 10:00:00 UTC [11] STATEMENT:  INSERT INTO t VALUES (1,'x'),(2,'y')\n\
2026-08-02 10:00:05 UTC [29] ERROR:  duplicate key value violates unique constraint \"t_pk\"\n\
2026-08-02 10:00:05 UTC [29] STATEMENT:  INSERT INTO t VALUES (3,'z')\n\
2026-08-02 10:00:09 UTC [11] LOG:  unrelated notice\n";
    fs::write(&log, text).unwrap();
    let conf = dir.join("watch.conf");
    fs::write(
        &conf,
        format!(
            "EMAIL: x@y\nLOG_LINE_PREFIX: %t [%p] \nINCLUDE: ERROR\nFILE[1]: {}\n",
            log.display()
        ),
    )
    .unwrap();

    let mut cfg = load_cfg(&conf);
    let prefixes = PrefixSet::compile(&cfg.log_line_prefix, false, false).unwrap();
    let cli = test_cli(conf.to_str().unwrap());
    let (set, _, _) = process_files(&mut cfg, &prefixes, &cli).unwrap();
    // The two INSERT errors differ only in literals: one cluster, count 2,
    // and the unfiltered LOG line is excluded by INCLUDE.
    assert!(set.len() == 1);
    let clusters = set.into_sorted(cfg.sortby);
    assert!(clusters[0].count == 2);
    // The raw example is the earliest occurrence, kept verbatim.
    assert!(clusters[0].raw.contains("VALUES (1,'x'),(2,'y')"));
    assert!(clusters[0].canonical.contains("VALUES (?)"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_duration_run() {
    let dir = test_dir("duration");
    let log = dir.join("pg.log");
    let text = "\
2026-08-02 10:00:00 UTC [5] LOG:  duration: 150.000 ms  statement: select slowish\n\
2026-08-02 10:00:01 UTC [5] LOG:  duration: 250.000 ms  statement: select slow\n\
2026-08-02 10:00:02 UTC [5] LOG:  duration: 250.000 ms  statement: select slow\n";
    fs::write(&log, text).unwrap();
    let conf = dir.join("watch.conf");
    fs::write(
        &conf,
        format!(
            "EMAIL: x@y\nTYPE: duration\nDURATION: 200\nLOG_LINE_PREFIX: %t [%p] \nFILE[1]: {}\n",
            log.display()
        ),
    )
    .unwrap();

    let mut cfg = load_cfg(&conf);
    assert!(cfg.report_type == ReportType::Duration);
    let prefixes = PrefixSet::compile(&cfg.log_line_prefix, false, false).unwrap();
    let cli = test_cli(conf.to_str().unwrap());
    let (set, _, _) = process_files(&mut cfg, &prefixes, &cli).unwrap();
    // The 150 ms entry is below the minimum; the two 250 ms entries share
    // a cluster.
    assert!(set.len() == 1);
    let clusters = set.into_sorted(cfg.sortby);
    assert!(clusters[0].count == 2);
    assert!(clusters[0].duration_ms == 250.0);
    assert!(clusters[0].raw.starts_with("DURATION: 250.000 ms\nSTATEMENT: select slow"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_tempfile_run() {
    let dir = test_dir("tempfile");
    let log = dir.join("pg.log");
    let text = "\
2026-08-02 10:00:00 UTC [5] LOG:  temporary file: path \"base/pgsql_tmp/a\", size 1000 STATEMENT:  select big\n\
2026-08-02 10:00:01 UTC [6] LOG:  temporary file: path \"base/pgsql_tmp/b\", size 3000 STATEMENT:  select big\n\
2026-08-02 10:00:02 UTC [7] LOG:  temporary file: path \"base/pgsql_tmp/c\", size 2000 STATEMENT:  select big\n";
    fs::write(&log, text).unwrap();
    let conf = dir.join("watch.conf");
    fs::write(
        &conf,
        format!(
            "EMAIL: x@y\nTYPE: tempfile\nLOG_LINE_PREFIX: %t [%p] \nFILE[1]: {}\n",
            log.display()
        ),
    )
    .unwrap();

    let mut cfg = load_cfg(&conf);
    let prefixes = PrefixSet::compile(&cfg.log_line_prefix, false, false).unwrap();
    let cli = test_cli(conf.to_str().unwrap());
    let (set, _, _) = process_files(&mut cfg, &prefixes, &cli).unwrap();
    assert!(set.len() == 1);
    let clusters = set.into_sorted(cfg.sortby);
    let c = &clusters[0];
    assert!(c.count == 3);
    assert!(c.smallest.as_ref().unwrap().filesize == Some(1000));
    assert!(c.largest.as_ref().unwrap().filesize == Some(3000));
    assert!(c.total_size == 6000);
    assert!(c.mean_size() == 2000);
    assert!(c.canonical == "select big");
    // The displayed example is the stripped statement, not the whole
    // temporary-file log line.
    assert!(c.raw == "select big");

    let _ = fs::remove_dir_all(&dir);
}
