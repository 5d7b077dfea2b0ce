/// Render the sorted cluster set as the text report, and split it into
/// mail-sized chunks.
///
/// The layout is plain text: a short header (date, host, totals, per-file
/// match counts, any notes the reader left), then one numbered item per
/// cluster.  Chunking never splits inside an item; an item line is one
/// that begins with "[<number>]".
use chrono::{DateTime, Local};
use taillog::{Cluster, Config, ReportType};

pub struct ReportInfo {
    pub hostname: String,
    pub file_counts: Vec<(String, u64)>,
    pub notes: Vec<String>,
    pub unique: usize,
    pub matches: u64,
}

pub fn render(clusters: &[Cluster], cfg: &Config, info: &ReportInfo, now: DateTime<Local>) -> String {
    let mut out = String::new();
    out.push_str(&format!("Date: {}\n", now.format("%a %b %e %T %Y")));
    out.push_str(&format!("Host: {}\n", info.hostname));
    if cfg.report_type == ReportType::Duration {
        out.push_str(&format!("Minimum duration: {} ms\n", cfg.duration_min_ms));
    }
    if cfg.report_type == ReportType::TempFile {
        out.push_str(&format!("Minimum tempfile size: {} bytes\n", cfg.tempfile_min_bytes));
    }
    out.push_str(&format!("Unique items: {}\n", info.unique));
    out.push_str(&format!("Total matches: {}\n", info.matches));
    for (file, count) in &info.file_counts {
        out.push_str(&format!("Matches from {}: {}\n", file, count));
    }
    for note in &info.notes {
        out.push_str(&format!("NOTE: {}\n", note));
    }

    if clusters.is_empty() {
        out.push_str("\nNo new matches found.\n");
    }

    let limit = match cfg.report_type {
        ReportType::Duration => cfg.duration_limit,
        ReportType::TempFile => cfg.tempfile_limit,
        ReportType::Normal => 0,
    };
    let shown = if limit > 0 && clusters.len() > limit {
        &clusters[..limit]
    } else {
        clusters
    };
    if shown.len() < clusters.len() {
        out.push_str(&format!(
            "(Showing {} of {} items)\n",
            shown.len(),
            clusters.len()
        ));
    }

    for (i, c) in shown.iter().enumerate() {
        out.push('\n');
        out.push_str(&render_item(i + 1, c, cfg));
    }
    for sig in &cfg.mailsig {
        out.push_str(&format!("\n{}\n", sig));
    }
    out
}

fn render_item(number: usize, c: &Cluster, cfg: &Config) -> String {
    let mut out = String::new();
    if c.count == 1 {
        out.push_str(&format!(
            "[{}] From file {} line {}\n",
            number, c.earliest.source_file, c.earliest.source_line
        ));
        if !c.earliest.timestamp.is_empty() {
            out.push_str(&format!("At: {}\n", c.earliest.timestamp));
        }
    } else {
        out.push_str(&format!(
            "[{}] From file {} (between lines {} and {}, occurs {} times)\n",
            number,
            c.earliest.source_file,
            c.earliest.source_line,
            c.latest.source_line,
            c.count
        ));
        if !c.earliest.timestamp.is_empty() || !c.latest.timestamp.is_empty() {
            out.push_str(&format!("First: {}\n", c.earliest.timestamp));
            out.push_str(&format!("Last:  {}\n", c.latest.timestamp));
        }
    }
    if cfg.report_type == ReportType::TempFile {
        let smallest = c.smallest.as_ref().and_then(|o| o.filesize).unwrap_or(0);
        let largest = c.largest.as_ref().and_then(|o| o.filesize).unwrap_or(0);
        out.push_str(&format!(
            "Total size: {}, mean: {}, smallest: {}, largest: {}\n",
            c.total_size,
            c.mean_size(),
            smallest,
            largest
        ));
    }
    out.push_str(&truncate_statement(&c.raw, cfg.statement_size));
    out.push('\n');
    out
}

// Statement bodies can be enormous; cut at the configured size, on a
// character boundary, and say how much was elided.

fn truncate_statement(s: &str, size: usize) -> String {
    if size == 0 || s.len() <= size {
        return s.to_string();
    }
    let mut cut = size;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{} ... ({} more characters)", &s[..cut], s.len() - cut)
}

/// Fill in the subject template.  FILE, HOST, NUMBER and UNIQUE are
/// replaced; everything else is literal.
pub fn subject(template: &str, file: &str, host: &str, number: u64, unique: usize) -> String {
    template
        .replace("FILE", file)
        .replace("HOST", host)
        .replace("NUMBER", &number.to_string())
        .replace("UNIQUE", &unique.to_string())
}

/// Split the body into chunks no larger than `max` bytes, only at item
/// boundaries.  A single oversized item stays whole; mail that is too big
/// beats mail that is cut mid-statement.
pub fn chunk(body: &str, max: u64) -> Vec<String> {
    if max == 0 || body.len() as u64 <= max {
        return vec![body.to_string()];
    }
    // First cut the body into indivisible parts: the header, then one part
    // per item.
    let mut parts: Vec<String> = vec![];
    let mut current = String::new();
    for line in body.lines() {
        if is_item_start(line) && !current.is_empty() {
            parts.push(current);
            current = String::new();
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        parts.push(current);
    }
    // Then pack parts greedily.
    let mut chunks: Vec<String> = vec![];
    let mut cur = String::new();
    for part in parts {
        if !cur.is_empty() && (cur.len() + part.len()) as u64 > max {
            chunks.push(cur);
            cur = String::new();
        }
        cur.push_str(&part);
    }
    if !cur.is_empty() {
        chunks.push(cur);
    }
    chunks
}

fn is_item_start(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('[') else {
        return false;
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    !digits.is_empty() && rest[digits.len()..].starts_with(']')
}

/// Best-effort machine name for the report header.
pub fn hostname() -> String {
    if let Ok(h) = std::env::var("HOSTNAME") {
        if !h.is_empty() {
            return h;
        }
    }
    if let Ok(h) = std::fs::read_to_string("/etc/hostname") {
        let h = h.trim();
        if !h.is_empty() {
            return h.to_string();
        }
    }
    "localhost".to_string()
}

#[cfg(test)]
use taillog::Occurrence;

#[cfg(test)]
fn test_cluster(count: u64, raw: &str) -> Cluster {
    use ustr::Ustr;
    let occ = |line: u64| Occurrence {
        source_file: Ustr::from("/log/pg.log"),
        source_line: line,
        prefix: "p".to_string(),
        timestamp: "2026-08-02 10:00:00 UTC".to_string(),
        filesize: None,
    };
    Cluster {
        canonical: raw.to_string(),
        raw: raw.to_string(),
        count,
        earliest: occ(3),
        latest: occ(9),
        smallest: None,
        largest: None,
        total_size: 0,
        duration_ms: 0.0,
        file_order: 0,
    }
}

#[test]
fn test_subject_template() {
    let s = subject(taillog::DEFAULT_SUBJECT, "/log/pg.log", "db1", 7, 3);
    assert!(s == "Results for /log/pg.log on host: db1 3 : 7");
    assert!(subject("plain subject", "f", "h", 0, 0) == "plain subject");
}

#[test]
fn test_render_header_and_items() {
    use chrono::TimeZone;
    let cfg = test_config();
    let info = ReportInfo {
        hostname: "db1".to_string(),
        file_counts: vec![("/log/pg.log".to_string(), 4)],
        notes: vec![],
        unique: 2,
        matches: 4,
    };
    let clusters = vec![test_cluster(3, "ERROR: first"), test_cluster(1, "ERROR: second")];
    let now = Local.with_ymd_and_hms(2026, 8, 2, 10, 0, 0).unwrap();
    let body = render(&clusters, &cfg, &info, now);
    assert!(body.contains("Host: db1\n"));
    assert!(body.contains("Unique items: 2\n"));
    assert!(body.contains("Matches from /log/pg.log: 4\n"));
    assert!(body.contains("[1] From file /log/pg.log (between lines 3 and 9, occurs 3 times)\n"));
    assert!(body.contains("First: 2026-08-02 10:00:00 UTC\n"));
    assert!(body.contains("[2] From file /log/pg.log line 3\n"));
    assert!(body.contains("ERROR: second"));
}

#[cfg(test)]
fn test_config() -> Config {
    let dir = std::env::temp_dir();
    let p = dir.join(format!("tailmail_report_test_{}", std::process::id()));
    std::fs::write(&p, "EMAIL: x@y\nFILE[1]: /log/pg.log\n").unwrap();
    let cfg = Config::load(p.to_str().unwrap()).unwrap().unwrap();
    let _ = std::fs::remove_file(&p);
    cfg
}

#[test]
fn test_truncate_statement() {
    assert!(truncate_statement("short", 100) == "short");
    let t = truncate_statement("abcdefghij", 4);
    assert!(t == "abcd ... (6 more characters)");
}

#[test]
fn test_chunking_splits_at_items_only() {
    let mut body = String::from("Header line\n");
    for i in 1..=4 {
        body.push_str(&format!("[{}] item\nbody line one\nbody line two\n", i));
    }
    let chunks = chunk(&body, 60);
    assert!(chunks.len() > 1);
    // Every chunk after the first begins at an item boundary.
    for c in &chunks[1..] {
        assert!(is_item_start(c.lines().next().unwrap()));
    }
    // Nothing was lost or duplicated.
    assert!(chunks.concat() == body);
    // A small body stays in one piece.
    assert!(chunk(&body, 1_000_000).len() == 1);
}
