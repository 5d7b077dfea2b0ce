/// Turn a configured file template into the ordered list of concrete files
/// to read this run.
///
/// Three template kinds are recognized:
///
///  - a name containing the literal token `LATEST`: the parent directory is
///    scanned once and the files matching the text around the token are
///    ordered by modification time.  With a previously scanned file on
///    record, only strictly newer files are queued (an equal mtime counts as
///    "not newer"); without one, only the single newest match.
///
///  - a name containing strftime directives: we walk backwards from
///    now + timewarp in 30-minute steps, bounded to 60 days, collecting each
///    distinct rendering until the previously scanned file is reached; the
///    queue is then replayed oldest first.
///
///  - anything else: just the expanded name.
///
/// In every case the previously scanned file is yielded first so its unread
/// tail is picked up before newer files are started.
use anyhow::{anyhow, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, Local};
use regex::Regex;
use std::env;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

// The resolver consults no clock other than this.
pub fn warped_now(timewarp: i64) -> DateTime<Local> {
    Local::now() + Duration::seconds(timewarp)
}

/// Expand `~` and `$VAR`/`${VAR}` in a template.  Unknown variables are left
/// in place so the resulting "file not found" names the real problem.
pub fn expand_env(template: &str) -> String {
    let mut s = template.to_string();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            s = format!("{}/{}", home, rest);
        }
    }
    let re = Regex::new(r"\$\{(\w+)\}|\$(\w+)").unwrap();
    re.replace_all(&s, |caps: &regex::Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
        env::var(name).unwrap_or_else(|_| caps.get(0).unwrap().as_str().to_string())
    })
    .into_owned()
}

pub fn has_time_directives(template: &str) -> bool {
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.peek() {
                Some(d) if d.is_ascii_alphabetic() => return true,
                _ => {
                    chars.next();
                }
            }
        }
    }
    false
}

/// Render strftime directives in the template for the given instant.  A
/// template with directives chrono cannot parse is returned verbatim rather
/// than half-rendered.
pub fn render_template(template: &str, when: DateTime<Local>) -> String {
    let items = StrftimeItems::new(template).collect::<Vec<Item>>();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return template.to_string();
    }
    when.format_with_items(items.into_iter()).to_string()
}

/// The expanded "file of record" for this run, used for display and reset.
pub fn current_path(template: &str, timewarp: i64) -> String {
    let t = expand_env(template);
    if t.contains("LATEST") {
        // Resolved by the queue; the template itself is the best name.
        t
    } else {
        render_template(&t, warped_now(timewarp))
    }
}

/// Resolve a file entry to the ordered queue of concrete paths.
pub fn resolve(template: &str, last_path: &str, timewarp: i64) -> Result<Vec<String>> {
    let t = expand_env(template);
    if t.contains("LATEST") {
        resolve_latest(&t, last_path)
    } else if has_time_directives(&t) {
        Ok(resolve_timed(&t, last_path, warped_now(timewarp)))
    } else {
        let mut queue = vec![];
        if !last_path.is_empty() && last_path != t {
            queue.push(last_path.to_string());
        }
        queue.push(t);
        Ok(queue)
    }
}

fn mtime_of(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn resolve_latest(template: &str, last_path: &str) -> Result<Vec<String>> {
    let p = Path::new(template);
    let dir = p.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let base = p
        .file_name()
        .and_then(|b| b.to_str())
        .ok_or_else(|| anyhow!("Bad LATEST template '{template}'"))?;
    let token = base
        .find("LATEST")
        .ok_or_else(|| anyhow!("LATEST must appear in the file name of '{template}'"))?;
    let (want_pre, want_suf) = (&base[..token], &base[token + "LATEST".len()..]);

    let mut matches = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if !name.starts_with(want_pre) || !name.ends_with(want_suf) {
            continue;
        }
        // Non-UTF8 paths cannot have come from the UTF8 template and are
        // ignored.
        if let (Some(mtime), Some(pstr)) = (mtime_of(&path), path.to_str()) {
            matches.push((mtime, pstr.to_string()));
        }
    }
    matches.sort();

    let mut queue = vec![];
    if last_path.is_empty() {
        // First run against this directory: only the newest match.
        if let Some((_, newest)) = matches.last() {
            queue.push(newest.clone());
        }
    } else {
        queue.push(last_path.to_string());
        let last_mtime = mtime_of(Path::new(last_path)).unwrap_or(SystemTime::UNIX_EPOCH);
        for (mtime, path) in matches {
            if mtime > last_mtime && path != last_path {
                queue.push(path);
            }
        }
    }
    Ok(queue)
}

// Walk backwards in 30-minute steps until the previous file's name falls
// out of the template, then replay the walk oldest first.  Renderings that
// do not exist on disk are skipped; the previous file is kept regardless so
// a vanished file is reported rather than silently forgotten.

fn resolve_timed(template: &str, last_path: &str, now: DateTime<Local>) -> Vec<String> {
    let current = render_template(template, now);
    if last_path.is_empty() {
        return vec![current];
    }
    let mut walked: Vec<String> = vec![];
    let limit = now - Duration::days(60);
    let mut t = now;
    while t >= limit {
        let r = render_template(template, t);
        if r == last_path {
            break;
        }
        if !walked.contains(&r) {
            walked.push(r);
        }
        t = t - Duration::minutes(30);
    }
    let mut queue = vec![last_path.to_string()];
    for r in walked.into_iter().rev() {
        if Path::new(&r).exists() || r == current {
            queue.push(r);
        }
    }
    queue
}

#[test]
fn test_has_time_directives() {
    assert!(has_time_directives("/var/log/pg-%Y-%m-%d.log"));
    assert!(!has_time_directives("/var/log/pg.log"));
    assert!(!has_time_directives("/var/log/100%%full.log"));
}

#[test]
fn test_render_template() {
    use chrono::TimeZone;
    let t = Local.with_ymd_and_hms(2026, 8, 2, 14, 30, 0).unwrap();
    assert!(render_template("/log/pg-%Y-%m-%d.log", t) == "/log/pg-2026-08-02.log");
    assert!(render_template("/log/pg.log", t) == "/log/pg.log");
    // An unparseable directive leaves the template whole.
    assert!(render_template("/log/pg-%!.log", t) == "/log/pg-%!.log");
}

#[test]
fn test_resolve_plain() {
    let q = resolve("/log/pg.log", "", 0).unwrap();
    assert!(q == vec!["/log/pg.log"]);
    let q = resolve("/log/pg.log", "/log/old.log", 0).unwrap();
    assert!(q == vec!["/log/old.log", "/log/pg.log"]);
    let q = resolve("/log/pg.log", "/log/pg.log", 0).unwrap();
    assert!(q == vec!["/log/pg.log"]);
}

#[test]
fn test_resolve_timed_walkback() {
    use chrono::TimeZone;
    let now = Local.with_ymd_and_hms(2026, 8, 2, 1, 0, 0).unwrap();
    let dir = std::env::temp_dir().join("taillog_resolver_test");
    let _ = fs::create_dir_all(&dir);
    let template = format!("{}/pg-%Y-%m-%d.log", dir.display());
    let yesterday = format!("{}/pg-2026-08-01.log", dir.display());
    let today = format!("{}/pg-2026-08-02.log", dir.display());
    fs::write(&yesterday, b"x").unwrap();
    fs::write(&today, b"x").unwrap();

    // Previous file two days back: yesterday's file exists and is queued
    // between it and today's.
    let last = format!("{}/pg-2026-07-31.log", dir.display());
    let q = resolve_timed(&template, &last, now);
    assert!(q == vec![last.clone(), yesterday.clone(), today.clone()]);

    // Previous file is the current rendering: nothing else gets queued.
    let q = resolve_timed(&template, &today, now);
    assert!(q == vec![today.clone()]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_resolve_latest() {
    let dir = std::env::temp_dir().join("taillog_latest_test");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let a = dir.join("pg-a.log");
    let b = dir.join("pg-b.log");
    let c = dir.join("pg-c.log");
    fs::write(&a, b"x").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(50));
    fs::write(&b, b"x").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(50));
    fs::write(&c, b"x").unwrap();
    fs::write(dir.join("other.txt"), b"x").unwrap();

    let template = format!("{}/pg-LATEST.log", dir.display());

    // No previous file: the single newest match.
    let q = resolve(&template, "", 0).unwrap();
    assert!(q == vec![c.to_str().unwrap().to_string()]);

    // Previous file first, then the strictly newer ones in mtime order.
    let q = resolve(&template, a.to_str().unwrap(), 0).unwrap();
    assert!(
        q == vec![
            a.to_str().unwrap().to_string(),
            b.to_str().unwrap().to_string(),
            c.to_str().unwrap().to_string(),
        ]
    );

    // The newest file as previous: nothing newer to queue.
    let q = resolve(&template, c.to_str().unwrap(), 0).unwrap();
    assert!(q == vec![c.to_str().unwrap().to_string()]);

    let _ = fs::remove_dir_all(&dir);
}
