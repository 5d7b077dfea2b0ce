/// Cluster bookkeeping: every accepted record lands in the cluster named by
/// its canonical string, and the cluster tracks the statistics its report
/// type needs.  Clusters are kept in first-seen order so that a given input
/// always produces the same report.
use crate::confile::{ReportType, SortBy};
use std::collections::HashMap;
use ustr::Ustr;

/// Where and when one record was seen.  The prefix is the verbatim text
/// from the log; the timestamp is the extracted piece of it, when the
/// format has one.
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub source_file: Ustr,
    pub source_line: u64,
    pub prefix: String,
    pub timestamp: String,
    pub filesize: Option<u64>,
}

#[derive(Debug)]
pub struct Cluster {
    pub canonical: String,
    pub raw: String,
    pub count: u64,
    pub earliest: Occurrence,
    pub latest: Occurrence,
    // Temp-file statistics.
    pub smallest: Option<Occurrence>,
    pub largest: Option<Occurrence>,
    pub total_size: u64,
    // The largest duration seen, for sorting duration reports.
    pub duration_ms: f64,
    // Position of the file entry that first produced the cluster.
    pub file_order: usize,
}

impl Cluster {
    pub fn mean_size(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_size / self.count
        }
    }

    fn largest_size(&self) -> u64 {
        self.largest
            .as_ref()
            .and_then(|o| o.filesize)
            .unwrap_or(0)
    }
}

pub struct ClusterSet {
    mode: ReportType,
    clusters: Vec<Cluster>,
    index: HashMap<String, usize>,
}

impl ClusterSet {
    pub fn new(mode: ReportType) -> ClusterSet {
        ClusterSet {
            mode,
            clusters: vec![],
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.clusters.iter().map(|c| c.count).sum()
    }

    /// Fold one record into its cluster.  The raw string of the first
    /// occurrence is kept verbatim as the example shown in the report.
    pub fn add(
        &mut self,
        canonical: String,
        raw: String,
        occ: Occurrence,
        file_order: usize,
        duration_ms: f64,
    ) {
        if let Some(&ix) = self.index.get(&canonical) {
            let c = &mut self.clusters[ix];
            c.count += 1;
            c.latest = occ.clone();
            if duration_ms > c.duration_ms {
                c.duration_ms = duration_ms;
            }
            if self.mode == ReportType::TempFile {
                if let Some(size) = occ.filesize {
                    c.total_size += size;
                    // Strict inequality: the first of equals keeps its spot.
                    if size < c.smallest.as_ref().and_then(|o| o.filesize).unwrap_or(u64::MAX) {
                        c.smallest = Some(occ.clone());
                    }
                    if size > c.largest.as_ref().and_then(|o| o.filesize).unwrap_or(0) {
                        c.largest = Some(occ);
                    }
                }
            }
            return;
        }
        let (smallest, largest, total_size) = if self.mode == ReportType::TempFile {
            let size = occ.filesize.unwrap_or(0);
            (Some(occ.clone()), Some(occ.clone()), size)
        } else {
            (None, None, 0)
        };
        self.index.insert(canonical.clone(), self.clusters.len());
        self.clusters.push(Cluster {
            canonical,
            raw,
            count: 1,
            earliest: occ.clone(),
            latest: occ,
            smallest,
            largest,
            total_size,
            duration_ms,
            file_order,
        });
    }

    /// Hand the clusters over in report order.
    pub fn into_sorted(self, sortby: SortBy) -> Vec<Cluster> {
        let mode = self.mode;
        let mut clusters = self.clusters;
        match mode {
            ReportType::Duration => {
                clusters.sort_by(|a, b| {
                    b.duration_ms
                        .total_cmp(&a.duration_ms)
                        .then(a.file_order.cmp(&b.file_order))
                        .then(a.earliest.source_line.cmp(&b.earliest.source_line))
                });
            }
            ReportType::TempFile => {
                clusters.sort_by(|a, b| {
                    b.largest_size()
                        .cmp(&a.largest_size())
                        .then(b.mean_size().cmp(&a.mean_size()))
                        .then(b.count.cmp(&a.count))
                        .then(a.file_order.cmp(&b.file_order))
                        .then(a.earliest.source_line.cmp(&b.earliest.source_line))
                });
            }
            ReportType::Normal => match sortby {
                SortBy::Count => {
                    clusters.sort_by(|a, b| {
                        b.count
                            .cmp(&a.count)
                            .then(a.file_order.cmp(&b.file_order))
                            .then(a.earliest.source_line.cmp(&b.earliest.source_line))
                    });
                }
                SortBy::Date => {
                    clusters.sort_by(|a, b| {
                        a.file_order
                            .cmp(&b.file_order)
                            .then(a.earliest.source_line.cmp(&b.earliest.source_line))
                    });
                }
            },
        }
        clusters
    }
}

#[cfg(test)]
fn occ(line: u64, size: Option<u64>) -> Occurrence {
    Occurrence {
        source_file: Ustr::from("/log/pg.log"),
        source_line: line,
        prefix: "2026-08-02 10:00:00 UTC [1] ".to_string(),
        timestamp: "2026-08-02 10:00:00 UTC".to_string(),
        filesize: size,
    }
}

#[test]
fn test_normal_counting() {
    let mut set = ClusterSet::new(ReportType::Normal);
    set.add("K".to_string(), "raw one".to_string(), occ(1, None), 0, 0.0);
    set.add("K".to_string(), "raw two".to_string(), occ(5, None), 0, 0.0);
    set.add("L".to_string(), "other".to_string(), occ(3, None), 0, 0.0);
    assert!(set.len() == 2);
    assert!(set.total_count() == 3);
    let cs = set.into_sorted(SortBy::Count);
    assert!(cs[0].canonical == "K");
    assert!(cs[0].count == 2);
    // The first example is the one preserved.
    assert!(cs[0].raw == "raw one");
    assert!(cs[0].earliest.source_line == 1);
    assert!(cs[0].latest.source_line == 5);
}

#[test]
fn test_sort_by_date_keeps_arrival_order() {
    let mut set = ClusterSet::new(ReportType::Normal);
    set.add("B".to_string(), "b".to_string(), occ(10, None), 0, 0.0);
    set.add("A".to_string(), "a".to_string(), occ(20, None), 0, 0.0);
    set.add("A".to_string(), "a".to_string(), occ(30, None), 0, 0.0);
    let cs = set.into_sorted(SortBy::Date);
    assert!(cs[0].canonical == "B" && cs[1].canonical == "A");
}

#[test]
fn test_duration_sorting() {
    let mut set = ClusterSet::new(ReportType::Duration);
    set.add("fast".to_string(), "f".to_string(), occ(1, None), 0, 250.0);
    set.add("slow".to_string(), "s".to_string(), occ(2, None), 0, 900.0);
    set.add("fast".to_string(), "f".to_string(), occ(3, None), 0, 250.0);
    let cs = set.into_sorted(SortBy::Count);
    assert!(cs[0].canonical == "slow");
    assert!(cs[1].canonical == "fast");
    assert!(cs[1].count == 2);
}

#[test]
fn test_tempfile_statistics() {
    let mut set = ClusterSet::new(ReportType::TempFile);
    set.add("K".to_string(), "k".to_string(), occ(1, Some(1000)), 0, 0.0);
    set.add("K".to_string(), "k".to_string(), occ(2, Some(3000)), 0, 0.0);
    set.add("K".to_string(), "k".to_string(), occ(3, Some(2000)), 0, 0.0);
    let cs = set.into_sorted(SortBy::Count);
    let c = &cs[0];
    assert!(c.count == 3);
    assert!(c.smallest.as_ref().unwrap().filesize == Some(1000));
    assert!(c.largest.as_ref().unwrap().filesize == Some(3000));
    assert!(c.total_size == 6000);
    assert!(c.mean_size() == 2000);
    // Strict inequality: a repeat of the extreme does not displace it.
    let mut set = ClusterSet::new(ReportType::TempFile);
    set.add("K".to_string(), "k".to_string(), occ(1, Some(500)), 0, 0.0);
    set.add("K".to_string(), "k".to_string(), occ(2, Some(500)), 0, 0.0);
    let cs = set.into_sorted(SortBy::Count);
    assert!(cs[0].smallest.as_ref().unwrap().source_line == 1);
    assert!(cs[0].largest.as_ref().unwrap().source_line == 1);
}
