//! Boundary-scan record location.
//!
//! Finds, inside one decoded payload, the record whose *own* identifier equals
//! a requested target. Identifier digits also show up inside unrelated records
//! (priority claims, continuation data, citations), so a textual hit is only a
//! candidate until the enclosing record has been parsed and its own identifier
//! read back.
//!
//! The scan is one pass of a single marker regex over the payload, shared by
//! all outstanding targets. For every hit on a target, the candidate span runs
//! from the nearest record start before the hit to the nearest record end
//! after it. Spans are parsed once per payload even when several hits fall in
//! the same record.
//!
//! The search is exhaustive: every hit of a target is tried before the target
//! is reported as absent from this payload.

use crate::config::RecordLayout;
use crate::ids::{TargetId, canonicalize};
use crate::xml::{XmlElement, parse_fragment};
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Byte range of one complete record inside a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordSpan {
    pub identifier: TargetId,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl RecordSpan {
    #[must_use]
    pub fn slice<'a>(&self, blob: &'a str) -> &'a str {
        &blob[self.start_offset..self.end_offset]
    }
}

/// A verified record together with its parsed tree.
#[derive(Clone, Debug)]
pub struct LocatedRecord {
    pub span: RecordSpan,
    pub document: XmlElement,
}

/// A candidate span with no usable own identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedSpan {
    pub offset: usize,
    pub reason: String,
}

/// Everything learned from scanning one payload.
#[derive(Debug, Default)]
pub struct LocateReport {
    /// Verified records, in payload order.
    pub found: Vec<LocatedRecord>,
    /// Distinct candidate spans that could not be verified at all.
    pub malformed: Vec<MalformedSpan>,
    /// Hits on outstanding targets, including cross-references.
    pub occurrences: usize,
    /// Hits whose enclosing record belonged to a different identifier.
    pub cross_references: usize,
}

impl LocateReport {
    #[must_use]
    pub fn found_ids(&self) -> HashSet<TargetId> {
        self.found.iter().map(|r| r.span.identifier).collect()
    }
}

enum Candidate {
    Parsed { own_id: TargetId, document: XmlElement },
    Malformed,
    Claimed,
}

pub struct Locator {
    layout: RecordLayout,
    marker: Regex,
    record_start: Regex,
    record_end: String,
}

impl Locator {
    /// Compile the marker patterns for a layout.
    ///
    /// # Errors
    /// Returns an error if the layout's tag names do not form valid patterns.
    pub fn new(layout: &RecordLayout) -> Result<Self> {
        let id_tag = regex::escape(&layout.id_tag);
        let record_tag = regex::escape(&layout.record_tag);
        let marker = Regex::new(&format!(r"<{id_tag}>\s*0*(\d+)\s*</{id_tag}>"))
            .with_context(|| format!("compile identifier marker for <{}>", layout.id_tag))?;
        let record_start = Regex::new(&format!(r"<{record_tag}(?:\s[^>]*)?>"))
            .with_context(|| format!("compile record start for <{}>", layout.record_tag))?;
        Ok(Self {
            layout: layout.clone(),
            marker,
            record_start,
            record_end: format!("</{}>", layout.record_tag),
        })
    }

    #[must_use]
    pub const fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Locate every outstanding target present in `blob`.
    #[must_use]
    pub fn locate(&self, blob: &str, outstanding: &HashSet<TargetId>) -> LocateReport {
        let mut report = LocateReport::default();
        if outstanding.is_empty() {
            return report;
        }

        // id -> hit offsets, in payload order
        let mut hits: BTreeMap<TargetId, Vec<usize>> = BTreeMap::new();
        for caps in self.marker.captures_iter(blob) {
            let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Ok(id) = canonicalize(digits.as_str()) else {
                continue;
            };
            if outstanding.contains(&id) {
                hits.entry(id).or_default().push(whole.start());
            }
        }
        if hits.is_empty() {
            return report;
        }

        let starts: Vec<usize> = self.record_start.find_iter(blob).map(|m| m.start()).collect();
        let ends: Vec<usize> = blob.match_indices(&self.record_end).map(|(i, _)| i).collect();

        let mut candidates: HashMap<(usize, usize), Candidate> = HashMap::new();
        for (id, offsets) in hits {
            for pos in offsets {
                report.occurrences += 1;
                let Some((start, end)) = enclosing_span(&starts, &ends, self.record_end.len(), pos) else {
                    debug!(id, offset = pos, "occurrence outside any record");
                    continue;
                };
                let entry = match candidates.entry((start, end)) {
                    Entry::Occupied(o) => o.into_mut(),
                    Entry::Vacant(v) => v.insert(self.parse_candidate(&blob[start..end], start, &mut report)),
                };
                let owned_by_target = matches!(entry, Candidate::Parsed { own_id, .. } if *own_id == id);
                if owned_by_target {
                    if let Candidate::Parsed { document, .. } = std::mem::replace(entry, Candidate::Claimed) {
                        report.found.push(LocatedRecord {
                            span: RecordSpan {
                                identifier: id,
                                start_offset: start,
                                end_offset: end,
                            },
                            document,
                        });
                    }
                    break;
                }
                if !matches!(entry, Candidate::Malformed) {
                    report.cross_references += 1;
                }
            }
        }
        report.found.sort_by_key(|r| r.span.start_offset);
        report
    }

    /// Locate a single identifier.
    #[must_use]
    pub fn locate_one(&self, blob: &str, id: TargetId) -> Option<LocatedRecord> {
        let outstanding = HashSet::from([id]);
        self.locate(blob, &outstanding).found.into_iter().next()
    }

    fn parse_candidate(&self, text: &str, offset: usize, report: &mut LocateReport) -> Candidate {
        let parsed = parse_fragment(text).and_then(|document| {
            let raw = document
                .find(&self.layout.own_id_path)
                .map(XmlElement::text_content)
                .with_context(|| format!("no <{}> in record", self.layout.own_id_path))?;
            let own_id = canonicalize(&raw)?;
            Ok(Candidate::Parsed { own_id, document })
        });
        parsed.unwrap_or_else(|err| {
            report.malformed.push(MalformedSpan {
                offset,
                reason: format!("{err:#}"),
            });
            Candidate::Malformed
        })
    }
}

/// Nearest record start before `pos` and nearest record end after it, or
/// `None` when `pos` is not inside a record.
fn enclosing_span(starts: &[usize], ends: &[usize], end_len: usize, pos: usize) -> Option<(usize, usize)> {
    let si = starts.partition_point(|&s| s < pos);
    let start = *starts.get(si.checked_sub(1)?)?;
    let ei = ends.partition_point(|&e| e < pos);
    // A record closed between `start` and `pos` means the hit sits between records.
    if ei > 0 && ends[ei - 1] > start {
        return None;
    }
    let end = ends.get(ei)? + end_len;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enclosing_span_picks_nearest_markers() {
        // <r>....</r><r>..X..</r>
        let starts = [0, 10];
        let ends = [6, 20];
        assert_eq!(enclosing_span(&starts, &ends, 4, 14), Some((10, 24)));
        assert_eq!(enclosing_span(&starts, &ends, 4, 3), Some((0, 10)));
    }

    #[test]
    fn enclosing_span_rejects_hits_between_records() {
        let starts = [0, 20];
        let ends = [6, 30];
        assert_eq!(enclosing_span(&starts, &ends, 4, 12), None);
        assert_eq!(enclosing_span(&[5], &[9], 4, 2), None);
        assert_eq!(enclosing_span(&[0], &[], 4, 2), None);
    }
}
