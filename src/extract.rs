//! Field extraction from a located record.
//!
//! Turns a verified record tree into the flat [`ExtractedRecord`] schema.
//! Every field is optional in practice: vintages of the corpus drop or rename
//! elements, so a missing element yields an empty value, and a value that is
//! present but unreadable (an impossible date, say) is defaulted and reported
//! as a warning. A bad field never costs the whole record.

use crate::config::RecordLayout;
use crate::error::ExtractError;
use crate::ids::TargetId;
use crate::locate::LocatedRecord;
use crate::xml::XmlElement;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// One extracted record. Field order is the output column order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub app_id: TargetId,
    pub pgpub_number: String,
    pub pgpub_country: String,
    pub pgpub_kind: String,
    /// `YYYY-MM-DD` or empty.
    pub pgpub_date: String,
    pub app_country: String,
    /// `YYYY-MM-DD` or empty.
    pub app_date: String,
    /// Section, class and subclass of the main CPC classification, e.g.
    /// `G06F`. Falls back to the first IPCR entry when no main CPC is given.
    pub cpc_main_subclass: String,
    /// JSON map of the main CPC classification's elements.
    pub cpc_main_identifiers: String,
    /// JSON map of the first IPCR classification's elements.
    pub ipcr_main_identifiers: String,
    pub invention_title: String,
    pub abstract_text: String,
    pub description: String,
    /// Text of the first claim.
    pub claim_text: String,
    /// The first claim is a cancellation stub.
    pub cancelled: bool,
    /// The first claim references no other claim.
    pub independent: bool,
    /// First claim that is neither cancelled nor dependent.
    pub first_independent_claim: String,
    pub claim_count: u32,
    /// JSON list of every claim, see [`ClaimRecord`].
    pub claims: String,
    pub publication_identifiers: String,
    pub application_identifiers: String,
    pub us_related_documents: String,
    pub parties: String,
    pub assignee: String,
    pub priority_claims: String,
    pub parent_doc: String,
    pub child_doc: String,
    pub full_text: String,
    pub raw_xml: String,
    pub partition_key: String,
    pub sub_file: String,
}

impl ExtractedRecord {
    /// Decode the `claims` column.
    ///
    /// # Errors
    /// Returns the JSON error if the column holds something other than a
    /// claim list.
    pub fn claim_records(&self) -> serde_json::Result<Vec<ClaimRecord>> {
        if self.claims.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.claims)
    }
}

/// One claim of a record, in document order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// The `num` attribute as printed, e.g. `00003`.
    pub num: String,
    /// `num` as an integer, or -1 when it is not one.
    pub number: i64,
    pub text: String,
    pub cancelled: bool,
    pub independent: bool,
}

/// Where a record came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Provenance {
    pub partition_key: String,
    pub sub_file: String,
}

/// A record plus the fields that had to be defaulted.
#[derive(Debug)]
pub struct Extraction {
    pub record: ExtractedRecord,
    pub claims: Vec<ClaimRecord>,
    pub warnings: Vec<ExtractError>,
}

/// Collapse markup residue and whitespace runs; trims the result.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A claim is a cancellation stub when its letters spell out "canceled" and
/// little else (`"4. (canceled)"`, `"Claims 1-20 (Cancelled)"`).
#[must_use]
pub fn is_cancelled(text: &str, max_letters: usize) -> bool {
    let letters: String = text
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    (letters.contains("canceled") || letters.contains("cancelled")) && letters.len() < max_letters
}

/// A claim is independent when its claim text carries no claim reference
/// among its immediate children.
#[must_use]
pub fn is_independent(claim: &XmlElement, claim_ref_tag: &str) -> bool {
    let scope = claim.child_elements().next().unwrap_or(claim);
    !scope.child_elements().any(|c| c.name == claim_ref_tag)
}

/// `YYYYMMDD` to `YYYY-MM-DD`; empty input stays empty.
///
/// # Errors
/// Returns the parse error for non-empty input that is not a valid date.
pub fn normalize_date(raw: &str) -> Result<String, chrono::ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(String::new());
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").map(|d| d.format("%Y-%m-%d").to_string())
}

pub struct Extractor {
    layout: RecordLayout,
    cancel_max_letters: usize,
    keep_raw_xml: bool,
}

struct FieldCtx {
    id: TargetId,
    warnings: Vec<ExtractError>,
}

impl FieldCtx {
    fn defaulted(&mut self, field: &'static str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(id = self.id, field, %reason, "field defaulted");
        self.warnings.push(ExtractError::FieldExtraction {
            id: self.id,
            field,
            reason,
        });
    }

    fn date(&mut self, field: &'static str, raw: &str) -> String {
        normalize_date(raw).unwrap_or_else(|e| {
            self.defaulted(field, format!("unparsable date {raw:?}: {e}"));
            String::new()
        })
    }

    fn json(&mut self, field: &'static str, map: &BTreeMap<String, String>) -> String {
        if map.is_empty() {
            return String::new();
        }
        self.encode(field, map)
    }

    fn json_list<T: Serialize>(&mut self, field: &'static str, items: &[T]) -> String {
        if items.is_empty() {
            return String::new();
        }
        self.encode(field, items)
    }

    fn encode<T: Serialize + ?Sized>(&mut self, field: &'static str, value: &T) -> String {
        serde_json::to_string(value).unwrap_or_else(|e| {
            self.defaulted(field, e.to_string());
            String::new()
        })
    }

    /// Section, class and subclass of the first entry under `anchor`.
    fn subclass(&mut self, doc: &XmlElement, anchor: &str) -> Option<String> {
        let entry = doc.find(anchor)?.child_elements().next()?;
        let part = |tag: &str| {
            entry
                .child_elements()
                .find(|c| c.name == tag)
                .map(|c| normalize_text(&c.text_content()))
                .filter(|t| !t.is_empty())
        };
        match (part("section"), part("class"), part("subclass")) {
            (Some(section), Some(class), Some(subclass)) => Some(format!("{section}{class}{subclass}")),
            _ => {
                self.defaulted("cpc_main_subclass", format!("incomplete {anchor} entry"));
                None
            }
        }
    }
}

impl Extractor {
    #[must_use]
    pub fn new(layout: RecordLayout, cancel_max_letters: usize, keep_raw_xml: bool) -> Self {
        Self {
            layout,
            cancel_max_letters,
            keep_raw_xml,
        }
    }

    /// Build the output record for a located span of `blob`.
    #[must_use]
    pub fn extract(&self, located: &LocatedRecord, blob: &str, provenance: &Provenance) -> Extraction {
        let doc = &located.document;
        let mut ctx = FieldCtx {
            id: located.span.identifier,
            warnings: Vec::new(),
        };
        let text_at = |path: &str| doc.find(path).map(|e| normalize_text(&e.text_content())).unwrap_or_default();

        let pgpub_date = ctx.date("pgpub_date", &text_at("publication-reference/document-id/date"));
        let app_date = ctx.date("app_date", &text_at("application-reference/document-id/date"));

        let claims: Vec<ClaimRecord> = doc
            .find_all(&self.layout.claims_path)
            .into_iter()
            .map(|claim| self.claim_record(claim))
            .collect();
        let (claim_text, cancelled, independent) = claims
            .first()
            .map(|c| (c.text.clone(), c.cancelled, c.independent))
            .unwrap_or_default();
        let first_independent_claim = claims
            .iter()
            .find(|c| !c.cancelled && c.independent)
            .map(|c| c.text.clone())
            .unwrap_or_default();
        let claims_json = ctx.json_list("claims", &claims);

        let cpc_main_subclass = ctx
            .subclass(doc, "main-cpc")
            .or_else(|| ctx.subclass(doc, "classifications-ipcr"))
            .unwrap_or_default();
        let cpc_main_identifiers = ctx.json("cpc_main_identifiers", &classification_map(doc, "main-cpc"));
        let ipcr_main_identifiers = ctx.json("ipcr_main_identifiers", &classification_map(doc, "classifications-ipcr"));

        let publication_identifiers = ctx.json("publication_identifiers", &descendant_map(doc, "publication-reference", "pgpub"));
        let application_identifiers = ctx.json("application_identifiers", &descendant_map(doc, "application-reference", "app"));
        let us_related_documents = ctx.json("us_related_documents", &grouped_map(doc, "us-related-documents", "usreldoc", true));
        let parties = ctx.json("parties", &grouped_map(doc, "parties", "parties", false));
        let assignee = ctx.json("assignee", &grouped_map(doc, "assignee", "assignee", false));
        let priority_claims = ctx.json("priority_claims", &grouped_map(doc, "priority-claims", "priority_claims", false));
        let parent_doc = ctx.json("parent_doc", &grouped_map(doc, "parent-doc", "parent_doc", false));
        let child_doc = ctx.json("child_doc", &grouped_map(doc, "child-doc", "child_doc", false));

        let record = ExtractedRecord {
            app_id: located.span.identifier,
            pgpub_number: text_at("publication-reference/document-id/doc-number"),
            pgpub_country: text_at("publication-reference/document-id/country"),
            pgpub_kind: text_at("publication-reference/document-id/kind"),
            pgpub_date,
            app_country: text_at("application-reference/document-id/country"),
            app_date,
            cpc_main_subclass,
            cpc_main_identifiers,
            ipcr_main_identifiers,
            invention_title: text_at("invention-title"),
            abstract_text: text_at("abstract"),
            description: text_at("description"),
            claim_text,
            cancelled,
            independent,
            first_independent_claim,
            claim_count: u32::try_from(claims.len()).unwrap_or(u32::MAX),
            claims: claims_json,
            publication_identifiers,
            application_identifiers,
            us_related_documents,
            parties,
            assignee,
            priority_claims,
            parent_doc,
            child_doc,
            full_text: normalize_text(&doc.text_content()),
            raw_xml: if self.keep_raw_xml {
                located.span.slice(blob).to_string()
            } else {
                String::new()
            },
            partition_key: provenance.partition_key.clone(),
            sub_file: provenance.sub_file.clone(),
        };
        Extraction {
            record,
            claims,
            warnings: ctx.warnings,
        }
    }

    fn claim_record(&self, claim: &XmlElement) -> ClaimRecord {
        let num = claim.attribute("num").map(str::trim).unwrap_or_default().to_string();
        let text = normalize_text(&claim.text_content());
        ClaimRecord {
            number: num.parse().unwrap_or(-1),
            cancelled: is_cancelled(&text, self.cancel_max_letters),
            independent: is_independent(claim, &self.layout.claim_ref_tag),
            num,
            text,
        }
    }
}

/// Tag → text over the descendants of the first entry under `anchor`.
fn classification_map(doc: &XmlElement, anchor: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(entry) = doc.find(anchor).and_then(|el| el.child_elements().next()) {
        for d in entry.descendants() {
            out.insert(d.name.clone(), normalize_text(&d.text_content()));
        }
    }
    out
}

/// `{prefix}_{tag}` → leading text, over all descendants of the first `anchor`.
fn descendant_map(doc: &XmlElement, anchor: &str, prefix: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(el) = doc.find(anchor) {
        for d in el.descendants() {
            out.insert(format!("{prefix}_{}", d.name), normalize_text(&d.leading_text()));
        }
    }
    out
}

/// `{prefix}_{tag}_{n}` over grandchildren of the first `anchor`, where `n`
/// counts the anchor's children from 1.
fn grouped_map(doc: &XmlElement, anchor: &str, prefix: &str, full_text: bool) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(el) = doc.find(anchor) {
        for (n, child) in el.child_elements().enumerate() {
            for item in child.child_elements() {
                let text = if full_text { item.text_content() } else { item.leading_text() };
                out.insert(format!("{prefix}_{}_{}", item.name, n + 1), normalize_text(&text));
            }
        }
    }
    out
}
