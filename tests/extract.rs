//! Tests for field extraction.

use ironsift::error::ExtractError;
use ironsift::extract::{Extraction, normalize_text};
use ironsift::testing::{ApplicationXml, ClassificationXml, concatenated, sample_blob};
use ironsift::{ClaimRecord, Extractor, Locator, Provenance, RecordLayout};
use serde_json::Value;
use std::collections::HashMap;

fn provenance() -> Provenance {
    Provenance {
        partition_key: "2014".into(),
        sub_file: "ipa140102.xml".into(),
    }
}

fn extract_all(layout: &RecordLayout, blob: &str, ids: &[u64], keep_raw: bool) -> HashMap<u64, Extraction> {
    let locator = Locator::new(layout).unwrap();
    let extractor = Extractor::new(layout.clone(), 30, keep_raw);
    let report = locator.locate(blob, &ids.iter().copied().collect());
    report
        .found
        .iter()
        .map(|rec| (rec.span.identifier, extractor.extract(rec, blob, &provenance())))
        .collect()
}

fn json_map(s: &str) -> HashMap<String, String> {
    let v: Value = serde_json::from_str(s).unwrap();
    v.as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_string()))
        .collect()
}

#[test]
fn test_scenario_blob() {
    let layout = RecordLayout::simple("rec", "id", "txt");
    let out = extract_all(&layout, &sample_blob(), &[123, 999], false);
    assert_eq!(out.len(), 2);

    let r123 = &out[&123].record;
    assert_eq!(r123.app_id, 123);
    assert_eq!(r123.claim_text, "claim text here referencing claim 999");
    assert!(!r123.cancelled);
    assert!(r123.independent);
    assert_eq!(r123.first_independent_claim, r123.claim_text);
    assert_eq!(r123.claim_count, 1);

    let r999 = &out[&999].record;
    assert_eq!(r999.claim_text, "second claim text, canceled");
    assert!(r999.cancelled);
    assert_eq!(r999.first_independent_claim, "");
    assert_eq!(r999.partition_key, "2014");
    assert_eq!(r999.sub_file, "ipa140102.xml");

    assert!(out.values().all(|e| e.warnings.is_empty()));
}

#[test]
fn test_application_fields() {
    let app = ApplicationXml::new("13123456")
        .title("Widget \n\t frame")
        .claim("A widget comprising a frame.")
        .dependent_claim("The widget", 1)
        .priority("12999999")
        .parent("12000001")
        .applicant("Doe", "Jane")
        .assignee("Acme Corp");
    let blob = concatenated(&[app]);
    let out = extract_all(&RecordLayout::us_application(), &blob, &[13_123_456], false);
    let e = &out[&13_123_456];
    assert!(e.warnings.is_empty());
    let r = &e.record;

    assert_eq!(r.app_id, 13_123_456);
    assert_eq!(r.pgpub_number, "201413123456");
    assert_eq!(r.pgpub_country, "US");
    assert_eq!(r.pgpub_kind, "A1");
    assert_eq!(r.pgpub_date, "2014-01-02");
    assert_eq!(r.app_country, "US");
    assert_eq!(r.app_date, "2012-03-15");
    assert_eq!(r.invention_title, "Widget frame");
    assert_eq!(r.abstract_text, "A widget.");
    assert_eq!(r.description, "The widget is described.");

    assert_eq!(r.claim_count, 2);
    assert_eq!(r.claim_text, "1. A widget comprising a frame.");
    assert!(r.independent);
    assert!(!r.cancelled);
    assert_eq!(r.first_independent_claim, "1. A widget comprising a frame.");

    let pubs = json_map(&r.publication_identifiers);
    assert_eq!(pubs["pgpub_doc-number"], "201413123456");
    assert_eq!(pubs["pgpub_kind"], "A1");
    let apps = json_map(&r.application_identifiers);
    assert_eq!(apps["app_doc-number"], "13123456");

    let priority = json_map(&r.priority_claims);
    assert_eq!(priority["priority_claims_doc-number_1"], "12999999");
    assert_eq!(priority["priority_claims_country_1"], "US");

    let parents = json_map(&r.parent_doc);
    assert_eq!(parents["parent_doc_doc-number_1"], "12000001");
    let children = json_map(&r.child_doc);
    assert_eq!(children["child_doc_doc-number_1"], "13123456");

    let related = json_map(&r.us_related_documents);
    assert!(related["usreldoc_relation_1"].contains("12000001"));

    let assignee = json_map(&r.assignee);
    assert_eq!(assignee["assignee_orgname_1"], "Acme Corp");
    assert!(json_map(&r.parties).contains_key("parties_applicant_1"));

    assert!(r.full_text.contains("Widget frame"));
    assert!(r.raw_xml.is_empty());
}

#[test]
fn test_dependent_and_cancelled_claims() {
    let app = ApplicationXml::new("13000001")
        .claim("(canceled)")
        .dependent_claim("The widget", 1)
        .claim("A gadget having a lever.");
    let blob = concatenated(&[app]);
    let out = extract_all(&RecordLayout::us_application(), &blob, &[13_000_001], false);
    let r = &out[&13_000_001].record;

    assert_eq!(r.claim_text, "1. (canceled)");
    assert!(r.cancelled);
    assert!(r.independent);
    assert_eq!(r.first_independent_claim, "3. A gadget having a lever.");
    assert_eq!(r.claim_count, 3);
}

#[test]
fn test_every_claim_is_listed() -> anyhow::Result<()> {
    let app = ApplicationXml::new("13000003")
        .claim("(canceled)")
        .dependent_claim("The widget", 1)
        .numbered_claim("3-5", "A gadget having a lever.");
    let blob = concatenated(&[app]);
    let out = extract_all(&RecordLayout::us_application(), &blob, &[13_000_003], false);
    let e = &out[&13_000_003];

    let expected = vec![
        ClaimRecord {
            num: "00001".into(),
            number: 1,
            text: "1. (canceled)".into(),
            cancelled: true,
            independent: true,
        },
        ClaimRecord {
            num: "00002".into(),
            number: 2,
            text: "2. The widget of claim 1.".into(),
            cancelled: false,
            independent: false,
        },
        ClaimRecord {
            num: "3-5".into(),
            number: -1,
            text: "3. A gadget having a lever.".into(),
            cancelled: false,
            independent: true,
        },
    ];
    assert_eq!(e.claims, expected);
    assert_eq!(e.record.claim_records()?, expected);
    assert_eq!(e.record.claim_count, 3);
    assert_eq!(e.record.first_independent_claim, "3. A gadget having a lever.");
    Ok(())
}

#[test]
fn test_main_classifications() {
    let app = ApplicationXml::new("13000004")
        .claim("A widget.")
        .main_cpc(ClassificationXml::new("H", "04", "L", "9", "32"))
        .ipcr(ClassificationXml::new("G", "06", "F", "17", "30"));
    let blob = concatenated(&[app]);
    let out = extract_all(&RecordLayout::us_application(), &blob, &[13_000_004], false);
    let e = &out[&13_000_004];
    assert!(e.warnings.is_empty());
    let r = &e.record;

    assert_eq!(r.cpc_main_subclass, "H04L");
    let cpc = json_map(&r.cpc_main_identifiers);
    assert_eq!(cpc["section"], "H");
    assert_eq!(cpc["main-group"], "9");
    assert_eq!(cpc["subgroup"], "32");
    assert_eq!(cpc["cpc-version-indicator"], "20130101");
    let ipcr = json_map(&r.ipcr_main_identifiers);
    assert_eq!(ipcr["subclass"], "F");
    assert_eq!(ipcr["classification-level"], "A");
    assert_eq!(ipcr["date"], "20060101");
}

#[test]
fn test_subclass_falls_back_to_ipcr() {
    let app = ApplicationXml::new("13000005")
        .claim("A widget.")
        .ipcr(ClassificationXml::new("G", "06", "Q", "10", "00"));
    let blob = concatenated(&[app]);
    let out = extract_all(&RecordLayout::us_application(), &blob, &[13_000_005], false);
    let r = &out[&13_000_005].record;

    assert_eq!(r.cpc_main_subclass, "G06Q");
    assert_eq!(r.cpc_main_identifiers, "");
    assert!(!r.ipcr_main_identifiers.is_empty());
}

#[test]
fn test_incomplete_main_cpc_defaults_with_warning() {
    let app = ApplicationXml::new("13000006")
        .claim("A widget.")
        .main_cpc(ClassificationXml::new("H", "", "L", "9", "32"));
    let blob = concatenated(&[app]);
    let out = extract_all(&RecordLayout::us_application(), &blob, &[13_000_006], false);
    let e = &out[&13_000_006];

    assert_eq!(e.record.cpc_main_subclass, "");
    assert_eq!(e.warnings.len(), 1);
    assert!(matches!(
        &e.warnings[0],
        ExtractError::FieldExtraction { id: 13_000_006, field: "cpc_main_subclass", .. }
    ));
    assert_eq!(e.record.claim_text, "1. A widget.");
}

#[test]
fn test_unparsable_date_defaults_with_warning() {
    let app = ApplicationXml::new("13000002")
        .dates("20141399", "20120315")
        .claim("A widget.");
    let blob = concatenated(&[app]);
    let out = extract_all(&RecordLayout::us_application(), &blob, &[13_000_002], false);
    let e = &out[&13_000_002];

    assert_eq!(e.record.pgpub_date, "");
    assert_eq!(e.record.app_date, "2012-03-15");
    assert_eq!(e.warnings.len(), 1);
    assert!(matches!(
        &e.warnings[0],
        ExtractError::FieldExtraction { id: 13_000_002, field: "pgpub_date", .. }
    ));
    // The rest of the record survives.
    assert_eq!(e.record.claim_text, "1. A widget.");
}

#[test]
fn test_missing_fields_default_to_empty() {
    let layout = RecordLayout::simple("rec", "id", "txt");
    let blob = "<rec><id>7</id></rec>";
    let out = extract_all(&layout, blob, &[7], false);
    let e = &out[&7];

    assert!(e.warnings.is_empty());
    let r = &e.record;
    assert_eq!(r.pgpub_number, "");
    assert_eq!(r.pgpub_date, "");
    assert_eq!(r.invention_title, "");
    assert_eq!(r.claim_text, "");
    assert_eq!(r.claim_count, 0);
    assert!(!r.cancelled);
    assert!(!r.independent);
    assert_eq!(r.publication_identifiers, "");
    assert_eq!(r.parties, "");
    assert_eq!(r.claims, "");
    assert_eq!(r.cpc_main_subclass, "");
    assert_eq!(r.ipcr_main_identifiers, "");
}

#[test]
fn test_raw_xml_kept_when_configured() {
    let layout = RecordLayout::simple("rec", "id", "txt");
    let blob = sample_blob();
    let out = extract_all(&layout, &blob, &[999], true);
    assert_eq!(
        out[&999].record.raw_xml,
        "<rec><id>0000999</id><txt>second claim text, canceled</txt></rec>"
    );
}

#[test]
fn test_entities_are_decoded() {
    let layout = RecordLayout::simple("rec", "id", "txt");
    let blob = "<rec><id>8</id><txt>nuts &amp; bolts &lt;M6&gt;</txt></rec>";
    let out = extract_all(&layout, blob, &[8], false);
    assert_eq!(out[&8].record.claim_text, "nuts & bolts <M6>");
}

#[test]
fn test_normalize_text_handles_markup_whitespace() {
    assert_eq!(normalize_text("  1.\tA  widget,\r\n comprising:  "), "1. A widget, comprising:");
    assert_eq!(normalize_text(""), "");
}
