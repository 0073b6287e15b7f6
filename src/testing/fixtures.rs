//! Record and archive fixtures.
//!
//! [`ApplicationXml`] renders records shaped like the bulk pre-grant
//! publication files: bibliographic data first (where other applications'
//! numbers show up as priority claims and continuation parents), then the
//! abstract, description and claims.

#[cfg(any(feature = "archive-zip", feature = "compression-gzip"))]
use anyhow::{Context, Result};
use std::fmt::Write as _;

/// Two flat records; the first mentions the second's number in its text.
#[must_use]
pub fn sample_blob() -> String {
    concat!(
        "<rec><id>0000123</id><txt>claim text here referencing claim 999</txt></rec>",
        "<rec><id>0000999</id><txt>second claim text, canceled</txt></rec>"
    )
    .to_string()
}

/// One flat record for [`RecordLayout::simple`](crate::RecordLayout::simple)`("rec", "id", "txt")`.
#[must_use]
pub fn simple_record(id: u64, text: &str) -> String {
    format!("<rec><id>{id:07}</id><txt>{text}</txt></rec>")
}

/// Flat records for every id, one per line.
#[must_use]
pub fn simple_blob(ids: impl IntoIterator<Item = u64>) -> String {
    let mut out = String::new();
    for id in ids {
        out.push_str(&simple_record(id, &format!("text of record {id}")));
        out.push('\n');
    }
    out
}

/// Zip archive holding the given `(name, contents)` members.
///
/// # Errors
/// Returns an error if the in-memory archive cannot be written.
#[cfg(feature = "archive-zip")]
pub fn zip_archive(members: &[(&str, &str)]) -> Result<Vec<u8>> {
    use std::io::Write;
    let mut zw = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, contents) in members {
        zw.start_file(*name, options)
            .with_context(|| format!("start zip member {name}"))?;
        zw.write_all(contents.as_bytes())
            .with_context(|| format!("write zip member {name}"))?;
    }
    Ok(zw.finish().context("finish zip")?.into_inner())
}

/// Gzip-compressed bytes.
///
/// # Errors
/// Returns an error if the in-memory stream cannot be written.
#[cfg(feature = "compression-gzip")]
pub fn gzip_bytes(contents: &str) -> Result<Vec<u8>> {
    use std::io::Write;
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(contents.as_bytes()).context("write gzip")?;
    enc.finish().context("finish gzip")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimXml {
    pub text: String,
    /// Claim number this claim depends on.
    pub depends_on: Option<u32>,
    /// `num` attribute; the zero-padded position when unset.
    pub num: Option<String>,
}

/// One classification entry, e.g. `G06F 17/30`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassificationXml {
    pub section: String,
    pub class: String,
    pub subclass: String,
    pub main_group: String,
    pub subgroup: String,
}

impl ClassificationXml {
    #[must_use]
    pub fn new(section: &str, class: &str, subclass: &str, main_group: &str, subgroup: &str) -> Self {
        Self {
            section: section.into(),
            class: class.into(),
            subclass: subclass.into(),
            main_group: main_group.into(),
            subgroup: subgroup.into(),
        }
    }

    fn write_parts(&self, x: &mut String) {
        let _ = write!(
            x,
            "<section>{}</section><class>{}</class><subclass>{}</subclass><main-group>{}</main-group><subgroup>{}</subgroup><symbol-position>F</symbol-position><classification-value>I</classification-value>",
            self.section, self.class, self.subclass, self.main_group, self.subgroup
        );
    }
}

/// Builder for one `us-patent-application` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationXml {
    /// Application number as printed, zero padding included.
    pub app_number: String,
    pub pgpub_number: String,
    pub pgpub_date: String,
    pub app_date: String,
    pub title: String,
    pub abstract_text: String,
    pub description: String,
    pub claims: Vec<ClaimXml>,
    /// Application numbers claimed as priority.
    pub priority: Vec<String>,
    /// Parent application numbers of a continuation.
    pub parents: Vec<String>,
    pub applicants: Vec<(String, String)>,
    pub assignee: Option<String>,
    pub main_cpc: Option<ClassificationXml>,
    pub ipcr: Option<ClassificationXml>,
}

impl ApplicationXml {
    pub fn new(app_number: impl Into<String>) -> Self {
        let app_number = app_number.into();
        Self {
            pgpub_number: format!("2014{:0>7}", app_number.trim_start_matches('0')),
            app_number,
            pgpub_date: "20140102".into(),
            app_date: "20120315".into(),
            title: "Widget".into(),
            abstract_text: "A widget.".into(),
            description: "The widget is described.".into(),
            claims: Vec::new(),
            priority: Vec::new(),
            parents: Vec::new(),
            applicants: Vec::new(),
            assignee: None,
            main_cpc: None,
            ipcr: None,
        }
    }

    #[must_use]
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn dates(mut self, pgpub: &str, filed: &str) -> Self {
        self.pgpub_date = pgpub.into();
        self.app_date = filed.into();
        self
    }

    #[must_use]
    pub fn claim(mut self, text: &str) -> Self {
        self.claims.push(ClaimXml {
            text: text.into(),
            depends_on: None,
            num: None,
        });
        self
    }

    /// An independent claim with an explicit `num` attribute.
    #[must_use]
    pub fn numbered_claim(mut self, num: &str, text: &str) -> Self {
        self.claims.push(ClaimXml {
            text: text.into(),
            depends_on: None,
            num: Some(num.into()),
        });
        self
    }

    #[must_use]
    pub fn dependent_claim(mut self, text: &str, depends_on: u32) -> Self {
        self.claims.push(ClaimXml {
            text: text.into(),
            depends_on: Some(depends_on),
            num: None,
        });
        self
    }

    #[must_use]
    pub fn priority(mut self, app_number: &str) -> Self {
        self.priority.push(app_number.into());
        self
    }

    #[must_use]
    pub fn parent(mut self, app_number: &str) -> Self {
        self.parents.push(app_number.into());
        self
    }

    #[must_use]
    pub fn applicant(mut self, last: &str, first: &str) -> Self {
        self.applicants.push((last.into(), first.into()));
        self
    }

    #[must_use]
    pub fn assignee(mut self, org: &str) -> Self {
        self.assignee = Some(org.into());
        self
    }

    #[must_use]
    pub fn main_cpc(mut self, entry: ClassificationXml) -> Self {
        self.main_cpc = Some(entry);
        self
    }

    #[must_use]
    pub fn ipcr(mut self, entry: ClassificationXml) -> Self {
        self.ipcr = Some(entry);
        self
    }

    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut x = String::new();
        let _ = write!(
            x,
            r#"<us-patent-application lang="EN" dtd-version="v4.2 2006-08-23" file="US{pg}-{d}.XML" country="US">"#,
            pg = self.pgpub_number,
            d = self.pgpub_date
        );
        x.push_str(r#"<us-bibliographic-data-application lang="EN" country="US">"#);
        let _ = write!(
            x,
            "<publication-reference><document-id><country>US</country><doc-number>{}</doc-number><kind>A1</kind><date>{}</date></document-id></publication-reference>",
            self.pgpub_number, self.pgpub_date
        );
        let _ = write!(
            x,
            r#"<application-reference appl-type="utility"><document-id><country>US</country><doc-number>{}</doc-number><date>{}</date></document-id></application-reference>"#,
            self.app_number, self.app_date
        );
        if !self.priority.is_empty() {
            x.push_str("<priority-claims>");
            for (i, p) in self.priority.iter().enumerate() {
                let _ = write!(
                    x,
                    r#"<priority-claim sequence="{:02}" kind="national"><country>US</country><doc-number>{p}</doc-number><date>20110101</date></priority-claim>"#,
                    i + 1
                );
            }
            x.push_str("</priority-claims>");
        }
        if let Some(ipcr) = &self.ipcr {
            x.push_str("<classifications-ipcr><classification-ipcr><ipc-version-indicator><date>20060101</date></ipc-version-indicator><classification-level>A</classification-level>");
            ipcr.write_parts(&mut x);
            x.push_str("</classification-ipcr></classifications-ipcr>");
        }
        if let Some(cpc) = &self.main_cpc {
            x.push_str("<classifications-cpc><main-cpc><classification-cpc><cpc-version-indicator><date>20130101</date></cpc-version-indicator>");
            cpc.write_parts(&mut x);
            x.push_str("</classification-cpc></main-cpc></classifications-cpc>");
        }
        let _ = write!(x, r#"<invention-title id="d0e71">{}</invention-title>"#, self.title);
        if !self.parents.is_empty() {
            x.push_str("<us-related-documents>");
            for p in &self.parents {
                let _ = write!(
                    x,
                    "<continuation><relation><parent-doc><document-id><country>US</country><doc-number>{p}</doc-number><date>20100505</date></document-id><parent-status>PENDING</parent-status></parent-doc><child-doc><document-id><country>US</country><doc-number>{}</doc-number></document-id></child-doc></relation></continuation>",
                    self.app_number
                );
            }
            x.push_str("</us-related-documents>");
        }
        if !self.applicants.is_empty() {
            x.push_str("<parties><applicants>");
            for (i, (last, first)) in self.applicants.iter().enumerate() {
                let _ = write!(
                    x,
                    r#"<applicant sequence="{:03}" app-type="applicant-inventor"><last-name>{last}</last-name><first-name>{first}</first-name></applicant>"#,
                    i + 1
                );
            }
            x.push_str("</applicants></parties>");
        }
        if let Some(org) = &self.assignee {
            let _ = write!(
                x,
                "<assignees><assignee><addressbook><orgname>{org}</orgname><role>02</role></addressbook></assignee></assignees>"
            );
        }
        x.push_str("</us-bibliographic-data-application>");
        let _ = write!(
            x,
            r#"<abstract id="abstract"><p id="p-0001" num="0000">{}</p></abstract>"#,
            self.abstract_text
        );
        let _ = write!(
            x,
            r#"<description id="description"><p id="p-0002" num="0001">{}</p></description>"#,
            self.description
        );
        x.push_str(r#"<claims id="claims">"#);
        for (i, c) in self.claims.iter().enumerate() {
            let n = i + 1;
            let num = c.num.clone().unwrap_or_else(|| format!("{n:05}"));
            let _ = write!(x, r#"<claim id="CLM-{n:05}" num="{num}"><claim-text>{n}. "#);
            match c.depends_on {
                Some(dep) => {
                    let _ = write!(
                        x,
                        r#"{} of <claim-ref idref="CLM-{dep:05}">claim {dep}</claim-ref>.</claim-text></claim>"#,
                        c.text
                    );
                }
                None => {
                    let _ = write!(x, "{}</claim-text></claim>", c.text);
                }
            }
        }
        x.push_str("</claims></us-patent-application>\n");
        x
    }
}

/// Concatenate records the way bulk files do, each with its own prolog.
#[must_use]
pub fn concatenated(records: &[ApplicationXml]) -> String {
    let mut out = String::new();
    for r in records {
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<!DOCTYPE us-patent-application SYSTEM \"us-patent-application-v42-2006-08-23.dtd\" [ ]>\n");
        out.push_str(&r.to_xml());
    }
    out
}
