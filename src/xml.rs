//! Minimal element tree for a single record fragment.
//!
//! A partition payload is many XML documents glued together, so it is never
//! parsed as a whole. Only the span around a candidate identifier is handed to
//! [`parse_fragment`], which builds a small owned tree with the handful of
//! lookups the extractor needs: descendant path search, text content, and the
//! "leading text" of an element.

use anyhow::{Result, anyhow, bail};
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::borrow::Cow;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// All descendant elements in document order, excluding `self`.
    #[must_use]
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        let mut stack: Vec<&XmlElement> = self.child_elements().collect();
        stack.reverse();
        while let Some(el) = stack.pop() {
            out.push(el);
            let mut kids: Vec<&XmlElement> = el.child_elements().collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Concatenated text of this element and all descendants.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Text before the first child element.
    #[must_use]
    pub fn leading_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(_) => break,
            }
        }
        out
    }

    /// First element matching `a/b/c`, where `a` may sit at any depth
    /// (including `self`) and each later step is a direct child.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&XmlElement> {
        self.find_all(path).into_iter().next()
    }

    /// All elements matching `a/b/c` in document order of their `a` anchor.
    #[must_use]
    pub fn find_all(&self, path: &str) -> Vec<&XmlElement> {
        let mut steps = path.split('/').filter(|s| !s.is_empty());
        let Some(first) = steps.next() else {
            return Vec::new();
        };
        let rest: Vec<&str> = steps.collect();

        let mut anchors: Vec<&XmlElement> = Vec::new();
        if self.name == first {
            anchors.push(self);
        }
        anchors.extend(self.descendants().into_iter().filter(|e| e.name == first));

        let mut out = Vec::new();
        for anchor in anchors {
            let mut frontier = vec![anchor];
            for step in &rest {
                frontier = frontier
                    .into_iter()
                    .flat_map(|e| e.child_elements().filter(|c| c.name == *step))
                    .collect();
            }
            out.extend(frontier);
        }
        out
    }
}

fn lossy(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

fn unescaped(raw: &str) -> String {
    unescape(raw).map_or_else(|_| raw.to_string(), Cow::into_owned)
}

fn push_text(stack: &mut [XmlElement], text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(top) = stack.last_mut() {
        if let Some(XmlNode::Text(prev)) = top.children.last_mut() {
            prev.push_str(&text);
        } else {
            top.children.push(XmlNode::Text(text));
        }
    }
}

/// Parse one record fragment into a tree rooted at its first element.
///
/// Content after the root element closes is ignored.
///
/// # Errors
/// Returns an error on malformed markup, mismatched end tags, or a fragment
/// with no root element or an unclosed root.
pub fn parse_fragment(text: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<XmlElement> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| anyhow!("xml error at byte {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Start(start) => {
                let name = lossy(start.name().as_ref()).into_owned();
                let attributes = start
                    .attributes()
                    .filter_map(Result::ok)
                    .map(|a| (lossy(a.key.as_ref()).into_owned(), unescaped(&lossy(&a.value))))
                    .collect();
                stack.push(XmlElement::new(name, attributes));
            }
            Event::Empty(start) => {
                let name = lossy(start.name().as_ref()).into_owned();
                let attributes = start
                    .attributes()
                    .filter_map(Result::ok)
                    .map(|a| (lossy(a.key.as_ref()).into_owned(), unescaped(&lossy(&a.value))))
                    .collect();
                let el = XmlElement::new(name, attributes);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(el)),
                    None => return Ok(el),
                }
            }
            Event::End(_) => {
                let Some(done) = stack.pop() else {
                    bail!("unexpected end tag at byte {}", reader.buffer_position());
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(done)),
                    None => return Ok(done),
                }
            }
            Event::Text(t) => push_text(&mut stack, unescaped(&lossy(&t))),
            Event::CData(c) => push_text(&mut stack, lossy(&c).into_owned()),
            Event::GeneralRef(r) => {
                let raw = format!("&{};", lossy(&r));
                push_text(&mut stack, unescaped(&raw));
            }
            Event::Eof => {
                if stack.is_empty() {
                    bail!("fragment has no root element");
                }
                bail!("unclosed element <{}>", stack[stack.len() - 1].name);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_fragment() {
        let el = parse_fragment(
            r#"<rec lang="en"><id>0007</id><body>a <b>bold</b> &amp; plain</body></rec>"#,
        )
        .unwrap();
        assert_eq!(el.name, "rec");
        assert_eq!(el.attribute("lang"), Some("en"));
        assert_eq!(el.find("id").unwrap().text_content(), "0007");
        assert_eq!(el.find("body").unwrap().text_content(), "a bold & plain");
        assert_eq!(el.find("body").unwrap().leading_text(), "a ");
    }

    #[test]
    fn path_lookup_anchors_anywhere() {
        let el = parse_fragment(
            "<r><x><a><b>1</b></a></x><a><b>2</b><b>3</b></a></r>",
        )
        .unwrap();
        let all: Vec<String> = el.find_all("a/b").iter().map(|e| e.text_content()).collect();
        assert_eq!(all, vec!["1", "2", "3"]);
        assert!(el.find("b/a").is_none());
    }

    #[test]
    fn rejects_mismatched_and_unclosed() {
        assert!(parse_fragment("<a><b></a>").is_err());
        assert!(parse_fragment("<a><b></b>").is_err());
        assert!(parse_fragment("just text").is_err());
    }
}
