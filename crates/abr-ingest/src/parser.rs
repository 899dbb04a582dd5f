//! Streaming record parser for ABR bulk extract XML
//!
//! A bulk extract is a single document holding a flat sequence of `<ABR>`
//! elements. [`RecordStream`] pulls events from `quick-xml` and materializes
//! one record subtree at a time as an owned [`XmlNode`]; everything outside
//! a record element is discarded as it is read, so memory stays bounded by
//! the largest single record.
//!
//! ```no_run
//! use abr_ingest::parser::RecordStream;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! for record in RecordStream::open("20240101_Public01.xml")? {
//!     let record = record?;
//!     println!("{}", record.text("ABN"));
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{IngestError, Result};
use flate2::read::MultiGzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Element name of one registry record
pub const RECORD_TAG: &str = "ABR";

const READ_BUFFER_BYTES: usize = 1024 * 1024;

/// Fatal parse failure; the rest of the document is not read
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{source}")]
    Xml {
        position: u64,
        records: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("document ended inside an open element")]
    UnexpectedEof { position: u64, records: u64 },
}

impl ParseError {
    /// Approximate byte offset into the (decompressed) document
    pub fn position(&self) -> u64 {
        match self {
            ParseError::Xml { position, .. } | ParseError::UnexpectedEof { position, .. } => {
                *position
            }
        }
    }

    /// Records successfully yielded before the failure
    pub fn records(&self) -> u64 {
        match self {
            ParseError::Xml { records, .. } | ParseError::UnexpectedEof { records, .. } => {
                *records
            }
        }
    }
}

// ============================================================================
// Record Handle
// ============================================================================

/// Owned element subtree of one record
///
/// Lookups never fail: a missing element or attribute reads as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Own text content, entity-unescaped
    pub fn own_text(&self) -> &str {
        &self.text
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute on this element, `""` when absent
    pub fn attr(&self, key: &str) -> &str {
        self.attribute(key).unwrap_or("")
    }

    /// First element matching `path`
    ///
    /// Paths are `/`-separated child names relative to this node. A leading
    /// `//` lets the first segment match at any depth.
    pub fn find(&self, path: &str) -> Option<&XmlNode> {
        let (descendant, segments) = split_path(path);
        if segments.is_empty() {
            return None;
        }
        if descendant {
            self.find_descendant(&segments)
        } else {
            self.find_path(&segments)
        }
    }

    /// Every element matching `path`, in document order
    pub fn find_all(&self, path: &str) -> Vec<&XmlNode> {
        let (descendant, segments) = split_path(path);
        let mut found = Vec::new();
        if segments.is_empty() {
            return found;
        }
        if descendant {
            self.collect_descendant(&segments, &mut found);
        } else {
            self.collect_path(&segments, &mut found);
        }
        found
    }

    /// Text of the first element matching `path`, `""` when absent
    pub fn text(&self, path: &str) -> &str {
        self.find(path).map(XmlNode::own_text).unwrap_or("")
    }

    /// Attribute of the first element matching `path`, `""` when absent
    pub fn attr_at(&self, path: &str, key: &str) -> &str {
        self.find(path).map(|node| node.attr(key)).unwrap_or("")
    }

    fn find_path(&self, segments: &[&str]) -> Option<&XmlNode> {
        let (first, rest) = segments.split_first()?;
        self.children
            .iter()
            .filter(|child| child.name == *first)
            .find_map(|child| {
                if rest.is_empty() {
                    Some(child)
                } else {
                    child.find_path(rest)
                }
            })
    }

    fn find_descendant(&self, segments: &[&str]) -> Option<&XmlNode> {
        self.children.iter().find_map(|child| {
            let here = if child.name == segments[0] {
                if segments.len() == 1 {
                    Some(child)
                } else {
                    child.find_path(&segments[1..])
                }
            } else {
                None
            };
            here.or_else(|| child.find_descendant(segments))
        })
    }

    fn collect_path<'a>(&'a self, segments: &[&str], found: &mut Vec<&'a XmlNode>) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };
        for child in self.children.iter().filter(|child| child.name == *first) {
            if rest.is_empty() {
                found.push(child);
            } else {
                child.collect_path(rest, found);
            }
        }
    }

    fn collect_descendant<'a>(&'a self, segments: &[&str], found: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if child.name == segments[0] {
                if segments.len() == 1 {
                    found.push(child);
                } else {
                    child.collect_path(&segments[1..], found);
                }
            }
            child.collect_descendant(segments, found);
        }
    }
}

fn split_path(path: &str) -> (bool, Vec<&str>) {
    let (descendant, rest) = match path.strip_prefix("//") {
        Some(rest) => (true, rest),
        None => (false, path),
    };
    let segments = rest.split('/').filter(|s| !s.is_empty()).collect();
    (descendant, segments)
}

// ============================================================================
// Record Stream
// ============================================================================

/// Input reader for a bulk extract, plain or gzip-compressed
pub type InputReader = Box<dyn BufRead + Send>;

/// Lazy, forward-only sequence of records in document order
///
/// The stream is finite and cannot be restarted. After the first error it
/// yields nothing further.
pub struct RecordStream<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    record_tag: String,
    /// Open elements outside the current record
    outer_depth: usize,
    /// Partially built subtree, outermost first
    stack: Vec<XmlNode>,
    records: u64,
    finished: bool,
}

impl RecordStream<InputReader> {
    /// Open a bulk extract file, decompressing `*.gz` transparently
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IngestError::io(path.display().to_string(), e))?;

        let is_gzip = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        let input: InputReader = if is_gzip {
            Box::new(BufReader::with_capacity(
                READ_BUFFER_BYTES,
                MultiGzDecoder::new(file),
            ))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, file))
        };

        Ok(Self::new(input))
    }
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(input: R) -> Self {
        Self::with_record_tag(input, RECORD_TAG)
    }

    pub fn with_record_tag(input: R, record_tag: &str) -> Self {
        let mut reader = Reader::from_reader(input);
        // Text segments are kept verbatim across CDATA and comments; callers trim.
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;

        Self {
            reader,
            buf: Vec::with_capacity(8192),
            record_tag: record_tag.to_string(),
            outer_depth: 0,
            stack: Vec::new(),
            records: 0,
            finished: false,
        }
    }

    /// Bytes consumed from the (decompressed) input
    pub fn byte_position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn next_record(&mut self) -> std::result::Result<Option<XmlNode>, ParseError> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => return Err(xml_error(&self.reader, self.records, e)),
            };

            match event {
                Event::Start(ref start) => {
                    let in_record = !self.stack.is_empty();
                    let is_record = !in_record && local_name(start) == self.record_tag;
                    if in_record || is_record {
                        match element_from(start) {
                            Ok(node) => self.stack.push(node),
                            Err(e) => return Err(xml_error(&self.reader, self.records, e)),
                        }
                    } else {
                        self.outer_depth += 1;
                    }
                }
                Event::End(_) => {
                    if let Some(node) = self.stack.pop() {
                        match self.stack.last_mut() {
                            Some(parent) => parent.children.push(node),
                            None => {
                                self.records += 1;
                                return Ok(Some(node));
                            }
                        }
                    } else {
                        self.outer_depth = self.outer_depth.saturating_sub(1);
                    }
                }
                Event::Text(ref text) => {
                    if let Some(node) = self.stack.last_mut() {
                        match text.unescape() {
                            Ok(value) => node.text.push_str(&value),
                            Err(e) => return Err(xml_error(&self.reader, self.records, e)),
                        }
                    }
                }
                Event::CData(ref data) => {
                    if let Some(node) = self.stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(data));
                    }
                }
                Event::Eof => {
                    if !self.stack.is_empty() || self.outer_depth > 0 {
                        return Err(ParseError::UnexpectedEof {
                            position: self.reader.buffer_position() as u64,
                            records: self.records,
                        });
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = std::result::Result<XmlNode, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_record() {
            Ok(Some(node)) => Some(Ok(node)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}

fn xml_error<R>(reader: &Reader<R>, records: u64, source: quick_xml::Error) -> ParseError {
    ParseError::Xml {
        position: reader.buffer_position() as u64,
        records,
        source,
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn element_from(start: &BytesStart<'_>) -> std::result::Result<XmlNode, quick_xml::Error> {
    let mut node = XmlNode::new(local_name(start));
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TWO_RECORDS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Transfer>
  <ABR recordLastUpdatedDate="20180312" replaced="N">
    <ABN status="ACT" ABNStatusFromDate="19991101">11000002568</ABN>
    <MainEntity>
      <NonIndividualName type="MN">
        <NonIndividualNameText>Smith &amp; Sons</NonIndividualNameText>
      </NonIndividualName>
      <BusinessAddress>
        <AddressDetails><State>NSW</State><Postcode>2526</Postcode></AddressDetails>
      </BusinessAddress>
    </MainEntity>
    <OtherEntity><NonIndividualName type="TRD"><NonIndividualNameText>ONE</NonIndividualNameText></NonIndividualName></OtherEntity>
    <OtherEntity><NonIndividualName type="BN"><NonIndividualNameText>TWO</NonIndividualNameText></NonIndividualName></OtherEntity>
    <GST status="ACT" GSTStatusFromDate="20000701" />
  </ABR>
  <ABR recordLastUpdatedDate="20200101">
    <ABN status="CAN" ABNStatusFromDate="20010101">22000002568</ABN>
    <LegalEntity>
      <BusinessAddress><AddressDetails><State>VIC</State></AddressDetails></BusinessAddress>
    </LegalEntity>
  </ABR>
</Transfer>"#;

    fn stream(xml: &str) -> RecordStream<Cursor<Vec<u8>>> {
        RecordStream::new(Cursor::new(xml.as_bytes().to_vec()))
    }

    #[test]
    fn test_yields_records_in_order() {
        let records: Vec<_> = stream(TWO_RECORDS).collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("ABN"), "11000002568");
        assert_eq!(records[1].text("ABN"), "22000002568");
        assert_eq!(records[0].attr("recordLastUpdatedDate"), "20180312");
    }

    #[test]
    fn test_path_lookups() {
        let record = stream(TWO_RECORDS).next().unwrap().unwrap();

        assert_eq!(record.attr_at("ABN", "status"), "ACT");
        assert_eq!(
            record.text("MainEntity/NonIndividualName/NonIndividualNameText"),
            "Smith & Sons"
        );
        assert_eq!(record.attr_at("MainEntity/NonIndividualName", "type"), "MN");
        assert_eq!(record.text("//BusinessAddress/AddressDetails/Postcode"), "2526");
        assert_eq!(record.attr_at("GST", "GSTStatusFromDate"), "20000701");

        let names = record.find_all("OtherEntity/NonIndividualName");
        let types: Vec<_> = names.iter().map(|n| n.attr("type")).collect();
        assert_eq!(types, vec!["TRD", "BN"]);
    }

    #[test]
    fn test_missing_nodes_read_empty() {
        let record = stream(TWO_RECORDS).nth(1).unwrap().unwrap();
        assert!(record.find("MainEntity").is_none());
        assert_eq!(record.text("MainEntity/NonIndividualName/NonIndividualNameText"), "");
        assert_eq!(record.attr_at("GST", "status"), "");
        assert_eq!(record.text("//BusinessAddress/AddressDetails/State"), "VIC");
        assert_eq!(record.text("//BusinessAddress/AddressDetails/Postcode"), "");
        assert!(record.find_all("ASICNumber").is_empty());
    }

    #[test]
    fn test_descendant_match_at_any_depth() {
        let node = XmlNode::new("ABR").with_child(
            XmlNode::new("A").with_child(
                XmlNode::new("B").with_child(XmlNode::new("C").with_text("deep")),
            ),
        );
        assert_eq!(node.text("//B/C"), "deep");
        assert_eq!(node.text("//C"), "deep");
        assert_eq!(node.find_all("//C").len(), 1);
        assert_eq!(node.text("B/C"), "");
    }

    #[test]
    fn test_cdata_is_text() {
        let xml = "<Transfer><ABR><ABN><![CDATA[123]]></ABN></ABR></Transfer>";
        let record = stream(xml).next().unwrap().unwrap();
        assert_eq!(record.text("ABN"), "123");
    }

    #[test]
    fn test_text_split_by_cdata_and_comments_keeps_spaces() {
        let xml = "<Transfer><ABR>\
            <N>Smith <![CDATA[&]]> Sons</N>\
            <M>Alpha <!-- c --> Beta</M>\
            <E>Smith &amp; Sons</E>\
            </ABR></Transfer>";
        let record = stream(xml).next().unwrap().unwrap();

        assert_eq!(record.text("N"), "Smith & Sons");
        assert_eq!(record.text("M"), "Alpha  Beta");
        assert_eq!(record.text("E"), "Smith & Sons");
        assert_eq!(abr_common::normalize_name(record.text("M")), "alpha beta");
    }

    #[test]
    fn test_surrounding_whitespace_is_preserved() {
        let xml = "<Transfer>\n  <ABR>\n    <ABN> 11000002568 </ABN>\n  </ABR>\n</Transfer>";
        let record = stream(xml).next().unwrap().unwrap();
        assert_eq!(record.text("ABN"), " 11000002568 ");
    }

    #[test]
    fn test_mismatched_tag_is_fatal() {
        let xml = "<Transfer><ABR><ABN>1</ABN></ABR><ABR><ABN>2</Name></ABR></Transfer>";
        let mut records = stream(xml);

        assert!(records.next().unwrap().is_ok());
        let err = records.next().unwrap().unwrap_err();
        assert_eq!(err.records(), 1);
        assert!(err.position() > 0);
        assert!(records.next().is_none());
    }

    #[test]
    fn test_truncated_document_is_fatal() {
        let xml = "<Transfer><ABR><ABN>1</ABN></ABR><ABR><ABN>2</ABN>";
        let results: Vec<_> = stream(xml).collect();
        assert_eq!(results.len(), 2);
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.records(), 1);
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(stream("<Transfer></Transfer>").count(), 0);
        assert_eq!(stream("<Transfer/>").count(), 0);
    }
}
