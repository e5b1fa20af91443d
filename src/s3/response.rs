//! Interprets S3 XML response bodies.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::error::{AwsProtocolError, SignatureDiagnostics};
use super::{Error, Result};

/// Generic element tree: leaf elements hold text, others hold their children
/// keyed by local name (repeated elements keep document order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlValue {
    Text(String),
    Node(BTreeMap<String, Vec<XmlValue>>),
}

impl XmlValue {
    pub fn get(&self, name: &str) -> Option<&XmlValue> {
        self.get_all(name).first()
    }

    pub fn get_all(&self, name: &str) -> &[XmlValue] {
        match self {
            XmlValue::Node(children) => children.get(name).map(Vec::as_slice).unwrap_or(&[]),
            XmlValue::Text(_) => &[],
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            XmlValue::Text(text) => Some(text),
            XmlValue::Node(_) => None,
        }
    }

    /// Text of the first child named `name`, if it is a leaf.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(XmlValue::text)
    }
}

/// A successfully parsed, non-error response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// `None` for an empty body.
    pub root: Option<String>,
    pub value: XmlValue,
}

impl Document {
    pub fn empty() -> Self {
        Self {
            root: None,
            value: XmlValue::Node(BTreeMap::new()),
        }
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.value.child_text(name)
    }
}

/// Parses a response body, failing with a typed error if it is an `<Error>` document.
pub fn parse(body: &[u8]) -> Result<Document> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::empty());
    }

    let (root, value) = parse_tree(body)?;
    if root == "Error" {
        return Err(error_from(&value));
    }
    Ok(Document {
        root: Some(root),
        value,
    })
}

struct Frame {
    name: String,
    text: String,
    children: BTreeMap<String, Vec<XmlValue>>,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            text: String::new(),
            children: BTreeMap::new(),
        }
    }

    fn into_value(self) -> (String, XmlValue) {
        let value = if self.children.is_empty() {
            XmlValue::Text(self.text)
        } else {
            XmlValue::Node(self.children)
        };
        (self.name, value)
    }
}

fn parse_tree(body: &[u8]) -> Result<(String, XmlValue)> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, XmlValue)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(Frame::new(name));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                close(&mut stack, &mut root, Frame::new(name))?;
            }
            Event::Text(e) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| Error::MalformedResponse("unbalanced end tag".into()))?;
                close(&mut stack, &mut root, frame)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::MalformedResponse("unterminated element".into()));
    }
    root.ok_or_else(|| Error::MalformedResponse("no root element".into()))
}

fn close(
    stack: &mut [Frame],
    root: &mut Option<(String, XmlValue)>,
    frame: Frame,
) -> Result<()> {
    let (name, value) = frame.into_value();
    match stack.last_mut() {
        Some(parent) => {
            parent.children.entry(name).or_default().push(value);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some((name, value));
            Ok(())
        }
        None => Err(Error::MalformedResponse("multiple root elements".into())),
    }
}

fn non_empty(value: &XmlValue, name: &str) -> Option<String> {
    value
        .child_text(name)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn error_from(value: &XmlValue) -> Error {
    let mut err = AwsProtocolError {
        code: non_empty(value, "Code").unwrap_or_else(|| "AWSProvidedNoCodeError".to_string()),
        message: non_empty(value, "Message")
            .unwrap_or_else(|| "AWS provided no message".to_string()),
        request_id: non_empty(value, "RequestId"),
        host_id: non_empty(value, "HostId"),
        resource: non_empty(value, "Resource"),
        signature: None,
    };

    if err.code == "SignatureDoesNotMatch" {
        err.signature = Some(SignatureDiagnostics {
            access_key_id: non_empty(value, "AWSAccessKeyId"),
            string_to_sign: non_empty(value, "StringToSign"),
            canonical_request: non_empty(value, "CanonicalRequest"),
        });
        return Error::SignatureMismatch(err);
    }
    Error::Aws(err)
}
