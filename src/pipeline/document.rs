//! FB2 document loading and rewriting.
//!
//! The document is kept as the ordered list of events quick-xml produced,
//! each owned and untouched. Only `<binary>` elements of the FictionBook 2.0
//! namespace are lifted out into [`BinaryNode`]s that can be edited. When
//! the document is written back, every other event is emitted verbatim, so
//! structure, whitespace, comments and entity spelling survive as-is.
//!
//! quick-xml imposes no ceiling on text node size, which matters here: a
//! single cover image is routinely several megabytes of base64.

use crate::error::{BinaryError, Fb2CompressError};
use crate::output::SkipReason;
use crate::pipeline::encode;
use crate::pipeline::transcode::Transcoded;
use encoding_rs::{Encoding, UTF_8};
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Writer};
use tracing::debug;

/// Namespace URI of FictionBook 2.0 documents.
pub const FB2_NAMESPACE: &str = "http://www.gribuser.ru/xml/fictionbook/2.0";

const BINARY_TAG: &[u8] = b"binary";
const CONTENT_TYPE_ATTR: &str = "content-type";

enum Item {
    Event(Event<'static>),
    /// Index into [`Fb2Document::binaries`].
    Binary(usize),
}

/// A parsed, editable FB2 document.
pub struct Fb2Document {
    items: Vec<Item>,
    binaries: Vec<BinaryNode>,
    /// Position of the XML declaration in `items`, if the input had one.
    declaration: Option<usize>,
}

/// One `<binary>` element.
///
/// Holds the start tag and the text that immediately follows it. Anything
/// after that text, including child elements and the closing tag, stays in
/// the document's event list.
pub struct BinaryNode {
    start: BytesStart<'static>,
    self_closing: bool,
    text: Vec<Event<'static>>,
    modified: bool,
}

/// What [`BinaryNode::extract_payload`] found.
#[derive(Debug)]
pub enum Payload {
    /// An image node with its decoded bytes.
    Image {
        id: String,
        content_type: String,
        bytes: Vec<u8>,
    },
    /// Not something to process; the node stays as it is.
    Skipped(SkipReason),
}

impl Fb2Document {
    /// Parse a document from UTF-8 text.
    ///
    /// Fails on malformed markup, mismatched or unclosed elements, a missing
    /// root element, and content after the root element.
    pub fn parse(xml: &str) -> Result<Self, Fb2CompressError> {
        let mut reader = NsReader::from_str(xml);

        let mut items = Vec::new();
        let mut binaries: Vec<BinaryNode> = Vec::new();
        let mut declaration = None;
        let mut depth = 0usize;
        let mut seen_root = false;
        // Binary node currently receiving its leading text.
        let mut collecting: Option<usize> = None;

        loop {
            let (ns, event) = match reader.read_resolved_event() {
                Ok(pair) => pair,
                Err(e) => {
                    return Err(parse_error(
                        e.to_string(),
                        reader.buffer_position(),
                    ))
                }
            };
            let in_fb2 = matches!(
                ns,
                ResolveResult::Bound(Namespace(uri)) if uri == FB2_NAMESPACE.as_bytes()
            );
            let event = event.into_owned();

            if let Some(idx) = collecting {
                if matches!(event, Event::Text(_) | Event::CData(_)) {
                    binaries[idx].text.push(event);
                    continue;
                }
                collecting = None;
            }

            match event {
                Event::Eof => break,
                Event::Decl(_) if items.is_empty() => {
                    declaration = Some(0);
                    items.push(Item::Event(event));
                }
                Event::Start(_) | Event::Empty(_) => {
                    if depth == 0 && seen_root {
                        return Err(parse_error(
                            "extra content after the document element",
                            reader.buffer_position(),
                        ));
                    }
                    seen_root = true;
                    let self_closing = matches!(event, Event::Empty(_));
                    if !self_closing {
                        depth += 1;
                    }

                    let binary_start = match &event {
                        Event::Start(e) | Event::Empty(e)
                            if in_fb2 && e.local_name().as_ref() == BINARY_TAG =>
                        {
                            Some(e.clone())
                        }
                        _ => None,
                    };
                    match binary_start {
                        Some(start) => {
                            let idx = binaries.len();
                            binaries.push(BinaryNode {
                                start,
                                self_closing,
                                text: Vec::new(),
                                modified: false,
                            });
                            items.push(Item::Binary(idx));
                            if !self_closing {
                                collecting = Some(idx);
                            }
                        }
                        None => items.push(Item::Event(event)),
                    }
                }
                Event::End(_) => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        parse_error("closing tag without an open element", reader.buffer_position())
                    })?;
                    items.push(Item::Event(event));
                }
                Event::Text(_) if depth == 0 => {
                    let blank =
                        matches!(&event, Event::Text(t) if t.iter().all(u8::is_ascii_whitespace));
                    if !blank {
                        return Err(parse_error(
                            "text outside the document element",
                            reader.buffer_position(),
                        ));
                    }
                    items.push(Item::Event(event));
                }
                _ => items.push(Item::Event(event)),
            }
        }

        if depth > 0 {
            return Err(parse_error(
                format!("unexpected end of document, {depth} element(s) left open"),
                reader.buffer_position(),
            ));
        }
        if !seen_root {
            return Err(parse_error("document has no root element", reader.buffer_position()));
        }

        debug!(
            "Parsed FB2 document: {} events, {} binary node(s)",
            items.len(),
            binaries.len()
        );

        Ok(Self {
            items,
            binaries,
            declaration,
        })
    }

    /// All `<binary>` nodes in the FB2 namespace, in document order.
    pub fn binaries(&self) -> &[BinaryNode] {
        &self.binaries
    }

    pub fn binaries_mut(&mut self) -> &mut [BinaryNode] {
        &mut self.binaries
    }

    /// Serialise the document as UTF-8 with an XML declaration.
    ///
    /// A declaration naming a non-UTF-8 encoding is rewritten; a missing one
    /// is added. Everything else outside modified nodes is written verbatim.
    pub fn to_xml(&self) -> Result<Vec<u8>, Fb2CompressError> {
        let mut writer = Writer::new(Vec::new());

        if self.declaration.is_none() {
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(write_error)?;
            writer
                .write_event(Event::Text(BytesText::from_escaped("\n")))
                .map_err(write_error)?;
        }

        for (i, item) in self.items.iter().enumerate() {
            match item {
                Item::Event(Event::Decl(decl)) if self.declaration == Some(i) => {
                    writer
                        .write_event(Event::Decl(utf8_declaration(decl)))
                        .map_err(write_error)?;
                }
                Item::Event(event) => writer.write_event(event).map_err(write_error)?,
                Item::Binary(idx) => self.binaries[*idx]
                    .write_to(&mut writer)
                    .map_err(write_error)?,
            }
        }

        Ok(writer.into_inner())
    }
}

impl BinaryNode {
    /// The `id` attribute, if present.
    pub fn id(&self) -> Option<String> {
        self.attribute(b"id")
    }

    /// The `content-type` attribute, if present.
    pub fn content_type(&self) -> Option<String> {
        self.attribute(CONTENT_TYPE_ATTR.as_bytes())
    }

    /// Unescaped leading text of the element (empty if there is none).
    pub fn text(&self) -> Result<String, quick_xml::Error> {
        let mut out = String::new();
        for event in &self.text {
            match event {
                Event::Text(t) => out.push_str(&t.unescape()?),
                Event::CData(c) => out.push_str(&String::from_utf8_lossy(c)),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Whether [`apply`](Self::apply) has rewritten this node.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Decide whether this node is a processable image and decode it.
    ///
    /// Checks run in order: `id` and `content-type` present, non-blank text,
    /// `content-type` starting with `image/`. Only then is the text decoded;
    /// malformed base64 is an error for this node alone.
    pub fn extract_payload(&self) -> Result<Payload, BinaryError> {
        let Some(id) = self.id().filter(|s| !s.is_empty()) else {
            return Ok(Payload::Skipped(SkipReason::MissingId));
        };
        let Some(content_type) = self.content_type().filter(|s| !s.is_empty()) else {
            return Ok(Payload::Skipped(SkipReason::MissingContentType));
        };

        let text = self.text().map_err(|e| BinaryError::Base64 {
            id: id.clone(),
            detail: e.to_string(),
        })?;
        if text.trim().is_empty() {
            return Ok(Payload::Skipped(SkipReason::EmptyPayload));
        }

        if !content_type.starts_with("image/") {
            return Ok(Payload::Skipped(SkipReason::NotAnImage { content_type }));
        }

        let bytes = encode::decode_payload(&text).map_err(|e| BinaryError::Base64 {
            id: id.clone(),
            detail: e.to_string(),
        })?;

        Ok(Payload::Image {
            id,
            content_type,
            bytes,
        })
    }

    /// Replace the payload with `result` and update `content-type`.
    ///
    /// Attribute order and every other attribute are preserved.
    pub fn apply(&mut self, result: &Transcoded) -> Result<(), quick_xml::Error> {
        let name = String::from_utf8_lossy(self.start.name().as_ref()).into_owned();
        let mut start = BytesStart::new(name);
        let mut replaced = false;

        for attr in self.start.attributes() {
            let attr = attr?;
            if attr.key.as_ref() == CONTENT_TYPE_ATTR.as_bytes() {
                start.push_attribute((CONTENT_TYPE_ATTR, result.content_type));
                replaced = true;
            } else {
                start.push_attribute(attr);
            }
        }
        if !replaced {
            start.push_attribute((CONTENT_TYPE_ATTR, result.content_type));
        }

        let b64 = encode::encode_payload(&result.bytes);
        self.start = start;
        self.text = vec![Event::Text(BytesText::new(&b64).into_owned())];
        self.modified = true;
        Ok(())
    }

    fn attribute(&self, name: &[u8]) -> Option<String> {
        self.start
            .attributes()
            .flatten()
            .find(|a| a.key.as_ref() == name)
            .map(|a| match a.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
            })
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), quick_xml::Error> {
        if self.self_closing && !self.modified {
            return writer.write_event(Event::Empty(self.start.borrow()));
        }

        writer.write_event(Event::Start(self.start.borrow()))?;
        for event in &self.text {
            writer.write_event(event)?;
        }
        // A non-empty element's closing tag lives in the document's event list.
        if self.self_closing {
            writer.write_event(Event::End(self.start.to_end()))?;
        }
        Ok(())
    }
}

/// The declaration to emit for UTF-8 output.
fn utf8_declaration(decl: &BytesDecl<'static>) -> BytesDecl<'static> {
    let is_utf8 = match decl.encoding() {
        None => true,
        Some(Ok(label)) => Encoding::for_label(&label) == Some(UTF_8),
        Some(Err(_)) => false,
    };
    if is_utf8 {
        return decl.clone();
    }

    let version = decl
        .version()
        .map(|v| String::from_utf8_lossy(&v).into_owned())
        .unwrap_or_else(|_| "1.0".to_string());
    let standalone = decl
        .standalone()
        .and_then(Result::ok)
        .map(|s| String::from_utf8_lossy(&s).into_owned());

    BytesDecl::new(&version, Some("UTF-8"), standalone.as_deref())
}

fn parse_error(detail: impl std::fmt::Display, position: impl std::fmt::Display) -> Fb2CompressError {
    Fb2CompressError::Parse {
        detail: format!("{detail} (at byte {position})"),
    }
}

fn write_error(e: quick_xml::Error) -> Fb2CompressError {
    Fb2CompressError::Internal(format!("XML serialisation failed: {e}"))
}
