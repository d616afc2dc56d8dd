//! quick-xml event handling shared by tree parsing and streaming.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use docweave_shared::{DocweaveError, Result};

use crate::tree::{Element, Node};

/// Parse the first root element of `bytes`; anything after it is ignored.
pub(crate) fn read_root(bytes: &[u8]) -> Result<Element> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(&reader, e))?;
        let root = match event {
            Event::Start(start) => element_from_start(&start)?,
            Event::Empty(start) => return element_from_start(&start),
            Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => continue,
            Event::Text(_) | Event::CData(_) => {
                return Err(DocweaveError::parse("text outside of the root element"));
            }
            Event::End(_) => return Err(DocweaveError::parse("end tag before any root element")),
            Event::Eof => return Err(DocweaveError::parse("no root element found")),
            _ => continue,
        };
        return read_element_body(&mut reader, root, &mut buf);
    }
}

/// Build an attribute-complete, childless element from a start tag.
pub fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut el = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            DocweaveError::parse(format!("malformed attribute in <{}>: {e}", el.name))
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocweaveError::parse(format!("bad value for attribute '{key}': {e}")))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

/// Read events up to the end tag that closes `element`, whose start tag has
/// already been consumed, and return it with its children filled in.
pub fn read_element_body<R: BufRead>(
    reader: &mut Reader<R>,
    element: Element,
    buf: &mut Vec<u8>,
) -> Result<Element> {
    let mut stack = vec![element];
    loop {
        buf.clear();
        let event = reader
            .read_event_into(buf)
            .map_err(|e| xml_error(reader, e))?;
        match event {
            Event::Start(start) => stack.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let el = element_from_start(&start)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(el));
                }
            }
            Event::End(_) => {
                let Some(done) = stack.pop() else {
                    return Err(DocweaveError::parse("unbalanced end tag"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(done)),
                    None => return Ok(done),
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| xml_error(reader, e))?;
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(text.as_ref());
                }
            }
            Event::CData(cdata) => {
                let text = String::from_utf8_lossy(&cdata).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(text);
                }
            }
            Event::Eof => {
                let open = stack.last().map(|el| el.name.as_str()).unwrap_or_default();
                return Err(DocweaveError::parse(format!(
                    "unexpected end of input inside <{open}>"
                )));
            }
            _ => {}
        }
    }
}

pub(crate) fn xml_error<R>(reader: &Reader<R>, err: impl std::fmt::Display) -> DocweaveError {
    DocweaveError::parse(format!(
        "{err} (at byte {})",
        reader.buffer_position()
    ))
}
