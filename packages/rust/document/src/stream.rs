//! Streaming extraction of matching subtrees from large XML files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::{debug, instrument};

use docweave_shared::{DocweaveError, Result};

use crate::path::ElementPath;
use crate::reader::{element_from_start, read_element_body, xml_error};
use crate::tree::Element;

/// Stream `file`, calling `f` with every element matching `rule`.
///
/// Only matching subtrees are built; everything else is skipped event by
/// event. Matches nested inside an earlier match are delivered as part of it,
/// not separately. Returns the number of elements delivered.
#[instrument(skip_all, fields(file = %file.display(), rule = %rule))]
pub fn stream_elements<F>(file: &Path, rule: &ElementPath, mut f: F) -> Result<usize>
where
    F: FnMut(Element) -> Result<()>,
{
    let handle = File::open(file).map_err(|e| DocweaveError::io(file, e))?;
    let mut reader = Reader::from_reader(BufReader::new(handle));
    let mut buf = Vec::new();
    let mut chain: Vec<Element> = Vec::new();
    let mut delivered = 0;

    let with_file = |e: DocweaveError| match e {
        DocweaveError::Parse { message } => {
            DocweaveError::parse(format!("{}: {message}", file.display()))
        }
        other => other,
    };

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| with_file(xml_error(&reader, e)))?;
        let (shell, is_empty) = match event {
            Event::Start(start) => (element_from_start(&start).map_err(with_file)?, false),
            Event::Empty(start) => (element_from_start(&start).map_err(with_file)?, true),
            Event::End(_) => {
                chain.pop();
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        chain.push(shell);
        if !rule.matches(&chain) {
            if is_empty {
                chain.pop();
            }
            continue;
        }

        let Some(shell) = chain.pop() else {
            continue;
        };
        let element = if is_empty {
            shell
        } else {
            read_element_body(&mut reader, shell, &mut buf).map_err(with_file)?
        };
        f(element)?;
        delivered += 1;
    }

    if !chain.is_empty() {
        return Err(with_file(DocweaveError::parse(format!(
            "unexpected end of input inside <{}>",
            chain.last().map(|el| el.name.as_str()).unwrap_or_default()
        ))));
    }

    debug!(delivered, "stream complete");
    Ok(delivered)
}
