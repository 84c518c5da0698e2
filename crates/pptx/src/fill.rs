//! Placeholder substitution in slide XML.
//!
//! A placeholder is a text shape (`p:sp`) whose trimmed text equals a slot
//! name. Its paragraphs are replaced by one paragraph per line of the slot
//! value, reusing the first paragraph's properties and the first run's
//! formatting.

use crate::error::{PptxError, Result};
use crate::parser::local_name;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, BTreeSet};

/// Slide XML after substitution.
#[derive(Debug, Clone)]
pub struct FilledSlide {
    pub xml: String,

    /// Slot names that matched at least one placeholder.
    pub matched: BTreeSet<String>,
}

/// Replace every placeholder whose text is a key of `values`.
pub fn fill_placeholders(xml: &str, values: &BTreeMap<String, String>) -> Result<FilledSlide> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut matched = BTreeSet::new();

    let mut shape: Option<Vec<Event<'static>>> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event()?;
        let is_shape = |e: &BytesStart| local_name(e.name().as_ref()) == b"sp";

        if let Some(mut buffer) = shape.take() {
            match &event {
                Event::Start(e) if is_shape(e) => depth += 1,
                Event::End(e) if local_name(e.name().as_ref()) == b"sp" => depth -= 1,
                Event::Eof => {
                    return Err(PptxError::Xml("unterminated shape".to_string()));
                }
                _ => {}
            }
            buffer.push(event.into_owned());

            if depth == 0 {
                flush_shape(&mut writer, buffer, values, &mut matched)?;
            } else {
                shape = Some(buffer);
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(ref e) if is_shape(e) => {
                depth = 1;
                shape = Some(vec![event.into_owned()]);
            }
            other => writer.write_event(other)?,
        }
    }

    let xml = String::from_utf8(writer.into_inner())
        .map_err(|e| PptxError::Xml(format!("invalid UTF-8 in slide: {}", e)))?;
    Ok(FilledSlide { xml, matched })
}

fn flush_shape(
    writer: &mut Writer<Vec<u8>>,
    events: Vec<Event<'static>>,
    values: &BTreeMap<String, String>,
    matched: &mut BTreeSet<String>,
) -> Result<()> {
    let text = shape_text(&events);
    let events = match values.get(text.trim()) {
        Some(value) => {
            matched.insert(text.trim().to_string());
            rewrite_shape(events, value)
        }
        None => events,
    };

    for event in events {
        writer.write_event(event)?;
    }
    Ok(())
}

/// Concatenated run text of a shape, paragraphs separated by newlines.
fn shape_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    let mut in_text = false;

    for event in events {
        match event {
            Event::Start(e) if local_name(e.name().as_ref()) == b"t" => in_text = true,
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"t" => in_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_text => {
                text.push_str(&e.unescape().unwrap_or_default());
            }
            _ => {}
        }
    }

    text
}

fn rewrite_shape(events: Vec<Event<'static>>, value: &str) -> Vec<Event<'static>> {
    let Some(body_start) = events.iter().position(|e| {
        matches!(e, Event::Start(s) if local_name(s.name().as_ref()) == b"txBody")
    }) else {
        return events;
    };
    let body_end = span_end(&events, body_start);
    let inner = &events[body_start + 1..body_end];

    let mut kept = Vec::new();
    let mut paragraph_props: Option<Vec<Event<'static>>> = None;
    let mut run_props: Option<Vec<Event<'static>>> = None;
    let mut prefix: Option<String> = None;

    let mut i = 0;
    while i < inner.len() {
        let end = span_end(inner, i);
        match &inner[i] {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"p" => {
                if prefix.is_none() {
                    prefix = Some(prefix_of(e.name().as_ref()));
                    paragraph_props = find_span(&inner[i..=end], b"pPr");
                }
                if run_props.is_none() {
                    run_props = find_span(&inner[i..=end], b"rPr");
                }
            }
            _ => kept.extend_from_slice(&inner[i..=end]),
        }
        i = end + 1;
    }

    let prefix = prefix.unwrap_or_else(|| "a".to_string());
    let tag = |local: &str| qualified(&prefix, local);

    let mut out = events[..=body_start].to_vec();
    out.extend(kept);
    for line in value.split('\n') {
        out.push(Event::Start(BytesStart::new(tag("p"))));
        if let Some(props) = &paragraph_props {
            out.extend(props.iter().cloned());
        }
        if !line.is_empty() {
            out.push(Event::Start(BytesStart::new(tag("r"))));
            if let Some(props) = &run_props {
                out.extend(props.iter().cloned());
            }
            out.push(Event::Start(BytesStart::new(tag("t"))));
            out.push(Event::Text(BytesText::new(line).into_owned()));
            out.push(Event::End(BytesEnd::new(tag("t"))));
            out.push(Event::End(BytesEnd::new(tag("r"))));
        }
        out.push(Event::End(BytesEnd::new(tag("p"))));
    }
    out.extend_from_slice(&events[body_end..]);
    out
}

/// Index of the event closing the element that starts at `start`.
///
/// Non-start events span only themselves.
fn span_end(events: &[Event<'_>], start: usize) -> usize {
    if !matches!(events[start], Event::Start(_)) {
        return start;
    }

    let mut depth = 0usize;
    for (offset, event) in events[start..].iter().enumerate() {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return start + offset;
                }
            }
            _ => {}
        }
    }
    events.len() - 1
}

/// The first element named `local` within `events`, including its children.
fn find_span(events: &[Event<'static>], local: &[u8]) -> Option<Vec<Event<'static>>> {
    let start = events.iter().position(|e| match e {
        Event::Start(s) | Event::Empty(s) => local_name(s.name().as_ref()) == local,
        _ => false,
    })?;
    let end = span_end(events, start);
    Some(events[start..=end].to_vec())
}

/// Namespace prefix of a qualified name, e.g. `a` for `a:p`.
pub(crate) fn prefix_of(name: &[u8]) -> String {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => String::from_utf8_lossy(&name[..pos]).to_string(),
        None => String::new(),
    }
}

pub(crate) fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}
