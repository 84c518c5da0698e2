//! PPTX template package reading.

use crate::error::{PptxError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

/// Relationship type suffixes we act on.
pub(crate) const REL_SLIDE: &str = "/slide";
pub(crate) const REL_SLIDE_LAYOUT: &str = "/slideLayout";
pub(crate) const REL_NOTES_SLIDE: &str = "/notesSlide";

/// A template presentation held in memory.
///
/// Only the first slide is used; its text shapes are the slot placeholders.
#[derive(Debug, Clone)]
pub struct TemplateAsset {
    /// Every part of the package, keyed by its path inside the archive.
    parts: BTreeMap<String, Vec<u8>>,

    /// Path of the first slide, e.g. `ppt/slides/slide1.xml`.
    slide_path: String,
}

impl TemplateAsset {
    /// Open a template file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), &path.display().to_string())
    }

    /// Read a template package from a reader.
    pub fn from_reader<R: Read + Seek>(reader: R, label: &str) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| PptxError::Zip(format!("Failed to open ZIP: {}", e)))?;

        let mut parts = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| PptxError::Zip(format!("Failed to read '{}': {}", name, e)))?;
            parts.insert(name, data);
        }

        let slide_path = get_slide_order(&parts)?
            .into_iter()
            .next()
            .ok_or_else(|| PptxError::NoSlides(label.to_string()))?;

        log::debug!("Template {} uses {}", label, slide_path);
        Ok(Self { parts, slide_path })
    }

    pub fn parts(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    /// Read a part as UTF-8 text.
    pub fn part_str(&self, name: &str) -> Result<&str> {
        let bytes = self
            .part(name)
            .ok_or_else(|| PptxError::MissingPart(name.to_string()))?;
        std::str::from_utf8(bytes).map_err(|e| PptxError::Xml(format!("'{}': {}", name, e)))
    }

    pub fn slide_path(&self) -> &str {
        &self.slide_path
    }

    pub fn slide_xml(&self) -> Result<&str> {
        self.part_str(&self.slide_path)
    }

    /// Relationships of the first slide; empty if the slide has none.
    pub fn slide_relationships(&self) -> Result<Vec<Relationship>> {
        let rels_path = rels_path_for(&self.slide_path);
        if self.part(&rels_path).is_none() {
            return Ok(Vec::new());
        }
        parse_relationships(self.part_str(&rels_path)?)
    }

    /// Archive path of the layout used by the first slide.
    pub fn slide_layout_path(&self) -> Result<Option<String>> {
        let base = parent_dir(&self.slide_path);
        Ok(self
            .slide_relationships()?
            .into_iter()
            .find(|r| r.rel_type.ends_with(REL_SLIDE_LAYOUT) && !r.external)
            .map(|r| resolve_target(base, &r.target)))
    }

    /// Trimmed text of every text shape on the first slide, in document order.
    pub fn placeholders(&self) -> Result<Vec<String>> {
        extract_shape_texts(self.slide_xml()?)
    }

    pub fn content_types(&self) -> Result<ContentTypes> {
        ContentTypes::parse(self.part_str(CONTENT_TYPES)?)
    }
}

/// Path of the package content-types part.
pub(crate) const CONTENT_TYPES: &str = "[Content_Types].xml";

/// Path of the presentation relationships part.
pub(crate) const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// Path of the presentation part.
pub(crate) const PRESENTATION: &str = "ppt/presentation.xml";

/// One entry of a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// Parse the relationships in a `.rels` part.
pub fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut rels = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let mut rel = Relationship {
                    id: String::new(),
                    rel_type: String::new(),
                    target: String::new(),
                    external: false,
                };

                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
                    match attr.key.as_ref() {
                        b"Id" => rel.id = value,
                        b"Type" => rel.rel_type = value,
                        b"Target" => rel.target = value,
                        b"TargetMode" => rel.external = value == "External",
                        _ => {}
                    }
                }
                rels.push(rel);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PptxError::Xml(format!(
                    "Error parsing relationships: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(rels)
}

/// Default and override content types of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    /// Extension (lowercase, no dot) to content type.
    pub defaults: BTreeMap<String, String>,

    /// Part name (with leading slash) to content type.
    pub overrides: BTreeMap<String, String>,
}

impl ContentTypes {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut types = Self::default();

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    let name = e.name();
                    let kind = local_name(name.as_ref());
                    if kind != b"Default" && kind != b"Override" {
                        continue;
                    }

                    let mut key = String::new();
                    let mut content_type = String::new();
                    for attr in e.attributes().flatten() {
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        match attr.key.as_ref() {
                            b"Extension" | b"PartName" => key = value,
                            b"ContentType" => content_type = value,
                            _ => {}
                        }
                    }

                    if kind == b"Default" {
                        types.defaults.insert(key.to_lowercase(), content_type);
                    } else {
                        types.overrides.insert(key, content_type);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PptxError::Xml(format!("Error parsing content types: {}", e)));
                }
                _ => {}
            }
        }

        Ok(types)
    }
}

/// Get the ordered list of slide paths.
///
/// The order is the presentation's `p:sldIdLst`. Packages without one fall
/// back to the numbering of the slide relationships.
fn get_slide_order(parts: &BTreeMap<String, Vec<u8>>) -> Result<Vec<String>> {
    let rels_content = parts
        .get(PRESENTATION_RELS)
        .ok_or_else(|| PptxError::MissingPart(PRESENTATION_RELS.to_string()))?;
    let rels_content = String::from_utf8_lossy(rels_content);

    let slide_rels: BTreeMap<String, String> = parse_relationships(&rels_content)?
        .into_iter()
        .filter(|r| r.rel_type.ends_with(REL_SLIDE))
        .map(|r| (r.id, resolve_target("ppt", &r.target)))
        .collect();

    if let Some(presentation) = parts.get(PRESENTATION) {
        let listed: Vec<String> = slide_list_ids(&String::from_utf8_lossy(presentation))?
            .iter()
            .filter_map(|id| slide_rels.get(id).cloned())
            .collect();
        if !listed.is_empty() {
            return Ok(listed);
        }
    }

    let mut slides: Vec<(String, Option<usize>)> = slide_rels
        .into_iter()
        .map(|(id, path)| {
            // Extract slide number from rId or target for ordering
            let order_num = extract_slide_number(&id).or_else(|| extract_slide_number(&path));
            (path, order_num)
        })
        .collect();

    // Sort slides by their number
    slides.sort_by(|a, b| match (a.1, b.1) {
        (Some(na), Some(nb)) => na.cmp(&nb),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.0.cmp(&b.0),
    });

    Ok(slides.into_iter().map(|(path, _)| path).collect())
}

/// Relationship ids of the `p:sldId` entries in `presentation.xml`, in list order.
fn slide_list_ids(presentation: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut reader = Reader::from_str(presentation);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if local_name(e.name().as_ref()) == b"sldId" =>
            {
                // `r:id` names the relationship; the bare `id` is the slide id.
                let rel_id = e.attributes().flatten().find(|attr| {
                    let key = attr.key.as_ref();
                    key != b"id" && local_name(key) == b"id"
                });
                if let Some(attr) = rel_id {
                    ids.push(String::from_utf8_lossy(&attr.value).into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PptxError::Xml(format!("Error parsing presentation: {}", e)));
            }
            _ => {}
        }
    }

    Ok(ids)
}

/// Collect the trimmed text of each shape (`p:sp`) in a slide.
///
/// Paragraphs within a shape are joined with newlines.
pub fn extract_shape_texts(xml_content: &str) -> Result<Vec<String>> {
    let mut texts = Vec::new();
    let mut reader = Reader::from_str(xml_content);

    let mut in_shape = false;
    let mut in_text = false;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" => {
                    in_shape = true;
                    current_text.clear();
                }
                b"t" if in_shape => in_text = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => {
                let text = e.unescape().unwrap_or_default();
                current_text.push_str(&text);
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"t" => in_text = false,
                b"p" if in_shape => current_text.push('\n'),
                b"sp" => {
                    let text = current_text.trim();
                    if !text.is_empty() {
                        texts.push(text.to_string());
                    }
                    current_text.clear();
                    in_shape = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(PptxError::Xml(format!("Error parsing slide: {}", e))),
            _ => {}
        }
    }

    Ok(texts)
}

/// Extract the local name from a potentially namespaced XML element name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Extract a slide number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    // Remove common extensions first
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");

    // Try to find digits at the end
    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}

/// Resolve a relationship target against the directory of its source part.
///
/// `resolve_target("ppt/slides", "../media/image1.png")` is `ppt/media/image1.png`.
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Directory part of an archive path.
pub(crate) fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// `.rels` path for a part, e.g. `ppt/slides/_rels/slide1.xml.rels`.
pub(crate) fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}
