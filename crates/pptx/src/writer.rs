//! Deck assembly.
//!
//! The output package is the first slide's template with its slides removed.
//! Each planned slide is copied in from its own template, placeholders filled,
//! together with the parts its slide relationships point at.

use crate::error::{PptxError, Result};
use crate::fill::{fill_placeholders, prefix_of, qualified};
use crate::parser::{
    local_name, parent_dir, parse_relationships, rels_path_for, resolve_target, ContentTypes,
    Relationship, TemplateAsset, CONTENT_TYPES, PRESENTATION, PRESENTATION_RELS,
    REL_NOTES_SLIDE, REL_SLIDE, REL_SLIDE_LAYOUT,
};
use deck_core::{RenderPlan, Renderer};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const SLIDE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
const SLIDE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const SLIDE_LAYOUT_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// First `p:sldId` value PowerPoint accepts.
const FIRST_SLIDE_ID: usize = 256;

const SLIDES_DIR: &str = "ppt/slides";

/// Renders a plan into a `.pptx` file.
#[derive(Debug, Clone, Copy, Default)]
pub struct PptxRenderer;

impl PptxRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Build the output package in memory.
    ///
    /// Every slot of every slide is checked against its template before any
    /// part is assembled.
    pub fn build(&self, plan: &RenderPlan) -> Result<Vec<u8>> {
        if plan.is_empty() {
            return Err(PptxError::EmptyPlan);
        }

        let mut assets: Vec<(PathBuf, TemplateAsset)> = Vec::new();
        let mut slide_assets = Vec::with_capacity(plan.len());
        for slide in &plan.slides {
            let position = match assets.iter().position(|(p, _)| *p == slide.asset_path) {
                Some(position) => position,
                None => {
                    log::debug!("Loading template asset {}", slide.asset_path.display());
                    assets.push((slide.asset_path.clone(), TemplateAsset::open(&slide.asset_path)?));
                    assets.len() - 1
                }
            };
            slide_assets.push(position);
        }

        let mut filled = Vec::with_capacity(plan.len());
        for (slide, &asset) in plan.slides.iter().zip(&slide_assets) {
            let (_, template) = &assets[asset];
            let result = fill_placeholders(template.slide_xml()?, &slide.assignment.slot_values)?;

            if let Some(unmatched) = slide
                .slots
                .iter()
                .find(|s| !result.matched.contains(&s.name))
            {
                return Err(PptxError::UnmatchedSlot {
                    block: slide.assignment.block_index,
                    template_id: slide.assignment.template_id.clone(),
                    slot: unmatched.name.clone(),
                });
            }
            filled.push(result.xml);
        }

        let (_, base) = &assets[slide_assets[0]];
        let mut deck = DeckBuilder::from_base(base)?;
        for (xml, &asset) in filled.into_iter().zip(&slide_assets) {
            let (_, template) = &assets[asset];
            deck.add_slide(template, xml)?;
        }
        deck.finish()
    }
}

impl Renderer for PptxRenderer {
    fn extension(&self) -> &str {
        "pptx"
    }

    fn render(&self, plan: &RenderPlan, output: &Path) -> deck_core::Result<()> {
        let bytes = self.build(plan)?;
        write_staged(output, &bytes).map_err(|e| {
            deck_core::Error::RenderFailure(format!("Failed to write {}: {}", output.display(), e))
        })?;

        log::info!("Wrote {} slides to {}", plan.len(), output.display());
        Ok(())
    }
}

/// Write `bytes` beside `output` and move the finished file into place.
fn write_staged(output: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(output).map_err(|e| e.error)?;
    Ok(())
}

/// Output package under construction.
struct DeckBuilder<'a> {
    base: &'a TemplateAsset,
    parts: BTreeMap<String, Vec<u8>>,
    content_types: ContentTypes,

    /// Layout every output slide points at.
    layout_path: String,

    /// Presentation relationship ids of the added slides, in order.
    slide_rel_ids: Vec<String>,
}

impl<'a> DeckBuilder<'a> {
    fn from_base(base: &'a TemplateAsset) -> Result<Self> {
        let is_slide_part =
            |name: &str| name.starts_with("ppt/slides/") || name.starts_with("ppt/notesSlides/");

        let parts = base
            .parts()
            .iter()
            .filter(|(name, _)| !is_slide_part(name.as_str()))
            .map(|(name, data)| (name.clone(), data.clone()))
            .collect();

        let mut content_types = base.content_types()?;
        content_types
            .overrides
            .retain(|name, _| !is_slide_part(name.trim_start_matches('/')));

        let layout_path = base
            .slide_layout_path()?
            .ok_or_else(|| PptxError::MissingPart(format!("layout of {}", base.slide_path())))?;

        Ok(Self {
            base,
            parts,
            content_types,
            layout_path,
            slide_rel_ids: Vec::new(),
        })
    }

    fn add_slide(&mut self, template: &TemplateAsset, xml: String) -> Result<()> {
        let number = self.slide_rel_ids.len() + 1;
        let slide_path = format!("{}/slide{}.xml", SLIDES_DIR, number);
        let source_dir = parent_dir(template.slide_path());
        let source_types = template.content_types()?;

        let mut relationships = Vec::new();
        let mut has_layout = false;
        for rel in template.slide_relationships()? {
            // Notes and links to other template slides do not carry over.
            if rel.rel_type.ends_with(REL_NOTES_SLIDE) || rel.rel_type.ends_with(REL_SLIDE) {
                continue;
            }
            if rel.external {
                relationships.push(rel);
                continue;
            }
            if rel.rel_type.ends_with(REL_SLIDE_LAYOUT) {
                has_layout = true;
                relationships.push(Relationship {
                    target: relative_target(SLIDES_DIR, &self.layout_path),
                    ..rel
                });
                continue;
            }

            let source = resolve_target(source_dir, &rel.target);
            let Some(data) = template.part(&source) else {
                log::warn!("Dropping relationship {} to missing part {}", rel.id, source);
                continue;
            };

            let (dir, file) = source.rsplit_once('/').unwrap_or(("ppt", source.as_str()));
            let dest = format!("{}/s{}_{}", dir, number, file);
            self.parts.insert(dest.clone(), data.to_vec());
            self.register_type(&source_types, &source, &dest);

            relationships.push(Relationship {
                target: relative_target(SLIDES_DIR, &dest),
                ..rel
            });
        }

        if !has_layout {
            relationships.insert(
                0,
                Relationship {
                    id: unused_id(&relationships, "rIdLayout"),
                    rel_type: SLIDE_LAYOUT_REL_TYPE.to_string(),
                    target: relative_target(SLIDES_DIR, &self.layout_path),
                    external: false,
                },
            );
        }

        self.parts
            .insert(rels_path_for(&slide_path), write_relationships(&relationships)?);
        self.parts.insert(slide_path.clone(), xml.into_bytes());
        self.content_types
            .overrides
            .insert(format!("/{}", slide_path), SLIDE_CONTENT_TYPE.to_string());

        self.slide_rel_ids.push(format!("rIdDeckSlide{}", number));
        Ok(())
    }

    /// Carry the content type of a copied part over from its template.
    fn register_type(&mut self, source_types: &ContentTypes, source: &str, dest: &str) {
        if let Some(content_type) = source_types.overrides.get(&format!("/{}", source)) {
            self.content_types
                .overrides
                .insert(format!("/{}", dest), content_type.clone());
            return;
        }

        let Some((_, extension)) = dest.rsplit_once('.') else {
            return;
        };
        let extension = extension.to_ascii_lowercase();
        if self.content_types.defaults.contains_key(&extension) {
            return;
        }
        if let Some(content_type) = source_types.defaults.get(&extension) {
            self.content_types
                .defaults
                .insert(extension, content_type.clone());
        }
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        let mut relationships: Vec<Relationship> =
            parse_relationships(self.base.part_str(PRESENTATION_RELS)?)?
                .into_iter()
                .filter(|r| !r.rel_type.ends_with(REL_SLIDE))
                .collect();
        for (i, id) in self.slide_rel_ids.iter().enumerate() {
            relationships.push(Relationship {
                id: id.clone(),
                rel_type: SLIDE_REL_TYPE.to_string(),
                target: format!("slides/slide{}.xml", i + 1),
                external: false,
            });
        }

        let presentation = rewrite_slide_list(self.base.part_str(PRESENTATION)?, &self.slide_rel_ids)?;
        self.parts.insert(PRESENTATION.to_string(), presentation);
        self.parts
            .insert(PRESENTATION_RELS.to_string(), write_relationships(&relationships)?);

        let content_types = write_content_types(&self.content_types)?;
        self.parts.remove(CONTENT_TYPES);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(CONTENT_TYPES, options)?;
        zip.write_all(&content_types)?;
        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

/// Replace the presentation's slide list with one entry per relationship id.
///
/// Inserted after the master list when the template has no slide list.
fn rewrite_slide_list(xml: &str, rel_ids: &[String]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut skipping = false;
    let mut written = false;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"sldIdLst" => {
                write_slide_list(&mut writer, &prefix_of(e.name().as_ref()), rel_ids)?;
                skipping = true;
                written = true;
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"sldIdLst" => {
                write_slide_list(&mut writer, &prefix_of(e.name().as_ref()), rel_ids)?;
                written = true;
            }
            Event::End(ref e) if skipping && local_name(e.name().as_ref()) == b"sldIdLst" => {
                skipping = false;
            }
            _ if skipping => {}
            Event::End(ref e) if !written && local_name(e.name().as_ref()) == b"sldMasterIdLst" => {
                let prefix = prefix_of(e.name().as_ref());
                writer.write_event(&event)?;
                write_slide_list(&mut writer, &prefix, rel_ids)?;
                written = true;
            }
            other => writer.write_event(other)?,
        }
    }

    if !written {
        return Err(PptxError::Xml(
            "presentation has no slide or master list".to_string(),
        ));
    }
    Ok(writer.into_inner())
}

fn write_slide_list(writer: &mut Writer<Vec<u8>>, prefix: &str, rel_ids: &[String]) -> Result<()> {
    let list = qualified(prefix, "sldIdLst");
    writer.write_event(Event::Start(BytesStart::new(list.as_str())))?;
    for (i, rel_id) in rel_ids.iter().enumerate() {
        let id = (FIRST_SLIDE_ID + i).to_string();
        let mut entry = BytesStart::new(qualified(prefix, "sldId"));
        entry.push_attribute(("id", id.as_str()));
        entry.push_attribute(("r:id", rel_id.as_str()));
        writer.write_event(Event::Empty(entry))?;
    }
    writer.write_event(Event::End(BytesEnd::new(list.as_str())))?;
    Ok(())
}

fn write_relationships(relationships: &[Relationship]) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("Relationships");
    root.push_attribute(("xmlns", RELATIONSHIPS_NS));
    writer.write_event(Event::Start(root))?;
    for rel in relationships {
        let mut entry = BytesStart::new("Relationship");
        entry.push_attribute(("Id", rel.id.as_str()));
        entry.push_attribute(("Type", rel.rel_type.as_str()));
        entry.push_attribute(("Target", rel.target.as_str()));
        if rel.external {
            entry.push_attribute(("TargetMode", "External"));
        }
        writer.write_event(Event::Empty(entry))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Relationships")))?;

    Ok(writer.into_inner())
}

fn write_content_types(types: &ContentTypes) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("Types");
    root.push_attribute(("xmlns", CONTENT_TYPES_NS));
    writer.write_event(Event::Start(root))?;
    for (extension, content_type) in &types.defaults {
        let mut entry = BytesStart::new("Default");
        entry.push_attribute(("Extension", extension.as_str()));
        entry.push_attribute(("ContentType", content_type.as_str()));
        writer.write_event(Event::Empty(entry))?;
    }
    for (part, content_type) in &types.overrides {
        let mut entry = BytesStart::new("Override");
        entry.push_attribute(("PartName", part.as_str()));
        entry.push_attribute(("ContentType", content_type.as_str()));
        writer.write_event(Event::Empty(entry))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Types")))?;

    Ok(writer.into_inner())
}

/// Relationship target for `to`, relative to the directory `from_dir`.
fn relative_target(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut segments = vec![".."; from.len() - common];
    segments.extend(&to[common..]);
    segments.join("/")
}

fn unused_id(relationships: &[Relationship], candidate: &str) -> String {
    let mut id = candidate.to_string();
    let mut n = 1;
    while relationships.iter().any(|r| r.id == id) {
        n += 1;
        id = format!("{}{}", candidate, n);
    }
    id
}
