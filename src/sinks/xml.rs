use super::ElementSink;
use anyhow::{Context, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::metadata::MetadataFields;
use crate::osm::{Node, Relation, Tags, Way};

pub const NODES_FILE: &str = "nodes.osm";
pub const WAYS_FILE: &str = "ways.osm";
pub const RELATIONS_FILE: &str = "relations.osm";

const GENERATOR: &str = concat!("roadreg ", env!("CARGO_PKG_VERSION"));

/// One OSM XML 0.6 document, written to a temporary file next to `path` and
/// moved into place by [`XmlStream::finish`].
struct XmlStream {
    writer: Writer<BufWriter<NamedTempFile>>,
    path: PathBuf,
    count: u64,
}

impl XmlStream {
    fn create(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(name);
        let file = NamedTempFile::new_in(dir)
            .with_context(|| format!("Sink: Failed to create {}", path.display()))?;
        let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut root = BytesStart::new("osm");
        root.push_attribute(("version", "0.6"));
        root.push_attribute(("generator", GENERATOR));
        writer.write_event(Event::Start(root))?;
        Ok(Self {
            writer,
            path,
            count: 0,
        })
    }

    /// Write `element` with its children, or as an empty element if there are none.
    fn write_element(&mut self, element: BytesStart<'_>, children: Vec<BytesStart<'_>>) -> Result<()> {
        self.count += 1;
        if children.is_empty() {
            self.writer.write_event(Event::Empty(element))?;
            return Ok(());
        }
        let end = element.to_end().into_owned();
        self.writer.write_event(Event::Start(element))?;
        for child in children {
            self.writer.write_event(Event::Empty(child))?;
        }
        self.writer.write_event(Event::End(end))?;
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        self.writer.write_event(Event::End(BytesEnd::new("osm")))?;
        let mut inner = self.writer.into_inner();
        writeln!(inner)?;
        let file = inner
            .into_inner()
            .map_err(|err| err.into_error())
            .with_context(|| format!("Sink: Failed to flush {}", self.path.display()))?;
        file.persist(&self.path)
            .with_context(|| format!("Sink: Failed to write {}", self.path.display()))?;
        Ok(self.count)
    }
}

fn element_start<'a>(name: &'a str, id: i64, meta: Option<&MetadataFields>) -> BytesStart<'a> {
    let mut element = BytesStart::new(name);
    element.push_attribute(("id", id.to_string().as_str()));
    if let Some(meta) = meta {
        for (key, value) in meta.attributes() {
            element.push_attribute((key, value.as_str()));
        }
    }
    element
}

fn tag_elements(tags: &Tags) -> Vec<BytesStart<'static>> {
    tags.iter()
        .map(|(key, value)| {
            let mut tag = BytesStart::new("tag");
            tag.push_attribute(("k", key.as_str()));
            tag.push_attribute(("v", value.as_str()));
            tag
        })
        .collect()
}

/// Writes nodes, ways and relations into three OSM XML files in one directory,
/// ready to be merged by an external tool.
pub struct OsmXmlSink {
    nodes: Option<XmlStream>,
    ways: Option<XmlStream>,
    relations: Option<XmlStream>,
}

impl OsmXmlSink {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Sink: Failed to create output directory {}", dir.display()))?;
        Ok(Self {
            nodes: Some(XmlStream::create(dir, NODES_FILE)?),
            ways: Some(XmlStream::create(dir, WAYS_FILE)?),
            relations: Some(XmlStream::create(dir, RELATIONS_FILE)?),
        })
    }
}

fn open(stream: &mut Option<XmlStream>) -> Result<&mut XmlStream> {
    stream
        .as_mut()
        .context("Sink: Element written after the sink was finished")
}

impl ElementSink for OsmXmlSink {
    fn add_node(&mut self, node: &Node) -> Result<()> {
        let mut element = element_start("node", node.id, node.meta.as_ref());
        element.push_attribute(("lat", format!("{:.7}", node.lat).as_str()));
        element.push_attribute(("lon", format!("{:.7}", node.lon).as_str()));
        open(&mut self.nodes)?.write_element(element, tag_elements(&node.tags))
    }

    fn add_way(&mut self, way: &Way) -> Result<()> {
        let element = element_start("way", way.id, way.meta.as_ref());
        let mut children: Vec<BytesStart<'static>> = way
            .refs
            .iter()
            .map(|node_ref| {
                let mut nd = BytesStart::new("nd");
                nd.push_attribute(("ref", node_ref.to_string().as_str()));
                nd
            })
            .collect();
        children.extend(tag_elements(&way.tags));
        open(&mut self.ways)?.write_element(element, children)
    }

    fn add_relation(&mut self, relation: &Relation) -> Result<()> {
        let element = element_start("relation", relation.id, relation.meta.as_ref());
        let mut children: Vec<BytesStart<'static>> = relation
            .members
            .iter()
            .map(|member| {
                let mut m = BytesStart::new("member");
                m.push_attribute(("type", member.member_type.as_str()));
                m.push_attribute(("ref", member.id.to_string().as_str()));
                m.push_attribute(("role", member.role.as_str()));
                m
            })
            .collect();
        children.extend(tag_elements(&relation.tags));
        open(&mut self.relations)?.write_element(element, children)
    }

    fn finish(&mut self) -> Result<()> {
        for stream in [self.nodes.take(), self.ways.take(), self.relations.take()]
            .into_iter()
            .flatten()
        {
            let path = stream.path.clone();
            let count = stream.finish()?;
            tracing::info!("Sink: {} elements -> {}", count, path.display());
        }
        Ok(())
    }
}
