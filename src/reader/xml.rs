use anyhow::{Context, Result, anyhow, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::metadata::MetadataFields;
use crate::osm::{Member, MemberType, Node, OsmElement, Relation, Tags, Way};

/// Element currently being assembled from its child tags.
enum Pending {
    Idle,
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Pending {
    fn tags_mut(&mut self) -> Option<&mut Tags> {
        match self {
            Pending::Idle => None,
            Pending::Node(node) => Some(&mut node.tags),
            Pending::Way(way) => Some(&mut way.tags),
            Pending::Relation(relation) => Some(&mut relation.tags),
        }
    }

    fn take(&mut self) -> Option<OsmElement> {
        match std::mem::replace(self, Pending::Idle) {
            Pending::Idle => None,
            Pending::Node(node) => Some(OsmElement::Node(node)),
            Pending::Way(way) => Some(OsmElement::Way(way)),
            Pending::Relation(relation) => Some(OsmElement::Relation(relation)),
        }
    }
}

/// Attributes of one XML element, unescaped.
struct Attributes(Vec<(String, String)>);

impl Attributes {
    fn read(element: &BytesStart<'_>) -> Result<Self> {
        let mut pairs = Vec::new();
        for attribute in element.attributes() {
            let attribute = attribute?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            pairs.push((key, value));
        }
        Ok(Self(pairs))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, key: &str, element: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| anyhow!("Reader: <{element}> without `{key}` attribute"))
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, element: &str) -> Result<T> {
        let raw = self.required(key, element)?;
        raw.parse()
            .map_err(|_| anyhow!("Reader: <{element}> has invalid `{key}` value {raw:?}"))
    }

    fn optional<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|raw| raw.parse().ok())
    }

    fn metadata(&self) -> Option<MetadataFields> {
        let meta = MetadataFields {
            visible: self.get("visible").map(|v| v != "false"),
            version: self.optional("version"),
            changeset: self.optional("changeset"),
            timestamp: self.get("timestamp").map(str::to_string),
            uid: self.optional("uid"),
            user: self.get("user").map(str::to_string),
        };
        (meta != MetadataFields::default()).then_some(meta)
    }
}

fn start_element(element: &BytesStart<'_>) -> Result<Option<Pending>> {
    let pending = match element.name().as_ref() {
        b"node" => {
            let attrs = Attributes::read(element)?;
            Pending::Node(Node {
                id: attrs.parse("id", "node")?,
                lat: attrs.parse("lat", "node")?,
                lon: attrs.parse("lon", "node")?,
                tags: Tags::new(),
                meta: attrs.metadata(),
            })
        }
        b"way" => {
            let attrs = Attributes::read(element)?;
            Pending::Way(Way {
                id: attrs.parse("id", "way")?,
                refs: Vec::new(),
                tags: Tags::new(),
                meta: attrs.metadata(),
            })
        }
        b"relation" => {
            let attrs = Attributes::read(element)?;
            Pending::Relation(Relation {
                id: attrs.parse("id", "relation")?,
                members: Vec::new(),
                tags: Tags::new(),
                meta: attrs.metadata(),
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(pending))
}

fn child_element(element: &BytesStart<'_>, pending: &mut Pending) -> Result<()> {
    match element.name().as_ref() {
        b"tag" => {
            let attrs = Attributes::read(element)?;
            let key = attrs.required("k", "tag")?.to_string();
            let value = attrs.required("v", "tag")?.to_string();
            if let Some(tags) = pending.tags_mut() {
                tags.insert(key, value);
            }
        }
        b"nd" => {
            let Pending::Way(way) = pending else {
                bail!("Reader: <nd> outside of a way");
            };
            let attrs = Attributes::read(element)?;
            way.refs.push(attrs.parse("ref", "nd")?);
        }
        b"member" => {
            let Pending::Relation(relation) = pending else {
                bail!("Reader: <member> outside of a relation");
            };
            let attrs = Attributes::read(element)?;
            let raw_type = attrs.required("type", "member")?;
            let member_type = MemberType::parse(raw_type).ok_or_else(|| {
                anyhow!(
                    "Reader: relation {} has member of unknown type {raw_type:?}",
                    relation.id
                )
            })?;
            relation.members.push(Member {
                member_type,
                id: attrs.parse("ref", "member")?,
                role: attrs.get("role").unwrap_or_default().to_string(),
            });
        }
        _ => {}
    }
    Ok(())
}

/// Stream elements of an OSM XML document in file order.
pub fn read_elements<R, F>(source: R, mut f: F) -> Result<u64>
where
    R: BufRead,
    F: FnMut(OsmElement) -> Result<()>,
{
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut pending = Pending::Idle;
    let mut count = 0u64;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(element) => {
                if let Some(started) = start_element(&element)? {
                    pending = started;
                }
            }
            Event::Empty(element) => match start_element(&element)? {
                Some(mut complete) => {
                    if let Some(element) = complete.take() {
                        count += 1;
                        f(element)?;
                    }
                }
                None => child_element(&element, &mut pending)?,
            },
            Event::End(element) => {
                if matches!(element.name().as_ref(), b"node" | b"way" | b"relation")
                    && let Some(element) = pending.take()
                {
                    count += 1;
                    f(element)?;
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(count)
}

pub fn for_each_element<F>(path: &Path, f: F) -> Result<u64>
where
    F: FnMut(OsmElement) -> Result<()>,
{
    let file = File::open(path)
        .with_context(|| format!("Reader: Failed to open {}", path.display()))?;
    read_elements(BufReader::new(file), f)
        .with_context(|| format!("Reader: Failed to read {}", path.display()))
}
