//! Owned OSM element model shared by readers, the rewriter and sinks.

use std::collections::BTreeMap;

use crate::metadata::MetadataFields;

/// Tag map. Ordered so that output is deterministic.
pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Tags,
    pub meta: Option<MetadataFields>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: i64,
    pub refs: Vec<i64>,
    pub tags: Tags,
    pub meta: Option<MetadataFields>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

impl MemberType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::Node => "node",
            MemberType::Way => "way",
            MemberType::Relation => "relation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "node" | "n" => Some(MemberType::Node),
            "way" | "w" => Some(MemberType::Way),
            "relation" | "r" => Some(MemberType::Relation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub member_type: MemberType,
    pub id: i64,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub members: Vec<Member>,
    pub tags: Tags,
    pub meta: Option<MetadataFields>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OsmElement {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

/// True if `key` equals `prefix` or lives in its namespace (`prefix:*`).
pub fn key_matches_prefix(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(':'),
        None => false,
    }
}

/// Remove every key matching one of `prefixes`; returns the removed keys.
pub fn remove_prefixed(tags: &mut Tags, prefixes: &[&str]) -> Vec<String> {
    let doomed: Vec<String> = tags
        .keys()
        .filter(|key| prefixes.iter().any(|p| key_matches_prefix(key, p)))
        .cloned()
        .collect();
    for key in &doomed {
        tags.remove(key);
    }
    doomed
}

pub fn build_tags<'a, I>(tags: I) -> Tags
where
    I: Iterator<Item = (&'a str, &'a str)>,
{
    tags.map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
