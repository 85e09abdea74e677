use anyhow::Result;

use crate::osm::{Node, Relation, Way};

pub mod xml;

pub use self::xml::OsmXmlSink;

/// Destination for rewritten elements. Element types may be buffered
/// separately; order across types is not preserved.
pub trait ElementSink {
    fn add_node(&mut self, node: &Node) -> Result<()>;
    fn add_way(&mut self, way: &Way) -> Result<()>;
    fn add_relation(&mut self, relation: &Relation) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Collects elements in memory.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
    pub finished: bool,
}

#[cfg(test)]
impl MemorySink {
    pub fn way(&self, id: i64) -> Option<&Way> {
        self.ways.iter().find(|way| way.id == id)
    }
}

#[cfg(test)]
impl ElementSink for MemorySink {
    fn add_node(&mut self, node: &Node) -> Result<()> {
        self.nodes.push(node.clone());
        Ok(())
    }

    fn add_way(&mut self, way: &Way) -> Result<()> {
        self.ways.push(way.clone());
        Ok(())
    }

    fn add_relation(&mut self, relation: &Relation) -> Result<()> {
        self.relations.push(relation.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
