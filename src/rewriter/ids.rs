use crate::error::ConfigurationError;

/// Default first synthetic identifier, far above real OSM id ranges.
pub const DEFAULT_SEED: i64 = (1 << 45) - 1;

/// Identifier counters for elements created during a run.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    node: i64,
    way: i64,
    relation: i64,
}

impl IdAllocator {
    pub fn new(node: i64, way: i64, relation: i64) -> Result<Self, ConfigurationError> {
        for (seed, name) in [(node, "nodes"), (way, "ways"), (relation, "relations")] {
            if seed <= 0 {
                return Err(ConfigurationError::InvalidSeed(name));
            }
        }
        Ok(Self {
            node,
            way,
            relation,
        })
    }

    pub fn next_node(&mut self) -> i64 {
        let id = self.node;
        self.node += 1;
        id
    }

    pub fn next_way(&mut self) -> i64 {
        let id = self.way;
        self.way += 1;
        id
    }

    pub fn next_relation(&mut self) -> i64 {
        let id = self.relation;
        self.relation += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            node: DEFAULT_SEED,
            way: DEFAULT_SEED,
            relation: DEFAULT_SEED,
        }
    }
}
