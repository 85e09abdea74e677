use geo_types::LineString;

use super::{Direction, Keyed, LayerKind, SegmentRecord};
use crate::error::RewriteResult;
use crate::osm::Tags;

/// Designated truck route ("Vorrangroute").
#[derive(Debug, Clone, PartialEq)]
pub struct PreferredRoadRecord {
    pub osm_id: i64,
    pub direction: Direction,
    pub geometry: LineString<f64>,
}

impl Keyed for PreferredRoadRecord {
    fn element_id(&self) -> i64 {
        self.osm_id
    }
}

impl SegmentRecord for PreferredRoadRecord {
    const KIND: LayerKind = LayerKind::PreferredRoads;

    fn record_id(&self) -> i64 {
        self.osm_id
    }

    fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    fn tags(&self) -> RewriteResult<Tags> {
        let mut tags = Tags::new();
        tags.insert(
            format!("hgv{}", self.direction.suffix()),
            "designated".to_string(),
        );
        Ok(tags)
    }
}
