use std::collections::HashSet;

use geo_types::LineString;
use tracing::warn;

use super::restriction::AdminArea;
use super::{FeatureTable, Keyed, LayerKind, SegmentRecord};
use crate::error::RewriteResult;
use crate::osm::Tags;

/// Speed zone classes, strictest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpeedClass {
    Pedestrian,
    CalmTraffic,
    S20,
    S30,
    Urban,
}

impl SpeedClass {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "242.1" => Some(SpeedClass::Pedestrian),
            "325.1" => Some(SpeedClass::CalmTraffic),
            "274.1-20" => Some(SpeedClass::S20),
            "274.1" => Some(SpeedClass::S30),
            "310" => Some(SpeedClass::Urban),
            _ => None,
        }
    }

    pub fn maxspeed(&self) -> &'static str {
        // maxspeed=walk is not understood by common routers
        match self {
            SpeedClass::Pedestrian | SpeedClass::CalmTraffic => "10",
            SpeedClass::S20 => "20",
            SpeedClass::S30 => "30",
            SpeedClass::Urban => "50",
        }
    }

    pub fn zone(&self) -> Option<&'static str> {
        match self {
            SpeedClass::Pedestrian => None,
            SpeedClass::CalmTraffic => Some("living_street"),
            SpeedClass::S20 => Some("zone20"),
            SpeedClass::S30 => Some("zone30"),
            SpeedClass::Urban => Some("urban"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadSpeedRecord {
    pub segment_id: i64,
    pub zone_id: i64,
    pub name: Option<String>,
    pub osm_id: i64,
    pub osm_version: Option<i64>,
    pub class: SpeedClass,
    pub admin: AdminArea,
    pub geometry: LineString<f64>,
}

impl RoadSpeedRecord {
    /// Table with each way's records ordered strictest first.
    ///
    /// Also returns the number of ways listing the same class more than once.
    pub fn table(records: Vec<RoadSpeedRecord>) -> (FeatureTable<RoadSpeedRecord>, usize) {
        let table = FeatureTable::new_sorted(records, |a, b| a.class.cmp(&b.class));
        let mut duplicates = 0;
        for (osm_id, records) in table.groups() {
            let mut seen = HashSet::new();
            if records.iter().any(|record| !seen.insert(record.class)) {
                warn!(way = osm_id, "Duplicate speed classes for way");
                duplicates += 1;
            }
        }
        (table, duplicates)
    }
}

impl Keyed for RoadSpeedRecord {
    fn element_id(&self) -> i64 {
        self.osm_id
    }
}

impl SegmentRecord for RoadSpeedRecord {
    const KIND: LayerKind = LayerKind::RoadSpeeds;

    fn record_id(&self) -> i64 {
        self.segment_id
    }

    fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    fn tags(&self) -> RewriteResult<Tags> {
        let mut tags = Tags::new();
        tags.insert("maxspeed".to_string(), self.class.maxspeed().to_string());
        if let Some(zone) = self.class.zone() {
            let value = format!("DE:{zone}");
            tags.insert("zone:traffic".to_string(), value.clone());
            tags.insert("source:maxspeed".to_string(), value.clone());
            tags.insert("maxspeed:type".to_string(), value);
        }
        Ok(tags)
    }
}

#[cfg(test)]
impl RoadSpeedRecord {
    pub(crate) fn sample(osm_id: i64, class: SpeedClass, geometry: LineString<f64>) -> Self {
        RoadSpeedRecord {
            segment_id: osm_id * 10,
            zone_id: 1,
            name: None,
            osm_id,
            osm_version: None,
            class,
            admin: AdminArea::default(),
            geometry,
        }
    }
}
