use geo_types::Coord;

use super::restriction::AdminArea;
use crate::osm::Tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneClass {
    Green,
    Yellow,
    Red,
}

impl ZoneClass {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1031-52" => Some(ZoneClass::Green),
            "1031-51" => Some(ZoneClass::Yellow),
            "1031-50" => Some(ZoneClass::Red),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ZoneClass::Green => "green",
            ZoneClass::Yellow => "yellow",
            ZoneClass::Red => "red",
        }
    }
}

/// A polygon ring as published, not necessarily closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRing {
    pub coords: Vec<Coord<f64>>,
    pub inner: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LowEmissionZoneRecord {
    pub zone_id: i64,
    pub class: ZoneClass,
    pub admin: AdminArea,
    pub rings: Vec<ZoneRing>,
}

impl LowEmissionZoneRecord {
    /// Tags of the boundary relation synthesized for this zone.
    pub fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert("type".to_string(), "boundary".to_string());
        tags.insert("boundary".to_string(), "low_emission_zone".to_string());
        tags.insert(
            "low_emission_zone:type".to_string(),
            self.class.name().to_string(),
        );
        tags
    }
}
