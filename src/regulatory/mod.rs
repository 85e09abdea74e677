//! Regulatory layers: typed records, their lookup tables and the rules that
//! turn a record into OSM tags.

mod low_emission_zone;
mod parse;
mod preferred_road;
mod restriction;
mod road_speed;
mod signs;
pub mod source;
mod table;

use geo_types::LineString;
use serde::Serialize;

use crate::error::RewriteResult;
use crate::osm::Tags;

pub use low_emission_zone::{LowEmissionZoneRecord, ZoneClass, ZoneRing};
pub use preferred_road::PreferredRoadRecord;
pub use restriction::{
    AdminArea, GroupedDays, RestrictionRecord, RestrictionType, TimeWindow, Weekdays,
};
pub use road_speed::{RoadSpeedRecord, SpeedClass};
pub use signs::RestrSign;
pub use table::{FeatureTable, Keyed};

/// Travel direction a record applies to, relative to the way's node order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Both,
    Forward,
    Backward,
}

impl Direction {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(Direction::Both),
            "1" => Some(Direction::Forward),
            "2" => Some(Direction::Backward),
            _ => None,
        }
    }

    /// Namespace suffix for tag keys.
    pub fn suffix(&self) -> &'static str {
        match self {
            Direction::Both => "",
            Direction::Forward => ":forward",
            Direction::Backward => ":backward",
        }
    }
}

/// The closed set of regulatory layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    PreferredRoads,
    RoadSpeeds,
    Restrictions,
    LowEmissionZones,
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::PreferredRoads => "preferred_roads",
            LayerKind::RoadSpeeds => "road_speeds",
            LayerKind::Restrictions => "restrictions",
            LayerKind::LowEmissionZones => "low_emission_zones",
        }
    }

    /// Key prefixes removed from an element before this layer's tags land on it.
    pub fn invalidating_keys(&self) -> &'static [&'static str] {
        match self {
            LayerKind::PreferredRoads => &[],
            LayerKind::RoadSpeeds => &["maxspeed", "zone:traffic", "source:maxspeed"],
            LayerKind::Restrictions => &[
                "maxweight",
                "maxaxleload",
                "maxwidth",
                "maxheight",
                "maxlength",
                "hgv",
                "hazmat",
                "traffic_sign",
            ],
            LayerKind::LowEmissionZones => &["boundary"],
        }
    }
}

/// A record that is keyed to a way and covers (part of) its geometry.
pub trait SegmentRecord: Keyed {
    const KIND: LayerKind;

    /// Identifier used in diagnostics and the unmatched report.
    fn record_id(&self) -> i64;

    fn geometry(&self) -> &LineString<f64>;

    fn tags(&self) -> RewriteResult<Tags>;

    /// Whether the tags came from a fallback rule (reported as advisory).
    fn is_fallback(&self) -> bool {
        false
    }
}
