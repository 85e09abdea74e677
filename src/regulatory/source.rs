//! Regulatory layers read from GeoJSON feature collections.
//!
//! Every layer is one file in the data directory. Property names follow the
//! regulatory source (`osm_id`, `fahrtri`, `typ`, `wert`, `vz_*`, ...). Codes
//! may be encoded as strings or numbers.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use geo_types::{Coord, LineString};
use geojson::{Feature, GeoJson, Value};
use serde_json::Value as JsonValue;
use tracing::info;

use super::low_emission_zone::ZoneRing;
use super::parse::{TimeOfDay, parse_time_of_day};
use super::restriction::{AdminArea, TimeWindow};
use super::{
    Direction, FeatureTable, GroupedDays, LowEmissionZoneRecord, PreferredRoadRecord,
    RestrSign, RestrictionRecord, RestrictionType, RoadSpeedRecord, SpeedClass, Weekdays,
    ZoneClass,
};
use crate::error::SchemaError;

pub const RESTRICTIONS_FILE: &str = "restrictions.geojson";
pub const ROAD_SPEEDS_FILE: &str = "road_speeds.geojson";
pub const PREFERRED_ROADS_FILE: &str = "preferred_roads.geojson";
pub const LOW_EMISSION_ZONES_FILE: &str = "low_emission_zones.geojson";

/// Zone kind shared by low-emission-zone polygons and their road segments.
const LOW_EMISSION_ZONE_KIND: &str = "umweltzone";

/// All layers found in a data directory. Absent files disable a layer.
#[derive(Default)]
pub struct RegulatoryData {
    pub restrictions: Option<FeatureTable<RestrictionRecord>>,
    pub road_speeds: Option<FeatureTable<RoadSpeedRecord>>,
    pub preferred_roads: Option<FeatureTable<PreferredRoadRecord>>,
    pub low_emission_zones: Option<Vec<LowEmissionZoneRecord>>,
    /// Ways listing one speed class more than once.
    pub duplicate_speed_ways: usize,
}

impl RegulatoryData {
    pub fn has_segment_layers(&self) -> bool {
        self.restrictions.is_some() || self.road_speeds.is_some() || self.preferred_roads.is_some()
    }
}

pub fn load_data_dir(dir: &Path) -> Result<RegulatoryData> {
    let mut data = RegulatoryData::default();

    if let Some(features) = read_layer(dir, RESTRICTIONS_FILE)? {
        let records = collect_records(&features, restriction_from_feature)
            .context("Source: Invalid restriction record")?;
        let table = FeatureTable::new(records);
        info!(
            "Loaded {} restriction records for {} ways",
            table.len(),
            table.element_count()
        );
        data.restrictions = Some(table);
    }

    if let Some(features) = read_layer(dir, ROAD_SPEEDS_FILE)? {
        let records = collect_optional_records(&features, road_speed_from_feature)
            .context("Source: Invalid road speed record")?;
        let (table, duplicates) = RoadSpeedRecord::table(records);
        let zones: BTreeSet<i64> = table.all_values().map(|record| record.zone_id).collect();
        info!(
            "Loaded {} road speed records for {} ways in {} zones",
            table.len(),
            table.element_count(),
            zones.len()
        );
        data.road_speeds = Some(table);
        data.duplicate_speed_ways = duplicates;
    }

    if let Some(features) = read_layer(dir, PREFERRED_ROADS_FILE)? {
        let records = collect_records(&features, preferred_road_from_feature)
            .context("Source: Invalid preferred road record")?;
        let table = FeatureTable::new(records);
        info!(
            "Loaded {} preferred road records for {} ways",
            table.len(),
            table.element_count()
        );
        data.preferred_roads = Some(table);
    }

    if let Some(features) = read_layer(dir, LOW_EMISSION_ZONES_FILE)? {
        let records = collect_optional_records(&features, low_emission_zone_from_feature)
            .context("Source: Invalid low emission zone record")?;
        info!("Loaded {} low emission zones", records.len());
        data.low_emission_zones = Some(records);
    }

    Ok(data)
}

fn read_layer(dir: &Path, file_name: &str) -> Result<Option<Vec<Feature>>> {
    let path = dir.join(file_name);
    if !path.exists() {
        info!("No {} in {}, layer disabled", file_name, dir.display());
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Source: Failed to read {}", path.display()))?;
    let features =
        parse_features(&text).with_context(|| format!("Source: Failed to parse {}", path.display()))?;
    Ok(Some(features))
}

/// Features of a FeatureCollection (or a single Feature).
pub fn parse_features(text: &str) -> Result<Vec<Feature>> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        GeoJson::Feature(feature) => Ok(vec![feature]),
        GeoJson::Geometry(_) => bail!("expected a Feature or FeatureCollection"),
    }
}

fn collect_records<T>(
    features: &[Feature],
    convert: fn(&Feature, usize) -> Result<T, SchemaError>,
) -> Result<Vec<T>, SchemaError> {
    features
        .iter()
        .enumerate()
        .map(|(index, feature)| convert(feature, index))
        .collect()
}

fn collect_optional_records<T>(
    features: &[Feature],
    convert: fn(&Feature, usize) -> Result<Option<T>, SchemaError>,
) -> Result<Vec<T>, SchemaError> {
    let mut records = Vec::new();
    for (index, feature) in features.iter().enumerate() {
        if let Some(record) = convert(feature, index)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Typed access to a feature's properties.
struct Props<'a> {
    feature: &'a Feature,
    /// Identifier reported in errors; the feature index until an id is known.
    record: i64,
}

impl<'a> Props<'a> {
    fn new(feature: &'a Feature, index: usize) -> Self {
        Self {
            feature,
            record: index as i64,
        }
    }

    fn raw(&self, field: &str) -> Option<&JsonValue> {
        self.feature.property(field).filter(|value| !value.is_null())
    }

    /// Trimmed string value; numbers are rendered, empty strings are absent.
    fn string(&self, field: &str) -> Option<String> {
        let text = match self.raw(field)? {
            JsonValue::String(s) => s.trim().to_string(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    fn error(&self, field: &'static str) -> SchemaError {
        let value = self
            .raw(field)
            .map(|value| value.to_string())
            .unwrap_or_default();
        SchemaError::new(field, value, self.record)
    }

    fn opt_int(&self, field: &'static str) -> Result<Option<i64>, SchemaError> {
        match self.raw(field) {
            None => Ok(None),
            Some(JsonValue::Number(n)) => n.as_i64().map(Some).ok_or_else(|| self.error(field)),
            Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
            Some(JsonValue::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.error(field)),
            Some(_) => Err(self.error(field)),
        }
    }

    fn int(&self, field: &'static str) -> Result<i64, SchemaError> {
        self.opt_int(field)?.ok_or_else(|| self.error(field))
    }

    fn code<T>(&self, field: &'static str, parse: fn(&str) -> Option<T>) -> Result<T, SchemaError> {
        self.string(field)
            .as_deref()
            .and_then(parse)
            .ok_or_else(|| self.error(field))
    }

    /// Sign flags come as booleans, 0/1 or their string forms.
    fn flag(&self, field: &'static str) -> Result<bool, SchemaError> {
        match self.raw(field) {
            None => Ok(false),
            Some(JsonValue::Bool(b)) => Ok(*b),
            Some(_) => match self.string(field).as_deref() {
                None => Ok(false),
                Some("1" | "true" | "True" | "T" | "t" | "Y" | "y") => Ok(true),
                Some("0" | "false" | "False" | "F" | "f" | "N" | "n") => Ok(false),
                Some(_) => Err(self.error(field)),
            },
        }
    }

    fn time(&self, field: &'static str) -> Result<Option<TimeOfDay>, SchemaError> {
        match self.string(field) {
            None => Ok(None),
            Some(raw) => parse_time_of_day(&raw)
                .map(Some)
                .ok_or_else(|| self.error(field)),
        }
    }

    fn weekdays(&self, field: &'static str) -> Result<Weekdays, SchemaError> {
        let Some(raw) = self.string(field) else {
            return Ok(Weekdays::default());
        };
        // Numeric encodings lose leading zeros.
        let mask = if raw.len() < 7 && raw.chars().all(|c| c.is_ascii_digit()) {
            format!("{raw:0>7}")
        } else {
            raw
        };
        Weekdays::from_mask(&mask).ok_or_else(|| self.error(field))
    }

    fn admin(&self) -> AdminArea {
        AdminArea {
            municipality: self.string("gemeinde"),
            district: self.string("kreis"),
            region: self.string("regbezirk"),
        }
    }

    fn line(&self) -> Result<LineString<f64>, SchemaError> {
        let geometry = self
            .feature
            .geometry
            .as_ref()
            .ok_or_else(|| SchemaError::new("geometry", "", self.record))?;
        let coords: Vec<Coord<f64>> = match &geometry.value {
            Value::LineString(points) => to_coords(points),
            Value::MultiLineString(lines) => {
                let mut coords: Vec<Coord<f64>> = Vec::new();
                for line in lines {
                    for coord in to_coords(line) {
                        if coords.last() != Some(&coord) {
                            coords.push(coord);
                        }
                    }
                }
                coords
            }
            other => {
                return Err(SchemaError::new("geometry", other.type_name(), self.record));
            }
        };
        if coords.len() < 2 {
            return Err(SchemaError::new(
                "geometry",
                format!("{} coordinates", coords.len()),
                self.record,
            ));
        }
        Ok(LineString::new(coords))
    }

    fn rings(&self) -> Result<Vec<ZoneRing>, SchemaError> {
        let geometry = self
            .feature
            .geometry
            .as_ref()
            .ok_or_else(|| SchemaError::new("geometry", "", self.record))?;
        let polygons: Vec<&Vec<Vec<Vec<f64>>>> = match &geometry.value {
            Value::Polygon(rings) => vec![rings],
            Value::MultiPolygon(polygons) => polygons.iter().collect(),
            other => {
                return Err(SchemaError::new("geometry", other.type_name(), self.record));
            }
        };
        Ok(polygons
            .into_iter()
            .flat_map(|rings| {
                rings.iter().enumerate().map(|(i, ring)| ZoneRing {
                    coords: to_coords(ring),
                    inner: i > 0,
                })
            })
            .collect())
    }
}

fn to_coords(points: &[Vec<f64>]) -> Vec<Coord<f64>> {
    points
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect()
}

pub fn restriction_from_feature(
    feature: &Feature,
    index: usize,
) -> Result<RestrictionRecord, SchemaError> {
    let mut props = Props::new(feature, index);
    let segment_id = props.int("segment_id")?;
    props.record = segment_id;

    let mut signs = BTreeSet::new();
    for sign in RestrSign::ALL {
        if props.flag(sign.field_name())? {
            signs.insert(sign);
        }
    }

    Ok(RestrictionRecord {
        segment_id,
        restriction_id: props.opt_int("restrkn_id")?.unwrap_or_default(),
        name: props.string("name"),
        osm_id: props.int("osm_id")?,
        osm_version: props.opt_int("osm_vers")?,
        direction: props.code("fahrtri", Direction::from_code)?,
        restriction_type: props.code("typ", RestrictionType::from_code)?,
        value: props.string("wert"),
        weekdays: props.weekdays("tage_einzl")?,
        grouped_days: match props.string("tage_grppe") {
            None => GroupedDays::None,
            Some(_) => props.code("tage_grppe", GroupedDays::from_code)?,
        },
        windows: [
            TimeWindow {
                from: props.time("zeit1_von")?,
                to: props.time("zeit1_bis")?,
            },
            TimeWindow {
                from: props.time("zeit2_von")?,
                to: props.time("zeit2_bis")?,
            },
        ],
        admin: props.admin(),
        signs,
        geometry: props.line()?,
    })
}

/// Road speed segments; rows belonging to low emission zones are skipped.
pub fn road_speed_from_feature(
    feature: &Feature,
    index: usize,
) -> Result<Option<RoadSpeedRecord>, SchemaError> {
    let mut props = Props::new(feature, index);
    if props.string("typ").as_deref() == Some(LOW_EMISSION_ZONE_KIND) {
        return Ok(None);
    }
    let segment_id = props.int("segment_id")?;
    props.record = segment_id;

    Ok(Some(RoadSpeedRecord {
        segment_id,
        zone_id: props.opt_int("zone_id")?.unwrap_or_default(),
        name: props.string("name"),
        osm_id: props.int("osm_id")?,
        osm_version: props.opt_int("osm_vers")?,
        class: props.code("wert", SpeedClass::from_code)?,
        admin: props.admin(),
        geometry: props.line()?,
    }))
}

pub fn preferred_road_from_feature(
    feature: &Feature,
    index: usize,
) -> Result<PreferredRoadRecord, SchemaError> {
    let mut props = Props::new(feature, index);
    let osm_id = props.int("osm_id")?;
    props.record = osm_id;

    Ok(PreferredRoadRecord {
        osm_id,
        direction: props.code("fahrtri", Direction::from_code)?,
        geometry: props.line()?,
    })
}

/// Zone polygons; speed zone polygons are skipped.
pub fn low_emission_zone_from_feature(
    feature: &Feature,
    index: usize,
) -> Result<Option<LowEmissionZoneRecord>, SchemaError> {
    let mut props = Props::new(feature, index);
    if props.string("typ").as_deref() != Some(LOW_EMISSION_ZONE_KIND) {
        return Ok(None);
    }
    let zone_id = props.int("zone_id")?;
    props.record = zone_id;

    Ok(Some(LowEmissionZoneRecord {
        zone_id,
        class: props.code("wert", ZoneClass::from_code)?,
        admin: props.admin(),
        rings: props.rings()?,
    }))
}
