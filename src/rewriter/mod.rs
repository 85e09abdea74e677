//! Element rewriter: applies regulatory layers and the tag-clean filter to a
//! stream of OSM elements, splitting ways that are only partly covered.

mod ids;
mod report;
mod split;

use anyhow::{Context, Result};
use geo_types::{Coord, LineString, Point};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::{GeometryError, RewriteResult};
use crate::geometry::{Fraction, TagCleanFilter};
use crate::metadata::MetadataFields;
use crate::osm::{Member, MemberType, Node, OsmElement, Relation, Tags, Way, remove_prefixed};
use crate::regulatory::source::RegulatoryData;
use crate::regulatory::{FeatureTable, LayerKind, SegmentRecord};
use crate::sinks::ElementSink;
use crate::storage::LocationIndex;

pub use ids::{DEFAULT_SEED, IdAllocator};
pub use report::RunReport;
use split::{Boundary, boundaries, split_way};

/// Tags of one layer after the layer pipeline ran, plus what changed.
#[derive(Debug, Default, PartialEq)]
pub struct LayerOutcome {
    pub tags: Tags,
    pub added: BTreeMap<LayerKind, u64>,
    pub overridden: BTreeMap<LayerKind, u64>,
}

/// Apply layer tag sets to `source`.
///
/// Every participating layer first removes its invalidating keys from the
/// source tags. Layer tags are then added in layer order, later layers
/// winning on equal keys; `traffic_sign` values are joined with `;`.
pub fn apply_layers(source: &Tags, layers: &[(LayerKind, &Tags)]) -> LayerOutcome {
    let mut outcome = LayerOutcome {
        tags: source.clone(),
        ..LayerOutcome::default()
    };
    if layers.is_empty() {
        return outcome;
    }

    let mut ordered: Vec<&(LayerKind, &Tags)> = layers.iter().collect();
    ordered.sort_by_key(|(kind, _)| *kind);

    let mut kinds: Vec<LayerKind> = ordered.iter().map(|(kind, _)| *kind).collect();
    kinds.dedup();
    for kind in kinds {
        let removed = remove_prefixed(&mut outcome.tags, kind.invalidating_keys());
        if !removed.is_empty() {
            *outcome.overridden.entry(kind).or_insert(0) += removed.len() as u64;
        }
    }

    let mut signs: Vec<&str> = Vec::new();
    for (kind, tags) in ordered {
        for (key, value) in tags.iter() {
            *outcome.added.entry(*kind).or_insert(0) += 1;
            if key == "traffic_sign" {
                if !signs.contains(&value.as_str()) {
                    signs.push(value);
                }
                continue;
            }
            outcome.tags.insert(key.clone(), value.clone());
        }
    }
    if !signs.is_empty() {
        outcome
            .tags
            .insert("traffic_sign".to_string(), signs.join(";"));
    }
    outcome
}

/// A record located on the way it is keyed to.
struct Applied {
    kind: LayerKind,
    fraction: Fraction,
    tags: Tags,
}

/// Tag sets of the records that apply to `range` (or the whole way).
/// Only the first, strictest road-speed record is used.
fn select(applied: &[Applied], range: Option<(f64, f64)>) -> Vec<(LayerKind, &Tags)> {
    let mut speed_taken = false;
    applied
        .iter()
        .filter(|a| range.is_none_or(|(start, end)| a.fraction.overlaps(start, end)))
        .filter(|a| {
            if a.kind != LayerKind::RoadSpeeds {
                return true;
            }
            !std::mem::replace(&mut speed_taken, true)
        })
        .map(|a| (a.kind, &a.tags))
        .collect()
}

/// A piece written in place of a split way.
struct PieceRef {
    id: i64,
    first: i64,
    last: i64,
}

fn record_unmatched<T: SegmentRecord>(table: &FeatureTable<T>, report: &mut RunReport) {
    let layer = report.layer_mut(T::KIND);
    for (element_id, records) in table.unaccessed() {
        layer.unmatched.push(element_id);
        layer
            .unmatched_records
            .extend(records.iter().map(SegmentRecord::record_id));
    }
}

fn coord_key(coord: &Coord<f64>) -> (u64, u64) {
    (coord.x.to_bits(), coord.y.to_bits())
}

fn has_clean_key(filter: &TagCleanFilter, tags: &Tags) -> bool {
    filter.keys().iter().any(|key| tags.contains_key(key))
}

pub struct Rewriter<'a> {
    data: &'a RegulatoryData,
    locations: Option<&'a LocationIndex>,
    clean: Option<&'a TagCleanFilter>,
    sink: &'a mut dyn ElementSink,
    ids: IdAllocator,
    split_ways: HashMap<i64, Vec<PieceRef>>,
    report: RunReport,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        data: &'a RegulatoryData,
        locations: Option<&'a LocationIndex>,
        clean: Option<&'a TagCleanFilter>,
        ids: IdAllocator,
        sink: &'a mut dyn ElementSink,
    ) -> Self {
        let mut report = RunReport::default();
        if let Some(table) = &data.preferred_roads {
            report.layer_mut(LayerKind::PreferredRoads).records = table.len();
        }
        if let Some(table) = &data.road_speeds {
            report.layer_mut(LayerKind::RoadSpeeds).records = table.len();
        }
        if let Some(table) = &data.restrictions {
            report.layer_mut(LayerKind::Restrictions).records = table.len();
        }
        if let Some(zones) = &data.low_emission_zones {
            report.layer_mut(LayerKind::LowEmissionZones).records = zones.len();
        }
        report.advisories.duplicate_speed_ways = data.duplicate_speed_ways as u64;

        Self {
            data,
            locations,
            clean,
            sink,
            ids,
            split_ways: HashMap::new(),
            report,
        }
    }

    pub fn process(&mut self, element: OsmElement) -> Result<()> {
        match element {
            OsmElement::Node(node) => {
                self.report.nodes_read += 1;
                self.rewrite_node(node)
            }
            OsmElement::Way(way) => {
                self.report.ways_read += 1;
                let id = way.id;
                self.rewrite_way(way)
                    .with_context(|| format!("Pipeline: Failed to rewrite way {}", id))
            }
            OsmElement::Relation(relation) => {
                self.report.relations_read += 1;
                self.rewrite_relation(relation)
            }
        }
    }

    /// Synthesize zone boundaries and collect the unmatched ids.
    pub fn finish(mut self) -> Result<RunReport> {
        self.synthesize_zones()
            .context("Pipeline: Failed to synthesize low emission zones")?;

        let data = self.data;
        if let Some(table) = &data.preferred_roads {
            record_unmatched(table, &mut self.report);
        }
        if let Some(table) = &data.road_speeds {
            record_unmatched(table, &mut self.report);
        }
        if let Some(table) = &data.restrictions {
            record_unmatched(table, &mut self.report);
        }
        Ok(self.report)
    }

    fn rewrite_node(&mut self, mut node: Node) -> Result<()> {
        if let Some(clean) = self.clean
            && has_clean_key(clean, &node.tags)
            && clean.intersects(&Point::new(node.lon, node.lat))
        {
            let (tags, removed) = clean.strip(&node.tags);
            node.tags = tags;
            self.report.nodes_cleaned += 1;
            self.report.add_clean_removals(&removed);
        }
        self.sink.add_node(&node)
    }

    /// Way geometry; every node must have a location.
    fn way_line(&self, way: &Way) -> Result<LineString<f64>, GeometryError> {
        let mut coords = Vec::with_capacity(way.refs.len());
        for &node in &way.refs {
            let (lon, lat) = self
                .locations
                .and_then(|index| index.get(node))
                .ok_or(GeometryError::MissingLocation { way: way.id, node })?;
            coords.push(Coord { x: lon, y: lat });
        }
        if coords.len() < 2 {
            return Err(GeometryError::DegenerateWay { way: way.id });
        }
        Ok(LineString::new(coords))
    }

    /// Strip clean keys if the way touches the clean area. Nodes without a
    /// location are ignored for this test.
    fn clean_way(&mut self, way: &mut Way) {
        let Some(clean) = self.clean else {
            return;
        };
        if !has_clean_key(clean, &way.tags) {
            return;
        }
        let coords: Vec<Coord<f64>> = way
            .refs
            .iter()
            .filter_map(|&node| self.locations.and_then(|index| index.get(node)))
            .map(|(lon, lat)| Coord { x: lon, y: lat })
            .collect();
        let hit = match coords.as_slice() {
            [] => false,
            [single] => clean.intersects(&Point::from(*single)),
            _ => clean.intersects(&LineString::new(coords)),
        };
        if hit {
            let (tags, removed) = clean.strip(&way.tags);
            way.tags = tags;
            self.report.ways_cleaned += 1;
            self.report.add_clean_removals(&removed);
        }
    }

    fn locate_records<T: SegmentRecord>(
        &mut self,
        way_id: i64,
        parent: &LineString<f64>,
        records: &[T],
        applied: &mut Vec<Applied>,
    ) -> RewriteResult<()> {
        for record in records {
            let fraction = Fraction::locate(parent, record.geometry())
                .ok_or(GeometryError::UnresolvableFraction { way: way_id })?
                .normalized();
            if fraction.is_degenerate() {
                warn!(
                    way = way_id,
                    record = record.record_id(),
                    layer = T::KIND.name(),
                    fraction = fraction.start,
                    "Record covers no length of its way, skipped"
                );
                self.report.advisories.degenerate_fractions += 1;
                continue;
            }
            if record.is_fallback() {
                self.report.advisories.fallback_tags += 1;
            }
            applied.push(Applied {
                kind: T::KIND,
                fraction,
                tags: record.tags()?,
            });
        }
        Ok(())
    }

    fn count_layers(&mut self, outcome: &LayerOutcome) {
        for (kind, added) in &outcome.added {
            self.report.layer_mut(*kind).added += added;
        }
        for (kind, overridden) in &outcome.overridden {
            self.report.layer_mut(*kind).overridden += overridden;
        }
    }

    fn rewrite_way(&mut self, mut way: Way) -> Result<()> {
        self.clean_way(&mut way);

        let data = self.data;
        let preferred = data
            .preferred_roads
            .as_ref()
            .map_or(&[][..], |table| table.lookup(way.id));
        let speeds = data
            .road_speeds
            .as_ref()
            .map_or(&[][..], |table| table.lookup(way.id));
        let restrictions = data
            .restrictions
            .as_ref()
            .map_or(&[][..], |table| table.lookup(way.id));

        if preferred.is_empty() && speeds.is_empty() && restrictions.is_empty() {
            self.report.ways_copied += 1;
            return self.sink.add_way(&way);
        }

        let line = self.way_line(&way)?;
        let mut applied = Vec::new();
        self.locate_records(way.id, &line, preferred, &mut applied)?;
        self.locate_records(way.id, &line, speeds, &mut applied)?;
        self.locate_records(way.id, &line, restrictions, &mut applied)?;

        if applied.is_empty() {
            self.report.ways_copied += 1;
            return self.sink.add_way(&way);
        }

        if applied.iter().all(|a| a.fraction.is_full()) {
            let outcome = apply_layers(&way.tags, &select(&applied, None));
            self.count_layers(&outcome);
            way.tags = outcome.tags;
            self.report.ways_rewritten += 1;
            return self.sink.add_way(&way);
        }

        self.split(way, &line, &applied)
    }

    fn split(&mut self, way: Way, line: &LineString<f64>, applied: &[Applied]) -> Result<()> {
        let cuts = boundaries(applied.iter().flat_map(|a| {
            [
                Boundary {
                    fraction: a.fraction.start,
                    point: a.fraction.start_point,
                },
                Boundary {
                    fraction: a.fraction.end,
                    point: a.fraction.end_point,
                },
            ]
        }));
        let split = split_way(&way.refs, line, &cuts, &mut self.ids);
        debug!(
            way = way.id,
            pieces = split.pieces.len(),
            new_nodes = split.new_nodes.len(),
            "Splitting way"
        );

        for node in &split.new_nodes {
            self.sink.add_node(node)?;
        }
        self.report.split_nodes += split.new_nodes.len() as u64;

        let mut pieces = Vec::with_capacity(split.pieces.len());
        for piece in split.pieces {
            let outcome = apply_layers(&way.tags, &select(applied, Some((piece.start, piece.end))));
            self.count_layers(&outcome);
            // pieces always span at least two nodes
            let first = piece.refs[0];
            let last = piece.refs[piece.refs.len() - 1];
            let piece_way = Way {
                id: self.ids.next_way(),
                refs: piece.refs,
                tags: outcome.tags,
                meta: Some(MetadataFields::synthetic()),
            };
            self.sink.add_way(&piece_way)?;
            pieces.push(PieceRef {
                id: piece_way.id,
                first,
                last,
            });
        }

        self.report.ways_split += 1;
        self.report.split_pieces += pieces.len() as u64;
        self.split_ways.insert(way.id, pieces);
        Ok(())
    }

    fn rewrite_relation(&mut self, mut relation: Relation) -> Result<()> {
        if self.data.low_emission_zones.is_some()
            && relation.tags.get("boundary").map(String::as_str) == Some("low_emission_zone")
        {
            debug!(relation = relation.id, "Dropping low emission zone relation");
            self.report.relations_dropped += 1;
            return Ok(());
        }

        let touches_split = relation
            .members
            .iter()
            .any(|m| m.member_type == MemberType::Way && self.split_ways.contains_key(&m.id));
        if touches_split {
            relation.members = self.remap_members(&relation);
            self.report.relations_remapped += 1;
        }
        self.sink.add_relation(&relation)
    }

    /// Members with split ways replaced by their pieces. Turn restrictions
    /// keep only the pieces that touch a via node.
    fn remap_members(&self, relation: &Relation) -> Vec<Member> {
        let is_restriction = relation.tags.get("type").map(String::as_str) == Some("restriction");
        let via: HashSet<i64> = relation
            .members
            .iter()
            .filter(|m| m.member_type == MemberType::Node && m.role == "via")
            .map(|m| m.id)
            .collect();

        let mut members = Vec::with_capacity(relation.members.len());
        for member in &relation.members {
            let pieces = match member.member_type {
                MemberType::Way => self.split_ways.get(&member.id),
                _ => None,
            };
            let Some(pieces) = pieces else {
                members.push(member.clone());
                continue;
            };
            let mut kept: Vec<&PieceRef> = if is_restriction {
                pieces
                    .iter()
                    .filter(|p| via.contains(&p.first) || via.contains(&p.last))
                    .collect()
            } else {
                Vec::new()
            };
            if kept.is_empty() {
                kept = pieces.iter().collect();
            }
            members.extend(kept.into_iter().map(|piece| Member {
                member_type: MemberType::Way,
                id: piece.id,
                role: member.role.clone(),
            }));
        }
        members
    }

    fn synthesize_zones(&mut self) -> Result<()> {
        let data = self.data;
        let Some(zones) = &data.low_emission_zones else {
            return Ok(());
        };

        for zone in zones {
            if zone.rings.is_empty() {
                return Err(GeometryError::MalformedRing { zone: zone.zone_id }.into());
            }
            let mut members = Vec::with_capacity(zone.rings.len());
            for ring in &zone.rings {
                let mut coords = ring.coords.clone();
                if coords.first() == coords.last() {
                    coords.pop();
                } else {
                    warn!(zone = zone.zone_id, "Zone ring is not closed, closing it");
                    self.report.advisories.auto_closed_rings += 1;
                }
                coords.dedup();
                while coords.len() > 1 && coords.first() == coords.last() {
                    coords.pop();
                }
                let distinct: HashSet<(u64, u64)> = coords.iter().map(coord_key).collect();
                if distinct.len() < 3 {
                    return Err(GeometryError::MalformedRing { zone: zone.zone_id }.into());
                }

                // a vertex the ring passes through twice keeps a single node
                let mut nodes: HashMap<(u64, u64), i64> = HashMap::with_capacity(distinct.len());
                let mut refs = Vec::with_capacity(coords.len() + 1);
                for coord in &coords {
                    let key = coord_key(coord);
                    if let Some(&id) = nodes.get(&key) {
                        refs.push(id);
                        continue;
                    }
                    let node = Node {
                        id: self.ids.next_node(),
                        lat: coord.y,
                        lon: coord.x,
                        tags: Tags::new(),
                        meta: Some(MetadataFields::synthetic()),
                    };
                    self.sink.add_node(&node)?;
                    nodes.insert(key, node.id);
                    refs.push(node.id);
                }
                refs.push(refs[0]);
                self.report.synthesized_nodes += nodes.len() as u64;

                let way = Way {
                    id: self.ids.next_way(),
                    refs,
                    tags: Tags::new(),
                    meta: Some(MetadataFields::synthetic()),
                };
                self.sink.add_way(&way)?;
                self.report.synthesized_ways += 1;
                members.push(Member {
                    member_type: MemberType::Way,
                    id: way.id,
                    role: if ring.inner { "inner" } else { "outer" }.to_string(),
                });
            }

            let relation = Relation {
                id: self.ids.next_relation(),
                members,
                tags: zone.tags(),
                meta: Some(MetadataFields::synthetic()),
            };
            self.sink.add_relation(&relation)?;
            self.report.synthesized_relations += 1;
            self.report.layer_mut(LayerKind::LowEmissionZones).added += relation.tags.len() as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::build_tags;
    use crate::regulatory::{
        LowEmissionZoneRecord, PreferredRoadRecord, RestrSign, RestrictionRecord,
        RestrictionType, RoadSpeedRecord, SpeedClass, ZoneClass, ZoneRing,
    };
    use crate::regulatory::{AdminArea, Direction};
    use crate::sinks::MemorySink;
    use geo_types::{MultiPolygon, polygon};

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        build_tags(pairs.iter().copied())
    }

    fn line(coords: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(coords.to_vec())
    }

    fn node(id: i64, lon: f64, lat: f64) -> OsmElement {
        OsmElement::Node(Node {
            id,
            lat,
            lon,
            tags: Tags::new(),
            meta: None,
        })
    }

    fn way(id: i64, refs: &[i64], pairs: &[(&str, &str)]) -> OsmElement {
        OsmElement::Way(Way {
            id,
            refs: refs.to_vec(),
            tags: tags(pairs),
            meta: None,
        })
    }

    /// Nodes 1..=3 along the x axis at 0, 5 and 10.
    fn locations() -> LocationIndex {
        LocationIndex::from_pairs(&[(1, 0.0, 0.0), (2, 5.0, 0.0), (3, 10.0, 0.0)])
    }

    fn run(
        data: &RegulatoryData,
        index: Option<&LocationIndex>,
        clean: Option<&TagCleanFilter>,
        elements: Vec<OsmElement>,
    ) -> Result<(MemorySink, RunReport)> {
        let mut sink = MemorySink::default();
        let mut rewriter = Rewriter::new(data, index, clean, IdAllocator::default(), &mut sink);
        for element in elements {
            rewriter.process(element)?;
        }
        let report = rewriter.finish()?;
        Ok((sink, report))
    }

    fn restrictions(records: Vec<RestrictionRecord>) -> RegulatoryData {
        RegulatoryData {
            restrictions: Some(FeatureTable::new(records)),
            ..RegulatoryData::default()
        }
    }

    fn speeds(records: Vec<RoadSpeedRecord>) -> RegulatoryData {
        let (table, duplicates) = RoadSpeedRecord::table(records);
        RegulatoryData {
            road_speeds: Some(table),
            duplicate_speed_ways: duplicates,
            ..RegulatoryData::default()
        }
    }

    #[test]
    fn apply_layers_orders_and_merges_signs() {
        let source = tags(&[("highway", "primary"), ("maxspeed", "70"), ("hgv", "yes")]);
        let speed = tags(&[("maxspeed", "30")]);
        let preferred = tags(&[("hgv", "designated")]);
        let first = tags(&[("maxweight", "7.5"), ("traffic_sign", "DE:262")]);
        let second = tags(&[("maxheight", "3.5"), ("traffic_sign", "DE:265")]);

        let outcome = apply_layers(
            &source,
            &[
                (LayerKind::Restrictions, &first),
                (LayerKind::RoadSpeeds, &speed),
                (LayerKind::PreferredRoads, &preferred),
                (LayerKind::Restrictions, &second),
            ],
        );
        assert_eq!(
            outcome.tags,
            tags(&[
                ("highway", "primary"),
                ("hgv", "designated"),
                ("maxspeed", "30"),
                ("maxweight", "7.5"),
                ("maxheight", "3.5"),
                ("traffic_sign", "DE:262;DE:265"),
            ])
        );
        assert_eq!(outcome.overridden[&LayerKind::RoadSpeeds], 1);
        // only the source hgv=yes is invalidated
        assert_eq!(outcome.overridden[&LayerKind::Restrictions], 1);
        assert_eq!(outcome.added[&LayerKind::Restrictions], 4);
    }

    #[test]
    fn apply_layers_without_layers_is_identity() {
        let source = tags(&[("highway", "primary"), ("maxspeed", "70")]);
        let outcome = apply_layers(&source, &[]);
        assert_eq!(outcome.tags, source);
        assert!(outcome.added.is_empty());
    }

    #[test]
    fn ways_without_records_are_copied() {
        let data = restrictions(vec![]);
        let elements = vec![
            node(1, 0.0, 0.0),
            node(3, 10.0, 0.0),
            way(7, &[1, 3], &[("highway", "primary"), ("maxheight", "3")]),
        ];
        let (sink, report) = run(&data, Some(&locations()), None, elements).unwrap();
        assert_eq!(sink.nodes.len(), 2);
        assert_eq!(sink.ways.len(), 1);
        assert_eq!(sink.ways[0].refs, vec![1, 3]);
        assert_eq!(
            sink.ways[0].tags,
            tags(&[("highway", "primary"), ("maxheight", "3")])
        );
        assert_eq!(report.ways_copied, 1);
    }

    #[test]
    fn whole_length_restriction_rewrites_in_place() {
        let mut record = RestrictionRecord::sample(7, RestrictionType::Height, Some("7,5"))
            .with_signs(&[RestrSign::Vz1020_30]);
        record.geometry = line(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)]);
        let data = restrictions(vec![record]);

        let elements = vec![way(
            7,
            &[1, 2, 3],
            &[("highway", "primary"), ("maxheight", "3")],
        )];
        let (sink, report) = run(&data, Some(&locations()), None, elements).unwrap();

        assert_eq!(sink.ways.len(), 1);
        let way = &sink.ways[0];
        assert_eq!(way.id, 7);
        assert_eq!(
            way.tags,
            tags(&[
                ("highway", "primary"),
                ("maxheight", "7.5"),
                ("maxheight:conditional", "none @ destination"),
                ("traffic_sign", "DE:265,1020-30"),
            ])
        );
        assert_eq!(report.ways_rewritten, 1);
        assert_eq!(report.layers[&LayerKind::Restrictions].overridden, 1);
        assert_eq!(report.layers[&LayerKind::Restrictions].added, 3);
    }

    #[test]
    fn partial_speed_record_splits_into_three_ways() {
        let data = speeds(vec![RoadSpeedRecord::sample(
            7,
            SpeedClass::S30,
            line(&[(4.0, 0.0), (7.0, 0.0)]),
        )]);
        let index = LocationIndex::from_pairs(&[(1, 0.0, 0.0), (3, 10.0, 0.0)]);
        let elements = vec![way(7, &[1, 3], &[("highway", "residential"), ("maxspeed", "50")])];
        let (sink, report) = run(&data, Some(&index), None, elements).unwrap();

        assert_eq!(sink.ways.len(), 3);
        assert!(sink.way(7).is_none());
        assert_eq!(sink.nodes.len(), 2);
        let [a, b] = [&sink.nodes[0], &sink.nodes[1]];
        assert_eq!((a.lon, b.lon), (4.0, 7.0));

        assert_eq!(sink.ways[0].refs, vec![1, a.id]);
        assert_eq!(sink.ways[1].refs, vec![a.id, b.id]);
        assert_eq!(sink.ways[2].refs, vec![b.id, 3]);
        assert_eq!(sink.ways[0].tags["maxspeed"], "50");
        assert_eq!(sink.ways[1].tags["maxspeed"], "30");
        assert_eq!(sink.ways[1].tags["zone:traffic"], "DE:zone30");
        assert_eq!(sink.ways[2].tags["maxspeed"], "50");
        assert!(sink.ways.iter().all(|w| w.tags["highway"] == "residential"));

        assert_eq!(report.ways_split, 1);
        assert_eq!(report.split_pieces, 3);
        assert_eq!(report.split_nodes, 2);
    }

    #[test]
    fn strictest_speed_wins_regardless_of_order() {
        let whole = line(&[(0.0, 0.0), (10.0, 0.0)]);
        let data = speeds(vec![
            RoadSpeedRecord::sample(7, SpeedClass::Urban, whole.clone()),
            RoadSpeedRecord::sample(7, SpeedClass::S20, whole.clone()),
            RoadSpeedRecord::sample(7, SpeedClass::S30, whole),
        ]);
        let elements = vec![way(7, &[1, 3], &[("highway", "residential")])];
        let (sink, _) = run(&data, Some(&locations()), None, elements).unwrap();
        assert_eq!(sink.ways[0].tags["maxspeed"], "20");
    }

    #[test]
    fn split_pieces_take_the_strictest_overlapping_speed() {
        let data = speeds(vec![
            RoadSpeedRecord::sample(7, SpeedClass::Urban, line(&[(0.0, 0.0), (10.0, 0.0)])),
            RoadSpeedRecord::sample(7, SpeedClass::Pedestrian, line(&[(5.0, 0.0), (10.0, 0.0)])),
        ]);
        let elements = vec![way(7, &[1, 2, 3], &[("highway", "residential")])];
        let (sink, report) = run(&data, Some(&locations()), None, elements).unwrap();

        assert_eq!(report.split_nodes, 0);
        assert_eq!(sink.ways.len(), 2);
        assert_eq!(sink.ways[0].refs, vec![1, 2]);
        assert_eq!(sink.ways[0].tags["maxspeed"], "50");
        assert_eq!(sink.ways[1].refs, vec![2, 3]);
        assert_eq!(sink.ways[1].tags["maxspeed"], "10");
    }

    #[test]
    fn preferred_road_and_restriction_combine() {
        let whole = line(&[(0.0, 0.0), (10.0, 0.0)]);
        let mut restriction = RestrictionRecord::sample(7, RestrictionType::Weight, Some("12"));
        restriction.geometry = whole.clone();
        let data = RegulatoryData {
            restrictions: Some(FeatureTable::new(vec![restriction])),
            preferred_roads: Some(FeatureTable::new(vec![PreferredRoadRecord {
                osm_id: 7,
                direction: Direction::Forward,
                geometry: whole,
            }])),
            ..RegulatoryData::default()
        };
        let elements = vec![way(7, &[1, 3], &[("highway", "primary")])];
        let (sink, _) = run(&data, Some(&locations()), None, elements).unwrap();
        let way_tags = &sink.ways[0].tags;
        assert_eq!(way_tags["maxweight"], "12");
        assert_eq!(way_tags["hgv:forward"], "designated");
    }

    #[test]
    fn degenerate_record_is_skipped() {
        let data = speeds(vec![RoadSpeedRecord::sample(
            7,
            SpeedClass::S30,
            line(&[(5.0, 0.0), (5.0001, 0.0)]),
        )]);
        let elements = vec![way(7, &[1, 3], &[("highway", "residential")])];
        let (sink, report) = run(&data, Some(&locations()), None, elements).unwrap();
        assert_eq!(sink.ways.len(), 1);
        assert!(!sink.ways[0].tags.contains_key("maxspeed"));
        assert_eq!(report.advisories.degenerate_fractions, 1);
        assert_eq!(report.ways_copied, 1);
    }

    #[test]
    fn missing_location_is_fatal() {
        let data = speeds(vec![RoadSpeedRecord::sample(
            7,
            SpeedClass::S30,
            line(&[(0.0, 0.0), (10.0, 0.0)]),
        )]);
        let elements = vec![way(7, &[1, 99], &[("highway", "residential")])];
        let err = run(&data, Some(&locations()), None, elements).err().unwrap();
        let root = err.root_cause().to_string();
        assert!(root.contains("node 99"), "{root}");
    }

    #[test]
    fn unmatched_ids_are_reported() {
        let mut stray = RoadSpeedRecord::sample(999, SpeedClass::S30, line(&[(0.0, 0.0), (1.0, 0.0)]));
        stray.segment_id = 52_350_372;
        let segment_id = stray.segment_id;
        let data = speeds(vec![
            RoadSpeedRecord::sample(7, SpeedClass::S30, line(&[(0.0, 0.0), (10.0, 0.0)])),
            stray,
        ]);
        let elements = vec![way(7, &[1, 3], &[("highway", "residential")])];
        let (_, report) = run(&data, Some(&locations()), None, elements).unwrap();
        let layer = &report.layers[&LayerKind::RoadSpeeds];
        assert_eq!(layer.unmatched, vec![999]);
        assert_eq!(layer.unmatched_records, vec![segment_id]);
        assert_eq!(layer.records, 2);
    }

    #[test]
    fn restriction_relations_keep_pieces_at_the_via_node() {
        let data = speeds(vec![RoadSpeedRecord::sample(
            7,
            SpeedClass::S30,
            line(&[(5.0, 0.0), (10.0, 0.0)]),
        )]);
        let route = Relation {
            id: 50,
            members: vec![Member {
                member_type: MemberType::Way,
                id: 7,
                role: String::new(),
            }],
            tags: tags(&[("type", "route")]),
            meta: None,
        };
        let turn = Relation {
            id: 51,
            members: vec![
                Member {
                    member_type: MemberType::Way,
                    id: 7,
                    role: "from".to_string(),
                },
                Member {
                    member_type: MemberType::Node,
                    id: 3,
                    role: "via".to_string(),
                },
                Member {
                    member_type: MemberType::Way,
                    id: 8,
                    role: "to".to_string(),
                },
            ],
            tags: tags(&[("type", "restriction"), ("restriction", "no_left_turn")]),
            meta: None,
        };
        let elements = vec![
            way(7, &[1, 2, 3], &[("highway", "residential")]),
            OsmElement::Relation(route),
            OsmElement::Relation(turn),
        ];
        let (sink, report) = run(&data, Some(&locations()), None, elements).unwrap();
        let pieces: Vec<i64> = sink.ways.iter().map(|w| w.id).collect();
        assert_eq!(pieces.len(), 2);

        let route = &sink.relations[0];
        let route_members: Vec<i64> = route.members.iter().map(|m| m.id).collect();
        assert_eq!(route_members, pieces);

        let turn = &sink.relations[1];
        assert_eq!(turn.members.len(), 3);
        assert_eq!(turn.members[0].id, pieces[1]);
        assert_eq!(turn.members[0].role, "from");
        assert_eq!(turn.members[2].id, 8);
        assert_eq!(report.relations_remapped, 2);
    }

    fn zone(rings: Vec<ZoneRing>) -> LowEmissionZoneRecord {
        LowEmissionZoneRecord {
            zone_id: 12,
            class: ZoneClass::Green,
            admin: AdminArea::default(),
            rings,
        }
    }

    fn ring(coords: &[(f64, f64)], inner: bool) -> ZoneRing {
        ZoneRing {
            coords: coords.iter().map(|&(x, y)| Coord { x, y }).collect(),
            inner,
        }
    }

    #[test]
    fn zones_replace_existing_boundaries() {
        let data = RegulatoryData {
            low_emission_zones: Some(vec![zone(vec![
                ring(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)], false),
                ring(&[(1.0, 1.0), (2.0, 1.0), (2.0, 2.0)], true),
            ])]),
            ..RegulatoryData::default()
        };
        let existing = Relation {
            id: 5,
            members: vec![],
            tags: tags(&[("type", "boundary"), ("boundary", "low_emission_zone")]),
            meta: None,
        };
        let (sink, report) =
            run(&data, None, None, vec![OsmElement::Relation(existing)]).unwrap();

        assert_eq!(report.relations_dropped, 1);
        assert_eq!(sink.nodes.len(), 7);
        assert_eq!(sink.ways.len(), 2);
        let outer = &sink.ways[0];
        assert_eq!(outer.refs.len(), 5);
        assert_eq!(outer.refs.first(), outer.refs.last());
        assert!(outer.tags.is_empty());

        assert_eq!(sink.relations.len(), 1);
        let relation = &sink.relations[0];
        assert_eq!(relation.id, DEFAULT_SEED);
        assert_eq!(relation.tags["boundary"], "low_emission_zone");
        assert_eq!(relation.tags["low_emission_zone:type"], "green");
        let roles: Vec<&str> = relation.members.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["outer", "inner"]);

        assert_eq!(report.advisories.auto_closed_rings, 1);
        assert_eq!(report.synthesized_nodes, 7);
        assert_eq!(report.synthesized_relations, 1);
    }

    #[test]
    fn ring_vertices_map_to_nodes_by_coordinate() {
        let data = RegulatoryData {
            low_emission_zones: Some(vec![zone(vec![
                ring(
                    &[(0.0, 0.0), (2.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.0, 2.0), (1.0, 1.0), (0.0, 0.0)],
                    false,
                ),
                ring(&[(5.0, 5.0), (5.0, 5.0), (6.0, 5.0), (6.0, 6.0), (5.0, 5.0)], true),
            ])]),
            ..RegulatoryData::default()
        };
        let (sink, report) = run(&data, None, None, vec![]).unwrap();

        let touching = &sink.ways[0];
        assert_eq!(touching.refs.len(), 7);
        assert_eq!(touching.refs[2], touching.refs[5]);
        assert_eq!(touching.refs.first(), touching.refs.last());

        let repeated = &sink.ways[1];
        assert_eq!(repeated.refs.len(), 4);

        assert_eq!(sink.nodes.len(), 8);
        assert_eq!(report.synthesized_nodes, 8);
        assert_eq!(report.advisories.auto_closed_rings, 0);
    }

    #[test]
    fn ring_with_two_points_is_malformed() {
        let data = RegulatoryData {
            low_emission_zones: Some(vec![zone(vec![ring(
                &[(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)],
                false,
            )])]),
            ..RegulatoryData::default()
        };
        let err = run(&data, None, None, vec![]).err().unwrap();
        assert!(err.root_cause().to_string().contains("zone 12"));
    }

    #[test]
    fn clean_filter_strips_inside_the_area() {
        let area = MultiPolygon::new(vec![polygon![
            (x: -1.0, y: -1.0),
            (x: 1.0, y: -1.0),
            (x: 1.0, y: 1.0),
            (x: -1.0, y: 1.0),
            (x: -1.0, y: -1.0),
        ]]);
        let clean = TagCleanFilter::new(9, vec!["maxspeed".to_string()], area).unwrap();
        let data = RegulatoryData::default();
        let index = LocationIndex::from_pairs(&[(1, 0.0, 0.0), (3, 10.0, 0.0), (4, 20.0, 0.0)]);

        let inside = OsmElement::Node(Node {
            id: 1,
            lat: 0.0,
            lon: 0.0,
            tags: tags(&[("maxspeed", "30"), ("highway", "traffic_signals")]),
            meta: None,
        });
        let elements = vec![
            inside,
            way(7, &[1, 3], &[("highway", "primary"), ("maxspeed", "70")]),
            way(8, &[3, 4], &[("highway", "primary"), ("maxspeed", "70")]),
        ];
        let (sink, report) = run(&data, Some(&index), Some(&clean), elements).unwrap();

        assert_eq!(sink.nodes[0].tags, tags(&[("highway", "traffic_signals")]));
        assert!(!sink.way(7).unwrap().tags.contains_key("maxspeed"));
        assert_eq!(sink.way(8).unwrap().tags["maxspeed"], "70");
        assert_eq!(report.nodes_cleaned, 1);
        assert_eq!(report.ways_cleaned, 1);
        assert_eq!(report.clean_removed["maxspeed"], 2);
    }

    #[test]
    fn second_pass_is_a_fixed_point() {
        let whole = line(&[(0.0, 0.0), (10.0, 0.0)]);
        let mut restriction = RestrictionRecord::sample(7, RestrictionType::Height, Some("4"));
        restriction.geometry = whole;
        let (table, _) = RoadSpeedRecord::table(vec![RoadSpeedRecord::sample(
            8,
            SpeedClass::S20,
            line(&[(10.0, 0.0), (15.0, 0.0)]),
        )]);
        let data = RegulatoryData {
            restrictions: Some(FeatureTable::new(vec![restriction])),
            road_speeds: Some(table),
            ..RegulatoryData::default()
        };
        let index = LocationIndex::from_pairs(&[(1, 0.0, 0.0), (3, 10.0, 0.0), (4, 20.0, 0.0)]);
        let input = vec![
            node(1, 0.0, 0.0),
            node(3, 10.0, 0.0),
            node(4, 20.0, 0.0),
            way(7, &[1, 3], &[("highway", "primary"), ("maxheight", "2")]),
            way(8, &[3, 4], &[("highway", "residential")]),
        ];
        let (first, _) = run(&data, Some(&index), None, input).unwrap();

        let pairs: Vec<(i64, f64, f64)> = first.nodes.iter().map(|n| (n.id, n.lon, n.lat)).collect();
        let index = LocationIndex::from_pairs(&pairs);
        let replay: Vec<OsmElement> = first
            .nodes
            .iter()
            .cloned()
            .map(OsmElement::Node)
            .chain(first.ways.iter().cloned().map(OsmElement::Way))
            .collect();
        let (second, report) = run(&data, Some(&index), None, replay).unwrap();

        assert_eq!(second.ways, first.ways);
        assert_eq!(second.nodes, first.nodes);
        assert_eq!(report.ways_split, 0);
    }
}
