//! Cutting a way into pieces at fractional positions.

use geo_types::{Coord, LineString};

use super::ids::IdAllocator;
use crate::geometry::{round_fraction, vertex_fractions};
use crate::metadata::MetadataFields;
use crate::osm::{Node, Tags};

/// A cut position and the coordinate to use if no node sits there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    pub fraction: f64,
    pub point: Coord<f64>,
}

/// Interior boundaries of the given ranges, sorted and without duplicates.
///
/// When several ranges share a fraction the first one's point is kept.
pub fn boundaries<I>(ranges: I) -> Vec<Boundary>
where
    I: IntoIterator<Item = Boundary>,
{
    let mut found: Vec<Boundary> = Vec::new();
    for boundary in ranges {
        if boundary.fraction <= 0.0 || boundary.fraction >= 1.0 {
            continue;
        }
        if found.iter().all(|b| b.fraction != boundary.fraction) {
            found.push(boundary);
        }
    }
    found.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
    found
}

#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub refs: Vec<i64>,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Default)]
pub struct Split {
    pub pieces: Vec<Piece>,
    /// Nodes created for boundaries between existing nodes.
    pub new_nodes: Vec<Node>,
}

enum Anchor {
    Existing(usize),
    New(i64),
}

/// Partition `refs` (located at `line`) at `boundaries`.
///
/// A boundary whose fraction equals an existing node's rounded fraction cuts
/// at that node; any other boundary gets a new node at its point. Consecutive
/// pieces share their boundary node.
pub fn split_way(
    refs: &[i64],
    line: &LineString<f64>,
    boundaries: &[Boundary],
    ids: &mut IdAllocator,
) -> Split {
    let fractions = vertex_fractions(line);
    let mut split = Split::default();

    let anchors: Vec<(f64, Anchor)> = boundaries
        .iter()
        .map(|boundary| {
            let existing = fractions
                .iter()
                .position(|&f| round_fraction(f) == boundary.fraction);
            let anchor = match existing {
                Some(index) => Anchor::Existing(index),
                None => {
                    let node = Node {
                        id: ids.next_node(),
                        lat: boundary.point.y,
                        lon: boundary.point.x,
                        tags: Tags::new(),
                        meta: Some(MetadataFields::synthetic()),
                    };
                    let id = node.id;
                    split.new_nodes.push(node);
                    Anchor::New(id)
                }
            };
            (boundary.fraction, anchor)
        })
        .collect();

    let mut current = Vec::new();
    let mut start = 0.0;
    let mut pending = anchors.iter().peekable();
    let mut cut = |current: &mut Vec<i64>, start: &mut f64, fraction: f64, node: i64| {
        current.push(node);
        split.pieces.push(Piece {
            refs: std::mem::replace(current, vec![node]),
            start: *start,
            end: fraction,
        });
        *start = fraction;
    };

    for (index, (&node_ref, &fraction)) in refs.iter().zip(fractions.iter()).enumerate() {
        while let Some((boundary, Anchor::New(id))) = pending.peek() {
            if *boundary >= fraction {
                break;
            }
            cut(&mut current, &mut start, *boundary, *id);
            pending.next();
        }
        if let Some((boundary, Anchor::Existing(at))) = pending.peek()
            && *at == index
        {
            cut(&mut current, &mut start, *boundary, node_ref);
            pending.next();
            continue;
        }
        current.push(node_ref);
    }

    split.pieces.push(Piece {
        refs: current,
        start,
        end: 1.0,
    });
    split
}
