//! Removal of configured tag keys inside a polygon.

use std::collections::BTreeMap;

use geo::{BoundingRect, Intersects, Relate};
use geo_types::{Coord, MultiPolygon, Polygon, Rect};
use rstar::{AABB, RTree, RTreeObject};
use tracing::info;

use crate::error::ConfigurationError;
use crate::osm::Tags;

const MIN_GRID: usize = 4;
const MAX_GRID: usize = 64;
/// Exterior vertices per grid cell the subdivision aims for.
const VERTICES_PER_CELL: usize = 32;
const BUFFER_RATIO: f64 = 1e-9;

/// One grid window. Interior windows lie entirely inside the area and are
/// tested directly; boundary windows defer to the area itself.
struct Cell {
    polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
    interior: bool,
}

impl RTreeObject for Cell {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn rect_envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Spatial filter that strips tag keys from elements inside an area.
///
/// The bounding box of the polygon is cut into grid cells. Geometries that
/// only meet interior cells are decided by a rectangle test; only those near
/// the boundary are tested against the full polygon.
pub struct TagCleanFilter {
    origin_id: i64,
    keys: Vec<String>,
    area: MultiPolygon<f64>,
    tree: RTree<Cell>,
}

impl TagCleanFilter {
    pub fn new(
        origin_id: i64,
        keys: Vec<String>,
        area: MultiPolygon<f64>,
    ) -> Result<Self, ConfigurationError> {
        if keys.is_empty() {
            return Err(ConfigurationError::EmptyCleanKeys);
        }
        let bounds = area.bounding_rect().ok_or_else(|| {
            ConfigurationError::InvalidPolygon(format!("area {origin_id} has no coordinates"))
        })?;
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return Err(ConfigurationError::InvalidPolygon(format!(
                "area {origin_id} has no extent"
            )));
        }

        let cells = subdivide(&area, bounds);
        if cells.is_empty() {
            return Err(ConfigurationError::InvalidPolygon(format!(
                "area {origin_id} has no interior"
            )));
        }
        info!(
            "Tag-clean area {} split into {} cells for keys {:?}",
            origin_id,
            cells.len(),
            keys
        );

        Ok(Self {
            origin_id,
            keys,
            area,
            tree: RTree::bulk_load(cells),
        })
    }

    pub fn origin_id(&self) -> i64 {
        self.origin_id
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn cell_count(&self) -> usize {
        self.tree.size()
    }

    /// True if `geometry` touches any cell of the area, boundary included.
    pub fn intersects<G>(&self, geometry: &G) -> bool
    where
        G: BoundingRect<f64>,
        G::Output: Into<Option<Rect<f64>>>,
        Polygon<f64>: Intersects<G>,
        MultiPolygon<f64>: Intersects<G>,
    {
        let rect: Option<Rect<f64>> = geometry.bounding_rect().into();
        let Some(rect) = rect else {
            return false;
        };
        let mut near_boundary = false;
        for cell in self
            .tree
            .locate_in_envelope_intersecting(&rect_envelope(rect))
        {
            if !cell.interior {
                near_boundary = true;
            } else if cell.polygon.intersects(geometry) {
                return true;
            }
        }
        near_boundary && self.area.intersects(geometry)
    }

    /// Copy of `tags` without the configured keys, plus what was removed.
    pub fn strip(&self, tags: &Tags) -> (Tags, BTreeMap<String, usize>) {
        let mut cleaned = tags.clone();
        let mut removed = BTreeMap::new();
        for key in &self.keys {
            if cleaned.remove(key).is_some() {
                *removed.entry(key.clone()).or_insert(0) += 1;
            }
        }
        (cleaned, removed)
    }
}

/// Cut the bounds of `area` along a regular grid and keep the windows that
/// touch it. Boundary windows are slightly enlarged so that points on the
/// polygon edge or on shared grid lines always find one.
fn subdivide(area: &MultiPolygon<f64>, bounds: Rect<f64>) -> Vec<Cell> {
    let vertices: usize = area.0.iter().map(|p| p.exterior().0.len()).sum();
    let grid = (((vertices / VERTICES_PER_CELL) as f64).sqrt().ceil() as usize).clamp(MIN_GRID, MAX_GRID);

    let step_x = bounds.width() / grid as f64;
    let step_y = bounds.height() / grid as f64;
    let buffer = BUFFER_RATIO * bounds.width().max(bounds.height());
    let origin = bounds.min();

    let mut cells = Vec::new();
    for row in 0..grid {
        for col in 0..grid {
            let min = Coord {
                x: origin.x + col as f64 * step_x,
                y: origin.y + row as f64 * step_y,
            };
            // the outer grid lines are the exact bounds of the area
            let max = Coord {
                x: if col + 1 == grid {
                    bounds.max().x
                } else {
                    origin.x + (col + 1) as f64 * step_x
                },
                y: if row + 1 == grid {
                    bounds.max().y
                } else {
                    origin.y + (row + 1) as f64 * step_y
                },
            };
            let window = Rect::new(min, max).to_polygon();
            if area.relate(&window).is_contains() {
                cells.push(Cell {
                    envelope: rect_envelope(Rect::new(min, max)),
                    polygon: window,
                    interior: true,
                });
                continue;
            }
            let buffered = Rect::new(
                Coord {
                    x: min.x - buffer,
                    y: min.y - buffer,
                },
                Coord {
                    x: max.x + buffer,
                    y: max.y + buffer,
                },
            );
            let polygon = buffered.to_polygon();
            if area.intersects(&polygon) {
                cells.push(Cell {
                    envelope: rect_envelope(buffered),
                    polygon,
                    interior: false,
                });
            }
        }
    }
    cells
}
