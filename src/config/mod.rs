use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use geo_types::{Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;
use crate::geometry::TagCleanFilter;
use crate::regulatory::source::parse_features;
use crate::rewriter::{DEFAULT_SEED, IdAllocator};

/// Inputs at or above this size get the on-disk location index in auto mode.
pub const SPARSE_THRESHOLD_BYTES: u64 = 256 * 1024 * 1024;

const ENV_PREFIX: &str = "ROADREG";

/// Run settings from an optional YAML file and `ROADREG_*` variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub start_node_id: i64,
    pub start_way_id: i64,
    pub start_relation_id: i64,
    pub clean_tags: Option<CleanTagsSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_node_id: DEFAULT_SEED,
            start_way_id: DEFAULT_SEED,
            start_relation_id: DEFAULT_SEED,
            clean_tags: None,
        }
    }
}

/// Keys to strip from elements inside an area.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CleanTagsSettings {
    #[serde(default = "default_true")]
    pub active: bool,
    pub tags: Vec<String>,
    /// Id of the relation the polygon was taken from.
    pub area: i64,
    /// GeoJSON file holding the polygon.
    pub polygon: PathBuf,
}

fn default_true() -> bool {
    true
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn id_allocator(&self) -> Result<IdAllocator, ConfigurationError> {
        IdAllocator::new(
            self.start_node_id,
            self.start_way_id,
            self.start_relation_id,
        )
    }

    /// The spatial tag-clean filter, if configured and active.
    ///
    /// A relative polygon path is resolved against `base_dir`.
    pub fn clean_filter(&self, base_dir: &Path) -> Result<Option<TagCleanFilter>> {
        let Some(clean) = self.clean_tags.as_ref().filter(|clean| clean.active) else {
            return Ok(None);
        };
        let path = base_dir.join(&clean.polygon);
        let area = load_polygon(&path)?;
        let filter = TagCleanFilter::new(clean.area, clean.tags.clone(), area)?;
        tracing::info!(
            "Tag clean: {:?} inside area {} ({} grid cells)",
            filter.keys(),
            filter.origin_id(),
            filter.cell_count()
        );
        Ok(Some(filter))
    }
}

/// First Polygon or MultiPolygon in a GeoJSON file.
pub fn load_polygon(path: &Path) -> Result<MultiPolygon<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Config: Failed to read polygon {}", path.display()))?;
    let features = parse_features(&text)
        .with_context(|| format!("Config: Failed to parse polygon {}", path.display()))?;
    for feature in features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry = Geometry::<f64>::try_from(geometry.value)
            .map_err(|err| ConfigurationError::InvalidPolygon(err.to_string()))?;
        match geometry {
            Geometry::Polygon(polygon) => return Ok(MultiPolygon::new(vec![polygon])),
            Geometry::MultiPolygon(polygons) => return Ok(polygons),
            _ => {}
        }
    }
    Err(anyhow!(ConfigurationError::InvalidPolygon(format!(
        "no polygon in {}",
        path.display()
    ))))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuntimeConfig {
    pub node_cache_mode: NodeCacheMode,
    pub sparse_threshold_bytes: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_cache_mode: NodeCacheMode::Auto,
            sparse_threshold_bytes: SPARSE_THRESHOLD_BYTES,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NodeCacheMode {
    Auto,
    /// Sorted temporary file, memory-mapped. Needs ascending node ids.
    Sparse,
    /// Hash map in memory.
    Memory,
}

impl NodeCacheMode {
    pub fn label(&self) -> &'static str {
        match self {
            NodeCacheMode::Auto => "auto",
            NodeCacheMode::Sparse => "sparse",
            NodeCacheMode::Memory => "memory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    const SQUARE: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[8.0, 50.0], [9.0, 50.0], [9.0, 51.0], [8.0, 51.0], [8.0, 50.0]]]
            }
        }]
    }"#;

    #[test]
    fn defaults_use_high_seeds() {
        let settings = Settings::default();
        assert_eq!(settings.start_node_id, DEFAULT_SEED);
        assert!(settings.clean_tags.is_none());
        let mut ids = settings.id_allocator().unwrap();
        assert_eq!(ids.next_way(), DEFAULT_SEED);
    }

    #[test]
    fn loads_yaml_settings() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "area.geojson", SQUARE);
        let path = write_file(
            dir.path(),
            "settings.yaml",
            "start_node_id: 1000\nclean_tags:\n  tags: [maxspeed, hgv]\n  area: 62650\n  polygon: area.geojson\n",
        );
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.start_node_id, 1000);
        assert_eq!(settings.start_way_id, DEFAULT_SEED);

        let clean = settings.clean_tags.as_ref().unwrap();
        assert!(clean.active);
        assert_eq!(clean.tags, vec!["maxspeed", "hgv"]);

        let filter = settings.clean_filter(dir.path()).unwrap().unwrap();
        assert_eq!(filter.origin_id(), 62650);
        assert_eq!(filter.keys(), ["maxspeed", "hgv"]);
    }

    #[test]
    fn inactive_clean_settings_disable_the_filter() {
        let settings = Settings {
            clean_tags: Some(CleanTagsSettings {
                active: false,
                tags: vec!["maxspeed".to_string()],
                area: 1,
                polygon: PathBuf::from("missing.geojson"),
            }),
            ..Settings::default()
        };
        assert!(settings.clean_filter(Path::new(".")).unwrap().is_none());
    }

    #[test]
    fn file_without_polygon_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "line.geojson",
            r#"{"type": "Feature", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}}"#,
        );
        let err = load_polygon(&path).unwrap_err();
        assert!(err.to_string().contains("no polygon"));
    }

    #[test]
    fn negative_seed_is_rejected() {
        let settings = Settings {
            start_relation_id: -5,
            ..Settings::default()
        };
        assert!(settings.id_allocator().is_err());
    }
}
