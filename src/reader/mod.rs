//! Element source: owned OSM elements from PBF or XML files, in file order.

use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::osm::OsmElement;
use crate::storage::LocationIndexWriter;
use crate::utils::ProgressCounter;

mod pbf;
mod xml;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Pbf,
    Xml,
}

impl InputFormat {
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if name.ends_with(".pbf") {
            Ok(InputFormat::Pbf)
        } else if name.ends_with(".osm") || name.ends_with(".xml") {
            Ok(InputFormat::Xml)
        } else {
            bail!(
                "CLI: Cannot tell the format of {}; expected .osm.pbf or .osm",
                path.display()
            )
        }
    }
}

/// Call `f` for every element of `path`. Returns the number of elements read.
pub fn for_each_element<F>(path: &Path, f: F) -> Result<u64>
where
    F: FnMut(OsmElement) -> Result<()>,
{
    match InputFormat::detect(path)? {
        InputFormat::Pbf => pbf::for_each_element(path, f),
        InputFormat::Xml => xml::for_each_element(path, f),
    }
}

/// First pass: store the location of every node of `path` in `index`.
pub fn index_locations(
    path: &Path,
    index: LocationIndexWriter,
) -> Result<(LocationIndexWriter, u64)> {
    match InputFormat::detect(path)? {
        InputFormat::Pbf => pbf::index_locations(path, index),
        InputFormat::Xml => {
            let mut index = index;
            let mut node_count = 0u64;
            let progress = ProgressCounter::new("Pass 1/2: indexing nodes", 100_000);
            xml::for_each_element(path, |element| {
                if let OsmElement::Node(node) = element {
                    index
                        .put(node.id, node.lat, node.lon)
                        .with_context(|| format!("Pipeline: Failed writing node {}", node.id))?;
                    node_count += 1;
                    progress.inc(1);
                }
                Ok(())
            })?;
            progress.finish();
            Ok((index, node_count))
        }
    }
}
