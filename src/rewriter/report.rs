//! Per-run summary of what the rewriter did.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::regulatory::LayerKind;

#[derive(Debug, Default, Clone, Serialize)]
pub struct LayerReport {
    /// Records loaded for the layer.
    pub records: usize,
    /// Tags written by the layer.
    pub added: u64,
    /// Source tags removed because the layer invalidates them.
    pub overridden: u64,
    /// Element ids with records but no matching element in the input.
    pub unmatched: Vec<i64>,
    /// Identifiers of the records behind `unmatched`.
    pub unmatched_records: Vec<i64>,
}

/// Conditions that were resolved deterministically but deserve a look.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Advisories {
    pub fallback_tags: u64,
    pub degenerate_fractions: u64,
    pub duplicate_speed_ways: u64,
    pub auto_closed_rings: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub nodes_read: u64,
    pub ways_read: u64,
    pub relations_read: u64,
    pub nodes_cleaned: u64,
    pub ways_cleaned: u64,
    pub ways_copied: u64,
    pub ways_rewritten: u64,
    pub ways_split: u64,
    pub split_pieces: u64,
    pub split_nodes: u64,
    pub relations_dropped: u64,
    pub relations_remapped: u64,
    pub synthesized_nodes: u64,
    pub synthesized_ways: u64,
    pub synthesized_relations: u64,
    /// Tag-clean removals per key.
    pub clean_removed: BTreeMap<String, u64>,
    pub layers: BTreeMap<LayerKind, LayerReport>,
    pub advisories: Advisories,
}

impl RunReport {
    pub fn layer_mut(&mut self, kind: LayerKind) -> &mut LayerReport {
        self.layers.entry(kind).or_default()
    }

    pub fn add_clean_removals(&mut self, removed: &BTreeMap<String, usize>) {
        for (key, count) in removed {
            *self.clean_removed.entry(key.clone()).or_insert(0) += *count as u64;
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Read {} nodes, {} ways, {} relations",
            self.nodes_read, self.ways_read, self.relations_read
        );
        info!(
            "Ways: {} copied, {} rewritten, {} split into {} pieces ({} new nodes)",
            self.ways_copied, self.ways_rewritten, self.ways_split, self.split_pieces, self.split_nodes
        );
        if self.nodes_cleaned + self.ways_cleaned > 0 {
            info!(
                "Tag clean: {} nodes, {} ways, removed {:?}",
                self.nodes_cleaned, self.ways_cleaned, self.clean_removed
            );
        }
        if self.relations_dropped + self.relations_remapped > 0 {
            info!(
                "Relations: {} dropped, {} remapped to split ways",
                self.relations_dropped, self.relations_remapped
            );
        }
        if self.synthesized_relations > 0 {
            info!(
                "Synthesized {} nodes, {} ways, {} relations",
                self.synthesized_nodes, self.synthesized_ways, self.synthesized_relations
            );
        }
        for (kind, layer) in &self.layers {
            info!(
                "Layer {}: {} records, {} tags added, {} overridden",
                kind.name(),
                layer.records,
                layer.added,
                layer.overridden
            );
            if !layer.unmatched.is_empty() {
                warn!(
                    "Layer {}: {} records on {} element ids without a matching way",
                    kind.name(),
                    layer.unmatched_records.len(),
                    layer.unmatched.len()
                );
            }
        }
        let advisories = &self.advisories;
        let total = advisories.fallback_tags
            + advisories.degenerate_fractions
            + advisories.duplicate_speed_ways
            + advisories.auto_closed_rings;
        if total > 0 {
            warn!("Advisories: {:?}", advisories);
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Report: Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}
