use anyhow::{Context, Result, anyhow};
use crossbeam_channel::bounded;
use osmpbf::{BlobDecode, BlobReader, Element, HeaderBlock, PrimitiveBlock, RelMemberType};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::metadata::{build_metadata_from_dense_info, build_metadata_from_info};
use crate::osm::{Member, MemberType, Node, OsmElement, Relation, Way, build_tags};
use crate::storage::LocationIndexWriter;
use crate::utils::ProgressCounter;

pub fn log_sorted_header(header: &HeaderBlock, logged: &AtomicBool) {
    let found: Vec<String> = header
        .required_features()
        .iter()
        .chain(header.optional_features())
        .map(|feature| feature.trim())
        .filter(|feature| {
            ["Sort.Type_then_ID", "Sort.Nodes", "Sort.Ways", "Sort.Relations"]
                .iter()
                .any(|known| known.eq_ignore_ascii_case(feature))
        })
        .map(str::to_string)
        .collect();

    if found.is_empty() {
        return;
    }
    if !logged.swap(true, Ordering::SeqCst) {
        tracing::info!("Detected PBF sort header(s): {}", found.join(", "));
    }
}

fn member_type(kind: RelMemberType) -> MemberType {
    match kind {
        RelMemberType::Node => MemberType::Node,
        RelMemberType::Way => MemberType::Way,
        RelMemberType::Relation => MemberType::Relation,
    }
}

fn owned_element(element: Element<'_>) -> Result<OsmElement> {
    Ok(match element {
        Element::Node(node) => OsmElement::Node(Node {
            id: node.id(),
            lat: node.lat(),
            lon: node.lon(),
            tags: build_tags(node.tags()),
            meta: Some(build_metadata_from_info(&node.info())),
        }),
        Element::DenseNode(node) => OsmElement::Node(Node {
            id: node.id(),
            lat: node.lat(),
            lon: node.lon(),
            tags: build_tags(node.tags()),
            meta: node.info().map(build_metadata_from_dense_info),
        }),
        Element::Way(way) => OsmElement::Way(Way {
            id: way.id(),
            refs: way.refs().collect(),
            tags: build_tags(way.tags()),
            meta: Some(build_metadata_from_info(&way.info())),
        }),
        Element::Relation(relation) => {
            let mut members = Vec::new();
            for member in relation.members() {
                let role = member.role().with_context(|| {
                    format!("Reader: Relation {} has an undecodable member role", relation.id())
                })?;
                members.push(Member {
                    member_type: member_type(member.member_type),
                    id: member.member_id,
                    role: role.to_string(),
                });
            }
            OsmElement::Relation(Relation {
                id: relation.id(),
                members,
                tags: build_tags(relation.tags()),
                meta: Some(build_metadata_from_info(&relation.info())),
            })
        }
    })
}

/// Stream elements of a PBF file in file order. Blobs are decoded sequentially.
pub fn for_each_element<F>(path: &Path, mut f: F) -> Result<u64>
where
    F: FnMut(OsmElement) -> Result<()>,
{
    let reader = BlobReader::from_path(path)
        .with_context(|| format!("Reader: Failed to open {}", path.display()))?;
    let header_logged = AtomicBool::new(false);
    let mut count = 0u64;

    for blob in reader {
        match blob?.decode()? {
            BlobDecode::OsmHeader(header) => log_sorted_header(&header, &header_logged),
            BlobDecode::OsmData(block) => {
                for element in block.elements() {
                    count += 1;
                    f(owned_element(element)?)?;
                }
            }
            BlobDecode::Unknown(unknown) => tracing::info!("Unknown blob: {}", unknown),
        }
    }
    Ok(count)
}

fn node_locations(block: &PrimitiveBlock) -> Vec<(i64, f64, f64)> {
    let mut batch = Vec::new();
    for element in block.elements() {
        match element {
            Element::Node(node) => batch.push((node.id(), node.lat(), node.lon())),
            Element::DenseNode(node) => batch.push((node.id(), node.lat(), node.lon())),
            _ => {}
        }
    }
    batch
}

/// Index every node location of a PBF file.
///
/// Decoding runs on the rayon pool unless the index needs ascending ids; a
/// single writer thread owns the index and receives batches over a channel.
pub fn index_locations(
    path: &Path,
    index: LocationIndexWriter,
) -> Result<(LocationIndexWriter, u64)> {
    let use_parallel = !index.requires_sorted_input();
    let mut reader = BlobReader::from_path(path)
        .with_context(|| format!("Reader: Failed to open {}", path.display()))?;
    let (tx, rx) = bounded::<Vec<(i64, f64, f64)>>(64);
    let header_logged = AtomicBool::new(false);

    let writer = std::thread::spawn(move || -> Result<(LocationIndexWriter, u64)> {
        let mut index = index;
        let mut node_count = 0u64;
        let progress = ProgressCounter::new("Pass 1/2: indexing nodes", 100_000);

        for batch in rx {
            let batch_len = batch.len() as u64;
            for (id, lat, lon) in batch {
                index
                    .put(id, lat, lon)
                    .with_context(|| format!("Pipeline: Failed writing node {}", id))?;
                node_count += 1;
            }
            progress.inc(batch_len);
        }

        progress.finish();
        Ok((index, node_count))
    });

    let decode = |blob_result: Result<osmpbf::Blob, osmpbf::Error>,
                  tx: &crossbeam_channel::Sender<Vec<(i64, f64, f64)>>|
     -> Result<()> {
        match blob_result?.decode()? {
            BlobDecode::OsmHeader(header) => log_sorted_header(&header, &header_logged),
            BlobDecode::OsmData(block) => {
                let batch = node_locations(&block);
                if !batch.is_empty() {
                    tx.send(batch)
                        .map_err(|err| anyhow!("Pipeline: Failed to send node batch: {}", err))?;
                }
            }
            BlobDecode::Unknown(unknown) => tracing::info!("Unknown blob: {}", unknown),
        }
        Ok(())
    };

    let decode_result = if use_parallel {
        let tx = tx.clone();
        reader
            .par_bridge()
            .try_for_each(|blob_result| decode(blob_result, &tx))
    } else {
        // Sequential to keep node ids ascending for the sparse index
        reader.try_for_each(|blob_result| decode(blob_result, &tx))
    };

    drop(tx);
    let index = join_writer(writer, decode_result.is_err())?;
    decode_result?;
    Ok(index)
}

/// Join the index writer thread. Its error is the root cause when decoding
/// failed on a closed channel.
fn join_writer<T>(
    writer: std::thread::JoinHandle<Result<T>>,
    decode_failed: bool,
) -> Result<T> {
    match writer.join() {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(writer_err)) if decode_failed => {
            Err(writer_err.context("writer thread failed (caused channel disconnect)"))
        }
        Ok(Err(writer_err)) => Err(writer_err),
        Err(panic_payload) => {
            let panic_msg = panic_payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow!(
                "Pipeline: Node writer thread panicked: {}",
                panic_msg
            ))
        }
    }
}
