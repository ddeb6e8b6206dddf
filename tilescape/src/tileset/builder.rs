//! Manifest-to-tree assembly.
//!
//! The builder makes two passes over the parsed manifest. The first counts
//! the nodes that will survive validation so the arena can reserve exact
//! capacity; the second resolves each node (volumes, world transform,
//! refine inheritance, content URI) and pushes tiles, allocating every
//! sibling group as one contiguous arena range before descending into it.
//!
//! A node missing a bounding volume or geometric error, or carrying an
//! unrecognized refine or malformed transform, is a schema violation: the
//! node and its whole subtree are skipped, one diagnostic is reported, and
//! siblings are unaffected. Both passes apply the same validity predicate,
//! so the count always matches what the second pass pushes.

use glam::DMat4;
use tracing::warn;

use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink};
use crate::geometry::BoundingVolume;
use crate::tile::{Refine, Tile, TileArena, TileId};

use super::manifest::{parse_refine, ManifestDocument, ManifestError, TileNode};

/// A node after validation, with everything a [`Tile`] needs.
struct ResolvedNode {
    bounding_volume: BoundingVolume,
    content_bounding_volume: Option<BoundingVolume>,
    viewer_request_volume: Option<BoundingVolume>,
    geometric_error: f64,
    refine: Refine,
    transform: DMat4,
    content_uri: Option<String>,
}

/// Builds the tile tree for a parsed manifest.
///
/// Returns the arena and the root's identifier; the root is `None` when the
/// root node itself fails validation (the diagnostic has already been
/// reported in that case).
pub(crate) fn build_tree(
    doc: &ManifestDocument,
    base_url: &str,
    diagnostics: &dyn DiagnosticsSink,
) -> Result<(TileArena, Option<TileId>), ManifestError> {
    let root_node = doc.root.as_ref().ok_or(ManifestError::MissingRoot)?;

    let capacity = count_valid_nodes(root_node);
    let mut arena = TileArena::with_capacity(capacity);

    // Absent refine on the root defaults to Replace; descendants inherit.
    let Some(resolved) = resolve_node(root_node, &DMat4::IDENTITY, Refine::Replace, base_url, diagnostics)
    else {
        return Ok((arena, None));
    };

    let root_id = push_tile(&mut arena, None, &resolved);
    build_children(
        &mut arena,
        root_id,
        &root_node.children,
        &resolved,
        base_url,
        diagnostics,
    );

    debug_assert_eq!(arena.len(), capacity);
    Ok((arena, Some(root_id)))
}

/// Number of nodes that will survive validation, for capacity reservation.
fn count_valid_nodes(node: &TileNode) -> usize {
    if !node_is_valid(node) {
        return 0;
    }
    1 + node.children.iter().map(count_valid_nodes).sum::<usize>()
}

/// Exactly the checks that make `resolve_node` skip a subtree.
fn node_is_valid(node: &TileNode) -> bool {
    node.geometric_error.is_some()
        && node
            .bounding_volume
            .as_ref()
            .is_some_and(|v| v.to_bounding_volume().is_ok())
        && node
            .refine
            .as_deref()
            .map_or(true, |r| parse_refine(r).is_some())
        && node.transform_matrix().is_ok()
}

fn resolve_node(
    node: &TileNode,
    parent_transform: &DMat4,
    inherited_refine: Refine,
    base_url: &str,
    diagnostics: &dyn DiagnosticsSink,
) -> Option<ResolvedNode> {
    let report = |detail: String| {
        warn!(url = base_url, detail = %detail, "skipping manifest subtree");
        diagnostics.report(&DiagnosticEvent::ManifestSchemaViolation {
            url: base_url.to_string(),
            detail,
        });
    };

    let Some(geometric_error) = node.geometric_error else {
        report("tile is missing geometricError".to_string());
        return None;
    };

    let Some(volume_node) = &node.bounding_volume else {
        report("tile is missing boundingVolume".to_string());
        return None;
    };
    let raw_volume = match volume_node.to_bounding_volume() {
        Ok(volume) => volume,
        Err(detail) => {
            report(detail);
            return None;
        }
    };

    let refine = match node.refine.as_deref() {
        None => inherited_refine,
        Some(value) => match parse_refine(value) {
            Some(refine) => refine,
            None => {
                report(format!("unrecognized refine value '{value}'"));
                return None;
            }
        },
    };

    let local = match node.transform_matrix() {
        Ok(matrix) => matrix.unwrap_or(DMat4::IDENTITY),
        Err(detail) => {
            report(detail);
            return None;
        }
    };
    let transform = *parent_transform * local;

    // Regions are authored in geographic coordinates and ignore transforms;
    // BoundingVolume::transform handles that distinction.
    let bounding_volume = raw_volume.transform(&transform);

    let mut content_uri = None;
    let mut content_bounding_volume = None;
    if let Some(content) = &node.content {
        if let Some(uri) = content.uri() {
            match resolve_uri(base_url, uri) {
                Ok(resolved) => content_uri = Some(resolved),
                // The tile survives without content; only the uri is dropped.
                Err(detail) => report(detail),
            }
        }
        if let Some(volume) = &content.bounding_volume {
            match volume.to_bounding_volume() {
                Ok(raw) => content_bounding_volume = Some(raw.transform(&transform)),
                Err(detail) => report(detail),
            }
        }
    }

    let viewer_request_volume = match &node.viewer_request_volume {
        None => None,
        Some(volume) => match volume.to_bounding_volume() {
            Ok(raw) => Some(raw.transform(&transform)),
            Err(detail) => {
                report(detail);
                None
            }
        },
    };

    Some(ResolvedNode {
        bounding_volume,
        content_bounding_volume,
        viewer_request_volume,
        geometric_error,
        refine,
        transform,
        content_uri,
    })
}

/// Resolves a content URI against the manifest's own URL, so relative
/// content paths work no matter where the manifest came from.
fn resolve_uri(base_url: &str, uri: &str) -> Result<String, String> {
    match reqwest::Url::parse(base_url) {
        Ok(base) => base
            .join(uri)
            .map(|resolved| resolved.to_string())
            .map_err(|err| format!("cannot resolve content uri '{uri}': {err}")),
        // Non-URL base (local identifiers in tests); use the uri as authored.
        Err(_) => Ok(uri.to_string()),
    }
}

fn push_tile(arena: &mut TileArena, parent: Option<TileId>, resolved: &ResolvedNode) -> TileId {
    let id = arena.next_id();
    arena.push(Tile::new(
        id,
        parent,
        resolved.bounding_volume,
        resolved.content_bounding_volume,
        resolved.viewer_request_volume,
        resolved.geometric_error,
        resolved.refine,
        resolved.transform,
        resolved.content_uri.clone(),
    ))
}

fn build_children(
    arena: &mut TileArena,
    parent_id: TileId,
    nodes: &[TileNode],
    parent: &ResolvedNode,
    base_url: &str,
    diagnostics: &dyn DiagnosticsSink,
) {
    let mut resolved_children = Vec::with_capacity(nodes.len());
    for child in nodes {
        if let Some(resolved) =
            resolve_node(child, &parent.transform, parent.refine, base_url, diagnostics)
        {
            resolved_children.push((child, resolved));
        }
    }
    if resolved_children.is_empty() {
        return;
    }

    // The whole sibling group is pushed before any recursion so the range
    // stays contiguous.
    let first = arena.next_id();
    for (_, resolved) in &resolved_children {
        push_tile(arena, Some(parent_id), resolved);
    }
    if let Some(parent_tile) = arena.get_mut(parent_id) {
        parent_tile.set_children(first, resolved_children.len());
    }

    for (offset, (node, resolved)) in resolved_children.iter().enumerate() {
        build_children(
            arena,
            TileId(first.0 + offset as u32),
            &node.children,
            resolved,
            base_url,
            diagnostics,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::tileset::manifest::parse_manifest;
    use glam::DVec3;

    const BASE: &str = "https://example.com/data/tileset.json";

    fn build(json: &str) -> (TileArena, Option<TileId>, std::sync::Arc<CollectingSink>) {
        let sink = CollectingSink::new();
        let doc = parse_manifest(json.as_bytes()).expect("valid json");
        let (arena, root) = build_tree(&doc, BASE, &*sink).expect("root present");
        (arena, root, sink)
    }

    #[test]
    fn test_builds_tree_with_contiguous_children() {
        let (arena, root, sink) = build(
            r#"{"root": {
                "boundingVolume": {"sphere": [0, 0, 0, 100]},
                "geometricError": 16,
                "refine": "REPLACE",
                "content": {"uri": "root.b3dm"},
                "children": [
                    {"boundingVolume": {"sphere": [-50, 0, 0, 50]}, "geometricError": 8,
                     "content": {"uri": "a.b3dm"}},
                    {"boundingVolume": {"sphere": [50, 0, 0, 50]}, "geometricError": 8,
                     "content": {"uri": "b.b3dm"}}
                ]
            }}"#,
        );

        assert!(sink.is_empty());
        assert_eq!(arena.len(), 3);
        let root = root.unwrap();
        let children: Vec<_> = arena[root].children().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].index(), children[0].index() + 1);
        assert_eq!(arena[children[0]].parent(), Some(root));
    }

    #[test]
    fn test_content_uris_resolved_against_manifest_url() {
        let (arena, root, _) = build(
            r#"{"root": {
                "boundingVolume": {"sphere": [0, 0, 0, 1]},
                "geometricError": 1,
                "content": {"uri": "tiles/root.b3dm"}
            }}"#,
        );
        assert_eq!(
            arena[root.unwrap()].content_uri(),
            Some("https://example.com/data/tiles/root.b3dm")
        );
    }

    #[test]
    fn test_transforms_compose_down_the_tree() {
        let (arena, root, _) = build(
            r#"{"root": {
                "boundingVolume": {"sphere": [0, 0, 0, 1]},
                "geometricError": 16,
                "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 10,0,0,1],
                "children": [
                    {"boundingVolume": {"sphere": [0, 0, 0, 1]},
                     "geometricError": 8,
                     "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,5,0,1]}
                ]
            }}"#,
        );

        let child = arena[root.unwrap()].children().next().unwrap();
        let world = arena[child].transform();
        assert_eq!(world.transform_point3(DVec3::ZERO), DVec3::new(10.0, 5.0, 0.0));

        // The child's volume is in world coordinates too.
        match arena[child].bounding_volume() {
            BoundingVolume::Sphere(sphere) => {
                assert_eq!(sphere.center, DVec3::new(10.0, 5.0, 0.0));
            }
            other => panic!("expected sphere, got {other:?}"),
        }
    }

    #[test]
    fn test_refine_inherited_from_parent() {
        let (arena, root, _) = build(
            r#"{"root": {
                "boundingVolume": {"sphere": [0, 0, 0, 1]},
                "geometricError": 16,
                "refine": "ADD",
                "children": [
                    {"boundingVolume": {"sphere": [0, 0, 0, 1]}, "geometricError": 8},
                    {"boundingVolume": {"sphere": [0, 0, 0, 1]}, "geometricError": 8,
                     "refine": "REPLACE"}
                ]
            }}"#,
        );

        let children: Vec<_> = arena[root.unwrap()].children().collect();
        assert_eq!(arena[children[0]].refine(), Refine::Add);
        assert_eq!(arena[children[1]].refine(), Refine::Replace);
    }

    #[test]
    fn test_invalid_subtree_skipped_sibling_kept() {
        let (arena, root, sink) = build(
            r#"{"root": {
                "boundingVolume": {"sphere": [0, 0, 0, 100]},
                "geometricError": 16,
                "children": [
                    {"boundingVolume": {"sphere": [0, 0, 0, 50]},
                     "children": [
                        {"boundingVolume": {"sphere": [0, 0, 0, 25]}, "geometricError": 2}
                     ]},
                    {"boundingVolume": {"sphere": [0, 0, 0, 50]}, "geometricError": 8}
                ]
            }}"#,
        );

        // First child lacks geometricError: it and its valid-looking child
        // are both dropped.
        assert_eq!(arena.len(), 2);
        assert_eq!(arena[root.unwrap()].child_count(), 1);
        assert_eq!(sink.len(), 1);
        assert!(matches!(
            sink.events()[0],
            DiagnosticEvent::ManifestSchemaViolation { .. }
        ));
    }

    #[test]
    fn test_unrecognized_refine_skips_subtree() {
        let (arena, root, sink) = build(
            r#"{"root": {
                "boundingVolume": {"sphere": [0, 0, 0, 100]},
                "geometricError": 16,
                "children": [
                    {"boundingVolume": {"sphere": [0, 0, 0, 50]}, "geometricError": 8,
                     "refine": "Replace"}
                ]
            }}"#,
        );

        assert_eq!(arena.len(), 1);
        assert_eq!(arena[root.unwrap()].child_count(), 0);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_invalid_root_yields_empty_tree() {
        let sink = CollectingSink::new();
        let doc = parse_manifest(
            br#"{"root": {"boundingVolume": {"sphere": [0, 0, 0, 1]}}}"#,
        )
        .unwrap();
        let (arena, root) = build_tree(&doc, BASE, &*sink).unwrap();
        assert!(arena.is_empty());
        assert!(root.is_none());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let sink = CollectingSink::new();
        let doc = parse_manifest(br#"{"asset": {"version": "1.0"}}"#).unwrap();
        assert!(matches!(
            build_tree(&doc, BASE, &*sink),
            Err(ManifestError::MissingRoot)
        ));
    }

    #[test]
    fn test_region_volume_ignores_transform() {
        let (arena, root, _) = build(
            r#"{"root": {
                "boundingVolume": {"region": [-0.01, -0.01, 0.01, 0.01, 0, 100]},
                "geometricError": 16,
                "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 100000,0,0,1]
            }}"#,
        );

        let untransformed = BoundingVolume::from_region(crate::geometry::BoundingRegion {
            west: -0.01,
            south: -0.01,
            east: 0.01,
            north: 0.01,
            minimum_height: 0.0,
            maximum_height: 100.0,
        });
        match (arena[root.unwrap()].bounding_volume(), &untransformed) {
            (
                BoundingVolume::Region { bounding_box, .. },
                BoundingVolume::Region {
                    bounding_box: expected,
                    ..
                },
            ) => {
                assert!((bounding_box.center - expected.center).length() < 1e-9);
            }
            other => panic!("expected regions, got {other:?}"),
        }
    }
}
