//! The tileset manifest wire format.
//!
//! A manifest is a JSON document with an `asset` header, a tileset-level
//! `geometricError`, and a `root` tile node; each node carries a bounding
//! volume, a geometric error, optional refine/transform/content, and child
//! nodes. This module only mirrors that shape with serde types and converts
//! individual fields into engine types; tree assembly and error policy live
//! in the builder.

use glam::{DMat3, DMat4, DVec3};
use serde::Deserialize;
use thiserror::Error;

use crate::geometry::{BoundingRegion, BoundingSphere, BoundingVolume, OrientedBox};
use crate::tile::Refine;

/// Fatal manifest errors. Per-node schema violations are not fatal; they
/// abort only the affected subtree and surface as diagnostics.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not valid JSON: {0}")]
    Parse(String),
    #[error("manifest has no root tile")]
    MissingRoot,
}

/// A whole manifest document.
#[derive(Debug, Deserialize)]
pub struct ManifestDocument {
    pub asset: Option<AssetHeader>,
    #[serde(rename = "geometricError")]
    pub geometric_error: Option<f64>,
    pub root: Option<TileNode>,
}

#[derive(Debug, Deserialize)]
pub struct AssetHeader {
    pub version: Option<String>,
}

/// One tile node as authored in the manifest.
#[derive(Debug, Deserialize)]
pub struct TileNode {
    #[serde(rename = "boundingVolume")]
    pub bounding_volume: Option<VolumeNode>,
    #[serde(rename = "viewerRequestVolume")]
    pub viewer_request_volume: Option<VolumeNode>,
    #[serde(rename = "geometricError")]
    pub geometric_error: Option<f64>,
    pub refine: Option<String>,
    /// Column-major 4x4 matrix, 16 numbers.
    pub transform: Option<Vec<f64>>,
    pub content: Option<ContentNode>,
    #[serde(default)]
    pub children: Vec<TileNode>,
}

#[derive(Debug, Deserialize)]
pub struct ContentNode {
    pub uri: Option<String>,
    /// Legacy name for `uri`, still written by older exporters.
    pub url: Option<String>,
    #[serde(rename = "boundingVolume")]
    pub bounding_volume: Option<VolumeNode>,
}

impl ContentNode {
    /// The content URI, preferring `uri` over the legacy `url`.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref().or(self.url.as_deref())
    }
}

/// A bounding volume as authored: exactly one of the three shapes.
#[derive(Debug, Deserialize)]
pub struct VolumeNode {
    #[serde(rename = "box")]
    pub oriented_box: Option<Vec<f64>>,
    pub region: Option<Vec<f64>>,
    pub sphere: Option<Vec<f64>>,
}

impl VolumeNode {
    /// Converts to an engine volume, or a human-readable schema complaint.
    pub fn to_bounding_volume(&self) -> Result<BoundingVolume, String> {
        if let Some(values) = &self.oriented_box {
            if values.len() != 12 {
                return Err(format!(
                    "bounding box must have 12 numbers, found {}",
                    values.len()
                ));
            }
            let center = DVec3::new(values[0], values[1], values[2]);
            let half_axes = DMat3::from_cols(
                DVec3::new(values[3], values[4], values[5]),
                DVec3::new(values[6], values[7], values[8]),
                DVec3::new(values[9], values[10], values[11]),
            );
            return Ok(BoundingVolume::from_box(OrientedBox::new(center, half_axes)));
        }

        if let Some(values) = &self.region {
            if values.len() != 6 {
                return Err(format!(
                    "bounding region must have 6 numbers, found {}",
                    values.len()
                ));
            }
            return Ok(BoundingVolume::from_region(BoundingRegion {
                west: values[0],
                south: values[1],
                east: values[2],
                north: values[3],
                minimum_height: values[4],
                maximum_height: values[5],
            }));
        }

        if let Some(values) = &self.sphere {
            if values.len() != 4 {
                return Err(format!(
                    "bounding sphere must have 4 numbers, found {}",
                    values.len()
                ));
            }
            return Ok(BoundingVolume::from_sphere(BoundingSphere::new(
                DVec3::new(values[0], values[1], values[2]),
                values[3],
            )));
        }

        Err("bounding volume has no box, region, or sphere".to_string())
    }
}

impl TileNode {
    /// The node's local transform, if authored. Column-major per the format.
    pub fn transform_matrix(&self) -> Result<Option<DMat4>, String> {
        match &self.transform {
            None => Ok(None),
            Some(values) if values.len() == 16 => {
                let mut array = [0.0; 16];
                array.copy_from_slice(values);
                Ok(Some(DMat4::from_cols_array(&array)))
            }
            Some(values) => Err(format!(
                "transform must have 16 numbers, found {}",
                values.len()
            )),
        }
    }
}

/// Parses a refine string. Values are case-sensitive; anything other than
/// the two canonical spellings is a schema violation.
pub fn parse_refine(value: &str) -> Option<Refine> {
    match value {
        "REPLACE" => Some(Refine::Replace),
        "ADD" => Some(Refine::Add),
        _ => None,
    }
}

/// Parses manifest bytes.
pub fn parse_manifest(data: &[u8]) -> Result<ManifestDocument, ManifestError> {
    serde_json::from_slice(data).map_err(|err| ManifestError::Parse(err.to_string()))
}

/// True when `data` parses as a manifest document with a root tile. Used to
/// tell a nested tileset manifest apart from arbitrary undecodable bytes.
pub fn looks_like_manifest(data: &[u8]) -> bool {
    serde_json::from_slice::<ManifestDocument>(data)
        .map(|doc| doc.root.is_some())
        .unwrap_or(false)
}

/// Response body of a hosted-asset endpoint lookup.
#[derive(Debug, Deserialize)]
pub struct HostedAssetEndpoint {
    pub url: String,
    #[serde(rename = "accessToken")]
    pub access_token: Option<String>,
}
