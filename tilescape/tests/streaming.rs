//! End-to-end streaming through the public API: fetch a manifest, run
//! selection passes, and watch the tileset refine as content arrives.

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_3;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use glam::{DVec2, DVec3};
use parking_lot::Mutex;

use tilescape::diagnostics::CollectingSink;
use tilescape::pipeline::{
    AccessorError, AssetAccessor, AssetResponse, ContentDecoder, InlineTaskProcessor,
};
use tilescape::tile::TileContent;
use tilescape::{Camera, Externals, Tileset, TilesetOptions, TilesetView};

const MANIFEST: &str = r#"{
    "asset": {"version": "1.0"},
    "geometricError": 500,
    "root": {
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
    }
}"#;

/// In-memory asset host.
struct MapAccessor {
    responses: HashMap<String, Bytes>,
    requests: Mutex<Vec<String>>,
}

impl MapAccessor {
    fn new(entries: &[(&str, &[u8])]) -> Self {
        Self {
            responses: entries
                .iter()
                .map(|(url, body)| (url.to_string(), Bytes::copy_from_slice(body)))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl AssetAccessor for MapAccessor {
    fn request_asset(&self, url: &str) -> BoxFuture<'static, Result<AssetResponse, AccessorError>> {
        self.requests.lock().push(url.to_string());
        let response = self.responses.get(url).map(|data| AssetResponse {
            url: url.to_string(),
            status: 200,
            data: data.clone(),
        });
        let url = url.to_string();
        Box::pin(async move {
            response.ok_or(AccessorError::Transport {
                url,
                message: "unknown url".to_string(),
            })
        })
    }
}

/// Decoder that accepts any payload as-is.
struct RawDecoder;

impl ContentDecoder for RawDecoder {
    fn create_content(&self, _url: &str, data: &Bytes) -> Option<TileContent> {
        Some(Box::new(data.clone()))
    }
}

fn camera_at(z: f64) -> Camera {
    Camera::new(
        DVec3::new(0.0, 0.0, z),
        DVec3::NEG_Z,
        DVec3::Y,
        DVec2::new(1000.0, 1000.0),
        FRAC_PI_3,
        FRAC_PI_3,
    )
}

#[test]
fn streams_and_refines_a_tileset() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let accessor = Arc::new(MapAccessor::new(&[
        ("https://example.com/city/tileset.json", MANIFEST.as_bytes()),
        ("https://example.com/city/root.b3dm", b"root-mesh"),
        ("https://example.com/city/a.b3dm", b"a-mesh"),
        ("https://example.com/city/b.b3dm", b"b-mesh"),
    ]));
    let sink = CollectingSink::new();
    let externals = Externals {
        accessor: accessor.clone(),
        tasks: Arc::new(InlineTaskProcessor),
        decoder: Arc::new(RawDecoder),
        renderer: None,
        diagnostics: sink.clone(),
    };

    let tileset = futures::executor::block_on(Tileset::from_url(
        externals,
        "https://example.com/city/tileset.json",
        TilesetOptions::default(),
    ));
    assert!(sink.is_empty());
    assert_eq!(tileset.arena().len(), 3);

    let view = TilesetView::new(&tileset, "integration");
    let root = tileset.root().expect("root tile").id();

    // Far away: the root alone satisfies the error budget.
    let far = view.update(&tileset, &camera_at(2000.0)).unwrap();
    assert_eq!(far.tiles_to_render, vec![root]);
    assert!(tileset.root().unwrap().is_renderable());

    // Move in: the first pass keeps the root while the children load, the
    // second swaps them in atomically.
    let first_near = view.update(&tileset, &camera_at(300.0)).unwrap();
    assert_eq!(first_near.tiles_to_render, vec![root]);

    let second_near = view.update(&tileset, &camera_at(300.0)).unwrap();
    assert_eq!(second_near.tiles_to_render.len(), 2);
    assert_eq!(second_near.tiles_to_no_longer_render, vec![root]);

    // Every asset was fetched exactly once.
    let requests = accessor.requests.lock();
    for url in [
        "https://example.com/city/root.b3dm",
        "https://example.com/city/a.b3dm",
        "https://example.com/city/b.b3dm",
    ] {
        assert_eq!(requests.iter().filter(|r| *r == url).count(), 1, "{url}");
    }

    let metrics = tileset.metrics();
    assert_eq!(metrics.loads_completed, 3);
    assert_eq!(metrics.loads_failed, 0);
}
