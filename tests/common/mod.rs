#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use pixel_explorer::data::model::{Catalog, Id, PixelSet};
use pixel_explorer::data::sample::CatalogBuilder;
use pixel_explorer::data::store::CatalogStore;
use pixel_explorer::state::MemorySessionStore;
use pixel_explorer::web::{router, AppState};

pub const YEAST: &str = "Saccharomyces cerevisiae";
pub const CANDIDA: &str = "Candida glabrata";

/// A catalog written to a temporary data directory, served by a router.
pub struct Fixture {
    pub dir: TempDir,
    pub catalog: Catalog,
    pub state: AppState,
}

impl Fixture {
    pub fn new(builder: CatalogBuilder) -> Self {
        Self::with_preview_limit(builder, 100)
    }

    pub fn with_preview_limit(builder: CatalogBuilder, preview_limit: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let catalog = builder.write_to(dir.path()).unwrap();
        let store = CatalogStore::open(catalog.clone(), dir.path()).unwrap();
        let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(3600)));
        let state = AppState::new(store, sessions)
            .with_page_size(10)
            .with_preview_limit(preview_limit);
        Self {
            dir,
            catalog,
            state,
        }
    }

    pub fn app(&self) -> Router {
        router(self.state.clone())
    }

    pub fn pixel_set(&self, id: &Id) -> &PixelSet {
        self.catalog.pixel_sets.iter().find(|p| &p.id == id).unwrap()
    }

    pub fn remove_pixel_file(&self, id: &Id) {
        let path = self.dir.path().join(&self.pixel_set(id).pixels_file);
        std::fs::remove_file(path).unwrap();
    }

    pub fn corrupt_pixel_file(&self, id: &Id) {
        let path = self.dir.path().join(&self.pixel_set(id).pixels_file);
        std::fs::write(path, "omics_unit,value\nYAL001C,not-a-number\n").unwrap();
    }
}

/// 10 yeast Pixel Sets and 5 others interleaved, two pixels each.
pub struct SpeciesScenario {
    pub fixture: Fixture,
    pub yeast: Id,
    pub yeast_sets: Vec<Id>,
    pub other_sets: Vec<Id>,
}

pub fn species_scenario() -> SpeciesScenario {
    let mut b = CatalogBuilder::new();
    let mut yeast_sets = Vec::new();
    let mut other_sets = Vec::new();
    for i in 0..15 {
        if i % 3 == 2 {
            let ps = b.pixel_set(CANDIDA);
            b.add_pixels(ps, &[("CAGL0A00011g", 1.0, Some(0.1)), ("CAGL0A00022g", 2.0, None)]);
            other_sets.push(ps);
        } else {
            let ps = b.pixel_set(YEAST);
            b.add_pixels(ps, &[("YAL001C", 0.5, Some(0.01)), ("YAL002W", -0.5, None)]);
            yeast_sets.push(ps);
        }
    }
    let yeast = b.species(YEAST);
    SpeciesScenario {
        fixture: Fixture::new(b),
        yeast,
        yeast_sets,
        other_sets,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    req.body(Body::empty()).unwrap()
}

/// A GET as issued by in-page scripts.
pub fn get_xhr(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = get(uri, cookie);
    req.headers_mut().insert(
        "x-requested-with",
        axum::http::HeaderValue::from_static("XMLHttpRequest"),
    );
    req
}

pub async fn json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&text(resp).await).unwrap()
}

pub fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

pub async fn text(resp: Response<Body>) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `pixel_session=<id>` from a Set-Cookie header.
pub fn session_cookie(resp: &Response<Body>) -> Option<String> {
    resp.headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}

pub fn location(resp: &Response<Body>) -> &str {
    resp.headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
