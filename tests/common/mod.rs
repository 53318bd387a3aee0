#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
    mpsc,
};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use ritual_cards::{
    application::{
        cards::CardService,
        export::{ExportSettings, ImageExporter, RasterError, Rasterizer},
        profile::ProfileResolver,
        relay::{AllowList, AvatarRelay},
        render::{CardRenderer, RelayImageLoader},
        upstream::{ImageFetcher, ProfileSource, UpstreamError, UpstreamImage},
    },
    domain::{color::Rgb, handle::Handle},
    infra::http::{ApiState, HttpState, RouterState, build_app},
};
use serde_json::json;
use tower::ServiceExt;
use url::Url;

pub const GIF_1X1: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\xff\xff\xff\x00\x00\x00!\xf9\x04\x01\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";
pub const PNG_STUB: &[u8] = b"\x89PNG\r\n\x1a\nritual";
pub const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
pub const DESKTOP_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0";

/// Profile API that knows exactly one account, `Example`.
#[derive(Default)]
pub struct FakeProfiles {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ProfileSource for FakeProfiles {
    async fn lookup(&self, handle: &Handle) -> Result<serde_json::Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if handle.as_str() != "Example" {
            return Err(UpstreamError::Status(StatusCode::NOT_FOUND));
        }
        Ok(json!({
            "code": 200,
            "user": {
                "name": "Example Person",
                "avatar_url": "https://pbs.twimg.com/profile_images/1/avatar.gif",
                "description": "Keeper of the ritual.",
                "followers": 1200,
                "following": "3,400",
                "tweets": 56
            }
        }))
    }
}

/// Image host serving a 1x1 GIF. Paths containing `missing` answer 404 and
/// paths containing `unreachable` fail before any response arrives.
#[derive(Default)]
pub struct FakeImages {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ImageFetcher for FakeImages {
    async fn fetch(&self, url: &Url) -> Result<UpstreamImage, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.path().contains("unreachable") {
            return Err(UpstreamError::transport("connection refused"));
        }
        if url.path().contains("missing") {
            return Ok(UpstreamImage {
                status: StatusCode::NOT_FOUND,
                content_type: Some("text/html".to_string()),
                body: Body::from("not found"),
            });
        }
        Ok(UpstreamImage {
            status: StatusCode::OK,
            content_type: Some("image/gif".to_string()),
            body: Body::from(GIF_1X1),
        })
    }
}

/// Returns a fixed PNG, or fails every attempt when `failing`.
#[derive(Default)]
pub struct StubRasterizer {
    pub failing: bool,
    pub calls: AtomicUsize,
}

impl StubRasterizer {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

impl Rasterizer for StubRasterizer {
    fn rasterize(&self, svg: &str, _background: Rgb, _density: f32) -> Result<Vec<u8>, RasterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(svg.starts_with("<svg"), "rasterizer received a non-svg document");
        if self.failing {
            Err(RasterError::Parse("scripted failure".to_string()))
        } else {
            Ok(PNG_STUB.to_vec())
        }
    }
}

/// Blocks inside `rasterize` until released, announcing entry first.
pub struct GatedRasterizer {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

pub struct Gate {
    pub entered: mpsc::Receiver<()>,
    pub release: mpsc::Sender<()>,
}

impl GatedRasterizer {
    pub fn new() -> (Self, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        (
            Self {
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
            },
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl Rasterizer for GatedRasterizer {
    fn rasterize(&self, _svg: &str, _background: Rgb, _density: f32) -> Result<Vec<u8>, RasterError> {
        let _ = self.entered.lock().unwrap().send(());
        self.release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(10))
            .map_err(|err| RasterError::Aborted(err.to_string()))?;
        Ok(PNG_STUB.to_vec())
    }
}

pub struct TestApp {
    pub router: Router,
    pub profiles: Arc<FakeProfiles>,
    pub images: Arc<FakeImages>,
    pub cards: Arc<CardService>,
}

pub fn test_app(rasterizer: Arc<dyn Rasterizer>) -> TestApp {
    let profiles = Arc::new(FakeProfiles::default());
    let images = Arc::new(FakeImages::default());

    let relay = Arc::new(AvatarRelay::new(
        AllowList::default(),
        Arc::clone(&images) as Arc<dyn ImageFetcher>,
    ));
    let resolver = Arc::new(ProfileResolver::new(
        Arc::clone(&profiles) as Arc<dyn ProfileSource>
    ));
    let renderer = Arc::new(CardRenderer::new(Arc::new(RelayImageLoader::new(
        Arc::clone(&relay),
        1024 * 1024,
    ))));
    let exporter = Arc::new(ImageExporter::new(rasterizer, ExportSettings::default()));
    let cards = Arc::new(CardService::new(
        Arc::clone(&resolver),
        renderer,
        exporter,
        Duration::from_secs(60),
    ));

    let router = build_app(RouterState {
        http: HttpState {
            cards: Arc::clone(&cards),
        },
        api: ApiState { relay, resolver },
    });

    TestApp {
        router,
        profiles,
        images,
        cards,
    }
}

pub fn stub_app() -> TestApp {
    test_app(Arc::new(StubRasterizer::default()))
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

pub fn post_form(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .expect("request should build")
}

pub fn post_with_agent(uri: &str, user_agent: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::USER_AGENT, user_agent)
        .body(Body::empty())
        .expect("request should build")
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect")
        .to_vec()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).expect("body should be utf-8")
}

pub fn header_value(response: &Response, name: header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Generate a card through the form and return its page path.
pub async fn generate(router: &Router, form: &str) -> String {
    let response = send(router, post_form("/cards", form)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    header_value(&response, header::LOCATION)
}
