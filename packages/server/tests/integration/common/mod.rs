use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::retry::RetryPolicy;
use common::storage::local::LocalStorage;
use reqwest::Client;
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;

use reelhouse::catalog::MemoryCatalog;
use reelhouse::feed::{FeedCache, MemoryCache};
use reelhouse::refresh::LinkRefresher;
use reelhouse::services::VideoService;
use reelhouse::state::AppState;
use reelhouse::storage::StorageRotator;
use reelhouse::utils::jwt;

pub const JWT_SECRET: &str = "test-secret-for-integration-tests";

/// Prefix of every link handed out by the test storage backend.
pub const MEDIA_URL: &str = "http://media.test";

pub mod routes {
    use uuid::Uuid;

    pub const FEED: &str = "/api/v1/videos/feed";
    pub const SEARCH: &str = "/api/v1/videos/search";
    pub const LIKED: &str = "/api/v1/videos/liked";
    pub const ADMIN_VIDEOS: &str = "/api/v1/admin/videos";
    pub const LINK_REFRESH: &str = "/api/v1/admin/link-refresh";
    pub const STORAGE_ACCOUNTS: &str = "/api/v1/admin/storage-accounts";

    pub fn feed_page(page: u64, per_page: u64) -> String {
        format!("{FEED}?page={page}&per_page={per_page}")
    }

    pub fn video(id: Uuid) -> String {
        format!("/api/v1/videos/{id}")
    }

    pub fn views(id: Uuid) -> String {
        format!("/api/v1/videos/{id}/views")
    }

    pub fn related(id: Uuid) -> String {
        format!("/api/v1/videos/{id}/related")
    }

    pub fn like(id: Uuid) -> String {
        format!("/api/v1/videos/{id}/like")
    }

    pub fn admin_video(id: Uuid) -> String {
        format!("/api/v1/admin/videos/{id}")
    }

    pub fn refresh_link(id: Uuid) -> String {
        format!("/api/v1/admin/videos/{id}/refresh-link")
    }

    pub fn account_active(id: &str) -> String {
        format!("/api/v1/admin/storage-accounts/{id}/active")
    }
}

/// A running test server backed by in-memory stores and a temp directory.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub catalog: Arc<MemoryCatalog>,
    _media: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
    /// `Location` header, if any.
    pub location: Option<String>,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let location = res
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = res.text().await.expect("Failed to read response body");
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self {
            status,
            text,
            body,
            location,
        }
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let media = TempDir::new().expect("Failed to create media directory");
        let catalog = Arc::new(MemoryCatalog::new());
        let provider = Arc::new(
            LocalStorage::new(
                media.path().to_path_buf(),
                MEDIA_URL,
                chrono::Duration::hours(6),
            )
            .await
            .expect("Failed to prepare local storage"),
        );

        let feed = Arc::new(FeedCache::new(
            Arc::new(MemoryCache::new()),
            catalog.clone(),
            Duration::from_secs(300),
            RetryPolicy::once(),
        ));
        let rotator = Arc::new(StorageRotator::new(
            catalog.clone(),
            provider,
            Duration::from_secs(10),
            Duration::from_secs(10),
        ));
        let refresher = Arc::new(LinkRefresher::new(
            catalog.clone(),
            rotator.clone(),
            chrono::Duration::hours(1),
        ));

        let state = AppState {
            service: Arc::new(VideoService::new(
                catalog.clone(),
                feed,
                rotator,
                refresher,
            )),
            jwt_secret: Arc::from(JWT_SECRET),
            max_upload_bytes: 16 * 1024 * 1024,
        };

        let app = reelhouse::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Failed to build HTTP client"),
            catalog,
            _media: media,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn token(&self, role: &str) -> String {
        jwt::sign(
            JWT_SECRET.as_bytes(),
            Uuid::new_v4(),
            role,
            chrono::Duration::hours(1),
        )
        .expect("Failed to sign token")
    }

    pub fn admin_token(&self) -> String {
        self.token("admin")
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn patch_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .patch(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PATCH request");

        TestResponse::from_response(res).await
    }

    pub async fn put_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// Multipart upload with a `file` part plus text fields.
    pub async fn upload_with_token(
        &self,
        file_bytes: Vec<u8>,
        fields: &[(&str, &str)],
        token: &str,
    ) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name("clip.mp4")
            .mime_str("video/mp4")
            .expect("Failed to set MIME type");
        let mut form = reqwest::multipart::Form::new().part("file", part);
        for (name, value) in fields {
            form = form.text(name.to_string(), value.to_string());
        }

        let res = self
            .client
            .post(self.url(routes::ADMIN_VIDEOS))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Register a storage account through the admin API. The local backend
    /// uses the credential as the account directory name.
    pub async fn create_account(&self, name: &str, used_gb: f64, limit_gb: f64) -> Value {
        let res = self
            .post_with_token(
                routes::STORAGE_ACCOUNTS,
                &serde_json::json!({
                    "account_name": name,
                    "api_token": name,
                    "storage_limit_gb": limit_gb,
                    "storage_used_gb": used_gb,
                }),
                &self.admin_token(),
            )
            .await;
        assert_eq!(res.status, 201, "Account creation failed: {}", res.text);
        res.body
    }

    /// Upload a small published video and return its admin representation.
    pub async fn upload_video(&self, title: &str) -> Value {
        let res = self
            .upload_with_token(
                format!("bytes of {title}").into_bytes(),
                &[("title", title), ("duration_seconds", "120")],
                &self.admin_token(),
            )
            .await;
        assert_eq!(res.status, 201, "Upload failed: {}", res.text);
        res.body
    }

    /// Like [`upload_video`](Self::upload_video) with a category and comma-separated tags.
    pub async fn upload_classified(&self, title: &str, category: &str, tags: &str) -> Value {
        let res = self
            .upload_with_token(
                format!("bytes of {title}").into_bytes(),
                &[
                    ("title", title),
                    ("duration_seconds", "120"),
                    ("category", category),
                    ("tags", tags),
                ],
                &self.admin_token(),
            )
            .await;
        assert_eq!(res.status, 201, "Upload failed: {}", res.text);
        res.body
    }
}

/// Parse the `id` field of a JSON response.
pub fn id_of(body: &Value) -> Uuid {
    body["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("response has no id")
}
