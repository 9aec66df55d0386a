#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pasetors::claims::Claims;
use pasetors::keys::SymmetricKey;
use pasetors::{local, version4::V4};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use agora::config::{decode_key_32, CachePolicy};
use agora::http::{TOKEN_AUDIENCE, TOKEN_ISSUER};
use agora::infra::memory::{MemoryCache, MemoryStore};
use agora::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// "0123456789abcdef0123456789abcdef" (32 bytes), test-only
const TEST_PASETO_ACCESS_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

// ---------------------------------------------------------------------------
// TestApp: real router over the in-memory store and cache
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub access_token: String,
}

impl TestUser {
    pub fn token(&self) -> Option<&str> {
        Some(self.access_token.as_str())
    }
}

/// Fresh app with the default cache policy (snapshot written at score 1).
pub async fn app() -> TestApp {
    app_with_policy(CachePolicy {
        promote_at_score: 1,
        lookup_timeout: Duration::from_millis(100),
    })
    .await
}

pub async fn app_with_policy(policy: CachePolicy) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let state = AppState {
        store: store.clone(),
        cache: cache.clone(),
        cache_policy: policy,
        paseto_access_key: decode_key_32("PASETO_ACCESS_KEY", TEST_PASETO_ACCESS_KEY)
            .expect("test key decodes"),
    };
    let router = agora::http::router(state.clone());

    TestApp {
        router,
        state,
        store,
        cache,
    }
}

/// Mints an access token the way the session service does.
pub fn mint_token(key: &[u8; 32], user_id: Uuid, typ: &str) -> String {
    let mut claims =
        Claims::new_expires_in(&Duration::from_secs(15 * 60)).expect("claims");
    claims.issuer(TOKEN_ISSUER).expect("issuer");
    claims.audience(TOKEN_AUDIENCE).expect("audience");
    claims.subject(&user_id.to_string()).expect("subject");
    claims.add_additional("typ", typ).expect("typ");
    let key = SymmetricKey::<V4>::from(key).expect("key");
    local::encrypt(&key, &claims, None, None).expect("encrypt")
}

impl TestApp {
    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::GET, path, None, &headers).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    pub async fn patch_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::PATCH, path, Some(body), &headers)
            .await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Registers a user in the store and mints an access token for them.
    pub fn create_user(&self, suffix: &str) -> TestUser {
        let username = format!("user_{}", suffix);
        let id = self.store.add_user(&username);
        let access_token = mint_token(&self.state.paseto_access_key, id, "access");
        TestUser {
            id,
            username,
            access_token,
        }
    }

    /// Creates a subreddit owned by `owner` and returns its id.
    pub async fn create_subreddit(&self, owner: &TestUser, name: &str) -> Uuid {
        let resp = self
            .post_json("/v1/subreddits", json!({ "name": name }), owner.token())
            .await;
        assert_eq!(resp.status, StatusCode::OK, "{}", resp.error_message());
        parse_id(&resp.json()["id"])
    }

    /// Creates a post by `author`, who must already be subscribed.
    pub async fn create_post(&self, author: &TestUser, subreddit_id: Uuid, title: &str) -> Uuid {
        let resp = self
            .post_json(
                "/v1/posts",
                json!({
                    "subreddit_id": subreddit_id,
                    "title": title,
                    "content": { "blocks": [{ "type": "paragraph", "data": { "text": title } }] }
                }),
                author.token(),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK, "{}", resp.error_message());
        parse_id(&resp.json()["id"])
    }

    /// Owner, subreddit and one post, the usual starting point.
    pub async fn seed_post(&self, suffix: &str) -> (TestUser, Uuid) {
        let author = self.create_user(suffix);
        let subreddit_id = self
            .create_subreddit(&author, &format!("sub_{}", suffix))
            .await;
        let post_id = self.create_post(&author, subreddit_id, "Hello agora").await;
        (author, post_id)
    }

    pub async fn comment(
        &self,
        author: &TestUser,
        post_id: Uuid,
        text: &str,
        reply_to_id: Option<Uuid>,
    ) -> Uuid {
        let resp = self
            .post_json(
                &format!("/v1/posts/{}/comments", post_id),
                json!({ "text": text, "reply_to_id": reply_to_id }),
                author.token(),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK, "{}", resp.error_message());
        parse_id(&resp.json()["id"])
    }

    pub async fn vote(&self, voter: &TestUser, post_id: Uuid, direction: &str) -> TestResponse {
        self.post_json(
            &format!("/v1/posts/{}/vote", post_id),
            json!({ "direction": direction }),
            voter.token(),
        )
        .await
    }
}

pub fn parse_id(value: &Value) -> Uuid {
    Uuid::parse_str(value.as_str().expect("id is a string")).expect("id is a uuid")
}
