//! Common test utilities for paw-points integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderValue;
use axum::Router;
use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;

use paw_points_core::{StaticCatalog, UserId};
use paw_points_service::{
    create_router, AppState, RateLimitConfig, RateLimitRule, ServiceConfig,
};
use paw_points_store::RocksStore;

/// Email on the admin allow-list in every harness.
pub const ADMIN_EMAIL: &str = "admin@paws.example";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// Admin user ID (authorized by email).
    pub admin_user_id: UserId,
    /// Direct store access for setup and assertions.
    pub store: Arc<RocksStore>,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness after adjusting the default test configuration.
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_base_url: "http://localhost".into(),
            admin_emails: vec![ADMIN_EMAIL.into()],
            max_body_bytes: 1024 * 1024,
            // Out of the way unless a test tightens it.
            rate_limits: RateLimitConfig {
                general: generous(),
                write: generous(),
            },
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let state = AppState::new(
            Arc::clone(&store) as Arc<dyn paw_points_store::Store>,
            config,
            Arc::new(StaticCatalog::default()),
        );
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            _temp_dir: temp_dir,
            test_user_id: UserId::generate(),
            admin_user_id: UserId::generate(),
            store,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> HeaderValue {
        Self::auth_header_for(&self.test_user_id)
    }

    /// Authorization header for the allow-listed admin.
    pub fn admin_auth_header(&self) -> HeaderValue {
        bearer(&format!("test-token:{}:{ADMIN_EMAIL}", self.admin_user_id))
    }

    /// Authorization header for an arbitrary user.
    pub fn auth_header_for(user_id: &UserId) -> HeaderValue {
        bearer(&format!("test-token:{user_id}"))
    }

    /// Create the balance row for `user_id`.
    pub async fn create_account_for(&self, user_id: &UserId) {
        self.server
            .post("/accounts")
            .add_header(AUTHORIZATION, Self::auth_header_for(user_id))
            .await
            .assert_status_ok();
    }

    /// Create the test user's balance row.
    pub async fn create_account(&self) {
        self.create_account_for(&self.test_user_id).await;
    }

    /// Grant `points` to `user_id` through the admin endpoint.
    pub async fn fund(&self, user_id: &UserId, points: i64) {
        self.server
            .post("/admin/points")
            .add_header(AUTHORIZATION, self.admin_auth_header())
            .json(&json!({
                "targetUserId": user_id.to_string(),
                "points": points,
                "reason": "Test funding"
            }))
            .await
            .assert_status_ok();
    }

    /// Create the test user's account and give it `points`.
    pub async fn create_funded_account(&self, points: i64) {
        self.create_account().await;
        if points > 0 {
            self.fund(&self.test_user_id, points).await;
        }
    }
}

fn generous() -> RateLimitRule {
    RateLimitRule {
        max_requests: 10_000,
        window: Duration::from_secs(60),
    }
}

/// `Bearer <token>` header value.
pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("Invalid header value")
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
