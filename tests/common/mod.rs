// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use exam_prep::{
    config::Config,
    repository::{DynRepository, MemoryRepository, PgRepository},
    routes,
    state::AppState,
};
use serde_json::{Value, json};
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Generates one `#[tokio::test]` per scenario for each store. The Postgres
/// variants return early when `DATABASE_URL` is not set.
macro_rules! on_both_backends {
    ($($scenario:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario(crate::common::spawn_app().await).await;
                }
            )*
        }

        mod postgres {
            $(
                #[tokio::test]
                async fn $scenario() {
                    match crate::common::spawn_pg_app().await {
                        Some(app) => super::$scenario(app).await,
                        None => eprintln!("DATABASE_URL not set, skipping"),
                    }
                }
            )*
        }
    };
}

enum Backend {
    Memory(Arc<MemoryRepository>),
    Postgres(PgPool),
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    backend: Backend,
}

/// Spawns the app on a random port over a fresh in-memory store.
pub async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    serve(repo.clone(), Backend::Memory(repo)).await
}

/// Spawns the app over Postgres. Needs a running database reachable through
/// `DATABASE_URL`; returns `None` when the variable is not set.
pub async fn spawn_pg_app() -> Option<TestApp> {
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let repo = Arc::new(PgRepository::new(pool.clone()));
    Some(serve(repo, Backend::Postgres(pool)).await)
}

async fn serve(repo: DynRepository, backend: Backend) -> TestApp {
    let state = AppState {
        repo,
        config: Config::for_tests("test_secret_for_integration_tests"),
    };

    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        backend,
    }
}

pub struct Account {
    pub id: i64,
    pub token: String,
}

impl TestApp {
    pub fn is_postgres(&self) -> bool {
        matches!(self.backend, Backend::Postgres(_))
    }

    /// Pretends the attempt was started `minutes` ago.
    pub async fn backdate_attempt(&self, attempt_id: i64, minutes: i32) {
        match &self.backend {
            Backend::Memory(repo) => repo
                .backdate_attempt(attempt_id, Duration::minutes(minutes.into()))
                .unwrap(),
            Backend::Postgres(pool) => {
                sqlx::query(
                    "UPDATE attempts SET started_at = started_at - make_interval(mins => $2)
                     WHERE id = $1",
                )
                .bind(attempt_id)
                .bind(minutes)
                .execute(pool)
                .await
                .unwrap();
            }
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    pub async fn register(&self, role: &str) -> Account {
        let email = format!("{}-{}@example.com", role, uuid::Uuid::new_v4());
        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(&json!({
                "email": email,
                "password": "password123",
                "displayName": format!("Test {}", role),
                "role": role,
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let body: Value = response.json().await.unwrap();
        Account {
            id: body["id"].as_i64().unwrap(),
            token: body["accessToken"].as_str().unwrap().to_string(),
        }
    }

    pub async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create_exam(&self, token: &str, title: &str) -> i64 {
        let response = self.post(token, "/exams", json!({ "title": title })).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["id"].as_i64().unwrap()
    }

    /// Adds a two-option question whose first option is correct.
    pub async fn add_question(&self, token: &str, exam_id: i64, prompt: &str, points: i32) -> Value {
        let response = self
            .post(
                token,
                &format!("/exams/{}/questions", exam_id),
                json!({
                    "prompt": prompt,
                    "points": points,
                    "options": [
                        { "label": "Right", "isCorrect": true },
                        { "label": "Wrong", "isCorrect": false },
                    ],
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }

    pub async fn publish(&self, token: &str, exam_id: i64) {
        let response = self
            .post(token, &format!("/exams/{}/publish", exam_id), json!({}))
            .await;
        assert_eq!(response.status().as_u16(), 200);
    }

    pub async fn assign(&self, token: &str, exam_id: i64, student_ids: &[i64]) {
        let response = self
            .post(
                token,
                &format!("/exams/{}/assign", exam_id),
                json!({ "studentIds": student_ids }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
    }
}

/// Reads the `code` field of an error body.
pub async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    body["code"].as_str().unwrap_or_default().to_string()
}
