// tests/api_tests.rs

#[macro_use]
mod common;

use common::{TestApp, error_code, spawn_app};
use serde_json::{Value, json};

#[tokio::test]
async fn unknown_path_is_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn register_login_and_me() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/auth/register"))
        .json(&json!({
            "email": "Ada@Example.com",
            "password": "password123",
            "displayName": "Ada",
            "role": "teacher",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["role"], "teacher");

    let response = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": "ada@example.com", "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let token = body["accessToken"].as_str().unwrap().to_string();

    let response = app.get(&token, "/auth/me").await;
    assert_eq!(response.status().as_u16(), 200);
    let me: Value = response.json().await.unwrap();
    assert_eq!(me["displayName"], "Ada");
    assert!(me.get("passwordHash").is_none());
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = spawn_app().await;
    let payload = json!({
        "email": "dup@example.com",
        "password": "password123",
        "displayName": "Dup",
        "role": "student",
    });

    let first = app.client.post(app.url("/auth/register")).json(&payload).send().await.unwrap();
    assert_eq!(first.status().as_u16(), 201);

    let second = app.client.post(app.url("/auth/register")).json(&payload).send().await.unwrap();
    assert_eq!(second.status().as_u16(), 409);
    assert_eq!(error_code(second).await, "EMAIL_EXISTS");
}

#[tokio::test]
async fn register_rejects_invalid_payload() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/auth/register"))
        .json(&json!({
            "email": "not-an-email",
            "password": "short",
            "displayName": "X",
            "role": "student",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");
}

#[tokio::test]
async fn login_failures_look_identical() {
    let app = spawn_app().await;
    app.client
        .post(app.url("/auth/register"))
        .json(&json!({
            "email": "known@example.com",
            "password": "password123",
            "displayName": "Known",
            "role": "student",
        }))
        .send()
        .await
        .unwrap();

    let wrong_password = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": "known@example.com", "password": "password999" }))
        .send()
        .await
        .unwrap();
    let unknown_email = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": "nobody@example.com", "password": "password123" }))
        .send()
        .await
        .unwrap();

    assert_eq!(wrong_password.status().as_u16(), 401);
    assert_eq!(unknown_email.status().as_u16(), 401);
    assert_eq!(error_code(wrong_password).await, "INVALID_CREDENTIALS");
    assert_eq!(error_code(unknown_email).await, "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn invalid_token_is_rejected() {
    let app = spawn_app().await;

    let response = app.get("not.a.jwt", "/auth/me").await;

    assert_eq!(response.status().as_u16(), 401);
}

on_both_backends!(
    students_cannot_author_exams,
    exam_lifecycle,
    exams_are_private_to_their_teacher,
    draft_exam_can_be_deleted,
    question_rules_are_enforced,
    questions_keep_contiguous_positions,
    update_question_replaces_options,
    assigning_requires_student_accounts,
    exam_fields_can_be_cleared,
    length_limits_apply_to_sanitised_text,
);

async fn students_cannot_author_exams(app: TestApp) {
    let student = app.register("student").await;

    let response = app.post(&student.token, "/exams", json!({ "title": "Mine" })).await;

    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(error_code(response).await, "FORBIDDEN");
}

async fn exam_lifecycle(app: TestApp) {
    let teacher = app.register("teacher").await;

    let response = app
        .post(&teacher.token, "/exams", json!({ "title": "Algebra", "timeLimitMinutes": 30 }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "draft");
    let exam_id = body["id"].as_i64().unwrap();

    // Publishing an empty exam is refused.
    let response = app
        .post(&teacher.token, &format!("/exams/{}/publish", exam_id), json!({}))
        .await;
    assert_eq!(error_code(response).await, "NO_QUESTIONS");

    app.add_question(&teacher.token, exam_id, "1 + 1?", 1).await;

    let response = app
        .post(&teacher.token, &format!("/exams/{}/publish", exam_id), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let exam: Value = response.json().await.unwrap();
    assert_eq!(exam["status"], "published");
    assert!(exam["publishedAt"].is_string());

    let response = app
        .post(&teacher.token, &format!("/exams/{}/publish", exam_id), json!({}))
        .await;
    assert_eq!(error_code(response).await, "ALREADY_PUBLISHED");

    // Published exams are frozen.
    let response = app
        .put(&teacher.token, &format!("/exams/{}", exam_id), json!({ "title": "Renamed" }))
        .await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(error_code(response).await, "EXAM_NOT_EDITABLE");

    let response = app
        .post(&teacher.token, &format!("/exams/{}/unpublish", exam_id), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let exam: Value = response.json().await.unwrap();
    assert_eq!(exam["status"], "draft");
    assert!(exam["publishedAt"].is_null());

    let response = app
        .put(&teacher.token, &format!("/exams/{}", exam_id), json!({ "title": "Renamed" }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let exam: Value = response.json().await.unwrap();
    assert_eq!(exam["title"], "Renamed");
    assert_eq!(exam["timeLimitMinutes"], 30);

    app.publish(&teacher.token, exam_id).await;
    let response = app
        .post(&teacher.token, &format!("/exams/{}/archive", exam_id), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let exam: Value = response.json().await.unwrap();
    assert_eq!(exam["status"], "archived");

    let response = app
        .post(&teacher.token, &format!("/exams/{}/archive", exam_id), json!({}))
        .await;
    assert_eq!(error_code(response).await, "EXAM_NOT_PUBLISHED");

    let response = app.delete(&teacher.token, &format!("/exams/{}", exam_id)).await;
    assert_eq!(error_code(response).await, "EXAM_NOT_EDITABLE");
}

async fn exams_are_private_to_their_teacher(app: TestApp) {
    let owner = app.register("teacher").await;
    let other = app.register("teacher").await;
    let exam_id = app.create_exam(&owner.token, "Private").await;

    let response = app.get(&other.token, &format!("/exams/{}", exam_id)).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app.get(&other.token, "/exams").await;
    let exams: Value = response.json().await.unwrap();
    assert_eq!(exams.as_array().unwrap().len(), 0);

    let response = app.get(&owner.token, &format!("/exams/{}", i64::MAX)).await;
    assert_eq!(response.status().as_u16(), 404);
}

async fn draft_exam_can_be_deleted(app: TestApp) {
    let teacher = app.register("teacher").await;
    let exam_id = app.create_exam(&teacher.token, "Scratch").await;
    app.add_question(&teacher.token, exam_id, "Q", 1).await;

    let response = app.delete(&teacher.token, &format!("/exams/{}", exam_id)).await;
    assert_eq!(response.status().as_u16(), 204);

    let response = app.get(&teacher.token, &format!("/exams/{}", exam_id)).await;
    assert_eq!(response.status().as_u16(), 404);
}

async fn question_rules_are_enforced(app: TestApp) {
    let teacher = app.register("teacher").await;
    let exam_id = app.create_exam(&teacher.token, "Rules").await;
    let path = format!("/exams/{}/questions", exam_id);

    let two_correct = app
        .post(
            &teacher.token,
            &path,
            json!({
                "prompt": "Pick",
                "options": [
                    { "label": "A", "isCorrect": true },
                    { "label": "B", "isCorrect": true },
                ],
            }),
        )
        .await;
    assert_eq!(two_correct.status().as_u16(), 400);
    assert_eq!(error_code(two_correct).await, "VALIDATION_ERROR");

    let one_option = app
        .post(
            &teacher.token,
            &path,
            json!({ "prompt": "Pick", "options": [{ "label": "A", "isCorrect": true }] }),
        )
        .await;
    assert_eq!(one_option.status().as_u16(), 400);

    let response = app
        .post(
            &teacher.token,
            &path,
            json!({
                "prompt": "<script>alert(1)</script>Capital of France?",
                "options": [
                    { "label": "Paris", "isCorrect": true },
                    { "label": "Lyon", "isCorrect": false },
                ],
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let question: Value = response.json().await.unwrap();
    assert_eq!(question["prompt"], "Capital of France?");
    assert_eq!(question["points"], 1);
    assert_eq!(question["position"], 1);
    assert_eq!(question["options"][1]["position"], 2);
}

async fn questions_keep_contiguous_positions(app: TestApp) {
    let teacher = app.register("teacher").await;
    let exam_id = app.create_exam(&teacher.token, "Order").await;

    let q1 = app.add_question(&teacher.token, exam_id, "First", 1).await;
    let q2 = app.add_question(&teacher.token, exam_id, "Second", 1).await;
    let q3 = app.add_question(&teacher.token, exam_id, "Third", 1).await;
    let ids: Vec<i64> = [&q1, &q2, &q3].iter().map(|q| q["id"].as_i64().unwrap()).collect();

    let response = app
        .put(
            &teacher.token,
            &format!("/exams/{}/questions/reorder", exam_id),
            json!({ "questionIds": [ids[2], ids[0], ids[1]] }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let reordered: Value = response.json().await.unwrap();
    let prompts: Vec<&str> = reordered
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["prompt"].as_str().unwrap())
        .collect();
    assert_eq!(prompts, ["Third", "First", "Second"]);

    // Not a permutation.
    let response = app
        .put(
            &teacher.token,
            &format!("/exams/{}/questions/reorder", exam_id),
            json!({ "questionIds": [ids[0], ids[0], ids[1]] }),
        )
        .await;
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");

    let response = app.delete(&teacher.token, &format!("/questions/{}", ids[0])).await;
    assert_eq!(response.status().as_u16(), 204);

    let response = app.get(&teacher.token, &format!("/exams/{}/questions", exam_id)).await;
    let questions: Value = response.json().await.unwrap();
    let positions: Vec<(i64, &str)> = questions
        .as_array()
        .unwrap()
        .iter()
        .map(|q| (q["position"].as_i64().unwrap(), q["prompt"].as_str().unwrap()))
        .collect();
    assert_eq!(positions, [(1, "Third"), (2, "Second")]);
}

async fn update_question_replaces_options(app: TestApp) {
    let teacher = app.register("teacher").await;
    let exam_id = app.create_exam(&teacher.token, "Edit").await;
    let question = app.add_question(&teacher.token, exam_id, "Old", 1).await;
    let id = question["id"].as_i64().unwrap();

    let response = app
        .put(
            &teacher.token,
            &format!("/questions/{}", id),
            json!({
                "prompt": "New",
                "points": 3,
                "options": [
                    { "label": "X", "isCorrect": false },
                    { "label": "Y", "isCorrect": false },
                    { "label": "Z", "isCorrect": true },
                ],
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["prompt"], "New");
    assert_eq!(updated["points"], 3);
    assert_eq!(updated["options"].as_array().unwrap().len(), 3);
    assert_eq!(updated["options"][2]["isCorrect"], true);

    let response = app
        .put(
            &teacher.token,
            &format!("/questions/{}", id),
            json!({ "options": [{ "label": "X", "isCorrect": false }, { "label": "Y", "isCorrect": false }] }),
        )
        .await;
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");
}

async fn assigning_requires_student_accounts(app: TestApp) {
    let teacher = app.register("teacher").await;
    let student = app.register("student").await;
    let exam_id = app.create_exam(&teacher.token, "Assign").await;
    let path = format!("/exams/{}/assign", exam_id);

    let response = app
        .post(&teacher.token, &path, json!({ "studentIds": [student.id, teacher.id] }))
        .await;
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");

    // Repeating an assignment is harmless.
    app.assign(&teacher.token, exam_id, &[student.id]).await;
    app.assign(&teacher.token, exam_id, &[student.id, student.id]).await;
}

async fn exam_fields_can_be_cleared(app: TestApp) {
    let teacher = app.register("teacher").await;
    let response = app
        .post(
            &teacher.token,
            "/exams",
            json!({ "title": "Timed", "description": "Bring a pencil", "timeLimitMinutes": 45 }),
        )
        .await;
    let exam_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();
    let path = format!("/exams/{}", exam_id);

    // Absent fields are left alone.
    let response = app.put(&teacher.token, &path, json!({ "title": "Renamed" })).await;
    let exam: Value = response.json().await.unwrap();
    assert_eq!(exam["description"], "Bring a pencil");
    assert_eq!(exam["timeLimitMinutes"], 45);

    let response = app
        .put(&teacher.token, &path, json!({ "description": null, "timeLimitMinutes": null }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let exam: Value = response.json().await.unwrap();
    assert_eq!(exam["title"], "Renamed");
    assert!(exam["description"].is_null());
    assert!(exam["timeLimitMinutes"].is_null());

    let exam: Value = app.get(&teacher.token, &path).await.json().await.unwrap();
    assert!(exam["description"].is_null());
    assert!(exam["timeLimitMinutes"].is_null());

    let response = app.put(&teacher.token, &path, json!({ "timeLimitMinutes": 0 })).await;
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");
}

async fn length_limits_apply_to_sanitised_text(app: TestApp) {
    let teacher = app.register("teacher").await;

    // Each '&' is stored as "&amp;", five times its raw length.
    let title = "&".repeat(150);
    let response = app.post(&teacher.token, "/exams", json!({ "title": title })).await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");

    let exam_id = app.create_exam(&teacher.token, "Fits").await;

    let response = app
        .put(
            &teacher.token,
            &format!("/exams/{}", exam_id),
            json!({ "description": "&".repeat(1000) }),
        )
        .await;
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");

    let response = app
        .post(
            &teacher.token,
            &format!("/exams/{}/questions", exam_id),
            json!({
                "prompt": "&".repeat(1000),
                "options": [
                    { "label": "A", "isCorrect": true },
                    { "label": "B", "isCorrect": false },
                ],
            }),
        )
        .await;
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");

    let response = app
        .client
        .post(app.url("/auth/register"))
        .json(&json!({
            "email": format!("amp-{}@example.com", uuid::Uuid::new_v4()),
            "password": "password123",
            "displayName": "&".repeat(50),
            "role": "student",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");
}
