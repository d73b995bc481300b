mod common;

use axum::http::StatusCode;
use serde_json::{json, Value as JsonValue};

use common::{admin, app, approx, send};

struct Started {
    test: JsonValue,
    submission_id: String,
    token: String,
}

async fn start(app: &axum::Router, questions: JsonValue, show_results: bool) -> Started {
    let (status, body) = admin(
        app,
        "POST",
        "/api/admin/tests",
        Some(json!({
            "name": "Candidate flow",
            "duration_minutes": 30,
            "pass_threshold_percent": 70.0,
            "show_results_to_candidate": show_results,
            "questions": questions,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let test = body["test"].clone();

    let (status, body) = admin(
        app,
        "POST",
        "/api/admin/submissions",
        Some(json!({
            "test_id": test["id"],
            "candidate": { "name": "Grace Hopper", "email": "grace@example.com" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let submission_id = body["submission"]["id"].as_str().unwrap().to_string();
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, _) = admin(
        app,
        "POST",
        &format!("/api/admin/submissions/{}/approve", submission_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    Started {
        test,
        submission_id,
        token,
    }
}

fn mixed_questions() -> JsonValue {
    json!([
        {
            "title": "Pick the smart pointer for shared ownership",
            "type": "SINGLE_CHOICE_TEXT",
            "max_score": 6,
            "answers": [
                { "text": "Rc", "is_correct": true },
                { "text": "Box", "is_correct": false }
            ]
        },
        { "title": "Explain Pin", "type": "OPEN_TEXT", "max_score": 5 }
    ])
}

fn option_id(test: &JsonValue, question: usize, option: usize) -> JsonValue {
    test["questions"][question]["answers"][option]["id"].clone()
}

fn question_id(test: &JsonValue, question: usize) -> JsonValue {
    test["questions"][question]["id"].clone()
}

async fn open_answer_id(app: &axum::Router, started: &Started) -> String {
    let (status, body) = admin(
        app,
        "GET",
        &format!("/api/admin/submissions/{}", started.submission_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let open_question = question_id(&started.test, 1);
    body["answers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["question_id"] == open_question)
        .and_then(|a| a["id"].as_str())
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn candidate_view_hides_correct_flags() {
    let app = app();
    let started = start(&app, mixed_questions(), true).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/public/submissions/{}", started.token),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["submission"]["status"], "IN_PROGRESS");
    assert!(body["submission"]["deadline"].is_string());
    let questions = body["test"]["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    assert!(!body.to_string().contains("is_correct"));

    let (status, _) = send(&app, "GET", "/api/public/submissions/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_grading_flow_passes_at_ninety_one_percent() {
    let app = app();
    let started = start(&app, mixed_questions(), true).await;
    let base = format!("/api/public/submissions/{}", started.token);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("{}/answer", base),
        None,
        Some(json!({
            "question_id": question_id(&started.test, 0),
            "selected_answer_ids": [option_id(&started.test, 0, 0)]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["saved"], true);

    let (_, body) = admin(
        &app,
        "GET",
        &format!("/api/admin/submissions/{}", started.submission_id),
        None,
    )
    .await;
    assert_eq!(body["status"], "IN_PROGRESS");
    approx(&body["final_raw_score"], 6.0);
    approx(&body["answers"][0]["assigned_score"], 6.0);

    let (status, body) = send(
        &app,
        "POST",
        &format!("{}/submit", base),
        None,
        Some(json!({
            "answers": [
                { "question_id": question_id(&started.test, 1), "open_text_answer": "It stops values from moving" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["submission_status"], "COMPLETED");

    let (status, body) = admin(&app, "GET", "/api/admin/submissions?needs_review=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (_, body) = send(&app, "GET", &format!("{}/result", base), None, None).await;
    assert_eq!(body["show_results"], false);
    assert!(body["final_percent_score"].is_null());

    let answer_id = open_answer_id(&app, &started).await;
    let (status, body) = admin(
        &app,
        "POST",
        &format!("/api/admin/submissions/{}/scores", started.submission_id),
        Some(json!({ "scores": { answer_id.clone(): 4 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["submission"]["status"], "EVALUATED");
    approx(&body["submission"]["final_raw_score"], 10.0);
    approx(&body["submission"]["total_possible_score"], 11.0);
    approx(&body["submission"]["final_percent_score"], 90.91);
    assert_eq!(body["submission"]["final_result"], "PASS");

    let (status, body) = send(&app, "GET", &format!("{}/result", base), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["show_results"], true);
    approx(&body["final_percent_score"], 90.91);
    assert_eq!(body["final_result"], "PASS");

    let (status, body) = admin(
        &app,
        "POST",
        &format!("/api/admin/submissions/{}/scores", started.submission_id),
        Some(json!({ "scores": { answer_id.clone(): 6 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, body) = admin(
        &app,
        "POST",
        &format!("/api/admin/submissions/{}/scores", started.submission_id),
        Some(json!({ "scores": { answer_id: 0.005 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (_, body) = admin(
        &app,
        "GET",
        &format!("/api/admin/submissions/{}", started.submission_id),
        None,
    )
    .await;
    approx(&body["final_percent_score"], 90.91);
}

#[tokio::test]
async fn failing_candidate_sees_fail_when_results_are_shown() {
    let app = app();
    let started = start(&app, mixed_questions(), true).await;
    let base = format!("/api/public/submissions/{}", started.token);

    let (status, _) = send(
        &app,
        "POST",
        &format!("{}/submit", base),
        None,
        Some(json!({
            "answers": [
                {
                    "question_id": question_id(&started.test, 0),
                    "selected_answer_ids": [option_id(&started.test, 0, 1)]
                },
                { "question_id": question_id(&started.test, 1), "open_text_answer": "Not sure" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let answer_id = open_answer_id(&app, &started).await;
    let (status, body) = admin(
        &app,
        "POST",
        &format!("/api/admin/submissions/{}/scores", started.submission_id),
        Some(json!({ "scores": { answer_id: 3 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    approx(&body["submission"]["final_percent_score"], 27.27);
    assert_eq!(body["submission"]["final_result"], "FAIL");
}

#[tokio::test]
async fn closed_only_test_is_evaluated_on_submit_without_partial_credit() {
    let app = app();
    let questions = json!([
        {
            "title": "Which are zero-cost abstractions?",
            "type": "MULTIPLE_CHOICE_TEXT",
            "max_score": 4,
            "answers": [
                { "text": "Iterators", "is_correct": true },
                { "text": "Garbage collection", "is_correct": false },
                { "text": "Generics", "is_correct": true }
            ]
        }
    ]);
    let started = start(&app, questions, false).await;
    let base = format!("/api/public/submissions/{}", started.token);

    let (status, body) = send(
        &app,
        "POST",
        &format!("{}/submit", base),
        None,
        Some(json!({
            "answers": [{
                "question_id": question_id(&started.test, 0),
                "selected_answer_ids": [
                    option_id(&started.test, 0, 0),
                    option_id(&started.test, 0, 1),
                    option_id(&started.test, 0, 2)
                ]
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["submission_status"], "EVALUATED");

    let (_, body) = admin(
        &app,
        "GET",
        &format!("/api/admin/submissions/{}", started.submission_id),
        None,
    )
    .await;
    approx(&body["final_raw_score"], 0.0);
    assert_eq!(body["final_result"], "FAIL");
    assert_eq!(body["answers"][0]["is_reviewed"], true);

    let (_, body) = send(&app, "GET", &format!("{}/result", base), None, None).await;
    assert_eq!(body["status"], "EVALUATED");
    assert_eq!(body["show_results"], false);

    let (status, _) = send(
        &app,
        "POST",
        &format!("{}/submit", base),
        None,
        Some(json!({ "answers": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_selection_is_a_bad_request() {
    let app = app();
    let started = start(&app, mixed_questions(), true).await;
    let base = format!("/api/public/submissions/{}", started.token);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("{}/answer", base),
        None,
        Some(json!({
            "question_id": question_id(&started.test, 0),
            "selected_answer_ids": [option_id(&started.test, 0, 0), option_id(&started.test, 0, 1)]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("single answer"));

    let (status, _) = send(
        &app,
        "POST",
        &format!("{}/submit", base),
        None,
        Some(json!({
            "answers": [{
                "question_id": question_id(&started.test, 0),
                "selected_answer_ids": ["00000000-0000-0000-0000-000000000001"]
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, "GET", &base, None, None).await;
    assert_eq!(body["submission"]["status"], "IN_PROGRESS");
}

#[tokio::test]
async fn pending_submission_does_not_reveal_questions() {
    let app = app();
    let (_, body) = admin(
        &app,
        "POST",
        "/api/admin/tests",
        Some(json!({
            "name": "Pending",
            "duration_minutes": 10,
            "pass_threshold_percent": 50.0,
            "questions": mixed_questions(),
        })),
    )
    .await;
    let test_id = body["test"]["id"].clone();
    let (_, body) = admin(
        &app,
        "POST",
        "/api/admin/submissions",
        Some(json!({
            "test_id": test_id,
            "candidate": { "name": "Alan", "email": "alan@example.com" }
        })),
    )
    .await;
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/public/submissions/{}", token),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["submission"]["status"], "PENDING_APPROVAL");
    assert!(body["test"]["questions"].as_array().unwrap().is_empty());
    assert_eq!(body["test"]["total_questions"], 2);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/public/submissions/{}/submit", token),
        None,
        Some(json!({ "answers": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
