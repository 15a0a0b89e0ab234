//! Points ledger integration tests.

mod common;

use std::future::IntoFuture;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use common::TestHarness;
use futures::future::join_all;
use paw_points_core::UserId;
use serde_json::{json, Value};

// ============================================================================
// Accounts & Balance
// ============================================================================

#[tokio::test]
async fn create_account_starts_at_zero() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/accounts")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["userId"], harness.test_user_id.to_string());
    assert_eq!(body["points"], 0);
    assert_eq!(body["totalEarned"], 0);
}

#[tokio::test]
async fn duplicate_account_is_conflict() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .server
        .post("/accounts")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn balance_requires_auth() {
    let harness = TestHarness::new();

    let response = harness.server.get("/points").await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn balance_without_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/points")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status_not_found();
}

// ============================================================================
// Award
// ============================================================================

async fn award(harness: &TestHarness, action: &str) -> Value {
    let response = harness
        .server
        .post("/points/award")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .json(&json!({ "actionType": action, "metadata": { "postId": 42 } }))
        .await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn award_credits_and_reports_balance() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let body = award(&harness, "create_post").await;

    assert_eq!(body["success"], true);
    assert_eq!(body["earned"], 10);
    assert_eq!(body["points"], 10);
    assert_eq!(body["totalEarned"], 10);
    assert!(body.get("reason").is_none());
}

#[tokio::test]
async fn daily_cap_is_reported_not_an_error() {
    let harness = TestHarness::new();
    harness.create_account().await;

    // share_post: 1 point, cap 5 per day.
    for _ in 0..5 {
        assert_eq!(award(&harness, "share_post").await["success"], true);
    }
    let body = award(&harness, "share_post").await;

    assert_eq!(body["success"], false);
    assert_eq!(body["reason"], "daily_cap_reached");
    assert_eq!(body["earned"], 0);
    assert_eq!(body["points"], 5);
}

#[tokio::test]
async fn one_time_action_is_awarded_once() {
    let harness = TestHarness::new();
    harness.create_account().await;

    assert_eq!(award(&harness, "complete_profile").await["earned"], 50);

    let body = award(&harness, "complete_profile").await;
    assert_eq!(body["success"], false);
    assert_eq!(body["reason"], "already_awarded");
    assert_eq!(body["points"], 50);
}

#[tokio::test]
async fn concurrent_one_time_awards_credit_once() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let requests = (0..10).map(|_| {
        harness
            .server
            .post("/points/award")
            .add_header(AUTHORIZATION, harness.user_auth_header())
            .json(&json!({ "actionType": "register_pet" }))
            .into_future()
    });
    let bodies: Vec<Value> = join_all(requests)
        .await
        .into_iter()
        .map(|response| response.json())
        .collect();

    let winners = bodies.iter().filter(|b| b["success"] == true).count();
    assert_eq!(winners, 1);
    assert!(bodies
        .iter()
        .filter(|b| b["success"] == false)
        .all(|b| b["reason"] == "already_awarded"));

    let balance: Value = harness
        .server
        .get("/points")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();
    assert_eq!(balance["points"], 30);
}

#[tokio::test]
async fn unknown_action_is_bad_request() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let response = harness
        .server
        .post("/points/award")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .json(&json!({ "actionType": "adopt_dragon" }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn server_only_actions_are_rejected() {
    let harness = TestHarness::new();
    harness.create_account().await;

    for action in ["admin_grant", "daily_login", "purchase", "purchase_refund"] {
        let response = harness
            .server
            .post("/points/award")
            .add_header(AUTHORIZATION, harness.user_auth_header())
            .json(&json!({ "actionType": action }))
            .await;

        response.assert_status_bad_request();
    }
}

#[tokio::test]
async fn award_without_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/points/award")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .json(&json!({ "actionType": "create_post" }))
        .await;

    response.assert_status_not_found();
}

// ============================================================================
// Daily check
// ============================================================================

#[tokio::test]
async fn daily_check_succeeds_once_per_day() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let first: Value = harness
        .server
        .post("/points/daily-check")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();
    assert_eq!(first["success"], true);
    assert_eq!(first["earned"], 10);

    let second: Value = harness
        .server
        .post("/points/daily-check")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();
    assert_eq!(second["success"], false);
    assert_eq!(second["reason"], "daily_cap_reached");
    assert_eq!(second["points"], 10);
}

// ============================================================================
// History & Leaderboard
// ============================================================================

#[tokio::test]
async fn history_is_newest_first_and_paginated() {
    let harness = TestHarness::new();
    harness.create_account().await;

    award(&harness, "create_post").await;
    award(&harness, "create_comment").await;
    award(&harness, "report_lost_pet").await;

    let page: Value = harness
        .server
        .get("/points/history?limit=2")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();

    let transactions = page["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0]["actionType"], "report_lost_pet");
    assert_eq!(transactions[0]["pointsDelta"], 20);
    assert_eq!(transactions[1]["actionType"], "create_comment");
    assert_eq!(page["hasMore"], true);

    let rest: Value = harness
        .server
        .get("/points/history?limit=2&offset=2")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();

    let transactions = rest["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["actionType"], "create_post");
    assert_eq!(transactions[0]["metadata"]["postId"], 42);
    assert_eq!(rest["hasMore"], false);
}

#[tokio::test]
async fn history_limit_is_clamped() {
    let harness = TestHarness::new();
    harness.create_account().await;

    let page: Value = harness
        .server
        .get("/points/history?limit=500")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();

    assert_eq!(page["limit"], 50);
}

#[tokio::test]
async fn leaderboard_ranks_by_points() {
    let harness = TestHarness::new();

    let users: Vec<UserId> = (0..3).map(|_| UserId::generate()).collect();
    for (user, points) in users.iter().zip([200, 500, 100]) {
        harness.create_account_for(user).await;
        harness.fund(user, points).await;
    }

    let board: Value = harness
        .server
        .get("/points/leaderboard?limit=2")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();

    let entries = board["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["rank"], 1);
    assert_eq!(entries[0]["userId"], users[1].to_string());
    assert_eq!(entries[0]["points"], 500);
    assert_eq!(entries[1]["rank"], 2);
    assert_eq!(entries[1]["points"], 200);
}
