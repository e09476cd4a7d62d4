use std::time::Duration;

use serde_json::json;
use swarmr_http::{
    Confirmation, ConfirmationOutcome, ConfirmationPolicy, Error, HttpClient, HttpRequest,
    ResponseShape, ShapeResolver,
};
use swarmr_testserver::{CSRF_TOKEN, TestServer};

fn list_resolver() -> ShapeResolver {
    ShapeResolver::new(vec![
        ResponseShape::BareArray,
        ResponseShape::Field("notifications".to_string()),
    ])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_endpoints_resolve_through_either_shape() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();
    let resolver = list_resolver();

    let wrapped = client.get(&server.urls().notifications).await?;
    anyhow::ensure!(wrapped.status == 200);
    anyhow::ensure!(wrapped.elapsed > Duration::ZERO);
    let body = wrapped.json()?;
    let resolved = resolver.resolve(&body)?;
    anyhow::ensure!(resolved.shape == 1 && resolved.items.len() == 2);

    let bare = client.get(&server.urls().courses).await?;
    let body = bare.json()?;
    let resolved = resolver.resolve(&body)?;
    anyhow::ensure!(resolved.shape == 0 && resolved.items.len() == 3);

    anyhow::ensure!(server.stats().requests_total() == 2);
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn archive_is_confirmed_and_restore_depends_on_policy() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let archive = HttpRequest::put(
        format!("{}?courseid=CS101", server.urls().course_archive),
        r#"{"archiveStatus":true}"#,
    )
    .header("content-type", "application/json")
    .header("x-csrf-token", CSRF_TOKEN);
    let res = client.request(archive).await?;
    let confirm = Confirmation::new("isArchived", json!(true), ConfirmationPolicy::Strict);
    anyhow::ensure!(confirm.evaluate(&res) == ConfirmationOutcome::Confirmed);

    let restore_url = format!("{}?courseid=CS101", server.urls().course_restore);
    let res = client.request(HttpRequest::put(restore_url, "")).await?;
    let strict = Confirmation::new("restored", json!(true), ConfirmationPolicy::Strict);
    let optimistic = Confirmation::new("restored", json!(true), ConfirmationPolicy::Optimistic);
    anyhow::ensure!(!strict.evaluate(&res).is_accepted());
    anyhow::ensure!(optimistic.evaluate(&res) == ConfirmationOutcome::Assumed);

    anyhow::ensure!(server.stats().archive_calls() == 1);
    anyhow::ensure!(server.stats().saw_csrf_header() == 1);
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_status_is_a_response_not_a_transport_error() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let res = client.get(&server.urls().status(503)).await?;
    anyhow::ensure!(res.status == 503);
    anyhow::ensure!(!res.is_success());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_timeout_covers_slow_responses() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let req = HttpRequest::get(&server.urls().slow).timeout(Duration::from_millis(5));
    match client.request(req).await {
        Err(Error::Timeout(d)) => anyhow::ensure!(d == Duration::from_millis(5)),
        other => anyhow::bail!("expected timeout, got {other:?}"),
    }

    server.shutdown().await;
    Ok(())
}
