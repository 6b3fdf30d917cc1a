mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt; // for oneshot

use common::{
    app_state, body_json, fixture, fixture_with_source, multipart_body, query_png,
    search_request, StubImageSource,
};
use retina::model::{SearchResponse, StatusResponse};
use retina::server::create_router;

fn rebuild_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/index/rebuild")
        .body(Body::empty())
        .unwrap()
}

fn status_request() -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/api/index/status")
        .body(Body::empty())
        .unwrap()
}

async fn wait_for_rebuild(manager: &retina::manager::IndexManager) {
    for _ in 0..500 {
        if !manager.rebuild_in_progress() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("rebuild did not finish in time");
}

#[tokio::test]
async fn rebuild_endpoint_acknowledges_and_builds_in_background() {
    let fx = fixture(&[1, 2], &[]);
    let router = create_router(app_state(fx.manager.clone(), 10));

    let response = router.clone().oneshot(rebuild_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    wait_for_rebuild(&fx.manager).await;

    let response = router.oneshot(status_request()).await.unwrap();
    let payload: StatusResponse = body_json(response).await;
    assert_eq!(payload.status, "ready");
    assert_eq!(payload.total_vectors, 2);
}

#[tokio::test]
async fn rebuild_skips_failing_images_and_indexes_the_rest() {
    let fx = fixture(&[1, 2, 3, 4, 5], &[2, 4]);
    let router = create_router(app_state(fx.manager.clone(), 10));

    let response = router.clone().oneshot(rebuild_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    wait_for_rebuild(&fx.manager).await;

    let response = router.oneshot(status_request()).await.unwrap();
    let payload: StatusResponse = body_json(response).await;
    assert_eq!(payload.total_vectors, 3);
    assert_eq!(payload.total_products, 3);
}

#[tokio::test]
async fn overlapping_rebuild_gets_409() {
    let fx = fixture_with_source(
        &[1, 2, 3],
        StubImageSource::slow(&[], Duration::from_millis(100)),
    );
    let router = create_router(app_state(fx.manager.clone(), 10));

    let first = router.clone().oneshot(rebuild_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = router.clone().oneshot(rebuild_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    wait_for_rebuild(&fx.manager).await;

    // A fresh trigger is accepted once the pass has finished.
    let third = router.oneshot(rebuild_request()).await.unwrap();
    assert_eq!(third.status(), StatusCode::ACCEPTED);
    wait_for_rebuild(&fx.manager).await;
}

#[tokio::test]
async fn searches_during_a_rebuild_serve_the_prior_index() {
    let fx = fixture_with_source(
        &[1, 2],
        StubImageSource::slow(&[], Duration::from_millis(200)),
    );
    fx.manager.rebuild_blocking().unwrap();

    // Swap the catalog; the slow fetches keep the new pass in flight while
    // we query against it.
    fx.catalog.set(&[5, 6, 7]);
    let router = create_router(app_state(fx.manager.clone(), 10));

    let response = router.clone().oneshot(rebuild_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Mid-rebuild: answered entirely from the prior generation.
    let body = multipart_body("image", Some("image/png"), &query_png(1));
    let response = router.clone().oneshot(search_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload: SearchResponse = body_json(response).await;
    let ids: Vec<i64> = payload.results.iter().map(|r| r.product_id).collect();
    assert_eq!(ids, vec![1, 2]);

    wait_for_rebuild(&fx.manager).await;

    // After the swap: answered entirely from the new generation.
    let body = multipart_body("image", Some("image/png"), &query_png(5));
    let response = router.oneshot(search_request(body)).await.unwrap();
    let payload: SearchResponse = body_json(response).await;
    assert_eq!(payload.results.len(), 3);
    assert_eq!(payload.results[0].product_id, 5);
}

#[tokio::test]
async fn failed_rebuild_keeps_serving_the_prior_index() {
    let fx = fixture(&[1, 2, 3], &[]);
    fx.manager.rebuild_blocking().unwrap();

    // Every image now fails: the pass produces nothing and must not replace
    // the live index.
    fx.images.fail_all(&[1, 2, 3]);
    let router = create_router(app_state(fx.manager.clone(), 10));

    let response = router.clone().oneshot(rebuild_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    wait_for_rebuild(&fx.manager).await;

    let response = router.clone().oneshot(status_request()).await.unwrap();
    let payload: StatusResponse = body_json(response).await;
    assert_eq!(payload.status, "ready");
    assert_eq!(payload.total_vectors, 3);

    let body = multipart_body("image", Some("image/png"), &query_png(2));
    let response = router.oneshot(search_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload: SearchResponse = body_json(response).await;
    assert_eq!(payload.results[0].product_id, 2);
}
