use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use mfycache::SourceResolver;
use mfyspotify::{SpotdlResolver, SpotifyClient, SpotifyError};
use mockito::Matcher;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const TRACK_ID: &str = "4uLU6hMCjMI75M1A2tKUQC";

fn track_json() -> Value {
    json!({
        "id": TRACK_ID,
        "name": "Get Lucky",
        "artists": [{"id": "a1", "name": "Daft Punk"}, {"id": "a2", "name": "Pharrell Williams"}],
        "album": {
            "name": "Random Access Memories",
            "images": [{"url": "https://i.scdn.co/image/640", "width": 640, "height": 640}]
        },
        "external_urls": {"spotify": format!("https://open.spotify.com/track/{}", TRACK_ID)}
    })
}

async fn mock_token(server: &mut mockito::ServerGuard, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/api/token")
        .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
        .match_body(Matcher::UrlEncoded(
            "grant_type".to_string(),
            "client_credentials".to_string(),
        ))
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "tok-123", "token_type": "Bearer", "expires_in": 3600}"#)
        .expect(hits)
        .create_async()
        .await
}

fn client_for(server: &mockito::ServerGuard) -> SpotifyClient {
    SpotifyClient::with_endpoints(
        "id",
        "secret",
        format!("{}/api/token", server.url()),
        format!("{}/v1", server.url()),
    )
    .unwrap()
}

#[tokio::test]
async fn search_maps_tracks_and_reuses_token() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let token = mock_token(&mut server, 1).await;
    let search = server
        .mock("GET", "/v1/search")
        .match_header("authorization", "Bearer tok-123")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "get lucky".into()),
            Matcher::UrlEncoded("type".into(), "track".into()),
            Matcher::UrlEncoded("limit".into(), "10".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(json!({"tracks": {"items": [track_json()]}}).to_string())
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server);
    let results = client.search("get lucky").await?;
    client.search("get lucky").await?;

    token.assert_async().await;
    search.assert_async().await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, TRACK_ID);
    assert_eq!(results[0].artist, "Daft Punk, Pharrell Williams");
    assert_eq!(results[0].artwork.as_deref(), Some("https://i.scdn.co/image/640"));
    Ok(())
}

#[tokio::test]
async fn unknown_track_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    mock_token(&mut server, 1).await;
    server
        .mock("GET", "/v1/tracks/missing")
        .with_status(404)
        .with_body(r#"{"error": {"status": 404, "message": "Not found"}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    assert!(matches!(
        client.get_track("missing").await,
        Err(SpotifyError::NotFound(_))
    ));
}

#[tokio::test]
async fn bad_credentials_are_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(r#"{"error": "invalid_client"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    assert!(matches!(
        client.search("anything").await,
        Err(SpotifyError::ApiError { code: 400, .. })
    ));
}

#[tokio::test]
async fn resolver_uses_cached_backend_file() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let search = server
        .mock("GET", "/api/search")
        .match_query(Matcher::UrlEncoded(
            "query".into(),
            format!("https://open.spotify.com/track/{}", TRACK_ID),
        ))
        .with_body(
            json!({"songs": [{"name": "Get Lucky", "cached": true, "file_path": "/music/Daft Punk - Get Lucky.mp3"}]})
                .to_string(),
        )
        .create_async()
        .await;
    let download = server
        .mock("POST", "/api/download")
        .expect(0)
        .create_async()
        .await;

    let resolver = SpotdlResolver::new(&server.url())?;
    let url = resolver.resolve(TRACK_ID).await?;

    search.assert_async().await;
    download.assert_async().await;
    assert_eq!(
        url,
        format!("{}/api/file/Daft%20Punk%20-%20Get%20Lucky.mp3", server.url())
    );
    Ok(())
}

#[tokio::test]
async fn resolver_asks_backend_to_download() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/search")
        .match_query(Matcher::Any)
        .with_body(json!({"songs": [{"name": "Get Lucky", "cached": false}]}).to_string())
        .create_async()
        .await;
    let download = server
        .mock("POST", "/api/download")
        .match_query(Matcher::UrlEncoded(
            "url".into(),
            format!("https://open.spotify.com/track/{}", TRACK_ID),
        ))
        .with_body(json!({"status": "success", "file_path": "/tmp/out/track.mp3"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let resolver = SpotdlResolver::new(&server.url())?;
    let url = resolver.resolve(TRACK_ID).await?;

    download.assert_async().await;
    assert_eq!(url, format!("{}/api/file/track.mp3", server.url()));
    Ok(())
}

#[tokio::test]
async fn resolver_reports_backend_failures() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/search")
        .match_query(Matcher::Any)
        .with_body(json!({"songs": []}).to_string())
        .create_async()
        .await;

    let resolver = SpotdlResolver::new(&server.url()).unwrap();
    let error = resolver.resolve(TRACK_ID).await.unwrap_err();
    assert!(matches!(error, mfycache::CacheError::Resolution(_)));
    assert!(error.to_string().contains("Song not found"));

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/search")
        .match_query(Matcher::Any)
        .with_body(json!({"songs": [{"cached": false}]}).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/api/download")
        .match_query(Matcher::Any)
        .with_body(json!({"status": "error", "error": "No results found"}).to_string())
        .create_async()
        .await;

    let resolver = SpotdlResolver::new(&server.url()).unwrap();
    let error = resolver.resolve(TRACK_ID).await.unwrap_err();
    assert!(error.to_string().contains("No results found"));
}

#[tokio::test]
async fn search_route_requires_query() {
    let router = mfyspotify::api::create_router(Arc::new(
        SpotifyClient::with_endpoints("id", "secret", "http://127.0.0.1:9", "http://127.0.0.1:9")
            .unwrap(),
    ));

    let response = router
        .oneshot(Request::get("/api/search").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Missing query parameter");
}

#[tokio::test]
async fn track_route_returns_metadata() {
    let mut server = mockito::Server::new_async().await;
    mock_token(&mut server, 1).await;
    server
        .mock("GET", format!("/v1/tracks/{}", TRACK_ID).as_str())
        .with_body(track_json().to_string())
        .create_async()
        .await;

    let router = mfyspotify::api::create_router(Arc::new(client_for(&server)));
    let response = router
        .oneshot(
            Request::get(format!("/api/track/{}", TRACK_ID))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["name"], "Get Lucky");
    assert_eq!(body["album"]["name"], "Random Access Memories");
}
