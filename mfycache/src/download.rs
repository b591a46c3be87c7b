//! Transfert HTTP d'une source audio vers un fichier temporaire
//!
//! Le corps de la réponse est lu en flux (`bytes_stream`) et écrit chunk
//! par chunk ; un callback reçoit `(downloaded, total)` après chaque chunk.

use crate::error::{CacheError, Result};
use futures_util::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Timeout de connexion vers la source
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Silence maximal entre deux lectures du corps de la réponse
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Crée le client HTTP utilisé pour les transferts
///
/// Pas de timeout global : un morceau long sur une liaison lente doit
/// pouvoir aboutir. Une source qui cesse d'envoyer des octets pendant
/// [`READ_TIMEOUT`] fait en revanche échouer le transfert.
pub fn http_client() -> Result<reqwest::Client> {
    http_client_with_timeouts(CONNECT_TIMEOUT, READ_TIMEOUT)
}

/// Variante de [`http_client`] aux timeouts explicites
pub fn http_client_with_timeouts(connect: Duration, read: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(connect)
        .read_timeout(read)
        .user_agent(concat!("Musify/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Télécharge `url` dans `dest` et retourne le nombre d'octets écrits
///
/// # Arguments
///
/// * `client` - Client HTTP partagé
/// * `url` - URL de la source
/// * `dest` - Fichier de destination (créé ou tronqué)
/// * `on_progress` - Appelé avec `(downloaded, total)` après chaque chunk ;
///   `total` vaut 0 si le serveur n'annonce pas de taille
///
/// En cas d'erreur le fichier partiel est laissé en place : c'est à
/// l'appelant de le supprimer.
pub async fn fetch_to_file<F>(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    mut on_progress: F,
) -> Result<u64>
where
    F: FnMut(u64, u64) + Send,
{
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(CacheError::RemoteStatus {
            status: status.as_u16(),
        });
    }

    let total = response.content_length().unwrap_or(0);
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;
    let started = Instant::now();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        on_progress(downloaded, total);
    }

    file.flush().await?;
    file.sync_all().await?;

    debug!(
        "Fetched {} bytes in {:.1}s from {}",
        downloaded,
        started.elapsed().as_secs_f64(),
        url
    );
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_reports_progress() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![7u8; 4096];
        let mock = server
            .mock("GET", "/audio.mp3")
            .with_status(200)
            .with_body(&body)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.part");
        let client = http_client().unwrap();
        let mut calls = Vec::new();

        let written = fetch_to_file(
            &client,
            &format!("{}/audio.mp3", server.url()),
            &dest,
            |d, t| calls.push((d, t)),
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert_eq!(calls.last(), Some(&(4096, 4096)));
        assert!(calls.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.mp3")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.part");
        let client = http_client().unwrap();

        let result = fetch_to_file(
            &client,
            &format!("{}/missing.mp3", server.url()),
            &dest,
            |_, _| {},
        )
        .await;

        assert!(matches!(
            result,
            Err(CacheError::RemoteStatus { status: 404 })
        ));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_fetch_fails_when_source_stalls() {
        // Annonce 1000 octets, en envoie 4, puis garde la connexion muette
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let source = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\nabcd")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.part");
        let client =
            http_client_with_timeouts(Duration::from_secs(5), Duration::from_millis(200)).unwrap();

        let started = Instant::now();
        let result = fetch_to_file(
            &client,
            &format!("http://{}/stalled.mp3", addr),
            &dest,
            |_, _| {},
        )
        .await;

        assert!(matches!(result, Err(CacheError::Http(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
        source.abort();
    }
}
