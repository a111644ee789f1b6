use std::future::Future;

use crate::error::{AppError, AppResult};

pub(crate) fn run_async_test<F>(future: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::validation(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}

/// Binds an ephemeral loopback port, releases it and hands back the number.
pub(crate) fn allocate_port() -> AppResult<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Minimal HTTP/1.1 server answering every request with `status` and a
/// two-byte body. Dropping the returned sender stops it.
pub(crate) async fn spawn_http_server(
    status: u16,
) -> AppResult<(String, tokio::sync::watch::Sender<bool>)> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let response = format!(
        "HTTP/1.1 {} TEST\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK",
        status
    );

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                accept = listener.accept() => {
                    let Ok((mut socket, _peer)) = accept else {
                        break;
                    };
                    let response = response.clone();
                    tokio::spawn(async move {
                        let mut buffer = [0u8; 1024];
                        if socket.read(&mut buffer).await.is_err() {
                            return;
                        }
                        drop(socket.write_all(response.as_bytes()).await);
                        drop(socket.shutdown().await);
                    });
                }
            }
        }
    });

    Ok((format!("http://{}/", addr), shutdown_tx))
}

/// Sink keeping every delivered batch in memory.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) batches: tokio::sync::Mutex<Vec<crate::telemetry::TelemetryBatch>>,
}

#[async_trait::async_trait]
impl crate::telemetry::BatchSink for RecordingSink {
    async fn deliver(&self, batch: crate::telemetry::TelemetryBatch) -> AppResult<()> {
        self.batches.lock().await.push(batch);
        Ok(())
    }
}

impl RecordingSink {
    /// Every delivered record, merged section by section.
    pub(crate) async fn merged(&self) -> crate::telemetry::TelemetryBatch {
        let mut merged = crate::telemetry::TelemetryBatch::default();
        for batch in self.batches.lock().await.iter() {
            let mut copy = batch.clone();
            merged.append(&mut copy);
        }
        merged
    }
}
