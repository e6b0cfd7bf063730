use std::{convert::Infallible, future::Future, sync::Arc};

use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use super::ControlSurface;

/// Serves `surface` on `listener` until `shutdown` resolves. Connections already accepted keep
/// running on their own tasks.
pub async fn serve<F>(listener: TcpListener, surface: Arc<ControlSurface>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(target: "logswitch", "failed accepting control connection: {}", err);
                        continue;
                    }
                };

                let surface = surface.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let surface = surface.clone();
                        async move { Ok::<_, Infallible>(surface.handle(req).await) }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        tracing::debug!(target: "logswitch", peer = %peer, "control connection closed: {}", err);
                    }
                });
            }
        }
    }

    tracing::info!(target: "logswitch", "control surface stopped");
}
