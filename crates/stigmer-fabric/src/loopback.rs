//! In-memory bidirectional pipe listener.
//!
//! Each dial produces a fresh duplex pair: the server half is pushed to
//! the incoming stream the gRPC server accepts from, the client half
//! backs the hyper connection. gRPC sees a real listener; nothing leaves
//! the process.

use std::io;

use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

/// Per-connection buffer for the in-memory pipe.
const PIPE_BUFFER: usize = 1024 * 1024;

/// Stream of accepted in-memory connections, handed to
/// `serve_with_incoming`.
pub type LoopbackIncoming = UnboundedReceiverStream<io::Result<DuplexStream>>;

/// The dialer side of the in-memory listener.
#[derive(Clone)]
pub struct Loopback {
    tx: mpsc::UnboundedSender<io::Result<DuplexStream>>,
}

impl Loopback {
    /// Create the listener pair: the dialer handle and the incoming
    /// stream for the server.
    #[must_use]
    pub fn new() -> (Self, LoopbackIncoming) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }

    /// Dial a gRPC channel over the in-memory listener. The server must
    /// already be consuming the incoming stream.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the connection cannot be
    /// established (e.g. the server side was dropped).
    pub async fn dial(&self) -> Result<Channel, tonic::transport::Error> {
        let tx = self.tx.clone();
        // The URI is never resolved; the connector supplies the pipe.
        Endpoint::try_from("http://stigmer.loopback")?
            .connect_with_connector(service_fn(move |_: Uri| {
                let tx = tx.clone();
                async move {
                    let (client, server) = tokio::io::duplex(PIPE_BUFFER);
                    tx.send(Ok(server)).map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::ConnectionRefused,
                            "loopback listener closed",
                        )
                    })?;
                    Ok::<_, io::Error>(hyper_util::rt::TokioIo::new(client))
                }
            }))
            .await
    }
}

impl std::fmt::Debug for Loopback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loopback").finish_non_exhaustive()
    }
}
