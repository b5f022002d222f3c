use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::codec::FrameCodec;
use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::config::Config;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::session::Session;
use crate::store::Store;
use crate::Error;

/// Pause after a failed `accept`, which usually means the process ran out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long connections get to finish their last reply once the server is shutting down.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Binds the configured address and serves clients until the process receives SIGINT or SIGTERM.
pub async fn run(config: Config) -> crate::Result<()> {
    let listener = TcpListener::bind(config.addr()).await?;
    serve(listener, config, shutdown_signal()).await
}

/// Serves the clients accepted on `listener` until `shutdown` completes.
///
/// The keyspace is created here and shared by every connection. On shutdown the listener is
/// closed first, then each connection finishes the command it is running, writes the reply and
/// hangs up. Connections still busy after `SHUTDOWN_GRACE`, usually because the client stopped
/// reading, are dropped. The function returns once every connection is gone.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: impl Future<Output = ()>,
) -> crate::Result<()> {
    let store = Store::with_shards(config.shards);
    let password: Option<Arc<str>> = config.requirepass.as_deref().map(Arc::from);
    let codec = FrameCodec::new(config.max_frame_size);

    let token = CancellationToken::new();
    let abort = CancellationToken::new();
    let tracker = TaskTracker::new();

    info!(
        address = %listener.local_addr()?,
        shards = store.shard_count(),
        auth = password.is_some(),
        "Server listening"
    );

    tokio::pin!(shutdown);

    loop {
        let (socket, client_address) = tokio::select! {
            res = listener.accept() => match res {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        debug!("Accepted connection from {}", client_address);

        let conn = Connection::new(socket, client_address, codec.clone());
        let session = Session::new(password.clone());
        let store = store.clone();
        let signals = Shutdown {
            graceful: token.clone(),
            abort: abort.clone(),
        };

        tracker.spawn(async move {
            if let Err(e) = handle_connection(conn, store, session, signals).await {
                debug!("Connection closed with error: {}", e);
            }
        });
    }

    drop(listener);
    info!("Shutting down, {} connections still open", tracker.len());

    // A yielded task resumes only after the runtime polled for I/O, so connections see requests
    // that reached their socket before the shutdown.
    tokio::task::yield_now().await;

    token.cancel();
    tracker.close();

    if timeout(SHUTDOWN_GRACE, tracker.wait()).await.is_err() {
        warn!(
            "Dropping {} connections that did not close in time",
            tracker.len()
        );
        abort.cancel();
        tracker.wait().await;
    }

    info!("Server stopped");
    Ok(())
}

#[instrument(
    name = "connection",
    skip_all,
    fields(connection_id = %conn.id, client_address = %conn.client_address)
)]
async fn handle_connection(
    mut conn: Connection,
    store: Store,
    mut session: Session,
    shutdown: Shutdown,
) -> Result<(), Error> {
    loop {
        if shutdown.abort.is_cancelled() {
            debug!("Shutdown grace period expired");
            break;
        }

        // Only a connection waiting for its next request is interrupted by a shutdown. Requests
        // that already reached the socket are read first and get their reply.
        let frame = tokio::select! {
            biased;
            res = conn.read_frame() => res,
            _ = shutdown.graceful.cancelled() => {
                debug!("Server shutting down");
                break;
            }
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) if e.is_io() => return Err(e.into()),
            Err(e) => {
                warn!("Closing connection: {}", e);
                // Best effort, the connection is closed either way.
                let reply = Frame::Error(format!("ERR {}", e));
                let _ = write_reply(&mut conn, reply, &shutdown).await;
                return Ok(());
            }
        };

        trace!("Received frame from client: {}", frame);
        let res = execute(frame, &store, &mut session);
        trace!("Sending response to client: {}", res);

        write_reply(&mut conn, res, &shutdown).await?;

        if session.is_closing() {
            break;
        }
    }

    debug!("Connection closed");
    Ok(())
}

/// Cancellation signals handed to every connection.
struct Shutdown {
    /// Stop reading new requests.
    graceful: CancellationToken,
    /// Stop whatever the connection is doing, fired `SHUTDOWN_GRACE` after `graceful`.
    abort: CancellationToken,
}

/// Writes a reply unless the connection is aborted first. A client that stopped reading leaves
/// the write pending until then.
async fn write_reply(
    conn: &mut Connection,
    frame: Frame,
    shutdown: &Shutdown,
) -> Result<(), Error> {
    tokio::select! {
        res = conn.write_frame(frame) => Ok(res?),
        _ = shutdown.abort.cancelled() => {
            Err("connection aborted by shutdown while writing".into())
        }
    }
}

fn execute(frame: Frame, store: &Store, session: &mut Session) -> Frame {
    match Command::try_from(frame) {
        Ok(cmd) if cmd.requires_auth() && !session.is_authenticated() => {
            Frame::Error("NOAUTH Authentication required.".to_string())
        }
        Ok(cmd) => {
            trace!(command = cmd.name(), "Executing command");
            cmd.exec(store, session)
        }
        Err(e) => Frame::from(e),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
