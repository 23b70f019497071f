use crate::config::ServerContext;
use crate::constants::SHUTDOWN_NOTICE;
use crate::core_command::handlers::{dispatch_command, Flow};
use crate::core_error::ConnectionError;
use crate::core_network::transport::Connection;
use crate::session::Session;
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Listening socket plus the immutable context handed to every session.
pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
}

impl Server {
    pub async fn bind(addr: &str, context: ServerContext) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        Ok(Self {
            listener,
            context: Arc::new(context),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` resolves, then tells every live
    /// session to stop, waits up to the grace period for them, aborts the
    /// stragglers and closes the listener.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, context } = self;
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        info!(
            "Server listening on {} and serving {}",
            listener.local_addr()?,
            context.base_dir.display()
        );

        loop {
            let accepted = select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => accepted,
                Some(finished) = sessions.join_next() => {
                    if let Err(e) = finished {
                        error!("Session task failed: {}", e);
                    }
                    continue;
                }
            };

            match accepted {
                Ok((socket, addr)) => {
                    info!("New connection from {:?}", addr);
                    let context = Arc::clone(&context);
                    let stop_rx = stop_rx.clone();
                    sessions.spawn(async move {
                        if let Err(e) = handle_connection(socket, context, stop_rx).await {
                            warn!("Connection error for {:?}: {}", addr, e);
                        }
                        info!("Connection closed for {:?}", addr);
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            }
        }

        info!(
            "Server will shut down in {} seconds ({} live session(s)).",
            context.shutdown_grace.as_secs(),
            sessions.len()
        );
        // Receivers only ever see `true`; a send error just means no session is left.
        let _ = stop_tx.send(true);

        let drained = timeout(context.shutdown_grace, async {
            while let Some(finished) = sessions.join_next().await {
                if let Err(e) = finished {
                    error!("Session task failed: {}", e);
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "Grace period over, aborting {} session(s)",
                sessions.len()
            );
            sessions.shutdown().await;
        }

        drop(listener);
        info!("Server stopped.");
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install ctrl-c handler: {}", e);
            }
        })
        .await
    }
}

pub async fn handle_connection(
    socket: TcpStream,
    context: Arc<ServerContext>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let mut conn = Connection::with_max_message_size(socket, context.max_message_size);
    let mut session = Session::new(context.base_dir.clone());
    run_session(&mut conn, &mut session, &context, &mut stop).await
}

enum Event {
    Message(Result<Vec<u8>, ConnectionError>),
    Stop,
}

/// Command loop of one connection: receive, dispatch, repeat.
///
/// Ends on `exit`, when the peer goes away, or when `stop` flips to `true`.
/// In the last case the client gets the shutdown notice before the close.
pub async fn run_session<S>(
    conn: &mut Connection<S>,
    session: &mut Session,
    context: &ServerContext,
    stop: &mut watch::Receiver<bool>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let stopping = *stop.borrow();
        let event = if stopping {
            Event::Stop
        } else {
            select! {
                changed = stop.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => Event::Stop,
                },
                message = conn.receive() => Event::Message(message),
            }
        };

        let message = match event {
            Event::Stop => {
                info!("Notifying client of shutdown");
                if let Err(e) = conn.send_text(SHUTDOWN_NOTICE).await {
                    warn!("Failed to send shutdown notice: {}", e);
                }
                return Ok(());
            }
            Event::Message(Ok(message)) => message,
            Event::Message(Err(ConnectionError::PeerClosed)) => {
                info!("Client disconnected");
                return Ok(());
            }
            Event::Message(Err(e)) => return Err(e),
        };

        let line = String::from_utf8_lossy(&message).into_owned();
        info!("Received command: {}", line);
        if dispatch_command(conn, session, context, &line).await? == Flow::Close {
            return Ok(());
        }
    }
}
