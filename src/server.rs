use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, field, info, instrument, warn};

use crate::commands;
use crate::config::Config;
use crate::connection::Connection;
use crate::frame::{Response, ReturnCode};
use crate::rate_limiter::RateLimiter;
use crate::store::Store;
use crate::Error;

// Pause after a failed accept, e.g. when the process is out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Installs the tracing subscriber, binds the listener and serves until `shutdown` completes.
pub async fn run(config: Config, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let server = Server::bind(config).await?;
    server.serve(shutdown).await
}

pub struct Server {
    listener: TcpListener,
    store: Store,
    limiter: Arc<RateLimiter>,
    // One permit per connection being handled.
    admission: Arc<Semaphore>,
    handlers: TaskTracker,
    request_timeout: Duration,
}

impl Server {
    /// Binds the listener and starts the rate limiter's sweep task.
    pub async fn bind(config: Config) -> Result<Server, Error> {
        let listener = TcpListener::bind(&config.address).await?;

        Ok(Server {
            listener,
            store: Store::with_mode(config.initial_mode),
            limiter: Arc::new(RateLimiter::new(&config.limiter)),
            admission: Arc::new(Semaphore::new(config.max_clients.max(1))),
            handlers: TaskTracker::new(),
            request_timeout: config.request_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> Store {
        self.store.clone()
    }

    /// Accepts connections until `shutdown` completes, then closes the listener, stops the rate
    /// limiter and waits for every in-flight handler to finish.
    ///
    /// A permit is taken before each accept, so once `max_clients` connections are in flight the
    /// loop stops accepting and new clients queue up in the OS backlog.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
        tokio::pin!(shutdown);

        info!("iproto server listening on {}", self.listener.local_addr()?);

        loop {
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                permit = self.admission.clone().acquire_owned() => permit?,
            };

            let (socket, client_address) = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            debug!("Accepted connection from {:?}", client_address);

            let handler = Handler {
                store: self.store.clone(),
                limiter: self.limiter.clone(),
                request_timeout: self.request_timeout,
            };
            self.handlers.spawn(handler.run(socket, client_address, permit));
        }

        info!("Shutting down");

        drop(self.listener);
        self.admission.close();
        self.limiter.shutdown().await;

        self.handlers.close();
        self.handlers.wait().await;

        info!("Server stopped");
        Ok(())
    }
}

struct Handler {
    store: Store,
    limiter: Arc<RateLimiter>,
    request_timeout: Duration,
}

impl Handler {
    /// Handles the connection within the request timeout. When the timeout fires, pending reads and
    /// writes are cancelled and the socket is closed without a response.
    async fn run(
        self,
        stream: TcpStream,
        client_address: SocketAddr,
        permit: OwnedSemaphorePermit,
    ) {
        let _permit = permit;

        let handled = time::timeout(
            self.request_timeout,
            self.handle_connection(stream, client_address),
        )
        .await;

        match handled {
            Ok(Ok(())) => debug!("Handler for {} finished", client_address),
            Ok(Err(e)) => error!("Connection error from {}: {}", client_address, e),
            Err(_) => warn!(
                "Handler for {} timed out after {:?}",
                client_address, self.request_timeout
            ),
        }
    }

    #[instrument(
        name = "connection",
        skip(self, stream, client_address),
        fields(connection_id, client_address)
    )]
    async fn handle_connection(
        &self,
        stream: TcpStream,
        client_address: SocketAddr,
    ) -> Result<(), Error> {
        let mut conn = Connection::new(stream, client_address);

        tracing::Span::current()
            .record("connection_id", field::display(conn.id))
            .record("client_address", field::display(client_address));

        if !conn.read_packet().await? {
            debug!("Client closed the connection without sending a request");
            return Ok(());
        }

        let header = conn.header();
        if let Some(header) = &header {
            debug!("Received header {}", header);
        }

        let response = if !self.limiter.admit(&client_address.ip().to_string()) {
            warn!("Rate limit exceeded");
            Response::failure(header, ReturnCode::TooManyRequests, "Too many requests")
        } else {
            match conn.decode_request() {
                Ok(request) => {
                    info!("Received request from client: {:?}", request);
                    commands::dispatch(request, &self.store)
                }
                Err(e) => {
                    warn!("Invalid request: {}", e);
                    Response::failure(
                        header,
                        ReturnCode::InvalidBody,
                        "Invalid body in request packet",
                    )
                }
            }
        };

        info!("Sending response to client: {:?}", response);
        conn.write_response(response).await?;

        Ok(())
    }
}
