use crate::config::Config;
use crate::error::{BlockchainError, Result};
use crate::network::api;
use crate::network::http::{Request, Response};
use crate::network::node::NodeService;
use crate::network::protocol::{self, Message};
use http::StatusCode;
use log::{debug, error, info, warn};
use std::io::{self, BufRead};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

const TCP_READ_TIMEOUT: u64 = 60;

/// Listens on one port for both JACKIE peers and HTTP clients
pub struct Server {
    listener: TcpListener,
    node: NodeService,
}

impl Server {
    /// Bind the listening socket and build the node around it. A port of 0
    /// is replaced by the one the OS picked, so peers get a dialable address.
    pub fn bind(mut config: Config) -> Result<Server> {
        config.validate()?;
        let addr = format!("0.0.0.0:{}", config.get_port());
        let listener = TcpListener::bind(&addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        let local = listener.local_addr()?;
        config.set_port(local.port());

        info!("Node {} listening on {local}", config.get_node_id());
        Ok(Server {
            listener,
            node: NodeService::new(config),
        })
    }

    pub fn node(&self) -> &NodeService {
        &self.node
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the background workers, join the network if asked to, then
    /// accept connections until the process exits.
    pub fn run(&self) -> Result<()> {
        let config = self.node.get_config();

        self.enter_network()?;
        if config.is_miner() {
            self.start_miner();
        }
        if config.is_console() {
            self.start_console();
        }
        self.start_signal_watcher();

        self.serve()
    }

    /// Join the configured peer, or seed a fresh chain when there is none.
    /// An unreachable peer is logged and the node keeps serving on its own.
    pub fn enter_network(&self) -> Result<()> {
        match self.node.get_config().get_join_address() {
            Some(join) => {
                if let Err(e) = self.node.join(join) {
                    error!("Failed to join the network through {join}: {e}");
                }
            }
            None => {
                if let Some(block) = self.node.seed_chain()? {
                    info!("Seeded a new chain with block {}", block.get_hash());
                }
            }
        }
        Ok(())
    }

    /// Accept loop only, without the background workers.
    pub fn serve(&self) -> Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };

                    let node = self.node.clone();
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(&node, stream) {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }

    /// Read the opening line, decide between HTTP and JACKIE, and handle the
    /// one request the connection carries.
    fn handle_connection(node: &NodeService, mut stream: TcpStream) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_secs(TCP_READ_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

        let opening = protocol::read_opening(&mut stream)?;
        if opening.is_empty() {
            return Ok(());
        }
        let first = opening.as_slice();

        if protocol::is_http(first) {
            let response = match Request::read(&mut stream, first) {
                Ok(request) => {
                    debug!("{} {}", request.method(), request.path());
                    api::route(node, &request)
                }
                Err(e) => Response::error(StatusCode::BAD_REQUEST, &e.to_string()),
            };
            response.write_to(&mut stream)?;
        } else {
            let frame = protocol::read_frame(&mut stream, first)?;
            if node.get_config().is_verbose() {
                debug!("Received frame: {}", frame.trim_end());
            }
            let message = Message::decode(&frame)?;
            info!("Received {}", message.action());
            node.handle_message(message)?;
        }

        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    fn start_miner(&self) {
        let node = self.node.clone();
        let interval = node.get_config().get_mining_interval();

        thread::spawn(move || loop {
            thread::sleep(interval);
            match node.mine_tick() {
                Ok(Some(block)) => info!("New block {} is mined!", block.get_hash()),
                Ok(None) => debug!("Nothing to mine"),
                Err(e) => error!("Mining failed: {e}"),
            }
        });
    }

    // Every stdin line goes out to the neighbors as a MESSAGE
    fn start_console(&self) {
        let node = self.node.clone();

        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Console read failed: {e}");
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = node.broadcast_text(line) {
                    error!("Failed to broadcast message: {e}");
                }
            }
        });
    }

    // Ctrl-C or SIGTERM: say goodbye to every neighbor, then exit
    fn start_signal_watcher(&self) {
        let node = self.node.clone();

        thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start signal watcher: {e}");
                    return;
                }
            };

            runtime.block_on(wait_for_shutdown());
            info!("Shutting down node {}", node.node_id());
            if let Err(e) = node.terminate() {
                error!("Failed to notify peers: {e}");
            }
            std::process::exit(0);
        });
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = terminate.recv() => {},
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn test_server() -> Server {
        let mut config = Config::new();
        config.set_port(0);
        config.set_difficulty(1);
        Server::bind(config).unwrap()
    }

    #[test]
    fn test_bind_picks_free_port() {
        let server = test_server();
        let port = server.local_addr().unwrap().port();
        assert_ne!(port, 0);
        assert_eq!(server.node().get_config().get_port(), port);
    }

    #[test]
    fn test_bind_rejects_invalid_config() {
        let mut config = Config::new();
        config.set_port(0);
        config.set_difficulty(100);
        assert!(matches!(
            Server::bind(config),
            Err(BlockchainError::Config(_))
        ));
    }

    #[test]
    fn test_http_and_jackie_share_the_port() {
        let server = test_server();
        let port = server.local_addr().unwrap().port();
        let node = server.node().clone();
        thread::spawn(move || server.serve());

        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .write_all(b"GET /info HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains(node.node_id()));

        protocol::send(
            &format!("127.0.0.1:{port}"),
            &Message::Connect {
                id: "peer".to_string(),
                host: "127.0.0.1".to_string(),
                port: 1,
            },
        )
        .unwrap();

        let mut registered = false;
        for _ in 0..50 {
            if node.read_state(|s| s.peers.contains("peer")).unwrap() {
                registered = true;
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(registered);
    }

    #[test]
    fn test_unreachable_join_peer_is_not_fatal() {
        let mut config = Config::new();
        config.set_port(0);
        config.set_difficulty(1);
        // Nothing listens on port 1
        config.set_join_address("127.0.0.1:1".to_string());
        let server = Server::bind(config).unwrap();

        assert!(server.enter_network().is_ok());
        assert!(server.node().read_state(|s| s.peers.is_empty()).unwrap());
    }

    #[test]
    fn test_request_line_split_across_writes() {
        let server = test_server();
        let port = server.local_addr().unwrap().port();
        thread::spawn(move || server.serve());

        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.set_nodelay(true).unwrap();
        stream.write_all(b"GET /ch").unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(100));
        stream.write_all(b"ain HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
    }
}
