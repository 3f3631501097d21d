// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SSH port forwarding via `russh`.
//!
//! A local TCP listener accepts connections and forwards each one through a
//! `direct-tcpip` channel to the database host as seen from the SSH server.
//! Nothing listens until authentication succeeds, so a failed setup leaves
//! no partial forward behind.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::Disconnect;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::auth::TunnelAuth;
use super::{TunnelConnector, TunnelError, TunnelTransport};
use crate::config::TunnelConfig;

/// Opens real SSH tunnels.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshConnector;

struct ClientHandler {
    host: String,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    // TODO: verify against a known_hosts file once GRM_TUNNEL_KNOWN_HOSTS is plumbed through
    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting SSH host key"
        );
        Ok(true)
    }
}

#[async_trait]
impl TunnelConnector for SshConnector {
    async fn open(
        &self,
        config: &TunnelConfig,
        auth: &TunnelAuth,
    ) -> Result<Box<dyn TunnelTransport>, TunnelError> {
        let host = config.ssh_host.clone().unwrap_or_default();
        let user = config.ssh_user.clone().unwrap_or_default();

        let ssh_config = Arc::new(client::Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let handler = ClientHandler { host: host.clone() };

        let mut session = client::connect(ssh_config, (host.as_str(), config.ssh_port), handler)
            .await
            .map_err(|e| TunnelError::Transport(format!("{}:{}: {}", host, config.ssh_port, e)))?;

        let accepted = match auth {
            TunnelAuth::KeyFile { path, passphrase } => {
                let key = russh_keys::load_secret_key(path, passphrase.as_deref()).map_err(|e| {
                    TunnelError::Authentication(format!("cannot load key {}: {}", path.display(), e))
                })?;
                session.authenticate_publickey(user.as_str(), Arc::new(key)).await
            }
            TunnelAuth::Password(password) => {
                session.authenticate_password(user.as_str(), password.as_str()).await
            }
        }
        .map_err(|e| TunnelError::Transport(e.to_string()))?;

        if !accepted {
            let _ = session
                .disconnect(Disconnect::ByApplication, "authentication rejected", "en")
                .await;
            return Err(TunnelError::Authentication(format!(
                "{} authentication rejected for user {}",
                auth.method(),
                user
            )));
        }

        let listener = TcpListener::bind((config.local_bind_host.as_str(), config.local_bind_port))
            .await
            .map_err(|e| {
                TunnelError::Bind(format!(
                    "{}:{}: {}",
                    config.local_bind_host, config.local_bind_port, e
                ))
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TunnelError::Bind(e.to_string()))?;

        let session = Arc::new(session);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            session.clone(),
            config.remote_bind_host.clone(),
            config.remote_bind_port,
            shutdown_rx,
        ));

        info!(
            ssh_host = %host,
            local = %local_addr,
            remote = %format!("{}:{}", config.remote_bind_host, config.remote_bind_port),
            "SSH port forward listening"
        );

        Ok(Box::new(SshTransport {
            local_addr,
            session,
            shutdown: shutdown_tx,
            accept_task: Some(accept_task),
        }))
    }
}

struct SshTransport {
    local_addr: SocketAddr,
    session: Arc<client::Handle<ClientHandler>>,
    shutdown: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl TunnelTransport for SshTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn close(&mut self) -> Result<(), TunnelError> {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| TunnelError::Transport(e.to_string()))
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    session: Arc<client::Handle<ClientHandler>>,
    remote_host: String,
    remote_port: u16,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let session = session.clone();
                    let remote_host = remote_host.clone();
                    tokio::spawn(async move {
                        if let Err(e) = forward(session, socket, peer, &remote_host, remote_port).await {
                            warn!(peer = %peer, error = %e, "Tunnel forward ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "Tunnel listener accept failed"),
            },
        }
    }
    debug!("Tunnel listener stopped");
}

async fn forward(
    session: Arc<client::Handle<ClientHandler>>,
    mut socket: TcpStream,
    peer: SocketAddr,
    remote_host: &str,
    remote_port: u16,
) -> Result<(), TunnelError> {
    let channel = session
        .channel_open_direct_tcpip(
            remote_host,
            u32::from(remote_port),
            peer.ip().to_string(),
            u32::from(peer.port()),
        )
        .await
        .map_err(|e| TunnelError::Transport(e.to_string()))?;
    let mut stream = channel.into_stream();
    let (up, down) = tokio::io::copy_bidirectional(&mut socket, &mut stream)
        .await
        .map_err(|e| TunnelError::Transport(e.to_string()))?;
    debug!(peer = %peer, bytes_up = up, bytes_down = down, "Tunnel forward closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Grab a free port and release it so nothing is listening there
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let config = TunnelConfig {
            enabled: true,
            ssh_host: Some("127.0.0.1".into()),
            ssh_port: port,
            ssh_user: Some("ops".into()),
            ssh_password: Some("pw".into()),
            ..Default::default()
        };
        let result = SshConnector
            .open(&config, &TunnelAuth::Password("pw".into()))
            .await;
        assert!(matches!(result, Err(TunnelError::Transport(_))));
    }
}
