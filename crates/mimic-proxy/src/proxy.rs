//! MITM proxy server.
//!
//! Wires the CA, the handler and the shared engine into a running hudsucker
//! proxy, either blocking in place or spawned with a shutdown handle.

use std::net::SocketAddr;
use std::sync::Arc;

use hudsucker::rustls::crypto::aws_lc_rs::default_provider;
use hudsucker::Proxy;
use tokio::sync::broadcast;

use mimic_core::{Cache, Settings, TrafficEngine};

use crate::ca::CaManager;
use crate::error::{ProxyError, Result};
use crate::handler::ProxyHandler;
use crate::DEFAULT_PROXY_PORT;

/// Proxy server configuration.
#[derive(Clone)]
pub struct ProxyConfig {
    /// Address to bind the proxy to.
    pub addr: SocketAddr,
    /// The CA manager for certificate generation.
    pub ca_manager: CaManager,
    /// Runtime settings shared with the engine.
    pub settings: Arc<Settings>,
    /// The capture store.
    pub cache: Arc<dyn Cache>,
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("addr", &self.addr)
            .field("ca_manager", &self.ca_manager)
            .field("settings", &self.settings)
            .field("cache", &"Cache")
            .finish()
    }
}

impl ProxyConfig {
    /// Creates a configuration bound to localhost on the default port.
    pub fn new(settings: Arc<Settings>, cache: Arc<dyn Cache>) -> Result<Self> {
        let ca_manager = CaManager::with_default_dir().map_err(ProxyError::Ca)?;

        Ok(Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PROXY_PORT)),
            ca_manager,
            settings,
            cache,
        })
    }

    /// Sets the listen address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the port (uses 127.0.0.1 as host).
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr = SocketAddr::from(([127, 0, 0, 1], port));
        self
    }

    /// Sets the CA manager.
    pub fn with_ca_manager(mut self, ca_manager: CaManager) -> Self {
        self.ca_manager = ca_manager;
        self
    }
}

/// MITM proxy server for capture and replay.
pub struct ProxyServer {
    config: ProxyConfig,
    engine: Arc<TrafficEngine>,
}

impl ProxyServer {
    /// Creates a new proxy server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        // Ensure CA exists (will generate if missing)
        config.ca_manager.ensure_ca().map_err(ProxyError::Ca)?;

        let engine = Arc::new(TrafficEngine::new(
            config.settings.clone(),
            config.cache.clone(),
        )?);

        Ok(Self { config, engine })
    }

    /// Returns the address the proxy is configured to listen on.
    pub fn addr(&self) -> SocketAddr {
        self.config.addr
    }

    /// Returns the CA certificate path for client installation.
    pub fn ca_cert_path(&self) -> std::path::PathBuf {
        self.config.ca_manager.cert_path()
    }

    /// Returns the shared engine.
    pub fn engine(&self) -> &Arc<TrafficEngine> {
        &self.engine
    }

    /// Starts the proxy server.
    ///
    /// This will block until the server is shut down.
    pub async fn run(self) -> Result<()> {
        let authority = self.config.ca_manager.ensure_ca().map_err(ProxyError::Ca)?;
        let handler = ProxyHandler::new(self.engine.clone(), self.config.settings.clone());

        tracing::info!(
            addr = %self.config.addr,
            mode = %self.config.settings.mode,
            "starting proxy"
        );
        tracing::info!("CA certificate: {:?}", self.ca_cert_path());

        let proxy = Proxy::builder()
            .with_addr(self.config.addr)
            .with_ca(authority)
            .with_rustls_connector(default_provider())
            .with_http_handler(handler)
            .build()
            .map_err(|e| ProxyError::Proxy(e.to_string()))?;

        proxy
            .start()
            .await
            .map_err(|e| ProxyError::Proxy(e.to_string()))?;

        tracing::info!("proxy stopped");
        Ok(())
    }

    /// Starts the proxy server in the background.
    ///
    /// Returns a handle that can be used to stop the server.
    pub fn start(self) -> Result<ProxyHandle> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let shutdown_tx_clone = shutdown_tx.clone();
        let addr = self.config.addr;

        let authority = self.config.ca_manager.ensure_ca().map_err(ProxyError::Ca)?;
        let handler = ProxyHandler::new(self.engine.clone(), self.config.settings.clone());

        let handle = tokio::spawn(async move {
            let proxy = match Proxy::builder()
                .with_addr(addr)
                .with_ca(authority)
                .with_rustls_connector(default_provider())
                .with_http_handler(handler)
                .build()
            {
                Ok(proxy) => proxy,
                Err(err) => {
                    tracing::error!(error = %err, "failed to build proxy");
                    return;
                }
            };

            let mut shutdown_rx = shutdown_tx.subscribe();

            tokio::select! {
                result = proxy.start() => {
                    if let Err(err) = result {
                        tracing::error!(error = %err, "proxy error");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("proxy shutdown signal received");
                }
            };
        });

        Ok(ProxyHandle {
            shutdown_tx: shutdown_tx_clone,
            addr,
            handle,
        })
    }
}

/// Handle for controlling a running proxy server.
pub struct ProxyHandle {
    shutdown_tx: broadcast::Sender<()>,
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl ProxyHandle {
    /// Returns the address the proxy is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signals the proxy to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Waits for the proxy to finish.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }

    /// Shuts down the proxy and waits for it to finish.
    pub async fn stop(self) {
        self.shutdown();
        self.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_core::Mode;
    use mimic_storage::CaptureStore;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> ProxyConfig {
        let settings =
            Arc::new(Settings::new(Mode::Virtualize, ".", None, None, false).unwrap());
        let cache: Arc<dyn Cache> = Arc::new(CaptureStore::in_memory().unwrap());

        ProxyConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)), // Random port
            ca_manager: CaManager::new(temp_dir.path().join("ca")),
            settings,
            cache,
        }
    }

    #[test]
    fn proxy_config_with_port() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir).with_port(8888);
        assert_eq!(config.addr.port(), 8888);
    }

    #[test]
    fn proxy_config_with_addr() {
        let temp_dir = TempDir::new().unwrap();
        let addr = SocketAddr::from(([0, 0, 0, 0], 9999));
        let config = test_config(&temp_dir).with_addr(addr);
        assert_eq!(config.addr, addr);
    }

    #[test]
    fn proxy_server_new_generates_ca() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let server = ProxyServer::new(config).unwrap();

        assert!(server
            .ca_cert_path()
            .to_string_lossy()
            .contains("mimic-ca.crt"));
        assert!(server.ca_cert_path().exists());
    }

    #[tokio::test]
    async fn proxy_handle_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let server = ProxyServer::new(config).unwrap();

        let handle = server.start().unwrap();

        // Give it a moment to start
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        handle.stop().await;
    }
}
