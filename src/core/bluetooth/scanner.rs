//! Discovery of nearby watches

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::{DEFAULT_EVENT_BUFFER, UUID_ADVERTISED_SERVICE};
use crate::core::bluetooth::transport::TransportError;
use crate::core::bluetooth::types::DiscoveredWatch;

/// Finds watches advertising the companion service
pub struct WatchScanner {
    adapter: Adapter,
    devices: Arc<Mutex<HashMap<String, Device>>>,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
}

impl WatchScanner {
    /// `devices` is shared with the transport, which connects to what the
    /// scanner found.
    pub fn new(adapter: Adapter, devices: Arc<Mutex<HashMap<String, Device>>>) -> Self {
        Self {
            adapter,
            devices,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    /// Starts scanning. Watches are delivered on the returned channel until
    /// [`WatchScanner::stop_scan`] is called or the adapter ends the scan.
    pub async fn start_scan(&mut self) -> Result<mpsc::Receiver<DiscoveredWatch>, TransportError> {
        if self.scan_task_handle.is_some() {
            self.stop_scan().await;
        }
        self.devices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();

        let (tx, rx) = mpsc::channel(DEFAULT_EVENT_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();

        self.cancel_token = CancellationToken::new();
        let cancel_token = self.cancel_token.clone();
        let adapter = self.adapter.clone();
        let devices = self.devices.clone();

        self.scan_task_handle = Some(tokio::spawn(async move {
            let mut scan_stream = match adapter.scan(&[UUID_ADVERTISED_SERVICE]).await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(TransportError::from(e)));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    result = scan_stream.next() => match result {
                        Some(discovered) => {
                            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered.device, discovered.rssi);
                            let watch = Self::register(&devices, discovered.device);
                            if tx.send(watch).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    },
                }
            }
        }));

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(TransportError::Io("scan task ended".to_string())),
        }

        info!("Watch scan started.");
        Ok(rx)
    }

    pub async fn stop_scan(&mut self) {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();

        if let Some(handle) = self.scan_task_handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Scan task finished with an unexpected join error: {:?}", e);
                }
            }
        }
    }

    fn register(devices: &Mutex<HashMap<String, Device>>, device: Device) -> DiscoveredWatch {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let id = device.id().to_string();
        let address = extract_mac_address(&id).unwrap_or(id);
        info!("Found watch: Address: {}, Name: {}", address, name);

        devices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(address.clone(), device);
        DiscoveredWatch::new(name, address)
    }
}

/// Pulls a MAC address out of a platform device id, upper-cased.
fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}
