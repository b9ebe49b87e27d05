//! Bluetooth LE transport backed by bluest
//! Connects with retry, hands out numeric handles for discovered
//! characteristics and runs one forwarding task per subscription.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bluest::error::ErrorKind;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::bluetooth::transport::{
    CharacteristicHandle, GattCharacteristic, GattService, NotificationStream, RetryPolicy,
    Transport, TransportError, WriteMode,
};

/// Depth of each notification queue between bluest and the session
const NOTIFICATION_QUEUE: usize = 64;

impl From<bluest::Error> for TransportError {
    fn from(error: bluest::Error) -> Self {
        match error.kind() {
            ErrorKind::AdapterUnavailable => TransportError::Unavailable,
            ErrorKind::NotConnected => TransportError::Disconnected,
            ErrorKind::Timeout => TransportError::Timeout,
            ErrorKind::NotFound => TransportError::NotFound(error.to_string()),
            _ => TransportError::Io(error.to_string()),
        }
    }
}

#[derive(Default)]
struct Link {
    device: Option<Device>,
    next_handle: u64,
    characteristics: HashMap<CharacteristicHandle, Characteristic>,
    subscriptions: HashMap<CharacteristicHandle, JoinHandle<()>>,
}

impl Link {
    fn characteristic(&self, handle: CharacteristicHandle) -> Result<Characteristic, TransportError> {
        self.characteristics
            .get(&handle)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("handle {}", handle.0)))
    }

    fn device(&self) -> Result<Device, TransportError> {
        self.device.clone().ok_or(TransportError::Disconnected)
    }

    fn release(&mut self) {
        for (_, task) in self.subscriptions.drain() {
            task.abort();
        }
        self.characteristics.clear();
    }
}

/// A [`Transport`] over the host's Bluetooth adapter
pub struct BluestTransport {
    adapter: Adapter,
    /// Devices seen by the scanner, keyed by address
    devices: Arc<Mutex<HashMap<String, Device>>>,
    link: Mutex<Link>,
}

impl BluestTransport {
    pub fn new(adapter: Adapter, devices: Arc<Mutex<HashMap<String, Device>>>) -> Self {
        Self {
            adapter,
            devices,
            link: Mutex::new(Link::default()),
        }
    }

    /// Opens the system's default adapter and waits for it to power on.
    pub async fn default_adapter() -> Result<Adapter, TransportError> {
        let adapter = Adapter::default()
            .await
            .ok_or(TransportError::Unavailable)?;
        adapter.wait_available().await?;
        Ok(adapter)
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn find_device(&self, address: &str) -> Result<Device, TransportError> {
        self.devices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("device {}", address)))
    }

    async fn try_connect(&self, device: &Device, timeout: Duration) -> Result<(), TransportError> {
        if device.is_connected().await {
            return Ok(());
        }
        info!("Initiating connection to {}...", device.id());
        match tokio::time::timeout(timeout, self.adapter.connect_device(device)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[async_trait]
impl Transport for BluestTransport {
    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
        retry: &RetryPolicy,
    ) -> Result<(), TransportError> {
        let device = self.find_device(address)?;
        let attempts = retry.max_retries.max(1);
        let mut last_error = TransportError::Timeout;

        for attempt in 0..attempts {
            match self.try_connect(&device, timeout).await {
                Ok(()) => {
                    info!("Successfully connected to {}", address);
                    self.lock().device = Some(device);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempt + 1, e);
                    last_error = e;
                    if attempt + 1 < attempts {
                        info!("Retrying connection in {} ms...", retry.retry_delay_ms);
                        tokio::time::sleep(retry.retry_delay()).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn bond(&self, address: &str) -> Result<(), TransportError> {
        let device = self.lock().device()?;
        if device.is_paired().await.unwrap_or(false) {
            debug!("{} already paired", address);
            return Ok(());
        }
        info!("Pairing with {}", address);
        device.pair().await?;
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<GattService>, TransportError> {
        let device = self.lock().device()?;
        let mut discovered = Vec::new();
        let mut characteristics = Vec::new();

        for service in device.services().await? {
            let mut gatt = GattService {
                uuid: service.uuid(),
                characteristics: Vec::new(),
            };
            for characteristic in service.characteristics().await? {
                let notify = characteristic
                    .properties()
                    .await
                    .map(|properties| properties.notify)
                    .unwrap_or(false);
                gatt.characteristics.push(GattCharacteristic {
                    uuid: characteristic.uuid(),
                    handle: CharacteristicHandle(0),
                    notify,
                });
                characteristics.push(characteristic);
            }
            debug!("Available service: {}", gatt.uuid);
            discovered.push(gatt);
        }

        let mut link = self.lock();
        link.release();
        let mut resolved = characteristics.into_iter();
        for service in discovered.iter_mut() {
            for gatt in service.characteristics.iter_mut() {
                link.next_handle += 1;
                gatt.handle = CharacteristicHandle(link.next_handle);
                if let Some(characteristic) = resolved.next() {
                    link.characteristics.insert(gatt.handle, characteristic);
                }
            }
        }
        Ok(discovered)
    }

    async fn read(&self, handle: CharacteristicHandle) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.lock().characteristic(handle)?;
        Ok(characteristic.read().await?)
    }

    async fn write(
        &self,
        handle: CharacteristicHandle,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let characteristic = self.lock().characteristic(handle)?;
        match mode {
            WriteMode::WithResponse => characteristic.write(data).await?,
            WriteMode::WithoutResponse => characteristic.write_without_response(data).await?,
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        handle: CharacteristicHandle,
    ) -> Result<NotificationStream, TransportError> {
        let characteristic = self.lock().characteristic(handle)?;
        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let uuid = characteristic.uuid();
            let mut stream = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(TransportError::from(e)));
                    return;
                }
            };
            while let Some(result) = stream.next().await {
                match result {
                    Ok(value) => {
                        if tx.send(value).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error in notification stream for {}: {}", uuid, e);
                        break;
                    }
                }
            }
            debug!("Notification stream for {} ended", uuid);
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(TransportError::Io("notification task ended".to_string())),
        }

        if let Some(previous) = self.lock().subscriptions.insert(handle, task) {
            previous.abort();
        }
        Ok(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|value| (value, rx))
        })
        .boxed())
    }

    async fn unsubscribe(&self, handle: CharacteristicHandle) -> Result<(), TransportError> {
        if let Some(task) = self.lock().subscriptions.remove(&handle) {
            task.abort();
        }
        Ok(())
    }

    async fn disconnect(&self, address: &str) -> Result<(), TransportError> {
        let device = {
            let mut link = self.lock();
            link.release();
            link.device.take()
        };
        let Some(device) = device else {
            info!("Device {} not connected", address);
            return Ok(());
        };

        if device.is_connected().await {
            info!("Disconnecting from device {}", address);
            self.adapter.disconnect_device(&device).await?;
            info!("Successfully disconnected");
        }
        Ok(())
    }
}
