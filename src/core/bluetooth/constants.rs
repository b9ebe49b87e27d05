//! Constants used throughout the session layer
//! This module contains the GATT UUIDs exposed by the watch, plus the
//! timeouts and sizes the session falls back to when no config is given.

use uuid::Uuid;

/// Service UUID the watch advertises; used only to filter discovery results.
pub const UUID_ADVERTISED_SERVICE: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_00a57e401d05);

/// Standard Bluetooth battery service and level characteristic
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Time service
pub const UUID_TIME_SERVICE: Uuid = Uuid::from_u128(0x00005071_0000_0000_0000_00a57e401d05);
pub const UUID_TIME_SET: Uuid = Uuid::from_u128(0x00005001_0000_0000_0000_00a57e401d05);

/// Screenshot service
pub const UUID_SCREENSHOT_SERVICE: Uuid = Uuid::from_u128(0x00006071_0000_0000_0000_00a57e401d05);
pub const UUID_SCREENSHOT_REQUEST: Uuid = Uuid::from_u128(0x00006001_0000_0000_0000_00a57e401d05);
pub const UUID_SCREENSHOT_CONTENT: Uuid = Uuid::from_u128(0x00006002_0000_0000_0000_00a57e401d05);

/// Media service
pub const UUID_MEDIA_SERVICE: Uuid = Uuid::from_u128(0x00007071_0000_0000_0000_00a57e401d05);
pub const UUID_MEDIA_TITLE: Uuid = Uuid::from_u128(0x00007001_0000_0000_0000_00a57e401d05);
pub const UUID_MEDIA_ALBUM: Uuid = Uuid::from_u128(0x00007002_0000_0000_0000_00a57e401d05);
pub const UUID_MEDIA_ARTIST: Uuid = Uuid::from_u128(0x00007003_0000_0000_0000_00a57e401d05);
pub const UUID_MEDIA_PLAYING: Uuid = Uuid::from_u128(0x00007004_0000_0000_0000_00a57e401d05);
pub const UUID_MEDIA_COMMANDS: Uuid = Uuid::from_u128(0x00007005_0000_0000_0000_00a57e401d05);
pub const UUID_MEDIA_VOLUME: Uuid = Uuid::from_u128(0x00007006_0000_0000_0000_00a57e401d05);

/// Weather service
pub const UUID_WEATHER_SERVICE: Uuid = Uuid::from_u128(0x00008071_0000_0000_0000_00a57e401d05);
pub const UUID_WEATHER_CITY: Uuid = Uuid::from_u128(0x00008001_0000_0000_0000_00a57e401d05);
pub const UUID_WEATHER_IDS: Uuid = Uuid::from_u128(0x00008002_0000_0000_0000_00a57e401d05);
pub const UUID_WEATHER_MIN_TEMPS: Uuid = Uuid::from_u128(0x00008003_0000_0000_0000_00a57e401d05);
pub const UUID_WEATHER_MAX_TEMPS: Uuid = Uuid::from_u128(0x00008004_0000_0000_0000_00a57e401d05);

/// Notification service
pub const UUID_NOTIFICATION_SERVICE: Uuid = Uuid::from_u128(0x00009071_0000_0000_0000_00a57e401d05);
pub const UUID_NOTIFICATION_UPDATE: Uuid = Uuid::from_u128(0x00009001_0000_0000_0000_00a57e401d05);

/// External application message service
pub const UUID_APP_MESSAGE_SERVICE: Uuid = Uuid::from_u128(0x0000a071_0000_0000_0000_00a57e401d05);
pub const UUID_APP_MESSAGE: Uuid = Uuid::from_u128(0x0000a001_0000_0000_0000_00a57e401d05);

/// Maximum number of connection retries
pub const MAX_CONNECT_RETRIES: u32 = 5;

/// Delay between connection retries in milliseconds
pub const CONNECT_RETRY_DELAY_MS: u64 = 1000;

/// Timeout for a single connection attempt in seconds
pub const BLUETOOTH_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Queue depth per event subscriber before the producer is suspended
pub const DEFAULT_EVENT_BUFFER: usize = 32;

/// Forecast days the weather service accepts
pub const MAX_FORECAST_ENTRIES: usize = 5;

/// Size of the screenshot header announcing the total payload length
pub const SCREENSHOT_HEADER_SIZE: usize = 4;

/// Byte written to the request characteristic to start a screenshot
pub const SCREENSHOT_TRIGGER: [u8; 1] = [0x01];
