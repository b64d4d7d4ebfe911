//! Tetherlink Core Library
//!
//! Secure channels between devices on one account, and the tether
//! messaging built on them. Covers BLE advertisement identification,
//! connection attempts and feature-multiplexed client channels, the
//! message transfer engine, and the synced device caches.
//! All cryptographic operations use the audited `ring` crate.

pub mod ble;
pub mod channel;
pub mod clock;
pub mod config;
pub mod device;
pub mod eid;
pub mod runtime;
pub mod tether;

pub use ble::{BleServiceDataHelper, IdentifiedDevice};
pub use channel::{
    ChannelError, ClientChannel, ClientChannelObserver, ConnectionAttempt,
    ConnectionAttemptDelegate, ConnectionAttemptFailureReason, ConnectionMetadata,
    ConnectionPriority, MultiplexedConnection, MultiplexingSecureChannelClient,
    SecureChannelClient,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{ConfigError, TetherConfig, DEFAULT_TIMEOUT_SECONDS, TETHER_FEATURE_NAME};
pub use device::{
    BeaconSeed, DeviceDirectory, DeviceIdPair, DeviceIdPairSet, ExpiringRemoteDeviceCache,
    RemoteDevice, RemoteDeviceCache, RemoteDeviceRef, SoftwareFeatureState, TetherHostFetcher,
};
pub use eid::{
    BackgroundEidGenerator, DataWithTimestamp, EidData, ForegroundEidGenerator,
    HmacBackgroundEidGenerator, HmacForegroundEidGenerator,
};
pub use runtime::{OneShotTimer, TaskRunner, TimerFactory};
pub use tether::{
    MessageError, MessageTransferOperation, MessageType, MessageWrapper, OperationContext,
    OperationHandler,
};
