//! Shared server state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use ghouse_core::Settings;
use ghouse_devices::{BridgeConfig, DeviceBridge};
use ghouse_messages::{ConsoleChannel, NotificationManager, TelegramChannel};
use ghouse_storage::{ConveyorStore, FleetStore, GreenhouseStore, ReadingStore};

use crate::auth::AuthState;
use crate::relay;
use crate::ws::ConnectionRegistry;

/// The domain stores, one redb file each.
pub struct Stores {
    pub greenhouse: GreenhouseStore,
    pub readings: ReadingStore,
    pub fleet: FleetStore,
    pub conveyor: ConveyorStore,
}

impl Stores {
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            greenhouse: GreenhouseStore::open(data_dir.join("greenhouse.redb"))?,
            readings: ReadingStore::open(data_dir.join("readings.redb"))?,
            fleet: FleetStore::open(data_dir.join("fleet.redb"))?,
            conveyor: ConveyorStore::open(data_dir.join("conveyor.redb"))?,
        })
    }
}

/// Application state shared across handlers, the WebSocket layer and the
/// telemetry relay.
#[derive(Clone)]
pub struct ServerState {
    pub settings: Settings,
    pub auth: AuthState,
    pub registry: Arc<ConnectionRegistry>,
    pub bridge: Arc<DeviceBridge>,
    pub stores: Arc<Stores>,
    pub notifications: NotificationManager,
    /// Present only when a bot token is configured.
    pub telegram: Option<Arc<TelegramChannel>>,
    pub started_at: i64,
}

impl ServerState {
    /// Build the full state from settings. Opens every store, wires the
    /// notification channels and prepares (but does not connect) the
    /// device bridge.
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(&settings.server.data_dir);

        let stores = Arc::new(Stores::open(&data_dir)?);

        let notifications = NotificationManager::open(&data_dir)
            .map_err(|e| anyhow::anyhow!("notification store: {}", e))?;
        notifications
            .register_channel(Arc::new(ConsoleChannel::new("console".to_string())))
            .await;

        let telegram = settings.telegram.bot_token.as_deref().map(|token| {
            Arc::new(TelegramChannel::new(token, notifications.store()))
        });
        if let Some(channel) = &telegram {
            notifications.register_channel(channel.clone()).await;
            info!("Telegram notification channel enabled");
        }

        let auth = AuthState::open(&data_dir, &settings.auth);
        let bridge = Arc::new(DeviceBridge::new(BridgeConfig::from_settings(
            &settings.mqtt,
        )));

        Ok(Self {
            settings,
            auth,
            registry: Arc::new(ConnectionRegistry::new()),
            bridge,
            stores,
            notifications,
            telegram,
            started_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Connect the device bridge. A broker that is down at startup is a
    /// warning, not a fatal error; telemetry resumes if the bridge is
    /// reconnected later.
    pub async fn init_mqtt(&self) {
        match self.bridge.connect().await {
            Ok(()) => info!(
                broker = %self.settings.mqtt.broker,
                port = self.settings.mqtt.port,
                "Device bridge connecting"
            ),
            Err(e) => warn!("Device bridge connect failed: {}", e),
        }
    }

    /// Start the telemetry relay task.
    pub fn spawn_relay(&self) {
        let state = self.clone();
        tokio::spawn(async move {
            relay::run(state).await;
        });
    }

    /// Seconds since the server started.
    pub fn uptime_secs(&self) -> i64 {
        (chrono::Utc::now().timestamp() - self.started_at).max(0)
    }
}
