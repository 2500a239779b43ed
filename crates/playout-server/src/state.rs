#![allow(dead_code)]

//! Application state management
//!
//! This module defines the `AppState` structure shared across all HTTP
//! handlers: the registry of running channels, server configuration, and
//! shutdown signaling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use playout_core::control::ControlFsm;
use playout_core::evidence::EvidenceSpool;

use crate::channel::ChannelCommand;
use crate::config::ServerConfig;
use crate::metrics::Metrics;

/// A single running playout channel: its control state machine, the
/// cooperative stop flag observed by its tick loop, and the evidence
/// spool it appends to.
pub struct ChannelHandle {
    pub channel_id: String,
    pub control: parking_lot::RwLock<ControlFsm>,
    pub stop_flag: Arc<AtomicBool>,
    pub evidence: Arc<EvidenceSpool>,
    pub task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    cmd_tx: parking_lot::Mutex<Option<std::sync::mpsc::Sender<ChannelCommand>>>,
    pub started_at_utc_us: i64,
}

impl ChannelHandle {
    pub fn new(
        channel_id: String,
        evidence: Arc<EvidenceSpool>,
        stop_flag: Arc<AtomicBool>,
        started_at_utc_us: i64,
    ) -> Self {
        Self {
            channel_id,
            control: parking_lot::RwLock::new(ControlFsm::new()),
            stop_flag,
            evidence,
            task: parking_lot::Mutex::new(None),
            cmd_tx: parking_lot::Mutex::new(None),
            started_at_utc_us,
        }
    }

    /// Attach the background tick-loop task once it has been spawned. The
    /// handle is constructed before the task exists so the task itself can
    /// be handed a clone of `stop_flag` and of the handle.
    pub fn set_task(&self, task: tokio::task::JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    /// Attach the command channel to the running tick loop. Set once, right
    /// after `spawn` constructs the loop's receiver half.
    pub fn set_cmd_tx(&self, tx: std::sync::mpsc::Sender<ChannelCommand>) {
        *self.cmd_tx.lock() = Some(tx);
    }

    /// Send a command to this channel's tick loop. Fails if the loop has
    /// already exited and dropped its receiver.
    pub fn send_command(&self, cmd: ChannelCommand) -> Result<(), String> {
        let guard = self.cmd_tx.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(cmd).map_err(|_| "channel loop has exited".to_string()),
            None => Err("channel has no command channel attached".to_string()),
        }
    }

    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }
}

/// Application state shared across all handlers
pub struct AppState {
    /// Running channels (channel_id -> handle)
    pub channels: DashMap<String, Arc<ChannelHandle>>,

    /// Server configuration
    pub config: ServerConfig,

    /// Server shutdown flag
    pub shutdown: AtomicBool,

    /// Process-wide metrics
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self {
            channels: DashMap::new(),
            config,
            shutdown: AtomicBool::new(false),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Create AppState with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Register a newly started channel. Returns false if a channel with
    /// the same id is already running.
    pub fn register_channel(&self, handle: Arc<ChannelHandle>) -> bool {
        if self.channels.contains_key(&handle.channel_id) {
            return false;
        }
        self.channels.insert(handle.channel_id.clone(), handle);
        true
    }

    /// Get a channel handle by id
    pub fn get_channel(&self, channel_id: &str) -> Option<Arc<ChannelHandle>> {
        self.channels.get(channel_id).map(|r| r.clone())
    }

    /// Remove a channel from the registry
    pub fn remove_channel(&self, channel_id: &str) -> Option<Arc<ChannelHandle>> {
        self.channels.remove(channel_id).map(|(_, v)| v)
    }

    /// Number of currently registered channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Whether the process is at its configured channel cap
    pub fn at_capacity(&self) -> bool {
        match self.config.max_concurrent_channels {
            Some(max) => self.channel_count() >= max,
            None => false,
        }
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Check if shutdown is requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Remove channels whose tick task has already finished, returning how
    /// many were reaped.
    pub async fn cleanup_finished_channels(&self) -> usize {
        let mut finished = Vec::new();
        for entry in self.channels.iter() {
            if let Some(task) = entry.value().task.lock().as_ref() {
                if task.is_finished() {
                    finished.push(entry.key().clone());
                }
            }
        }

        let mut count = 0;
        for channel_id in finished {
            if self.remove_channel(&channel_id).is_some() {
                count += 1;
            }
        }
        count
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_defaults()
    }
}
