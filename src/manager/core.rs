// src/manager/core.rs
//! Process-wide core context
//!
//! At most one [`Core`] is alive per process, counting managers that still
//! hold a handle to a dropped core. Managers are created from a
//! core and keep a [`CoreHandle`] to it for the chunk size and the count of
//! streaming managers; a core refuses to close while any manager is open.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{validate_chunk_size, CoreConfig};
use crate::error::{EegError, EegResult};
use crate::hal::traits::Scanner;
use crate::hal::types::BleDevice;

static CORE_ACTIVE: AtomicBool = AtomicBool::new(false);

struct CoreShared {
    config: RwLock<CoreConfig>,
    alive: AtomicBool,
    managers: AtomicUsize,
    active_streams: AtomicUsize,
}

// The process slot is held until the last manager lets go of its handle
impl Drop for CoreShared {
    fn drop(&mut self) {
        CORE_ACTIVE.store(false, Ordering::Release);
        debug!("core slot released");
    }
}

/// Shared reference from a manager back to its core
#[derive(Clone)]
pub(crate) struct CoreHandle(Arc<CoreShared>);

impl CoreHandle {
    pub(crate) fn ensure_alive(&self) -> EegResult<()> {
        if self.0.alive.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(EegError::CoreNotInitialized)
        }
    }

    pub(crate) fn config(&self) -> CoreConfig {
        self.0.config.read().clone()
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.0.config.read().chunk_size
    }

    pub(crate) fn manager_opened(&self) {
        self.0.managers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn manager_closed(&self) {
        self.0.managers.fetch_sub(1, Ordering::AcqRel);
    }

    /// Count a new stream and return the chunk size it must use.
    ///
    /// Runs under the config write lock so a concurrent chunk size change
    /// either lands before the stream is counted or is refused.
    pub(crate) fn begin_stream(&self) -> usize {
        let config = self.0.config.write();
        self.0.active_streams.fetch_add(1, Ordering::AcqRel);
        config.chunk_size
    }

    pub(crate) fn stream_stopped(&self) {
        self.0.active_streams.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Explicitly constructed core context
pub struct Core {
    handle: CoreHandle,
}

impl Core {
    /// Initialize the process-wide core
    pub fn init(config: CoreConfig) -> EegResult<Core> {
        config
            .validate()
            .map_err(|errors| EegError::Config(errors.join("; ")))?;

        if CORE_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EegError::AlreadyInitialized);
        }

        info!(chunk_size = config.chunk_size, "core initialized");
        Ok(Core {
            handle: CoreHandle(Arc::new(CoreShared {
                config: RwLock::new(config),
                alive: AtomicBool::new(true),
                managers: AtomicUsize::new(0),
                active_streams: AtomicUsize::new(0),
            })),
        })
    }

    /// Release the core; refused while managers created from it are open
    pub fn close(self) -> Result<(), (Core, EegError)> {
        let open = self.open_managers();
        if open > 0 {
            warn!(open, "refusing to close core with open managers");
            return Err((self, EegError::ManagersStillOpen(open)));
        }
        drop(self);
        Ok(())
    }

    pub fn config(&self) -> CoreConfig {
        self.handle.config()
    }

    /// Replace the configuration. A chunk size change is refused while any manager streams.
    pub fn set_config(&self, config: CoreConfig) -> EegResult<()> {
        config
            .validate()
            .map_err(|errors| EegError::Config(errors.join("; ")))?;

        let mut current = self.handle.0.config.write();
        if current.chunk_size != config.chunk_size {
            self.ensure_no_active_streams("change chunk size")?;
        }
        *current = config;
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.handle.chunk_size()
    }

    /// Set samples per chunk (1..=100); refused while any manager streams
    pub fn set_chunk_size(&self, chunk_size: usize) -> EegResult<()> {
        validate_chunk_size(chunk_size).map_err(|reason| EegError::invalid_argument("chunk_size", reason))?;

        let mut config = self.handle.0.config.write();
        self.ensure_no_active_streams("change chunk size")?;
        config.chunk_size = chunk_size;
        debug!(chunk_size, "chunk size updated");
        Ok(())
    }

    /// Discover devices through the external scan layer
    pub fn scan(&self, scanner: &dyn Scanner) -> EegResult<Vec<BleDevice>> {
        let adapter = self.handle.0.config.read().adapter_index;
        let devices = scanner.scan(adapter)?;
        if devices.is_empty() {
            return Err(EegError::NoDevicesFound);
        }
        debug!(count = devices.len(), adapter, "scan finished");
        Ok(devices)
    }

    pub fn open_managers(&self) -> usize {
        self.handle.0.managers.load(Ordering::Acquire)
    }

    pub fn active_streams(&self) -> usize {
        self.handle.0.active_streams.load(Ordering::Acquire)
    }

    pub(crate) fn handle(&self) -> CoreHandle {
        self.handle.clone()
    }

    fn ensure_no_active_streams(&self, operation: &'static str) -> EegResult<()> {
        let streams = self.active_streams();
        if streams > 0 {
            return Err(EegError::invalid_state(
                operation,
                format!("{} manager(s) streaming", streams),
            ));
        }
        Ok(())
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.handle.0.alive.store(false, Ordering::Release);
        info!("core closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::traits::TransportError;
    use serial_test::serial;

    struct FixedScanner(Vec<BleDevice>);

    impl Scanner for FixedScanner {
        fn scan(&self, _adapter_index: u8) -> Result<Vec<BleDevice>, TransportError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    #[serial]
    fn test_single_core_per_process() {
        let core = Core::init(CoreConfig::default()).unwrap();
        assert!(matches!(Core::init(CoreConfig::default()), Err(EegError::AlreadyInitialized)));
        core.close().map_err(|(_, e)| e).unwrap();

        let again = Core::init(CoreConfig::default()).unwrap();
        drop(again);
    }

    #[test]
    #[serial]
    fn test_close_refused_with_open_managers() {
        let core = Core::init(CoreConfig::default()).unwrap();
        let handle = core.handle();
        handle.manager_opened();

        let (core, err) = core.close().unwrap_err();
        assert_eq!(err, EegError::ManagersStillOpen(1));

        handle.manager_closed();
        assert!(core.close().is_ok());
        assert_eq!(handle.ensure_alive(), Err(EegError::CoreNotInitialized));

        // The slot stays taken until the last handle is gone
        assert!(matches!(Core::init(CoreConfig::default()), Err(EegError::AlreadyInitialized)));
        drop(handle);
        Core::init(CoreConfig::default()).unwrap();
    }

    #[test]
    #[serial]
    fn test_chunk_size_locked_while_streaming() {
        let core = Core::init(CoreConfig::default()).unwrap();
        assert!(matches!(core.set_chunk_size(0), Err(EegError::InvalidArgument { .. })));
        core.set_chunk_size(50).unwrap();
        assert_eq!(core.chunk_size(), 50);

        assert_eq!(core.handle().begin_stream(), 50);
        assert!(matches!(core.set_chunk_size(10), Err(EegError::InvalidState { .. })));
        let mut config = core.config();
        config.annotation_settle_ms = 100;
        core.set_config(config).unwrap();
        core.handle().stream_stopped();

        core.set_chunk_size(10).unwrap();
        assert_eq!(core.config().annotation_settle_ms, 100);
    }

    #[test]
    #[serial]
    fn test_scan() {
        let core = Core::init(CoreConfig::default()).unwrap();
        assert_eq!(core.scan(&FixedScanner(Vec::new())), Err(EegError::NoDevicesFound));

        let found = core
            .scan(&FixedScanner(vec![BleDevice {
                name: "BA MINI 001".into(),
                address: "00:11:22:33:44:55".into(),
            }]))
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
