// src/manager/asynchronous.rs
//! Awaitable forms of the manager's device requests
//!
//! Each wrapper registers a completion that forwards into a oneshot channel.
//! Rejections are returned immediately, as with the callback forms.

use tokio::sync::oneshot;

use crate::error::{EegError, EegResult};
use crate::hal::types::FullBatteryInfo;
use crate::manager::EegManager;

fn channel<T: Send + 'static>() -> (impl FnOnce(EegResult<T>) + Send + 'static, oneshot::Receiver<EegResult<T>>) {
    let (tx, rx) = oneshot::channel();
    (
        move |result: EegResult<T>| {
            let _ = tx.send(result);
        },
        rx,
    )
}

async fn answer<T>(rx: oneshot::Receiver<EegResult<T>>, operation: &str) -> EegResult<T> {
    rx.await
        .unwrap_or_else(|_| Err(EegError::Unknown(format!("{} completion dropped", operation))))
}

impl EegManager {
    pub async fn connect_async(&mut self, device_name: &str) -> EegResult<()> {
        let (done, rx) = channel();
        self.connect(device_name, done)?;
        answer(rx, "connect").await
    }

    pub async fn load_config_async(&mut self) -> EegResult<()> {
        let (done, rx) = channel();
        self.load_config(done)?;
        answer(rx, "load config").await
    }

    pub async fn start_stream_async(&mut self) -> EegResult<()> {
        let (done, rx) = channel();
        self.start_stream(done)?;
        answer(rx, "start stream").await
    }

    pub async fn stop_stream_async(&mut self) -> EegResult<()> {
        let (done, rx) = channel();
        self.stop_stream(done)?;
        answer(rx, "stop stream").await
    }

    pub async fn request_full_battery_info_async(&mut self) -> EegResult<FullBatteryInfo> {
        let (done, rx) = channel();
        self.request_full_battery_info(done)?;
        answer(rx, "battery request").await
    }
}
