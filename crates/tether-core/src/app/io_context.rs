//! IoContext - エンジンの I/O スレッドへの受け渡し
//!
//! NetworkContext の操作は専用スレッド（"tether-io"）でだけ実行します。
//! イベントループ側はタスクを送って、必要なら oneshot で完了を待ちます。
//! 待ちには必ず上限をつけ、ループをブロックしません。

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::domain::ErrorKind;
use crate::ports::NetworkContext;

pub const IO_THREAD_NAME: &str = "tether-io";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    #[error("engine I/O context has shut down")]
    Closed,

    #[error("engine I/O context did not apply {operation} within {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl IoError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Engine
    }
}

enum IoTask {
    SetUserAgent {
        value: String,
        done: oneshot::Sender<()>,
    },
    RemoveAllCookies,
}

pub struct IoContext {
    tasks: mpsc::Sender<IoTask>,
}

impl IoContext {
    /// Start the I/O thread. It exits when the context is dropped.
    pub fn spawn(network: Arc<dyn NetworkContext>) -> std::io::Result<Self> {
        let (tasks, inbox) = mpsc::channel::<IoTask>();
        std::thread::Builder::new()
            .name(IO_THREAD_NAME.to_owned())
            .spawn(move || {
                for task in inbox {
                    match task {
                        IoTask::SetUserAgent { value, done } => {
                            network.set_user_agent(&value);
                            debug!(user_agent = %value, "user agent applied");
                            // 呼び出し側がタイムアウト済みなら受け手はいない
                            let _ = done.send(());
                        }
                        IoTask::RemoveAllCookies => {
                            network.remove_all_cookies();
                            debug!("cookies removed");
                        }
                    }
                }
                debug!("engine I/O thread stopped");
            })?;
        Ok(Self { tasks })
    }

    /// Apply the user agent and wait until the I/O thread has done so.
    pub async fn set_user_agent(&self, value: String, timeout: Duration) -> Result<(), IoError> {
        let (done, applied) = oneshot::channel();
        self.tasks
            .send(IoTask::SetUserAgent { value, done })
            .map_err(|_| IoError::Closed)?;

        match tokio::time::timeout(timeout, applied).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(IoError::Closed),
            Err(_) => {
                warn!(?timeout, "user agent hand-off timed out");
                Err(IoError::Timeout {
                    operation: "SetUserAgentString",
                    timeout,
                })
            }
        }
    }

    /// Post a cookie wipe; returns once the I/O thread has accepted it.
    pub fn remove_all_cookies(&self) -> Result<(), IoError> {
        self.tasks
            .send(IoTask::RemoveAllCookies)
            .map_err(|_| IoError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::StubEngine;

    #[tokio::test]
    async fn user_agent_is_applied_before_the_reply() {
        let engine = Arc::new(StubEngine::new());
        let io = IoContext::spawn(engine.clone()).unwrap();

        io.set_user_agent("UA/1.0".into(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(engine.user_agent().as_deref(), Some("UA/1.0"));
    }

    #[tokio::test]
    async fn cookie_wipes_run_in_order_on_the_io_thread() {
        let engine = Arc::new(StubEngine::new());
        let io = IoContext::spawn(engine.clone()).unwrap();

        io.remove_all_cookies().unwrap();
        io.remove_all_cookies().unwrap();
        // set_user_agent の完了は先に積んだタスクの完了も意味する
        io.set_user_agent("UA".into(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(engine.cookie_clears(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_io_thread_times_out() {
        let engine = Arc::new(StubEngine::new().with_io_delay(Duration::from_millis(200)));
        let io = IoContext::spawn(engine).unwrap();

        let err = io
            .set_user_agent("UA".into(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, IoError::Timeout { .. }));
    }
}
