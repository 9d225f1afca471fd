//! ChannelSlot - 拡張プロセスチャネルの単回代入セル
//!
//! ```text
//! Empty ──set──▶ Ready ──take──▶ Consumed ──set──▶ Ready (next generation)
//!                  └──set──▶ AlreadySet       └──take──▶ AlreadyConsumed
//! ```
//!
//! `take` は Ready になるまで待つ（上限つき）。待機は `Notify` で行い、
//! ポーリングはしません。

use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

use crate::domain::ErrorKind;
use crate::ports::ChannelHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("extension process channel already set for generation {generation}")]
    AlreadySet { generation: u64 },

    #[error("extension process channel already consumed for generation {generation}")]
    AlreadyConsumed { generation: u64 },

    #[error("extension process channel not ready after {0:?}")]
    NotReady(Duration),
}

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::AlreadySet { .. } | ChannelError::AlreadyConsumed { .. } => {
                ErrorKind::Protocol
            }
            ChannelError::NotReady(_) => ErrorKind::Engine,
        }
    }
}

enum SlotState {
    Empty,
    Ready(ChannelHandle),
    Consumed,
}

struct Slot {
    state: SlotState,
    generation: u64,
}

pub struct ChannelSlot {
    slot: Mutex<Slot>,
    ready: Notify,
}

impl ChannelSlot {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: SlotState::Empty,
                generation: 0,
            }),
            ready: Notify::new(),
        }
    }

    /// Store the handle; returns its generation.
    pub fn set(&self, handle: ChannelHandle) -> Result<u64, ChannelError> {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        match slot.state {
            SlotState::Ready(_) => {
                return Err(ChannelError::AlreadySet {
                    generation: slot.generation,
                });
            }
            SlotState::Empty => {}
            SlotState::Consumed => slot.generation += 1,
        }
        slot.state = SlotState::Ready(handle);
        let generation = slot.generation;
        drop(guard);

        self.ready.notify_waiters();
        Ok(generation)
    }

    /// Take the handle, waiting up to `timeout` for it to be set.
    pub async fn take(&self, timeout: Duration) -> Result<ChannelHandle, ChannelError> {
        tokio::time::timeout(timeout, self.wait_and_take())
            .await
            .map_err(|_| ChannelError::NotReady(timeout))?
    }

    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    async fn wait_and_take(&self) -> Result<ChannelHandle, ChannelError> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut guard = self.slot.lock();
                let slot = &mut *guard;
                match std::mem::replace(&mut slot.state, SlotState::Consumed) {
                    SlotState::Ready(handle) => return Ok(handle),
                    SlotState::Consumed => {
                        return Err(ChannelError::AlreadyConsumed {
                            generation: slot.generation,
                        });
                    }
                    SlotState::Empty => slot.state = SlotState::Empty,
                }
            }

            notified.await;
        }
    }
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn set_then_take_once() {
        let slot = ChannelSlot::new();
        assert_eq!(slot.set(ChannelHandle::named("ext-0")).unwrap(), 0);

        assert_eq!(slot.take(WAIT).await.unwrap(), ChannelHandle::named("ext-0"));
        assert_eq!(
            slot.take(WAIT).await.unwrap_err(),
            ChannelError::AlreadyConsumed { generation: 0 }
        );
    }

    #[tokio::test]
    async fn second_set_before_take_is_an_error() {
        let slot = ChannelSlot::new();
        slot.set(ChannelHandle::named("a")).unwrap();

        let err = slot.set(ChannelHandle::named("b")).unwrap_err();
        assert_eq!(err, ChannelError::AlreadySet { generation: 0 });
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(slot.take(WAIT).await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn set_after_consume_starts_a_new_generation() {
        let slot = ChannelSlot::new();
        slot.set(ChannelHandle::named("a")).unwrap();
        slot.take(WAIT).await.unwrap();
        assert_eq!(slot.generation(), 0);

        assert_eq!(slot.set(ChannelHandle::named("b")).unwrap(), 1);
        assert_eq!(slot.generation(), 1);
        assert_eq!(slot.take(WAIT).await.unwrap().name, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn take_waits_for_set() {
        let slot = Arc::new(ChannelSlot::new());
        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.take(WAIT).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        slot.set(ChannelHandle::named("late")).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap().name, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn take_times_out_when_never_set() {
        let slot = ChannelSlot::new();
        let err = slot.take(Duration::from_millis(250)).await.unwrap_err();
        assert_eq!(err, ChannelError::NotReady(Duration::from_millis(250)));
        assert_eq!(err.kind(), ErrorKind::Engine);
    }
}
