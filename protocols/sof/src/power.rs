// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

//! Power gate for transaction.
//!
//! The module includes the reference-counted state of device activity. Every transaction is
//! wrapped so that the device is resumed before any access to mailbox, then marked as recently
//! used and given the opportunity to idle after quiescent delay.

use {
    super::*,
    std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    },
    tracing::{debug, error},
};

/// The default delay before the device is allowed to suspend.
pub const DEFAULT_AUTOSUSPEND_DELAY: Duration = Duration::from_millis(2000);

/// Facade of power management for the device.
pub trait PowerOperation {
    /// Resume the device synchronously. Nothing happens when it is already active.
    fn resume_sync(&self) -> Result<(), Error>;

    /// Mark the device as recently used.
    fn mark_last_busy(&self);

    /// Give the device opportunity to suspend after the delay. Never suspend synchronously.
    fn schedule_idle(&self, delay: Duration) -> Result<(), Error>;

    /// Suspend the device immediately.
    fn force_suspend(&self) -> Result<(), Error>;
}

/// Reference-counted state of device activity, shared by all of transactions.
#[derive(Debug)]
pub struct DeviceActivity<P: PowerOperation> {
    usage: AtomicUsize,
    ops: P,
    autosuspend_delay: Duration,
}

impl<P: PowerOperation> DeviceActivity<P> {
    pub fn new(ops: P, autosuspend_delay: Duration) -> Self {
        Self {
            usage: AtomicUsize::new(0),
            ops,
            autosuspend_delay,
        }
    }

    /// The number of outstanding transactions.
    pub fn usage_count(&self) -> usize {
        self.usage.load(Ordering::SeqCst)
    }

    pub fn ops(&self) -> &P {
        &self.ops
    }

    /// Run the body while the device is active.
    ///
    /// Any failure to resume is returned without calling the body. The device is marked as busy
    /// at every exit, while idle is scheduled only by the exit which drops the last usage. Any
    /// failure to schedule idle is logged only, and never masks the result of body.
    pub fn with_device_active<T, F>(&self, body: F) -> Result<T, Error>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        let count = self.usage.fetch_add(1, Ordering::SeqCst) + 1;

        if let Err(err) = self.ops.resume_sync() {
            // Drop the reference without idle.
            self.usage.fetch_sub(1, Ordering::SeqCst);
            error!(usage = count - 1, ?err, "failed to resume");
            let msg = format!("Fail to resume device: {}", err.message());
            return Err(Error::new(ControlProtocolError::PowerResumeFailed, &msg));
        }
        debug!(usage = count, "resumed");

        let res = body();

        self.ops.mark_last_busy();
        let count = self.usage.fetch_sub(1, Ordering::SeqCst) - 1;

        if count > 0 {
            debug!(usage = count, "still active");
        } else if let Err(err) = self.ops.schedule_idle(self.autosuspend_delay) {
            error!(usage = count, ?err, "failed to idle");
        } else {
            debug!(usage = count, delay_ms = self.autosuspend_delay.as_millis() as u64, "idle scheduled");
        }

        res
    }

    /// Power down the device regardless of outstanding usage, at teardown.
    pub fn shutdown(&self) -> Result<(), Error> {
        let count = self.usage.swap(0, Ordering::SeqCst);
        debug!(usage = count, "shutdown");
        self.ops.force_suspend()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use {
        super::*,
        std::{
            sync::{mpsc, Barrier, Mutex},
            thread,
        },
    };

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub(crate) enum PowerEvent {
        Resume,
        Busy,
        Idle,
        Suspend,
    }

    #[derive(Default, Debug)]
    pub(crate) struct FakePower {
        pub events: Mutex<Vec<PowerEvent>>,
        pub resume_fails: bool,
        pub idle_fails: bool,
    }

    impl FakePower {
        pub fn count(&self, event: PowerEvent) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|&&ev| ev == event)
                .count()
        }
    }

    impl PowerOperation for FakePower {
        fn resume_sync(&self) -> Result<(), Error> {
            self.events.lock().unwrap().push(PowerEvent::Resume);
            if self.resume_fails {
                Err(Error::new(ControlProtocolError::Io, "EIO"))
            } else {
                Ok(())
            }
        }

        fn mark_last_busy(&self) {
            self.events.lock().unwrap().push(PowerEvent::Busy);
        }

        fn schedule_idle(&self, _: Duration) -> Result<(), Error> {
            self.events.lock().unwrap().push(PowerEvent::Idle);
            if self.idle_fails {
                Err(Error::new(ControlProtocolError::Io, "EBUSY"))
            } else {
                Ok(())
            }
        }

        fn force_suspend(&self) -> Result<(), Error> {
            self.events.lock().unwrap().push(PowerEvent::Suspend);
            Ok(())
        }
    }

    #[test]
    fn resume_failure_skips_body() {
        let activity = DeviceActivity::new(
            FakePower {
                resume_fails: true,
                ..Default::default()
            },
            DEFAULT_AUTOSUSPEND_DELAY,
        );

        let mut called = false;
        let err = activity
            .with_device_active(|| {
                called = true;
                Ok(())
            })
            .unwrap_err();

        assert!(!called);
        assert_eq!(err.kind(), ControlProtocolError::PowerResumeFailed);
        assert_eq!(activity.usage_count(), 0);
        assert_eq!(activity.ops().count(PowerEvent::Idle), 0);
    }

    #[test]
    fn idle_scheduled_after_failed_body() {
        let activity = DeviceActivity::new(FakePower::default(), DEFAULT_AUTOSUSPEND_DELAY);

        let err = activity
            .with_device_active(|| -> Result<(), Error> {
                assert_eq!(activity.usage_count(), 1);
                Err(Error::new(ControlProtocolError::Transport, "no reply"))
            })
            .unwrap_err();

        assert_eq!(err.kind(), ControlProtocolError::Transport);
        assert_eq!(activity.usage_count(), 0);
        assert_eq!(
            *activity.ops().events.lock().unwrap(),
            vec![PowerEvent::Resume, PowerEvent::Busy, PowerEvent::Idle]
        );
    }

    #[test]
    fn idle_failure_does_not_mask_result() {
        let activity = DeviceActivity::new(
            FakePower {
                idle_fails: true,
                ..Default::default()
            },
            DEFAULT_AUTOSUSPEND_DELAY,
        );

        let val = activity.with_device_active(|| Ok(42)).unwrap();
        assert_eq!(val, 42);
        assert_eq!(activity.ops().count(PowerEvent::Idle), 1);
    }

    #[test]
    fn nested_usage() {
        let activity = DeviceActivity::new(FakePower::default(), DEFAULT_AUTOSUSPEND_DELAY);

        activity
            .with_device_active(|| {
                activity.with_device_active(|| {
                    assert_eq!(activity.usage_count(), 2);
                    Ok(())
                })?;
                assert_eq!(activity.usage_count(), 1);
                assert_eq!(activity.ops().count(PowerEvent::Idle), 0);
                Ok(())
            })
            .unwrap();

        assert_eq!(activity.usage_count(), 0);
        assert_eq!(activity.ops().count(PowerEvent::Busy), 2);
        assert_eq!(activity.ops().count(PowerEvent::Idle), 1);

        activity.shutdown().unwrap();
        assert_eq!(activity.ops().count(PowerEvent::Suspend), 1);
    }

    #[test]
    fn concurrent_usage() {
        let activity = DeviceActivity::new(FakePower::default(), DEFAULT_AUTOSUSPEND_DELAY);
        let barrier = Barrier::new(2);
        let (tx, rx) = mpsc::channel();

        thread::scope(|s| {
            let activity = &activity;
            let barrier = &barrier;

            s.spawn(move || {
                activity
                    .with_device_active(|| {
                        barrier.wait();
                        Ok(())
                    })
                    .unwrap();
                tx.send(()).unwrap();
            });

            s.spawn(move || {
                activity
                    .with_device_active(|| {
                        barrier.wait();
                        rx.recv().unwrap();
                        assert_eq!(activity.usage_count(), 1);
                        assert_eq!(activity.ops().count(PowerEvent::Idle), 0);
                        Ok(())
                    })
                    .unwrap();
            });
        });

        assert_eq!(activity.usage_count(), 0);
        assert_eq!(activity.ops().count(PowerEvent::Resume), 2);
        assert_eq!(activity.ops().count(PowerEvent::Idle), 1);
    }
}
