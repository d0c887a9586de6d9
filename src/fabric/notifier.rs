//! Death notification thread.
//!
//! Notifications are delivered in the order processes were killed, never on
//! the thread that called `kill`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::Weak;
use std::thread;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::ipc::binder::{DeathRecipient, HandleRef};

pub(super) type Notification = (Weak<dyn DeathRecipient>, HandleRef);

enum Job {
    Deliver(Vec<Notification>),
    Flush(Sender<()>),
}

pub(super) struct Notifier {
    tx: Mutex<Sender<Job>>,
}

impl Notifier {
    /// Starts the delivery thread. It exits once the notifier is dropped and
    /// the queue is drained.
    pub(super) fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let spawned = thread::Builder::new()
            .name("fabric-notifier".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Deliver(batch) => deliver(batch),
                        Job::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            });
        if let Err(err) = spawned {
            error!("[notifier] failed to spawn delivery thread: {err}");
        }
        Self { tx: Mutex::new(tx) }
    }

    pub(super) fn deliver(&self, batch: Vec<Notification>) {
        if batch.is_empty() {
            return;
        }
        if self.tx.lock().send(Job::Deliver(batch)).is_err() {
            warn!("[notifier] delivery thread gone, dropping notifications");
        }
    }

    /// Blocks until everything queued before this call has been delivered.
    /// Must not be called from a death recipient.
    pub(super) fn flush(&self) {
        let (done, wait) = mpsc::channel();
        if self.tx.lock().send(Job::Flush(done)).is_ok() {
            let _ = wait.recv();
        }
    }
}

fn deliver(batch: Vec<Notification>) {
    for (recipient, who) in batch {
        let Some(recipient) = recipient.upgrade() else {
            continue;
        };
        debug!("[notifier] delivering death notification");
        if panic::catch_unwind(AssertUnwindSafe(|| recipient.binder_died(&who))).is_err() {
            warn!("[notifier] death recipient panicked");
        }
    }
}
