//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! Cooperative cancellation for the reconciliation pass

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Cheap cloneable cancellation flag.
///
/// Checked at the entry of the loader and validator and at the top of each
/// service iteration in the converter and reconciler. Cancellation never
/// interrupts an in-flight write; files already on disk stay on disk.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Short-circuit with a cancellation error if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Trip the token on Ctrl-C.
    pub fn hook_ctrl_c(&self) {
        let token = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing current step");
                token.cancel();
            }
        });
    }
}
