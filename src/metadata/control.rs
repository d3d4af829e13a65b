//! Fault-injection control and static role
//!
//! `crashed` starts false, is toggled only by crash/restore, and is checked at
//! the entry of every data-plane and replication handler through
//! [`NodeControl::guard`]. Role and crash status queries are never gated.

use crate::common::{Error, Result, Role};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct NodeControl {
    role: Role,
    crashed: AtomicBool,
}

impl NodeControl {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            crashed: AtomicBool::new(false),
        }
    }

    pub fn crash(&self) {
        self.crashed.store(true, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.crashed.store(false, Ordering::SeqCst);
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    /// Fail fast with `Unavailable` while crashed
    pub fn guard(&self) -> Result<()> {
        if self.is_crashed() {
            return Err(Error::Unavailable);
        }
        Ok(())
    }
}
