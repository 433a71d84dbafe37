//! Runtime module — process lifecycle: boot, then one invocation.

pub mod boot;
pub mod invoke;
