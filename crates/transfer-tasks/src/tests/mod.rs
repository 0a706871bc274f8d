//! Scenario tests for transfer tasks.
//!
//! - `transfer.rs`    - operation statuses and the credentials detour
//! - `credentials.rs` - credentials failures while a transfer waits on them
//! - `cancel.rs`      - user and backend cancellation
//! - `context.rs`     - context construction from configuration

mod harness;
mod transfer;
