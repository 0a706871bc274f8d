//! Scenario tests for credentials tasks.
//!
//! - `add.rs`       - adding credentials, success and failure statuses
//! - `refresh.rs`   - refresh, update and authenticate flows, app lifecycle
//! - `cancel.rs`    - task and supplemental-information cancellation
//! - `sub_tasks.rs` - third-party app authentication and its fallbacks
//! - `context.rs`   - redirect forwarding and defaults
