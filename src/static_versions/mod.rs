//! Fixed-layout NetFlow protocols. Only V5 survives in modern deployments;
//! records have a hardwired 48-byte layout and need no templates.

pub mod v5;
