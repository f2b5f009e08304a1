//! Configuration file loader with hot-reload via `notify` watcher.
//!
//! Reads the YAML (or JSON) configuration file, applies environment
//! overrides, and optionally watches the file for changes, forwarding every
//! successfully parsed new version over a channel.

mod core;
mod watcher;

#[cfg(test)]
mod tests;

pub use self::core::ConfigLoader;
