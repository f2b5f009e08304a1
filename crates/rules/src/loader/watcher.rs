//! Filesystem event handler for the notify watcher (hot-reload).

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use logpush_core::Config;

use super::core::parse_config;

/// Handle a single filesystem event from the notify watcher.
///
/// Events for other files in the directory are ignored, as are writes that
/// leave the file contents unchanged.
pub(super) fn handle_fs_event(
    event: &Event,
    config_path: &Path,
    last_contents: &Mutex<Option<String>>,
    tx: &UnboundedSender<Config>,
) {
    let relevant = matches!(
        event.kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Create(CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
    );
    if !relevant || !event.paths.iter().any(|p| same_file(p, config_path)) {
        return;
    }

    let contents = match fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "failed to read configuration during hot-reload");
            return;
        }
    };

    {
        let mut last = last_contents.lock().expect("last_contents lock poisoned");
        if last.as_deref() == Some(contents.as_str()) {
            debug!(path = %config_path.display(), "configuration unchanged, skipping reload");
            return;
        }
        *last = Some(contents.clone());
    }

    match parse_config(&contents) {
        Ok(config) => {
            info!(path = %config_path.display(), rules = config.rules.len(), "configuration changed");
            if tx.send(config).is_err() {
                debug!("reload receiver dropped");
            }
        }
        Err(e) => {
            warn!(
                path = %config_path.display(),
                error = %e,
                "failed to parse configuration during hot-reload, keeping previous version"
            );
        }
    }
}

/// Compare by file name, since the watcher reports paths relative to the
/// watched directory's canonical form.
fn same_file(candidate: &Path, config_path: &Path) -> bool {
    candidate.file_name().is_some() && candidate.file_name() == config_path.file_name()
}
