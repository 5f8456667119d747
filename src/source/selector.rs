use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    error::{DemoError, DemoResult},
    orchestrator::{EncodingState, Snapshot},
    source::{preload::Preloader, types::Payload},
};

struct UserFile {
    name: String,
    payload: Payload,
}

/// Payload captured for one encode attempt.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub payload: Payload,
    pub identifier: String,
}

/// What the file panel shows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelectionInfo {
    pub name: String,
    /// Only set for a user selected file.
    pub size: Option<usize>,
}

/// Holds the user's file, or defers to the preloaded default.
///
/// Mutations are refused while an encode is in flight.
pub struct FileSelector {
    preloader: Arc<Preloader>,
    state: watch::Receiver<Snapshot>,
    default_name: String,
    default_identifier: String,
    user: Mutex<Option<UserFile>>,
}

impl FileSelector {
    pub fn new(
        preloader: Arc<Preloader>,
        state: watch::Receiver<Snapshot>,
        default_name: impl Into<String>,
        default_identifier: impl Into<String>,
    ) -> Self {
        Self {
            preloader,
            state,
            default_name: default_name.into(),
            default_identifier: default_identifier.into(),
            user: Mutex::new(None),
        }
    }

    fn user(&self) -> MutexGuard<'_, Option<UserFile>> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_idle(&self, op: &'static str) -> DemoResult<()> {
        let state = self.state.borrow().state;
        if state != EncodingState::Idle {
            log::debug!("Selector: {} rejected while {:?}", op, state);
            return Err(DemoError::invalid(op, state));
        }
        Ok(())
    }

    pub fn select(&self, name: impl Into<String>, data: impl Into<Bytes>) -> DemoResult<()> {
        self.ensure_idle("select")?;
        let file = UserFile {
            name: name.into(),
            payload: Payload::new(data),
        };
        log::info!("Selector: selected {} ({})", file.name, file.payload);
        *self.user() = Some(file);
        Ok(())
    }

    /// Reads `path` and selects it under its file name.
    pub async fn select_path(&self, path: impl AsRef<Path>) -> DemoResult<()> {
        let path = path.as_ref();
        self.ensure_idle("select")?;
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.select(name, data)
    }

    pub fn clear(&self) -> DemoResult<()> {
        self.ensure_idle("clear")?;
        if let Some(file) = self.user().take() {
            log::info!("Selector: cleared {}", file.name);
        }
        Ok(())
    }

    pub fn selection(&self) -> SelectionInfo {
        match self.user().as_ref() {
            Some(file) => SelectionInfo {
                name: file.name.clone(),
                size: Some(file.payload.len()),
            },
            None => SelectionInfo {
                name: self.default_name.clone(),
                size: None,
            },
        }
    }

    pub fn display_name(&self) -> String {
        self.selection().name
    }

    /// The user's payload, else the preloaded default.
    ///
    /// Awaits the preloader when no load has completed yet, joining a load
    /// already in flight.
    pub async fn current_payload(&self) -> Resolved {
        let user = self.user().as_ref().map(|f| Resolved {
            payload: f.payload.clone(),
            identifier: f.name.clone(),
        });
        if let Some(resolved) = user {
            return resolved;
        }

        let payload = match self.preloader.cached() {
            Some(payload) => payload,
            None => {
                log::info!("Selector: default payload not ready, loading on demand");
                self.preloader.preload().await
            }
        };
        Resolved {
            payload,
            identifier: self.default_identifier.clone(),
        }
    }
}

#[cfg(test)]
#[path = "selector_test.rs"]
mod selector_test;
