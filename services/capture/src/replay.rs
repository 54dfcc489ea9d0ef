//! Replay of recorded capture scripts
//!
//! A script holds the key events of one typing session with their
//! timestamps, the emotion input and the context metadata. Replaying it
//! drives a [`CaptureController`] on a [`ManualClock`] exactly as a live UI
//! would.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use common::emotion::Emotion;
use common::session::Context;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::clock::ManualClock;
use crate::controller::CaptureController;
use crate::persistence::SaveResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Down,
    Up,
}

/// One recorded key signal
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptedKey {
    pub at: f64,
    pub action: KeyAction,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayScript {
    pub context: Context,
    pub text: String,
    #[serde(default)]
    pub keys: Vec<ScriptedKey>,
    /// Slider values for the manual and music contexts
    #[serde(default)]
    pub emotions: BTreeMap<String, u8>,
    /// Emotion picked by hand when webcam detection found nothing
    #[serde(default)]
    pub forced_emotion: Option<Emotion>,
    #[serde(default)]
    pub music_id: Option<String>,
    #[serde(default)]
    pub fixed_text: Option<String>,
}

impl ReplayScript {
    pub async fn load(path: &Path) -> Result<Self> {
        let body = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read replay script {}", path.display()))?;
        serde_json::from_str(&body)
            .with_context(|| format!("Invalid replay script {}", path.display()))
    }
}

/// Feed a script through the controller and save the result
pub async fn replay(
    controller: &mut CaptureController,
    clock: &Arc<ManualClock>,
    script: &ReplayScript,
) -> Result<SaveResult> {
    if controller.context() != script.context {
        controller.switch_mode(script.context).await;
    }
    if let Some(music_id) = &script.music_id {
        controller.set_music(music_id.clone());
    }
    if let Some(phrase) = &script.fixed_text {
        controller.set_fixed_text(phrase.clone());
    }

    for (key, percent) in &script.emotions {
        if let Err(e) = controller.manual_mut().set(key, *percent) {
            warn!("Ignoring scripted emotion: {}", e);
        }
    }

    let tracker = controller.tracker();
    {
        let mut tracker = tracker.lock().await;
        for signal in &script.keys {
            clock.set_ms(signal.at);
            match signal.action {
                KeyAction::Down => tracker.key_down(&signal.key, signal.at),
                KeyAction::Up => tracker.key_up(&signal.key, signal.at),
            }
        }
        tracker.set_text(&script.text);
        debug!("Replayed {} key signals", script.keys.len());
    }

    Ok(controller.save(script.forced_emotion).await?)
}
