//! Display-facing state merged from worker events.

use std::time::{Duration, Instant};

use crate::model::{DetectionResult, DistanceMeasurement};

/// A status line and the instant it stops being shown.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub expires_at: Instant,
}

/// What a front end would draw on top of the live feed.
#[derive(Debug, Clone, Default)]
pub struct LiveView {
    overlay: DetectionResult,
    distance: Option<DistanceMeasurement>,
    progress: Option<u8>,
    status: Option<StatusMessage>,
}

impl LiveView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the overlay wholesale. An empty result also clears the
    /// distance readout.
    pub fn apply_detections(&mut self, result: DetectionResult) {
        if result.is_empty() {
            self.distance = None;
        }
        self.overlay = result;
    }

    pub fn set_distance(&mut self, measurement: DistanceMeasurement) {
        self.distance = Some(measurement);
    }

    /// Progress indicator; hidden again once it reaches 100.
    pub fn set_progress(&mut self, percent: u8) {
        self.progress = (percent < 100).then_some(percent);
    }

    pub fn show_message(&mut self, text: impl Into<String>, timeout: Duration, now: Instant) {
        self.status = Some(StatusMessage {
            text: text.into(),
            expires_at: now + timeout,
        });
    }

    pub fn overlay(&self) -> &DetectionResult {
        &self.overlay
    }

    pub fn distance(&self) -> Option<&DistanceMeasurement> {
        self.distance.as_ref()
    }

    pub fn distance_text(&self) -> Option<String> {
        self.distance.as_ref().map(ToString::to_string)
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    /// The status line still visible at `now`.
    pub fn status_at(&self, now: Instant) -> Option<&str> {
        self.status
            .as_ref()
            .filter(|s| now < s.expires_at)
            .map(|s| s.text.as_str())
    }

    /// Last status line regardless of expiry.
    pub fn last_status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn detected_categories(&self) -> Vec<String> {
        self.overlay.categories().map(str::to_string).collect()
    }

    pub fn can_request_distance(&self) -> bool {
        !self.overlay.is_empty()
    }
}
