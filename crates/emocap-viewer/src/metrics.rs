//! Viewer metrics.

use metrics::counter;

pub mod names {
    pub const SYNC_PRESENTATIONS_TOTAL: &str = "emocap_sync_presentations_total";
    pub const AUDIO_RECEIVED_TOTAL: &str = "emocap_viewer_audio_received_total";
    pub const IMAGES_DROPPED_TOTAL: &str = "emocap_viewer_images_dropped_total";
}

/// `mode` is `synchronized` or `timeout`.
pub fn record_presentation(synchronized: bool) {
    let mode = if synchronized { "synchronized" } else { "timeout" };
    counter!(names::SYNC_PRESENTATIONS_TOTAL, "mode" => mode).increment(1);
}

pub fn record_audio_received(persisted: bool) {
    let status = if persisted { "persisted" } else { "failed" };
    counter!(names::AUDIO_RECEIVED_TOTAL, "status" => status).increment(1);
}

pub fn record_image_dropped() {
    counter!(names::IMAGES_DROPPED_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::SYNC_PRESENTATIONS_TOTAL.starts_with("emocap_"));
        assert!(names::AUDIO_RECEIVED_TOTAL.ends_with("_total"));
    }

    #[test]
    fn test_recording_without_recorder() {
        record_presentation(true);
        record_presentation(false);
        record_audio_received(false);
        record_image_dropped();
    }
}
