use std::sync::Arc;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// The local capture session: one audio and one video track shared by every
/// peer connection. Capture itself and enabling/disabling tracks happen
/// outside the orchestrator.
pub struct LocalMedia {
    stream_id: String,
    audio_track: Arc<TrackLocalStaticSample>,
    video_track: Arc<TrackLocalStaticSample>,
}

impl LocalMedia {
    pub fn new(stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();

        let audio_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            stream_id.clone(),
        ));

        let video_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            stream_id.clone(),
        ));

        Self {
            stream_id,
            audio_track,
            video_track,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// References to every track, ready to attach to a peer connection.
    pub fn tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        vec![
            Arc::clone(&self.audio_track) as Arc<dyn TrackLocal + Send + Sync>,
            Arc::clone(&self.video_track) as Arc<dyn TrackLocal + Send + Sync>,
        ]
    }
}
