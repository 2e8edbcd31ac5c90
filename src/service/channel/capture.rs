//! Photo and video capture.
//!
//! Capture is two-phase. The correlated event only says where the media
//! lives on the robot; the bytes come over a separate HTTP(S) fetch
//! authorised by a short-lived certificate. The caller's completion runs
//! only once bytes arrive, or with the error that stopped them.

use std::sync::{Arc, Weak};

use futures_util::StreamExt;

use super::CommandChannel;
use crate::domain::callback_info::{PhotoReadyInfo, VideoReadyInfo};
use crate::domain::command::{PhotoParams, VideoParams};
use crate::domain::{
    Callback, Command, Completion, Robot, TakePhotoInfo, TransactionId, TransactionKind,
    VideoFrame,
};
use crate::error::ToolkitError;
use crate::service::session::SessionShared;
use crate::transport::{Certificate, FrameStream};

impl CommandChannel {
    /// Takes a photo and downloads it.
    ///
    /// Completes once with the image bytes, or with
    /// [`ToolkitError::CertificateFetch`] / [`ToolkitError::MediaFetch`]
    /// if the download fails.
    pub fn take_photo(
        &self,
        params: PhotoParams,
        completion: impl FnMut(Result<TakePhotoInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        let mut completion: Completion<TakePhotoInfo> = Box::new(completion);
        if !self.admit("TakePhoto", &mut completion) {
            return None;
        }
        let session = Arc::downgrade(&self.shared);
        let mut completion = Some(completion);
        Some(self.submit(
            TransactionKind::SingleShot,
            Command::TakePhoto(params),
            move |transaction_id| {
                Callback::<PhotoReadyInfo>::new(move |ready| {
                    let Some(mut completion) = completion.take() else {
                        return;
                    };
                    match ready {
                        Ok(ready) => fetch_photo(&session, transaction_id, ready, completion),
                        Err(error) => completion(Err(error)),
                    }
                })
            },
        ))
    }

    /// Starts a video stream.
    ///
    /// Completes once per frame until the stream ends or the transaction
    /// is cancelled.
    pub fn take_video(
        &self,
        params: VideoParams,
        completion: impl FnMut(Result<VideoFrame, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        let mut completion: Completion<VideoFrame> = Box::new(completion);
        if !self.admit("Video", &mut completion) {
            return None;
        }
        let session = Arc::downgrade(&self.shared);
        let mut completion = Some(completion);
        Some(self.submit(
            TransactionKind::SingleShot,
            Command::Video(params),
            move |transaction_id| {
                Callback::<VideoReadyInfo>::new(move |ready| {
                    let Some(mut completion) = completion.take() else {
                        return;
                    };
                    match ready {
                        Ok(ready) => stream_video(&session, transaction_id, &ready, completion),
                        Err(error) => completion(Err(error)),
                    }
                })
            },
        ))
    }
}

/// Resolves the media URL for `uri` on the connected robot.
fn media_target(shared: &SessionShared, uri: &str) -> Result<(Robot, String), ToolkitError> {
    let robot = shared.connected_robot().ok_or(ToolkitError::NotConnected)?;
    let url = robot.media_url(shared.config.secure_media(), uri);
    Ok((robot, url))
}

async fn certificate(shared: &SessionShared, robot: &Robot) -> Result<Certificate, ToolkitError> {
    shared
        .authenticator
        .certificate(robot)
        .await
        .map_err(|error| match error {
            ToolkitError::CertificateFetch(_) => error,
            other => ToolkitError::CertificateFetch(other.to_string()),
        })
}

fn media_error(error: ToolkitError) -> ToolkitError {
    match error {
        ToolkitError::MediaFetch(_) => error,
        other => ToolkitError::MediaFetch(other.to_string()),
    }
}

fn fetch_photo(
    session: &Weak<SessionShared>,
    transaction_id: TransactionId,
    ready: PhotoReadyInfo,
    mut completion: Completion<TakePhotoInfo>,
) {
    let Some(shared) = session.upgrade() else {
        return;
    };
    let (robot, url) = match media_target(&shared, &ready.uri) {
        Ok(target) => target,
        Err(error) => {
            completion(Err(error));
            return;
        }
    };
    tracing::debug!(%transaction_id, %url, "fetching photo");

    let task_session = Arc::clone(&shared);
    shared
        .media
        .photo
        .start(transaction_id, &shared.runtime, move |generation| async move {
            let shared = task_session;
            let fetched = match certificate(&shared, &robot).await {
                Ok(cert) => shared
                    .fetcher
                    .fetch_photo(&url, &cert)
                    .await
                    .map_err(media_error),
                Err(error) => Err(error),
            };
            shared.media.photo.finish(generation);
            drop(shared);
            match fetched {
                Ok(image) => {
                    tracing::debug!(%transaction_id, bytes = image.len(), "photo fetched");
                    completion(Ok(TakePhotoInfo::from_ready(ready, image)));
                }
                Err(error) => {
                    tracing::warn!(%transaction_id, %error, "photo fetch failed");
                    completion(Err(error));
                }
            }
        });
}

fn stream_video(
    session: &Weak<SessionShared>,
    transaction_id: TransactionId,
    ready: &VideoReadyInfo,
    mut completion: Completion<VideoFrame>,
) {
    let Some(shared) = session.upgrade() else {
        return;
    };
    let (robot, url) = match media_target(&shared, &ready.uri) {
        Ok(target) => target,
        Err(error) => {
            completion(Err(error));
            return;
        }
    };
    tracing::debug!(%transaction_id, %url, "opening video stream");

    // The stream can stay open indefinitely, so the task holds the session
    // weakly between frames.
    let weak = Weak::clone(session);
    let fetcher = Arc::clone(&shared.fetcher);
    let opening = Arc::clone(&shared);
    shared
        .media
        .video
        .start(transaction_id, &shared.runtime, move |generation| async move {
            let opened: Result<FrameStream, ToolkitError> =
                match certificate(&opening, &robot).await {
                    Ok(cert) => fetcher.stream_video(&url, &cert).await.map_err(media_error),
                    Err(error) => Err(error),
                };
            drop(opening);

            let finish = |weak: &Weak<SessionShared>| {
                if let Some(shared) = weak.upgrade() {
                    shared.media.video.finish(generation);
                }
            };

            let mut frames = match opened {
                Ok(frames) => frames,
                Err(error) => {
                    finish(&weak);
                    tracing::warn!(%transaction_id, %error, "video stream failed to open");
                    completion(Err(error));
                    return;
                }
            };

            let mut sequence = 0_u64;
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(data) => {
                        completion(Ok(VideoFrame { data, sequence }));
                        sequence = sequence.wrapping_add(1);
                    }
                    Err(error) => {
                        finish(&weak);
                        tracing::warn!(%transaction_id, %error, "video stream failed");
                        completion(Err(media_error(error)));
                        return;
                    }
                }
            }
            finish(&weak);
            tracing::debug!(%transaction_id, frames = sequence, "video stream ended");
        });
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio_test::assert_ok;

    use crate::config::SessionConfig;
    use crate::domain::command::{PhotoParams, VideoParams};
    use crate::domain::{Command, EventEnvelope, EventType, TakePhotoInfo, VideoFrame};
    use crate::error::ToolkitError;
    use crate::service::RouteOutcome;
    use crate::service::test_support::{Harness, completion};
    use crate::transport::memory::AckMode;

    #[tokio::test]
    async fn photo_is_downloaded_over_https() {
        let h = Harness::new(SessionConfig::default());
        let robot = h.connect().await;

        let (mut rx, done) = completion::<TakePhotoInfo>();
        let Some(id) = h.session.commands().take_photo(PhotoParams::default(), done) else {
            panic!("command should be accepted");
        };
        assert_eq!(
            h.transport.last_sent().map(|r| r.command),
            Some(Command::TakePhoto(PhotoParams::default()))
        );

        let outcome = h.transport.deliver(EventEnvelope::correlated(
            EventType::TakePhoto,
            id,
            json!({ "uri": "/photos/1.jpg", "name": "1.jpg" }),
        ));
        assert_eq!(outcome, Some(RouteOutcome::Resolved));

        let Some(Ok(photo)) = rx.recv().await else {
            panic!("expected a photo");
        };
        assert_eq!(photo.image, vec![0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(photo.uri, "/photos/1.jpg");
        assert_eq!(photo.name.as_deref(), Some("1.jpg"));
        assert_eq!(
            h.media.requests(),
            vec![format!("https://{}:{}/photos/1.jpg", robot.ip(), robot.port())]
        );
        assert_eq!(h.auth.certificates(), 1);
        assert!(!h.session.photo_fetch_active());
        assert!(!h.session.registry().contains(id));
    }

    #[tokio::test]
    async fn simulator_photo_uses_http() {
        let h = Harness::new(SessionConfig::simulator());
        h.connect().await;

        let (mut rx, done) = completion::<TakePhotoInfo>();
        let Some(id) = h.session.commands().take_photo(PhotoParams::default(), done) else {
            panic!("command should be accepted");
        };
        h.transport.deliver(EventEnvelope::correlated(
            EventType::TakePhoto,
            id,
            json!({ "uri": "/photos/2.jpg" }),
        ));
        assert!(matches!(rx.recv().await, Some(Ok(_))));
        assert_eq!(
            h.media.requests(),
            vec!["http://127.0.0.1:8160/photos/2.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn certificate_failure_reaches_caller() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        h.auth
            .fail_certificates(ToolkitError::Internal("token expired".to_string()));

        let (mut rx, done) = completion::<TakePhotoInfo>();
        let Some(id) = h.session.commands().take_photo(PhotoParams::default(), done) else {
            panic!("command should be accepted");
        };
        h.transport.deliver(EventEnvelope::correlated(
            EventType::TakePhoto,
            id,
            json!({ "uri": "/photos/3.jpg" }),
        ));
        let Some(Err(ToolkitError::CertificateFetch(reason))) = rx.recv().await else {
            panic!("expected a certificate failure");
        };
        assert!(reason.contains("token expired"));
        assert!(h.media.requests().is_empty());
        assert!(!h.session.photo_fetch_active());
    }

    #[tokio::test]
    async fn download_failure_reaches_caller() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        h.media
            .set_photo(Err(ToolkitError::MediaFetch("404".to_string())));

        let (mut rx, done) = completion::<TakePhotoInfo>();
        let Some(id) = h.session.commands().take_photo(PhotoParams::default(), done) else {
            panic!("command should be accepted");
        };
        h.transport.deliver(EventEnvelope::correlated(
            EventType::TakePhoto,
            id,
            json!({ "uri": "/photos/4.jpg" }),
        ));
        assert!(matches!(
            rx.recv().await,
            Some(Err(ToolkitError::MediaFetch(_)))
        ));
        assert!(rx.try_recv().is_err());
        assert!(!h.session.photo_fetch_active());
    }

    #[tokio::test]
    async fn video_frames_until_cancelled() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;

        let (mut rx, done) = completion::<VideoFrame>();
        let Some(id) = h.session.commands().take_video(VideoParams::default(), done) else {
            panic!("command should be accepted");
        };
        h.transport.deliver(EventEnvelope::correlated(
            EventType::VideoReady,
            id,
            json!({ "uri": "/video/live" }),
        ));

        for expected in 0..3_u64 {
            let Some(Ok(frame)) = rx.recv().await else {
                panic!("expected a frame");
            };
            assert_eq!(frame.sequence, expected);
        }
        assert!(h.session.video_fetch_active());

        assert!(matches!(h.session.cancel(id).await, Ok(true)));
        assert!(!h.session.video_fetch_active());
        assert_eq!(h.transport.cancelled(), vec![id]);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn new_stream_stops_the_one_it_replaces() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;

        let (mut first_rx, first_done) = completion::<VideoFrame>();
        let Some(first) = h
            .session
            .commands()
            .take_video(VideoParams::default(), first_done)
        else {
            panic!("command should be accepted");
        };
        h.transport.deliver(EventEnvelope::correlated(
            EventType::VideoReady,
            first,
            json!({ "uri": "/video/a" }),
        ));
        for _ in 0..3 {
            assert!(matches!(first_rx.recv().await, Some(Ok(_))));
        }
        assert_eq!(h.media.open_streams(), 1);

        let (mut second_rx, second_done) = completion::<VideoFrame>();
        let Some(second) = h
            .session
            .commands()
            .take_video(VideoParams::default(), second_done)
        else {
            panic!("command should be accepted");
        };
        h.transport.deliver(EventEnvelope::correlated(
            EventType::VideoReady,
            second,
            json!({ "uri": "/video/b" }),
        ));

        // The replaced task is dropped along with its completion.
        let closed = tokio::time::timeout(Duration::from_secs(1), first_rx.recv()).await;
        assert!(matches!(closed, Ok(None)));
        for _ in 0..3 {
            assert!(matches!(second_rx.recv().await, Some(Ok(_))));
        }
        assert_eq!(h.media.open_streams(), 1);

        assert_ok!(h.session.cancel(first).await);
        assert!(h.session.video_fetch_active());
        assert!(matches!(h.session.cancel(second).await, Ok(true)));
        assert!(!h.session.video_fetch_active());
        for _ in 0..10 {
            if h.media.open_streams() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(h.media.open_streams(), 0);
    }

    #[tokio::test]
    async fn finished_stream_clears_slot() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        h.media.set_frames(vec![vec![7], vec![8]], false);

        let (mut rx, done) = completion::<VideoFrame>();
        let Some(id) = h.session.commands().take_video(VideoParams::default(), done) else {
            panic!("command should be accepted");
        };
        h.transport.deliver(EventEnvelope::correlated(
            EventType::VideoReady,
            id,
            json!({ "uri": "/video/clip" }),
        ));

        let mut frames = Vec::new();
        while let Some(Ok(frame)) = rx.recv().await {
            frames.push(frame.data);
            if frames.len() == 2 {
                break;
            }
        }
        assert_eq!(frames, vec![vec![7], vec![8]]);
        for _ in 0..10 {
            if !h.session.video_fetch_active() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!h.session.video_fetch_active());
    }

    #[tokio::test]
    async fn stream_open_failure_reaches_caller() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        h.media
            .fail_streams(ToolkitError::MediaFetch("connection refused".to_string()));

        let (mut rx, done) = completion::<VideoFrame>();
        let Some(id) = h.session.commands().take_video(VideoParams::default(), done) else {
            panic!("command should be accepted");
        };
        h.transport.deliver(EventEnvelope::correlated(
            EventType::VideoReady,
            id,
            json!({ "uri": "/video/live" }),
        ));
        assert!(matches!(
            rx.recv().await,
            Some(Err(ToolkitError::MediaFetch(_)))
        ));
        assert!(!h.session.video_fetch_active());
    }

    #[tokio::test]
    async fn capture_ack_failure_skips_fetch() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        h.transport.set_ack_mode(AckMode::Fail("socket closed".to_string()));

        let (mut rx, done) = completion::<TakePhotoInfo>();
        let Some(id) = h.session.commands().take_photo(PhotoParams::default(), done) else {
            panic!("command should be accepted");
        };
        assert!(matches!(
            rx.recv().await,
            Some(Err(ToolkitError::TransportSend(_)))
        ));
        assert!(!h.session.registry().contains(id));
        assert!(h.media.requests().is_empty());
        assert_eq!(h.auth.certificates(), 0);
    }

    #[tokio::test]
    async fn capture_refused_when_disconnected() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        assert_ok!(h.session.disconnect().await);

        let (mut rx, done) = completion::<VideoFrame>();
        assert!(h.session.commands().take_video(VideoParams::default(), done).is_none());
        assert!(matches!(rx.try_recv(), Ok(Err(ToolkitError::NotConnected))));
    }
}
