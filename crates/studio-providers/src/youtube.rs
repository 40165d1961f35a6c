//! YouTube caption scraping.
//!
//! Reads the caption track list embedded in the watch page, picks the
//! English track (or the first one) and downloads it in `json3` format.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use studio_core::http::{check_response, client, transport_error};
use studio_core::{Result, StudioError};

use crate::traits::TranscriptSource;

const PROVIDER: &str = "youtube";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Extract the 11-character video id from a YouTube URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    let re = Regex::new(r"^.*(youtu\.be/|v/|u/\w/|embed/|watch\?v=|&v=)([^#&?]*).*").ok()?;
    let id = re.captures(url)?.get(2)?.as_str();
    (id.chars().count() == 11).then(|| id.to_string())
}

/// Display title for a video transcript document.
pub fn video_title(video_id: &str) -> String {
    format!("YouTube Video ({})", video_id)
}

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    captions: Option<Captions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    player_captions_tracklist_renderer: Option<TrackList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackList {
    #[serde(default)]
    caption_tracks: Vec<CaptionTrack>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,
}

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    segs: Option<Vec<Json3Segment>>,
}

#[derive(Debug, Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: String,
}

fn failure(video_id: &str, reason: impl Into<String>) -> StudioError {
    StudioError::extraction(format!("video {}", video_id), reason)
}

/// Caption track URL from the watch page, English preferred.
fn caption_track_url(video_id: &str, html: &str) -> Result<String> {
    let re = Regex::new(r"ytInitialPlayerResponse\s*=\s*(\{.+?\});")
        .map_err(|e| StudioError::internal(e.to_string()))?;
    let json = re
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| failure(video_id, "Could not find player response in page source"))?;

    let player: PlayerResponse = serde_json::from_str(json.as_str())
        .map_err(|e| failure(video_id, format!("Unreadable player response: {}", e)))?;
    let tracks = player
        .captions
        .and_then(|c| c.player_captions_tracklist_renderer)
        .map(|t| t.caption_tracks)
        .unwrap_or_default();

    let track = tracks
        .iter()
        .find(|t| t.language_code == "en")
        .or_else(|| tracks.first())
        .ok_or_else(|| failure(video_id, "No caption tracks found in player response"))?;

    Ok(format!("{}&fmt=json3", track.base_url))
}

/// Join caption segments into one transcript string.
fn join_segments(video_id: &str, body: &str) -> Result<String> {
    if body.trim().is_empty() {
        return Err(failure(video_id, "Empty transcript response"));
    }
    let data: Json3 = serde_json::from_str(body)
        .map_err(|e| failure(video_id, format!("Invalid transcript JSON: {}", e)))?;

    let lines: Vec<String> = data
        .events
        .into_iter()
        .filter_map(|e| e.segs)
        .map(|segs| segs.into_iter().map(|s| s.utf8).collect::<String>())
        .collect();

    let mut text = lines.join(" ");
    while text.contains("  ") {
        text = text.replace("  ", " ");
    }

    if text.trim().is_empty() {
        return Err(failure(video_id, "No transcript text in caption track"));
    }
    Ok(text)
}

/// Scrapes public captions from youtube.com.
pub struct YouTubeTranscripts {
    http: Client,
}

impl YouTubeTranscripts {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: client(Duration::from_secs(30))?,
        })
    }

    async fn get_text(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let resp = request
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let resp = check_response(PROVIDER, resp).await?;
        resp.text().await.map_err(|e| transport_error(PROVIDER, e))
    }
}

#[async_trait]
impl TranscriptSource for YouTubeTranscripts {
    async fn fetch_transcript(&self, video_id: &str) -> Result<String> {
        let html = self
            .get_text(
                self.http
                    .get(format!("{}{}", WATCH_URL, video_id))
                    .header("Accept-Language", "en-US,en;q=0.9"),
            )
            .await?;

        let track_url = caption_track_url(video_id, &html)?;
        debug!("Fetching caption track for {}", video_id);

        let body = self
            .get_text(
                self.http
                    .get(&track_url)
                    .header("Referer", "https://www.youtube.com/")
                    .header("Origin", "https://www.youtube.com"),
            )
            .await?;

        let transcript = join_segments(video_id, &body)?;
        info!("Fetched transcript for {} ({} chars)", video_id, transcript.len());
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?t=42",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
        ] {
            assert_eq!(extract_video_id(url).as_deref(), Some("dQw4w9WgXcQ"), "{}", url);
        }

        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(extract_video_id("https://example.com/video"), None);
    }

    #[test]
    fn test_video_title() {
        assert_eq!(video_title("dQw4w9WgXcQ"), "YouTube Video (dQw4w9WgXcQ)");
    }

    #[test]
    fn test_caption_track_prefers_english() {
        let html = r#"<script>var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://yt/api?lang=de","languageCode":"de"},{"baseUrl":"https://yt/api?lang=en","languageCode":"en"}]}}};var meta = 1;</script>"#;
        assert_eq!(
            caption_track_url("abc", html).unwrap(),
            "https://yt/api?lang=en&fmt=json3"
        );
    }

    #[test]
    fn test_caption_track_falls_back_to_first() {
        let html = r#"ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://yt/api?lang=es","languageCode":"es"}]}}};"#;
        assert_eq!(
            caption_track_url("abc", html).unwrap(),
            "https://yt/api?lang=es&fmt=json3"
        );
    }

    #[test]
    fn test_caption_track_missing() {
        let err = caption_track_url("abc", "<html>nothing here</html>").unwrap_err();
        assert_eq!(err.error_code(), "EXTRACTION_FAILED");

        let no_tracks = r#"ytInitialPlayerResponse = {"videoDetails":{"title":"x"}};"#;
        assert!(caption_track_url("abc", no_tracks)
            .unwrap_err()
            .to_string()
            .contains("No caption tracks"));
    }

    #[test]
    fn test_join_segments() {
        let body = r#"{"events":[
            {"tStartMs":0},
            {"segs":[{"utf8":"Hello"},{"utf8":" world"}]},
            {"segs":[{"utf8":" and  welcome"}]},
            {"segs":[{"utf8":"back"}]}
        ]}"#;
        assert_eq!(join_segments("abc", body).unwrap(), "Hello world and welcome back");
    }

    #[test]
    fn test_join_segments_rejects_empty() {
        assert!(join_segments("abc", "   ").is_err());
        assert!(join_segments("abc", r#"{"events":[]}"#).is_err());
        assert!(join_segments("abc", "<xml/>").is_err());
    }
}
