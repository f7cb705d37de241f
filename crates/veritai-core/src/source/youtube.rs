//! YouTube transcript loading.
//!
//! Reads the caption track list embedded in the watch page, picks the track
//! for the requested language, and flattens its timedtext XML into segments.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::LoadError;
use crate::source::TranscriptFetcher;

const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap())
}

/// Extract the 11-character video id from any common YouTube URL form.
pub fn extract_video_id(url: &str) -> Result<String, LoadError> {
    let input = url.trim();
    let invalid = || LoadError::InvalidLocator(format!("'{}' is not a YouTube video URL", url));

    if video_id_regex().is_match(input) {
        return Ok(input.to_string());
    }

    let parsed = Url::parse(input).map_err(|_| invalid())?;
    let host = parsed.host_str().unwrap_or("").trim_start_matches("www.");
    let mut segments = parsed.path_segments().into_iter().flatten().filter(|s| !s.is_empty());

    let candidate = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            match segments.next() {
                Some("watch") => parsed
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    };

    candidate
        .filter(|id| video_id_regex().is_match(id))
        .ok_or_else(invalid)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CaptionTrack {
    base_url: String,
    language_code: String,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

const CAPTION_TRACKS_KEY: &str = "\"captionTracks\":";
const PLAYABILITY_KEY: &str = "\"playabilityStatus\":";

/// Deserialize the JSON value that follows `key` in a watch page.
fn embedded_json<T: DeserializeOwned>(watch_html: &str, key: &str) -> Option<T> {
    let start = watch_html.find(key)?;
    serde_json::Deserializer::from_str(&watch_html[start + key.len()..])
        .into_iter::<T>()
        .next()
        .and_then(Result::ok)
}

/// Parse the `captionTracks` array out of a watch page.
pub(crate) fn caption_tracks(watch_html: &str) -> Vec<CaptionTrack> {
    embedded_json(watch_html, CAPTION_TRACKS_KEY).unwrap_or_default()
}

/// Why a watch page without caption tracks is not a playable video page, if
/// it is not one. `None` means the video plays and simply has no captions.
pub(crate) fn unavailable_reason(watch_html: &str) -> Option<String> {
    match embedded_json::<PlayabilityStatus>(watch_html, PLAYABILITY_KEY) {
        Some(p) if p.status == "OK" => None,
        Some(p) => Some(match p.reason {
            Some(reason) => format!("YouTube reports the video as {}: {}", p.status, reason),
            None => format!("YouTube reports the video as {}", p.status),
        }),
        None if watch_html.contains(CAPTION_TRACKS_KEY) => None,
        None => Some("YouTube did not return a video page (consent or bot check)".to_string()),
    }
}

/// Exact language match first, then a match on the primary subtag
/// (`pt` selects `pt-BR`, `pt-BR` selects `pt`).
pub(crate) fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let wanted = language.trim().to_lowercase();
    let primary = |code: &str| code.split(['-', '_']).next().unwrap_or("").to_lowercase();

    tracks
        .iter()
        .find(|t| t.language_code.to_lowercase() == wanted)
        .or_else(|| {
            let wanted_primary = primary(&wanted);
            tracks.iter().find(|t| primary(&t.language_code) == wanted_primary)
        })
}

/// Segments of a timedtext document, ordered by start time.
///
/// Every segment except the last keeps one trailing space so words at
/// segment boundaries stay apart once the segments are concatenated.
pub(crate) fn parse_timedtext(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut timed: Vec<(f64, String)> = Vec::new();
    let mut current: Option<(f64, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"text" => {
                current = Some((start_seconds(&e), String::new()));
            }
            Ok(Event::Text(t)) => {
                if let Some((_, raw)) = current.as_mut() {
                    raw.push_str(&String::from_utf8_lossy(&t));
                }
            }
            // Entity references arrive as their own events; keep them escaped
            // so both escaping layers decode in one place.
            Ok(Event::GeneralRef(r)) => {
                if let Some((_, raw)) = current.as_mut() {
                    raw.push('&');
                    raw.push_str(&String::from_utf8_lossy(&r));
                    raw.push(';');
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"text" => {
                if let Some((start, raw)) = current.take() {
                    let text = decode_segment(&raw);
                    if !text.is_empty() {
                        timed.push((start, text));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(error = %e, segments = timed.len(), "Stopped at malformed timedtext");
                break;
            }
            _ => {}
        }
    }

    timed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let count = timed.len();
    timed
        .into_iter()
        .enumerate()
        .map(|(i, (_, text))| if i + 1 < count { format!("{} ", text) } else { text })
        .collect()
}

fn start_seconds(element: &BytesStart) -> f64 {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"start")
        .and_then(|attr| {
            std::str::from_utf8(&attr.value)
                .ok()
                .and_then(|v| v.trim().parse::<f64>().ok())
        })
        .unwrap_or(0.0)
}

/// Caption text is escaped twice, as XML and then as HTML.
fn decode_segment(raw: &str) -> String {
    let once = decode_entities(raw);
    decode_entities(&once)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode word by word so a bare `&` only leaves its own word as is.
fn decode_entities(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            unescape_with(word, resolve_html5_entity)
                .map(|w| w.into_owned())
                .unwrap_or_else(|_| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone)]
pub struct YoutubeTranscriptFetcher {
    client: Client,
    base_url: String,
}

impl YoutubeTranscriptFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(YOUTUBE_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, LoadError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.8")
            .send()
            .await
            .map_err(|e| LoadError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LoadError::Unreachable(format!("YouTube returned HTTP {}", response.status())));
        }

        response
            .text()
            .await
            .map_err(|e| LoadError::Unreachable(e.to_string()))
    }
}

#[async_trait]
impl TranscriptFetcher for YoutubeTranscriptFetcher {
    async fn fetch(&self, url: &str, language: &str) -> Result<Vec<String>, LoadError> {
        let video_id = extract_video_id(url)?;
        let watch_url = format!("{}/watch?v={}", self.base_url, video_id);
        let watch_html = self.get_text(&watch_url).await?;

        let tracks = caption_tracks(&watch_html);
        debug!(video = %video_id, tracks = tracks.len(), "Found caption tracks");
        if tracks.is_empty() {
            if let Some(reason) = unavailable_reason(&watch_html) {
                return Err(LoadError::Unreachable(reason));
            }
        }

        let track = select_track(&tracks, language).ok_or_else(|| LoadError::NoTranscript {
            language: language.to_string(),
        })?;

        let track_url = Url::parse(&self.base_url)
            .and_then(|base| base.join(&track.base_url))
            .map_err(|e| LoadError::Unreachable(format!("bad caption track URL: {}", e)))?;

        let xml = self.get_text(track_url.as_str()).await?;
        let segments = parse_timedtext(&xml);
        info!(video = %video_id, language = %track.language_code, segments = segments.len(), "Fetched transcript");
        Ok(segments)
    }
}
