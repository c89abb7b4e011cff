//! Post-processing for successful scrapes.
//!
//! Runs after a backend delivered rows: deduplication, duration
//! normalization and best-effort link probing. Nothing here can fail
//! the scrape; probing errors only leave `verified` false.

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::model::Track;
use crate::ratelimit::RequestLimiter;

/// Max in-flight HEAD probes during link verification.
const VERIFY_CONCURRENCY: usize = 10;

/// Per-probe timeout. Probes are advisory, so this is short.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drop repeated tracks, first occurrence wins.
///
/// The key is the whitespace-normalized, lowercased (title, artist)
/// pair; sets frequently repeat a track in "w/" overlay rows.
pub fn dedupe_tracks(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|track| {
            let key = (
                track.title.to_lowercase(),
                track
                    .artist
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase(),
            );
            seen.insert(key)
        })
        .collect()
}

/// Parse a displayed duration/cue string into a [`Duration`].
///
/// Accepts "SS" / "M:SS" / "H:MM:SS" forms; anything else is `None`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    let mut seconds: u64 = 0;
    for (i, part) in parts.iter().enumerate() {
        let value: u64 = part.trim().parse().ok()?;
        // Minute/second fields above 59 only make sense in the
        // single-field "225" form.
        if i > 0 && value > 59 {
            return None;
        }
        seconds = seconds * 60 + value;
    }
    Some(Duration::from_secs(seconds))
}

/// Fill `metadata.duration` from each track's displayed time and
/// canonicalize the display string.
pub fn normalize_durations(tracks: &mut [Track]) {
    for track in tracks.iter_mut() {
        let Some(ref time) = track.time else { continue };
        let Some(duration) = parse_duration(time) else {
            tracing::debug!("Unparseable time {:?} on {:?}", time, track.title);
            continue;
        };
        track.metadata.get_or_insert_with(Default::default).duration = Some(duration);
        track.time = Some(format_duration(duration));
    }
}

/// Canonical "M:SS" / "H:MM:SS" rendering.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// HEAD-probe every link, bounded fan-out, best-effort.
///
/// A probe that succeeds with a 2xx/3xx marks the link verified; any
/// failure (timeout, DNS, 4xx/5xx) leaves it unverified and keeps the
/// link — a flaky CDN should not erase data.
pub async fn verify_links(
    tracks: &mut [Track],
    http_client: &reqwest::Client,
    limiter: &RequestLimiter,
) {
    let targets: Vec<(usize, usize, String)> = tracks
        .iter()
        .enumerate()
        .flat_map(|(ti, track)| {
            track
                .links
                .iter()
                .enumerate()
                .map(move |(li, link)| (ti, li, link.url.clone()))
        })
        .collect();

    if targets.is_empty() {
        return;
    }

    let outcomes: Vec<(usize, usize, bool)> = stream::iter(targets)
        .map(|(ti, li, url)| async move {
            let _permit = limiter.acquire().await;
            let ok = match http_client
                .head(&url)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    status.is_success() || status.is_redirection()
                }
                Err(e) => {
                    tracing::debug!("Link probe failed for {}: {}", url, e);
                    false
                }
            };
            (ti, li, ok)
        })
        .buffer_unordered(VERIFY_CONCURRENCY)
        .collect()
        .await;

    for (ti, li, ok) in outcomes {
        if let Some(link) = tracks.get_mut(ti).and_then(|t| t.links.get_mut(li)) {
            link.verified = ok;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Platform, TrackLink};

    fn track(title: &str, artist: Option<&str>) -> Track {
        let mut t = Track::new(1, title).unwrap();
        t.artist = artist.map(String::from);
        t
    }

    #[test]
    fn test_dedupe_first_wins() {
        let mut first = track("Strobe", Some("deadmau5"));
        first.label = Some("mau5trap".to_string());
        let duplicate = track("strobe", Some("Deadmau5"));
        let other = track("Opus", Some("Eric Prydz"));

        let deduped = dedupe_tracks(vec![first, duplicate, other]);
        assert_eq!(deduped.len(), 2);
        // First occurrence keeps its extra data.
        assert_eq!(deduped[0].label.as_deref(), Some("mau5trap"));
    }

    #[test]
    fn test_dedupe_distinguishes_artist() {
        let a = track("Strobe", Some("deadmau5"));
        let b = track("Strobe", Some("Someone Else"));
        assert_eq!(dedupe_tracks(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("3:45"), Some(Duration::from_secs(225)));
        assert_eq!(parse_duration("1:02:03"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_duration("225"), Some(Duration::from_secs(225)));
        assert_eq!(parse_duration("0:00"), Some(Duration::from_secs(0)));
    }

    #[test]
    fn test_parse_duration_rejects_junk() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("1:99"), None);
        assert_eq!(parse_duration("1:2:3:4"), None);
    }

    #[test]
    fn test_normalize_durations_fills_metadata() {
        let mut tracks = vec![track("Strobe", None)];
        tracks[0].time = Some("03:45".to_string());
        normalize_durations(&mut tracks);

        assert_eq!(tracks[0].time.as_deref(), Some("3:45"));
        assert_eq!(
            tracks[0].metadata.as_ref().unwrap().duration,
            Some(Duration::from_secs(225))
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(225)), "3:45");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
        assert_eq!(format_duration(Duration::from_secs(5)), "0:05");
    }

    #[tokio::test]
    async fn test_verify_links_marks_failures_unverified_and_keeps_link() {
        // Unroutable address: every probe fails, nothing is removed.
        let mut tracks = vec![track("Strobe", Some("deadmau5"))];
        tracks[0].add_link(TrackLink::new(
            Platform::Other,
            "http://127.0.0.1:1/track/dead",
        ));

        let client = reqwest::Client::new();
        let limiter = RequestLimiter::new(4, Duration::from_millis(1));
        verify_links(&mut tracks, &client, &limiter).await;

        assert_eq!(tracks[0].links.len(), 1);
        assert!(!tracks[0].links[0].verified);
    }
}
