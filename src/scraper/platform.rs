//! URL → platform classification.
//!
//! One canonical, deterministically ordered fragment table used by every
//! call site. More specific fragments come first (youtu.be before
//! youtube.com, music.apple.com before apple.com would); anything
//! unmatched is [`Platform::Other`]. Classification is pure, so it can
//! be unit-tested without touching the network.

use crate::model::Platform;

/// Domain-fragment lookup table, checked in order.
const PLATFORM_TABLE: &[(&str, Platform)] = &[
    ("youtu.be", Platform::YouTube),
    ("youtube.com", Platform::YouTube),
    ("open.spotify.com", Platform::Spotify),
    ("spotify.com", Platform::Spotify),
    ("soundcloud.com", Platform::SoundCloud),
    ("beatport.com", Platform::Beatport),
    ("music.apple.com", Platform::AppleMusic),
    ("itunes.apple.com", Platform::AppleMusic),
    ("tidal.com", Platform::Tidal),
    ("deezer.com", Platform::Deezer),
];

/// Classify a URL by case-insensitive domain-fragment lookup.
pub fn classify(url: &str) -> Platform {
    let lower = url.to_lowercase();
    for (fragment, platform) in PLATFORM_TABLE {
        if lower.contains(fragment) {
            return *platform;
        }
    }
    Platform::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_platforms() {
        assert_eq!(
            classify("https://soundcloud.com/deadmau5/strobe"),
            Platform::SoundCloud
        );
        assert_eq!(
            classify("https://www.youtube.com/watch?v=tKi9Z-f6qX4"),
            Platform::YouTube
        );
        assert_eq!(classify("https://youtu.be/tKi9Z-f6qX4"), Platform::YouTube);
        assert_eq!(
            classify("https://www.beatport.com/track/strobe/1234"),
            Platform::Beatport
        );
        assert_eq!(
            classify("https://open.spotify.com/track/abc"),
            Platform::Spotify
        );
        assert_eq!(
            classify("https://music.apple.com/us/album/strobe"),
            Platform::AppleMusic
        );
        assert_eq!(classify("https://tidal.com/browse/track/1"), Platform::Tidal);
        assert_eq!(classify("https://www.deezer.com/track/1"), Platform::Deezer);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("HTTPS://SoundCloud.COM/x"), Platform::SoundCloud);
    }

    #[test]
    fn test_unknown_is_other() {
        assert_eq!(classify("https://example.com/track/1"), Platform::Other);
        assert_eq!(classify("not even a url"), Platform::Other);
    }

    #[test]
    fn test_short_form_beats_long_form() {
        // youtu.be is listed before youtube.com; both map to YouTube,
        // the point is that table order is deterministic.
        assert_eq!(classify("https://youtu.be/abc"), Platform::YouTube);
    }
}
