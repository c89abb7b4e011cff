//! Candidate matching for catalog search results.
//!
//! A search page gives us a pile of anchors; exactly one of them (at
//! most) is the track we are looking for. Each anchor is scored against
//! the search target with additive bonuses and penalties, and the top
//! candidate is accepted only when it clears a confidence floor. A wrong
//! match poisons everything downstream of it (persisted tags, the UI,
//! the download pipeline), so below the floor we prefer returning
//! nothing at all.
//!
//! The constants here are deliberately named and grouped: they encode a
//! relative ordering (exact title > all words > partial words, matched
//! version > unrequested version, ...) and are the first thing to retune
//! against a labeled corpus when match quality drifts.

use once_cell::sync::Lazy;
use regex::Regex;

/// A scraped anchor under consideration.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub text: String,
    pub href: String,
    pub score: i32,
}

/// Exact (normalized) title substring match.
const EXACT_TITLE_BONUS: i32 = 100;
/// Each significant title word found in the candidate.
const TITLE_WORD_BONUS: i32 = 10;
/// Every significant title word present.
const ALL_WORDS_BONUS: i32 = 30;
/// Artist name found in the candidate.
const ARTIST_BONUS: i32 = 40;
/// Title and artist both present.
const TITLE_AND_ARTIST_BONUS: i32 = 80;
/// Artist present but title absent: almost certainly a different track
/// by the same artist.
const ARTIST_WITHOUT_TITLE_PENALTY: i32 = -120;
/// Candidate matches an explicitly requested version qualifier.
const VERSION_MATCH_BONUS: i32 = 60;
/// Candidate carries a version qualifier the target never asked for.
const UNREQUESTED_QUALIFIER_PENALTY: i32 = -40;
/// "Original" mix when no version was requested.
const ORIGINAL_BONUS: i32 = 25;

/// Minimum score for [`best_match`] to accept a candidate.
pub const MIN_CONFIDENCE: i32 = 60;

/// Version qualifiers that mark a non-canonical rendition. A candidate
/// carrying one of these is penalized unless the target asked for it.
const VERSION_QUALIFIERS: &[&str] = &["remix", "edit", "club", "bootleg", "vip", "extended"];

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[(\[][^)\]]*[)\]]").unwrap());

/// Words too generic to indicate a match on their own.
const STOP_WORDS: &[&str] = &["the", "and", "feat", "ft", "featuring", "vs", "mix", "with"];

/// Lowercase and flatten punctuation to single spaces.
fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();
    NON_ALNUM.replace_all(&lower, " ").trim().to_string()
}

/// Title with bracketed version annotations removed:
/// "Strobe (Club Edit)" → "strobe".
fn base_title(title: &str) -> String {
    let stripped = PARENTHESIZED.replace_all(title, " ");
    normalize(&stripped)
}

/// Significant words of the full title (qualifiers included — a
/// candidate repeating them is a better match).
fn significant_words(title: &str) -> Vec<String> {
    normalize(title)
        .split(' ')
        .filter(|w| w.len() >= 3 && !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Version qualifiers the target explicitly asks for.
fn requested_qualifiers(title: &str) -> Vec<&'static str> {
    let norm = normalize(title);
    let words: Vec<&str> = norm.split(' ').collect();
    VERSION_QUALIFIERS
        .iter()
        .filter(|q| words.contains(&**q))
        .copied()
        .collect()
}

/// Score one candidate string against the search target.
pub fn score_candidate(candidate_text: &str, target_title: &str, target_artist: &str) -> i32 {
    let cand = normalize(candidate_text);
    let cand_words: Vec<&str> = cand.split(' ').collect();
    let full_title = normalize(target_title);
    let base = base_title(target_title);
    let artist = normalize(target_artist);

    let mut score = 0;

    if !full_title.is_empty() && cand.contains(&full_title) {
        score += EXACT_TITLE_BONUS;
    }

    let words = significant_words(target_title);
    let found = words.iter().filter(|w| cand_words.contains(&w.as_str())).count();
    score += found as i32 * TITLE_WORD_BONUS;
    if !words.is_empty() && found == words.len() {
        score += ALL_WORDS_BONUS;
    }

    // "Title present" means the base title, qualifiers stripped, so a
    // different version of the right track is not mistaken for a
    // different track outright.
    let title_present = !base.is_empty() && cand.contains(&base);
    let artist_present = !artist.is_empty() && cand.contains(&artist);

    if artist_present {
        score += ARTIST_BONUS;
        if title_present {
            score += TITLE_AND_ARTIST_BONUS;
        } else {
            score += ARTIST_WITHOUT_TITLE_PENALTY;
        }
    }

    let requested = requested_qualifiers(target_title);
    if requested.is_empty() {
        if cand_words.contains(&"original") {
            score += ORIGINAL_BONUS;
        }
    } else if requested.iter().all(|q| cand_words.contains(q)) {
        score += VERSION_MATCH_BONUS;
    }
    for qualifier in VERSION_QUALIFIERS {
        if cand_words.contains(qualifier) && !requested.contains(qualifier) {
            score += UNREQUESTED_QUALIFIER_PENALTY;
        }
    }

    score
}

/// Rank candidates and return the winner, or `None` when nothing clears
/// [`MIN_CONFIDENCE`]. Never returns the best of a bad set.
pub fn best_match(
    anchors: impl IntoIterator<Item = (String, String)>,
    target_title: &str,
    target_artist: &str,
) -> Option<Candidate> {
    let mut candidates: Vec<Candidate> = anchors
        .into_iter()
        .map(|(text, href)| {
            let score = score_candidate(&text, target_title, target_artist);
            Candidate { text, href, score }
        })
        .collect();

    candidates.sort_by(|a, b| b.score.cmp(&a.score));

    match candidates.into_iter().next() {
        Some(top) if top.score >= MIN_CONFIDENCE => {
            tracing::debug!(
                "Matched \"{}\" (score {}) for \"{} - {}\"",
                top.text,
                top.score,
                target_artist,
                target_title
            );
            Some(top)
        }
        Some(top) => {
            tracing::debug!(
                "No confident match for \"{} - {}\" (best {} scored {})",
                target_artist,
                target_title,
                top.text,
                top.score
            );
            None
        }
        None => None,
    }
}
