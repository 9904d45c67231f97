use crate::score::MAX_VICINITY_BOOST;

/// Boost for a label found in surrounding text rather than in the alt text.
pub const CONTEXT_BOOST: f64 = MAX_VICINITY_BOOST / 2.0;

/// Lower-case, whitespace-collapsed form used for label comparisons.
pub fn normalize_label(label: &str) -> String {
    words(label).join(" ")
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn word_matches(text_word: &str, label_word: &str) -> bool {
    text_word == label_word
        || text_word
            .strip_prefix(label_word)
            .is_some_and(|rest| rest == "s" || rest == "es")
}

fn contains_phrase(text: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > text.len() {
        return false;
    }
    text.windows(phrase.len()).any(|window| {
        window
            .iter()
            .zip(phrase)
            .all(|(t, p)| word_matches(t, p))
    })
}

/// First label (longest phrases first) occurring as whole words in `text`.
/// Plural `s`/`es` endings in the text still match.
pub fn match_label<'a>(text: &str, labels: &'a [String]) -> Option<&'a str> {
    let text_words = words(text);
    let mut ordered: Vec<(&'a String, Vec<String>)> =
        labels.iter().map(|label| (label, words(label))).collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    ordered
        .into_iter()
        .find(|(_, phrase)| contains_phrase(&text_words, phrase))
        .map(|(label, _)| label.as_str())
}

/// Label and additive boost for an image: alt text first, then nearby text.
pub fn match_vicinity(
    alt_text: Option<&str>,
    context: Option<&str>,
    labels: &[String],
) -> Option<(String, f64)> {
    if let Some(label) = alt_text.and_then(|alt| match_label(alt, labels)) {
        return Some((label.to_string(), MAX_VICINITY_BOOST));
    }
    context
        .and_then(|text| match_label(text, labels))
        .map(|label| (label.to_string(), CONTEXT_BOOST))
}
