//! HTML text helpers: word counts, the substantial-content check and
//! reading-time estimates.

use std::sync::LazyLock;

use scraper::{Html, Selector};

static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("static selector"));

pub fn word_count(html: &str) -> usize {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(|t| t.split_whitespace().count())
        .sum()
}

pub fn paragraph_count(html: &str) -> usize {
    Html::parse_fragment(html).select(&PARAGRAPH).count()
}

/// Whether `html` already holds written content.
///
/// Heuristic only: a section that was cut short mid-write can still pass.
pub fn is_substantial(html: &str, min_words: usize, min_paragraphs: usize) -> bool {
    if html.trim().is_empty() {
        return false;
    }
    let words = word_count(html);
    if words == 0 {
        return false;
    }
    words >= min_words || paragraph_count(html) >= min_paragraphs
}

/// Minutes needed to read `words`, never less than one.
pub fn reading_minutes(words: usize, words_per_minute: usize) -> usize {
    words.div_ceil(words_per_minute.max(1)).max(1)
}

/// `"5 minutes"`, `"1 hour 10 minutes"`, `"2 hours"`.
pub fn format_minutes(minutes: usize) -> String {
    let plural = |n: usize, unit: &str| {
        if n == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };

    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let (hours, rest) = (minutes / 60, minutes % 60);
    if rest == 0 {
        plural(hours, "hour")
    } else {
        format!("{} {}", plural(hours, "hour"), plural(rest, "minute"))
    }
}

/// Estimated reading time of an HTML fragment.
pub fn estimated_time(html: &str, words_per_minute: usize) -> String {
    format_minutes(reading_minutes(word_count(html), words_per_minute))
}

/// Escape text for interpolation into HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_visible_words_only() {
        let html = r#"<h3>Cell <em>walls</em></h3><p class="x">Plants have rigid walls.</p>"#;
        assert_eq!(word_count(html), 6);
        assert_eq!(paragraph_count(html), 1);
    }

    #[test]
    fn substantial_by_words_or_paragraphs() {
        let long = format!("<p>{}</p>", "word ".repeat(150));
        assert!(is_substantial(&long, 150, 3));
        assert!(is_substantial("<p>a</p><p>b</p><p>c</p>", 150, 3));
        assert!(!is_substantial("<p>A short stub.</p>", 150, 3));
        assert!(!is_substantial("   ", 0, 0));
        assert!(!is_substantial("<p></p><p></p><p></p>", 150, 3));
    }

    #[test]
    fn reading_time() {
        assert_eq!(reading_minutes(0, 200), 1);
        assert_eq!(reading_minutes(201, 200), 2);
        assert_eq!(format_minutes(1), "1 minute");
        assert_eq!(format_minutes(45), "45 minutes");
        assert_eq!(format_minutes(60), "1 hour");
        assert_eq!(format_minutes(135), "2 hours 15 minutes");
        assert_eq!(format_minutes(61), "1 hour 1 minute");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"Tom & "Jerry" <b>'s</b>"#),
            "Tom &amp; &quot;Jerry&quot; &lt;b&gt;&#39;s&lt;/b&gt;"
        );
    }
}
