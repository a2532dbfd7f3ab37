//! Table-driven Japanese transliteration.
//!
//! The conversions here are best-effort: kanji are only converted when the
//! whole word appears in a fixed reading table, and runs of kana are
//! romanized with Hepburn spelling by `ib_romaji`. There is no morphological
//! analysis, so particles (は, へ) keep their kana reading and unknown kanji
//! pass through unchanged. Consumers must not rely on linguistic correctness.

use ib_romaji::HepburnRomanizer;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::data::Lyrics;

/// Kanji (and kanji + okurigana) readings known to the table transliterator
const KANJI_READINGS: &[(&str, &str)] = &[
    ("愛してる", "あいしてる"),
    ("聞こえる", "きこえる"),
    ("会いたい", "あいたい"),
    ("見える", "みえる"),
    ("駆ける", "かける"),
    ("想う", "おもう"),
    ("探す", "さがす"),
    ("今日", "きょう"),
    ("明日", "あした"),
    ("世界", "せかい"),
    ("二人", "ふたり"),
    ("未来", "みらい"),
    ("永遠", "えいえん"),
    ("笑顔", "えがお"),
    ("記憶", "きおく"),
    ("私", "わたし"),
    ("僕", "ぼく"),
    ("君", "きみ"),
    ("声", "こえ"),
    ("姿", "すがた"),
    ("夢", "ゆめ"),
    ("夜", "よる"),
    ("空", "そら"),
    ("心", "こころ"),
    ("愛", "あい"),
    ("恋", "こい"),
    ("涙", "なみだ"),
    ("花", "はな"),
    ("星", "ほし"),
    ("風", "かぜ"),
    ("雨", "あめ"),
    ("光", "ひかり"),
    ("歌", "うた"),
    ("何", "なに"),
    ("時", "とき"),
    ("人", "ひと"),
    ("手", "て"),
    ("目", "め"),
    ("胸", "むね"),
    ("海", "うみ"),
    ("道", "みち"),
];

lazy_static! {
    static ref ROMANIZER: HepburnRomanizer = HepburnRomanizer::default();
}

/// Hiragana reading shown next to the original text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Furigana {
    pub kanji: String,
    pub hiragana: String,
    pub combined: String,
}

/// All readings of a text, used to widen searches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readings {
    pub original: String,
    pub hiragana: String,
    pub romaji: String,
    pub katakana: String,
    /// The distinct readings, in the order original, hiragana, romaji, katakana
    pub readings: Vec<String>,
}

/// Converts Japanese text between scripts
pub trait Transliterator: Send + Sync {
    fn to_hiragana(&self, text: &str) -> String;

    fn to_romaji(&self, text: &str) -> String;

    fn to_katakana(&self, text: &str) -> String;

    /// Name of the implementation, reported by the API
    fn name(&self) -> &'static str;

    /// Produce all lyrics formats for an original text
    fn process_lyrics(&self, text: &str) -> Lyrics {
        Lyrics {
            original: text.to_string(),
            hiragana: self.to_hiragana(text),
            romaji: self.to_romaji(text),
        }
    }

    fn add_furigana(&self, text: &str) -> Furigana {
        let hiragana = self.to_hiragana(text);
        Furigana {
            kanji: text.to_string(),
            combined: format!("{} ({})", text, hiragana),
            hiragana,
        }
    }

    fn extract_readings(&self, text: &str) -> Readings {
        let hiragana = self.to_hiragana(text);
        let romaji = self.to_romaji(text);
        let katakana = self.to_katakana(text);

        let mut readings: Vec<String> = Vec::new();
        for reading in [text, hiragana.as_str(), romaji.as_str(), katakana.as_str()] {
            if !readings.iter().any(|r| r == reading) {
                readings.push(reading.to_string());
            }
        }

        Readings {
            original: text.to_string(),
            hiragana,
            romaji,
            katakana,
            readings,
        }
    }
}

/// Check if text contains hiragana, katakana or CJK ideographs
pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' | '\u{4E00}'..='\u{9FAF}')
    })
}

fn katakana_to_hiragana(c: char) -> char {
    match c {
        'ァ'..='ヶ' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        _ => c,
    }
}

fn hiragana_to_katakana(c: char) -> char {
    match c {
        'ぁ'..='ゖ' => char::from_u32(c as u32 + 0x60).unwrap_or(c),
        _ => c,
    }
}

fn is_kana(c: char) -> bool {
    matches!(c, '\u{3041}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}')
}

fn flush_kana_run(run: &mut String, output: &mut String) {
    if run.is_empty() {
        return;
    }
    match ROMANIZER.romanize_kana_str_all(run.as_str()) {
        Some(romaji) if !romaji.is_empty() => output.push_str(&romaji),
        _ => output.push_str(run),
    }
    run.clear();
}

/// Romanize every run of kana, leaving everything else as it is
fn romanize_kana(text: &str) -> String {
    let mut output = String::with_capacity(text.len() * 2);
    let mut run = String::new();
    for c in text.chars() {
        if is_kana(c) {
            run.push(c);
        } else {
            flush_kana_run(&mut run, &mut output);
            output.push(c);
        }
    }
    flush_kana_run(&mut run, &mut output);
    output
}

/// Transliterator backed by fixed substitution tables
#[derive(Debug, Clone)]
pub struct TableTransliterator {
    /// Word readings, longest entries first so compounds win over single kanji
    readings: Vec<(String, String)>,
}

impl TableTransliterator {
    pub fn new() -> Self {
        Self::with_readings(KANJI_READINGS.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    /// Create a transliterator with a custom reading table
    pub fn with_readings<I>(readings: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut readings: Vec<(String, String)> = readings.into_iter().collect();
        readings.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
        TableTransliterator { readings }
    }

    fn apply_readings(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (word, reading) in &self.readings {
            if result.contains(word.as_str()) {
                result = result.replace(word.as_str(), reading);
            }
        }
        result
    }
}

impl Default for TableTransliterator {
    fn default() -> Self {
        Self::new()
    }
}

impl Transliterator for TableTransliterator {
    fn to_hiragana(&self, text: &str) -> String {
        self.apply_readings(text).chars().map(katakana_to_hiragana).collect()
    }

    fn to_romaji(&self, text: &str) -> String {
        romanize_kana(&self.to_hiragana(text))
    }

    fn to_katakana(&self, text: &str) -> String {
        self.to_hiragana(text).chars().map(hiragana_to_katakana).collect()
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_japanese() {
        assert!(contains_japanese("こんにちは"));
        assert!(contains_japanese("カタカナ"));
        assert!(contains_japanese("漢字"));
        assert!(contains_japanese("YOASOBI - 夜に駆ける"));
        assert!(!contains_japanese("hello world"));
        assert!(!contains_japanese(""));
    }

    #[test]
    fn test_to_hiragana() {
        let t = TableTransliterator::new();
        assert_eq!(t.to_hiragana("カタカナ"), "かたかな");
        assert_eq!(t.to_hiragana("君の声"), "きみのこえ");
        assert_eq!(t.to_hiragana("今日も"), "きょうも");
        assert_eq!(t.to_hiragana("hello"), "hello");
    }

    #[test]
    fn test_longest_reading_wins() {
        let t = TableTransliterator::new();
        // 二人 must not be read as 二 + 人
        assert_eq!(t.to_hiragana("二人"), "ふたり");
    }

    #[test]
    fn test_to_romaji() {
        let t = TableTransliterator::new();
        assert_eq!(t.to_romaji("きみのこえ"), "kiminokoe");
        assert_eq!(t.to_romaji("君の声"), "kiminokoe");
        assert_eq!(t.to_romaji("ヒカリ"), "hikari");
        assert_eq!(t.to_romaji("しゃしん"), "shashin");
    }

    #[test]
    fn test_sokuon_and_long_vowels() {
        let t = TableTransliterator::new();
        assert!(t.to_romaji("がっこう").starts_with("gakk"));
        for text in ["まっちゃ", "きょうはいいてんき", "しんぶん"] {
            let romaji = t.to_romaji(text);
            assert!(!contains_japanese(&romaji), "{} -> {}", text, romaji);
        }
    }

    #[test]
    fn test_unknown_characters_pass_through() {
        let t = TableTransliterator::new();
        assert_eq!(t.to_romaji("Hello 世界"), "Hello sekai");
        assert_eq!(t.to_romaji("龍"), "龍");
    }

    #[test]
    fn test_to_katakana() {
        let t = TableTransliterator::new();
        assert_eq!(t.to_katakana("ひらがな"), "ヒラガナ");
        assert_eq!(t.to_katakana("夢"), "ユメ");
    }

    #[test]
    fn test_process_lyrics() {
        let t = TableTransliterator::new();
        let lyrics = t.process_lyrics("夢の中へ");
        assert_eq!(lyrics.original, "夢の中へ");
        assert_eq!(lyrics.hiragana, "ゆめの中へ");
        assert_eq!(lyrics.romaji, "yumeno中he");
    }

    #[test]
    fn test_add_furigana() {
        let t = TableTransliterator::new();
        let furigana = t.add_furigana("私");
        assert_eq!(furigana.kanji, "私");
        assert_eq!(furigana.hiragana, "わたし");
        assert_eq!(furigana.combined, "私 (わたし)");
    }

    #[test]
    fn test_extract_readings_deduplicates() {
        let t = TableTransliterator::new();
        let readings = t.extract_readings("hello");
        assert_eq!(readings.readings, vec!["hello"]);

        let readings = t.extract_readings("星");
        assert_eq!(readings.readings, vec!["星", "ほし", "hoshi", "ホシ"]);
    }

    #[test]
    fn test_custom_readings() {
        let t = TableTransliterator::with_readings(vec![("東京".to_string(), "とうきょう".to_string())]);
        assert_eq!(t.to_hiragana("東京"), "とうきょう");
        assert!(t.to_romaji("東京").starts_with("t"));
        assert_eq!(t.to_romaji("君"), "君");
    }
}
