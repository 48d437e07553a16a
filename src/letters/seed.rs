//! Fixed seed vocabulary and the loader that installs it
//!
//! Each level is loaded at most once per database: the presence check and
//! the insert run in one immediate transaction, and a `seed_state` row marks
//! the level as done.

use anyhow::Result;
use tracing::{debug, info};

use super::{LetterEntry, SqliteLetterStore};
use crate::types::Level;

/// Level 1: individual consonants and vowels
pub const LEVEL1_SYMBOLS: &[(&str, &str)] = &[
    ("ㄱ", "111011"),
    ("ㄴ", "011011"),
    ("ㄷ", "101011"),
    ("ㄹ", "111101"),
    ("ㅁ", "011101"),
    ("ㅂ", "111001"),
    ("ㅅ", "111110"),
    ("ㅈ", "111010"),
    ("ㅊ", "111100"),
    ("ㅋ", "001011"),
    ("ㅌ", "001011"),
    ("ㅍ", "011001"),
    ("ㅎ", "101001"),
    ("ㅏ", "001110"),
    ("ㅑ", "110001"),
    ("ㅓ", "100011"),
    ("ㅕ", "011100"),
    ("ㅗ", "010110"),
    ("ㅛ", "110010"),
    ("ㅜ", "010011"),
    ("ㅠ", "011010"),
    ("ㅡ", "101010"),
    ("ㅣ", "010101"),
];

/// Level 2: consonant + vowel syllable blocks
pub const LEVEL2_SYLLABLES: &[(&str, &str)] = &[
    ("가", "111011001110"),
    ("갸", "111011100011"),
    ("거", "111011100011"),
    ("겨", "111011011100"),
    ("고", "111011010110"),
    ("교", "111011110010"),
    ("구", "111011010011"),
    ("규", "111011011010"),
    ("그", "111011101010"),
    ("기", "111011010101"),
    ("나", "011011001110"),
    ("냐", "011011110001"),
    ("너", "011011100011"),
    ("녀", "011011011100"),
    ("노", "011011010110"),
    ("뇨", "011011110010"),
    ("누", "011011010011"),
    ("뉴", "011011011010"),
    ("느", "011011101010"),
    ("니", "011011010101"),
    ("다", "101011001110"),
    ("댜", "101011110001"),
    ("더", "101011100011"),
    ("뎌", "101011011100"),
    ("도", "101011010110"),
    ("됴", "101011110010"),
    ("두", "101011010011"),
    ("듀", "101011011010"),
    ("드", "101011101010"),
    ("디", "101011010101"),
    ("라", "111101001110"),
    ("랴", "111101110001"),
    ("러", "111101100011"),
    ("려", "111101011100"),
    ("로", "111101010110"),
    ("료", "111101110010"),
    ("루", "111101010011"),
    ("류", "111101011010"),
    ("르", "111101101010"),
    ("리", "111101010101"),
    ("마", "011101001110"),
    ("먀", "011101110001"),
    ("머", "011101100011"),
    ("며", "011101011100"),
    ("모", "011101010110"),
    ("묘", "011101110010"),
    ("무", "011101010011"),
    ("뮤", "011101011010"),
    ("므", "011101101010"),
    ("미", "011101010101"),
    ("바", "111001001110"),
    ("뱌", "111001110001"),
    ("버", "111001100011"),
    ("벼", "111001011100"),
    ("보", "111001010110"),
    ("뵤", "111001110010"),
    ("부", "111001010011"),
    ("뷰", "111001011010"),
    ("브", "111001101010"),
    ("비", "111001010101"),
    ("사", "111110001110"),
    ("샤", "111110110001"),
    ("서", "111110100011"),
    ("셔", "111110011100"),
    ("소", "111110010110"),
    ("쇼", "111110110010"),
    ("수", "111110010011"),
    ("슈", "111110011010"),
    ("스", "111110101010"),
    ("시", "111110010101"),
    ("자", "111010001110"),
    ("쟈", "111010110001"),
    ("저", "111010100011"),
    ("져", "111010011100"),
    ("조", "111010010110"),
    ("죠", "111010110010"),
    ("주", "111010010011"),
    ("쥬", "111010011010"),
    ("즈", "111010101010"),
    ("지", "111010010101"),
    ("차", "111100001110"),
    ("챠", "111100110001"),
    ("처", "111100100011"),
    ("쳐", "111100011100"),
    ("초", "111100010110"),
    ("쵸", "111100110010"),
    ("추", "111100010011"),
    ("츄", "111100011010"),
    ("츠", "111100101010"),
    ("치", "111100010101"),
    ("카", "001011001110"),
    ("캬", "001011110001"),
    ("커", "001011100011"),
    ("켜", "001011011100"),
    ("코", "001011010110"),
    ("쿄", "001011110010"),
    ("쿠", "001011010011"),
    ("큐", "001011011010"),
    ("크", "001011101010"),
    ("키", "001011010101"),
    ("타", "001011001110"),
    ("탸", "001011110001"),
    ("터", "001011100011"),
    ("텨", "001011011100"),
    ("토", "001011010110"),
    ("툐", "001011110010"),
    ("투", "001011010011"),
    ("튜", "001011011010"),
    ("트", "001011101010"),
    ("티", "001011010101"),
    ("파", "011001001110"),
    ("퍄", "011001110001"),
    ("퍼", "011001100011"),
    ("펴", "011001011100"),
    ("포", "011001010110"),
    ("표", "011001110010"),
    ("푸", "011001010011"),
    ("퓨", "011001011010"),
    ("프", "011001101010"),
    ("피", "011001010101"),
    ("하", "101001001110"),
    ("햐", "101001110001"),
    ("허", "101001100011"),
    ("혀", "101001011100"),
    ("호", "101001010110"),
    ("효", "101001110010"),
    ("후", "101001010011"),
    ("휴", "101001011010"),
    ("흐", "101001101010"),
    ("히", "101001010101"),
];

/// Level 3: abbreviated syllables and connective words
pub const LEVEL3_WORDS: &[(&str, &str)] = &[
    ("가", "001010"),
    ("나", "011011"),
    ("다", "101011"),
    ("마", "011010"),
    ("바", "111001"),
    ("사", "000111"),
    ("자", "111010"),
    ("카", "001011"),
    ("타", "001101"),
    ("파", "011001"),
    ("하", "101001"),
    ("것", "111000100011"),
    ("억", "011000"),
    ("언", "100000"),
    ("얼", "100001"),
    ("연", "011110"),
    ("열", "001100"),
    ("영", "001000"),
    ("옥", "010010"),
    ("운", "001001"),
    ("온", "000100"),
    ("을", "100010"),
    ("은", "010100"),
    ("인", "000001"),
    ("그래서", "011111100011"),
    ("그러나", "011111011011"),
    ("그러면", "011111101101"),
    ("그러므로", "011111101110"),
    ("그런데", "011111010001"),
    ("그리고", "011111010110"),
    ("그리하여", "011111011100"),
];

/// Literal vocabulary table for a level
pub fn vocabulary(level: Level) -> &'static [(&'static str, &'static str)] {
    match level {
        Level::Symbols => LEVEL1_SYMBOLS,
        Level::Syllables => LEVEL2_SYLLABLES,
        Level::Words => LEVEL3_WORDS,
    }
}

/// Seed rows for a level, ids left for the store to generate
pub fn seed_entries(level: Level) -> Vec<LetterEntry> {
    vocabulary(level)
        .iter()
        .map(|(text, pattern)| LetterEntry::new(level, *text, *pattern))
        .collect()
}

/// Outcome of a seeding pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Levels that received rows, with the row count
    pub inserted: Vec<(Level, usize)>,
    /// Levels that already had data
    pub skipped: Vec<Level>,
}

impl SeedReport {
    pub fn total_inserted(&self) -> usize {
        self.inserted.iter().map(|(_, n)| n).sum()
    }
}

/// Populate every empty level with its fixed vocabulary
pub async fn seed_vocabulary(store: &SqliteLetterStore) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for level in Level::ALL {
        let inserted = store.insert_level_if_absent(level, &seed_entries(level)).await?;
        if inserted > 0 {
            debug!("Seeded level {} with {} entries", level, inserted);
            report.inserted.push((level, inserted));
        } else {
            report.skipped.push(level);
        }
    }

    if report.total_inserted() > 0 {
        info!("Seeded {} vocabulary entries", report.total_inserted());
    }

    Ok(report)
}
