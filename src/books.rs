use once_cell::sync::Lazy;
use rand::Rng;
use std::collections::HashMap;

/// Canonical name and chapter count for one book of the 66-book canon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Book {
    pub name: &'static str,
    pub chapters: u32,
}

/// The full canon in canonical order.
pub static BOOKS: [Book; 66] = [
    Book { name: "Genesis", chapters: 50 },
    Book { name: "Exodus", chapters: 40 },
    Book { name: "Leviticus", chapters: 27 },
    Book { name: "Numbers", chapters: 36 },
    Book { name: "Deuteronomy", chapters: 34 },
    Book { name: "Joshua", chapters: 24 },
    Book { name: "Judges", chapters: 21 },
    Book { name: "Ruth", chapters: 4 },
    Book { name: "1 Samuel", chapters: 31 },
    Book { name: "2 Samuel", chapters: 24 },
    Book { name: "1 Kings", chapters: 22 },
    Book { name: "2 Kings", chapters: 25 },
    Book { name: "1 Chronicles", chapters: 29 },
    Book { name: "2 Chronicles", chapters: 36 },
    Book { name: "Ezra", chapters: 10 },
    Book { name: "Nehemiah", chapters: 13 },
    Book { name: "Esther", chapters: 10 },
    Book { name: "Job", chapters: 42 },
    Book { name: "Psalms", chapters: 150 },
    Book { name: "Proverbs", chapters: 31 },
    Book { name: "Ecclesiastes", chapters: 12 },
    Book { name: "Song of Solomon", chapters: 8 },
    Book { name: "Isaiah", chapters: 66 },
    Book { name: "Jeremiah", chapters: 52 },
    Book { name: "Lamentations", chapters: 5 },
    Book { name: "Ezekiel", chapters: 48 },
    Book { name: "Daniel", chapters: 12 },
    Book { name: "Hosea", chapters: 14 },
    Book { name: "Joel", chapters: 3 },
    Book { name: "Amos", chapters: 9 },
    Book { name: "Obadiah", chapters: 1 },
    Book { name: "Jonah", chapters: 4 },
    Book { name: "Micah", chapters: 7 },
    Book { name: "Nahum", chapters: 3 },
    Book { name: "Habakkuk", chapters: 3 },
    Book { name: "Zephaniah", chapters: 3 },
    Book { name: "Haggai", chapters: 2 },
    Book { name: "Zechariah", chapters: 14 },
    Book { name: "Malachi", chapters: 4 },
    Book { name: "Matthew", chapters: 28 },
    Book { name: "Mark", chapters: 16 },
    Book { name: "Luke", chapters: 24 },
    Book { name: "John", chapters: 21 },
    Book { name: "Acts", chapters: 28 },
    Book { name: "Romans", chapters: 16 },
    Book { name: "1 Corinthians", chapters: 16 },
    Book { name: "2 Corinthians", chapters: 13 },
    Book { name: "Galatians", chapters: 6 },
    Book { name: "Ephesians", chapters: 6 },
    Book { name: "Philippians", chapters: 4 },
    Book { name: "Colossians", chapters: 4 },
    Book { name: "1 Thessalonians", chapters: 5 },
    Book { name: "2 Thessalonians", chapters: 3 },
    Book { name: "1 Timothy", chapters: 6 },
    Book { name: "2 Timothy", chapters: 4 },
    Book { name: "Titus", chapters: 3 },
    Book { name: "Philemon", chapters: 1 },
    Book { name: "Hebrews", chapters: 13 },
    Book { name: "James", chapters: 5 },
    Book { name: "1 Peter", chapters: 5 },
    Book { name: "2 Peter", chapters: 3 },
    Book { name: "1 John", chapters: 5 },
    Book { name: "2 John", chapters: 1 },
    Book { name: "3 John", chapters: 1 },
    Book { name: "Jude", chapters: 1 },
    Book { name: "Revelation", chapters: 22 },
];

// Case-insensitive lookup table, built once
static BY_NAME: Lazy<HashMap<String, &'static Book>> = Lazy::new(|| {
    BOOKS.iter().map(|b| (b.name.to_lowercase(), b)).collect()
});

// Representative subset the daily summary picks from
static DAILY_POOL: Lazy<Vec<&'static Book>> = Lazy::new(|| {
    [
        "Genesis", "Exodus", "Psalms", "Proverbs", "Isaiah", "Jeremiah",
        "Matthew", "Mark", "Luke", "John", "Acts", "Romans", "Revelation",
    ]
    .iter()
    .map(|name| normalize(name).expect("daily pool entry missing from canon"))
    .collect()
});

/// Resolves a user-supplied book name to its canonical entry.
/// Matching is case-insensitive and ignores surrounding and repeated whitespace.
pub fn normalize(name: &str) -> Option<&'static Book> {
    let cleaned = name.split_whitespace().collect::<Vec<_>>().join(" ");
    BY_NAME.get(&cleaned.to_lowercase()).copied()
}

/// Picks a random (book, chapter) pair for the daily summary.
pub fn random_daily_passage() -> (&'static Book, u32) {
    let mut rng = rand::thread_rng();
    let book = DAILY_POOL[rng.gen_range(0..DAILY_POOL.len())];
    let chapter = rng.gen_range(1..=book.chapters);
    (book, chapter)
}
