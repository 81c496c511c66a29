//! Script transliteration between the three Kazakh writing systems.
//!
//! Six directed tables cover every Latin/Cyrillic/Arabic pair. Each
//! conversion runs two passes over the whole string: multi-character
//! sequences first (digraphs such as `ch`, `io`, `شش`), then single
//! characters, both matched case-insensitively. Output is produced in
//! the table's case, so conversion does not preserve capitalization and
//! is not round-trip safe (several source letters share one target).

/// One of the three supported writing systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cyrillic,
    Arabic,
}

const LATIN_TO_CYRILLIC: &[(&str, &str)] = &[
    ("io", "ё"),
    ("ch", "ч"),
    ("şç", "щ"),
    ("iu", "ю"),
    ("ia", "я"),
    ("a", "а"),
    ("ä", "ә"),
    ("b", "б"),
    ("v", "в"),
    ("g", "г"),
    ("ğ", "ғ"),
    ("d", "д"),
    ("e", "е"),
    ("j", "ж"),
    ("z", "з"),
    ("i", "і"),
    ("y", "й"),
    ("k", "к"),
    ("q", "қ"),
    ("l", "л"),
    ("m", "м"),
    ("n", "н"),
    ("ñ", "ң"),
    ("o", "о"),
    ("ö", "ө"),
    ("p", "п"),
    ("r", "р"),
    ("s", "с"),
    ("t", "т"),
    ("u", "у"),
    ("ū", "ұ"),
    ("ü", "ү"),
    ("f", "ф"),
    ("x", "х"),
    ("h", "һ"),
    ("c", "ц"),
    ("ş", "ш"),
    ("ı", "ы"),
];

const LATIN_TO_ARABIC: &[(&str, &str)] = &[
    ("io", "يو"),
    ("ch", "چ"),
    ("iu", "يۋ"),
    ("ia", "يا"),
    ("a", "ا"),
    ("ä", "ا"),
    ("b", "ب"),
    ("d", "د"),
    ("e", "ە"),
    ("f", "ف"),
    ("g", "گ"),
    ("h", "ھ"),
    ("i", "ى"),
    ("j", "ج"),
    ("k", "ك"),
    ("l", "ل"),
    ("m", "م"),
    ("n", "ن"),
    ("o", "و"),
    ("p", "پ"),
    ("q", "ق"),
    ("r", "ر"),
    ("s", "س"),
    ("t", "ت"),
    ("u", "ۇ"),
    ("v", "ۆ"),
    ("w", "ۋ"),
    ("x", "ح"),
    ("y", "ي"),
    ("z", "ز"),
    ("ğ", "ع"),
    ("ñ", "ڭ"),
    ("ö", "ۆ"),
    ("ü", "ۇ"),
    ("ş", "ش"),
    ("ı", "ى"),
    ("ç", "چ"),
    ("ū", "ۇ"),
    ("c", "تس"),
];

const CYRILLIC_TO_LATIN: &[(&str, &str)] = &[
    ("а", "a"),
    ("ә", "ä"),
    ("б", "b"),
    ("в", "v"),
    ("г", "g"),
    ("ғ", "ğ"),
    ("д", "d"),
    ("е", "e"),
    ("ё", "io"),
    ("ж", "j"),
    ("з", "z"),
    ("и", "i"),
    ("й", "y"),
    ("к", "k"),
    ("қ", "q"),
    ("л", "l"),
    ("м", "m"),
    ("н", "n"),
    ("ң", "ñ"),
    ("о", "o"),
    ("ө", "ö"),
    ("п", "p"),
    ("р", "r"),
    ("с", "s"),
    ("т", "t"),
    ("у", "u"),
    ("ұ", "ū"),
    ("ү", "ü"),
    ("ф", "f"),
    ("х", "x"),
    ("һ", "h"),
    ("ц", "c"),
    ("ч", "ch"),
    ("ш", "ş"),
    ("щ", "şç"),
    ("ы", "ı"),
    ("і", "i"),
    ("э", "e"),
    ("ю", "iu"),
    ("я", "ia"),
];

const CYRILLIC_TO_ARABIC: &[(&str, &str)] = &[
    ("ә", "ا"),
    ("і", "ى"),
    ("ң", "ڭ"),
    ("ғ", "ع"),
    ("ү", "ۇ"),
    ("ұ", "ۇ"),
    ("қ", "ق"),
    ("ө", "و"),
    ("һ", "ھ"),
    ("ё", "يو"),
    ("й", "ي"),
    ("ц", "تس"),
    ("у", "ۋ"),
    ("к", "ك"),
    ("е", "ە"),
    ("н", "ن"),
    ("г", "گ"),
    ("ш", "ش"),
    ("щ", "شش"),
    ("з", "ز"),
    ("х", "ح"),
    ("ф", "ف"),
    ("ы", "ى"),
    ("в", "ۆ"),
    ("а", "ا"),
    ("п", "پ"),
    ("р", "ر"),
    ("о", "و"),
    ("л", "ل"),
    ("д", "د"),
    ("ж", "ج"),
    ("э", "ە"),
    ("я", "يا"),
    ("ч", "چ"),
    ("с", "س"),
    ("м", "م"),
    ("и", "ي"),
    ("т", "ت"),
    ("б", "ب"),
    ("ю", "يۋ"),
    // Hard and soft signs have no Arabic counterpart.
    ("ъ", ""),
    ("ь", ""),
];

const ARABIC_TO_LATIN: &[(&str, &str)] = &[
    ("تس", "c"),
    ("يو", "io"),
    ("يۋ", "iu"),
    ("يا", "ia"),
    ("ا", "a"),
    ("ە", "e"),
    ("ب", "b"),
    ("د", "d"),
    ("ف", "f"),
    ("گ", "g"),
    ("ھ", "h"),
    ("ى", "i"),
    ("ج", "j"),
    ("ك", "k"),
    ("ل", "l"),
    ("م", "m"),
    ("ن", "n"),
    ("و", "o"),
    ("پ", "p"),
    ("ق", "q"),
    ("ر", "r"),
    ("س", "s"),
    ("ت", "t"),
    ("ۇ", "u"),
    ("ۆ", "ö"),
    ("ۋ", "w"),
    ("ح", "x"),
    ("ي", "y"),
    ("ز", "z"),
    ("ع", "ğ"),
    ("ڭ", "ñ"),
    ("ش", "ş"),
    ("چ", "ç"),
];

const ARABIC_TO_CYRILLIC: &[(&str, &str)] = &[
    ("تس", "ц"),
    ("يو", "ё"),
    ("يۋ", "ю"),
    ("يا", "я"),
    ("شش", "щ"),
    ("ا", "а"),
    ("ە", "е"),
    ("ب", "б"),
    ("د", "д"),
    ("ف", "ф"),
    ("گ", "г"),
    ("ھ", "һ"),
    ("ى", "и"),
    ("ج", "ж"),
    ("ك", "к"),
    ("ل", "л"),
    ("م", "м"),
    ("ن", "н"),
    ("و", "о"),
    ("پ", "п"),
    ("ق", "қ"),
    ("ر", "р"),
    ("س", "с"),
    ("ت", "т"),
    ("ۇ", "у"),
    ("ۆ", "в"),
    ("ۋ", "у"),
    ("ح", "х"),
    ("ي", "й"),
    ("ز", "з"),
    ("ع", "ғ"),
    ("ڭ", "ң"),
    ("ش", "ш"),
    ("چ", "ч"),
];

/// Stateless transliterator over the six directed tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptConverter;

impl ScriptConverter {
    pub fn new() -> Self {
        Self
    }

    /// Transliterate `text` between two scripts. Identical scripts and
    /// characters missing from the table pass through unchanged.
    pub fn convert(&self, text: &str, from: Script, to: Script) -> String {
        let Some(table) = table_for(from, to) else {
            return text.to_string();
        };
        let mut result = text.to_string();
        // Digraphs first so e.g. "ch" never decays into "c" + "h".
        for &(src, dst) in table.iter().filter(|(s, _)| s.chars().count() > 1) {
            result = replace_ignore_case(&result, src, dst);
        }
        for &(src, dst) in table.iter().filter(|(s, _)| s.chars().count() == 1) {
            result = replace_ignore_case(&result, src, dst);
        }
        result
    }

    /// Sentence punctuation gets Arabic forms only when the target
    /// script is Arabic; every other target keeps it as typed.
    pub fn convert_punctuation(&self, punctuation: char, target: Script) -> char {
        if target != Script::Arabic {
            return punctuation;
        }
        match punctuation {
            '?' => '؟',
            ',' => '،',
            ';' => '؛',
            other => other,
        }
    }
}

fn table_for(from: Script, to: Script) -> Option<&'static [(&'static str, &'static str)]> {
    use Script::*;
    match (from, to) {
        (Latin, Cyrillic) => Some(LATIN_TO_CYRILLIC),
        (Latin, Arabic) => Some(LATIN_TO_ARABIC),
        (Cyrillic, Latin) => Some(CYRILLIC_TO_LATIN),
        (Cyrillic, Arabic) => Some(CYRILLIC_TO_ARABIC),
        (Arabic, Latin) => Some(ARABIC_TO_LATIN),
        (Arabic, Cyrillic) => Some(ARABIC_TO_CYRILLIC),
        _ => None,
    }
}

fn lower1(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Replace every case-insensitive occurrence of `from` with `to`.
///
/// Comparison folds each character independently, which is enough for
/// the alphabets in the tables above.
fn replace_ignore_case(text: &str, from: &str, to: &str) -> String {
    let pat: Vec<char> = from.chars().map(lower1).collect();
    if pat.is_empty() {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let matches = i + pat.len() <= chars.len()
            && chars[i..i + pat.len()]
                .iter()
                .map(|&c| lower1(c))
                .eq(pat.iter().copied());
        if matches {
            out.push_str(to);
            i += pat.len();
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}
