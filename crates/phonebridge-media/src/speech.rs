//! Text shaping for speech over a phone line.
//!
//! Synthesized French speech over an 8 kHz line is easier to follow when
//! acronyms are spelled out, digits are grouped, and key words get a short
//! pause. These helpers rewrite reply text before it goes to synthesis.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};

const ACRONYMS: &[&str] = &[
    "PAC", "EDF", "GDF", "TTC", "HT", "TVA", "SNCF", "RATP", "TGV", "PDF", "COVID", "RIB", "IBAN",
    "BIC", "SMS", "PIN", "SIM", "RDV",
];

const MONTHS: [&str; 12] = [
    "janvier",
    "février",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "août",
    "septembre",
    "octobre",
    "novembre",
    "décembre",
];

/// Written phrasing rewritten to spoken phrasing. Longer phrases come first so
/// they win over their prefixes.
const SCRIPT_REPLACEMENTS: &[(&str, &str)] = &[
    ("N'hésitez pas à nous contacter", "Vous pouvez nous joindre"),
    ("N'hésitez pas à", "Vous pouvez"),
    ("Veuillez noter", "Notez bien"),
    ("Je vous invite à", "Je vous propose de"),
    ("Cordialement", "Je vous remercie de votre attention"),
    ("Bien à vous", "Merci pour votre écoute"),
    ("Sincères salutations", "Je vous souhaite une excellente journée"),
    ("Merci de votre compréhension", "Je vous remercie de votre compréhension"),
    ("Pour toute question", "Si vous avez des questions"),
    ("En cas de besoin", "Si vous avez besoin d'aide"),
    ("Nous sommes à votre disposition", "Nous sommes là pour vous aider"),
    ("Rappel:", "Je vous rappelle que"),
    ("NB:", "Notez bien que"),
    ("PS:", "J'ajoute que"),
    ("cf.", "voir"),
];

pub const PAUSE_MARKER: &str = "<pause>";

static PUNCT_FOLLOWED_BY_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.,!?;:])(\w)").expect("valid punctuation pattern"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static ACRONYM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(?:{})\b", ACRONYMS.join("|"))).expect("valid acronym pattern")
});
static TEN_DIGITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2})(\d{2})(\d{2})(\d{2})(\d{2})").expect("valid phone pattern")
});
static DECIMAL_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+),(\d+)").expect("valid decimal pattern"));
// Only when the next word follows directly, so existing punctuation is kept.
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(attention|important|veuillez) (\w)").expect("valid emphasis pattern")
});
static NOTE_THAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(merci de noter)(?: que)? (\w)").expect("valid note pattern")
});
static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?:]) ").expect("valid sentence break pattern"));

/// Space after punctuation, collapse whitespace, and end on terminal punctuation.
pub fn optimize_punctuation(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let spaced = PUNCT_FOLLOWED_BY_WORD.replace_all(text, "$1 $2");
    let mut out = WHITESPACE_RUN.replace_all(&spaced, " ").trim().to_string();
    if !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}

/// Rewrite reply text for a phone line, then normalize punctuation.
pub fn optimize_for_phone_call(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = ACRONYM.replace_all(text, |caps: &Captures| spell_out(&caps[0]));
    let text = TEN_DIGITS.replace_all(&text, "$1 $2 $3 $4 $5");
    let text = DECIMAL_COMMA.replace_all(&text, "$1 virgule $2");
    let text = EMPHASIS.replace_all(&text, "$1, $2");
    let text = NOTE_THAT.replace_all(&text, "$1 que, $2");

    optimize_punctuation(&text)
}

fn spell_out(word: &str) -> String {
    let letters: Vec<String> = word.chars().map(String::from).collect();
    letters.join(" ")
}

/// Spoken amount, e.g. `12.50` EUR → "12 euros et 50 centimes".
pub fn format_money(amount: f64, currency: &str) -> String {
    let (singular, plural) = match currency {
        "USD" => ("dollar", "dollars"),
        "GBP" => ("livre", "livres"),
        _ => ("euro", "euros"),
    };

    let cents_total = (amount.abs() * 100.0).round() as u64;
    let whole = cents_total / 100;
    let cents = cents_total % 100;
    let unit = if whole == 1 { singular } else { plural };

    if whole == 0 && cents > 0 {
        format!("{cents} centimes")
    } else if cents == 0 {
        format!("{whole} {unit}")
    } else {
        let cent_unit = if cents == 1 { "centime" } else { "centimes" };
        format!("{whole} {unit} et {cents} {cent_unit}")
    }
}

/// Spoken date, e.g. "le 14 juillet 2025".
pub fn format_date(date: NaiveDate) -> String {
    format!(
        "le {} {} {}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

/// Phone number read in pairs (French ten-digit numbers) or digit by digit.
pub fn format_phone_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 {
        digits
            .chunks(2)
            .map(|pair| pair.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        digits
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Turn a written script into spoken phrasing with explicit pause markers.
pub fn prepare_phone_script(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = text.to_string();
    for (written, spoken) in SCRIPT_REPLACEMENTS {
        out = out.replace(written, spoken);
    }

    let out = SENTENCE_BREAK.replace_all(&out, format!("$1 {PAUSE_MARKER} "));
    let out = out
        .replace('(', &format!("{PAUSE_MARKER} "))
        .replace(')', &format!(" {PAUSE_MARKER}"));

    optimize_for_phone_call(&out)
}
