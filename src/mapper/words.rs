//! Spoken-word number parsing
//!
//! The NLU engines hand slot values back as words ("twenty three",
//! "max", "half"). The vehicle bus expects decimal strings, so every
//! numeric slot goes through [`words_to_number`] before validation.

/// Convert a spoken-word number phrase into a decimal string.
///
/// Unknown words flush the running sub-total, so the phrase never fails:
/// empty or unmatched input yields `"0"`.
pub fn words_to_number(phrase: &str) -> String {
    let words: Vec<&str> = phrase.split_whitespace().collect();

    if let [word] = words.as_slice() {
        if let Some(value) = sentinel(word) {
            return value.to_string();
        }
    }

    let mut total: u64 = 0;
    let mut current: u64 = 0;

    for word in words {
        if let Some(n) = word_value(word) {
            current = current.saturating_add(n);
        } else if word == "hundred" {
            current = current.saturating_mul(100);
        } else {
            total = total.saturating_add(current);
            current = 0;
        }
    }

    total.saturating_add(current).to_string()
}

fn sentinel(word: &str) -> Option<u64> {
    match word {
        "zero" | "min" | "minimum" => Some(0),
        "half" | "halfway" => Some(50),
        "max" | "maximum" | "full" | "fully" | "completely" | "hundred" => Some(100),
        _ => None,
    }
}

fn word_value(word: &str) -> Option<u64> {
    let n = match word {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" | "fourty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(n)
}
