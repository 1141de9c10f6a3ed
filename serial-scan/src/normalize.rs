/// Candidates shorter than this are treated as OCR noise.
pub const MIN_SERIAL_LEN: usize = 6;

/// Letter lookalikes corrected to digits when the surrounding context is
/// numeric. One direction only: digits are never turned into letters.
fn digit_lookalike(c: char) -> Option<char> {
    match c {
        'O' | 'Q' | 'D' => Some('0'),
        'I' | 'L' => Some('1'),
        'Z' => Some('2'),
        'S' => Some('5'),
        'B' => Some('8'),
        _ => None,
    }
}

/// Normalizes a raw OCR hit into serial form.
///
/// Uppercases, strips whitespace, and corrects digit lookalikes. A
/// lookalike is only corrected when an adjacent character is a digit;
/// inside a purely alphabetic run it is left alone, so words like
/// "HOUSING" survive while "HFEQ9F3HKDT" becomes "HFE09F3HKDT".
pub fn normalize_serial(raw: &str) -> String {
    let compact: Vec<char> = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let mut out = String::with_capacity(compact.len());
    for (i, &c) in compact.iter().enumerate() {
        let corrected = match digit_lookalike(c) {
            Some(digit) if has_adjacent_digit(&compact, i) => digit,
            _ => c,
        };
        out.push(corrected);
    }
    out
}

fn has_adjacent_digit(chars: &[char], i: usize) -> bool {
    let before = i.checked_sub(1).map(|p| chars[p].is_ascii_digit());
    let after = chars.get(i + 1).map(|c| c.is_ascii_digit());
    before.unwrap_or(false) || after.unwrap_or(false)
}

/// Length filter applied to normalized candidates.
pub fn qualifies(candidate: &str) -> bool {
    candidate.len() >= MIN_SERIAL_LEN
}
