use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const NANO_EXP: u32 = 9;

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

const DECIMAL_SUFFIXES: [(&str, i32); 9] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// Value of a quantity in nano-units, or `None` when it does not parse.
///
/// The API server rewrites quantities into canonical form (`0.5` is read
/// back as `500m`), so drift checks compare values instead of strings.
pub fn nano_value(raw: &str) -> Option<i128> {
    let raw = raw.trim();
    let (number, exp10, exp2) = split_suffix(raw)?;
    let (negative, digits) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut mantissa: i128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        mantissa = mantissa
            .checked_mul(10)?
            .checked_add(i128::from(c.to_digit(10)?))?;
    }
    mantissa = mantissa.checked_mul(2i128.checked_pow(exp2)?)?;

    let scale = NANO_EXP as i32 + exp10 - frac_part.len() as i32;
    let value = if scale >= 0 {
        mantissa.checked_mul(10i128.checked_pow(scale as u32)?)?
    } else {
        // sub-nano precision is dropped by the server as well
        mantissa / 10i128.checked_pow(scale.unsigned_abs())?
    };
    Some(if negative { -value } else { value })
}

fn split_suffix(raw: &str) -> Option<(&str, i32, u32)> {
    for (suffix, exp2) in BINARY_SUFFIXES {
        if let Some(number) = raw.strip_suffix(suffix) {
            return Some((number, 0, exp2));
        }
    }
    if let Some(idx) = raw.find(['e', 'E']) {
        let (number, tail) = raw.split_at(idx);
        let exp = &tail[1..];
        if !exp.is_empty() {
            return Some((number, exp.parse().ok()?, 0));
        }
    }
    for (suffix, exp10) in DECIMAL_SUFFIXES {
        if let Some(number) = raw.strip_suffix(suffix) {
            return Some((number, exp10, 0));
        }
    }
    Some((raw, 0, 0))
}

/// Quantities are equal when they denote the same amount. Unparseable
/// values fall back to string equality.
pub fn same_quantity(a: &Quantity, b: &Quantity) -> bool {
    match (nano_value(&a.0), nano_value(&b.0)) {
        (Some(x), Some(y)) => x == y,
        _ => a.0 == b.0,
    }
}
