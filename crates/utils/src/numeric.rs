/// Parse a number written with the export's European separators.
///
/// When both "." and "," appear, "." is a thousands separator and "," the
/// decimal mark ("1.208,88" -> 1208.88). A lone "," is the decimal mark
/// ("61,82" -> 61.82). A lone "." is already a decimal point.
pub fn parse_eu_decimal(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() || t == "--" {
        return None;
    }

    let normalized = if t.contains('.') && t.contains(',') {
        t.replace('.', "").replace(',', ".")
    } else {
        t.replace(',', ".")
    };

    normalized.parse::<f64>().ok()
}
