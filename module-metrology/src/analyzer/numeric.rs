/// Truncate toward zero at `decimals` places: `truncate(1.2399, 2) == 1.23`,
/// `truncate(-1.2399, 2) == -1.23`. Never rounds.
pub fn truncate(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).trunc() / factor
}

/// Millimetres to micrometres.
pub fn mm_to_um(value: f64) -> f64 {
    value * 1000.0
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
