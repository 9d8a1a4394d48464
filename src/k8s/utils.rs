use std::collections::BTreeMap;

pub(crate) fn format_label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<String>>()
        .join(",")
}

/// Parses `k1=v1,k2=v2` into a label map.
///
/// # Errors
///
/// Will return `Err` naming the first pair without an `=`
pub fn parse_label_selector(selector: &str) -> Result<BTreeMap<String, String>, String> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .ok_or_else(|| format!("invalid label selector pair: {pair}"))
        })
        .collect()
}
