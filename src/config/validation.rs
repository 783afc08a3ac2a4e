use regex::Regex;

/// Expand `${VAR_NAME}` references through `lookup`. Unknown variables are
/// left as written.
pub(crate) fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let Ok(re) = Regex::new(r"\$\{([^}]+)\}") else {
        return value.to_string();
    };

    let mut result = value.to_string();
    for cap in re.captures_iter(value) {
        let var_name = &cap[1];
        let replacement = lookup(var_name).unwrap_or_else(|| format!("${{{}}}", var_name));
        result = result.replace(&cap[0], &replacement);
    }

    result
}
