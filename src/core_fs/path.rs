/// Joins `arg` onto `current_dir` and normalizes the result into a logical
/// path that always starts with `/`.
///
/// Absolute arguments replace `current_dir`. Empty and `.` segments are
/// dropped, `..` pops one segment. Returns `None` when `..` would climb
/// above `/`.
pub fn resolve_logical(current_dir: &str, arg: &str) -> Option<String> {
    let mut parts: Vec<&str> = if arg.starts_with('/') {
        Vec::new()
    } else {
        current_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in arg.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => parts.push(name),
        }
    }

    Some(format!("/{}", parts.join("/")))
}

/// Drops the last segment of a logical path; `/` stays `/`.
pub fn parent_of(logical: &str) -> String {
    match logical.trim_end_matches('/').rfind('/') {
        Some(0) | None => String::from("/"),
        Some(idx) => logical[..idx].to_string(),
    }
}
