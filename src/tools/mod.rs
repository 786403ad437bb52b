pub mod projects;
pub mod tasks;

/// Joins entries as `1. …`, `2. …` separated by blank lines.
fn numbered<I>(entries: I) -> String
where
    I: IntoIterator<Item = String>,
{
    entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| format!("{}. {entry}", idx + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}
