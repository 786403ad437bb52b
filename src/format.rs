use chrono::NaiveDateTime;
use serde_json::Value;

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders a task as `key: value` lines, subtasks first.
pub fn format_task(task: &Value, now: Option<NaiveDateTime>) -> String {
    let Some(fields) = task.as_object() else {
        return display(task);
    };
    let mut lines = Vec::new();

    let subtasks = fields
        .get("items")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty());
    if let Some(items) = subtasks {
        lines.push("Subtasks:".to_owned());
        for (idx, item) in items.iter().enumerate() {
            let summary = match item.as_object() {
                Some(sub) => sub
                    .iter()
                    .filter(|(k, v)| !is_blank(v) && k.as_str() != "timeZone")
                    .map(|(k, v)| format!("{k}: {}", display(v)))
                    .collect::<Vec<_>>()
                    .join("; "),
                None => display(item),
            };
            lines.push(format!("  {}. {summary}", idx + 1));
        }
    }

    for (key, value) in fields {
        if key == "items" || is_blank(value) {
            continue;
        }
        lines.push(format!("{key}: {}", display(value)));
    }

    if let Some(now) = now {
        lines.push(format!("Current time: {}", now.format("%Y-%m-%d %H:%M:%S")));
    }

    lines.join("\n")
}

pub fn format_project(project: &Value) -> String {
    let Some(fields) = project.as_object() else {
        return display(project);
    };
    fields
        .iter()
        .filter(|(_, v)| !is_blank(v))
        .map(|(k, v)| format!("{k}: {}", display(v)))
        .collect::<Vec<_>>()
        .join("\n")
}
