#[cfg(test)]
#[path = "interpreter_test.rs"]
mod tests;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Map;
use serde_json::Value;

use crate::domain::models::Operation;
use crate::domain::models::Todo;
use crate::domain::models::TodoId;

pub const CLARIFICATION: &str = "I'm sorry, I didn't understand that. Please try again.";

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    return Regex::new(r"(?i)```(?:json)?\s*").unwrap();
});

static NUMBERED_PAIR: Lazy<Regex> = Lazy::new(|| {
    return Regex::new(r"(?i)^(.*?)(\d+)\s+and\s+(\d+)\s*$").unwrap();
});

static EMPTY_OBJECT: Lazy<Regex> = Lazy::new(|| {
    return Regex::new(r"^\{\s*\}$").unwrap();
});

static ADD_VERB: Lazy<Regex> = Lazy::new(|| {
    return Regex::new(r"(?i)^\s*(?:add|create)\b\s*").unwrap();
});

static TASK_LABEL: Lazy<Regex> = Lazy::new(|| {
    return Regex::new(
        r"(?i)^(?:(?:\d+|a|an|one|two|three|four|five|six|seven|eight|nine|ten)\s+)?(?:new\s+)?(?:tasks?|todos?)\b\s*",
    )
    .unwrap();
});

static LEADING_PUNCT: Lazy<Regex> = Lazy::new(|| {
    return Regex::new(r"^[:\-]\s*").unwrap();
});

static LIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    return Regex::new(r"(?i)\s*,\s*|\s+and\s+").unwrap();
});

/// What a model reply turned out to mean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interpretation {
    /// Operations read from JSON in the model reply.
    Structured(Vec<Operation>),
    /// Operations recovered from the user's own message.
    Heuristic(Vec<Operation>),
    /// Nothing actionable, show this text as the assistant's answer.
    Chat(String),
}

impl Interpretation {
    pub fn operations(&self) -> &[Operation] {
        match self {
            Interpretation::Structured(ops) => return ops,
            Interpretation::Heuristic(ops) => return ops,
            Interpretation::Chat(_) => return &[],
        }
    }

    pub fn is_structured(&self) -> bool {
        return matches!(self, Interpretation::Structured(_));
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Verb {
    Add,
    Delete,
    Update,
}

impl Verb {
    fn parse(action: &str) -> Option<Verb> {
        match action.trim().to_lowercase().as_str() {
            "add" => return Some(Verb::Add),
            "delete" => return Some(Verb::Delete),
            "update" => return Some(Verb::Update),
            _ => return None,
        }
    }

    /// Keyword scan used when an action object carries no usable `action`
    /// field. A title that merely mentions "delete" will misfire.
    fn infer(lowered_reply: &str) -> Option<Verb> {
        if lowered_reply.contains("delete") || lowered_reply.contains("remove") {
            return Some(Verb::Delete);
        }
        if lowered_reply.contains("add") || lowered_reply.contains("create") {
            return Some(Verb::Add);
        }
        if lowered_reply.contains("update")
            || lowered_reply.contains("edit")
            || lowered_reply.contains("complete")
        {
            return Some(Verb::Update);
        }

        return None;
    }
}

/// Every JSON shape a model has been seen to answer with.
enum Shape<'a> {
    Batch(&'a [Value]),
    Wrapped(&'a [Value]),
    Action(&'a Map<String, Value>),
    Unrecognized,
}

impl<'a> Shape<'a> {
    fn classify(node: &'a Value) -> Shape<'a> {
        match node {
            Value::Array(items) => return Shape::Batch(items),
            Value::Object(map) => {
                if let Some(Value::Array(actions)) = map.get("actions") {
                    return Shape::Wrapped(actions);
                }
                return Shape::Action(map);
            }
            _ => return Shape::Unrecognized,
        }
    }
}

pub struct Interpreter {}

impl Interpreter {
    /// Turns a raw model reply into todo operations. Falls back to reading
    /// the user's message, and finally to echoing the reply as chat. The
    /// result only depends on the arguments.
    pub fn interpret(reply: &str, user_message: &str, todos: &[Todo]) -> Interpretation {
        let cleaned = strip_fences(reply);
        let lowered = cleaned.to_lowercase();

        let mut chat_reply: Option<String> = None;
        if let Some(candidate) = payload_candidate(&cleaned) {
            match serde_json::from_str::<Value>(candidate) {
                Ok(value) => {
                    let mut ops = vec![];
                    normalize(&value, &lowered, &mut ops);
                    if !ops.is_empty() {
                        tracing::debug!(operations = ?ops, "Interpreted structured reply");
                        return Interpretation::Structured(ops);
                    }
                    chat_reply = reply_field(&value);
                }
                Err(err) => {
                    tracing::debug!(error = ?err, candidate, "Reply payload is not valid JSON");
                }
            }
        }

        let ops = heuristic_operations(user_message, todos);
        if !ops.is_empty() {
            tracing::debug!(operations = ?ops, "Interpreted user message locally");
            return Interpretation::Heuristic(ops);
        }

        if let Some(text) = chat_reply {
            return Interpretation::Chat(text);
        }

        if cleaned.is_empty() || EMPTY_OBJECT.is_match(&cleaned) {
            return Interpretation::Chat(CLARIFICATION.to_string());
        }

        return Interpretation::Chat(reply.trim().to_string());
    }
}

fn strip_fences(reply: &str) -> String {
    return CODE_FENCE.replace_all(reply, "").trim().to_string();
}

/// The first top level balanced `[...]` span, or the first `{...}` span
/// when there is no array. Brackets inside JSON strings are ignored. When an
/// opening bracket never closes, scanning resumes just after it so a
/// complete inner value can still be found.
fn payload_candidate(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut object: Option<&str> = None;

    let mut idx = 0;
    while idx < bytes.len() {
        let open = bytes[idx];
        if open != b'[' && open != b'{' {
            idx += 1;
            continue;
        }

        match balanced_end(bytes, idx) {
            Some(end) => {
                let span = &text[idx..=end];
                if open == b'[' {
                    return Some(span);
                }
                object = object.or(Some(span));
                idx = end + 1;
            }
            None => {
                idx += 1;
            }
        }
    }

    return object;
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut closers: Vec<u8> = vec![];
    let mut in_string = false;
    let mut escaped = false;

    for (idx, byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'[' => closers.push(b']'),
            b'{' => closers.push(b'}'),
            b']' | b'}' => {
                if closers.pop() != Some(*byte) {
                    return None;
                }
                if closers.is_empty() {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }

    return None;
}

fn normalize(node: &Value, lowered_reply: &str, ops: &mut Vec<Operation>) {
    match Shape::classify(node) {
        Shape::Batch(items) | Shape::Wrapped(items) => {
            for item in items {
                normalize(item, lowered_reply, ops);
            }
        }
        Shape::Action(map) => {
            let explicit = map
                .get("action")
                .and_then(|action| return action.as_str())
                .and_then(Verb::parse);

            if let Some(verb) = explicit.or_else(|| return Verb::infer(lowered_reply)) {
                push_action(verb, map, ops);
            }
        }
        Shape::Unrecognized => {}
    }
}

fn push_action(verb: Verb, map: &Map<String, Value>, ops: &mut Vec<Operation>) {
    match verb {
        Verb::Delete => {
            if let Some(Value::Array(ids)) = map.get("ids") {
                ops.extend(ids.iter().filter_map(coerce_id).map(Operation::delete));
            } else if let Some(id) = map.get("id").and_then(coerce_id) {
                ops.push(Operation::delete(id));
            }
        }
        Verb::Update => {
            if let Some(Value::Array(updates)) = map.get("updates") {
                for update in updates {
                    if let Some(entry) = update.as_object() {
                        ops.extend(update_operation(entry));
                    }
                }
            } else {
                ops.extend(update_operation(map));
            }
        }
        Verb::Add => {
            let titles = match map.get("titles") {
                Some(Value::Array(titles)) => titles
                    .iter()
                    .filter_map(|title| return title.as_str())
                    .collect::<Vec<&str>>(),
                _ => map
                    .get("title")
                    .and_then(|title| return title.as_str())
                    .into_iter()
                    .collect::<Vec<&str>>(),
            };

            for title in titles {
                ops.extend(
                    split_numbered_pair(title)
                        .iter()
                        .map(|split| return Operation::add(split)),
                );
            }
        }
    }
}

fn update_operation(map: &Map<String, Value>) -> Option<Operation> {
    let id = map.get("id").and_then(coerce_id)?;

    return Some(Operation::Update {
        id,
        title: map
            .get("title")
            .and_then(|title| return title.as_str())
            .map(|title| return title.to_string()),
        completed: map
            .get("completed")
            .and_then(|completed| return completed.as_bool()),
    });
}

/// Models send ids as numbers, floats or strings. Anything that isn't a
/// whole number is dropped.
fn coerce_id(value: &Value) -> Option<TodoId> {
    let float = match value {
        Value::Number(number) => {
            if let Some(id) = number.as_i64() {
                return Some(id);
            }
            number.as_f64()?
        }
        Value::String(text) => {
            let text = text.trim();
            if let Ok(id) = text.parse::<TodoId>() {
                return Some(id);
            }
            text.parse::<f64>().ok()?
        }
        _ => return None,
    };

    if !float.is_finite() || float.fract() != 0.0 || float.abs() > i64::MAX as f64 {
        return None;
    }

    return Some(float as TodoId);
}

/// "Watch movie 1 and 2" becomes "Watch movie 1" and "Watch movie 2". Blank
/// titles produce nothing.
pub fn split_numbered_pair(title: &str) -> Vec<String> {
    let title = title.trim();
    if title.is_empty() {
        return vec![];
    }

    if let Some(captures) = NUMBERED_PAIR.captures(title) {
        let base = trim_trailing_punct(&captures[1]);
        if !base.is_empty() {
            return vec![
                format!("{base} {}", &captures[2]),
                format!("{base} {}", &captures[3]),
            ];
        }
    }

    return vec![title.to_string()];
}

fn trim_trailing_punct(text: &str) -> &str {
    return text
        .trim()
        .trim_end_matches(|c: char| return c == '-' || c == ':' || c == ',' || c.is_whitespace());
}

fn reply_field(value: &Value) -> Option<String> {
    let reply = value.as_object()?.get("reply")?.as_str()?.trim();
    if reply.is_empty() {
        return None;
    }

    return Some(reply.to_string());
}

fn heuristic_operations(user_message: &str, todos: &[Todo]) -> Vec<Operation> {
    let msg = user_message.trim();
    let lowered = msg.to_lowercase();

    if (lowered.contains("delete") || lowered.contains("remove")) && lowered.contains("last") {
        if let Some(last) = todos.last() {
            return vec![Operation::delete(last.id)];
        }
    }

    if ADD_VERB.is_match(msg) {
        return add_titles(msg)
            .iter()
            .map(|title| return Operation::add(title))
            .collect();
    }

    return vec![];
}

/// "add 2 new tasks: milk, eggs and bread" becomes three titles.
fn add_titles(msg: &str) -> Vec<String> {
    let after_verb = ADD_VERB.replace(msg, "");
    let after_label = TASK_LABEL.replace(after_verb.trim(), "");
    let payload = LEADING_PUNCT.replace(after_label.trim(), "");
    let payload = payload.trim().trim_end_matches(['.', '!']);

    let pair = split_numbered_pair(payload);
    if pair.len() > 1 {
        return pair;
    }

    return LIST_SEPARATOR
        .split(payload)
        .map(|part| return part.trim().trim_end_matches(['.', '!']).trim())
        .filter(|part| return !part.is_empty())
        .map(|part| return part.to_string())
        .collect();
}
