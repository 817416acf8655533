use std::env;

pub fn insta_snapshot<F: FnOnce()>(f: F) {
    let mut settings = insta::Settings::clone_current();
    let snapshot_path = env::current_dir().unwrap().join("./test/snapshots");
    settings.set_snapshot_path(snapshot_path);
    settings.bind(f);
}

/// A reply where the model wrapped its JSON in prose and a markdown fence.
pub fn fenced_reply_fixture() -> &'static str {
    return r#"
Sure! Here's what I'll do with your list:

```json
[
  { "action": "add", "title": "Buy oat milk" },
  { "action": "delete", "id": "12" },
  { "action": "update", "id": 7, "completed": true }
]
```

Let me know if you need anything else!
"#
    .trim();
}

/// A reply that was cut off mid-object by the token limit.
pub fn truncated_reply_fixture() -> &'static str {
    return r#"{ "actions": [ { "action": "add", "title": "Call the dentist" }, { "action": "add", "title": "Book"#;
}

/// A reply that ignores the JSON format entirely.
pub fn prose_reply_fixture() -> &'static str {
    return "Of course! I have noted that down for you. Is there anything else I can help with?";
}
