//! Path-addressed edits on a JSON tree, with realtime-database semantics:
//! writing `null` deletes, and objects left empty disappear.

use serde_json::{Map, Value};

pub(crate) fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether a write at one path can change what a subscriber at the other path sees.
pub(crate) fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b).all(|(x, y)| x == y)
}

pub(crate) fn get_at<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in path {
        node = node.as_object()?.get(segment)?;
    }
    (!node.is_null()).then_some(node)
}

pub(crate) fn set_at(root: &mut Value, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *root = prune(value);
        return;
    };

    if !root.is_object() {
        if value.is_null() {
            return;
        }
        *root = Value::Object(Map::new());
    }
    let Value::Object(children) = root else {
        return;
    };

    let child = children.entry(first.clone()).or_insert(Value::Null);
    set_at(child, rest, value);
    if is_empty(child) {
        children.remove(first);
    }
    if children.is_empty() {
        *root = Value::Null;
    }
}

/// Applies a multi-location update: every key of `children` (which may itself contain `/`)
/// is written relative to `path`.
pub(crate) fn merge_at(root: &mut Value, path: &[String], children: Map<String, Value>) {
    for (key, value) in children {
        let mut child_path = path.to_vec();
        child_path.extend(segments(&key));
        set_at(root, &child_path, value);
    }
}

/// Undoes one change (`prior` → `optimistic`) on top of `current`, entry by entry.
///
/// An entry is put back to its `prior` value only while `current` still holds exactly what the
/// change wrote there. Entries the change didn't touch, and entries someone else has rewritten
/// since, keep their current value. `None` means absent.
pub(crate) fn revert(
    current: Option<&Value>,
    prior: Option<&Value>,
    optimistic: Option<&Value>,
) -> Option<Value> {
    if prior == optimistic {
        return current.cloned();
    }

    let empty = Map::new();
    if let (Some(current_map), Some(prior_map), Some(optimistic_map)) = (
        children(current, &empty),
        children(prior, &empty),
        children(optimistic, &empty),
    ) {
        let mut reverted = current_map.clone();
        for key in prior_map.keys().chain(optimistic_map.keys()) {
            match revert(current_map.get(key), prior_map.get(key), optimistic_map.get(key)) {
                Some(value) => {
                    reverted.insert(key.clone(), value);
                }
                None => {
                    reverted.remove(key);
                }
            }
        }
        // an entry the change created, and nothing else filled since, goes away entirely
        if reverted.is_empty() && (current.is_none() || prior.is_none()) {
            return None;
        }
        return Some(Value::Object(reverted));
    }

    if current == optimistic {
        prior.cloned()
    } else {
        current.cloned()
    }
}

// absent counts as an empty object, so entries can be added to or removed from it
fn children<'a>(value: Option<&'a Value>, empty: &'a Map<String, Value>) -> Option<&'a Map<String, Value>> {
    match value {
        None => Some(empty),
        Some(Value::Object(map)) => Some(map),
        Some(_) => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_and_get_nested() {
        let mut root = Value::Null;
        set_at(&mut root, &segments("itinerary/version"), json!(3));
        set_at(&mut root, &segments("/activities/d1-100/completed"), json!(true));

        assert_eq!(get_at(&root, &segments("itinerary/version")), Some(&json!(3)));
        assert_eq!(
            get_at(&root, &segments("activities")),
            Some(&json!({"d1-100": {"completed": true}}))
        );
        assert_eq!(get_at(&root, &segments("packingChecklist")), None);
    }

    #[test]
    fn writing_null_deletes_and_prunes_empty_parents() {
        let mut root = json!({"a": {"b": {"c": 1}}, "d": 2});
        set_at(&mut root, &segments("a/b/c"), Value::Null);
        assert_eq!(root, json!({"d": 2}));

        set_at(&mut root, &segments("d"), Value::Null);
        assert_eq!(root, Value::Null);
        assert_eq!(get_at(&root, &[]), None);
    }

    #[test]
    fn merge_writes_each_child() {
        let mut root = json!({"list": {"x": 1, "y": 2}});
        let children = json!({"y": null, "z/deep": 3}).as_object().unwrap().clone();
        merge_at(&mut root, &segments("list"), children);
        assert_eq!(root, json!({"list": {"x": 1, "z": {"deep": 3}}}));
    }

    #[test]
    fn revert_undoes_only_the_entries_a_change_wrote() {
        let prior = json!({"d1-1": {"completed": true, "completedBy": "Sam"}});
        let optimistic = json!({
            "d1-1": {"completed": true, "completedBy": "Sam"},
            "d1-2": {"completed": true, "completedBy": "Alex"}
        });
        let current = json!({
            "d1-1": {"completed": false},
            "d1-2": {"completed": true, "completedBy": "Alex"},
            "d3-1": {"completed": true, "completedBy": "Jordan"}
        });

        assert_eq!(
            revert(Some(&current), Some(&prior), Some(&optimistic)),
            Some(json!({
                "d1-1": {"completed": false},
                "d3-1": {"completed": true, "completedBy": "Jordan"}
            }))
        );
    }

    #[test]
    fn revert_restores_cleared_fields() {
        let prior = json!({"sunscreen": {"Alex": {"checked": true, "checkedAt": "2026-03-01T10:00:00Z"}}});
        let optimistic = json!({"sunscreen": {"Alex": {"checked": false}}});
        assert_eq!(
            revert(Some(&optimistic), Some(&prior), Some(&optimistic)),
            Some(prior)
        );
    }

    #[test]
    fn revert_keeps_entries_rewritten_since() {
        let prior = json!({});
        let optimistic = json!({"mine": true});
        let theirs = json!({"theirs": true});
        assert_eq!(
            revert(Some(&theirs), Some(&prior), Some(&optimistic)),
            Some(theirs.clone())
        );
        assert_eq!(
            revert(Some(&json!({"mine": false})), Some(&prior), Some(&optimistic)),
            Some(json!({"mine": false}))
        );
        assert_eq!(revert(None, Some(&prior), Some(&optimistic)), None);
    }

    #[test]
    fn overlap_is_prefix_in_either_direction() {
        assert!(overlaps(&segments("a"), &segments("a/b")));
        assert!(overlaps(&segments("a/b"), &segments("a")));
        assert!(overlaps(&segments(""), &segments("a")));
        assert!(!overlaps(&segments("a/b"), &segments("a/c")));
    }
}
