use serde::Serialize;
use serde_json::{Map, Value};

/// A nested JSON document addressed by `/`-separated paths.
///
/// Used to assemble the full contents of a subtree before it is written to
/// the policy engine in a single call. Intermediate maps are created on
/// insert and pruned again on delete once they hold no children, so the tree
/// never carries an empty container that no insert asked for.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PathTree(Map<String, Value>);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("{path}: segment {segment:?} holds a value, not a container")]
    NotAContainer { path: String, segment: String },

    #[error("{path}: the root of the tree can only be replaced by an object")]
    RootNotAnObject { path: String },
}

/// Splits a path into its non-empty segments, so `/a/b`, `a/b` and `a//b`
/// all address the same node.
pub fn segments(path: &str) -> impl Iterator<Item = &str> + '_ {
    path.split('/').filter(|s| !s.is_empty())
}

/// Joins two paths, normalizing separators.
pub fn join(prefix: &str, path: &str) -> String {
    segments(prefix)
        .chain(segments(path))
        .collect::<Vec<_>>()
        .join("/")
}

// === impl PathTree ===

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Stores `value` at `path`, creating every missing ancestor.
    ///
    /// An empty path (`""` or `"/"`) replaces the whole tree and therefore
    /// requires an object.
    pub fn insert(&mut self, path: &str, value: Value) -> Result<(), TreeError> {
        let segs = segments(path).collect::<Vec<_>>();
        let Some((last, parents)) = segs.split_last() else {
            return match value {
                Value::Object(map) => {
                    self.0 = map;
                    Ok(())
                }
                _ => Err(TreeError::RootNotAnObject {
                    path: path.to_string(),
                }),
            };
        };

        let mut node = &mut self.0;
        for segment in parents {
            let child = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = match child {
                Value::Object(map) => map,
                _ => return Err(not_a_container(path, segment)),
            };
        }
        node.insert(last.to_string(), value);
        Ok(())
    }

    /// Removes the value at `path`, then prunes every ancestor left empty.
    ///
    /// Deleting a path that does not exist is a no-op. An empty path clears
    /// the tree. Pruning only follows an actual removal, so an empty map that
    /// was inserted as a value stays in place when a missing key below it is
    /// deleted.
    pub fn delete(&mut self, path: &str) -> Result<(), TreeError> {
        let segs = segments(path).collect::<Vec<_>>();
        if segs.is_empty() {
            self.0.clear();
            return Ok(());
        }
        remove_pruned(&mut self.0, &segs, path)?;
        Ok(())
    }

    /// Returns the value stored at `path`. The root itself is read with
    /// [`PathTree::as_map`].
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segs = segments(path);
        let mut value = self.0.get(segs.next()?)?;
        for segment in segs {
            value = value.as_object()?.get(segment)?;
        }
        Some(value)
    }
}

impl From<PathTree> for Value {
    fn from(tree: PathTree) -> Self {
        tree.into_value()
    }
}

/// Returns true if a value was removed below `node`.
fn remove_pruned(
    node: &mut Map<String, Value>,
    segs: &[&str],
    path: &str,
) -> Result<bool, TreeError> {
    let Some((first, rest)) = segs.split_first() else {
        return Ok(false);
    };
    if rest.is_empty() {
        return Ok(node.remove(*first).is_some());
    }

    let emptied = match node.get_mut(*first) {
        None => return Ok(false),
        Some(Value::Object(child)) => {
            if !remove_pruned(child, rest, path)? {
                return Ok(false);
            }
            child.is_empty()
        }
        Some(_) => return Err(not_a_container(path, first)),
    };
    if emptied {
        node.remove(*first);
    }
    Ok(true)
}

fn not_a_container(path: &str, segment: &str) -> TreeError {
    TreeError::NotAContainer {
        path: path.to_string(),
        segment: segment.to_string(),
    }
}
