//! Flattened query tree.
//!
//! [`QueryTree::build`] walks the static definition once at startup and
//! records every node, array and method under its full path in a sorted
//! map. Array children are expanded to `path/{i}`.

use serde::Serialize;
use std::collections::BTreeMap;

use super::item::{QueryArgument, QueryItem};
use crate::handlers::HandlerId;

/// One addressable item.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub item: &'static QueryItem,
    /// Position inside the closest enclosing array.
    pub index: Option<usize>,
}

/// Self-description of one item.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Description<'a> {
    Node {
        path: &'a str,
        description: &'a str,
        items: Vec<&'a str>,
    },
    Array {
        path: &'a str,
        description: &'a str,
        size: usize,
        item: &'a str,
    },
    Method {
        path: &'a str,
        description: &'a str,
        arguments: &'a [QueryArgument],
    },
}

/// Path-indexed view of a static tree.
#[derive(Debug)]
pub struct QueryTree {
    entries: BTreeMap<String, Entry>,
}

impl QueryTree {
    /// Flatten `root`, which is mounted at `/{root name}`.
    ///
    /// # Panics
    /// Panics if two items share a path.
    pub fn build(root: &'static QueryItem) -> Self {
        let mut tree = Self {
            entries: BTreeMap::new(),
        };
        tree.walk(format!("/{}", root.name()), root, None);
        tree
    }

    fn walk(&mut self, path: String, item: &'static QueryItem, index: Option<usize>) {
        match item {
            QueryItem::Node { items, .. } => {
                for child in *items {
                    self.walk(format!("{path}/{}", child.name()), child, index);
                }
            }
            QueryItem::Array { size, item: child, .. } => {
                for i in 0..*size {
                    self.walk(format!("{path}/{i}"), *child, Some(i));
                }
            }
            QueryItem::Method { .. } => {}
        }
        if self.entries.contains_key(&path) {
            panic!("Query path '{path}' is defined twice");
        }
        self.entries.insert(path, Entry { item, index });
    }

    /// Item at `path`.
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Number of addressable paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Every invocable path with its handler and arguments.
    pub fn methods(&self) -> impl Iterator<Item = (&str, HandlerId, &'static [QueryArgument])> {
        self.entries.iter().filter_map(|(path, entry)| match entry.item {
            QueryItem::Method { handler, args, .. } => Some((path.as_str(), *handler, *args)),
            _ => None,
        })
    }

    /// JSON self-description of the item at `path`.
    pub fn describe(&self, path: &str) -> Option<Result<String, serde_json::Error>> {
        let entry = self.get(path)?;
        let description = match entry.item {
            QueryItem::Node {
                description, items, ..
            } => Description::Node {
                path,
                description: *description,
                items: items.iter().map(QueryItem::name).collect(),
            },
            QueryItem::Array {
                description,
                size,
                item,
                ..
            } => Description::Array {
                path,
                description: *description,
                size: *size,
                item: item.description(),
            },
            QueryItem::Method {
                description, args, ..
            } => Description::Method {
                path,
                description: *description,
                arguments: *args,
            },
        };
        Some(serde_json::to_string(&description))
    }
}
