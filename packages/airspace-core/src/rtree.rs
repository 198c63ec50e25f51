//! Bounding-box R-tree over an arbitrary payload.
//!
//! Insertion descends by least area enlargement. A node that grows past
//! `max_entries` is split in two along the longer axis of its box, and the
//! new sibling is handed to the parent, which may split in turn. A split
//! root becomes the child of a new root, so every leaf sits at the same
//! depth and that depth grows logarithmically with the number of entries.

use std::cmp::Ordering;

use crate::geometry::BoundingBox;

pub const DEFAULT_MAX_ENTRIES: usize = 8;

#[derive(Debug, Clone)]
enum Entries<T> {
    Leaf(Vec<(BoundingBox, T)>),
    Internal(Vec<Node<T>>),
}

#[derive(Debug, Clone)]
struct Node<T> {
    bbox: BoundingBox,
    entries: Entries<T>,
}

impl<T> Node<T> {
    fn new(entries: Entries<T>) -> Self {
        let bbox = match &entries {
            Entries::Leaf(items) => union_all(items.iter().map(|(b, _)| *b)),
            Entries::Internal(children) => union_all(children.iter().map(|c| c.bbox)),
        };
        Node { bbox, entries }
    }

    fn len(&self) -> usize {
        match &self.entries {
            Entries::Leaf(items) => items.len(),
            Entries::Internal(children) => children.len(),
        }
    }

    // Returns the new sibling when this node had to split
    fn insert(&mut self, bbox: BoundingBox, value: T, max_entries: usize) -> Option<Node<T>> {
        self.bbox = self.bbox.union(&bbox);

        match &mut self.entries {
            Entries::Leaf(items) => items.push((bbox, value)),
            Entries::Internal(children) => {
                let best = choose_subtree(children, &bbox);
                if let Some(sibling) = children[best].insert(bbox, value, max_entries) {
                    children.push(sibling);
                }
            }
        }

        if self.len() > max_entries {
            Some(self.split())
        } else {
            None
        }
    }

    // Sort entries by midpoint along the longer side of the box and move the
    // upper half into a new sibling
    fn split(&mut self) -> Node<T> {
        let along_lon = self.bbox.width() >= self.bbox.height();
        let by_mid = |a: &BoundingBox, b: &BoundingBox| {
            midpoint(a, along_lon).total_cmp(&midpoint(b, along_lon))
        };

        let (left, right) = match std::mem::replace(&mut self.entries, Entries::Leaf(Vec::new())) {
            Entries::Leaf(mut items) => {
                items.sort_by(|a, b| by_mid(&a.0, &b.0));
                let right = items.split_off(items.len() / 2);
                (Entries::Leaf(items), Entries::Leaf(right))
            }
            Entries::Internal(mut children) => {
                children.sort_by(|a, b| by_mid(&a.bbox, &b.bbox));
                let right = children.split_off(children.len() / 2);
                (Entries::Internal(children), Entries::Internal(right))
            }
        };

        *self = Node::new(left);
        Node::new(right)
    }

    fn search<'a>(&'a self, query: &BoundingBox, out: &mut Vec<&'a T>) {
        if !self.bbox.intersects(query) {
            return;
        }
        match &self.entries {
            Entries::Leaf(items) => {
                out.extend(items.iter().filter(|(b, _)| b.intersects(query)).map(|(_, v)| v));
            }
            Entries::Internal(children) => {
                for child in children {
                    child.search(query, out);
                }
            }
        }
    }
}

fn union_all(boxes: impl Iterator<Item = BoundingBox>) -> BoundingBox {
    boxes
        .reduce(|a, b| a.union(&b))
        .unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
}

fn midpoint(b: &BoundingBox, along_lon: bool) -> f64 {
    if along_lon {
        (b.min_lon + b.max_lon) / 2.0
    } else {
        (b.min_lat + b.max_lat) / 2.0
    }
}

// Child needing the smallest area increase; the first one wins ties
fn choose_subtree<T>(children: &[Node<T>], bbox: &BoundingBox) -> usize {
    let mut best = 0;
    let mut best_increase = f64::INFINITY;
    for (i, child) in children.iter().enumerate() {
        let increase = child.bbox.union(bbox).area() - child.bbox.area();
        if increase.total_cmp(&best_increase) == Ordering::Less {
            best = i;
            best_increase = increase;
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct RTree<T> {
    root: Option<Node<T>>,
    max_entries: usize,
    len: usize,
}

impl<T> Default for RTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RTree<T> {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// `max_entries` below 2 is raised to 2 so a split always makes progress.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            root: None,
            max_entries: max_entries.max(2),
            len: 0,
        }
    }

    pub fn insert(&mut self, bbox: BoundingBox, value: T) {
        self.len += 1;
        let root = match self.root.take() {
            Some(mut root) => match root.insert(bbox, value, self.max_entries) {
                Some(sibling) => Node::new(Entries::Internal(vec![root, sibling])),
                None => root,
            },
            None => Node::new(Entries::Leaf(vec![(bbox, value)])),
        };
        self.root = Some(root);
    }

    /// Payloads whose box intersects `query` (edges included).
    pub fn search(&self, query: &BoundingBox) -> Vec<&T> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.search(query, &mut out);
        }
        out
    }

    pub fn search_point(&self, lon: f64, lat: f64) -> Vec<&T> {
        self.search(&BoundingBox::from_point(lon, lat))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<T> FromIterator<(BoundingBox, T)> for RTree<T> {
    fn from_iter<I: IntoIterator<Item = (BoundingBox, T)>>(iter: I) -> Self {
        let mut tree = RTree::new();
        for (bbox, value) in iter {
            tree.insert(bbox, value);
        }
        tree
    }
}
